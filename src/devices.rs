// Device Registry for Elgato Stream Deck panels
// Defines supported models and their wire parameters

use std::fmt;
use std::str::FromStr;

use crate::error::DeckError;

/// Supported deck models, identified by USB product id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Model {
    StreamDeckMini,
    StreamDeckMiniV2,
    StreamDeckOriginal,
    StreamDeckOriginalV2,
    StreamDeckMK2,
    StreamDeckXL,
    StreamDeckPedal,
}

impl Model {
    /// All supported models
    pub const ALL: &'static [Model] = &[
        Model::StreamDeckMini,
        Model::StreamDeckMiniV2,
        Model::StreamDeckOriginal,
        Model::StreamDeckOriginalV2,
        Model::StreamDeckMK2,
        Model::StreamDeckXL,
        Model::StreamDeckPedal,
    ];

    pub const fn pid(self) -> u16 {
        match self {
            Model::StreamDeckMini => 0x0063,
            Model::StreamDeckMiniV2 => 0x0090,
            Model::StreamDeckOriginal => 0x0060,
            Model::StreamDeckOriginalV2 => 0x006d,
            Model::StreamDeckMK2 => 0x0080,
            Model::StreamDeckXL => 0x006c,
            Model::StreamDeckPedal => 0x0086,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Model::StreamDeckMini => "StreamDeckMini",
            Model::StreamDeckMiniV2 => "StreamDeckMiniV2",
            Model::StreamDeckOriginal => "StreamDeckOriginal",
            Model::StreamDeckOriginalV2 => "StreamDeckOriginalV2",
            Model::StreamDeckMK2 => "StreamDeckMK2",
            Model::StreamDeckXL => "StreamDeckXL",
            Model::StreamDeckPedal => "StreamDeckPedal",
        }
    }

    pub fn from_pid(pid: u16) -> Option<Model> {
        Model::ALL.iter().copied().find(|m| m.pid() == pid)
    }

    /// Wire parameters for this model
    pub fn descriptor(self) -> &'static DeviceDescriptor {
        // SUPPORTED_DEVICES is ordered like the enum
        &SUPPORTED_DEVICES[self as usize]
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Model {
    type Err = String;

    /// Accepts a model name (case-insensitive, `StreamDeck` prefix optional)
    /// or a product id such as `0x0080`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            return u16::from_str_radix(hex, 16)
                .ok()
                .and_then(Model::from_pid)
                .ok_or_else(|| format!("Unknown product id: {s}"));
        }
        let wanted = s.to_lowercase();
        Model::ALL
            .iter()
            .copied()
            .find(|m| {
                let name = m.name().to_lowercase();
                name == wanted || name.strip_prefix("streamdeck") == Some(wanted.as_str())
            })
            .ok_or_else(|| format!("Unknown model: {s}"))
    }
}

/// Image packet header layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderVersion {
    /// Page at 2, done at 4, key+1 at 5
    V1,
    /// Key at 2, done at 3, LE chunk length at 4, LE page at 6
    V2,
}

impl HeaderVersion {
    /// Fill the variable fields of an image packet header
    pub fn fill(self, header: &mut [u8], key: u8, page: u16, len: u16, done: bool) {
        match self {
            HeaderVersion::V1 => {
                header[2] = page as u8;
                header[4] = done as u8;
                header[5] = key + 1;
            }
            HeaderVersion::V2 => {
                header[2] = key;
                header[3] = done as u8;
                header[4..6].copy_from_slice(&len.to_le_bytes());
                header[6..8].copy_from_slice(&page.to_le_bytes());
            }
        }
    }

    /// Bytes of the header the fill function writes to
    pub const fn fields_len(self) -> usize {
        match self {
            HeaderVersion::V1 => 6,
            HeaderVersion::V2 => 8,
        }
    }
}

/// Geometric transform matching the physical mounting of the key display
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transform {
    Identity,
    Transpose,
    Rotate180,
}

/// Wire image format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageEncoding {
    /// 24-bit BMP
    Bmp,
    Jpeg { quality: u8 },
}

/// Image parameters of a visual model
#[derive(Debug, Clone, Copy)]
pub struct ImageFormat {
    /// Key images are square, this is the side length in pixels
    pub key_size: u32,
    pub transform: Transform,
    pub encoding: ImageEncoding,
    /// Length of one image output report
    pub report_len: usize,
    /// Header template copied to the front of every image packet
    pub header: &'static [u8],
    pub header_version: HeaderVersion,
}

impl ImageFormat {
    /// Payload bytes carried by one packet
    pub fn body_len(&self) -> usize {
        self.report_len - self.header.len()
    }
}

/// Device definition with wire parameters
#[derive(Debug, Clone, Copy)]
pub struct DeviceDescriptor {
    pub model: Model,
    pub rows: usize,
    pub cols: usize,
    /// `None` for control-only models
    pub image: Option<ImageFormat>,

    /// Feature report length
    pub payload_len: usize,
    /// Larger feature report length used for serial queries, if any
    pub serial_payload_len: Option<usize>,

    // Command prefixes
    pub reset_key_stream: &'static [u8],
    pub reset: &'static [u8],
    pub brightness: &'static [u8],
    pub serial: &'static [u8],
    pub firmware: &'static [u8],

    // Offsets
    pub serial_offset: usize,
    pub firmware_offset: usize,
    pub key_states_offset: usize,
}

impl DeviceDescriptor {
    pub fn pid(&self) -> u16 {
        self.model.pid()
    }

    pub fn is_visual(&self) -> bool {
        self.image.is_some()
    }

    pub fn key_count(&self) -> usize {
        self.rows * self.cols
    }

    /// Row-major key index, `None` when out of range
    pub fn key_index(&self, row: usize, col: usize) -> Option<usize> {
        (row < self.rows && col < self.cols).then(|| row * self.cols + col)
    }

    /// Feature report length for serial queries
    pub fn serial_len(&self) -> usize {
        self.serial_payload_len.unwrap_or(self.payload_len)
    }

    /// Largest feature report this model uses
    pub fn max_feature_len(&self) -> usize {
        self.payload_len.max(self.serial_len())
    }

    /// Input report length carrying the key states
    pub fn key_states_len(&self) -> usize {
        self.key_states_offset + self.key_count()
    }
}

const V1_IMAGE_HEADER: &[u8] = &[0x02, 0x01, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0];
const V2_IMAGE_HEADER: &[u8] = &[0x02, 0x07, 0, 0, 0, 0, 0, 0];

const JPEG_QUALITY: u8 = 95;

/// All supported devices, in `Model` declaration order
/// Add new models here; only a new header layout needs code changes
pub static SUPPORTED_DEVICES: &[DeviceDescriptor] = &[
    DeviceDescriptor {
        model: Model::StreamDeckMini,
        rows: 2,
        cols: 3,
        image: Some(ImageFormat {
            key_size: 80,
            transform: Transform::Transpose,
            encoding: ImageEncoding::Bmp,
            report_len: 1024,
            header: V1_IMAGE_HEADER,
            header_version: HeaderVersion::V1,
        }),
        payload_len: 17,
        serial_payload_len: None,
        reset_key_stream: &[0x02],
        reset: &[0x0b, 0x63],
        brightness: &[0x05, 0x55, 0xaa, 0xd1, 0x01],
        serial: &[0x03],
        firmware: &[0x04],
        serial_offset: 5,
        firmware_offset: 5,
        key_states_offset: 1,
    },
    DeviceDescriptor {
        model: Model::StreamDeckMiniV2,
        rows: 2,
        cols: 3,
        image: Some(ImageFormat {
            key_size: 80,
            transform: Transform::Transpose,
            encoding: ImageEncoding::Bmp,
            report_len: 1024,
            header: V1_IMAGE_HEADER,
            header_version: HeaderVersion::V1,
        }),
        payload_len: 17,
        serial_payload_len: Some(32),
        reset_key_stream: &[0x02],
        reset: &[0x0b, 0x63],
        brightness: &[0x05, 0x55, 0xaa, 0xd1, 0x01],
        serial: &[0x03],
        firmware: &[0x04],
        serial_offset: 5,
        firmware_offset: 5,
        key_states_offset: 1,
    },
    DeviceDescriptor {
        model: Model::StreamDeckOriginal,
        rows: 3,
        cols: 5,
        image: Some(ImageFormat {
            key_size: 72,
            transform: Transform::Rotate180,
            encoding: ImageEncoding::Bmp,
            report_len: 8191,
            header: V1_IMAGE_HEADER,
            header_version: HeaderVersion::V1,
        }),
        payload_len: 17,
        serial_payload_len: None,
        reset_key_stream: &[0x02],
        reset: &[0x0b, 0x63],
        brightness: &[0x05, 0x55, 0xaa, 0xd1, 0x01],
        serial: &[0x03],
        firmware: &[0x04],
        serial_offset: 5,
        firmware_offset: 5,
        key_states_offset: 1,
    },
    DeviceDescriptor {
        model: Model::StreamDeckOriginalV2,
        rows: 3,
        cols: 5,
        image: Some(ImageFormat {
            key_size: 72,
            transform: Transform::Rotate180,
            encoding: ImageEncoding::Jpeg {
                quality: JPEG_QUALITY,
            },
            report_len: 1024,
            header: V2_IMAGE_HEADER,
            header_version: HeaderVersion::V2,
        }),
        payload_len: 32,
        serial_payload_len: None,
        reset_key_stream: &[0x02],
        reset: &[0x03, 0x02],
        brightness: &[0x03, 0x08],
        serial: &[0x06],
        firmware: &[0x05],
        serial_offset: 2,
        firmware_offset: 6,
        key_states_offset: 4,
    },
    DeviceDescriptor {
        model: Model::StreamDeckMK2,
        rows: 3,
        cols: 5,
        image: Some(ImageFormat {
            key_size: 72,
            transform: Transform::Rotate180,
            encoding: ImageEncoding::Jpeg {
                quality: JPEG_QUALITY,
            },
            report_len: 1024,
            header: V2_IMAGE_HEADER,
            header_version: HeaderVersion::V2,
        }),
        payload_len: 32,
        serial_payload_len: None,
        reset_key_stream: &[0x02],
        reset: &[0x03, 0x02],
        brightness: &[0x03, 0x08],
        serial: &[0x06],
        firmware: &[0x05],
        serial_offset: 2,
        firmware_offset: 6,
        key_states_offset: 4,
    },
    DeviceDescriptor {
        model: Model::StreamDeckXL,
        rows: 4,
        cols: 8,
        image: Some(ImageFormat {
            key_size: 96,
            transform: Transform::Rotate180,
            encoding: ImageEncoding::Jpeg {
                quality: JPEG_QUALITY,
            },
            report_len: 1024,
            header: V2_IMAGE_HEADER,
            header_version: HeaderVersion::V2,
        }),
        payload_len: 32,
        serial_payload_len: None,
        reset_key_stream: &[0x02],
        reset: &[0x03, 0x02],
        brightness: &[0x03, 0x08],
        serial: &[0x06],
        firmware: &[0x05],
        serial_offset: 2,
        firmware_offset: 6,
        key_states_offset: 4,
    },
    // Control-only: no imagery, reset or brightness
    DeviceDescriptor {
        model: Model::StreamDeckPedal,
        rows: 1,
        cols: 3,
        image: None,
        payload_len: 32,
        serial_payload_len: None,
        reset_key_stream: &[],
        reset: &[],
        brightness: &[],
        serial: &[0x06],
        firmware: &[0x05],
        serial_offset: 2,
        firmware_offset: 6,
        key_states_offset: 4,
    },
];

/// Find device definition by product id
pub fn find_device(pid: u16) -> Option<&'static DeviceDescriptor> {
    SUPPORTED_DEVICES.iter().find(|d| d.pid() == pid)
}

/// Look up a model's descriptor, failing on unregistered product ids
pub fn lookup(pid: u16) -> Result<&'static DeviceDescriptor, DeckError> {
    find_device(pid).ok_or(DeckError::UnknownModel(pid))
}

/// Check if a product id is supported
pub fn is_supported(pid: u16) -> bool {
    find_device(pid).is_some()
}
