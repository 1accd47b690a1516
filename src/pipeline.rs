//! Key image pipeline
//!
//! Turns an arbitrary bitmap into the payload a model expects on the wire:
//! fit to the key size keeping the aspect ratio, apply the model's mounting
//! transform, then encode as BMP or JPEG.

use std::sync::Arc;

use image::codecs::bmp::BmpEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{
    DynamicImage, ExtendedColorType, GenericImageView, ImageError, Rgb, RgbImage, Rgba, RgbaImage,
};
use tracing::debug;

use crate::devices::{DeviceDescriptor, ImageEncoding, ImageFormat, Model, Transform};
use crate::error::DeckError;

/// Placement of a scaled image inside the key canvas
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Largest rectangle with the source's aspect ratio centered in the canvas
pub fn keep_aspect_ratio(canvas: (u32, u32), source: (u32, u32)) -> Rect {
    let (cw, ch) = canvas;
    let (sw, sh) = (source.0 as u64, source.1 as u64);
    let (width, height) = if sw < sh {
        ((sw * cw as u64 / sh) as u32, ch)
    } else if sw > sh {
        (cw, (sh * ch as u64 / sw) as u32)
    } else {
        (cw, ch)
    };
    Rect {
        x: (cw - width) / 2,
        y: (ch - height) / 2,
        width,
        height,
    }
}

/// Scale `img` into a transparent `size`x`size` canvas keeping its aspect ratio
fn fit(img: &DynamicImage, size: u32) -> RgbaImage {
    if img.dimensions() == (size, size) {
        return img.to_rgba8();
    }

    let mut canvas = RgbaImage::new(size, size);
    if img.width() == 0 || img.height() == 0 {
        return canvas;
    }
    let rect = keep_aspect_ratio((size, size), img.dimensions());
    // Extreme aspect ratios still get one pixel row/column
    let scaled = imageops::resize(
        img,
        rect.width.max(1),
        rect.height.max(1),
        FilterType::Triangle,
    );
    imageops::replace(&mut canvas, &scaled, rect.x as i64, rect.y as i64);
    canvas
}

fn transform(img: RgbaImage, transform: Transform) -> RgbaImage {
    match transform {
        Transform::Identity => img,
        Transform::Transpose => {
            RgbaImage::from_fn(img.height(), img.width(), |x, y| *img.get_pixel(y, x))
        }
        Transform::Rotate180 => imageops::rotate180(&img),
    }
}

fn encode(img: &RgbImage, encoding: ImageEncoding) -> Result<Vec<u8>, ImageError> {
    let mut out = Vec::new();
    match encoding {
        ImageEncoding::Bmp => {
            BmpEncoder::new(&mut out).encode(
                img.as_raw(),
                img.width(),
                img.height(),
                ExtendedColorType::Rgb8,
            )?;
        }
        ImageEncoding::Jpeg { quality } => {
            JpegEncoder::new_with_quality(&mut out, quality).encode_image(img)?;
        }
    }
    Ok(out)
}

fn render(source: &DynamicImage, format: &ImageFormat) -> Result<Vec<u8>, ImageError> {
    let fitted = fit(source, format.key_size);
    let oriented = transform(fitted, format.transform);
    encode(&over_black(&oriented), format.encoding)
}

/// Composite onto an opaque black background
///
/// Neither wire format carries alpha, so every pixel is scaled by its
/// coverage. Fully transparent pixels come out black whatever colour they
/// store.
fn over_black(img: &RgbaImage) -> RgbImage {
    RgbImage::from_fn(img.width(), img.height(), |x, y| {
        let Rgba([r, g, b, a]) = *img.get_pixel(x, y);
        let scale = |c: u8| ((u16::from(c) * u16::from(a) + 127) / 255) as u8;
        Rgb([scale(r), scale(g), scale(b)])
    })
}

/// An encoded key image bound to the model it was rendered for
///
/// Cloning is cheap: the source bitmap and payload are shared.
#[derive(Debug, Clone)]
pub struct RawImage {
    source: Arc<DynamicImage>,
    data: Arc<[u8]>,
    model: Model,
}

impl RawImage {
    /// Model whose wire format `data` is in
    pub fn model(&self) -> Model {
        self.model
    }

    /// Encoded payload
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// The bitmap this image was rendered from, before resizing
    pub fn source(&self) -> &DynamicImage {
        &self.source
    }

    /// True if both images share one payload buffer
    pub fn same_payload(&self, other: &RawImage) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }
}

/// Anything a key image can be set from
#[derive(Debug, Clone, Copy)]
pub enum ImageInput<'a> {
    Bitmap(&'a DynamicImage),
    Raw(&'a RawImage),
}

impl<'a> From<&'a DynamicImage> for ImageInput<'a> {
    fn from(img: &'a DynamicImage) -> Self {
        ImageInput::Bitmap(img)
    }
}

impl<'a> From<&'a RawImage> for ImageInput<'a> {
    fn from(raw: &'a RawImage) -> Self {
        ImageInput::Raw(raw)
    }
}

/// Render `input` for the model described by `desc`
///
/// A `RawImage` already bound to this model comes back as a clone sharing
/// its payload. One bound to another model is re-rendered from its source.
pub fn prepare(input: ImageInput<'_>, desc: &DeviceDescriptor) -> Result<RawImage, DeckError> {
    let format = desc
        .image
        .as_ref()
        .ok_or_else(|| DeckError::NotVisual(desc.model.to_string()))?;

    let source = match input {
        ImageInput::Raw(raw) if raw.model == desc.model => return Ok(raw.clone()),
        ImageInput::Raw(raw) => {
            debug!("Re-rendering {} image for {}", raw.model, desc.model);
            Arc::clone(&raw.source)
        }
        ImageInput::Bitmap(img) => Arc::new(img.clone()),
    };

    let data = render(&source, format)?;
    debug!(
        "Rendered {}x{} image for {}: {} bytes",
        source.width(),
        source.height(),
        desc.model,
        data.len()
    );
    Ok(RawImage {
        source,
        data: data.into(),
        model: desc.model,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);
    const CLEAR: Rgba<u8> = Rgba([0, 0, 0, 0]);

    fn solid(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(width, height, RED))
    }

    #[test]
    fn test_keep_aspect_ratio_wide() {
        let rect = keep_aspect_ratio((72, 72), (200, 100));
        assert_eq!(
            rect,
            Rect {
                x: 0,
                y: 18,
                width: 72,
                height: 36
            }
        );
    }

    #[test]
    fn test_keep_aspect_ratio_tall() {
        let rect = keep_aspect_ratio((96, 96), (50, 200));
        assert_eq!(
            rect,
            Rect {
                x: 36,
                y: 0,
                width: 24,
                height: 96
            }
        );
    }

    #[test]
    fn test_keep_aspect_ratio_square() {
        let rect = keep_aspect_ratio((80, 80), (512, 512));
        assert_eq!(
            rect,
            Rect {
                x: 0,
                y: 0,
                width: 80,
                height: 80
            }
        );
    }

    #[test]
    fn test_fit_leaves_margins_transparent() {
        let fitted = fit(&solid(200, 100), 72);
        assert_eq!(fitted.dimensions(), (72, 72));
        assert_eq!(*fitted.get_pixel(36, 0), CLEAR);
        assert_eq!(*fitted.get_pixel(36, 71), CLEAR);
        assert_eq!(*fitted.get_pixel(36, 36), RED);
        assert_eq!(*fitted.get_pixel(0, 36), RED);
    }

    #[test]
    fn test_fit_keeps_exact_size_untouched() {
        let mut img = RgbaImage::from_pixel(72, 72, CLEAR);
        img.put_pixel(3, 5, RED);
        let fitted = fit(&DynamicImage::ImageRgba8(img.clone()), 72);
        assert_eq!(fitted, img);
    }

    #[test]
    fn test_fit_degenerate_sources() {
        assert_eq!(fit(&solid(0, 0), 72).dimensions(), (72, 72));
        let sliver = fit(&solid(1000, 1), 72);
        assert_eq!(*sliver.get_pixel(10, 36), RED);
    }

    #[test]
    fn test_transforms() {
        let mut img = RgbaImage::from_pixel(4, 2, CLEAR);
        img.put_pixel(3, 0, RED);

        let rotated = transform(img.clone(), Transform::Rotate180);
        assert_eq!(*rotated.get_pixel(0, 1), RED);
        assert_eq!(*rotated.get_pixel(3, 0), CLEAR);

        let transposed = transform(img.clone(), Transform::Transpose);
        assert_eq!(transposed.dimensions(), (2, 4));
        assert_eq!(*transposed.get_pixel(0, 3), RED);

        assert_eq!(transform(img.clone(), Transform::Identity), img);
    }

    #[test]
    fn test_encodings() {
        let bmp = prepare((&solid(10, 10)).into(), Model::StreamDeckMini.descriptor()).unwrap();
        assert_eq!(&bmp.data()[..2], b"BM");

        let jpeg = prepare((&solid(10, 10)).into(), Model::StreamDeckMK2.descriptor()).unwrap();
        assert_eq!(&jpeg.data()[..2], &[0xff, 0xd8]);
    }

    #[test]
    fn test_prepare_is_deterministic() {
        let img = solid(100, 60);
        let desc = Model::StreamDeckXL.descriptor();
        let a = prepare(ImageInput::Bitmap(&img), desc).unwrap();
        let b = prepare(ImageInput::Bitmap(&img), desc).unwrap();
        assert_eq!(a.data(), b.data());
        assert!(!a.same_payload(&b));
    }

    #[test]
    fn test_prepare_reuses_same_model_raw_image() {
        let img = solid(100, 60);
        let desc = Model::StreamDeckMK2.descriptor();
        let raw = prepare(ImageInput::Bitmap(&img), desc).unwrap();
        let again = prepare(ImageInput::Raw(&raw), desc).unwrap();
        assert!(raw.same_payload(&again));
        assert!(Arc::ptr_eq(&raw.source, &again.source));
    }

    #[test]
    fn test_prepare_rerenders_for_other_model() {
        let img = solid(100, 60);
        let raw = prepare(ImageInput::Bitmap(&img), Model::StreamDeckMK2.descriptor()).unwrap();

        let mini = prepare(ImageInput::Raw(&raw), Model::StreamDeckMini.descriptor()).unwrap();
        assert_eq!(mini.model(), Model::StreamDeckMini);
        assert!(!raw.same_payload(&mini));
        assert!(Arc::ptr_eq(&raw.source, &mini.source));
        assert_eq!(mini.source().dimensions(), (100, 60));

        let direct = prepare(ImageInput::Bitmap(&img), Model::StreamDeckMini.descriptor()).unwrap();
        assert_eq!(mini.data(), direct.data());
    }

    #[test]
    fn test_prepare_rejects_control_only_model() {
        let err = prepare(
            ImageInput::Bitmap(&solid(10, 10)),
            Model::StreamDeckPedal.descriptor(),
        )
        .unwrap_err();
        assert!(matches!(err, DeckError::NotVisual(_)));
    }

    fn decode_rgb(raw: &RawImage) -> RgbImage {
        image::load_from_memory(raw.data()).unwrap().to_rgb8()
    }

    #[test]
    fn test_transparent_pixels_render_black() {
        // Invisible white: the colour channels must not reach the wire
        let ghost = Rgba([255, 255, 255, 0]);
        let exact = DynamicImage::ImageRgba8(RgbaImage::from_pixel(80, 80, ghost));
        let wide = DynamicImage::ImageRgba8(RgbaImage::from_pixel(160, 80, ghost));

        for img in [&exact, &wide] {
            let raw = prepare(img.into(), Model::StreamDeckMini.descriptor()).unwrap();
            let rgb = decode_rgb(&raw);
            assert_eq!(rgb.dimensions(), (80, 80));
            assert!(rgb.pixels().all(|p| *p == Rgb([0, 0, 0])));
        }

        // Lossy encoding: the key centre is black within JPEG noise
        let raw = prepare((&exact).into(), Model::StreamDeckMK2.descriptor()).unwrap();
        let Rgb(center) = *decode_rgb(&raw).get_pixel(36, 36);
        assert!(center.iter().all(|&c| c < 8), "{:?}", center);
    }

    #[test]
    fn test_partial_alpha_is_scaled() {
        let half_orange = Rgba([255, 100, 0, 128]);
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(80, 80, half_orange));
        let raw = prepare((&img).into(), Model::StreamDeckMini.descriptor()).unwrap();
        assert_eq!(*decode_rgb(&raw).get_pixel(40, 40), Rgb([128, 50, 0]));
    }

    #[test]
    fn test_over_black_keeps_opaque_pixels() {
        let img = RgbaImage::from_pixel(2, 2, RED);
        assert!(over_black(&img).pixels().all(|p| *p == Rgb([255, 0, 0])));
    }
}
