//! Image normalisation: remote image bytes → [`RasterImage`] ready to embed.
//!
//! The PDF embedder understands exactly two kinds of pixel data: raw samples
//! (Flate-compressed by the assembler) and baseline JPEG streams (embedded
//! verbatim with `DCTDecode`). Every supported source encoding is mapped onto
//! one of those:
//!
//! | Declared type | Treatment |
//! |---------------|-----------|
//! | `image/png`   | decoded to raw RGB (+ alpha soft mask) |
//! | `image/webp`  | decoded to raw RGB (+ alpha); the lossy source is never re-compressed |
//! | `image/jpeg`  | baseline streams pass through untouched; progressive, CMYK or oversized ones are re-encoded as baseline |
//!
//! Every raster is capped at `max_px` on its longest edge so the layout can
//! draw it at a fixed scale without overflowing a row.

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat};
use tracing::debug;

/// JPEG quality used when a JPEG has to be re-encoded.
const JPEG_QUALITY: u8 = 85;

/// Source encodings the normaliser accepts, keyed by declared content type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageEncoding {
    Png,
    Jpeg,
    WebP,
}

impl ImageEncoding {
    /// Map a `Content-Type` header value (parameters allowed) to an encoding.
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match essence.as_str() {
            "image/png" => Some(ImageEncoding::Png),
            "image/jpeg" | "image/jpg" | "image/pjpeg" => Some(ImageEncoding::Jpeg),
            "image/webp" => Some(ImageEncoding::WebP),
            _ => None,
        }
    }

    fn format(self) -> ImageFormat {
        match self {
            ImageEncoding::Png => ImageFormat::Png,
            ImageEncoding::Jpeg => ImageFormat::Jpeg,
            ImageEncoding::WebP => ImageFormat::WebP,
        }
    }
}

/// A decoded image in a form the PDF assembler can embed directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterImage {
    pub width: u32,
    pub height: u32,
    pub pixels: RasterPixels,
}

/// Pixel payload of a [`RasterImage`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RasterPixels {
    /// 8-bit grayscale samples, row-major.
    Gray(Vec<u8>),
    /// 8-bit RGB samples plus an optional 8-bit alpha plane.
    ///
    /// `alpha` is `None` when every pixel is opaque.
    Rgb { rgb: Vec<u8>, alpha: Option<Vec<u8>> },
    /// A baseline JPEG stream with 1 (gray) or 3 (RGB) components.
    Jpeg { data: Vec<u8>, components: u8 },
}

/// Decode `bytes` declared as `encoding` into an embeddable raster.
///
/// CPU-bound; callers on the async runtime run it under `spawn_blocking`.
pub fn normalize_bytes(
    bytes: &[u8],
    encoding: ImageEncoding,
    max_px: u32,
) -> Result<RasterImage, image::ImageError> {
    let decoded = image::load_from_memory_with_format(bytes, encoding.format())?;
    match encoding {
        ImageEncoding::Png | ImageEncoding::WebP => Ok(lossless_raster(decoded, max_px)),
        ImageEncoding::Jpeg => jpeg_raster(bytes, decoded, max_px),
    }
}

/// Down-scale `img` so its longest edge is at most `max_px`.
fn fit(img: DynamicImage, max_px: u32) -> DynamicImage {
    if img.width() > max_px || img.height() > max_px {
        let scaled = img.thumbnail(max_px, max_px);
        debug!(
            "Scaled {}x{} → {}x{}",
            img.width(),
            img.height(),
            scaled.width(),
            scaled.height()
        );
        scaled
    } else {
        img
    }
}

fn lossless_raster(img: DynamicImage, max_px: u32) -> RasterImage {
    let rgba = fit(img, max_px).to_rgba8();
    let (width, height) = rgba.dimensions();

    let mut rgb = Vec::with_capacity((width * height * 3) as usize);
    let mut alpha = Vec::with_capacity((width * height) as usize);
    for pixel in rgba.pixels() {
        rgb.extend_from_slice(&pixel.0[..3]);
        alpha.push(pixel.0[3]);
    }
    let alpha = if alpha.iter().all(|&a| a == u8::MAX) {
        None
    } else {
        Some(alpha)
    };

    RasterImage {
        width,
        height,
        pixels: RasterPixels::Rgb { rgb, alpha },
    }
}

fn jpeg_raster(
    bytes: &[u8],
    decoded: DynamicImage,
    max_px: u32,
) -> Result<RasterImage, image::ImageError> {
    if let Some(frame) = baseline_frame(bytes) {
        let fits = frame.width <= max_px && frame.height <= max_px;
        if fits && matches!(frame.components, 1 | 3) {
            return Ok(RasterImage {
                width: frame.width,
                height: frame.height,
                pixels: RasterPixels::Jpeg {
                    data: bytes.to_vec(),
                    components: frame.components,
                },
            });
        }
    }

    let rgb = fit(decoded, max_px).to_rgb8();
    let (width, height) = rgb.dimensions();
    let mut data = Vec::new();
    rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut data, JPEG_QUALITY))?;
    debug!("Re-encoded JPEG as baseline {}x{}", width, height);

    Ok(RasterImage {
        width,
        height,
        pixels: RasterPixels::Jpeg {
            data,
            components: 3,
        },
    })
}

/// Frame header of a baseline (SOF0) JPEG.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct JpegFrame {
    pub width: u32,
    pub height: u32,
    pub components: u8,
}

/// Walk the JPEG marker segments up to the first frame header.
///
/// Returns `None` for anything that is not a baseline sequential frame
/// (progressive, lossless, arithmetic) or is truncated.
pub(crate) fn baseline_frame(bytes: &[u8]) -> Option<JpegFrame> {
    if bytes.len() < 4 || bytes[0] != 0xFF || bytes[1] != 0xD8 {
        return None;
    }
    let mut pos = 2;
    while pos + 4 <= bytes.len() {
        if bytes[pos] != 0xFF {
            return None;
        }
        let marker = bytes[pos + 1];
        // Fill bytes.
        if marker == 0xFF {
            pos += 1;
            continue;
        }
        // Standalone markers carry no length.
        if marker == 0x01 || (0xD0..=0xD7).contains(&marker) {
            pos += 2;
            continue;
        }
        let len = u16::from_be_bytes([bytes[pos + 2], bytes[pos + 3]]) as usize;
        if len < 2 {
            return None;
        }
        match marker {
            0xC0 => {
                let seg = bytes.get(pos + 4..pos + 2 + len)?;
                if seg.len() < 6 {
                    return None;
                }
                let height = u16::from_be_bytes([seg[1], seg[2]]) as u32;
                let width = u16::from_be_bytes([seg[3], seg[4]]) as u32;
                return Some(JpegFrame {
                    width,
                    height,
                    components: seg[5],
                });
            }
            // Every other SOFn (C1–CF minus DHT/JPG/DAC), or start of scan.
            0xC1..=0xC3 | 0xC5..=0xC7 | 0xC9..=0xCB | 0xCD..=0xCF | 0xDA => return None,
            _ => pos += 2 + len,
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb, RgbImage, Rgba, RgbaImage};
    use std::io::Cursor;

    fn encode(img: &DynamicImage, format: ImageFormat) -> Vec<u8> {
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), format)
            .expect("encode should succeed");
        buf
    }

    fn solid_rgb(w: u32, h: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(w, h, Rgb([200, 30, 30])))
    }

    #[test]
    fn content_type_mapping() {
        assert_eq!(
            ImageEncoding::from_content_type("image/png"),
            Some(ImageEncoding::Png)
        );
        assert_eq!(
            ImageEncoding::from_content_type("IMAGE/JPEG; charset=binary"),
            Some(ImageEncoding::Jpeg)
        );
        assert_eq!(
            ImageEncoding::from_content_type("image/webp"),
            Some(ImageEncoding::WebP)
        );
        assert_eq!(ImageEncoding::from_content_type("image/gif"), None);
        assert_eq!(ImageEncoding::from_content_type("text/html"), None);
        assert_eq!(ImageEncoding::from_content_type(""), None);
    }

    #[test]
    fn opaque_png_has_no_alpha_plane() {
        let png = encode(&solid_rgb(10, 6), ImageFormat::Png);
        let raster = normalize_bytes(&png, ImageEncoding::Png, 240).unwrap();
        assert_eq!((raster.width, raster.height), (10, 6));
        match raster.pixels {
            RasterPixels::Rgb { rgb, alpha } => {
                assert_eq!(rgb.len(), 10 * 6 * 3);
                assert_eq!(&rgb[..3], &[200, 30, 30]);
                assert!(alpha.is_none());
            }
            other => panic!("expected RGB raster, got {other:?}"),
        }
    }

    #[test]
    fn translucent_png_keeps_alpha() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(4, 4, Rgba([0, 0, 255, 128])));
        let png = encode(&img, ImageFormat::Png);
        let raster = normalize_bytes(&png, ImageEncoding::Png, 240).unwrap();
        match raster.pixels {
            RasterPixels::Rgb { alpha: Some(alpha), .. } => {
                assert_eq!(alpha.len(), 16);
                assert!(alpha.iter().all(|&a| a == 128));
            }
            other => panic!("expected alpha plane, got {other:?}"),
        }
    }

    #[test]
    fn large_images_are_scaled_down() {
        let png = encode(&solid_rgb(800, 400), ImageFormat::Png);
        let raster = normalize_bytes(&png, ImageEncoding::Png, 240).unwrap();
        assert_eq!(raster.width, 240);
        assert_eq!(raster.height, 120);
    }

    #[test]
    fn webp_becomes_raw_rgb() {
        let webp = encode(&solid_rgb(12, 12), ImageFormat::WebP);
        let raster = normalize_bytes(&webp, ImageEncoding::WebP, 240).unwrap();
        assert_eq!((raster.width, raster.height), (12, 12));
        assert!(matches!(raster.pixels, RasterPixels::Rgb { .. }));
    }

    #[test]
    fn baseline_jpeg_passes_through() {
        let jpeg = encode(&solid_rgb(32, 16), ImageFormat::Jpeg);
        let frame = baseline_frame(&jpeg).expect("encoder writes baseline frames");
        assert_eq!((frame.width, frame.height, frame.components), (32, 16, 3));

        let raster = normalize_bytes(&jpeg, ImageEncoding::Jpeg, 240).unwrap();
        match raster.pixels {
            RasterPixels::Jpeg { data, components } => {
                assert_eq!(data, jpeg);
                assert_eq!(components, 3);
            }
            other => panic!("expected JPEG passthrough, got {other:?}"),
        }
    }

    #[test]
    fn oversized_jpeg_is_reencoded() {
        let img: RgbImage = ImageBuffer::from_fn(600, 300, |x, _| Rgb([(x % 256) as u8, 0, 0]));
        let jpeg = encode(&DynamicImage::ImageRgb8(img), ImageFormat::Jpeg);
        let raster = normalize_bytes(&jpeg, ImageEncoding::Jpeg, 240).unwrap();
        assert_eq!((raster.width, raster.height), (240, 120));
        match raster.pixels {
            RasterPixels::Jpeg { data, components } => {
                assert_ne!(data, jpeg);
                assert_eq!(components, 3);
                assert!(baseline_frame(&data).is_some());
            }
            other => panic!("expected JPEG, got {other:?}"),
        }
    }

    #[test]
    fn declared_type_must_match_bytes() {
        let png = encode(&solid_rgb(4, 4), ImageFormat::Png);
        assert!(normalize_bytes(&png, ImageEncoding::Jpeg, 240).is_err());
        assert!(normalize_bytes(b"not an image", ImageEncoding::Png, 240).is_err());
    }

    #[test]
    fn baseline_frame_rejects_progressive_and_garbage() {
        // SOI, then a progressive SOF2 header.
        let progressive = [
            0xFF, 0xD8, 0xFF, 0xC2, 0x00, 0x0B, 0x08, 0x00, 0x10, 0x00, 0x10, 0x03, 0x01, 0x11,
            0x00,
        ];
        assert_eq!(baseline_frame(&progressive), None);
        assert_eq!(baseline_frame(b"\x89PNG\r\n"), None);
        assert_eq!(baseline_frame(&[0xFF, 0xD8]), None);
    }
}
