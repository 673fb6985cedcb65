//! QR block: payload string → grayscale raster.
//!
//! Encoding is deterministic: the same payload always yields the same module
//! grid and therefore byte-identical pixels. Error correction level M
//! survives print and screen reproduction comfortably.

use crate::error::InvoiceError;
use crate::pipeline::normalize::{RasterImage, RasterPixels};
use qrcode::{Color, EcLevel, QrCode};

/// Light modules kept around the symbol; scanners need at least four.
pub const QUIET_ZONE: usize = 4;

/// Pixels per module in the raster. The PDF scales it to the block size.
const MODULE_PX: usize = 4;

const DARK: u8 = 0x00;
const LIGHT: u8 = 0xFF;

/// Encode `payload` as a QR symbol with a quiet zone.
///
/// Fails only when the payload exceeds QR capacity; the caller must treat
/// that as fatal since the QR block is mandatory.
pub fn encode_qr(payload: &str) -> Result<RasterImage, InvoiceError> {
    let code = QrCode::with_error_correction_level(payload.as_bytes(), EcLevel::M).map_err(|e| {
        InvoiceError::QrEncodingFailed {
            payload: payload.to_string(),
            detail: e.to_string(),
        }
    })?;

    let modules = code.width();
    let colors = code.to_colors();
    let side = (modules + 2 * QUIET_ZONE) * MODULE_PX;
    let mut pixels = vec![LIGHT; side * side];

    for (i, color) in colors.iter().enumerate() {
        if *color != Color::Dark {
            continue;
        }
        let x0 = (i % modules + QUIET_ZONE) * MODULE_PX;
        let y0 = (i / modules + QUIET_ZONE) * MODULE_PX;
        for y in y0..y0 + MODULE_PX {
            let row = y * side;
            pixels[row + x0..row + x0 + MODULE_PX].fill(DARK);
        }
    }

    Ok(RasterImage {
        width: side as u32,
        height: side as u32,
        pixels: RasterPixels::Gray(pixels),
    })
}
