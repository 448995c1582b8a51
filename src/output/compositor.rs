//! CPU compositing of filter results over the captured frame.

use crate::frame::{BgraFrame, Mask};
use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use std::borrow::Cow;

/// Scale `mask` to `size` unless it already matches. A published mask may
/// lag one resolution change behind the capture.
fn fit_mask(mask: &Mask, size: (u32, u32)) -> Cow<'_, Mask> {
    if mask.dimensions() == size {
        Cow::Borrowed(mask)
    } else {
        Cow::Owned(imageops::resize(mask, size.0, size.1, FilterType::Triangle))
    }
}

fn mix(a: u8, b: u8, weight_b: u32) -> u8 {
    ((a as u32 * (255 - weight_b) + b as u32 * weight_b + 127) / 255) as u8
}

/// Replace the background with a solid colour. The mask is the background
/// alpha: 255 shows `color`, 0 shows the frame.
pub fn composite_background(frame: &BgraFrame, mask: &Mask, color: [u8; 3]) -> RgbImage {
    let (width, height) = frame.dimensions();
    let alpha = fit_mask(mask, (width, height));
    RgbImage::from_fn(width, height, |x, y| {
        let [b, g, r, _] = frame.pixel(x, y);
        let a = alpha.get_pixel(x, y)[0] as u32;
        Rgb([mix(r, color[0], a), mix(g, color[1], a), mix(b, color[2], a)])
    })
}

/// The mask as a grayscale picture at frame size, foreground white.
pub fn mask_view(mask: &Mask, size: (u32, u32)) -> RgbImage {
    let mask = fit_mask(mask, size);
    RgbImage::from_fn(size.0, size.1, |x, y| {
        let v = 255 - mask.get_pixel(x, y)[0];
        Rgb([v, v, v])
    })
}

/// `frame * (1 - blend) + enhanced * blend`. Falls back to the plain frame
/// when the enhanced frame has a different size.
pub fn blend_enhanced(frame: &BgraFrame, enhanced: &BgraFrame, blend: f32) -> RgbImage {
    if enhanced.dimensions() != frame.dimensions() {
        return frame.to_rgb();
    }
    let weight = (blend.clamp(0.0, 1.0) * 255.0).round() as u32;
    RgbImage::from_fn(frame.width(), frame.height(), |x, y| {
        let [b0, g0, r0, _] = frame.pixel(x, y);
        let [b1, g1, r1, _] = enhanced.pixel(x, y);
        Rgb([mix(r0, r1, weight), mix(g0, g1, weight), mix(b0, b1, weight)])
    })
}

/// Parse `RRGGBB` or `#RRGGBB`.
pub fn parse_hex_color(text: &str) -> Result<[u8; 3], String> {
    let hex = text.trim().trim_start_matches('#');
    if hex.len() != 6 || !hex.is_ascii() {
        return Err(format!("expected a colour like 00ff00, got {:?}", text));
    }
    let channel = |i: usize| {
        u8::from_str_radix(&hex[i..i + 2], 16)
            .map_err(|_| format!("invalid hex digits in colour {:?}", text))
    };
    Ok([channel(0)?, channel(2)?, channel(4)?])
}
