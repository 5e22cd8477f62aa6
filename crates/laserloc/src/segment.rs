//! Color-band segmentation of a frame into a binary mask.

use image::{GrayImage, ImageBuffer, Luma, Pixel};

/// Foreground value in every mask produced by this crate.
pub const FOREGROUND: u8 = 255;
/// Background value in every mask produced by this crate.
pub const BACKGROUND: u8 = 0;

/// Per-channel inclusive bounds `[target - tol, target + tol]` clamped to 0..=255.
fn channel_bounds(target: &[u8], tolerance: u8) -> Vec<(u8, u8)> {
    target
        .iter()
        .map(|&t| {
            let lo = (t as i32 - tolerance as i32).clamp(0, 255) as u8;
            let hi = (t as i32 + tolerance as i32).clamp(0, 255) as u8;
            (lo, hi)
        })
        .collect()
}

/// Mark every pixel whose channels all lie within `tolerance` of `target`.
///
/// Works for any 8-bit pixel layout; `target` must use the same channel
/// order as `frame`, whatever that is. Output is 255 for matches and 0
/// elsewhere.
pub fn segment<P>(frame: &ImageBuffer<P, Vec<u8>>, target: P, tolerance: u8) -> GrayImage
where
    P: Pixel<Subpixel = u8>,
{
    let bounds = channel_bounds(target.channels(), tolerance);
    let (w, h) = frame.dimensions();
    let mut mask = GrayImage::new(w, h);
    for (x, y, px) in frame.enumerate_pixels() {
        let inside = px
            .channels()
            .iter()
            .zip(&bounds)
            .all(|(&v, &(lo, hi))| v >= lo && v <= hi);
        if inside {
            mask.put_pixel(x, y, Luma([FOREGROUND]));
        }
    }
    mask
}

/// True if every pixel is exactly 0 or 255.
pub fn is_binary(mask: &GrayImage) -> bool {
    mask.as_raw()
        .iter()
        .all(|&v| v == BACKGROUND || v == FOREGROUND)
}
