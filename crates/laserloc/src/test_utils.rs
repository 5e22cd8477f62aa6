//! Synthetic frames and masks for image-based unit tests.

use image::{GrayImage, Luma, Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_filled_rect_mut};
use imageproc::rect::Rect;

use crate::segment::FOREGROUND;

/// Set a `w`×`h` block starting at (`x`, `y`) to foreground.
pub(crate) fn fill_rect(mask: &mut GrayImage, x: i32, y: i32, w: u32, h: u32) {
    draw_filled_rect_mut(mask, Rect::at(x, y).of_size(w, h), Luma([FOREGROUND]));
}

/// Set a disc of radius `r` centred at (`cx`, `cy`) to foreground.
pub(crate) fn fill_disc(mask: &mut GrayImage, cx: i32, cy: i32, r: i32) {
    draw_filled_circle_mut(mask, (cx, cy), r, Luma([FOREGROUND]));
}

pub(crate) fn foreground_count(mask: &GrayImage) -> usize {
    mask.as_raw().iter().filter(|&&v| v == FOREGROUND).count()
}

/// Frame of `bg` color with a filled square of `color`, side `side`, whose
/// centre pixel is (`cx`, `cy`). `side` should be odd for an exact centre.
pub(crate) fn frame_with_square(
    w: u32,
    h: u32,
    bg: [u8; 3],
    color: [u8; 3],
    cx: i32,
    cy: i32,
    side: u32,
) -> RgbImage {
    let mut frame = RgbImage::from_pixel(w, h, Rgb(bg));
    let half = (side / 2) as i32;
    draw_filled_rect_mut(
        &mut frame,
        Rect::at(cx - half, cy - half).of_size(side, side),
        Rgb(color),
    );
    frame
}

/// Frame of `bg` color with a filled disc of `color`.
pub(crate) fn frame_with_disc(
    w: u32,
    h: u32,
    bg: [u8; 3],
    color: [u8; 3],
    cx: i32,
    cy: i32,
    r: i32,
) -> RgbImage {
    let mut frame = RgbImage::from_pixel(w, h, Rgb(bg));
    draw_filled_circle_mut(&mut frame, (cx, cy), r, Rgb(color));
    frame
}
