//! Morphological gap closing and connected-component shape filtering.
//!
//! All stages are pure functions from a binary mask to a new binary mask.

use image::{GrayImage, Luma};
use imageproc::distance_transform::Norm;
use imageproc::morphology::{dilate, erode};
use imageproc::region_labelling::{connected_components, Connectivity};

use crate::segment::{BACKGROUND, FOREGROUND};

/// Bounding box and pixel count of one 8-connected foreground region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Component {
    /// Label in the labelling image (1-based; 0 is background).
    pub label: u32,
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    /// Number of pixels in the region.
    pub area: u32,
}

impl Component {
    /// Bounding-box width over height, 0 for a zero-height box.
    pub fn aspect_ratio(&self) -> f64 {
        if self.height == 0 {
            0.0
        } else {
            self.width as f64 / self.height as f64
        }
    }
}

/// Labelled components of a mask, in label order.
pub struct Components {
    labels: image::ImageBuffer<Luma<u32>, Vec<u32>>,
    stats: Vec<Component>,
}

impl Components {
    pub fn stats(&self) -> &[Component] {
        &self.stats
    }

    pub fn len(&self) -> usize {
        self.stats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stats.is_empty()
    }

    /// Mask containing only the pixels of components that pass `keep`.
    fn retain_mask(&self, mut keep: impl FnMut(&Component) -> bool) -> GrayImage {
        let (w, h) = self.labels.dimensions();
        let max_label = self.stats.iter().map(|c| c.label).max().unwrap_or(0);
        let mut lut = vec![false; max_label as usize + 1];
        for c in &self.stats {
            lut[c.label as usize] = keep(c);
        }
        let mut out = GrayImage::new(w, h);
        for (dst, &label) in out.iter_mut().zip(self.labels.iter()) {
            if label != 0 && lut.get(label as usize).copied().unwrap_or(false) {
                *dst = FOREGROUND;
            }
        }
        out
    }
}

/// Label 8-connected foreground regions and compute their statistics.
pub fn label_components(mask: &GrayImage) -> Components {
    let labels = connected_components(mask, Connectivity::Eight, Luma([BACKGROUND]));
    let (w, _) = labels.dimensions();

    // [min_x, min_y, max_x, max_y, area] per label
    let mut acc: Vec<[u32; 5]> = Vec::new();
    for (i, &label) in labels.iter().enumerate() {
        if label == 0 {
            continue;
        }
        let idx = label as usize - 1;
        if idx >= acc.len() {
            acc.resize(idx + 1, [u32::MAX, u32::MAX, 0, 0, 0]);
        }
        let x = i as u32 % w;
        let y = i as u32 / w;
        let a = &mut acc[idx];
        a[0] = a[0].min(x);
        a[1] = a[1].min(y);
        a[2] = a[2].max(x);
        a[3] = a[3].max(y);
        a[4] += 1;
    }

    let stats = acc
        .iter()
        .enumerate()
        .filter(|(_, a)| a[4] > 0)
        .map(|(i, a)| Component {
            label: i as u32 + 1,
            x: a[0],
            y: a[1],
            width: a[2] - a[0] + 1,
            height: a[3] - a[1] + 1,
            area: a[4],
        })
        .collect();

    Components { labels, stats }
}

/// Morphological closing (dilate, then erode) with a square structuring element.
///
/// `kernel_size` is the side length; an even size behaves like the next odd
/// one and sizes ≤ 1 return the mask unchanged.
pub fn close_gaps(mask: &GrayImage, kernel_size: u32) -> GrayImage {
    let radius = (kernel_size / 2).min(u8::MAX as u32) as u8;
    if radius == 0 {
        return mask.clone();
    }
    let dilated = dilate(mask, Norm::LInf, radius);
    erode(&dilated, Norm::LInf, radius)
}

/// Keep only components whose bounding-box aspect ratio lies in `range` (inclusive).
pub fn filter_by_aspect_ratio(mask: &GrayImage, range: [f64; 2]) -> GrayImage {
    let components = label_components(mask);
    components.retain_mask(|c| {
        let ratio = c.aspect_ratio();
        let keep = ratio >= range[0] && ratio <= range[1];
        tracing::trace!(
            "component {} at ({}, {}) {}x{} ratio={:.2} keep={}",
            c.label,
            c.x,
            c.y,
            c.width,
            c.height,
            ratio,
            keep
        );
        keep
    })
}

/// Keep only the component with the largest pixel area.
///
/// Ties go to the lowest label (first in raster order). A mask without
/// foreground is returned unchanged.
pub fn keep_largest_component(mask: &GrayImage) -> GrayImage {
    let components = label_components(mask);
    let mut best: Option<Component> = None;
    for c in components.stats() {
        if best.map_or(true, |b| c.area > b.area) {
            best = Some(*c);
        }
    }
    match best {
        Some(largest) => components.retain_mask(|c| c.label == largest.label),
        None => mask.clone(),
    }
}
