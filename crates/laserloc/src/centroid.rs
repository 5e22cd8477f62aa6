//! Contour-moment centroid of the dominant blob in a binary mask.

use image::{DynamicImage, GrayImage};
use imageproc::contours::{find_contours, BorderType, Contour};

use crate::geometry::PixelPoint;
use crate::segment::is_binary;

/// Polygon moments (m00, m10, m01) via Green's theorem, kept as exact
/// integer sums: `2·m00`, `6·m10`, `6·m01`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct ContourMoments {
    twice_area: i64,
    sum_x: i64,
    sum_y: i64,
}

impl ContourMoments {
    fn of(points: &[imageproc::point::Point<i32>]) -> Self {
        let n = points.len();
        let mut m = Self::default();
        if n < 3 {
            return m;
        }
        for i in 0..n {
            let p = points[i];
            let q = points[(i + 1) % n];
            let (x0, y0, x1, y1) = (p.x as i64, p.y as i64, q.x as i64, q.y as i64);
            let cross = x0 * y1 - x1 * y0;
            m.twice_area += cross;
            m.sum_x += (x0 + x1) * cross;
            m.sum_y += (y0 + y1) * cross;
        }
        m
    }

    /// Unsigned enclosed area.
    fn area(&self) -> f64 {
        self.twice_area.unsigned_abs() as f64 / 2.0
    }

    /// `(m10/m00, m01/m00)`, or `None` for a zero-area contour.
    fn centroid(&self) -> Option<[f64; 2]> {
        if self.twice_area == 0 {
            return None;
        }
        // m10/m00 = (sum_x/6) / (twice_area/2) = sum_x / (3·twice_area)
        let denom = 3.0 * self.twice_area as f64;
        Some([self.sum_x as f64 / denom, self.sum_y as f64 / denom])
    }
}

/// Outer borders that are not nested inside another blob's hole.
fn external_contours(mask: &GrayImage) -> Vec<Contour<i32>> {
    find_contours::<i32>(mask)
        .into_iter()
        .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
        .collect()
}

/// Centroid of the largest external contour, truncated to whole pixels.
///
/// Returns `None` if the mask has values other than 0 and 255, has no
/// contours, or its largest contour encloses zero area.
pub fn find_center(mask: &GrayImage) -> Option<PixelPoint> {
    let (w, h) = mask.dimensions();
    if w == 0 || h == 0 {
        tracing::warn!("centroid: mask is empty");
        return None;
    }
    if !is_binary(mask) {
        tracing::warn!("centroid: mask must be binary (only 0 and 255 allowed)");
        return None;
    }

    let contours = external_contours(mask);
    if contours.is_empty() {
        return None;
    }

    // First contour unless a later one has strictly larger area.
    let mut best = ContourMoments::of(&contours[0].points);
    for c in &contours[1..] {
        let m = ContourMoments::of(&c.points);
        if m.area() > best.area() {
            best = m;
        }
    }

    let [cx, cy] = best.centroid()?;
    Some(PixelPoint::new(cx.trunc(), cy.trunc()))
}

/// [`find_center`] for an image of unknown layout; anything but 8-bit
/// single-channel yields `None`.
pub fn find_center_dynamic(image: &DynamicImage) -> Option<PixelPoint> {
    match image {
        DynamicImage::ImageLuma8(mask) => find_center(mask),
        other => {
            tracing::warn!(
                "centroid: mask must be 8-bit single channel, got {:?}",
                other.color()
            );
            None
        }
    }
}
