//! World-space verification grid projected back into the image.
//!
//! After calibration the operator checks the result by overlaying a regular
//! ground-plane grid on the camera frame; straight, evenly converging lines
//! indicate a sane homography.

use crate::geometry::{PixelPoint, WorldPoint};

use super::core::Homography;

/// World-space grid extent (inclusive) and spacing.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct GridSpec {
    pub x_range: [f64; 2],
    pub y_range: [f64; 2],
    pub step: f64,
}

impl Default for GridSpec {
    fn default() -> Self {
        Self {
            x_range: [-40.0, 40.0],
            y_range: [20.0, 100.0],
            step: 10.0,
        }
    }
}

/// Upper bound on grid lines per axis.
pub const MAX_AXIS_NODES: usize = 1000;

impl GridSpec {
    /// Evenly spaced values across `range`; empty when the range or step is
    /// unusable or the axis would exceed [`MAX_AXIS_NODES`].
    fn axis(range: [f64; 2], step: f64) -> Vec<f64> {
        let [lo, hi] = range;
        if !(step.is_finite() && step > 0.0) || !lo.is_finite() || !hi.is_finite() || hi < lo {
            return Vec::new();
        }
        let intervals = ((hi - lo) / step + 1e-9).floor();
        if intervals >= MAX_AXIS_NODES as f64 {
            tracing::warn!(
                "Grid axis [{}, {}] with step {} needs more than {} nodes, skipping",
                lo,
                hi,
                step,
                MAX_AXIS_NODES
            );
            return Vec::new();
        }
        (0..=intervals as usize).map(|i| lo + i as f64 * step).collect()
    }

    pub fn xs(&self) -> Vec<f64> {
        Self::axis(self.x_range, self.step)
    }

    pub fn ys(&self) -> Vec<f64> {
        Self::axis(self.y_range, self.step)
    }
}

/// Grid nodes and lines in pixel coordinates.
#[derive(Debug, Clone, Default)]
pub struct GridOverlay {
    /// Projected grid nodes (nodes that project to infinity are skipped).
    pub nodes: Vec<PixelPoint>,
    /// One polyline per constant-x world line, ordered by y.
    pub columns: Vec<Vec<PixelPoint>>,
    /// One polyline per constant-y world line, ordered by x.
    pub rows: Vec<Vec<PixelPoint>>,
}

impl GridOverlay {
    /// All line segments of the overlay as pixel endpoint pairs.
    pub fn segments(&self) -> impl Iterator<Item = (PixelPoint, PixelPoint)> + '_ {
        self.columns
            .iter()
            .chain(self.rows.iter())
            .flat_map(|line| line.windows(2).map(|w| (w[0], w[1])))
    }
}

pub fn verification_grid(h: &Homography, spec: &GridSpec) -> GridOverlay {
    let xs = spec.xs();
    let ys = spec.ys();
    let project = |x: f64, y: f64| h.world_to_pixel(WorldPoint::new(x, y));

    let nodes = xs
        .iter()
        .flat_map(|&x| ys.iter().map(move |&y| (x, y)))
        .filter_map(|(x, y)| project(x, y))
        .collect();
    let columns = xs
        .iter()
        .map(|&x| ys.iter().filter_map(|&y| project(x, y)).collect())
        .collect();
    let rows = ys
        .iter()
        .map(|&y| xs.iter().filter_map(|&x| project(x, y)).collect())
        .collect();

    GridOverlay {
        nodes,
        columns,
        rows,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn default_axes_span_calibration_area() {
        let spec = GridSpec::default();
        assert_eq!(spec.xs().len(), 9);
        assert_eq!(spec.ys().len(), 9);
        assert_eq!(spec.xs().first(), Some(&-40.0));
        assert_eq!(spec.ys().last(), Some(&100.0));
    }

    #[test]
    fn degenerate_step_yields_empty_axes() {
        let spec = GridSpec {
            step: 0.0,
            ..GridSpec::default()
        };
        assert!(spec.xs().is_empty());
        let overlay = verification_grid(&Homography::identity(), &spec);
        assert!(overlay.nodes.is_empty());
        assert_eq!(overlay.segments().count(), 0);
    }

    #[test]
    fn tiny_step_is_bounded() {
        let spec = GridSpec {
            step: 1e-12,
            ..GridSpec::default()
        };
        assert!(spec.xs().is_empty());
        assert!(spec.ys().is_empty());
        let overlay = verification_grid(&Homography::identity(), &spec);
        assert!(overlay.nodes.is_empty());

        let spec = GridSpec {
            x_range: [0.0, f64::INFINITY],
            ..GridSpec::default()
        };
        assert!(spec.xs().is_empty());

        // Exactly at the cap is still drawn.
        let spec = GridSpec {
            x_range: [0.0, (MAX_AXIS_NODES - 1) as f64],
            step: 1.0,
            ..GridSpec::default()
        };
        assert_eq!(spec.xs().len(), MAX_AXIS_NODES);
    }

    #[test]
    fn overlay_nodes_map_back_to_world_grid() {
        // pixel = 2 * world + (320, 0) after inversion
        let h = Homography::from_rows([[0.5, 0.0, -160.0], [0.0, 0.5, 0.0], [0.0, 0.0, 1.0]])
            .unwrap();
        let spec = GridSpec {
            x_range: [-10.0, 10.0],
            y_range: [0.0, 20.0],
            step: 10.0,
        };
        let overlay = verification_grid(&h, &spec);
        assert_eq!(overlay.nodes.len(), 9);
        assert_eq!(overlay.columns.len(), 3);
        assert_eq!(overlay.rows.len(), 3);
        // 3 lines of 2 segments each, in both directions
        assert_eq!(overlay.segments().count(), 12);

        let first = overlay.nodes[0];
        assert_relative_eq!(first.x, 300.0, epsilon = 1e-9);
        assert_relative_eq!(first.y, 0.0, epsilon = 1e-9);
        for node in &overlay.nodes {
            let w = h.pixel_to_world(*node).unwrap();
            assert_relative_eq!(w.x / 10.0, (w.x / 10.0).round(), epsilon = 1e-9);
            assert_relative_eq!(w.y / 10.0, (w.y / 10.0).round(), epsilon = 1e-9);
        }
    }
}
