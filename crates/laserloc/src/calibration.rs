//! Click-driven collection of pixel ↔ world correspondences.
//!
//! The session walks a fixed sequence of ground-plane targets. Each accepted
//! click pairs the clicked pixel with the next unvisited target; once every
//! target has a pixel, the homography is estimated and persisted, and the
//! session is done.

use image::RgbImage;

use crate::config::CalibrationConfig;
use crate::geometry::{PixelPoint, WorldPoint};
use crate::homography::{
    error_summary, Correspondences, Homography, HomographyError, HomographyStore, StoreError,
};

#[derive(Debug, thiserror::Error)]
pub enum CalibrationError {
    #[error("centerline lock needs the frame width, but no frame has been seen")]
    NoFrameYet,
    #[error("homography estimation failed: {0}")]
    Homography(#[from] HomographyError),
    #[error("could not persist homography: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationState {
    Collecting,
    /// Terminal.
    Done,
}

/// Result of feeding one click to the session.
#[derive(Debug, Clone, PartialEq)]
pub enum ClickOutcome {
    /// Pair recorded; more targets remain.
    Accepted {
        index: usize,
        pixel: PixelPoint,
        world: WorldPoint,
    },
    /// Final pair recorded; the homography was computed and saved.
    Completed(Homography),
    /// Session already done; click dropped.
    Ignored,
}

pub struct CalibrationSession {
    targets: Vec<WorldPoint>,
    centerline_lock: usize,
    display_scale: f64,
    collected: Correspondences,
    frame_size: Option<(u32, u32)>,
    homography: Option<Homography>,
    store: Box<dyn HomographyStore>,
}

impl CalibrationSession {
    pub fn new(config: &CalibrationConfig, store: Box<dyn HomographyStore>) -> Self {
        Self {
            targets: config.targets(),
            centerline_lock: config.centerline_lock,
            display_scale: config.display_scale,
            collected: Correspondences::new(),
            frame_size: None,
            homography: None,
            store,
        }
    }

    pub fn state(&self) -> CalibrationState {
        if self.homography.is_some() {
            CalibrationState::Done
        } else {
            CalibrationState::Collecting
        }
    }

    pub fn is_done(&self) -> bool {
        self.state() == CalibrationState::Done
    }

    /// The world point the operator should place the target on next.
    pub fn next_target(&self) -> Option<WorldPoint> {
        if self.is_done() {
            return None;
        }
        self.targets.get(self.collected.len()).copied()
    }

    pub fn target_count(&self) -> usize {
        self.targets.len()
    }

    pub fn correspondences(&self) -> &Correspondences {
        &self.collected
    }

    pub fn homography(&self) -> Option<&Homography> {
        self.homography.as_ref()
    }

    pub fn frame_size(&self) -> Option<(u32, u32)> {
        self.frame_size
    }

    /// Record the size of the frame the operator is looking at.
    pub fn handle_frame(&mut self, frame: &RgbImage) -> CalibrationState {
        if !self.is_done() {
            self.frame_size = Some(frame.dimensions());
        }
        self.state()
    }

    /// Pixel rows of the collected points the operator lines later targets up
    /// against: the second point once four are in, and the sixth once six are in.
    pub fn guide_rows(&self) -> Vec<f64> {
        let pts = self.collected.pixel_points();
        let mut rows = Vec::new();
        if pts.len() >= 4 {
            rows.push(pts[1].y);
        }
        if pts.len() >= 6 {
            rows.push(pts[5].y);
        }
        rows
    }

    /// Accept a click given in display coordinates.
    pub fn handle_click(&mut self, display: PixelPoint) -> Result<ClickOutcome, CalibrationError> {
        if self.is_done() {
            return Ok(ClickOutcome::Ignored);
        }
        let Some(world) = self.next_target() else {
            return Ok(ClickOutcome::Ignored);
        };

        let index = self.collected.len();
        let y = (display.y / self.display_scale).trunc();
        let x = if index < self.centerline_lock {
            let (w, _) = self.frame_size.ok_or(CalibrationError::NoFrameYet)?;
            (w / 2) as f64
        } else {
            (display.x / self.display_scale).trunc()
        };
        let pixel = PixelPoint::new(x, y);
        self.collected.push(pixel, world);
        tracing::info!(
            "Calibration point {}/{}: pixel {} -> world {}",
            index + 1,
            self.targets.len(),
            pixel,
            world
        );

        if self.collected.len() < self.targets.len() {
            return Ok(ClickOutcome::Accepted {
                index,
                pixel,
                world,
            });
        }

        let h = self.finish()?;
        Ok(ClickOutcome::Completed(h))
    }

    fn finish(&mut self) -> Result<Homography, CalibrationError> {
        let h = match self.fit_and_save() {
            Ok(h) => h,
            Err(e) => {
                // Drop the last pair so the operator can redo that click.
                let keep = self.collected.len() - 1;
                self.collected = truncated(&self.collected, keep);
                tracing::warn!("Calibration failed, repeat point {}: {}", keep + 1, e);
                return Err(e);
            }
        };
        if let Some((mean, max)) = error_summary(&self.collected.reprojection_errors(&h)) {
            tracing::info!(
                "Calibration done: reprojection error mean={:.4} max={:.4}",
                mean,
                max
            );
        }
        tracing::debug!("Homography: {:?}", h.to_rows());
        self.homography = Some(h.clone());
        Ok(h)
    }

    fn fit_and_save(&self) -> Result<Homography, CalibrationError> {
        let h = self.collected.estimate()?;
        self.store.save(&h)?;
        Ok(h)
    }
}

fn truncated(c: &Correspondences, len: usize) -> Correspondences {
    let mut out = Correspondences::new();
    for (p, w) in c.iter().take(len) {
        out.push(p, w);
    }
    out
}
