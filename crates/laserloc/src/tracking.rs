//! Per-frame target localization and the tracking session state machine.
//!
//! Pipeline per frame:
//!
//! 1. **Segment** – color band → binary mask.
//! 2. **Close** – dilate + erode to fill holes inside the spot.
//! 3. **Shape** – drop components whose bounding box is not roughly square.
//! 4. **Largest** – keep the biggest surviving component.
//! 5. **Centroid** – contour moments → pixel centre.
//! 6. **Project** – homography → world point, pushed into the sample window.
//!
//! The session settles once the window is full of mutually close detections.

use std::time::{Duration, Instant};

use image::{GrayImage, Rgb, RgbImage};

use crate::centroid::find_center;
use crate::config::TrackerConfig;
use crate::geometry::{PixelPoint, WorldPoint};
use crate::homography::{Homography, HomographyStore, StoreError};
use crate::ring_buffer::SampleBuffer;
use crate::segment::segment;
use crate::shape_filter::{close_gaps, filter_by_aspect_ratio, keep_largest_component};

/// Output of the per-frame pipeline.
#[derive(Debug, Clone)]
pub struct Detection {
    /// Final single-blob mask the centre was taken from.
    pub mask: GrayImage,
    pub center: Option<PixelPoint>,
}

/// Run the pixel-space pipeline on one frame.
pub fn detect_target(frame: &RgbImage, config: &TrackerConfig) -> Detection {
    let mask = segment(frame, Rgb(config.target_color), config.color_tolerance);
    let mask = close_gaps(&mask, config.close_kernel_size);
    let mask = filter_by_aspect_ratio(&mask, config.aspect_ratio_range);
    let mask = keep_largest_component(&mask);
    let center = find_center(&mask);
    Detection { mask, center }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackingState {
    Active,
    /// Terminal: the window is full and mutually within tolerance.
    Stable,
}

/// What the last processed frame produced, for display and diagnostics.
#[derive(Debug, Clone)]
pub struct Observation {
    pub pixel: Option<PixelPoint>,
    pub world: Option<WorldPoint>,
    pub mask: GrayImage,
    pub elapsed: Duration,
}

/// Frame-driven tracking against a fixed homography.
pub struct TrackingSession {
    config: TrackerConfig,
    homography: Homography,
    samples: SampleBuffer,
    state: TrackingState,
    frames_seen: u64,
    last: Option<Observation>,
}

impl TrackingSession {
    pub fn new(config: TrackerConfig, homography: Homography) -> Self {
        Self {
            config,
            homography,
            samples: SampleBuffer::default(),
            state: TrackingState::Active,
            frames_seen: 0,
            last: None,
        }
    }

    /// Build a session from the persisted homography.
    ///
    /// Load failures are returned as-is; falling back to calibration is the
    /// caller's decision.
    pub fn from_store(
        config: TrackerConfig,
        store: &dyn HomographyStore,
    ) -> Result<Self, StoreError> {
        let homography = store.load().map_err(|e| {
            tracing::warn!("Failed to load homography: {}", e);
            e
        })?;
        Ok(Self::new(config, homography))
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn homography(&self) -> &Homography {
        &self.homography
    }

    pub fn state(&self) -> TrackingState {
        self.state
    }

    pub fn is_stable(&self) -> bool {
        self.state == TrackingState::Stable
    }

    pub fn samples(&self) -> &SampleBuffer {
        &self.samples
    }

    pub fn frames_seen(&self) -> u64 {
        self.frames_seen
    }

    pub fn last_observation(&self) -> Option<&Observation> {
        self.last.as_ref()
    }

    /// Current estimate: mean of the buffered detections.
    pub fn target_location(&self) -> Option<WorldPoint> {
        self.samples.average()
    }

    /// Process one frame. Frames arriving after the session settled are ignored.
    pub fn handle_frame(&mut self, frame: &RgbImage) -> TrackingState {
        if self.state == TrackingState::Stable {
            return self.state;
        }
        let start = Instant::now();
        self.frames_seen += 1;

        let Detection { mask, center } = detect_target(frame, &self.config);
        // A missed detection never goes through the transform.
        let world = center.and_then(|c| self.homography.pixel_to_world(c));
        if center.is_some() && world.is_none() {
            tracing::warn!("Pixel centre {:?} projects to infinity", center);
        }
        self.samples.add(world);

        let [tx, ty] = self.config.stability_tolerance;
        if !self.config.debug && self.samples.all_within_tolerance(tx, ty) {
            self.state = TrackingState::Stable;
            tracing::info!(
                "Target stable after {} frames at {:?}",
                self.frames_seen,
                self.samples.average()
            );
        }

        let elapsed = start.elapsed();
        if self.config.debug {
            tracing::debug!(
                "frame {} took {} ms, pixel centre {:?}, world centre {:?}",
                self.frames_seen,
                elapsed.as_millis(),
                center,
                world
            );
        }
        self.last = Some(Observation {
            pixel: center,
            world,
            mask,
            elapsed,
        });
        self.state
    }
}
