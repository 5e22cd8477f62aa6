//! laserloc — locate a colored target on a calibrated ground plane from a
//! fixed camera.
//!
//! A one-time calibration pairs operator clicks with known ground points and
//! fits a pixel → world homography. Tracking then runs per frame:
//!
//! 1. **Segment** – per-channel color band → binary mask.
//! 2. **Shape** – morphological closing, bounding-box aspect filter, and
//!    largest-component selection.
//! 3. **Centroid** – contour moments of the surviving blob.
//! 4. **Project** – homography → world point.
//! 5. **Stabilize** – a short window of world points; the target is located
//!    once every pair in the full window agrees within tolerance.
//!
//! # Public API
//! - [`Locator`] drives the whole flow from a [`FrameReceiver`] and a click
//!   channel.
//! - [`CalibrationSession`] and [`TrackingSession`] are the two frame-driven
//!   state machines it switches between; both can be used directly.
//! - [`detect_target`] and the stage functions are pure and usable on their own.
//! - [`HomographyStore`] abstracts where the calibration result is kept.

mod calibration;
mod centroid;
mod config;
mod frame_slot;
mod geometry;
mod homography;
mod locator;
mod ring_buffer;
mod segment;
mod shape_filter;
mod tracking;

#[cfg(test)]
mod test_utils;

pub use calibration::{CalibrationError, CalibrationSession, CalibrationState, ClickOutcome};
pub use centroid::{find_center, find_center_dynamic};
pub use config::{CalibrationConfig, ConfigError, LocatorConfig, TrackerConfig};
pub use frame_slot::{latest_frame_slot, FrameReceiver, FrameSender, RecvError};
pub use geometry::{PixelPoint, WorldPoint};
pub use homography::{
    error_summary, estimate_homography, homography_from_json, homography_to_json,
    verification_grid, Correspondences, GridOverlay, GridSpec, Homography, HomographyError,
    HomographyStore, JsonFileStore, MemoryStore, StoreError, MAX_AXIS_NODES, MIN_CORRESPONDENCES,
};
pub use locator::{LocateError, Locator, Mode, Stage};
pub use ring_buffer::{SampleBuffer, SampleIndexError, SAMPLE_CAPACITY};
pub use segment::{is_binary, segment, BACKGROUND, FOREGROUND};
pub use shape_filter::{
    close_gaps, filter_by_aspect_ratio, keep_largest_component, label_components, Component,
    Components,
};
pub use tracking::{detect_target, Detection, Observation, TrackingSession, TrackingState};
