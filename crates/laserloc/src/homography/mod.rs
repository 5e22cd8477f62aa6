//! Homography estimation, projection, persistence, and overlay helpers.

mod core;
mod correspondence;
mod grid;
mod store;

pub use self::core::{estimate_homography, Homography, HomographyError, MIN_CORRESPONDENCES};
pub use correspondence::{error_summary, Correspondences};
pub use grid::{verification_grid, GridOverlay, GridSpec, MAX_AXIS_NODES};
pub use store::{
    homography_from_json, homography_to_json, HomographyStore, JsonFileStore, MemoryStore,
    StoreError,
};
