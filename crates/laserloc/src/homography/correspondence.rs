//! Ordered pixel ↔ world correspondence collection.

use crate::geometry::{PixelPoint, WorldPoint};

use super::core::{estimate_homography, Homography, HomographyError, MIN_CORRESPONDENCES};

/// Index-aligned pixel and world point lists.
///
/// Both lists always have the same length; entry `i` of one pairs with entry
/// `i` of the other.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "CorrespondenceLists")]
pub struct Correspondences {
    pixel: Vec<PixelPoint>,
    world: Vec<WorldPoint>,
}

/// Serialized form, checked for equal lengths before use.
#[derive(serde::Deserialize)]
struct CorrespondenceLists {
    pixel: Vec<PixelPoint>,
    world: Vec<WorldPoint>,
}

impl TryFrom<CorrespondenceLists> for Correspondences {
    type Error = String;

    fn try_from(lists: CorrespondenceLists) -> Result<Self, Self::Error> {
        if lists.pixel.len() != lists.world.len() {
            return Err(format!(
                "{} pixel points but {} world points",
                lists.pixel.len(),
                lists.world.len()
            ));
        }
        Ok(Self {
            pixel: lists.pixel,
            world: lists.world,
        })
    }
}

impl Correspondences {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, pixel: PixelPoint, world: WorldPoint) {
        self.pixel.push(pixel);
        self.world.push(world);
    }

    pub fn len(&self) -> usize {
        self.pixel.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pixel.is_empty()
    }

    /// True once enough pairs are held to fit a homography.
    pub fn is_sufficient(&self) -> bool {
        self.len() >= MIN_CORRESPONDENCES
    }

    pub fn pixel_points(&self) -> &[PixelPoint] {
        &self.pixel
    }

    pub fn world_points(&self) -> &[WorldPoint] {
        &self.world
    }

    pub fn iter(&self) -> impl Iterator<Item = (PixelPoint, WorldPoint)> + '_ {
        self.pixel.iter().copied().zip(self.world.iter().copied())
    }

    pub fn estimate(&self) -> Result<Homography, HomographyError> {
        estimate_homography(&self.pixel, &self.world)
    }

    /// Per-pair reprojection errors in world units.
    pub fn reprojection_errors(&self, h: &Homography) -> Vec<f64> {
        self.iter()
            .map(|(p, w)| h.reprojection_error(p, w))
            .collect()
    }
}

/// Mean and maximum over the finite entries of an error list.
pub fn error_summary(errors: &[f64]) -> Option<(f64, f64)> {
    let mut sum = 0.0f64;
    let mut max = 0.0f64;
    let mut n = 0usize;
    for &err in errors {
        if err.is_finite() {
            sum += err;
            max = max.max(err);
            n += 1;
        }
    }
    if n == 0 {
        None
    } else {
        Some((sum / n as f64, max))
    }
}
