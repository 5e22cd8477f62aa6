//! Pixel-to-ground-plane homography estimation via DLT with Hartley normalization.

use nalgebra::{DMatrix, Matrix3, Vector3};

use crate::geometry::{PixelPoint, WorldPoint};

/// Minimum number of correspondences for a homography.
pub const MIN_CORRESPONDENCES: usize = 4;

/// Homogeneous scale below which a projection is treated as a point at infinity.
const W_EPS: f64 = 1e-12;

/// Absolute determinant below which a matrix is treated as singular.
const DET_EPS: f64 = 1e-12;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum HomographyError {
    #[error("too few points: need {needed}, got {got}")]
    TooFewPoints { needed: usize, got: usize },
    #[error("pixel and world point lists differ in length ({pixel} vs {world})")]
    LengthMismatch { pixel: usize, world: usize },
    #[error("numerical failure: {0}")]
    NumericalFailure(String),
    #[error("homography is not invertible")]
    NotInvertible,
}

/// Project a 2D point through a 3×3 matrix: H * [x, y, 1]^T → [u, v].
///
/// Returns `None` when the homogeneous scale vanishes.
pub(crate) fn project(h: &Matrix3<f64>, x: f64, y: f64) -> Option<[f64; 2]> {
    let p = h * Vector3::new(x, y, 1.0);
    if p[2].abs() < W_EPS {
        return None;
    }
    Some([p[0] / p[2], p[1] / p[2]])
}

/// An invertible pixel → world projective transform.
///
/// Immutable once built; the inverse is computed once at construction and
/// only used for overlay rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct Homography {
    forward: Matrix3<f64>,
    inverse: Matrix3<f64>,
}

impl Homography {
    /// Wrap a pixel → world matrix, rejecting singular or non-finite input.
    pub fn new(forward: Matrix3<f64>) -> Result<Self, HomographyError> {
        if forward.iter().any(|v| !v.is_finite()) {
            return Err(HomographyError::NumericalFailure(
                "matrix has non-finite entries".into(),
            ));
        }
        let det = forward.determinant();
        if !det.is_finite() || det.abs() < DET_EPS {
            return Err(HomographyError::NotInvertible);
        }
        let inverse = forward
            .try_inverse()
            .ok_or(HomographyError::NotInvertible)?;
        Ok(Self { forward, inverse })
    }

    /// Build from row-major rows.
    pub fn from_rows(rows: [[f64; 3]; 3]) -> Result<Self, HomographyError> {
        Self::new(Matrix3::new(
            rows[0][0], rows[0][1], rows[0][2],
            rows[1][0], rows[1][1], rows[1][2],
            rows[2][0], rows[2][1], rows[2][2],
        ))
    }

    pub fn identity() -> Self {
        Self {
            forward: Matrix3::identity(),
            inverse: Matrix3::identity(),
        }
    }

    /// Forward (pixel → world) matrix.
    pub fn matrix(&self) -> &Matrix3<f64> {
        &self.forward
    }

    /// Inverse (world → pixel) matrix.
    pub fn inverse_matrix(&self) -> &Matrix3<f64> {
        &self.inverse
    }

    /// Forward matrix as row-major rows.
    pub fn to_rows(&self) -> [[f64; 3]; 3] {
        let m = &self.forward;
        [
            [m[(0, 0)], m[(0, 1)], m[(0, 2)]],
            [m[(1, 0)], m[(1, 1)], m[(1, 2)]],
            [m[(2, 0)], m[(2, 1)], m[(2, 2)]],
        ]
    }

    pub fn pixel_to_world(&self, p: PixelPoint) -> Option<WorldPoint> {
        project(&self.forward, p.x, p.y).map(WorldPoint::from)
    }

    /// Inverse transform, used to place world-space overlays on the image.
    pub fn world_to_pixel(&self, w: WorldPoint) -> Option<PixelPoint> {
        project(&self.inverse, w.x, w.y).map(PixelPoint::from)
    }

    /// Distance in world units between `H·pixel` and `world`.
    ///
    /// Infinite if the pixel projects to infinity.
    pub fn reprojection_error(&self, pixel: PixelPoint, world: WorldPoint) -> f64 {
        match self.pixel_to_world(pixel) {
            Some(p) => ((p.x - world.x).powi(2) + (p.y - world.y).powi(2)).sqrt(),
            None => f64::INFINITY,
        }
    }
}

/// Similarity that moves the centroid of `pts` to the origin and makes their
/// mean distance from it √2.
fn conditioning_transform(pts: &[[f64; 2]]) -> Matrix3<f64> {
    let n = pts.len() as f64;
    let (sum_x, sum_y) = pts
        .iter()
        .fold((0.0, 0.0), |(sx, sy), p| (sx + p[0], sy + p[1]));
    let (cx, cy) = (sum_x / n, sum_y / n);
    let spread = pts.iter().map(|p| (p[0] - cx).hypot(p[1] - cy)).sum::<f64>() / n;
    let k = if spread > f64::EPSILON {
        std::f64::consts::SQRT_2 / spread
    } else {
        1.0
    };
    Matrix3::new(k, 0.0, -k * cx, 0.0, k, -k * cy, 0.0, 0.0, 1.0)
}

fn condition(t: &Matrix3<f64>, p: [f64; 2]) -> Vector3<f64> {
    t * Vector3::new(p[0], p[1], 1.0)
}

/// Both linear equations a conditioned pair `s → d` places on the entries of
/// H, read row-major.
fn constraint_rows(s: &Vector3<f64>, d: &Vector3<f64>) -> [[f64; 9]; 2] {
    let (u, v) = (d.x, d.y);
    [
        [s.x, s.y, 1.0, 0.0, 0.0, 0.0, -u * s.x, -u * s.y, -u],
        [0.0, 0.0, 0.0, s.x, s.y, 1.0, -v * s.x, -v * s.y, -v],
    ]
}

/// Estimate the pixel → world homography from ≥4 correspondences.
///
/// With exactly four points (no three collinear) the solution is exact; with
/// more it is the algebraic least-squares fit. Collinearity is not detected;
/// degenerate input surfaces as `NotInvertible` at best.
pub fn estimate_homography(
    pixel: &[PixelPoint],
    world: &[WorldPoint],
) -> Result<Homography, HomographyError> {
    if pixel.len() != world.len() {
        return Err(HomographyError::LengthMismatch {
            pixel: pixel.len(),
            world: world.len(),
        });
    }
    if pixel.len() < MIN_CORRESPONDENCES {
        return Err(HomographyError::TooFewPoints {
            needed: MIN_CORRESPONDENCES,
            got: pixel.len(),
        });
    }
    let src: Vec<[f64; 2]> = pixel.iter().map(|p| p.to_array()).collect();
    let dst: Vec<[f64; 2]> = world.iter().map(|p| p.to_array()).collect();
    Homography::new(estimate_homography_dlt(&src, &dst)?)
}

/// Returns the 3×3 matrix H such that dst ≈ project(H, src), scaled so
/// H[2][2] = 1 when that entry is not ~0.
pub(crate) fn estimate_homography_dlt(
    src: &[[f64; 2]],
    dst: &[[f64; 2]],
) -> Result<Matrix3<f64>, HomographyError> {
    let n = src.len();
    if n < MIN_CORRESPONDENCES || dst.len() < MIN_CORRESPONDENCES {
        return Err(HomographyError::TooFewPoints {
            needed: MIN_CORRESPONDENCES,
            got: n.min(dst.len()),
        });
    }
    if n != dst.len() {
        return Err(HomographyError::LengthMismatch {
            pixel: n,
            world: dst.len(),
        });
    }

    let t_src = conditioning_transform(src);
    let t_dst = conditioning_transform(dst);

    let rows: Vec<[f64; 9]> = src
        .iter()
        .zip(dst)
        .flat_map(|(s, d)| constraint_rows(&condition(&t_src, *s), &condition(&t_dst, *d)))
        .collect();
    let design = DMatrix::from_row_iterator(rows.len(), 9, rows.iter().flatten().copied());

    // The solution spans the null space of the design matrix. Working on
    // AᵀA keeps four exact pairs (eight equations) well posed.
    let eig = nalgebra::SymmetricEigen::new(design.tr_mul(&design));
    let (col, _) = eig
        .eigenvalues
        .iter()
        .map(|v| v.abs())
        .enumerate()
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .ok_or_else(|| HomographyError::NumericalFailure("empty eigen decomposition".into()))?;
    let conditioned = Matrix3::from_row_iterator(eig.eigenvectors.column(col).iter().copied());

    let undo_dst = t_dst
        .try_inverse()
        .ok_or_else(|| HomographyError::NumericalFailure("world conditioning is singular".into()))?;
    let h = undo_dst * conditioned * t_src;

    let h33 = h[(2, 2)];
    Ok(if h33.abs() > 1e-15 { h.unscale(h33) } else { h })
}
