//! Runtime configuration for calibration, tracking, and the orchestrator.
//!
//! Every struct has documented defaults and accepts partial JSON: missing
//! fields fall back to `Default`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::geometry::WorldPoint;
use crate::homography::MIN_CORRESPONDENCES;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed config: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Per-frame target detection and stability parameters.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Target color, in the channel order of the frames handed to tracking.
    /// Frames loaded by the CLI through `image` are RGB.
    pub target_color: [u8; 3],
    /// Half-width of the per-channel acceptance band.
    pub color_tolerance: u8,
    /// Side length of the square closing element (≤ 1 disables closing).
    pub close_kernel_size: u32,
    /// Accepted bounding-box width/height range, inclusive.
    pub aspect_ratio_range: [f64; 2],
    /// Maximum pairwise spread (x, y) of buffered world samples for stability.
    pub stability_tolerance: [f64; 2],
    /// Keep processing forever and log per-frame detail instead of settling.
    pub debug: bool,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            target_color: [255, 0, 118],
            color_tolerance: 70,
            close_kernel_size: 5,
            aspect_ratio_range: [0.5, 2.33],
            stability_tolerance: [15.0, 15.0],
            debug: false,
        }
    }
}

impl TrackerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let [lo, hi] = self.aspect_ratio_range;
        if !lo.is_finite() || !hi.is_finite() || lo < 0.0 || lo > hi {
            return Err(ConfigError::Invalid(format!(
                "aspect_ratio_range must be finite with 0 <= min <= max, got [{}, {}]",
                lo, hi
            )));
        }
        let [tx, ty] = self.stability_tolerance;
        if !(tx.is_finite() && ty.is_finite() && tx >= 0.0 && ty >= 0.0) {
            return Err(ConfigError::Invalid(
                "stability_tolerance must be finite and >= 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Calibration target sequence and click handling.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Ground-plane points the operator visits, in order.
    pub world_points: Vec<[f64; 2]>,
    /// Number of leading clicks whose x is forced onto the frame's vertical
    /// centerline. Useful when the first targets are laid out along the
    /// camera's optical axis; 0 disables it.
    pub centerline_lock: usize,
    /// Scale of the displayed frame relative to the camera frame. Clicks
    /// arrive in display coordinates and are divided by this.
    pub display_scale: f64,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            world_points: vec![
                [0.0, 140.0],
                [0.0, 100.0],
                [0.0, 60.0],
                [0.0, 20.0],
                [40.0, 100.0],
                [-40.0, 100.0],
                [10.0, 20.0],
                [-10.0, 20.0],
            ],
            centerline_lock: 0,
            display_scale: 1.0,
        }
    }
}

impl CalibrationConfig {
    pub fn targets(&self) -> Vec<WorldPoint> {
        self.world_points.iter().copied().map(WorldPoint::from).collect()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.world_points.len() < MIN_CORRESPONDENCES {
            return Err(ConfigError::Invalid(format!(
                "calibration needs at least {} world points, got {}",
                MIN_CORRESPONDENCES,
                self.world_points.len()
            )));
        }
        if self
            .world_points
            .iter()
            .any(|p| !p[0].is_finite() || !p[1].is_finite())
        {
            return Err(ConfigError::Invalid(
                "world_points must be finite".to_string(),
            ));
        }
        if !(self.display_scale.is_finite() && self.display_scale > 0.0) {
            return Err(ConfigError::Invalid(
                "display_scale must be finite and > 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Top-level configuration for [`crate::Locator`].
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct LocatorConfig {
    pub calibration: CalibrationConfig,
    pub tracking: TrackerConfig,
    /// Location of the persisted homography.
    pub homography_path: PathBuf,
    /// Run calibration when no usable homography is stored; otherwise fail.
    pub calibrate_on_missing: bool,
    /// Give up calibration after this many seconds.
    pub calibration_timeout_s: Option<f64>,
    /// Give up tracking after this many seconds.
    pub tracking_timeout_s: Option<f64>,
    /// Upper bound on a single wait for the next frame, in milliseconds.
    pub poll_interval_ms: u64,
}

impl Default for LocatorConfig {
    fn default() -> Self {
        Self {
            calibration: CalibrationConfig::default(),
            tracking: TrackerConfig::default(),
            homography_path: PathBuf::from("homography.json"),
            calibrate_on_missing: true,
            calibration_timeout_s: None,
            tracking_timeout_s: None,
            poll_interval_ms: 50,
        }
    }
}

/// Seconds as a `Duration`; `None` when unset or not representable.
fn secs(value: Option<f64>) -> Option<Duration> {
    value.and_then(|s| Duration::try_from_secs_f64(s).ok())
}

impl LocatorConfig {
    /// Load from a JSON file and validate.
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let data = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&data)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.calibration.validate()?;
        self.tracking.validate()?;
        for (name, value) in [
            ("calibration_timeout_s", self.calibration_timeout_s),
            ("tracking_timeout_s", self.tracking_timeout_s),
        ] {
            if let Some(v) = value {
                if Duration::try_from_secs_f64(v).is_err() {
                    return Err(ConfigError::Invalid(format!(
                        "{} must be a finite, non-negative number of seconds that fits a duration, got {}",
                        name, v
                    )));
                }
            }
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "poll_interval_ms must be >= 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn calibration_timeout(&self) -> Option<Duration> {
        secs(self.calibration_timeout_s)
    }

    pub fn tracking_timeout(&self) -> Option<Duration> {
        secs(self.tracking_timeout_s)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        LocatorConfig::default().validate().unwrap();
        assert_eq!(CalibrationConfig::default().targets().len(), 8);
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let json = r#"{ "tracking": { "color_tolerance": 40, "debug": true },
                        "calibration_timeout_s": 120 }"#;
        let cfg: LocatorConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.tracking.color_tolerance, 40);
        assert!(cfg.tracking.debug);
        assert_eq!(cfg.tracking.target_color, [255, 0, 118]);
        assert_eq!(cfg.calibration, CalibrationConfig::default());
        assert_eq!(cfg.calibration_timeout(), Some(Duration::from_secs(120)));
        assert_eq!(cfg.tracking_timeout(), None);
    }

    #[test]
    fn too_few_world_points_is_invalid() {
        let cfg = CalibrationConfig {
            world_points: vec![[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]],
            ..CalibrationConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn inverted_aspect_range_is_invalid() {
        let cfg = TrackerConfig {
            aspect_ratio_range: [2.0, 0.5],
            ..TrackerConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn non_positive_display_scale_is_invalid() {
        let cfg = CalibrationConfig {
            display_scale: 0.0,
            ..CalibrationConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn oversized_timeout_is_rejected_not_panicking() {
        let cfg = LocatorConfig {
            tracking_timeout_s: Some(1e20),
            ..LocatorConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid(_))));
        assert_eq!(cfg.tracking_timeout(), None);

        for bad in [-1.0, f64::NAN, f64::INFINITY] {
            let cfg = LocatorConfig {
                calibration_timeout_s: Some(bad),
                ..LocatorConfig::default()
            };
            assert!(cfg.validate().is_err(), "{} accepted", bad);
            assert_eq!(cfg.calibration_timeout(), None);
        }

        let cfg = LocatorConfig {
            tracking_timeout_s: Some(1e15),
            ..LocatorConfig::default()
        };
        cfg.validate().unwrap();
        assert!(cfg.tracking_timeout().is_some());
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("laserloc.json");
        std::fs::write(
            &path,
            r#"{ "calibration": { "centerline_lock": 4, "display_scale": 0.5 } }"#,
        )
        .unwrap();
        let cfg = LocatorConfig::from_json_file(&path).unwrap();
        assert_eq!(cfg.calibration.centerline_lock, 4);
        assert_eq!(cfg.calibration.display_scale, 0.5);

        std::fs::write(&path, r#"{ "poll_interval_ms": 0 }"#).unwrap();
        assert!(matches!(
            LocatorConfig::from_json_file(&path),
            Err(ConfigError::Invalid(_))
        ));
    }
}
