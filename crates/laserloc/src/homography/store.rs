//! Durable storage of the calibration homography.
//!
//! The artifact is a single JSON document holding one labeled 3×3 row-major
//! matrix (`laserloc.homography.v1`). `serde_json` is built with
//! `float_roundtrip`, so a saved matrix loads back bit-identical.

use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use super::core::{Homography, HomographyError};

const HOMOGRAPHY_SCHEMA_V1: &str = "laserloc.homography.v1";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("cannot access homography file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed homography document: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported homography schema '{found}' (expected '{expected}')")]
    Schema { found: String, expected: &'static str },
    #[error("homography matrix is empty")]
    EmptyMatrix,
    #[error("homography matrix must be 3x3, got {rows}x{cols}")]
    Shape { rows: usize, cols: usize },
    #[error("stored matrix is not a usable homography: {0}")]
    Homography(#[from] HomographyError),
    #[error("no homography has been stored")]
    Missing,
}

/// Where the calibration result lives between a calibration run and the
/// tracking sessions that consume it.
pub trait HomographyStore: Send + Sync {
    fn save(&self, h: &Homography) -> Result<(), StoreError>;
    fn load(&self) -> Result<Homography, StoreError>;
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct HomographyDocument {
    schema: String,
    homography: Vec<Vec<f64>>,
}

impl HomographyDocument {
    fn from_homography(h: &Homography) -> Self {
        Self {
            schema: HOMOGRAPHY_SCHEMA_V1.to_string(),
            homography: h.to_rows().iter().map(|row| row.to_vec()).collect(),
        }
    }

    fn into_homography(self) -> Result<Homography, StoreError> {
        if self.schema != HOMOGRAPHY_SCHEMA_V1 {
            return Err(StoreError::Schema {
                found: self.schema,
                expected: HOMOGRAPHY_SCHEMA_V1,
            });
        }
        let rows = self.homography;
        if rows.is_empty() || rows.iter().all(Vec::is_empty) {
            return Err(StoreError::EmptyMatrix);
        }
        let cols = rows.iter().map(Vec::len).max().unwrap_or(0);
        if rows.len() != 3 || rows.iter().any(|r| r.len() != 3) {
            return Err(StoreError::Shape {
                rows: rows.len(),
                cols,
            });
        }
        let mut m = [[0.0f64; 3]; 3];
        for (dst, src) in m.iter_mut().zip(&rows) {
            dst.copy_from_slice(src);
        }
        Ok(Homography::from_rows(m)?)
    }
}

/// Serialize a homography to the artifact's JSON text.
pub fn homography_to_json(h: &Homography) -> Result<String, StoreError> {
    Ok(serde_json::to_string_pretty(
        &HomographyDocument::from_homography(h),
    )?)
}

/// Parse a homography from the artifact's JSON text.
pub fn homography_from_json(text: &str) -> Result<Homography, StoreError> {
    let doc: HomographyDocument = serde_json::from_str(text)?;
    doc.into_homography()
}

/// Homography persisted as a JSON file at a fixed path.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl HomographyStore for JsonFileStore {
    fn save(&self, h: &Homography) -> Result<(), StoreError> {
        let json = homography_to_json(h)?;
        std::fs::write(&self.path, json).map_err(|e| self.io_error(e))?;
        tracing::info!("Homography saved to {}", self.path.display());
        Ok(())
    }

    fn load(&self) -> Result<Homography, StoreError> {
        let text = std::fs::read_to_string(&self.path).map_err(|e| self.io_error(e))?;
        homography_from_json(&text)
    }
}

/// In-process store, for embedding and tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    slot: Mutex<Option<Homography>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_homography(h: Homography) -> Self {
        Self {
            slot: Mutex::new(Some(h)),
        }
    }
}

impl HomographyStore for MemoryStore {
    fn save(&self, h: &Homography) -> Result<(), StoreError> {
        *self.slot.lock() = Some(h.clone());
        Ok(())
    }

    fn load(&self) -> Result<Homography, StoreError> {
        self.slot.lock().clone().ok_or(StoreError::Missing)
    }
}
