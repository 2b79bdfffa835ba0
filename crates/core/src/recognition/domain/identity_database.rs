use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::embedding::l2_norm;

/// Allowed deviation of a stored vector's norm from 1.
const NORM_TOLERANCE: f32 = 1e-3;

/// One enrolled reference embedding.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    pub name: String,
    pub vector: Vec<f32>,
    /// Source image the embedding was computed from.
    pub origin: String,
}

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("failed to access embedding database {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("corrupt embedding database {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("record {origin} has {found} dimensions, expected {expected}")]
    DimensionMismatch {
        origin: String,
        expected: usize,
        found: usize,
    },
    #[error("record {origin} is not unit length (norm {norm})")]
    NotNormalized { origin: String, norm: f32 },
}

/// Enrolled identities, loaded once and read-only for the session.
///
/// Record order is preserved from the file; the matcher relies on it to
/// break distance ties.
#[derive(Clone, Debug, Default)]
pub struct IdentityDatabase {
    records: Vec<EmbeddingRecord>,
}

impl IdentityDatabase {
    /// Validates that every vector has the first record's length and unit norm.
    pub fn new(records: Vec<EmbeddingRecord>) -> Result<Self, DatabaseError> {
        if let Some(first) = records.first() {
            let expected = first.vector.len();
            for record in &records {
                Self::check_record(record, expected)?;
            }
        }
        Ok(Self { records })
    }

    /// Checks one record against the collection's dimension and the unit-norm
    /// requirement. Non-finite components fail the norm check.
    pub fn check_record(record: &EmbeddingRecord, expected: usize) -> Result<(), DatabaseError> {
        if record.vector.len() != expected {
            return Err(DatabaseError::DimensionMismatch {
                origin: record.origin.clone(),
                expected,
                found: record.vector.len(),
            });
        }
        let norm = l2_norm(&record.vector);
        if !norm.is_finite() || (norm - 1.0).abs() > NORM_TOLERANCE {
            return Err(DatabaseError::NotNormalized {
                origin: record.origin.clone(),
                norm,
            });
        }
        Ok(())
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn load(path: &Path) -> Result<Self, DatabaseError> {
        let json = fs::read_to_string(path).map_err(|e| DatabaseError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let records: Vec<EmbeddingRecord> =
            serde_json::from_str(&json).map_err(|e| DatabaseError::Parse {
                path: path.to_path_buf(),
                source: e,
            })?;
        let db = Self::new(records)?;
        log::info!(
            "Loaded {} embeddings for {} identities from {}",
            db.len(),
            db.identity_count(),
            path.display()
        );
        Ok(db)
    }

    /// Like [`Self::load`], but a missing file yields an empty database.
    /// Every query against it resolves to "Unknown".
    pub fn load_or_empty(path: &Path) -> Result<Self, DatabaseError> {
        if !path.exists() {
            log::warn!(
                "Embedding database {} not found, every face will be Unknown",
                path.display()
            );
            return Ok(Self::empty());
        }
        Self::load(path)
    }

    /// Writes the collection as JSON via a temporary file and rename.
    pub fn save(&self, path: &Path) -> Result<(), DatabaseError> {
        let io_err = |path: &Path, source: std::io::Error| DatabaseError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
        }
        let json = serde_json::to_string(&self.records).map_err(|e| DatabaseError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;
        let temp_path = path.with_extension("part");
        fs::write(&temp_path, json).map_err(|e| io_err(&temp_path, e))?;
        fs::rename(&temp_path, path).map_err(|e| io_err(path, e))
    }

    pub fn records(&self) -> &[EmbeddingRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Vector length shared by all records, `None` when empty.
    pub fn dimension(&self) -> Option<usize> {
        self.records.first().map(|r| r.vector.len())
    }

    /// Number of distinct names.
    pub fn identity_count(&self) -> usize {
        let mut names: Vec<&str> = self.records.iter().map(|r| r.name.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        names.len()
    }
}
