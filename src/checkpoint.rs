//! Checkpoint persistence for the learned policy.
//!
//! A checkpoint is a point-in-time snapshot of the value table plus the
//! aggregate counters, written as versioned JSON. Loading validates both
//! the checkpoint format version and the feature-layout hash; anything
//! incompatible fails cleanly so the engine starts from an empty table
//! instead of corrupting learned state. Saves go through a temp file and
//! an atomic rename; a failed save is retried on the next cadence tick.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::features::layout::{layout_hash, validate_layout, FEATURE_VERSION};
use crate::policy::agent::AgentCounters;
use crate::policy::TableSnapshot;

/// Current checkpoint format version.
/// MUST be incremented when the structure changes.
pub const CHECKPOINT_VERSION: u32 = 1;

// ============================================================================
// CHECKPOINT
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub version: u32,
    pub feature_version: u8,
    pub layout_hash: u32,
    pub saved_at: chrono::DateTime<chrono::Utc>,
    pub table: TableSnapshot,
    pub counters: AgentCounters,
    /// Requests processed by the engine, across restarts.
    pub total_requests: u64,
}

impl Checkpoint {
    pub fn new(table: TableSnapshot, counters: AgentCounters, total_requests: u64) -> Self {
        Self {
            version: CHECKPOINT_VERSION,
            feature_version: FEATURE_VERSION,
            layout_hash: layout_hash(),
            saved_at: chrono::Utc::now(),
            table,
            counters,
            total_requests,
        }
    }
}

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug)]
pub enum CheckpointError {
    Io(std::io::Error),
    Serialization(serde_json::Error),
    VersionMismatch { expected: u32, actual: u32 },
    LayoutMismatch(crate::features::layout::LayoutMismatchError),
}

impl std::fmt::Display for CheckpointError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CheckpointError::Io(e) => write!(f, "checkpoint IO error: {}", e),
            CheckpointError::Serialization(e) => write!(f, "checkpoint serialization error: {}", e),
            CheckpointError::VersionMismatch { expected, actual } => {
                write!(f, "checkpoint version mismatch: expected {}, got {}", expected, actual)
            }
            CheckpointError::LayoutMismatch(e) => write!(f, "checkpoint {}", e),
        }
    }
}

impl std::error::Error for CheckpointError {}

impl From<std::io::Error> for CheckpointError {
    fn from(err: std::io::Error) -> Self {
        CheckpointError::Io(err)
    }
}

impl From<serde_json::Error> for CheckpointError {
    fn from(err: serde_json::Error) -> Self {
        CheckpointError::Serialization(err)
    }
}

// ============================================================================
// STORE
// ============================================================================

/// Default checkpoint location under the platform data directory.
pub fn default_checkpoint_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("adaptive-waf")
        .join("policy_checkpoint.json")
}

pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Serialize and durably write a checkpoint (temp file + rename).
    pub fn save(&self, checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_vec(checkpoint)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    /// Load and validate a checkpoint. Missing file is an IO error the
    /// caller treats as "start fresh".
    pub fn load(&self) -> Result<Checkpoint, CheckpointError> {
        let data = fs::read(&self.path)?;
        let checkpoint: Checkpoint = serde_json::from_slice(&data)?;

        if checkpoint.version != CHECKPOINT_VERSION {
            return Err(CheckpointError::VersionMismatch {
                expected: CHECKPOINT_VERSION,
                actual: checkpoint.version,
            });
        }
        validate_layout(checkpoint.feature_version, checkpoint.layout_hash)
            .map_err(CheckpointError::LayoutMismatch)?;

        Ok(checkpoint)
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }
}

// ============================================================================
// TESTS
// ============================================================================
