//! Decision records and the logging collaborator seam.
//!
//! One immutable record per request captures the full trace: state,
//! proposed / safety-adjusted / effective action, outcome, reward and the
//! attack score used. Records are emitted exactly once, after execution,
//! and never read back by the core. The bundled sink is an append-only
//! JSONL writer with size-based rotation.

use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::Mode;
use crate::executor::Outcome;
use crate::features::State;
use crate::policy::Action;

// ============================================================================
// DECISION RECORD
// ============================================================================

/// Write-once trace of a single request's pass through the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub request_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub method: String,
    pub path: String,
    pub source: String,
    pub state: State,
    pub attack_score: f32,
    /// What the policy wanted.
    pub proposed: Action,
    /// After hard safety constraints.
    pub safety_adjusted: Action,
    /// After the mode controller; this is what ran.
    pub effective: Action,
    pub outcome: Outcome,
    pub reward: f32,
    pub mode: Mode,
}

impl DecisionRecord {
    pub fn to_jsonl(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            // a record that cannot serialize still must not break the loop
            format!(
                "{{\"request_id\":\"{}\",\"serialize_error\":\"{}\"}}",
                self.request_id, e
            )
        })
    }
}

// ============================================================================
// SINK TRAIT
// ============================================================================

/// Logging/persistence collaborator. Fire-and-forget from the engine's
/// perspective: emit failures are logged, never propagated into the
/// decision path.
pub trait DecisionSink: Send + Sync {
    fn emit(&self, record: &DecisionRecord) -> io::Result<()>;
}

/// Discards everything.
pub struct NullSink;

impl DecisionSink for NullSink {
    fn emit(&self, _record: &DecisionRecord) -> io::Result<()> {
        Ok(())
    }
}

/// In-memory sink for tests and embedders that post-process records.
#[derive(Default)]
pub struct MemorySink {
    records: Mutex<Vec<DecisionRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<DecisionRecord> {
        self.records.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl DecisionSink for MemorySink {
    fn emit(&self, record: &DecisionRecord) -> io::Result<()> {
        self.records.lock().push(record.clone());
        Ok(())
    }
}

// ============================================================================
// JSONL SINK
// ============================================================================

/// Maximum file size before rotation (50 MB).
const MAX_FILE_SIZE: u64 = 50 * 1024 * 1024;

const LOG_EXT: &str = ".jsonl";

struct JsonlWriter {
    writer: BufWriter<File>,
    current_file: PathBuf,
    current_size: u64,
}

/// Append-only JSONL sink with size-based rotation.
pub struct JsonlSink {
    inner: Mutex<JsonlWriter>,
    base_dir: PathBuf,
}

impl JsonlSink {
    pub fn new(base_dir: PathBuf) -> io::Result<Self> {
        std::fs::create_dir_all(&base_dir)?;
        let (current_file, file) = Self::open_new_file(&base_dir)?;
        Ok(Self {
            inner: Mutex::new(JsonlWriter {
                writer: BufWriter::new(file),
                current_file,
                current_size: 0,
            }),
            base_dir,
        })
    }

    fn open_new_file(base_dir: &Path) -> io::Result<(PathBuf, File)> {
        let now = Utc::now();
        let filename = format!("decisions-{}{}", now.format("%Y-%m-%d-%H%M%S%f"), LOG_EXT);
        let file_path = base_dir.join(filename);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&file_path)?;
        log::info!("Opened decision log: {:?}", file_path);
        Ok((file_path, file))
    }

    pub fn current_file(&self) -> PathBuf {
        self.inner.lock().current_file.clone()
    }
}

impl DecisionSink for JsonlSink {
    fn emit(&self, record: &DecisionRecord) -> io::Result<()> {
        let line = record.to_jsonl();
        let bytes = line.as_bytes();

        let mut inner = self.inner.lock();
        if inner.current_size + bytes.len() as u64 > MAX_FILE_SIZE {
            inner.writer.flush()?;
            let (new_path, new_file) = Self::open_new_file(&self.base_dir)?;
            log::info!("Rotated from {:?} to {:?}", inner.current_file, new_path);
            inner.writer = BufWriter::new(new_file);
            inner.current_file = new_path;
            inner.current_size = 0;
        }

        inner.writer.write_all(bytes)?;
        inner.writer.write_all(b"\n")?;
        inner.current_size += bytes.len() as u64 + 1;
        // flush for durability
        inner.writer.flush()?;
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record() -> DecisionRecord {
        DecisionRecord {
            request_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            method: "GET".to_string(),
            path: "/api/user".to_string(),
            source: "1.2.3.4".to_string(),
            state: State::from_bins(&[0, 1, 2]),
            attack_score: 0.1,
            proposed: Action::Allow,
            safety_adjusted: Action::Allow,
            effective: Action::Allow,
            outcome: Outcome::Forwarded { status: 200 },
            reward: 0.5,
            mode: Mode::Enforcing,
        }
    }

    #[test]
    fn test_record_serializes_full_trace() {
        let line = sample_record().to_jsonl();
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["proposed"], "allow");
        assert_eq!(value["outcome"]["kind"], "forwarded");
        assert_eq!(value["mode"], "enforcing");
    }

    #[test]
    fn test_jsonl_sink_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonlSink::new(dir.path().to_path_buf()).unwrap();
        sink.emit(&sample_record()).unwrap();
        sink.emit(&sample_record()).unwrap();

        let contents = std::fs::read_to_string(sink.current_file()).unwrap();
        assert_eq!(contents.lines().count(), 2);
        for line in contents.lines() {
            let _: DecisionRecord = serde_json::from_str(line).unwrap();
        }
    }

    #[test]
    fn test_memory_sink_collects() {
        let sink = MemorySink::new();
        sink.emit(&sample_record()).unwrap();
        assert_eq!(sink.len(), 1);
        assert_eq!(sink.records()[0].path, "/api/user");
    }
}
