//! RunRecords: the provenance unit emitted by every operator invocation.
//!
//! A RunRecord pins what ran (`operator_id`, `mode`, `config_hash`), what it
//! read and wrote (artifact refs by hash), what went sideways (ordered
//! warnings and errors), and what it cost. Builders are begun before the
//! operator does any work and finalized on **every** exit path:
//! success, failure, and cancellation all end in exactly one RunRecord.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::canonical_json::to_canonical_bytes;
use crate::error::{Error, Result};
use crate::hash::{artifact_hash, ArtifactRef};
use crate::id::{RunGroupId, RunId};
use crate::time::UtcTimestamp;

/// Execution mode of an operator invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionMode {
    /// Fail fast on any unpinned nondeterministic input.
    #[serde(rename = "strict")]
    Strict,
    /// Nondeterministic inputs are allowed, but only when declared in the
    /// record's `best_effort` block.
    #[serde(rename = "best-effort")]
    BestEffort,
}

/// A structured warning or error inside a RunRecord.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Stable machine-readable code (`unparseable_date`, `cancelled`, …).
    pub code: String,
    /// Human-readable message.
    pub message: String,
    /// Structured detail payload.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub details: BTreeMap<String, Value>,
}

impl Diagnostic {
    /// Creates a diagnostic with no detail payload.
    #[must_use]
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: BTreeMap::new(),
        }
    }

    /// Attaches one detail entry.
    #[must_use]
    pub fn with_detail(mut self, key: impl Into<String>, value: Value) -> Self {
        self.details.insert(key.into(), value);
        self
    }
}

/// Resource cost of an operator invocation. Durations are integer
/// milliseconds so records stay canonically hashable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCost {
    /// Wall time in milliseconds.
    pub duration_ms: u64,
    /// Bytes read.
    pub bytes_in: u64,
    /// Bytes written.
    pub bytes_out: u64,
}

/// The provenance record for one operator invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
    /// Unique id of this invocation.
    pub run_id: RunId,
    /// Operator name and version, `name@semver`.
    pub operator_id: String,
    /// When the invocation began.
    pub started_at: UtcTimestamp,
    /// When the invocation ended.
    pub ended_at: UtcTimestamp,
    /// Execution mode.
    pub mode: ExecutionMode,
    /// Fingerprint of the resolved configuration.
    pub config_hash: String,
    /// Artifacts read, in read order.
    pub input_refs: Vec<ArtifactRef>,
    /// Artifacts written, in write order.
    pub output_refs: Vec<ArtifactRef>,
    /// Ordered warnings.
    pub warnings: Vec<Diagnostic>,
    /// Ordered errors.
    pub errors: Vec<Diagnostic>,
    /// Resource cost.
    pub cost: RunCost,
    /// Declared nondeterminism metadata; empty in strict mode.
    pub best_effort: BTreeMap<String, String>,
    /// The run group this invocation belongs to.
    pub run_group_id: RunGroupId,
}

impl RunRecord {
    /// The record's own canonical hash.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Serialization`] if the record cannot be canonically
    /// serialized.
    pub fn record_hash(&self) -> Result<String> {
        artifact_hash(self).map_err(|e| Error::Serialization {
            message: e.to_string(),
        })
    }
}

/// Accumulates a RunRecord across an operator invocation.
///
/// `begin` pins the identity fields; reads, writes, and diagnostics are
/// recorded as they happen; `finalize` (or `finalize_with_error`) consumes
/// the builder so an invocation cannot emit two records; or none, as long
/// as every exit path ends in one of the finalizers.
#[derive(Debug)]
pub struct RunRecordBuilder {
    record: RunRecord,
}

impl RunRecordBuilder {
    /// Begins a record, pinning identity fields.
    #[must_use]
    pub fn begin(
        run_id: RunId,
        run_group_id: RunGroupId,
        operator_id: impl Into<String>,
        mode: ExecutionMode,
        config_hash: impl Into<String>,
        started_at: UtcTimestamp,
    ) -> Self {
        Self {
            record: RunRecord {
                run_id,
                operator_id: operator_id.into(),
                started_at,
                ended_at: started_at,
                mode,
                config_hash: config_hash.into(),
                input_refs: Vec::new(),
                output_refs: Vec::new(),
                warnings: Vec::new(),
                errors: Vec::new(),
                cost: RunCost::default(),
                best_effort: BTreeMap::new(),
                run_group_id,
            },
        }
    }

    /// Records an artifact read.
    pub fn record_input(&mut self, artifact: ArtifactRef) {
        self.record.input_refs.push(artifact);
    }

    /// Records an artifact write.
    pub fn record_output(&mut self, artifact: ArtifactRef) {
        self.record.output_refs.push(artifact);
    }

    /// Appends a warning.
    pub fn warn(&mut self, diagnostic: Diagnostic) {
        self.record.warnings.push(diagnostic);
    }

    /// Appends an error without finalizing.
    pub fn error(&mut self, diagnostic: Diagnostic) {
        self.record.errors.push(diagnostic);
    }

    /// Declares use of a nondeterministic source.
    ///
    /// In best-effort mode the declaration lands in the record's
    /// `best_effort` block. In strict mode this is a
    /// [`Error::DeterminismViolation`]: the caller must fail the operator,
    /// and the violation is recorded as an error so the finalized record
    /// shows what happened.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DeterminismViolation`] in strict mode.
    pub fn declare_nondeterminism(
        &mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<()> {
        let key = key.into();
        let value = value.into();
        match self.record.mode {
            ExecutionMode::BestEffort => {
                self.record.best_effort.insert(key, value);
                Ok(())
            }
            ExecutionMode::Strict => {
                let message = format!("strict mode forbids unpinned source '{key}'");
                self.record
                    .errors
                    .push(Diagnostic::new("determinism_violation", &message));
                Err(Error::DeterminismViolation { message })
            }
        }
    }

    /// Mode this builder was begun with.
    #[must_use]
    pub const fn mode(&self) -> ExecutionMode {
        self.record.mode
    }

    /// Finalizes a successful invocation.
    #[must_use]
    pub fn finalize(mut self, ended_at: UtcTimestamp, cost: RunCost) -> RunRecord {
        self.record.ended_at = ended_at;
        self.record.cost = cost;
        self.record
    }

    /// Finalizes a failed invocation, appending the terminal error.
    #[must_use]
    pub fn finalize_with_error(
        mut self,
        ended_at: UtcTimestamp,
        cost: RunCost,
        error: Diagnostic,
    ) -> RunRecord {
        self.record.errors.push(error);
        self.finalize(ended_at, cost)
    }
}

/// Writes RunRecords as one canonical-JSON file per record.
#[derive(Debug, Clone)]
pub struct RunRecordWriter {
    dir: PathBuf,
}

impl RunRecordWriter {
    /// Creates a writer rooted at `dir` (typically `run_records/`).
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Writes a record, returning the file path.
    ///
    /// The filename defaults to `<compact started_at>_<run_id>.json`; pass
    /// `basename` to pin it for CI snapshots.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] on filesystem failures and
    /// [`Error::Serialization`] if the record cannot be canonically
    /// serialized.
    pub fn write(&self, record: &RunRecord, basename: Option<&str>) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)
            .map_err(|e| Error::storage_with_source("creating run_records dir", e))?;

        let name = basename.map_or_else(
            || {
                format!(
                    "{}_{}",
                    record.started_at.to_string().replace([':', '-'], ""),
                    record.run_id
                )
            },
            ToOwned::to_owned,
        );
        let path = self.dir.join(format!("{name}.json"));

        let bytes = to_canonical_bytes(record).map_err(|e| Error::Serialization {
            message: e.to_string(),
        })?;
        fs::write(&path, bytes)
            .map_err(|e| Error::storage_with_source("writing run record", e))?;
        Ok(path)
    }

    /// The directory records are written to.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(s: &str) -> UtcTimestamp {
        s.parse().unwrap_or_else(|e| panic!("bad test timestamp {s}: {e}"))
    }

    fn builder(mode: ExecutionMode) -> RunRecordBuilder {
        RunRecordBuilder::begin(
            RunId::from("run-1"),
            RunGroupId::from("grp-1"),
            "canonicalization.normalize@1.0.0",
            mode,
            "cfg-hash",
            ts("2025-12-29T17:00:00Z"),
        )
    }

    #[test]
    fn success_path_produces_complete_record() {
        let mut b = builder(ExecutionMode::Strict);
        b.record_input(ArtifactRef::new("raw-item:RAW-1", "RawItem", "aa"));
        b.record_output(ArtifactRef::new("event:EVT-1", "Event", "bb"));
        b.warn(Diagnostic::new("unparseable_date", "eta field ignored"));

        let record = b.finalize(
            ts("2025-12-29T17:00:01Z"),
            RunCost {
                duration_ms: 1000,
                bytes_in: 64,
                bytes_out: 128,
            },
        );

        assert!(record.started_at <= record.ended_at);
        assert_eq!(record.input_refs.len(), 1);
        assert_eq!(record.output_refs.len(), 1);
        assert_eq!(record.warnings.len(), 1);
        assert!(record.errors.is_empty());
        assert!(record.best_effort.is_empty());
    }

    #[test]
    fn failure_path_still_finalizes() {
        let b = builder(ExecutionMode::Strict);
        let record = b.finalize_with_error(
            ts("2025-12-29T17:00:02Z"),
            RunCost::default(),
            Diagnostic::new("cancelled", "pipeline cancelled between items"),
        );
        assert_eq!(record.errors.len(), 1);
        assert_eq!(record.errors[0].code, "cancelled");
    }

    #[test]
    fn strict_mode_rejects_nondeterminism() {
        let mut b = builder(ExecutionMode::Strict);
        let err = b.declare_nondeterminism("wall_clock", "sampled").unwrap_err();
        assert!(matches!(err, Error::DeterminismViolation { .. }));

        // The violation is visible in the finalized record.
        let record = b.finalize(ts("2025-12-29T17:00:01Z"), RunCost::default());
        assert_eq!(record.errors[0].code, "determinism_violation");
        assert!(record.best_effort.is_empty());
    }

    #[test]
    fn best_effort_mode_records_declaration() {
        let mut b = builder(ExecutionMode::BestEffort);
        b.declare_nondeterminism("seed", "jitter-7")
            .unwrap_or_else(|e| panic!("declaration should succeed: {e}"));
        let record = b.finalize(ts("2025-12-29T17:00:01Z"), RunCost::default());
        assert_eq!(record.best_effort.get("seed").map(String::as_str), Some("jitter-7"));
    }

    #[test]
    fn record_hash_is_stable() {
        let make = || {
            builder(ExecutionMode::Strict).finalize(ts("2025-12-29T17:00:01Z"), RunCost::default())
        };
        assert_eq!(make().record_hash().unwrap(), make().record_hash().unwrap());
    }

    #[test]
    fn mode_serializes_with_hyphen() {
        assert_eq!(
            serde_json::to_string(&ExecutionMode::BestEffort).unwrap(),
            r#""best-effort""#
        );
        assert_eq!(serde_json::to_string(&ExecutionMode::Strict).unwrap(), r#""strict""#);
    }

    #[test]
    fn writer_emits_one_file_per_record() {
        let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir failed: {e}"));
        let writer = RunRecordWriter::new(dir.path());
        let record = builder(ExecutionMode::Strict)
            .finalize(ts("2025-12-29T17:00:01Z"), RunCost::default());

        let path = writer
            .write(&record, Some("golden-run"))
            .unwrap_or_else(|e| panic!("write failed: {e}"));
        assert_eq!(path.file_name().and_then(|n| n.to_str()), Some("golden-run.json"));

        let raw = std::fs::read_to_string(&path).unwrap();
        let back: RunRecord = serde_json::from_str(&raw).unwrap();
        assert_eq!(back, record);
    }
}
