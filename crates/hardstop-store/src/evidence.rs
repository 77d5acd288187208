//! Incident-evidence artifacts.
//!
//! One artifact per alert create/update, explaining why events merged. The
//! store keeps an index and can mirror each artifact to disk as canonical
//! JSON so RunRecords and CI snapshots can reference them by path and hash.

use std::fs;
use std::path::PathBuf;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use hardstop_core::canonical_json::to_canonical_bytes;
use hardstop_core::{
    AlertId, DeterminismContext, DeterminismMode, Error, EventId, Result, UtcTimestamp,
};

/// Why an event merged into an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MergeReason {
    /// The correlation keys were identical (always present).
    SameCorrelationKey,
    /// The event added to a non-empty facility overlap.
    SharedFacilities,
    /// The event added to a non-empty lane overlap.
    SharedLanes,
    /// The event arrived within 24h of the alert's last touch.
    TemporalOverlap,
}

/// Sorted entity-id overlap between an event and an alert.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceOverlap {
    /// Shared facility ids, sorted.
    pub facilities: Vec<String>,
    /// Shared lane ids, sorted.
    pub lanes: Vec<String>,
}

/// A hashed artifact explaining one alert create/update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncidentEvidence {
    /// Artifact id (`incident-evidence:<alert_id>:<n>`).
    pub artifact_id: String,
    /// The alert this artifact explains.
    pub alert_id: AlertId,
    /// The alert's correlation key.
    pub correlation_key: String,
    /// All event ids absorbed so far, in absorption order.
    pub root_event_ids: Vec<EventId>,
    /// Sorted merge reason codes.
    pub merge_reasons: Vec<MergeReason>,
    /// Entity overlap that justified the merge.
    pub overlap: EvidenceOverlap,
    /// Ordered human-readable merge lines.
    pub merge_summary: Vec<String>,
    /// Which determinism mode produced the artifact.
    pub determinism_mode: DeterminismMode,
    /// Pinned-mode context; absent in live mode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub determinism_context: Option<DeterminismContext>,
    /// When the artifact was generated. Scrubbed before hashing in live
    /// mode; part of the hashed view in pinned mode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generated_at_utc: Option<UtcTimestamp>,
    /// SHA-256 over the canonical payload (wall-clock fields scrubbed in
    /// live mode).
    pub artifact_hash: String,
}

/// Repository contract for incident evidence.
pub trait EvidenceStore {
    /// Appends an artifact.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] on backend failures.
    fn append(&self, artifact: IncidentEvidence) -> Result<()>;

    /// All artifacts for one alert, in append order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] on backend failures.
    fn for_alert(&self, alert_id: &AlertId) -> Result<Vec<IncidentEvidence>>;

    /// Total number of stored artifacts.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] on backend failures.
    fn len(&self) -> Result<usize>;

    /// True when no artifacts are stored.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] on backend failures.
    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

/// In-memory implementation of [`EvidenceStore`] with optional disk
/// mirroring.
#[derive(Debug, Default)]
pub struct MemoryEvidenceStore {
    rows: RwLock<Vec<IncidentEvidence>>,
    mirror_dir: Option<PathBuf>,
}

impl MemoryEvidenceStore {
    /// Creates a memory-only store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store that also writes each artifact to
    /// `<dir>/<artifact_id>.json` as canonical JSON.
    #[must_use]
    pub fn with_mirror_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            rows: RwLock::new(Vec::new()),
            mirror_dir: Some(dir.into()),
        }
    }

    fn mirror(&self, artifact: &IncidentEvidence) -> Result<()> {
        let Some(dir) = &self.mirror_dir else {
            return Ok(());
        };
        fs::create_dir_all(dir)
            .map_err(|e| Error::storage_with_source("creating incidents dir", e))?;
        let bytes = to_canonical_bytes(artifact).map_err(|e| Error::Serialization {
            message: e.to_string(),
        })?;
        let name = artifact.artifact_id.replace([':', '|'], "_");
        fs::write(dir.join(format!("{name}.json")), bytes)
            .map_err(|e| Error::storage_with_source("writing incident artifact", e))?;
        Ok(())
    }
}

impl EvidenceStore for MemoryEvidenceStore {
    fn append(&self, artifact: IncidentEvidence) -> Result<()> {
        self.mirror(&artifact)?;
        self.rows
            .write()
            .map_err(|_| Error::storage("evidence store lock poisoned"))?
            .push(artifact);
        Ok(())
    }

    fn for_alert(&self, alert_id: &AlertId) -> Result<Vec<IncidentEvidence>> {
        Ok(self
            .rows
            .read()
            .map_err(|_| Error::storage("evidence store lock poisoned"))?
            .iter()
            .filter(|a| &a.alert_id == alert_id)
            .cloned()
            .collect())
    }

    fn len(&self) -> Result<usize> {
        Ok(self
            .rows
            .read()
            .map_err(|_| Error::storage("evidence store lock poisoned"))?
            .len())
    }
}
