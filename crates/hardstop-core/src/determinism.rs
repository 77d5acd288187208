//! Determinism envelope: live vs. pinned execution.
//!
//! Time is an input, not an ambient. Every operator receives its `now` (and,
//! in pinned mode, its run id and id seed) from the envelope built at the
//! pipeline boundary. Artifacts that can incorporate time or randomness
//! record which mode produced them; pinned artifacts additionally record the
//! full context so a replay can reproduce them byte for byte.

use serde::{Deserialize, Serialize};

use crate::id::{IdMinter, RunId};
use crate::time::UtcTimestamp;

/// Which determinism mode a run executes under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeterminismMode {
    /// Wall-clock timestamps and random ids; hashes are computed over a
    /// scrubbed view with wall-clock fields replaced by sentinels.
    Live,
    /// Frozen timestamp, seeded ids, caller-supplied run id; hashes cover
    /// the full view.
    Pinned,
}

impl DeterminismMode {
    /// Stable lowercase name (`live` / `pinned`) used in artifacts.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Live => "live",
            Self::Pinned => "pinned",
        }
    }
}

/// The pinned-mode context recorded inside artifacts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeterminismContext {
    /// Seed driving deterministic id suffixes.
    pub seed: String,
    /// The frozen UTC timestamp, `Z`-suffixed.
    pub timestamp_utc: String,
    /// The caller-pinned run identifier.
    pub run_id: String,
}

/// Execution context threaded through the pipeline.
#[derive(Debug, Clone)]
pub struct DeterminismEnvelope {
    mode: DeterminismMode,
    now: UtcTimestamp,
    seed: Option<String>,
    run_id: Option<RunId>,
}

impl DeterminismEnvelope {
    /// Creates a live envelope. `now` is sampled once by the caller at the
    /// pipeline boundary and reused by every operator in the run.
    #[must_use]
    pub const fn live(now: UtcTimestamp) -> Self {
        Self {
            mode: DeterminismMode::Live,
            now,
            seed: None,
            run_id: None,
        }
    }

    /// Creates a pinned envelope with a frozen timestamp, id seed, and
    /// run id.
    #[must_use]
    pub fn pinned(now: UtcTimestamp, seed: impl Into<String>, run_id: RunId) -> Self {
        Self {
            mode: DeterminismMode::Pinned,
            now,
            seed: Some(seed.into()),
            run_id: Some(run_id),
        }
    }

    /// The mode of this envelope.
    #[must_use]
    pub const fn mode(&self) -> DeterminismMode {
        self.mode
    }

    /// The run's single `now`.
    #[must_use]
    pub const fn now(&self) -> UtcTimestamp {
        self.now
    }

    /// The pinned run id, when present.
    #[must_use]
    pub const fn run_id(&self) -> Option<&RunId> {
        self.run_id.as_ref()
    }

    /// Builds the id minter for this envelope: seeded in pinned mode,
    /// random in live mode.
    #[must_use]
    pub fn id_minter(&self) -> IdMinter {
        match &self.seed {
            Some(seed) => IdMinter::pinned(self.now, seed.clone()),
            None => IdMinter::live(self.now),
        }
    }

    /// The context payload recorded in pinned artifacts; `None` in live
    /// mode (live artifacts omit the field entirely).
    #[must_use]
    pub fn context(&self) -> Option<DeterminismContext> {
        match (&self.seed, &self.run_id) {
            (Some(seed), Some(run_id)) => Some(DeterminismContext {
                seed: seed.clone(),
                timestamp_utc: self.now.to_string(),
                run_id: run_id.to_string(),
            }),
            _ => None,
        }
    }
}
