//! Command implementations and shared loading helpers.

pub mod brief;
pub mod doctor;
pub mod run;
pub mod sources;

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;

use hardstop_core::config::{RuntimeConfig, SourcesRegistry, SuppressionRegistry};
use hardstop_core::{DeterminismEnvelope, ResolvedConfig, RunId, UtcTimestamp};
use hardstop_engine::FetchOutcome;
use hardstop_store::NetworkSnapshot;

use crate::ConfigPaths;

/// Loads and resolves the three configuration inputs.
///
/// A missing runtime file falls back to defaults; a missing suppression
/// registry means "no rules". A missing sources registry is an error -
/// a run without sources is configuration breakage, not an empty default.
///
/// # Errors
///
/// Returns the underlying [`hardstop_core::Error::ConfigParse`] wrapped
/// with file context.
pub fn load_resolved_config(paths: &ConfigPaths) -> Result<ResolvedConfig, hardstop_core::Error> {
    let runtime = if paths.config.exists() {
        RuntimeConfig::from_yaml_str(&read_config_file(&paths.config)?)?
    } else {
        RuntimeConfig::default()
    };

    let sources_raw = read_config_file(&paths.sources)?;
    let registry = SourcesRegistry::from_yaml_str(&sources_raw)?;

    let suppression = if paths.suppression.exists() {
        SuppressionRegistry::from_yaml_str(&read_config_file(&paths.suppression)?)?
    } else {
        SuppressionRegistry::default()
    };

    ResolvedConfig::resolve(runtime, &registry, suppression)
}

fn read_config_file(path: &Path) -> Result<String, hardstop_core::Error> {
    fs::read_to_string(path).map_err(|e| {
        hardstop_core::Error::config_parse(format!("cannot read {}: {e}", path.display()))
    })
}

/// Pinned-mode flags shared by `run` and `brief`.
#[derive(Debug, clap::Args)]
pub struct DeterminismArgs {
    /// Freeze the run: seeded ids, pinned timestamp, pinned run id.
    #[arg(long)]
    pub pinned: bool,

    /// Pinned id seed (implies --pinned).
    #[arg(long, default_value = "demo-pinned-seed.v1")]
    pub pinned_seed: String,

    /// Pinned ISO 8601 timestamp (implies --pinned).
    #[arg(long)]
    pub pinned_timestamp: Option<String>,

    /// Pinned run identifier (implies --pinned).
    #[arg(long, default_value = "demo-golden-run.v1")]
    pub pinned_run_id: String,
}

impl DeterminismArgs {
    /// Builds the envelope. Live mode samples the wall clock exactly once,
    /// here at the boundary; the core never reads it.
    ///
    /// # Errors
    ///
    /// Returns an error for an unparseable pinned timestamp.
    pub fn envelope(&self) -> Result<DeterminismEnvelope> {
        if self.pinned || self.pinned_timestamp.is_some() {
            let now: UtcTimestamp = self
                .pinned_timestamp
                .as_deref()
                .unwrap_or("2025-12-29T17:00:00Z")
                .parse()
                .context("invalid --pinned-timestamp")?;
            Ok(DeterminismEnvelope::pinned(
                now,
                self.pinned_seed.clone(),
                RunId::from(self.pinned_run_id.as_str()),
            ))
        } else {
            Ok(DeterminismEnvelope::live(UtcTimestamp::new(Utc::now())))
        }
    }
}

/// Loads adapter fetch outcomes from a JSON handoff file.
///
/// # Errors
///
/// Returns an error when the file is missing or malformed.
pub fn load_outcomes(path: &Path) -> Result<Vec<FetchOutcome>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("cannot read fetch outcomes {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("malformed fetch outcomes {}", path.display()))
}

/// Loads the network snapshot from a JSON handoff file, or an empty
/// snapshot when no path was given (partial data is tolerated downstream).
///
/// # Errors
///
/// Returns an error when the given file is missing or malformed.
pub fn load_network(path: Option<&Path>) -> Result<NetworkSnapshot> {
    let Some(path) = path else {
        return Ok(NetworkSnapshot::default());
    };
    let raw = fs::read_to_string(path)
        .with_context(|| format!("cannot read network snapshot {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("malformed network snapshot {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    fn determinism_args(pinned: bool, timestamp: Option<&str>) -> DeterminismArgs {
        DeterminismArgs {
            pinned,
            pinned_seed: "demo-pinned-seed.v1".into(),
            pinned_timestamp: timestamp.map(ToOwned::to_owned),
            pinned_run_id: "demo-golden-run.v1".into(),
        }
    }

    #[test]
    fn pinned_envelope_freezes_the_timestamp() {
        let args = determinism_args(true, Some("2025-12-29T17:00:00Z"));
        let envelope = args.envelope().unwrap();
        assert_eq!(envelope.now().to_string(), "2025-12-29T17:00:00Z");
        assert!(envelope.context().is_some());
    }

    #[test]
    fn bad_pinned_timestamp_is_an_error() {
        let args = determinism_args(true, Some("yesterday-ish"));
        assert!(args.envelope().is_err());
    }

    #[test]
    fn live_envelope_has_no_context() {
        let args = determinism_args(false, None);
        assert!(args.envelope().unwrap().context().is_none());
    }

    #[test]
    fn missing_network_path_yields_empty_snapshot() {
        let snapshot = load_network(None).unwrap();
        assert!(snapshot.is_empty());
    }

    #[test]
    fn outcomes_round_trip_through_the_handoff_file() {
        let outcomes = vec![hardstop_engine::FetchOutcome::failure(
            "nws_active_us",
            Some(500),
            "HTTP 500",
        )];
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(serde_json::to_string(&outcomes).unwrap().as_bytes())
            .unwrap();

        let loaded = load_outcomes(file.path()).unwrap();
        assert_eq!(loaded, outcomes);
    }

    #[test]
    fn malformed_outcomes_fail_with_context() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"not json").unwrap();
        let err = load_outcomes(file.path()).unwrap_err();
        assert!(err.to_string().contains("malformed fetch outcomes"));
    }
}
