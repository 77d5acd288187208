//! Additive-only schema evolution.
//!
//! Instead of ad-hoc "ensure column" helpers, the store carries a numbered
//! migration registry and a persisted schema version. Each migration adds
//! tables or columns and nothing else; dropping columns is forbidden by
//! construction. Applying the registry is idempotent; a store at version N
//! replays only migrations above N, and replaying an already-applied
//! migration is a no-op.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use hardstop_core::{Error, Result};

/// A single additive migration step.
#[derive(Debug, Clone)]
pub struct Migration {
    /// Monotonic version this migration brings the schema to.
    pub version: u32,
    /// Human-readable name.
    pub name: &'static str,
    /// Columns added, as `(table, column)` pairs. Creating a table is
    /// adding its first columns.
    pub add_columns: Vec<(&'static str, &'static str)>,
}

/// The store's current schema shape: tables and their columns.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaState {
    /// Persisted schema version; the highest applied migration.
    pub version: u32,
    /// Table name → column set.
    pub tables: BTreeMap<String, BTreeSet<String>>,
}

impl SchemaState {
    /// True if `table.column` exists.
    #[must_use]
    pub fn has_column(&self, table: &str, column: &str) -> bool {
        self.tables
            .get(table)
            .is_some_and(|cols| cols.contains(column))
    }

    /// Verifies a required column exists, surfacing schema drift otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SchemaDrift`] when the column is missing.
    pub fn require_column(&self, table: &str, column: &str) -> Result<()> {
        if self.has_column(table, column) {
            Ok(())
        } else {
            Err(Error::SchemaDrift {
                table: table.to_owned(),
                column: column.to_owned(),
            })
        }
    }
}

/// The ordered list of migrations a store applies on startup.
#[derive(Debug, Clone)]
pub struct MigrationRegistry {
    migrations: Vec<Migration>,
}

impl MigrationRegistry {
    /// Builds a registry, validating that versions are strictly increasing
    /// and start at 1.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Internal`] when versions are not strictly
    /// increasing.
    pub fn new(migrations: Vec<Migration>) -> Result<Self> {
        let mut last = 0;
        for m in &migrations {
            if m.version <= last {
                return Err(Error::internal(format!(
                    "migration versions must be strictly increasing; {} follows {last}",
                    m.version
                )));
            }
            last = m.version;
        }
        Ok(Self { migrations })
    }

    /// The built-in registry for the Hardstop artifact store.
    ///
    /// # Panics
    ///
    /// Never panics: the built-in list is ordered by construction.
    #[must_use]
    pub fn builtin() -> Self {
        Self::new(builtin_migrations()).unwrap_or_else(|e| {
            // The list below is static and ordered.
            unreachable!("builtin migration registry invalid: {e}")
        })
    }

    /// Applies all pending migrations to `state`, bumping its version.
    /// Already-applied migrations are skipped; re-adding an existing column
    /// is a no-op, so a partially applied migration can be replayed safely.
    pub fn apply(&self, state: &mut SchemaState) {
        for m in &self.migrations {
            if m.version <= state.version {
                continue;
            }
            for (table, column) in &m.add_columns {
                state
                    .tables
                    .entry((*table).to_owned())
                    .or_default()
                    .insert((*column).to_owned());
            }
            state.version = m.version;
        }
    }
}

fn builtin_migrations() -> Vec<Migration> {
    vec![
        Migration {
            version: 1,
            name: "baseline",
            add_columns: vec![
                ("raw_items", "raw_item_id"),
                ("raw_items", "source_id"),
                ("raw_items", "canonical_id"),
                ("raw_items", "content_hash"),
                ("raw_items", "title"),
                ("raw_items", "summary"),
                ("raw_items", "raw_text"),
                ("raw_items", "url"),
                ("raw_items", "published_at_utc"),
                ("raw_items", "fetched_at_utc"),
                ("raw_items", "status"),
                ("events", "event_id"),
                ("events", "source_id"),
                ("events", "title"),
                ("events", "raw_text"),
                ("events", "event_type"),
                ("events", "severity_guess"),
                ("events", "published_at_utc"),
                ("alerts", "alert_id"),
                ("alerts", "risk_type"),
                ("alerts", "classification"),
                ("alerts", "status"),
                ("alerts", "summary"),
                ("alerts", "root_event_id"),
                ("alerts", "impact_score"),
                ("source_runs", "run_group_id"),
                ("source_runs", "phase"),
                ("source_runs", "source_id"),
                ("source_runs", "status"),
                ("source_runs", "run_at_utc"),
            ],
        },
        Migration {
            version: 2,
            name: "alert_correlation",
            add_columns: vec![
                ("alerts", "correlation_key"),
                ("alerts", "correlation_action"),
                ("alerts", "first_seen_utc"),
                ("alerts", "last_seen_utc"),
                ("alerts", "update_count"),
                ("alerts", "root_event_ids"),
            ],
        },
        Migration {
            version: 3,
            name: "trust_weighting",
            add_columns: vec![
                ("raw_items", "trust_tier"),
                ("raw_items", "tier"),
                ("alerts", "tier"),
                ("alerts", "source_id"),
                ("alerts", "trust_tier"),
                ("events", "trust_tier"),
                ("events", "tier"),
            ],
        },
        Migration {
            version: 4,
            name: "suppression_metadata",
            add_columns: vec![
                ("raw_items", "suppression_primary_rule_id"),
                ("raw_items", "suppression_rule_ids"),
                ("raw_items", "suppression_reason_code"),
                ("raw_items", "suppressed_at_utc"),
                ("raw_items", "suppression_stage"),
                ("events", "suppression_primary_rule_id"),
                ("events", "suppression_reason_code"),
            ],
        },
        Migration {
            version: 5,
            name: "incident_evidence",
            add_columns: vec![
                ("incident_evidence", "artifact_id"),
                ("incident_evidence", "alert_id"),
                ("incident_evidence", "merge_reasons"),
                ("incident_evidence", "artifact_hash"),
                ("alerts", "evidence"),
            ],
        },
        Migration {
            version: 6,
            name: "source_run_counters",
            add_columns: vec![
                ("source_runs", "status_code"),
                ("source_runs", "error"),
                ("source_runs", "duration_ms"),
                ("source_runs", "items_fetched"),
                ("source_runs", "items_new"),
                ("source_runs", "items_processed"),
                ("source_runs", "items_suppressed"),
                ("source_runs", "items_events_created"),
                ("source_runs", "items_alerts_touched"),
                ("source_runs", "bytes_downloaded"),
                ("source_runs", "diagnostics"),
            ],
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_registry_applies_cleanly() {
        let mut state = SchemaState::default();
        MigrationRegistry::builtin().apply(&mut state);
        assert_eq!(state.version, 6);
        assert!(state.has_column("alerts", "correlation_key"));
        assert!(state.has_column("source_runs", "items_suppressed"));
    }

    #[test]
    fn apply_is_idempotent() {
        let registry = MigrationRegistry::builtin();
        let mut once = SchemaState::default();
        registry.apply(&mut once);
        let mut twice = once.clone();
        registry.apply(&mut twice);
        assert_eq!(once.version, twice.version);
        assert_eq!(once.tables, twice.tables);
    }

    #[test]
    fn partial_state_only_replays_pending() {
        let registry = MigrationRegistry::builtin();
        let mut state = SchemaState::default();
        registry.apply(&mut state);

        // Simulate a store stuck at version 2: columns from later
        // migrations are missing until apply() runs.
        let mut old = SchemaState {
            version: 2,
            ..SchemaState::default()
        };
        registry.apply(&mut old);
        assert_eq!(old.version, 6);
        assert!(old.has_column("raw_items", "trust_tier"));
        // Columns from migrations <= 2 were never applied to this state and
        // must not reappear out of nowhere.
        assert!(!old.has_column("alerts", "correlation_key"));
    }

    #[test]
    fn require_column_surfaces_drift() {
        let state = SchemaState::default();
        let err = state.require_column("alerts", "correlation_key").unwrap_err();
        assert_eq!(
            err.to_string(),
            "schema drift: alerts.correlation_key missing"
        );
    }

    #[test]
    fn out_of_order_versions_rejected() {
        let result = MigrationRegistry::new(vec![
            Migration {
                version: 2,
                name: "later",
                add_columns: vec![],
            },
            Migration {
                version: 1,
                name: "earlier",
                add_columns: vec![],
            },
        ]);
        assert!(result.is_err());
    }
}
