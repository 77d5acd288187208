//! # hardstop-store
//!
//! The artifact store behind the Hardstop pipeline.
//!
//! This crate owns the six artifact kinds (`RawItem`, `Event`, `Alert`,
//! `SourceRun`, `IncidentEvidence` plus the user-owned network snapshot)
//! and exposes them through repository traits. The embedded-database choice
//! is an external collaborator: only the repository contract is specified,
//! and the in-memory implementations here are the reference semantics every
//! backend must reproduce; stable orderings, idempotent saves, append-only
//! telemetry, and key-scoped correlation locking.
//!
//! Schema evolution is additive-only and driven by the numbered migration
//! registry in [`migrate`].

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod alerts;
pub mod events;
pub mod evidence;
pub mod migrate;
pub mod network;
pub mod raw_items;
pub mod source_runs;

pub use alerts::{Alert, AlertDiagnostics, AlertEvidence, AlertScope, AlertStore, CorrelationAction, MemoryAlertStore};
pub use events::{Event, EventStore, EventType, MemoryEventStore};
pub use evidence::{
    EvidenceOverlap, EvidenceStore, IncidentEvidence, MemoryEvidenceStore, MergeReason,
};
pub use migrate::{Migration, MigrationRegistry, SchemaState};
pub use network::{Facility, Lane, NetworkSnapshot, Shipment, ShipmentStatus};
pub use raw_items::{MemoryRawItemStore, RawItem, RawItemStatus, RawItemStore, SaveOutcome, SuppressionStamp};
pub use source_runs::{MemorySourceRunStore, RunPhase, SourceRun, SourceRunStatus, SourceRunStore};

/// The full set of in-memory repositories a pipeline run needs.
///
/// One transactional scope per operator invocation is approximated by the
/// per-repository interior locks; a database-backed implementation would
/// wrap each operator invocation in a real transaction instead.
#[derive(Debug, Default)]
pub struct MemoryStores {
    /// Raw ingested payloads.
    pub raw_items: MemoryRawItemStore,
    /// Canonical events.
    pub events: MemoryEventStore,
    /// Materialized alerts.
    pub alerts: MemoryAlertStore,
    /// Per-source telemetry rows.
    pub source_runs: MemorySourceRunStore,
    /// Incident-evidence artifacts.
    pub evidence: MemoryEvidenceStore,
}

impl MemoryStores {
    /// Creates an empty store set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}
