//! # hardstop-core
//!
//! Core primitives for the Hardstop decision engine.
//!
//! This crate provides the foundational types used across all Hardstop
//! components:
//!
//! - **Canonical JSON**: the single strict serializer that feeds every hash
//! - **Artifact hashing**: SHA-256 refs that make runs replayable
//! - **Identifiers**: strongly-typed ids with a pinnable minting scheme
//! - **Determinism envelope**: live vs. pinned execution context
//! - **Configuration**: registry models, tier-default folding, fingerprints
//! - **Provenance**: the RunRecord emitted by every operator invocation
//!
//! ## Crate boundary
//!
//! `hardstop-core` is the **only** crate allowed to define shared primitives.
//! The store and engine crates interact exclusively through types defined
//! here; nothing in this crate reads the wall clock or the filesystem on its
//! own; time and paths are always inputs.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod canonical_json;
pub mod config;
pub mod determinism;
pub mod error;
pub mod hash;
pub mod id;
pub mod observability;
pub mod provenance;
pub mod time;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::canonical_json::{to_canonical_bytes, to_canonical_string};
    pub use crate::config::{
        ResolvedConfig, ResolvedSource, RuleField, RuleKind, SourceTier, SuppressionRegistry,
        SuppressionRuleSpec, TrustTier,
    };
    pub use crate::determinism::{DeterminismContext, DeterminismEnvelope, DeterminismMode};
    pub use crate::error::{Error, Result};
    pub use crate::hash::{artifact_hash, ArtifactRef};
    pub use crate::id::{AlertId, EventId, IdMinter, RawItemId, RunGroupId, RunId};
    pub use crate::provenance::{
        Diagnostic, ExecutionMode, RunCost, RunRecord, RunRecordBuilder,
    };
    pub use crate::time::UtcTimestamp;
}

pub use config::{
    ResolvedConfig, ResolvedSource, RuleField, RuleKind, SourceTier, SuppressionRegistry,
    SuppressionRuleSpec, TrustTier,
};
pub use determinism::{DeterminismContext, DeterminismEnvelope, DeterminismMode};
pub use error::{Error, Result};
pub use hash::{artifact_hash, ArtifactRef};
pub use id::{AlertId, EventId, IdMinter, RawItemId, RunGroupId, RunId};
pub use observability::{init_logging, LogFormat};
pub use provenance::{Diagnostic, ExecutionMode, RunCost, RunRecord, RunRecordBuilder};
pub use time::UtcTimestamp;
