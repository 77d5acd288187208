//! Error types and result aliases for Hardstop.
//!
//! The variants mirror the failure taxonomy of the pipeline: fatal
//! configuration and schema problems, per-source fetch failures, and the
//! determinism violations strict mode hunts for. Warnings (unparseable
//! dates, partial linkage, degraded subscores) are *not* errors; they travel
//! in RunRecord diagnostics instead.

use std::fmt;

/// The result type used throughout Hardstop.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in Hardstop operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Configuration could not be parsed or violated its schema. Fatal to
    /// the run (exit code 2).
    #[error("config parse error: {message}")]
    ConfigParse {
        /// Description of what made the configuration invalid.
        message: String,
    },

    /// A required column is missing from the artifact store. Fatal.
    #[error("schema drift: {table}.{column} missing")]
    SchemaDrift {
        /// Table the missing column belongs to.
        table: String,
        /// The missing column.
        column: String,
    },

    /// A suppression rule failed to load (bad regex or duplicate id).
    /// Fatal at startup, never raised during evaluation.
    #[error("invalid suppression rule '{rule_id}': {message}")]
    InvalidSuppressionRule {
        /// Id of the offending rule.
        rule_id: String,
        /// Description of the problem.
        message: String,
    },

    /// Strict mode detected an unpinned nondeterministic input.
    #[error("determinism violation: {message}")]
    DeterminismViolation {
        /// Which nondeterministic source was consulted.
        message: String,
    },

    /// Two writers raced on the same correlation key. Retried once, then
    /// surfaced as an ingest failure for the affected source.
    #[error("correlation conflict on key '{correlation_key}'")]
    CorrelationConflict {
        /// The contested correlation key.
        correlation_key: String,
    },

    /// The pipeline was cancelled between operators or items.
    #[error("cancelled")]
    Cancelled,

    /// A storage operation failed.
    #[error("storage error: {message}")]
    Storage {
        /// Description of the storage failure.
        message: String,
        /// The underlying cause, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A serialization or canonicalization error occurred.
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of the serialization failure.
        message: String,
    },

    /// An invalid identifier was provided.
    #[error("invalid identifier: {message}")]
    InvalidId {
        /// Description of what made the id invalid.
        message: String,
    },

    /// The requested artifact was not found.
    #[error("not found: {resource_type} with id {id}")]
    NotFound {
        /// The type of artifact that was looked up.
        resource_type: &'static str,
        /// The identifier that was looked up.
        id: String,
    },

    /// An internal error that should not happen in normal operation.
    #[error("internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl Error {
    /// Creates a new storage error with the given message.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new storage error with a source cause.
    #[must_use]
    pub fn storage_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Storage {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a new config parse error.
    #[must_use]
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
        }
    }

    /// Creates a new not-found error.
    #[must_use]
    pub fn not_found(resource_type: &'static str, id: impl fmt::Display) -> Self {
        Self::NotFound {
            resource_type,
            id: id.to_string(),
        }
    }

    /// Creates a new internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// True if this error halts the whole pipeline rather than a single
    /// source or item.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ConfigParse { .. }
                | Self::SchemaDrift { .. }
                | Self::InvalidSuppressionRule { .. }
                | Self::DeterminismViolation { .. }
                | Self::Cancelled
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_classification() {
        assert!(Error::config_parse("bad yaml").is_fatal());
        assert!(Error::DeterminismViolation {
            message: "wall clock".into()
        }
        .is_fatal());
        assert!(!Error::storage("disk full").is_fatal());
        assert!(!Error::CorrelationConflict {
            correlation_key: "SAFETY|PLANT-01|*".into()
        }
        .is_fatal());
    }

    #[test]
    fn display_includes_context() {
        let err = Error::SchemaDrift {
            table: "alerts".into(),
            column: "correlation_key".into(),
        };
        assert_eq!(err.to_string(), "schema drift: alerts.correlation_key missing");
    }
}
