//! The fetch collaborator contract.
//!
//! HTTP clients and feed adapters live outside the core; the pipeline only
//! consumes their output: one [`FetchOutcome`] per enabled source, carrying
//! the candidate items plus the telemetry that becomes the FETCH SourceRun.
//! A timed-out or failed fetch arrives as a failure outcome and is never
//! raised out of the adapter.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use hardstop_core::UtcTimestamp;

/// A candidate item handed over by a source adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchedItem {
    /// Source-supplied stable id, when the feed has one.
    pub canonical_id: Option<String>,
    /// Item title.
    pub title: String,
    /// Item summary.
    pub summary: String,
    /// Full raw text.
    pub raw_text: String,
    /// Item URL.
    pub url: Option<String>,
    /// Publication timestamp, when the feed supplied one.
    pub published_at_utc: Option<UtcTimestamp>,
    /// The source-shaped payload, preserved verbatim.
    #[serde(default)]
    pub payload: BTreeMap<String, Value>,
}

/// The result of fetching one source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchOutcome {
    /// Source id.
    pub source_id: String,
    /// True when the fetch completed (possibly with zero items).
    pub success: bool,
    /// HTTP status code, when applicable.
    pub status_code: Option<u16>,
    /// Error message on failure.
    pub error: Option<String>,
    /// Fetched items, in feed order.
    pub items: Vec<FetchedItem>,
    /// Bytes downloaded.
    pub bytes_downloaded: u64,
    /// Wall time in milliseconds.
    pub duration_ms: u64,
}

impl FetchOutcome {
    /// A successful outcome with the given items.
    #[must_use]
    pub fn success(source_id: impl Into<String>, items: Vec<FetchedItem>) -> Self {
        Self {
            source_id: source_id.into(),
            success: true,
            status_code: Some(200),
            error: None,
            items,
            bytes_downloaded: 0,
            duration_ms: 0,
        }
    }

    /// A failed outcome with a status code and error message.
    #[must_use]
    pub fn failure(
        source_id: impl Into<String>,
        status_code: Option<u16>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            success: false,
            status_code,
            error: Some(error.into()),
            items: Vec::new(),
            bytes_downloaded: 0,
            duration_ms: 0,
        }
    }

    /// True when the fetch succeeded but returned no items.
    #[must_use]
    pub fn is_clean_zero(&self) -> bool {
        self.success && self.items.is_empty()
    }
}
