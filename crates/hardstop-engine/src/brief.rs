//! The brief read-model builder.
//!
//! Assembles a versioned, deterministic envelope over the alert store:
//! counts, the top impactful alerts, updated/created partitions, tier
//! counts, and suppression rollups. Everything is sorted by the declared
//! total order; `alert_id` breaks every final tie, so no ordering is left
//! to implementation choice. Rendering (Markdown, JSON presentation) is an
//! external concern; the builder never re-sorts for presentation.

use std::collections::BTreeMap;

use chrono::Duration;
use serde::{Deserialize, Serialize};

use hardstop_core::{Error, Result, UtcTimestamp};
use hardstop_store::{Alert, AlertStore, CorrelationAction, RawItemStore};

/// The envelope version; additive evolution only.
pub const READ_MODEL_VERSION: &str = "brief.v1";

/// Operator identity recorded in RunRecords.
pub const OPERATOR_ID: &str = "brief.build@1.0.0";

/// Supported brief windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BriefWindow {
    /// Last 24 hours.
    #[serde(rename = "24h")]
    H24,
    /// Last 72 hours.
    #[serde(rename = "72h")]
    H72,
    /// Last 168 hours (7 days).
    #[serde(rename = "168h")]
    H168,
}

impl BriefWindow {
    /// The window length in hours.
    #[must_use]
    pub const fn hours(&self) -> i64 {
        match self {
            Self::H24 => 24,
            Self::H72 => 72,
            Self::H168 => 168,
        }
    }

    /// Parses `24h` / `72h` / `168h`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigParse`] for anything else.
    pub fn parse(raw: &str) -> Result<Self> {
        match raw {
            "24h" => Ok(Self::H24),
            "72h" => Ok(Self::H72),
            "168h" | "7d" => Ok(Self::H168),
            other => Err(Error::config_parse(format!(
                "brief window must be one of 24h, 72h, 168h; got '{other}'"
            ))),
        }
    }

    /// The window label used in the envelope.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::H24 => "24h",
            Self::H72 => "72h",
            Self::H168 => "168h",
        }
    }
}

/// One alert row in the brief.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BriefAlert {
    /// Alert id.
    pub alert_id: String,
    /// Classification.
    pub classification: u8,
    /// Impact score.
    pub impact_score: i64,
    /// Summary line.
    pub summary: String,
    /// Correlation key.
    pub correlation_key: String,
    /// CREATED or UPDATED.
    pub correlation_action: CorrelationAction,
    /// Facility ids in scope.
    pub facilities: Vec<String>,
    /// Lane ids in scope.
    pub lanes: Vec<String>,
    /// Shipments shown / total linked.
    pub shipments_shown: usize,
    /// Untruncated shipment count.
    pub shipments_total_linked: usize,
    /// First seen.
    pub first_seen_utc: UtcTimestamp,
    /// Last seen.
    pub last_seen_utc: UtcTimestamp,
    /// Update count.
    pub update_count: u64,
    /// Source tier name.
    pub tier: String,
    /// Trust tier of the last updater.
    pub trust_tier: u8,
}

impl BriefAlert {
    fn from_alert(alert: &Alert) -> Self {
        Self {
            alert_id: alert.alert_id.to_string(),
            classification: alert.classification,
            impact_score: alert.impact_score,
            summary: alert.summary.clone(),
            correlation_key: alert.correlation_key.clone(),
            correlation_action: alert.correlation_action,
            facilities: alert.scope.facilities.clone(),
            lanes: alert.scope.lanes.clone(),
            shipments_shown: alert.scope.shipments.len(),
            shipments_total_linked: alert.scope.shipments_total_linked,
            first_seen_utc: alert.first_seen_utc,
            last_seen_utc: alert.last_seen_utc,
            update_count: alert.update_count,
            tier: alert.tier.as_str().to_owned(),
            trust_tier: alert.trust_tier.get(),
        }
    }
}

/// Alert counts by lifecycle and classification.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BriefCounts {
    /// Alerts created in the window.
    pub new: usize,
    /// Alerts updated in the window.
    pub updated: usize,
    /// Classification-2 alerts.
    pub impactful: usize,
    /// Classification-1 alerts.
    pub relevant: usize,
    /// Classification-0 alerts.
    pub interesting: usize,
}

/// A per-rule suppression rollup row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleRollup {
    /// The primary rule that suppressed the items.
    pub rule_id: String,
    /// Suppressed-item count.
    pub count: usize,
}

/// A per-source suppression rollup row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRollup {
    /// The source the suppressed items came from.
    pub source_id: String,
    /// Suppressed-item count.
    pub count: usize,
}

/// The suppression section of the brief.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BriefSuppressed {
    /// Total suppressed items in the window.
    pub count: usize,
    /// Top rules by count (max 5).
    pub by_rule: Vec<RuleRollup>,
    /// Top sources by count (max 5).
    pub by_source: Vec<SourceRollup>,
}

/// The deterministic brief envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Brief {
    /// Envelope version.
    pub read_model_version: String,
    /// When the brief was built.
    pub generated_at_utc: UtcTimestamp,
    /// The window label (`24h`, `72h`, `168h`).
    pub since: String,
    /// Counts by lifecycle and classification.
    pub counts: BriefCounts,
    /// Counts by tier (`global`, `regional`, `local`, `unknown`).
    pub tier_counts: BTreeMap<String, usize>,
    /// Up to `top_cap` classification-2 alerts in declared order.
    pub top: Vec<BriefAlert>,
    /// Updated alerts, capped by limit.
    pub updated: Vec<BriefAlert>,
    /// Created alerts, capped by limit.
    pub created: Vec<BriefAlert>,
    /// Suppression rollups.
    pub suppressed: BriefSuppressed,
}

/// The brief builder.
#[derive(Debug)]
pub struct BriefBuilder {
    limit: usize,
    top_cap: usize,
    include_class0: bool,
}

impl BriefBuilder {
    /// Creates a builder with the given per-section limit and top cap.
    #[must_use]
    pub const fn new(limit: usize, top_cap: usize, include_class0: bool) -> Self {
        Self {
            limit,
            top_cap,
            include_class0,
        }
    }

    /// Builds the envelope at a cutoff. Building twice from the same store
    /// at the same cutoff yields identical bytes.
    ///
    /// # Errors
    ///
    /// Returns a storage error when the underlying stores fail.
    pub fn build(
        &self,
        alerts: &dyn AlertStore,
        raw_items: &dyn RawItemStore,
        window: BriefWindow,
        now: UtcTimestamp,
    ) -> Result<Brief> {
        let cutoff = now.plus(-Duration::hours(window.hours()));

        let mut rows = alerts.list_since(cutoff)?;
        if !self.include_class0 {
            rows.retain(|a| a.classification > 0);
        }
        sort_declared_order(&mut rows);

        let brief_rows: Vec<BriefAlert> = rows.iter().map(BriefAlert::from_alert).collect();

        let created: Vec<BriefAlert> = brief_rows
            .iter()
            .filter(|a| a.correlation_action == CorrelationAction::Created)
            .take(self.limit)
            .cloned()
            .collect();
        let updated: Vec<BriefAlert> = brief_rows
            .iter()
            .filter(|a| a.correlation_action == CorrelationAction::Updated)
            .take(self.limit)
            .cloned()
            .collect();
        let top: Vec<BriefAlert> = brief_rows
            .iter()
            .filter(|a| a.classification == 2)
            .take(self.top_cap)
            .cloned()
            .collect();

        // Counts are over the whole window, not the capped sections.
        let counts = BriefCounts {
            new: brief_rows
                .iter()
                .filter(|a| a.correlation_action == CorrelationAction::Created)
                .count(),
            updated: brief_rows
                .iter()
                .filter(|a| a.correlation_action == CorrelationAction::Updated)
                .count(),
            impactful: brief_rows.iter().filter(|a| a.classification == 2).count(),
            relevant: brief_rows.iter().filter(|a| a.classification == 1).count(),
            interesting: brief_rows.iter().filter(|a| a.classification == 0).count(),
        };

        let mut tier_counts: BTreeMap<String, usize> = BTreeMap::new();
        for key in ["global", "regional", "local", "unknown"] {
            tier_counts.insert(key.to_owned(), 0);
        }
        for row in &brief_rows {
            *tier_counts.entry(row.tier.clone()).or_insert(0) += 1;
        }

        let suppressed = suppression_rollups(raw_items, cutoff)?;

        Ok(Brief {
            read_model_version: READ_MODEL_VERSION.to_owned(),
            generated_at_utc: now,
            since: window.label().to_owned(),
            counts,
            tier_counts,
            top,
            updated,
            created,
            suppressed,
        })
    }
}

/// The declared total order: classification desc, impact desc, update
/// count desc, last seen desc, alert id asc.
fn sort_declared_order(rows: &mut [Alert]) {
    rows.sort_by(|a, b| {
        b.classification
            .cmp(&a.classification)
            .then(b.impact_score.cmp(&a.impact_score))
            .then(b.update_count.cmp(&a.update_count))
            .then(b.last_seen_utc.cmp(&a.last_seen_utc))
            .then(a.alert_id.cmp(&b.alert_id))
    });
}

fn suppression_rollups(
    raw_items: &dyn RawItemStore,
    cutoff: UtcTimestamp,
) -> Result<BriefSuppressed> {
    let suppressed = raw_items.list_suppressed_since(cutoff)?;

    let mut by_rule: BTreeMap<String, usize> = BTreeMap::new();
    let mut by_source: BTreeMap<String, usize> = BTreeMap::new();
    for item in &suppressed {
        if let Some(stamp) = &item.suppression {
            *by_rule.entry(stamp.primary_rule_id.clone()).or_insert(0) += 1;
        }
        *by_source.entry(item.source_id.clone()).or_insert(0) += 1;
    }

    Ok(BriefSuppressed {
        count: suppressed.len(),
        by_rule: top_rollups(by_rule)
            .into_iter()
            .map(|(rule_id, count)| RuleRollup { rule_id, count })
            .collect(),
        by_source: top_rollups(by_source)
            .into_iter()
            .map(|(source_id, count)| SourceRollup { source_id, count })
            .collect(),
    })
}

/// Top five rollups: count descending, id ascending on ties.
fn top_rollups(counts: BTreeMap<String, usize>) -> Vec<(String, usize)> {
    let mut rollups: Vec<(String, usize)> = counts.into_iter().collect();
    rollups.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    rollups.truncate(5);
    rollups
}
