//! The alert correlator.
//!
//! Events group into alerts under a stable `BUCKET|FACILITY|LANE` key
//! inside a sliding window. A miss creates; a hit updates; appending the
//! event, widening scope, refreshing last-updater fields, and taking the
//! monotonic max of impact scores. The lookup + upsert critical section is
//! serialized per correlation key, and a conflict is retried exactly once.
//! Suppressed events skip both paths; they exist only for the audit trail.

use chrono::Duration;
use tracing::debug;

use hardstop_core::{AlertId, Error, IdMinter, ResolvedSource, Result, UtcTimestamp};
use hardstop_store::{
    Alert, AlertDiagnostics, AlertEvidence, AlertScope, AlertStore, CorrelationAction, Event,
    EventType, NetworkSnapshot,
};

use crate::linker::{LinkResult, NetworkLinker};
use crate::scorer::{classify, ImpactScore};

/// Operator identity recorded in RunRecords.
pub const OPERATOR_ID: &str = "alert.correlate@1.0.0";

/// Pinned event-type → correlation-bucket mapping.
#[must_use]
pub const fn bucket_for(event_type: EventType) -> &'static str {
    match event_type {
        EventType::SafetyAndOperations => "SAFETY",
        EventType::Weather => "WEATHER",
        EventType::Strike => "STRIKE",
        EventType::Closure => "CLOSURE",
        EventType::Regulatory => "REG",
        EventType::Recall => "RECALL",
        EventType::Other => "OTHER",
    }
}

/// Builds the correlation key for a linked event: the bucket, the
/// lexicographically smallest facility (or `*`), and the smallest lane
/// (or `*`).
#[must_use]
pub fn correlation_key(event: &Event) -> String {
    let facility = event
        .facilities
        .iter()
        .min()
        .map_or("*", String::as_str);
    let lane = event.lanes.iter().min().map_or("*", String::as_str);
    format!("{}|{facility}|{lane}", bucket_for(event.event_type))
}

/// What the correlator did with an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CorrelationOutcome {
    /// A new alert was created.
    Created {
        /// The created alert.
        alert: Alert,
    },
    /// An existing alert absorbed the event.
    Updated {
        /// The alert after the update.
        alert: Alert,
        /// The alert as it stood before the update.
        previous: Alert,
    },
    /// The event was suppressed; audit trail only, no alert touched.
    AuditOnly,
}

impl CorrelationOutcome {
    /// The touched alert, when one was.
    #[must_use]
    pub const fn alert(&self) -> Option<&Alert> {
        match self {
            Self::Created { alert } | Self::Updated { alert, .. } => Some(alert),
            Self::AuditOnly => None,
        }
    }
}

/// The alert-correlation operator.
#[derive(Debug)]
pub struct AlertCorrelator {
    window_days: i64,
}

impl AlertCorrelator {
    /// Creates a correlator with the given sliding window.
    #[must_use]
    pub const fn new(window_days: i64) -> Self {
        Self { window_days }
    }

    /// Correlates one scored, linked event into the alert store.
    ///
    /// The alert id is minted up front (even when the event ends up
    /// updating an existing alert) so pinned-mode id sequences replay
    /// identically regardless of create/update outcomes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CorrelationConflict`] if the key stays contested
    /// after one retry, or a storage error from the alert store.
    #[allow(clippy::too_many_arguments)]
    pub fn correlate(
        &self,
        event: &Event,
        impact: &ImpactScore,
        link: &LinkResult,
        source: &ResolvedSource,
        alerts: &dyn AlertStore,
        linker: &NetworkLinker,
        network: &NetworkSnapshot,
        minter: &mut IdMinter,
        now: UtcTimestamp,
    ) -> Result<CorrelationOutcome> {
        let key = correlation_key(event);
        let candidate_id = minter.alert_id();

        if event.is_suppressed() {
            debug!(correlation_key = %key, event_id = %event.event_id, "suppressed event; audit only");
            return Ok(CorrelationOutcome::AuditOnly);
        }

        let first_attempt = self.correlate_locked(
            &key,
            candidate_id.clone(),
            event,
            impact,
            link,
            source,
            alerts,
            linker,
            network,
            now,
        );
        match first_attempt {
            Err(Error::CorrelationConflict { .. }) => self.correlate_locked(
                &key,
                candidate_id,
                event,
                impact,
                link,
                source,
                alerts,
                linker,
                network,
                now,
            ),
            other => other,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn correlate_locked(
        &self,
        key: &str,
        candidate_id: AlertId,
        event: &Event,
        impact: &ImpactScore,
        link: &LinkResult,
        source: &ResolvedSource,
        alerts: &dyn AlertStore,
        linker: &NetworkLinker,
        network: &NetworkSnapshot,
        now: UtcTimestamp,
    ) -> Result<CorrelationOutcome> {
        let seen_at = event.published_at_utc.unwrap_or(now);
        let window_start = now.plus(-Duration::days(self.window_days));
        let mut outcome: Option<CorrelationOutcome> = None;

        alerts.with_key_lock(key, &mut || {
            let existing = alerts.find_recent_by_key(key, window_start)?;
            let result = match existing {
                None => {
                    let alert = build_alert(
                        candidate_id.clone(),
                        key,
                        event,
                        impact,
                        link,
                        source,
                        seen_at,
                    );
                    alerts.insert(alert.clone())?;
                    CorrelationOutcome::Created { alert }
                }
                Some(previous) => {
                    let alert = merge_alert(
                        &previous, event, impact, link, source, linker, network, seen_at, now,
                    );
                    alerts.update(alert.clone())?;
                    CorrelationOutcome::Updated { alert, previous }
                }
            };
            outcome = Some(result);
            Ok(())
        })?;

        outcome.ok_or_else(|| Error::internal("correlation closure did not run"))
    }
}

fn build_alert(
    alert_id: AlertId,
    key: &str,
    event: &Event,
    impact: &ImpactScore,
    link: &LinkResult,
    source: &ResolvedSource,
    seen_at: UtcTimestamp,
) -> Alert {
    Alert {
        alert_id,
        risk_type: event.event_type.as_str().to_owned(),
        classification: impact.classification,
        status: "OPEN".to_owned(),
        summary: event.title.clone(),
        root_event_id: event.event_id.clone(),
        scope: AlertScope {
            facilities: event.facilities.clone(),
            lanes: event.lanes.clone(),
            shipments: event.shipments.clone(),
            shipments_total_linked: event.shipments_total_linked,
            shipments_truncated: event.shipments_truncated,
        },
        impact_score: impact.score,
        correlation_key: key.to_owned(),
        correlation_action: CorrelationAction::Created,
        first_seen_utc: seen_at,
        last_seen_utc: seen_at,
        update_count: 1,
        root_event_ids: vec![event.event_id.clone()],
        tier: event.tier,
        source_id: event.source_id.clone(),
        trust_tier: event.trust_tier,
        evidence: build_evidence(event, impact, link),
    }
}

#[allow(clippy::too_many_arguments)]
fn merge_alert(
    previous: &Alert,
    event: &Event,
    impact: &ImpactScore,
    link: &LinkResult,
    source: &ResolvedSource,
    linker: &NetworkLinker,
    network: &NetworkSnapshot,
    seen_at: UtcTimestamp,
    now: UtcTimestamp,
) -> Alert {
    let mut facilities = union_sorted(&previous.scope.facilities, &event.facilities);
    let mut lanes = union_sorted(&previous.scope.lanes, &event.lanes);
    facilities.dedup();
    lanes.dedup();

    // Shipments are re-queried over the widened lane set so truncation
    // rules hold for the merged scope.
    let (shipments, shipments_total_linked, shipments_truncated) =
        linker.shipments_for_lanes(&lanes, network, now);

    let mut root_event_ids = previous.root_event_ids.clone();
    root_event_ids.push(event.event_id.clone());

    let impact_score = previous.impact_score.max(impact.score);
    let classification = classify(impact_score).max(source.classification_floor);

    Alert {
        alert_id: previous.alert_id.clone(),
        risk_type: previous.risk_type.clone(),
        classification,
        status: previous.status.clone(),
        summary: event.title.clone(),
        root_event_id: previous.root_event_id.clone(),
        scope: AlertScope {
            facilities,
            lanes,
            shipments,
            shipments_total_linked,
            shipments_truncated,
        },
        impact_score,
        correlation_key: previous.correlation_key.clone(),
        correlation_action: CorrelationAction::Updated,
        first_seen_utc: previous.first_seen_utc,
        last_seen_utc: previous.last_seen_utc.max(seen_at),
        update_count: previous.update_count + 1,
        root_event_ids,
        tier: event.tier,
        source_id: event.source_id.clone(),
        trust_tier: event.trust_tier,
        evidence: build_evidence(event, impact, link),
    }
}

fn build_evidence(event: &Event, impact: &ImpactScore, link: &LinkResult) -> AlertEvidence {
    AlertEvidence {
        diagnostics: AlertDiagnostics {
            link_confidence: link.confidence.clone(),
            link_provenance: link.provenance.clone(),
            impact_score: impact.score,
            impact_score_rationale: serde_json::to_value(&impact.rationale)
                .unwrap_or(serde_json::Value::Null),
        },
        linking_notes: link.notes.clone(),
        source_metadata: event.source_metadata.clone(),
        incident_artifact_hash: None,
    }
}

fn union_sorted(a: &[String], b: &[String]) -> Vec<String> {
    let mut merged: Vec<String> = a.iter().chain(b.iter()).cloned().collect();
    merged.sort();
    merged
}
