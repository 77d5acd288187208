//! The incident-evidence builder.
//!
//! Every alert create/update gets a hashed artifact explaining the merge:
//! which reason codes applied, what entity overlap justified it, and the
//! determinism envelope it was produced under. In pinned mode the hash
//! covers the full view including timestamps; in live mode wall-clock
//! fields are scrubbed before hashing so replays stay comparable.

use hardstop_core::{
    artifact_hash, DeterminismEnvelope, DeterminismMode, Error, Result, UtcTimestamp,
};
use hardstop_store::{
    Alert, Event, EvidenceOverlap, IncidentEvidence, MergeReason,
};

use crate::correlator::CorrelationOutcome;

/// Operator identity recorded in RunRecords.
pub const OPERATOR_ID: &str = "incident.evidence@1.0.0";

/// Hours within which an update counts as temporally overlapping.
const TEMPORAL_OVERLAP_HOURS: i64 = 24;

/// The incident-evidence operator.
#[derive(Debug, Default)]
pub struct EvidenceBuilder;

impl EvidenceBuilder {
    /// Creates the operator.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Builds the artifact for one correlation outcome. Audit-only
    /// outcomes produce nothing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Serialization`] if the payload cannot be
    /// canonically serialized.
    pub fn build(
        &self,
        outcome: &CorrelationOutcome,
        event: &Event,
        envelope: &DeterminismEnvelope,
    ) -> Result<Option<IncidentEvidence>> {
        let (alert, previous) = match outcome {
            CorrelationOutcome::Created { alert } => (alert, None),
            CorrelationOutcome::Updated { alert, previous } => (alert, Some(previous)),
            CorrelationOutcome::AuditOnly => return Ok(None),
        };

        let (merge_reasons, overlap, merge_summary) =
            derive_merge_reasons(alert, previous, event, envelope.now());

        let mut artifact = IncidentEvidence {
            artifact_id: format!("incident-evidence:{}:{}", alert.alert_id, alert.update_count),
            alert_id: alert.alert_id.clone(),
            correlation_key: alert.correlation_key.clone(),
            root_event_ids: alert.root_event_ids.clone(),
            merge_reasons,
            overlap,
            merge_summary,
            determinism_mode: envelope.mode(),
            determinism_context: envelope.context(),
            generated_at_utc: Some(envelope.now()),
            artifact_hash: String::new(),
        };
        artifact.artifact_hash = hash_artifact(&artifact)?;
        Ok(Some(artifact))
    }
}

/// Hashes the artifact payload, excluding the hash field itself and, in
/// live mode, the wall-clock fields.
fn hash_artifact(artifact: &IncidentEvidence) -> Result<String> {
    let mut value = serde_json::to_value(artifact).map_err(|e| Error::Serialization {
        message: e.to_string(),
    })?;
    if let Some(map) = value.as_object_mut() {
        map.remove("artifact_hash");
        if artifact.determinism_mode == DeterminismMode::Live {
            map.remove("generated_at_utc");
        }
    }
    artifact_hash(&value).map_err(|e| Error::Serialization {
        message: e.to_string(),
    })
}

fn derive_merge_reasons(
    alert: &Alert,
    previous: Option<&Alert>,
    event: &Event,
    now: UtcTimestamp,
) -> (Vec<MergeReason>, EvidenceOverlap, Vec<String>) {
    let mut reasons = vec![MergeReason::SameCorrelationKey];
    let mut summary = vec![format!(
        "Correlation key matched: {}",
        alert.correlation_key
    )];
    let mut overlap = EvidenceOverlap::default();

    let Some(previous) = previous else {
        summary.push(format!("New alert {} materialized", alert.alert_id));
        return (reasons, overlap, summary);
    };

    let shared_facilities = intersect_sorted(&previous.scope.facilities, &event.facilities);
    if !shared_facilities.is_empty() {
        reasons.push(MergeReason::SharedFacilities);
        summary.push(format!("Shared facilities: {}", shared_facilities.join(", ")));
    }
    let shared_lanes = intersect_sorted(&previous.scope.lanes, &event.lanes);
    if !shared_lanes.is_empty() {
        reasons.push(MergeReason::SharedLanes);
        summary.push(format!("Shared lanes: {}", shared_lanes.join(", ")));
    }
    overlap = EvidenceOverlap {
        facilities: shared_facilities,
        lanes: shared_lanes,
    };

    let event_seen = event.published_at_utc.unwrap_or(now);
    let gap_hours = event_seen.since(&previous.last_seen_utc).num_hours().abs();
    if gap_hours <= TEMPORAL_OVERLAP_HOURS {
        reasons.push(MergeReason::TemporalOverlap);
        summary.push(format!(
            "Existing alert seen within {TEMPORAL_OVERLAP_HOURS}h (gap {gap_hours}h)"
        ));
    }

    reasons.sort();
    reasons.dedup();
    (reasons, overlap, summary)
}

fn intersect_sorted(a: &[String], b: &[String]) -> Vec<String> {
    let mut shared: Vec<String> = a.iter().filter(|x| b.contains(x)).cloned().collect();
    shared.sort();
    shared.dedup();
    shared
}

#[cfg(test)]
mod tests {
    use super::*;
    use hardstop_core::{AlertId, EventId, RawItemId, RunId, SourceTier, TrustTier};
    use hardstop_store::{AlertEvidence, AlertScope, CorrelationAction, EventType};
    use std::collections::BTreeMap;

    fn ts(s: &str) -> UtcTimestamp {
        s.parse().unwrap_or_else(|e| panic!("bad test timestamp {s}: {e}"))
    }

    fn pinned_envelope() -> DeterminismEnvelope {
        DeterminismEnvelope::pinned(
            ts("2025-12-29T17:00:00Z"),
            "demo-pinned-seed.v1",
            RunId::from("demo-golden-run.v1"),
        )
    }

    fn alert(id: &str, update_count: u64, last_seen: &str) -> Alert {
        Alert {
            alert_id: AlertId::from(id),
            risk_type: "SAFETY_AND_OPERATIONS".into(),
            classification: 2,
            status: "OPEN".into(),
            summary: "Spill at Avon".into(),
            root_event_id: EventId::from("EVT-1"),
            scope: AlertScope {
                facilities: vec!["PLANT-01".into()],
                lanes: vec!["LANE-001".into()],
                shipments: vec![],
                shipments_total_linked: 0,
                shipments_truncated: false,
            },
            impact_score: 8,
            correlation_key: "SAFETY|PLANT-01|LANE-001".into(),
            correlation_action: CorrelationAction::Created,
            first_seen_utc: ts("2025-12-29T17:00:00Z"),
            last_seen_utc: ts(last_seen),
            update_count,
            root_event_ids: vec![EventId::from("EVT-1")],
            tier: SourceTier::Global,
            source_id: "nws_active_us".into(),
            trust_tier: TrustTier::new(3).unwrap(),
            evidence: AlertEvidence::default(),
        }
    }

    fn event(id: &str, published: &str) -> Event {
        Event {
            event_id: EventId::from(id),
            raw_item_id: RawItemId::from("RAW-2"),
            source_type: "gov_alerts".into(),
            source_id: "nws_active_us".into(),
            title: "Spill update".into(),
            raw_text: String::new(),
            event_type: EventType::SafetyAndOperations,
            severity_guess: 2,
            city: None,
            state: None,
            country: None,
            facilities: vec!["PLANT-01".into()],
            lanes: vec!["LANE-001".into()],
            shipments: vec![],
            shipments_total_linked: 0,
            shipments_truncated: false,
            suppression: None,
            trust_tier: TrustTier::new(3).unwrap(),
            tier: SourceTier::Global,
            published_at_utc: Some(ts(published)),
            url: None,
            source_metadata: BTreeMap::new(),
        }
    }

    #[test]
    fn create_outcome_gets_minimal_reasons() {
        let builder = EvidenceBuilder::new();
        let outcome = CorrelationOutcome::Created {
            alert: alert("ALERT-1", 1, "2025-12-29T17:00:00Z"),
        };
        let artifact = builder
            .build(&outcome, &event("EVT-1", "2025-12-29T17:00:00Z"), &pinned_envelope())
            .unwrap()
            .unwrap();
        assert_eq!(artifact.merge_reasons, [MergeReason::SameCorrelationKey]);
        assert!(artifact.overlap.facilities.is_empty());
        assert_eq!(artifact.determinism_mode, DeterminismMode::Pinned);
        assert!(artifact.determinism_context.is_some());
    }

    #[test]
    fn update_within_24h_with_shared_entities_collects_all_reasons() {
        let builder = EvidenceBuilder::new();
        let outcome = CorrelationOutcome::Updated {
            alert: alert("ALERT-1", 2, "2025-12-29T23:00:00Z"),
            previous: alert("ALERT-1", 1, "2025-12-29T17:00:00Z"),
        };
        let artifact = builder
            .build(&outcome, &event("EVT-2", "2025-12-29T23:00:00Z"), &pinned_envelope())
            .unwrap()
            .unwrap();
        assert_eq!(
            artifact.merge_reasons,
            [
                MergeReason::SameCorrelationKey,
                MergeReason::SharedFacilities,
                MergeReason::SharedLanes,
                MergeReason::TemporalOverlap,
            ]
        );
        assert_eq!(artifact.overlap.facilities, ["PLANT-01"]);
        assert_eq!(artifact.overlap.lanes, ["LANE-001"]);
        assert!(artifact
            .merge_summary
            .iter()
            .any(|line| line.contains("Shared facilities: PLANT-01")));
    }

    #[test]
    fn update_outside_24h_drops_temporal_overlap() {
        let builder = EvidenceBuilder::new();
        let outcome = CorrelationOutcome::Updated {
            alert: alert("ALERT-1", 2, "2025-12-31T18:00:00Z"),
            previous: alert("ALERT-1", 1, "2025-12-29T17:00:00Z"),
        };
        let artifact = builder
            .build(&outcome, &event("EVT-2", "2025-12-31T18:00:00Z"), &pinned_envelope())
            .unwrap()
            .unwrap();
        assert!(!artifact.merge_reasons.contains(&MergeReason::TemporalOverlap));
    }

    #[test]
    fn audit_only_produces_no_artifact() {
        let builder = EvidenceBuilder::new();
        let artifact = builder
            .build(
                &CorrelationOutcome::AuditOnly,
                &event("EVT-1", "2025-12-29T17:00:00Z"),
                &pinned_envelope(),
            )
            .unwrap();
        assert!(artifact.is_none());
    }

    #[test]
    fn pinned_hash_is_replayable() {
        let builder = EvidenceBuilder::new();
        let make = || {
            let outcome = CorrelationOutcome::Created {
                alert: alert("ALERT-1", 1, "2025-12-29T17:00:00Z"),
            };
            builder
                .build(&outcome, &event("EVT-1", "2025-12-29T17:00:00Z"), &pinned_envelope())
                .unwrap()
                .unwrap()
        };
        assert_eq!(make().artifact_hash, make().artifact_hash);
    }

    #[test]
    fn live_hash_ignores_generated_at() {
        let builder = EvidenceBuilder::new();
        let build_at = |now: &str| {
            let outcome = CorrelationOutcome::Created {
                alert: alert("ALERT-1", 1, "2025-12-29T17:00:00Z"),
            };
            builder
                .build(
                    &outcome,
                    &event("EVT-1", "2025-12-29T17:00:00Z"),
                    &DeterminismEnvelope::live(ts(now)),
                )
                .unwrap()
                .unwrap()
        };
        let a = build_at("2025-12-29T17:00:00Z");
        let b = build_at("2025-12-29T18:30:00Z");
        assert_ne!(a.generated_at_utc, b.generated_at_utc);
        assert_eq!(a.artifact_hash, b.artifact_hash);
    }

    #[test]
    fn pinned_hash_covers_the_full_view() {
        // Different pinned timestamps hash differently: the context is in
        // the hashed view.
        let builder = EvidenceBuilder::new();
        let build_pinned = |now: &str| {
            let outcome = CorrelationOutcome::Created {
                alert: alert("ALERT-1", 1, "2025-12-29T17:00:00Z"),
            };
            builder
                .build(
                    &outcome,
                    &event("EVT-1", "2025-12-29T17:00:00Z"),
                    &DeterminismEnvelope::pinned(
                        ts(now),
                        "demo-pinned-seed.v1",
                        RunId::from("demo-golden-run.v1"),
                    ),
                )
                .unwrap()
                .unwrap()
        };
        let a = build_pinned("2025-12-29T17:00:00Z");
        let b = build_pinned("2025-12-30T17:00:00Z");
        assert_ne!(a.artifact_hash, b.artifact_hash);
    }
}
