//! The impact scorer.
//!
//! A bounded integer score in `[0, 10]`: base subscores from the linked
//! network (facility criticality, lane volume, imminent priority shipments,
//! event-type keywords, ETA proximity) summed and clamped, then trust-tier
//! and per-source bias modifiers applied and clamped again. Scoring never
//! mutates its inputs and never fails; a subscore that cannot be computed
//! contributes 0 with a warning.

use serde::{Deserialize, Serialize};

use hardstop_core::config::ScoringThresholds;
use hardstop_core::{Diagnostic, ResolvedSource, UtcTimestamp};
use hardstop_store::{Event, NetworkSnapshot};

/// High-impact keywords that grant the event-type bonus.
const IMPACT_KEYWORDS: &[&str] = &["SPILL", "EXPLOSION", "CLOSURE", "RECALL", "EVACUATION"];

/// One contribution line inside the rationale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contribution {
    /// What contributed (`facility_criticality`, `lane_volume`, …).
    pub factor: String,
    /// The score delta.
    pub delta: i64,
    /// Entity ids involved, sorted.
    pub entity_ids: Vec<String>,
}

/// Network-derived contributions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkCriticality {
    /// Facility, lane, shipment, keyword, and proximity contributions in
    /// evaluation order.
    pub contributions: Vec<Contribution>,
    /// Priority shipment ids inside the ETA window, sorted.
    pub priority_shipment_ids: Vec<String>,
}

/// Post-clamp modifiers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Modifiers {
    /// Trust-tier delta (+1, 0, −1).
    pub trust_tier_delta: i64,
    /// Per-source weighting bias.
    pub bias_delta: i64,
    /// The trust tier the delta was derived from.
    pub asserted_trust_tier: u8,
}

/// Suppression context carried into the rationale.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuppressionContext {
    /// True when the scored event was suppressed (audit-only).
    pub suppressed: bool,
    /// Primary rule id, when suppressed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary_rule_id: Option<String>,
}

/// The score derivation trace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreTrace {
    /// Base score after the first clamp.
    pub base_score: i64,
    /// Final score after modifiers and the second clamp.
    pub final_score: i64,
    /// Matched impact keywords, sorted.
    pub matched_keywords: Vec<String>,
}

/// The full rationale payload stored under
/// `evidence.diagnostics.impact_score_rationale`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreRationale {
    /// Network contributions.
    pub network_criticality: NetworkCriticality,
    /// Post-clamp modifiers.
    pub modifiers: Modifiers,
    /// Suppression context.
    pub suppression_context: SuppressionContext,
    /// Derivation trace.
    pub score_trace: ScoreTrace,
}

/// The scorer's output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImpactScore {
    /// Final bounded score, `[0, 10]`.
    pub score: i64,
    /// Classification derived from the score and floor (0, 1, 2).
    pub classification: u8,
    /// True when the classification floor raised the result.
    pub raised_by_floor: bool,
    /// The rationale payload.
    pub rationale: ScoreRationale,
    /// Degradation warnings (unparseable ETAs).
    pub warnings: Vec<Diagnostic>,
}

/// The impact-scoring operator.
#[derive(Debug, Clone)]
pub struct ImpactScorer {
    thresholds: ScoringThresholds,
}

/// Operator identity recorded in RunRecords.
pub const OPERATOR_ID: &str = "impact.score@1.0.0";

impl ImpactScorer {
    /// Creates a scorer with the given cut points.
    #[must_use]
    pub const fn new(thresholds: ScoringThresholds) -> Self {
        Self { thresholds }
    }

    /// Scores one linked event. Never fails; degraded subscores contribute
    /// 0 and emit a warning.
    #[must_use]
    pub fn score(
        &self,
        event: &Event,
        network: &NetworkSnapshot,
        source: &ResolvedSource,
        now: UtcTimestamp,
    ) -> ImpactScore {
        let mut warnings = Vec::new();
        let mut contributions = Vec::new();
        let mut base: i64 = 0;

        // Facility criticality: +2 critical, else +1 notable.
        let mut critical: Vec<String> = Vec::new();
        let mut notable: Vec<String> = Vec::new();
        for id in &event.facilities {
            if let Some(f) = network.facility(id) {
                if f.criticality_score >= self.thresholds.critical_facility {
                    critical.push(id.clone());
                } else if f.criticality_score >= self.thresholds.notable_facility {
                    notable.push(id.clone());
                }
            }
        }
        if !critical.is_empty() {
            critical.sort();
            base += 2;
            contributions.push(Contribution {
                factor: "facility_criticality".into(),
                delta: 2,
                entity_ids: critical,
            });
        } else if !notable.is_empty() {
            notable.sort();
            base += 1;
            contributions.push(Contribution {
                factor: "facility_criticality".into(),
                delta: 1,
                entity_ids: notable,
            });
        }

        // Lane volume: +1 when any linked lane is high-volume.
        let mut busy_lanes: Vec<String> = event
            .lanes
            .iter()
            .filter(|id| {
                network
                    .lane(id)
                    .is_some_and(|l| l.volume_score >= self.thresholds.high_volume_lane)
            })
            .cloned()
            .collect();
        if !busy_lanes.is_empty() {
            busy_lanes.sort();
            base += 1;
            contributions.push(Contribution {
                factor: "lane_volume".into(),
                delta: 1,
                entity_ids: busy_lanes,
            });
        }

        // Priority shipments with imminent ETAs: +1 each, capped.
        let window_end = now.plus(chrono::Duration::hours(self.thresholds.eta_window_hours));
        let mut imminent_priority: Vec<String> = Vec::new();
        let mut nearest_eta: Option<UtcTimestamp> = None;
        for id in &event.shipments {
            let Some(shipment) = network.shipment(id) else {
                continue;
            };
            let Some(raw_eta) = shipment.eta_date.as_deref() else {
                continue;
            };
            let Some(eta) = hardstop_core::time::parse_eta_date(raw_eta) else {
                warnings.push(
                    Diagnostic::new("scoring_degraded", "unparseable shipment ETA")
                        .with_detail("shipment_id", id.clone().into())
                        .with_detail("eta_date", raw_eta.into()),
                );
                continue;
            };
            if nearest_eta.map_or(true, |n| eta < n) {
                nearest_eta = Some(eta);
            }
            if shipment.priority && eta >= now && eta <= window_end {
                imminent_priority.push(id.clone());
            }
        }
        if !imminent_priority.is_empty() {
            imminent_priority.sort();
            let delta = (imminent_priority.len() as i64).min(self.thresholds.priority_shipment_cap);
            base += delta;
            contributions.push(Contribution {
                factor: "priority_shipments_imminent".into(),
                delta,
                entity_ids: imminent_priority.clone(),
            });
        }

        // Event-type keyword bonus.
        let haystack = format!("{} {}", event.title, event.raw_text).to_uppercase();
        let mut matched_keywords: Vec<String> = IMPACT_KEYWORDS
            .iter()
            .filter(|kw| haystack.contains(**kw))
            .map(|kw| (*kw).to_owned())
            .collect();
        matched_keywords.sort();
        if !matched_keywords.is_empty() {
            base += 1;
            contributions.push(Contribution {
                factor: "event_type_keyword".into(),
                delta: 1,
                entity_ids: matched_keywords.clone(),
            });
        }

        // ETA proximity: nearest linked shipment inside the window.
        if nearest_eta.is_some_and(|eta| eta >= now && eta <= window_end) {
            base += 1;
            contributions.push(Contribution {
                factor: "eta_proximity".into(),
                delta: 1,
                entity_ids: Vec::new(),
            });
        }

        let base_score = base.clamp(0, 10);

        // Modifiers after the base clamp, then re-clamp.
        let trust_delta = source.trust_tier.score_delta();
        let bias_delta = i64::from(source.weighting_bias);
        let final_score = (base_score + trust_delta + bias_delta).clamp(0, 10);

        let raw_classification = classify(final_score);
        let classification = raw_classification.max(source.classification_floor);
        let raised_by_floor = classification > raw_classification;

        let rationale = ScoreRationale {
            network_criticality: NetworkCriticality {
                contributions,
                priority_shipment_ids: imminent_priority,
            },
            modifiers: Modifiers {
                trust_tier_delta: trust_delta,
                bias_delta,
                asserted_trust_tier: source.trust_tier.get(),
            },
            suppression_context: SuppressionContext {
                suppressed: event.is_suppressed(),
                primary_rule_id: event
                    .suppression
                    .as_ref()
                    .map(|s| s.primary_rule_id.clone()),
            },
            score_trace: ScoreTrace {
                base_score,
                final_score,
                matched_keywords,
            },
        };

        ImpactScore {
            score: final_score,
            classification,
            raised_by_floor,
            rationale,
            warnings,
        }
    }
}

/// Maps a bounded score to a classification: ≥7 Impactful, 4–6 Relevant,
/// ≤3 Interesting.
#[must_use]
pub const fn classify(score: i64) -> u8 {
    if score >= 7 {
        2
    } else if score >= 4 {
        1
    } else {
        0
    }
}
