//! The network linker: events resolve to facilities, lanes, shipments.
//!
//! Matching is a fixed cascade; explicit facility id in the event text,
//! then exact `(city, state)`, then city within the same country; with
//! ties broken by ascending facility id. Lanes follow matched facilities by
//! origin; shipments follow matched lanes inside the ETA horizon, ordered
//! priority-first and truncated at the configured cap. Missing network data
//! produces empty linkage and a warning, never an error.

use std::collections::BTreeMap;

use hardstop_core::{Diagnostic, UtcTimestamp};
use hardstop_store::{Event, NetworkSnapshot, Shipment};

/// Linkage produced for one event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkResult {
    /// Matched facility ids, sorted ascending.
    pub facilities: Vec<String>,
    /// Matched lane ids, sorted ascending.
    pub lanes: Vec<String>,
    /// Linked shipment ids, in `(priority desc, eta asc, id asc)` order,
    /// truncated to the cap.
    pub shipments: Vec<String>,
    /// Shipment count before truncation.
    pub shipments_total_linked: usize,
    /// True when the shipment list was truncated.
    pub shipments_truncated: bool,
    /// Human-readable linkage notes, in derivation order.
    pub notes: Vec<String>,
    /// Per-entity-class confidence, integer percent.
    pub confidence: BTreeMap<String, u8>,
    /// Per-entity-class provenance codes.
    pub provenance: BTreeMap<String, String>,
    /// Warnings (partial network data).
    pub warnings: Vec<Diagnostic>,
}

impl LinkResult {
    /// Copies the linkage onto an event.
    pub fn apply_to(&self, event: &mut Event) {
        event.facilities.clone_from(&self.facilities);
        event.lanes.clone_from(&self.lanes);
        event.shipments.clone_from(&self.shipments);
        event.shipments_total_linked = self.shipments_total_linked;
        event.shipments_truncated = self.shipments_truncated;
    }
}

/// The network-linking operator.
#[derive(Debug)]
pub struct NetworkLinker {
    max_shipments: usize,
    eta_horizon_days: i64,
}

/// Operator identity recorded in RunRecords.
pub const OPERATOR_ID: &str = "network.link@1.0.0";

impl NetworkLinker {
    /// Creates a linker with the given shipment cap and ETA horizon.
    #[must_use]
    pub const fn new(max_shipments: usize, eta_horizon_days: i64) -> Self {
        Self {
            max_shipments,
            eta_horizon_days,
        }
    }

    /// Links one event against a read-only network snapshot.
    #[must_use]
    pub fn link(&self, event: &Event, network: &NetworkSnapshot, now: UtcTimestamp) -> LinkResult {
        let mut result = LinkResult::default();

        if network.is_empty() {
            result.warnings.push(Diagnostic::new(
                "linkage_partial",
                "network snapshot is empty; linkage skipped",
            ));
            return result;
        }

        self.link_facilities(event, network, &mut result);
        if result.facilities.is_empty() {
            return result;
        }

        self.link_lanes(network, &mut result);
        if !result.lanes.is_empty() {
            self.link_shipments(network, now, &mut result);
        }
        result
    }

    fn link_facilities(&self, event: &Event, network: &NetworkSnapshot, result: &mut LinkResult) {
        let text = format!("{} {}", event.title, event.raw_text);

        // 1) Explicit facility id in the event text.
        let mut explicit: Vec<String> = network
            .facilities()
            .filter(|f| text.contains(&f.facility_id))
            .map(|f| f.facility_id.clone())
            .collect();
        if !explicit.is_empty() {
            explicit.sort();
            result.notes.push(format!(
                "Facility match by explicit id in text: {}",
                explicit.join(", ")
            ));
            result.confidence.insert("facility".into(), 95);
            result
                .provenance
                .insert("facility".into(), "FACILITY_ID_EXACT".into());
            result.facilities = explicit;
            return;
        }

        // 2) Exact (city, state) match.
        if let (Some(city), Some(state)) = (&event.city, &event.state) {
            let mut hits: Vec<String> = network
                .facilities()
                .filter(|f| {
                    f.city.as_deref().is_some_and(|c| c.eq_ignore_ascii_case(city))
                        && f.state.as_deref().is_some_and(|s| s.eq_ignore_ascii_case(state))
                })
                .map(|f| f.facility_id.clone())
                .collect();
            if !hits.is_empty() {
                hits.sort();
                result.notes.push(format!(
                    "Facility match by city/state: {city}, {state} -> {}",
                    hits.join(", ")
                ));
                result.confidence.insert("facility".into(), 70);
                result
                    .provenance
                    .insert("facility".into(), "CITY_STATE".into());
                result.facilities = hits;
                return;
            }
        }

        // 3) City within the same country.
        if let Some(city) = &event.city {
            let country = event.country.as_deref();
            let mut hits: Vec<String> = network
                .facilities()
                .filter(|f| {
                    f.city.as_deref().is_some_and(|c| c.eq_ignore_ascii_case(city))
                        && match (country, f.country.as_deref()) {
                            (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
                            _ => true,
                        }
                })
                .map(|f| f.facility_id.clone())
                .collect();
            if !hits.is_empty() {
                hits.sort();
                result
                    .notes
                    .push(format!("Facility match by city within country: {city} -> {}", hits.join(", ")));
                result.confidence.insert("facility".into(), 45);
                result
                    .provenance
                    .insert("facility".into(), "CITY_COUNTRY".into());
                result.facilities = hits;
                return;
            }
            result
                .notes
                .push(format!("No facility match for location: {city}"));
        }
    }

    fn link_lanes(&self, network: &NetworkSnapshot, result: &mut LinkResult) {
        let mut lanes: Vec<String> = network
            .lanes()
            .filter(|l| result.facilities.contains(&l.origin_facility_id))
            .map(|l| l.lane_id.clone())
            .collect();
        if lanes.is_empty() {
            return;
        }
        lanes.sort();
        result
            .notes
            .push(format!("Linked lanes via origin facility: {}", lanes.join(", ")));
        result.confidence.insert("lanes".into(), 70);
        result
            .provenance
            .insert("lanes".into(), "FACILITY_RELATION".into());
        result.lanes = lanes;
    }

    fn link_shipments(&self, network: &NetworkSnapshot, now: UtcTimestamp, result: &mut LinkResult) {
        let (shipments, total, truncated) = self.shipments_for_lanes(&result.lanes, network, now);
        if total == 0 {
            return;
        }
        result.shipments = shipments;
        result.shipments_total_linked = total;
        result.shipments_truncated = truncated;
        result.confidence.insert("shipments".into(), 60);
        result
            .provenance
            .insert("shipments".into(), "LANE_RELATION".into());
        result.notes.push(if truncated {
            format!(
                "Linked shipments via lanes: {} shown of {total} total",
                result.shipments.len()
            )
        } else {
            format!("Linked shipments via lanes: {total} shipments")
        });
    }

    /// Re-queries shipments for a lane set, honoring the same status/ETA
    /// filters, ordering, and truncation as event linkage. Used when a
    /// correlated update widens an alert's lane scope.
    ///
    /// Returns `(shipment_ids, untruncated_total, truncated)`.
    #[must_use]
    pub fn shipments_for_lanes(
        &self,
        lanes: &[String],
        network: &NetworkSnapshot,
        now: UtcTimestamp,
    ) -> (Vec<String>, usize, bool) {
        let horizon = now.plus(chrono::Duration::days(self.eta_horizon_days));

        let mut linkable: Vec<&Shipment> = network
            .shipments()
            .filter(|s| lanes.contains(&s.lane_id))
            .filter(|s| s.status.is_linkable())
            .filter(|s| {
                s.eta_date
                    .as_deref()
                    .and_then(hardstop_core::time::parse_eta_date)
                    .is_some_and(|eta| eta >= now && eta <= horizon)
            })
            .collect();

        linkable.sort_by(|a, b| {
            let eta_a = a.eta_date.as_deref().unwrap_or("9999-12-31");
            let eta_b = b.eta_date.as_deref().unwrap_or("9999-12-31");
            (!a.priority, eta_a, &a.shipment_id).cmp(&(!b.priority, eta_b, &b.shipment_id))
        });

        let total = linkable.len();
        let truncated = total > self.max_shipments;
        linkable.truncate(self.max_shipments);
        (
            linkable.iter().map(|s| s.shipment_id.clone()).collect(),
            total,
            truncated,
        )
    }
}
