//! The user-owned network graph: facilities, lanes, shipments.
//!
//! Loaded from the user's datasets by an external collaborator (CSV loaders
//! are out of scope); the pipeline only ever reads it. Missing datasets are
//! tolerated; an empty snapshot produces empty linkage, never an error.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A plant, distribution center, or port in the user's network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Facility {
    /// Facility id (e.g. `PLANT-01`).
    pub facility_id: String,
    /// Display name.
    pub name: String,
    /// City.
    pub city: Option<String>,
    /// State or province code.
    pub state: Option<String>,
    /// Country code.
    pub country: Option<String>,
    /// Facility type (`PLANT`, `DC`, `PORT`, …).
    pub facility_type: String,
    /// Operational criticality, 0–10.
    pub criticality_score: i64,
}

/// A transport lane between two facilities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lane {
    /// Lane id (e.g. `LANE-001`).
    pub lane_id: String,
    /// Origin facility.
    pub origin_facility_id: String,
    /// Destination facility.
    pub dest_facility_id: String,
    /// Traffic volume, 0–10.
    pub volume_score: i64,
}

/// Lifecycle status of a shipment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ShipmentStatus {
    /// Not yet departed.
    Pending,
    /// On the move.
    InTransit,
    /// Booked for a future departure.
    Scheduled,
    /// Arrived.
    Delivered,
    /// Cancelled.
    Cancelled,
}

impl ShipmentStatus {
    /// True for statuses the linker considers active.
    #[must_use]
    pub const fn is_linkable(&self) -> bool {
        matches!(self, Self::Pending | Self::InTransit | Self::Scheduled)
    }
}

/// A shipment moving on a lane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shipment {
    /// Shipment id (e.g. `SHP-1001`).
    pub shipment_id: String,
    /// The lane it moves on.
    pub lane_id: String,
    /// Lifecycle status.
    pub status: ShipmentStatus,
    /// ETA as the source recorded it; date-only values mean end of day.
    pub eta_date: Option<String>,
    /// True for priority shipments.
    pub priority: bool,
}

/// Read-only snapshot of the network graph.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetworkSnapshot {
    facilities: BTreeMap<String, Facility>,
    lanes: BTreeMap<String, Lane>,
    shipments: BTreeMap<String, Shipment>,
}

impl NetworkSnapshot {
    /// Builds a snapshot from loaded datasets.
    #[must_use]
    pub fn new(
        facilities: Vec<Facility>,
        lanes: Vec<Lane>,
        shipments: Vec<Shipment>,
    ) -> Self {
        Self {
            facilities: facilities
                .into_iter()
                .map(|f| (f.facility_id.clone(), f))
                .collect(),
            lanes: lanes.into_iter().map(|l| (l.lane_id.clone(), l)).collect(),
            shipments: shipments
                .into_iter()
                .map(|s| (s.shipment_id.clone(), s))
                .collect(),
        }
    }

    /// True when no dataset was loaded at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.facilities.is_empty() && self.lanes.is_empty() && self.shipments.is_empty()
    }

    /// Looks up one facility.
    #[must_use]
    pub fn facility(&self, id: &str) -> Option<&Facility> {
        self.facilities.get(id)
    }

    /// Looks up one lane.
    #[must_use]
    pub fn lane(&self, id: &str) -> Option<&Lane> {
        self.lanes.get(id)
    }

    /// Looks up one shipment.
    #[must_use]
    pub fn shipment(&self, id: &str) -> Option<&Shipment> {
        self.shipments.get(id)
    }

    /// All facilities in ascending id order.
    pub fn facilities(&self) -> impl Iterator<Item = &Facility> {
        self.facilities.values()
    }

    /// All lanes in ascending id order.
    pub fn lanes(&self) -> impl Iterator<Item = &Lane> {
        self.lanes.values()
    }

    /// All shipments in ascending id order.
    pub fn shipments(&self) -> impl Iterator<Item = &Shipment> {
        self.shipments.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_indexes_by_id() {
        let snapshot = NetworkSnapshot::new(
            vec![Facility {
                facility_id: "PLANT-01".into(),
                name: "Avon Plant".into(),
                city: Some("Avon".into()),
                state: Some("IN".into()),
                country: Some("US".into()),
                facility_type: "PLANT".into(),
                criticality_score: 9,
            }],
            vec![Lane {
                lane_id: "LANE-001".into(),
                origin_facility_id: "PLANT-01".into(),
                dest_facility_id: "DC-02".into(),
                volume_score: 7,
            }],
            vec![],
        );
        assert_eq!(snapshot.facility("PLANT-01").map(|f| f.criticality_score), Some(9));
        assert!(snapshot.shipment("SHP-404").is_none());
        assert!(!snapshot.is_empty());
    }

    #[test]
    fn linkable_statuses() {
        assert!(ShipmentStatus::Pending.is_linkable());
        assert!(ShipmentStatus::InTransit.is_linkable());
        assert!(ShipmentStatus::Scheduled.is_linkable());
        assert!(!ShipmentStatus::Delivered.is_linkable());
        assert!(!ShipmentStatus::Cancelled.is_linkable());
    }
}
