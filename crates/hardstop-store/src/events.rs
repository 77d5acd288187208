//! Canonical events.
//!
//! An event is the normalized form of exactly one raw item. Events are
//! immutable after creation; suppression metadata is stamped during
//! normalization, never afterwards.

use std::collections::BTreeMap;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use hardstop_core::{
    artifact_hash, ArtifactRef, Error, EventId, RawItemId, Result, SourceTier, TrustTier,
    UtcTimestamp,
};

use crate::raw_items::SuppressionStamp;

/// Canonical event taxonomy, inferred by ordered keyword matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    /// Spills, explosions, hazmat releases, industrial accidents.
    SafetyAndOperations,
    /// Storms, floods, and other weather disruptions.
    Weather,
    /// Labor actions.
    Strike,
    /// Road, port, or facility closures.
    Closure,
    /// Regulatory actions.
    Regulatory,
    /// Product recalls.
    Recall,
    /// Everything else.
    Other,
}

impl EventType {
    /// Stable SCREAMING_SNAKE_CASE name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::SafetyAndOperations => "SAFETY_AND_OPERATIONS",
            Self::Weather => "WEATHER",
            Self::Strike => "STRIKE",
            Self::Closure => "CLOSURE",
            Self::Regulatory => "REGULATORY",
            Self::Recall => "RECALL",
            Self::Other => "OTHER",
        }
    }
}

/// The canonical representation of a signal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Derived id, a pure function of the raw item.
    pub event_id: EventId,
    /// The raw item this event was normalized from.
    pub raw_item_id: RawItemId,
    /// Adapter type of the source.
    pub source_type: String,
    /// Source id.
    pub source_id: String,
    /// Event title.
    pub title: String,
    /// Full raw text.
    pub raw_text: String,
    /// Inferred event type.
    pub event_type: EventType,
    /// Coarse severity guess (1–5).
    pub severity_guess: u8,
    /// Extracted city, when present.
    pub city: Option<String>,
    /// Extracted state code, when present.
    pub state: Option<String>,
    /// Country, when known.
    pub country: Option<String>,
    /// Linked facility ids, sorted.
    pub facilities: Vec<String>,
    /// Linked lane ids, sorted.
    pub lanes: Vec<String>,
    /// Linked shipment ids, in linkage order (priority-first).
    pub shipments: Vec<String>,
    /// Untruncated shipment linkage count.
    pub shipments_total_linked: usize,
    /// True when the shipment list was truncated.
    pub shipments_truncated: bool,
    /// Suppression metadata, when the event was suppressed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suppression: Option<SuppressionStamp>,
    /// Trust tier of the source.
    pub trust_tier: TrustTier,
    /// Tier of the source.
    pub tier: SourceTier,
    /// Publication timestamp, when known.
    pub published_at_utc: Option<UtcTimestamp>,
    /// Item URL.
    pub url: Option<String>,
    /// Source metadata copied verbatim at normalization time.
    #[serde(default)]
    pub source_metadata: BTreeMap<String, Value>,
}

impl Event {
    /// True when this event carries a suppression stamp.
    #[must_use]
    pub const fn is_suppressed(&self) -> bool {
        self.suppression.is_some()
    }

    /// Builds this event's artifact ref.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Serialization`] if the event cannot be canonically
    /// serialized.
    pub fn artifact_ref(&self) -> Result<ArtifactRef> {
        let hash = artifact_hash(self).map_err(|e| Error::Serialization {
            message: e.to_string(),
        })?;
        Ok(ArtifactRef::new(
            format!("event:{}", self.event_id),
            "Event",
            hash,
        ))
    }
}

/// Repository contract for events.
pub trait EventStore {
    /// Appends an event. Events are immutable; re-inserting an existing id
    /// is an error.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the id already exists.
    fn insert(&self, event: Event) -> Result<()>;

    /// Fetches one event by id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] on backend failures.
    fn get(&self, id: &EventId) -> Result<Option<Event>>;

    /// True when an event for this id already exists.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] on backend failures.
    fn contains(&self, id: &EventId) -> Result<bool>;

    /// All events, ordered by event id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] on backend failures.
    fn list(&self) -> Result<Vec<Event>>;
}

/// In-memory reference implementation of [`EventStore`].
#[derive(Debug, Default)]
pub struct MemoryEventStore {
    rows: RwLock<BTreeMap<EventId, Event>>,
}

impl MemoryEventStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl EventStore for MemoryEventStore {
    fn insert(&self, event: Event) -> Result<()> {
        let mut rows = self
            .rows
            .write()
            .map_err(|_| Error::storage("event store lock poisoned"))?;
        if rows.contains_key(&event.event_id) {
            return Err(Error::storage(format!(
                "event {} already exists; events are immutable",
                event.event_id
            )));
        }
        rows.insert(event.event_id.clone(), event);
        Ok(())
    }

    fn get(&self, id: &EventId) -> Result<Option<Event>> {
        Ok(self
            .rows
            .read()
            .map_err(|_| Error::storage("event store lock poisoned"))?
            .get(id)
            .cloned())
    }

    fn contains(&self, id: &EventId) -> Result<bool> {
        Ok(self
            .rows
            .read()
            .map_err(|_| Error::storage("event store lock poisoned"))?
            .contains_key(id))
    }

    fn list(&self) -> Result<Vec<Event>> {
        Ok(self
            .rows
            .read()
            .map_err(|_| Error::storage("event store lock poisoned"))?
            .values()
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(id: &str) -> Event {
        Event {
            event_id: EventId::from(id),
            raw_item_id: RawItemId::from("RAW-1"),
            source_type: "gov_alerts".into(),
            source_id: "nws_active_us".into(),
            title: "Spill at Avon, Indiana".into(),
            raw_text: String::new(),
            event_type: EventType::SafetyAndOperations,
            severity_guess: 2,
            city: Some("Avon".into()),
            state: Some("IN".into()),
            country: Some("US".into()),
            facilities: vec![],
            lanes: vec![],
            shipments: vec![],
            shipments_total_linked: 0,
            shipments_truncated: false,
            suppression: None,
            trust_tier: TrustTier::default(),
            tier: SourceTier::Global,
            published_at_utc: None,
            url: None,
            source_metadata: BTreeMap::new(),
        }
    }

    #[test]
    fn events_are_immutable() {
        let store = MemoryEventStore::new();
        store.insert(event("EVT-1")).unwrap();
        assert!(store.insert(event("EVT-1")).is_err());
        assert!(store.contains(&EventId::from("EVT-1")).unwrap());
    }

    #[test]
    fn event_type_names_are_screaming_snake() {
        assert_eq!(
            serde_json::to_string(&EventType::SafetyAndOperations).unwrap(),
            r#""SAFETY_AND_OPERATIONS""#
        );
        assert_eq!(EventType::Recall.as_str(), "RECALL");
    }

    #[test]
    fn artifact_ref_is_stable() {
        let a = event("EVT-1").artifact_ref().unwrap();
        let b = event("EVT-1").artifact_ref().unwrap();
        assert_eq!(a, b);
        assert_eq!(a.kind, "Event");
    }
}
