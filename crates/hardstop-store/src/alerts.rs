//! Materialized alerts and the correlation window lookup.
//!
//! Alerts are the persisted decisions. The store maintains a
//! `(correlation_key, last_seen_utc)` index so the 7-day window query is a
//! range scan, and serializes lookup + upsert per correlation key with a
//! short-lived key-scoped lock, never a global one.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, RwLock};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use hardstop_core::{
    artifact_hash, AlertId, ArtifactRef, Error, EventId, Result, SourceTier, TrustTier,
    UtcTimestamp,
};

/// Whether a correlation pass created or updated the alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CorrelationAction {
    /// A new alert was materialized.
    Created,
    /// An existing alert absorbed the event.
    Updated,
}

/// The entities an alert spans.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertScope {
    /// Facility ids, sorted.
    pub facilities: Vec<String>,
    /// Lane ids, sorted.
    pub lanes: Vec<String>,
    /// Shipment ids, in linkage order.
    pub shipments: Vec<String>,
    /// Untruncated shipment count.
    pub shipments_total_linked: usize,
    /// True when the shipment list was truncated.
    pub shipments_truncated: bool,
}

/// Non-decisional diagnostics recorded on an alert.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertDiagnostics {
    /// Per-entity-class link confidence, in integer percent.
    pub link_confidence: BTreeMap<String, u8>,
    /// Per-entity-class provenance codes.
    pub link_provenance: BTreeMap<String, String>,
    /// Impact score at the last touch.
    pub impact_score: i64,
    /// The scorer's rationale payload.
    pub impact_score_rationale: Value,
}

/// Non-decisional evidence attached to an alert.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertEvidence {
    /// Diagnostics from linking and scoring.
    pub diagnostics: AlertDiagnostics,
    /// Human-readable notes from entity linking.
    pub linking_notes: Vec<String>,
    /// Source metadata of the last updater.
    #[serde(default)]
    pub source_metadata: BTreeMap<String, Value>,
    /// Hash of the latest incident-evidence artifact.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub incident_artifact_hash: Option<String>,
}

/// A materialized decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    /// Alert id.
    pub alert_id: AlertId,
    /// Risk type (the root event's type name).
    pub risk_type: String,
    /// 0 = Interesting, 1 = Relevant, 2 = Impactful.
    pub classification: u8,
    /// Operator-owned lifecycle status; defaults to `OPEN`.
    pub status: String,
    /// Alert summary.
    pub summary: String,
    /// The event that created this alert.
    pub root_event_id: EventId,
    /// Spanned entities.
    pub scope: AlertScope,
    /// Bounded impact score, `[0, 10]`.
    pub impact_score: i64,
    /// Correlation key this alert groups under.
    pub correlation_key: String,
    /// Whether the last touch created or updated the alert.
    pub correlation_action: CorrelationAction,
    /// First time the alert was seen.
    pub first_seen_utc: UtcTimestamp,
    /// Last time the alert was touched.
    pub last_seen_utc: UtcTimestamp,
    /// Number of events absorbed; equals `root_event_ids.len()`.
    pub update_count: u64,
    /// Append-only list of absorbed event ids.
    pub root_event_ids: Vec<EventId>,
    /// Tier of the last updater.
    pub tier: SourceTier,
    /// Source of the last updater.
    pub source_id: String,
    /// Trust tier of the last updater.
    pub trust_tier: TrustTier,
    /// Non-decisional evidence.
    pub evidence: AlertEvidence,
}

impl Alert {
    /// Builds this alert's artifact ref.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Serialization`] if the alert cannot be canonically
    /// serialized.
    pub fn artifact_ref(&self) -> Result<ArtifactRef> {
        let hash = artifact_hash(self).map_err(|e| Error::Serialization {
            message: e.to_string(),
        })?;
        Ok(ArtifactRef::new(
            format!("alert:{}", self.alert_id),
            "Alert",
            hash,
        ))
    }
}

/// Repository contract for alerts.
pub trait AlertStore {
    /// The most recent alert with this key whose `last_seen_utc` is at or
    /// after `window_start`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] on backend failures.
    fn find_recent_by_key(&self, key: &str, window_start: UtcTimestamp) -> Result<Option<Alert>>;

    /// Inserts a new alert.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the id already exists.
    fn insert(&self, alert: Alert) -> Result<()>;

    /// Replaces an existing alert (same id).
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for unknown ids.
    fn update(&self, alert: Alert) -> Result<()>;

    /// Fetches one alert by id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] on backend failures.
    fn get(&self, id: &AlertId) -> Result<Option<Alert>>;

    /// Alerts touched or created at or after `cutoff`, unordered; the brief
    /// builder applies the declared total order itself.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] on backend failures.
    fn list_since(&self, cutoff: UtcTimestamp) -> Result<Vec<Alert>>;

    /// Runs `f` while holding this correlation key's lock, serializing the
    /// lookup + upsert critical section per key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CorrelationConflict`] when the key's lock is
    /// poisoned, plus whatever `f` returns.
    fn with_key_lock(
        &self,
        key: &str,
        f: &mut dyn FnMut() -> Result<()>,
    ) -> Result<()>;
}

#[derive(Debug, Default)]
struct Inner {
    rows: BTreeMap<AlertId, Alert>,
    // (correlation_key, last_seen_utc, alert_id); the window query is a
    // range scan over this index.
    window_index: BTreeMap<(String, UtcTimestamp, AlertId), ()>,
}

/// In-memory reference implementation of [`AlertStore`].
#[derive(Debug, Default)]
pub struct MemoryAlertStore {
    inner: RwLock<Inner>,
    key_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl MemoryAlertStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Inner>> {
        self.inner
            .read()
            .map_err(|_| Error::storage("alert store lock poisoned"))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Inner>> {
        self.inner
            .write()
            .map_err(|_| Error::storage("alert store lock poisoned"))
    }

    fn key_lock(&self, key: &str) -> Result<Arc<Mutex<()>>> {
        let mut locks = self
            .key_locks
            .lock()
            .map_err(|_| Error::storage("alert key-lock table poisoned"))?;
        Ok(locks.entry(key.to_owned()).or_default().clone())
    }
}

fn index_entry(alert: &Alert) -> (String, UtcTimestamp, AlertId) {
    (
        alert.correlation_key.clone(),
        alert.last_seen_utc,
        alert.alert_id.clone(),
    )
}

impl AlertStore for MemoryAlertStore {
    fn find_recent_by_key(&self, key: &str, window_start: UtcTimestamp) -> Result<Option<Alert>> {
        let inner = self.read()?;
        let lower = (key.to_owned(), window_start, AlertId::from(""));
        // Newest entry in the window wins; the index is ascending, so take
        // the last in-range entry for this key.
        let found = inner
            .window_index
            .range(lower..)
            .take_while(|((k, _, _), ())| k == key)
            .last()
            .map(|((_, _, id), ())| id.clone());
        Ok(found.and_then(|id| inner.rows.get(&id).cloned()))
    }

    fn insert(&self, alert: Alert) -> Result<()> {
        let mut inner = self.write()?;
        if inner.rows.contains_key(&alert.alert_id) {
            return Err(Error::storage(format!(
                "alert {} already exists",
                alert.alert_id
            )));
        }
        inner.window_index.insert(index_entry(&alert), ());
        inner.rows.insert(alert.alert_id.clone(), alert);
        Ok(())
    }

    fn update(&self, alert: Alert) -> Result<()> {
        let mut inner = self.write()?;
        let previous = inner
            .rows
            .get(&alert.alert_id)
            .ok_or_else(|| Error::not_found("Alert", &alert.alert_id))?
            .clone();
        inner.window_index.remove(&index_entry(&previous));
        inner.window_index.insert(index_entry(&alert), ());
        inner.rows.insert(alert.alert_id.clone(), alert);
        Ok(())
    }

    fn get(&self, id: &AlertId) -> Result<Option<Alert>> {
        Ok(self.read()?.rows.get(id).cloned())
    }

    fn list_since(&self, cutoff: UtcTimestamp) -> Result<Vec<Alert>> {
        Ok(self
            .read()?
            .rows
            .values()
            .filter(|a| a.last_seen_utc >= cutoff || a.first_seen_utc >= cutoff)
            .cloned()
            .collect())
    }

    fn with_key_lock(&self, key: &str, f: &mut dyn FnMut() -> Result<()>) -> Result<()> {
        let lock = self.key_lock(key)?;
        let _guard = lock.lock().map_err(|_| Error::CorrelationConflict {
            correlation_key: key.to_owned(),
        })?;
        f()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(s: &str) -> UtcTimestamp {
        s.parse().unwrap_or_else(|e| panic!("bad test timestamp {s}: {e}"))
    }

    fn alert(id: &str, key: &str, last_seen: &str) -> Alert {
        Alert {
            alert_id: AlertId::from(id),
            risk_type: "SAFETY_AND_OPERATIONS".into(),
            classification: 2,
            status: "OPEN".into(),
            summary: "Hydrochloric acid spill at Avon, Indiana".into(),
            root_event_id: EventId::from("EVT-1"),
            scope: AlertScope::default(),
            impact_score: 7,
            correlation_key: key.into(),
            correlation_action: CorrelationAction::Created,
            first_seen_utc: ts(last_seen),
            last_seen_utc: ts(last_seen),
            update_count: 1,
            root_event_ids: vec![EventId::from("EVT-1")],
            tier: SourceTier::Global,
            source_id: "nws_active_us".into(),
            trust_tier: TrustTier::default(),
            evidence: AlertEvidence::default(),
        }
    }

    #[test]
    fn window_lookup_ignores_stale_alerts() {
        let store = MemoryAlertStore::new();
        store
            .insert(alert("ALERT-1", "SAFETY|PLANT-01|LANE-001", "2025-12-20T00:00:00Z"))
            .unwrap();

        // 7-day window starting the 22nd: the alert from the 20th is stale.
        let window_start = ts("2025-12-22T00:00:00Z");
        assert!(store
            .find_recent_by_key("SAFETY|PLANT-01|LANE-001", window_start)
            .unwrap()
            .is_none());

        let window_start = ts("2025-12-19T00:00:00Z");
        assert!(store
            .find_recent_by_key("SAFETY|PLANT-01|LANE-001", window_start)
            .unwrap()
            .is_some());
    }

    #[test]
    fn newest_alert_in_window_wins() {
        let store = MemoryAlertStore::new();
        store
            .insert(alert("ALERT-1", "SAFETY|PLANT-01|*", "2025-12-28T00:00:00Z"))
            .unwrap();
        store
            .insert(alert("ALERT-2", "SAFETY|PLANT-01|*", "2025-12-29T00:00:00Z"))
            .unwrap();

        let hit = store
            .find_recent_by_key("SAFETY|PLANT-01|*", ts("2025-12-23T00:00:00Z"))
            .unwrap()
            .unwrap();
        assert_eq!(hit.alert_id, AlertId::from("ALERT-2"));
    }

    #[test]
    fn update_moves_index_entry() {
        let store = MemoryAlertStore::new();
        store
            .insert(alert("ALERT-1", "WEATHER|*|*", "2025-12-20T00:00:00Z"))
            .unwrap();

        let mut updated = alert("ALERT-1", "WEATHER|*|*", "2025-12-29T00:00:00Z");
        updated.update_count = 2;
        store.update(updated).unwrap();

        let hit = store
            .find_recent_by_key("WEATHER|*|*", ts("2025-12-25T00:00:00Z"))
            .unwrap()
            .unwrap();
        assert_eq!(hit.update_count, 2);
    }

    #[test]
    fn key_lock_serializes_critical_section() {
        let store = MemoryAlertStore::new();
        let mut ran = false;
        store
            .with_key_lock("SAFETY|PLANT-01|*", &mut || {
                ran = true;
                Ok(())
            })
            .unwrap();
        assert!(ran);
    }

    #[test]
    fn list_since_includes_first_seen_matches() {
        let store = MemoryAlertStore::new();
        let mut a = alert("ALERT-1", "K|*|*", "2025-12-20T00:00:00Z");
        // Created long ago but touched recently.
        a.last_seen_utc = ts("2025-12-29T00:00:00Z");
        store.insert(a).unwrap();

        let hits = store.list_since(ts("2025-12-28T00:00:00Z")).unwrap();
        assert_eq!(hits.len(), 1);
    }
}
