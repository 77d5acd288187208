//! Raw-item persistence and deduplication.
//!
//! Raw items are fetched payloads before normalization. Saving is
//! idempotent: lookup first by `(source_id, canonical_id)`, then by global
//! `content_hash`; a hit writes nothing and reports the existing row.
//! Items leave `NEW` exactly once, to `NORMALIZED` (possibly carrying a
//! suppression stamp) or to `FAILED`, and are never deleted.

use std::collections::BTreeMap;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use hardstop_core::{
    artifact_hash, ArtifactRef, Error, RawItemId, Result, SourceTier, TrustTier, UtcTimestamp,
};

/// Lifecycle state of a raw item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RawItemStatus {
    /// Fetched, not yet normalized.
    New,
    /// Normalized into an event.
    Normalized,
    /// Normalization failed.
    Failed,
    /// Suppressed during normalization (sub-state of normalized).
    Suppressed,
}

/// Suppression metadata stamped onto a raw item or event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuppressionStamp {
    /// First matching rule; owns the reason code.
    pub primary_rule_id: String,
    /// All matching rules, in evaluation order.
    pub rule_ids: Vec<String>,
    /// Reason code of the primary rule.
    pub reason_code: String,
    /// When the stamp was applied.
    pub suppressed_at_utc: UtcTimestamp,
    /// Pipeline stage that applied the stamp (e.g. `INGEST`).
    pub stage: String,
}

/// A fetched payload before normalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawItem {
    /// Opaque row id.
    pub raw_item_id: RawItemId,
    /// Source the item was fetched from.
    pub source_id: String,
    /// Source-supplied stable id, when the source has one.
    pub canonical_id: Option<String>,
    /// SHA-256 of the normalized payload bytes.
    pub content_hash: String,
    /// Item title.
    pub title: String,
    /// Item summary.
    pub summary: String,
    /// Full raw text.
    pub raw_text: String,
    /// Item URL.
    pub url: Option<String>,
    /// Publication timestamp, when the source supplied one.
    pub published_at_utc: Option<UtcTimestamp>,
    /// When the item was fetched.
    pub fetched_at_utc: UtcTimestamp,
    /// Lifecycle state.
    pub status: RawItemStatus,
    /// Suppression metadata, when stamped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suppression: Option<SuppressionStamp>,
    /// Trust tier of the source at fetch time.
    pub trust_tier: TrustTier,
    /// Tier of the source at fetch time.
    pub tier: SourceTier,
    /// The source-shaped payload, preserved for audit.
    #[serde(default)]
    pub payload: BTreeMap<String, Value>,
}

impl RawItem {
    /// The dedupe key the source supplied, falling back to the content hash.
    #[must_use]
    pub fn canonical_key(&self) -> &str {
        self.canonical_id.as_deref().unwrap_or(&self.content_hash)
    }

    /// Builds this item's artifact ref.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Serialization`] if the item cannot be canonically
    /// serialized.
    pub fn artifact_ref(&self) -> Result<ArtifactRef> {
        let hash = artifact_hash(self).map_err(|e| Error::Serialization {
            message: e.to_string(),
        })?;
        Ok(ArtifactRef::new(
            format!("raw-item:{}", self.raw_item_id),
            "RawItem",
            hash,
        ))
    }
}

/// Result of an idempotent save.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    /// A new row was written.
    Created(RawItemId),
    /// An equivalent row already existed; nothing was written.
    Duplicate(RawItemId),
}

impl SaveOutcome {
    /// True when the save wrote a new row.
    #[must_use]
    pub const fn is_created(&self) -> bool {
        matches!(self, Self::Created(_))
    }

    /// The id of the row the save resolved to.
    #[must_use]
    pub const fn id(&self) -> &RawItemId {
        match self {
            Self::Created(id) | Self::Duplicate(id) => id,
        }
    }
}

/// Repository contract for raw items.
pub trait RawItemStore {
    /// Idempotently persists an item.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] on backend failures.
    fn save(&self, item: RawItem) -> Result<SaveOutcome>;

    /// Fetches one item by id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] on backend failures.
    fn get(&self, id: &RawItemId) -> Result<Option<RawItem>>;

    /// Items in `NEW` status awaiting normalization, in stable
    /// `(fetched_at_utc, raw_item_id)` ascending order. Suppressed items
    /// are excluded unless `include_suppressed`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] on backend failures.
    fn list_for_ingest(
        &self,
        since: Option<UtcTimestamp>,
        include_suppressed: bool,
    ) -> Result<Vec<RawItem>>;

    /// Transitions an item out of `NEW`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for unknown ids.
    fn mark_status(&self, id: &RawItemId, status: RawItemStatus) -> Result<()>;

    /// Stamps suppression metadata onto an item.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for unknown ids.
    fn mark_suppressed(&self, id: &RawItemId, stamp: SuppressionStamp) -> Result<()>;

    /// All items suppressed at or after `cutoff`, for brief rollups.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] on backend failures.
    fn list_suppressed_since(&self, cutoff: UtcTimestamp) -> Result<Vec<RawItem>>;
}

#[derive(Debug, Default)]
struct Inner {
    // (source_id, canonical_id) → raw_item_id
    by_canonical: BTreeMap<(String, String), RawItemId>,
    // content_hash → raw_item_id (global)
    by_content_hash: BTreeMap<String, RawItemId>,
    rows: BTreeMap<RawItemId, RawItem>,
}

/// In-memory reference implementation of [`RawItemStore`].
#[derive(Debug, Default)]
pub struct MemoryRawItemStore {
    inner: RwLock<Inner>,
}

impl MemoryRawItemStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Inner>> {
        self.inner
            .read()
            .map_err(|_| Error::storage("raw-item store lock poisoned"))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Inner>> {
        self.inner
            .write()
            .map_err(|_| Error::storage("raw-item store lock poisoned"))
    }
}

impl RawItemStore for MemoryRawItemStore {
    fn save(&self, item: RawItem) -> Result<SaveOutcome> {
        let mut inner = self.write()?;

        if let Some(canonical_id) = &item.canonical_id {
            let key = (item.source_id.clone(), canonical_id.clone());
            if let Some(existing) = inner.by_canonical.get(&key) {
                return Ok(SaveOutcome::Duplicate(existing.clone()));
            }
        }
        if let Some(existing) = inner.by_content_hash.get(&item.content_hash) {
            return Ok(SaveOutcome::Duplicate(existing.clone()));
        }
        if inner.rows.contains_key(&item.raw_item_id) {
            return Err(Error::storage(format!(
                "raw item id {} already in use by a different payload",
                item.raw_item_id
            )));
        }

        let id = item.raw_item_id.clone();
        if let Some(canonical_id) = &item.canonical_id {
            inner
                .by_canonical
                .insert((item.source_id.clone(), canonical_id.clone()), id.clone());
        }
        inner
            .by_content_hash
            .insert(item.content_hash.clone(), id.clone());
        inner.rows.insert(id.clone(), item);
        Ok(SaveOutcome::Created(id))
    }

    fn get(&self, id: &RawItemId) -> Result<Option<RawItem>> {
        Ok(self.read()?.rows.get(id).cloned())
    }

    fn list_for_ingest(
        &self,
        since: Option<UtcTimestamp>,
        include_suppressed: bool,
    ) -> Result<Vec<RawItem>> {
        let inner = self.read()?;
        let mut items: Vec<RawItem> = inner
            .rows
            .values()
            .filter(|item| item.status == RawItemStatus::New)
            .filter(|item| include_suppressed || item.suppression.is_none())
            .filter(|item| since.map_or(true, |cutoff| item.fetched_at_utc >= cutoff))
            .cloned()
            .collect();
        items.sort_by(|a, b| {
            (a.fetched_at_utc, &a.raw_item_id).cmp(&(b.fetched_at_utc, &b.raw_item_id))
        });
        Ok(items)
    }

    fn mark_status(&self, id: &RawItemId, status: RawItemStatus) -> Result<()> {
        let mut inner = self.write()?;
        let item = inner
            .rows
            .get_mut(id)
            .ok_or_else(|| Error::not_found("RawItem", id))?;
        item.status = status;
        Ok(())
    }

    fn mark_suppressed(&self, id: &RawItemId, stamp: SuppressionStamp) -> Result<()> {
        let mut inner = self.write()?;
        let item = inner
            .rows
            .get_mut(id)
            .ok_or_else(|| Error::not_found("RawItem", id))?;
        item.suppression = Some(stamp);
        Ok(())
    }

    fn list_suppressed_since(&self, cutoff: UtcTimestamp) -> Result<Vec<RawItem>> {
        let inner = self.read()?;
        let mut items: Vec<RawItem> = inner
            .rows
            .values()
            .filter(|item| {
                item.suppression
                    .as_ref()
                    .is_some_and(|s| s.suppressed_at_utc >= cutoff)
            })
            .cloned()
            .collect();
        items.sort_by(|a, b| a.raw_item_id.cmp(&b.raw_item_id));
        Ok(items)
    }
}
