//! Artifact hashing and references.
//!
//! An artifact ref is `{id, kind, hash}`: the unit RunRecords use to point at
//! their inputs and outputs. Refs never imply ownership; deleting an
//! artifact leaves the RunRecord valid but unresolvable, which is why the
//! store treats artifacts as append-only.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::canonical_json::{to_canonical_bytes, CanonicalJsonError};

/// Computes the SHA-256 hash of a payload's canonical serialization.
///
/// This is the only sanctioned way to hash an artifact: the payload must
/// already be normalized (wall-clock fields pinned or scrubbed) before it
/// gets here.
///
/// # Errors
///
/// Returns a [`CanonicalJsonError`] if the payload cannot be canonically
/// serialized (e.g. it contains floats).
pub fn artifact_hash<T: Serialize>(payload: &T) -> Result<String, CanonicalJsonError> {
    let bytes = to_canonical_bytes(payload)?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}

/// Computes the SHA-256 hash of raw bytes (for payloads that are already
/// canonical, such as fetched feed bodies).
#[must_use]
pub fn content_hash(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// A reference to an artifact by content hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRef {
    /// Stable identifier of the artifact (e.g. `raw-item:RAW-…`).
    pub id: String,
    /// Artifact kind (`RawItem`, `Event`, `Alert`, `IncidentEvidence`, …).
    pub kind: String,
    /// SHA-256 of the artifact's canonical serialization.
    pub hash: String,
}

impl ArtifactRef {
    /// Creates a new artifact ref.
    #[must_use]
    pub fn new(id: impl Into<String>, kind: impl Into<String>, hash: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            hash: hash.into(),
        }
    }

    /// Builds a ref by hashing the given payload.
    ///
    /// # Errors
    ///
    /// Returns a [`CanonicalJsonError`] if the payload cannot be canonically
    /// serialized.
    pub fn from_payload<T: Serialize>(
        id: impl Into<String>,
        kind: impl Into<String>,
        payload: &T,
    ) -> Result<Self, CanonicalJsonError> {
        Ok(Self::new(id, kind, artifact_hash(payload)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn hash_is_stable_across_key_order() {
        let a = json!({"title": "Spill", "source_id": "nws"});
        let b = json!({"source_id": "nws", "title": "Spill"});
        assert_eq!(artifact_hash(&a).unwrap(), artifact_hash(&b).unwrap());
    }

    #[test]
    fn hash_changes_with_content() {
        let a = json!({"title": "Spill"});
        let b = json!({"title": "Storm"});
        assert_ne!(artifact_hash(&a).unwrap(), artifact_hash(&b).unwrap());
    }

    #[test]
    fn known_vector() {
        // sha256 of the canonical bytes `{}`
        assert_eq!(
            artifact_hash(&json!({})).unwrap(),
            "44136fa355b3678a1146ad16f7e8649e94fb4fc21fe77e8310c060f61caaff8a"
        );
    }

    #[test]
    fn ref_from_payload_carries_hash() {
        let payload = json!({"alert_id": "ALERT-1"});
        let r = ArtifactRef::from_payload("alert:ALERT-1", "Alert", &payload).unwrap();
        assert_eq!(r.hash, artifact_hash(&payload).unwrap());
        assert_eq!(r.kind, "Alert");
    }

    #[test]
    fn content_hash_matches_raw_sha256() {
        assert_eq!(
            content_hash(b"hello"),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }
}
