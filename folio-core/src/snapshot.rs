/*!
Snapshot envelope and the frozen state bodies it carries.

A snapshot is a self-contained value: nothing in it points back into live
rows, so a version stays restorable after every live child has been replaced
or deleted. Bodies are wrapped in an envelope that records the format
version and a SHA-256 hash of the body's canonical JSON, checked before any
snapshot is applied.
*/

use crate::{FolioError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt::Debug;
use uuid::Uuid;

/// Current snapshot format version for compatibility tracking
pub const SNAPSHOT_FORMAT_VERSION: u8 = 1;

/// A state shape that can be frozen into a [`Snapshot`]
pub trait SnapshotBody:
    Serialize + DeserializeOwned + Clone + PartialEq + Debug + Send + Sync + 'static
{
    /// Tag stored in the envelope so a document body is never read as a project body
    const KIND: &'static str;
}

/// Immutable, integrity-checked copy of an aggregate's or document's state
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Snapshot<S> {
    /// Format version for compatibility (current: 1)
    pub format_version: u8,

    /// Which body type this envelope carries
    pub kind: String,

    /// SHA-256 hash of the body's canonical JSON
    pub content_hash: String,

    /// Size of the body's canonical JSON in bytes
    pub size_bytes: usize,

    pub body: S,
}

impl<S: SnapshotBody> Snapshot<S> {
    /// Wrap a body in a fresh envelope, computing its hash and size
    pub fn seal(body: S) -> Result<Self> {
        let canonical = serde_json::to_vec(&body)?;
        Ok(Self {
            format_version: SNAPSHOT_FORMAT_VERSION,
            kind: S::KIND.to_string(),
            content_hash: compute_hash(&canonical),
            size_bytes: canonical.len(),
            body,
        })
    }

    /// Check if this envelope was written by a compatible format version for this body type
    pub fn is_compatible(&self) -> bool {
        self.format_version <= SNAPSHOT_FORMAT_VERSION && self.kind == S::KIND
    }

    /// Verify the body still hashes to the value recorded when it was sealed
    pub fn verify_integrity(&self) -> Result<()> {
        let actual = compute_hash(&serde_json::to_vec(&self.body)?);
        if actual == self.content_hash {
            Ok(())
        } else {
            Err(FolioError::IntegrityCheckFailed {
                expected: self.content_hash.clone(),
                actual,
            })
        }
    }

    /// Compatibility and integrity together; run before a snapshot is applied
    pub fn validate(&self) -> Result<()> {
        if !self.is_compatible() {
            return Err(FolioError::invalid_format(format!(
                "Incompatible snapshot: kind '{}' format {} (expected kind '{}', format <= {})",
                self.kind,
                self.format_version,
                S::KIND,
                SNAPSHOT_FORMAT_VERSION
            )));
        }
        self.verify_integrity()
    }
}

/// Compute SHA-256 hash of the provided data as lowercase hex
pub fn compute_hash(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// Frozen project: scalar fields plus the contents of its child collections.
///
/// Child identities are deliberately absent; restored children get new ids.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ProjectState {
    pub title: String,
    pub subtitle: Option<String>,
    pub description: Option<String>,
    pub status: String,
    pub sections: Vec<SectionState>,
    pub resources: Vec<ResourceState>,
    pub tags: Vec<TagRef>,
}

impl SnapshotBody for ProjectState {
    const KIND: &'static str = "project";
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SectionState {
    pub title: String,
    pub content: String,
    pub order: i64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ResourceState {
    pub kind: String,
    pub title: String,
    pub url: String,
}

/// Reference to a shared tag. Membership is restored by `id`; `name` is the
/// label at capture time, kept for history display only.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TagRef {
    pub id: Uuid,
    pub name: String,
}

/// Frozen document content
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DocumentState {
    pub content: String,
}

impl SnapshotBody for DocumentState {
    const KIND: &'static str = "document";
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_state() -> ProjectState {
        ProjectState {
            title: "Folio".into(),
            subtitle: None,
            description: Some("versioned state".into()),
            status: "active".into(),
            sections: vec![SectionState {
                title: "Intro".into(),
                content: "hello".into(),
                order: 0,
            }],
            resources: vec![],
            tags: vec![],
        }
    }

    #[test]
    fn test_content_hash() {
        // SHA-256 of "test data" should be consistent
        assert_eq!(
            compute_hash(b"test data"),
            "916f0027a575074ce72a331777c3478d6513f786a591bd892da1a577bf2335f9"
        );
    }

    #[test]
    fn test_seal_is_deterministic() {
        let first = Snapshot::seal(sample_state()).unwrap();
        let second = Snapshot::seal(sample_state()).unwrap();

        assert_eq!(first, second);
        assert_eq!(first.kind, "project");
        assert_eq!(first.format_version, SNAPSHOT_FORMAT_VERSION);
        assert!(first.size_bytes > 0);
        assert!(first.validate().is_ok());
    }

    #[test]
    fn test_tampered_body_fails_integrity() {
        let mut snapshot = Snapshot::seal(sample_state()).unwrap();
        snapshot.body.title = "Tampered".into();

        assert!(matches!(
            snapshot.validate(),
            Err(FolioError::IntegrityCheckFailed { .. })
        ));
    }

    #[test]
    fn test_future_format_is_incompatible() {
        let mut snapshot = Snapshot::seal(DocumentState {
            content: "# Readme".into(),
        })
        .unwrap();
        assert!(snapshot.is_compatible());

        snapshot.format_version = SNAPSHOT_FORMAT_VERSION + 1;
        assert!(!snapshot.is_compatible());
        assert!(matches!(
            snapshot.validate(),
            Err(FolioError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_kind_mismatch_is_incompatible() {
        let document = Snapshot::seal(DocumentState {
            content: "text".into(),
        })
        .unwrap();
        let json = serde_json::to_value(&document).unwrap();

        let mut forged: Snapshot<DocumentState> = serde_json::from_value(json).unwrap();
        forged.kind = "project".into();
        assert!(!forged.is_compatible());
    }
}
