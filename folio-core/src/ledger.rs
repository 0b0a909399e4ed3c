/*!
Version ledger: append-only, per-owner numbered history.

Numbers are never cached. Each append reads the owner's current maximum and
inserts `max + 1` inside the caller's transaction, so two racing appends end
in a store-level `Conflict` instead of a duplicate number.
*/

use crate::snapshot::{DocumentState, ProjectState, Snapshot, SnapshotBody};
use crate::store::VersionTable;
use crate::{FolioError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::marker::PhantomData;
use tracing::debug;
use uuid::Uuid;

/// One immutable entry in an owner's version history
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct VersionRecord<S> {
    pub id: Uuid,
    /// Project id for the aggregate track, readme id for the document track
    pub owner_id: Uuid,
    /// 1-based, contiguous per owner
    pub version: u32,
    pub snapshot: Snapshot<S>,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

pub type ProjectVersion = VersionRecord<ProjectState>;
pub type DocumentVersion = VersionRecord<DocumentState>;

/// Ledger operations for one snapshot body type
///
/// Stateless; every call works through the transaction it is given.
pub struct VersionLedger<S>(PhantomData<S>);

pub type ProjectLedger = VersionLedger<ProjectState>;
pub type DocumentLedger = VersionLedger<DocumentState>;

impl<S: SnapshotBody> VersionLedger<S> {
    /// `1` for an owner with no history, otherwise the current maximum plus one
    pub fn next_version_number<T>(tx: &T, owner_id: Uuid) -> Result<u32>
    where
        T: VersionTable<S> + ?Sized,
    {
        match tx.max_version(owner_id)? {
            None => Ok(1),
            Some(max) => max.checked_add(1).ok_or_else(|| {
                FolioError::conflict(format!("version numbers exhausted for {owner_id}"))
            }),
        }
    }

    /// Allocate the next number for `owner_id` and store `snapshot` under it
    ///
    /// # Arguments
    /// * `tx` - Transaction the allocation and insert share
    /// * `owner_id` - Project or readme the version belongs to
    /// * `snapshot` - Sealed state; stored by value, never shared with live rows
    /// * `reason` - Optional label; blank strings are stored as `None`
    pub fn append_version<T>(
        tx: &mut T,
        owner_id: Uuid,
        snapshot: Snapshot<S>,
        reason: Option<String>,
    ) -> Result<VersionRecord<S>>
    where
        T: VersionTable<S> + ?Sized,
    {
        let version = Self::next_version_number(&*tx, owner_id)?;
        let record = VersionRecord {
            id: Uuid::new_v4(),
            owner_id,
            version,
            snapshot,
            reason: reason.filter(|r| !r.trim().is_empty()),
            created_at: Utc::now(),
        };

        tx.insert_version(record.clone())?;
        debug!(
            kind = S::KIND,
            owner = %owner_id,
            version,
            size_bytes = record.snapshot.size_bytes,
            "Appended version"
        );
        Ok(record)
    }

    /// Every version of `owner_id`, newest first; empty when there are none
    pub fn list_versions<T>(tx: &T, owner_id: Uuid) -> Result<Vec<VersionRecord<S>>>
    where
        T: VersionTable<S> + ?Sized,
    {
        let mut versions = tx.versions_for(owner_id)?;
        versions.sort_by(|a, b| b.version.cmp(&a.version));
        Ok(versions)
    }

    pub fn get_version<T>(tx: &T, version_id: Uuid) -> Result<VersionRecord<S>>
    where
        T: VersionTable<S> + ?Sized,
    {
        tx.find_version(version_id)?
            .ok_or_else(|| FolioError::not_found("version", version_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Project;
    use crate::store::{MemoryStore, Store, Transaction};

    fn document(content: &str) -> Snapshot<DocumentState> {
        Snapshot::seal(DocumentState {
            content: content.into(),
        })
        .unwrap()
    }

    fn project_snapshot(tx: &dyn Transaction, id: Uuid) -> Snapshot<ProjectState> {
        crate::codec::capture(tx, id).unwrap()
    }

    #[test]
    fn test_numbers_start_at_one_and_increase() {
        let store = MemoryStore::new();
        let project = Project::new("Ledger", "active");

        let numbers = store
            .transaction(|tx| {
                tx.insert_project(project.clone())?;
                let mut numbers = Vec::new();
                for _ in 0..3 {
                    let snapshot = project_snapshot(&*tx, project.id);
                    let record =
                        ProjectLedger::append_version(&mut *tx, project.id, snapshot, None)?;
                    numbers.push(record.version);
                }
                Ok(numbers)
            })
            .unwrap();

        assert_eq!(numbers, vec![1, 2, 3]);
    }

    #[test]
    fn test_list_is_newest_first_and_empty_for_unknown_owner() {
        let store = MemoryStore::new();
        let project = Project::new("Ledger", "active");

        store
            .transaction(|tx| {
                tx.insert_project(project.clone())?;
                for _ in 0..2 {
                    let snapshot = project_snapshot(&*tx, project.id);
                    ProjectLedger::append_version(&mut *tx, project.id, snapshot, None)?;
                }
                Ok(())
            })
            .unwrap();

        store
            .transaction(|tx| {
                let listed: Vec<u32> = ProjectLedger::list_versions(&*tx, project.id)?
                    .iter()
                    .map(|v| v.version)
                    .collect();
                assert_eq!(listed, vec![2, 1]);
                assert!(ProjectLedger::list_versions(&*tx, Uuid::new_v4())?.is_empty());
                assert!(DocumentLedger::list_versions(&*tx, project.id)?.is_empty());
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_blank_reason_is_stored_as_none() {
        let store = MemoryStore::new();
        let project = Project::new("Ledger", "active");

        let record = store
            .transaction(|tx| {
                tx.insert_project(project.clone())?;
                let snapshot = project_snapshot(&*tx, project.id);
                ProjectLedger::append_version(&mut *tx, project.id, snapshot, Some("  ".into()))
            })
            .unwrap();
        assert_eq!(record.reason, None);
    }

    #[test]
    fn test_get_missing_version_is_not_found() {
        let store = MemoryStore::new();
        let err = store
            .transaction(|tx| DocumentLedger::get_version(&*tx, Uuid::new_v4()))
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_document_versions_need_a_readme_owner() {
        let store = MemoryStore::new();
        let err = store
            .transaction(|tx| {
                DocumentLedger::append_version(&mut *tx, Uuid::new_v4(), document("# Hi"), None)
            })
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
