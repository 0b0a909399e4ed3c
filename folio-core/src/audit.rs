/*!
Audit recorder: append-only activity trail per project.
*/

use crate::model::{Activity, ActivityKind};
use crate::store::Transaction;
use crate::{FolioError, Result};
use chrono::Utc;
use tracing::trace;
use uuid::Uuid;

/// Append an activity entry inside the caller's transaction
///
/// The entry is timestamped now and returned with the sequence the store
/// assigned it. A failure here aborts the surrounding mutation.
pub fn record<S: Into<String>>(
    tx: &mut dyn Transaction,
    project_id: Uuid,
    kind: ActivityKind,
    content: S,
) -> Result<Activity> {
    let activity = Activity {
        id: Uuid::new_v4(),
        project_id,
        sequence: 0,
        kind,
        content: content.into(),
        created_at: Utc::now(),
    };
    trace!(project = %project_id, %kind, content = %activity.content, "Recording activity");

    let id = activity.id;
    tx.insert_activity(activity)?;
    tx.activities_for(project_id)?
        .into_iter()
        .find(|entry| entry.id == id)
        .ok_or_else(|| FolioError::storage(format!("activity {id} missing after insert")))
}

/// A project's activity, newest first
pub fn list(tx: &dyn Transaction, project_id: Uuid) -> Result<Vec<Activity>> {
    let mut activities = tx.activities_for(project_id)?;
    activities.sort_by(|a, b| b.sequence.cmp(&a.sequence));
    Ok(activities)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Project;
    use crate::store::{MemoryStore, Store};

    #[test]
    fn test_entries_come_back_newest_first() {
        let store = MemoryStore::new();
        let project = Project::new("Audit", "active");
        store
            .transaction(|tx| tx.insert_project(project.clone()))
            .unwrap();

        for content in ["first", "second", "third"] {
            store
                .transaction(|tx| record(tx, project.id, ActivityKind::Updated, content))
                .unwrap();
        }

        let entries = store.transaction(|tx| list(&*tx, project.id)).unwrap();
        let contents: Vec<&str> = entries.iter().map(|a| a.content.as_str()).collect();
        assert_eq!(contents, vec!["third", "second", "first"]);
        assert!(entries[0].sequence > entries[1].sequence);
    }

    #[test]
    fn test_record_returns_assigned_sequence() {
        let store = MemoryStore::new();
        let project = Project::new("Audit", "active");
        let (first, second) = store
            .transaction(|tx| {
                tx.insert_project(project.clone())?;
                let first = record(tx, project.id, ActivityKind::Created, "one")?;
                let second = record(tx, project.id, ActivityKind::Updated, "two")?;
                Ok((first, second))
            })
            .unwrap();

        assert!(first.sequence > 0);
        assert_eq!(second.sequence, first.sequence + 1);
        assert_eq!(second.content, "two");
    }

    #[test]
    fn test_recording_for_missing_project_fails() {
        let store = MemoryStore::new();
        let err = store
            .transaction(|tx| record(tx, Uuid::new_v4(), ActivityKind::Created, "orphan"))
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
