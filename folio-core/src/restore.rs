/*!
Restore engine: put an owner back to the state frozen in one of its versions.

Both tracks run the same phases inside a single store transaction:

```text
Requested -> Validated -> Applied -> Recorded -> Committed
     \___________\___________\__________\______-> Failed
```

- **Validated**: owner and version exist, the version belongs to the owner,
  and the snapshot envelope passes its compatibility and integrity checks.
- **Applied**: live state is overwritten from the snapshot.
- **Recorded**: a new version carrying the restored snapshot is appended and
  an activity entry is written.
- **Committed**: the store published every write of the phases above.

Any error moves the restore to `Failed`; the transaction is dropped and no
partial state is ever visible. A `Conflict` (another writer took the version
number first) re-runs the whole transaction under the engine's retry policy.
*/

use crate::audit;
use crate::codec;
use crate::ledger::{DocumentLedger, ProjectLedger, VersionRecord};
use crate::model::{ActivityKind, ProjectView};
use crate::observability;
use crate::snapshot::{DocumentState, ProjectState, SnapshotBody};
use crate::store::{Store, Transaction};
use crate::views::{self, DocumentView};
use crate::{FolioError, Result};
use folio_retry::{retry, RetryPolicy};
use std::fmt;
use tracing::{debug, error, info, info_span};
use uuid::Uuid;

/// Where a restore is, or where it stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestorePhase {
    Requested,
    Validated,
    Applied,
    Recorded,
    Committed,
    Failed,
}

impl fmt::Display for RestorePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RestorePhase::Requested => "requested",
            RestorePhase::Validated => "validated",
            RestorePhase::Applied => "applied",
            RestorePhase::Recorded => "recorded",
            RestorePhase::Committed => "committed",
            RestorePhase::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Output of the validation phase
#[derive(Debug, Clone)]
pub struct Validated<S> {
    /// Ledger owner: project id or readme id
    pub owner_id: Uuid,
    pub version: VersionRecord<S>,
}

/// One restorable track
pub trait RestoreTarget {
    type State: SnapshotBody;
    type Output;

    /// Label used in spans and log lines
    const TRACK: &'static str;

    fn version_id(&self) -> Uuid;

    fn validate(&self, tx: &dyn Transaction) -> Result<Validated<Self::State>>;

    fn apply(&self, tx: &mut dyn Transaction, validated: &Validated<Self::State>) -> Result<()>;

    /// Append the restore to the ledger and the activity trail
    fn record(
        &self,
        tx: &mut dyn Transaction,
        validated: &Validated<Self::State>,
    ) -> Result<VersionRecord<Self::State>>;

    fn output(
        &self,
        tx: &dyn Transaction,
        restored: VersionRecord<Self::State>,
    ) -> Result<Self::Output>;
}

/// Restore of a project aggregate (scalars, sections, resources, tags)
#[derive(Debug, Clone, Copy)]
pub struct ProjectRestore {
    pub project_id: Uuid,
    pub version_id: Uuid,
}

impl RestoreTarget for ProjectRestore {
    type State = ProjectState;
    type Output = ProjectView;

    const TRACK: &'static str = "project";

    fn version_id(&self) -> Uuid {
        self.version_id
    }

    fn validate(&self, tx: &dyn Transaction) -> Result<Validated<ProjectState>> {
        if tx.get_project(self.project_id)?.is_none() {
            return Err(FolioError::not_found("project", self.project_id));
        }

        let version = ProjectLedger::get_version(tx, self.version_id)?;
        if version.owner_id != self.project_id {
            return Err(FolioError::forbidden(format!(
                "version {} does not belong to project {}",
                self.version_id, self.project_id
            )));
        }
        version.snapshot.validate()?;

        Ok(Validated {
            owner_id: self.project_id,
            version,
        })
    }

    fn apply(&self, tx: &mut dyn Transaction, validated: &Validated<ProjectState>) -> Result<()> {
        codec::apply(tx, &validated.version.snapshot, self.project_id)?;
        Ok(())
    }

    fn record(
        &self,
        tx: &mut dyn Transaction,
        validated: &Validated<ProjectState>,
    ) -> Result<VersionRecord<ProjectState>> {
        let message = format!("Restored from version {}", validated.version.version);
        let restored = ProjectLedger::append_version(
            &mut *tx,
            validated.owner_id,
            validated.version.snapshot.clone(),
            Some(message.clone()),
        )?;
        audit::record(tx, self.project_id, ActivityKind::Restored, message)?;
        Ok(restored)
    }

    fn output(&self, tx: &dyn Transaction, _restored: VersionRecord<ProjectState>) -> Result<ProjectView> {
        views::project_view(tx, self.project_id)
    }
}

/// Restore of a project's README content
#[derive(Debug, Clone, Copy)]
pub struct DocumentRestore {
    pub project_id: Uuid,
    pub version_id: Uuid,
}

impl RestoreTarget for DocumentRestore {
    type State = DocumentState;
    type Output = DocumentView;

    const TRACK: &'static str = "document";

    fn version_id(&self) -> Uuid {
        self.version_id
    }

    fn validate(&self, tx: &dyn Transaction) -> Result<Validated<DocumentState>> {
        if tx.get_project(self.project_id)?.is_none() {
            return Err(FolioError::not_found("project", self.project_id));
        }
        let readme = tx
            .readme_for(self.project_id)?
            .ok_or_else(|| FolioError::not_found("readme", self.project_id))?;

        let version = DocumentLedger::get_version(tx, self.version_id)?;
        if version.owner_id != readme.id {
            return Err(FolioError::forbidden(format!(
                "version {} does not belong to the README of project {}",
                self.version_id, self.project_id
            )));
        }
        version.snapshot.validate()?;

        Ok(Validated {
            owner_id: readme.id,
            version,
        })
    }

    fn apply(&self, tx: &mut dyn Transaction, validated: &Validated<DocumentState>) -> Result<()> {
        let readme = tx
            .readme_for(self.project_id)?
            .ok_or_else(|| FolioError::not_found("readme", self.project_id))?;
        codec::apply_document(tx, &validated.version.snapshot, readme)?;
        Ok(())
    }

    fn record(
        &self,
        tx: &mut dyn Transaction,
        validated: &Validated<DocumentState>,
    ) -> Result<VersionRecord<DocumentState>> {
        let k = validated.version.version;
        let restored = DocumentLedger::append_version(
            &mut *tx,
            validated.owner_id,
            validated.version.snapshot.clone(),
            Some(format!("Restored from version {k}")),
        )?;
        audit::record(
            tx,
            self.project_id,
            ActivityKind::DocumentRestored,
            format!("Restored README from version {k}"),
        )?;
        Ok(restored)
    }

    fn output(&self, tx: &dyn Transaction, _restored: VersionRecord<DocumentState>) -> Result<DocumentView> {
        views::document_view(tx, self.project_id)?
            .ok_or_else(|| FolioError::not_found("readme", self.project_id))
    }
}

/// Drive `target` through every phase, retrying the whole transaction on conflict
pub fn run<S, R>(store: &S, policy: &RetryPolicy, target: &R) -> Result<R::Output>
where
    S: Store,
    R: RestoreTarget,
{
    let span = info_span!("restore", track = R::TRACK, version = %target.version_id());
    let _entered = span.enter();

    let mut reached = RestorePhase::Requested;
    let result = retry("restore", policy, |attempt| {
        reached = RestorePhase::Requested;
        debug!(phase = %reached, attempt, "Restore phase");

        let outcome = store.transaction(|tx| run_phases(tx, target, &mut reached));
        if outcome.as_ref().is_err_and(FolioError::is_conflict) {
            observability::record_conflict();
        }
        outcome
    });

    match result {
        Ok((output, restored)) => {
            reached = RestorePhase::Committed;
            debug!(phase = %reached, "Restore phase");
            info!(
                owner = %restored.owner_id,
                from = %target.version_id(),
                new_version = restored.version,
                "Restore committed"
            );
            observability::record_version_committed(restored.snapshot.size_bytes);
            observability::record_restore(true);
            Ok(output)
        }
        Err(e) => {
            error!(reached = %reached, phase = %RestorePhase::Failed, error = %e, "Restore failed");
            observability::record_restore(false);
            Err(e)
        }
    }
}

fn run_phases<R: RestoreTarget>(
    tx: &mut dyn Transaction,
    target: &R,
    reached: &mut RestorePhase,
) -> Result<(R::Output, VersionRecord<R::State>)> {
    let validated = target.validate(&*tx)?;
    advance(reached, RestorePhase::Validated);

    target.apply(&mut *tx, &validated)?;
    advance(reached, RestorePhase::Applied);

    let restored = target.record(&mut *tx, &validated)?;
    advance(reached, RestorePhase::Recorded);

    let output = target.output(&*tx, restored.clone())?;
    Ok((output, restored))
}

fn advance(reached: &mut RestorePhase, next: RestorePhase) {
    *reached = next;
    debug!(phase = %next, "Restore phase");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Project;
    use crate::store::{FaultPoint, MemoryStore};

    fn committed_project(store: &MemoryStore) -> (Project, Uuid) {
        let project = Project::new("Restorable", "active");
        let version_id = store
            .transaction(|tx| {
                tx.insert_project(project.clone())?;
                let snapshot = codec::capture(&*tx, project.id)?;
                Ok(ProjectLedger::append_version(&mut *tx, project.id, snapshot, None)?.id)
            })
            .unwrap();
        (project, version_id)
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(RestorePhase::Validated.to_string(), "validated");
        assert_eq!(RestorePhase::Failed.to_string(), "failed");
    }

    #[test]
    fn test_project_restore_appends_version() {
        let store = MemoryStore::new();
        let (project, version_id) = committed_project(&store);

        let target = ProjectRestore {
            project_id: project.id,
            version_id,
        };
        let view = run(&store, &RetryPolicy::no_retry(), &target).unwrap();
        assert_eq!(view.project.title, "Restorable");

        let versions = store
            .transaction(|tx| ProjectLedger::list_versions(&*tx, project.id))
            .unwrap();
        assert_eq!(versions.len(), 2);
        assert_eq!(versions[0].reason.as_deref(), Some("Restored from version 1"));
    }

    #[test]
    fn test_unknown_version_is_not_found() {
        let store = MemoryStore::new();
        let (project, _) = committed_project(&store);

        let target = ProjectRestore {
            project_id: project.id,
            version_id: Uuid::new_v4(),
        };
        assert!(run(&store, &RetryPolicy::no_retry(), &target)
            .unwrap_err()
            .is_not_found());
    }

    #[test]
    fn test_commit_fault_rolls_back_everything() {
        let store = MemoryStore::new();
        let (project, version_id) = committed_project(&store);
        store.faults().fail_next(FaultPoint::Commit);

        let target = ProjectRestore {
            project_id: project.id,
            version_id,
        };
        assert!(matches!(
            run(&store, &RetryPolicy::no_retry(), &target),
            Err(FolioError::Storage(_))
        ));

        let (versions, activity) = store
            .transaction(|tx| {
                Ok((
                    ProjectLedger::list_versions(&*tx, project.id)?.len(),
                    tx.activities_for(project.id)?.len(),
                ))
            })
            .unwrap();
        assert_eq!(versions, 1);
        assert_eq!(activity, 0);
    }

    #[test]
    fn test_document_restore_requires_readme() {
        let store = MemoryStore::new();
        let (project, _) = committed_project(&store);

        let target = DocumentRestore {
            project_id: project.id,
            version_id: Uuid::new_v4(),
        };
        let err = run(&store, &RetryPolicy::no_retry(), &target).unwrap_err();
        assert!(matches!(err, FolioError::NotFound { entity: "readme", .. }));
    }
}
