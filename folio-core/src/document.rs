/*!
Document track: a project's README, where every save is a commit.

The README is created on first save. Its versions are owned by the README row,
not the project, so a project version can never be restored through this
track and vice versa.
*/

use crate::audit;
use crate::codec;
use crate::engine::{non_blank, require_project, VersionEngine};
use crate::ledger::DocumentLedger;
use crate::model::{ActivityKind, Readme};
use crate::observability;
use crate::restore::{self, DocumentRestore};
use crate::store::Store;
use crate::views::{self, DocumentView};
use crate::{FolioError, Result};
use chrono::Utc;
use tracing::info;
use uuid::Uuid;

impl<S: Store> VersionEngine<S> {
    /// Save README content and commit it as the next document version
    ///
    /// The first save creates the README; if its content is blank the
    /// configured template is stored instead. Later saves must carry content.
    ///
    /// # Arguments
    /// * `project_id` - Project owning the README
    /// * `content` - Full new content
    /// * `message` - Commit message; defaults to "Initial README" for the
    ///   first version and "Updated README to version N" afterwards
    pub fn save_document(
        &self,
        project_id: Uuid,
        content: &str,
        message: Option<&str>,
    ) -> Result<DocumentView> {
        let message = non_blank(message);

        let (view, version, size_bytes) = self.write("save_document", |tx| {
            require_project(&*tx, project_id)?;
            let now = Utc::now();

            let readme = match tx.readme_for(project_id)? {
                None => {
                    let content = if content.trim().is_empty() {
                        self.config.readme_template.clone()
                    } else {
                        content.to_string()
                    };
                    let readme = Readme {
                        id: Uuid::new_v4(),
                        project_id,
                        content,
                        created_at: now,
                        updated_at: now,
                    };
                    tx.insert_readme(readme.clone())?;
                    readme
                }
                Some(mut readme) => {
                    if content.trim().is_empty() {
                        return Err(FolioError::validation("README content must not be empty"));
                    }
                    readme.content = content.to_string();
                    readme.updated_at = now;
                    tx.update_readme(readme.clone())?;
                    readme
                }
            };

            let next = DocumentLedger::next_version_number(&*tx, readme.id)?;
            let reason = message.clone().unwrap_or_else(|| {
                if next == 1 {
                    "Initial README".to_string()
                } else {
                    format!("Updated README to version {next}")
                }
            });
            let snapshot = codec::capture_document(&readme.content)?;
            let record = DocumentLedger::append_version(&mut *tx, readme.id, snapshot, Some(reason))?;

            let activity = match message.as_deref() {
                Some(message) => format!("Updated README: {message}"),
                None => format!("Updated README to version {}", record.version),
            };
            audit::record(tx, project_id, ActivityKind::DocumentUpdated, activity)?;

            let view = views::document_view(&*tx, project_id)?
                .ok_or_else(|| FolioError::not_found("readme", project_id))?;
            Ok((view, record.version, record.snapshot.size_bytes))
        })?;

        observability::record_version_committed(size_bytes);
        info!(project = %project_id, version, "README saved");
        Ok(view)
    }

    /// Put the README back to `version_id`'s content and record that as a new version
    pub fn restore_document_version(
        &self,
        project_id: Uuid,
        version_id: Uuid,
    ) -> Result<DocumentView> {
        restore::run(
            &self.store,
            &self.policy,
            &DocumentRestore {
                project_id,
                version_id,
            },
        )
    }

    /// The README with its history; `None` if it was never saved
    pub fn get_document(&self, project_id: Uuid) -> Result<Option<DocumentView>> {
        self.read(|tx| views::document_view(tx, project_id))
    }
}

#[cfg(test)]
mod tests {
    use crate::config::{EngineConfig, DEFAULT_README_TEMPLATE};
    use crate::model::{ActivityKind, NewProject};
    use crate::store::MemoryStore;
    use crate::{FolioError, VersionEngine};

    #[test]
    fn test_first_blank_save_uses_template() {
        let engine = VersionEngine::new(MemoryStore::new());
        let project = engine.create_project(NewProject::new("Doc")).unwrap().project;

        assert!(engine.get_document(project.id).unwrap().is_none());

        let view = engine.save_document(project.id, "", None).unwrap();
        assert_eq!(view.readme.content, DEFAULT_README_TEMPLATE);
        assert_eq!(view.current_version(), 1);
        assert_eq!(view.versions[0].reason.as_deref(), Some("Initial README"));
    }

    #[test]
    fn test_custom_template_from_config() {
        let config = EngineConfig {
            readme_template: "# TODO".into(),
            ..EngineConfig::default()
        };
        let engine = VersionEngine::with_config(MemoryStore::new(), config).unwrap();
        let project = engine.create_project(NewProject::new("Doc")).unwrap().project;

        let view = engine.save_document(project.id, "  ", None).unwrap();
        assert_eq!(view.readme.content, "# TODO");
    }

    #[test]
    fn test_later_blank_save_is_rejected() {
        let engine = VersionEngine::new(MemoryStore::new());
        let project = engine.create_project(NewProject::new("Doc")).unwrap().project;
        engine.save_document(project.id, "# Doc", None).unwrap();

        let err = engine.save_document(project.id, "", None).unwrap_err();
        assert!(matches!(err, FolioError::Validation(_)));
        assert_eq!(engine.get_document(project.id).unwrap().unwrap().versions.len(), 1);
    }

    #[test]
    fn test_messages_and_activity() {
        let engine = VersionEngine::new(MemoryStore::new());
        let project = engine.create_project(NewProject::new("Doc")).unwrap().project;

        engine.save_document(project.id, "# v1", None).unwrap();
        let view = engine
            .save_document(project.id, "# v2", Some("add setup notes"))
            .unwrap();
        let view3 = engine.save_document(project.id, "# v3", None).unwrap();

        assert_eq!(view.versions[0].reason.as_deref(), Some("add setup notes"));
        assert_eq!(
            view3.versions[0].reason.as_deref(),
            Some("Updated README to version 3")
        );

        let activity = engine.list_activity(project.id).unwrap();
        assert_eq!(activity[0].kind, ActivityKind::DocumentUpdated);
        assert_eq!(activity[0].content, "Updated README to version 3");
        assert_eq!(activity[1].content, "Updated README: add setup notes");
    }

    #[test]
    fn test_missing_project_is_not_found() {
        let engine = VersionEngine::new(MemoryStore::new());
        let missing = uuid::Uuid::new_v4();
        assert!(engine.get_document(missing).unwrap_err().is_not_found());
        assert!(engine
            .save_document(missing, "# Doc", None)
            .unwrap_err()
            .is_not_found());
    }
}
