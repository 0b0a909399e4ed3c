/*!
Engine facade: every mutation callers can make, each in one transaction.

Each write runs its reads, its writes, its ledger append and its activity
entry inside a single store transaction. A transaction that loses a version
number race fails with `Conflict` and is re-run from scratch according to
[`EngineConfig::retry_policy`]; a conflict that outlasts the policy reaches
the caller unchanged.
*/

use crate::audit;
use crate::codec;
use crate::config::EngineConfig;
use crate::ledger::{ProjectLedger, ProjectVersion};
use crate::model::{
    Activity, ActivityKind, NewProject, NewResource, NewSection, Project, ProjectPatch,
    ProjectView, Resource, Section, SectionPatch, Tag,
};
use crate::observability;
use crate::restore::{self, ProjectRestore};
use crate::store::{Store, Transaction};
use crate::views;
use crate::{FolioError, Result};
use folio_retry::{retry, RetryPolicy};
use std::collections::BTreeSet;
use tracing::info;
use uuid::Uuid;

/// Versioning engine over a store
///
/// Holds no mutable state of its own; share it freely between threads when
/// the store allows it.
///
/// # Example
/// ```rust
/// use folio_core::{MemoryStore, VersionEngine};
/// use folio_core::model::{NewProject, NewSection};
///
/// let engine = VersionEngine::new(MemoryStore::new());
/// let view = engine.create_project(NewProject::new("Folio"))?;
/// engine.add_section(view.project.id, NewSection::new("Intro", "v1 text"))?;
///
/// let v1 = engine.commit_version(view.project.id, Some("first draft"))?;
/// assert_eq!(v1.version, 1);
/// # Ok::<(), folio_core::FolioError>(())
/// ```
pub struct VersionEngine<S: Store> {
    pub(crate) store: S,
    pub(crate) config: EngineConfig,
    pub(crate) policy: RetryPolicy,
}

impl<S: Store> VersionEngine<S> {
    /// Engine with the default configuration
    pub fn new(store: S) -> Self {
        let config = EngineConfig::default();
        let policy = config.retry_policy();
        Self {
            store,
            config,
            policy,
        }
    }

    pub fn with_config(store: S, config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let policy = config.retry_policy();
        policy
            .validate()
            .map_err(|e| FolioError::validation(e.to_string()))?;
        Ok(Self {
            store,
            config,
            policy,
        })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run a mutation in its own transaction, re-running it on conflict
    pub(crate) fn write<T, F>(&self, op_name: &'static str, mut f: F) -> Result<T>
    where
        F: FnMut(&mut dyn Transaction) -> Result<T>,
    {
        retry(op_name, &self.policy, |_| {
            let result = self.store.transaction(|tx| f(tx));
            if result.as_ref().is_err_and(FolioError::is_conflict) {
                observability::record_conflict();
            }
            result
        })
    }

    pub(crate) fn read<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&dyn Transaction) -> Result<T>,
    {
        self.store.transaction(|tx| f(&*tx))
    }

    /// Create a project; tag names are reused when they exist and created otherwise
    pub fn create_project(&self, input: NewProject) -> Result<ProjectView> {
        let title = required("title", &input.title)?;
        let status = match input.status.as_deref() {
            Some(status) => required("status", status)?,
            None => self.config.default_status.clone(),
        };

        let view = self.write("create_project", |tx| {
            let mut project = Project::new(title.clone(), status.clone());
            project.subtitle = non_blank(input.subtitle.as_deref());
            project.description = non_blank(input.description.as_deref());
            tx.insert_project(project.clone())?;

            let tag_ids = resolve_tags(tx, &input.tags)?;
            tx.set_project_tags(project.id, &tag_ids)?;

            audit::record(
                tx,
                project.id,
                ActivityKind::Created,
                format!("Created project: {}", project.title),
            )?;
            views::project_view(&*tx, project.id)
        })?;

        info!(project = %view.project.id, title = %view.project.title, "Project created");
        Ok(view)
    }

    /// Update scalar fields and, when given, replace tag membership
    pub fn update_project(&self, project_id: Uuid, patch: ProjectPatch) -> Result<ProjectView> {
        if let Some(title) = patch.title.as_deref() {
            required("title", title)?;
        }
        if let Some(status) = patch.status.as_deref() {
            required("status", status)?;
        }

        let view = self.write("update_project", |tx| {
            let mut project = require_project(&*tx, project_id)?;
            if let Some(title) = patch.title.as_deref() {
                project.title = title.trim().to_string();
            }
            if let Some(subtitle) = patch.subtitle.as_deref() {
                project.subtitle = non_blank(Some(subtitle));
            }
            if let Some(description) = patch.description.as_deref() {
                project.description = non_blank(Some(description));
            }
            if let Some(status) = patch.status.as_deref() {
                project.status = status.trim().to_string();
            }
            project.touch();
            tx.update_project(project)?;

            if let Some(names) = patch.tags.as_deref() {
                let tag_ids = resolve_tags(tx, names)?;
                tx.set_project_tags(project_id, &tag_ids)?;
            }

            audit::record(tx, project_id, ActivityKind::Updated, "Project details updated")?;
            views::project_view(&*tx, project_id)
        })?;

        info!(project = %project_id, "Project updated");
        Ok(view)
    }

    /// Delete a project with its children, README, versions and activity
    pub fn delete_project(&self, project_id: Uuid) -> Result<()> {
        self.write("delete_project", |tx| {
            require_project(&*tx, project_id)?;
            tx.delete_project(project_id)
        })?;
        info!(project = %project_id, "Project deleted");
        Ok(())
    }

    pub fn get_project(&self, project_id: Uuid) -> Result<ProjectView> {
        self.read(|tx| views::project_view(tx, project_id))
    }

    /// All projects, most recently updated first
    pub fn list_projects(&self) -> Result<Vec<Project>> {
        let mut projects = self.read(|tx| tx.list_projects())?;
        projects.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(projects)
    }

    /// Add a section; without an explicit order it goes after the last one
    pub fn add_section(&self, project_id: Uuid, input: NewSection) -> Result<Section> {
        let title = required("title", &input.title)?;

        self.write("add_section", |tx| {
            require_project(&*tx, project_id)?;
            let order = match input.order {
                Some(order) => order,
                None => match tx.sections_for(project_id)?.iter().map(|s| s.order).max() {
                    None => 0,
                    Some(max) => max.checked_add(1).ok_or_else(|| {
                        FolioError::validation(
                            "no section order left after the last section; pass an explicit order",
                        )
                    })?,
                },
            };

            let section = Section {
                id: Uuid::new_v4(),
                project_id,
                title: title.clone(),
                content: input.content.clone(),
                order,
            };
            tx.insert_section(section.clone())?;
            audit::record(
                tx,
                project_id,
                ActivityKind::SectionCreated,
                format!("Created section: {}", section.title),
            )?;
            Ok(section)
        })
    }

    pub fn update_section(
        &self,
        project_id: Uuid,
        section_id: Uuid,
        patch: SectionPatch,
    ) -> Result<Section> {
        if let Some(title) = patch.title.as_deref() {
            required("title", title)?;
        }

        self.write("update_section", |tx| {
            let mut section = require_section(&*tx, project_id, section_id)?;
            if let Some(title) = patch.title.as_deref() {
                section.title = title.trim().to_string();
            }
            if let Some(content) = patch.content.as_ref() {
                section.content = content.clone();
            }
            if let Some(order) = patch.order {
                section.order = order;
            }

            tx.update_section(section.clone())?;
            audit::record(
                tx,
                project_id,
                ActivityKind::SectionUpdated,
                format!("Updated section: {}", section.title),
            )?;
            Ok(section)
        })
    }

    pub fn delete_section(&self, project_id: Uuid, section_id: Uuid) -> Result<()> {
        self.write("delete_section", |tx| {
            let section = require_section(&*tx, project_id, section_id)?;
            tx.delete_section(section_id)?;
            audit::record(
                tx,
                project_id,
                ActivityKind::SectionDeleted,
                format!("Deleted section: {}", section.title),
            )?;
            Ok(())
        })
    }

    /// Assign new orders to the given sections; returns all sections in order
    pub fn reorder_sections(&self, project_id: Uuid, orders: &[(Uuid, i64)]) -> Result<Vec<Section>> {
        self.write("reorder_sections", |tx| {
            require_project(&*tx, project_id)?;
            for (section_id, order) in orders {
                let mut section = require_section(&*tx, project_id, *section_id)?;
                section.order = *order;
                tx.update_section(section)?;
            }
            audit::record(
                tx,
                project_id,
                ActivityKind::SectionsReordered,
                "Reordered project sections",
            )?;
            Ok(views::project_view(&*tx, project_id)?.sections)
        })
    }

    pub fn add_resource(&self, project_id: Uuid, input: NewResource) -> Result<Resource> {
        let title = required("title", &input.title)?;
        let url = required("url", &input.url)?;
        let kind = required("kind", &input.kind)?;

        self.write("add_resource", |tx| {
            require_project(&*tx, project_id)?;
            let resource = Resource {
                id: Uuid::new_v4(),
                project_id,
                kind: kind.clone(),
                title: title.clone(),
                url: url.clone(),
            };
            tx.insert_resource(resource.clone())?;
            audit::record(
                tx,
                project_id,
                ActivityKind::Updated,
                format!("Added resource: {}", resource.title),
            )?;
            Ok(resource)
        })
    }

    pub fn remove_resource(&self, project_id: Uuid, resource_id: Uuid) -> Result<()> {
        self.write("remove_resource", |tx| {
            let resource = tx
                .get_resource(resource_id)?
                .filter(|r| r.project_id == project_id)
                .ok_or_else(|| FolioError::not_found("resource", resource_id))?;
            tx.delete_resource(resource_id)?;
            audit::record(
                tx,
                project_id,
                ActivityKind::Updated,
                format!("Removed resource: {}", resource.title),
            )?;
            Ok(())
        })
    }

    /// Rename a shared tag; every project referencing it sees the new name
    pub fn rename_tag(&self, tag_id: Uuid, name: &str) -> Result<Tag> {
        let name = required("name", name)?;

        self.write("rename_tag", |tx| {
            let mut tag = tx
                .get_tag(tag_id)?
                .ok_or_else(|| FolioError::not_found("tag", tag_id))?;
            if let Some(existing) = tx.find_tag_by_name(&name)? {
                if existing.id != tag_id {
                    return Err(FolioError::validation(format!(
                        "tag name '{name}' is already in use"
                    )));
                }
            }
            tag.name = name.clone();
            tx.update_tag(tag.clone())?;
            Ok(tag)
        })
    }

    /// Delete a shared tag and its memberships; versions keep their references
    pub fn delete_tag(&self, tag_id: Uuid) -> Result<()> {
        self.write("delete_tag", |tx| tx.delete_tag(tag_id))?;
        info!(tag = %tag_id, "Tag deleted");
        Ok(())
    }

    /// Freeze the project's current state as its next version
    ///
    /// # Arguments
    /// * `project_id` - Project to snapshot
    /// * `reason` - Optional label; blank is treated as absent
    pub fn commit_version(&self, project_id: Uuid, reason: Option<&str>) -> Result<ProjectVersion> {
        let reason = non_blank(reason);

        let record = self.write("commit_version", |tx| {
            let snapshot = codec::capture(&*tx, project_id)?;
            let record =
                ProjectLedger::append_version(&mut *tx, project_id, snapshot, reason.clone())?;

            let content = match record.reason.as_deref() {
                Some(reason) => format!("Created version {}: {}", record.version, reason),
                None => format!("Created version {}", record.version),
            };
            audit::record(tx, project_id, ActivityKind::Version, content)?;
            Ok(record)
        })?;

        observability::record_version_committed(record.snapshot.size_bytes);
        info!(
            project = %project_id,
            version = record.version,
            size_bytes = record.snapshot.size_bytes,
            "Version committed"
        );
        Ok(record)
    }

    /// The project's versions, newest first
    pub fn list_versions(&self, project_id: Uuid) -> Result<Vec<ProjectVersion>> {
        self.read(|tx| {
            require_project(tx, project_id)?;
            ProjectLedger::list_versions(tx, project_id)
        })
    }

    pub fn get_version(&self, version_id: Uuid) -> Result<ProjectVersion> {
        self.read(|tx| ProjectLedger::get_version(tx, version_id))
    }

    /// Put the project back to `version_id`'s state and record that as a new version
    pub fn restore_version(&self, project_id: Uuid, version_id: Uuid) -> Result<ProjectView> {
        restore::run(
            &self.store,
            &self.policy,
            &ProjectRestore {
                project_id,
                version_id,
            },
        )
    }

    /// The project's activity, newest first
    pub fn list_activity(&self, project_id: Uuid) -> Result<Vec<Activity>> {
        self.read(|tx| {
            require_project(tx, project_id)?;
            audit::list(tx, project_id)
        })
    }
}

pub(crate) fn require_project(tx: &dyn Transaction, project_id: Uuid) -> Result<Project> {
    tx.get_project(project_id)?
        .ok_or_else(|| FolioError::not_found("project", project_id))
}

/// A section that exists and belongs to `project_id`
fn require_section(tx: &dyn Transaction, project_id: Uuid, section_id: Uuid) -> Result<Section> {
    require_project(tx, project_id)?;
    tx.get_section(section_id)?
        .filter(|s| s.project_id == project_id)
        .ok_or_else(|| FolioError::not_found("section", section_id))
}

/// Find or create a tag for each distinct non-blank name
fn resolve_tags(tx: &mut dyn Transaction, names: &[String]) -> Result<Vec<Uuid>> {
    let mut seen = BTreeSet::new();
    let mut ids = Vec::new();

    for name in names.iter().map(|n| n.trim()).filter(|n| !n.is_empty()) {
        if !seen.insert(name) {
            continue;
        }
        let tag = match tx.find_tag_by_name(name)? {
            Some(tag) => tag,
            None => {
                let tag = Tag::new(name);
                tx.insert_tag(tag.clone())?;
                tag
            }
        };
        ids.push(tag.id);
    }
    Ok(ids)
}

pub(crate) fn required(field: &str, value: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(FolioError::validation(format!("{field} is required")));
    }
    Ok(trimmed.to_string())
}

pub(crate) fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
