/*!
Snapshot codec: capture live state into a self-contained snapshot, and write
a snapshot back over live state.

Capture orders every collection deterministically, so capturing unchanged
state twice yields equal snapshots. Apply replaces owned children wholesale:
the old rows are deleted and new rows with fresh ids are created from the
snapshot. Tags are shared rows and are never created here; membership is
restored only for tags that still exist.
*/

use crate::model::{Project, Readme, Resource, Section};
use crate::snapshot::{DocumentState, ProjectState, ResourceState, SectionState, Snapshot, TagRef};
use crate::store::Transaction;
use crate::{FolioError, Result};
use chrono::Utc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Counts of what [`apply`] wrote
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ApplyOutcome {
    pub sections: usize,
    pub resources: usize,
    pub tags: usize,
    /// Tag references skipped because the tag no longer exists
    pub dropped_tags: usize,
}

/// Freeze a project and its children
pub fn capture(tx: &dyn Transaction, project_id: Uuid) -> Result<Snapshot<ProjectState>> {
    let project = tx
        .get_project(project_id)?
        .ok_or_else(|| FolioError::not_found("project", project_id))?;

    Snapshot::seal(project_state(tx, &project)?)
}

fn project_state(tx: &dyn Transaction, project: &Project) -> Result<ProjectState> {
    let mut sections: Vec<SectionState> = tx
        .sections_for(project.id)?
        .into_iter()
        .map(|section| SectionState {
            title: section.title,
            content: section.content,
            order: section.order,
        })
        .collect();
    sections.sort_by(|a, b| {
        a.order
            .cmp(&b.order)
            .then_with(|| a.title.cmp(&b.title))
            .then_with(|| a.content.cmp(&b.content))
    });

    let mut resources: Vec<ResourceState> = tx
        .resources_for(project.id)?
        .into_iter()
        .map(|resource| ResourceState {
            kind: resource.kind,
            title: resource.title,
            url: resource.url,
        })
        .collect();
    resources.sort_by(|a, b| {
        (&a.kind, &a.title, &a.url).cmp(&(&b.kind, &b.title, &b.url))
    });

    let mut tags = Vec::new();
    for tag_id in tx.tag_ids_for(project.id)? {
        if let Some(tag) = tx.get_tag(tag_id)? {
            tags.push(TagRef {
                id: tag.id,
                name: tag.name,
            });
        }
    }
    tags.sort_by_key(|tag| tag.id);

    Ok(ProjectState {
        title: project.title.clone(),
        subtitle: project.subtitle.clone(),
        description: project.description.clone(),
        status: project.status.clone(),
        sections,
        resources,
        tags,
    })
}

/// Overwrite `project_id`'s live state with `snapshot`
///
/// Callers validate the envelope first; this writes whatever body it is given.
pub fn apply(
    tx: &mut dyn Transaction,
    snapshot: &Snapshot<ProjectState>,
    project_id: Uuid,
) -> Result<ApplyOutcome> {
    let state = &snapshot.body;
    let mut project = tx
        .get_project(project_id)?
        .ok_or_else(|| FolioError::not_found("project", project_id))?;

    project.title = state.title.clone();
    project.subtitle = state.subtitle.clone();
    project.description = state.description.clone();
    project.status = state.status.clone();
    project.touch();
    tx.update_project(project)?;

    tx.delete_sections_for(project_id)?;
    tx.delete_resources_for(project_id)?;

    for section in &state.sections {
        tx.insert_section(Section {
            id: Uuid::new_v4(),
            project_id,
            title: section.title.clone(),
            content: section.content.clone(),
            order: section.order,
        })?;
    }

    for resource in &state.resources {
        tx.insert_resource(Resource {
            id: Uuid::new_v4(),
            project_id,
            kind: resource.kind.clone(),
            title: resource.title.clone(),
            url: resource.url.clone(),
        })?;
    }

    let mut kept = Vec::with_capacity(state.tags.len());
    let mut dropped = 0;
    for tag in &state.tags {
        if tx.get_tag(tag.id)?.is_some() {
            kept.push(tag.id);
        } else {
            dropped += 1;
            warn!(project = %project_id, tag = %tag.id, name = %tag.name, "Dropping deleted tag from restored state");
        }
    }
    tx.set_project_tags(project_id, &kept)?;

    let outcome = ApplyOutcome {
        sections: state.sections.len(),
        resources: state.resources.len(),
        tags: kept.len(),
        dropped_tags: dropped,
    };
    debug!(project = %project_id, ?outcome, "Applied project snapshot");
    Ok(outcome)
}

/// Freeze document content
pub fn capture_document(content: &str) -> Result<Snapshot<DocumentState>> {
    Snapshot::seal(DocumentState {
        content: content.to_string(),
    })
}

/// Overwrite a readme's content with `snapshot` and return the updated row
pub fn apply_document(
    tx: &mut dyn Transaction,
    snapshot: &Snapshot<DocumentState>,
    mut readme: Readme,
) -> Result<Readme> {
    readme.content = snapshot.body.content.clone();
    readme.updated_at = Utc::now();
    tx.update_readme(readme.clone())?;
    Ok(readme)
}
