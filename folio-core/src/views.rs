/*!
Read-side assembly of what callers get back from the engine.
*/

use crate::ledger::{DocumentLedger, DocumentVersion};
use crate::model::{ProjectView, Readme};
use crate::store::Transaction;
use crate::{FolioError, Result};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A project's README with its version history, newest first
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DocumentView {
    pub readme: Readme,
    pub versions: Vec<DocumentVersion>,
}

impl DocumentView {
    /// Highest version number, `0` before the first save
    pub fn current_version(&self) -> u32 {
        self.versions.first().map_or(0, |v| v.version)
    }
}

pub(crate) fn project_view(tx: &dyn Transaction, project_id: Uuid) -> Result<ProjectView> {
    let project = tx
        .get_project(project_id)?
        .ok_or_else(|| FolioError::not_found("project", project_id))?;

    let mut sections = tx.sections_for(project_id)?;
    sections.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.title.cmp(&b.title)));

    let mut resources = tx.resources_for(project_id)?;
    resources.sort_by(|a, b| (&a.kind, &a.title).cmp(&(&b.kind, &b.title)));

    let mut tags = Vec::new();
    for tag_id in tx.tag_ids_for(project_id)? {
        if let Some(tag) = tx.get_tag(tag_id)? {
            tags.push(tag);
        }
    }
    tags.sort_by(|a, b| a.name.cmp(&b.name));

    Ok(ProjectView {
        project,
        sections,
        resources,
        tags,
    })
}

/// `None` when the project exists but has no README yet
pub(crate) fn document_view(tx: &dyn Transaction, project_id: Uuid) -> Result<Option<DocumentView>> {
    if tx.get_project(project_id)?.is_none() {
        return Err(FolioError::not_found("project", project_id));
    }

    match tx.readme_for(project_id)? {
        None => Ok(None),
        Some(readme) => {
            let versions = DocumentLedger::list_versions(tx, readme.id)?;
            Ok(Some(DocumentView { readme, versions }))
        }
    }
}
