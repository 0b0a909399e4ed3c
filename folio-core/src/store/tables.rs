/*!
Table state shared by the in-process adapters.

[`Tables`] owns every row and enforces the relational constraints a database
would: foreign keys resolve, ids are unique, `(owner, version)` is unique and
tag names are unique. Each transaction records its writes as [`Op`]s so the
memory store can replay them onto newer state at commit.

Every write also carries the stamp its aggregate (a project, or a shared tag)
had when the transaction wrote it. Replay refuses a write whose aggregate was
stamped again by another transaction in the meantime, so rows built from a
stale read never overwrite newer state.
*/

use super::fault::{FaultPlan, FaultPoint};
use super::{Transaction, VersionTable};
use crate::ledger::{DocumentVersion, ProjectVersion};
use crate::model::{Activity, Project, Readme, Resource, Section, Tag};
use crate::snapshot::{DocumentState, ProjectState};
use crate::{FolioError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub(crate) struct Tables {
    projects: BTreeMap<Uuid, Project>,
    sections: Vec<Section>,
    resources: Vec<Resource>,
    tags: BTreeMap<Uuid, Tag>,
    /// `(project_id, tag_id)` membership pairs
    project_tags: BTreeSet<(Uuid, Uuid)>,
    readmes: Vec<Readme>,
    project_versions: Vec<ProjectVersion>,
    document_versions: Vec<DocumentVersion>,
    activities: Vec<Activity>,
    next_sequence: u64,
    /// Write stamp per aggregate root
    stamps: BTreeMap<Uuid, u64>,
}

impl Tables {
    fn require_project(&self, id: Uuid) -> Result<()> {
        if self.projects.contains_key(&id) {
            Ok(())
        } else {
            Err(FolioError::not_found("project", id))
        }
    }

    fn insert_project(&mut self, project: Project) -> Result<()> {
        if self.projects.contains_key(&project.id) {
            return Err(FolioError::conflict(format!(
                "project {} already exists",
                project.id
            )));
        }
        self.projects.insert(project.id, project);
        Ok(())
    }

    fn update_project(&mut self, project: Project) -> Result<()> {
        match self.projects.get_mut(&project.id) {
            Some(row) => {
                *row = project;
                Ok(())
            }
            None => Err(FolioError::not_found("project", project.id)),
        }
    }

    fn delete_project(&mut self, id: Uuid) -> Result<()> {
        if self.projects.remove(&id).is_none() {
            return Err(FolioError::not_found("project", id));
        }

        let readme_ids: BTreeSet<Uuid> = self
            .readmes
            .iter()
            .filter(|readme| readme.project_id == id)
            .map(|readme| readme.id)
            .collect();

        self.sections.retain(|section| section.project_id != id);
        self.resources.retain(|resource| resource.project_id != id);
        self.project_tags.retain(|(project_id, _)| *project_id != id);
        self.readmes.retain(|readme| readme.project_id != id);
        self.project_versions.retain(|record| record.owner_id != id);
        self.document_versions
            .retain(|record| !readme_ids.contains(&record.owner_id));
        self.activities.retain(|activity| activity.project_id != id);
        Ok(())
    }

    fn insert_section(&mut self, section: Section) -> Result<()> {
        self.require_project(section.project_id)?;
        if self.sections.iter().any(|row| row.id == section.id) {
            return Err(FolioError::conflict(format!(
                "section {} already exists",
                section.id
            )));
        }
        self.sections.push(section);
        Ok(())
    }

    fn update_section(&mut self, section: Section) -> Result<()> {
        match self.sections.iter_mut().find(|row| row.id == section.id) {
            Some(row) => {
                *row = section;
                Ok(())
            }
            None => Err(FolioError::not_found("section", section.id)),
        }
    }

    fn delete_section(&mut self, id: Uuid) -> Result<()> {
        let before = self.sections.len();
        self.sections.retain(|row| row.id != id);
        if self.sections.len() == before {
            return Err(FolioError::not_found("section", id));
        }
        Ok(())
    }

    fn delete_sections_for(&mut self, project_id: Uuid) -> Result<()> {
        self.require_project(project_id)?;
        self.sections.retain(|row| row.project_id != project_id);
        Ok(())
    }

    fn insert_resource(&mut self, resource: Resource) -> Result<()> {
        self.require_project(resource.project_id)?;
        if self.resources.iter().any(|row| row.id == resource.id) {
            return Err(FolioError::conflict(format!(
                "resource {} already exists",
                resource.id
            )));
        }
        self.resources.push(resource);
        Ok(())
    }

    fn delete_resource(&mut self, id: Uuid) -> Result<()> {
        let before = self.resources.len();
        self.resources.retain(|row| row.id != id);
        if self.resources.len() == before {
            return Err(FolioError::not_found("resource", id));
        }
        Ok(())
    }

    fn delete_resources_for(&mut self, project_id: Uuid) -> Result<()> {
        self.require_project(project_id)?;
        self.resources.retain(|row| row.project_id != project_id);
        Ok(())
    }

    fn check_tag_name(&self, tag: &Tag) -> Result<()> {
        let taken = self
            .tags
            .values()
            .any(|row| row.name == tag.name && row.id != tag.id);
        if taken {
            return Err(FolioError::conflict(format!(
                "tag name '{}' already exists",
                tag.name
            )));
        }
        Ok(())
    }

    fn insert_tag(&mut self, tag: Tag) -> Result<()> {
        if self.tags.contains_key(&tag.id) {
            return Err(FolioError::conflict(format!("tag {} already exists", tag.id)));
        }
        self.check_tag_name(&tag)?;
        self.tags.insert(tag.id, tag);
        Ok(())
    }

    fn update_tag(&mut self, tag: Tag) -> Result<()> {
        if !self.tags.contains_key(&tag.id) {
            return Err(FolioError::not_found("tag", tag.id));
        }
        self.check_tag_name(&tag)?;
        self.tags.insert(tag.id, tag);
        Ok(())
    }

    fn delete_tag(&mut self, id: Uuid) -> Result<()> {
        if self.tags.remove(&id).is_none() {
            return Err(FolioError::not_found("tag", id));
        }
        self.project_tags.retain(|(_, tag_id)| *tag_id != id);
        Ok(())
    }

    fn set_project_tags(&mut self, project_id: Uuid, tag_ids: &[Uuid]) -> Result<()> {
        self.require_project(project_id)?;
        if let Some(missing) = tag_ids.iter().find(|id| !self.tags.contains_key(*id)) {
            return Err(FolioError::not_found("tag", missing));
        }
        self.project_tags
            .retain(|(owner, _)| *owner != project_id);
        self.project_tags
            .extend(tag_ids.iter().map(|tag_id| (project_id, *tag_id)));
        Ok(())
    }

    fn insert_readme(&mut self, readme: Readme) -> Result<()> {
        self.require_project(readme.project_id)?;
        if self
            .readmes
            .iter()
            .any(|row| row.id == readme.id || row.project_id == readme.project_id)
        {
            return Err(FolioError::conflict(format!(
                "project {} already has a readme",
                readme.project_id
            )));
        }
        self.readmes.push(readme);
        Ok(())
    }

    fn update_readme(&mut self, readme: Readme) -> Result<()> {
        match self.readmes.iter_mut().find(|row| row.id == readme.id) {
            Some(row) => {
                *row = readme;
                Ok(())
            }
            None => Err(FolioError::not_found("readme", readme.id)),
        }
    }

    fn insert_project_version(&mut self, record: ProjectVersion) -> Result<()> {
        self.require_project(record.owner_id)?;
        check_version_slot(&self.project_versions, record.id, record.owner_id, record.version)?;
        self.project_versions.push(record);
        Ok(())
    }

    fn insert_document_version(&mut self, record: DocumentVersion) -> Result<()> {
        if !self.readmes.iter().any(|row| row.id == record.owner_id) {
            return Err(FolioError::not_found("readme", record.owner_id));
        }
        check_version_slot(&self.document_versions, record.id, record.owner_id, record.version)?;
        self.document_versions.push(record);
        Ok(())
    }

    fn insert_activity(&mut self, mut activity: Activity) -> Result<()> {
        self.require_project(activity.project_id)?;
        self.next_sequence += 1;
        activity.sequence = self.next_sequence;
        self.activities.push(activity);
        Ok(())
    }
}

/// Unique `(owner, version)` and unique id, as a database index would enforce
fn check_version_slot<S>(
    rows: &[crate::ledger::VersionRecord<S>],
    id: Uuid,
    owner_id: Uuid,
    version: u32,
) -> Result<()> {
    if rows.iter().any(|row| row.id == id) {
        return Err(FolioError::conflict(format!("version row {id} already exists")));
    }
    if rows
        .iter()
        .any(|row| row.owner_id == owner_id && row.version == version)
    {
        return Err(FolioError::conflict(format!(
            "version {version} already exists for {owner_id}"
        )));
    }
    Ok(())
}

/// One recorded write, replayable onto any [`Tables`]
#[derive(Debug, Clone)]
pub(crate) enum Op {
    InsertProject(Project),
    UpdateProject(Project),
    DeleteProject(Uuid),
    InsertSection(Section),
    UpdateSection(Section),
    DeleteSection(Uuid),
    DeleteSectionsFor(Uuid),
    InsertResource(Resource),
    DeleteResource(Uuid),
    DeleteResourcesFor(Uuid),
    InsertTag(Tag),
    UpdateTag(Tag),
    DeleteTag(Uuid),
    SetProjectTags(Uuid, Vec<Uuid>),
    InsertReadme(Readme),
    UpdateReadme(Readme),
    InsertProjectVersion(ProjectVersion),
    InsertDocumentVersion(DocumentVersion),
    InsertActivity(Activity),
}

impl Op {
    fn apply(self, tables: &mut Tables) -> Result<()> {
        match self {
            Op::InsertProject(project) => tables.insert_project(project),
            Op::UpdateProject(project) => tables.update_project(project),
            Op::DeleteProject(id) => tables.delete_project(id),
            Op::InsertSection(section) => tables.insert_section(section),
            Op::UpdateSection(section) => tables.update_section(section),
            Op::DeleteSection(id) => tables.delete_section(id),
            Op::DeleteSectionsFor(project_id) => tables.delete_sections_for(project_id),
            Op::InsertResource(resource) => tables.insert_resource(resource),
            Op::DeleteResource(id) => tables.delete_resource(id),
            Op::DeleteResourcesFor(project_id) => tables.delete_resources_for(project_id),
            Op::InsertTag(tag) => tables.insert_tag(tag),
            Op::UpdateTag(tag) => tables.update_tag(tag),
            Op::DeleteTag(id) => tables.delete_tag(id),
            Op::SetProjectTags(project_id, tag_ids) => {
                tables.set_project_tags(project_id, &tag_ids)
            }
            Op::InsertReadme(readme) => tables.insert_readme(readme),
            Op::UpdateReadme(readme) => tables.update_readme(readme),
            Op::InsertProjectVersion(record) => tables.insert_project_version(record),
            Op::InsertDocumentVersion(record) => tables.insert_document_version(record),
            Op::InsertActivity(activity) => tables.insert_activity(activity),
        }
    }

    fn fault_point(&self) -> FaultPoint {
        match self {
            Op::InsertProject(_) | Op::UpdateProject(_) | Op::DeleteProject(_) => {
                FaultPoint::WriteProject
            }
            Op::InsertSection(_)
            | Op::UpdateSection(_)
            | Op::DeleteSection(_)
            | Op::DeleteSectionsFor(_) => FaultPoint::WriteSection,
            Op::InsertResource(_) | Op::DeleteResource(_) | Op::DeleteResourcesFor(_) => {
                FaultPoint::WriteResource
            }
            Op::InsertTag(_) | Op::UpdateTag(_) | Op::DeleteTag(_) | Op::SetProjectTags(..) => {
                FaultPoint::WriteTag
            }
            Op::InsertReadme(_) | Op::UpdateReadme(_) => FaultPoint::WriteReadme,
            Op::InsertProjectVersion(_) | Op::InsertDocumentVersion(_) => {
                FaultPoint::InsertVersion
            }
            Op::InsertActivity(_) => FaultPoint::InsertActivity,
        }
    }

    /// Project or tag whose stamp guards this write
    fn aggregate(&self, tables: &Tables) -> Result<Uuid> {
        let id = match self {
            Op::InsertProject(project) | Op::UpdateProject(project) => project.id,
            Op::DeleteProject(id)
            | Op::DeleteSectionsFor(id)
            | Op::DeleteResourcesFor(id)
            | Op::SetProjectTags(id, _) => *id,
            Op::InsertSection(section) | Op::UpdateSection(section) => section.project_id,
            Op::DeleteSection(id) => tables
                .sections
                .iter()
                .find(|row| row.id == *id)
                .map(|row| row.project_id)
                .ok_or_else(|| FolioError::not_found("section", id))?,
            Op::InsertResource(resource) => resource.project_id,
            Op::DeleteResource(id) => tables
                .resources
                .iter()
                .find(|row| row.id == *id)
                .map(|row| row.project_id)
                .ok_or_else(|| FolioError::not_found("resource", id))?,
            Op::InsertTag(tag) | Op::UpdateTag(tag) => tag.id,
            Op::DeleteTag(id) => *id,
            Op::InsertReadme(readme) | Op::UpdateReadme(readme) => readme.project_id,
            Op::InsertProjectVersion(record) => record.owner_id,
            Op::InsertDocumentVersion(record) => tables
                .readmes
                .iter()
                .find(|row| row.id == record.owner_id)
                .map(|row| row.project_id)
                .ok_or_else(|| FolioError::not_found("readme", record.owner_id))?,
            Op::InsertActivity(activity) => activity.project_id,
        };
        Ok(id)
    }
}

/// One logged write and the aggregate stamp it was made against
#[derive(Debug, Clone)]
pub(crate) struct Write {
    op: Op,
    aggregate: Uuid,
    seen: Option<u64>,
}

impl Write {
    fn apply(self, tables: &mut Tables) -> Result<()> {
        let current = tables.stamps.get(&self.aggregate).copied();
        if current != self.seen {
            return Err(FolioError::conflict(format!(
                "{} was changed by another transaction",
                self.aggregate
            )));
        }

        let removes = matches!(self.op, Op::DeleteProject(_) | Op::DeleteTag(_));
        self.op.apply(tables)?;
        if removes {
            tables.stamps.remove(&self.aggregate);
        } else {
            *tables.stamps.entry(self.aggregate).or_default() += 1;
        }
        Ok(())
    }
}

/// Replay a transaction's write log onto `tables`
pub(crate) fn replay(tables: &mut Tables, log: Vec<Write>) -> Result<()> {
    for write in log {
        write.apply(tables)?;
    }
    Ok(())
}

/// Transaction over a private working copy of [`Tables`]
///
/// The caller decides what happens to the working copy afterwards; dropping
/// it is a rollback.
pub(crate) struct TableTransaction<'a> {
    working: &'a mut Tables,
    log: Vec<Write>,
    faults: Option<&'a FaultPlan>,
}

impl<'a> TableTransaction<'a> {
    pub(crate) fn new(working: &'a mut Tables, faults: Option<&'a FaultPlan>) -> Self {
        Self {
            working,
            log: Vec::new(),
            faults,
        }
    }

    pub(crate) fn into_log(self) -> Vec<Write> {
        self.log
    }

    fn write(&mut self, op: Op) -> Result<()> {
        if let Some(faults) = self.faults {
            faults.trip(op.fault_point())?;
        }
        let aggregate = op.aggregate(self.working)?;
        let write = Write {
            seen: self.working.stamps.get(&aggregate).copied(),
            aggregate,
            op,
        };
        write.clone().apply(self.working)?;
        self.log.push(write);
        Ok(())
    }
}

impl VersionTable<ProjectState> for TableTransaction<'_> {
    fn max_version(&self, owner_id: Uuid) -> Result<Option<u32>> {
        Ok(self
            .working
            .project_versions
            .iter()
            .filter(|row| row.owner_id == owner_id)
            .map(|row| row.version)
            .max())
    }

    fn insert_version(&mut self, record: ProjectVersion) -> Result<()> {
        self.write(Op::InsertProjectVersion(record))
    }

    fn versions_for(&self, owner_id: Uuid) -> Result<Vec<ProjectVersion>> {
        Ok(self
            .working
            .project_versions
            .iter()
            .filter(|row| row.owner_id == owner_id)
            .cloned()
            .collect())
    }

    fn find_version(&self, version_id: Uuid) -> Result<Option<ProjectVersion>> {
        Ok(self
            .working
            .project_versions
            .iter()
            .find(|row| row.id == version_id)
            .cloned())
    }
}

impl VersionTable<DocumentState> for TableTransaction<'_> {
    fn max_version(&self, owner_id: Uuid) -> Result<Option<u32>> {
        Ok(self
            .working
            .document_versions
            .iter()
            .filter(|row| row.owner_id == owner_id)
            .map(|row| row.version)
            .max())
    }

    fn insert_version(&mut self, record: DocumentVersion) -> Result<()> {
        self.write(Op::InsertDocumentVersion(record))
    }

    fn versions_for(&self, owner_id: Uuid) -> Result<Vec<DocumentVersion>> {
        Ok(self
            .working
            .document_versions
            .iter()
            .filter(|row| row.owner_id == owner_id)
            .cloned()
            .collect())
    }

    fn find_version(&self, version_id: Uuid) -> Result<Option<DocumentVersion>> {
        Ok(self
            .working
            .document_versions
            .iter()
            .find(|row| row.id == version_id)
            .cloned())
    }
}

impl Transaction for TableTransaction<'_> {
    fn get_project(&self, id: Uuid) -> Result<Option<Project>> {
        Ok(self.working.projects.get(&id).cloned())
    }

    fn list_projects(&self) -> Result<Vec<Project>> {
        Ok(self.working.projects.values().cloned().collect())
    }

    fn insert_project(&mut self, project: Project) -> Result<()> {
        self.write(Op::InsertProject(project))
    }

    fn update_project(&mut self, project: Project) -> Result<()> {
        self.write(Op::UpdateProject(project))
    }

    fn delete_project(&mut self, id: Uuid) -> Result<()> {
        self.write(Op::DeleteProject(id))
    }

    fn sections_for(&self, project_id: Uuid) -> Result<Vec<Section>> {
        Ok(self
            .working
            .sections
            .iter()
            .filter(|row| row.project_id == project_id)
            .cloned()
            .collect())
    }

    fn get_section(&self, id: Uuid) -> Result<Option<Section>> {
        Ok(self.working.sections.iter().find(|row| row.id == id).cloned())
    }

    fn insert_section(&mut self, section: Section) -> Result<()> {
        self.write(Op::InsertSection(section))
    }

    fn update_section(&mut self, section: Section) -> Result<()> {
        self.write(Op::UpdateSection(section))
    }

    fn delete_section(&mut self, id: Uuid) -> Result<()> {
        self.write(Op::DeleteSection(id))
    }

    fn delete_sections_for(&mut self, project_id: Uuid) -> Result<()> {
        self.write(Op::DeleteSectionsFor(project_id))
    }

    fn resources_for(&self, project_id: Uuid) -> Result<Vec<Resource>> {
        Ok(self
            .working
            .resources
            .iter()
            .filter(|row| row.project_id == project_id)
            .cloned()
            .collect())
    }

    fn get_resource(&self, id: Uuid) -> Result<Option<Resource>> {
        Ok(self.working.resources.iter().find(|row| row.id == id).cloned())
    }

    fn insert_resource(&mut self, resource: Resource) -> Result<()> {
        self.write(Op::InsertResource(resource))
    }

    fn delete_resource(&mut self, id: Uuid) -> Result<()> {
        self.write(Op::DeleteResource(id))
    }

    fn delete_resources_for(&mut self, project_id: Uuid) -> Result<()> {
        self.write(Op::DeleteResourcesFor(project_id))
    }

    fn get_tag(&self, id: Uuid) -> Result<Option<Tag>> {
        Ok(self.working.tags.get(&id).cloned())
    }

    fn find_tag_by_name(&self, name: &str) -> Result<Option<Tag>> {
        Ok(self
            .working
            .tags
            .values()
            .find(|tag| tag.name == name)
            .cloned())
    }

    fn insert_tag(&mut self, tag: Tag) -> Result<()> {
        self.write(Op::InsertTag(tag))
    }

    fn update_tag(&mut self, tag: Tag) -> Result<()> {
        self.write(Op::UpdateTag(tag))
    }

    fn delete_tag(&mut self, id: Uuid) -> Result<()> {
        self.write(Op::DeleteTag(id))
    }

    fn tag_ids_for(&self, project_id: Uuid) -> Result<Vec<Uuid>> {
        Ok(self
            .working
            .project_tags
            .iter()
            .filter(|(owner, _)| *owner == project_id)
            .map(|(_, tag_id)| *tag_id)
            .collect())
    }

    fn set_project_tags(&mut self, project_id: Uuid, tag_ids: &[Uuid]) -> Result<()> {
        self.write(Op::SetProjectTags(project_id, tag_ids.to_vec()))
    }

    fn readme_for(&self, project_id: Uuid) -> Result<Option<Readme>> {
        Ok(self
            .working
            .readmes
            .iter()
            .find(|row| row.project_id == project_id)
            .cloned())
    }

    fn insert_readme(&mut self, readme: Readme) -> Result<()> {
        self.write(Op::InsertReadme(readme))
    }

    fn update_readme(&mut self, readme: Readme) -> Result<()> {
        self.write(Op::UpdateReadme(readme))
    }

    fn insert_activity(&mut self, activity: Activity) -> Result<()> {
        self.write(Op::InsertActivity(activity))
    }

    fn activities_for(&self, project_id: Uuid) -> Result<Vec<Activity>> {
        Ok(self
            .working
            .activities
            .iter()
            .filter(|row| row.project_id == project_id)
            .cloned()
            .collect())
    }
}
