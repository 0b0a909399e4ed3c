/*!
Live records of the project-tracking domain and the inputs that mutate them.

These are the rows the persistence port stores. Versioned history lives in
[`crate::ledger`]; frozen copies of this state live in [`crate::snapshot`].
*/

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Status assigned to new projects when the caller does not pick one
pub const DEFAULT_PROJECT_STATUS: &str = "active";

/// Aggregate root: a project and the scalar fields versioning captures
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Project {
    pub id: Uuid,
    pub title: String,
    pub subtitle: Option<String>,
    pub description: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Project {
    pub fn new(title: impl Into<String>, status: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            subtitle: None,
            description: None,
            status: status.into(),
            created_at: now,
            updated_at: now,
        }
    }

    pub(crate) fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Ordered child record owned by a project
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Section {
    pub id: Uuid,
    pub project_id: Uuid,
    pub title: String,
    pub content: String,
    pub order: i64,
}

/// Unordered child record owned by a project (links, docs, designs)
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Resource {
    pub id: Uuid,
    pub project_id: Uuid,
    pub kind: String,
    pub title: String,
    pub url: String,
}

/// Label shared between projects; projects reference tags, they do not own them
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    pub id: Uuid,
    pub name: String,
}

impl Tag {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
        }
    }
}

/// Long-form document tied 1:1 to a project, versioned on every save
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Readme {
    pub id: Uuid,
    pub project_id: Uuid,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// What an activity entry describes
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    Created,
    Updated,
    Version,
    Restored,
    SectionCreated,
    SectionUpdated,
    SectionDeleted,
    SectionsReordered,
    DocumentUpdated,
    DocumentRestored,
}

impl ActivityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityKind::Created => "created",
            ActivityKind::Updated => "updated",
            ActivityKind::Version => "version",
            ActivityKind::Restored => "restored",
            ActivityKind::SectionCreated => "section_created",
            ActivityKind::SectionUpdated => "section_updated",
            ActivityKind::SectionDeleted => "section_deleted",
            ActivityKind::SectionsReordered => "sections_reordered",
            ActivityKind::DocumentUpdated => "document_updated",
            ActivityKind::DocumentRestored => "document_restored",
        }
    }
}

impl fmt::Display for ActivityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One line of a project's audit trail
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Activity {
    pub id: Uuid,
    pub project_id: Uuid,
    /// Assigned by the store at commit; strictly increasing across the store
    pub sequence: u64,
    pub kind: ActivityKind,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// A project with its owned and referenced records, as callers see it
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ProjectView {
    pub project: Project,
    /// Sorted by `order`
    pub sections: Vec<Section>,
    pub resources: Vec<Resource>,
    pub tags: Vec<Tag>,
}

/// Input for creating a project
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct NewProject {
    pub title: String,
    pub subtitle: Option<String>,
    pub description: Option<String>,
    pub status: Option<String>,
    /// Tag names; existing tags are reused, unknown names are created
    #[serde(default)]
    pub tags: Vec<String>,
}

impl NewProject {
    pub fn new<S: Into<String>>(title: S) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn with_subtitle<S: Into<String>>(mut self, subtitle: S) -> Self {
        self.subtitle = Some(subtitle.into());
        self
    }

    pub fn with_description<S: Into<String>>(mut self, description: S) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_status<S: Into<String>>(mut self, status: S) -> Self {
        self.status = Some(status.into());
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }
}

/// Partial update of a project's scalar fields; `None` leaves a field alone
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct ProjectPatch {
    pub title: Option<String>,
    pub subtitle: Option<String>,
    pub description: Option<String>,
    pub status: Option<String>,
    /// When present, replaces tag membership with exactly these names
    pub tags: Option<Vec<String>>,
}

impl ProjectPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.subtitle.is_none()
            && self.description.is_none()
            && self.status.is_none()
            && self.tags.is_none()
    }
}

/// Input for adding a section; without an explicit order it goes last
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct NewSection {
    pub title: String,
    pub content: String,
    pub order: Option<i64>,
}

impl NewSection {
    pub fn new<S1: Into<String>, S2: Into<String>>(title: S1, content: S2) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            order: None,
        }
    }

    pub fn at(mut self, order: i64) -> Self {
        self.order = Some(order);
        self
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct SectionPatch {
    pub title: Option<String>,
    pub content: Option<String>,
    pub order: Option<i64>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct NewResource {
    pub kind: String,
    pub title: String,
    pub url: String,
}

impl NewResource {
    pub fn new<S1, S2, S3>(kind: S1, title: S2, url: S3) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
        S3: Into<String>,
    {
        Self {
            kind: kind.into(),
            title: title.into(),
            url: url.into(),
        }
    }
}
