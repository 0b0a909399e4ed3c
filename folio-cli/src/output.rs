//! Table rows and formatting helpers for terminal output

use chrono::{DateTime, Local, Utc};
use folio_core::model::{Activity, Project, ProjectView, Resource, Section};
use folio_core::VersionRecord;
use tabled::{Table, Tabled};

const PREVIEW_CHARS: usize = 48;

#[derive(Tabled)]
pub struct ProjectRow {
    #[tabled(rename = "ID")]
    pub id: String,
    #[tabled(rename = "Title")]
    pub title: String,
    #[tabled(rename = "Status")]
    pub status: String,
    #[tabled(rename = "Updated")]
    pub updated: String,
}

impl From<&Project> for ProjectRow {
    fn from(project: &Project) -> Self {
        Self {
            id: project.id.to_string(),
            title: project.title.clone(),
            status: project.status.clone(),
            updated: format_timestamp(project.updated_at),
        }
    }
}

#[derive(Tabled)]
pub struct SectionRow {
    #[tabled(rename = "ID")]
    pub id: String,
    #[tabled(rename = "Order")]
    pub order: i64,
    #[tabled(rename = "Title")]
    pub title: String,
    #[tabled(rename = "Content")]
    pub content: String,
}

impl From<&Section> for SectionRow {
    fn from(section: &Section) -> Self {
        Self {
            id: section.id.to_string(),
            order: section.order,
            title: section.title.clone(),
            content: preview(&section.content),
        }
    }
}

#[derive(Tabled)]
pub struct ResourceRow {
    #[tabled(rename = "ID")]
    pub id: String,
    #[tabled(rename = "Kind")]
    pub kind: String,
    #[tabled(rename = "Title")]
    pub title: String,
    #[tabled(rename = "URL")]
    pub url: String,
}

impl From<&Resource> for ResourceRow {
    fn from(resource: &Resource) -> Self {
        Self {
            id: resource.id.to_string(),
            kind: resource.kind.clone(),
            title: resource.title.clone(),
            url: resource.url.clone(),
        }
    }
}

#[derive(Tabled)]
pub struct VersionRow {
    #[tabled(rename = "Version")]
    pub version: u32,
    #[tabled(rename = "ID")]
    pub id: String,
    #[tabled(rename = "Reason")]
    pub reason: String,
    #[tabled(rename = "Size")]
    pub size: String,
    #[tabled(rename = "Created")]
    pub created: String,
}

impl<S> From<&VersionRecord<S>> for VersionRow {
    fn from(record: &VersionRecord<S>) -> Self {
        Self {
            version: record.version,
            id: record.id.to_string(),
            reason: record.reason.clone().unwrap_or_else(|| "-".to_string()),
            size: format_size(record.snapshot.size_bytes as u64),
            created: format_timestamp(record.created_at),
        }
    }
}

#[derive(Tabled)]
pub struct ActivityRow {
    #[tabled(rename = "#")]
    pub sequence: u64,
    #[tabled(rename = "Kind")]
    pub kind: String,
    #[tabled(rename = "Content")]
    pub content: String,
    #[tabled(rename = "When")]
    pub when: String,
}

impl From<&Activity> for ActivityRow {
    fn from(activity: &Activity) -> Self {
        Self {
            sequence: activity.sequence,
            kind: activity.kind.to_string(),
            content: activity.content.clone(),
            when: format_timestamp(activity.created_at),
        }
    }
}

/// Render rows as a table, or a placeholder line when there are none
pub fn table<'a, T, R>(items: impl IntoIterator<Item = &'a T>, empty: &str) -> String
where
    T: 'a,
    R: Tabled + From<&'a T>,
{
    let rows: Vec<R> = items.into_iter().map(R::from).collect();
    if rows.is_empty() {
        empty.to_string()
    } else {
        Table::new(rows).to_string()
    }
}

pub fn print_project(view: &ProjectView) {
    let project = &view.project;
    println!("Project: {}", project.title);
    println!("  ID: {}", project.id);
    if let Some(subtitle) = &project.subtitle {
        println!("  Subtitle: {subtitle}");
    }
    if let Some(description) = &project.description {
        println!("  Description: {description}");
    }
    println!("  Status: {}", project.status);
    println!("  Created: {}", format_timestamp(project.created_at));
    println!("  Updated: {}", format_timestamp(project.updated_at));

    let tags: Vec<&str> = view.tags.iter().map(|t| t.name.as_str()).collect();
    if !tags.is_empty() {
        println!("  Tags: {}", tags.join(", "));
    }

    println!();
    println!(
        "{}",
        table::<_, SectionRow>(&view.sections, "No sections")
    );
    println!(
        "{}",
        table::<_, ResourceRow>(&view.resources, "No resources")
    );
}

pub fn format_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[unit_index])
    } else {
        format!("{:.1} {}", size, UNITS[unit_index])
    }
}

pub fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp
        .with_timezone(&Local)
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}

// First line only, truncated on a char boundary
fn preview(content: &str) -> String {
    let line = content.lines().next().unwrap_or_default();
    if line.chars().count() > PREVIEW_CHARS || content.lines().nth(1).is_some() {
        let cut: String = line.chars().take(PREVIEW_CHARS).collect();
        format!("{cut}...")
    } else {
        line.to_string()
    }
}
