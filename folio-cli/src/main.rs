/*!
Command-line interface for Folio.

Every command opens the configured store, runs one engine operation and
prints the result. Mutations are committed before the command returns.
*/

mod output;

use std::fs;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use folio_core::model::{NewProject, NewResource, NewSection, ProjectPatch, SectionPatch};
use folio_core::{open_store, AnyStore, EngineConfig, Store, StoreConfig, VersionEngine};
use tracing::{debug, info, Level};
use uuid::Uuid;

use output::{
    format_size, format_timestamp, print_project, table, ActivityRow, ProjectRow, SectionRow,
    VersionRow,
};

#[derive(Parser)]
#[command(name = "folio")]
#[command(about = "Version project state and READMEs")]
#[command(version)]
struct Cli {
    /// Store location: memory://, file://<path> or a bare path (.gz compresses)
    #[arg(long, env = "FOLIO_STORE", default_value = "file://folio.json", global = true)]
    store: String,

    /// Engine configuration file (JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    /// Print Prometheus metrics to stderr after the command
    #[arg(long, global = true)]
    metrics: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create, inspect and edit projects
    #[command(subcommand)]
    Project(ProjectCommand),
    /// Edit a project's sections
    #[command(subcommand)]
    Section(SectionCommand),
    /// Attach and detach resources
    #[command(subcommand)]
    Resource(ResourceCommand),
    /// Rename or delete shared tags
    #[command(subcommand)]
    Tag(TagCommand),
    /// Commit, list, show and restore project versions
    #[command(subcommand)]
    Version(VersionCommand),
    /// Save, show and restore a project's README
    #[command(subcommand)]
    Readme(ReadmeCommand),
    /// Show a project's activity trail
    Activity {
        /// Project ID
        project: Uuid,
    },
}

#[derive(Subcommand)]
enum ProjectCommand {
    /// Create a project
    Create {
        title: String,
        #[command(flatten)]
        fields: ProjectFields,
    },
    /// List projects, most recently updated first
    List,
    /// Show a project with its sections, resources and tags
    Show { project: Uuid },
    /// Change a project's fields
    Update {
        project: Uuid,
        #[arg(long)]
        title: Option<String>,
        #[command(flatten)]
        fields: ProjectFields,
        /// Remove every tag from the project
        #[arg(long, conflicts_with = "tag")]
        clear_tags: bool,
    },
    /// Delete a project and all of its history
    Delete {
        project: Uuid,
        /// Skip confirmation prompt
        #[arg(short, long)]
        force: bool,
    },
}

#[derive(Args)]
struct ProjectFields {
    #[arg(long)]
    subtitle: Option<String>,
    #[arg(long)]
    description: Option<String>,
    #[arg(long)]
    status: Option<String>,
    /// Tag name (repeatable)
    #[arg(long = "tag")]
    tag: Vec<String>,
}

#[derive(Subcommand)]
enum SectionCommand {
    /// Append a section
    Add {
        project: Uuid,
        title: String,
        #[arg(long, default_value = "")]
        content: String,
        /// Position; defaults to after the last section
        #[arg(long)]
        order: Option<i64>,
    },
    /// Change a section
    Update {
        project: Uuid,
        section: Uuid,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        content: Option<String>,
        #[arg(long)]
        order: Option<i64>,
    },
    /// Delete a section
    Delete { project: Uuid, section: Uuid },
    /// Assign new positions, given as SECTION_ID=ORDER
    Reorder {
        project: Uuid,
        #[arg(required = true, value_parser = parse_order)]
        orders: Vec<(Uuid, i64)>,
    },
}

#[derive(Subcommand)]
enum ResourceCommand {
    /// Attach a resource
    Add {
        project: Uuid,
        kind: String,
        title: String,
        url: String,
    },
    /// Detach a resource
    Remove { project: Uuid, resource: Uuid },
}

#[derive(Subcommand)]
enum TagCommand {
    /// Rename a tag everywhere it is used
    Rename { tag: Uuid, name: String },
    /// Delete a tag and detach it from every project
    Delete { tag: Uuid },
}

#[derive(Subcommand)]
enum VersionCommand {
    /// Freeze the project's current state as a new version
    Commit {
        project: Uuid,
        #[arg(short, long)]
        reason: Option<String>,
    },
    /// List versions, newest first
    List { project: Uuid },
    /// Show a version's snapshot
    Show {
        version: Uuid,
        /// Print the full snapshot as JSON
        #[arg(long)]
        json: bool,
    },
    /// Overwrite live state from a version
    Restore { project: Uuid, version: Uuid },
}

#[derive(Subcommand)]
enum ReadmeCommand {
    /// Print the README and its history
    Show {
        project: Uuid,
        /// Also list README versions
        #[arg(long)]
        history: bool,
    },
    /// Save new README content as a version
    Save {
        project: Uuid,
        #[arg(long, conflicts_with = "file", required_unless_present = "file")]
        content: Option<String>,
        /// Read content from a file
        #[arg(long)]
        file: Option<PathBuf>,
        #[arg(short, long)]
        message: Option<String>,
    },
    /// Put the README back to a saved version
    Restore { project: Uuid, version: Uuid },
}

fn parse_order(raw: &str) -> Result<(Uuid, i64), String> {
    let (id, order) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected SECTION_ID=ORDER, got '{raw}'"))?;
    let id = id
        .trim()
        .parse::<Uuid>()
        .map_err(|e| format!("invalid section id '{id}': {e}"))?;
    let order = order
        .trim()
        .parse::<i64>()
        .map_err(|e| format!("invalid order '{order}': {e}"))?;
    Ok((id, order))
}

fn main() -> Result<(), anyhow::Error> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    folio_core::init_observability(cli.json_logs, level)?;

    let engine = create_engine(&cli.store, cli.config.as_ref())?;
    debug!(store = %engine.store().describe(), "Engine ready");

    match cli.command {
        Commands::Project(command) => run_project(&engine, command)?,
        Commands::Section(command) => run_section(&engine, command)?,
        Commands::Resource(command) => run_resource(&engine, command)?,
        Commands::Tag(command) => run_tag(&engine, command)?,
        Commands::Version(command) => run_version(&engine, command)?,
        Commands::Readme(command) => run_readme(&engine, command)?,
        Commands::Activity { project } => {
            let activity = engine.list_activity(project)?;
            println!("{}", table::<_, ActivityRow>(&activity, "No activity"));
        }
    }

    if cli.metrics {
        eprintln!("{}", folio_core::gather_metrics()?);
    }

    Ok(())
}

fn create_engine(
    store_uri: &str,
    config_path: Option<&PathBuf>,
) -> Result<VersionEngine<AnyStore>, anyhow::Error> {
    let store_config = StoreConfig::from_uri(store_uri)?;
    let store = open_store(&store_config)?;

    let engine = match config_path {
        Some(path) => VersionEngine::with_config(store, EngineConfig::from_file(path)?)?,
        None => VersionEngine::new(store),
    };
    Ok(engine)
}

fn run_project(
    engine: &VersionEngine<AnyStore>,
    command: ProjectCommand,
) -> Result<(), anyhow::Error> {
    match command {
        ProjectCommand::Create { title, fields } => {
            let input = NewProject {
                title,
                subtitle: fields.subtitle,
                description: fields.description,
                status: fields.status,
                tags: fields.tag,
            };
            let view = engine.create_project(input)?;
            println!("✓ Created project {}", view.project.id);
        }
        ProjectCommand::List => {
            let projects = engine.list_projects()?;
            println!("{}", table::<_, ProjectRow>(&projects, "No projects found"));
        }
        ProjectCommand::Show { project } => {
            print_project(&engine.get_project(project)?);
        }
        ProjectCommand::Update {
            project,
            title,
            fields,
            clear_tags,
        } => {
            let tags = if clear_tags {
                Some(Vec::new())
            } else if fields.tag.is_empty() {
                None
            } else {
                Some(fields.tag)
            };
            let patch = ProjectPatch {
                title,
                subtitle: fields.subtitle,
                description: fields.description,
                status: fields.status,
                tags,
            };
            if patch.is_empty() {
                println!("Nothing to update");
                return Ok(());
            }
            print_project(&engine.update_project(project, patch)?);
        }
        ProjectCommand::Delete { project, force } => {
            if !force && !confirm(&format!("Delete project '{project}' and all of its history?"))? {
                println!("Deletion cancelled");
                return Ok(());
            }
            engine.delete_project(project)?;
            println!("✓ Project deleted");
        }
    }
    Ok(())
}

fn run_section(
    engine: &VersionEngine<AnyStore>,
    command: SectionCommand,
) -> Result<(), anyhow::Error> {
    match command {
        SectionCommand::Add {
            project,
            title,
            content,
            order,
        } => {
            let mut input = NewSection::new(title, content);
            if let Some(order) = order {
                input = input.at(order);
            }
            let section = engine.add_section(project, input)?;
            println!("✓ Added section {} at position {}", section.id, section.order);
        }
        SectionCommand::Update {
            project,
            section,
            title,
            content,
            order,
        } => {
            let section = engine.update_section(
                project,
                section,
                SectionPatch {
                    title,
                    content,
                    order,
                },
            )?;
            println!("✓ Updated section {}", section.id);
        }
        SectionCommand::Delete { project, section } => {
            engine.delete_section(project, section)?;
            println!("✓ Section deleted");
        }
        SectionCommand::Reorder { project, orders } => {
            let sections = engine.reorder_sections(project, &orders)?;
            println!("{}", table::<_, SectionRow>(&sections, "No sections"));
        }
    }
    Ok(())
}

fn run_resource(
    engine: &VersionEngine<AnyStore>,
    command: ResourceCommand,
) -> Result<(), anyhow::Error> {
    match command {
        ResourceCommand::Add {
            project,
            kind,
            title,
            url,
        } => {
            let resource = engine.add_resource(project, NewResource::new(kind, title, url))?;
            println!("✓ Added resource {}", resource.id);
        }
        ResourceCommand::Remove { project, resource } => {
            engine.remove_resource(project, resource)?;
            println!("✓ Resource removed");
        }
    }
    Ok(())
}

fn run_tag(engine: &VersionEngine<AnyStore>, command: TagCommand) -> Result<(), anyhow::Error> {
    match command {
        TagCommand::Rename { tag, name } => {
            let tag = engine.rename_tag(tag, &name)?;
            println!("✓ Tag {} is now '{}'", tag.id, tag.name);
        }
        TagCommand::Delete { tag } => {
            engine.delete_tag(tag)?;
            println!("✓ Tag deleted");
        }
    }
    Ok(())
}

fn run_version(
    engine: &VersionEngine<AnyStore>,
    command: VersionCommand,
) -> Result<(), anyhow::Error> {
    match command {
        VersionCommand::Commit { project, reason } => {
            let record = engine.commit_version(project, reason.as_deref())?;
            info!(version = record.version, "Committed");
            println!("✓ Committed version {} ({})", record.version, record.id);
        }
        VersionCommand::List { project } => {
            let versions = engine.list_versions(project)?;
            println!("{}", table::<_, VersionRow>(&versions, "No versions found"));
        }
        VersionCommand::Show { version, json } => {
            let record = engine.get_version(version)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&record)?);
                return Ok(());
            }

            let state = &record.snapshot.body;
            println!("Version {} of project {}", record.version, record.owner_id);
            println!("  ID: {}", record.id);
            if let Some(reason) = &record.reason {
                println!("  Reason: {reason}");
            }
            println!("  Created: {}", format_timestamp(record.created_at));
            println!("  Format Version: {}", record.snapshot.format_version);
            println!("  Size: {}", format_size(record.snapshot.size_bytes as u64));
            println!("  Content Hash: {}", record.snapshot.content_hash);
            println!("  Title: {}", state.title);
            println!("  Status: {}", state.status);
            println!(
                "  Sections: {}, Resources: {}, Tags: {}",
                state.sections.len(),
                state.resources.len(),
                state.tags.len()
            );
        }
        VersionCommand::Restore { project, version } => {
            let view = engine.restore_version(project, version)?;
            println!("✓ Restored project {}", view.project.id);
            print_project(&view);
        }
    }
    Ok(())
}

fn run_readme(
    engine: &VersionEngine<AnyStore>,
    command: ReadmeCommand,
) -> Result<(), anyhow::Error> {
    match command {
        ReadmeCommand::Show { project, history } => match engine.get_document(project)? {
            Some(view) => {
                println!("{}", view.readme.content);
                if history {
                    println!();
                    println!("{}", table::<_, VersionRow>(&view.versions, "No versions"));
                }
            }
            None => println!("No README saved for this project"),
        },
        ReadmeCommand::Save {
            project,
            content,
            file,
            message,
        } => {
            let content = match (content, file) {
                (Some(content), _) => content,
                (None, Some(path)) => fs::read_to_string(&path)?,
                (None, None) => anyhow::bail!("either --content or --file is required"),
            };
            let view = engine.save_document(project, &content, message.as_deref())?;
            println!("✓ Saved README version {}", view.current_version());
        }
        ReadmeCommand::Restore { project, version } => {
            let view = engine.restore_document_version(project, version)?;
            println!("✓ README restored as version {}", view.current_version());
        }
    }
    Ok(())
}

fn confirm(prompt: &str) -> Result<bool, anyhow::Error> {
    use std::io::{self, Write};

    print!("{prompt} (y/N): ");
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().to_lowercase().starts_with('y'))
}
