/*!
Persistence port and its adapters.

The engine never touches storage directly: every read and write goes through
a [`Transaction`] handed out by a [`Store`]. A transaction either commits as
a whole or leaves no trace, and readers never observe another transaction's
uncommitted writes. Version-number allocation relies on this: the max is read
and the new row inserted inside one transaction, and the store rejects a
duplicate `(owner, version)` pair with [`FolioError::Conflict`].

Adapters:
- [`MemoryStore`]: in-process tables with optimistic or serializable isolation
- [`FileStore`]: the same tables persisted to a single JSON file
*/

pub mod fault;
pub mod file;
pub mod memory;
mod tables;

use crate::config::{StoreBackend, StoreConfig};
use crate::ledger::VersionRecord;
use crate::model::{Activity, Project, Readme, Resource, Section, Tag};
use crate::snapshot::{DocumentState, ProjectState, SnapshotBody};
use crate::{FolioError, Result};
use uuid::Uuid;

pub use fault::{FaultKind, FaultPlan, FaultPoint};
pub use file::FileStore;
pub use memory::{Isolation, MemoryStore};

/// Transaction runner
///
/// Implementations must guarantee that `f`'s writes become visible atomically
/// when it returns `Ok`, and are discarded entirely when it returns `Err`.
pub trait Store: Send + Sync {
    /// Run `f` inside one transaction
    fn transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut dyn Transaction) -> Result<T>;

    /// Short human-readable description for logs
    fn describe(&self) -> String;
}

/// Append-only version rows for one snapshot body type
pub trait VersionTable<S: SnapshotBody> {
    /// Highest version number stored for `owner_id`, if any
    fn max_version(&self, owner_id: Uuid) -> Result<Option<u32>>;

    /// Insert a new version row.
    ///
    /// Fails with [`FolioError::Conflict`] when `(owner_id, version)` is taken.
    fn insert_version(&mut self, record: VersionRecord<S>) -> Result<()>;

    /// All versions of `owner_id`, in no particular order
    fn versions_for(&self, owner_id: Uuid) -> Result<Vec<VersionRecord<S>>>;

    fn find_version(&self, version_id: Uuid) -> Result<Option<VersionRecord<S>>>;
}

/// CRUD operations on every table, scoped to one transaction
///
/// Writes fail with `NotFound` when they reference a missing row and with
/// `Conflict` when they would break a uniqueness constraint.
pub trait Transaction: VersionTable<ProjectState> + VersionTable<DocumentState> {
    fn get_project(&self, id: Uuid) -> Result<Option<Project>>;
    fn list_projects(&self) -> Result<Vec<Project>>;
    fn insert_project(&mut self, project: Project) -> Result<()>;
    fn update_project(&mut self, project: Project) -> Result<()>;
    /// Removes the project together with everything it owns
    fn delete_project(&mut self, id: Uuid) -> Result<()>;

    fn sections_for(&self, project_id: Uuid) -> Result<Vec<Section>>;
    fn get_section(&self, id: Uuid) -> Result<Option<Section>>;
    fn insert_section(&mut self, section: Section) -> Result<()>;
    fn update_section(&mut self, section: Section) -> Result<()>;
    fn delete_section(&mut self, id: Uuid) -> Result<()>;
    fn delete_sections_for(&mut self, project_id: Uuid) -> Result<()>;

    fn resources_for(&self, project_id: Uuid) -> Result<Vec<Resource>>;
    fn get_resource(&self, id: Uuid) -> Result<Option<Resource>>;
    fn insert_resource(&mut self, resource: Resource) -> Result<()>;
    fn delete_resource(&mut self, id: Uuid) -> Result<()>;
    fn delete_resources_for(&mut self, project_id: Uuid) -> Result<()>;

    fn get_tag(&self, id: Uuid) -> Result<Option<Tag>>;
    fn find_tag_by_name(&self, name: &str) -> Result<Option<Tag>>;
    fn insert_tag(&mut self, tag: Tag) -> Result<()>;
    fn update_tag(&mut self, tag: Tag) -> Result<()>;
    /// Removes the tag and every membership that references it
    fn delete_tag(&mut self, id: Uuid) -> Result<()>;
    fn tag_ids_for(&self, project_id: Uuid) -> Result<Vec<Uuid>>;
    /// Replace the project's tag membership with exactly `tag_ids`
    fn set_project_tags(&mut self, project_id: Uuid, tag_ids: &[Uuid]) -> Result<()>;

    fn readme_for(&self, project_id: Uuid) -> Result<Option<Readme>>;
    fn insert_readme(&mut self, readme: Readme) -> Result<()>;
    fn update_readme(&mut self, readme: Readme) -> Result<()>;

    /// Append an activity; the store assigns its sequence number
    fn insert_activity(&mut self, activity: Activity) -> Result<()>;
    fn activities_for(&self, project_id: Uuid) -> Result<Vec<Activity>>;
}

/// Store selected at runtime from a [`StoreConfig`]
pub enum AnyStore {
    Memory(MemoryStore),
    File(FileStore),
}

impl Store for AnyStore {
    fn transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut dyn Transaction) -> Result<T>,
    {
        match self {
            AnyStore::Memory(store) => store.transaction(f),
            AnyStore::File(store) => store.transaction(f),
        }
    }

    fn describe(&self) -> String {
        match self {
            AnyStore::Memory(store) => store.describe(),
            AnyStore::File(store) => store.describe(),
        }
    }
}

/// Open the store described by `config`
///
/// # Example
/// ```rust
/// use folio_core::{open_store, Store, StoreConfig};
///
/// let store = open_store(&StoreConfig::memory())?;
/// assert!(store.describe().starts_with("memory"));
/// # Ok::<(), folio_core::FolioError>(())
/// ```
pub fn open_store(config: &StoreConfig) -> Result<AnyStore> {
    config.validate()?;

    match config.backend {
        StoreBackend::Memory => Ok(AnyStore::Memory(MemoryStore::with_isolation(
            config.isolation,
        ))),
        StoreBackend::File => {
            let path = config.file_path.clone().ok_or_else(|| {
                FolioError::validation("file backend requires a database path")
            })?;
            let store = if config.compress {
                FileStore::compressed(path)
            } else {
                FileStore::new(path)
            };
            Ok(AnyStore::File(store))
        }
    }
}
