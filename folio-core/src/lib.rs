/*!
# Folio Core Engine

Versioned state for projects and their READMEs.

A project is an aggregate: scalar fields, ordered sections, resources and
references to shared tags. Committing a version freezes all of it into a
self-contained snapshot with a per-project version number. Restoring a
version overwrites live state from that snapshot and records the restore as
a new version, so history only ever grows. READMEs run the same machinery on
a second track where every save is a commit.

## Architecture

- [`store`]: the persistence port ([`Store`], [`Transaction`]) with memory and
  file adapters. All coordination happens through store transactions.
- [`ledger`]: per-owner, contiguous version numbering.
- [`codec`]: capture live state into snapshots and apply them back.
- [`restore`]: the restore state machine shared by both tracks.
- [`audit`]: the per-project activity trail.
- [`VersionEngine`]: the facade callers use.

## Usage

```rust
use folio_core::{MemoryStore, VersionEngine};
use folio_core::model::{NewProject, NewSection, SectionPatch};

let engine = VersionEngine::new(MemoryStore::new());
let project = engine.create_project(NewProject::new("Folio"))?.project;
let section = engine.add_section(project.id, NewSection::new("Intro", "v1 text"))?;

let v1 = engine.commit_version(project.id, None)?;
engine.update_section(project.id, section.id, SectionPatch {
    content: Some("v2 text".into()),
    ..SectionPatch::default()
})?;
engine.commit_version(project.id, None)?;

let restored = engine.restore_version(project.id, v1.id)?;
assert_eq!(restored.sections[0].content, "v1 text");
assert_eq!(engine.list_versions(project.id)?.len(), 3);
# Ok::<(), folio_core::FolioError>(())
```
*/

pub mod audit;
pub mod codec;
pub mod compression;
pub mod config;
mod document;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod model;
pub mod observability;
pub mod restore;
pub mod snapshot;
pub mod store;
pub mod views;


pub use compression::{CompressionAdapter, GzipCompressor, NoCompression};
pub use config::{EngineConfig, StoreBackend, StoreConfig};
pub use engine::VersionEngine;
pub use error::{FolioError, Result};
pub use ledger::{DocumentVersion, ProjectVersion, VersionRecord};
pub use observability::{init_default_observability, init_observability};
pub use restore::RestorePhase;
pub use snapshot::{DocumentState, ProjectState, Snapshot};
pub use store::{
    open_store, AnyStore, FaultPlan, FaultPoint, FileStore, Isolation, MemoryStore, Store,
    Transaction,
};
pub use views::DocumentView;

#[cfg(feature = "metrics")]
pub use observability::{gather_metrics, FolioMetrics};
