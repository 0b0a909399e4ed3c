/*!
In-process store adapter.
*/

use super::fault::{FaultPlan, FaultPoint};
use super::tables::{replay, TableTransaction, Tables};
use super::{Store, Transaction};
use crate::{FolioError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

/// How concurrent transactions on a [`MemoryStore`] are isolated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Isolation {
    /// Work on a private copy and replay the write log at commit.
    /// A write against a project or tag that another transaction changed
    /// since, or a constraint violation found during replay, surfaces as
    /// `Conflict`.
    #[default]
    Optimistic,
    /// Hold the write lock for the whole transaction.
    /// Nested transactions on the same store deadlock in this mode.
    Serializable,
}

impl fmt::Display for Isolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Isolation::Optimistic => f.write_str("optimistic"),
            Isolation::Serializable => f.write_str("serializable"),
        }
    }
}

impl FromStr for Isolation {
    type Err = FolioError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "optimistic" => Ok(Isolation::Optimistic),
            "serializable" => Ok(Isolation::Serializable),
            other => Err(FolioError::validation(format!(
                "unknown isolation mode '{other}' (expected optimistic or serializable)"
            ))),
        }
    }
}

/// Store keeping all tables in memory behind a read-write lock
///
/// Clones share the same tables, so a clone can be handed to another thread.
///
/// # Example
/// ```rust
/// use folio_core::{MemoryStore, Store, Transaction};
/// use folio_core::model::Project;
///
/// let store = MemoryStore::new();
/// let project = Project::new("Folio", "active");
/// store.transaction(|tx| tx.insert_project(project.clone()))?;
///
/// let found = store.transaction(|tx| tx.get_project(project.id))?;
/// assert_eq!(found.map(|p| p.title), Some("Folio".to_string()));
/// # Ok::<(), folio_core::FolioError>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
    isolation: Isolation,
    faults: FaultPlan,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_isolation(isolation: Isolation) -> Self {
        Self {
            isolation,
            ..Self::default()
        }
    }

    /// Share `faults` with this store; used by tests to inject failures
    pub fn with_faults(mut self, faults: FaultPlan) -> Self {
        self.faults = faults;
        self
    }

    pub fn isolation(&self) -> Isolation {
        self.isolation
    }

    pub fn faults(&self) -> &FaultPlan {
        &self.faults
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>> {
        self.tables
            .read()
            .map_err(|_| FolioError::storage("memory store lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>> {
        self.tables
            .write()
            .map_err(|_| FolioError::storage("memory store lock poisoned"))
    }

    fn optimistic<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut dyn Transaction) -> Result<T>,
    {
        let mut working = self.read()?.clone();
        let mut tx = TableTransaction::new(&mut working, Some(&self.faults));
        let value = f(&mut tx)?;
        let log = tx.into_log();

        if log.is_empty() {
            return Ok(value);
        }
        self.faults.trip(FaultPoint::Commit)?;

        let writes = log.len();
        let mut live = self.write()?;
        let mut next = live.clone();
        replay(&mut next, log).map_err(|e| {
            debug!(error = %e, "Replay rejected by newer state");
            FolioError::conflict(format!("concurrent transaction won: {e}"))
        })?;
        *live = next;

        debug!(writes, "Committed memory transaction");
        Ok(value)
    }

    fn serializable<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut dyn Transaction) -> Result<T>,
    {
        let mut live = self.write()?;
        let mut working = live.clone();
        let mut tx = TableTransaction::new(&mut working, Some(&self.faults));
        let value = f(&mut tx)?;
        let writes = tx.into_log().len();

        if writes > 0 {
            self.faults.trip(FaultPoint::Commit)?;
            *live = working;
            debug!(writes, "Committed memory transaction");
        }
        Ok(value)
    }
}

impl Store for MemoryStore {
    fn transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut dyn Transaction) -> Result<T>,
    {
        match self.isolation {
            Isolation::Optimistic => self.optimistic(f),
            Isolation::Serializable => self.serializable(f),
        }
    }

    fn describe(&self) -> String {
        format!("memory ({})", self.isolation)
    }
}
