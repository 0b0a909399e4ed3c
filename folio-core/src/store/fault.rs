/*!
Fault injection for store adapters.

A [`FaultPlan`] is shared between a store and the test that drives it. Arming
a point makes the next write of that kind (or the next commit) fail, which is
how partial-failure and conflict-retry behaviour is exercised without a real
database.
*/

use crate::{FolioError, Result};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

/// Where an armed fault fires
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultPoint {
    WriteProject,
    /// Any section write, including clearing a project's sections
    WriteSection,
    WriteResource,
    /// Tag rows and project membership
    WriteTag,
    WriteReadme,
    InsertVersion,
    InsertActivity,
    /// Fires after the transaction body succeeded, before its writes are published
    Commit,
}

/// What an armed fault produces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// `FolioError::Storage`, not retried
    Storage,
    /// `FolioError::Conflict`, retried by the engine
    Conflict,
}

/// Queue of faults armed per point; each fault fires once
#[derive(Debug, Clone, Default)]
pub struct FaultPlan {
    armed: Arc<Mutex<HashMap<FaultPoint, VecDeque<FaultKind>>>>,
}

impl FaultPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm a storage failure at `point`
    pub fn fail_next(&self, point: FaultPoint) {
        self.arm(point, FaultKind::Storage);
    }

    /// Arm a uniqueness conflict at `point`
    pub fn conflict_next(&self, point: FaultPoint) {
        self.arm(point, FaultKind::Conflict);
    }

    pub fn arm(&self, point: FaultPoint, kind: FaultKind) {
        if let Ok(mut armed) = self.armed.lock() {
            armed.entry(point).or_default().push_back(kind);
        }
    }

    /// Disarm every pending fault
    pub fn clear(&self) {
        if let Ok(mut armed) = self.armed.lock() {
            armed.clear();
        }
    }

    /// Number of faults still waiting to fire
    pub fn pending(&self) -> usize {
        self.armed
            .lock()
            .map(|armed| armed.values().map(VecDeque::len).sum())
            .unwrap_or(0)
    }

    /// Fire the next fault armed at `point`, if any
    pub fn trip(&self, point: FaultPoint) -> Result<()> {
        let fired = {
            let mut armed = self
                .armed
                .lock()
                .map_err(|_| FolioError::storage("fault plan lock poisoned"))?;
            armed.get_mut(&point).and_then(VecDeque::pop_front)
        };

        match fired {
            None => Ok(()),
            Some(FaultKind::Storage) => Err(FolioError::storage(format!(
                "injected fault at {point:?}"
            ))),
            Some(FaultKind::Conflict) => Err(FolioError::conflict(format!(
                "injected conflict at {point:?}"
            ))),
        }
    }
}
