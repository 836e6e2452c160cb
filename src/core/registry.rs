//! # Cancellation registry - the single in-flight task's cancel handle.
//!
//! At most one task executes at a time. The registry is a mutex-protected
//! cell holding that task's `(cancel token, config)` pair, set by the
//! supervisor at task start and cleared unconditionally at task end.
//!
//! ## Rules
//! - The cell never retains cancel handles after `clear`.
//! - `cancel_if` is idempotent with respect to double delete: the second
//!   call finds an empty cell and returns false.
//! - The stored token cancels only the per-task context, never the
//!   process-wide context.
//! - No operation here acquires the queue lock; the two structures are
//!   lock-ordering independent.

use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;

use crate::config::{TaskConfig, TaskId};

struct Current {
    token: CancellationToken,
    cfg: Arc<TaskConfig>,
}

/// Mutex-protected cell tracking the in-flight task.
pub struct CancelRegistry {
    cell: Mutex<Option<Current>>,
}

impl CancelRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            cell: Mutex::new(None),
        }
    }

    /// Records the in-flight task. Called by the supervisor at task start.
    pub fn set(&self, token: CancellationToken, cfg: Arc<TaskConfig>) {
        *self.cell.lock().expect("cancel registry poisoned") = Some(Current { token, cfg });
    }

    /// Empties the cell. Called unconditionally at task end.
    pub fn clear(&self) {
        *self.cell.lock().expect("cancel registry poisoned") = None;
    }

    /// Cancels the in-flight task if its id matches, clearing the cell.
    ///
    /// The token is canceled outside the lock. Returns whether a matching
    /// task was canceled.
    pub fn cancel_if(&self, id: TaskId) -> bool {
        let current = {
            let mut cell = self.cell.lock().expect("cancel registry poisoned");
            let matches = cell
                .as_ref()
                .map(|current| current.cfg.task_id == id)
                .unwrap_or(false);
            if matches {
                cell.take()
            } else {
                None
            }
        };
        match current {
            Some(current) => {
                current.token.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancels the in-flight task unconditionally, if any. Used by `Stop`.
    pub fn cancel_current(&self) {
        let current = self.cell.lock().expect("cancel registry poisoned").take();
        if let Some(current) = current {
            current.token.cancel();
        }
    }

    /// Returns the in-flight task id, if a task is registered.
    pub fn current_id(&self) -> Option<TaskId> {
        self.cell
            .lock()
            .expect("cancel registry poisoned")
            .as_ref()
            .map(|c| c.cfg.task_id)
    }

    /// Returns the in-flight task's config if its id matches.
    pub fn current_config(&self, id: TaskId) -> Option<Arc<TaskConfig>> {
        self.cell
            .lock()
            .expect("cancel registry poisoned")
            .as_ref()
            .filter(|c| c.cfg.task_id == id)
            .map(|c| Arc::clone(&c.cfg))
    }
}

impl Default for CancelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(id: TaskId) -> Arc<TaskConfig> {
        let mut cfg = TaskConfig::default();
        cfg.task_id = id;
        Arc::new(cfg)
    }

    #[test]
    fn cancel_if_matches_only_current() {
        let registry = CancelRegistry::new();
        let token = CancellationToken::new();
        registry.set(token.clone(), task(10));

        assert!(!registry.cancel_if(11));
        assert!(!token.is_cancelled());

        assert!(registry.cancel_if(10));
        assert!(token.is_cancelled());
    }

    #[test]
    fn second_cancel_returns_false() {
        let registry = CancelRegistry::new();
        registry.set(CancellationToken::new(), task(10));
        assert!(registry.cancel_if(10));
        assert!(registry.cancel_if(10) == false);
        assert!(registry.current_id().is_none());
    }

    #[test]
    fn clear_drops_the_handle() {
        let registry = CancelRegistry::new();
        let token = CancellationToken::new();
        registry.set(token.clone(), task(3));
        registry.clear();
        assert!(!registry.cancel_if(3));
        assert!(!token.is_cancelled());
    }

    #[test]
    fn snapshot_reflects_cell_state() {
        let registry = CancelRegistry::new();
        assert!(registry.current_id().is_none());
        registry.set(CancellationToken::new(), task(5));
        assert_eq!(registry.current_id(), Some(5));
        assert!(registry.current_config(5).is_some());
        assert!(registry.current_config(6).is_none());
    }

    #[test]
    fn cancel_current_is_unconditional() {
        let registry = CancelRegistry::new();
        let token = CancellationToken::new();
        registry.set(token.clone(), task(1));
        registry.cancel_current();
        assert!(token.is_cancelled());
        // A second call on the empty cell is a no-op.
        registry.cancel_current();
    }
}
