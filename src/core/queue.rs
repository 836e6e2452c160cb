//! # Ordered queue of pending task configurations.
//!
//! [`TaskQueue`] holds the tasks accepted over HTTP in server mode, in
//! execution order. The supervisor's dequeue loop is the single consumer;
//! HTTP handlers push, remove and reorder entries concurrently.
//!
//! ## Rules
//! - All operations are serialized behind one mutex; [`TaskQueue::pop`] is
//!   the only blocking call.
//! - Ordering is FIFO unless explicitly changed by `move_to_front` /
//!   `move_to_back`.
//! - Task ids are minted at push time (nanoseconds since epoch), so live ids
//!   are unique; if a caller pre-set an id through the test hook, collisions
//!   are permitted and `get`/`remove`/`move_*` operate on the first match.
//! - The in-flight task is *not* in the queue: reordering or removing its id
//!   reports "not found".

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::config::{mint_task_id, TaskConfig, TaskId};
use crate::error::Error;

/// FIFO queue of `(TaskId, TaskConfig)` with blocking dequeue.
pub struct TaskQueue {
    entries: Mutex<VecDeque<(TaskId, Arc<TaskConfig>)>>,
    notify: Notify,
}

impl TaskQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
        }
    }

    /// Appends a task to the tail, minting its id unless one was pre-set,
    /// and wakes one waiting `pop`.
    pub fn push(&self, mut cfg: TaskConfig) -> TaskId {
        if cfg.task_id == 0 {
            cfg.task_id = mint_task_id();
        }
        let id = cfg.task_id;
        self.entries
            .lock()
            .expect("task queue poisoned")
            .push_back((id, Arc::new(cfg)));
        self.notify.notify_one();
        id
    }

    /// Removes and returns the head, waiting until an entry arrives or the
    /// token is canceled.
    pub async fn pop(&self, token: &CancellationToken) -> Result<Arc<TaskConfig>, Error> {
        loop {
            if let Some((_, cfg)) = self.entries.lock().expect("task queue poisoned").pop_front()
            {
                return Ok(cfg);
            }
            tokio::select! {
                _ = token.cancelled() => return Err(Error::Canceled),
                _ = self.notify.notified() => {}
            }
        }
    }

    /// Returns the first entry with the given id without removing it.
    pub fn get(&self, id: TaskId) -> Option<Arc<TaskConfig>> {
        self.entries
            .lock()
            .expect("task queue poisoned")
            .iter()
            .find(|(entry_id, _)| *entry_id == id)
            .map(|(_, cfg)| Arc::clone(cfg))
    }

    /// Snapshot of all queued ids in queue order.
    pub fn all_ids(&self) -> Vec<TaskId> {
        self.entries
            .lock()
            .expect("task queue poisoned")
            .iter()
            .map(|(id, _)| *id)
            .collect()
    }

    /// Number of queued entries.
    pub fn len(&self) -> usize {
        self.entries.lock().expect("task queue poisoned").len()
    }

    /// Returns true if no entries are queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes the first entry with the given id. Returns whether an entry
    /// was removed.
    pub fn remove(&self, id: TaskId) -> bool {
        let mut entries = self.entries.lock().expect("task queue poisoned");
        match entries.iter().position(|(entry_id, _)| *entry_id == id) {
            Some(idx) => {
                entries.remove(idx);
                true
            }
            None => false,
        }
    }

    /// Moves the first entry with the given id to the head.
    pub fn move_to_front(&self, id: TaskId) -> bool {
        let mut entries = self.entries.lock().expect("task queue poisoned");
        match entries.iter().position(|(entry_id, _)| *entry_id == id) {
            Some(idx) => {
                if let Some(entry) = entries.remove(idx) {
                    entries.push_front(entry);
                }
                true
            }
            None => false,
        }
    }

    /// Moves the first entry with the given id to the tail.
    pub fn move_to_back(&self, id: TaskId) -> bool {
        let mut entries = self.entries.lock().expect("task queue poisoned");
        match entries.iter().position(|(entry_id, _)| *entry_id == id) {
            Some(idx) => {
                if let Some(entry) = entries.remove(idx) {
                    entries.push_back(entry);
                }
                true
            }
            None => false,
        }
    }
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}
