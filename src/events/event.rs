//! # Runtime events emitted by the supervisor and the restore engine.
//!
//! The [`EventKind`] enum classifies event types across three categories:
//! - **Lifecycle events**: task execution flow (started, ended)
//! - **Progress events**: dump enumeration and delivery updates from the engine
//! - **Process events**: shutdown request, status-server start
//!
//! The [`Event`] struct carries optional metadata: the task id, a qualified
//! table name, delivered and total byte counts, and a terminal error string.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases
//! monotonically. The progress tracker uses it to reject stale events that
//! arrive out of order through the broadcast channel.
//!
//! ## Event flow
//! ```text
//! Supervisor::run()
//!   → TaskStarted
//!   → [dump enumeration] → ProgressInitialized (per table)
//!   → [engine delivery]  → TableStarted → ChunkDelivered* → TableCompleted
//!   → TaskEnded (with terminal error, if any)
//! ```

use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::SystemTime;

use crate::config::TaskId;

/// Global sequence counter for event ordering. Starts at 1 so that 0 can
/// serve as the "nothing seen yet" sentinel in consumers.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(1);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Process events ===
    /// Shutdown requested (OS signal received or `Stop` called).
    ShutdownRequested,
    /// The status server bound its listener.
    ServerStarted,

    // === Task lifecycle events ===
    /// A task started executing.
    TaskStarted,
    /// A task finished (success, error, or cancellation).
    TaskEnded,

    // === Progress events ===
    /// A table was enumerated from the dump; carries its total size.
    ProgressInitialized,
    /// The engine began delivering a table.
    TableStarted,
    /// A chunk of a table's data was delivered; carries the chunk size.
    ChunkDelivered,
    /// All data of a table was delivered.
    TableCompleted,
}

/// Runtime event with optional metadata.
///
/// ## Fields
/// - `seq`: unique sequence number for ordering (monotonically increasing)
/// - `at`: wall-clock timestamp (may go backwards, use for logging only)
/// - `kind`: event classification
/// - `task_id`, `table`, `bytes`, `total_bytes`, `error`: optional metadata
#[derive(Debug, Clone)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// The kind of event.
    pub kind: EventKind,
    /// Task the event belongs to, if applicable.
    pub task_id: Option<TaskId>,
    /// Qualified table name (`db`.`table`), if applicable.
    pub table: Option<String>,
    /// Byte count delivered by this event (chunk size).
    pub bytes: Option<u64>,
    /// Total byte count of the table, if applicable.
    pub total_bytes: Option<u64>,
    /// Error message, if the event represents a failure.
    pub error: Option<String>,
}

impl Event {
    /// Creates a new event of the given kind with the current timestamp and
    /// the next sequence number.
    pub fn now(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            task_id: None,
            table: None,
            bytes: None,
            total_bytes: None,
            error: None,
        }
    }

    /// Attaches the owning task id.
    pub fn with_task_id(mut self, id: TaskId) -> Self {
        self.task_id = Some(id);
        self
    }

    /// Attaches a qualified table name.
    pub fn with_table(mut self, name: impl Into<String>) -> Self {
        self.table = Some(name.into());
        self
    }

    /// Attaches a delivered byte count.
    pub fn with_bytes(mut self, n: u64) -> Self {
        self.bytes = Some(n);
        self
    }

    /// Attaches a total byte count.
    pub fn with_total_bytes(mut self, n: u64) -> Self {
        self.total_bytes = Some(n);
        self
    }

    /// Attaches an error message.
    pub fn with_error(mut self, msg: impl Into<String>) -> Self {
        self.error = Some(msg.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_numbers_increase() {
        let a = Event::now(EventKind::TaskStarted);
        let b = Event::now(EventKind::TaskEnded);
        assert!(b.seq > a.seq);
    }

    #[test]
    fn builder_attaches_metadata() {
        let ev = Event::now(EventKind::ChunkDelivered)
            .with_task_id(7)
            .with_table("`db`.`tbl`")
            .with_bytes(4096);
        assert_eq!(ev.task_id, Some(7));
        assert_eq!(ev.table.as_deref(), Some("`db`.`tbl`"));
        assert_eq!(ev.bytes, Some(4096));
        assert!(ev.error.is_none());
    }
}
