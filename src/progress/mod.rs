//! # Task progress tracker with sequence-based ordering.
//!
//! Folds runtime [`Event`]s into the snapshots served by the HTTP layer
//! under `/progress/task` and `/progress/table`.
//!
//! ## Architecture
//! ```text
//! Supervisor / Engine ──► Bus ──► ProgressTracker listener ──► update()
//!                                                                 │
//!                                                                 ▼
//!                                                 { status, tables: name → bytes }
//! ```
//!
//! ## Rules
//! - Events with `seq <= last_seq` are **rejected** (stale, out-of-order
//!   delivery through the broadcast channel).
//! - `TaskStarted` resets the snapshot; `ProgressInitialized` enumerates
//!   tables; `ChunkDelivered` accumulates; `TaskEnded` records the terminal
//!   state and error.
//! - Read operations are **eventually consistent** with the engine.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::checkpoints::CheckpointStatus;
use crate::config::TaskId;
use crate::events::{Bus, Event, EventKind};

/// Coarse task state as seen by the progress endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Idle,
    Running,
    Succeeded,
    Failed,
}

/// Per-table delivery progress.
#[derive(Debug, Clone, Serialize)]
pub struct TableProgress {
    /// Qualified table name (`db`.`table`).
    pub name: String,
    pub total_bytes: u64,
    pub delivered_bytes: u64,
    pub started: bool,
    pub completed: bool,
    pub checkpoint: CheckpointStatus,
}

#[derive(Debug, Serialize)]
struct ProgressState {
    status: TaskStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    task_id: Option<TaskId>,
    total_bytes: u64,
    delivered_bytes: u64,
    tables: Vec<TableProgress>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip)]
    last_seq: u64,
}

impl ProgressState {
    fn new() -> Self {
        Self {
            status: TaskStatus::Idle,
            task_id: None,
            total_bytes: 0,
            delivered_bytes: 0,
            tables: Vec::new(),
            error: None,
            last_seq: 0,
        }
    }

    fn table_mut(&mut self, name: &str) -> Option<&mut TableProgress> {
        self.tables.iter_mut().find(|t| t.name == name)
    }
}

/// Thread-safe tracker of the current task's delivery progress.
pub struct ProgressTracker {
    state: RwLock<ProgressState>,
}

impl ProgressTracker {
    /// Creates an empty tracker.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(ProgressState::new()),
        }
    }

    /// Spawns a background listener folding bus events into the tracker.
    ///
    /// Runs until the token is canceled or the bus is closed. Lagged
    /// receivers skip old events; the sequence guard keeps the snapshot
    /// consistent regardless.
    pub fn spawn_listener(self: Arc<Self>, bus: &Bus, token: CancellationToken) {
        let mut rx = bus.subscribe();
        let me = self;

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    msg = rx.recv() => match msg {
                        Ok(ev) => me.update(&ev).await,
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                    }
                }
            }
        });
    }

    /// Applies one event if it is newer than the last seen.
    pub async fn update(&self, ev: &Event) {
        let mut state = self.state.write().await;
        if ev.seq <= state.last_seq {
            return;
        }
        state.last_seq = ev.seq;

        match ev.kind {
            EventKind::TaskStarted => {
                *state = ProgressState {
                    status: TaskStatus::Running,
                    task_id: ev.task_id,
                    last_seq: ev.seq,
                    ..ProgressState::new()
                };
            }
            EventKind::ProgressInitialized => {
                if let Some(name) = &ev.table {
                    let total = ev.total_bytes.unwrap_or(0);
                    state.total_bytes += total;
                    state.tables.push(TableProgress {
                        name: name.clone(),
                        total_bytes: total,
                        delivered_bytes: 0,
                        started: false,
                        completed: false,
                        checkpoint: CheckpointStatus::Missing,
                    });
                }
            }
            EventKind::TableStarted => {
                if let Some(name) = &ev.table {
                    if let Some(table) = state.table_mut(name) {
                        table.started = true;
                        table.checkpoint = CheckpointStatus::Loaded;
                    }
                }
            }
            EventKind::ChunkDelivered => {
                let bytes = ev.bytes.unwrap_or(0);
                state.delivered_bytes += bytes;
                if let Some(name) = &ev.table {
                    if let Some(table) = state.table_mut(name) {
                        table.delivered_bytes += bytes;
                    }
                }
            }
            EventKind::TableCompleted => {
                if let Some(name) = &ev.table {
                    if let Some(table) = state.table_mut(name) {
                        table.completed = true;
                        table.checkpoint = CheckpointStatus::Imported;
                    }
                }
            }
            EventKind::TaskEnded => {
                state.status = match &ev.error {
                    Some(msg) => {
                        state.error = Some(msg.clone());
                        TaskStatus::Failed
                    }
                    None => TaskStatus::Succeeded,
                };
            }
            EventKind::ShutdownRequested | EventKind::ServerStarted => {}
        }
    }

    /// Serializes the overall task snapshot as JSON bytes.
    pub async fn marshal_task_progress(&self) -> Vec<u8> {
        let state = self.state.read().await;
        serde_json::to_vec(&*state).unwrap_or_else(|_| b"{}".to_vec())
    }

    /// Serializes one table's snapshot as JSON bytes, if the table is known.
    pub async fn marshal_table_checkpoints(&self, name: &str) -> Option<Vec<u8>> {
        let state = self.state.read().await;
        state
            .tables
            .iter()
            .find(|t| t.name == name)
            .and_then(|t| serde_json::to_vec(t).ok())
    }
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn status(tracker: &ProgressTracker) -> serde_json::Value {
        serde_json::from_slice(&tracker.marshal_task_progress().await).unwrap()
    }

    #[tokio::test]
    async fn folds_lifecycle_into_snapshot() {
        let tracker = ProgressTracker::new();
        tracker.update(&Event::now(EventKind::TaskStarted).with_task_id(9)).await;
        tracker
            .update(
                &Event::now(EventKind::ProgressInitialized)
                    .with_table("`db`.`t1`")
                    .with_total_bytes(100),
            )
            .await;
        tracker
            .update(&Event::now(EventKind::TableStarted).with_table("`db`.`t1`"))
            .await;
        tracker
            .update(
                &Event::now(EventKind::ChunkDelivered)
                    .with_table("`db`.`t1`")
                    .with_bytes(60),
            )
            .await;

        let snap = status(&tracker).await;
        assert_eq!(snap["status"], "running");
        assert_eq!(snap["task_id"], 9);
        assert_eq!(snap["total_bytes"], 100);
        assert_eq!(snap["delivered_bytes"], 60);
        assert_eq!(snap["tables"][0]["checkpoint"], "loaded");

        tracker
            .update(&Event::now(EventKind::TableCompleted).with_table("`db`.`t1`"))
            .await;
        tracker.update(&Event::now(EventKind::TaskEnded)).await;
        let snap = status(&tracker).await;
        assert_eq!(snap["status"], "succeeded");
        assert_eq!(snap["tables"][0]["completed"], true);
    }

    #[tokio::test]
    async fn task_error_is_recorded() {
        let tracker = ProgressTracker::new();
        tracker.update(&Event::now(EventKind::TaskStarted).with_task_id(1)).await;
        tracker
            .update(&Event::now(EventKind::TaskEnded).with_error("boom"))
            .await;
        let snap = status(&tracker).await;
        assert_eq!(snap["status"], "failed");
        assert_eq!(snap["error"], "boom");
    }

    #[tokio::test]
    async fn stale_events_are_rejected() {
        let tracker = ProgressTracker::new();
        let newer = Event::now(EventKind::TaskStarted).with_task_id(2);
        let stale = Event {
            seq: newer.seq.saturating_sub(1),
            ..Event::now(EventKind::TaskEnded).with_error("late")
        };
        tracker.update(&newer).await;
        tracker.update(&stale).await;
        let snap = status(&tracker).await;
        assert_eq!(snap["status"], "running");
    }

    #[tokio::test]
    async fn table_lookup_misses_cleanly() {
        let tracker = ProgressTracker::new();
        assert!(tracker.marshal_table_checkpoints("`no`.`table`").await.is_none());
    }
}
