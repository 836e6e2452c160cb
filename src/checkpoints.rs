//! # Checkpoint store interface and reserved table names.
//!
//! Checkpoints record per-table progress so an interrupted task can resume.
//! The store itself is a consumed interface ([`CheckpointsStore`]); the
//! supervisor only needs the reserved table names of the SQL driver for the
//! schema-conflict preflight, and the engine needs open/update/close.

use async_trait::async_trait;

use crate::error::Error;

/// Table names the SQL checkpoint driver creates inside its schema.
pub const TABLE_NAME_TASK: &str = "cp_task";
pub const TABLE_NAME_TABLE: &str = "cp_table";
pub const TABLE_NAME_ENGINE: &str = "cp_engine";
pub const TABLE_NAME_CHUNK: &str = "cp_chunk";

/// Returns true if `name` is one of the reserved checkpoint table names.
pub fn is_checkpoint_table(name: &str) -> bool {
    matches!(
        name,
        TABLE_NAME_TASK | TABLE_NAME_TABLE | TABLE_NAME_ENGINE | TABLE_NAME_CHUNK
    )
}

/// Per-table checkpoint status, coarse-grained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointStatus {
    Missing,
    Loaded,
    AllWritten,
    Imported,
}

/// Store of per-table restore progress.
///
/// Implementations persist either to a file next to the dump or to the
/// target cluster itself (SQL driver).
#[async_trait]
pub trait CheckpointsStore: Send + Sync {
    /// Ensures the store exists and records the task start.
    async fn initialize(&mut self, task_id: i64) -> Result<(), Error>;

    /// Records the status of one table.
    async fn update(&mut self, table: &str, status: CheckpointStatus) -> Result<(), Error>;

    /// Flushes and releases the store.
    async fn close(&mut self) -> Result<(), Error>;
}
