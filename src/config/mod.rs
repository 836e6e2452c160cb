//! # Configuration model.
//!
//! Two layers, mirroring the process lifecycle:
//! - [`GlobalConfig`]: process-scoped, produced once at startup, immutable.
//! - [`TaskConfig`]: per-task, built from the global config plus an optional
//!   TOML body, validated by [`TaskConfig::adjust`], immutable once enqueued.
//!
//! Sizes in configuration accept both raw byte counts and human-readable
//! strings ("512MB") via [`Size`].

mod global;
mod size;
mod task;

pub use global::{GlobalApp, GlobalConfig, GlobalImporter, GlobalMydumper, GlobalTidb, LogConfig, SecurityConfig};
pub use size::{Size, SizeParseError};
pub use task::{
    mint_task_id, Backend, CheckpointConfig, CheckpointDriver, MydumperConfig, TaskApp,
    TaskConfig, TaskId, TaskImporter, TaskTidb,
};
