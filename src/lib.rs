//! # loadvisor
//!
//! **Loadvisor** is the supervisory control plane of a bulk data-ingestion
//! tool that loads large dump files into a distributed SQL cluster.
//!
//! It owns the process-level lifecycle, the task queue and its HTTP control
//! surface, the signal-driven server activation, and the per-task
//! cancellation fabric wrapped around an otherwise opaque restore pipeline.
//!
//! ## Features
//!
//! | Area               | Description                                                       | Key types / traits                        |
//! |--------------------|-------------------------------------------------------------------|-------------------------------------------|
//! | **Supervision**    | One-shot and server modes over the same execution path.           | [`Supervisor`]                            |
//! | **Task queue**     | FIFO queue with blocking pop, removal and reordering by id.       | [`TaskQueue`]                             |
//! | **Cancellation**   | Process root vs per-task child tokens; HTTP-driven task delete.   | [`CancelRegistry`]                        |
//! | **Pause gate**     | Process-wide gate the engine consults between delivery units.     | [`PauseGate`]                             |
//! | **Control plane**  | Tasks, progress, pause, log level, metrics, console over one mux. | [`http::router`], [`http::StatusServer`]  |
//! | **Engine seam**    | Opaque restore pipeline behind builder/run/close traits.          | [`Engine`], [`EngineBuilder`]             |
//! | **Glue seam**      | SQL, checkpoints and record-counter capabilities for the engine.  | [`Glue`]                                  |
//! | **Errors**         | One typed error enum with stable labels.                          | [`Error`]                                 |
//!
//! ```no_run
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//! use loadvisor::{GlobalConfig, Supervisor, TaskConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut global = GlobalConfig::default();
//!     global.mydumper.source_dir = "/data/dump".to_string();
//!
//!     let app = Supervisor::new(global.clone(), loadvisor::restore::default_engine_builder())?;
//!     app.go_serve().await?;
//!
//!     let task = TaskConfig::from_global(&global);
//!     app.run_once(CancellationToken::new(), task, None).await?;
//!     Ok(())
//! }
//! ```

pub mod checkpoints;
pub mod config;
pub mod core;
pub mod error;
pub mod events;
pub mod glue;
pub mod http;
pub mod logging;
pub mod metrics;
pub mod mydump;
pub mod progress;
pub mod restore;
pub mod storage;
pub mod tls;

// ---- Public re-exports ----

pub use config::{Backend, GlobalConfig, TaskConfig, TaskId};
pub use core::{CancelRegistry, PauseGate, Supervisor, TaskQueue};
pub use error::Error;
pub use events::{Bus, Event, EventKind};
pub use glue::Glue;
pub use restore::{Engine, EngineBuilder};
