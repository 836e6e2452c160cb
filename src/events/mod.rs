//! Runtime events: types and broadcast bus.
//!
//! This module groups the event **data model** and the **bus** used to
//! publish/subscribe to runtime events emitted by the supervisor and the
//! restore engine.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and payload metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: `Supervisor` (task lifecycle, shutdown), the restore
//!   engine (table/chunk progress).
//! - **Consumers**: the progress tracker (folds events into the snapshots
//!   served under `/progress`).

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
