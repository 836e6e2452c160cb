//! Runtime core: supervision and lifecycle.
//!
//! This module contains the supervisory control plane proper. The public
//! API re-exported from here is [`Supervisor`] plus the shared primitives
//! the HTTP layer and the engine consult ([`TaskQueue`], [`CancelRegistry`],
//! [`PauseGate`]). Everything else is an internal building block the
//! supervisor wires together.
//!
//! ## Files & responsibilities
//! - **supervisor.rs**: public facade; owns the runtime (queue, registry,
//!   pause gate, bus, progress tracker, status server), runs one-shot and
//!   server modes, drives graceful shutdown.
//! - **queue.rs**: FIFO task queue with blocking pop and by-id mutation
//!   (remove, move-to-front/back).
//! - **registry.rs**: mutex-protected cell for the single in-flight task's
//!   cancel handle; `cancel_if` backs `DELETE /tasks/{id}`.
//! - **pause.rs**: process-wide pause gate the engine consults between
//!   delivery units.
//! - **preflight.rs**: resource-limit and checkpoint-conflict checks run
//!   after dump enumeration, before the engine starts.
//! - **shutdown.rs**: cross-platform OS signal handling (termination set
//!   plus the lazy-start user signal).
//!
//! ## Cancellation hierarchy
//! ```text
//! root token (Supervisor)            per-task parent (caller/background)
//!   │ canceled by stop()/signals        │
//!   ├─► dequeue loop exits              └─► child token (one per task)
//!   ├─► status server drains                  ├─ canceled by stop() via registry
//!   └─► signal watchers exit                  ├─ canceled by DELETE via cancel_if
//!                                             └─ canceled when the task ends
//! ```
//! The two trees are deliberately disjoint: canceling one task never stops
//! the process, and the root token reaches the running task only through
//! the registry.

mod pause;
mod preflight;
mod queue;
mod registry;
mod shutdown;
mod supervisor;

pub use pause::PauseGate;
pub use preflight::{check_schema_conflict, check_system_requirement, estimate_max_open_files};
pub use queue::TaskQueue;
pub use registry::CancelRegistry;
pub use shutdown::{wait_for_shutdown_signal, wait_for_user_signal};
pub use supervisor::Supervisor;
