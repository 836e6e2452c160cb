//! # Process-wide pause gate.
//!
//! A single binary state `{running, paused}` the restore engine consults
//! between delivery units. Toggles arrive edge-triggered from the HTTP
//! layer (`PUT /pause`, `PUT /resume`) and from the supervisor when a
//! server-mode task fails; the engine samples the level or blocks on
//! [`PauseGate::wait_if_paused`].
//!
//! ## Rules
//! - Only writers toggle, so a resumer cannot be starved.
//! - A waiter observes a `resume` within one notification round-trip.
//! - Cancellation of the waiting task's token unblocks the wait.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// Process-global gate pausing delivery between units.
pub struct PauseGate {
    paused: AtomicBool,
    notify: Notify,
}

impl PauseGate {
    /// Creates a gate in the running state.
    pub fn new() -> Self {
        Self {
            paused: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }

    /// Switches the gate to paused.
    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    /// Switches the gate to running and wakes all waiters.
    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Samples the gate level.
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    /// Blocks while the gate is paused.
    ///
    /// Returns immediately when running. Returns early (still paused) if the
    /// token fires, so a canceled task is never stuck behind the gate.
    pub async fn wait_if_paused(&self, token: &CancellationToken) {
        loop {
            if !self.is_paused() {
                return;
            }
            let notified = self.notify.notified();
            // Re-check after registering the waiter so a concurrent resume
            // between the check and `notified()` is not lost.
            if !self.is_paused() {
                return;
            }
            tokio::select! {
                _ = notified => {}
                _ = token.cancelled() => return,
            }
        }
    }
}

impl Default for PauseGate {
    fn default() -> Self {
        Self::new()
    }
}
