//! # Error types used by the supervisor and its collaborators.
//!
//! The crate uses a single [`Error`] enum across the supervisor core, the
//! preflight checks, and the consumed interfaces (storage, glue, engine).
//!
//! Errors carry a short stable label (`as_label`) for metrics, mirroring the
//! error classes the HTTP layer and the exit-code contract distinguish:
//! configuration, preflight, storage, glue, engine, cancellation, bind.

use thiserror::Error;

/// Errors produced by the supervisor runtime and the restore pipeline seams.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed or inconsistent global/task configuration.
    #[error("invalid configuration: {reason}")]
    Config {
        /// Human-readable description of the offending field.
        reason: String,
    },

    /// TLS material could not be loaded or is not PEM-encoded.
    #[error("failed to load TLS material from {path}: {reason}")]
    Tls { path: String, reason: String },

    /// The estimated open-file demand of the local backend exceeds the
    /// process soft limit.
    #[error(
        "the maximum number of open file descriptors is too low: \
         estimated {estimated}, soft limit {soft_limit}; \
         please raise the limit (e.g. `ulimit -n`) and retry"
    )]
    ResourceLimit { estimated: u64, soft_limit: u64 },

    /// A table in the dump collides with the SQL checkpoint schema.
    #[error(
        "checkpoint table `{schema}`.`{table}` conflicts with data files. \
         Please change the `checkpoint.schema` config or set \
         `checkpoint.driver` to \"file\" instead"
    )]
    CheckpointConflict { schema: String, table: String },

    /// Source-dir URL parsing or storage client construction failed.
    #[error("{context}: {reason}")]
    Storage {
        /// Annotation describing which storage step failed.
        context: &'static str,
        reason: String,
    },

    /// SQL glue failure (connection, execution, checkpoint store).
    #[error("glue error: {reason}")]
    Glue { reason: String },

    /// Restore engine failure, surfaced unchanged to the caller.
    #[error("{reason}")]
    Engine { reason: String },

    /// The per-task or process-wide context was canceled.
    ///
    /// Not an error in the traditional sense; signals intentional
    /// termination of the task or the whole process.
    #[error("task canceled")]
    Canceled,

    /// The status server failed to bind its listener.
    #[error("failed to bind status server on {addr}")]
    ServerBind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Logging subsystem initialization or reload failure.
    #[error("log error: {reason}")]
    Log { reason: String },

    /// Unexpected runtime failure inside the supervisor itself.
    #[error("internal error: {reason}")]
    Internal { reason: String },
}

impl Error {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            Error::Config { .. } => "config",
            Error::Tls { .. } => "tls",
            Error::ResourceLimit { .. } => "resource_limit",
            Error::CheckpointConflict { .. } => "checkpoint_conflict",
            Error::Storage { .. } => "storage",
            Error::Glue { .. } => "glue",
            Error::Engine { .. } => "engine",
            Error::Canceled => "canceled",
            Error::ServerBind { .. } => "server_bind",
            Error::Log { .. } => "log",
            Error::Internal { .. } => "internal",
        }
    }

    /// Indicates whether the error represents cooperative cancellation.
    pub fn is_canceled(&self) -> bool {
        matches!(self, Error::Canceled)
    }

    /// Indicates whether the error was raised before the engine started
    /// (configuration or preflight), as opposed to a runtime failure.
    pub fn is_preflight(&self) -> bool {
        matches!(
            self,
            Error::Config { .. }
                | Error::ResourceLimit { .. }
                | Error::CheckpointConflict { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_message_names_table_and_remediation() {
        let err = Error::CheckpointConflict {
            schema: "checkpoint_schema".to_string(),
            table: "cp_task".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("`checkpoint_schema`.`cp_task`"));
        assert!(msg.contains("checkpoint.schema"));
        assert!(msg.contains("\"file\""));
    }

    #[test]
    fn labels_are_stable() {
        assert_eq!(Error::Canceled.as_label(), "canceled");
        assert_eq!(
            Error::ResourceLimit {
                estimated: 10,
                soft_limit: 5
            }
            .as_label(),
            "resource_limit"
        );
    }
}
