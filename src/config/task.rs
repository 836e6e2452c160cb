//! Per-task configuration, immutable once enqueued.
//!
//! A [`TaskConfig`] is built either from the global config (one-shot mode) or
//! from a TOML body posted to `/tasks` merged over the global config (server
//! mode). The task id is minted as nanoseconds-since-epoch when the task is
//! enqueued; a TOML body may pre-set `task-id` explicitly, which is the test
//! hook the queue honors.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::config::{GlobalConfig, SecurityConfig, Size};
use crate::error::Error;

/// Task identifier: nanoseconds since the Unix epoch at enqueue time.
pub type TaskId = i64;

/// Mints a fresh task id. Monotonic within a process for practical purposes;
/// collisions are only possible through the explicit `task-id` test hook.
pub fn mint_task_id() -> TaskId {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as i64)
        .unwrap_or(0)
}

/// Downstream ingestion mode.
///
/// The `local` backend writes sorted data files before ingestion and is the
/// resource-intensive one that triggers the open-files preflight.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Local,
    #[default]
    Importer,
    Tidb,
}

/// Where per-table progress checkpoints are persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointDriver {
    #[default]
    File,
    Mysql,
}

/// Full configuration of one ingestion task.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct TaskConfig {
    /// Assigned at enqueue time; zero means "not yet minted".
    pub task_id: TaskId,
    pub app: TaskApp,
    pub mydumper: MydumperConfig,
    pub tikv_importer: TaskImporter,
    pub checkpoint: CheckpointConfig,
    pub tidb: TaskTidb,
}

/// Application-level task knobs.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct TaskApp {
    pub check_requirements: bool,
    /// Number of tables restored concurrently.
    pub table_concurrency: usize,
    /// Number of concurrent region workers writing data files.
    pub region_concurrency: usize,
}

impl Default for TaskApp {
    fn default() -> Self {
        Self {
            check_requirements: true,
            table_concurrency: 6,
            region_concurrency: default_region_concurrency(),
        }
    }
}

fn default_region_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

/// Dump source location.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct MydumperConfig {
    /// URL or path of the dump directory (e.g. `/data/dump`, `file:///data/dump`).
    pub source_dir: String,
}

/// Backend selection and its resource knobs.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct TaskImporter {
    pub backend: Backend,
    /// In-memory write buffer per engine; drives the open-files estimate of
    /// the local backend.
    pub engine_mem_cache_size: Size,
}

impl Default for TaskImporter {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            engine_mem_cache_size: Size::from_mb(512),
        }
    }
}

/// Checkpoint persistence settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct CheckpointConfig {
    pub enable: bool,
    pub driver: CheckpointDriver,
    /// Schema holding the checkpoint tables when the driver is `mysql`.
    pub schema: String,
    /// Optional DSN override for the checkpoint store.
    pub dsn: String,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            enable: true,
            driver: CheckpointDriver::File,
            schema: "loadvisor_checkpoint".to_string(),
            dsn: String::new(),
        }
    }
}

/// Target cluster connection block.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct TaskTidb {
    pub host: String,
    pub port: u16,
    pub user: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub status_port: u16,
    pub sql_mode: String,
    pub security: SecurityConfig,
}

impl Default for TaskTidb {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 4000,
            user: "root".to_string(),
            password: String::new(),
            status_port: 10080,
            sql_mode: "STRICT_TRANS_TABLES,NO_ENGINE_SUBSTITUTION".to_string(),
            security: SecurityConfig::default(),
        }
    }
}

impl TaskConfig {
    /// Builds a task config inheriting everything from the global config
    /// (one-shot mode).
    pub fn from_global(global: &GlobalConfig) -> Self {
        let mut cfg = TaskConfig::default();
        cfg.app.check_requirements = global.app.check_requirements;
        cfg.mydumper.source_dir = global.mydumper.source_dir.clone();
        cfg.tikv_importer.backend = global.tikv_importer.backend;
        cfg.tidb.host = global.tidb.host.clone();
        cfg.tidb.port = global.tidb.port;
        cfg.tidb.user = global.tidb.user.clone();
        cfg.tidb.password = global.tidb.password.clone();
        cfg.tidb.security = global.security.clone();
        cfg
    }

    /// Parses a TOML task body, inheriting unset fields from the global
    /// config (server mode).
    pub fn from_global_and_toml(global: &GlobalConfig, data: &[u8]) -> Result<Self, Error> {
        let text = std::str::from_utf8(data).map_err(|e| Error::Config {
            reason: format!("task body is not valid UTF-8: {e}"),
        })?;
        let mut cfg: TaskConfig = toml::from_str(text).map_err(|e| Error::Config {
            reason: format!("cannot parse task (must be TOML): {e}"),
        })?;
        let keys: toml::Table = text.parse().map_err(|e| Error::Config {
            reason: format!("cannot parse task (must be TOML): {e}"),
        })?;
        cfg.inherit_global(global, &keys);
        Ok(cfg)
    }

    /// Fills fields the TOML body left unset from the global config.
    fn inherit_global(&mut self, global: &GlobalConfig, keys: &toml::Table) {
        if !has_key(keys, "tidb", "host") {
            self.tidb.host = global.tidb.host.clone();
        }
        if !has_key(keys, "tidb", "port") {
            self.tidb.port = global.tidb.port;
        }
        if !has_key(keys, "tidb", "user") {
            self.tidb.user = global.tidb.user.clone();
        }
        if !has_key(keys, "tidb", "password") {
            self.tidb.password = global.tidb.password.clone();
        }
        if !has_key(keys, "tidb", "security") {
            self.tidb.security = global.security.clone();
        }
        if !has_key(keys, "tikv-importer", "backend") {
            self.tikv_importer.backend = global.tikv_importer.backend;
        }
        if !has_key(keys, "mydumper", "source-dir") {
            self.mydumper.source_dir = global.mydumper.source_dir.clone();
        }
        if !has_key(keys, "app", "check-requirements") {
            self.app.check_requirements = global.app.check_requirements;
        }
    }

    /// Validates the adjusted configuration before execution or enqueue.
    pub fn adjust(&mut self) -> Result<(), Error> {
        if self.mydumper.source_dir.is_empty() {
            return Err(Error::Config {
                reason: "mydumper.source-dir is not set".to_string(),
            });
        }
        if self.app.table_concurrency == 0 {
            return Err(Error::Config {
                reason: "app.table-concurrency must be at least 1".to_string(),
            });
        }
        if self.app.region_concurrency == 0 {
            return Err(Error::Config {
                reason: "app.region-concurrency must be at least 1".to_string(),
            });
        }
        if self.tikv_importer.engine_mem_cache_size.bytes() == 0 {
            return Err(Error::Config {
                reason: "tikv-importer.engine-mem-cache-size must be positive".to_string(),
            });
        }
        if self.checkpoint.enable
            && self.checkpoint.driver == CheckpointDriver::Mysql
            && self.checkpoint.schema.is_empty()
        {
            return Err(Error::Config {
                reason: "checkpoint.schema is required for the mysql checkpoint driver"
                    .to_string(),
            });
        }
        if self.tidb.host.is_empty() {
            return Err(Error::Config {
                reason: "tidb.host is not set".to_string(),
            });
        }
        if self.tidb.port == 0 {
            return Err(Error::Config {
                reason: "tidb.port must be positive".to_string(),
            });
        }
        Ok(())
    }

    /// Serializes the config for the HTTP surface and for logging.
    /// The password is never serialized.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// Returns true if the TOML body explicitly set `[section] key`.
fn has_key(keys: &toml::Table, section: &str, key: &str) -> bool {
    keys.get(section)
        .and_then(|v| v.as_table())
        .map(|t| t.contains_key(key))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn global() -> GlobalConfig {
        let mut g = GlobalConfig::default();
        g.tidb.host = "tidb.internal".to_string();
        g.tidb.password = "sekrit".to_string();
        g.mydumper.source_dir = "/data/dump".to_string();
        g.tikv_importer.backend = Backend::Local;
        g
    }

    #[test]
    fn from_global_inherits_connection_and_backend() {
        let cfg = TaskConfig::from_global(&global());
        assert_eq!(cfg.tidb.host, "tidb.internal");
        assert_eq!(cfg.tikv_importer.backend, Backend::Local);
        assert_eq!(cfg.mydumper.source_dir, "/data/dump");
    }

    #[test]
    fn toml_body_overrides_only_named_fields() {
        let body = br#"
            [mydumper]
            source-dir = "/data/other"

            [tidb]
            port = 4001
        "#;
        let cfg = TaskConfig::from_global_and_toml(&global(), body).unwrap();
        assert_eq!(cfg.mydumper.source_dir, "/data/other");
        assert_eq!(cfg.tidb.port, 4001);
        // Unset fields inherit from global.
        assert_eq!(cfg.tidb.host, "tidb.internal");
        assert_eq!(cfg.tidb.password, "sekrit");
        assert_eq!(cfg.tikv_importer.backend, Backend::Local);
    }

    #[test]
    fn task_id_hook_survives_parse() {
        let body = b"task-id = 42\n[mydumper]\nsource-dir = \"/d\"\n";
        let cfg = TaskConfig::from_global_and_toml(&global(), body).unwrap();
        assert_eq!(cfg.task_id, 42);
    }

    #[test]
    fn malformed_toml_is_a_config_error() {
        let err = TaskConfig::from_global_and_toml(&global(), b"not = = toml").unwrap_err();
        assert_eq!(err.as_label(), "config");
    }

    #[test]
    fn adjust_rejects_missing_source_dir() {
        let mut cfg = TaskConfig::default();
        let err = cfg.adjust().unwrap_err();
        assert!(err.to_string().contains("source-dir"));
    }

    #[test]
    fn adjust_requires_schema_for_mysql_checkpoints() {
        let mut cfg = TaskConfig::from_global(&global());
        cfg.checkpoint.driver = CheckpointDriver::Mysql;
        cfg.checkpoint.schema = String::new();
        let err = cfg.adjust().unwrap_err();
        assert!(err.to_string().contains("checkpoint.schema"));
    }

    #[test]
    fn password_is_never_serialized() {
        let mut cfg = TaskConfig::from_global(&global());
        cfg.task_id = 7;
        let json = cfg.to_json();
        assert_eq!(json["task-id"], 7);
        assert!(json["tidb"].get("password").is_none());
    }

    #[test]
    fn minted_ids_are_positive_and_distinct() {
        let a = mint_task_id();
        let b = mint_task_id();
        assert!(a > 0);
        assert!(b >= a);
    }
}
