//! Process-scoped configuration, immutable after startup.
//!
//! [`GlobalConfig`] is produced once by the CLI/config loader and holds the
//! knobs that outlive any single task: the status-server bind address (empty
//! means lazy, signal-triggered start), log sink configuration, TLS material
//! paths, the default backend kind, and the default cluster connection.

use serde::{Deserialize, Serialize};

use crate::config::Backend;

/// Top-level process configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct GlobalConfig {
    pub app: GlobalApp,
    pub security: SecurityConfig,
    pub tidb: GlobalTidb,
    pub tikv_importer: GlobalImporter,
    pub mydumper: GlobalMydumper,
}

/// Application-level settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct GlobalApp {
    /// Run as a long-lived server accepting tasks over HTTP.
    pub server_mode: bool,
    /// Status-server bind address. Empty means the server is not started
    /// until the designated user signal requests an ephemeral bind.
    pub status_addr: String,
    /// Enable the resource-limit preflight check.
    pub check_requirements: bool,
    /// Log sink configuration.
    pub log: LogConfig,
}

impl Default for GlobalApp {
    fn default() -> Self {
        Self {
            server_mode: false,
            status_addr: String::new(),
            check_requirements: true,
            log: LogConfig::default(),
        }
    }
}

/// Log sink configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct LogConfig {
    /// Log file path; empty writes to stderr only.
    pub file: String,
    /// Initial log level (trace, debug, info, warn, error).
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            file: String::new(),
            level: "info".to_string(),
        }
    }
}

/// TLS material paths for the status server and the SQL side.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct SecurityConfig {
    pub ca_path: String,
    pub cert_path: String,
    pub key_path: String,
}

impl SecurityConfig {
    /// Returns true if no TLS material is configured.
    pub fn is_empty(&self) -> bool {
        self.ca_path.is_empty() && self.cert_path.is_empty() && self.key_path.is_empty()
    }
}

/// Default cluster connection parameters, inherited by tasks.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct GlobalTidb {
    pub host: String,
    pub port: u16,
    pub user: String,
    #[serde(skip_serializing)]
    pub password: String,
    /// Cluster-side log level applied when the loader tunes the server.
    pub log_level: String,
}

impl Default for GlobalTidb {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 4000,
            user: "root".to_string(),
            password: String::new(),
            log_level: "error".to_string(),
        }
    }
}

/// Default ingestion backend, inherited by tasks.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct GlobalImporter {
    pub backend: Backend,
}

/// Default dump location, inherited by tasks.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct GlobalMydumper {
    pub source_dir: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = GlobalConfig::default();
        assert!(!cfg.app.server_mode);
        assert!(cfg.app.status_addr.is_empty());
        assert!(cfg.app.check_requirements);
        assert_eq!(cfg.app.log.level, "info");
        assert_eq!(cfg.tidb.port, 4000);
        assert!(cfg.security.is_empty());
    }

    #[test]
    fn kebab_case_toml_round_trips() {
        let cfg: GlobalConfig = toml::from_str(
            r#"
            [app]
            server-mode = true
            status-addr = "127.0.0.1:8289"
            check-requirements = false

            [tikv-importer]
            backend = "local"
            "#,
        )
        .unwrap();
        assert!(cfg.app.server_mode);
        assert_eq!(cfg.app.status_addr, "127.0.0.1:8289");
        assert!(!cfg.app.check_requirements);
        assert_eq!(cfg.tikv_importer.backend, Backend::Local);
    }
}
