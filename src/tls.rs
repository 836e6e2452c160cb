//! # TLS material loading and named registration for the SQL side.
//!
//! The supervisor loads TLS material once at startup for the status server,
//! and registers each task's SQL TLS material under the well-known name
//! [`SQL_TLS_NAME`] before constructing the default glue. The glue consults
//! the registry when it opens its connection pool, so registration must
//! happen first.
//!
//! ## Rules
//! - Material is validated at load time (files exist and are PEM-encoded).
//! - The registry holds at most one entry per name; re-registration replaces.
//! - Deregistration is unconditional and idempotent.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};

use crate::config::SecurityConfig;
use crate::error::Error;

/// Registration name the default glue looks up for cluster connections.
pub const SQL_TLS_NAME: &str = "cluster";

/// Loaded and validated TLS material.
#[derive(Debug, Clone)]
pub struct TlsMaterial {
    pub ca_path: Option<PathBuf>,
    pub cert_path: Option<PathBuf>,
    pub key_path: Option<PathBuf>,
}

impl TlsMaterial {
    /// Loads material from the configured paths.
    ///
    /// Returns `Ok(None)` when no path is configured. Each configured file
    /// must exist and look like PEM; partial configuration (cert without
    /// key or vice versa) is rejected.
    pub fn from_security(sec: &SecurityConfig) -> Result<Option<Self>, Error> {
        if sec.is_empty() {
            return Ok(None);
        }
        if sec.cert_path.is_empty() != sec.key_path.is_empty() {
            return Err(Error::Config {
                reason: "security.cert-path and security.key-path must be set together"
                    .to_string(),
            });
        }
        Ok(Some(Self {
            ca_path: load_pem_path(&sec.ca_path)?,
            cert_path: load_pem_path(&sec.cert_path)?,
            key_path: load_pem_path(&sec.key_path)?,
        }))
    }
}

fn load_pem_path(path: &str) -> Result<Option<PathBuf>, Error> {
    if path.is_empty() {
        return Ok(None);
    }
    let data = std::fs::read(path).map_err(|e| Error::Tls {
        path: path.to_string(),
        reason: e.to_string(),
    })?;
    if !data.windows(10).any(|w| w == b"-----BEGIN") {
        return Err(Error::Tls {
            path: path.to_string(),
            reason: "not a PEM-encoded file".to_string(),
        });
    }
    Ok(Some(PathBuf::from(path)))
}

fn registry() -> &'static Mutex<HashMap<String, TlsMaterial>> {
    static REGISTRY: OnceLock<Mutex<HashMap<String, TlsMaterial>>> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Registers TLS material under `name`, replacing any previous entry.
pub fn register(name: &str, material: TlsMaterial) {
    registry()
        .lock()
        .expect("tls registry poisoned")
        .insert(name.to_string(), material);
}

/// Removes the material registered under `name`, if any.
pub fn deregister(name: &str) {
    registry()
        .lock()
        .expect("tls registry poisoned")
        .remove(name);
}

/// Looks up the material registered under `name`.
pub fn lookup(name: &str) -> Option<TlsMaterial> {
    registry()
        .lock()
        .expect("tls registry poisoned")
        .get(name)
        .cloned()
}

/// Validates and registers a task's SQL TLS material under [`SQL_TLS_NAME`].
///
/// A task without configured material registers nothing; the previous entry
/// (if any) is removed so a later task cannot accidentally reuse it.
pub fn register_sql(sec: &SecurityConfig) -> Result<(), Error> {
    match TlsMaterial::from_security(sec)? {
        Some(material) => register(SQL_TLS_NAME, material),
        None => deregister(SQL_TLS_NAME),
    }
    Ok(())
}
