//! # External storage abstraction for dump sources.
//!
//! The supervisor reads dumps through [`ExternalStorage`], constructed from
//! a backend descriptor parsed out of the task's `source-dir` URL. The
//! abstraction is a consumed interface: this crate ships the local
//! filesystem client; object-store clients plug in behind the same trait.
//!
//! ## URL forms
//! - `/data/dump` or `file:///data/dump` → local backend
//! - other schemes (`s3://`, `gs://`, ...) are recognized as remote and
//!   rejected until a client is linked

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Error;

/// Parsed backend descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendDesc {
    /// Local filesystem rooted at the given directory.
    Local { root: PathBuf },
}

/// Options for constructing a storage client.
#[derive(Debug, Clone, Default)]
pub struct ExternalStorageOptions {
    /// Skip validating that the root path exists, delaying the error to the
    /// first actual access. Remote stores need extra permissions for the
    /// existence probe, so the supervisor always sets this.
    pub skip_check_path: bool,
}

/// A file enumerated from the dump source.
#[derive(Debug, Clone)]
pub struct FileInfo {
    /// Path relative to the storage root, with `/` separators.
    pub name: String,
    pub size: u64,
}

/// Read-only client over a dump source.
#[async_trait]
pub trait ExternalStorage: Send + Sync {
    /// Lists all files under the root, in unspecified order.
    async fn list(&self) -> Result<Vec<FileInfo>, Error>;

    /// Reads a file's full contents by its relative name.
    async fn read(&self, name: &str) -> Result<Vec<u8>, Error>;
}

/// Parses a `source-dir` URL into a backend descriptor.
pub fn parse_backend(url: &str) -> Result<BackendDesc, Error> {
    if url.is_empty() {
        return Err(Error::Storage {
            context: "parse backend failed",
            reason: "empty source-dir".to_string(),
        });
    }
    if let Some(path) = url.strip_prefix("file://") {
        if path.is_empty() {
            return Err(Error::Storage {
                context: "parse backend failed",
                reason: format!("file URL has no path: {url}"),
            });
        }
        return Ok(BackendDesc::Local {
            root: PathBuf::from(path),
        });
    }
    match url.split_once("://") {
        Some((scheme, _)) => Err(Error::Storage {
            context: "parse backend failed",
            reason: format!(
                "unsupported storage scheme '{scheme}' (supported: file, plain paths)"
            ),
        }),
        None => Ok(BackendDesc::Local {
            root: PathBuf::from(url),
        }),
    }
}

/// Constructs a storage client for the descriptor.
pub async fn new(
    desc: BackendDesc,
    opts: &ExternalStorageOptions,
) -> Result<Arc<dyn ExternalStorage>, Error> {
    match desc {
        BackendDesc::Local { root } => {
            if !opts.skip_check_path {
                let meta = tokio::fs::metadata(&root).await.map_err(|e| Error::Storage {
                    context: "create storage failed",
                    reason: format!("{}: {e}", root.display()),
                })?;
                if !meta.is_dir() {
                    return Err(Error::Storage {
                        context: "create storage failed",
                        reason: format!("{} is not a directory", root.display()),
                    });
                }
            }
            Ok(Arc::new(LocalStorage { root }))
        }
    }
}

/// Local filesystem storage client.
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    fn storage_err(&self, e: std::io::Error, what: &Path) -> Error {
        Error::Storage {
            context: "local storage access failed",
            reason: format!("{}: {e}", what.display()),
        }
    }
}

#[async_trait]
impl ExternalStorage for LocalStorage {
    async fn list(&self) -> Result<Vec<FileInfo>, Error> {
        let mut files = Vec::new();
        let mut stack = vec![self.root.clone()];
        while let Some(dir) = stack.pop() {
            let mut entries = tokio::fs::read_dir(&dir)
                .await
                .map_err(|e| self.storage_err(e, &dir))?;
            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| self.storage_err(e, &dir))?
            {
                let path = entry.path();
                let meta = entry
                    .metadata()
                    .await
                    .map_err(|e| self.storage_err(e, &path))?;
                if meta.is_dir() {
                    stack.push(path);
                } else {
                    let name = path
                        .strip_prefix(&self.root)
                        .unwrap_or(&path)
                        .components()
                        .map(|c| c.as_os_str().to_string_lossy())
                        .collect::<Vec<_>>()
                        .join("/");
                    files.push(FileInfo {
                        name,
                        size: meta.len(),
                    });
                }
            }
        }
        Ok(files)
    }

    async fn read(&self, name: &str) -> Result<Vec<u8>, Error> {
        let path = self.root.join(name);
        tokio::fs::read(&path)
            .await
            .map_err(|e| self.storage_err(e, &path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_plain_path_and_file_url() {
        assert_eq!(
            parse_backend("/data/dump").unwrap(),
            BackendDesc::Local {
                root: PathBuf::from("/data/dump")
            }
        );
        assert_eq!(
            parse_backend("file:///data/dump").unwrap(),
            BackendDesc::Local {
                root: PathBuf::from("/data/dump")
            }
        );
    }

    #[test]
    fn parse_rejects_unknown_scheme_and_empty() {
        assert!(parse_backend("").is_err());
        let err = parse_backend("s3://bucket/prefix").unwrap_err();
        assert!(err.to_string().contains("parse backend failed"));
        assert!(err.to_string().contains("s3"));
    }

    #[tokio::test]
    async fn missing_path_errors_only_without_skip() {
        let desc = BackendDesc::Local {
            root: PathBuf::from("/definitely/not/here"),
        };
        assert!(new(desc.clone(), &ExternalStorageOptions::default())
            .await
            .is_err());
        assert!(new(
            desc,
            &ExternalStorageOptions {
                skip_check_path: true
            }
        )
        .await
        .is_ok());
    }

    #[tokio::test]
    async fn list_and_read_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.sql"), b"select 1;").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub/b.sql"), b"select 2;").unwrap();

        let storage = new(
            BackendDesc::Local {
                root: dir.path().to_path_buf(),
            },
            &ExternalStorageOptions::default(),
        )
        .await
        .unwrap();

        let mut names: Vec<String> = storage
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|f| f.name)
            .collect();
        names.sort();
        assert_eq!(names, vec!["a.sql", "sub/b.sql"]);

        let body = storage.read("sub/b.sql").await.unwrap();
        assert_eq!(body, b"select 2;");
    }
}
