// ── Host key-value storage ──
//
// The persistence primitive the device cache sits on. Keys are relative
// slash-separated paths such as `sonofly/user@example.com.json`.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;

use crate::error::CoreError;

/// Key-value store of JSON documents.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Load the document at `key`, `None` when absent.
    async fn load(&self, key: &str) -> Result<Option<Value>, CoreError>;

    /// Replace the document at `key`.
    async fn save(&self, key: &str, value: &Value) -> Result<(), CoreError>;
}

// ── FileStorage ─────────────────────────────────────────────────────

/// JSON files under a root directory.
#[derive(Debug, Clone)]
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve `key` below the root, rejecting escapes.
    fn path_for(&self, key: &str) -> Result<PathBuf, CoreError> {
        let relative = Path::new(key);
        let valid = !key.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !valid {
            return Err(CoreError::Storage {
                message: format!("invalid storage key '{key}'"),
            });
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl Storage for FileStorage {
    async fn load(&self, key: &str) -> Result<Option<Value>, CoreError> {
        let path = self.path_for(key)?;
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(CoreError::Storage {
                    message: format!("cannot read {}: {e}", path.display()),
                });
            }
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| CoreError::Storage {
                message: format!("{} is not valid JSON: {e}", path.display()),
            })
    }

    async fn save(&self, key: &str, value: &Value) -> Result<(), CoreError> {
        let path = self.path_for(key)?;
        let io_err = |e: std::io::Error| CoreError::Storage {
            message: format!("cannot write {}: {e}", path.display()),
        };

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }

        let body = serde_json::to_vec_pretty(value).map_err(|e| CoreError::Storage {
            message: e.to_string(),
        })?;

        // Write-then-rename keeps the previous document intact on failure.
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, body).await.map_err(io_err)?;
        tokio::fs::rename(&tmp, &path).await.map_err(io_err)?;
        Ok(())
    }
}

// ── MemoryStorage ───────────────────────────────────────────────────

/// In-memory storage for tests and ephemeral runs.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: DashMap<String, Value>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Store a raw document, bypassing any envelope.
    pub fn insert_raw(&self, key: impl Into<String>, value: Value) {
        self.entries.insert(key.into(), value);
    }

    pub fn get_raw(&self, key: &str) -> Option<Value> {
        self.entries.get(key).map(|v| v.value().clone())
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn load(&self, key: &str) -> Result<Option<Value>, CoreError> {
        Ok(self.get_raw(key))
    }

    async fn save(&self, key: &str, value: &Value) -> Result<(), CoreError> {
        self.entries.insert(key.to_owned(), value.clone());
        Ok(())
    }
}
