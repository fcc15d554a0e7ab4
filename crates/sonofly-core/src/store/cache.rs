// ── Device cache ──
//
// Last known device list per account, written after every successful
// cloud enumeration and read only when the cloud cannot be asked.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::storage::Storage;
use crate::error::CoreError;
use crate::model::Device;

/// Schema version of the persisted document.
pub const CACHE_VERSION: u32 = 1;

/// Storage namespace (first key segment).
pub const CACHE_NAMESPACE: &str = "sonofly";

#[derive(Debug, Serialize, Deserialize)]
struct CacheRecord {
    version: u32,
    key: String,
    saved_at: DateTime<Utc>,
    data: Vec<Device>,
}

/// Reads and writes versioned device lists through a [`Storage`].
#[derive(Clone)]
pub struct DeviceCache {
    storage: Arc<dyn Storage>,
}

impl DeviceCache {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Storage key for an account: `sonofly/<username>.json`.
    pub fn key_for(username: &str) -> String {
        format!("{CACHE_NAMESPACE}/{username}.json")
    }

    pub async fn save(&self, key: &str, devices: &[Device]) -> Result<(), CoreError> {
        let record = CacheRecord {
            version: CACHE_VERSION,
            key: key.to_owned(),
            saved_at: Utc::now(),
            data: devices.to_vec(),
        };
        let value = serde_json::to_value(&record).map_err(|e| CoreError::Internal(e.to_string()))?;
        self.storage.save(key, &value).await?;
        debug!(key, count = devices.len(), "device cache written");
        Ok(())
    }

    /// Load the cached list. `Ok(None)` when nothing was ever cached;
    /// [`CoreError::CacheUnavailable`] when a document exists but cannot
    /// be used.
    pub async fn load(&self, key: &str) -> Result<Option<Vec<Device>>, CoreError> {
        let unavailable = |reason: String| CoreError::CacheUnavailable {
            key: key.to_owned(),
            reason,
        };

        let Some(value) = self
            .storage
            .load(key)
            .await
            .map_err(|e| unavailable(e.to_string()))?
        else {
            return Ok(None);
        };

        let record: CacheRecord =
            serde_json::from_value(value).map_err(|e| unavailable(e.to_string()))?;
        if record.version != CACHE_VERSION {
            return Err(unavailable(format!(
                "unsupported version {} (expected {CACHE_VERSION})",
                record.version
            )));
        }

        debug!(key, count = record.data.len(), saved_at = %record.saved_at, "device cache loaded");
        Ok(Some(record.data))
    }
}
