// Shared transport configuration for building reqwest::Client instances.
//
// The cloud client and the LAN client share timeout and user-agent
// settings through this module, avoiding duplicated builder logic.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue};

use crate::error::Error;

const USER_AGENT: &str = concat!("sonofly/", env!("CARGO_PKG_VERSION"));

/// Shared transport configuration for building HTTP clients.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Per-request timeout.
    pub timeout: Duration,
    /// Application id sent as `X-CK-Appid` on cloud requests.
    pub app_id: Option<String>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            app_id: None,
        }
    }
}

impl TransportConfig {
    /// Build a `reqwest::Client` for the cloud API.
    ///
    /// Injects the `X-CK-Appid` header when an application id is configured.
    pub fn build_cloud_client(&self) -> Result<reqwest::Client, Error> {
        let mut headers = HeaderMap::new();
        if let Some(ref app_id) = self.app_id {
            let value = HeaderValue::from_str(app_id).map_err(|e| Error::Authentication {
                message: format!("invalid app id: {e}"),
            })?;
            headers.insert("X-CK-Appid", value);
        }

        reqwest::Client::builder()
            .timeout(self.timeout)
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .build()
            .map_err(Error::Transport)
    }

    /// Build a `reqwest::Client` for LAN requests.
    ///
    /// Devices answer on plain HTTP and never sit behind a proxy, so the
    /// system proxy settings are ignored.
    pub fn build_local_client(&self) -> Result<reqwest::Client, Error> {
        reqwest::Client::builder()
            .timeout(self.timeout)
            .user_agent(USER_AGENT)
            .no_proxy()
            .build()
            .map_err(Error::Transport)
    }

    /// Timeout in whole seconds, for error reporting.
    pub fn timeout_secs(&self) -> u64 {
        self.timeout.as_secs()
    }
}
