// LAN client
//
// Delivers commands straight to devices over their local HTTP endpoint
// (`POST http://<addr>/zeroconf/<cmd>`). Addresses come from a discovery
// handle; a background task keeps the table current until stopped.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use serde::Deserialize;
use serde_json::{Map, Value, json};
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::error::Error;
use crate::local::discovery::{Announcement, DiscoveryHandle};
use crate::transport::TransportConfig;

type AddressTable = Arc<RwLock<HashMap<String, SocketAddr>>>;

/// Answer of the device's local endpoint.
#[derive(Debug, Deserialize)]
struct LocalResponse {
    #[serde(default)]
    error: i64,
}

/// HTTP client for devices on the local network.
pub struct LocalClient {
    http: reqwest::Client,
    timeout_secs: u64,
    addresses: AddressTable,
    listener: Mutex<Option<CancellationToken>>,
}

impl LocalClient {
    pub fn new(transport: &TransportConfig) -> Result<Self, Error> {
        Ok(Self {
            http: transport.build_local_client()?,
            timeout_secs: transport.timeout_secs(),
            addresses: Arc::default(),
            listener: Mutex::new(None),
        })
    }

    /// Start tracking announcements from `discovery`.
    ///
    /// Restarting replaces the previous listener.
    pub fn start(&self, discovery: Arc<dyn DiscoveryHandle>) {
        let cancel = CancellationToken::new();
        if let Some(previous) = self
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(cancel.clone())
        {
            previous.cancel();
        }

        // Subscribe before seeding so nothing announced in between is lost.
        let mut rx = discovery.subscribe();
        for announcement in discovery.known() {
            record(&self.addresses, announcement);
        }

        let addresses = Arc::clone(&self.addresses);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    msg = rx.recv() => match msg {
                        Ok(announcement) => record(&addresses, announcement),
                        Err(RecvError::Lagged(n)) => {
                            warn!(skipped = n, "discovery listener lagged");
                        }
                        Err(RecvError::Closed) => break,
                    },
                }
            }
            debug!("local discovery listener exiting");
        });
    }

    /// Stop the discovery listener. Safe to call repeatedly.
    pub fn stop(&self) {
        let token = self
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(token) = token {
            token.cancel();
        }
    }

    /// Whether `device_id` has been announced on the local network.
    pub fn is_reachable(&self, device_id: &str) -> bool {
        self.address_of(device_id).is_some()
    }

    fn address_of(&self, device_id: &str) -> Option<SocketAddr> {
        self.addresses
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(device_id)
            .copied()
    }

    /// Send `params` to the device's `/zeroconf/<cmd>` endpoint.
    pub async fn send(
        &self,
        device_id: &str,
        cmd: &str,
        params: &Map<String, Value>,
    ) -> Result<(), Error> {
        let addr = self
            .address_of(device_id)
            .ok_or_else(|| Error::NotDiscovered {
                device_id: device_id.to_owned(),
            })?;

        let url = format!("http://{addr}/zeroconf/{cmd}");
        debug!(device = device_id, "POST {}", url);

        let resp = self
            .http
            .post(&url)
            .json(&json!({ "deviceid": device_id, "data": params }))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::Timeout {
                        timeout_secs: self.timeout_secs,
                    }
                } else {
                    Error::Transport(e)
                }
            })?
            .error_for_status()?;

        let body = resp.text().await?;
        let answer: LocalResponse =
            serde_json::from_str(&body).map_err(|e| Error::Deserialization {
                message: e.to_string(),
                body,
            })?;

        if answer.error != 0 {
            return Err(Error::LocalRejected {
                device_id: device_id.to_owned(),
                code: answer.error,
            });
        }
        Ok(())
    }
}

impl Drop for LocalClient {
    fn drop(&mut self) {
        self.stop();
    }
}

fn record(addresses: &AddressTable, announcement: Announcement) {
    trace!(device = %announcement.device_id, addr = %announcement.addr, "device announced");
    addresses
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .insert(announcement.device_id, announcement.addr);
}
