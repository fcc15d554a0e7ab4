// ── Transport contracts ──
//
// The orchestration layer talks to transports only through these traits.
// `sonofly_api` clients implement them; tests substitute mocks.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use secrecy::SecretString;
use sonofly_api::websocket::DeviceUpdate;
use sonofly_api::{CameraClient, CloudClient, DiscoveryHandle, LocalClient, TransportConfig};
use tokio::sync::broadcast;
use url::Url;

use crate::error::CoreError;
use crate::model::{Account, Device, DeviceId, Params};

/// Default LAN command when the payload names none.
pub const DEFAULT_LOCAL_COMMAND: &str = "switch";

/// Authenticated cloud relay.
#[async_trait]
pub trait CloudTransport: Send + Sync {
    /// Log in, keeping the token on success.
    async fn login(&self, username: &str, password: &SecretString) -> Result<(), CoreError>;

    /// Enumerate the account's devices. Requires a prior login.
    async fn get_devices(&self) -> Result<Vec<Device>, CoreError>;

    /// The `auth` lifecycle flag.
    fn has_auth(&self) -> bool;

    /// Open the long-lived session. Requires a prior login.
    fn start(&self) -> Result<(), CoreError>;

    async fn send(&self, device: &Device, payload: &Params) -> Result<(), CoreError>;

    /// Device state pushed by the cloud session.
    fn subscribe(&self) -> broadcast::Receiver<Arc<DeviceUpdate>>;

    /// Close the session. Idempotent.
    fn stop(&self);
}

/// Direct LAN delivery to discovered devices.
#[async_trait]
pub trait LocalTransport: Send + Sync {
    fn start(&self, discovery: Arc<dyn DiscoveryHandle>);

    fn is_reachable(&self, device: &DeviceId) -> bool;

    async fn send(&self, device: &Device, payload: &Params) -> Result<(), CoreError>;

    /// Release discovery resources. Idempotent.
    fn stop(&self);
}

/// Camera-class sub-transport, keyed by 6-character identifiers.
#[async_trait]
pub trait CameraTransport: Send + Sync {
    async fn send(&self, camera_id: &str, cmd: &str) -> Result<(), CoreError>;
}

/// Split a command payload into its LAN command name and parameters.
///
/// An explicit `cmd` wins; a `switches` array implies the multi-channel
/// endpoint; everything else goes to [`DEFAULT_LOCAL_COMMAND`].
pub fn split_command(payload: &Params) -> (String, Params) {
    let mut params = payload.clone();
    let cmd = match params.remove("cmd") {
        Some(serde_json::Value::String(cmd)) => cmd,
        _ if params.contains_key("switches") => "switches".to_owned(),
        _ => DEFAULT_LOCAL_COMMAND.to_owned(),
    };
    (cmd, params)
}

// ── sonofly_api implementations ─────────────────────────────────────

#[async_trait]
impl CloudTransport for CloudClient {
    async fn login(&self, username: &str, password: &SecretString) -> Result<(), CoreError> {
        CloudClient::login(self, username, password).await?;
        Ok(())
    }

    async fn get_devices(&self) -> Result<Vec<Device>, CoreError> {
        let devices = CloudClient::get_devices(self).await?;
        Ok(devices.into_iter().map(Device::from).collect())
    }

    fn has_auth(&self) -> bool {
        CloudClient::has_auth(self)
    }

    fn start(&self) -> Result<(), CoreError> {
        CloudClient::start(self)?;
        Ok(())
    }

    async fn send(&self, device: &Device, payload: &Params) -> Result<(), CoreError> {
        let (_, params) = split_command(payload);
        self.send_params(device.id.as_str(), &params).await?;
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<Arc<DeviceUpdate>> {
        CloudClient::subscribe(self)
    }

    fn stop(&self) {
        CloudClient::stop(self);
    }
}

#[async_trait]
impl LocalTransport for LocalClient {
    fn start(&self, discovery: Arc<dyn DiscoveryHandle>) {
        LocalClient::start(self, discovery);
    }

    fn is_reachable(&self, device: &DeviceId) -> bool {
        LocalClient::is_reachable(self, device.as_str())
    }

    async fn send(&self, device: &Device, payload: &Params) -> Result<(), CoreError> {
        let (cmd, params) = split_command(payload);
        LocalClient::send(self, device.id.as_str(), &cmd, &params).await?;
        Ok(())
    }

    fn stop(&self) {
        LocalClient::stop(self);
    }
}

#[async_trait]
impl CameraTransport for CameraClient {
    async fn send(&self, camera_id: &str, cmd: &str) -> Result<(), CoreError> {
        CameraClient::send(self, camera_id, cmd).await?;
        Ok(())
    }
}

// ── Factory ─────────────────────────────────────────────────────────

/// Builds the transports for one account.
pub trait TransportFactory: Send + Sync {
    fn cloud(&self, account: &Account) -> Result<Arc<dyn CloudTransport>, CoreError>;
    fn local(&self, account: &Account) -> Result<Arc<dyn LocalTransport>, CoreError>;
}

/// Factory producing the real `sonofly_api` clients.
#[derive(Debug, Clone, Default)]
pub struct ClientFactory {
    transport: TransportConfig,
    /// Fixed cloud base URL instead of the account's region host.
    cloud_url: Option<Url>,
}

impl ClientFactory {
    pub fn new(transport: TransportConfig) -> Self {
        Self {
            transport,
            cloud_url: None,
        }
    }

    pub fn with_cloud_url(mut self, url: Url) -> Self {
        self.cloud_url = Some(url);
        self
    }
}

impl TransportFactory for ClientFactory {
    fn cloud(&self, account: &Account) -> Result<Arc<dyn CloudTransport>, CoreError> {
        let client = match self.cloud_url {
            Some(ref url) => CloudClient::with_base_url(url.clone(), &self.transport)?,
            None => CloudClient::new(account.region, &self.transport)?,
        };
        Ok(Arc::new(client))
    }

    fn local(&self, _account: &Account) -> Result<Arc<dyn LocalTransport>, CoreError> {
        Ok(Arc::new(LocalClient::new(&self.transport)?))
    }
}

/// Camera sub-transport over the configured camera hosts.
pub fn camera_transport(hosts: HashMap<String, SocketAddr>) -> Arc<dyn CameraTransport> {
    Arc::new(CameraClient::new(hosts))
}
