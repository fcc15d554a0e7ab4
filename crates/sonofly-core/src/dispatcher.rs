// ── Command dispatcher ──
//
// Host-facing command entry point. Resolves a raw identifier to the
// Registry that owns it, or to the camera sub-transport for short ids.

use std::sync::Arc;

use dashmap::DashMap;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::error::CoreError;
use crate::model::{AccountId, DeviceId, DeviceKind, Params};
use crate::registry::{Registry, Route};
use crate::transport::CameraTransport;

/// Active registries, keyed by account.
pub type RegistryMap = Arc<DashMap<AccountId, Arc<Registry>>>;

/// A raw command as the host receives it: `{device, cmd?, ...params}`.
#[derive(Debug, Clone, Deserialize)]
pub struct RawCommand {
    /// Target identifier; numbers are accepted and stringified.
    pub device: Value,
    #[serde(flatten)]
    pub params: Params,
}

impl RawCommand {
    pub fn device_id(&self) -> String {
        match self.device {
            Value::String(ref s) => s.clone(),
            ref other => other.to_string(),
        }
    }
}

/// Where a dispatched command ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatched {
    Device { account: AccountId, route: Route },
    Camera,
}

/// Routes commands across every active Registry and the camera transport.
#[derive(Clone)]
pub struct CommandDispatcher {
    registries: RegistryMap,
    cameras: Arc<dyn CameraTransport>,
}

impl CommandDispatcher {
    pub fn new(registries: RegistryMap, cameras: Arc<dyn CameraTransport>) -> Self {
        Self {
            registries,
            cameras,
        }
    }

    /// Registry whose directory holds `id`.
    pub fn owner_of(&self, id: &DeviceId) -> Option<Arc<Registry>> {
        self.registries
            .iter()
            .find(|entry| entry.value().contains(id))
            .map(|entry| Arc::clone(entry.value()))
    }

    pub async fn dispatch(&self, raw_id: &str, payload: Params) -> Result<Dispatched, CoreError> {
        let id = DeviceId::from(raw_id);
        match id.kind() {
            DeviceKind::Standard => {
                let registry = self.owner_of(&id).ok_or_else(|| CoreError::UnknownDevice {
                    device_id: raw_id.to_owned(),
                })?;
                let route = registry.send(&id, &payload).await?;
                debug!(device = %id, account = %registry.account(), %route, "command delivered");
                Ok(Dispatched::Device {
                    account: registry.account().clone(),
                    route,
                })
            }
            DeviceKind::Camera => {
                let cmd = payload
                    .get("cmd")
                    .and_then(Value::as_str)
                    .ok_or_else(|| CoreError::InvalidCommand {
                        message: format!("camera {raw_id} needs a 'cmd' string"),
                    })?;
                self.cameras.send(raw_id, cmd).await?;
                Ok(Dispatched::Camera)
            }
            DeviceKind::Invalid => Err(CoreError::InvalidDeviceIdentifier {
                identifier: raw_id.to_owned(),
            }),
        }
    }

    /// Host entry point: failures are logged, never returned.
    pub async fn handle(&self, command: RawCommand) -> Option<Dispatched> {
        let raw_id = command.device_id();
        match self.dispatch(&raw_id, command.params).await {
            Ok(done) => Some(done),
            Err(e) if e.is_caller_error() => {
                error!(device = %raw_id, error = %e, "command dropped");
                None
            }
            Err(e) => {
                warn!(device = %raw_id, error = %e, "command failed");
                None
            }
        }
    }
}
