// ── Device domain types ──

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::device_id::DeviceId;

/// Opaque device parameter map (`{"switch": "on", ...}`).
pub type Params = Map<String, Value>;

/// A controllable device.
///
/// Serialized with the vendor field names so cached lists stay readable
/// by anything that understands the cloud's device JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    #[serde(rename = "deviceid")]
    pub id: DeviceId,

    #[serde(default)]
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_class: Option<String>,

    /// Key for LAN payload encryption.
    #[serde(default, rename = "devicekey", skip_serializing_if = "Option::is_none")]
    pub device_key: Option<String>,

    #[serde(default, rename = "productModel", skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(default)]
    pub online: bool,

    #[serde(default)]
    pub params: Params,
}

impl Device {
    pub fn new(id: impl Into<DeviceId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            device_class: None,
            device_key: None,
            model: None,
            online: false,
            params: Params::new(),
        }
    }

    /// Merge reported parameters into the current state.
    pub fn merge_params(&mut self, params: &Params) {
        for (key, value) in params {
            self.params.insert(key.clone(), value.clone());
        }
    }
}

/// User-configured overrides applied when a device enters a Registry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceOverride {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub device_class: Option<String>,
    #[serde(default, alias = "devicekey")]
    pub device_key: Option<String>,
}

impl DeviceOverride {
    pub fn apply(&self, device: &mut Device) {
        if let Some(ref name) = self.name {
            device.name.clone_from(name);
        }
        if self.device_class.is_some() {
            device.device_class.clone_from(&self.device_class);
        }
        if self.device_key.is_some() {
            device.device_key.clone_from(&self.device_key);
        }
    }
}
