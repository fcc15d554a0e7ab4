// ── API-to-domain type conversions ──
//
// Bridges raw `sonofly_api` response types into `sonofly_core::model`
// domain types.

use sonofly_api::CloudDevice;
use sonofly_api::websocket::DeviceUpdate;

use crate::model::{Device, DeviceId, Params};

impl From<CloudDevice> for Device {
    fn from(d: CloudDevice) -> Self {
        Device {
            id: DeviceId::from(d.deviceid),
            name: d.name,
            device_class: None,
            device_key: d.devicekey,
            model: d.product_model,
            online: d.online,
            params: d.params,
        }
    }
}

/// Online/offline flag carried by a `sysmsg` update, if any.
pub(crate) fn update_online(update: &DeviceUpdate) -> Option<bool> {
    if update.action != "sysmsg" {
        return None;
    }
    update.params.get("online").and_then(serde_json::Value::as_bool)
}

/// State parameters carried by an `update` frame, if any.
pub(crate) fn update_params(update: &DeviceUpdate) -> Option<&Params> {
    (update.action == "update").then_some(&update.params)
}
