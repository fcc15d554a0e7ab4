// Cloud device endpoints
//
// Device enumeration (`GET /v2/device/thing`) and state updates
// (`POST /v2/device/thing/status`).

use serde_json::{Map, Value, json};
use tracing::{debug, warn};

use crate::cloud::client::CloudClient;
use crate::cloud::models::{CloudDevice, ThingList};
use crate::error::Error;

impl CloudClient {
    /// List every device visible to the account (own and shared).
    ///
    /// Groups are skipped, as are entries that do not parse as devices.
    pub async fn get_devices(&self) -> Result<Vec<CloudDevice>, Error> {
        let mut url = self.url("/v2/device/thing")?;
        url.query_pairs_mut().append_pair("num", "0");

        let list: ThingList = self.get(url).await?;
        let devices: Vec<CloudDevice> = list
            .thing_list
            .into_iter()
            .filter(|item| item.is_device())
            .filter_map(|item| match serde_json::from_value(item.item_data) {
                Ok(device) => Some(device),
                Err(e) => {
                    warn!(error = %e, "skipping malformed cloud device entry");
                    None
                }
            })
            .collect();

        debug!(count = devices.len(), "fetched cloud devices");
        Ok(devices)
    }

    /// Push new parameters to a device through the cloud relay.
    pub async fn send_params(&self, device_id: &str, params: &Map<String, Value>) -> Result<(), Error> {
        let url = self.url("/v2/device/thing/status")?;
        let body = json!({
            "type": 1,
            "id": device_id,
            "params": params,
        });
        self.post::<Value>(url, &body).await?;
        debug!(device = device_id, "cloud command delivered");
        Ok(())
    }
}
