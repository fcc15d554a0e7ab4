// Cloud API wire types
//
// Every REST response is wrapped in `{ "error": <code>, "msg": "...",
// "data": {...} }`. The client strips the envelope before callers see it.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Envelope wrapping every cloud REST response.
#[derive(Debug, Deserialize)]
pub struct CloudResponse<T> {
    pub error: i64,
    #[serde(default)]
    pub msg: Option<String>,
    pub data: Option<T>,
}

/// `data` of a successful `POST /v2/user/login`.
#[derive(Debug, Deserialize)]
pub struct LoginData {
    /// Access token.
    pub at: String,
    pub user: LoginUser,
    #[serde(default)]
    pub region: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginUser {
    pub apikey: String,
}

/// `data` of a region redirect (error code [`ERR_WRONG_REGION`]).
#[derive(Debug, Deserialize)]
pub struct RegionRedirect {
    pub region: String,
}

/// `data` of `GET /v2/device/thing`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThingList {
    #[serde(default)]
    pub thing_list: Vec<ThingItem>,
}

/// One entry of the thing list. Item types 1 and 2 are devices (own and
/// shared); 3 is a group and is skipped.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThingItem {
    pub item_type: u8,
    pub item_data: Value,
}

impl ThingItem {
    pub fn is_device(&self) -> bool {
        matches!(self.item_type, 1 | 2)
    }
}

/// A device as reported by the cloud.
///
/// Only the fields the orchestration layer needs are typed; everything
/// else is kept in `extra` so nothing the cloud sends is dropped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudDevice {
    pub deviceid: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub devicekey: Option<String>,
    #[serde(default, rename = "productModel")]
    pub product_model: Option<String>,
    #[serde(default)]
    pub online: bool,
    #[serde(default)]
    pub params: Map<String, Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Envelope answered by the WebSocket dispatch service.
#[derive(Debug, Deserialize)]
pub struct DispatchResponse {
    pub error: i64,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
}

/// Cloud error code for "account belongs to another region".
pub const ERR_WRONG_REGION: i64 = 10004;

/// Cloud error codes that mean the credentials themselves were rejected.
pub const AUTH_ERROR_CODES: &[i64] = &[401, 10001, 10011, 10014];
