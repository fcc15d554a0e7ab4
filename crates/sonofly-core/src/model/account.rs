// ── Account domain types ──

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use sonofly_api::CloudRegion;
use strum::{Display, EnumString};

use super::device_id::AccountId;

/// Which transports an account may use.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Mode {
    /// Cloud and LAN; falls back to the cached device list when the
    /// cloud is out of reach.
    #[default]
    Auto,
    /// Cloud only.
    Cloud,
    /// LAN only. The cloud is used, when credentials exist, just to
    /// refresh the device list.
    Local,
}

impl Mode {
    /// Cloud transport admissible (`auto`, `cloud`).
    pub fn uses_cloud(self) -> bool {
        !matches!(self, Self::Local)
    }

    /// LAN transport admissible (`auto`, `local`).
    pub fn uses_local(self) -> bool {
        !matches!(self, Self::Cloud)
    }
}

/// One configured set of credentials driving one Registry.
#[derive(Debug, Clone)]
pub struct Account {
    pub username: String,
    pub password: Option<SecretString>,
    pub mode: Mode,
    /// Region hint; the cloud redirects when wrong.
    pub region: CloudRegion,
    /// Raise this account's orchestration logging from `debug` to `info`.
    pub debug: bool,
}

impl Account {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: None,
            mode: Mode::default(),
            region: CloudRegion::default(),
            debug: false,
        }
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(SecretString::from(password.into()));
        self
    }

    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    pub fn id(&self) -> AccountId {
        AccountId::new(self.username.clone())
    }

    /// Both username and password are present.
    pub fn has_credentials(&self) -> bool {
        !self.username.is_empty() && self.password.is_some()
    }

    /// Same login identity (username and region).
    pub fn same_identity(&self, other: &Self) -> bool {
        self.username == other.username && self.region == other.region
    }
}
