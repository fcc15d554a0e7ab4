use std::fmt;
use std::str::FromStr;

use secrecy::SecretString;

/// Cloud region an account is homed in.
///
/// Determines the API host. Logging in against the wrong region yields a
/// redirect carrying the correct one, which the cloud client follows once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CloudRegion {
    Cn,
    As,
    #[default]
    Us,
    Eu,
}

impl CloudRegion {
    /// Region code as used in host names (`"eu"`, `"us"`, ...).
    pub fn code(self) -> &'static str {
        match self {
            Self::Cn => "cn",
            Self::As => "as",
            Self::Us => "us",
            Self::Eu => "eu",
        }
    }

    /// Base URL of the REST API for this region.
    pub fn api_url(self) -> String {
        match self {
            Self::Cn => "https://cn-apia.coolkit.cn".into(),
            other => format!("https://{}-apia.coolkit.cc", other.code()),
        }
    }

    /// Base URL of the WebSocket dispatch service for this region.
    pub fn dispatch_url(self) -> String {
        match self {
            Self::Cn => "https://cn-dispa.coolkit.cn".into(),
            other => format!("https://{}-dispa.coolkit.cc", other.code()),
        }
    }
}

impl fmt::Display for CloudRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for CloudRegion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cn" => Ok(Self::Cn),
            "as" => Ok(Self::As),
            "us" => Ok(Self::Us),
            "eu" => Ok(Self::Eu),
            other => Err(format!("unknown cloud region '{other}'")),
        }
    }
}

/// Authentication material held after a successful cloud login.
///
/// Its presence is the `auth` lifecycle flag: a cloud client with no
/// `CloudAuth` has never logged in (or was logged out).
#[derive(Debug, Clone)]
pub struct CloudAuth {
    /// Bearer token for REST calls and the WebSocket handshake.
    pub access_token: SecretString,
    /// Per-user API key, echoed in the WebSocket handshake.
    pub api_key: String,
    /// Region the session was established in.
    pub region: CloudRegion,
}
