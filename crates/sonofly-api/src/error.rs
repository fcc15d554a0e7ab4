use thiserror::Error;

/// Top-level error type for the `sonofly-api` crate.
///
/// Covers every failure mode across the three transports: cloud REST,
/// cloud WebSocket session, LAN delivery and the camera sub-transport.
/// `sonofly-core` folds these into the orchestration error taxonomy.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// Login rejected (wrong password, unknown account, locked user).
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    /// An authenticated call was made before `login()` succeeded.
    #[error("Not logged in to the cloud")]
    NotAuthenticated,

    /// Access token was revoked or expired.
    #[error("Session expired -- re-authentication required")]
    SessionExpired,

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Request timed out.
    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// The cloud throttled the request (HTTP 408 or 429).
    #[error("Cloud throttled the request (HTTP {status})")]
    Throttled { status: u16 },

    /// UDP / socket level failure (camera sub-transport).
    #[error("Socket error: {0}")]
    Io(#[from] std::io::Error),

    // ── Cloud API ───────────────────────────────────────────────────
    /// Non-zero `error` code in the cloud `{error, msg, data}` envelope.
    #[error("Cloud API error {code}: {message}")]
    CloudApi { code: i64, message: String },

    /// Cloud asked us to retry against another region.
    #[error("Account lives in region '{region}'")]
    WrongRegion { region: String },

    // ── WebSocket ───────────────────────────────────────────────────
    /// WebSocket connection failed.
    #[error("WebSocket connection failed: {0}")]
    WebSocketConnect(String),

    /// WebSocket closed unexpectedly.
    #[error("WebSocket closed (code {code}): {reason}")]
    WebSocketClosed { code: u16, reason: String },

    // ── LAN ─────────────────────────────────────────────────────────
    /// Device has not been announced on the local network.
    #[error("Device {device_id} is not reachable on the local network")]
    NotDiscovered { device_id: String },

    /// The device answered the LAN request with a non-zero error.
    #[error("Device {device_id} rejected local command (error {code})")]
    LocalRejected { device_id: String, code: i64 },

    // ── Camera ──────────────────────────────────────────────────────
    /// No camera with this short identifier is known.
    #[error("Unknown camera: {0}")]
    UnknownCamera(String),

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },
}

impl Error {
    /// Returns `true` if the credentials themselves were rejected.
    ///
    /// Such failures are not worth retrying until the user supplies
    /// new credentials.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Self::Authentication { .. })
    }

    /// Returns `true` if the session (not the password) has gone stale.
    pub fn is_auth_expired(&self) -> bool {
        matches!(self, Self::SessionExpired | Self::NotAuthenticated)
    }

    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => {
                e.is_timeout()
                    || e.is_connect()
                    || e.is_request()
                    || e.status().is_some_and(|s| s.is_server_error())
            }
            Self::Timeout { .. }
            | Self::Throttled { .. }
            | Self::WebSocketConnect(_)
            | Self::WebSocketClosed { .. }
            | Self::Io(_) => true,
            _ => false,
        }
    }

    /// Cloud error code, if the failure came from the cloud envelope.
    pub fn cloud_error_code(&self) -> Option<i64> {
        match self {
            Self::CloudApi { code, .. } => Some(*code),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_failure_is_not_transient() {
        let err = Error::Authentication {
            message: "wrong password".into(),
        };
        assert!(err.is_auth_failure());
        assert!(!err.is_transient());
    }

    #[test]
    fn timeouts_and_socket_errors_are_transient() {
        assert!(Error::Timeout { timeout_secs: 5 }.is_transient());
        assert!(Error::WebSocketConnect("refused".into()).is_transient());
        assert!(Error::Throttled { status: 429 }.is_transient());
        assert!(!Error::Throttled { status: 429 }.is_auth_failure());
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        assert!(Error::from(io).is_transient());
    }

    #[test]
    fn cloud_api_error_exposes_code() {
        let err = Error::CloudApi {
            code: 406,
            message: "bad sign".into(),
        };
        assert_eq!(err.cloud_error_code(), Some(406));
        assert!(!err.is_transient());
        assert!(!err.is_auth_failure());
    }
}
