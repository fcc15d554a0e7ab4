// ── Core error types ──
//
// Domain errors from sonofly-core. Callers never see HTTP status codes or
// cloud envelope codes directly: the `From<sonofly_api::Error>` impl folds
// transport failures into the orchestration taxonomy.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Login ────────────────────────────────────────────────────────
    /// Credentials were rejected. Not retryable until the user supplies
    /// new ones.
    #[error("Invalid credentials: {message}")]
    InvalidCredentials { message: String },

    /// Network trouble, timeouts, cloud outages. Worth retrying later.
    #[error("Cloud unreachable: {message}")]
    TransientConnectivity { message: String },

    // ── Command routing ──────────────────────────────────────────────
    #[error("Unknown device: {device_id}")]
    UnknownDevice { device_id: String },

    #[error("Unknown camera: {camera_id}")]
    UnknownCamera { camera_id: String },

    #[error("Invalid device identifier '{identifier}' (expected 10 or 6 characters)")]
    InvalidDeviceIdentifier { identifier: String },

    #[error("Invalid command: {message}")]
    InvalidCommand { message: String },

    /// The device is known but no started transport can reach it.
    #[error("Device {device_id} is not reachable through any transport")]
    DeviceUnreachable { device_id: String },

    // ── Persistence ──────────────────────────────────────────────────
    /// The cached device list could not be used. Setup proceeds without it.
    #[error("Device cache '{key}' unavailable: {reason}")]
    CacheUnavailable { key: String, reason: String },

    #[error("Storage error: {message}")]
    Storage { message: String },

    // ── Wrapped transport errors ─────────────────────────────────────
    #[error("API error: {message}")]
    Api {
        message: String,
        /// Cloud envelope error code, if any.
        code: Option<i64>,
    },

    // ── Configuration / internal ─────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Returns `true` for failures the host should retry later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientConnectivity { .. })
    }

    /// Returns `true` for caller errors that are logged and dropped.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            Self::UnknownDevice { .. }
                | Self::UnknownCamera { .. }
                | Self::InvalidDeviceIdentifier { .. }
                | Self::InvalidCommand { .. }
        )
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<sonofly_api::Error> for CoreError {
    fn from(err: sonofly_api::Error) -> Self {
        use sonofly_api::Error as ApiError;

        if err.is_auth_failure() {
            return CoreError::InvalidCredentials {
                message: err.to_string(),
            };
        }
        if err.is_transient() {
            return CoreError::TransientConnectivity {
                message: err.to_string(),
            };
        }

        match err {
            ApiError::UnknownCamera(camera_id) => CoreError::UnknownCamera { camera_id },
            ApiError::NotDiscovered { device_id } => CoreError::DeviceUnreachable { device_id },
            // A stale session or region mix-up clears on the next login attempt.
            ApiError::SessionExpired | ApiError::NotAuthenticated | ApiError::WrongRegion { .. } => {
                CoreError::TransientConnectivity {
                    message: err.to_string(),
                }
            }
            ApiError::CloudApi { code, message } => CoreError::Api {
                message,
                code: Some(code),
            },
            other => CoreError::Api {
                message: other.to_string(),
                code: None,
            },
        }
    }
}
