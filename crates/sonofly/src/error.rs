//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use sonofly_config::ConfigError;
use sonofly_core::CoreError;

pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const CONNECTION: i32 = 7;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Configuration ────────────────────────────────────────────────
    #[error("No accounts configured")]
    #[diagnostic(
        code(sonofly::no_accounts),
        help(
            "Add an [accounts.<name>] table with a username to {path}\n\
             or place a legacy.yaml next to it and run: sonofly config import"
        )
    )]
    NoAccounts { path: String },

    #[error("Account '{name}' not found in configuration")]
    #[diagnostic(code(sonofly::unknown_account), help("Configured accounts: {available}"))]
    UnknownAccount { name: String, available: String },

    #[error(transparent)]
    #[diagnostic(code(sonofly::config))]
    Config(#[from] ConfigError),

    // ── Authentication / connectivity ────────────────────────────────
    #[error("Cloud login rejected")]
    #[diagnostic(
        code(sonofly::auth_failed),
        help(
            "{message}\n\
             Update the password with: sonofly config set-password <account>"
        )
    )]
    AuthFailed { message: String },

    #[error("Cloud unreachable: {message}")]
    #[diagnostic(
        code(sonofly::connection_failed),
        help("Check network access, or use mode = \"local\" for LAN-only control.")
    )]
    Connection { message: String },

    #[error("Device '{device}' is not reachable")]
    #[diagnostic(
        code(sonofly::unreachable),
        help("The device was not announced on the LAN and the cloud session is down.")
    )]
    Unreachable { device: String },

    // ── Resources ────────────────────────────────────────────────────
    #[error("{resource_type} '{identifier}' not found")]
    #[diagnostic(
        code(sonofly::not_found),
        help("Run: sonofly {list_command} to see what is available")
    )]
    NotFound {
        resource_type: String,
        identifier: String,
        list_command: String,
    },

    #[error("Invalid device identifier '{identifier}'")]
    #[diagnostic(
        code(sonofly::invalid_identifier),
        help("Devices use 10-character ids, cameras 6-character ids.")
    )]
    InvalidIdentifier { identifier: String },

    // ── API ──────────────────────────────────────────────────────────
    #[error("API error ({code}): {message}")]
    #[diagnostic(code(sonofly::api_error))]
    ApiError { code: String, message: String },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(sonofly::validation))]
    Validation { field: String, reason: String },

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON payload: {0}")]
    #[diagnostic(code(sonofly::json), help("Pass a JSON object, e.g. '{{\"switch\":\"on\"}}'."))]
    Json(#[from] serde_json::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::AuthFailed { .. } => exit_code::AUTH,
            Self::Connection { .. } | Self::Unreachable { .. } => exit_code::CONNECTION,
            Self::NotFound { .. } | Self::UnknownAccount { .. } => exit_code::NOT_FOUND,
            Self::InvalidIdentifier { .. } | Self::Validation { .. } | Self::Json(_) => {
                exit_code::USAGE
            }
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InvalidCredentials { message } => CliError::AuthFailed { message },

            CoreError::TransientConnectivity { message } => CliError::Connection { message },

            CoreError::UnknownDevice { device_id } => CliError::NotFound {
                resource_type: "device".into(),
                identifier: device_id,
                list_command: "devices".into(),
            },

            CoreError::UnknownCamera { camera_id } => CliError::NotFound {
                resource_type: "camera".into(),
                identifier: camera_id,
                list_command: "config show".into(),
            },

            CoreError::InvalidDeviceIdentifier { identifier } => {
                CliError::InvalidIdentifier { identifier }
            }

            CoreError::InvalidCommand { message } => CliError::Validation {
                field: "command".into(),
                reason: message,
            },

            CoreError::DeviceUnreachable { device_id } => CliError::Unreachable { device: device_id },

            CoreError::Api { message, code } => CliError::ApiError {
                code: code.map_or_else(|| "unknown".into(), |c| c.to_string()),
                message,
            },

            CoreError::CacheUnavailable { key, reason } => CliError::ApiError {
                code: "cache".into(),
                message: format!("{key}: {reason}"),
            },

            CoreError::Storage { message } | CoreError::Internal(message) => CliError::ApiError {
                code: "internal".into(),
                message,
            },

            CoreError::Config { message } => CliError::Validation {
                field: "config".into(),
                reason: message,
            },
        }
    }
}
