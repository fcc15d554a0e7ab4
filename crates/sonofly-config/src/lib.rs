//! Configuration for sonofly.
//!
//! TOML file plus `SONOFLY_` environment, credential resolution (env var,
//! keyring, plaintext), and translation into `sonofly_core` runtime types.
//! A one-shot import picks up a legacy YAML account when nothing is
//! configured yet.

use std::collections::{BTreeMap, HashMap};
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use sonofly_api::{Announcement, CloudRegion, TransportConfig};
use sonofly_core::{Account, DeviceId, DeviceOverride, HubConfig, Mode};

/// Keyring service name.
pub const KEYRING_SERVICE: &str = "sonofly";

/// Port devices listen on for LAN commands.
pub const DEFAULT_LAN_PORT: u16 = 8081;

/// UDP port cameras accept commands on.
pub const DEFAULT_CAMERA_PORT: u16 = 32108;

const LEGACY_FILE: &str = "legacy.yaml";
const LEGACY_ACCOUNT: &str = "default";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("account '{0}' is not configured")]
    UnknownAccount(String),

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

fn invalid(field: impl Into<String>, reason: impl Into<String>) -> ConfigError {
    ConfigError::Validation {
        field: field.into(),
        reason: reason.into(),
    }
}

// ── TOML config structs ─────────────────────────────────────────────

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub defaults: Defaults,

    /// Named eWeLink accounts.
    #[serde(default)]
    pub accounts: BTreeMap<String, AccountEntry>,

    /// Per-device overrides, keyed by device id.
    #[serde(default)]
    pub devices: BTreeMap<String, DeviceEntry>,

    /// Camera hosts, keyed by 6-character camera id.
    #[serde(default)]
    pub cameras: BTreeMap<String, CameraEntry>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Defaults {
    /// HTTP timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Device cache root. Platform cache dir when unset.
    pub cache_dir: Option<PathBuf>,

    #[serde(default = "default_retry_initial")]
    pub retry_initial_secs: u64,

    #[serde(default = "default_retry_max")]
    pub retry_max_secs: u64,

    /// Fixed cloud API URL instead of the regional hosts.
    pub cloud_url: Option<String>,

    /// Look passwords up in the system keyring.
    #[serde(default = "default_true")]
    pub use_keyring: bool,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
            cache_dir: None,
            retry_initial_secs: default_retry_initial(),
            retry_max_secs: default_retry_max(),
            cloud_url: None,
            use_keyring: true,
        }
    }
}

fn default_timeout() -> u64 {
    30
}
fn default_retry_initial() -> u64 {
    30
}
fn default_retry_max() -> u64 {
    300
}
fn default_true() -> bool {
    true
}

/// One `[accounts.<name>]` table.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AccountEntry {
    /// Email, or phone number with a leading `+`.
    pub username: String,

    /// Plaintext password (prefer keyring or `password_env`).
    pub password: Option<String>,

    /// Environment variable holding the password.
    pub password_env: Option<String>,

    #[serde(default)]
    pub mode: Mode,

    /// Cloud region hint: cn, as, us or eu.
    pub region: Option<String>,

    #[serde(default)]
    pub debug: bool,
}

/// One `[devices.<id>]` table.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DeviceEntry {
    pub name: Option<String>,
    pub device_class: Option<String>,
    pub devicekey: Option<String>,
    /// Static LAN address, `ip` or `ip:port`.
    pub host: Option<String>,
}

/// One `[cameras.<id>]` table.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CameraEntry {
    /// `ip` or `ip:port`.
    pub host: String,
}

// ── Paths ───────────────────────────────────────────────────────────

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("io", "sonofly", "sonofly")
}

fn home_fallback(kind: &str) -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(kind);
    p.push("sonofly");
    p
}

/// Directory holding `config.toml` and `legacy.yaml`.
pub fn config_dir() -> PathBuf {
    project_dirs().map_or_else(
        || home_fallback(".config"),
        |dirs| dirs.config_dir().to_path_buf(),
    )
}

pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

pub fn legacy_path() -> PathBuf {
    config_dir().join(LEGACY_FILE)
}

fn default_cache_dir() -> PathBuf {
    project_dirs().map_or_else(
        || home_fallback(".cache"),
        |dirs| dirs.cache_dir().to_path_buf(),
    )
}

// ── Loading and saving ──────────────────────────────────────────────

/// Load the config from the canonical path plus environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load `path` merged with `SONOFLY_` environment variables.
///
/// Nested keys use a double underscore: `SONOFLY_DEFAULTS__TIMEOUT=10`.
/// A missing file yields the defaults.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let config = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("SONOFLY_").split("__"))
        .extract()?;
    Ok(config)
}

pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Credential resolution ───────────────────────────────────────────

/// Password for an account: `password_env`, then keyring, then plaintext.
///
/// `None` is valid; a local-only account needs no password.
pub fn resolve_password(cfg: &Config, name: &str, entry: &AccountEntry) -> Option<SecretString> {
    if let Some(ref env_name) = entry.password_env {
        if let Ok(val) = std::env::var(env_name) {
            return Some(SecretString::from(val));
        }
        debug!(account = name, env = %env_name, "password variable not set");
    }

    if cfg.defaults.use_keyring {
        if let Ok(keyring_entry) = keyring::Entry::new(KEYRING_SERVICE, &format!("{name}/password"))
        {
            if let Ok(pw) = keyring_entry.get_password() {
                return Some(SecretString::from(pw));
            }
        }
    }

    entry.password.clone().map(SecretString::from)
}

/// Store a password in the system keyring.
pub fn store_password(name: &str, password: &str) -> Result<(), ConfigError> {
    keyring::Entry::new(KEYRING_SERVICE, &format!("{name}/password"))
        .and_then(|entry| entry.set_password(password))
        .map_err(|e| invalid("keyring", e.to_string()))
}

// ── Translation to runtime types ────────────────────────────────────

fn account_from_entry(cfg: &Config, name: &str, entry: &AccountEntry) -> Result<Account, ConfigError> {
    if entry.username.trim().is_empty() {
        return Err(invalid(
            format!("accounts.{name}.username"),
            "must not be empty",
        ));
    }
    let region = match entry.region {
        Some(ref region) => region
            .parse::<CloudRegion>()
            .map_err(|reason| invalid(format!("accounts.{name}.region"), reason))?,
        None => CloudRegion::default(),
    };

    let mut account = Account::new(entry.username.clone()).with_mode(entry.mode);
    account.password = resolve_password(cfg, name, entry);
    account.region = region;
    account.debug = entry.debug;
    Ok(account)
}

/// One configured account, by its config name.
pub fn resolve_account(cfg: &Config, name: &str) -> Result<Account, ConfigError> {
    let entry = cfg
        .accounts
        .get(name)
        .ok_or_else(|| ConfigError::UnknownAccount(name.into()))?;
    account_from_entry(cfg, name, entry)
}

/// Every configured account, in config-name order.
pub fn resolve_accounts(cfg: &Config) -> Result<Vec<Account>, ConfigError> {
    cfg.accounts
        .iter()
        .map(|(name, entry)| account_from_entry(cfg, name, entry))
        .collect()
}

pub fn device_overrides(cfg: &Config) -> HashMap<DeviceId, DeviceOverride> {
    cfg.devices
        .iter()
        .map(|(id, entry)| {
            let over = DeviceOverride {
                name: entry.name.clone(),
                device_class: entry.device_class.clone(),
                device_key: entry.devicekey.clone(),
            };
            (DeviceId::from(id.as_str()), over)
        })
        .collect()
}

/// Parse `ip` or `ip:port`.
pub fn parse_host(host: &str, default_port: u16) -> Option<SocketAddr> {
    let host = host.trim();
    host.parse::<SocketAddr>().ok().or_else(|| {
        host.parse::<IpAddr>()
            .ok()
            .map(|ip| SocketAddr::new(ip, default_port))
    })
}

/// LAN announcements for devices with a static `host`.
pub fn static_announcements(cfg: &Config) -> Result<Vec<Announcement>, ConfigError> {
    cfg.devices
        .iter()
        .filter_map(|(id, entry)| entry.host.as_deref().map(|host| (id, host)))
        .map(|(id, host)| -> Result<Announcement, ConfigError> {
            let addr = parse_host(host, DEFAULT_LAN_PORT)
                .ok_or_else(|| invalid(format!("devices.{id}.host"), format!("bad address '{host}'")))?;
            Ok(Announcement {
                device_id: id.clone(),
                addr,
            })
        })
        .collect()
}

pub fn camera_hosts(cfg: &Config) -> Result<HashMap<String, SocketAddr>, ConfigError> {
    cfg.cameras
        .iter()
        .map(|(id, entry)| -> Result<(String, SocketAddr), ConfigError> {
            let addr = parse_host(&entry.host, DEFAULT_CAMERA_PORT).ok_or_else(|| {
                invalid(format!("cameras.{id}.host"), format!("bad address '{}'", entry.host))
            })?;
            Ok((id.clone(), addr))
        })
        .collect()
}

pub fn hub_config(cfg: &Config) -> HubConfig {
    let initial = cfg.defaults.retry_initial_secs.max(1);
    HubConfig {
        retry_initial: Duration::from_secs(initial),
        retry_max: Duration::from_secs(cfg.defaults.retry_max_secs.max(initial)),
        overrides: device_overrides(cfg),
    }
}

pub fn transport_config(cfg: &Config) -> TransportConfig {
    TransportConfig {
        timeout: Duration::from_secs(cfg.defaults.timeout),
        ..TransportConfig::default()
    }
}

pub fn cloud_url(cfg: &Config) -> Result<Option<url::Url>, ConfigError> {
    cfg.defaults
        .cloud_url
        .as_deref()
        .map(|raw| {
            raw.parse()
                .map_err(|_| invalid("defaults.cloud_url", format!("invalid URL: {raw}")))
        })
        .transpose()
}

pub fn cache_dir(cfg: &Config) -> PathBuf {
    cfg.defaults.cache_dir.clone().unwrap_or_else(default_cache_dir)
}

// ── Legacy import ───────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct LegacyAccount {
    username: String,
    password: Option<String>,
    #[serde(default)]
    mode: Mode,
    #[serde(default)]
    debug: bool,
}

/// Import the account from a legacy YAML file into an empty config.
///
/// Runs only when no account is configured. A missing or unreadable file
/// is logged and ignored. Returns whether an account was imported.
pub fn import_legacy_yaml(cfg: &mut Config, path: &Path) -> bool {
    if !cfg.accounts.is_empty() {
        return false;
    }
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "no legacy config to import");
            return false;
        }
    };
    let legacy: LegacyAccount = match serde_yaml::from_str(&raw) {
        Ok(legacy) => legacy,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "legacy config ignored");
            return false;
        }
    };

    cfg.accounts.insert(
        LEGACY_ACCOUNT.into(),
        AccountEntry {
            username: legacy.username,
            password: legacy.password,
            mode: legacy.mode,
            debug: legacy.debug,
            ..AccountEntry::default()
        },
    );
    debug!(path = %path.display(), "legacy account imported");
    true
}
