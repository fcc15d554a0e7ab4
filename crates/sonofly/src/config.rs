//! CLI configuration: thin wrapper around `sonofly_config`.
//!
//! Adds `GlobalOpts` overrides (--config, --account, --timeout) and builds
//! the runtime `Hub` from a loaded config.

use std::path::PathBuf;
use std::sync::Arc;

use sonofly_api::StaticDiscovery;
use sonofly_core::{Account, ClientFactory, DeviceCache, FileStorage, Hub, camera_transport};

use crate::cli::GlobalOpts;
use crate::error::CliError;

pub use sonofly_config::Config;

/// Config file in effect: `--config` or the platform default.
pub fn config_file(global: &GlobalOpts) -> PathBuf {
    global
        .config
        .clone()
        .unwrap_or_else(sonofly_config::config_path)
}

/// Legacy YAML file next to the config file in effect.
pub fn legacy_file(global: &GlobalOpts) -> PathBuf {
    match global.config {
        Some(ref path) => path.with_file_name("legacy.yaml"),
        None => sonofly_config::legacy_path(),
    }
}

pub fn load(global: &GlobalOpts) -> Result<Config, CliError> {
    let mut cfg = sonofly_config::load_config_from(&config_file(global))?;
    if let Some(timeout) = global.timeout {
        cfg.defaults.timeout = timeout;
    }
    Ok(cfg)
}

/// Config names of the accounts this invocation works on.
pub fn selected_names(cfg: &Config, global: &GlobalOpts) -> Result<Vec<String>, CliError> {
    if cfg.accounts.is_empty() {
        return Err(CliError::NoAccounts {
            path: config_file(global).display().to_string(),
        });
    }
    match global.account {
        Some(ref name) if cfg.accounts.contains_key(name) => Ok(vec![name.clone()]),
        Some(ref name) => Err(CliError::UnknownAccount {
            name: name.clone(),
            available: cfg.accounts.keys().cloned().collect::<Vec<_>>().join(", "),
        }),
        None => Ok(cfg.accounts.keys().cloned().collect()),
    }
}

/// Selected accounts with resolved passwords.
pub fn selected_accounts(cfg: &Config, global: &GlobalOpts) -> Result<Vec<Account>, CliError> {
    selected_names(cfg, global)?
        .iter()
        .map(|name| sonofly_config::resolve_account(cfg, name).map_err(CliError::from))
        .collect()
}

pub fn device_cache(cfg: &Config) -> DeviceCache {
    DeviceCache::new(Arc::new(FileStorage::new(sonofly_config::cache_dir(cfg))))
}

/// Wire the hub: file-backed cache, real transports, static discovery
/// from `[devices.*].host`, camera hosts from `[cameras.*]`.
pub fn build_hub(cfg: &Config) -> Result<Hub, CliError> {
    let mut factory = ClientFactory::new(sonofly_config::transport_config(cfg));
    if let Some(url) = sonofly_config::cloud_url(cfg)? {
        factory = factory.with_cloud_url(url);
    }
    let discovery = StaticDiscovery::new(sonofly_config::static_announcements(cfg)?);
    let cameras = camera_transport(sonofly_config::camera_hosts(cfg)?);

    Ok(Hub::new(
        sonofly_config::hub_config(cfg),
        Arc::new(factory),
        device_cache(cfg),
        Arc::new(discovery),
        cameras,
    ))
}
