//! `devices`: list cached or live device directories.

use std::time::Duration;

use serde::Serialize;
use tabled::Tabled;
use tracing::{debug, warn};

use sonofly_core::{Device, DeviceCache};

use crate::cli::{DevicesArgs, GlobalOpts};
use crate::config::{self, Config};
use crate::error::CliError;
use crate::output;

use super::util;

const LIVE_WAIT: Duration = Duration::from_secs(15);

#[derive(Debug, Serialize)]
struct DeviceListing {
    account: String,
    #[serde(flatten)]
    device: Device,
}

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
struct DeviceRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Model")]
    model: String,
    #[tabled(rename = "Online")]
    online: String,
    #[tabled(rename = "Account")]
    account: String,
}

impl From<&DeviceListing> for DeviceRow {
    fn from(l: &DeviceListing) -> Self {
        let d = &l.device;
        Self {
            id: d.id.to_string(),
            name: d.name.clone(),
            model: d.model.clone().unwrap_or_default(),
            online: if d.online { "yes" } else { "no" }.into(),
            account: l.account.clone(),
        }
    }
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(args: DevicesArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let cfg = config::load(global)?;
    let listings = if args.live {
        live(&cfg, global).await?
    } else {
        cached(&cfg, global).await?
    };

    let out = output::render_list(
        global.output,
        &listings,
        |l| DeviceRow::from(l),
        |l| l.device.id.to_string(),
    );
    output::print_output(&out, global.quiet);
    Ok(())
}

/// Device lists as last saved, one per account. No network access.
async fn cached(cfg: &Config, global: &GlobalOpts) -> Result<Vec<DeviceListing>, CliError> {
    let cache = config::device_cache(cfg);
    let mut listings = Vec::new();

    for name in config::selected_names(cfg, global)? {
        let Some(entry) = cfg.accounts.get(&name) else {
            continue;
        };
        let username = &entry.username;
        match cache.load(&DeviceCache::key_for(username)).await {
            Ok(Some(devices)) => listings.extend(devices.into_iter().map(|device| DeviceListing {
                account: username.clone(),
                device,
            })),
            Ok(None) => debug!(account = %username, "no cached devices"),
            Err(e) => warn!(account = %username, error = %e, "cached device list unusable"),
        }
    }
    Ok(listings)
}

/// Bring the accounts online and list each registry after ownership
/// filtering.
async fn live(cfg: &Config, global: &GlobalOpts) -> Result<Vec<DeviceListing>, CliError> {
    let hub = config::build_hub(cfg)?;
    let accounts = config::selected_accounts(cfg, global)?;
    if let Some(rejected) = util::bring_online(&hub, accounts, LIVE_WAIT).await? {
        warn!(error = %rejected, "an account could not log in");
    }

    let mut listings = Vec::new();
    for id in hub.accounts().await {
        let Some(registry) = hub.registry(&id) else {
            continue;
        };
        listings.extend(registry.devices().iter().map(|device| DeviceListing {
            account: id.to_string(),
            device: Device::clone(device),
        }));
    }
    hub.shutdown().await;
    Ok(listings)
}
