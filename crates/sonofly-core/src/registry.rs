// ── Per-account registry ──
//
// Owns the device directory of one account and the transports that reach
// those devices. Every device in the directory has been granted to this
// account by the dedup arbiter before it gets here.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use sonofly_api::DiscoveryHandle;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::convert::{update_online, update_params};
use crate::error::CoreError;
use crate::model::{AccountId, Device, DeviceId, DeviceOverride, Params};
use crate::store::directory::DeviceDirectory;
use crate::transport::{CloudTransport, LocalTransport};

/// Transport a command was delivered through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Route {
    Local,
    Cloud,
}

struct UpdateListener {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Device directory plus transports for one account.
pub struct Registry {
    account: AccountId,
    cloud: Arc<dyn CloudTransport>,
    local: Arc<dyn LocalTransport>,
    devices: Arc<DeviceDirectory>,
    overrides: Arc<HashMap<DeviceId, DeviceOverride>>,
    cloud_started: AtomicBool,
    local_started: AtomicBool,
    verbose: AtomicBool,
    listener: Mutex<Option<UpdateListener>>,
}

impl Registry {
    pub fn new(
        account: AccountId,
        cloud: Arc<dyn CloudTransport>,
        local: Arc<dyn LocalTransport>,
    ) -> Self {
        Self {
            account,
            cloud,
            local,
            devices: Arc::new(DeviceDirectory::new()),
            overrides: Arc::default(),
            cloud_started: AtomicBool::new(false),
            local_started: AtomicBool::new(false),
            verbose: AtomicBool::new(false),
            listener: Mutex::new(None),
        }
    }

    /// Configured per-device overrides, applied in [`setup_devices`](Self::setup_devices).
    pub fn with_overrides(mut self, overrides: HashMap<DeviceId, DeviceOverride>) -> Self {
        self.overrides = Arc::new(overrides);
        self
    }

    pub fn account(&self) -> &AccountId {
        &self.account
    }

    /// Log routing decisions at `info` instead of `debug`.
    pub fn set_verbose(&self, verbose: bool) {
        self.verbose.store(verbose, Ordering::Relaxed);
    }

    fn log_route(&self, id: &DeviceId, route: Route) {
        if self.verbose.load(Ordering::Relaxed) {
            info!(account = %self.account, device = %id, %route, "command delivered");
        } else {
            debug!(account = %self.account, device = %id, %route, "command delivered");
        }
    }

    pub(crate) fn cloud(&self) -> &Arc<dyn CloudTransport> {
        &self.cloud
    }

    /// The cloud transport holds a valid login.
    pub fn has_auth(&self) -> bool {
        self.cloud.has_auth()
    }

    // ── Device directory ─────────────────────────────────────────────

    /// Merge `devices` into the directory, applying overrides.
    ///
    /// Devices already present are replaced; others are kept. Returns the
    /// number of devices that were new.
    pub fn setup_devices(&self, devices: Vec<Device>) -> usize {
        let count = devices.len();
        let devices = devices.into_iter().map(|mut device| {
            if let Some(over) = self.overrides.get(&device.id) {
                over.apply(&mut device);
            }
            device
        });
        let added = self.devices.upsert_all(devices);
        debug!(account = %self.account, count, added, "devices set up");
        added
    }

    /// Drop a device from the directory. Its ownership stays recorded.
    pub fn remove_device(&self, id: &DeviceId) -> Option<Arc<Device>> {
        self.devices.remove(id)
    }

    pub fn contains(&self, id: &DeviceId) -> bool {
        self.devices.contains(id)
    }

    pub fn device(&self, id: &DeviceId) -> Option<Arc<Device>> {
        self.devices.get(id)
    }

    /// Current devices, sorted by identifier.
    pub fn devices(&self) -> Arc<Vec<Arc<Device>>> {
        self.devices.snapshot()
    }

    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    /// Watch directory changes.
    pub fn subscribe(&self) -> watch::Receiver<Arc<Vec<Arc<Device>>>> {
        self.devices.subscribe()
    }

    // ── Transport lifecycle ──────────────────────────────────────────

    pub fn is_cloud_started(&self) -> bool {
        self.cloud_started.load(Ordering::SeqCst)
    }

    pub fn is_local_started(&self) -> bool {
        self.local_started.load(Ordering::SeqCst)
    }

    /// Start (or restart) the cloud session and apply the state it pushes.
    pub fn start_cloud(&self) -> Result<(), CoreError> {
        self.cloud.start()?;
        self.cloud_started.store(true, Ordering::SeqCst);

        let cancel = CancellationToken::new();
        let mut rx = self.cloud.subscribe();
        let devices = Arc::clone(&self.devices);
        let account = self.account.clone();
        let token = cancel.clone();
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    () = token.cancelled() => break,
                    msg = rx.recv() => match msg {
                        Ok(update) => {
                            let id = DeviceId::from(update.device_id.as_str());
                            devices.update(&id, update_params(&update), update_online(&update));
                        }
                        Err(RecvError::Lagged(n)) => {
                            warn!(account = %account, skipped = n, "cloud update listener lagged");
                        }
                        Err(RecvError::Closed) => break,
                    },
                }
            }
        });

        let previous = self
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(UpdateListener { cancel, task });
        if let Some(previous) = previous {
            previous.cancel.cancel();
        }
        info!(account = %self.account, "cloud transport started");
        Ok(())
    }

    pub fn start_local(&self, discovery: Arc<dyn DiscoveryHandle>) {
        self.local.start(discovery);
        self.local_started.store(true, Ordering::SeqCst);
        info!(account = %self.account, "local transport started");
    }

    // ── Routing ──────────────────────────────────────────────────────

    /// Deliver `payload` to a device: LAN first, cloud as fallback.
    pub async fn send(&self, id: &DeviceId, payload: &Params) -> Result<Route, CoreError> {
        let device = self.devices.get(id).ok_or_else(|| CoreError::UnknownDevice {
            device_id: id.to_string(),
        })?;

        let local_ok = self.is_local_started() && self.local.is_reachable(id);
        let cloud_ok = self.is_cloud_started() && self.cloud.has_auth();

        if local_ok {
            match self.local.send(&device, payload).await {
                Ok(()) => {
                    self.log_route(id, Route::Local);
                    return Ok(Route::Local);
                }
                Err(e) if cloud_ok => {
                    warn!(device = %id, error = %e, "local delivery failed, falling back to cloud");
                }
                Err(e) => return Err(e),
            }
        }

        if cloud_ok {
            self.cloud.send(&device, payload).await?;
            self.log_route(id, Route::Cloud);
            return Ok(Route::Cloud);
        }

        Err(CoreError::DeviceUnreachable {
            device_id: id.to_string(),
        })
    }

    /// Stop both transports and the update listener.
    ///
    /// Idempotent, and safe on a registry that was never started.
    pub async fn stop(&self) {
        let listener = self
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        let was_cloud = self.cloud_started.swap(false, Ordering::SeqCst);
        let was_local = self.local_started.swap(false, Ordering::SeqCst);
        self.cloud.stop();
        self.local.stop();

        if let Some(listener) = listener {
            listener.cancel.cancel();
            if let Err(e) = listener.task.await {
                warn!(account = %self.account, error = %e, "cloud update listener panicked");
            }
        }

        if was_cloud || was_local {
            info!(account = %self.account, "registry stopped");
        }
    }
}
