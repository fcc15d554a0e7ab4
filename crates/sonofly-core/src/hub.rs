// ── Hub: host-facing account lifecycle ──
//
// Owns every configured account, its Registry and the orchestrator that
// brings it online. Registries outlive unload/reload so a cloud login
// survives an options change that keeps the same identity.

use std::collections::HashMap;
use std::sync::Arc;

use sonofly_api::DiscoveryHandle;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::HubConfig;
use crate::dedup::DedupArbiter;
use crate::dispatcher::{CommandDispatcher, Dispatched, RawCommand, RegistryMap};
use crate::error::CoreError;
use crate::model::{Account, AccountId, DeviceId, Params};
use crate::orchestrator::{SetupEntry, SetupOrchestrator, SetupOutcome, SetupState};
use crate::registry::Registry;
use crate::store::DeviceCache;
use crate::transport::{CameraTransport, TransportFactory};

struct RetryTask {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// A loaded account: its orchestrator and a pending retry loop, if any.
struct ActiveRun {
    orchestrator: Arc<SetupOrchestrator>,
    retry: Option<RetryTask>,
}

struct AccountSlot {
    account: Account,
    registry: Arc<Registry>,
    run: Option<ActiveRun>,
}

/// Central facade for the host.
///
/// Every lifecycle call is serialized through one async lock; command
/// dispatch never takes it.
pub struct Hub {
    config: Arc<HubConfig>,
    factory: Arc<dyn TransportFactory>,
    cache: DeviceCache,
    arbiter: Arc<DedupArbiter>,
    discovery: Arc<dyn DiscoveryHandle>,
    shutdown: CancellationToken,
    active: RegistryMap,
    dispatcher: CommandDispatcher,
    accounts: Mutex<HashMap<AccountId, AccountSlot>>,
}

impl Hub {
    pub fn new(
        config: HubConfig,
        factory: Arc<dyn TransportFactory>,
        cache: DeviceCache,
        discovery: Arc<dyn DiscoveryHandle>,
        cameras: Arc<dyn CameraTransport>,
    ) -> Self {
        let active = RegistryMap::default();
        Self {
            config: Arc::new(config),
            factory,
            cache,
            arbiter: DedupArbiter::global(),
            discovery,
            shutdown: CancellationToken::new(),
            dispatcher: CommandDispatcher::new(Arc::clone(&active), cameras),
            active,
            accounts: Mutex::new(HashMap::new()),
        }
    }

    /// Use a private ownership table instead of the process-wide one.
    pub fn with_arbiter(mut self, arbiter: Arc<DedupArbiter>) -> Self {
        self.arbiter = arbiter;
        self
    }

    pub fn dispatcher(&self) -> &CommandDispatcher {
        &self.dispatcher
    }

    pub fn arbiter(&self) -> &Arc<DedupArbiter> {
        &self.arbiter
    }

    /// Fires when the host shuts down.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Load `account`, replacing a loaded account with the same id.
    ///
    /// The existing Registry is reused when the login identity is
    /// unchanged. A retryable outcome schedules background retries.
    pub async fn setup_account(&self, account: Account) -> Result<SetupOutcome, CoreError> {
        let id = account.id();
        let mut accounts = self.accounts.lock().await;

        let registry = match accounts.remove(&id) {
            Some(mut slot) => {
                self.teardown(&id, &mut slot).await;
                if slot.account.same_identity(&account) {
                    slot.registry
                } else {
                    debug!(account = %id, "login identity changed, building new registry");
                    self.build_registry(&account)?
                }
            }
            None => self.build_registry(&account)?,
        };

        let orchestrator = Arc::new(SetupOrchestrator::new(
            account.clone(),
            Arc::clone(&registry),
            self.cache.clone(),
            Arc::clone(&self.arbiter),
            Arc::clone(&self.discovery),
            self.shutdown.clone(),
        ));
        self.active.insert(id.clone(), Arc::clone(&registry));

        let outcome = orchestrator.run(SetupEntry::Fresh).await;
        let retry = match outcome {
            SetupOutcome::Ready => {
                info!(account = %id, mode = %account.mode, "account loaded");
                None
            }
            SetupOutcome::Retryable(ref e) => {
                warn!(account = %id, error = %e, "account setup will be retried");
                Some(self.spawn_retry(Arc::clone(&orchestrator)))
            }
            SetupOutcome::Fatal(ref e) => {
                error!(account = %id, error = %e, "account setup failed");
                None
            }
        };

        accounts.insert(
            id,
            AccountSlot {
                account,
                registry,
                run: Some(ActiveRun {
                    orchestrator,
                    retry,
                }),
            },
        );
        Ok(outcome)
    }

    /// Apply changed account options by reloading the account.
    pub async fn update_options(&self, account: Account) -> Result<SetupOutcome, CoreError> {
        info!(account = %account.username, "options updated, reloading");
        self.setup_account(account).await
    }

    /// Unload and set up again with the current options.
    pub async fn reload(&self, id: &AccountId) -> Result<SetupOutcome, CoreError> {
        let account = self
            .accounts
            .lock()
            .await
            .get(id)
            .map(|slot| slot.account.clone())
            .ok_or_else(|| CoreError::Config {
                message: format!("account {id} is not configured"),
            })?;
        self.setup_account(account).await
    }

    /// Stop an account's transports and retries. The Registry is kept for
    /// a later reload. Returns `false` when nothing was loaded.
    pub async fn unload_account(&self, id: &AccountId) -> bool {
        let mut accounts = self.accounts.lock().await;
        match accounts.get_mut(id) {
            Some(slot) if slot.run.is_some() => {
                self.teardown(id, slot).await;
                info!(account = %id, "account unloaded");
                true
            }
            _ => false,
        }
    }

    /// Unload and forget an account.
    pub async fn remove_account(&self, id: &AccountId) -> bool {
        let mut accounts = self.accounts.lock().await;
        match accounts.remove(id) {
            Some(mut slot) => {
                self.teardown(id, &mut slot).await;
                info!(account = %id, "account removed");
                true
            }
            None => false,
        }
    }

    /// Drop one device from an account's directory (host "remove device"
    /// callback). The arbiter keeps the account as its owner. Returns
    /// `false` when the account or the device is unknown.
    pub async fn remove_device(&self, account: &AccountId, device: &DeviceId) -> bool {
        let accounts = self.accounts.lock().await;
        let Some(slot) = accounts.get(account) else {
            return false;
        };
        let removed = slot.registry.remove_device(device).is_some();
        if removed {
            info!(account = %account, device = %device, "device removed");
        }
        removed
    }

    /// Host shutdown: fire teardown hooks, then stop every account.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let mut accounts = self.accounts.lock().await;
        for (id, slot) in accounts.iter_mut() {
            self.teardown(id, slot).await;
        }
        info!(accounts = accounts.len(), "hub stopped");
    }

    fn build_registry(&self, account: &Account) -> Result<Arc<Registry>, CoreError> {
        let registry = Registry::new(
            account.id(),
            self.factory.cloud(account)?,
            self.factory.local(account)?,
        )
        .with_overrides(self.config.overrides.clone());
        Ok(Arc::new(registry))
    }

    async fn teardown(&self, id: &AccountId, slot: &mut AccountSlot) {
        self.active.remove(id);
        if let Some(run) = slot.run.take() {
            if let Some(retry) = run.retry {
                retry.cancel.cancel();
                retry.task.abort();
                if let Err(e) = retry.task.await {
                    if !e.is_cancelled() {
                        error!(account = %id, error = %e, "setup retry task failed");
                    }
                }
            }
            run.orchestrator.unregister_shutdown_hook();
            run.orchestrator.abort_bootstrap().await;
        }
        slot.registry.stop().await;
    }

    fn spawn_retry(&self, orchestrator: Arc<SetupOrchestrator>) -> RetryTask {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let shutdown = self.shutdown.clone();
        let config = Arc::clone(&self.config);

        let task = tokio::spawn(async move {
            let account = orchestrator.account().username.clone();
            let mut attempt = 0u32;
            loop {
                let delay = config.retry_delay(attempt);
                debug!(account, attempt, ?delay, "setup retry scheduled");
                tokio::select! {
                    biased;
                    () = token.cancelled() => return,
                    () = shutdown.cancelled() => return,
                    () = tokio::time::sleep(delay) => {}
                }
                match orchestrator.run(SetupEntry::Retry).await {
                    SetupOutcome::Ready => {
                        info!(account, attempt, "account setup recovered");
                        return;
                    }
                    SetupOutcome::Retryable(e) => {
                        warn!(account, attempt, error = %e, "setup retry failed");
                        attempt = attempt.saturating_add(1);
                    }
                    SetupOutcome::Fatal(e) => {
                        error!(account, error = %e, "setup retry rejected");
                        return;
                    }
                }
            }
        });
        RetryTask { cancel, task }
    }

    // ── Queries ──────────────────────────────────────────────────────

    /// Registry of a loaded account.
    pub fn registry(&self, id: &AccountId) -> Option<Arc<Registry>> {
        self.active.get(id).map(|entry| Arc::clone(entry.value()))
    }

    pub async fn state(&self, id: &AccountId) -> Option<SetupState> {
        let accounts = self.accounts.lock().await;
        let run = accounts.get(id)?.run.as_ref()?;
        Some(run.orchestrator.state())
    }

    /// Loaded account ids, sorted.
    pub async fn accounts(&self) -> Vec<AccountId> {
        let mut ids: Vec<_> = self.accounts.lock().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Wait for the background bootstrap of an account to finish.
    pub async fn join_bootstrap(&self, id: &AccountId) {
        let orchestrator = {
            let accounts = self.accounts.lock().await;
            accounts
                .get(id)
                .and_then(|slot| slot.run.as_ref())
                .map(|run| Arc::clone(&run.orchestrator))
        };
        if let Some(orchestrator) = orchestrator {
            orchestrator.join_bootstrap().await;
        }
    }

    // ── Commands ─────────────────────────────────────────────────────

    pub async fn dispatch(&self, raw_id: &str, payload: Params) -> Result<Dispatched, CoreError> {
        self.dispatcher.dispatch(raw_id, payload).await
    }

    /// Fire-and-forget host command; failures are logged.
    pub async fn handle(&self, command: RawCommand) -> Option<Dispatched> {
        self.dispatcher.handle(command).await
    }
}
