// ── Account setup state machine ──
//
// Brings one account online: cloud login, device enumeration, cache
// persistence, transport startup. When the mode admits LAN operation a
// failed login forks the cache/local bootstrap before the failure is
// reported, so local control never waits on the cloud.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use sonofly_api::DiscoveryHandle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::dedup::DedupArbiter;
use crate::error::CoreError;
use crate::model::{Account, Device, Mode};
use crate::registry::Registry;
use crate::store::DeviceCache;

/// Where a setup cycle currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum SetupState {
    Init,
    LoggingIn,
    /// Re-entry after a retryable failure.
    Retrying,
    /// Login failed; bootstrapping from the cached device list.
    CacheFallback,
    Starting,
    Ready,
    /// Cloud login failed and no local bootstrap runs; waiting for a retry
    /// or new credentials.
    LoginFailed,
}

/// How the orchestrator is entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupEntry {
    /// First run of a cycle (setup, reload, option update).
    Fresh,
    /// The previous run returned [`SetupOutcome::Retryable`].
    Retry,
}

/// Result of one orchestrator run, consumed by the host.
#[derive(Debug)]
pub enum SetupOutcome {
    /// Setup accepted. The bootstrap may still be running in background.
    Ready,
    /// Cloud unreachable; run again later with [`SetupEntry::Retry`].
    Retryable(CoreError),
    /// Credentials rejected; do not retry until they change.
    Fatal(CoreError),
}

impl SetupOutcome {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }

    fn from_login_error(err: CoreError) -> Self {
        match err {
            CoreError::InvalidCredentials { .. } => Self::Fatal(err),
            other => Self::Retryable(other),
        }
    }
}

/// Drives one account through [`SetupState`].
pub struct SetupOrchestrator {
    account: Account,
    registry: Arc<Registry>,
    cache: DeviceCache,
    arbiter: Arc<DedupArbiter>,
    discovery: Arc<dyn DiscoveryHandle>,
    /// Host teardown signal.
    host_shutdown: CancellationToken,
    state: watch::Sender<SetupState>,
    bootstraps: Mutex<Vec<JoinHandle<()>>>,
    hook: Mutex<Option<CancellationToken>>,
    hook_registered: AtomicBool,
}

impl SetupOrchestrator {
    pub fn new(
        account: Account,
        registry: Arc<Registry>,
        cache: DeviceCache,
        arbiter: Arc<DedupArbiter>,
        discovery: Arc<dyn DiscoveryHandle>,
        host_shutdown: CancellationToken,
    ) -> Self {
        let (state, _) = watch::channel(SetupState::Init);
        registry.set_verbose(account.debug);
        Self {
            account,
            registry,
            cache,
            arbiter,
            discovery,
            host_shutdown,
            state,
            bootstraps: Mutex::new(Vec::new()),
            hook: Mutex::new(None),
            hook_registered: AtomicBool::new(false),
        }
    }

    pub fn account(&self) -> &Account {
        &self.account
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn state(&self) -> SetupState {
        *self.state.borrow()
    }

    fn cache_key(&self) -> String {
        DeviceCache::key_for(&self.account.username)
    }

    fn set_state(&self, state: SetupState) {
        let account = &self.account.username;
        if self.account.debug {
            info!(account, %state, "setup state");
        } else {
            debug!(account, %state, "setup state");
        }
        self.state.send_replace(state);
    }

    // ── Entry point ──────────────────────────────────────────────────

    /// Run one setup cycle.
    pub async fn run(self: &Arc<Self>, entry: SetupEntry) -> SetupOutcome {
        match entry {
            SetupEntry::Fresh => self.run_fresh().await,
            SetupEntry::Retry => self.run_retry().await,
        }
    }

    async fn run_fresh(self: &Arc<Self>) -> SetupOutcome {
        let mode = self.account.mode;
        self.set_state(SetupState::Init);

        if !self.registry.has_auth() && self.account.has_credentials() {
            self.set_state(SetupState::LoggingIn);
            if let Err(e) = self.login().await {
                warn!(account = %self.account.username, %mode, error = %e, "cloud login failed");

                if mode.uses_local() {
                    self.set_state(SetupState::CacheFallback);
                    self.spawn_bootstrap(false);
                } else {
                    self.set_state(SetupState::LoginFailed);
                }
                if mode.uses_cloud() {
                    return SetupOutcome::from_login_error(e);
                }
                return SetupOutcome::Ready;
            }
        }

        self.spawn_bootstrap(true);
        SetupOutcome::Ready
    }

    async fn run_retry(self: &Arc<Self>) -> SetupOutcome {
        let mode = self.account.mode;
        let previous = self.state();
        self.set_state(SetupState::Retrying);

        if !mode.uses_cloud() {
            // Local mode never asks for a retry.
            debug!(account = %self.account.username, "retry ignored in local mode");
            self.set_state(SetupState::Ready);
            return SetupOutcome::Ready;
        }

        if let Err(e) = self.login().await {
            warn!(account = %self.account.username, %mode, error = %e, "cloud login retry failed");
            // In auto mode the local side keeps whatever state it reached.
            self.set_state(if mode.uses_local() {
                previous
            } else {
                SetupState::LoginFailed
            });
            return SetupOutcome::from_login_error(e);
        }

        match mode {
            // Cache/local bootstrap already ran when the first login failed.
            Mode::Auto => {
                if let Err(e) = self.registry.start_cloud() {
                    error!(account = %self.account.username, error = %e, "cannot start cloud transport");
                }
                self.set_state(SetupState::Ready);
            }
            Mode::Cloud => self.spawn_bootstrap(true),
            Mode::Local => {}
        }
        SetupOutcome::Ready
    }

    async fn login(&self) -> Result<(), CoreError> {
        let password = self
            .account
            .password
            .as_ref()
            .ok_or_else(|| CoreError::Config {
                message: format!("no password configured for {}", self.account.username),
            })?;
        self.registry
            .cloud()
            .login(&self.account.username, password)
            .await
    }

    // ── Bootstrap ────────────────────────────────────────────────────

    /// Launch device population and transport startup in background.
    ///
    /// With `fetch` the device list comes from the cloud when logged in;
    /// otherwise straight from the cache.
    fn spawn_bootstrap(self: &Arc<Self>, fetch: bool) {
        let this = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let devices = if fetch { this.fetch_devices().await } else { None };
            this.start(devices).await;
        });
        self.bootstraps
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(handle);
    }

    /// Enumerate devices from the cloud and persist them.
    async fn fetch_devices(&self) -> Option<Vec<Device>> {
        if !self.registry.has_auth() {
            return None;
        }
        let account = &self.account.username;

        let devices = match self.registry.cloud().get_devices().await {
            Ok(devices) => devices,
            Err(e) => {
                warn!(account, error = %e, "cloud device enumeration failed, using cache");
                return None;
            }
        };
        debug!(account, count = devices.len(), "devices loaded from cloud");

        if let Err(e) = self.cache.save(&self.cache_key(), &devices).await {
            warn!(account, error = %e, "cannot write device cache");
        }
        Some(devices)
    }

    /// Populate the registry, then start the transports the mode admits.
    async fn start(&self, devices: Option<Vec<Device>>) {
        self.set_state(SetupState::Starting);
        let mode = self.account.mode;
        let account = &self.account.username;

        let devices = match devices {
            Some(devices) => devices,
            None => match self.cache.load(&self.cache_key()).await {
                Ok(Some(devices)) => {
                    debug!(account, count = devices.len(), "devices loaded from cache");
                    devices
                }
                Ok(None) => Vec::new(),
                Err(e) => {
                    warn!(account, error = %e, "continuing with no devices");
                    Vec::new()
                }
            },
        };

        if !devices.is_empty() {
            let owned = self.arbiter.filter_owned(&self.account.id(), devices);
            self.registry.setup_devices(owned);
        }

        // A retry may have started the session while this bootstrap ran.
        if mode.uses_cloud() && self.registry.has_auth() && !self.registry.is_cloud_started() {
            if let Err(e) = self.registry.start_cloud() {
                error!(account, error = %e, "cannot start cloud transport");
            }
        }
        if mode.uses_local() {
            self.registry.start_local(Arc::clone(&self.discovery));
        }

        if self.account.debug {
            info!(account, %mode, "mode start");
        } else {
            debug!(account, %mode, "mode start");
        }

        self.register_shutdown_hook();
        self.set_state(SetupState::Ready);
    }

    // ── Teardown ─────────────────────────────────────────────────────

    /// Stop the registry when the host shuts down. Registered at most once
    /// per orchestrator.
    fn register_shutdown_hook(&self) {
        if self.hook_registered.swap(true, Ordering::SeqCst) {
            return;
        }
        let unregister = CancellationToken::new();
        let host = self.host_shutdown.clone();
        let registry = Arc::clone(&self.registry);
        let token = unregister.clone();
        tokio::spawn(async move {
            tokio::select! {
                () = host.cancelled() => registry.stop().await,
                () = token.cancelled() => {}
            }
        });
        *self.hook.lock().unwrap_or_else(PoisonError::into_inner) = Some(unregister);
    }

    /// Drop the teardown hook (account unload).
    pub fn unregister_shutdown_hook(&self) {
        let hook = self
            .hook
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(hook) = hook {
            hook.cancel();
        }
    }

    /// Wait for every background bootstrap launched so far.
    pub async fn join_bootstrap(&self) {
        let handles: Vec<_> = self
            .bootstraps
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for handle in handles {
            if let Err(e) = handle.await {
                error!(account = %self.account.username, error = %e, "bootstrap task failed");
            }
        }
    }

    /// Abort bootstraps still running (account unload) and wait for them
    /// to wind down.
    pub async fn abort_bootstrap(&self) {
        let handles: Vec<_> = self
            .bootstraps
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for handle in handles {
            handle.abort();
            if let Err(e) = handle.await {
                if !e.is_cancelled() {
                    error!(account = %self.account.username, error = %e, "bootstrap task failed");
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::Ordering;

    use pretty_assertions::assert_eq;
    use sonofly_api::StaticDiscovery;

    use super::*;
    use crate::model::{AccountId, DeviceId};
    use crate::store::MemoryStorage;
    use crate::testing::{LoginScript, MockCloud, MockLocal};

    struct Fixture {
        cloud: Arc<MockCloud>,
        local: Arc<MockLocal>,
        storage: Arc<MemoryStorage>,
        arbiter: Arc<DedupArbiter>,
        shutdown: CancellationToken,
    }

    impl Fixture {
        fn new(cloud: MockCloud) -> Self {
            Self {
                cloud: Arc::new(cloud),
                local: Arc::new(MockLocal::default()),
                storage: Arc::new(MemoryStorage::new()),
                arbiter: Arc::new(DedupArbiter::new()),
                shutdown: CancellationToken::new(),
            }
        }

        fn orchestrator(&self, account: Account) -> Arc<SetupOrchestrator> {
            let registry = Arc::new(Registry::new(
                account.id(),
                self.cloud.clone(),
                self.local.clone(),
            ));
            Arc::new(SetupOrchestrator::new(
                account,
                registry,
                DeviceCache::new(self.storage.clone()),
                Arc::clone(&self.arbiter),
                Arc::new(StaticDiscovery::new([])),
                self.shutdown.clone(),
            ))
        }

        async fn seed_cache(&self, username: &str, devices: &[Device]) {
            DeviceCache::new(self.storage.clone())
                .save(&DeviceCache::key_for(username), devices)
                .await
                .unwrap();
        }
    }

    fn account(mode: Mode) -> Account {
        Account::new("user@example.com")
            .with_password("pw")
            .with_mode(mode)
    }

    fn devices() -> Vec<Device> {
        vec![Device::new("1000abcd12", "Kitchen"), Device::new("1000abcd13", "Hall")]
    }

    #[tokio::test]
    async fn success_fetches_caches_and_starts_both() {
        let fx = Fixture::new(MockCloud::default().with_devices(devices()));
        let orch = fx.orchestrator(account(Mode::Auto));

        let outcome = orch.run(SetupEntry::Fresh).await;
        assert!(outcome.is_ready());
        orch.join_bootstrap().await;

        assert_eq!(orch.state(), SetupState::Ready);
        assert_eq!(orch.registry().device_count(), 2);
        assert!(fx.storage.contains("sonofly/user@example.com.json"));
        assert_eq!(fx.cloud.starts.load(Ordering::SeqCst), 1);
        assert_eq!(fx.local.starts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn auto_invalid_credentials_boots_from_cache_once_without_cloud() {
        let fx = Fixture::new(MockCloud::scripted([LoginScript::Invalid]));
        fx.seed_cache("user@example.com", &devices()).await;
        let orch = fx.orchestrator(account(Mode::Auto));

        let outcome = orch.run(SetupEntry::Fresh).await;
        assert!(matches!(outcome, SetupOutcome::Fatal(CoreError::InvalidCredentials { .. })));
        orch.join_bootstrap().await;

        assert_eq!(fx.local.starts.load(Ordering::SeqCst), 1);
        assert_eq!(fx.cloud.starts.load(Ordering::SeqCst), 0);
        assert_eq!(fx.cloud.fetches.load(Ordering::SeqCst), 0);
        assert_eq!(orch.registry().device_count(), 2);
        assert_eq!(orch.state(), SetupState::Ready);
    }

    #[tokio::test]
    async fn cloud_transient_failure_is_retryable_without_local_bootstrap() {
        let fx = Fixture::new(MockCloud::scripted([LoginScript::Transient]));
        let orch = fx.orchestrator(account(Mode::Cloud));

        let outcome = orch.run(SetupEntry::Fresh).await;
        assert!(matches!(
            outcome,
            SetupOutcome::Retryable(CoreError::TransientConnectivity { .. })
        ));
        orch.join_bootstrap().await;

        assert_eq!(fx.local.starts.load(Ordering::SeqCst), 0);
        assert_eq!(fx.cloud.starts.load(Ordering::SeqCst), 0);
        assert_eq!(orch.registry().device_count(), 0);
        assert_eq!(orch.state(), SetupState::LoginFailed);
    }

    #[tokio::test]
    async fn local_login_failure_is_silent() {
        let fx = Fixture::new(MockCloud::scripted([LoginScript::Transient]));
        fx.seed_cache("user@example.com", &devices()).await;
        let orch = fx.orchestrator(account(Mode::Local));

        assert!(orch.run(SetupEntry::Fresh).await.is_ready());
        orch.join_bootstrap().await;

        assert_eq!(fx.local.starts.load(Ordering::SeqCst), 1);
        assert_eq!(fx.cloud.starts.load(Ordering::SeqCst), 0);
        assert_eq!(orch.registry().device_count(), 2);
    }

    #[tokio::test]
    async fn local_without_password_never_logs_in() {
        let fx = Fixture::new(MockCloud::default());
        let orch = fx.orchestrator(Account::new("user@example.com").with_mode(Mode::Local));

        assert!(orch.run(SetupEntry::Fresh).await.is_ready());
        orch.join_bootstrap().await;

        assert_eq!(orch.state(), SetupState::Ready);
        assert_eq!(fx.cloud.logins.load(Ordering::SeqCst), 0);
        assert_eq!(fx.local.starts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn local_mode_with_credentials_refreshes_list_but_skips_cloud_session() {
        let fx = Fixture::new(MockCloud::default().with_devices(devices()));
        let orch = fx.orchestrator(account(Mode::Local));

        assert!(orch.run(SetupEntry::Fresh).await.is_ready());
        orch.join_bootstrap().await;

        assert_eq!(fx.cloud.fetches.load(Ordering::SeqCst), 1);
        assert_eq!(fx.cloud.starts.load(Ordering::SeqCst), 0);
        assert_eq!(orch.registry().device_count(), 2);
    }

    #[tokio::test]
    async fn existing_auth_skips_login() {
        let fx = Fixture::new(MockCloud::logged_in().with_devices(devices()));
        let orch = fx.orchestrator(account(Mode::Auto));

        assert!(orch.run(SetupEntry::Fresh).await.is_ready());
        orch.join_bootstrap().await;

        assert_eq!(fx.cloud.logins.load(Ordering::SeqCst), 0);
        assert_eq!(fx.cloud.starts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn enumeration_failure_falls_back_to_cache() {
        let fx = Fixture::new(MockCloud::default().fail_get_devices());
        fx.seed_cache("user@example.com", &devices()[..1]).await;
        let orch = fx.orchestrator(account(Mode::Auto));

        assert!(orch.run(SetupEntry::Fresh).await.is_ready());
        orch.join_bootstrap().await;

        assert_eq!(orch.registry().device_count(), 1);
        assert_eq!(fx.cloud.starts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unusable_cache_means_empty_directory() {
        let fx = Fixture::new(MockCloud::scripted([LoginScript::Invalid]));
        fx.storage.insert_raw(
            "sonofly/user@example.com.json",
            serde_json::json!({"version": 7, "data": "nope"}),
        );
        let orch = fx.orchestrator(account(Mode::Auto));

        orch.run(SetupEntry::Fresh).await;
        orch.join_bootstrap().await;

        assert_eq!(orch.registry().device_count(), 0);
        assert_eq!(orch.state(), SetupState::Ready);
        assert_eq!(fx.local.starts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn auto_retry_only_starts_cloud() {
        let fx = Fixture::new(MockCloud::scripted([LoginScript::Transient]).with_devices(devices()));
        fx.seed_cache("user@example.com", &devices()).await;
        let orch = fx.orchestrator(account(Mode::Auto));

        assert!(matches!(orch.run(SetupEntry::Fresh).await, SetupOutcome::Retryable(_)));
        orch.join_bootstrap().await;
        assert_eq!(fx.local.starts.load(Ordering::SeqCst), 1);

        assert!(orch.run(SetupEntry::Retry).await.is_ready());
        orch.join_bootstrap().await;

        assert_eq!(fx.local.starts.load(Ordering::SeqCst), 1);
        assert_eq!(fx.cloud.starts.load(Ordering::SeqCst), 1);
        assert_eq!(fx.cloud.fetches.load(Ordering::SeqCst), 0);
        assert_eq!(orch.state(), SetupState::Ready);
    }

    #[tokio::test]
    async fn cloud_retry_runs_full_bootstrap() {
        let fx = Fixture::new(MockCloud::scripted([LoginScript::Transient]).with_devices(devices()));
        let orch = fx.orchestrator(account(Mode::Cloud));

        assert!(matches!(orch.run(SetupEntry::Fresh).await, SetupOutcome::Retryable(_)));
        assert!(orch.run(SetupEntry::Retry).await.is_ready());
        orch.join_bootstrap().await;

        assert_eq!(fx.cloud.fetches.load(Ordering::SeqCst), 1);
        assert_eq!(fx.cloud.starts.load(Ordering::SeqCst), 1);
        assert_eq!(fx.local.starts.load(Ordering::SeqCst), 0);
        assert_eq!(orch.registry().device_count(), 2);
    }

    #[tokio::test]
    async fn retry_with_rejected_credentials_is_fatal() {
        let fx = Fixture::new(MockCloud::scripted([LoginScript::Transient, LoginScript::Invalid]));
        let orch = fx.orchestrator(account(Mode::Cloud));

        orch.run(SetupEntry::Fresh).await;
        assert!(matches!(orch.run(SetupEntry::Retry).await, SetupOutcome::Fatal(_)));
        assert_eq!(orch.state(), SetupState::LoginFailed);
    }

    #[tokio::test]
    async fn auto_retry_failure_keeps_local_state() {
        let fx = Fixture::new(MockCloud::scripted([LoginScript::Transient, LoginScript::Transient]));
        fx.seed_cache("user@example.com", &devices()).await;
        let orch = fx.orchestrator(account(Mode::Auto));

        orch.run(SetupEntry::Fresh).await;
        orch.join_bootstrap().await;
        assert_eq!(orch.state(), SetupState::Ready);

        assert!(matches!(orch.run(SetupEntry::Retry).await, SetupOutcome::Retryable(_)));
        assert_eq!(orch.state(), SetupState::Ready);
        assert_eq!(orch.registry().device_count(), 2);
    }

    #[tokio::test]
    async fn retry_during_pending_bootstrap_starts_cloud_once() {
        let fx = Fixture::new(MockCloud::scripted([LoginScript::Transient]));
        fx.seed_cache("user@example.com", &devices()).await;
        let orch = fx.orchestrator(account(Mode::Auto));

        assert!(matches!(orch.run(SetupEntry::Fresh).await, SetupOutcome::Retryable(_)));
        // The forked bootstrap has not run yet on this single-threaded runtime.
        assert!(orch.run(SetupEntry::Retry).await.is_ready());
        assert_eq!(fx.cloud.starts.load(Ordering::SeqCst), 1);

        orch.join_bootstrap().await;
        assert_eq!(fx.cloud.starts.load(Ordering::SeqCst), 1);
        assert_eq!(fx.local.starts.load(Ordering::SeqCst), 1);
        assert_eq!(orch.registry().device_count(), 2);
        assert!(orch.registry().is_cloud_started());
    }

    #[tokio::test]
    async fn devices_owned_elsewhere_are_filtered() {
        let fx = Fixture::new(MockCloud::default().with_devices(devices()));
        fx.arbiter
            .claim(&DeviceId::from("1000abcd12"), &AccountId::from("other@example.com"));
        let orch = fx.orchestrator(account(Mode::Auto));

        orch.run(SetupEntry::Fresh).await;
        orch.join_bootstrap().await;

        assert!(!orch.registry().contains(&"1000abcd12".into()));
        assert!(orch.registry().contains(&"1000abcd13".into()));
    }

    #[tokio::test]
    async fn host_shutdown_stops_registry_and_unregister_detaches() {
        let fx = Fixture::new(MockCloud::default().with_devices(devices()));
        let orch = fx.orchestrator(account(Mode::Auto));
        orch.run(SetupEntry::Fresh).await;
        orch.join_bootstrap().await;
        assert!(orch.registry().is_cloud_started());

        fx.shutdown.cancel();
        for _ in 0..100 {
            if !orch.registry().is_cloud_started() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert!(!orch.registry().is_cloud_started());
        assert!(!orch.registry().is_local_started());

        // A second registration attempt is a no-op; unregistering twice is fine.
        orch.register_shutdown_hook();
        orch.unregister_shutdown_hook();
        orch.unregister_shutdown_hook();
    }
}
