// ── Mock transports for unit tests ──

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use secrecy::SecretString;
use sonofly_api::DiscoveryHandle;
use sonofly_api::websocket::DeviceUpdate;
use tokio::sync::broadcast;

use crate::error::CoreError;
use crate::model::{Account, Device, DeviceId, Params};
use crate::transport::{CameraTransport, CloudTransport, LocalTransport, TransportFactory};

/// Scripted result of one login attempt.
#[derive(Debug, Clone, Copy)]
pub(crate) enum LoginScript {
    Ok,
    Invalid,
    Transient,
}

pub(crate) struct MockCloud {
    script: Mutex<VecDeque<LoginScript>>,
    devices: Mutex<Vec<Device>>,
    auth: AtomicBool,
    fail_get_devices: AtomicBool,
    tx: broadcast::Sender<Arc<DeviceUpdate>>,
    pub logins: AtomicUsize,
    pub fetches: AtomicUsize,
    pub starts: AtomicUsize,
    pub sends: AtomicUsize,
    pub stops: AtomicUsize,
}

impl Default for MockCloud {
    fn default() -> Self {
        let (tx, _) = broadcast::channel(16);
        Self {
            script: Mutex::default(),
            devices: Mutex::default(),
            auth: AtomicBool::new(false),
            fail_get_devices: AtomicBool::new(false),
            tx,
            logins: AtomicUsize::new(0),
            fetches: AtomicUsize::new(0),
            starts: AtomicUsize::new(0),
            sends: AtomicUsize::new(0),
            stops: AtomicUsize::new(0),
        }
    }
}

impl MockCloud {
    pub fn logged_in() -> Self {
        let mock = Self::default();
        mock.auth.store(true, Ordering::SeqCst);
        mock
    }

    /// Login attempts follow `script`, then succeed.
    pub fn scripted(script: impl IntoIterator<Item = LoginScript>) -> Self {
        let mock = Self::default();
        *mock.script.lock().unwrap_or_else(PoisonError::into_inner) = script.into_iter().collect();
        mock
    }

    pub fn with_devices(self, devices: Vec<Device>) -> Self {
        *self.devices.lock().unwrap_or_else(PoisonError::into_inner) = devices;
        self
    }

    pub fn fail_get_devices(self) -> Self {
        self.fail_get_devices.store(true, Ordering::SeqCst);
        self
    }

    pub fn push(&self, update: DeviceUpdate) {
        let _ = self.tx.send(Arc::new(update));
    }
}

#[async_trait]
impl CloudTransport for MockCloud {
    async fn login(&self, _username: &str, _password: &SecretString) -> Result<(), CoreError> {
        self.logins.fetch_add(1, Ordering::SeqCst);
        let next = self
            .script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or(LoginScript::Ok);
        match next {
            LoginScript::Ok => {
                self.auth.store(true, Ordering::SeqCst);
                Ok(())
            }
            LoginScript::Invalid => {
                self.auth.store(false, Ordering::SeqCst);
                Err(CoreError::InvalidCredentials {
                    message: "wrong password".into(),
                })
            }
            LoginScript::Transient => Err(CoreError::TransientConnectivity {
                message: "connection refused".into(),
            }),
        }
    }

    async fn get_devices(&self) -> Result<Vec<Device>, CoreError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.fail_get_devices.load(Ordering::SeqCst) {
            return Err(CoreError::TransientConnectivity {
                message: "timeout".into(),
            });
        }
        Ok(self
            .devices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn has_auth(&self) -> bool {
        self.auth.load(Ordering::SeqCst)
    }

    fn start(&self) -> Result<(), CoreError> {
        if !self.has_auth() {
            return Err(CoreError::Internal("cloud start without auth".into()));
        }
        self.starts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn send(&self, _device: &Device, _payload: &Params) -> Result<(), CoreError> {
        self.sends.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<Arc<DeviceUpdate>> {
        self.tx.subscribe()
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub(crate) struct MockLocal {
    reachable: HashSet<String>,
    fail: bool,
    pub starts: AtomicUsize,
    pub sends: AtomicUsize,
    pub stops: AtomicUsize,
}

impl MockLocal {
    pub fn reaching<'a>(ids: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            reachable: ids.into_iter().map(str::to_owned).collect(),
            ..Self::default()
        }
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }
}

#[async_trait]
impl LocalTransport for MockLocal {
    fn start(&self, _discovery: Arc<dyn DiscoveryHandle>) {
        self.starts.fetch_add(1, Ordering::SeqCst);
    }

    fn is_reachable(&self, device: &DeviceId) -> bool {
        self.reachable.contains(device.as_str())
    }

    async fn send(&self, device: &Device, _payload: &Params) -> Result<(), CoreError> {
        self.sends.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(CoreError::DeviceUnreachable {
                device_id: device.id.to_string(),
            });
        }
        Ok(())
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub(crate) struct MockCamera {
    known: HashSet<String>,
    pub sent: Mutex<Vec<(String, String)>>,
}

impl MockCamera {
    pub fn knowing<'a>(ids: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            known: ids.into_iter().map(str::to_owned).collect(),
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl CameraTransport for MockCamera {
    async fn send(&self, camera_id: &str, cmd: &str) -> Result<(), CoreError> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((camera_id.to_owned(), cmd.to_owned()));
        if self.known.contains(camera_id) {
            Ok(())
        } else {
            Err(CoreError::UnknownCamera {
                camera_id: camera_id.to_owned(),
            })
        }
    }
}

/// Hands out pre-built mocks, one pair per account username.
#[derive(Default)]
pub(crate) struct MockFactory {
    clouds: Mutex<Vec<(String, Arc<MockCloud>)>>,
    locals: Mutex<Vec<(String, Arc<MockLocal>)>>,
}

impl MockFactory {
    pub fn with(self, username: &str, cloud: Arc<MockCloud>, local: Arc<MockLocal>) -> Self {
        self.clouds
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((username.to_owned(), cloud));
        self.locals
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((username.to_owned(), local));
        self
    }
}

impl TransportFactory for MockFactory {
    fn cloud(&self, account: &Account) -> Result<Arc<dyn CloudTransport>, CoreError> {
        let clouds = self.clouds.lock().unwrap_or_else(PoisonError::into_inner);
        let found = clouds.iter().find(|(name, _)| *name == account.username);
        match found {
            Some((_, cloud)) => Ok(cloud.clone()),
            None => Ok(Arc::new(MockCloud::default())),
        }
    }

    fn local(&self, account: &Account) -> Result<Arc<dyn LocalTransport>, CoreError> {
        let locals = self.locals.lock().unwrap_or_else(PoisonError::into_inner);
        let found = locals.iter().find(|(name, _)| *name == account.username);
        match found {
            Some((_, local)) => Ok(local.clone()),
            None => Ok(Arc::new(MockLocal::default())),
        }
    }
}
