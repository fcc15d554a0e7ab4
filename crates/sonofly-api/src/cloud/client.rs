// Cloud API HTTP client
//
// Wraps `reqwest::Client` with region-aware URL construction, bearer
// authentication, envelope unwrapping and the WebSocket session lifecycle.
// Endpoint groups (login, devices) are inherent methods in sibling files.

use std::sync::{Arc, Mutex, PoisonError, RwLock};

use secrecy::ExposeSecret;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

use crate::auth::{CloudAuth, CloudRegion};
use crate::cloud::models::{AUTH_ERROR_CODES, CloudResponse};
use crate::error::Error;
use crate::transport::TransportConfig;
use crate::websocket::{CloudSession, DeviceUpdate, ReconnectConfig, UPDATE_CHANNEL_CAPACITY};

/// HTTP client for the cloud relay.
///
/// Handles the `{ error, msg, data }` envelope and keeps the
/// authentication obtained by [`login`](Self::login). Once started, a
/// WebSocket session streams device updates to every
/// [`subscribe`](Self::subscribe)r; subscriptions survive session restarts.
pub struct CloudClient {
    http: reqwest::Client,
    base_url: RwLock<Url>,
    dispatch_url: RwLock<Url>,
    /// Explicit base URL: region redirects update the region but keep the URL.
    pinned: bool,
    region: RwLock<CloudRegion>,
    app_id: Option<String>,
    timeout_secs: u64,
    auth: RwLock<Option<CloudAuth>>,
    session: Mutex<Option<CloudSession>>,
    updates: broadcast::Sender<Arc<DeviceUpdate>>,
    reconnect: ReconnectConfig,
}

impl CloudClient {
    /// Create a client homed in `region`.
    pub fn new(region: CloudRegion, transport: &TransportConfig) -> Result<Self, Error> {
        let http = transport.build_cloud_client()?;
        let base_url = Url::parse(&region.api_url())?;
        let dispatch_url = Url::parse(&region.dispatch_url())?;
        Ok(Self::build(http, base_url, dispatch_url, false, region, transport))
    }

    /// Create a client against a fixed base URL (self-hosted relays, tests).
    ///
    /// The same URL also serves the WebSocket dispatch endpoint.
    pub fn with_base_url(base_url: Url, transport: &TransportConfig) -> Result<Self, Error> {
        let http = transport.build_cloud_client()?;
        Ok(Self::build(
            http,
            base_url.clone(),
            base_url,
            true,
            CloudRegion::default(),
            transport,
        ))
    }

    fn build(
        http: reqwest::Client,
        base_url: Url,
        dispatch_url: Url,
        pinned: bool,
        region: CloudRegion,
        transport: &TransportConfig,
    ) -> Self {
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        Self {
            http,
            base_url: RwLock::new(base_url),
            dispatch_url: RwLock::new(dispatch_url),
            pinned,
            region: RwLock::new(region),
            app_id: transport.app_id.clone(),
            timeout_secs: transport.timeout_secs(),
            auth: RwLock::new(None),
            session: Mutex::new(None),
            updates,
            reconnect: ReconnectConfig::default(),
        }
    }

    /// Override the session reconnect policy.
    pub fn with_reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// Current REST base URL.
    pub fn base_url(&self) -> Url {
        self.base_url
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    // ── Authentication state ─────────────────────────────────────────

    /// Authentication obtained by the last successful login, if any.
    pub fn auth(&self) -> Option<CloudAuth> {
        self.auth
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn has_auth(&self) -> bool {
        self.auth
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    pub(crate) fn set_auth(&self, auth: Option<CloudAuth>) {
        *self.auth.write().unwrap_or_else(PoisonError::into_inner) = auth;
    }

    /// Region the client currently targets.
    pub(crate) fn region_hint(&self) -> CloudRegion {
        *self.region.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn set_region_hint(&self, region: CloudRegion) {
        *self.region.write().unwrap_or_else(PoisonError::into_inner) = region;
    }

    /// Re-home the client after a region redirect.
    pub(crate) fn switch_region(&self, region: CloudRegion) -> Result<(), Error> {
        if self.pinned {
            debug!(%region, "base URL pinned, keeping it across region switch");
            return Ok(());
        }
        let api = Url::parse(&region.api_url())?;
        let dispatch = Url::parse(&region.dispatch_url())?;
        *self.base_url.write().unwrap_or_else(PoisonError::into_inner) = api;
        *self
            .dispatch_url
            .write()
            .unwrap_or_else(PoisonError::into_inner) = dispatch;
        Ok(())
    }

    // ── Session lifecycle ────────────────────────────────────────────

    /// Start (or restart) the WebSocket session with the current token.
    pub fn start(&self) -> Result<(), Error> {
        let auth = self.auth().ok_or(Error::NotAuthenticated)?;
        let dispatch_url = self
            .dispatch_url
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        let session = CloudSession::spawn(
            self.http.clone(),
            dispatch_url,
            auth,
            self.app_id.clone(),
            self.updates.clone(),
            self.reconnect.clone(),
            CancellationToken::new(),
        );

        let previous = self
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(session);
        if let Some(previous) = previous {
            debug!("replacing running cloud session");
            previous.shutdown();
        }
        Ok(())
    }

    /// Stop the session, if one is running. Safe to call repeatedly.
    pub fn stop(&self) {
        let session = self
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(session) = session {
            debug!("stopping cloud session");
            session.shutdown();
        }
    }

    /// Whether the session handshake has completed.
    pub fn is_online(&self) -> bool {
        self.session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(CloudSession::is_connected)
    }

    /// Receive device updates pushed over the session.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DeviceUpdate>> {
        self.updates.subscribe()
    }

    // ── Request helpers ──────────────────────────────────────────────

    pub(crate) fn url(&self, path: &str) -> Result<Url, Error> {
        Ok(self.base_url().join(path)?)
    }

    fn bearer(&self) -> Result<String, Error> {
        let auth = self.auth().ok_or(Error::NotAuthenticated)?;
        Ok(format!("Bearer {}", auth.access_token.expose_secret()))
    }

    /// Authenticated GET, envelope unwrapped.
    pub(crate) async fn get<T: DeserializeOwned>(&self, url: Url) -> Result<T, Error> {
        debug!("GET {}", url);
        let resp = self
            .http
            .get(url)
            .header(reqwest::header::AUTHORIZATION, self.bearer()?)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;
        Self::parse_authed(resp).await
    }

    /// Authenticated POST with a JSON body, envelope unwrapped.
    pub(crate) async fn post<T: DeserializeOwned>(
        &self,
        url: Url,
        body: &impl Serialize,
    ) -> Result<Option<T>, Error> {
        debug!("POST {}", url);
        let resp = self
            .http
            .post(url)
            .header(reqwest::header::AUTHORIZATION, self.bearer()?)
            .json(body)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;
        if resp.status() == reqwest::StatusCode::UNAUTHORIZED {
            return Err(Error::SessionExpired);
        }
        let envelope = Self::read_envelope::<T>(resp).await?;
        Self::check_envelope(&envelope)?;
        Ok(envelope.data)
    }

    async fn parse_authed<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, Error> {
        if resp.status() == reqwest::StatusCode::UNAUTHORIZED {
            return Err(Error::SessionExpired);
        }
        let envelope = Self::read_envelope::<T>(resp).await?;
        Self::check_envelope(&envelope)?;
        envelope.data.ok_or_else(|| Error::Deserialization {
            message: "envelope carried no data".into(),
            body: String::new(),
        })
    }

    /// Unauthenticated POST, returning the raw envelope. Used by login,
    /// which interprets the error codes itself. A 4xx answer yields no
    /// envelope; a 5xx answer is a transport error.
    pub(crate) async fn post_unauthenticated<T: DeserializeOwned>(
        &self,
        url: Url,
        body: &impl Serialize,
    ) -> Result<(reqwest::StatusCode, Option<CloudResponse<T>>), Error> {
        debug!("POST {}", url);
        let resp = self
            .http
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;
        let status = resp.status();
        if status.is_client_error() {
            return Ok((status, None));
        }
        Ok((status, Some(Self::read_envelope(resp).await?)))
    }

    async fn read_envelope<T: DeserializeOwned>(
        resp: reqwest::Response,
    ) -> Result<CloudResponse<T>, Error> {
        let resp = resp.error_for_status()?;
        let body = resp.text().await?;
        serde_json::from_str(&body).map_err(|e| Error::Deserialization {
            message: e.to_string(),
            body,
        })
    }

    /// Map a non-zero envelope code to an error.
    fn check_envelope<T>(envelope: &CloudResponse<T>) -> Result<(), Error> {
        match envelope.error {
            0 => Ok(()),
            code if AUTH_ERROR_CODES.contains(&code) => Err(Error::SessionExpired),
            code => Err(Error::CloudApi {
                code,
                message: envelope.msg.clone().unwrap_or_default(),
            }),
        }
    }

    fn map_send_error(&self, e: reqwest::Error) -> Error {
        if e.is_timeout() {
            Error::Timeout {
                timeout_secs: self.timeout_secs,
            }
        } else {
            Error::Transport(e)
        }
    }
}

impl Drop for CloudClient {
    fn drop(&mut self) {
        self.stop();
    }
}
