//! Cloud WebSocket session with auto-reconnect.
//!
//! Resolves the session endpoint through the region dispatch service,
//! performs the `userOnline` handshake and streams device updates through
//! a caller-owned [`tokio::sync::broadcast`] channel. Reconnects with exponential
//! backoff + jitter until cancelled.
//!
//! # Example
//!
//! ```rust,ignore
//! use sonofly_api::websocket::{CloudSession, ReconnectConfig, UPDATE_CHANNEL_CAPACITY};
//! use tokio_util::sync::CancellationToken;
//!
//! let (tx, mut rx) = tokio::sync::broadcast::channel(UPDATE_CHANNEL_CAPACITY);
//! let session = CloudSession::spawn(http, dispatch_url, auth, None, tx, ReconnectConfig::default(), CancellationToken::new());
//! while let Ok(update) = rx.recv().await {
//!     println!("{}: {:?}", update.device_id, update.params);
//! }
//! session.shutdown();
//! ```

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use futures_util::{SinkExt, StreamExt};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tokio::sync::{broadcast, watch};
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::auth::CloudAuth;
use crate::cloud::models::DispatchResponse;
use crate::error::Error;

// ── Channel capacity / keep-alive ────────────────────────────────────

/// Suggested capacity for the device update broadcast channel.
pub const UPDATE_CHANNEL_CAPACITY: usize = 1024;
const PING_INTERVAL: Duration = Duration::from_secs(90);

// ── DeviceUpdate ─────────────────────────────────────────────────────

/// A state change pushed by the cloud for one device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceUpdate {
    #[serde(rename = "deviceid")]
    pub device_id: String,

    /// Either `"update"` (state change) or `"sysmsg"` (online/offline).
    pub action: String,

    #[serde(default)]
    pub params: Map<String, Value>,
}

// ── ReconnectConfig ──────────────────────────────────────────────────

/// Exponential backoff configuration for session reconnection.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt. Default: 1s.
    pub initial_delay: Duration,

    /// Upper bound on backoff delay. Default: 30s.
    pub max_delay: Duration,

    /// Maximum reconnection attempts before giving up.
    /// `None` means retry forever.
    pub max_retries: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_retries: None,
        }
    }
}

// ── CloudSession ─────────────────────────────────────────────────────

/// Handle to a running cloud session.
///
/// Dropping the handle does not stop the session; call
/// [`shutdown`](Self::shutdown) (or cancel the token passed at spawn).
pub struct CloudSession {
    connected: watch::Receiver<bool>,
    cancel: CancellationToken,
}

impl CloudSession {
    /// Spawn the reconnection loop and return immediately.
    ///
    /// The first connection attempt happens asynchronously.
    pub fn spawn(
        http: reqwest::Client,
        dispatch_url: Url,
        auth: CloudAuth,
        app_id: Option<String>,
        update_tx: broadcast::Sender<Arc<DeviceUpdate>>,
        reconnect: ReconnectConfig,
        cancel: CancellationToken,
    ) -> Self {
        let (connected_tx, connected) = watch::channel(false);

        let ctx = SessionContext {
            http,
            dispatch_url,
            auth,
            app_id,
            update_tx,
            connected_tx,
        };
        let task_cancel = cancel.clone();
        tokio::spawn(async move {
            session_loop(ctx, reconnect, task_cancel).await;
        });

        Self { connected, cancel }
    }

    /// Whether the handshake has completed on the current connection.
    pub fn is_connected(&self) -> bool {
        *self.connected.borrow()
    }

    /// Signal the background task to shut down gracefully.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

struct SessionContext {
    http: reqwest::Client,
    dispatch_url: Url,
    auth: CloudAuth,
    app_id: Option<String>,
    update_tx: broadcast::Sender<Arc<DeviceUpdate>>,
    connected_tx: watch::Sender<bool>,
}

// ── Background reconnection loop ─────────────────────────────────────

/// Main loop: dispatch → connect → handshake → read → on error, backoff.
async fn session_loop(ctx: SessionContext, reconnect: ReconnectConfig, cancel: CancellationToken) {
    let mut attempt: u32 = 0;

    loop {
        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            result = connect_and_read(&ctx, &cancel) => result,
        };
        ctx.connected_tx.send_replace(false);

        match result {
            Ok(()) if cancel.is_cancelled() => break,
            Ok(()) => {
                tracing::info!("cloud session closed cleanly, reconnecting");
                attempt = 0;
            }
            Err(e) => {
                tracing::warn!(error = %e, attempt, "cloud session error");

                if let Some(max) = reconnect.max_retries {
                    if attempt >= max {
                        tracing::error!(
                            max_retries = max,
                            "cloud session reconnection limit reached, giving up"
                        );
                        break;
                    }
                }

                let delay = calculate_backoff(attempt, &reconnect);
                tracing::info!(
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    attempt,
                    "waiting before reconnect"
                );

                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    () = tokio::time::sleep(delay) => {}
                }

                attempt = attempt.saturating_add(1);
            }
        }
    }

    ctx.connected_tx.send_replace(false);
    tracing::debug!("cloud session loop exiting");
}

// ── Single connection lifecycle ──────────────────────────────────────

/// Ask the dispatch service which host serves WebSocket sessions.
async fn resolve_endpoint(ctx: &SessionContext) -> Result<Url, Error> {
    let url = ctx.dispatch_url.join("/dispatch/app")?;
    let resp: DispatchResponse = ctx
        .http
        .get(url)
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;

    match (resp.error, resp.domain, resp.port) {
        (0, Some(domain), Some(port)) => Ok(Url::parse(&format!("wss://{domain}:{port}/api/ws"))?),
        (code, ..) => Err(Error::WebSocketConnect(format!(
            "dispatch returned error {code} without an endpoint"
        ))),
    }
}

/// Establish one session, read until it drops.
async fn connect_and_read(ctx: &SessionContext, cancel: &CancellationToken) -> Result<(), Error> {
    let endpoint = resolve_endpoint(ctx).await?;
    tracing::info!(url = %endpoint, "connecting to cloud session");

    let (ws_stream, _response) = tokio_tungstenite::connect_async(endpoint.as_str())
        .await
        .map_err(|e| Error::WebSocketConnect(e.to_string()))?;

    let (mut write, mut read) = ws_stream.split();

    let handshake = handshake_message(&ctx.auth, ctx.app_id.as_deref());
    write
        .send(tungstenite::Message::text(handshake.to_string()))
        .await
        .map_err(|e| Error::WebSocketConnect(e.to_string()))?;

    let mut ping = tokio::time::interval(PING_INTERVAL);
    ping.tick().await;

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                let _ = write.send(tungstenite::Message::Close(None)).await;
                return Ok(());
            }
            _ = ping.tick() => {
                write
                    .send(tungstenite::Message::text("ping"))
                    .await
                    .map_err(|e| Error::WebSocketConnect(e.to_string()))?;
            }
            frame = read.next() => {
                match frame {
                    Some(Ok(tungstenite::Message::Text(text))) => {
                        handle_text(text.as_str(), ctx)?;
                    }
                    Some(Ok(tungstenite::Message::Close(frame))) => {
                        if let Some(cf) = frame {
                            return Err(Error::WebSocketClosed {
                                code: cf.code.into(),
                                reason: cf.reason.to_string(),
                            });
                        }
                        return Ok(());
                    }
                    Some(Err(e)) => return Err(Error::WebSocketConnect(e.to_string())),
                    None => {
                        tracing::info!("cloud session stream ended");
                        return Ok(());
                    }
                    Some(Ok(_)) => {}
                }
            }
        }
    }
}

fn handshake_message(auth: &CloudAuth, app_id: Option<&str>) -> Value {
    let ts = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();

    json!({
        "action": "userOnline",
        "at": auth.access_token.expose_secret(),
        "apikey": auth.api_key,
        "appid": app_id.unwrap_or_default(),
        "nonce": format!("{ts:08x}"),
        "ts": ts,
        "userAgent": "app",
        "sequence": (ts * 1000).to_string(),
        "version": 8,
    })
}

// ── Message parsing ──────────────────────────────────────────────────

/// Route one text frame: handshake ack, pong, or device update.
fn handle_text(text: &str, ctx: &SessionContext) -> Result<(), Error> {
    if text == "pong" {
        tracing::trace!("cloud session pong");
        return Ok(());
    }

    let value: Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(e) => {
            tracing::debug!(error = %e, "failed to parse cloud session frame");
            return Ok(());
        }
    };

    // Handshake ack carries `config` and an error code.
    if value.get("config").is_some() {
        let code = value.get("error").and_then(Value::as_i64).unwrap_or_default();
        if code != 0 {
            return Err(Error::Authentication {
                message: format!("cloud session handshake rejected (error {code})"),
            });
        }
        ctx.connected_tx.send_replace(true);
        tracing::info!("cloud session online");
        return Ok(());
    }

    parse_and_broadcast(value, &ctx.update_tx);
    Ok(())
}

fn parse_and_broadcast(value: Value, update_tx: &broadcast::Sender<Arc<DeviceUpdate>>) {
    match serde_json::from_value::<DeviceUpdate>(value) {
        Ok(update) => {
            // No subscribers is fine.
            let _ = update_tx.send(Arc::new(update));
        }
        Err(e) => tracing::debug!(error = %e, "ignoring non-update cloud frame"),
    }
}

// ── Backoff calculation ──────────────────────────────────────────────

/// Exponential backoff with jitter.
///
/// `delay = min(initial * 2^attempt, max) * (1 +- 0.25)`
pub(crate) fn calculate_backoff(attempt: u32, config: &ReconnectConfig) -> Duration {
    let exp = i32::try_from(attempt.min(31)).unwrap_or(31);
    let base = config.initial_delay.as_secs_f64() * 2.0_f64.powi(exp);
    let capped = base.min(config.max_delay.as_secs_f64());

    // Deterministic jitter seeded from the attempt number.
    let jitter_factor = 1.0 + 0.25 * (f64::from(attempt) * 7.3).sin();
    Duration::from_secs_f64((capped * jitter_factor).max(0.0))
}

// ── Tests ────────────────────────────────────────────────────────────
