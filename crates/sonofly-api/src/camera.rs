// Camera sub-transport
//
// Camera-class devices use a 6-character identifier and take short text
// commands over UDP. The socket is bound on the first command only.

use std::collections::HashMap;
use std::net::SocketAddr;

use serde_json::json;
use tokio::net::UdpSocket;
use tokio::sync::OnceCell;
use tracing::debug;

use crate::error::Error;

/// UDP client for camera-class devices.
pub struct CameraClient {
    hosts: HashMap<String, SocketAddr>,
    socket: OnceCell<UdpSocket>,
}

impl CameraClient {
    pub fn new(hosts: HashMap<String, SocketAddr>) -> Self {
        Self {
            hosts,
            socket: OnceCell::new(),
        }
    }

    /// Whether the socket has been bound yet.
    pub fn is_started(&self) -> bool {
        self.socket.initialized()
    }

    /// Send `cmd` to the camera known as `camera_id`.
    pub async fn send(&self, camera_id: &str, cmd: &str) -> Result<(), Error> {
        let addr = *self
            .hosts
            .get(camera_id)
            .ok_or_else(|| Error::UnknownCamera(camera_id.to_owned()))?;

        let socket = self
            .socket
            .get_or_try_init(|| async {
                let socket = UdpSocket::bind(("0.0.0.0", 0)).await?;
                debug!(local = ?socket.local_addr().ok(), "camera socket bound");
                Ok::<_, Error>(socket)
            })
            .await?;

        let payload = json!({ "id": camera_id, "cmd": cmd }).to_string();
        socket.send_to(payload.as_bytes(), addr).await?;
        debug!(camera = camera_id, cmd, "camera command sent");
        Ok(())
    }
}
