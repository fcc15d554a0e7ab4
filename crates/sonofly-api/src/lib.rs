// sonofly-api: Async Rust clients for eWeLink-compatible devices (cloud, LAN, camera)

pub mod auth;
pub mod camera;
pub mod cloud;
pub mod error;
pub mod local;
pub mod transport;
pub mod websocket;

pub use auth::{CloudAuth, CloudRegion};
pub use camera::CameraClient;
pub use cloud::{CloudClient, CloudDevice};
pub use error::Error;
pub use local::{Announcement, DiscoveryHandle, LocalClient, StaticDiscovery};
pub use transport::TransportConfig;
pub use websocket::{DeviceUpdate, ReconnectConfig};
