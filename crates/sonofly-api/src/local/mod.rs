// LAN transport modules

pub mod client;
pub mod discovery;

pub use client::LocalClient;
pub use discovery::{Announcement, DiscoveryHandle, StaticDiscovery};
