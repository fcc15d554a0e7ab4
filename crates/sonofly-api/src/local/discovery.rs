// Local network discovery
//
// The LAN client does not browse the network itself; it consumes
// announcements from a host-supplied `DiscoveryHandle`.

use std::net::SocketAddr;
use std::sync::{PoisonError, RwLock};

use tokio::sync::broadcast;

/// A device advertising itself on the local network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Announcement {
    pub device_id: String,
    pub addr: SocketAddr,
}

/// Source of device announcements supplied by the host platform.
pub trait DiscoveryHandle: Send + Sync {
    /// Announcements seen so far.
    fn known(&self) -> Vec<Announcement>;

    /// Future announcements.
    fn subscribe(&self) -> broadcast::Receiver<Announcement>;
}

/// Discovery handle backed by a fixed address table, plus manual
/// announcements pushed at runtime.
pub struct StaticDiscovery {
    known: RwLock<Vec<Announcement>>,
    tx: broadcast::Sender<Announcement>,
}

impl StaticDiscovery {
    pub fn new(entries: impl IntoIterator<Item = Announcement>) -> Self {
        let (tx, _) = broadcast::channel(64);
        Self {
            known: RwLock::new(entries.into_iter().collect()),
            tx,
        }
    }

    /// Record an announcement and notify subscribers.
    pub fn announce(&self, announcement: Announcement) {
        {
            let mut known = self.known.write().unwrap_or_else(PoisonError::into_inner);
            known.retain(|a| a.device_id != announcement.device_id);
            known.push(announcement.clone());
        }
        let _ = self.tx.send(announcement);
    }
}

impl DiscoveryHandle for StaticDiscovery {
    fn known(&self) -> Vec<Announcement> {
        self.known
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn subscribe(&self) -> broadcast::Receiver<Announcement> {
        self.tx.subscribe()
    }
}
