// ── Reactive device directory ──
//
// Concurrent per-account device map with push-based change notification
// via `watch` channels.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::watch;

use crate::model::{Device, DeviceId, Params};

/// The devices one Registry owns.
///
/// Uses `DashMap` for O(1) concurrent lookups. Every mutation rebuilds the
/// snapshot that subscribers receive, sorted by identifier.
pub(crate) struct DeviceDirectory {
    by_id: DashMap<DeviceId, Arc<Device>>,
    snapshot: watch::Sender<Arc<Vec<Arc<Device>>>>,
}

impl DeviceDirectory {
    pub(crate) fn new() -> Self {
        let (snapshot, _) = watch::channel(Arc::new(Vec::new()));
        Self {
            by_id: DashMap::new(),
            snapshot,
        }
    }

    /// Insert or replace devices in one batch. Returns how many were new.
    pub(crate) fn upsert_all(&self, devices: impl IntoIterator<Item = Device>) -> usize {
        let mut added = 0;
        for device in devices {
            if self
                .by_id
                .insert(device.id.clone(), Arc::new(device))
                .is_none()
            {
                added += 1;
            }
        }
        self.rebuild_snapshot();
        added
    }

    pub(crate) fn remove(&self, id: &DeviceId) -> Option<Arc<Device>> {
        let removed = self.by_id.remove(id).map(|(_, v)| v);
        if removed.is_some() {
            self.rebuild_snapshot();
        }
        removed
    }

    pub(crate) fn get(&self, id: &DeviceId) -> Option<Arc<Device>> {
        self.by_id.get(id).map(|r| Arc::clone(r.value()))
    }

    pub(crate) fn contains(&self, id: &DeviceId) -> bool {
        self.by_id.contains_key(id)
    }

    /// Apply a state change reported by a transport. Unknown ids are ignored.
    pub(crate) fn update(&self, id: &DeviceId, params: Option<&Params>, online: Option<bool>) -> bool {
        let changed = match self.by_id.get_mut(id) {
            Some(mut entry) => {
                let device = Arc::make_mut(entry.value_mut());
                if let Some(params) = params {
                    device.merge_params(params);
                }
                if let Some(online) = online {
                    device.online = online;
                }
                true
            }
            None => false,
        };
        if changed {
            self.rebuild_snapshot();
        }
        changed
    }

    pub(crate) fn snapshot(&self) -> Arc<Vec<Arc<Device>>> {
        self.snapshot.borrow().clone()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<Arc<Vec<Arc<Device>>>> {
        self.snapshot.subscribe()
    }

    pub(crate) fn len(&self) -> usize {
        self.by_id.len()
    }

    // ── Private helpers ──────────────────────────────────────────────

    fn rebuild_snapshot(&self) {
        let mut values: Vec<Arc<Device>> = self.by_id.iter().map(|r| Arc::clone(r.value())).collect();
        values.sort_by(|a, b| a.id.cmp(&b.id));
        // `send_modify` updates unconditionally, even with zero receivers.
        self.snapshot.send_modify(|snap| *snap = Arc::new(values));
    }
}
