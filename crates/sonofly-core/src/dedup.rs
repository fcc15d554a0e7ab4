// ── Device ownership arbiter ──
//
// Binds each device identifier to exactly one account, first claim wins.
// The table lives for the process lifetime and is never pruned.

use std::sync::{Arc, LazyLock};

use dashmap::DashMap;

use crate::model::{AccountId, Device, DeviceId};

static GLOBAL: LazyLock<Arc<DedupArbiter>> = LazyLock::new(|| Arc::new(DedupArbiter::new()));

/// Process-wide device ownership table.
///
/// All mutation goes through [`claim`](Self::claim), which is atomic per
/// identifier: two accounts racing for the same device observe the same
/// winner. Tests use fresh instances; the binary uses [`global`](Self::global).
#[derive(Debug, Default)]
pub struct DedupArbiter {
    owners: DashMap<DeviceId, AccountId>,
}

impl DedupArbiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// The shared process-wide arbiter.
    pub fn global() -> Arc<Self> {
        Arc::clone(&GLOBAL)
    }

    /// Record `account` as owner of `device` unless it already has one.
    /// Returns the owner after the call.
    pub fn claim(&self, device: &DeviceId, account: &AccountId) -> AccountId {
        self.owners
            .entry(device.clone())
            .or_insert_with(|| account.clone())
            .value()
            .clone()
    }

    /// Keep only the devices `account` owns, claiming unowned ones.
    pub fn filter_owned(&self, account: &AccountId, devices: Vec<Device>) -> Vec<Device> {
        devices
            .into_iter()
            .filter(|device| {
                let owner = self.claim(&device.id, account);
                if owner != *account {
                    tracing::debug!(
                        device = %device.id,
                        %owner,
                        account = %account,
                        "device already owned by another account"
                    );
                }
                owner == *account
            })
            .collect()
    }

    pub fn owner_of(&self, device: &DeviceId) -> Option<AccountId> {
        self.owners.get(device).map(|owner| owner.value().clone())
    }

    pub fn len(&self) -> usize {
        self.owners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }
}
