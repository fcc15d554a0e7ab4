// ── Runtime hub configuration ──
//
// Built by the binary from `sonofly-config`; core never reads files.

use std::collections::HashMap;
use std::time::Duration;

use crate::model::{DeviceId, DeviceOverride};

/// Tuning for a [`Hub`](crate::Hub).
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Delay before the first setup retry.
    pub retry_initial: Duration,
    /// Upper bound for the doubling retry delay.
    pub retry_max: Duration,
    /// Per-device overrides applied to every account's directory.
    pub overrides: HashMap<DeviceId, DeviceOverride>,
}

impl HubConfig {
    /// Delay before retry number `attempt` (0-based).
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.min(16));
        self.retry_initial.saturating_mul(factor).min(self.retry_max)
    }
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            retry_initial: Duration::from_secs(30),
            retry_max: Duration::from_secs(300),
            overrides: HashMap::new(),
        }
    }
}
