//! Connectivity orchestration between `sonofly-api` transports and a host.
//!
//! - **[`Hub`]**: host-facing facade. Loads, reloads and unloads accounts,
//!   schedules setup retries, and routes commands.
//!
//! - **[`SetupOrchestrator`]**: per-account state machine. Logs in, loads
//!   the device list from the cloud or from the [`DeviceCache`], and starts
//!   the transports the account's [`Mode`] admits.
//!
//! - **[`Registry`]**: one account's device directory plus its cloud and
//!   LAN transports. Delivers commands LAN-first with cloud fallback.
//!
//! - **[`DedupArbiter`]**: process-wide device ownership. A device reported
//!   by several accounts is controlled only through the first claimant.
//!
//! - **[`CommandDispatcher`]**: resolves a raw identifier to its owning
//!   registry, or to the camera sub-transport for 6-character ids.

pub mod config;
pub mod convert;
pub mod dedup;
pub mod dispatcher;
pub mod error;
pub mod hub;
pub mod model;
pub mod orchestrator;
pub mod registry;
pub mod store;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::HubConfig;
pub use dedup::DedupArbiter;
pub use dispatcher::{CommandDispatcher, Dispatched, RawCommand};
pub use error::CoreError;
pub use hub::Hub;
pub use orchestrator::{SetupEntry, SetupOrchestrator, SetupOutcome, SetupState};
pub use registry::{Registry, Route};
pub use store::{DeviceCache, FileStorage, MemoryStorage, Storage};
pub use transport::{
    CameraTransport, ClientFactory, CloudTransport, LocalTransport, TransportFactory,
    camera_transport,
};

pub use model::{
    Account, AccountId, CAMERA_ID_LEN, Device, DeviceId, DeviceKind, DeviceOverride, Mode, Params,
    STANDARD_ID_LEN,
};
