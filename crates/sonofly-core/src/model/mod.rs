// ── Domain model ──

pub mod account;
pub mod device;
pub mod device_id;

pub use account::{Account, Mode};
pub use device::{Device, DeviceOverride, Params};
pub use device_id::{AccountId, CAMERA_ID_LEN, DeviceId, DeviceKind, STANDARD_ID_LEN};
