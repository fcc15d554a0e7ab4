// ── Persistence and device directory ──

pub mod cache;
pub(crate) mod directory;
pub mod storage;

pub use cache::{CACHE_NAMESPACE, CACHE_VERSION, DeviceCache};
pub use storage::{FileStorage, MemoryStorage, Storage};
