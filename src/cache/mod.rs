// Redis 上的协调状态

pub mod sync_lock;

pub use sync_lock::{SyncLock, SyncLockGuard};
