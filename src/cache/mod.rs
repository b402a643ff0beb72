//! Request cache with time-based expiry over a persistent store.
//!
//! This module provides:
//! - A storage trait with a SQLite backend that survives restarts
//! - A read-through cache manager that owns the staleness policy
//! - An injectable clock so expiry can be exercised deterministically

mod clock;
mod layer;
mod storage;

pub use clock::{Clock, SystemClock};
pub use layer::{CacheManager, CacheResult, CacheSource};
pub use storage::{CacheEntry, CacheStorage, NoopStorage, SqliteStorage};
