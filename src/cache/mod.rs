//! Versioned response cache with offline support.
//!
//! This module provides:
//! - Named buckets of request -> response entries, one bucket per version tag
//! - Network-first and cache-first strategies over a single bucket
//! - A small key/value store for data waiting on background delivery

mod layer;
mod storage;
mod traits;

pub use layer::CacheLayer;
pub use storage::{CacheStorage, KeyValueStore, SqliteStorage};
pub use traits::CacheResult;
#[cfg(test)]
pub use traits::CacheSource;
