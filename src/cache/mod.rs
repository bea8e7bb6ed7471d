//! Snapshot caching and event-driven invalidation

pub mod events;
pub mod ttl;

pub use events::{EventKind, EventMonitor, InvalidationEvent, InvalidationObserver};
pub use ttl::{CacheEntry, CacheKey, CacheStatistics, TtlCache, DEFAULT_TTL};
