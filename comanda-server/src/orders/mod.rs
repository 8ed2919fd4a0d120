//! Active-orders cache and synchronization against the persistent store
//!
//! The cache is the single shared mutable source of "current active orders"
//! read by consolidation and delivery logic. All mutations go through
//! [`OrdersSyncService::update_item_status`] and the sync passes; the
//! persistent store behind [`OrderRepository`] stays the source of truth and
//! the cache is its eventually-consistent mirror.

pub mod cache;
pub mod repository;
pub mod service;

pub use cache::{ActiveOrderCache, CacheEntry, EntryPhase};
pub use repository::{MemoryRepository, OrderRepository};
pub use service::{OrdersSyncService, SyncReport, SyncSettings};
