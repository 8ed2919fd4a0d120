//! Entity version tracking for optimistic-concurrency detection
//!
//! One monotonically increasing counter per `(entity_type, entity_id)` key.
//! Every consumer's conflict detection leans on these numbers being strictly
//! increasing with no duplicates, so the increment must stay atomic under
//! concurrent callers - the DashMap entry guard serializes writers per key.
//!
//! This tracker is the single writer of version counters; no other component
//! increments them. Counters live for the process lifetime only.

use dashmap::DashMap;
use shared::{EntityChange, EntityOperation, EntityType};

/// Per-entity version counters
#[derive(Debug, Default)]
pub struct VersionTracker {
    versions: DashMap<(EntityType, String), u64>,
}

impl VersionTracker {
    pub fn new() -> Self {
        Self {
            versions: DashMap::new(),
        }
    }

    /// Increment the counter for the entity and return the new value
    ///
    /// Starts at 1 for an unseen entity.
    pub fn next(&self, entity_type: EntityType, entity_id: &str) -> u64 {
        let mut entry = self
            .versions
            .entry((entity_type, entity_id.to_string()))
            .or_insert(0);
        *entry += 1;
        *entry
    }

    /// Current counter value, 0 if unseen
    pub fn current(&self, entity_type: EntityType, entity_id: &str) -> u64 {
        self.versions
            .get(&(entity_type, entity_id.to_string()))
            .map(|v| *v)
            .unwrap_or(0)
    }

    /// Increment and wrap the result in an [`EntityChange`]
    pub fn change(
        &self,
        entity_type: EntityType,
        entity_id: &str,
        operation: EntityOperation,
    ) -> EntityChange {
        let version = self.next(entity_type, entity_id);
        EntityChange::new(entity_type, entity_id, operation, version)
    }
}
