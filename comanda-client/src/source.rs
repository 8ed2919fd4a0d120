//! Transport seam between the reconciler and the server
//!
//! The event/ack contract is transport-agnostic: a short-interval polling
//! adapter and a push-stream adapter both satisfy it. Implementations wrap
//! whatever carries bytes to the broker (in-process references in tests,
//! HTTP or a socket in deployments).

use async_trait::async_trait;
use shared::{EntityType, Event};

use crate::error::ClientResult;

/// Pluggable transport for one connection's event stream
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Fetch events, optionally after the last-seen event id
    ///
    /// The cursor must be echoed on every subsequent poll to avoid
    /// redundant redelivery.
    async fn poll(&self, last_event_id: Option<&str>) -> ClientResult<Vec<Event>>;

    /// Replay entries queued while this connection was offline
    ///
    /// Must be called before resuming live consumption after a reconnect.
    async fn drain_offline(&self) -> ClientResult<Vec<Event>>;

    /// Echo event ids back as acknowledged
    async fn acknowledge(&self, event_ids: &[String]) -> ClientResult<()>;

    /// Fetch one entity's authoritative state after a version gap
    ///
    /// Returns the entity's current version, `None` if it no longer exists.
    async fn resync_entity(
        &self,
        entity_type: EntityType,
        entity_id: &str,
    ) -> ClientResult<Option<u64>>;
}
