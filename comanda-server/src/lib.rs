//! Comanda Sync Server - real-time order-state distribution for a venue
//!
//! Single-process in-memory broker propagating order, payment and inventory
//! mutations to every connected role-specific client, with per-recipient
//! FIFO streams, offline replay, per-entity optimistic-concurrency versions
//! and read-side notification consolidation.
//!
//! # Module structure
//!
//! ```text
//! comanda-server/src/
//! ├── core/          # Config, state, background tasks
//! ├── versions/      # Per-entity version tracker
//! ├── store/         # Per-recipient event streams
//! ├── queue/         # Offline delivery / acknowledgment queues
//! ├── broadcast/     # Fan-out service, policy table, session registry
//! ├── orders/        # Active-orders cache and sync service
//! ├── consolidate/   # Read-side notification consolidator
//! └── utils/         # Errors, logging
//! ```

pub mod broadcast;
pub mod consolidate;
pub mod core;
pub mod orders;
pub mod queue;
pub mod store;
pub mod utils;
pub mod versions;

// Re-export public types
pub use broadcast::{BroadcastRequest, Broadcaster, SessionRegistry};
pub use consolidate::Consolidator;
pub use core::{BackgroundTasks, Config, ConnectionStatus, ServerState, TaskKind};
pub use orders::{MemoryRepository, OrderRepository, OrdersSyncService};
pub use queue::OfflineQueue;
pub use store::EventStore;
pub use utils::{AppError, AppResult, init_logger, init_logger_with_file};
pub use versions::VersionTracker;

/// Load `.env` and initialize logging
pub fn setup_environment() {
    dotenv::dotenv().ok();
    let log_level = std::env::var("LOG_LEVEL").ok();
    init_logger_with_file(log_level.as_deref(), std::env::var("LOG_DIR").ok().as_deref());
}
