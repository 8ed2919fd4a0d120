pub mod config;
pub mod state;
pub mod tasks;

pub use config::Config;
pub use state::{ConnectionStatus, ServerState};
pub use tasks::{BackgroundTasks, TaskKind};
