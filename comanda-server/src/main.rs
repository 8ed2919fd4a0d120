use std::sync::Arc;

use comanda_server::{BackgroundTasks, Config, MemoryRepository, ServerState, setup_environment};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Environment (dotenv, logging)
    setup_environment();

    tracing::info!("Comanda sync server starting...");

    // 2. Configuration
    let config = Config::from_env();

    // 3. Wire the broker against the in-memory repository (standalone mode;
    //    a deployment embeds ServerState behind its own repository)
    let repo = Arc::new(MemoryRepository::new());
    let state = ServerState::initialize(&config, repo);
    state.log_startup_banner();

    // 4. Background tasks: sync timers and TTL sweeper
    let mut tasks = BackgroundTasks::new();
    state.start_background_tasks(&mut tasks);

    // 5. Run until interrupted, then drain the tasks
    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");
    tasks.shutdown().await;

    Ok(())
}
