use std::sync::Arc;
use std::time::Duration;

use sequencer_server::config::Config;
use sequencer_server::persistence::{FsColdStore, InMemoryHotStore};
use sequencer_server::registry::SessionRegistry;
use sequencer_server::router::{create_router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = Config::from_env();

    let hot = Arc::new(InMemoryHotStore::default());
    let cold = Arc::new(FsColdStore::new(config.data_dir.clone(), config.max_sessions));
    let registry = Arc::new(SessionRegistry::new(
        hot,
        cold,
        Duration::from_secs(config.idle_flush_secs),
    ));

    let state = AppState { registry };
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "session server listening");

    axum::serve(listener, app).await?;

    Ok(())
}
