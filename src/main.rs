use axum::routing::{delete, get, post};
use axum::Router;
use tracing_subscriber::EnvFilter;

use repo_scout::api;
use repo_scout::config::Config;
use repo_scout::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env();
    tracing::info!("Data directory: {}", config.data_dir.display());
    tracing::info!(
        "Search: {} concurrent repos, {}s timeout",
        config.search.max_concurrent_repos,
        config.search.timeout_secs
    );

    let state = AppState::new(config.clone())?;
    tracing::info!("Catalog holds {} repos", state.catalog.len());

    let app = Router::new()
        .route("/api/repos", get(api::repos::list_repos))
        .route("/api/repos", post(api::repos::add_repo))
        .route("/api/repos/{id}", delete(api::repos::delete_repo))
        .route("/api/repos/{id}/sync", post(api::repos::sync_repo))
        .route("/api/search", post(api::search::search))
        .route("/api/config", get(api::repos::get_config))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app).await?;
    Ok(())
}
