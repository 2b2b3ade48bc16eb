use std::sync::Arc;

use crate::catalog::RepoCatalog;
use crate::config::Config;
use crate::git::GitSnapshots;
use crate::search::Searcher;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub catalog: Arc<RepoCatalog>,
    pub searcher: Searcher,
    pub clone_semaphore: Arc<tokio::sync::Semaphore>,
}

impl AppState {
    pub fn new(config: Config) -> anyhow::Result<Self> {
        // Ensure data directories exist
        std::fs::create_dir_all(config.repos_dir())?;

        let catalog = Arc::new(RepoCatalog::open(&config.db_path())?);
        let snapshots = Arc::new(GitSnapshots::new(config.repos_dir()));
        let searcher = Searcher::new(catalog.clone(), snapshots, config.search.clone());
        let max_concurrent_clones = config.max_concurrent_clones.max(1);

        Ok(Self {
            config,
            catalog,
            searcher,
            clone_semaphore: Arc::new(tokio::sync::Semaphore::new(max_concurrent_clones)),
        })
    }
}
