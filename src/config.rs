use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Where cloned repos and the catalog are stored
    pub data_dir: PathBuf,
    /// Server bind address
    pub bind_addr: String,
    /// Search fan-out configuration
    pub search: SearchConfig,
    /// Maximum number of repos allowed
    pub max_repos: usize,
    /// Maximum concurrent clone operations
    pub max_concurrent_clones: usize,
    /// Clone timeout in seconds
    pub clone_timeout_secs: u64,
    /// Maximum repo size in MB (checked after clone)
    pub max_repo_size_mb: u64,
    /// Git personal access token for cloning private repos
    pub git_token: Option<String>,
}

/// Limits applied to every search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Repositories whose files are searched at the same time
    pub max_concurrent_repos: usize,
    /// Deadline for one whole search, in seconds
    pub timeout_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_concurrent_repos: 8,
            timeout_secs: 30,
        }
    }
}

impl SearchConfig {
    /// Deadline for one search, at least one second.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            bind_addr: "127.0.0.1:9000".to_string(),
            search: SearchConfig::default(),
            max_repos: 50,
            max_concurrent_clones: 2,
            clone_timeout_secs: 300,
            max_repo_size_mb: 500,
            git_token: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(dir) = std::env::var("REPO_SCOUT_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Ok(addr) = std::env::var("REPO_SCOUT_BIND_ADDR") {
            config.bind_addr = addr;
        }
        if let Some(v) = parse_env("REPO_SCOUT_MAX_REPOS") {
            config.max_repos = v;
        }
        if let Some(v) = parse_env("REPO_SCOUT_MAX_CONCURRENT_CLONES") {
            config.max_concurrent_clones = v;
        }
        if let Some(v) = parse_env("REPO_SCOUT_CLONE_TIMEOUT_SECS") {
            config.clone_timeout_secs = v;
        }
        if let Some(v) = parse_env("REPO_SCOUT_MAX_REPO_SIZE_MB") {
            config.max_repo_size_mb = v;
        }
        if let Ok(token) = std::env::var("REPO_SCOUT_GIT_TOKEN") {
            config.git_token = Some(token);
        }

        // Search config
        if let Some(v) = parse_env::<usize>("REPO_SCOUT_SEARCH_CONCURRENCY") {
            config.search.max_concurrent_repos = v.max(1);
        }
        if let Some(v) = parse_env::<u64>("REPO_SCOUT_SEARCH_TIMEOUT_SECS") {
            config.search.timeout_secs = v.max(1);
        }

        config
    }

    pub fn repos_dir(&self) -> PathBuf {
        self.data_dir.join("repos")
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("repos.json")
    }
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok()?.parse().ok()
}
