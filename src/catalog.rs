use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::error::SearchError;
use crate::models::{Repo, RepoStatus};
use crate::services::{RepoDirectory, RepoListOptions};

/// Persistent list of tracked repositories.
pub struct RepoCatalog {
    repos: RwLock<Vec<Repo>>,
    db_path: PathBuf,
    /// Held for a whole snapshot-write-rename so renames land in order
    persist_lock: Mutex<()>,
}

impl RepoCatalog {
    /// Load the catalog from `db_path`, starting empty if the file is missing.
    pub fn open(db_path: &Path) -> anyhow::Result<Self> {
        let repos = if db_path.exists() {
            let data = std::fs::read_to_string(db_path)?;
            serde_json::from_str(&data).unwrap_or_else(|e| {
                tracing::warn!("Ignoring unreadable catalog {}: {e}", db_path.display());
                Vec::new()
            })
        } else {
            Vec::new()
        };

        Ok(Self {
            repos: RwLock::new(repos),
            db_path: db_path.to_path_buf(),
            persist_lock: Mutex::new(()),
        })
    }

    pub fn len(&self) -> usize {
        self.repos.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.repos.read().is_empty()
    }

    pub fn get(&self, id: Uuid) -> Option<Repo> {
        self.repos.read().iter().find(|r| r.id == id).cloned()
    }

    pub fn contains_url(&self, url: &str) -> bool {
        self.repos.read().iter().any(|r| r.url == url)
    }

    pub fn insert(&self, repo: Repo) {
        self.repos.write().push(repo);
        self.persist();
    }

    /// Remove a repo, returning it if it was present.
    pub fn remove(&self, id: Uuid) -> Option<Repo> {
        let removed = {
            let mut repos = self.repos.write();
            let idx = repos.iter().position(|r| r.id == id)?;
            repos.remove(idx)
        };
        self.persist();
        Some(removed)
    }

    /// Apply `f` to the repo with `id` and persist. Returns the updated record.
    pub fn update(&self, id: Uuid, f: impl FnOnce(&mut Repo)) -> Option<Repo> {
        let updated = {
            let mut repos = self.repos.write();
            let repo = repos.iter_mut().find(|r| r.id == id)?;
            f(repo);
            repo.clone()
        };
        self.persist();
        Some(updated)
    }

    pub fn set_status(&self, id: Uuid, status: RepoStatus) {
        self.update(id, |r| r.status = status);
    }

    /// Persist the catalog to disk (atomic write via temp file + rename).
    pub fn persist(&self) {
        let _guard = self.persist_lock.lock();
        let data = serde_json::to_string_pretty(&*self.repos.read());
        match data {
            Ok(data) => {
                let tmp_path = self.db_path.with_extension("json.tmp");
                if let Err(e) = std::fs::write(&tmp_path, &data)
                    .and_then(|_| std::fs::rename(&tmp_path, &self.db_path))
                {
                    tracing::warn!("Failed to persist catalog: {e}");
                }
            }
            Err(e) => tracing::warn!("Failed to serialize catalog: {e}"),
        }
    }
}

#[async_trait]
impl RepoDirectory for RepoCatalog {
    async fn list(&self, opts: &RepoListOptions) -> Result<Vec<Repo>, SearchError> {
        let needle = opts.query.to_lowercase();
        let repos = self.repos.read();
        Ok(repos
            .iter()
            .filter(|r| r.uri.to_lowercase().contains(&needle))
            .take(opts.per_page)
            .cloned()
            .collect())
    }

    async fn get_by_uri(&self, uri: &str) -> Result<Repo, SearchError> {
        self.repos
            .read()
            .iter()
            .find(|r| r.uri == uri)
            .cloned()
            .ok_or_else(|| SearchError::RepositoryNotFound(uri.to_string()))
    }
}
