//! In-memory directory and snapshot services.
//!
//! Useful for tests and for embedding the search pipeline without git
//! working copies. Both services support failure injection, and
//! [`MemorySnapshots`] can add artificial latency, hang a repository
//! forever, and report how many listings ran at once.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::debug;

use super::{RepoDirectory, RepoListOptions, Snapshots};
use crate::error::SearchError;
use crate::models::{CommitHandle, FileEntry, Repo, RepoStatus};

/// Build a ready repository record for a URI such as `github.com/acme/widgets`.
pub fn ready_repo(uri: &str) -> Repo {
    let mut repo = Repo::from_url(&format!("https://{uri}"));
    repo.status = RepoStatus::Ready;
    repo
}

/// In-memory repository directory.
#[derive(Default)]
pub struct MemoryDirectory {
    repos: RwLock<Vec<Repo>>,
    listing_error: RwLock<Option<SearchError>>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_repos(repos: Vec<Repo>) -> Self {
        Self {
            repos: RwLock::new(repos),
            listing_error: RwLock::new(None),
        }
    }

    pub fn insert(&self, repo: Repo) {
        self.repos.write().push(repo);
    }

    /// Make every subsequent `list` call fail with `err`.
    pub fn fail_listing(&self, err: SearchError) {
        *self.listing_error.write() = Some(err);
    }
}

#[async_trait]
impl RepoDirectory for MemoryDirectory {
    async fn list(&self, opts: &RepoListOptions) -> Result<Vec<Repo>, SearchError> {
        if let Some(err) = self.listing_error.read().clone() {
            return Err(err);
        }
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

#[derive(Debug, Clone, Default)]
struct Tree {
    paths: Vec<String>,
    /// No default branch: commit resolution fails
    unborn: bool,
    /// Listing never completes
    hangs: bool,
}

/// In-memory snapshot service keyed by repository URI.
#[derive(Default)]
pub struct MemorySnapshots {
    trees: RwLock<HashMap<String, Tree>>,
    delay: Option<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MemorySnapshots {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep for `delay` inside every listing.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Register the default-branch tree of a repository.
    pub fn insert_tree<S: AsRef<str>>(&self, uri: &str, paths: &[S]) {
        let tree = Tree {
            paths: paths.iter().map(|p| p.as_ref().to_string()).collect(),
            ..Tree::default()
        };
        self.trees.write().insert(uri.to_string(), tree);
    }

    /// Register a repository with no resolvable default branch.
    pub fn insert_unborn(&self, uri: &str) {
        let tree = Tree {
            unborn: true,
            ..Tree::default()
        };
        self.trees.write().insert(uri.to_string(), tree);
    }

    /// Register a repository whose listing never returns.
    pub fn insert_hanging(&self, uri: &str) {
        let tree = Tree {
            hangs: true,
            ..Tree::default()
        };
        self.trees.write().insert(uri.to_string(), tree);
    }

    /// Highest number of listings that were running at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn tree(&self, uri: &str) -> Option<Tree> {
        self.trees.read().get(uri).cloned()
    }
}

#[async_trait]
impl Snapshots for MemorySnapshots {
    async fn resolve_commit(
        &self,
        repo: &Repo,
        revision: &str,
    ) -> Result<CommitHandle, SearchError> {
        let tree = self
            .tree(&repo.uri)
            .ok_or_else(|| SearchError::ServiceUnavailable(format!("no snapshot for {}", repo.uri)))?;
        if tree.unborn {
            return Err(SearchError::CommitNotResolved {
                repository: repo.uri.clone(),
                revision: revision.to_string(),
                reason: "repository has no commits".to_string(),
            });
        }
        Ok(CommitHandle {
            repo_id: repo.id,
            repository: repo.uri.clone(),
            sha: format!("mem-{}", if revision.is_empty() { "HEAD" } else { revision }),
        })
    }

    async fn list_files(
        &self,
        commit: &CommitHandle,
        path: &str,
        recursive: bool,
    ) -> Result<Vec<FileEntry>, SearchError> {
        let tree = self.tree(&commit.repository).ok_or_else(|| {
            SearchError::ServiceUnavailable(format!("no snapshot for {}", commit.repository))
        })?;

        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        if tree.hangs {
            std::future::pending::<()>().await;
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let prefix = if path.is_empty() {
            String::new()
        } else {
            format!("{}/", path.trim_end_matches('/'))
        };
        let files: Vec<FileEntry> = tree
            .paths
            .iter()
            .filter_map(|p| p.strip_prefix(prefix.as_str()).map(|rest| (p, rest)))
            .filter(|(_, rest)| recursive || !rest.contains('/'))
            .map(|(p, _)| FileEntry {
                repository: commit.repository.clone(),
                commit: commit.sha.clone(),
                path: p.clone(),
            })
            .collect();

        if files.is_empty() && !path.is_empty() {
            return Err(SearchError::PathNotFound {
                repository: commit.repository.clone(),
                path: path.to_string(),
            });
        }
        debug!("Listed {} files in {}", files.len(), commit.repository);
        Ok(files)
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}
