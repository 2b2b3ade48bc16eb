//! Service interfaces the search pipeline consumes.
//!
//! - [`RepoDirectory`]: find repositories by free-text query or URI
//! - [`Snapshots`]: resolve commits and list the files in their trees
//!
//! The catalog ([`crate::catalog::RepoCatalog`]) and the git-backed
//! [`crate::git::GitSnapshots`] are the production implementations; the
//! [`memory`] module provides in-memory ones.

pub mod memory;

use async_trait::async_trait;

use crate::error::SearchError;
use crate::models::{CommitHandle, FileEntry, Repo};

pub use memory::{MemoryDirectory, MemorySnapshots};

/// Options for listing repositories.
#[derive(Debug, Clone, PartialEq)]
pub struct RepoListOptions {
    pub query: String,
    /// Also search a remote mirror; local-only directories ignore it
    pub remote_search: bool,
    /// Maximum number of repositories to return
    pub per_page: usize,
}

/// Directory of known repositories.
#[async_trait]
pub trait RepoDirectory: Send + Sync {
    /// List repositories matching the options, at most `per_page` of them.
    async fn list(&self, opts: &RepoListOptions) -> Result<Vec<Repo>, SearchError>;

    /// Look up a single repository by its URI.
    async fn get_by_uri(&self, uri: &str) -> Result<Repo, SearchError>;
}

/// Read access to repository snapshots.
#[async_trait]
pub trait Snapshots: Send + Sync {
    /// Resolve a revision to a commit. An empty revision means the default branch.
    async fn resolve_commit(&self, repo: &Repo, revision: &str)
        -> Result<CommitHandle, SearchError>;

    /// List the files under `path` at a commit. An empty path is the tree root.
    async fn list_files(
        &self,
        commit: &CommitHandle,
        path: &str,
        recursive: bool,
    ) -> Result<Vec<FileEntry>, SearchError>;
}
