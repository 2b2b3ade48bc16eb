use async_trait::async_trait;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::error::SearchError;
use crate::models::{CommitHandle, FileEntry, Repo};
use crate::services::Snapshots;

/// Snapshot service over the cloned working copies in `repos_dir`.
///
/// Each repository lives at `<repos_dir>/<repo id>`. All libgit2 calls run on
/// the blocking pool.
#[derive(Debug, Clone)]
pub struct GitSnapshots {
    repos_dir: PathBuf,
}

impl GitSnapshots {
    pub fn new(repos_dir: impl Into<PathBuf>) -> Self {
        Self {
            repos_dir: repos_dir.into(),
        }
    }

    pub fn repo_dir(&self, repo_id: Uuid) -> PathBuf {
        self.repos_dir.join(repo_id.to_string())
    }
}

#[async_trait]
impl Snapshots for GitSnapshots {
    async fn resolve_commit(
        &self,
        repo: &Repo,
        revision: &str,
    ) -> Result<CommitHandle, SearchError> {
        let dir = self.repo_dir(repo.id);
        let repo_id = repo.id;
        let uri = repo.uri.clone();
        let revision = revision.to_string();
        tokio::task::spawn_blocking(move || resolve_commit(&dir, repo_id, &uri, &revision)).await?
    }

    async fn list_files(
        &self,
        commit: &CommitHandle,
        path: &str,
        recursive: bool,
    ) -> Result<Vec<FileEntry>, SearchError> {
        let dir = self.repo_dir(commit.repo_id);
        let commit = commit.clone();
        let path = path.to_string();
        tokio::task::spawn_blocking(move || list_files(&dir, &commit, &path, recursive)).await?
    }
}

fn open(dir: &Path, uri: &str) -> Result<git2::Repository, SearchError> {
    git2::Repository::open(dir).map_err(|e| {
        SearchError::ServiceUnavailable(format!("cannot open {uri}: {}", e.message()))
    })
}

fn resolve_commit(
    dir: &Path,
    repo_id: Uuid,
    uri: &str,
    revision: &str,
) -> Result<CommitHandle, SearchError> {
    let repo = open(dir, uri)?;
    let resolved = if revision.is_empty() {
        repo.head().and_then(|head| head.peel_to_commit())
    } else {
        repo.revparse_single(revision)
            .and_then(|obj| obj.peel_to_commit())
    };
    let commit = resolved.map_err(|e| SearchError::CommitNotResolved {
        repository: uri.to_string(),
        revision: revision.to_string(),
        reason: e.message().to_string(),
    })?;

    Ok(CommitHandle {
        repo_id,
        repository: uri.to_string(),
        sha: commit.id().to_string(),
    })
}

fn list_files(
    dir: &Path,
    commit: &CommitHandle,
    path: &str,
    recursive: bool,
) -> Result<Vec<FileEntry>, SearchError> {
    let repo = open(dir, &commit.repository)?;
    let unresolved = |e: git2::Error| SearchError::CommitNotResolved {
        repository: commit.repository.clone(),
        revision: commit.sha.clone(),
        reason: e.message().to_string(),
    };
    let oid = git2::Oid::from_str(&commit.sha).map_err(unresolved)?;
    let root = repo.find_commit(oid).and_then(|c| c.tree()).map_err(unresolved)?;

    let path = path.trim_matches('/');
    let tree = if path.is_empty() {
        root
    } else {
        let not_found = |_: git2::Error| SearchError::PathNotFound {
            repository: commit.repository.clone(),
            path: path.to_string(),
        };
        root.get_path(Path::new(path))
            .and_then(|entry| entry.to_object(&repo))
            .and_then(|obj| obj.peel_to_tree())
            .map_err(not_found)?
    };
    let base = if path.is_empty() {
        String::new()
    } else {
        format!("{path}/")
    };

    let mut paths = Vec::new();
    if recursive {
        tree.walk(git2::TreeWalkMode::PreOrder, |parent, entry| {
            if entry.kind() == Some(git2::ObjectType::Blob) {
                if let Some(name) = entry.name() {
                    paths.push(format!("{base}{parent}{name}"));
                }
            }
            git2::TreeWalkResult::Ok
        })?;
    } else {
        for entry in tree.iter() {
            if entry.kind() == Some(git2::ObjectType::Blob) {
                if let Some(name) = entry.name() {
                    paths.push(format!("{base}{name}"));
                }
            }
        }
    }

    Ok(paths
        .into_iter()
        .map(|path| FileEntry {
            repository: commit.repository.clone(),
            commit: commit.sha.clone(),
            path,
        })
        .collect())
}
