use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use uuid::Uuid;

use crate::config::SearchConfig;
use crate::models::{AddRepoRequest, ListReposQuery, Repo, RepoStatus, DEFAULT_LIMIT, MAX_LIMIT};
use crate::services::{RepoDirectory, RepoListOptions};
use crate::state::AppState;

/// GET /api/repos - List tracked repos, optionally filtered by URI substring
pub async fn list_repos(
    State(state): State<AppState>,
    Query(params): Query<ListReposQuery>,
) -> Result<Json<Vec<Repo>>, (StatusCode, String)> {
    let opts = RepoListOptions {
        query: params.query,
        remote_search: false,
        per_page: params.per_page.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT),
    };
    state
        .catalog
        .list(&opts)
        .await
        .map(Json)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
}

/// POST /api/repos - Add a new repo (clone in background)
pub async fn add_repo(
    State(state): State<AppState>,
    Json(req): Json<AddRepoRequest>,
) -> Result<(StatusCode, Json<Repo>), (StatusCode, String)> {
    let url = req.url.trim().to_string();
    if url.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "URL is required".to_string()));
    }

    // Only network URLs: local paths would expose the server's filesystem
    if !url.starts_with("https://") && !url.starts_with("git://") && !url.starts_with("http://") {
        return Err((
            StatusCode::BAD_REQUEST,
            "Only https://, http://, and git:// URLs are allowed".to_string(),
        ));
    }

    if state.catalog.contains_url(&url) {
        return Err((
            StatusCode::CONFLICT,
            "A repo with this URL has already been added".to_string(),
        ));
    }
    if state.catalog.len() >= state.config.max_repos {
        return Err((
            StatusCode::BAD_REQUEST,
            format!(
                "Maximum number of repos ({}) reached",
                state.config.max_repos
            ),
        ));
    }

    let repo = Repo::from_url(&url);
    state.catalog.insert(repo.clone());

    // Spawn background task to clone
    let repo_id = repo.id;
    let state_clone = state.clone();
    tokio::spawn(async move {
        if let Err(e) = clone_into_catalog(&state_clone, repo_id, &url).await {
            tracing::error!("Failed to clone {url}: {e:#}");
            state_clone
                .catalog
                .set_status(repo_id, RepoStatus::Error(format!("{e:#}")));
        }
    });

    Ok((StatusCode::CREATED, Json(repo)))
}

/// DELETE /api/repos/:id - Remove a repo and its working copy
pub async fn delete_repo(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, (StatusCode, String)> {
    if state.catalog.remove(id).is_none() {
        return Err((StatusCode::NOT_FOUND, "Repo not found".to_string()));
    }

    let repo_dir = state.config.repos_dir().join(id.to_string());
    if repo_dir.exists() {
        if let Err(e) = std::fs::remove_dir_all(&repo_dir) {
            tracing::warn!("Failed to remove {}: {e}", repo_dir.display());
        }
    }

    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/repos/:id/sync - Fetch latest commits in the background
pub async fn sync_repo(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<(StatusCode, Json<Repo>), (StatusCode, String)> {
    let repo = state
        .catalog
        .get(id)
        .ok_or_else(|| (StatusCode::NOT_FOUND, "Repo not found".to_string()))?;

    if !matches!(repo.status, RepoStatus::Ready | RepoStatus::Error(_)) {
        return Err((
            StatusCode::CONFLICT,
            "Repo is already being processed".to_string(),
        ));
    }

    let repo_dir = state.config.repos_dir().join(id.to_string());
    if !repo_dir.exists() {
        return Err((
            StatusCode::BAD_REQUEST,
            "Repo directory not found on disk. Delete and re-add the repo.".to_string(),
        ));
    }

    let updated = state
        .catalog
        .update(id, |r| r.status = RepoStatus::Indexing)
        .ok_or_else(|| (StatusCode::NOT_FOUND, "Repo not found".to_string()))?;

    let state_clone = state.clone();
    tokio::spawn(async move {
        if let Err(e) = sync_working_copy(&state_clone, &repo).await {
            tracing::error!("Failed to sync {}: {e:#}", repo.uri);
            state_clone
                .catalog
                .set_status(repo.id, RepoStatus::Error(format!("{e:#}")));
        }
    });

    Ok((StatusCode::OK, Json(updated)))
}

/// GET /api/config - Current search settings
pub async fn get_config(State(state): State<AppState>) -> Json<ConfigResponse> {
    Json(ConfigResponse {
        default_limit: DEFAULT_LIMIT,
        max_limit: MAX_LIMIT,
        search: state.searcher.config().clone(),
        max_repos: state.config.max_repos,
    })
}

#[derive(serde::Serialize)]
pub struct ConfigResponse {
    pub default_limit: usize,
    pub max_limit: usize,
    pub search: SearchConfig,
    pub max_repos: usize,
}

/// Clone a newly added repo and mark it ready.
async fn clone_into_catalog(state: &AppState, repo_id: Uuid, url: &str) -> anyhow::Result<()> {
    let repo_dir = state.config.repos_dir().join(repo_id.to_string());

    // Acquire clone permit (limits concurrent clones)
    let _permit = state
        .clone_semaphore
        .acquire()
        .await
        .map_err(|_| anyhow::anyhow!("Clone semaphore closed"))?;

    let url_owned = url.to_string();
    let repo_dir_clone = repo_dir.clone();
    let git_token = state.config.git_token.clone();
    let timeout = std::time::Duration::from_secs(state.config.clone_timeout_secs);

    let clone_result = tokio::time::timeout(
        timeout,
        tokio::task::spawn_blocking(move || {
            crate::git::clone_repo(&url_owned, &repo_dir_clone, git_token.as_deref())
        }),
    )
    .await;

    match clone_result {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(e))) => {
            cleanup(&repo_dir);
            return Err(e);
        }
        Ok(Err(e)) => {
            cleanup(&repo_dir);
            anyhow::bail!("Clone task failed: {e}");
        }
        Err(_) => {
            cleanup(&repo_dir);
            anyhow::bail!("Clone timed out after {}s", state.config.clone_timeout_secs);
        }
    }

    // Check repo size limit
    let max_bytes = state.config.max_repo_size_mb * 1024 * 1024;
    let size_check_dir = repo_dir.clone();
    let repo_size =
        tokio::task::spawn_blocking(move || crate::git::dir_size_bytes(&size_check_dir)).await?;
    if repo_size > max_bytes {
        cleanup(&repo_dir);
        anyhow::bail!(
            "Repo size ({} MB) exceeds limit ({} MB)",
            repo_size / (1024 * 1024),
            state.config.max_repo_size_mb
        );
    }

    let head_commit = match crate::git::head_commit_sha(&repo_dir) {
        Ok(sha) => Some(sha),
        Err(e) => {
            tracing::warn!("Could not read HEAD for {url}: {e}");
            None
        }
    };

    let updated = state.catalog.update(repo_id, |r| {
        r.status = RepoStatus::Ready;
        r.synced_at = Some(Utc::now());
        r.head_commit = head_commit;
    });
    if updated.is_none() {
        // Deleted while the clone was running
        tracing::info!("Repo {url} was removed during clone, discarding working copy");
        cleanup(&repo_dir);
        return Ok(());
    }

    tracing::info!("Repo {url} is ready for search");
    Ok(())
}

/// Fetch and fast-forward an existing working copy.
async fn sync_working_copy(state: &AppState, repo: &Repo) -> anyhow::Result<()> {
    let repo_dir = state.config.repos_dir().join(repo.id.to_string());

    // Acquire clone permit (shared with clone operations)
    let _permit = state
        .clone_semaphore
        .acquire()
        .await
        .map_err(|_| anyhow::anyhow!("Clone semaphore closed"))?;

    let url_owned = repo.url.clone();
    let git_token = state.config.git_token.clone();
    let timeout = std::time::Duration::from_secs(state.config.clone_timeout_secs);

    let new_head = tokio::time::timeout(
        timeout,
        tokio::task::spawn_blocking(move || {
            crate::git::pull_repo(&repo_dir, &url_owned, git_token.as_deref())
        }),
    )
    .await
    .map_err(|_| anyhow::anyhow!("Sync timed out after {}s", state.config.clone_timeout_secs))???;

    if repo.head_commit.as_deref() == Some(new_head.as_str()) {
        tracing::info!("Sync {}: HEAD unchanged ({new_head})", repo.uri);
    } else {
        tracing::info!(
            "Sync {}: HEAD {} -> {new_head}",
            repo.uri,
            repo.head_commit.as_deref().unwrap_or("(unknown)")
        );
    }

    state.catalog.update(repo.id, |r| {
        r.status = RepoStatus::Ready;
        r.synced_at = Some(Utc::now());
        r.head_commit = Some(new_head);
    });
    Ok(())
}

fn cleanup(repo_dir: &std::path::Path) {
    if let Err(e) = std::fs::remove_dir_all(repo_dir) {
        tracing::debug!("Nothing to clean up at {}: {e}", repo_dir.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn local_upstream(dir: &std::path::Path) -> String {
        let repo = git2::Repository::init(dir).unwrap();
        std::fs::write(dir.join("main.go"), "package main").unwrap();
        let mut index = repo.index().unwrap();
        index.add_path(std::path::Path::new("main.go")).unwrap();
        index.write().unwrap();
        let tree = repo.find_tree(index.write_tree().unwrap()).unwrap();
        let sig = git2::Signature::now("Test", "test@example.com").unwrap();
        repo.commit(Some("HEAD"), &sig, &sig, "initial", &tree, &[])
            .unwrap();
        dir.to_string_lossy().to_string()
    }

    fn test_state(data_dir: &std::path::Path) -> AppState {
        AppState::new(Config {
            data_dir: data_dir.to_path_buf(),
            ..Config::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_clone_marks_repo_ready() {
        let upstream = tempfile::tempdir().unwrap();
        let url = local_upstream(upstream.path());
        let data = tempfile::tempdir().unwrap();
        let state = test_state(data.path());
        let repo = Repo::from_url(&url);
        let id = repo.id;
        state.catalog.insert(repo);

        clone_into_catalog(&state, id, &url).await.unwrap();

        let stored = state.catalog.get(id).unwrap();
        assert_eq!(stored.status, RepoStatus::Ready);
        assert!(stored.head_commit.is_some());
        assert!(state.config.repos_dir().join(id.to_string()).exists());
    }

    #[tokio::test]
    async fn test_clone_of_removed_repo_leaves_no_working_copy() {
        let upstream = tempfile::tempdir().unwrap();
        let url = local_upstream(upstream.path());
        let data = tempfile::tempdir().unwrap();
        let state = test_state(data.path());

        // Never inserted, as if deleted before the clone finished
        let id = Uuid::new_v4();
        clone_into_catalog(&state, id, &url).await.unwrap();

        assert!(state.catalog.get(id).is_none());
        assert!(!state.config.repos_dir().join(id.to_string()).exists());
    }
}
