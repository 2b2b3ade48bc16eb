use anyhow::{Context, Result};
use std::path::Path;
use walkdir::WalkDir;

/// Clone a git repository to the target directory.
pub fn clone_repo(url: &str, target: &Path, token: Option<&str>) -> Result<()> {
    tracing::info!("Cloning {} into {}", url, target.display());
    git2::build::RepoBuilder::new()
        .fetch_options(fetch_options(token))
        .clone(url, target)
        .with_context(|| format!("Failed to clone {url}"))?;
    tracing::info!("Clone complete: {}", target.display());
    Ok(())
}

/// Fetch from origin and fast-forward the checked-out branch.
/// Returns the new HEAD commit SHA. Fails without touching the working copy
/// if the local branch is not an ancestor of the fetched commit.
pub fn pull_repo(repo_dir: &Path, url: &str, token: Option<&str>) -> Result<String> {
    let repo = git2::Repository::open(repo_dir)
        .with_context(|| format!("Failed to open {}", repo_dir.display()))?;

    let mut remote = match repo.find_remote("origin") {
        Ok(remote) => remote,
        Err(_) => repo.remote_anonymous(url)?,
    };
    let mut opts = fetch_options(token);
    remote
        .fetch::<&str>(&[], Some(&mut opts), None)
        .with_context(|| format!("Failed to fetch {url}"))?;

    let fetch_head = repo.find_reference("FETCH_HEAD")?;
    let fetched = repo.reference_to_annotated_commit(&fetch_head)?;

    let (analysis, _) = repo.merge_analysis(&[&fetched])?;
    if analysis.is_up_to_date() {
        return Ok(repo.head()?.peel_to_commit()?.id().to_string());
    }
    if !analysis.is_fast_forward() {
        anyhow::bail!(
            "Local branch in {} has diverged from {url}, delete and re-add the repo",
            repo_dir.display()
        );
    }

    let branch = repo
        .head()?
        .name()
        .map(str::to_string)
        .context("HEAD is not a named reference")?;
    repo.find_reference(&branch)?
        .set_target(fetched.id(), "repo-scout: fast-forward")?;
    repo.set_head(&branch)?;
    repo.checkout_head(Some(git2::build::CheckoutBuilder::default().force()))?;

    Ok(fetched.id().to_string())
}

/// SHA of the commit HEAD points at.
pub fn head_commit_sha(repo_dir: &Path) -> Result<String> {
    let repo = git2::Repository::open(repo_dir)?;
    let commit = repo.head()?.peel_to_commit()?;
    Ok(commit.id().to_string())
}

/// Total size of all regular files under `dir`.
pub fn dir_size_bytes(dir: &Path) -> u64 {
    WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.metadata().ok())
        .map(|m| m.len())
        .sum()
}

fn fetch_options(token: Option<&str>) -> git2::FetchOptions<'static> {
    let mut callbacks = git2::RemoteCallbacks::new();
    if let Some(token) = token {
        let token = token.to_string();
        callbacks.credentials(move |_url, _username, _allowed| {
            git2::Cred::userpass_plaintext("x-access-token", &token)
        });
    }
    let mut opts = git2::FetchOptions::new();
    opts.remote_callbacks(callbacks);
    opts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dir_size_counts_nested_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("a/b")).unwrap();
        std::fs::write(dir.path().join("top.txt"), "12345").unwrap();
        std::fs::write(dir.path().join("a/b/deep.txt"), "123").unwrap();
        assert_eq!(dir_size_bytes(dir.path()), 8);
    }

    #[test]
    fn test_head_commit_sha_fails_without_commits() {
        let dir = tempfile::tempdir().unwrap();
        git2::Repository::init(dir.path()).unwrap();
        assert!(head_commit_sha(dir.path()).is_err());
    }

    /// Write `name` and commit it on top of HEAD, if any.
    fn commit_file(repo: &git2::Repository, name: &str, content: &str) -> git2::Oid {
        let workdir = repo.workdir().unwrap().to_path_buf();
        std::fs::write(workdir.join(name), content).unwrap();
        let mut index = repo.index().unwrap();
        index.add_path(Path::new(name)).unwrap();
        index.write().unwrap();
        let tree = repo.find_tree(index.write_tree().unwrap()).unwrap();
        let sig = git2::Signature::now("Test", "test@example.com").unwrap();
        let parent = repo.head().ok().and_then(|h| h.peel_to_commit().ok());
        let parents: Vec<&git2::Commit> = parent.iter().collect();
        repo.commit(Some("HEAD"), &sig, &sig, name, &tree, &parents)
            .unwrap()
    }

    #[test]
    fn test_pull_fast_forwards_to_upstream() {
        let src = tempfile::tempdir().unwrap();
        let upstream = git2::Repository::init(src.path()).unwrap();
        let first = commit_file(&upstream, "main.go", "package main");

        let dst = tempfile::tempdir().unwrap();
        let target = dst.path().join("clone");
        let url = src.path().to_string_lossy().to_string();
        clone_repo(&url, &target, None).unwrap();

        // Nothing new upstream
        assert_eq!(pull_repo(&target, &url, None).unwrap(), first.to_string());

        let second = commit_file(&upstream, "util.go", "package main");
        assert_eq!(pull_repo(&target, &url, None).unwrap(), second.to_string());
        assert_eq!(head_commit_sha(&target).unwrap(), second.to_string());
        assert!(target.join("util.go").exists());
    }

    #[test]
    fn test_pull_refuses_diverged_branch() {
        let src = tempfile::tempdir().unwrap();
        let upstream = git2::Repository::init(src.path()).unwrap();
        commit_file(&upstream, "main.go", "package main");

        let dst = tempfile::tempdir().unwrap();
        let target = dst.path().join("clone");
        let url = src.path().to_string_lossy().to_string();
        clone_repo(&url, &target, None).unwrap();

        commit_file(&upstream, "upstream.go", "package main");
        let local = commit_file(
            &git2::Repository::open(&target).unwrap(),
            "local.go",
            "package main",
        );

        let err = pull_repo(&target, &url, None).unwrap_err();
        assert!(err.to_string().contains("diverged"));
        assert_eq!(head_commit_sha(&target).unwrap(), local.to_string());
        assert!(!target.join("upstream.go").exists());
    }

    #[test]
    fn test_clone_from_local_path() {
        let src = tempfile::tempdir().unwrap();
        let repo = git2::Repository::init(src.path()).unwrap();
        std::fs::write(src.path().join("main.go"), "package main").unwrap();
        let mut index = repo.index().unwrap();
        index.add_path(Path::new("main.go")).unwrap();
        index.write().unwrap();
        let tree = repo.find_tree(index.write_tree().unwrap()).unwrap();
        let sig = git2::Signature::now("Test", "test@example.com").unwrap();
        let oid = repo
            .commit(Some("HEAD"), &sig, &sig, "initial", &tree, &[])
            .unwrap();

        let dst = tempfile::tempdir().unwrap();
        let target = dst.path().join("clone");
        let url = src.path().to_string_lossy().to_string();
        clone_repo(&url, &target, None).unwrap();

        assert!(target.join("main.go").exists());
        assert_eq!(head_commit_sha(&target).unwrap(), oid.to_string());
    }
}
