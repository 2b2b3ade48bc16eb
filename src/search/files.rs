use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use super::{guarded, merge, spawn_supervised, Partial, Searcher};
use crate::error::SearchError;
use crate::models::{FileEntry, SearchResult, SearchSource};

impl Searcher {
    /// Search file names in every repository concurrently.
    ///
    /// `limit` caps each repository separately; the caller truncates the
    /// merged output. At most `max_concurrent_repos` repositories are
    /// searched at once.
    pub async fn search_files(
        &self,
        query: &str,
        repositories: &[String],
        limit: usize,
        cancel: &CancellationToken,
    ) -> Partial {
        let mut workers = JoinSet::new();
        for uri in repositories {
            let source = SearchSource::Files {
                repository: uri.clone(),
            };
            let this = self.clone();
            let query = query.to_string();
            let uri = uri.clone();
            let cancel = cancel.clone();
            spawn_supervised(&mut workers, source.clone(), async move {
                let res = match this.acquire_repo_slot(&cancel).await {
                    Ok(_permit) => this.search_files_in_repo(&query, &uri, limit, &cancel).await,
                    Err(e) => Err(e),
                };
                Partial::from_result(source, res)
            });
        }

        merge(workers).await
    }

    /// Search the default-branch file names of one repository.
    pub async fn search_files_in_repo(
        &self,
        query: &str,
        uri: &str,
        limit: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<SearchResult>, SearchError> {
        let repo = guarded(cancel, self.directory.get_by_uri(uri)).await?;
        let commit = guarded(cancel, self.snapshots.resolve_commit(&repo, "")).await?;
        let files = guarded(cancel, self.snapshots.list_files(&commit, "", true)).await?;

        let total = files.len();
        let matches = filter_files(files, query, limit);
        tracing::debug!(
            "{uri}@{}: {} of {total} files match {query:?}",
            commit.sha,
            matches.len()
        );
        Ok(matches)
    }
}

/// Keep files whose name contains `query` (case-sensitive), in listing
/// order, stopping once `limit` have matched.
pub fn filter_files(files: Vec<FileEntry>, query: &str, limit: usize) -> Vec<SearchResult> {
    files
        .into_iter()
        .filter(|f| f.name().contains(query))
        .take(limit)
        .map(SearchResult::File)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SearchConfig;
    use crate::services::memory::{ready_repo, MemoryDirectory, MemorySnapshots};
    use std::sync::Arc;

    fn entries(paths: &[&str]) -> Vec<FileEntry> {
        paths
            .iter()
            .map(|p| FileEntry {
                repository: "repo".to_string(),
                commit: "c0ffee".to_string(),
                path: p.to_string(),
            })
            .collect()
    }

    fn names(results: &[SearchResult]) -> Vec<&str> {
        results
            .iter()
            .filter_map(|r| r.as_file())
            .map(|f| f.path.as_str())
            .collect()
    }

    #[test]
    fn test_filter_is_case_sensitive() {
        let files = entries(&["foo_test.go"]);
        assert_eq!(filter_files(files.clone(), "test", 10).len(), 1);
        assert!(filter_files(files, "TEST", 10).is_empty());
    }

    #[test]
    fn test_filter_empty_query_matches_everything() {
        let files = entries(&["a.rs", "b/c.rs", "Makefile"]);
        assert_eq!(filter_files(files, "", 10).len(), 3);
    }

    #[test]
    fn test_filter_stops_at_limit_in_listing_order() {
        let files = entries(&["x1", "y", "x2", "x3", "x4"]);
        let results = filter_files(files, "x", 2);
        assert_eq!(names(&results), vec!["x1", "x2"]);
    }

    #[test]
    fn test_filter_matches_base_name_only() {
        let files = entries(&["cmd/server.go", "cmd/main.go"]);
        assert!(filter_files(files.clone(), "cmd", 10).is_empty());
        assert_eq!(names(&filter_files(files, "main", 10)), vec!["cmd/main.go"]);
    }

    fn searcher(uris: &[&str], snaps: MemorySnapshots) -> Searcher {
        let dir = MemoryDirectory::with_repos(uris.iter().map(|u| ready_repo(u)).collect());
        Searcher::new(Arc::new(dir), Arc::new(snaps), SearchConfig::default())
    }

    #[tokio::test]
    async fn test_worker_on_empty_repository_returns_nothing() {
        let snaps = MemorySnapshots::new();
        snaps.insert_tree::<&str>("empty", &[]);
        let s = searcher(&["empty"], snaps);

        let res = s
            .search_files_in_repo("anything", "empty", 50, &CancellationToken::new())
            .await
            .unwrap();
        assert!(res.is_empty());
    }

    #[tokio::test]
    async fn test_worker_fails_for_unknown_repository() {
        let s = searcher(&[], MemorySnapshots::new());
        let err = s
            .search_files_in_repo("", "github.com/nobody/nothing", 50, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SearchError::RepositoryNotFound(_)));
    }

    #[tokio::test]
    async fn test_worker_fails_without_default_commit() {
        let snaps = MemorySnapshots::new();
        snaps.insert_unborn("fresh");
        let s = searcher(&["fresh"], snaps);
        let err = s
            .search_files_in_repo("", "fresh", 50, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SearchError::CommitNotResolved { .. }));
    }

    #[tokio::test]
    async fn test_fan_out_caps_each_repository_separately() {
        let snaps = MemorySnapshots::new();
        snaps.insert_tree("a", &["m1", "m2", "m3"]);
        snaps.insert_tree("b", &["m4", "m5", "m6"]);
        let s = searcher(&["a", "b"], snaps);

        let partial = s
            .search_files("m", &["a".to_string(), "b".to_string()], 2, &CancellationToken::new())
            .await;
        assert_eq!(partial.results.len(), 4);
        assert_eq!(partial.succeeded, 2);
    }

    #[tokio::test]
    async fn test_fan_out_keeps_siblings_of_failed_worker() {
        let snaps = MemorySnapshots::new();
        snaps.insert_tree("ok", &["main.rs"]);
        let s = searcher(&["ok"], snaps);

        let partial = s
            .search_files(
                "main",
                &["ok".to_string(), "missing".to_string()],
                10,
                &CancellationToken::new(),
            )
            .await;
        assert_eq!(names(&partial.results), vec!["main.rs"]);
        assert_eq!(partial.failures.len(), 1);
        assert_eq!(
            partial.failures[0].source,
            SearchSource::Files {
                repository: "missing".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_fan_out_with_no_repositories_is_empty() {
        let s = searcher(&[], MemorySnapshots::new());
        let partial = s.search_files("x", &[], 10, &CancellationToken::new()).await;
        assert!(partial.results.is_empty());
        assert!(partial.failures.is_empty());
        assert_eq!(partial.succeeded, 0);
    }
}
