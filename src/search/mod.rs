//! Concurrent search over the repository directory and repository files.
//!
//! ```text
//!                      Searcher::search
//!                             │
//!               ┌─────────────┴─────────────┐
//!               ▼                           ▼
//!       search_files (fan-out)     search_repositories
//!               │                           │
//!     ┌─────────┼─────────┐                 │
//!     ▼         ▼         ▼                 │
//!   repo A    repo B    repo N   (≤ max_concurrent_repos at once)
//!     └─────────┼─────────┘                 │
//!               └─────────────┬─────────────┘
//!                             ▼
//!                 merge in completion order
//!                 truncate to effective limit
//! ```
//!
//! Every child runs as its own task. A failing child is logged and recorded
//! as a [`BranchFailure`]; its siblings keep going and the caller still gets
//! whatever the others found. A [`CancellationToken`] reaches every service
//! call, and each search cancels itself after [`SearchConfig::timeout`].

pub mod files;
pub mod repos;

use std::future::Future;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::config::SearchConfig;
use crate::error::SearchError;
use crate::models::{BranchFailure, SearchRequest, SearchResult, SearchSource};
use crate::services::{RepoDirectory, Snapshots};

pub use files::filter_files;

/// Everything a search produced.
#[derive(Debug, Clone, Default)]
pub struct SearchOutcome {
    pub results: Vec<SearchResult>,
    pub failures: Vec<BranchFailure>,
    /// Effective limit the results were truncated to
    pub limit: usize,
    succeeded: usize,
}

impl SearchOutcome {
    /// True when at least one source failed and none succeeded.
    pub fn all_failed(&self) -> bool {
        self.succeeded == 0 && !self.failures.is_empty()
    }
}

/// Results and failures merged from a set of child searches.
#[derive(Debug, Default)]
pub struct Partial {
    pub results: Vec<SearchResult>,
    pub failures: Vec<BranchFailure>,
    /// Children that finished without error
    pub succeeded: usize,
}

impl Partial {
    fn from_result(source: SearchSource, res: Result<Vec<SearchResult>, SearchError>) -> Self {
        let mut partial = Partial::default();
        match res {
            Ok(results) => {
                partial.results = results;
                partial.succeeded = 1;
            }
            Err(e) => partial.record(source, e),
        }
        partial
    }

    fn record(&mut self, source: SearchSource, err: SearchError) {
        tracing::warn!("{source} error: {err}");
        self.failures.push(BranchFailure {
            source,
            message: err.to_string(),
        });
    }

    fn extend(&mut self, other: Partial) {
        self.results.extend(other.results);
        self.failures.extend(other.failures);
        self.succeeded += other.succeeded;
    }
}

/// Fans a query out to the repository directory and to each requested
/// repository's files.
#[derive(Clone)]
pub struct Searcher {
    directory: Arc<dyn RepoDirectory>,
    snapshots: Arc<dyn Snapshots>,
    config: SearchConfig,
    repo_slots: Arc<Semaphore>,
}

impl Searcher {
    pub fn new(
        directory: Arc<dyn RepoDirectory>,
        snapshots: Arc<dyn Snapshots>,
        config: SearchConfig,
    ) -> Self {
        let slots = config.max_concurrent_repos.max(1);
        Self {
            directory,
            snapshots,
            config,
            repo_slots: Arc::new(Semaphore::new(slots)),
        }
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Run the file search and the repository search concurrently, merge
    /// both, and truncate to the request's effective limit.
    ///
    /// Never fails: source errors end up in [`SearchOutcome::failures`].
    pub async fn search(&self, req: &SearchRequest, cancel: &CancellationToken) -> SearchOutcome {
        let limit = req.effective_limit();
        let cancel = cancel.child_token();
        let _deadline = self.arm_deadline(&cancel);

        let mut branches = JoinSet::new();
        {
            let this = self.clone();
            let query = req.query.clone();
            let repositories = req.repositories.clone();
            let cancel = cancel.clone();
            spawn_supervised(&mut branches, SearchSource::FileSearch, async move {
                this.search_files(&query, &repositories, limit, &cancel).await
            });
        }
        {
            let this = self.clone();
            let query = req.query.clone();
            let cancel = cancel.clone();
            spawn_supervised(&mut branches, SearchSource::Repositories, async move {
                let res = this.search_repositories(&query, limit, &cancel).await;
                Partial::from_result(SearchSource::Repositories, res)
            });
        }

        let merged = merge(branches).await;
        let mut results = merged.results;
        if results.len() > limit {
            results.truncate(limit);
        }

        tracing::info!(
            "Search {:?}: {} results, {} failures",
            req.query,
            results.len(),
            merged.failures.len()
        );

        SearchOutcome {
            results,
            failures: merged.failures,
            limit,
            succeeded: merged.succeeded,
        }
    }

    /// Cancel `cancel` once the search timeout elapses. Dropping the returned
    /// guard cancels it too, which also stops the timer.
    fn arm_deadline(&self, cancel: &CancellationToken) -> DropGuard {
        let timer = cancel.clone();
        let timeout = self.config.timeout();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(timeout) => {
                    tracing::warn!("Search deadline of {timeout:?} reached, cancelling");
                    timer.cancel();
                }
                _ = timer.cancelled() => {}
            }
        });
        cancel.clone().drop_guard()
    }

    async fn acquire_repo_slot(
        &self,
        cancel: &CancellationToken,
    ) -> Result<OwnedSemaphorePermit, SearchError> {
        let slots = self.repo_slots.clone();
        guarded(cancel, async move {
            slots
                .acquire_owned()
                .await
                .map_err(|_| SearchError::ServiceUnavailable("search worker pool closed".to_string()))
        })
        .await
    }
}

/// Run `fut` unless `cancel` fires first.
pub(crate) async fn guarded<T, F>(cancel: &CancellationToken, fut: F) -> Result<T, SearchError>
where
    F: Future<Output = Result<T, SearchError>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(SearchError::Cancelled),
        res = fut => res,
    }
}

type Supervised = JoinSet<(SearchSource, Result<Partial, JoinError>)>;

/// Spawn `work` as its own task, watched by a supervisor in `set` that
/// reports the task's source even when it panics.
fn spawn_supervised<F>(set: &mut Supervised, source: SearchSource, work: F)
where
    F: Future<Output = Partial> + Send + 'static,
{
    let handle = AbortOnDrop(tokio::spawn(work));
    set.spawn(async move {
        let mut handle = handle;
        let joined = (&mut handle.0).await;
        (source, joined)
    });
}

/// Wait for every task in `set`, appending outputs in completion order.
async fn merge(mut set: Supervised) -> Partial {
    let mut merged = Partial::default();
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((_, Ok(partial))) => merged.extend(partial),
            Ok((source, Err(e))) => merged.record(source, SearchError::from(e)),
            Err(e) => tracing::error!("Search supervisor task failed: {e}"),
        }
    }
    merged
}

/// Aborts the task when dropped, so abandoned supervisors don't leak work.
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::memory::{ready_repo, MemoryDirectory, MemorySnapshots};

    fn searcher(dir: MemoryDirectory, snaps: MemorySnapshots) -> Searcher {
        Searcher::new(Arc::new(dir), Arc::new(snaps), SearchConfig::default())
    }

    #[tokio::test]
    async fn test_empty_request_searches_repositories_only() {
        let dir = MemoryDirectory::with_repos(vec![
            ready_repo("github.com/acme/widgets"),
            ready_repo("github.com/acme/gadgets"),
        ]);
        let s = searcher(dir, MemorySnapshots::new());

        let outcome = s
            .search(&SearchRequest::default(), &CancellationToken::new())
            .await;
        assert_eq!(outcome.limit, 50);
        assert_eq!(outcome.results.len(), 2);
        assert!(outcome.results.iter().all(|r| r.as_repository().is_some()));
        assert!(outcome.failures.is_empty());
        assert!(!outcome.all_failed());
    }

    #[tokio::test]
    async fn test_all_failed_when_only_source_fails() {
        let dir = MemoryDirectory::new();
        dir.fail_listing(SearchError::ServiceUnavailable("down".to_string()));
        let s = searcher(dir, MemorySnapshots::new());

        let outcome = s
            .search(&SearchRequest::new("x", vec![], None), &CancellationToken::new())
            .await;
        assert!(outcome.results.is_empty());
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].source, SearchSource::Repositories);
        assert!(outcome.all_failed());
    }

    #[tokio::test]
    async fn test_cancelled_before_start_records_cancellation() {
        let dir = MemoryDirectory::with_repos(vec![ready_repo("repo")]);
        let snaps = MemorySnapshots::new();
        snaps.insert_tree("repo", &["main.go"]);
        let s = searcher(dir, snaps);

        let cancel = CancellationToken::new();
        cancel.cancel();
        let outcome = s
            .search(&SearchRequest::new("main", vec!["repo".to_string()], None), &cancel)
            .await;
        assert!(outcome.results.is_empty());
        assert_eq!(outcome.failures.len(), 2);
        assert!(outcome
            .failures
            .iter()
            .all(|f| f.message == SearchError::Cancelled.to_string()));
    }

    #[tokio::test]
    async fn test_guarded_passes_through_when_not_cancelled() {
        let cancel = CancellationToken::new();
        let res = guarded(&cancel, async { Ok::<_, SearchError>(7) }).await;
        assert_eq!(res, Ok(7));
    }

    async fn exploding_worker() -> Partial {
        panic!("worker exploded")
    }

    #[tokio::test]
    async fn test_panicking_child_is_recorded_with_its_source() {
        let mut set = JoinSet::new();
        spawn_supervised(
            &mut set,
            SearchSource::Files {
                repository: "boom".to_string(),
            },
            exploding_worker(),
        );
        spawn_supervised(&mut set, SearchSource::Repositories, async {
            Partial {
                succeeded: 1,
                ..Partial::default()
            }
        });

        let merged = merge(set).await;
        assert_eq!(merged.succeeded, 1);
        assert_eq!(merged.failures.len(), 1);
        assert_eq!(
            merged.failures[0].source,
            SearchSource::Files {
                repository: "boom".to_string()
            }
        );
    }
}
