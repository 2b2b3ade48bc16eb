use tokio_util::sync::CancellationToken;

use super::{guarded, Searcher};
use crate::error::SearchError;
use crate::models::SearchResult;
use crate::services::RepoListOptions;

impl Searcher {
    /// Ask the directory for repositories matching `query`, at most `limit`
    /// of them, in the order the directory returns them.
    pub async fn search_repositories(
        &self,
        query: &str,
        limit: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<SearchResult>, SearchError> {
        let opts = RepoListOptions {
            query: query.to_string(),
            remote_search: false,
            per_page: limit,
        };
        let repos = guarded(cancel, self.directory.list(&opts)).await?;
        Ok(repos.into_iter().map(SearchResult::Repository).collect())
    }
}
