//! Error types for the search pipeline.

use thiserror::Error;

/// Errors raised by the directory service, the snapshot service, or the
/// search workers that call them.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SearchError {
    /// A directory or snapshot call failed outright
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    /// No repository is registered under the URI
    #[error("repository not found: {0}")]
    RepositoryNotFound(String),

    /// The revision could not be resolved to a commit
    #[error("could not resolve revision {revision:?} in {repository}: {reason}")]
    CommitNotResolved {
        repository: String,
        revision: String,
        reason: String,
    },

    /// The requested tree path does not exist at the commit
    #[error("path {path:?} not found in {repository}")]
    PathNotFound { repository: String, path: String },

    /// The search was cancelled or hit its deadline
    #[error("search cancelled")]
    Cancelled,

    /// A worker task panicked or was aborted
    #[error("search task failed: {0}")]
    TaskFailed(String),
}

impl From<tokio::task::JoinError> for SearchError {
    fn from(e: tokio::task::JoinError) -> Self {
        if e.is_cancelled() {
            SearchError::Cancelled
        } else {
            SearchError::TaskFailed(e.to_string())
        }
    }
}

impl From<git2::Error> for SearchError {
    fn from(e: git2::Error) -> Self {
        SearchError::ServiceUnavailable(e.message().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commit_not_resolved_message_names_repository() {
        let err = SearchError::CommitNotResolved {
            repository: "github.com/acme/widgets".to_string(),
            revision: String::new(),
            reason: "reference 'refs/heads/main' not found".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("github.com/acme/widgets"));
        assert!(msg.contains("\"\""));
    }
}
