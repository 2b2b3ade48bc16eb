use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Result count used when a request does not ask for one
pub const DEFAULT_LIMIT: usize = 50;
/// Hard ceiling on the result count, whatever the request asks for
pub const MAX_LIMIT: usize = 1000;

/// A tracked repository
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Repo {
    pub id: Uuid,
    /// Host-qualified path, e.g. `github.com/acme/widgets`
    pub uri: String,
    pub url: String,
    pub name: String,
    pub status: RepoStatus,
    pub added_at: DateTime<Utc>,
    #[serde(default)]
    pub synced_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub head_commit: Option<String>,
}

impl Repo {
    /// Build a fresh catalog record for a clone URL.
    pub fn from_url(url: &str) -> Self {
        let uri = uri_from_url(url);
        let name = uri.rsplit('/').next().unwrap_or("repo").to_string();
        Self {
            id: Uuid::new_v4(),
            uri,
            url: url.to_string(),
            name,
            status: RepoStatus::Cloning,
            added_at: Utc::now(),
            synced_at: None,
            head_commit: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum RepoStatus {
    Cloning,
    Indexing,
    Ready,
    Error(String),
}

/// Derive a repository URI from a clone URL:
/// `https://user@github.com/acme/widgets.git/` becomes `github.com/acme/widgets`.
pub fn uri_from_url(url: &str) -> String {
    let rest = url.split_once("://").map(|(_, r)| r).unwrap_or(url);
    let rest = match rest.split_once('@') {
        Some((user, host)) if !user.contains('/') => host,
        _ => rest,
    };
    rest.trim_end_matches('/').trim_end_matches(".git").to_string()
}

/// A resolved commit in one repository.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommitHandle {
    pub repo_id: Uuid,
    pub repository: String,
    pub sha: String,
}

/// A file listed from a commit tree.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileEntry {
    pub repository: String,
    pub commit: String,
    /// Path relative to the repository root, `/`-separated
    pub path: String,
}

impl FileEntry {
    /// Base name of the file: the last path segment.
    pub fn name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }
}

/// A single search hit: either a matching repository or a matching file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SearchResult {
    Repository(Repo),
    File(FileEntry),
}

impl SearchResult {
    pub fn as_repository(&self) -> Option<&Repo> {
        match self {
            SearchResult::Repository(repo) => Some(repo),
            SearchResult::File(_) => None,
        }
    }

    pub fn as_file(&self) -> Option<&FileEntry> {
        match self {
            SearchResult::File(file) => Some(file),
            SearchResult::Repository(_) => None,
        }
    }
}

/// Search request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchRequest {
    #[serde(default)]
    pub query: String,
    /// Repository URIs whose files are searched
    #[serde(default)]
    pub repositories: Vec<String>,
    /// Requested result count
    #[serde(default)]
    pub first: Option<i32>,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>, repositories: Vec<String>, first: Option<i32>) -> Self {
        Self {
            query: query.into(),
            repositories,
            first,
        }
    }

    /// The result cap actually enforced for this request.
    pub fn effective_limit(&self) -> usize {
        effective_limit(self.first)
    }
}

/// Absent or non-positive counts fall back to [`DEFAULT_LIMIT`]; anything
/// above [`MAX_LIMIT`] is clamped.
pub fn effective_limit(first: Option<i32>) -> usize {
    match first {
        Some(n) if n > 0 => (n as usize).min(MAX_LIMIT),
        _ => DEFAULT_LIMIT,
    }
}

/// Which part of a search a failure came from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SearchSource {
    /// The repository directory query
    Repositories,
    /// The file-search fan-out as a whole
    FileSearch,
    /// File search in one repository
    Files { repository: String },
}

impl fmt::Display for SearchSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchSource::Repositories => write!(f, "repository search"),
            SearchSource::FileSearch => write!(f, "file search"),
            SearchSource::Files { repository } => write!(f, "file search in {repository}"),
        }
    }
}

/// A child search that failed while its siblings carried on.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BranchFailure {
    pub source: SearchSource,
    pub message: String,
}

/// Add-repo request
#[derive(Debug, Clone, Deserialize)]
pub struct AddRepoRequest {
    pub url: String,
}

/// Query string for listing repos
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListReposQuery {
    #[serde(default)]
    pub query: String,
    pub per_page: Option<usize>,
}

/// Search response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub query: String,
    pub limit: usize,
    pub results: Vec<SearchResult>,
    pub failures: Vec<BranchFailure>,
}
