//! Git working copies: cloning, syncing, and snapshot browsing.

mod clone;
mod snapshot;

pub use clone::{clone_repo, dir_size_bytes, head_commit_sha, pull_repo};
pub use snapshot::GitSnapshots;
