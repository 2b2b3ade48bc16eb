//! # repo-scout
//!
//! Search tracked git repositories by name and by file name. One query fans
//! out to two independent sources that run concurrently:
//!
//! ```text
//!                        ┌──────────────┐
//!                        │  User Query  │
//!                        └──────┬───────┘
//!                               │
//!                ┌──────────────┴──────────────┐
//!                ▼                             ▼
//!     ┌─────────────────────┐       ┌─────────────────────┐
//!     │  Repository search  │       │  File search        │
//!     │  catalog by URI     │       │  one task per repo  │
//!     │  ≤ limit hits       │       │  ≤ limit hits each  │
//!     └──────────┬──────────┘       └──────────┬──────────┘
//!                │                             │ HEAD tree walk
//!                │                             │ name substring match
//!                └──────────────┬──────────────┘
//!                               ▼
//!                  ┌─────────────────────────┐
//!                  │  Merge (arrival order)  │
//!                  │  truncate to limit      │
//!                  │  keep per-source errors │
//!                  └────────────┬────────────┘
//!                               ▼
//!                  ┌─────────────────────────┐
//!                  │  Results + failures     │
//!                  └─────────────────────────┘
//! ```
//!
//! ## Module Overview
//!
//! - [`config`] - Environment-based configuration for server, data dir, and search limits
//! - [`models`] - Shared data types: `Repo`, `FileEntry`, `SearchResult`, request/response types
//! - [`error`] - `SearchError`, the failure taxonomy of the search pipeline
//! - [`services`] - Directory and snapshot traits, plus in-memory implementations
//! - [`catalog`] - Persistent repo list; the production repository directory
//! - [`git`] - Cloning, syncing, and libgit2-backed snapshot browsing
//! - [`search`] - The concurrent fan-out/fan-in search pipeline
//! - [`api`] - Axum HTTP handlers for repo management and search
//! - [`state`] - Shared application state

pub mod api;
pub mod catalog;
pub mod config;
pub mod error;
pub mod git;
pub mod models;
pub mod search;
pub mod services;
pub mod state;
