#![deny(missing_docs)]
//! yoloc core library.
//!
//! This crate contains the domain types, checks and commit-history analysis
//! that compute a repository's YOLO compliance score. The CLI and HTTP
//! server are thin shells around [`orchestrator::run_with_store`].

use std::future::Future;
use std::pin::Pin;

pub mod cache;
pub mod cancel;
pub mod check;
/// Built-in checks and their registry.
pub mod checks;
pub mod clone;
pub mod config;
pub mod domain;
pub mod error;
pub mod fs;
pub mod history;
pub mod orchestrator;
pub mod persist;
pub mod registry;
pub mod report;
pub mod scan;
pub mod score;
pub mod web;

/// Boxed, sendable future returned by the async collaborator traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub use cache::{ArcCache, FingerprintCache};
pub use cancel::{CancelHandle, CancelOnDrop, CancelToken, cancel_pair};
pub use check::Check;
pub use checks::{CheckDeps, DEFAULT_CHECKS, build_checks};
pub use config::{RepoSlug, RunConfig, Settings};
pub use domain::{CheckOutcome, CheckResult, CheckRow, Commit, PullRequest, Review};
pub use error::{Result, YolocError};
pub use fs::{FileSystem, StdFileSystem};
pub use history::{CommitHistory, GithubGraphql, HistoryQuery, HistorySource};
pub use orchestrator::{Scorecard, run_checks, run_with_store};
pub use persist::{DiskStore, NullStore, PersistedBlob, ResultStore, open_store};
pub use report::{RenderOptions, render_json, render_markdown, render_text};
pub use score::{Personality, label, level, percentage, personality};
