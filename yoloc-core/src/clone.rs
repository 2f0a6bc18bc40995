//! Local checkouts of remote repositories.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tokio::process::Command;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::BoxFuture;
use crate::cancel::CancelToken;
use crate::config::RepoSlug;
use crate::error::{Result, YolocError};

/// Produces a local working copy of a repository.
pub trait RepoCloner: Send + Sync {
    /// Check out `branch` of `slug`, retrying once with `fallback`.
    ///
    /// An existing checkout is reused.
    fn checkout<'a>(
        &'a self,
        cancel: &'a CancelToken,
        slug: &'a RepoSlug,
        branch: &'a str,
        fallback: &'a str,
    ) -> BoxFuture<'a, Result<PathBuf>>;
}

/// Cloner shelling out to `git`.
#[derive(Debug, Clone)]
pub struct GitCloner {
    web_url: String,
    root: PathBuf,
}

impl GitCloner {
    /// Clone from `web_url` into `<root>/<owner>/<name>`.
    pub fn new(web_url: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            web_url: web_url.into(),
            root: root.into(),
        }
    }

    /// Where `slug` is checked out.
    pub fn dest(&self, slug: &RepoSlug) -> PathBuf {
        self.root.join(&slug.owner).join(&slug.name)
    }

    fn remote_url(&self, slug: &RepoSlug) -> String {
        format!("{}/{slug}.git", self.web_url.trim_end_matches('/'))
    }

    async fn clone_into(
        &self,
        cancel: &CancelToken,
        slug: &RepoSlug,
        branch: &str,
        fallback: &str,
    ) -> Result<PathBuf> {
        let dest = self.dest(slug);
        if dest.join(".git").exists() {
            log::info!("reusing checkout of {slug} at {}", dest.display());
            return Ok(dest);
        }
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let url = self.remote_url(slug);
        match cancel.guard(run_clone(&url, branch, &dest)).await {
            Ok(()) => Ok(dest),
            Err(YolocError::Cancelled) => {
                remove_partial(&dest).await;
                Err(YolocError::Cancelled)
            }
            Err(err) if branch != fallback => {
                log::warn!("clone of {slug}@{branch} failed, trying {fallback}: {err}");
                remove_partial(&dest).await;
                let outcome = cancel.guard(run_clone(&url, fallback, &dest)).await;
                if outcome.is_err() {
                    remove_partial(&dest).await;
                }
                outcome.map(|()| dest)
            }
            Err(err) => {
                remove_partial(&dest).await;
                Err(err)
            }
        }
    }
}

impl RepoCloner for GitCloner {
    fn checkout<'a>(
        &'a self,
        cancel: &'a CancelToken,
        slug: &'a RepoSlug,
        branch: &'a str,
        fallback: &'a str,
    ) -> BoxFuture<'a, Result<PathBuf>> {
        Box::pin(self.clone_into(cancel, slug, branch, fallback))
    }
}

async fn run_clone(url: &str, branch: &str, dest: &Path) -> Result<()> {
    let output = Command::new("git")
        .args([
            "clone",
            "--depth",
            "1",
            "--single-branch",
            "--no-tags",
            "--branch",
            branch,
            url,
        ])
        .arg(dest)
        .env("GIT_TERMINAL_PROMPT", "0")
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|err| YolocError::Other(format!("git command failed: {err}")))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let stdout = String::from_utf8_lossy(&output.stdout);
        let detail = if stderr.trim().is_empty() {
            stdout.trim().to_string()
        } else {
            stderr.trim().to_string()
        };
        return Err(YolocError::Other(format!(
            "git clone of {url}@{branch} failed: {detail}"
        )));
    }
    Ok(())
}

async fn remove_partial(dest: &Path) {
    if let Err(err) = tokio::fs::remove_dir_all(dest).await {
        if err.kind() != std::io::ErrorKind::NotFound {
            log::warn!("failed to remove partial checkout {}: {err}", dest.display());
        }
    }
}

/// Per-repository leases serializing clone-and-scan.
#[derive(Debug, Default)]
pub struct CloneLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl CloneLocks {
    /// Create an empty lock table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive use of `slug`'s checkout.
    pub async fn lease(&self, slug: &RepoSlug) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self
                .locks
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            Arc::clone(locks.entry(slug.to_string()).or_default())
        };
        lock.lock_owned().await
    }
}
