//! Bounded commit history reconstruction with provenance derivation.

mod github;
mod query;

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::BoxFuture;
use crate::cache::FingerprintCache;
use crate::cancel::CancelToken;
use crate::domain::{Commit, PullRequest, Review};
use crate::error::Result;

pub use github::GithubGraphql;
pub use query::{
    Connection, HistoryPage, HistoryQuery, RawCommit, RawGitActor, RawLogin, RawPullRequest,
    RawRepository, RawReview, RawSignature,
};

/// Walk stops once at least this many commits have been collected.
pub const MAX_COMMITS: usize = 200;
/// Walk stops after the first commit older than this many days.
pub const MAX_COMMIT_AGE_DAYS: i64 = 365;

/// A paginated source of commit history.
pub trait HistorySource: Send + Sync {
    /// Fetch one page of history starting after `cursor`.
    ///
    /// An unknown branch yields an empty page without a next page.
    fn fetch_page<'a>(
        &'a self,
        query: &'a HistoryQuery,
        cursor: Option<&'a str>,
    ) -> BoxFuture<'a, Result<HistoryPage>>;
}

/// Commit history analyzer over a [`HistorySource`].
#[derive(Clone)]
pub struct CommitHistory {
    source: Arc<dyn HistorySource>,
}

impl CommitHistory {
    /// Wrap a history source.
    pub fn new(source: Arc<dyn HistorySource>) -> Self {
        Self { source }
    }

    /// Newest-first commits of `query.branch`, bounded by count and age.
    ///
    /// Results are cached by query fingerprint; a cache hit performs no
    /// remote calls.
    pub async fn commits(
        &self,
        cancel: &CancelToken,
        query: &HistoryQuery,
        cache: &FingerprintCache,
    ) -> Result<Vec<Commit>> {
        self.commits_at(cancel, query, cache, Utc::now()).await
    }

    async fn commits_at(
        &self,
        cancel: &CancelToken,
        query: &HistoryQuery,
        cache: &FingerprintCache,
        now: DateTime<Utc>,
    ) -> Result<Vec<Commit>> {
        let fingerprint = query.fingerprint();
        if let Some(cached) = cache.get(&fingerprint) {
            log::debug!(
                "history cache hit for {}/{}@{} ({} commits)",
                query.owner,
                query.name,
                query.branch,
                cached.len()
            );
            return Ok(cached);
        }

        let cutoff = now - Duration::days(MAX_COMMIT_AGE_DAYS);
        let mut commits = Vec::new();
        let mut cursor: Option<String> = None;
        let mut pages = 0usize;

        loop {
            let page = cancel
                .guard(self.source.fetch_page(query, cursor.as_deref()))
                .await?;
            pages += 1;

            let mut aged_out = false;
            for raw in &page.nodes {
                let commit = derive_commit(raw, &query.owner, &query.name);
                let too_old = commit.committed_date < cutoff;
                commits.push(commit);
                if too_old {
                    aged_out = true;
                    break;
                }
            }

            if aged_out || commits.len() >= MAX_COMMITS || !page.has_next_page {
                break;
            }
            match page.end_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        log::info!(
            "walked {pages} history page(s) for {}/{}@{}: {} commits",
            query.owner,
            query.name,
            query.branch,
            commits.len()
        );
        cache.add(fingerprint, commits.clone());
        Ok(commits)
    }
}

/// Derive provenance flags for one raw commit of `owner/name`.
pub fn derive_commit(raw: &RawCommit, owner: &str, name: &str) -> Commit {
    let signature = raw.signature.clone().unwrap_or_default();
    let committer = raw.committer.as_ref().and_then(|actor| {
        if let Some(user) = &actor.user {
            return Some(user.login.clone());
        }
        let by_github = actor.name.as_deref() == Some("GitHub")
            && signature.is_valid
            && signature.was_signed_by_github;
        by_github.then(|| "github".to_string())
    });
    let author_login = raw
        .author
        .as_ref()
        .and_then(|actor| actor.user.as_ref())
        .map(|user| user.login.as_str());

    let mut approved = false;
    let mut reviewed = false;
    let mut pull_request = None;

    let candidates = raw
        .associated_pull_requests
        .as_ref()
        .map(|connection| connection.nodes.as_slice())
        .unwrap_or_default();
    if let Some(pr) = candidates.iter().find(|pr| belongs_to(pr, owner, name)) {
        let pr_author = pr.author.as_ref().map(|login| login.login.as_str());
        let merged_by = pr.merged_by.as_ref().map(|login| login.login.as_str());

        // Merging someone else's change counts as tacit approval.
        if merged_by.is_some() && merged_by != author_login {
            approved = true;
            reviewed = true;
        }

        let reviews: Vec<Review> = pr
            .reviews
            .as_ref()
            .map(|connection| connection.nodes.as_slice())
            .unwrap_or_default()
            .iter()
            .map(|review| Review {
                author: review.author.as_ref().map(|login| login.login.clone()),
                state: review.state.clone(),
            })
            .collect();
        for review in &reviews {
            if review.author.as_deref() != pr_author {
                reviewed = true;
            }
            if review.is_approval() {
                approved = true;
            }
        }

        pull_request = Some(PullRequest {
            number: pr.number,
            head_sha: pr.head_ref_oid.clone(),
            merged_at: pr.merged_at,
            author: pr_author.map(str::to_string),
            merged_by: merged_by.map(str::to_string),
            reviews,
        });
    }

    Commit {
        sha: raw.oid.clone(),
        committed_date: raw.committed_date,
        committer,
        signed: signature.is_valid,
        approved,
        reviewed,
        pull_request,
    }
}

fn belongs_to(pr: &RawPullRequest, owner: &str, name: &str) -> bool {
    pr.repository.name == name
        && pr
            .repository
            .owner
            .as_ref()
            .is_some_and(|login| login.login == owner)
}
