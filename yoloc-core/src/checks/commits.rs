//! Commit provenance check.

use chrono::{DateTime, Duration, Utc};

use crate::BoxFuture;
use crate::cancel::CancelToken;
use crate::check::Check;
use crate::config::RunConfig;
use crate::domain::{CheckResult, Commit};
use crate::error::Result;
use crate::history::{CommitHistory, HistoryQuery};
use crate::score::deficiency;

/// Days without commits after which a project counts as abandoned.
pub const ABANDONED_AFTER_DAYS: i64 = 90;

const SIGNED_MAX: u32 = 5;
const APPROVED_MAX: u32 = 10;
const REVIEWED_MAX: u32 = 10;
const ASSOCIATED_MAX: u32 = 5;
const ABANDONED_MAX: u32 = 5;
const EMPTY_MAX: u32 = 10;

/// Scores signing, approval, review and pull request usage of recent commits.
pub struct CommitsCheck {
    history: CommitHistory,
}

impl CommitsCheck {
    /// Check backed by `history`.
    pub fn new(history: CommitHistory) -> Self {
        Self { history }
    }

    async fn evaluate(&self, cancel: &CancelToken, config: &RunConfig) -> Result<Vec<CheckResult>> {
        let slug = &config.slug;
        let query = HistoryQuery::new(&slug.owner, &slug.name, &config.branch);
        let mut commits = self
            .history
            .commits(cancel, &query, &config.history_cache)
            .await?;

        if commits.is_empty() && config.branch != config.fallback_branch {
            log::info!(
                "no history for {slug}@{}; retrying with {}",
                config.branch,
                config.fallback_branch
            );
            let fallback = HistoryQuery::new(&slug.owner, &slug.name, &config.fallback_branch);
            commits = self
                .history
                .commits(cancel, &fallback, &config.history_cache)
                .await?;
        }

        Ok(score_commits(&commits, Utc::now()))
    }
}

impl Check for CommitsCheck {
    fn id(&self) -> &str {
        "commits"
    }

    fn run<'a>(
        &'a self,
        cancel: &'a CancelToken,
        config: &'a mut RunConfig,
    ) -> BoxFuture<'a, Result<Vec<CheckResult>>> {
        Box::pin(self.evaluate(cancel, config))
    }
}

/// Sub-scores for a newest-first commit list.
pub fn score_commits(commits: &[Commit], now: DateTime<Utc>) -> Vec<CheckResult> {
    let total = commits.len();
    let Some(newest) = commits.first() else {
        return vec![CheckResult::new(EMPTY_MAX, EMPTY_MAX, "no commits found").with_level(1)];
    };

    let signed = commits.iter().filter(|commit| commit.signed).count();
    let approved = commits.iter().filter(|commit| commit.approved).count();
    let reviewed = commits.iter().filter(|commit| commit.reviewed).count();
    let associated = commits
        .iter()
        .filter(|commit| commit.pull_request.is_some())
        .count();

    let share = |count: usize, what: &str| {
        format!(
            "{:.1}% of the last {total} commits {what}",
            count as f64 * 100.0 / total as f64
        )
    };

    let idle_days = (now - newest.committed_date).num_days();
    let abandoned = if now - newest.committed_date > Duration::days(ABANDONED_AFTER_DAYS) {
        CheckResult::new(
            ABANDONED_MAX,
            ABANDONED_MAX,
            format!("last commit was {idle_days} days ago; looks abandoned"),
        )
    } else {
        CheckResult::new(
            0,
            ABANDONED_MAX,
            format!("last commit was {idle_days} days ago"),
        )
    };

    vec![
        CheckResult::new(
            SIGNED_MAX - deficiency(SIGNED_MAX, signed, total),
            SIGNED_MAX,
            share(signed, "were signed"),
        )
        .with_level(3),
        CheckResult::new(
            APPROVED_MAX - deficiency(APPROVED_MAX, approved, total),
            APPROVED_MAX,
            share(approved, "were approved"),
        )
        .with_level(2),
        CheckResult::new(
            REVIEWED_MAX - deficiency(REVIEWED_MAX, reviewed, total),
            REVIEWED_MAX,
            share(reviewed, "were reviewed by someone other than the author"),
        )
        .with_level(2),
        CheckResult::new(
            ASSOCIATED_MAX - deficiency(ASSOCIATED_MAX, associated, total),
            ASSOCIATED_MAX,
            share(associated, "landed through a pull request"),
        )
        .with_level(1),
        abandoned.with_level(1),
    ]
}
