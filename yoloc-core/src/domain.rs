//! Domain entities for yoloc.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// One check's contribution to the overall score.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CheckResult {
    /// Points awarded, never above `max`.
    pub score: u32,
    /// Points available.
    pub max: u32,
    /// Human-readable explanation.
    pub message: String,
    /// Severity tier of this result.
    pub level: u32,
}

impl CheckResult {
    /// Create a result, clamping the score into `0..=max`.
    pub fn new(score: u32, max: u32, message: impl Into<String>) -> Self {
        Self {
            score: score.min(max),
            max,
            message: message.into(),
            level: 0,
        }
    }

    /// Attach a severity tier.
    pub fn with_level(mut self, level: u32) -> Self {
        self.level = level;
        self
    }
}

/// Outcome of invoking a single check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CheckOutcome {
    /// The check produced a scored result.
    Scored {
        /// The scored result.
        result: CheckResult,
    },
    /// The check failed; the row counts toward neither score nor max.
    Failed {
        /// Error message reported by the check.
        error: String,
    },
}

/// A reported line of a scorecard: which check produced which outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CheckRow {
    /// Identifier of the check that produced this row.
    pub check: String,
    /// Scored result or failure.
    #[serde(flatten)]
    pub outcome: CheckOutcome,
}

impl CheckRow {
    /// Row for a successful result.
    pub fn scored(check: impl Into<String>, result: CheckResult) -> Self {
        Self {
            check: check.into(),
            outcome: CheckOutcome::Scored { result },
        }
    }

    /// Row for a failed check.
    pub fn failed(check: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            check: check.into(),
            outcome: CheckOutcome::Failed {
                error: error.into(),
            },
        }
    }

    /// The scored result, if any.
    pub fn result(&self) -> Option<&CheckResult> {
        match &self.outcome {
            CheckOutcome::Scored { result } => Some(result),
            CheckOutcome::Failed { .. } => None,
        }
    }
}

/// One historical commit with derived provenance flags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    /// Commit object id.
    pub sha: String,
    /// When the commit was committed.
    pub committed_date: DateTime<Utc>,
    /// Committer identity, when one could be established.
    pub committer: Option<String>,
    /// Whether the commit signature was reported valid.
    pub signed: bool,
    /// Whether the associated pull request was approved (explicitly or tacitly).
    pub approved: bool,
    /// Whether someone other than the author reviewed the change.
    pub reviewed: bool,
    /// Pull request the commit landed through, if any.
    pub pull_request: Option<PullRequest>,
}

/// Pull request associated with a commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequest {
    /// Pull request number.
    pub number: u64,
    /// Head commit of the pull request.
    pub head_sha: String,
    /// Merge time, if merged.
    pub merged_at: Option<DateTime<Utc>>,
    /// Pull request author login.
    pub author: Option<String>,
    /// Login of whoever merged the pull request.
    pub merged_by: Option<String>,
    /// Most recent reviews, oldest first.
    pub reviews: Vec<Review>,
}

/// A single pull request review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Review {
    /// Reviewer login.
    pub author: Option<String>,
    /// Review state as reported by the API (e.g. `APPROVED`).
    pub state: String,
}

impl Review {
    /// Whether the review approved the change.
    pub fn is_approval(&self) -> bool {
        self.state == "APPROVED"
    }
}
