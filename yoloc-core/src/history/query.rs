//! Commit history query parameters and the raw API page shape.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use sha2::{Digest, Sha256};

/// Version tag mixed into every fingerprint; bump when the query changes.
const FINGERPRINT_VERSION: &str = "v1";

/// One commit history walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryQuery {
    /// Repository owner.
    pub owner: String,
    /// Repository name.
    pub name: String,
    /// Branch (or any rev expression) to walk.
    pub branch: String,
    /// Commits requested per page.
    pub commits_per_page: u32,
    /// Associated pull requests requested per commit.
    pub pull_requests_per_commit: u32,
    /// Reviews requested per pull request.
    pub reviews_per_pull_request: u32,
}

impl HistoryQuery {
    /// Query with the default page sizes.
    pub fn new(owner: &str, name: &str, branch: &str) -> Self {
        Self {
            owner: owner.to_string(),
            name: name.to_string(),
            branch: branch.to_string(),
            commits_per_page: 100,
            pull_requests_per_commit: 10,
            reviews_per_pull_request: 10,
        }
    }

    /// Stable hex digest of the structural query key.
    pub fn fingerprint(&self) -> String {
        let commits = self.commits_per_page.to_string();
        let pulls = self.pull_requests_per_commit.to_string();
        let reviews = self.reviews_per_pull_request.to_string();
        let fields = [
            FINGERPRINT_VERSION,
            self.owner.as_str(),
            self.name.as_str(),
            self.branch.as_str(),
            commits.as_str(),
            pulls.as_str(),
            reviews.as_str(),
        ];
        let mut hasher = Sha256::new();
        for (index, field) in fields.iter().enumerate() {
            if index > 0 {
                hasher.update([0u8]);
            }
            hasher.update(field.as_bytes());
        }
        format!("{:x}", hasher.finalize())
    }
}

/// One page of raw history nodes.
#[derive(Debug, Clone, Default)]
pub struct HistoryPage {
    /// Commits on this page, newest first.
    pub nodes: Vec<RawCommit>,
    /// Cursor for the next page.
    pub end_cursor: Option<String>,
    /// Whether the API reports more pages.
    pub has_next_page: bool,
}

/// A commit node as returned by the GraphQL API.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct RawCommit {
    pub oid: String,
    pub committed_date: DateTime<Utc>,
    #[serde(default)]
    pub author: Option<RawGitActor>,
    #[serde(default)]
    pub committer: Option<RawGitActor>,
    #[serde(default)]
    pub signature: Option<RawSignature>,
    #[serde(default)]
    pub associated_pull_requests: Option<Connection<RawPullRequest>>,
}

/// Git author/committer with an optional linked account.
#[derive(Debug, Clone, Default, Deserialize)]
#[allow(missing_docs)]
pub struct RawGitActor {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub user: Option<RawLogin>,
}

/// An account reference.
#[derive(Debug, Clone, Default, Deserialize)]
#[allow(missing_docs)]
pub struct RawLogin {
    pub login: String,
}

/// Commit signature status.
#[derive(Debug, Clone, Default, Deserialize)]
#[allow(missing_docs)]
pub struct RawSignature {
    #[serde(rename = "isValid", default)]
    pub is_valid: bool,
    #[serde(rename = "wasSignedByGitHub", default)]
    pub was_signed_by_github: bool,
}

/// A `nodes` list wrapper.
#[derive(Debug, Clone, Deserialize)]
#[allow(missing_docs)]
pub struct Connection<T> {
    #[serde(default = "Vec::new")]
    pub nodes: Vec<T>,
}

impl<T> Default for Connection<T> {
    fn default() -> Self {
        Self { nodes: Vec::new() }
    }
}

/// A pull request linked to a commit.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct RawPullRequest {
    pub number: u64,
    #[serde(default)]
    pub head_ref_oid: String,
    #[serde(default)]
    pub merged_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub author: Option<RawLogin>,
    #[serde(default)]
    pub merged_by: Option<RawLogin>,
    #[serde(default)]
    pub repository: RawRepository,
    #[serde(default)]
    pub reviews: Option<Connection<RawReview>>,
}

/// Repository a pull request belongs to.
#[derive(Debug, Clone, Default, Deserialize)]
#[allow(missing_docs)]
pub struct RawRepository {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub owner: Option<RawLogin>,
}

/// A pull request review.
#[derive(Debug, Clone, Default, Deserialize)]
#[allow(missing_docs)]
pub struct RawReview {
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub author: Option<RawLogin>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_stable_and_structural() {
        let query = HistoryQuery::new("google", "triage-party", "main");
        let again = HistoryQuery::new("google", "triage-party", "main");
        assert_eq!(query.fingerprint(), again.fingerprint());
        assert_eq!(query.fingerprint().len(), 64);

        let other_branch = HistoryQuery::new("google", "triage-party", "master");
        assert_ne!(query.fingerprint(), other_branch.fingerprint());

        // Field boundaries matter: "ab"/"c" must not collide with "a"/"bc".
        let left = HistoryQuery::new("ab", "c", "main");
        let right = HistoryQuery::new("a", "bc", "main");
        assert_ne!(left.fingerprint(), right.fingerprint());

        let mut smaller = query.clone();
        smaller.commits_per_page = 50;
        assert_ne!(query.fingerprint(), smaller.fingerprint());
    }

    #[test]
    fn raw_commit_tolerates_nulls() {
        let node: RawCommit = serde_json::from_value(serde_json::json!({
            "oid": "abc",
            "committedDate": "2024-01-02T03:04:05Z",
            "author": { "user": null },
            "committer": { "name": "GitHub", "user": null },
            "signature": null,
            "associatedPullRequests": { "nodes": [] }
        }))
        .expect("decode");
        assert_eq!(node.oid, "abc");
        assert!(node.signature.is_none());
        assert_eq!(
            node.committer.and_then(|actor| actor.name).as_deref(),
            Some("GitHub")
        );
    }
}
