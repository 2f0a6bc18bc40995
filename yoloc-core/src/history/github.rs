//! GitHub GraphQL history source.

use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use super::{HistoryPage, HistoryQuery, HistorySource, RawCommit};
use crate::BoxFuture;
use crate::config::Settings;
use crate::error::{Result, YolocError};

const HISTORY_QUERY: &str = r#"
query(
  $owner: String!
  $name: String!
  $expression: String!
  $commitsToAnalyze: Int!
  $commitsCursor: String
  $pullRequestsToAnalyze: Int!
  $reviewsToAnalyze: Int!
) {
  repository(owner: $owner, name: $name) {
    object(expression: $expression) {
      ... on Commit {
        history(first: $commitsToAnalyze, after: $commitsCursor) {
          pageInfo { endCursor hasNextPage }
          nodes {
            oid
            committedDate
            author { user { login } }
            committer { name user { login } }
            signature { isValid wasSignedByGitHub }
            associatedPullRequests(first: $pullRequestsToAnalyze) {
              nodes {
                number
                headRefOid
                mergedAt
                author { login }
                mergedBy { login }
                repository { name owner { login } }
                reviews(last: $reviewsToAnalyze) {
                  nodes { state author { login } }
                }
              }
            }
          }
        }
      }
    }
  }
}
"#;

/// History source backed by the GitHub GraphQL API.
#[derive(Debug, Clone)]
pub struct GithubGraphql {
    api_url: String,
    token: Option<String>,
    user_agent: String,
    client: Client,
}

impl GithubGraphql {
    /// Build a client for the given API base URL.
    pub fn new(
        api_url: impl Into<String>,
        token: Option<String>,
        user_agent: impl Into<String>,
    ) -> Self {
        Self {
            api_url: api_url.into(),
            token,
            user_agent: user_agent.into(),
            client: Client::new(),
        }
    }

    /// Build a client from process settings.
    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            settings.github_api_url.clone(),
            settings.github_token.clone(),
            settings.user_agent.clone(),
        )
    }

    async fn query_page(&self, query: &HistoryQuery, cursor: Option<&str>) -> Result<HistoryPage> {
        let url = format!("{}/graphql", self.api_url.trim_end_matches('/'));
        let body = json!({
            "query": HISTORY_QUERY,
            "variables": {
                "owner": query.owner,
                "name": query.name,
                "expression": query.branch,
                "commitsToAnalyze": query.commits_per_page,
                "commitsCursor": cursor,
                "pullRequestsToAnalyze": query.pull_requests_per_commit,
                "reviewsToAnalyze": query.reviews_per_pull_request,
            },
        });

        let mut request = self
            .client
            .post(url)
            .header("User-Agent", &self.user_agent)
            .json(&body);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(YolocError::Http(format!(
                "github api error ({status}): {body}"
            )));
        }

        let envelope: GraphqlResponse = response
            .json()
            .await
            .map_err(|err| YolocError::Decode(format!("github response decode failed: {err}")))?;
        envelope.into_page()
    }
}

impl HistorySource for GithubGraphql {
    fn fetch_page<'a>(
        &'a self,
        query: &'a HistoryQuery,
        cursor: Option<&'a str>,
    ) -> BoxFuture<'a, Result<HistoryPage>> {
        Box::pin(self.query_page(query, cursor))
    }
}

#[derive(Debug, Deserialize)]
struct GraphqlResponse {
    #[serde(default)]
    data: Option<GraphqlData>,
    #[serde(default)]
    errors: Vec<GraphqlError>,
}

#[derive(Debug, Deserialize)]
struct GraphqlError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct GraphqlData {
    repository: Option<GraphqlRepository>,
}

#[derive(Debug, Deserialize)]
struct GraphqlRepository {
    object: Option<GraphqlObject>,
}

#[derive(Debug, Deserialize)]
struct GraphqlObject {
    history: Option<GraphqlHistory>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphqlHistory {
    page_info: PageInfo,
    #[serde(default)]
    nodes: Vec<RawCommit>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageInfo {
    end_cursor: Option<String>,
    has_next_page: bool,
}

impl GraphqlResponse {
    fn into_page(self) -> Result<HistoryPage> {
        if !self.errors.is_empty() {
            let messages: Vec<String> = self.errors.into_iter().map(|err| err.message).collect();
            return Err(YolocError::Remote(messages.join("; ")));
        }
        let data = self
            .data
            .ok_or_else(|| YolocError::Decode("github response missing data".to_string()))?;
        let repository = data
            .repository
            .ok_or_else(|| YolocError::Remote("repository not found".to_string()))?;

        // A missing object (or a non-commit one) means the branch is unknown.
        let Some(history) = repository.object.and_then(|object| object.history) else {
            return Ok(HistoryPage::default());
        };
        Ok(HistoryPage {
            nodes: history.nodes,
            end_cursor: history.page_info.end_cursor,
            has_next_page: history.page_info.has_next_page,
        })
    }
}
