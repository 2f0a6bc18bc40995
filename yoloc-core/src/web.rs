//! Plain page fetching for scraping checks.

use reqwest::Client;

use crate::BoxFuture;
use crate::error::{Result, YolocError};

/// Fetches a page body by URL.
pub trait PageFetcher: Send + Sync {
    /// GET `url` and return the body; non-2xx responses are errors.
    fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<String>>;
}

/// Reqwest-backed page fetcher.
#[derive(Debug, Clone)]
pub struct HttpPageFetcher {
    client: Client,
    user_agent: String,
}

impl HttpPageFetcher {
    /// Build a fetcher sending `user_agent`.
    pub fn new(user_agent: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            user_agent: user_agent.into(),
        }
    }

    async fn get(&self, url: &str) -> Result<String> {
        let response = self
            .client
            .get(url)
            .header("User-Agent", &self.user_agent)
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status();
            return Err(YolocError::Http(format!("GET {url} returned {status}")));
        }
        Ok(response.text().await?)
    }
}

impl PageFetcher for HttpPageFetcher {
    fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<String>> {
        Box::pin(self.get(url))
    }
}
