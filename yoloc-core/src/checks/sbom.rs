//! SBOM mention check.

use std::sync::Arc;

use regex::Regex;

use crate::BoxFuture;
use crate::cancel::CancelToken;
use crate::check::Check;
use crate::config::RunConfig;
use crate::domain::CheckResult;
use crate::error::{Result, YolocError};
use crate::web::PageFetcher;

const MAX: u32 = 10;
const MAIN_PAGE_CREDIT: u32 = 4;
const RELEASES_PAGE_CREDIT: u32 = 6;

/// Looks for SBOM or SPDX mentions on the repository and releases pages.
pub struct SbomCheck {
    pages: Arc<dyn PageFetcher>,
    web_url: String,
    pattern: Regex,
}

impl SbomCheck {
    /// Check scraping pages under `web_url`.
    pub fn new(pages: Arc<dyn PageFetcher>, web_url: impl Into<String>) -> Result<Self> {
        let pattern = Regex::new("(?i)sbom|spdx")
            .map_err(|err| YolocError::Config(format!("sbom pattern: {err}")))?;
        Ok(Self {
            pages,
            web_url: web_url.into(),
            pattern,
        })
    }

    async fn mentions(&self, cancel: &CancelToken, url: &str) -> Result<bool> {
        let body = cancel.guard(self.pages.fetch(url)).await?;
        Ok(self.pattern.is_match(&body))
    }

    async fn evaluate(&self, cancel: &CancelToken, config: &RunConfig) -> Result<Vec<CheckResult>> {
        let repo_url = format!("{}/{}", self.web_url.trim_end_matches('/'), config.slug);
        let mut score = MAX;
        let mut notes = Vec::new();

        if self.mentions(cancel, &repo_url).await? {
            score -= MAIN_PAGE_CREDIT;
            notes.push("Found SBOM mention on main page.");
        }
        if self.mentions(cancel, &format!("{repo_url}/releases")).await? {
            score -= RELEASES_PAGE_CREDIT;
            notes.push("Found SBOM mention on releases page.");
        }

        let message = if notes.is_empty() {
            format!("No SBOM found at {}", config.slug)
        } else {
            notes.join(" ")
        };
        Ok(vec![CheckResult::new(score, MAX, message).with_level(1)])
    }
}

impl Check for SbomCheck {
    fn id(&self) -> &str {
        "sbom"
    }

    fn run<'a>(
        &'a self,
        cancel: &'a CancelToken,
        config: &'a mut RunConfig,
    ) -> BoxFuture<'a, Result<Vec<CheckResult>>> {
        Box::pin(self.evaluate(cancel, config))
    }
}
