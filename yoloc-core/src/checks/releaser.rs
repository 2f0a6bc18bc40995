//! Release automation check.

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
const MANUAL_RELEASE_SCORE: u32 = 4;

/// Inspects who published the latest release.
pub struct ReleaserCheck {
    pages: Arc<dyn PageFetcher>,
    web_url: String,
    author: Regex,
    automation: Regex,
}

impl ReleaserCheck {
    /// Check scraping the releases page under `web_url`.
    pub fn new(pages: Arc<dyn PageFetcher>, web_url: impl Into<String>) -> Result<Self> {
        let compile = |pattern: &str| {
            Regex::new(pattern)
                .map_err(|err| YolocError::Config(format!("releaser pattern: {err}")))
        };
        Ok(Self {
            pages,
            web_url: web_url.into(),
            author: compile(r#"data-hovercard-url="/users/([^"/]+?)/hovercard"#)?,
            automation: compile("bot|action|release|jenkins|auto")?,
        })
    }

    async fn evaluate(&self, cancel: &CancelToken, config: &RunConfig) -> Result<Vec<CheckResult>> {
        let url = format!(
            "{}/{}/releases",
            self.web_url.trim_end_matches('/'),
            config.slug
        );
        let body = cancel.guard(self.pages.fetch(&url)).await?;
        Ok(vec![self.classify(&body).with_level(2)])
    }

    fn classify(&self, body: &str) -> CheckResult {
        let Some(user) = self
            .author
            .captures(body)
            .and_then(|captures| captures.get(1))
            .map(|user| user.as_str())
        else {
            return CheckResult::new(MAX, MAX, "No releases found. Great work!");
        };

        if self.automation.is_match(user) {
            return CheckResult::new(
                0,
                MAX,
                format!("Previous release was created by automation ({user:?})"),
            );
        }
        CheckResult::new(
            MANUAL_RELEASE_SCORE,
            MAX,
            format!("Releases found, last by {user} (not automated)"),
        )
    }
}

impl Check for ReleaserCheck {
    fn id(&self) -> &str {
        "releaser"
    }

    fn run<'a>(
        &'a self,
        cancel: &'a CancelToken,
        config: &'a mut RunConfig,
    ) -> BoxFuture<'a, Result<Vec<CheckResult>>> {
        Box::pin(self.evaluate(cancel, config))
    }
}
