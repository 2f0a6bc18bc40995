//! Run configuration and environment-driven settings.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::cache::{DEFAULT_CACHE_CAPACITY, FingerprintCache};
use crate::error::{Result, YolocError};
use crate::persist::ResultStore;

/// Branch analyzed when none is given.
pub const DEFAULT_BRANCH: &str = "main";
/// Branch retried once when the target branch has no history.
pub const FALLBACK_BRANCH: &str = "master";

const HOST_PREFIXES: &[&str] = &[
    "https://github.com/",
    "http://github.com/",
    "https://www.github.com/",
    "github.com/",
];

/// Repository identity, normalized from a slug or URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepoSlug {
    /// Repository owner (user or organization).
    pub owner: String,
    /// Repository name.
    pub name: String,
}

impl RepoSlug {
    /// Parse `owner/name`, optionally prefixed with the GitHub host URL.
    pub fn parse(raw: &str) -> Result<Self> {
        let mut slug = raw.trim();
        for prefix in HOST_PREFIXES {
            if let Some(rest) = slug.strip_prefix(prefix) {
                slug = rest;
                break;
            }
        }
        let slug = slug.trim_end_matches('/');
        let slug = slug.strip_suffix(".git").unwrap_or(slug);
        let Some((owner, rest)) = slug.split_once('/') else {
            return Err(YolocError::Config(format!(
                "repository {raw:?} must be in owner/name form"
            )));
        };
        let name = rest.split('/').next().unwrap_or_default();
        if owner.is_empty() || name.is_empty() {
            return Err(YolocError::Config(format!(
                "repository {raw:?} must be in owner/name form"
            )));
        }
        Ok(Self {
            owner: owner.to_string(),
            name: name.to_string(),
        })
    }
}

impl fmt::Display for RepoSlug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// Shared per-run context handed to every check.
#[derive(Clone)]
pub struct RunConfig {
    /// Repository under analysis.
    pub slug: RepoSlug,
    /// Branch to analyze.
    pub branch: String,
    /// Branch retried once when `branch` has no history.
    pub fallback_branch: String,
    /// Explicitly requested image reference.
    pub image: Option<String>,
    /// Image references discovered by earlier checks.
    pub found_images: Vec<String>,
    /// Process-wide commit history cache.
    pub history_cache: Arc<FingerprintCache>,
    /// Durable store for whole-run results.
    pub store: Arc<dyn ResultStore>,
}

impl RunConfig {
    /// Build a run configuration, normalizing the repository identifier.
    pub fn new(
        repo: &str,
        image: Option<String>,
        history_cache: Arc<FingerprintCache>,
        store: Arc<dyn ResultStore>,
    ) -> Result<Self> {
        let slug = RepoSlug::parse(repo)?;
        let image = image
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());
        Ok(Self {
            slug,
            branch: DEFAULT_BRANCH.to_string(),
            fallback_branch: FALLBACK_BRANCH.to_string(),
            image,
            found_images: Vec::new(),
            history_cache,
            store,
        })
    }

    /// Override the analyzed branch.
    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        let branch = branch.into();
        if !branch.trim().is_empty() {
            self.branch = branch.trim().to_string();
        }
        self
    }

    /// Key under which whole-run results are persisted.
    pub fn persist_key(&self) -> String {
        match &self.image {
            Some(image) => format!("{}@{image}", self.slug),
            None => self.slug.to_string(),
        }
    }

    /// Record a discovered image reference once.
    pub fn add_found_image(&mut self, image: impl Into<String>) {
        let image = image.into();
        if !self.found_images.contains(&image) {
            self.found_images.push(image);
        }
    }
}

impl fmt::Debug for RunConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunConfig")
            .field("slug", &self.slug)
            .field("branch", &self.branch)
            .field("fallback_branch", &self.fallback_branch)
            .field("image", &self.image)
            .field("found_images", &self.found_images)
            .field("store", &self.store.backend())
            .finish()
    }
}

/// Process settings loaded from the environment.
#[derive(Debug, Clone)]
pub struct Settings {
    /// GitHub API base URL (GraphQL lives under `/graphql`).
    pub github_api_url: String,
    /// GitHub web base URL, used for page scraping and clones.
    pub github_web_url: String,
    /// Access token for the GitHub API.
    pub github_token: Option<String>,
    /// User agent sent to GitHub and registries.
    pub user_agent: String,
    /// Persistence backend name (`""`, `null`, `disk`, `postgres`).
    pub persist_backend: String,
    /// Root for local checkouts and the disk store.
    pub cache_dir: PathBuf,
    /// Capacity of the commit history cache.
    pub history_cache_size: usize,
}

impl Settings {
    /// Build settings from environment variables.
    pub fn from_env() -> Self {
        let github_token = std::env::var("GITHUB_TOKEN")
            .ok()
            .filter(|token| !token.trim().is_empty());
        let cache_dir = std::env::var("YOLOC_CACHE_DIR")
            .ok()
            .filter(|dir| !dir.trim().is_empty())
            .map(PathBuf::from)
            .or_else(|| dirs::cache_dir().map(|dir| dir.join("yoloc")))
            .unwrap_or_else(|| std::env::temp_dir().join("yoloc"));
        let history_cache_size = std::env::var("YOLOC_HISTORY_CACHE_SIZE")
            .ok()
            .and_then(|value| value.trim().parse().ok())
            .filter(|size: &usize| *size > 0)
            .unwrap_or(DEFAULT_CACHE_CAPACITY);
        Self {
            github_api_url: std::env::var("GITHUB_API_URL")
                .unwrap_or_else(|_| "https://api.github.com".to_string()),
            github_web_url: std::env::var("GITHUB_WEB_URL")
                .unwrap_or_else(|_| "https://github.com".to_string()),
            github_token,
            user_agent: std::env::var("GITHUB_USER_AGENT")
                .unwrap_or_else(|_| format!("yoloc/{}", env!("CARGO_PKG_VERSION"))),
            persist_backend: std::env::var("YOLOC_PERSIST_BACKEND").unwrap_or_default(),
            cache_dir,
            history_cache_size,
        }
    }
}
