pub mod commits;
pub mod image;
pub mod keys;
pub mod releaser;
pub mod sbom;

use std::sync::Arc;

use crate::check::Check;
use crate::clone::{CloneLocks, GitCloner, RepoCloner};
use crate::config::Settings;
use crate::error::{Result, YolocError};
use crate::history::{CommitHistory, GithubGraphql};
use crate::registry::{RegistryVerifier, SignatureVerifier};
use crate::scan::{SecretScanner, SignatureScanner};
use crate::web::{HttpPageFetcher, PageFetcher};

pub use commits::CommitsCheck;
pub use image::SignedImageCheck;
pub use keys::PrivateKeysCheck;
pub use releaser::ReleaserCheck;
pub use sbom::SbomCheck;

/// Checks run when none are selected, in order.
pub const DEFAULT_CHECKS: [&str; 5] = [
    "commits",
    "sbom",
    "private-keys",
    "signed-image",
    "releaser",
];

/// Collaborators shared by the built-in checks.
#[derive(Clone)]
pub struct CheckDeps {
    /// Commit history analyzer.
    pub history: CommitHistory,
    /// Web page fetcher for scraping checks.
    pub pages: Arc<dyn PageFetcher>,
    /// Base URL of the repository host's web UI.
    pub web_url: String,
    /// Produces local checkouts.
    pub cloner: Arc<dyn RepoCloner>,
    /// Per-repository checkout leases.
    pub clone_locks: Arc<CloneLocks>,
    /// Secret scanner run over checkouts.
    pub scanner: Arc<dyn SecretScanner>,
    /// Image signature lookup.
    pub verifier: Arc<dyn SignatureVerifier>,
}

impl CheckDeps {
    /// Production collaborators configured from `settings`.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Ok(Self {
            history: CommitHistory::new(Arc::new(GithubGraphql::from_settings(settings))),
            pages: Arc::new(HttpPageFetcher::new(&settings.user_agent)),
            web_url: settings.github_web_url.clone(),
            cloner: Arc::new(GitCloner::new(
                &settings.github_web_url,
                settings.cache_dir.join("checkouts"),
            )),
            clone_locks: Arc::new(CloneLocks::new()),
            scanner: Arc::new(SignatureScanner::standard()?),
            verifier: Arc::new(RegistryVerifier::new(&settings.user_agent)),
        })
    }
}

/// Build check instances from a list of IDs; an empty list selects
/// [`DEFAULT_CHECKS`].
pub fn build_checks(ids: &[String], deps: &CheckDeps) -> Result<Vec<Arc<dyn Check>>> {
    let ids: Vec<String> = if ids.is_empty() {
        DEFAULT_CHECKS.iter().map(|id| id.to_string()).collect()
    } else {
        ids.to_vec()
    };

    let mut checks: Vec<Arc<dyn Check>> = Vec::new();
    for id in &ids {
        let check = match normalize_check_id(id) {
            Some(CheckKind::Commits) => Arc::new(CommitsCheck::new(deps.history.clone())) as Arc<_>,
            Some(CheckKind::Sbom) => {
                Arc::new(SbomCheck::new(Arc::clone(&deps.pages), &deps.web_url)?) as Arc<_>
            }
            Some(CheckKind::PrivateKeys) => Arc::new(PrivateKeysCheck::new(
                Arc::clone(&deps.cloner),
                Arc::clone(&deps.clone_locks),
                Arc::clone(&deps.scanner),
            )) as Arc<_>,
            Some(CheckKind::SignedImage) => {
                Arc::new(SignedImageCheck::new(Arc::clone(&deps.verifier))) as Arc<_>
            }
            Some(CheckKind::Releaser) => {
                Arc::new(ReleaserCheck::new(Arc::clone(&deps.pages), &deps.web_url)?) as Arc<_>
            }
            None => return Err(YolocError::Config(format!("unknown check: {id}"))),
        };
        checks.push(check);
    }

    Ok(checks)
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum CheckKind {
    Commits,
    Sbom,
    PrivateKeys,
    SignedImage,
    Releaser,
}

fn normalize_check_id(id: &str) -> Option<CheckKind> {
    match id.trim().to_lowercase().as_str() {
        "commits" | "commit-history" | "provenance" => Some(CheckKind::Commits),
        "sbom" | "spdx" => Some(CheckKind::Sbom),
        "private-keys" | "keys" | "secrets" => Some(CheckKind::PrivateKeys),
        "signed-image" | "image" | "cosign" => Some(CheckKind::SignedImage),
        "releaser" | "release" | "releases" => Some(CheckKind::Releaser),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn deps() -> CheckDeps {
        let settings = Settings {
            github_api_url: "http://127.0.0.1:9".to_string(),
            github_web_url: "http://127.0.0.1:9".to_string(),
            github_token: None,
            user_agent: "yoloc-test".to_string(),
            persist_backend: String::new(),
            cache_dir: PathBuf::from("/nonexistent/yoloc"),
            history_cache_size: 4,
        };
        CheckDeps::from_settings(&settings).expect("deps")
    }

    fn ids(checks: &[Arc<dyn Check>]) -> Vec<&str> {
        checks.iter().map(|check| check.id()).collect()
    }

    #[test]
    fn empty_selection_builds_default_order() {
        let checks = build_checks(&[], &deps()).expect("checks");
        assert_eq!(ids(&checks), DEFAULT_CHECKS.to_vec());
    }

    #[test]
    fn build_checks_supports_aliases() {
        let checks = build_checks(
            &[
                "cosign".to_string(),
                " Keys ".to_string(),
                "provenance".to_string(),
            ],
            &deps(),
        )
        .expect("checks");
        assert_eq!(ids(&checks), vec!["signed-image", "private-keys", "commits"]);
    }

    #[test]
    fn unknown_check_is_a_config_error() {
        let err = build_checks(&["sbom".to_string(), "nope".to_string()], &deps())
            .err()
            .expect("unknown id");
        assert!(err.is_fatal());
        assert_eq!(err.to_string(), "invalid configuration: unknown check: nope");
    }
}
