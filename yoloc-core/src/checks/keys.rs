//! Private key check.
//!
//! Clones the repository, scans the checkout for key material and records
//! image references that look like they belong to the project so the image
//! check has something to verify.

use std::sync::Arc;

use crate::BoxFuture;
use crate::cancel::CancelToken;
use crate::check::Check;
use crate::clone::{CloneLocks, RepoCloner};
use crate::config::{RepoSlug, RunConfig};
use crate::domain::CheckResult;
use crate::error::{Result, YolocError};
use crate::scan::{MatchKind, SecretMatch, SecretScanner};

const MAX: u32 = 10;
const IMAGE_SUFFIXES: [&str; 3] = ["-server", "-cli", "-client"];

/// Scans a checkout for committed private keys.
pub struct PrivateKeysCheck {
    cloner: Arc<dyn RepoCloner>,
    locks: Arc<CloneLocks>,
    scanner: Arc<dyn SecretScanner>,
}

impl PrivateKeysCheck {
    /// Check cloning through `cloner`, serialized by `locks`.
    pub fn new(
        cloner: Arc<dyn RepoCloner>,
        locks: Arc<CloneLocks>,
        scanner: Arc<dyn SecretScanner>,
    ) -> Self {
        Self {
            cloner,
            locks,
            scanner,
        }
    }

    async fn evaluate(
        &self,
        cancel: &CancelToken,
        config: &mut RunConfig,
    ) -> Result<Vec<CheckResult>> {
        let matches = {
            let _lease = cancel
                .guard(async { Ok::<_, YolocError>(self.locks.lease(&config.slug).await) })
                .await?;
            let root = self
                .cloner
                .checkout(cancel, &config.slug, &config.branch, &config.fallback_branch)
                .await?;
            let scanner = Arc::clone(&self.scanner);
            let scan = tokio::task::spawn_blocking(move || scanner.scan(&root));
            cancel
                .guard(async {
                    scan.await
                        .map_err(|err| YolocError::Other(format!("scan task failed: {err}")))
                        .and_then(|found| found)
                })
                .await?
        };

        for image in candidate_images(&config.slug, &matches) {
            config.add_found_image(image);
        }
        if !config.found_images.is_empty() {
            log::debug!("{} image candidates: {:?}", config.slug, config.found_images);
        }

        let keys: Vec<&SecretMatch> = matches
            .iter()
            .filter(|found| found.kind == MatchKind::Key && !found.path.contains("test"))
            .collect();
        let result = match keys.first() {
            Some(first) => CheckResult::new(
                MAX,
                MAX,
                format!(
                    "Found {} possible private key(s), e.g. {} ({})",
                    keys.len(),
                    first.path,
                    first.signature
                ),
            ),
            None => CheckResult::new(0, MAX, "Zero private keys found in the repository"),
        };
        Ok(vec![result.with_level(2)])
    }
}

impl Check for PrivateKeysCheck {
    fn id(&self) -> &str {
        "private-keys"
    }

    fn run<'a>(
        &'a self,
        cancel: &'a CancelToken,
        config: &'a mut RunConfig,
    ) -> BoxFuture<'a, Result<Vec<CheckResult>>> {
        Box::pin(self.evaluate(cancel, config))
    }
}

/// Image references from `matches` that mention the repository, plus the
/// usual `<image>/<name>[-server|-cli|-client]` variations.
pub fn candidate_images(slug: &RepoSlug, matches: &[SecretMatch]) -> Vec<String> {
    let mut images: Vec<String> = Vec::new();
    let mut push = |image: String| {
        if !images.contains(&image) {
            images.push(image);
        }
    };

    for found in matches.iter().filter(|found| found.kind == MatchKind::Image) {
        let image = found.content.trim();
        if !image.contains(&slug.owner) && !image.contains(&slug.name) {
            continue;
        }
        push(image.to_string());

        let base = image.trim_end_matches('/');
        let nested = format!("{}/{}", slug.name, slug.name);
        if !base.contains(&nested) {
            push(format!("{base}/{}", slug.name));
        }
        for suffix in IMAGE_SUFFIXES {
            let variant = format!("{}{suffix}", slug.name);
            if !base.contains(&variant) {
                push(format!("{base}/{variant}"));
            }
        }
    }
    images
}
