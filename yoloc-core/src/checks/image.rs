//! Container image signature check.

use std::sync::Arc;

use crate::BoxFuture;
use crate::cancel::CancelToken;
use crate::check::Check;
use crate::config::RunConfig;
use crate::domain::CheckResult;
use crate::error::{Result, YolocError};
use crate::registry::{SignatureVerifier, VerifyError};

const MAX: u32 = 10;

/// Looks for signatures on the requested or discovered image.
pub struct SignedImageCheck {
    verifier: Arc<dyn SignatureVerifier>,
}

impl SignedImageCheck {
    /// Check asking `verifier` for signatures.
    pub fn new(verifier: Arc<dyn SignatureVerifier>) -> Self {
        Self { verifier }
    }

    async fn evaluate(&self, cancel: &CancelToken, config: &RunConfig) -> Result<Vec<CheckResult>> {
        let candidates: Vec<&str> = match &config.image {
            Some(image) => vec![image.as_str()],
            None => config.found_images.iter().map(String::as_str).collect(),
        };
        if candidates.is_empty() {
            return Err(YolocError::Other(format!(
                "no container image given or found for {}",
                config.slug
            )));
        }

        let mut last_error = None;
        for image in candidates {
            let result = match self.verifier.signatures(cancel, image).await {
                Ok(signatures) if !signatures.is_empty() => CheckResult::new(
                    0,
                    MAX,
                    format!("found {} signature(s) on {image}", signatures.len()),
                ),
                Ok(_) | Err(VerifyError::NoSignatures) => CheckResult::new(
                    MAX,
                    MAX,
                    format!("found no verified signatures for {image}"),
                ),
                Err(VerifyError::Failed(message)) => {
                    cancel.check()?;
                    log::debug!("skipping image {image}: {message}");
                    last_error = Some(format!("{image}: {message}"));
                    continue;
                }
            };
            return Ok(vec![result.with_level(3)]);
        }

        Err(YolocError::Remote(format!(
            "no candidate image could be resolved ({})",
            last_error.unwrap_or_default()
        )))
    }
}

impl Check for SignedImageCheck {
    fn id(&self) -> &str {
        "signed-image"
    }

    fn run<'a>(
        &'a self,
        cancel: &'a CancelToken,
        config: &'a mut RunConfig,
    ) -> BoxFuture<'a, Result<Vec<CheckResult>>> {
        Box::pin(self.evaluate(cancel, config))
    }
}
