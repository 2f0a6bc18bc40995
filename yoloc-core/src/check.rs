//! Check trait definitions.

use crate::BoxFuture;
use crate::cancel::CancelToken;
use crate::config::RunConfig;
use crate::domain::CheckResult;
use crate::error::Result;

/// An independent heuristic contributing to the score.
pub trait Check: Send + Sync {
    /// Returns the unique ID of the check (e.g., "commits").
    fn id(&self) -> &str;

    /// Evaluate the check against `config`.
    ///
    /// A check may append to `config.found_images` for later checks. Errors
    /// are recorded as a failed row and do not stop the run.
    fn run<'a>(
        &'a self,
        cancel: &'a CancelToken,
        config: &'a mut RunConfig,
    ) -> BoxFuture<'a, Result<Vec<CheckResult>>>;
}
