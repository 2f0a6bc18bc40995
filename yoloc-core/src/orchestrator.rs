//! Sequential check execution and score aggregation.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::cancel::CancelToken;
use crate::check::Check;
use crate::config::RunConfig;
use crate::domain::{CheckOutcome, CheckResult, CheckRow};
use crate::score;

/// Aggregated outcome of one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Scorecard {
    /// Repository as `owner/name`.
    pub repo: String,
    /// Image reference, when one was requested.
    pub image: Option<String>,
    /// Every row in check order.
    pub rows: Vec<CheckRow>,
    /// Sum of awarded points.
    pub score: u32,
    /// Sum of available points over successful results.
    pub max: u32,
    /// `floor(100 * score / max)`.
    pub percentage: u32,
    /// Compliance level derived from the percentage.
    pub level: u32,
    /// Highest level among results that scored any points.
    pub observed_level: u32,
    /// Personality label for the percentage.
    pub label: String,
    /// Whether the rows came from the persistence store.
    pub from_cache: bool,
}

impl Scorecard {
    /// Fold rows into totals.
    pub fn from_rows(
        repo: impl Into<String>,
        image: Option<String>,
        rows: Vec<CheckRow>,
        from_cache: bool,
    ) -> Self {
        let mut total_score = 0u32;
        let mut total_max = 0u32;
        let mut observed_level = 0u32;
        for result in rows.iter().filter_map(CheckRow::result) {
            total_score = total_score.saturating_add(result.score);
            total_max = total_max.saturating_add(result.max);
            if result.score > 0 {
                observed_level = observed_level.max(result.level);
            }
        }
        let percentage = score::percentage(total_score, total_max);
        Self {
            repo: repo.into(),
            image,
            rows,
            score: total_score,
            max: total_max,
            percentage,
            level: score::level(percentage),
            observed_level,
            label: score::label(percentage).to_string(),
            from_cache,
        }
    }

    /// Successful results in row order.
    pub fn results(&self) -> impl Iterator<Item = (&str, &CheckResult)> {
        self.rows
            .iter()
            .filter_map(|row| row.result().map(|result| (row.check.as_str(), result)))
    }
}

/// Run `checks` in order against `config`.
///
/// A failing check becomes a failed row and the remaining checks still run.
/// Once `cancel` fires, every remaining check is recorded as cancelled.
pub async fn run_checks(
    checks: &[Arc<dyn Check>],
    config: &mut RunConfig,
    cancel: &CancelToken,
) -> Scorecard {
    let mut rows = Vec::new();
    for check in checks {
        let id = check.id().to_string();
        if cancel.is_cancelled() {
            rows.push(CheckRow::failed(id, "cancelled"));
            continue;
        }

        log::debug!("running check {id} for {}", config.slug);
        match check.run(cancel, config).await {
            Ok(results) => {
                rows.extend(
                    results
                        .into_iter()
                        .map(|result| CheckRow::scored(id.as_str(), result)),
                );
            }
            Err(err) => {
                log::warn!("check {id} failed for {}: {err}", config.slug);
                rows.push(CheckRow::failed(id, err.to_string()));
            }
        }
    }

    Scorecard::from_rows(config.slug.to_string(), config.image.clone(), rows, false)
}

/// Run `checks` behind the configured persistence store.
///
/// Fresh stored rows short-circuit the run. Store failures are logged and
/// treated as misses; cancelled runs and runs with failed checks are never
/// stored.
pub async fn run_with_store(
    checks: &[Arc<dyn Check>],
    config: &mut RunConfig,
    cancel: &CancelToken,
) -> Scorecard {
    let store = Arc::clone(&config.store);
    let key = config.persist_key();

    match store.get(&key).await {
        Ok(Some(rows)) => {
            log::info!("using stored results for {key} ({} backend)", store.backend());
            return Scorecard::from_rows(config.slug.to_string(), config.image.clone(), rows, true);
        }
        Ok(None) => {}
        Err(err) => log::warn!("persisted lookup for {key} failed: {err}"),
    }

    let card = run_checks(checks, config, cancel).await;
    if cancel.is_cancelled() {
        log::info!("run for {key} was cancelled; not storing results");
        return card;
    }
    if card
        .rows
        .iter()
        .any(|row| matches!(row.outcome, CheckOutcome::Failed { .. }))
    {
        log::info!("run for {key} had failed checks; not storing results");
        return card;
    }
    if let Err(err) = store.set(&key, &card.rows).await {
        log::warn!("storing results for {key} failed: {err}");
    }
    card
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted checks and stores for orchestration tests.

    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::BoxFuture;
    use crate::cache::FingerprintCache;
    use crate::cancel::CancelToken;
    use crate::check::Check;
    use crate::config::RunConfig;
    use crate::domain::{CheckResult, CheckRow};
    use crate::error::{Result, YolocError};
    use crate::persist::ResultStore;
    use std::sync::Arc;

    pub fn config_with_store(store: Arc<dyn ResultStore>) -> RunConfig {
        RunConfig::new("o/r", None, Arc::new(FingerprintCache::new(8)), store).expect("config")
    }

    /// Returns fixed results and optionally publishes an image.
    pub struct FixedCheck {
        pub id: &'static str,
        pub results: Vec<CheckResult>,
        pub publishes: Option<&'static str>,
        pub runs: AtomicUsize,
    }

    impl FixedCheck {
        pub fn new(id: &'static str, results: Vec<CheckResult>) -> Self {
            Self {
                id,
                results,
                publishes: None,
                runs: AtomicUsize::new(0),
            }
        }

        pub fn runs(&self) -> usize {
            self.runs.load(Ordering::SeqCst)
        }
    }

    impl Check for FixedCheck {
        fn id(&self) -> &str {
            self.id
        }

        fn run<'a>(
            &'a self,
            _cancel: &'a CancelToken,
            config: &'a mut RunConfig,
        ) -> BoxFuture<'a, Result<Vec<CheckResult>>> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            if let Some(image) = self.publishes {
                config.add_found_image(image);
            }
            let results = self.results.clone();
            Box::pin(async move { Ok(results) })
        }
    }

    /// Always fails with a remote error.
    pub struct FailingCheck(pub &'static str);

    impl Check for FailingCheck {
        fn id(&self) -> &str {
            self.0
        }

        fn run<'a>(
            &'a self,
            _cancel: &'a CancelToken,
            _config: &'a mut RunConfig,
        ) -> BoxFuture<'a, Result<Vec<CheckResult>>> {
            Box::pin(async { Err(YolocError::Remote("boom".to_string())) })
        }
    }

    /// Records the images visible when it runs.
    pub struct ObservingCheck {
        pub seen: Mutex<Vec<String>>,
    }

    impl Check for ObservingCheck {
        fn id(&self) -> &str {
            "observer"
        }

        fn run<'a>(
            &'a self,
            _cancel: &'a CancelToken,
            config: &'a mut RunConfig,
        ) -> BoxFuture<'a, Result<Vec<CheckResult>>> {
            *self.seen.lock().expect("seen") = config.found_images.clone();
            Box::pin(async { Ok(Vec::new()) })
        }
    }

    /// In-memory store counting calls.
    #[derive(Default)]
    pub struct MemoryStore {
        pub rows: Mutex<Option<Vec<CheckRow>>>,
        pub gets: AtomicUsize,
        pub sets: AtomicUsize,
        pub fail: bool,
    }

    impl ResultStore for MemoryStore {
        fn backend(&self) -> &'static str {
            "memory"
        }

        fn get<'a>(&'a self, _key: &'a str) -> BoxFuture<'a, Result<Option<Vec<CheckRow>>>> {
            self.gets.fetch_add(1, Ordering::SeqCst);
            let outcome = if self.fail {
                Err(YolocError::Other("store offline".to_string()))
            } else {
                Ok(self.rows.lock().expect("rows").clone())
            };
            Box::pin(async move { outcome })
        }

        fn set<'a>(&'a self, _key: &'a str, rows: &'a [CheckRow]) -> BoxFuture<'a, Result<()>> {
            self.sets.fetch_add(1, Ordering::SeqCst);
            let outcome = if self.fail {
                Err(YolocError::Other("store offline".to_string()))
            } else {
                *self.rows.lock().expect("rows") = Some(rows.to_vec());
                Ok(())
            };
            Box::pin(async move { outcome })
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::Ordering;

    use super::testing::*;
    use super::*;
    use crate::cancel::cancel_pair;
    use crate::domain::CheckOutcome;
    use crate::persist::NullStore;

    fn result(score: u32, max: u32, level: u32) -> CheckResult {
        CheckResult::new(score, max, "r").with_level(level)
    }

    #[tokio::test]
    async fn failing_check_does_not_abort_run() {
        let checks: Vec<Arc<dyn Check>> = vec![
            Arc::new(FixedCheck::new("first", vec![result(5, 10, 1)])),
            Arc::new(FailingCheck("broken")),
            Arc::new(FixedCheck::new("last", vec![result(10, 10, 3)])),
        ];
        let mut config = config_with_store(Arc::new(NullStore));
        let card = run_checks(&checks, &mut config, &CancelToken::never()).await;

        assert_eq!(card.rows.len(), 3);
        assert_eq!(
            card.rows[1].outcome,
            CheckOutcome::Failed {
                error: "remote api error: boom".to_string()
            }
        );
        assert_eq!(card.score, 15);
        assert_eq!(card.max, 20);
        assert_eq!(card.percentage, 75);
        assert_eq!(card.level, 0);
        assert_eq!(card.observed_level, 3);
        assert_eq!(card.label, "Joan de Arc");
    }

    #[test]
    fn aggregation_edges() {
        let empty = Scorecard::from_rows("o/r", None, Vec::new(), false);
        assert_eq!((empty.score, empty.max, empty.percentage, empty.level), (0, 0, 0, 0));

        let perfect = Scorecard::from_rows(
            "o/r",
            None,
            vec![
                CheckRow::scored("a", result(10, 10, 2)),
                CheckRow::scored("b", result(0, 0, 4)),
            ],
            false,
        );
        assert_eq!(perfect.percentage, 100);
        assert_eq!(perfect.level, 4);
        assert_eq!(perfect.observed_level, 2);
    }

    #[tokio::test]
    async fn found_images_flow_to_later_checks() {
        let mut publisher = FixedCheck::new("keys", Vec::new());
        publisher.publishes = Some("ghcr.io/o/r");
        let observer = Arc::new(ObservingCheck {
            seen: Mutex::new(Vec::new()),
        });
        let checks: Vec<Arc<dyn Check>> = vec![Arc::new(publisher), observer.clone()];
        let mut config = config_with_store(Arc::new(NullStore));

        run_checks(&checks, &mut config, &CancelToken::never()).await;
        assert_eq!(*observer.seen.lock().expect("seen"), vec!["ghcr.io/o/r"]);
    }

    #[tokio::test]
    async fn cancelled_run_records_remaining_checks() {
        let (handle, token) = cancel_pair();
        handle.cancel();
        let first = Arc::new(FixedCheck::new("a", vec![result(1, 1, 0)]));
        let checks: Vec<Arc<dyn Check>> = vec![first.clone(), Arc::new(FailingCheck("b"))];
        let store = Arc::new(MemoryStore::default());
        let mut config = config_with_store(store.clone());

        let card = run_with_store(&checks, &mut config, &token).await;
        assert_eq!(first.runs(), 0);
        assert!(card.rows.iter().all(|row| row.outcome
            == CheckOutcome::Failed {
                error: "cancelled".to_string()
            }));
        assert_eq!(store.sets.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn stored_rows_skip_checks() {
        let store = Arc::new(MemoryStore::default());
        let check = Arc::new(FixedCheck::new("a", vec![result(3, 10, 1)]));
        let checks: Vec<Arc<dyn Check>> = vec![check.clone()];

        let mut config = config_with_store(store.clone());
        let first = run_with_store(&checks, &mut config, &CancelToken::never()).await;
        assert!(!first.from_cache);
        assert_eq!(store.sets.load(Ordering::SeqCst), 1);

        let mut config = config_with_store(store.clone());
        let second = run_with_store(&checks, &mut config, &CancelToken::never()).await;
        assert!(second.from_cache);
        assert_eq!(second.rows, first.rows);
        assert_eq!(second.score, first.score);
        assert_eq!(check.runs(), 1);
    }

    #[tokio::test]
    async fn runs_with_failed_checks_are_not_stored() {
        let store = Arc::new(MemoryStore::default());
        let failing = Arc::new(FailingCheck("broken"));
        let checks: Vec<Arc<dyn Check>> = vec![
            Arc::new(FixedCheck::new("a", vec![result(3, 10, 1)])),
            failing,
        ];

        let mut config = config_with_store(store.clone());
        let first = run_with_store(&checks, &mut config, &CancelToken::never()).await;
        assert!(!first.from_cache);
        assert_eq!(store.sets.load(Ordering::SeqCst), 0);

        let mut config = config_with_store(store.clone());
        let second = run_with_store(&checks, &mut config, &CancelToken::never()).await;
        assert!(!second.from_cache);
        assert_eq!(store.gets.load(Ordering::SeqCst), 2);
        assert_eq!(store.sets.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn store_failures_are_soft() {
        let store = Arc::new(MemoryStore {
            fail: true,
            ..MemoryStore::default()
        });
        let check = Arc::new(FixedCheck::new("a", vec![result(3, 10, 1)]));
        let checks: Vec<Arc<dyn Check>> = vec![check.clone()];
        let mut config = config_with_store(store.clone());

        let card = run_with_store(&checks, &mut config, &CancelToken::never()).await;
        assert_eq!(card.score, 3);
        assert_eq!(check.runs(), 1);
        assert_eq!(store.gets.load(Ordering::SeqCst), 1);
        assert_eq!(store.sets.load(Ordering::SeqCst), 1);
    }
}
