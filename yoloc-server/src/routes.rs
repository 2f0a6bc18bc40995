//! HTTP handlers for the yoloc server.

use std::collections::BTreeMap;
use std::fmt::Write;
use std::sync::{Arc, Mutex};

use actix_web::{HttpResponse, Responder, get, web};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, OpenApi, ToSchema};
use uuid::Uuid;
use yoloc_core::{
    CancelOnDrop, Check, FingerprintCache, RenderOptions, ResultStore, RunConfig, Scorecard,
    YolocError, cancel_pair, render_text, run_with_store,
};

use crate::openapi::ApiDoc;

/// Shared application state for handlers.
pub struct AppState {
    /// Checks run for every request, in order.
    pub checks: Vec<Arc<dyn Check>>,
    /// Process-wide commit history cache.
    pub history_cache: Arc<FingerprintCache>,
    /// Persistence backend for whole-run results.
    pub store: Arc<dyn ResultStore>,
    inflight: Mutex<BTreeMap<Uuid, InFlightRun>>,
}

impl AppState {
    /// State running `checks` with the given cache and store.
    pub fn new(
        checks: Vec<Arc<dyn Check>>,
        history_cache: Arc<FingerprintCache>,
        store: Arc<dyn ResultStore>,
    ) -> Self {
        Self {
            checks,
            history_cache,
            store,
            inflight: Mutex::new(BTreeMap::new()),
        }
    }

    /// Score `repo`, cancelling the run if the returned future is dropped.
    pub async fn score(&self, repo: &str, image: Option<String>) -> yoloc_core::Result<Scorecard> {
        let mut config = RunConfig::new(
            repo,
            image,
            Arc::clone(&self.history_cache),
            Arc::clone(&self.store),
        )?;
        let (handle, token) = cancel_pair();
        let _cancel = CancelOnDrop::new(handle);
        let _tracked = self.track(&config);
        Ok(run_with_store(&self.checks, &mut config, &token).await)
    }

    /// Runs currently in progress, oldest first.
    pub fn inflight(&self) -> Vec<InFlightRun> {
        let mut runs: Vec<InFlightRun> = self
            .inflight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .values()
            .cloned()
            .collect();
        runs.sort_by_key(|run| run.started_at);
        runs
    }

    fn track(&self, config: &RunConfig) -> InFlightGuard<'_> {
        let id = Uuid::new_v4();
        let run = InFlightRun {
            id: id.to_string(),
            repo: config.slug.to_string(),
            image: config.image.clone(),
            started_at: Utc::now(),
        };
        self.inflight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(id, run);
        InFlightGuard { state: self, id }
    }
}

struct InFlightGuard<'a> {
    state: &'a AppState,
    id: Uuid,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.state
            .inflight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&self.id);
    }
}

/// A run that has started but not finished.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InFlightRun {
    /// Run identifier.
    pub id: String,
    /// Repository as `owner/name`.
    pub repo: String,
    /// Requested image, if any.
    pub image: Option<String>,
    /// When the run started.
    pub started_at: DateTime<Utc>,
}

/// Repository scored when a request names only an image.
pub const DEFAULT_REPO: &str = "chainguard-dev/yolo";

/// Query parameters selecting what to score.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ScoreQuery {
    /// Repository, `owner/name` or a GitHub URL. Defaults to `chainguard-dev/yolo`
    /// when only `image` is given.
    pub repo: Option<String>,
    /// Container image reference.
    pub image: Option<String>,
}

impl ScoreQuery {
    fn repo(&self) -> Option<&str> {
        self.repo
            .as_deref()
            .map(str::trim)
            .filter(|repo| !repo.is_empty())
    }

    fn image(&self) -> Option<String> {
        self.image
            .as_deref()
            .map(str::trim)
            .filter(|image| !image.is_empty())
            .map(String::from)
    }

    /// Repository and image to score, or `None` when neither was submitted.
    fn target(&self) -> Option<(String, Option<String>)> {
        let image = self.image();
        match (self.repo(), image) {
            (Some(repo), image) => Some((repo.to_string(), image)),
            (None, Some(image)) => Some((DEFAULT_REPO.to_string(), Some(image))),
            (None, None) => None,
        }
    }
}

/// Error payload.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// Error message.
    pub message: String,
}

/// Runs in progress plus a captured backtrace.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ThreadzResponse {
    /// Runs that have not finished.
    pub runs: Vec<InFlightRun>,
    /// Backtrace of the handling thread.
    pub backtrace: String,
}

fn error_status(err: &YolocError) -> actix_web::http::StatusCode {
    if err.is_fatal() {
        actix_web::http::StatusCode::BAD_REQUEST
    } else {
        actix_web::http::StatusCode::INTERNAL_SERVER_ERROR
    }
}

#[get("/")]
/// Score a repository and render the text scorecard inside an HTML page.
pub async fn index(state: web::Data<AppState>, query: web::Query<ScoreQuery>) -> impl Responder {
    let Some((repo, image)) = query.target() else {
        return html(
            actix_web::http::StatusCode::OK,
            &query,
            "Waiting for submission ...",
        );
    };

    match state.score(&repo, image).await {
        Ok(card) => html(
            actix_web::http::StatusCode::OK,
            &query,
            &render_text(&card, &RenderOptions::plain()),
        ),
        Err(err) => {
            log::warn!("scoring {repo:?} failed: {err}");
            html(error_status(&err), &query, &err.to_string())
        }
    }
}

#[utoipa::path(
    get,
    path = "/api/score",
    params(ScoreQuery),
    responses(
        (status = 200, description = "Scorecard", body = Scorecard),
        (status = 400, description = "Invalid repository", body = ErrorResponse),
        (status = 500, description = "Run failed", body = ErrorResponse)
    ),
    tag = "score"
)]
#[get("/api/score")]
/// Score a repository and return the JSON scorecard.
pub async fn api_score(
    state: web::Data<AppState>,
    query: web::Query<ScoreQuery>,
) -> impl Responder {
    let Some((repo, image)) = query.target() else {
        return HttpResponse::BadRequest().json(ErrorResponse {
            message: "missing repo parameter".to_string(),
        });
    };
    match state.score(&repo, image).await {
        Ok(card) => HttpResponse::Ok().json(card),
        Err(err) => HttpResponse::build(error_status(&err)).json(ErrorResponse {
            message: err.to_string(),
        }),
    }
}

#[utoipa::path(
    get,
    path = "/healthz",
    responses((status = 200, description = "Server is up", body = String)),
    tag = "system"
)]
#[get("/healthz")]
/// Liveness probe.
pub async fn healthz() -> impl Responder {
    HttpResponse::Ok().content_type("text/plain").body("ok")
}

#[utoipa::path(
    get,
    path = "/threadz",
    responses((status = 200, description = "Diagnostics", body = ThreadzResponse)),
    tag = "system"
)]
#[get("/threadz")]
/// In-flight runs and a backtrace of the serving thread.
pub async fn threadz(state: web::Data<AppState>) -> impl Responder {
    HttpResponse::Ok().json(ThreadzResponse {
        runs: state.inflight(),
        backtrace: std::backtrace::Backtrace::force_capture().to_string(),
    })
}

#[utoipa::path(
    get,
    path = "/api/openapi.json",
    responses(
        (status = 200, description = "OpenAPI document", body = serde_json::Value)
    ),
    tag = "system"
)]
#[get("/api/openapi.json")]
/// Serve the OpenAPI document.
pub async fn openapi_json() -> impl Responder {
    HttpResponse::Ok().json(ApiDoc::openapi())
}

/// Register every handler on `config`.
pub fn configure(config: &mut web::ServiceConfig) {
    config
        .service(index)
        .service(api_score)
        .service(healthz)
        .service(threadz)
        .service(openapi_json);
}

fn html(status: actix_web::http::StatusCode, query: &ScoreQuery, body: &str) -> HttpResponse {
    let mut page = String::new();
    let _ = writeln!(page, "<!DOCTYPE html>");
    let _ = writeln!(page, "<html><head><title>YOLO compliance</title></head><body>");
    let _ = writeln!(page, "<h1>YOLO compliance</h1>");
    let _ = writeln!(page, "<form method=\"get\" action=\"/\">");
    let _ = writeln!(
        page,
        "<label>Repository <input name=\"repo\" value=\"{}\"></label>",
        escape_html(query.repo.as_deref().unwrap_or_default())
    );
    let _ = writeln!(
        page,
        "<label>Image <input name=\"image\" value=\"{}\"></label>",
        escape_html(query.image.as_deref().unwrap_or_default())
    );
    let _ = writeln!(page, "<button type=\"submit\">Score</button></form>");
    let _ = writeln!(page, "<pre>{}</pre>", escape_html(body));
    let _ = writeln!(page, "</body></html>");
    HttpResponse::build(status)
        .content_type("text/html; charset=utf-8")
        .body(page)
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{App, http::StatusCode, test};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use yoloc_core::{BoxFuture, CancelToken, CheckResult, NullStore};

    struct StaticCheck {
        runs: AtomicUsize,
    }

    impl Check for StaticCheck {
        fn id(&self) -> &str {
            "sbom"
        }

        fn run<'a>(
            &'a self,
            _cancel: &'a CancelToken,
            config: &'a mut RunConfig,
        ) -> BoxFuture<'a, yoloc_core::Result<Vec<CheckResult>>> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            let message = format!("No SBOM found at {}", config.slug);
            Box::pin(async move { Ok(vec![CheckResult::new(10, 10, message).with_level(1)]) })
        }
    }

    fn state() -> (web::Data<AppState>, Arc<StaticCheck>) {
        let check = Arc::new(StaticCheck {
            runs: AtomicUsize::new(0),
        });
        let state = web::Data::new(AppState::new(
            vec![check.clone() as Arc<dyn Check>],
            Arc::new(FingerprintCache::new(4)),
            Arc::new(NullStore),
        ));
        (state, check)
    }

    #[actix_web::test]
    async fn index_waits_for_submission() {
        let (state, check) = state();
        let app =
            test::init_service(App::new().app_data(state.clone()).configure(configure)).await;

        let req = test::TestRequest::get().uri("/").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body = test::read_body(resp).await;
        let body = String::from_utf8(body.to_vec()).expect("utf8");
        assert!(body.contains("Waiting for submission ..."));
        assert_eq!(check.runs.load(Ordering::SeqCst), 0);
    }

    #[actix_web::test]
    async fn index_renders_text_scorecard() {
        let (state, _) = state();
        let app =
            test::init_service(App::new().app_data(state.clone()).configure(configure)).await;

        let req = test::TestRequest::get()
            .uri("/?repo=https://github.com/google/triage-party")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body = String::from_utf8(test::read_body(resp).await.to_vec()).expect("utf8");
        assert!(body.contains("YOLO compliance for google/triage-party"));
        assert!(body.contains("No SBOM found at google/triage-party"));
        assert!(body.contains("<form"));
    }

    #[actix_web::test]
    async fn index_rejects_malformed_repo() {
        let (state, check) = state();
        let app =
            test::init_service(App::new().app_data(state.clone()).configure(configure)).await;

        let req = test::TestRequest::get()
            .uri("/?repo=not-a-slug")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(check.runs.load(Ordering::SeqCst), 0);
    }

    #[actix_web::test]
    async fn api_score_returns_json_scorecard() {
        let (state, _) = state();
        let app =
            test::init_service(App::new().app_data(state.clone()).configure(configure)).await;

        let req = test::TestRequest::get()
            .uri("/api/score?repo=o/r&image=ghcr.io/o/r")
            .to_request();
        let card: Scorecard = test::call_and_read_body_json(&app, req).await;
        assert_eq!(card.repo, "o/r");
        assert_eq!(card.image.as_deref(), Some("ghcr.io/o/r"));
        assert_eq!((card.score, card.max, card.percentage), (10, 10, 100));
        assert_eq!(card.level, 4);
        assert!(state.inflight().is_empty());
    }

    #[actix_web::test]
    async fn image_only_requests_score_the_default_repo() {
        let (state, check) = state();
        let app =
            test::init_service(App::new().app_data(state.clone()).configure(configure)).await;

        let req = test::TestRequest::get()
            .uri("/api/score?image=ghcr.io/o/r")
            .to_request();
        let card: Scorecard = test::call_and_read_body_json(&app, req).await;
        assert_eq!(card.repo, DEFAULT_REPO);
        assert_eq!(card.image.as_deref(), Some("ghcr.io/o/r"));

        let req = test::TestRequest::get().uri("/?image=ghcr.io/o/r").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body = String::from_utf8(test::read_body(resp).await.to_vec()).expect("utf8");
        assert!(body.contains("No SBOM found at chainguard-dev/yolo"));
        assert_eq!(check.runs.load(Ordering::SeqCst), 2);
    }

    #[actix_web::test]
    async fn api_score_requires_repo() {
        let (state, _) = state();
        let app =
            test::init_service(App::new().app_data(state.clone()).configure(configure)).await;

        let req = test::TestRequest::get().uri("/api/score").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn healthz_and_threadz_respond() {
        let (state, _) = state();
        let app =
            test::init_service(App::new().app_data(state.clone()).configure(configure)).await;

        let req = test::TestRequest::get().uri("/healthz").to_request();
        let body = test::call_and_read_body(&app, req).await;
        assert_eq!(body.as_ref(), b"ok");

        let req = test::TestRequest::get().uri("/threadz").to_request();
        let resp: ThreadzResponse = test::call_and_read_body_json(&app, req).await;
        assert!(resp.runs.is_empty());
        assert!(!resp.backtrace.is_empty());
    }

    #[actix_web::test]
    async fn openapi_document_is_served() {
        let app = test::init_service(App::new().configure(configure)).await;
        let req = test::TestRequest::get().uri("/api/openapi.json").to_request();
        let doc: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert!(doc["paths"]["/api/score"].is_object());
    }

    #[::core::prelude::v1::test]
    fn tracked_runs_are_removed_when_done() {
        let (state, _) = state();
        let config = RunConfig::new(
            "o/r",
            None,
            Arc::new(FingerprintCache::new(1)),
            Arc::new(NullStore),
        )
        .expect("config");
        {
            let _tracked = state.track(&config);
            let runs = state.inflight();
            assert_eq!(runs.len(), 1);
            assert_eq!(runs[0].repo, "o/r");
        }
        assert!(state.inflight().is_empty());
    }

    #[::core::prelude::v1::test]
    fn escapes_markup() {
        assert_eq!(
            escape_html("<a href=\"x\">&'</a>"),
            "&lt;a href=&quot;x&quot;&gt;&amp;&#39;&lt;/a&gt;"
        );
    }
}
