#![deny(missing_docs)]
//! yoloc HTTP server.
//!
//! Scores repositories on request and serves the results as an HTML page,
//! JSON and OpenAPI, with health and diagnostics endpoints.

pub mod db;
pub mod models;
pub mod openapi;
pub mod routes;
#[allow(missing_docs)]
pub mod schema;
pub mod store;

use std::sync::Arc;

use actix_web::{App, HttpServer, web};
use yoloc_core::{CheckDeps, FingerprintCache, Settings, build_checks};

pub use routes::AppState;
pub use store::{PostgresStore, open_store};

/// Listener and run selection for [`serve`].
#[derive(Debug, Clone)]
pub struct ServeOptions {
    /// Interface to bind.
    pub host: String,
    /// Port to bind.
    pub port: u16,
    /// Persistence backend name.
    pub persist_backend: String,
    /// Check IDs to run; empty selects the defaults.
    pub checks: Vec<String>,
}

impl ServeOptions {
    /// Options from `YOLOC_HOST` and `PORT`, defaulting to `127.0.0.1:8080`.
    pub fn from_env(settings: &Settings) -> yoloc_core::Result<Self> {
        let host = std::env::var("YOLOC_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = match std::env::var("PORT") {
            Ok(raw) => raw.trim().parse().map_err(|_| {
                yoloc_core::YolocError::Config(format!("PORT must be a u16 number, got {raw:?}"))
            })?,
            Err(_) => 8080,
        };
        Ok(Self {
            host,
            port,
            persist_backend: settings.persist_backend.clone(),
            checks: Vec::new(),
        })
    }
}

/// Build handler state: store, collaborators and checks.
pub fn build_state(settings: &Settings, options: &ServeOptions) -> yoloc_core::Result<AppState> {
    let store = open_store(&options.persist_backend, settings)?;
    let deps = CheckDeps::from_settings(settings)?;
    let checks = build_checks(&options.checks, &deps)?;
    log::info!(
        "serving {} check(s) with the {} store",
        checks.len(),
        store.backend()
    );
    Ok(AppState::new(
        checks,
        Arc::new(FingerprintCache::new(settings.history_cache_size)),
        store,
    ))
}

/// Run the HTTP server until it is shut down.
///
/// Starts its own actix system, so it must not be called from inside an
/// async runtime.
pub fn serve(state: AppState, host: &str, port: u16) -> std::io::Result<()> {
    let state = web::Data::new(state);
    let host = host.to_string();
    log::info!("listening on {host}:{port}");
    actix_web::rt::System::new().block_on(async move {
        HttpServer::new(move || {
            App::new()
                .wrap(actix_web::middleware::Logger::default())
                .app_data(state.clone())
                .configure(routes::configure)
        })
        .bind((host, port))?
        .run()
        .await
    })
}
