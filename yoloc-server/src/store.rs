//! PostgreSQL persistence backend.

use std::sync::Arc;

use actix_web::web;
use chrono::Utc;
use diesel::prelude::*;
use yoloc_core::persist::sanitize_key;
use yoloc_core::{
    BoxFuture, CheckRow, PersistedBlob, Result, ResultStore, Settings, YolocError,
};

use crate::db::{DbPool, init_pool};
use crate::models::PersistedRun;
use crate::schema::persisted_runs;

/// Stores run results in the `persisted_runs` table.
#[derive(Clone)]
pub struct PostgresStore {
    pool: DbPool,
}

impl PostgresStore {
    /// Store backed by `pool`.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn row_key(key: &str) -> String {
        format!("repos/{}", sanitize_key(key))
    }

    async fn read(&self, key: &str) -> Result<Option<Vec<CheckRow>>> {
        let pool = self.pool.clone();
        let row_key = Self::row_key(key);
        log::debug!("checking {row_key} ...");
        let stored = web::block(move || {
            let mut conn = pool.get().map_err(|err| err.to_string())?;
            persisted_runs::table
                .find(&row_key)
                .select(PersistedRun::as_select())
                .first(&mut conn)
                .optional()
                .map_err(|err| err.to_string())
        })
        .await
        .map_err(|err| YolocError::Other(format!("database task failed: {err}")))?
        .map_err(YolocError::Other)?;

        let Some(stored) = stored else {
            return Ok(None);
        };
        let blob = PersistedBlob::decode(&stored.blob)?;
        let rows = blob.into_fresh(Utc::now());
        if rows.is_none() {
            log::info!("ignoring stale results for {key} stored at {}", stored.stored_at);
        }
        Ok(rows)
    }

    async fn write(&self, key: &str, rows: &[CheckRow]) -> Result<()> {
        let now = Utc::now();
        let record = PersistedRun {
            key: Self::row_key(key),
            blob: PersistedBlob::new(rows, now).encode()?,
            stored_at: now.naive_utc(),
        };
        log::info!("storing results at {} ...", record.key);
        let pool = self.pool.clone();
        web::block(move || {
            let mut conn = pool.get().map_err(|err| err.to_string())?;
            diesel::insert_into(persisted_runs::table)
                .values(&record)
                .on_conflict(persisted_runs::key)
                .do_update()
                .set((
                    persisted_runs::blob.eq(&record.blob),
                    persisted_runs::stored_at.eq(record.stored_at),
                ))
                .execute(&mut conn)
                .map(|_| ())
                .map_err(|err| err.to_string())
        })
        .await
        .map_err(|err| YolocError::Other(format!("database task failed: {err}")))?
        .map_err(YolocError::Other)
    }
}

impl ResultStore for PostgresStore {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<Vec<CheckRow>>>> {
        Box::pin(self.read(key))
    }

    fn set<'a>(&'a self, key: &'a str, rows: &'a [CheckRow]) -> BoxFuture<'a, Result<()>> {
        Box::pin(self.write(key, rows))
    }
}

/// Open a persistence backend by name, adding `postgres` to the core backends.
pub fn open_store(backend: &str, settings: &Settings) -> Result<Arc<dyn ResultStore>> {
    match backend.trim() {
        "postgres" => Ok(Arc::new(PostgresStore::new(init_pool()?))),
        other => yoloc_core::open_store(other, settings),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::TestDatabase;
    use yoloc_core::CheckResult;

    fn settings() -> Settings {
        let mut settings = Settings::from_env();
        settings.cache_dir = std::env::temp_dir().join("yoloc_server_store_test");
        settings
    }

    #[test]
    fn row_keys_are_namespaced() {
        assert_eq!(
            PostgresStore::row_key("google/triage-party@gcr.io/x:v1"),
            "repos/google_triage_party_gcr_io_x_v1"
        );
    }

    #[test]
    fn unknown_backend_is_a_config_error() {
        let err = open_store("redis", &settings()).err().expect("error");
        assert!(err.is_fatal());
        let null = open_store("", &settings()).expect("null store");
        assert_eq!(null.backend(), "null");
    }

    #[actix_web::test]
    async fn round_trips_and_overwrites_rows() {
        let Some(mut test_db) = TestDatabase::from_env() else {
            return;
        };
        let store = PostgresStore::new(test_db.pool());
        assert_eq!(store.get("o/r").await.expect("miss"), None);

        let first = vec![CheckRow::scored("sbom", CheckResult::new(6, 10, "found").with_level(1))];
        store.set("o/r", &first).await.expect("store");
        assert_eq!(store.get("o/r").await.expect("hit"), Some(first));

        let second = vec![CheckRow::failed("sbom", "timeout")];
        store.set("o/r", &second).await.expect("overwrite");
        assert_eq!(store.get("o/r").await.expect("hit"), Some(second));
    }
}
