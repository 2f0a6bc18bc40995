//! Database connection pool utilities.

use diesel::pg::PgConnection;
use diesel::r2d2::{self, ConnectionManager};
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use yoloc_core::{Result, YolocError};

/// Pooled PostgreSQL connections for the yoloc server.
pub type DbPool = r2d2::Pool<ConnectionManager<PgConnection>>;

/// Embedded Diesel migrations.
pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// Initialize the database pool using `DATABASE_URL`.
pub fn init_pool() -> Result<DbPool> {
    let database_url = std::env::var("DATABASE_URL").map_err(|_| {
        YolocError::Config(
            "DATABASE_URL must be set to a PostgreSQL connection string".to_string(),
        )
    })?;
    connect(&database_url, None)
}

/// Build a pool for `database_url` and run pending migrations.
pub fn connect(database_url: &str, max_size: Option<u32>) -> Result<DbPool> {
    let manager = ConnectionManager::<PgConnection>::new(database_url);
    let mut builder = r2d2::Pool::builder();
    if let Some(max_size) = max_size {
        builder = builder.max_size(max_size);
    }
    let pool = builder
        .build(manager)
        .map_err(|err| YolocError::Config(format!("failed to create database pool: {err}")))?;
    run_migrations(&pool)?;
    Ok(pool)
}

/// Run pending Diesel migrations.
pub fn run_migrations(pool: &DbPool) -> Result<()> {
    let mut conn = pool
        .get()
        .map_err(|err| YolocError::Config(format!("failed to fetch database connection: {err}")))?;
    conn.run_pending_migrations(MIGRATIONS)
        .map_err(|err| YolocError::Config(format!("run migrations: {err}")))?;
    Ok(())
}

#[cfg(test)]
fn split_database_url(database_url: &str) -> Option<(String, String)> {
    let (url_base, query) = database_url.split_once('?').unwrap_or((database_url, ""));
    let (base, _db_name) = url_base.rsplit_once('/')?;
    let query_suffix = if query.is_empty() {
        String::new()
    } else {
        format!("?{query}")
    };
    Some((base.to_string(), query_suffix))
}

#[cfg(test)]
/// A temporary PostgreSQL database for tests.
pub(crate) struct TestDatabase {
    database_url: String,
    admin_url: String,
    db_name: String,
    pool: Option<DbPool>,
}

#[cfg(test)]
impl TestDatabase {
    /// Create an isolated database when `TEST_DATABASE_URL` is set.
    pub(crate) fn from_env() -> Option<Self> {
        use diesel::{Connection, RunQueryDsl};

        let base_url = std::env::var("TEST_DATABASE_URL").ok()?;
        let (base, query_suffix) =
            split_database_url(&base_url).expect("TEST_DATABASE_URL must include a database name");
        let db_name = format!("yoloc_test_{}", uuid::Uuid::new_v4().simple());
        let admin_url = format!("{}/postgres{}", base, query_suffix);
        let database_url = format!("{}/{}{}", base, db_name, query_suffix);

        let mut admin_conn = PgConnection::establish(&admin_url).expect("connect admin database");
        diesel::sql_query(format!("CREATE DATABASE \"{db_name}\""))
            .execute(&mut admin_conn)
            .expect("create test database");

        Some(Self {
            database_url,
            admin_url,
            db_name,
            pool: None,
        })
    }

    /// Return the test database URL.
    pub(crate) fn database_url(&self) -> &str {
        &self.database_url
    }

    /// Get a pooled connection for the test database (runs migrations once).
    pub(crate) fn pool(&mut self) -> DbPool {
        if self.pool.is_none() {
            self.pool = Some(connect(&self.database_url, Some(1)).expect("pool"));
        }
        self.pool.as_ref().expect("pool").clone()
    }
}

#[cfg(test)]
impl Drop for TestDatabase {
    fn drop(&mut self) {
        use diesel::{Connection, RunQueryDsl};

        let _ = self.pool.take();
        if let Ok(mut conn) = PgConnection::establish(&self.admin_url) {
            let escaped = self.db_name.replace('\'', "''");
            let _ = diesel::sql_query(format!(
                "SELECT pg_terminate_backend(pid) \
                 FROM pg_stat_activity \
                 WHERE datname = '{escaped}' AND pid <> pg_backend_pid()"
            ))
            .execute(&mut conn);
            let _ = diesel::sql_query(format!("DROP DATABASE IF EXISTS \"{}\"", self.db_name))
                .execute(&mut conn);
        }
    }
}
