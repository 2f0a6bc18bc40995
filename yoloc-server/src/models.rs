//! Database models for the yoloc server.

use chrono::NaiveDateTime;
use diesel::prelude::*;

use crate::schema::persisted_runs;

#[derive(Debug, Clone, Queryable, Insertable, Identifiable, Selectable)]
#[diesel(table_name = persisted_runs)]
#[diesel(primary_key(key))]
/// Stored rows of a completed run.
pub struct PersistedRun {
    /// Store key, `repos/<sanitized persist key>`.
    pub key: String,
    /// Encoded persisted blob (rows plus their timestamp).
    pub blob: String,
    /// When the blob was written.
    pub stored_at: NaiveDateTime,
}
