//! Durable caching of whole-run results.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::BoxFuture;
use crate::config::Settings;
use crate::domain::CheckRow;
use crate::error::{Result, YolocError};

/// Persisted results older than this are ignored.
pub const FRESHNESS_HOURS: i64 = 24;

/// A pluggable store for the rows of a completed run.
pub trait ResultStore: Send + Sync {
    /// Backend name, as selected by `YOLOC_PERSIST_BACKEND`.
    fn backend(&self) -> &'static str;

    /// Fresh rows stored under `key`, if any.
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<Vec<CheckRow>>>>;

    /// Store `rows` under `key`, stamped with the current time.
    fn set<'a>(&'a self, key: &'a str, rows: &'a [CheckRow]) -> BoxFuture<'a, Result<()>>;
}

/// Serialized form of a stored run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedBlob {
    /// Rows of the run.
    pub results: Vec<CheckRow>,
    /// When the run was stored.
    pub timestamp: DateTime<Utc>,
}

impl PersistedBlob {
    /// Blob for `rows` stamped at `timestamp`.
    pub fn new(rows: &[CheckRow], timestamp: DateTime<Utc>) -> Self {
        Self {
            results: rows.to_vec(),
            timestamp,
        }
    }

    /// Encode as JSON.
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode from JSON.
    pub fn decode(raw: &str) -> Result<Self> {
        serde_json::from_str(raw)
            .map_err(|err| YolocError::Decode(format!("persisted blob: {err}")))
    }

    /// Whether the blob was stored within the freshness window before `now`.
    ///
    /// Blobs stamped in the future are rejected.
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.timestamp <= now && now - self.timestamp <= Duration::hours(FRESHNESS_HOURS)
    }

    /// The rows, if the blob is fresh at `now`.
    pub fn into_fresh(self, now: DateTime<Utc>) -> Option<Vec<CheckRow>> {
        self.is_fresh(now).then_some(self.results)
    }
}

/// Collapse runs of non-alphanumeric characters into `_`.
pub fn sanitize_key(key: &str) -> String {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| Regex::new(r"[^A-Za-z0-9]+").ok());
    match pattern {
        Some(pattern) => pattern.replace_all(key, "_").into_owned(),
        None => key.to_string(),
    }
}

/// Store that never remembers anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullStore;

impl ResultStore for NullStore {
    fn backend(&self) -> &'static str {
        "null"
    }

    fn get<'a>(&'a self, _key: &'a str) -> BoxFuture<'a, Result<Option<Vec<CheckRow>>>> {
        Box::pin(async { Ok(None) })
    }

    fn set<'a>(&'a self, _key: &'a str, _rows: &'a [CheckRow]) -> BoxFuture<'a, Result<()>> {
        Box::pin(async { Ok(()) })
    }
}

/// One JSON file per key under a directory.
#[derive(Debug, Clone)]
pub struct DiskStore {
    root: PathBuf,
}

impl DiskStore {
    /// Store rooted at `root`; the directory is created on first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory holding the stored blobs.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn key_path(&self, key: &str) -> PathBuf {
        self.root.join(sanitize_key(key))
    }

    async fn read(&self, key: &str) -> Result<Option<Vec<CheckRow>>> {
        let path = self.key_path(key);
        log::debug!("checking {} ...", path.display());
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let blob = PersistedBlob::decode(&raw)?;
        let stored_at = blob.timestamp;
        let rows = blob.into_fresh(Utc::now());
        if rows.is_none() {
            log::info!("ignoring stale results for {key} stored at {stored_at}");
        }
        Ok(rows)
    }

    /// Sibling of `path` that readers never look up; sanitized keys hold no dots.
    fn staging_path(path: &Path) -> PathBuf {
        static NEXT: AtomicU64 = AtomicU64::new(0);
        let seq = NEXT.fetch_add(1, Ordering::Relaxed);
        let mut name = path.file_name().unwrap_or_default().to_os_string();
        name.push(format!(".{}.{seq}.tmp", std::process::id()));
        path.with_file_name(name)
    }

    async fn write(&self, key: &str, rows: &[CheckRow]) -> Result<()> {
        let path = self.key_path(key);
        log::info!("storing results at {} ...", path.display());
        let encoded = PersistedBlob::new(rows, Utc::now()).encode()?;
        tokio::fs::create_dir_all(&self.root).await?;
        let staging = Self::staging_path(&path);
        tokio::fs::write(&staging, encoded).await?;
        if let Err(err) = tokio::fs::rename(&staging, &path).await {
            let _ = tokio::fs::remove_file(&staging).await;
            return Err(err.into());
        }
        Ok(())
    }
}

impl ResultStore for DiskStore {
    fn backend(&self) -> &'static str {
        "disk"
    }

    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<Vec<CheckRow>>>> {
        Box::pin(self.read(key))
    }

    fn set<'a>(&'a self, key: &'a str, rows: &'a [CheckRow]) -> BoxFuture<'a, Result<()>> {
        Box::pin(self.write(key, rows))
    }
}

/// Open one of the built-in backends by name.
///
/// The empty string and `null` select [`NullStore`]; `disk` selects a
/// [`DiskStore`] under `<cache dir>/persist`.
pub fn open_store(backend: &str, settings: &Settings) -> Result<Arc<dyn ResultStore>> {
    match backend.trim() {
        "" | "null" => Ok(Arc::new(NullStore)),
        "disk" => Ok(Arc::new(DiskStore::new(settings.cache_dir.join("persist")))),
        other => Err(YolocError::Config(format!(
            "unknown persistence backend: {other:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::CheckResult;

    fn rows() -> Vec<CheckRow> {
        vec![
            CheckRow::scored("sbom", CheckResult::new(6, 10, "sbom mentioned").with_level(1)),
            CheckRow::failed("releaser", "timeout"),
        ]
    }

    fn unique_dir() -> PathBuf {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("system time")
            .as_nanos();
        std::env::temp_dir().join(format!("yoloc_persist_test_{nanos}"))
    }

    #[test]
    fn sanitize_collapses_separators() {
        assert_eq!(sanitize_key("owner/repo"), "owner_repo");
        assert_eq!(
            sanitize_key("google/triage-party@gcr.io/k8s/tp:v1"),
            "google_triage_party_gcr_io_k8s_tp_v1"
        );
        assert_eq!(sanitize_key("plain"), "plain");
    }

    #[test]
    fn freshness_window_edges() {
        let now = Utc::now();
        let blob = |at| PersistedBlob::new(&rows(), at);
        assert!(blob(now).is_fresh(now));
        assert!(blob(now - Duration::hours(23)).is_fresh(now));
        assert!(blob(now - Duration::hours(24)).is_fresh(now));
        assert!(!blob(now - Duration::hours(24) - Duration::seconds(1)).is_fresh(now));
        assert!(!blob(now + Duration::seconds(1)).is_fresh(now));
        assert!(blob(now + Duration::seconds(1)).into_fresh(now).is_none());
    }

    #[test]
    fn blob_decode_rejects_garbage() {
        let err = PersistedBlob::decode("not json").unwrap_err();
        assert!(matches!(err, YolocError::Decode(_)));
    }

    #[tokio::test]
    async fn disk_store_round_trips_and_misses() {
        let root = unique_dir();
        let store = DiskStore::new(&root);

        assert!(store.get("a/b").await.expect("miss").is_none());
        store.set("a/b", &rows()).await.expect("set");
        assert!(root.join("a_b").exists());
        assert_eq!(store.get("a/b").await.expect("hit"), Some(rows()));

        std::fs::remove_dir_all(&root).expect("cleanup temp dir");
    }

    #[tokio::test]
    async fn disk_store_readers_never_see_partial_writes() {
        let root = unique_dir();
        let store = DiskStore::new(&root);
        store.set("a/b", &rows()).await.expect("seed");

        let writes = async {
            for _ in 0..20 {
                store.set("a/b", &rows()).await.expect("overwrite");
            }
        };
        let reads = async {
            for _ in 0..20 {
                assert_eq!(store.get("a/b").await.expect("read"), Some(rows()));
                tokio::task::yield_now().await;
            }
        };
        tokio::join!(writes, reads);

        let names: Vec<String> = std::fs::read_dir(&root)
            .expect("list temp dir")
            .map(|entry| entry.expect("entry").file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a_b"]);

        std::fs::remove_dir_all(&root).expect("cleanup temp dir");
    }

    #[tokio::test]
    async fn disk_store_ignores_stale_blobs() {
        let root = unique_dir();
        std::fs::create_dir_all(&root).expect("create temp dir");
        let stale = PersistedBlob::new(&rows(), Utc::now() - Duration::hours(30));
        std::fs::write(root.join("a_b"), stale.encode().expect("encode")).expect("write");

        let store = DiskStore::new(&root);
        assert!(store.get("a/b").await.expect("stale").is_none());

        std::fs::remove_dir_all(&root).expect("cleanup temp dir");
    }

    #[test]
    fn open_store_selects_backend() {
        let settings = Settings {
            github_api_url: String::new(),
            github_web_url: String::new(),
            github_token: None,
            user_agent: String::new(),
            persist_backend: String::new(),
            cache_dir: unique_dir(),
            history_cache_size: 1,
        };
        assert_eq!(open_store("", &settings).expect("null").backend(), "null");
        assert_eq!(open_store("null", &settings).expect("null").backend(), "null");
        assert_eq!(open_store("disk", &settings).expect("disk").backend(), "disk");
        let err = match open_store("firestore", &settings) {
            Ok(_) => panic!("unknown backend accepted"),
            Err(err) => err,
        };
        assert!(err.is_fatal());
    }
}
