//! File-backed caches with per-entry TTL
//!
//! [`CacheStore`] keeps two files per key under `root/namespace`: the
//! bincode-encoded value (`<key>.cache`) and a small JSON metadata record
//! (`<key>.meta`) holding the write timestamp and TTL. The value is written
//! before the metadata and each file goes through a temp file plus rename,
//! so a concurrent reader sees either the old record or the new one.
//!
//! [`JsonFileCache`] is a single human-readable JSON file with a timestamp,
//! used for large reference payloads.

use crate::error::Result;
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::fs;
use tracing::{debug, warn};

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Map a key to a file-system safe name
fn sanitize_key(key: &str) -> String {
    key.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let suffix = format!(
        "tmp.{}.{}",
        std::process::id(),
        TMP_COUNTER.fetch_add(1, Ordering::Relaxed)
    );
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".");
    tmp.push(suffix);
    let tmp = PathBuf::from(tmp);

    fs::write(&tmp, bytes).await?;
    if let Err(e) = fs::rename(&tmp, path).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    Ok(())
}

async fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheMeta {
    timestamp: f64,
    ttl: u64,
    key: String,
}

impl CacheMeta {
    fn is_expired(&self, now: f64) -> bool {
        now - self.timestamp > self.ttl as f64
    }
}

/// Binary key/value cache in one namespace directory
#[derive(Debug, Clone)]
pub struct CacheStore {
    dir: PathBuf,
    default_ttl: Duration,
}

impl CacheStore {
    /// Create a store rooted at `root/namespace`; the directory is created
    /// on first write
    pub fn new(root: impl AsRef<Path>, namespace: &str, default_ttl: Duration) -> Self {
        Self {
            dir: root.as_ref().join(sanitize_key(namespace)),
            default_ttl,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    fn paths(&self, key: &str) -> (PathBuf, PathBuf) {
        let name = sanitize_key(key);
        (
            self.dir.join(format!("{name}.cache")),
            self.dir.join(format!("{name}.meta")),
        )
    }

    /// Store a value; `ttl` falls back to the store default
    pub async fn set<T: Serialize>(&self, key: &str, value: &T, ttl: Option<Duration>) -> Result<()> {
        fs::create_dir_all(&self.dir).await?;
        let (value_path, meta_path) = self.paths(key);

        let bytes = bincode::serialize(value)?;
        write_atomic(&value_path, &bytes).await?;

        let meta = CacheMeta {
            timestamp: now_secs(),
            ttl: ttl.unwrap_or(self.default_ttl).as_secs(),
            key: key.to_string(),
        };
        write_atomic(&meta_path, &serde_json::to_vec(&meta)?).await?;

        debug!("Cached value for key: {}", key);
        Ok(())
    }

    /// Fetch a live value; expired entries are removed and read failures
    /// count as a miss
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let (value_path, meta_path) = self.paths(key);

        let meta_bytes = match fs::read(&meta_path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("Cache miss for key: {}", key);
                return None;
            }
            Err(e) => {
                warn!("Failed to read cache metadata for {}: {}", key, e);
                return None;
            }
        };

        let meta: CacheMeta = match serde_json::from_slice(&meta_bytes) {
            Ok(meta) => meta,
            Err(e) => {
                warn!("Corrupt cache metadata for {}: {}", key, e);
                return None;
            }
        };

        if meta.is_expired(now_secs()) {
            debug!("Cache entry expired for key: {}", key);
            if let Err(e) = self.delete(key).await {
                warn!("Failed to remove expired cache entry {}: {}", key, e);
            }
            return None;
        }

        let bytes = match fs::read(&value_path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Failed to read cached value for {}: {}", key, e);
                return None;
            }
        };

        match bincode::deserialize(&bytes) {
            Ok(value) => {
                debug!("Cache hit for key: {}", key);
                Some(value)
            }
            Err(e) => {
                warn!("Failed to decode cached value for {}: {}", key, e);
                None
            }
        }
    }

    /// Return the cached value or compute, store and return a fresh one
    ///
    /// A failure to store the computed value is logged, not returned.
    pub async fn get_or_compute<T, F, Fut, E>(
        &self,
        key: &str,
        ttl: Option<Duration>,
        compute: F,
    ) -> std::result::Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        if let Some(value) = self.get(key).await {
            return Ok(value);
        }

        let value = compute().await?;
        if let Err(e) = self.set(key, &value, ttl).await {
            warn!("Failed to cache value for {}: {}", key, e);
        }
        Ok(value)
    }

    /// Remove one entry; a missing entry is not an error
    pub async fn delete(&self, key: &str) -> Result<()> {
        let (value_path, meta_path) = self.paths(key);
        remove_if_exists(&meta_path).await?;
        remove_if_exists(&value_path).await
    }

    /// Remove every entry in the namespace, returning how many were removed
    pub async fn clear(&self) -> Result<usize> {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            match path.extension().and_then(|ext| ext.to_str()) {
                Some("cache") => {
                    remove_if_exists(&path).await?;
                    removed += 1;
                }
                Some("meta") => remove_if_exists(&path).await?,
                _ => {}
            }
        }
        Ok(removed)
    }
}

#[derive(Serialize)]
struct JsonEnvelope<'a, T> {
    timestamp: f64,
    data: &'a T,
}

#[derive(Deserialize)]
struct StoredEnvelope<T> {
    timestamp: f64,
    data: T,
}

/// Single JSON document cache with a freshness window
#[derive(Debug, Clone)]
pub struct JsonFileCache {
    path: PathBuf,
    ttl: Duration,
}

impl JsonFileCache {
    pub fn new(path: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self {
            path: path.into(),
            ttl,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Overwrite the file with `data` stamped with the current time
    pub async fn save<T: Serialize>(&self, data: &T) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let envelope = JsonEnvelope {
            timestamp: now_secs(),
            data,
        };
        write_atomic(&self.path, &serde_json::to_vec_pretty(&envelope)?).await?;
        debug!("Saved JSON cache: {}", self.path.display());
        Ok(())
    }

    /// Load the data if the file exists, parses and is still fresh
    pub async fn load<T: DeserializeOwned>(&self) -> Option<T> {
        let envelope: StoredEnvelope<T> = self.read().await?;
        if self.expired(envelope.timestamp) {
            debug!("JSON cache stale: {}", self.path.display());
            return None;
        }
        debug!("JSON cache hit: {}", self.path.display());
        Some(envelope.data)
    }

    pub async fn is_fresh(&self) -> bool {
        self.read::<IgnoredAny>()
            .await
            .is_some_and(|envelope| !self.expired(envelope.timestamp))
    }

    fn expired(&self, timestamp: f64) -> bool {
        now_secs() - timestamp > self.ttl.as_secs_f64()
    }

    async fn read<T: DeserializeOwned>(&self) -> Option<StoredEnvelope<T>> {
        let bytes = match fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return None,
            Err(e) => {
                warn!("Failed to read JSON cache {}: {}", self.path.display(), e);
                return None;
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(envelope) => Some(envelope),
            Err(e) => {
                warn!("Corrupt JSON cache {}: {}", self.path.display(), e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Hit {
        title: String,
        url: String,
        snippet: Option<String>,
    }

    fn hits() -> Vec<Hit> {
        vec![
            Hit {
                title: "Apple Newsroom".to_string(),
                url: "https://www.apple.com/newsroom/".to_string(),
                snippet: Some("Latest news".to_string()),
            },
            Hit {
                title: "Apple Inc. - Wikipedia".to_string(),
                url: "https://en.wikipedia.org/wiki/Apple_Inc.".to_string(),
                snippet: None,
            },
        ]
    }

    /// Move an entry's write time into the past
    async fn age_entry(store: &CacheStore, key: &str, by_secs: f64) {
        let (_, meta_path) = store.paths(key);
        let mut meta: CacheMeta =
            serde_json::from_slice(&fs::read(&meta_path).await.unwrap()).unwrap();
        meta.timestamp -= by_secs;
        fs::write(&meta_path, serde_json::to_vec(&meta).unwrap())
            .await
            .unwrap();
    }

    #[test]
    fn test_sanitize_key() {
        assert_eq!(sanitize_key("Apple Inc news"), "Apple_Inc_news");
        assert_eq!(sanitize_key("a/b:c?d"), "a_b_c_d");
        assert_eq!(sanitize_key("tavily-10_q"), "tavily-10_q");
    }

    #[tokio::test]
    async fn test_set_then_get() {
        let dir = TempDir::new().unwrap();
        let store = CacheStore::new(dir.path(), "search", Duration::from_secs(3600));

        store.set("apple news", &hits(), None).await.unwrap();
        let cached: Option<Vec<Hit>> = store.get("apple news").await;
        assert_eq!(cached, Some(hits()));

        assert!(dir.path().join("search/apple_news.cache").exists());
        assert!(dir.path().join("search/apple_news.meta").exists());
    }

    #[tokio::test]
    async fn test_missing_key_is_miss() {
        let dir = TempDir::new().unwrap();
        let store = CacheStore::new(dir.path(), "search", Duration::from_secs(60));
        assert_eq!(store.get::<Vec<Hit>>("absent").await, None);
    }

    #[tokio::test]
    async fn test_expired_entry_is_removed() {
        let dir = TempDir::new().unwrap();
        let store = CacheStore::new(dir.path(), "search", Duration::from_secs(3600));

        store
            .set("q", &hits(), Some(Duration::from_secs(60)))
            .await
            .unwrap();
        age_entry(&store, "q", 61.0).await;

        assert_eq!(store.get::<Vec<Hit>>("q").await, None);
        let (value_path, meta_path) = store.paths("q");
        assert!(!value_path.exists());
        assert!(!meta_path.exists());
    }

    #[tokio::test]
    async fn test_entry_within_ttl_survives() {
        let dir = TempDir::new().unwrap();
        let store = CacheStore::new(dir.path(), "search", Duration::from_secs(60));

        store.set("q", &hits(), None).await.unwrap();
        age_entry(&store, "q", 30.0).await;

        assert_eq!(store.get::<Vec<Hit>>("q").await, Some(hits()));
    }

    #[tokio::test]
    async fn test_corrupt_value_is_miss() {
        let dir = TempDir::new().unwrap();
        let store = CacheStore::new(dir.path(), "search", Duration::from_secs(60));

        store.set("q", &hits(), None).await.unwrap();
        let (value_path, _) = store.paths("q");
        fs::write(&value_path, b"\x01").await.unwrap();

        assert_eq!(store.get::<Vec<Hit>>("q").await, None);
    }

    #[tokio::test]
    async fn test_get_or_compute_runs_once() {
        let dir = TempDir::new().unwrap();
        let store = CacheStore::new(dir.path(), "search", Duration::from_secs(60));
        let mut calls = 0;

        for _ in 0..3 {
            let value: std::result::Result<Vec<Hit>, String> = store
                .get_or_compute("q", None, || {
                    calls += 1;
                    async { Ok(hits()) }
                })
                .await;
            assert_eq!(value.unwrap(), hits());
        }
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn test_get_or_compute_error_not_cached() {
        let dir = TempDir::new().unwrap();
        let store = CacheStore::new(dir.path(), "search", Duration::from_secs(60));

        let failed: std::result::Result<Vec<Hit>, String> = store
            .get_or_compute("q", None, || async { Err("offline".to_string()) })
            .await;
        assert_eq!(failed, Err("offline".to_string()));
        assert_eq!(store.get::<Vec<Hit>>("q").await, None);
    }

    #[tokio::test]
    async fn test_delete_and_clear() {
        let dir = TempDir::new().unwrap();
        let store = CacheStore::new(dir.path(), "search", Duration::from_secs(60));

        for key in ["a", "b", "c"] {
            store.set(key, &hits(), None).await.unwrap();
        }
        store.delete("a").await.unwrap();
        store.delete("never-written").await.unwrap();
        assert_eq!(store.get::<Vec<Hit>>("a").await, None);

        assert_eq!(store.clear().await.unwrap(), 2);
        assert_eq!(store.get::<Vec<Hit>>("b").await, None);
    }

    #[tokio::test]
    async fn test_clear_without_directory() {
        let dir = TempDir::new().unwrap();
        let store = CacheStore::new(dir.path(), "never_used", Duration::from_secs(60));
        assert_eq!(store.clear().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_json_cache_round_trip() {
        let dir = TempDir::new().unwrap();
        let cache = JsonFileCache::new(
            dir.path().join("sec/company_tickers.json"),
            Duration::from_secs(86_400),
        );
        assert!(!cache.is_fresh().await);

        let payload = serde_json::json!({"0": {"cik_str": 320_193, "ticker": "AAPL", "title": "Apple Inc."}});
        cache.save(&payload).await.unwrap();

        assert!(cache.is_fresh().await);
        let loaded: Option<serde_json::Value> = cache.load().await;
        assert_eq!(loaded, Some(payload));
    }

    #[tokio::test]
    async fn test_json_cache_stale() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("facts.json");
        let old = serde_json::json!({"timestamp": now_secs() - 7200.0, "data": [1, 2, 3]});
        fs::write(&path, serde_json::to_vec(&old).unwrap())
            .await
            .unwrap();

        let cache = JsonFileCache::new(&path, Duration::from_secs(3600));
        assert!(!cache.is_fresh().await);
        assert_eq!(cache.load::<Vec<u32>>().await, None);

        let lenient = JsonFileCache::new(&path, Duration::from_secs(86_400));
        assert_eq!(lenient.load::<Vec<u32>>().await, Some(vec![1, 2, 3]));
    }
}
