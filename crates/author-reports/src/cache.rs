//! Report caching
//!
//! Built reports are stored as JSON under structured keys with an expiry.
//! Past months never change, so they live for a month; the current month is
//! kept only briefly since new sales keep arriving.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Months, NaiveDate, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::{Mutex, PoisonError};
use tracing::{debug, warn};

use crate::constants;
use crate::error::CacheError;

// =============================================================================
// Keys and Lifetimes
// =============================================================================

/// Identity of a cached value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// Report over an exact `[from, to]` statement window
    Statement { from: NaiveDate, to: NaiveDate },
    /// Monthly earnings history fetched for a calendar year
    Yearly { year: i32 },
}

impl CacheKey {
    pub fn statement(from: NaiveDate, to: NaiveDate) -> Self {
        Self::Statement { from, to }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheKey::Statement { from, to } => write!(f, "statement:{}:{}", from, to),
            CacheKey::Yearly { year } => write!(f, "yearly:{}", year),
        }
    }
}

/// How long a cached value stays valid
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ttl {
    Minutes(i64),
    Days(i64),
    Months(u32),
}

impl Ttl {
    /// Report whose window ends in the current month
    pub const CURRENT_MONTH: Ttl = Ttl::Minutes(constants::CURRENT_MONTH_TTL_MINUTES);
    /// Report covering a whole past month, and the yearly history
    pub const FULL_MONTH: Ttl = Ttl::Months(constants::FULL_MONTH_TTL_MONTHS);
    /// Report covering part of a past month
    pub const PARTIAL_RANGE: Ttl = Ttl::Days(constants::PARTIAL_RANGE_TTL_DAYS);

    /// Absolute expiry when stored at `now`
    pub fn expires_at(self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            Ttl::Minutes(minutes) => now + ChronoDuration::minutes(minutes),
            Ttl::Days(days) => now + ChronoDuration::days(days),
            Ttl::Months(months) => now
                .checked_add_months(Months::new(months))
                .unwrap_or_else(|| now + ChronoDuration::days(31 * i64::from(months))),
        }
    }
}

// =============================================================================
// Store Interface
// =============================================================================

/// Key-value store with expiry holding serialized report data
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Whether a live value exists under `key`
    async fn has(&self, key: &CacheKey) -> Result<bool, CacheError> {
        Ok(self.get(key).await?.is_some())
    }

    /// Raw value under `key`, if present and not expired
    async fn get(&self, key: &CacheKey) -> Result<Option<String>, CacheError>;

    /// Store `value` under `key`, replacing any previous value
    async fn put(&self, key: &CacheKey, value: String, ttl: Ttl) -> Result<(), CacheError>;
}

/// Load and decode a cached value. Undecodable values count as a miss.
pub async fn load<T, S>(store: &S, key: &CacheKey) -> Result<Option<T>, CacheError>
where
    T: DeserializeOwned,
    S: CacheStore + ?Sized,
{
    let Some(raw) = store.get(key).await? else {
        debug!(%key, "cache miss");
        return Ok(None);
    };

    match serde_json::from_str(&raw) {
        Ok(value) => {
            debug!(%key, "cache hit");
            Ok(Some(value))
        }
        Err(e) => {
            warn!(%key, error = %e, "discarding undecodable cache entry");
            Ok(None)
        }
    }
}

/// Encode and store a value
pub async fn save<T, S>(store: &S, key: &CacheKey, value: &T, ttl: Ttl) -> Result<(), CacheError>
where
    T: Serialize + ?Sized,
    S: CacheStore + ?Sized,
{
    let raw = serde_json::to_string(value)?;
    store.put(key, raw, ttl).await
}

// =============================================================================
// In-Memory Store
// =============================================================================

struct MemoryEntry {
    value: String,
    ttl: Ttl,
    expires_at: DateTime<Utc>,
}

/// Process-local cache store
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<CacheKey, MemoryEntry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lifetime the value under `key` was stored with
    pub fn ttl_of(&self, key: &CacheKey) -> Option<Ttl> {
        self.lock().get(key).map(|entry| entry.ttl)
    }

    /// Number of stored values, expired ones included
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<CacheKey, MemoryEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn get(&self, key: &CacheKey) -> Result<Option<String>, CacheError> {
        let now = Utc::now();
        Ok(self
            .lock()
            .get(key)
            .filter(|entry| entry.expires_at > now)
            .map(|entry| entry.value.clone()))
    }

    async fn put(&self, key: &CacheKey, value: String, ttl: Ttl) -> Result<(), CacheError> {
        let expires_at = ttl.expires_at(Utc::now());
        self.lock().insert(
            *key,
            MemoryEntry {
                value,
                ttl,
                expires_at,
            },
        );
        Ok(())
    }
}

// =============================================================================
// SQLite Store
// =============================================================================

/// SQLite-backed cache store
pub struct SqliteCache {
    pool: SqlitePool,
}

impl SqliteCache {
    /// Open or create the cache database
    pub async fn open(path: &Path) -> Result<Self, CacheError> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        // SQLx requires the file to exist for SQLite
        if !path.exists() {
            std::fs::File::create(path)?;
        }

        let url = format!("sqlite:{}", path.display());
        let pool = SqlitePool::connect(&url).await?;

        // WAL mode and a busy timeout so concurrent CLI runs don't hit SQLITE_BUSY
        sqlx::query("PRAGMA journal_mode=WAL")
            .execute(&pool)
            .await?;
        sqlx::query("PRAGMA busy_timeout=5000")
            .execute(&pool)
            .await?;

        let cache = Self { pool };
        cache.init_schema().await?;

        Ok(cache)
    }

    async fn init_schema(&self) -> Result<(), CacheError> {
        sqlx::query(
            "
            -- Serialized reports keyed by window or year
            CREATE TABLE IF NOT EXISTS report_cache (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                expires_at INTEGER NOT NULL,
                stored_at TEXT NOT NULL DEFAULT (datetime('now'))
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Delete expired entries, returning how many were removed
    pub async fn purge_expired(&self) -> Result<u64, CacheError> {
        let result = sqlx::query("DELETE FROM report_cache WHERE expires_at <= ?")
            .bind(Utc::now().timestamp())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    /// Get cache statistics
    pub async fn stats(&self) -> Result<CacheStats, CacheError> {
        let now = Utc::now().timestamp();
        let total: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM report_cache")
            .fetch_one(&self.pool)
            .await?;
        let live: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM report_cache WHERE expires_at > ?")
            .bind(now)
            .fetch_one(&self.pool)
            .await?;

        Ok(CacheStats {
            live: live.0 as u64,
            expired: (total.0 - live.0).max(0) as u64,
        })
    }
}

#[async_trait]
impl CacheStore for SqliteCache {
    async fn has(&self, key: &CacheKey) -> Result<bool, CacheError> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT 1 FROM report_cache WHERE key = ? AND expires_at > ?")
                .bind(key.to_string())
                .bind(Utc::now().timestamp())
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.is_some())
    }

    async fn get(&self, key: &CacheKey) -> Result<Option<String>, CacheError> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT value FROM report_cache WHERE key = ? AND expires_at > ?")
                .bind(key.to_string())
                .bind(Utc::now().timestamp())
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(|(value,)| value))
    }

    async fn put(&self, key: &CacheKey, value: String, ttl: Ttl) -> Result<(), CacheError> {
        let expires_at = ttl.expires_at(Utc::now());
        sqlx::query(
            "INSERT OR REPLACE INTO report_cache (key, value, expires_at)
             VALUES (?, ?, ?)",
        )
        .bind(key.to_string())
        .bind(value)
        .bind(expires_at.timestamp())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

/// Cache statistics
#[derive(Debug)]
pub struct CacheStats {
    pub live: u64,
    pub expired: u64,
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} live entries, {} expired", self.live, self.expired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn march() -> CacheKey {
        CacheKey::statement(
            NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 3, 31).unwrap(),
        )
    }

    #[test]
    fn test_key_rendering() {
        assert_eq!(march().to_string(), "statement:2024-03-01:2024-03-31");
        assert_eq!(CacheKey::Yearly { year: 2024 }.to_string(), "yearly:2024");
    }

    #[test]
    fn test_ttl_expiry() {
        let now = Utc.with_ymd_and_hms(2024, 1, 31, 12, 0, 0).unwrap();
        assert_eq!(
            Ttl::CURRENT_MONTH.expires_at(now),
            Utc.with_ymd_and_hms(2024, 1, 31, 13, 0, 0).unwrap()
        );
        assert_eq!(
            Ttl::PARTIAL_RANGE.expires_at(now),
            Utc.with_ymd_and_hms(2024, 2, 7, 12, 0, 0).unwrap()
        );
        // Calendar month, clamped to the end of February
        assert_eq!(
            Ttl::FULL_MONTH.expires_at(now),
            Utc.with_ymd_and_hms(2024, 2, 29, 12, 0, 0).unwrap()
        );
    }

    #[tokio::test]
    async fn test_memory_cache_round_trip() {
        let cache = MemoryCache::new();
        assert!(!cache.has(&march()).await.unwrap());

        save(&cache, &march(), &vec![1, 2, 3], Ttl::FULL_MONTH).await.unwrap();

        assert!(cache.has(&march()).await.unwrap());
        let value: Option<Vec<i32>> = load(&cache, &march()).await.unwrap();
        assert_eq!(value, Some(vec![1, 2, 3]));
        assert_eq!(cache.ttl_of(&march()), Some(Ttl::FULL_MONTH));
    }

    #[tokio::test]
    async fn test_memory_cache_expired_entry_is_a_miss() {
        let cache = MemoryCache::new();
        cache
            .put(&march(), "[1]".to_string(), Ttl::Minutes(-1))
            .await
            .unwrap();
        assert!(!cache.has(&march()).await.unwrap());
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_undecodable_value_is_a_miss() {
        let cache = MemoryCache::new();
        cache
            .put(&march(), "not json".to_string(), Ttl::FULL_MONTH)
            .await
            .unwrap();
        let value: Option<Vec<i32>> = load(&cache, &march()).await.unwrap();
        assert_eq!(value, None);
    }

    #[tokio::test]
    async fn test_sqlite_cache_store_and_expire() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SqliteCache::open(&dir.path().join("nested").join("cache.db"))
            .await
            .unwrap();

        let year = CacheKey::Yearly { year: 2023 };
        cache
            .put(&march(), "{\"a\":1}".to_string(), Ttl::FULL_MONTH)
            .await
            .unwrap();
        cache
            .put(&year, "[]".to_string(), Ttl::Minutes(-5))
            .await
            .unwrap();

        assert!(cache.has(&march()).await.unwrap());
        assert_eq!(cache.get(&march()).await.unwrap().as_deref(), Some("{\"a\":1}"));
        assert!(!cache.has(&year).await.unwrap());
        assert_eq!(cache.get(&year).await.unwrap(), None);

        let stats = cache.stats().await.unwrap();
        assert_eq!(stats.live, 1);
        assert_eq!(stats.expired, 1);

        assert_eq!(cache.purge_expired().await.unwrap(), 1);
        assert_eq!(cache.stats().await.unwrap().expired, 0);
    }

    #[tokio::test]
    async fn test_sqlite_cache_put_replaces() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SqliteCache::open(&dir.path().join("cache.db")).await.unwrap();

        cache.put(&march(), "1".to_string(), Ttl::FULL_MONTH).await.unwrap();
        cache.put(&march(), "2".to_string(), Ttl::FULL_MONTH).await.unwrap();

        assert_eq!(cache.get(&march()).await.unwrap().as_deref(), Some("2"));
        assert_eq!(cache.stats().await.unwrap().live, 1);
    }
}
