use crate::errors::{Result, UtilsError};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use cloud_select_core::RawListing;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::Mutex;

const ENTRY_FILE: &str = "instances.json";

// Anything longer never expires in practice
const MAX_TTL_HOURS: u64 = 24 * 365 * 1000;

/// Source of a provider's raw instance listing
#[async_trait]
pub trait CatalogFetcher: Send + Sync {
    async fn fetch(&self, provider: &str) -> Result<RawListing>;
}

/// Time source for cache expiry
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A cached provider listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub provider: String,
    pub fetched_at: DateTime<Utc>,
    pub ttl_hours: u64,
    pub data: RawListing,
}

impl CacheEntry {
    pub fn new(provider: &str, fetched_at: DateTime<Utc>, ttl_hours: u64, data: RawListing) -> Self {
        Self {
            provider: provider.to_string(),
            fetched_at,
            ttl_hours,
            data,
        }
    }

    /// Expired once strictly older than `ttl_hours`
    pub fn is_expired(&self, now: DateTime<Utc>, ttl_hours: u64) -> bool {
        let ttl = Duration::hours(ttl_hours.min(MAX_TTL_HOURS) as i64);
        now.signed_duration_since(self.fetched_at) > ttl
    }
}

/// On-disk cache of raw listings, one file per provider
pub struct CacheStore {
    root: PathBuf,
    clock: Arc<dyn Clock>,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl CacheStore {
    pub fn new(root: PathBuf) -> Self {
        Self::with_clock(root, Arc::new(SystemClock))
    }

    pub fn with_clock(root: PathBuf, clock: Arc<dyn Clock>) -> Self {
        Self {
            root,
            clock,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn entry_path(&self, provider: &str) -> PathBuf {
        self.root.join(provider).join(ENTRY_FILE)
    }

    /// Return the cached listing if it is fresh, otherwise fetch and store a
    /// new one. A ttl of zero disables the cache for this call entirely.
    pub async fn get<F>(&self, provider: &str, ttl_hours: u64, fetcher: &F) -> Result<RawListing>
    where
        F: CatalogFetcher + ?Sized,
    {
        if ttl_hours == 0 {
            debug!("Cache disabled, fetching {} catalog", provider);
            return fetcher.fetch(provider).await;
        }

        // One check-fetch-write at a time per provider
        let lock = self.provider_lock(provider).await;
        let _guard = lock.lock().await;

        match self.read(provider).await {
            Ok(Some(entry)) if !entry.is_expired(self.clock.now(), ttl_hours) => {
                debug!(
                    "Using cached {} catalog from {} ({} items)",
                    provider,
                    entry.fetched_at,
                    entry.data.len()
                );
                return Ok(entry.data);
            }
            Ok(Some(entry)) => info!(
                "Cached {} catalog from {} is older than {} hours, refreshing",
                provider, entry.fetched_at, ttl_hours
            ),
            Ok(None) => debug!("No cached {} catalog", provider),
            Err(e) => warn!("Ignoring unreadable {} cache: {}", provider, e),
        }

        let data = fetcher.fetch(provider).await?;
        let entry = CacheEntry::new(provider, self.clock.now(), ttl_hours, data);

        if let Err(e) = self.write(&entry).await {
            warn!("Failed to write {} cache: {}", provider, e);
        }

        Ok(entry.data)
    }

    /// Read the stored entry, `None` if there is none
    pub async fn read(&self, provider: &str) -> Result<Option<CacheEntry>> {
        let path = self.entry_path(provider);
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let entry: CacheEntry = serde_json::from_str(&content)?;
        if entry.provider != provider {
            return Err(UtilsError::Cache(format!(
                "{} holds a {} catalog",
                path.display(),
                entry.provider
            )));
        }
        Ok(Some(entry))
    }

    /// Write an entry through a temporary file and rename
    pub async fn write(&self, entry: &CacheEntry) -> Result<()> {
        let path = self.entry_path(&entry.provider);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                UtilsError::Cache(format!("Cannot create {}: {}", parent.display(), e))
            })?;
        }

        let content = serde_json::to_string(entry)?;
        let temp_path = path.with_extension("tmp");
        fs::write(&temp_path, content).await?;
        fs::rename(&temp_path, &path).await?;
        Ok(())
    }

    /// Remove a provider's entry if present
    pub async fn clear(&self, provider: &str) -> Result<()> {
        match fs::remove_file(self.entry_path(provider)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn provider_lock(&self, provider: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        Arc::clone(locks.entry(provider.to_string()).or_default())
    }
}
