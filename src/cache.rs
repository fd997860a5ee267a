//! Named cache buckets mapping request keys to stored responses.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;

use crate::error::{Error, Result};
use crate::network::Response;

/// A response stored in a cache bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResponse {
    /// URL the response was fetched for.
    pub url: String,
    /// HTTP status code.
    pub status: u16,
    /// `Content-Type` header, if any.
    pub content_type: Option<String>,
    /// Remaining end-to-end headers.
    pub headers: Vec<(String, String)>,
    /// Response body.
    pub body: Bytes,
    /// When the entry was written.
    pub stored_at: DateTime<Utc>,
}

impl CachedResponse {
    /// Captures a network response for storage.
    #[must_use]
    pub fn from_response(response: Response, stored_at: DateTime<Utc>) -> Self {
        Self {
            url: response.url,
            status: response.status,
            content_type: response.content_type,
            headers: response.headers,
            body: response.body,
            stored_at,
        }
    }

    /// Converts the stored entry back into a response.
    #[must_use]
    pub fn into_response(self) -> Response {
        Response {
            url: self.url,
            status: self.status,
            content_type: self.content_type,
            headers: self.headers,
            body: self.body,
        }
    }
}

/// Abstraction over the host's cache storage.
///
/// Individual calls are atomic; nothing spans multiple calls.
#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Opens the bucket, creating it if absent.
    async fn open(&self, bucket: &str) -> Result<()>;

    /// Looks up an exact key match.
    async fn match_key(&self, bucket: &str, key: &str) -> Result<Option<CachedResponse>>;

    /// Stores `response` under `key`, replacing any existing entry.
    async fn put(&self, bucket: &str, key: &str, response: CachedResponse) -> Result<()>;

    /// Stores a batch of entries.
    async fn put_all(&self, bucket: &str, entries: Vec<(String, CachedResponse)>) -> Result<()>;

    /// Lists the keys in a bucket, sorted.
    async fn keys(&self, bucket: &str) -> Result<Vec<String>>;

    /// Removes a bucket and all its entries. Returns false if it did not exist.
    async fn delete_bucket(&self, bucket: &str) -> Result<bool>;
}

/// In-memory cache storage.
#[derive(Debug, Default)]
pub struct MemoryCacheStorage {
    buckets: RwLock<HashMap<String, HashMap<String, CachedResponse>>>,
}

impl MemoryCacheStorage {
    /// Creates an empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStorage for MemoryCacheStorage {
    async fn open(&self, bucket: &str) -> Result<()> {
        self.buckets
            .write()
            .await
            .entry(bucket.to_string())
            .or_default();
        Ok(())
    }

    async fn match_key(&self, bucket: &str, key: &str) -> Result<Option<CachedResponse>> {
        Ok(self
            .buckets
            .read()
            .await
            .get(bucket)
            .and_then(|entries| entries.get(key))
            .cloned())
    }

    async fn put(&self, bucket: &str, key: &str, response: CachedResponse) -> Result<()> {
        self.buckets
            .write()
            .await
            .entry(bucket.to_string())
            .or_default()
            .insert(key.to_string(), response);
        Ok(())
    }

    async fn put_all(&self, bucket: &str, entries: Vec<(String, CachedResponse)>) -> Result<()> {
        let mut buckets = self.buckets.write().await;
        let target = buckets.entry(bucket.to_string()).or_default();
        target.extend(entries);
        Ok(())
    }

    async fn keys(&self, bucket: &str) -> Result<Vec<String>> {
        let mut keys: Vec<String> = self
            .buckets
            .read()
            .await
            .get(bucket)
            .map(|entries| entries.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        Ok(keys)
    }

    async fn delete_bucket(&self, bucket: &str) -> Result<bool> {
        Ok(self.buckets.write().await.remove(bucket).is_some())
    }
}

/// On-disk record for one cache entry.
#[derive(Debug, Serialize, Deserialize)]
struct DiskRecord {
    key: String,
    url: String,
    status: u16,
    content_type: Option<String>,
    #[serde(default)]
    headers: Vec<(String, String)>,
    body: String,
    stored_at: DateTime<Utc>,
}

impl DiskRecord {
    fn new(key: &str, response: &CachedResponse) -> Self {
        Self {
            key: key.to_string(),
            url: response.url.clone(),
            status: response.status,
            content_type: response.content_type.clone(),
            headers: response.headers.clone(),
            body: BASE64.encode(&response.body),
            stored_at: response.stored_at,
        }
    }

    fn into_cached(self) -> Result<CachedResponse> {
        let body = BASE64
            .decode(self.body.as_bytes())
            .map_err(|e| Error::Cache(format!("corrupt body for {}: {e}", self.key)))?;
        Ok(CachedResponse {
            url: self.url,
            status: self.status,
            content_type: self.content_type,
            headers: self.headers,
            body: Bytes::from(body),
            stored_at: self.stored_at,
        })
    }
}

/// Cache storage persisted under a root directory.
///
/// Each bucket is a directory; each entry is a JSON file named by the
/// SHA-256 of its key. Every write goes to its own `.tmp` file that is then
/// renamed over the entry, so readers see either the old or the new record.
#[derive(Debug, Clone)]
pub struct DiskCacheStorage {
    root: PathBuf,
}

impl DiskCacheStorage {
    /// Creates a storage rooted at `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn bucket_dir(&self, bucket: &str) -> PathBuf {
        self.root.join(sanitize_bucket(bucket))
    }

    fn entry_path(&self, bucket: &str, key: &str) -> PathBuf {
        self.bucket_dir(bucket).join(format!("{}.json", key_digest(key)))
    }

    async fn write_tmp(&self, bucket: &str, key: &str, response: &CachedResponse) -> Result<PathBuf> {
        let json = serde_json::to_vec(&DiskRecord::new(key, response))?;
        write_unique_tmp(&self.entry_path(bucket, key), &json).await
    }

    /// Puts back what `put_all` overwrote before it failed.
    async fn roll_back(published: Vec<(PathBuf, Option<Vec<u8>>)>) {
        for (path, previous) in published.into_iter().rev() {
            let restored = match previous {
                Some(contents) => match write_unique_tmp(&path, &contents).await {
                    Ok(tmp_path) => tokio::fs::rename(&tmp_path, &path)
                        .await
                        .map_err(Error::from),
                    Err(e) => Err(e),
                },
                None => tokio::fs::remove_file(&path).await.map_err(Error::from),
            };
            if let Err(e) = restored {
                log::warn!("Could not roll back {}: {e}", path.display());
            }
        }
    }
}

/// Distinguishes temp files of concurrent writes within this process.
static TMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// Writes `contents` next to `path` under a name no other write uses.
async fn write_unique_tmp(path: &Path, contents: &[u8]) -> Result<PathBuf> {
    let seq = TMP_SEQ.fetch_add(1, Ordering::Relaxed);
    let tmp_path = path.with_extension(format!("{}.{seq}.tmp", std::process::id()));
    if let Err(e) = tokio::fs::write(&tmp_path, contents).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(e.into());
    }
    Ok(tmp_path)
}

#[async_trait]
impl CacheStorage for DiskCacheStorage {
    async fn open(&self, bucket: &str) -> Result<()> {
        tokio::fs::create_dir_all(self.bucket_dir(bucket)).await?;
        Ok(())
    }

    async fn match_key(&self, bucket: &str, key: &str) -> Result<Option<CachedResponse>> {
        let path = self.entry_path(bucket, key);
        let contents = match tokio::fs::read(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let record: DiskRecord = serde_json::from_slice(&contents)?;
        record.into_cached().map(Some)
    }

    async fn put(&self, bucket: &str, key: &str, response: CachedResponse) -> Result<()> {
        self.open(bucket).await?;
        let tmp_path = self.write_tmp(bucket, key, &response).await?;
        tokio::fs::rename(&tmp_path, self.entry_path(bucket, key)).await?;
        Ok(())
    }

    async fn put_all(&self, bucket: &str, entries: Vec<(String, CachedResponse)>) -> Result<()> {
        self.open(bucket).await?;

        // Stage every entry before publishing any of them.
        let mut staged = Vec::with_capacity(entries.len());
        for (key, response) in &entries {
            match self.write_tmp(bucket, key, response).await {
                Ok(tmp_path) => staged.push((tmp_path, self.entry_path(bucket, key))),
                Err(e) => {
                    for (tmp_path, _) in &staged {
                        let _ = tokio::fs::remove_file(tmp_path).await;
                    }
                    return Err(e);
                }
            }
        }

        // Publish, remembering what each rename replaced.
        let mut published = Vec::with_capacity(staged.len());
        for (i, (tmp_path, path)) in staged.iter().enumerate() {
            let previous = tokio::fs::read(path).await.ok();
            if let Err(e) = tokio::fs::rename(tmp_path, path).await {
                for (unpublished, _) in &staged[i..] {
                    let _ = tokio::fs::remove_file(unpublished).await;
                }
                Self::roll_back(published).await;
                return Err(e.into());
            }
            published.push((path.clone(), previous));
        }
        Ok(())
    }

    async fn keys(&self, bucket: &str) -> Result<Vec<String>> {
        let mut dir = match tokio::fs::read_dir(self.bucket_dir(bucket)).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut keys = Vec::new();
        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            if path.extension().is_none_or(|ext| ext != "json") {
                continue;
            }
            match tokio::fs::read(&path).await {
                Ok(contents) => match serde_json::from_slice::<DiskRecord>(&contents) {
                    Ok(record) => keys.push(record.key),
                    Err(e) => log::warn!("Skipping unreadable cache entry {}: {e}", path.display()),
                },
                Err(e) => log::warn!("Skipping unreadable cache entry {}: {e}", path.display()),
            }
        }
        keys.sort();
        Ok(keys)
    }

    async fn delete_bucket(&self, bucket: &str) -> Result<bool> {
        match tokio::fs::remove_dir_all(self.bucket_dir(bucket)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

/// Maps a bucket name onto a safe directory name.
fn sanitize_bucket(bucket: &str) -> String {
    bucket
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Hex SHA-256 of a cache key.
fn key_digest(key: &str) -> String {
    Sha256::digest(key.as_bytes())
        .iter()
        .fold(String::with_capacity(64), |mut out, b| {
            let _ = write!(out, "{b:02x}");
            out
        })
}
