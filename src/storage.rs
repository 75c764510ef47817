//! Key/value persistence for daily records and weekly curations.
//!
//! Keys look like `daily/2026-10-14` and `curated/weekly/2026-W42`. Payloads are
//! pretty-printed JSON documents so they stay human-inspectable on disk.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use crate::week::WeekId;

pub fn daily_key(date: NaiveDate) -> String {
    format!("daily/{}", date.format("%Y-%m-%d"))
}

pub fn weekly_key(week: WeekId) -> String {
    format!("curated/weekly/{week}")
}

/// Exclusive claim on a key, shared by every process using the same storage.
/// Dropping it releases the claim.
pub struct KeyLock {
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl KeyLock {
    fn new(release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }
}

impl Drop for KeyLock {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl std::fmt::Debug for KeyLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("KeyLock")
    }
}

#[async_trait]
pub trait Storage: Send + Sync {
    async fn save(&self, key: &str, payload: &str) -> Result<()>;
    /// `Ok(None)` when nothing is stored under `key`.
    async fn load(&self, key: &str) -> Result<Option<String>>;
    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.load(key).await?.is_some())
    }
    /// `Ok(None)` while another holder owns `key`.
    async fn try_lock(&self, key: &str) -> Result<Option<KeyLock>>;
}

pub async fn save_json<T: Serialize + Sync>(storage: &dyn Storage, key: &str, value: &T) -> Result<()> {
    let payload =
        serde_json::to_string_pretty(value).with_context(|| format!("encoding {key}"))?;
    storage.save(key, &payload).await
}

pub async fn load_json<T: DeserializeOwned>(storage: &dyn Storage, key: &str) -> Result<Option<T>> {
    match storage.load(key).await? {
        Some(payload) => {
            let v = serde_json::from_str(&payload).with_context(|| format!("decoding {key}"))?;
            Ok(Some(v))
        }
        None => Ok(None),
    }
}

/// Lock files older than this belong to a crashed run and are reclaimed.
const STALE_LOCK_AFTER: Duration = Duration::from_secs(6 * 60 * 60);

static TMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// `<root>/<key>.json`, written through a uniquely named temp file + rename.
/// Locks are `<root>/<key>.lock`, created with `create_new`.
#[derive(Debug, Clone)]
pub struct FsStorage {
    root: PathBuf,
    stale_after: Duration,
}

impl FsStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            stale_after: STALE_LOCK_AFTER,
        }
    }

    pub fn with_stale_lock_after(mut self, age: Duration) -> Self {
        self.stale_after = age;
        self
    }

    async fn create_lock_file(path: &Path) -> std::io::Result<()> {
        use tokio::io::AsyncWriteExt;
        let mut f = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .await?;
        let owner = format!("pid={} at={}\n", std::process::id(), chrono::Utc::now().to_rfc3339());
        f.write_all(owner.as_bytes()).await?;
        Ok(())
    }

    async fn is_stale(&self, path: &Path) -> bool {
        let Ok(meta) = tokio::fs::metadata(path).await else {
            return false;
        };
        meta.modified()
            .ok()
            .and_then(|m| SystemTime::now().duration_since(m).ok())
            .is_some_and(|age| age > self.stale_after)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        let rel = Path::new(key);
        let ok = !key.is_empty()
            && rel
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !ok {
            anyhow::bail!("invalid storage key '{key}'");
        }
        Ok(self.root.join(format!("{key}.json")))
    }
}

#[async_trait]
impl Storage for FsStorage {
    async fn save(&self, key: &str, payload: &str) -> Result<()> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let seq = TMP_SEQ.fetch_add(1, Ordering::Relaxed);
        let tmp = path.with_extension(format!("json.{}-{seq}.tmp", std::process::id()));
        tokio::fs::write(&tmp, payload.as_bytes())
            .await
            .with_context(|| format!("writing {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .with_context(|| format!("renaming into {}", path.display()))?;
        tracing::debug!(target: "storage", key, bytes = payload.len(), "saved");
        Ok(())
    }

    async fn load(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key)?;
        match tokio::fs::read_to_string(&path).await {
            Ok(s) => Ok(Some(s)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("reading {}", path.display())),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(tokio::fs::try_exists(self.path_for(key)?).await?)
    }

    async fn try_lock(&self, key: &str) -> Result<Option<KeyLock>> {
        let path = self.path_for(key)?.with_extension("lock");
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        for _ in 0..2 {
            match Self::create_lock_file(&path).await {
                Ok(()) => {
                    let held = path.clone();
                    return Ok(Some(KeyLock::new(move || {
                        let _ = std::fs::remove_file(held);
                    })));
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if !self.is_stale(&path).await {
                        return Ok(None);
                    }
                    tracing::warn!(target: "storage", key, "reclaiming stale lock");
                    let _ = tokio::fs::remove_file(&path).await;
                }
                Err(e) => return Err(e).with_context(|| format!("locking {}", path.display())),
            }
        }
        Ok(None)
    }
}

/// In-process storage for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    inner: Mutex<HashMap<String, String>>,
    locks: Arc<Mutex<HashSet<String>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn save(&self, key: &str, payload: &str) -> Result<()> {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), payload.to_string());
        Ok(())
    }

    async fn load(&self, key: &str) -> Result<Option<String>> {
        Ok(self
            .inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned())
    }

    async fn try_lock(&self, key: &str) -> Result<Option<KeyLock>> {
        let mut held = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        if !held.insert(key.to_string()) {
            return Ok(None);
        }
        let locks = self.locks.clone();
        let key = key.to_string();
        Ok(Some(KeyLock::new(move || {
            locks.lock().unwrap_or_else(|e| e.into_inner()).remove(&key);
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_formats() {
        let d = NaiveDate::from_ymd_opt(2026, 10, 14).unwrap();
        assert_eq!(daily_key(d), "daily/2026-10-14");
        assert_eq!(weekly_key(WeekId::from_date(d)), "curated/weekly/2026-W42");
    }

    #[tokio::test]
    async fn fs_storage_writes_nested_keys() {
        let dir = tempfile::tempdir().unwrap();
        let s = FsStorage::new(dir.path());
        assert!(!s.exists("daily/2026-10-14").await.unwrap());
        s.save("daily/2026-10-14", "{}").await.unwrap();
        assert!(dir.path().join("daily/2026-10-14.json").is_file());
        assert_eq!(s.load("daily/2026-10-14").await.unwrap().as_deref(), Some("{}"));
        assert!(s.exists("daily/2026-10-14").await.unwrap());
    }

    #[tokio::test]
    async fn fs_storage_rejects_escaping_keys() {
        let dir = tempfile::tempdir().unwrap();
        let s = FsStorage::new(dir.path());
        assert!(s.save("../outside", "{}").await.is_err());
        assert!(s.load("/etc/passwd").await.is_err());
    }

    #[tokio::test]
    async fn missing_keys_load_as_none() {
        let s = MemoryStorage::new();
        assert!(s.load("daily/2000-01-01").await.unwrap().is_none());
        let v: Option<Vec<u32>> = load_json(&s, "daily/2000-01-01").await.unwrap();
        assert!(v.is_none());
    }

    #[tokio::test]
    async fn fs_lock_is_exclusive_across_handles_until_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let first = FsStorage::new(dir.path());
        let second = FsStorage::new(dir.path());

        let held = first.try_lock("daily/2026-10-14").await.unwrap().unwrap();
        assert!(dir.path().join("daily/2026-10-14.lock").is_file());
        assert!(second.try_lock("daily/2026-10-14").await.unwrap().is_none());
        assert!(second.try_lock("daily/2026-10-15").await.unwrap().is_some());

        drop(held);
        assert!(!dir.path().join("daily/2026-10-14.lock").exists());
        assert!(second.try_lock("daily/2026-10-14").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn stale_fs_lock_is_reclaimed() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("daily")).unwrap();
        std::fs::write(dir.path().join("daily/2026-10-14.lock"), "pid=1\n").unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let s = FsStorage::new(dir.path()).with_stale_lock_after(Duration::from_millis(1));
        assert!(s.try_lock("daily/2026-10-14").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn concurrent_saves_to_one_key_do_not_collide() {
        let dir = tempfile::tempdir().unwrap();
        let a = FsStorage::new(dir.path());
        let b = FsStorage::new(dir.path());
        let (ra, rb) = tokio::join!(
            a.save("daily/2026-10-14", "{\"from\":\"a\"}"),
            b.save("daily/2026-10-14", "{\"from\":\"b\"}"),
        );
        ra.unwrap();
        rb.unwrap();
        let stored = a.load("daily/2026-10-14").await.unwrap().unwrap();
        assert!(stored.contains("\"from\""));
    }

    #[tokio::test]
    async fn memory_lock_releases_on_drop() {
        let s = MemoryStorage::new();
        let held = s.try_lock("discovery").await.unwrap();
        assert!(held.is_some());
        assert!(s.try_lock("discovery").await.unwrap().is_none());
        drop(held);
        assert!(s.try_lock("discovery").await.unwrap().is_some());
    }
}
