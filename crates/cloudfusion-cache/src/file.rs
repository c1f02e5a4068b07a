//! Filesystem-backed cache.
//!
//! One file per key under the cache directory; the file's modification
//! time is the entry timestamp, so `reset` only touches the mtime.

use crate::codec::PayloadCodec;
use crate::store::{has_expired, CacheStore, StoreSettings};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde_json::Value;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
    settings: StoreSettings,
    codec: PayloadCodec,
}

impl FileStore {
    pub fn new(dir: impl AsRef<Path>, settings: StoreSettings) -> Self {
        let path = dir.as_ref().join(format!("{}.cache", file_stem(&settings.key)));
        Self {
            path,
            codec: PayloadCodec::new(settings.compress),
            settings,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write `payload` to a uniquely named sibling of the entry file.
    async fn write_temp(&self, payload: &[u8]) -> std::io::Result<PathBuf> {
        let mut name = self.path.as_os_str().to_owned();
        name.push(format!(".{:016x}.tmp", rand::random::<u64>()));
        let tmp = PathBuf::from(name);
        if let Err(e) = tokio::fs::write(&tmp, payload).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e);
        }
        Ok(tmp)
    }

    async fn ensure_dir(&self) -> std::io::Result<()> {
        match self.path.parent() {
            Some(dir) => tokio::fs::create_dir_all(dir).await,
            None => Ok(()),
        }
    }
}

/// Map an identity key onto a safe file name.
fn file_stem(key: &str) -> String {
    key.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[async_trait]
impl CacheStore for FileStore {
    fn settings(&self) -> &StoreSettings {
        &self.settings
    }

    async fn create(&self, data: &Value) -> bool {
        let payload = match self.codec.encode(data) {
            Ok(p) => p,
            Err(e) => {
                warn!("File cache encode for {} failed: {e}", self.settings.key);
                return false;
            }
        };
        if let Err(e) = self.ensure_dir().await {
            warn!("Cannot create cache directory for {}: {e}", self.path.display());
            return false;
        }

        // hard_link fails on an existing entry and never exposes a partial file
        let tmp = match self.write_temp(&payload).await {
            Ok(tmp) => tmp,
            Err(e) => {
                warn!("File cache write {} failed: {e}", self.path.display());
                return false;
            }
        };
        let linked = tokio::fs::hard_link(&tmp, &self.path).await;
        let _ = tokio::fs::remove_file(&tmp).await;
        match linked {
            Ok(()) => true,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                debug!("File cache entry {} already exists", self.path.display());
                false
            }
            Err(e) => {
                warn!("File cache create {} failed: {e}", self.path.display());
                false
            }
        }
    }

    async fn read(&self) -> Option<Value> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(b) => b,
            Err(e) if e.kind() == ErrorKind::NotFound => return None,
            Err(e) => {
                warn!("File cache read {} failed: {e}", self.path.display());
                return None;
            }
        };
        match self.codec.decode(&bytes) {
            Some(v) => Some(v),
            None => {
                warn!("Discarding corrupt cache file {}", self.path.display());
                self.delete().await;
                None
            }
        }
    }

    async fn update(&self, data: &Value) -> bool {
        let payload = match self.codec.encode(data) {
            Ok(p) => p,
            Err(e) => {
                warn!("File cache encode for {} failed: {e}", self.settings.key);
                return false;
            }
        };
        if self.ensure_dir().await.is_err() {
            return false;
        }
        let tmp = match self.write_temp(&payload).await {
            Ok(tmp) => tmp,
            Err(e) => {
                warn!("File cache update {} failed: {e}", self.path.display());
                return false;
            }
        };
        match tokio::fs::rename(&tmp, &self.path).await {
            Ok(()) => true,
            Err(e) => {
                warn!("File cache update {} failed: {e}", self.path.display());
                let _ = tokio::fs::remove_file(&tmp).await;
                false
            }
        }
    }

    async fn delete(&self) -> bool {
        tokio::fs::remove_file(&self.path).await.is_ok()
    }

    async fn is_expired(&self) -> bool {
        has_expired(self.timestamp().await, self.settings.expires)
    }

    async fn timestamp(&self) -> Option<DateTime<Utc>> {
        let meta = tokio::fs::metadata(&self.path).await.ok()?;
        meta.modified().ok().map(DateTime::<Utc>::from)
    }

    async fn reset(&self) -> bool {
        let path = self.path.clone();
        let touched = tokio::task::spawn_blocking(move || {
            std::fs::OpenOptions::new()
                .write(true)
                .open(&path)
                .and_then(|f| f.set_modified(SystemTime::now()))
        })
        .await;
        matches!(touched, Ok(Ok(())))
    }
}
