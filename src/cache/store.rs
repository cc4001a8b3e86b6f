//! Per-key file storage with an in-memory hot layer

use super::keys::CacheKey;
use super::CacheError;
use moka::future::Cache;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

/// On-disk encoding of cache entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheFormat {
    /// Portable, human-inspectable JSON
    #[default]
    Json,
    /// Compact bincode; not meant to be read by other tools
    Bincode,
}

impl CacheFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Bincode => "bin",
        }
    }

    pub fn encode<V: Serialize>(&self, value: &V) -> Result<Vec<u8>, CacheError> {
        match self {
            Self::Json => Ok(serde_json::to_vec(value)?),
            Self::Bincode => Ok(bincode::serialize(value)?),
        }
    }

    pub fn decode<V: DeserializeOwned>(&self, bytes: &[u8]) -> Result<V, CacheError> {
        match self {
            Self::Json => Ok(serde_json::from_slice(bytes)?),
            Self::Bincode => Ok(bincode::deserialize(bytes)?),
        }
    }
}

impl FromStr for CacheFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "bincode" | "bin" | "binary" => Ok(Self::Bincode),
            other => Err(format!("unknown cache format '{}'", other)),
        }
    }
}

/// Durable `key -> value` storage. Each key is one file `<dir>/<key>.<ext>`.
///
/// Entries are mirrored into an unbounded moka cache once loaded and never
/// expire on their own.
#[derive(Clone)]
pub struct CacheStore<V> {
    dir: PathBuf,
    format: CacheFormat,
    memory: Cache<CacheKey, V>,
}

impl<V> CacheStore<V>
where
    V: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    pub fn new(dir: impl Into<PathBuf>, format: CacheFormat) -> Self {
        Self {
            dir: dir.into(),
            format,
            memory: Cache::builder().build(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn format(&self) -> CacheFormat {
        self.format
    }

    pub fn path_for(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(format!("{}.{}", key, self.format.extension()))
    }

    /// True if the key is in memory or has a file on disk. The file is not read.
    pub async fn contains(&self, key: &CacheKey) -> bool {
        if self.memory.contains_key(key) {
            return true;
        }
        tokio::fs::try_exists(self.path_for(key))
            .await
            .unwrap_or(false)
    }

    /// Fetch a value, loading it from disk into memory on first access.
    ///
    /// A file that exists but cannot be decoded is an error, not a miss.
    pub async fn get(&self, key: &CacheKey) -> Result<Option<V>, CacheError> {
        if let Some(value) = self.memory.get(key).await {
            return Ok(Some(value));
        }

        let path = self.path_for(key);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(CacheError::Io { path, source }),
        };

        let value: V = self.format.decode(&bytes)?;
        debug!("Loaded cache entry from {:?}", path);
        self.memory.insert(key.clone(), value.clone()).await;
        Ok(Some(value))
    }

    /// Store a value in memory and on disk
    pub async fn set(&self, key: CacheKey, value: V) -> Result<(), CacheError> {
        self.set_in_memory(key.clone(), value).await;
        self.persist(&key).await
    }

    /// Store a value in memory only; see [`Self::persist`]
    pub async fn set_in_memory(&self, key: CacheKey, value: V) {
        self.memory.insert(key, value).await;
    }

    /// Write the in-memory value for `key` to disk. No-op if it is not in memory.
    pub async fn persist(&self, key: &CacheKey) -> Result<(), CacheError> {
        match self.memory.get(key).await {
            Some(value) => self.write_file(key, &value).await,
            None => Ok(()),
        }
    }

    /// Remove a key from memory and disk. Missing entries are not an error.
    pub async fn delete(&self, key: &CacheKey) -> Result<(), CacheError> {
        self.memory.invalidate(key).await;
        let path = self.path_for(key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!("Deleted cache file {:?}", path);
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(CacheError::Io { path, source }),
        }
    }

    async fn write_file(&self, key: &CacheKey, value: &V) -> Result<(), CacheError> {
        let bytes = self.format.encode(value)?;
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| CacheError::Io {
                path: self.dir.clone(),
                source,
            })?;
        let path = self.path_for(key);
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|source| CacheError::Io { path, source })
    }

    /// Blocking write used where no runtime is available (drop-time flush)
    pub(crate) fn write_file_blocking(&self, key: &CacheKey, value: &V) -> Result<(), CacheError> {
        let bytes = self.format.encode(value)?;
        std::fs::create_dir_all(&self.dir).map_err(|source| CacheError::Io {
            path: self.dir.clone(),
            source,
        })?;
        let path = self.path_for(key);
        std::fs::write(&path, bytes).map_err(|source| CacheError::Io { path, source })
    }
}
