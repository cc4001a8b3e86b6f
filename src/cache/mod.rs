pub mod keys;
pub mod memo;
pub mod store;

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

pub use keys::{default_hasher, derive_key, filtered_hasher, CacheKey, CallArgs, KeyHasher};
pub use memo::{Memoizer, WriteSchedule};
pub use store::{CacheFormat, CacheStore};

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cache I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cache JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Cache bincode error: {0}")]
    Binary(#[from] bincode::Error),
}

/// Anything that can be stored by a [`Memoizer`]
pub trait CacheValue: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

impl<T> CacheValue for T where T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}
