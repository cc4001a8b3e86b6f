//! Cache key derivation

use sha2::{Digest, Sha512};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Hex-encoded SHA-512 fingerprint of a call's arguments.
///
/// Always 128 lowercase hex characters, which keeps it safe to use as a file name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Arguments of a memoized call, reduced to their canonical string forms.
///
/// Named arguments live in a `BTreeMap`, so the order they were supplied in
/// never reaches the hasher.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallArgs {
    positional: Vec<String>,
    named: BTreeMap<String, String>,
}

impl CallArgs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a positional argument
    pub fn arg(mut self, value: impl ToString) -> Self {
        self.positional.push(value.to_string());
        self
    }

    /// Set a named argument, replacing any previous value under that name
    pub fn named(mut self, name: &str, value: impl ToString) -> Self {
        self.named.insert(name.to_string(), value.to_string());
        self
    }

    /// Set a named argument that may be absent. Absent values are still hashed
    /// (as `None`) so that "unset" and "missing from the call" stay equivalent.
    pub fn named_opt<T: ToString>(self, name: &str, value: Option<T>) -> Self {
        match value {
            Some(value) => self.named(name, value),
            None => self.named(name, "None"),
        }
    }

    pub fn positional(&self) -> &[String] {
        &self.positional
    }

    pub fn named_args(&self) -> impl Iterator<Item = (&str, &str)> {
        self.named.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Copy of these arguments with only the named entries listed in `names`
    pub fn retain_named(&self, names: &[&str]) -> Self {
        Self {
            positional: self.positional.clone(),
            named: self
                .named
                .iter()
                .filter(|(k, _)| names.contains(&k.as_str()))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }
}

/// Pluggable key derivation used by [`super::Memoizer`]
pub type KeyHasher = Arc<dyn Fn(&CallArgs) -> CacheKey + Send + Sync>;

/// Hash a sequence of text parts. Every part is length-prefixed so that
/// `["ab", "c"]` and `["a", "bc"]` produce different digests.
fn digest_parts<I, S>(parts: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut hasher = Sha512::new();
    for part in parts {
        let bytes = part.as_ref().as_bytes();
        hasher.update((bytes.len() as u64).to_le_bytes());
        hasher.update(bytes);
    }
    hex::encode(hasher.finalize())
}

/// Default key derivation.
///
/// Positional and named arguments are digested separately, then the two
/// digests are hashed together.
pub fn derive_key(args: &CallArgs) -> CacheKey {
    let positional = digest_parts(&args.positional);
    let named = digest_parts(
        args.named
            .iter()
            .flat_map(|(name, value)| [name.as_str(), value.as_str()]),
    );
    CacheKey(digest_parts([positional, named]))
}

/// The default hasher as a [`KeyHasher`]
pub fn default_hasher() -> KeyHasher {
    Arc::new(derive_key)
}

/// Hasher that ignores every named argument not listed in `names`.
///
/// Used when a call carries arguments (credentials, tuning knobs) that must
/// not split the cache.
pub fn filtered_hasher(names: &'static [&'static str]) -> KeyHasher {
    Arc::new(move |args: &CallArgs| derive_key(&args.retain_named(names)))
}
