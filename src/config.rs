// Geocoder configuration:
// - Mapbox access token and request rate (KEY=VALUE file, created blank if missing)
// - Endpoint URL and request timeout
// - Cache directories, encoding and write schedule
// - Default request options

use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{info, warn};

use crate::cache::{CacheFormat, WriteSchedule};
use crate::geocode::error::GeocodeError;

pub const DEFAULT_CONFIG_FILE: &str = "mapbox_config.env";
pub const DEFAULT_GEOCODE_URL: &str = "https://api.mapbox.com/search/geocode/v6/forward";

const BLANK_TEMPLATE: &str = "MAPBOX_ACCESS_TOKEN=\nMAPBOX_RATE_LIMIT_PER_MINUTE=1000\n";

#[derive(Debug, Clone)]
pub struct Config {
    pub access_token: Option<String>,
    pub rate_limit_per_minute: f64,
    pub geocode_url: String,
    pub geocode_cache_dir: PathBuf,
    pub selection_cache_dir: PathBuf,
    pub cache_format: CacheFormat,
    pub cache_schedule: WriteSchedule,
    pub request_timeout: Duration,
    pub worldview: String,
    pub limit: u32,
    pub types: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl Config {
    /// Read configuration from a KEY=VALUE file, writing a blank template first
    /// if it does not exist. Environment variables take precedence over the file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, GeocodeError> {
        let path = path.as_ref();
        if path.exists() {
            info!("Loaded geocoder configuration file: {:?}", path);
        } else {
            std::fs::write(path, BLANK_TEMPLATE).map_err(|e| {
                GeocodeError::Config(format!("cannot create {:?}: {}", path, e))
            })?;
            info!("Created blank geocoder configuration file: {:?}", path);
        }

        let mut values = HashMap::new();
        let entries = dotenv::from_path_iter(path)
            .map_err(|e| GeocodeError::Config(format!("cannot read {:?}: {}", path, e)))?;
        for entry in entries {
            let (key, value) = entry
                .map_err(|e| GeocodeError::Config(format!("cannot parse {:?}: {}", path, e)))?;
            values.insert(key, value);
        }

        Ok(Self::from_lookup(|key| {
            env::var(key).ok().or_else(|| values.get(key).cloned())
        }))
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let access_token = lookup("MAPBOX_ACCESS_TOKEN")
            .map(|token| token.trim().to_string())
            .filter(|token| !token.is_empty());
        let rate_limit_per_minute = lookup("MAPBOX_RATE_LIMIT_PER_MINUTE")
            .map(|v| v.trim().parse().unwrap_or(1000.0))
            .unwrap_or(1000.0);
        let geocode_url =
            lookup("MAPBOX_GEOCODE_URL").unwrap_or_else(|| DEFAULT_GEOCODE_URL.to_string());
        let geocode_cache_dir = lookup("GEOCODE_CACHE_DIR")
            .unwrap_or_else(|| "./mapbox_geocode_cache".to_string())
            .into();
        let selection_cache_dir = lookup("SELECTION_CACHE_DIR")
            .unwrap_or_else(|| "./manual_address_selections_cache".to_string())
            .into();
        let cache_format = match lookup("CACHE_FORMAT") {
            Some(v) => v.parse().unwrap_or_else(|e| {
                warn!("{}; using json", e);
                CacheFormat::Json
            }),
            None => CacheFormat::Json,
        };
        let cache_schedule = match lookup("CACHE_SCHEDULE") {
            Some(v) => v.parse().unwrap_or_else(|e| {
                warn!("{}; using immediate writes", e);
                WriteSchedule::Immediate
            }),
            None => WriteSchedule::Immediate,
        };
        let request_timeout = lookup("REQUEST_TIMEOUT_SECS")
            .map(|v| v.trim().parse().unwrap_or(30))
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(30));
        let worldview = lookup("GEOCODE_WORLDVIEW").unwrap_or_else(|| "us".to_string());
        let limit = lookup("GEOCODE_LIMIT")
            .map(|v| v.trim().parse().unwrap_or(5))
            .unwrap_or(5);
        let types = lookup("GEOCODE_TYPES").unwrap_or_else(|| "address".to_string());

        Self {
            access_token,
            rate_limit_per_minute,
            geocode_url,
            geocode_cache_dir,
            selection_cache_dir,
            cache_format,
            cache_schedule,
            request_timeout,
            worldview,
            limit,
            types,
        }
    }
}
