use std::sync::Arc;
use tracing::info;

use crate::cache::{CacheError, Memoizer};
use crate::config::Config;
use crate::geocode::{
    FeatureCollection, GeocodeCandidate, GeocodeClient, GeocodeError, RateLimiter, Resolver,
    SelectionPrompt,
};

/// Long-lived handles shared by every geocoding call in a run
pub struct AppState {
    pub config: Config,
    pub limiter: Arc<RateLimiter>,
    pub geocode_cache: Arc<Memoizer<FeatureCollection>>,
    pub selection_cache: Arc<Memoizer<GeocodeCandidate>>,
    pub client: Arc<GeocodeClient>,
    pub resolver: Resolver,
}

impl AppState {
    pub fn init(config: Config, prompt: Arc<dyn SelectionPrompt>) -> Result<Self, GeocodeError> {
        let limiter = Arc::new(RateLimiter::per_minute(config.rate_limit_per_minute));
        let geocode_cache = Arc::new(GeocodeClient::response_cache(
            &config.geocode_cache_dir,
            config.cache_format,
            config.cache_schedule,
        ));
        let selection_cache = Arc::new(Resolver::selection_cache(
            &config.selection_cache_dir,
            config.cache_format,
            config.cache_schedule,
        ));
        info!(
            "Caches initialized at {:?} and {:?} ({:?}, {:?})",
            config.geocode_cache_dir,
            config.selection_cache_dir,
            config.cache_format,
            config.cache_schedule
        );

        let client = Arc::new(GeocodeClient::new(
            &config,
            limiter.clone(),
            geocode_cache.clone(),
        )?);
        let resolver = Resolver::new(client.clone(), selection_cache.clone(), prompt);

        Ok(Self {
            config,
            limiter,
            geocode_cache,
            selection_cache,
            client,
            resolver,
        })
    }

    /// Persist every deferred cache write. Safe to call more than once.
    pub async fn shutdown(&self) -> Result<(), CacheError> {
        self.geocode_cache.flush().await?;
        self.selection_cache.flush().await?;
        Ok(())
    }
}
