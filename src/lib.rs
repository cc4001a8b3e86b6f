pub mod cache;
pub mod config;
pub mod geocode;
pub mod state;
pub mod validation;

#[cfg(test)]
pub mod tests;

// Re-export specific items for convenience
pub use cache::{CacheError, CacheFormat, CacheKey, CacheStore, CallArgs, Memoizer, WriteSchedule};
pub use config::Config;
pub use geocode::{
    AddressQuery, GeocodeCandidate, GeocodeClient, GeocodeError, RateLimiter, ResolvedGeocode,
    Resolver,
};
pub use state::AppState;
