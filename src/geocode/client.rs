use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::cache::{filtered_hasher, CacheFormat, CacheStore, CallArgs, Memoizer, WriteSchedule};
use crate::config::Config;
use crate::geocode::error::GeocodeError;
use crate::geocode::models::{AddressQuery, FeatureCollection, GeocodeCandidate, StructuredAddress};
use crate::geocode::rate_limit::RateLimiter;
use crate::validation::{validate_address, validate_bbox};

/// Named call arguments that identify a geocoding response.
/// The access token is deliberately absent so every credential shares one cache.
pub const GEOCODE_KEY_FIELDS: &[&str] = &[
    "query",
    "autocomplete",
    "bbox",
    "country",
    "language",
    "limit",
    "proximity",
    "types",
    "worldview",
    "url",
    "address_number",
    "street",
    "block",
    "place",
    "region",
    "postcode",
    "locality",
    "neighborhood",
];

/// Source of raw candidates for an address
#[async_trait]
pub trait CandidateSource: Send + Sync {
    async fn fetch_candidates(
        &self,
        query: &AddressQuery,
    ) -> Result<Vec<GeocodeCandidate>, GeocodeError>;
}

/// Request options that apply to every query
#[derive(Debug, Clone, PartialEq)]
pub struct GeocodeOptions {
    pub autocomplete: bool,
    /// `(min_lon, min_lat, max_lon, max_lat)`
    pub bbox: Option<(f64, f64, f64, f64)>,
    pub country: Option<String>,
    pub language: Option<String>,
    pub limit: u32,
    pub proximity: Option<String>,
    pub types: Option<String>,
    pub worldview: Option<String>,
}

impl Default for GeocodeOptions {
    fn default() -> Self {
        Self {
            autocomplete: false,
            bbox: None,
            country: None,
            language: None,
            limit: 5,
            proximity: None,
            types: Some("address".to_string()),
            worldview: Some("us".to_string()),
        }
    }
}

impl GeocodeOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            limit: config.limit,
            types: Some(config.types.clone()).filter(|t| !t.is_empty()),
            worldview: Some(config.worldview.clone()).filter(|w| !w.is_empty()),
            ..Self::default()
        }
    }
}

/// Mapbox forward geocoding client with a file-backed response cache
pub struct GeocodeClient {
    http: reqwest::Client,
    url: String,
    access_token: Option<String>,
    options: GeocodeOptions,
    limiter: Arc<RateLimiter>,
    cache: Arc<Memoizer<FeatureCollection>>,
}

impl GeocodeClient {
    pub fn new(
        config: &Config,
        limiter: Arc<RateLimiter>,
        cache: Arc<Memoizer<FeatureCollection>>,
    ) -> Result<Self, GeocodeError> {
        info!(
            "Initializing geocode client with endpoint: {}, pacing: {:?}",
            config.geocode_url,
            limiter.delay()
        );
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            http,
            url: config.geocode_url.clone(),
            access_token: config.access_token.clone(),
            options: GeocodeOptions::from_config(config),
            limiter,
            cache,
        })
    }

    /// Response cache keyed on [`GEOCODE_KEY_FIELDS`]
    pub fn response_cache(
        dir: impl Into<PathBuf>,
        format: CacheFormat,
        schedule: WriteSchedule,
    ) -> Memoizer<FeatureCollection> {
        Memoizer::new("geocode", CacheStore::new(dir, format), schedule)
            .with_hasher(filtered_hasher(GEOCODE_KEY_FIELDS))
    }

    pub fn with_options(mut self, options: GeocodeOptions) -> Result<Self, GeocodeError> {
        if let Some(bbox) = options.bbox {
            validate_bbox(bbox)?;
        }
        self.options = options;
        Ok(self)
    }

    pub fn options(&self) -> &GeocodeOptions {
        &self.options
    }

    pub fn cache(&self) -> &Arc<Memoizer<FeatureCollection>> {
        &self.cache
    }

    /// Geocode an address, serving repeated queries from the cache.
    ///
    /// Postal codes are normalized first. A cache hit needs no access token.
    pub async fn geocode(&self, query: &AddressQuery) -> Result<FeatureCollection, GeocodeError> {
        let query = query.normalized();
        validate_address(&query)?;
        let args = self.call_args(&query);
        self.cache.call(&args, || self.fetch(&query)).await
    }

    /// [`Self::geocode`] with exponential backoff on rate limiting, server errors and timeouts
    pub async fn geocode_with_retry(
        &self,
        query: &AddressQuery,
    ) -> Result<FeatureCollection, GeocodeError> {
        (|| self.geocode(query))
            .retry(ExponentialBuilder::default().with_max_times(3))
            .when(GeocodeError::is_retryable)
            .notify(|e: &GeocodeError, delay: Duration| {
                warn!("Geocoding failed ({}), retrying in {:?}", e, delay);
            })
            .await
    }

    /// Forget the cached response for an address
    pub async fn invalidate(&self, query: &AddressQuery) -> Result<(), GeocodeError> {
        let args = self.call_args(&query.normalized());
        self.cache.invalidate(&args).await?;
        Ok(())
    }

    /// Arguments of the memoized call. Includes the token; the cache hasher drops it.
    pub fn call_args(&self, query: &AddressQuery) -> CallArgs {
        let options = &self.options;
        let mut args = CallArgs::new().named_opt("access_token", self.access_token.as_deref());

        let mut country = options.country.clone();
        match query {
            AddressQuery::FreeText(text) => {
                args = args.named("query", text);
                for field in StructuredAddress::FIELDS.iter().filter(|f| **f != "country") {
                    args = args.named_opt::<&str>(field, None);
                }
            }
            AddressQuery::Structured(address) => {
                args = args.named_opt::<&str>("query", None);
                let fields = address.fields();
                for field in StructuredAddress::FIELDS.iter().filter(|f| **f != "country") {
                    let value = fields.iter().find(|(name, _)| name == field).map(|(_, v)| *v);
                    args = args.named_opt(field, value);
                }
                if let Some((_, value)) = fields.iter().find(|(name, _)| *name == "country") {
                    country = Some(value.to_string());
                }
            }
        }

        args.named("autocomplete", options.autocomplete)
            .named_opt("bbox", options.bbox.map(format_bbox))
            .named_opt("country", country)
            .named_opt("language", options.language.as_deref())
            .named("limit", options.limit)
            .named_opt("proximity", options.proximity.as_deref())
            .named_opt("types", options.types.as_deref())
            .named_opt("worldview", options.worldview.as_deref())
            .named("url", &self.url)
    }

    /// HTTP query parameters for one request.
    ///
    /// Free text goes out as `q`; structured addresses send only their set fields.
    pub fn request_params(&self, query: &AddressQuery, access_token: &str) -> Vec<(&'static str, String)> {
        let options = &self.options;
        let mut params = vec![
            ("access_token", access_token.to_string()),
            ("permanent", "true".to_string()),
            ("format", "geojson".to_string()),
        ];
        if let Some(types) = &options.types {
            params.push(("types", types.clone()));
        }

        let mut country = options.country.clone();
        match query {
            AddressQuery::FreeText(text) => params.push(("q", text.clone())),
            AddressQuery::Structured(address) => {
                for (name, value) in address.fields() {
                    if name == "country" {
                        country = Some(value.to_string());
                    } else {
                        params.push((name, value.to_string()));
                    }
                }
            }
        }

        params.push(("autocomplete", options.autocomplete.to_string()));
        if let Some(bbox) = options.bbox {
            params.push(("bbox", format_bbox(bbox)));
        }
        if let Some(country) = country {
            params.push(("country", country));
        }
        if let Some(language) = &options.language {
            params.push(("language", language.clone()));
        }
        params.push(("limit", options.limit.to_string()));
        if let Some(proximity) = &options.proximity {
            params.push(("proximity", proximity.clone()));
        }
        if let Some(worldview) = &options.worldview {
            params.push(("worldview", worldview.clone()));
        }
        params
    }

    async fn fetch(&self, query: &AddressQuery) -> Result<FeatureCollection, GeocodeError> {
        let access_token = self.access_token.as_deref().ok_or_else(|| {
            GeocodeError::Authentication(
                "no access token configured for the Mapbox geocoding API".to_string(),
            )
        })?;

        self.limiter.await_turn().await;

        debug!("Requesting geocode for {}", query);
        let response = self
            .http
            .get(&self.url)
            .query(&self.request_params(query, access_token))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(match status.as_u16() {
                401 | 403 => GeocodeError::Authentication(body),
                code => GeocodeError::Request { status: code, body },
            });
        }

        let collection: FeatureCollection = response.json().await?;
        debug!("Geocoder returned {} features for {}", collection.features.len(), query);
        Ok(collection)
    }
}

#[async_trait]
impl CandidateSource for GeocodeClient {
    async fn fetch_candidates(
        &self,
        query: &AddressQuery,
    ) -> Result<Vec<GeocodeCandidate>, GeocodeError> {
        Ok(self.geocode_with_retry(query).await?.features)
    }
}

fn format_bbox((min_lon, min_lat, max_lon, max_lat): (f64, f64, f64, f64)) -> String {
    format!("{},{},{},{}", min_lon, min_lat, max_lon, max_lat)
}
