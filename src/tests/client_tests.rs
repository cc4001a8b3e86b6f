//! tests/client_tests.rs - Request building, caching and HTTP error mapping for the geocode client

#[cfg(test)]
mod tests {
    use crate::cache::{CacheFormat, WriteSchedule};
    use crate::config::Config;
    use crate::geocode::models::{CandidateProperties, Confidence, Geometry, MatchStatus};
    use crate::geocode::{
        AddressQuery, FeatureCollection, GeocodeCandidate, GeocodeClient, GeocodeError,
        GeocodeOptions, RateLimiter, StructuredAddress,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    const FEATURES_JSON: &str = r#"{
        "type": "FeatureCollection",
        "features": [{
            "type": "Feature",
            "geometry": {"type": "Point", "coordinates": [-84.3902, 33.7488]},
            "properties": {
                "mapbox_id": "dXJuOm1ieGFkcjo",
                "feature_type": "address",
                "full_address": "55 Trinity Ave SW, Atlanta, Georgia 30303, United States",
                "match_code": {
                    "address_number": "matched",
                    "street": "matched",
                    "postcode": "matched",
                    "place": "matched",
                    "region": "matched",
                    "locality": "not_applicable",
                    "country": "inferred",
                    "confidence": "exact"
                }
            }
        }]
    }"#;

    /// Serve `body` with `status` to every connection, counting requests
    async fn serve(status: u16, body: &'static str) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/search/geocode/v6/forward", listener.local_addr().unwrap());
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();

        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    break;
                };
                counter.fetch_add(1, Ordering::SeqCst);
                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => request.extend_from_slice(&buf[..n]),
                    }
                }
                let response = format!(
                    "HTTP/1.1 {} X\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });

        (url, hits)
    }

    fn config(dir: &TempDir, url: &str, token: Option<&str>) -> Config {
        Config {
            access_token: token.map(str::to_string),
            geocode_url: url.to_string(),
            geocode_cache_dir: dir.path().join("geocode"),
            selection_cache_dir: dir.path().join("selections"),
            ..Config::default()
        }
    }

    fn client(config: &Config) -> GeocodeClient {
        let cache = GeocodeClient::response_cache(
            &config.geocode_cache_dir,
            CacheFormat::Json,
            WriteSchedule::Immediate,
        );
        GeocodeClient::new(config, Arc::new(RateLimiter::unlimited()), Arc::new(cache)).unwrap()
    }

    fn structured() -> AddressQuery {
        AddressQuery::Structured(StructuredAddress {
            address_number: Some("55".to_string()),
            street: Some("Trinity Ave SW".to_string()),
            place: Some("Atlanta".to_string()),
            region: Some("GA".to_string()),
            postcode: Some("30303 0000".to_string()),
            ..StructuredAddress::default()
        })
    }

    #[test]
    fn test_free_text_params() {
        let dir = TempDir::new().unwrap();
        let client = client(&config(&dir, "http://localhost/forward", Some("pk.test")));
        let params = client.request_params(&AddressQuery::free_text("55 Trinity Ave SW"), "pk.test");
        let get = |name: &str| params.iter().find(|(k, _)| *k == name).map(|(_, v)| v.as_str());

        assert_eq!(get("q"), Some("55 Trinity Ave SW"));
        assert_eq!(get("access_token"), Some("pk.test"));
        assert_eq!(get("permanent"), Some("true"));
        assert_eq!(get("format"), Some("geojson"));
        assert_eq!(get("types"), Some("address"));
        assert_eq!(get("limit"), Some("5"));
        assert_eq!(get("worldview"), Some("us"));
        assert_eq!(get("street"), None, "Free text never carries structured fields");
        assert_eq!(get("bbox"), None, "Unset options are omitted");
    }

    #[test]
    fn test_structured_params() {
        let dir = TempDir::new().unwrap();
        let client = client(&config(&dir, "http://localhost/forward", Some("pk.test")))
            .with_options(GeocodeOptions {
                bbox: Some((-85.6, 30.3, -80.8, 35.0)),
                ..GeocodeOptions::default()
            })
            .unwrap();
        let query = AddressQuery::Structured(StructuredAddress {
            street: Some("Trinity Ave SW".to_string()),
            block: Some("   ".to_string()),
            country: Some("us".to_string()),
            ..StructuredAddress::default()
        });
        let params = client.request_params(&query, "pk.test");
        let get = |name: &str| params.iter().find(|(k, _)| *k == name).map(|(_, v)| v.as_str());

        assert_eq!(get("street"), Some("Trinity Ave SW"));
        assert_eq!(get("country"), Some("us"));
        assert_eq!(get("bbox"), Some("-85.6,30.3,-80.8,35"));
        assert_eq!(get("q"), None, "Structured requests never carry free text");
        assert_eq!(get("block"), None, "Blank fields are not sent");
        assert_eq!(get("postcode"), None);
    }

    #[test]
    fn test_invalid_bbox_rejected() {
        let dir = TempDir::new().unwrap();
        let result = client(&config(&dir, "http://localhost/forward", None)).with_options(GeocodeOptions {
            bbox: Some((10.0, 0.0, -10.0, 5.0)),
            ..GeocodeOptions::default()
        });
        assert!(matches!(result, Err(GeocodeError::InvalidAddress(_))));
    }

    #[test]
    fn test_cache_key_ignores_access_token() {
        let dir = TempDir::new().unwrap();
        let one = client(&config(&dir, "http://localhost/forward", Some("pk.one")));
        let two = client(&config(&dir, "http://localhost/forward", Some("pk.two")));
        let elsewhere = client(&config(&dir, "http://localhost/other", Some("pk.one")));
        let query = AddressQuery::free_text("55 Trinity Ave SW");

        let key = |c: &GeocodeClient| c.cache().key_for(&c.call_args(&query));
        assert_eq!(key(&one), key(&two));
        assert_ne!(key(&one), key(&elsewhere), "The endpoint is part of the key");
    }

    #[tokio::test]
    async fn test_missing_token_is_authentication_error() {
        let dir = TempDir::new().unwrap();
        let client = client(&config(&dir, "http://127.0.0.1:9/forward", None));

        let result = client.geocode(&AddressQuery::free_text("55 Trinity Ave SW")).await;
        assert!(matches!(result, Err(GeocodeError::Authentication(_))));
        assert_eq!(client.cache().pending_writes(), 0);
    }

    #[tokio::test]
    async fn test_cache_hit_needs_no_token() {
        let dir = TempDir::new().unwrap();
        let client = client(&config(&dir, "http://127.0.0.1:9/forward", None));
        let cached = FeatureCollection {
            features: vec![GeocodeCandidate {
                geometry: Geometry {
                    coordinates: [-84.39, 33.75],
                },
                properties: CandidateProperties::default(),
            }],
        };
        // Stored under the normalized postcode; the query still has the spurious extension
        let normalized = structured().normalized();
        let key = client.cache().key_for(&client.call_args(&normalized));
        client.cache().store().set(key, cached.clone()).await.unwrap();

        assert_eq!(client.geocode(&structured()).await.unwrap(), cached);
    }

    #[tokio::test]
    async fn test_empty_address_rejected() {
        let dir = TempDir::new().unwrap();
        let client = client(&config(&dir, "http://127.0.0.1:9/forward", Some("pk.test")));

        let result = client.geocode(&AddressQuery::free_text("   ")).await;
        assert!(matches!(result, Err(GeocodeError::InvalidAddress(_))));
    }

    #[tokio::test]
    async fn test_response_is_parsed_and_cached() {
        let dir = TempDir::new().unwrap();
        let (url, hits) = serve(200, FEATURES_JSON).await;
        let client = client(&config(&dir, &url, Some("pk.test")));

        let first = client.geocode(&structured()).await.unwrap();
        assert_eq!(first.features.len(), 1);
        let feature = &first.features[0];
        assert_eq!(feature.longitude(), -84.3902);
        assert_eq!(feature.latitude(), 33.7488);
        assert_eq!(
            feature.properties.match_code.as_ref().unwrap().matched_fields(),
            vec!["address_number", "place", "postcode", "region", "street"]
        );

        let second = client.geocode(&structured()).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(hits.load(Ordering::SeqCst), 1, "Second lookup is served from cache");

        client.invalidate(&structured()).await.unwrap();
        client.geocode(&structured()).await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_error_status_is_request_error() {
        let dir = TempDir::new().unwrap();
        let (url, _) = serve(422, r#"{"message": "Invalid query"}"#).await;
        let client = client(&config(&dir, &url, Some("pk.test")));

        match client.geocode(&AddressQuery::free_text("55 Trinity Ave SW")).await {
            Err(e @ GeocodeError::Request { status: 422, .. }) => assert!(!e.is_retryable()),
            other => panic!("Expected a request error, got {:?}", other),
        }
        assert_eq!(client.cache().pending_writes(), 0);
    }

    #[tokio::test]
    async fn test_rejected_token_is_authentication_error() {
        let dir = TempDir::new().unwrap();
        let (url, _) = serve(401, r#"{"message": "Not Authorized - Invalid Token"}"#).await;
        let client = client(&config(&dir, &url, Some("pk.revoked")));

        let result = client.geocode(&AddressQuery::free_text("55 Trinity Ave SW")).await;
        assert!(matches!(result, Err(GeocodeError::Authentication(_))));
    }

    #[test]
    fn test_unknown_labels_do_not_break_decoding() {
        let body = FEATURES_JSON
            .replace(r#""confidence": "exact""#, r#""confidence": "approximate""#)
            .replace(r#""street": "matched""#, r#""street": "partially_matched""#);
        let parsed: FeatureCollection = serde_json::from_str(&body).unwrap();
        let feature = &parsed.features[0];

        assert_eq!(feature.confidence(), Some(Confidence::Unknown));
        assert!(Confidence::Unknown < Confidence::Low);
        assert_eq!(
            feature.properties.match_code.as_ref().unwrap().street,
            Some(MatchStatus::Unknown)
        );
        assert_eq!(feature.full_address(), "55 Trinity Ave SW, Atlanta, Georgia 30303, United States");
    }

    #[test]
    fn test_retryable_statuses() {
        let request = |status| GeocodeError::Request {
            status,
            body: String::new(),
        };
        assert!(request(429).is_retryable());
        assert!(request(503).is_retryable());
        assert!(!request(404).is_retryable());
        assert!(!GeocodeError::Authentication("missing".into()).is_retryable());
    }
}
