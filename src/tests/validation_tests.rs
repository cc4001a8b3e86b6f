//! tests/validation_tests.rs - Address normalization and configuration loading

#[cfg(test)]
mod tests {
    use crate::cache::{CacheFormat, WriteSchedule};
    use crate::config::Config;
    use crate::geocode::{AddressQuery, StructuredAddress};
    use crate::validation::{normalize_postcode, validate_address, validate_bbox};
    use tempfile::TempDir;

    #[test]
    fn test_postcode_normalization() {
        assert_eq!(normalize_postcode("30301-0000"), "30301");
        assert_eq!(normalize_postcode("30301 1234"), "30301-1234");
        assert_eq!(normalize_postcode("30301 0000"), "30301");
        assert_eq!(normalize_postcode("30301"), "30301");
        assert_eq!(normalize_postcode("30301-1000"), "30301-1000");
        assert_eq!(normalize_postcode(" 30301 "), "30301");
    }

    #[test]
    fn test_structured_normalization_only_touches_postcode() {
        let address = StructuredAddress {
            street: Some("Main St".to_string()),
            postcode: Some("30301-0000".to_string()),
            ..StructuredAddress::default()
        };
        let normalized = address.normalized();
        assert_eq!(normalized.postcode.as_deref(), Some("30301"));
        assert_eq!(normalized.street, address.street);
    }

    #[test]
    fn test_parse_input_lines() {
        assert_eq!(AddressQuery::parse_line("   "), None);
        assert_eq!(
            AddressQuery::parse_line("55 Trinity Ave SW, Atlanta"),
            Some(AddressQuery::free_text("55 Trinity Ave SW, Atlanta"))
        );
        assert_eq!(
            AddressQuery::parse_line("\"55 Trinity Ave SW\""),
            Some(AddressQuery::free_text("55 Trinity Ave SW"))
        );
        match AddressQuery::parse_line(r#"{"street": "Trinity Ave SW", "postcode": "30303"}"#) {
            Some(AddressQuery::Structured(address)) => {
                assert_eq!(address.street.as_deref(), Some("Trinity Ave SW"));
                assert_eq!(address.postcode.as_deref(), Some("30303"));
            }
            other => panic!("Expected a structured address, got {:?}", other),
        }
    }

    #[test]
    fn test_structured_display_is_sorted() {
        let address = AddressQuery::Structured(StructuredAddress {
            street: Some("Main St".to_string()),
            address_number: Some("1".to_string()),
            region: Some("".to_string()),
            ..StructuredAddress::default()
        });
        assert_eq!(address.to_string(), "address_number=1,street=Main St,");
    }

    #[test]
    fn test_validation() {
        assert!(validate_address(&AddressQuery::free_text("")).is_err());
        assert!(validate_address(&AddressQuery::Structured(StructuredAddress::default())).is_err());
        assert!(validate_address(&AddressQuery::free_text("1 Main St")).is_ok());
        assert!(validate_bbox((-85.6, 30.3, -80.8, 35.0)).is_ok());
        assert!(validate_bbox((-85.6, 30.3, -80.8, 95.0)).is_err());
    }

    #[test]
    fn test_missing_config_creates_blank_template() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("mapbox_config.env");

        let config = Config::load(&path).unwrap();
        assert!(path.exists(), "A blank template should be written");
        let template = std::fs::read_to_string(&path).unwrap();
        assert!(template.contains("MAPBOX_ACCESS_TOKEN="));
        assert!(template.contains("MAPBOX_RATE_LIMIT_PER_MINUTE=1000"));
        assert_eq!(config.rate_limit_per_minute, 1000.0);
    }

    #[test]
    fn test_config_file_values() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("geocoder.env");
        std::fs::write(
            &path,
            "GEOCODER_TEST_UNUSED=1\nGEOCODE_LIMIT=3\nGEOCODE_CACHE_DIR=/tmp/geo\n",
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.limit, 3);
        assert_eq!(config.geocode_cache_dir, std::path::PathBuf::from("/tmp/geo"));
        assert_eq!(config.cache_format, CacheFormat::Json);
        assert_eq!(config.cache_schedule, WriteSchedule::Immediate);
    }
}
