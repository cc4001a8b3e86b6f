use thiserror::Error;

use crate::geocode::models::AddressQuery;

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Address is empty")]
    EmptyAddress,

    #[error("Invalid bounding box: {0}")]
    InvalidBoundingBox(String),
}

/// Normalize a postal code for the geocoder's matching rules.
///
/// Internal spaces become hyphens and an all-zero `-0000` extension is dropped:
/// `"30301 1234"` becomes `"30301-1234"`, `"30301-0000"` becomes `"30301"`.
pub fn normalize_postcode(postcode: &str) -> String {
    let postcode = postcode.trim().replace(' ', "-");
    match postcode.strip_suffix("-0000") {
        Some(base) if !base.is_empty() => base.to_string(),
        _ => postcode,
    }
}

pub fn validate_address(address: &AddressQuery) -> Result<(), ValidationError> {
    if address.is_empty() {
        return Err(ValidationError::EmptyAddress);
    }
    Ok(())
}

/// `(min_lon, min_lat, max_lon, max_lat)`
pub fn validate_bbox(bbox: (f64, f64, f64, f64)) -> Result<(), ValidationError> {
    let (min_lon, min_lat, max_lon, max_lat) = bbox;
    let lon_ok = (-180.0..=180.0).contains(&min_lon) && (-180.0..=180.0).contains(&max_lon);
    let lat_ok = (-90.0..=90.0).contains(&min_lat) && (-90.0..=90.0).contains(&max_lat);
    if !lon_ok || !lat_ok || min_lon > max_lon || min_lat > max_lat {
        return Err(ValidationError::InvalidBoundingBox(format!(
            "{},{},{},{}",
            min_lon, min_lat, max_lon, max_lat
        )));
    }
    Ok(())
}
