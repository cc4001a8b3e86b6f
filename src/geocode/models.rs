// Address queries, geocoder responses and resolved results

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::validation::normalize_postcode;

/// Structured address fields understood by the geocoder.
/// Unset fields are left out of requests entirely.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuredAddress {
    #[serde(default)]
    pub address_number: Option<String>,
    #[serde(default)]
    pub street: Option<String>,
    #[serde(default)]
    pub block: Option<String>,
    #[serde(default)]
    pub place: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub postcode: Option<String>,
    #[serde(default)]
    pub locality: Option<String>,
    #[serde(default)]
    pub neighborhood: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
}

impl StructuredAddress {
    pub const FIELDS: [&'static str; 9] = [
        "address_number",
        "street",
        "block",
        "place",
        "region",
        "postcode",
        "locality",
        "neighborhood",
        "country",
    ];

    /// `(name, value)` for every set, non-blank field, in [`Self::FIELDS`] order
    pub fn fields(&self) -> Vec<(&'static str, &str)> {
        let values = [
            &self.address_number,
            &self.street,
            &self.block,
            &self.place,
            &self.region,
            &self.postcode,
            &self.locality,
            &self.neighborhood,
            &self.country,
        ];
        Self::FIELDS
            .iter()
            .zip(values)
            .filter_map(|(name, value)| {
                value
                    .as_deref()
                    .map(str::trim)
                    .filter(|v| !v.is_empty())
                    .map(|v| (*name, v))
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.fields().is_empty()
    }

    /// Copy with the postcode normalized
    pub fn normalized(&self) -> Self {
        let mut address = self.clone();
        address.postcode = address.postcode.as_deref().map(normalize_postcode);
        address
    }
}

/// A single address to geocode
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum AddressQuery {
    FreeText(String),
    Structured(StructuredAddress),
}

impl AddressQuery {
    pub fn free_text(text: impl Into<String>) -> Self {
        Self::FreeText(text.into())
    }

    /// Parse one line of input: a JSON object is a structured address,
    /// anything else is free text.
    pub fn parse_line(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        if line.starts_with('{') {
            if let Ok(structured) = serde_json::from_str::<StructuredAddress>(line) {
                return Some(Self::Structured(structured));
            }
        }
        if let Ok(serde_json::Value::String(text)) = serde_json::from_str(line) {
            return Some(Self::FreeText(text));
        }
        Some(Self::FreeText(line.to_string()))
    }

    /// Copy with postal codes normalized; free text is untouched
    pub fn normalized(&self) -> Self {
        match self {
            Self::FreeText(text) => Self::FreeText(text.trim().to_string()),
            Self::Structured(address) => Self::Structured(address.normalized()),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::FreeText(text) => text.trim().is_empty(),
            Self::Structured(address) => address.is_empty(),
        }
    }
}

impl fmt::Display for AddressQuery {
    /// Free text as-is; structured fields as sorted `name=value,` pairs
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FreeText(text) => f.write_str(text),
            Self::Structured(address) => {
                let mut fields = address.fields();
                fields.sort_by_key(|(name, _)| *name);
                for (name, value) in fields {
                    write!(f, "{}={},", name, value)?;
                }
                Ok(())
            }
        }
    }
}

impl From<StructuredAddress> for AddressQuery {
    fn from(address: StructuredAddress) -> Self {
        Self::Structured(address)
    }
}

/// Confidence label the geocoder attaches to a candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low = 1,
    Medium = 2,
    High = 3,
    Exact = 4,
    /// A label this crate does not know; ranks below every known one.
    /// Declared last because `#[serde(other)]` requires it; the explicit
    /// discriminants keep the derived ordering.
    #[serde(other)]
    Unknown = 0,
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Unknown => "unknown",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Exact => "exact",
        };
        f.write_str(label)
    }
}

/// How one address component of the query matched a candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    Matched,
    Unmatched,
    NotApplicable,
    Inferred,
    Plausible,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchCode {
    #[serde(default)]
    pub confidence: Option<Confidence>,
    #[serde(default)]
    pub address_number: Option<MatchStatus>,
    #[serde(default)]
    pub street: Option<MatchStatus>,
    #[serde(default)]
    pub postcode: Option<MatchStatus>,
    #[serde(default)]
    pub place: Option<MatchStatus>,
    #[serde(default)]
    pub region: Option<MatchStatus>,
    #[serde(default)]
    pub locality: Option<MatchStatus>,
    #[serde(default)]
    pub country: Option<MatchStatus>,
}

impl MatchCode {
    /// Names of the components classified as matched, alphabetically
    pub fn matched_fields(&self) -> Vec<&'static str> {
        [
            ("address_number", self.address_number),
            ("country", self.country),
            ("locality", self.locality),
            ("place", self.place),
            ("postcode", self.postcode),
            ("region", self.region),
            ("street", self.street),
        ]
        .into_iter()
        .filter(|(_, status)| *status == Some(MatchStatus::Matched))
        .map(|(name, _)| name)
        .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Geometry {
    /// `[longitude, latitude]`
    pub coordinates: [f64; 2],
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CandidateProperties {
    #[serde(default)]
    pub mapbox_id: Option<String>,
    #[serde(default)]
    pub feature_type: Option<String>,
    #[serde(default)]
    pub full_address: Option<String>,
    #[serde(default)]
    pub match_code: Option<MatchCode>,
}

/// One feature of a forward geocoding response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeocodeCandidate {
    pub geometry: Geometry,
    #[serde(default)]
    pub properties: CandidateProperties,
}

impl GeocodeCandidate {
    pub fn longitude(&self) -> f64 {
        self.geometry.coordinates[0]
    }

    pub fn latitude(&self) -> f64 {
        self.geometry.coordinates[1]
    }

    pub fn confidence(&self) -> Option<Confidence> {
        self.properties.match_code.as_ref()?.confidence
    }

    pub fn postcode_match(&self) -> Option<MatchStatus> {
        self.properties.match_code.as_ref()?.postcode
    }

    pub fn full_address(&self) -> &str {
        self.properties.full_address.as_deref().unwrap_or("MISSING!")
    }
}

/// The GeoJSON feature collection returned by the geocoder
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureCollection {
    #[serde(default)]
    pub features: Vec<GeocodeCandidate>,
}

/// The single candidate accepted for an address
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedGeocode {
    pub query: AddressQuery,
    pub candidate: GeocodeCandidate,
}

impl ResolvedGeocode {
    pub fn longitude(&self) -> f64 {
        self.candidate.longitude()
    }

    pub fn latitude(&self) -> f64 {
        self.candidate.latitude()
    }
}
