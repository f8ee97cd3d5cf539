use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

pub const TOKEN_URI_PREFIX: &str = "data:application/json;base64,";

/// Catalog fields of a landmark that end up in the minted token.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct LandmarkMetadata {
    pub name: String,
    pub description: String,
    pub image: String,
    pub location: String,
    #[serde(default)]
    pub country: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct MetadataAttribute {
    pub trait_type: String,
    pub value: String,
}

impl MetadataAttribute {
    fn new(trait_type: &str, value: impl Into<String>) -> Self {
        Self {
            trait_type: trait_type.to_string(),
            value: value.into(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenMetadata {
    pub name: String,
    pub description: String,
    pub image: String,
    pub attributes: Vec<MetadataAttribute>,
}

impl TokenMetadata {
    pub fn for_landmark(landmark: &LandmarkMetadata, minted_at: DateTime<Utc>) -> Self {
        let country = landmark.country.as_deref().unwrap_or("Unknown");
        Self {
            name: landmark.name.clone(),
            description: landmark.description.clone(),
            image: landmark.image.clone(),
            attributes: vec![
                MetadataAttribute::new("Location", landmark.location.clone()),
                MetadataAttribute::new("Country", country),
                MetadataAttribute::new("Type", "Landmark"),
                MetadataAttribute::new(
                    "Minted At",
                    minted_at.to_rfc3339_opts(SecondsFormat::Millis, true),
                ),
            ],
        }
    }

    /// Self-contained `data:` URI; no IPFS upload involved.
    pub fn to_token_uri(&self) -> String {
        let json = serde_json::to_vec(self).expect("token metadata encode");
        format!("{TOKEN_URI_PREFIX}{}", general_purpose::STANDARD.encode(json))
    }

    pub fn from_token_uri(uri: &str) -> Option<Self> {
        let encoded = uri.strip_prefix(TOKEN_URI_PREFIX)?;
        let bytes = general_purpose::STANDARD.decode(encoded).ok()?;
        serde_json::from_slice(&bytes).ok()
    }
}
