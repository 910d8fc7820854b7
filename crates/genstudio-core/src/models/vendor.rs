use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// Hosted AI vendors a user can store a key for.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Vendor {
    Fal,
    Replicate,
    Elevenlabs,
}

impl Vendor {
    pub const ALL: [Vendor; 3] = [Vendor::Fal, Vendor::Replicate, Vendor::Elevenlabs];

    pub fn as_str(&self) -> &'static str {
        match self {
            Vendor::Fal => "fal",
            Vendor::Replicate => "replicate",
            Vendor::Elevenlabs => "elevenlabs",
        }
    }
}

impl Display for Vendor {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

impl FromStr for Vendor {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fal" => Ok(Vendor::Fal),
            "replicate" => Ok(Vendor::Replicate),
            "elevenlabs" => Ok(Vendor::Elevenlabs),
            _ => Err(anyhow::anyhow!("Unknown vendor: {}", s)),
        }
    }
}

/// Stored row; the key is encrypted.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct VendorKeyRecord {
    pub user_id: Uuid,
    pub vendor: String,
    pub encrypted_key: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct SaveVendorKeyRequest {
    #[validate(length(min = 1, max = 512))]
    pub api_key: String,
}

/// Saved key as shown in settings.
#[derive(Debug, Serialize, ToSchema)]
pub struct VendorKeyView {
    pub vendor: Vendor,
    /// Last four characters, e.g. `••••abcd`.
    pub hint: String,
    pub updated_at: DateTime<Utc>,
}

/// `••••` plus the last four characters of `key`.
pub fn key_hint(key: &str) -> String {
    let tail: String = key
        .chars()
        .rev()
        .take(4)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    format!("••••{}", tail)
}
