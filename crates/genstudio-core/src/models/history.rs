use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "content_type", rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Image,
    Video,
    Audio,
}

impl Display for ContentType {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            ContentType::Image => write!(f, "image"),
            ContentType::Video => write!(f, "video"),
            ContentType::Audio => write!(f, "audio"),
        }
    }
}

impl FromStr for ContentType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "image" => Ok(ContentType::Image),
            "video" => Ok(ContentType::Video),
            "audio" => Ok(ContentType::Audio),
            _ => Err(anyhow::anyhow!("Invalid content type: {}", s)),
        }
    }
}

/// A generated artifact shown in the user's history and, when public, the gallery.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct HistoryItem {
    pub id: Uuid,
    pub user_id: Uuid,
    pub content_type: ContentType,
    pub url: String,
    #[serde(skip_serializing)]
    pub storage_key: Option<String>,
    pub prompt: Option<String>,
    pub is_public: bool,
    #[schema(value_type = Object)]
    pub metadata: serde_json::Value,
    pub job_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewHistoryItem {
    pub user_id: Uuid,
    pub content_type: ContentType,
    pub url: String,
    pub storage_key: Option<String>,
    pub prompt: Option<String>,
    pub metadata: serde_json::Value,
    pub job_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateHistoryRequest {
    pub is_public: bool,
}
