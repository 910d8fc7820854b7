use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use super::history::ContentType;
use super::usage::UsageKind;
use crate::constants::MAX_PROMPT_LENGTH;

/// The generation forms offered to users.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, ToSchema)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(
    feature = "sqlx",
    sqlx(type_name = "generation_kind", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum GenerationKind {
    TextToImage,
    ImageToVideo,
    VideoToVideo,
    TextToSpeech,
    StoryToVideo,
}

impl GenerationKind {
    pub const ALL: [GenerationKind; 5] = [
        GenerationKind::TextToImage,
        GenerationKind::ImageToVideo,
        GenerationKind::VideoToVideo,
        GenerationKind::TextToSpeech,
        GenerationKind::StoryToVideo,
    ];

    /// Credit consumed by one generation, if metered.
    pub fn usage_kind(&self) -> Option<UsageKind> {
        match self {
            GenerationKind::TextToImage => Some(UsageKind::Image),
            GenerationKind::ImageToVideo
            | GenerationKind::VideoToVideo
            | GenerationKind::StoryToVideo => Some(UsageKind::Video),
            GenerationKind::TextToSpeech => None,
        }
    }

    pub fn content_type(&self) -> ContentType {
        match self {
            GenerationKind::TextToImage => ContentType::Image,
            GenerationKind::ImageToVideo
            | GenerationKind::VideoToVideo
            | GenerationKind::StoryToVideo => ContentType::Video,
            GenerationKind::TextToSpeech => ContentType::Audio,
        }
    }

    /// Kinds that transform an uploaded input.
    pub fn requires_input(&self) -> bool {
        matches!(
            self,
            GenerationKind::ImageToVideo | GenerationKind::VideoToVideo
        )
    }
}

impl Display for GenerationKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            GenerationKind::TextToImage => write!(f, "text_to_image"),
            GenerationKind::ImageToVideo => write!(f, "image_to_video"),
            GenerationKind::VideoToVideo => write!(f, "video_to_video"),
            GenerationKind::TextToSpeech => write!(f, "text_to_speech"),
            GenerationKind::StoryToVideo => write!(f, "story_to_video"),
        }
    }
}

impl FromStr for GenerationKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text_to_image" => Ok(GenerationKind::TextToImage),
            "image_to_video" => Ok(GenerationKind::ImageToVideo),
            "video_to_video" => Ok(GenerationKind::VideoToVideo),
            "text_to_speech" => Ok(GenerationKind::TextToSpeech),
            "story_to_video" => Ok(GenerationKind::StoryToVideo),
            _ => Err(anyhow::anyhow!("Invalid generation kind: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "job_status", rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
    Cancelled,
    TimedOut,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::Queued | JobStatus::Running)
    }
}

impl Display for JobStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            JobStatus::Queued => write!(f, "queued"),
            JobStatus::Running => write!(f, "running"),
            JobStatus::Succeeded => write!(f, "succeeded"),
            JobStatus::Failed => write!(f, "failed"),
            JobStatus::Cancelled => write!(f, "cancelled"),
            JobStatus::TimedOut => write!(f, "timed_out"),
        }
    }
}

/// One generation request and its outcome.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct GenerationJob {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: GenerationKind,
    pub provider: String,
    pub status: JobStatus,
    pub prompt: String,
    #[schema(value_type = Object)]
    pub input: serde_json::Value,
    pub logs: Vec<String>,
    pub result_url: Option<String>,
    pub error: Option<String>,
    pub history_id: Option<Uuid>,
    /// Credit reserved for this job; released again on failure.
    pub usage_kind: Option<UsageKind>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Fields for inserting a job.
#[derive(Debug, Clone)]
pub struct NewGenerationJob {
    pub user_id: Uuid,
    pub kind: GenerationKind,
    pub provider: String,
    pub prompt: String,
    pub input: serde_json::Value,
    pub usage_kind: Option<UsageKind>,
}

/// `POST /generations`
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateGenerationRequest {
    pub kind: GenerationKind,
    #[validate(length(min = 1, max = MAX_PROMPT_LENGTH))]
    pub prompt: String,
    /// Uploaded image or video for the transform kinds.
    #[validate(url)]
    pub input_url: Option<String>,
    /// Vendor-specific extras (aspect ratio, duration, voice, ...).
    #[serde(default)]
    #[schema(value_type = Object)]
    pub params: serde_json::Value,
    /// Force a vendor instead of the default for this kind.
    pub provider: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct GenerationAccepted {
    pub job: GenerationJob,
    /// Localized status text.
    pub message: String,
}
