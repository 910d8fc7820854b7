//! Configuration module
//!
//! Everything is read from the environment (optionally seeded from a `.env`
//! file) once at startup and validated before the server binds.

use std::env;
use std::str::FromStr;

use crate::models::CreditPackage;
use crate::storage_types::StorageBackend;

const MAX_CONNECTIONS: u32 = 20;
const CONNECTION_TIMEOUT_SECS: u64 = 30;
const JWT_EXPIRY_HOURS: i64 = 24;
const MAX_UPLOAD_SIZE_MB: usize = 50;
const DEFAULT_IMAGE_LIMIT: i32 = 10;
const DEFAULT_VIDEO_LIMIT: i32 = 3;

/// Settings shared by every binary.
#[derive(Clone, Debug)]
pub struct BaseConfig {
    pub server_port: u16,
    pub cors_origins: Vec<String>,
    pub db_max_connections: u32,
    pub db_timeout_seconds: u64,
    pub jwt_secret: String,
    pub jwt_expiry_hours: i64,
    pub environment: String,
    /// `compact` or `json`
    pub log_format: String,
}

/// Vendor credentials and endpoints. Server keys are the fallback when a
/// user has not saved their own.
#[derive(Clone, Debug)]
pub struct VendorSettings {
    pub fal_api_key: Option<String>,
    pub fal_queue_base_url: String,
    pub fal_text_to_image_model: String,
    pub fal_image_to_video_model: String,
    pub fal_video_to_video_model: String,
    pub fal_story_to_video_model: String,
    pub fal_text_to_speech_model: String,
    pub replicate_api_token: Option<String>,
    pub replicate_api_base_url: String,
    pub replicate_text_to_image_model: String,
    pub replicate_image_to_video_model: String,
    pub elevenlabs_api_key: Option<String>,
    pub elevenlabs_api_base_url: String,
    pub elevenlabs_voice_id: String,
    pub elevenlabs_model_id: String,
}

impl Default for VendorSettings {
    fn default() -> Self {
        Self {
            fal_api_key: None,
            fal_queue_base_url: "https://queue.fal.run".to_string(),
            fal_text_to_image_model: "fal-ai/flux/dev".to_string(),
            fal_image_to_video_model: "fal-ai/kling-video/v1.6/standard/image-to-video"
                .to_string(),
            fal_video_to_video_model: "fal-ai/pixverse/v4.5/effects".to_string(),
            fal_story_to_video_model: "fal-ai/kling-video/v1.6/standard/text-to-video"
                .to_string(),
            fal_text_to_speech_model: "fal-ai/playai/tts/v3".to_string(),
            replicate_api_token: None,
            replicate_api_base_url: "https://api.replicate.com/v1".to_string(),
            replicate_text_to_image_model: "black-forest-labs/flux-schnell".to_string(),
            replicate_image_to_video_model: "wan-video/wan-2.2-i2v-fast".to_string(),
            elevenlabs_api_key: None,
            elevenlabs_api_base_url: "https://api.elevenlabs.io/v1".to_string(),
            elevenlabs_voice_id: "21m00Tcm4TlvDq8ikWAM".to_string(),
            elevenlabs_model_id: "eleven_multilingual_v2".to_string(),
        }
    }
}

/// Polling policy for queue-based vendors.
#[derive(Clone, Debug)]
pub struct PollSettings {
    pub initial_interval_ms: u64,
    pub max_interval_ms: u64,
    pub backoff_multiplier: f64,
    pub max_wait_secs: u64,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            initial_interval_ms: 1000,
            max_interval_ms: 10_000,
            backoff_multiplier: 2.0,
            max_wait_secs: 600,
        }
    }
}

#[derive(Clone, Debug)]
pub struct StudioConfig {
    pub base: BaseConfig,
    pub database_url: String,
    /// Emails promoted to admin when they sign up.
    pub admin_emails: Vec<String>,
    // Storage
    pub storage_backend: Option<StorageBackend>,
    pub s3_bucket: Option<String>,
    pub s3_region: Option<String>,
    pub s3_endpoint: Option<String>,
    pub aws_region: Option<String>,
    pub local_storage_path: Option<String>,
    pub local_storage_base_url: Option<String>,
    pub max_upload_size_bytes: usize,
    pub upload_allowed_content_types: Vec<String>,
    /// Copy vendor outputs into our own storage before recording history.
    pub persist_artifacts: bool,
    // Credits
    pub default_image_limit: i32,
    pub default_video_limit: i32,
    pub credit_packages: Vec<CreditPackage>,
    pub vendors: VendorSettings,
    pub poll: PollSettings,
    /// Base64 AES-256 key for vendor keys at rest.
    pub encryption_key: Option<String>,
}

/// Application configuration.
#[derive(Clone, Debug)]
pub struct Config(pub Box<StudioConfig>);

impl Config {
    pub fn new(config: StudioConfig) -> Self {
        Config(Box::new(config))
    }

    fn inner(&self) -> &StudioConfig {
        &self.0
    }

    pub fn is_production(&self) -> bool {
        let env = self.inner().base.environment.to_lowercase();
        env == "production" || env == "prod"
    }

    pub fn from_env() -> Result<Self, anyhow::Error> {
        let config = StudioConfig::from_env()?;
        Ok(Config(Box::new(config)))
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        self.inner().validate()
    }

    pub fn server_port(&self) -> u16 {
        self.inner().base.server_port
    }

    pub fn cors_origins(&self) -> &[String] {
        &self.inner().base.cors_origins
    }

    pub fn environment(&self) -> &str {
        &self.inner().base.environment
    }

    pub fn log_format(&self) -> &str {
        &self.inner().base.log_format
    }

    pub fn jwt_secret(&self) -> &str {
        &self.inner().base.jwt_secret
    }

    pub fn jwt_expiry_hours(&self) -> i64 {
        self.inner().base.jwt_expiry_hours
    }

    pub fn db_max_connections(&self) -> u32 {
        self.inner().base.db_max_connections
    }

    pub fn db_timeout_seconds(&self) -> u64 {
        self.inner().base.db_timeout_seconds
    }

    pub fn database_url(&self) -> &str {
        &self.inner().database_url
    }

    pub fn is_admin_email(&self, email: &str) -> bool {
        let email = email.trim().to_lowercase();
        self.inner().admin_emails.iter().any(|e| *e == email)
    }

    pub fn storage_backend(&self) -> Option<StorageBackend> {
        self.inner().storage_backend
    }

    pub fn s3_bucket(&self) -> Option<&str> {
        self.inner().s3_bucket.as_deref()
    }

    pub fn s3_region(&self) -> Option<&str> {
        self.inner().s3_region.as_deref()
    }

    pub fn s3_endpoint(&self) -> Option<&str> {
        self.inner().s3_endpoint.as_deref()
    }

    pub fn aws_region(&self) -> Option<&str> {
        self.inner().aws_region.as_deref()
    }

    pub fn local_storage_path(&self) -> Option<&str> {
        self.inner().local_storage_path.as_deref()
    }

    pub fn local_storage_base_url(&self) -> Option<&str> {
        self.inner().local_storage_base_url.as_deref()
    }

    pub fn max_upload_size_bytes(&self) -> usize {
        self.inner().max_upload_size_bytes
    }

    pub fn upload_allowed_content_types(&self) -> &[String] {
        &self.inner().upload_allowed_content_types
    }

    pub fn persist_artifacts(&self) -> bool {
        self.inner().persist_artifacts
    }

    pub fn default_image_limit(&self) -> i32 {
        self.inner().default_image_limit
    }

    pub fn default_video_limit(&self) -> i32 {
        self.inner().default_video_limit
    }

    pub fn credit_packages(&self) -> &[CreditPackage] {
        &self.inner().credit_packages
    }

    pub fn credit_package(&self, id: &str) -> Option<&CreditPackage> {
        self.inner().credit_packages.iter().find(|p| p.id == id)
    }

    pub fn vendors(&self) -> &VendorSettings {
        &self.inner().vendors
    }

    pub fn poll(&self) -> &PollSettings {
        &self.inner().poll
    }

    pub fn encryption_key(&self) -> Option<&str> {
        self.inner().encryption_key.as_deref()
    }
}

/// Non-empty env var.
fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.trim().is_empty())
}

/// Env var parsed as `T`, falling back to `default` when unset or malformed.
fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env_opt(key)
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

fn env_string(key: &str, default: &str) -> String {
    env_opt(key).unwrap_or_else(|| default.to_string())
}

fn env_list(key: &str, default: &str) -> Vec<String> {
    env_string(key, default)
        .split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

impl StudioConfig {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        let environment = env::var("ENVIRONMENT")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string());

        let cors_origins_str = env_string("CORS_ORIGINS", "*");
        let is_production =
            environment.to_lowercase() == "production" || environment.to_lowercase() == "prod";
        if is_production && cors_origins_str.trim() == "*" {
            return Err(anyhow::anyhow!(
                "CORS_ORIGINS cannot be '*' in production. Please specify explicit origins."
            ));
        }
        let cors_origins = cors_origins_str
            .split(',')
            .map(|s| s.trim().to_string())
            .collect();

        let base = BaseConfig {
            server_port: env_string("PORT", "4000")
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number"))?,
            cors_origins,
            db_max_connections: env_or("DB_MAX_CONNECTIONS", MAX_CONNECTIONS),
            db_timeout_seconds: env_or("DB_TIMEOUT_SECONDS", CONNECTION_TIMEOUT_SECS),
            jwt_secret: env::var("JWT_SECRET")
                .map_err(|_| anyhow::anyhow!("JWT_SECRET must be set"))?,
            jwt_expiry_hours: env_or("JWT_EXPIRY_HOURS", JWT_EXPIRY_HOURS),
            environment,
            log_format: env_string("LOG_FORMAT", "compact").to_lowercase(),
        };

        let storage_backend = env_opt("STORAGE_BACKEND")
            .map(|s| s.parse::<StorageBackend>())
            .transpose()?;

        let credit_packages = match env_opt("CREDIT_PACKAGES") {
            Some(raw) => serde_json::from_str::<Vec<CreditPackage>>(&raw)
                .map_err(|e| anyhow::anyhow!("CREDIT_PACKAGES is not valid JSON: {}", e))?,
            None => CreditPackage::default_catalog(),
        };

        let defaults = VendorSettings::default();
        let vendors = VendorSettings {
            fal_api_key: env_opt("FAL_API_KEY").or_else(|| env_opt("FAL_KEY")),
            fal_queue_base_url: env_string("FAL_QUEUE_BASE_URL", &defaults.fal_queue_base_url),
            fal_text_to_image_model: env_string(
                "FAL_TEXT_TO_IMAGE_MODEL",
                &defaults.fal_text_to_image_model,
            ),
            fal_image_to_video_model: env_string(
                "FAL_IMAGE_TO_VIDEO_MODEL",
                &defaults.fal_image_to_video_model,
            ),
            fal_video_to_video_model: env_string(
                "FAL_VIDEO_TO_VIDEO_MODEL",
                &defaults.fal_video_to_video_model,
            ),
            fal_story_to_video_model: env_string(
                "FAL_STORY_TO_VIDEO_MODEL",
                &defaults.fal_story_to_video_model,
            ),
            fal_text_to_speech_model: env_string(
                "FAL_TEXT_TO_SPEECH_MODEL",
                &defaults.fal_text_to_speech_model,
            ),
            replicate_api_token: env_opt("REPLICATE_API_TOKEN"),
            replicate_api_base_url: env_string(
                "REPLICATE_API_BASE_URL",
                &defaults.replicate_api_base_url,
            ),
            replicate_text_to_image_model: env_string(
                "REPLICATE_TEXT_TO_IMAGE_MODEL",
                &defaults.replicate_text_to_image_model,
            ),
            replicate_image_to_video_model: env_string(
                "REPLICATE_IMAGE_TO_VIDEO_MODEL",
                &defaults.replicate_image_to_video_model,
            ),
            elevenlabs_api_key: env_opt("ELEVENLABS_API_KEY"),
            elevenlabs_api_base_url: env_string(
                "ELEVENLABS_API_BASE_URL",
                &defaults.elevenlabs_api_base_url,
            ),
            elevenlabs_voice_id: env_string("ELEVENLABS_VOICE_ID", &defaults.elevenlabs_voice_id),
            elevenlabs_model_id: env_string("ELEVENLABS_MODEL_ID", &defaults.elevenlabs_model_id),
        };

        let poll_defaults = PollSettings::default();
        let poll = PollSettings {
            initial_interval_ms: env_or(
                "POLL_INITIAL_INTERVAL_MS",
                poll_defaults.initial_interval_ms,
            ),
            max_interval_ms: env_or("POLL_MAX_INTERVAL_MS", poll_defaults.max_interval_ms),
            backoff_multiplier: env_or(
                "POLL_BACKOFF_MULTIPLIER",
                poll_defaults.backoff_multiplier,
            ),
            max_wait_secs: env_or("POLL_MAX_WAIT_SECS", poll_defaults.max_wait_secs),
        };

        let config = StudioConfig {
            base,
            database_url: env::var("DATABASE_URL")
                .map_err(|_| anyhow::anyhow!("DATABASE_URL must be set"))?,
            admin_emails: env_list("ADMIN_EMAILS", ""),
            storage_backend,
            s3_bucket: env_opt("S3_BUCKET"),
            s3_region: env_opt("S3_REGION"),
            s3_endpoint: env_opt("S3_ENDPOINT"),
            aws_region: env_opt("AWS_REGION"),
            local_storage_path: env_opt("LOCAL_STORAGE_PATH"),
            local_storage_base_url: env_opt("LOCAL_STORAGE_BASE_URL"),
            max_upload_size_bytes: env_or("MAX_UPLOAD_SIZE_MB", MAX_UPLOAD_SIZE_MB) * 1024 * 1024,
            upload_allowed_content_types: env_list(
                "UPLOAD_ALLOWED_CONTENT_TYPES",
                "image/jpeg,image/png,image/webp,video/mp4,video/quicktime,video/webm",
            ),
            persist_artifacts: env_or("PERSIST_ARTIFACTS", true),
            default_image_limit: env_or("DEFAULT_IMAGE_LIMIT", DEFAULT_IMAGE_LIMIT),
            default_video_limit: env_or("DEFAULT_VIDEO_LIMIT", DEFAULT_VIDEO_LIMIT),
            credit_packages,
            vendors,
            poll,
            encryption_key: env_opt("ENCRYPTION_KEY"),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.base.jwt_secret.len() < 32 {
            return Err(anyhow::anyhow!(
                "JWT_SECRET must be at least 32 characters long"
            ));
        }

        if !self.database_url.starts_with("postgresql://")
            && !self.database_url.starts_with("postgres://")
        {
            return Err(anyhow::anyhow!(
                "DATABASE_URL must be a valid PostgreSQL connection string"
            ));
        }

        if self.default_image_limit < 0 || self.default_video_limit < 0 {
            return Err(anyhow::anyhow!(
                "DEFAULT_IMAGE_LIMIT and DEFAULT_VIDEO_LIMIT must not be negative"
            ));
        }

        for package in &self.credit_packages {
            package
                .validate()
                .map_err(|e| anyhow::anyhow!("Invalid credit package '{}': {}", package.id, e))?;
        }

        if self.poll.initial_interval_ms == 0
            || self.poll.max_interval_ms < self.poll.initial_interval_ms
        {
            return Err(anyhow::anyhow!(
                "POLL_MAX_INTERVAL_MS must be >= POLL_INITIAL_INTERVAL_MS > 0"
            ));
        }
        if self.poll.backoff_multiplier < 1.0 {
            return Err(anyhow::anyhow!("POLL_BACKOFF_MULTIPLIER must be >= 1.0"));
        }

        let backend = self.storage_backend.unwrap_or(StorageBackend::Local);
        match backend {
            StorageBackend::S3 => {
                if self.s3_bucket.is_none() {
                    return Err(anyhow::anyhow!(
                        "S3_BUCKET must be set when using S3 storage backend"
                    ));
                }
                if self.s3_region.is_none() && self.aws_region.is_none() {
                    return Err(anyhow::anyhow!(
                        "S3_REGION or AWS_REGION must be set when using S3 storage backend"
                    ));
                }
            }
            StorageBackend::Local => {
                if self.local_storage_path.is_none() {
                    return Err(anyhow::anyhow!(
                        "LOCAL_STORAGE_PATH must be set when using local storage backend"
                    ));
                }
                if self.local_storage_base_url.is_none() {
                    return Err(anyhow::anyhow!(
                        "LOCAL_STORAGE_BASE_URL must be set when using local storage backend"
                    ));
                }
            }
        }

        Ok(())
    }
}
