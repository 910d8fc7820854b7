//! Vendor adapter abstraction
//!
//! Each hosted vendor is wrapped in a [`GenerationProvider`] that turns a
//! normalized [`GenerationRequest`] into a normalized [`GenerationOutput`].
//! Vendor wire formats never leave the adapter.

use async_trait::async_trait;
use bytes::Bytes;
use genstudio_core::models::{ContentType, GenerationKind, Vendor};
use serde::Serialize;
use std::fmt::{Debug, Formatter, Result as FmtResult};
use tokio_util::sync::CancellationToken;

use crate::error::{VendorError, VendorResult};
use crate::logs::LogSink;
use crate::poll::PollPolicy;

/// What to generate.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub kind: GenerationKind,
    pub prompt: String,
    /// Uploaded source image or video for the transform kinds.
    pub input_url: Option<String>,
    /// Vendor-specific extras, passed through to the vendor input.
    pub params: serde_json::Value,
}

/// API key used for one call.
///
/// Never logged; `Debug` prints a redacted value.
#[derive(Clone)]
pub struct Credentials {
    api_key: String,
}

impl Credentials {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
        }
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }
}

impl Debug for Credentials {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("Credentials")
            .field("api_key", &"<redacted>")
            .finish()
    }
}

/// Everything an adapter needs for one generation.
#[derive(Debug, Clone)]
pub struct GenerationContext {
    pub request: GenerationRequest,
    pub credentials: Credentials,
    /// Fires when the user cancels the job.
    pub cancel: CancellationToken,
    /// Progress lines visible to the user while the job runs.
    pub logs: LogSink,
    pub poll: PollPolicy,
}

/// The generated media, either hosted by the vendor or returned inline.
#[derive(Debug, Clone)]
pub enum Artifact {
    Url { url: String, content_type: String },
    Bytes { data: Bytes, content_type: String },
}

impl Artifact {
    pub fn content_type(&self) -> &str {
        match self {
            Artifact::Url { content_type, .. } | Artifact::Bytes { content_type, .. } => {
                content_type
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct GenerationOutput {
    pub artifact: Artifact,
    /// Vendor-side id of the request or prediction, if any.
    pub vendor_request_id: Option<String>,
    pub metadata: serde_json::Value,
}

/// Provider description for listings.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderInfo {
    pub name: String,
    pub vendor: Vendor,
    pub supported_kinds: Vec<GenerationKind>,
}

#[async_trait]
pub trait GenerationProvider: Send + Sync + Debug {
    /// Registry name, e.g. `"fal"`.
    fn name(&self) -> &str;

    /// Vendor whose key this provider uses.
    fn vendor(&self) -> Vendor;

    fn supported_kinds(&self) -> &[GenerationKind];

    fn supports(&self, kind: GenerationKind) -> bool {
        self.supported_kinds().contains(&kind)
    }

    /// Cheap local check of a key before any request is made.
    fn validate_credentials(&self, credentials: &Credentials) -> VendorResult<()> {
        if credentials.api_key().trim().is_empty() {
            return Err(VendorError::MissingCredentials(format!(
                "{} API key is empty",
                self.vendor()
            )));
        }
        Ok(())
    }

    async fn generate(&self, context: GenerationContext) -> VendorResult<GenerationOutput>;

    fn info(&self) -> ProviderInfo {
        ProviderInfo {
            name: self.name().to_string(),
            vendor: self.vendor(),
            supported_kinds: self.supported_kinds().to_vec(),
        }
    }
}

/// Rejects requests the provider cannot serve before anything is sent.
pub(crate) fn check_request(
    provider: &dyn GenerationProvider,
    request: &GenerationRequest,
) -> VendorResult<()> {
    if !provider.supports(request.kind) {
        return Err(VendorError::InvalidRequest(format!(
            "{} does not support {}",
            provider.name(),
            request.kind
        )));
    }
    if request.kind.requires_input() && request.input_url.is_none() {
        return Err(VendorError::InvalidRequest(format!(
            "{} requires an input file",
            request.kind
        )));
    }
    Ok(())
}

/// MIME type for a vendor-hosted file: from its extension when known,
/// otherwise the usual format for `kind`.
pub fn guess_content_type(url: &str, kind: GenerationKind) -> String {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let ext = path
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    let known = match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        "mp4" => Some("video/mp4"),
        "webm" => Some("video/webm"),
        "mov" => Some("video/quicktime"),
        "mp3" => Some("audio/mpeg"),
        "wav" => Some("audio/wav"),
        "ogg" => Some("audio/ogg"),
        _ => None,
    };
    known
        .unwrap_or(match kind.content_type() {
            ContentType::Image => "image/png",
            ContentType::Video => "video/mp4",
            ContentType::Audio => "audio/mpeg",
        })
        .to_string()
}

/// Vendor input object: `params` first, then the fields we own on top.
pub(crate) fn merge_input(
    params: &serde_json::Value,
    fields: serde_json::Map<String, serde_json::Value>,
) -> serde_json::Value {
    let mut input = match params {
        serde_json::Value::Object(map) => map.clone(),
        _ => serde_json::Map::new(),
    };
    input.extend(fields);
    serde_json::Value::Object(input)
}

/// An absolute http(s) URL a client can fetch the result from.
pub(crate) fn is_result_url(url: &str) -> bool {
    reqwest::Url::parse(url)
        .map(|parsed| matches!(parsed.scheme(), "http" | "https") && parsed.has_host())
        .unwrap_or(false)
}

/// Map a non-2xx response to [`VendorError::Http`].
pub(crate) async fn error_for_status(response: reqwest::Response) -> VendorResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    Err(VendorError::Http {
        status: status.as_u16(),
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credentials_debug_is_redacted() {
        let creds = Credentials::new("sk-live-secret");
        let printed = format!("{:?}", creds);
        assert!(!printed.contains("secret"));
        assert_eq!(creds.api_key(), "sk-live-secret");
    }

    #[test]
    fn test_result_url_requires_http_scheme() {
        assert!(is_result_url("https://v3.fal.media/files/out.png"));
        assert!(is_result_url("http://127.0.0.1:9000/out.mp4"));
        assert!(!is_result_url(""));
        assert!(!is_result_url("pending"));
        assert!(!is_result_url("/files/out.png"));
        assert!(!is_result_url("data:image/png;base64,AAAA"));
        assert!(!is_result_url("ftp://cdn.example.com/out.png"));
    }

    #[test]
    fn test_guess_content_type() {
        assert_eq!(
            guess_content_type("https://cdn/x/out.WEBP?sig=1", GenerationKind::TextToImage),
            "image/webp"
        );
        assert_eq!(
            guess_content_type("https://cdn/x/result", GenerationKind::StoryToVideo),
            "video/mp4"
        );
        assert_eq!(
            guess_content_type("https://cdn/x/speech", GenerationKind::TextToSpeech),
            "audio/mpeg"
        );
    }

    #[test]
    fn test_merge_input_keeps_owned_fields() {
        let params = serde_json::json!({"prompt": "ignored", "aspect_ratio": "16:9"});
        let mut fields = serde_json::Map::new();
        fields.insert("prompt".into(), "a red fox".into());
        let input = merge_input(&params, fields);
        assert_eq!(input["prompt"], "a red fox");
        assert_eq!(input["aspect_ratio"], "16:9");
    }

    #[test]
    fn test_artifact_content_type() {
        let artifact = Artifact::Bytes {
            data: Bytes::from_static(b"ID3"),
            content_type: "audio/mpeg".into(),
        };
        assert_eq!(artifact.content_type(), "audio/mpeg");
    }
}
