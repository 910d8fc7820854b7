//! ElevenLabs text-to-speech adapter
//!
//! Synchronous: one request returns the encoded audio, which the runner
//! stores itself.

use async_trait::async_trait;
use genstudio_core::models::{GenerationKind, Vendor};
use genstudio_core::VendorSettings;
use serde::Serialize;
use serde_json::{json, Value};
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::time::Duration;

use crate::error::{VendorError, VendorResult};
use crate::provider::{
    check_request, error_for_status, Artifact, GenerationContext, GenerationOutput,
    GenerationProvider,
};

const REQUEST_TIMEOUT_SECS: u64 = 120;
const MAX_TEXT_LENGTH: usize = 5000;

const SUPPORTED_KINDS: [GenerationKind; 1] = [GenerationKind::TextToSpeech];

#[derive(Debug, Serialize)]
struct SpeechRequest<'a> {
    text: &'a str,
    model_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    voice_settings: Option<&'a Value>,
}

pub struct ElevenLabsProvider {
    http_client: reqwest::Client,
    api_base_url: String,
    default_voice_id: String,
    model_id: String,
}

impl Debug for ElevenLabsProvider {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("ElevenLabsProvider")
            .field("api_base_url", &self.api_base_url)
            .field("default_voice_id", &self.default_voice_id)
            .finish()
    }
}

impl ElevenLabsProvider {
    pub fn new(settings: &VendorSettings) -> VendorResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| VendorError::Transport(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            api_base_url: settings.elevenlabs_api_base_url.trim_end_matches('/').to_string(),
            default_voice_id: settings.elevenlabs_voice_id.clone(),
            model_id: settings.elevenlabs_model_id.clone(),
        })
    }

    async fn synthesize(
        &self,
        api_key: &str,
        voice_id: &str,
        body: &SpeechRequest<'_>,
    ) -> VendorResult<(bytes::Bytes, String)> {
        let url = format!("{}/text-to-speech/{}", self.api_base_url, voice_id);
        let response = self
            .http_client
            .post(&url)
            .header("xi-api-key", api_key)
            .header("Accept", "audio/mpeg")
            .json(body)
            .send()
            .await?;
        let response = error_for_status(response).await?;

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("audio/mpeg")
            .to_string();
        let data = response.bytes().await?;
        Ok((data, content_type))
    }
}

#[async_trait]
impl GenerationProvider for ElevenLabsProvider {
    fn name(&self) -> &str {
        "elevenlabs"
    }

    fn vendor(&self) -> Vendor {
        Vendor::Elevenlabs
    }

    fn supported_kinds(&self) -> &[GenerationKind] {
        &SUPPORTED_KINDS
    }

    async fn generate(&self, context: GenerationContext) -> VendorResult<GenerationOutput> {
        check_request(self, &context.request)?;
        self.validate_credentials(&context.credentials)?;

        let request = &context.request;
        if request.prompt.chars().count() > MAX_TEXT_LENGTH {
            return Err(VendorError::InvalidRequest(format!(
                "Text exceeds {} characters",
                MAX_TEXT_LENGTH
            )));
        }

        let voice_id = request
            .params
            .get("voice_id")
            .and_then(Value::as_str)
            .unwrap_or(&self.default_voice_id);
        let model_id = request
            .params
            .get("model_id")
            .and_then(Value::as_str)
            .unwrap_or(&self.model_id);
        let body = SpeechRequest {
            text: &request.prompt,
            model_id,
            voice_settings: request.params.get("voice_settings"),
        };

        context
            .logs
            .push(format!("Synthesizing speech with ElevenLabs voice {}", voice_id));

        let (data, content_type) = tokio::select! {
            biased;
            _ = context.cancel.cancelled() => return Err(VendorError::Cancelled),
            result = self.synthesize(context.credentials.api_key(), voice_id, &body) => result?,
        };

        if data.is_empty() {
            return Err(VendorError::NoResult);
        }

        tracing::info!(voice_id = %voice_id, bytes = data.len(), "ElevenLabs speech generated");
        context
            .logs
            .push(format!("Received {} bytes of audio", data.len()));

        Ok(GenerationOutput {
            artifact: Artifact::Bytes { data, content_type },
            vendor_request_id: None,
            metadata: json!({ "voice_id": voice_id, "model_id": model_id }),
        })
    }
}
