//! fal.ai queue adapter
//!
//! Requests go through the queue API: submit the input to
//! `{queue}/{model}`, poll the returned status URL (with logs) until the
//! request completes, then fetch the result from the response URL. Results
//! come in one of three shapes depending on the model family.

use async_trait::async_trait;
use genstudio_core::models::{GenerationKind, Vendor};
use genstudio_core::VendorSettings;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::time::Duration;

use crate::error::{VendorError, VendorResult};
use crate::logs::LogSink;
use crate::poll::{poll_until, PollStep};
use crate::provider::{
    check_request, error_for_status, guess_content_type, is_result_url, merge_input, Artifact,
    GenerationContext, GenerationOutput, GenerationProvider,
};

const REQUEST_TIMEOUT_SECS: u64 = 60;

const SUPPORTED_KINDS: [GenerationKind; 5] = [
    GenerationKind::TextToImage,
    GenerationKind::ImageToVideo,
    GenerationKind::VideoToVideo,
    GenerationKind::StoryToVideo,
    GenerationKind::TextToSpeech,
];

#[derive(Debug, Deserialize)]
struct QueueSubmitResponse {
    request_id: String,
    status_url: Option<String>,
    response_url: Option<String>,
    cancel_url: Option<String>,
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
enum QueueState {
    InQueue,
    InProgress,
    Completed,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
struct QueueStatusResponse {
    status: QueueState,
    #[serde(default)]
    queue_position: Option<u32>,
    #[serde(default)]
    logs: Option<Vec<QueueLog>>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QueueLog {
    message: String,
}

#[derive(Debug, Deserialize)]
struct FalFile {
    url: String,
    content_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ImageResult {
    images: Vec<FalFile>,
    #[serde(default)]
    seed: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct VideoResult {
    video: FalFile,
}

#[derive(Debug, Deserialize)]
struct AudioResult {
    audio: FalFile,
}

/// Endpoints for one queued request.
struct QueueHandle {
    request_id: String,
    status_url: String,
    response_url: String,
    cancel_url: String,
}

pub struct FalProvider {
    http_client: reqwest::Client,
    queue_base_url: String,
    models: HashMap<GenerationKind, String>,
}

impl Debug for FalProvider {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("FalProvider")
            .field("queue_base_url", &self.queue_base_url)
            .finish()
    }
}

impl FalProvider {
    pub fn new(settings: &VendorSettings) -> VendorResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| VendorError::Transport(format!("Failed to create HTTP client: {}", e)))?;

        let models = HashMap::from([
            (
                GenerationKind::TextToImage,
                settings.fal_text_to_image_model.clone(),
            ),
            (
                GenerationKind::ImageToVideo,
                settings.fal_image_to_video_model.clone(),
            ),
            (
                GenerationKind::VideoToVideo,
                settings.fal_video_to_video_model.clone(),
            ),
            (
                GenerationKind::StoryToVideo,
                settings.fal_story_to_video_model.clone(),
            ),
            (
                GenerationKind::TextToSpeech,
                settings.fal_text_to_speech_model.clone(),
            ),
        ]);

        Ok(Self {
            http_client,
            queue_base_url: settings.fal_queue_base_url.trim_end_matches('/').to_string(),
            models,
        })
    }

    fn model_for(&self, kind: GenerationKind) -> VendorResult<&str> {
        self.models
            .get(&kind)
            .map(String::as_str)
            .ok_or_else(|| VendorError::InvalidRequest(format!("No fal.ai model for {}", kind)))
    }

    fn build_input(context: &GenerationContext) -> Value {
        let request = &context.request;
        let mut fields = Map::new();
        match request.kind {
            GenerationKind::TextToSpeech => {
                fields.insert("input".into(), json!(request.prompt));
            }
            GenerationKind::ImageToVideo => {
                fields.insert("prompt".into(), json!(request.prompt));
                fields.insert("image_url".into(), json!(request.input_url));
            }
            GenerationKind::VideoToVideo => {
                fields.insert("prompt".into(), json!(request.prompt));
                fields.insert("video_url".into(), json!(request.input_url));
            }
            GenerationKind::TextToImage | GenerationKind::StoryToVideo => {
                fields.insert("prompt".into(), json!(request.prompt));
            }
        }
        merge_input(&request.params, fields)
    }

    async fn submit(&self, api_key: &str, model: &str, input: &Value) -> VendorResult<QueueHandle> {
        let url = format!("{}/{}", self.queue_base_url, model);
        let response = self
            .http_client
            .post(&url)
            .header("Authorization", format!("Key {}", api_key))
            .json(input)
            .send()
            .await?;
        let submitted: QueueSubmitResponse = error_for_status(response).await?.json().await?;

        let request_base = format!("{}/{}/requests/{}", self.queue_base_url, model, submitted.request_id);
        Ok(QueueHandle {
            status_url: submitted
                .status_url
                .unwrap_or_else(|| format!("{}/status", request_base)),
            response_url: submitted.response_url.unwrap_or_else(|| request_base.clone()),
            cancel_url: submitted
                .cancel_url
                .unwrap_or_else(|| format!("{}/cancel", request_base)),
            request_id: submitted.request_id,
        })
    }

    async fn check_status(
        &self,
        api_key: &str,
        status_url: &str,
        logs: &LogSink,
    ) -> VendorResult<PollStep<()>> {
        let response = self
            .http_client
            .get(status_url)
            .query(&[("logs", "1")])
            .header("Authorization", format!("Key {}", api_key))
            .send()
            .await?;
        let status: QueueStatusResponse = error_for_status(response).await?.json().await?;

        if let Some(lines) = status.logs {
            logs.sync_vendor_log(lines.into_iter().map(|l| l.message));
        }

        match status.status {
            QueueState::Completed => match status.error {
                Some(error) => Err(VendorError::Failed(error)),
                None => Ok(PollStep::Done(())),
            },
            QueueState::InQueue => {
                tracing::debug!(queue_position = ?status.queue_position, "fal.ai request queued");
                Ok(PollStep::Pending)
            }
            QueueState::InProgress => Ok(PollStep::Pending),
            QueueState::Unknown => {
                tracing::warn!("Unknown fal.ai queue status, continuing to poll");
                Ok(PollStep::Pending)
            }
        }
    }

    async fn fetch_result(
        &self,
        api_key: &str,
        response_url: &str,
        kind: GenerationKind,
    ) -> VendorResult<(Artifact, Value)> {
        let response = self
            .http_client
            .get(response_url)
            .header("Authorization", format!("Key {}", api_key))
            .send()
            .await?;
        let body: Value = error_for_status(response).await?.json().await?;
        Self::parse_result(kind, body)
    }

    fn parse_result(kind: GenerationKind, body: Value) -> VendorResult<(Artifact, Value)> {
        let (file, metadata) = match kind {
            GenerationKind::TextToImage => {
                let result: ImageResult = serde_json::from_value(body)?;
                let metadata = json!({ "seed": result.seed });
                let file = result.images.into_iter().next().ok_or(VendorError::NoResult)?;
                (file, metadata)
            }
            GenerationKind::ImageToVideo
            | GenerationKind::VideoToVideo
            | GenerationKind::StoryToVideo => {
                let result: VideoResult = serde_json::from_value(body)?;
                (result.video, Value::Null)
            }
            GenerationKind::TextToSpeech => {
                let result: AudioResult = serde_json::from_value(body)?;
                (result.audio, Value::Null)
            }
        };

        if !is_result_url(&file.url) {
            return Err(VendorError::NoResult);
        }
        let content_type = file
            .content_type
            .unwrap_or_else(|| guess_content_type(&file.url, kind));
        Ok((
            Artifact::Url {
                url: file.url,
                content_type,
            },
            metadata,
        ))
    }

    /// Best effort; the request may already be finished.
    async fn cancel_request(&self, api_key: &str, cancel_url: &str) {
        let result = self
            .http_client
            .put(cancel_url)
            .header("Authorization", format!("Key {}", api_key))
            .send()
            .await;
        if let Err(e) = result {
            tracing::warn!(error = %e, "Failed to cancel fal.ai request");
        }
    }
}

#[async_trait]
impl GenerationProvider for FalProvider {
    fn name(&self) -> &str {
        "fal"
    }

    fn vendor(&self) -> Vendor {
        Vendor::Fal
    }

    fn supported_kinds(&self) -> &[GenerationKind] {
        &SUPPORTED_KINDS
    }

    async fn generate(&self, context: GenerationContext) -> VendorResult<GenerationOutput> {
        check_request(self, &context.request)?;
        self.validate_credentials(&context.credentials)?;

        let kind = context.request.kind;
        let api_key = context.credentials.api_key();
        let model = self.model_for(kind)?;
        let input = Self::build_input(&context);

        let handle = tokio::select! {
            biased;
            _ = context.cancel.cancelled() => return Err(VendorError::Cancelled),
            handle = self.submit(api_key, model, &input) => handle?,
        };

        tracing::info!(model = %model, request_id = %handle.request_id, "Submitted fal.ai request");
        context
            .logs
            .push(format!("Submitted to fal.ai ({}), request {}", model, handle.request_id));

        let polled = poll_until(&context.poll, &context.cancel, || {
            self.check_status(api_key, &handle.status_url, &context.logs)
        })
        .await;

        if let Err(err) = polled {
            if matches!(err, VendorError::Cancelled | VendorError::Timeout { .. }) {
                self.cancel_request(api_key, &handle.cancel_url).await;
            }
            return Err(err);
        }

        let (artifact, metadata) = self.fetch_result(api_key, &handle.response_url, kind).await?;
        context.logs.push("fal.ai request completed");

        Ok(GenerationOutput {
            artifact,
            vendor_request_id: Some(handle.request_id),
            metadata,
        })
    }
}
