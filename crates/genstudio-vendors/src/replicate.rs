//! Replicate predictions adapter
//!
//! Creates a prediction against the configured model, polls it until it
//! settles and returns the first output URL. Models return either a single
//! URL or a list of URLs.

use async_trait::async_trait;
use genstudio_core::models::{GenerationKind, Vendor};
use genstudio_core::VendorSettings;
use serde::Deserialize;
use serde_json::{json, Map, Value};
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

const SUPPORTED_KINDS: [GenerationKind; 2] =
    [GenerationKind::TextToImage, GenerationKind::ImageToVideo];

#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
#[serde(rename_all = "lowercase")]
enum PredictionStatus {
    Starting,
    Processing,
    Succeeded,
    Failed,
    Canceled,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PredictionOutput {
    Single(String),
    Many(Vec<String>),
}

impl PredictionOutput {
    fn first_url(self) -> Option<String> {
        match self {
            PredictionOutput::Single(url) => Some(url),
            PredictionOutput::Many(urls) => urls.into_iter().next(),
        }
        .filter(|url| is_result_url(url))
    }
}

#[derive(Debug, Deserialize)]
struct Prediction {
    id: String,
    status: PredictionStatus,
    #[serde(default)]
    output: Option<PredictionOutput>,
    #[serde(default)]
    error: Option<Value>,
    #[serde(default)]
    logs: Option<String>,
    #[serde(default)]
    metrics: Option<PredictionMetrics>,
}

#[derive(Debug, Deserialize)]
struct PredictionMetrics {
    predict_time: Option<f64>,
}

pub struct ReplicateProvider {
    http_client: reqwest::Client,
    api_base_url: String,
    text_to_image_model: String,
    image_to_video_model: String,
}

impl Debug for ReplicateProvider {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("ReplicateProvider")
            .field("api_base_url", &self.api_base_url)
            .finish()
    }
}

impl ReplicateProvider {
    pub fn new(settings: &VendorSettings) -> VendorResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| VendorError::Transport(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            api_base_url: settings.replicate_api_base_url.trim_end_matches('/').to_string(),
            text_to_image_model: settings.replicate_text_to_image_model.clone(),
            image_to_video_model: settings.replicate_image_to_video_model.clone(),
        })
    }

    fn model_for(&self, kind: GenerationKind) -> VendorResult<&str> {
        match kind {
            GenerationKind::TextToImage => Ok(&self.text_to_image_model),
            GenerationKind::ImageToVideo => Ok(&self.image_to_video_model),
            other => Err(VendorError::InvalidRequest(format!(
                "No Replicate model for {}",
                other
            ))),
        }
    }

    fn build_input(context: &GenerationContext) -> Value {
        let request = &context.request;
        let mut fields = Map::new();
        fields.insert("prompt".into(), json!(request.prompt));
        if request.kind == GenerationKind::ImageToVideo {
            fields.insert("image".into(), json!(request.input_url));
        }
        merge_input(&request.params, fields)
    }

    async fn create_prediction(
        &self,
        api_token: &str,
        model: &str,
        input: Value,
    ) -> VendorResult<Prediction> {
        let url = format!("{}/models/{}/predictions", self.api_base_url, model);
        let response = self
            .http_client
            .post(&url)
            .header("Authorization", format!("Bearer {}", api_token))
            .json(&json!({ "input": input }))
            .send()
            .await?;
        Ok(error_for_status(response).await?.json().await?)
    }

    async fn get_prediction(&self, api_token: &str, id: &str) -> VendorResult<Prediction> {
        let url = format!("{}/predictions/{}", self.api_base_url, id);
        let response = self
            .http_client
            .get(&url)
            .header("Authorization", format!("Bearer {}", api_token))
            .send()
            .await?;
        Ok(error_for_status(response).await?.json().await?)
    }

    /// Fold one prediction snapshot into a poll step.
    fn settle(prediction: Prediction, logs: &LogSink) -> VendorResult<PollStep<Prediction>> {
        if let Some(text) = prediction.logs.as_deref() {
            logs.sync_vendor_log(text.lines().map(str::to_string));
        }

        match prediction.status {
            PredictionStatus::Succeeded => Ok(PollStep::Done(prediction)),
            PredictionStatus::Failed => {
                let message = match prediction.error {
                    Some(Value::String(s)) => s,
                    Some(other) => other.to_string(),
                    None => "Prediction failed".to_string(),
                };
                Err(VendorError::Failed(message))
            }
            PredictionStatus::Canceled => Err(VendorError::Failed(
                "Prediction was canceled on Replicate".to_string(),
            )),
            PredictionStatus::Starting | PredictionStatus::Processing => Ok(PollStep::Pending),
            PredictionStatus::Unknown => {
                tracing::warn!(prediction_id = %prediction.id, "Unknown prediction status");
                Ok(PollStep::Pending)
            }
        }
    }

    async fn cancel_prediction(&self, api_token: &str, id: &str) {
        let url = format!("{}/predictions/{}/cancel", self.api_base_url, id);
        let result = self
            .http_client
            .post(&url)
            .header("Authorization", format!("Bearer {}", api_token))
            .send()
            .await;
        if let Err(e) = result {
            tracing::warn!(error = %e, prediction_id = %id, "Failed to cancel prediction");
        }
    }
}

#[async_trait]
impl GenerationProvider for ReplicateProvider {
    fn name(&self) -> &str {
        "replicate"
    }

    fn vendor(&self) -> Vendor {
        Vendor::Replicate
    }

    fn supported_kinds(&self) -> &[GenerationKind] {
        &SUPPORTED_KINDS
    }

    async fn generate(&self, context: GenerationContext) -> VendorResult<GenerationOutput> {
        check_request(self, &context.request)?;
        self.validate_credentials(&context.credentials)?;

        let kind = context.request.kind;
        let api_token = context.credentials.api_key();
        let model = self.model_for(kind)?;
        let input = Self::build_input(&context);

        let created = tokio::select! {
            biased;
            _ = context.cancel.cancelled() => return Err(VendorError::Cancelled),
            created = self.create_prediction(api_token, model, input) => created?,
        };

        let prediction_id = created.id.clone();
        tracing::info!(model = %model, prediction_id = %prediction_id, "Created Replicate prediction");
        context
            .logs
            .push(format!("Submitted to Replicate ({}), prediction {}", model, prediction_id));

        // The create call may already carry a settled prediction
        let finished = match Self::settle(created, &context.logs)? {
            PollStep::Done(prediction) => Ok(prediction),
            PollStep::Pending => {
                let id = prediction_id.as_str();
                let logs = &context.logs;
                poll_until(&context.poll, &context.cancel, || async move {
                    let prediction = self.get_prediction(api_token, id).await?;
                    Self::settle(prediction, logs)
                })
                .await
            }
        };

        let prediction = match finished {
            Ok(prediction) => prediction,
            Err(err) => {
                if matches!(err, VendorError::Cancelled | VendorError::Timeout { .. }) {
                    self.cancel_prediction(api_token, &prediction_id).await;
                }
                return Err(err);
            }
        };

        let url = prediction
            .output
            .and_then(PredictionOutput::first_url)
            .ok_or(VendorError::NoResult)?;
        let content_type = guess_content_type(&url, kind);
        let predict_time = prediction.metrics.and_then(|m| m.predict_time);
        context.logs.push("Replicate prediction succeeded");

        Ok(GenerationOutput {
            artifact: Artifact::Url { url, content_type },
            vendor_request_id: Some(prediction_id),
            metadata: json!({ "model": model, "predict_time": predict_time }),
        })
    }
}
