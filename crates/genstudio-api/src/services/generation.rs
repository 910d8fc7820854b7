//! Generation runner
//!
//! Owns the lifecycle of a generation job: credit reservation, the vendor
//! call on a background task, artifact storage, history, and release of the
//! reserved credit when the job does not succeed. Credit and credential
//! checks all happen here, before anything is sent to a vendor.

use crate::services::artifacts::ArtifactStore;
use genstudio_core::models::{
    CreateGenerationRequest, GenerationJob, JobStatus, NewGenerationJob, NewHistoryItem,
    UsageKind, Vendor,
};
use genstudio_core::AppError;
use genstudio_db::{JobStore, UsageStore, VendorKeyStore};
use genstudio_vendors::{
    Credentials, GenerationContext, GenerationOutput, GenerationProvider, GenerationRequest,
    LogSink, PollPolicy, ProviderRegistry, VendorError,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Persistence the runner depends on.
#[derive(Clone)]
pub struct RunnerStores {
    pub usage: Arc<dyn UsageStore>,
    pub jobs: Arc<dyn JobStore>,
    pub vendor_keys: Arc<dyn VendorKeyStore>,
}

#[derive(Debug, Clone, Default)]
pub struct RunnerSettings {
    /// Operator keys used when a user has not saved their own.
    pub server_keys: HashMap<Vendor, String>,
    pub poll: PollPolicy,
    pub default_image_limit: i32,
    pub default_video_limit: i32,
}

/// What a cancel request did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// The running task was signalled; it records the outcome itself.
    Signalled,
    /// No task owned the job here; it was marked cancelled directly.
    Cancelled,
}

struct ActiveJob {
    user_id: Uuid,
    cancel: CancellationToken,
    logs: LogSink,
}

struct RunnerInner {
    stores: RunnerStores,
    registry: ProviderRegistry,
    artifacts: ArtifactStore,
    settings: RunnerSettings,
    active: RwLock<HashMap<Uuid, ActiveJob>>,
}

#[derive(Clone)]
pub struct GenerationRunner {
    inner: Arc<RunnerInner>,
}

impl GenerationRunner {
    pub fn new(
        stores: RunnerStores,
        registry: ProviderRegistry,
        artifacts: ArtifactStore,
        settings: RunnerSettings,
    ) -> Self {
        Self {
            inner: Arc::new(RunnerInner {
                stores,
                registry,
                artifacts,
                settings,
                active: RwLock::new(HashMap::new()),
            }),
        }
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.inner.registry
    }

    pub fn artifacts(&self) -> &ArtifactStore {
        &self.inner.artifacts
    }

    /// Validate, reserve a credit and start the job in the background.
    /// Returns the queued job.
    #[tracing::instrument(skip(self, request), fields(user_id = %user_id, kind = %request.kind))]
    pub async fn submit(
        &self,
        user_id: Uuid,
        request: CreateGenerationRequest,
    ) -> Result<GenerationJob, AppError> {
        let provider = self
            .inner
            .registry
            .resolve(request.kind, request.provider.as_deref())
            .await
            .map_err(|e| e.into_app_error(request.provider.as_deref().unwrap_or("registry")))?;

        if request.kind.requires_input() && request.input_url.is_none() {
            return Err(AppError::InvalidInput(format!(
                "{} requires an input_url",
                request.kind
            )));
        }

        let credentials = self.credentials_for(user_id, provider.vendor()).await?;
        provider
            .validate_credentials(&credentials)
            .map_err(|e| e.into_app_error(provider.name()))?;

        let usage_kind = request.kind.usage_kind();
        if let Some(kind) = usage_kind {
            self.reserve_credit(user_id, kind).await?;
        }

        let new_job = NewGenerationJob {
            user_id,
            kind: request.kind,
            provider: provider.name().to_string(),
            prompt: request.prompt.clone(),
            input: serde_json::json!({
                "input_url": request.input_url,
                "params": request.params,
            }),
            usage_kind,
        };
        let job = match self.inner.stores.jobs.create(&new_job).await {
            Ok(job) => job,
            Err(e) => {
                if let Some(kind) = usage_kind {
                    self.release_credit(user_id, kind).await;
                }
                return Err(e);
            }
        };

        let cancel = CancellationToken::new();
        let logs = LogSink::new();
        logs.push(format!("Queued with {}", provider.name()));
        self.inner.active.write().await.insert(
            job.id,
            ActiveJob {
                user_id,
                cancel: cancel.clone(),
                logs: logs.clone(),
            },
        );

        let context = GenerationContext {
            request: GenerationRequest {
                kind: request.kind,
                prompt: request.prompt,
                input_url: request.input_url,
                params: request.params,
            },
            credentials,
            cancel,
            logs,
            poll: self.inner.settings.poll,
        };

        let runner = self.clone();
        let spawned = job.clone();
        tokio::spawn(async move {
            runner.run(spawned, provider, context).await;
        });

        Ok(job)
    }

    /// Cancel a job the caller owns. Terminal jobs are a conflict.
    #[tracing::instrument(skip(self, job), fields(user_id = %user_id, job_id = %job.id))]
    pub async fn cancel(
        &self,
        user_id: Uuid,
        job: &GenerationJob,
    ) -> Result<CancelOutcome, AppError> {
        if job.user_id != user_id {
            return Err(AppError::NotFound("Generation not found".to_string()));
        }
        if job.status.is_terminal() {
            return Err(AppError::Conflict(format!(
                "Generation is already {}",
                job.status
            )));
        }

        {
            let active = self.inner.active.read().await;
            if let Some(entry) = active.get(&job.id) {
                if entry.user_id == user_id {
                    entry.logs.push("Cancellation requested");
                    entry.cancel.cancel();
                    tracing::info!("Cancellation signalled");
                    return Ok(CancelOutcome::Signalled);
                }
            }
        }

        // No task here owns it (e.g. it was started by another process).
        let finished = self
            .inner
            .stores
            .jobs
            .finish(
                job.id,
                JobStatus::Cancelled,
                &job.logs,
                None,
                Some("Cancelled by user"),
                None,
            )
            .await?;
        if !finished {
            return Err(AppError::Conflict(
                "Generation finished before it could be cancelled".to_string(),
            ));
        }
        if let Some(kind) = job.usage_kind {
            self.release_credit(user_id, kind).await;
        }
        Ok(CancelOutcome::Cancelled)
    }

    /// Progress lines of a job running in this process.
    pub async fn live_logs(&self, job_id: Uuid) -> Option<Vec<String>> {
        self.inner
            .active
            .read()
            .await
            .get(&job_id)
            .map(|entry| entry.logs.snapshot())
    }

    pub async fn active_count(&self) -> usize {
        self.inner.active.read().await.len()
    }

    /// Cancel everything in flight and wait up to `grace` for the tasks to
    /// record their outcome.
    pub async fn shutdown(&self, grace: Duration) {
        let count = {
            let active = self.inner.active.read().await;
            for entry in active.values() {
                entry.cancel.cancel();
            }
            active.len()
        };
        if count == 0 {
            return;
        }

        tracing::info!(count, "Cancelling in-flight generations");
        let deadline = tokio::time::Instant::now() + grace;
        while self.active_count().await > 0 && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        let remaining = self.active_count().await;
        if remaining > 0 {
            tracing::warn!(remaining, "Generations still running at shutdown");
        }
    }

    async fn credentials_for(&self, user_id: Uuid, vendor: Vendor) -> Result<Credentials, AppError> {
        match self.inner.stores.vendor_keys.get(user_id, vendor).await {
            Ok(Some(key)) => return Ok(Credentials::new(key)),
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(error = %e, vendor = %vendor, "Saved vendor key unusable, trying server key");
            }
        }

        self.inner
            .settings
            .server_keys
            .get(&vendor)
            .map(|key| Credentials::new(key.clone()))
            .ok_or_else(|| AppError::VendorNotConfigured {
                vendor: vendor.to_string(),
                message: "No API key saved and no server key configured".to_string(),
            })
    }

    async fn reserve_credit(&self, user_id: Uuid, kind: UsageKind) -> Result<(), AppError> {
        let usage = &self.inner.stores.usage;
        usage
            .ensure_defaults(
                user_id,
                self.inner.settings.default_image_limit,
                self.inner.settings.default_video_limit,
            )
            .await?;

        if usage.try_consume(user_id, kind).await?.is_some() {
            return Ok(());
        }

        let (used, limit) = usage
            .get(user_id, kind)
            .await?
            .map(|c| (c.used, c.credit_limit))
            .unwrap_or_default();
        tracing::info!(user_id = %user_id, kind = %kind, used, limit, "Credit limit reached");
        Err(AppError::UsageLimitExceeded {
            resource: kind.to_string(),
            used: i64::from(used),
            limit: i64::from(limit),
        })
    }

    async fn release_credit(&self, user_id: Uuid, kind: UsageKind) {
        if let Err(e) = self.inner.stores.usage.release(user_id, kind).await {
            tracing::error!(error = %e, user_id = %user_id, kind = %kind, "Failed to release reserved credit");
        }
    }

    #[tracing::instrument(skip_all, fields(job_id = %job.id, provider = %provider.name()))]
    async fn run(
        &self,
        job: GenerationJob,
        provider: Arc<dyn GenerationProvider>,
        context: GenerationContext,
    ) {
        let logs = context.logs.clone();
        let cancel = context.cancel.clone();

        if let Err(e) = self.inner.stores.jobs.mark_running(job.id).await {
            tracing::warn!(error = %e, "Failed to mark job running");
        }

        let outcome = if cancel.is_cancelled() {
            Err(VendorError::Cancelled)
        } else {
            logs.push("Sent to vendor");
            provider.generate(context).await
        };

        let result = match outcome {
            Ok(output) => self.complete(&job, provider.as_ref(), output, &logs).await,
            Err(err) => {
                let status = status_for(&err);
                let message = err.to_string();
                self.fail(&job, status, &message, &logs).await
            }
        };
        if let Err(e) = result {
            tracing::error!(error = %e, "Failed to record generation outcome");
        }

        self.inner.active.write().await.remove(&job.id);
    }

    async fn complete(
        &self,
        job: &GenerationJob,
        provider: &dyn GenerationProvider,
        output: GenerationOutput,
        logs: &LogSink,
    ) -> Result<(), AppError> {
        let stored = match self
            .inner
            .artifacts
            .store(job.user_id, job.id, job.kind, output.artifact)
            .await
        {
            Ok(stored) => stored,
            Err(e) => {
                let message = format!("Could not store result: {}", e);
                return self.fail(job, JobStatus::Failed, &message, logs).await;
            }
        };

        let mut metadata = serde_json::json!({
            "kind": job.kind,
            "provider": provider.name(),
            "vendor": provider.vendor(),
            "vendor_request_id": output.vendor_request_id,
        });
        if let (Some(target), serde_json::Value::Object(extra)) =
            (metadata.as_object_mut(), output.metadata)
        {
            for (key, value) in extra {
                target.entry(key).or_insert(value);
            }
        }

        let item = NewHistoryItem {
            user_id: job.user_id,
            content_type: job.kind.content_type(),
            url: stored.url.clone(),
            storage_key: stored.storage_key.clone(),
            prompt: Some(job.prompt.clone()),
            metadata,
            job_id: Some(job.id),
        };

        let mut lines = logs.snapshot();
        lines.push("Completed".to_string());

        // The history row and the succeeded status are written together, so
        // a job cancelled or abandoned meanwhile never gains a history item.
        match self.inner.stores.jobs.succeed(job.id, &lines, &item).await {
            Ok(Some(created)) => {
                logs.push("Completed");
                tracing::info!(history_id = %created.id, "Generation succeeded");
                Ok(())
            }
            Ok(None) => {
                tracing::warn!("Job was finished elsewhere, dropping its result");
                if let Some(key) = &stored.storage_key {
                    self.inner.artifacts.discard(key).await;
                }
                Ok(())
            }
            Err(e) => {
                if let Some(key) = &stored.storage_key {
                    self.inner.artifacts.discard(key).await;
                }
                let message = format!("Could not record result: {}", e);
                self.fail(job, JobStatus::Failed, &message, logs).await
            }
        }
    }

    async fn fail(
        &self,
        job: &GenerationJob,
        status: JobStatus,
        message: &str,
        logs: &LogSink,
    ) -> Result<(), AppError> {
        logs.push(message);
        let finished = self
            .inner
            .stores
            .jobs
            .finish(job.id, status, &logs.snapshot(), None, Some(message), None)
            .await?;

        // Only the call that finished the job gives the credit back.
        if finished {
            if let Some(kind) = job.usage_kind {
                self.release_credit(job.user_id, kind).await;
            }
        }
        tracing::info!(status = %status, error = %message, "Generation did not succeed");
        Ok(())
    }
}

fn status_for(err: &VendorError) -> JobStatus {
    match err {
        VendorError::Cancelled => JobStatus::Cancelled,
        VendorError::Timeout { .. } => JobStatus::TimedOut,
        _ => JobStatus::Failed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bytes::Bytes;
    use chrono::Utc;
    use genstudio_core::models::{GenerationKind, HistoryItem, UsageCounter};
    use genstudio_storage::LocalStorage;
    use genstudio_vendors::{Artifact, VendorResult};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;
    use tokio::sync::Notify;

    #[derive(Default)]
    struct MemoryUsage {
        counters: Mutex<HashMap<(Uuid, UsageKind), UsageCounter>>,
    }

    impl MemoryUsage {
        fn used(&self, user_id: Uuid, kind: UsageKind) -> i32 {
            self.counters
                .lock()
                .unwrap()
                .get(&(user_id, kind))
                .map(|c| c.used)
                .unwrap_or(0)
        }
    }

    #[async_trait]
    impl UsageStore for MemoryUsage {
        async fn ensure_defaults(
            &self,
            user_id: Uuid,
            image_limit: i32,
            video_limit: i32,
        ) -> Result<(), AppError> {
            let mut counters = self.counters.lock().unwrap();
            counters
                .entry((user_id, UsageKind::Image))
                .or_insert_with(|| UsageCounter::new(user_id, UsageKind::Image, image_limit));
            counters
                .entry((user_id, UsageKind::Video))
                .or_insert_with(|| UsageCounter::new(user_id, UsageKind::Video, video_limit));
            Ok(())
        }

        async fn get(
            &self,
            user_id: Uuid,
            kind: UsageKind,
        ) -> Result<Option<UsageCounter>, AppError> {
            Ok(self.counters.lock().unwrap().get(&(user_id, kind)).cloned())
        }

        async fn try_consume(
            &self,
            user_id: Uuid,
            kind: UsageKind,
        ) -> Result<Option<UsageCounter>, AppError> {
            let mut counters = self.counters.lock().unwrap();
            let Some(c) = counters.get_mut(&(user_id, kind)) else {
                return Ok(None);
            };
            Ok(c.try_increment().then(|| c.clone()))
        }

        async fn release(&self, user_id: Uuid, kind: UsageKind) -> Result<(), AppError> {
            if let Some(c) = self.counters.lock().unwrap().get_mut(&(user_id, kind)) {
                c.release();
            }
            Ok(())
        }
    }

    #[derive(Default)]
    struct MemoryJobs {
        jobs: Mutex<HashMap<Uuid, GenerationJob>>,
        history: Arc<MemoryHistory>,
    }

    impl MemoryJobs {
        fn get(&self, id: Uuid) -> GenerationJob {
            self.jobs.lock().unwrap().get(&id).cloned().expect("job")
        }

        fn insert_running(&self, user_id: Uuid, usage_kind: Option<UsageKind>) -> GenerationJob {
            let now = Utc::now();
            let job = GenerationJob {
                id: Uuid::new_v4(),
                user_id,
                kind: GenerationKind::TextToImage,
                provider: "mock".to_string(),
                status: JobStatus::Running,
                prompt: "a lighthouse".to_string(),
                input: serde_json::Value::Null,
                logs: vec![],
                result_url: None,
                error: None,
                history_id: None,
                usage_kind,
                created_at: now,
                updated_at: now,
                finished_at: None,
            };
            self.jobs.lock().unwrap().insert(job.id, job.clone());
            job
        }
    }

    #[async_trait]
    impl JobStore for MemoryJobs {
        async fn create(&self, job: &NewGenerationJob) -> Result<GenerationJob, AppError> {
            let now = Utc::now();
            let created = GenerationJob {
                id: Uuid::new_v4(),
                user_id: job.user_id,
                kind: job.kind,
                provider: job.provider.clone(),
                status: JobStatus::Queued,
                prompt: job.prompt.clone(),
                input: job.input.clone(),
                logs: vec![],
                result_url: None,
                error: None,
                history_id: None,
                usage_kind: job.usage_kind,
                created_at: now,
                updated_at: now,
                finished_at: None,
            };
            self.jobs.lock().unwrap().insert(created.id, created.clone());
            Ok(created)
        }

        async fn mark_running(&self, id: Uuid) -> Result<(), AppError> {
            if let Some(job) = self.jobs.lock().unwrap().get_mut(&id) {
                if job.status == JobStatus::Queued {
                    job.status = JobStatus::Running;
                }
            }
            Ok(())
        }

        async fn finish(
            &self,
            id: Uuid,
            status: JobStatus,
            logs: &[String],
            result_url: Option<&str>,
            error: Option<&str>,
            history_id: Option<Uuid>,
        ) -> Result<bool, AppError> {
            let mut jobs = self.jobs.lock().unwrap();
            let Some(job) = jobs.get_mut(&id) else {
                return Ok(false);
            };
            if job.status.is_terminal() {
                return Ok(false);
            }
            job.status = status;
            job.logs = logs.to_vec();
            job.result_url = result_url.map(String::from);
            job.error = error.map(String::from);
            job.history_id = history_id;
            job.finished_at = Some(Utc::now());
            Ok(true)
        }

        async fn succeed(
            &self,
            id: Uuid,
            logs: &[String],
            item: &NewHistoryItem,
        ) -> Result<Option<HistoryItem>, AppError> {
            let mut jobs = self.jobs.lock().unwrap();
            let Some(job) = jobs.get_mut(&id) else {
                return Ok(None);
            };
            if job.status.is_terminal() {
                return Ok(None);
            }
            let created = self.history.insert(item)?;
            job.status = JobStatus::Succeeded;
            job.logs = logs.to_vec();
            job.result_url = Some(item.url.clone());
            job.history_id = Some(created.id);
            job.finished_at = Some(Utc::now());
            Ok(Some(created))
        }
    }

    #[derive(Default)]
    struct MemoryHistory {
        items: Mutex<Vec<HistoryItem>>,
        unavailable: AtomicBool,
    }

    impl MemoryHistory {
        fn insert(&self, item: &NewHistoryItem) -> Result<HistoryItem, AppError> {
            if self.unavailable.load(Ordering::SeqCst) {
                return Err(AppError::Internal("history table unavailable".to_string()));
            }
            let created = HistoryItem {
                id: Uuid::new_v4(),
                user_id: item.user_id,
                content_type: item.content_type,
                url: item.url.clone(),
                storage_key: item.storage_key.clone(),
                prompt: item.prompt.clone(),
                is_public: false,
                metadata: item.metadata.clone(),
                job_id: item.job_id,
                created_at: Utc::now(),
            };
            self.items.lock().unwrap().push(created.clone());
            Ok(created)
        }
    }

    #[derive(Default)]
    struct MemoryKeys {
        keys: Mutex<HashMap<(Uuid, Vendor), String>>,
    }

    #[async_trait]
    impl VendorKeyStore for MemoryKeys {
        async fn get(&self, user_id: Uuid, vendor: Vendor) -> Result<Option<String>, AppError> {
            Ok(self.keys.lock().unwrap().get(&(user_id, vendor)).cloned())
        }
    }

    #[derive(Debug, Clone, Copy)]
    enum Behavior {
        HostedUrl,
        InlineAudio,
        Fail,
        WaitForCancel,
        TimeOut,
        /// Returns inline bytes once `gate` is opened.
        Gated,
    }

    #[derive(Debug)]
    struct ScriptedProvider {
        behavior: Behavior,
        kinds: Vec<GenerationKind>,
        seen_keys: Mutex<Vec<String>>,
        gate: Notify,
    }

    impl ScriptedProvider {
        fn new(behavior: Behavior) -> Arc<Self> {
            Arc::new(Self {
                behavior,
                kinds: GenerationKind::ALL.to_vec(),
                seen_keys: Mutex::new(vec![]),
                gate: Notify::new(),
            })
        }
    }

    #[async_trait]
    impl GenerationProvider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        fn vendor(&self) -> Vendor {
            Vendor::Fal
        }

        fn supported_kinds(&self) -> &[GenerationKind] {
            &self.kinds
        }

        async fn generate(&self, context: GenerationContext) -> VendorResult<GenerationOutput> {
            self.seen_keys
                .lock()
                .unwrap()
                .push(context.credentials.api_key().to_string());
            context.logs.push("vendor: working");

            match self.behavior {
                Behavior::HostedUrl => Ok(GenerationOutput {
                    artifact: Artifact::Url {
                        url: "https://cdn.vendor.test/out.png".to_string(),
                        content_type: "image/png".to_string(),
                    },
                    vendor_request_id: Some("req-1".to_string()),
                    metadata: serde_json::json!({ "seed": 42 }),
                }),
                Behavior::InlineAudio => Ok(GenerationOutput {
                    artifact: Artifact::Bytes {
                        data: Bytes::from_static(b"ID3"),
                        content_type: "audio/mpeg".to_string(),
                    },
                    vendor_request_id: None,
                    metadata: serde_json::Value::Null,
                }),
                Behavior::Fail => Err(VendorError::Failed("NSFW content detected".to_string())),
                Behavior::WaitForCancel => {
                    context.cancel.cancelled().await;
                    Err(VendorError::Cancelled)
                }
                Behavior::TimeOut => Err(VendorError::Timeout {
                    waited: Duration::from_secs(600),
                }),
                Behavior::Gated => {
                    self.gate.notified().await;
                    Ok(GenerationOutput {
                        artifact: Artifact::Bytes {
                            data: Bytes::from_static(b"\x89PNG"),
                            content_type: "image/png".to_string(),
                        },
                        vendor_request_id: None,
                        metadata: serde_json::Value::Null,
                    })
                }
            }
        }
    }

    struct Harness {
        runner: GenerationRunner,
        usage: Arc<MemoryUsage>,
        jobs: Arc<MemoryJobs>,
        history: Arc<MemoryHistory>,
        keys: Arc<MemoryKeys>,
        provider: Arc<ScriptedProvider>,
        dir: tempfile::TempDir,
    }

    async fn harness(behavior: Behavior, server_key: Option<&str>, image_limit: i32) -> Harness {
        let usage = Arc::new(MemoryUsage::default());
        let history = Arc::new(MemoryHistory::default());
        let jobs = Arc::new(MemoryJobs {
            jobs: Mutex::default(),
            history: history.clone(),
        });
        let keys = Arc::new(MemoryKeys::default());
        let provider = ScriptedProvider::new(behavior);

        let registry = ProviderRegistry::new();
        registry.register(provider.clone()).await;

        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path(), "http://localhost/files".to_string())
            .await
            .unwrap();
        let artifacts = ArtifactStore::new(
            Arc::new(storage),
            reqwest::Client::new(),
            false,
            1024 * 1024,
        );

        let mut server_keys = HashMap::new();
        if let Some(key) = server_key {
            server_keys.insert(Vendor::Fal, key.to_string());
        }

        let runner = GenerationRunner::new(
            RunnerStores {
                usage: usage.clone(),
                jobs: jobs.clone(),
                vendor_keys: keys.clone(),
            },
            registry,
            artifacts,
            RunnerSettings {
                server_keys,
                poll: PollPolicy::default(),
                default_image_limit: image_limit,
                default_video_limit: 1,
            },
        );

        Harness {
            runner,
            usage,
            jobs,
            history,
            keys,
            provider,
            dir,
        }
    }

    fn request(kind: GenerationKind) -> CreateGenerationRequest {
        CreateGenerationRequest {
            kind,
            prompt: "a lighthouse at dusk".to_string(),
            input_url: None,
            params: serde_json::Value::Null,
            provider: None,
        }
    }

    async fn wait_until_finished(h: &Harness, id: Uuid) -> GenerationJob {
        for _ in 0..400 {
            let job = h.jobs.get(id);
            if job.status.is_terminal() && h.runner.live_logs(id).await.is_none() {
                return job;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("job {} did not finish", id);
    }

    #[tokio::test]
    async fn test_successful_generation_records_history() {
        let h = harness(Behavior::HostedUrl, Some("server-key"), 2).await;
        let user = Uuid::new_v4();

        let job = h
            .runner
            .submit(user, request(GenerationKind::TextToImage))
            .await
            .unwrap();
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.provider, "scripted");

        let done = wait_until_finished(&h, job.id).await;
        assert_eq!(done.status, JobStatus::Succeeded);
        assert_eq!(
            done.result_url.as_deref(),
            Some("https://cdn.vendor.test/out.png")
        );
        assert!(done.logs.iter().any(|l| l == "vendor: working"));

        let items = h.history.items.lock().unwrap().clone();
        assert_eq!(items.len(), 1);
        assert_eq!(done.history_id, Some(items[0].id));
        assert_eq!(items[0].metadata["seed"], 42);
        assert_eq!(items[0].metadata["provider"], "scripted");
        assert_eq!(h.usage.used(user, UsageKind::Image), 1);
    }

    #[tokio::test]
    async fn test_limit_reached_rejects_before_vendor_call() {
        let h = harness(Behavior::HostedUrl, Some("server-key"), 1).await;
        let user = Uuid::new_v4();

        let first = h
            .runner
            .submit(user, request(GenerationKind::TextToImage))
            .await
            .unwrap();
        wait_until_finished(&h, first.id).await;

        let err = h
            .runner
            .submit(user, request(GenerationKind::TextToImage))
            .await
            .unwrap_err();
        match err {
            AppError::UsageLimitExceeded {
                resource,
                used,
                limit,
            } => {
                assert_eq!(resource, "image");
                assert_eq!((used, limit), (1, 1));
            }
            other => panic!("expected UsageLimitExceeded, got {:?}", other),
        }
        assert_eq!(h.jobs.jobs.lock().unwrap().len(), 1);
        assert_eq!(h.provider.seen_keys.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_vendor_failure_releases_credit() {
        let h = harness(Behavior::Fail, Some("server-key"), 1).await;
        let user = Uuid::new_v4();

        let job = h
            .runner
            .submit(user, request(GenerationKind::TextToImage))
            .await
            .unwrap();
        let done = wait_until_finished(&h, job.id).await;

        assert_eq!(done.status, JobStatus::Failed);
        assert!(done.error.unwrap().contains("NSFW"));
        assert_eq!(h.usage.used(user, UsageKind::Image), 0);
        assert!(h.history.items.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_timeout_marks_timed_out_and_releases() {
        let h = harness(Behavior::TimeOut, Some("server-key"), 1).await;
        let user = Uuid::new_v4();

        let job = h
            .runner
            .submit(user, request(GenerationKind::ImageToVideo).with_input())
            .await
            .unwrap();
        let done = wait_until_finished(&h, job.id).await;

        assert_eq!(done.status, JobStatus::TimedOut);
        assert_eq!(h.usage.used(user, UsageKind::Video), 0);
    }

    #[tokio::test]
    async fn test_cancel_running_job() {
        let h = harness(Behavior::WaitForCancel, Some("server-key"), 1).await;
        let user = Uuid::new_v4();

        let job = h
            .runner
            .submit(user, request(GenerationKind::TextToImage))
            .await
            .unwrap();
        assert_eq!(h.usage.used(user, UsageKind::Image), 1);

        let outcome = h.runner.cancel(user, &job).await.unwrap();
        assert_eq!(outcome, CancelOutcome::Signalled);

        let done = wait_until_finished(&h, job.id).await;
        assert_eq!(done.status, JobStatus::Cancelled);
        assert_eq!(h.usage.used(user, UsageKind::Image), 0);
        assert_eq!(h.runner.active_count().await, 0);
    }

    #[tokio::test]
    async fn test_cancel_orphaned_job_finishes_it() {
        let h = harness(Behavior::HostedUrl, Some("server-key"), 3).await;
        let user = Uuid::new_v4();
        h.usage.ensure_defaults(user, 3, 1).await.unwrap();
        h.usage.try_consume(user, UsageKind::Image).await.unwrap();
        let job = h.jobs.insert_running(user, Some(UsageKind::Image));

        let outcome = h.runner.cancel(user, &job).await.unwrap();
        assert_eq!(outcome, CancelOutcome::Cancelled);
        assert_eq!(h.jobs.get(job.id).status, JobStatus::Cancelled);
        assert_eq!(h.usage.used(user, UsageKind::Image), 0);
    }

    #[tokio::test]
    async fn test_cancel_finished_job_conflicts() {
        let h = harness(Behavior::HostedUrl, Some("server-key"), 3).await;
        let user = Uuid::new_v4();
        let job = h
            .runner
            .submit(user, request(GenerationKind::TextToImage))
            .await
            .unwrap();
        let done = wait_until_finished(&h, job.id).await;

        let err = h.runner.cancel(user, &done).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        let stranger = h.runner.cancel(Uuid::new_v4(), &done).await.unwrap_err();
        assert!(matches!(stranger, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_missing_credentials_consume_nothing() {
        let h = harness(Behavior::HostedUrl, None, 3).await;
        let user = Uuid::new_v4();

        let err = h
            .runner
            .submit(user, request(GenerationKind::TextToImage))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::VendorNotConfigured { .. }));
        assert_eq!(h.usage.used(user, UsageKind::Image), 0);
        assert!(h.jobs.jobs.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_user_key_preferred_over_server_key() {
        let h = harness(Behavior::HostedUrl, Some("server-key"), 3).await;
        let user = Uuid::new_v4();
        h.keys
            .keys
            .lock()
            .unwrap()
            .insert((user, Vendor::Fal), "user-key".to_string());

        let job = h
            .runner
            .submit(user, request(GenerationKind::TextToImage))
            .await
            .unwrap();
        wait_until_finished(&h, job.id).await;

        assert_eq!(
            h.provider.seen_keys.lock().unwrap().as_slice(),
            ["user-key".to_string()]
        );
    }

    #[tokio::test]
    async fn test_speech_is_unmetered_and_stored() {
        let h = harness(Behavior::InlineAudio, Some("server-key"), 0).await;
        let user = Uuid::new_v4();

        let job = h
            .runner
            .submit(user, request(GenerationKind::TextToSpeech))
            .await
            .unwrap();
        assert!(job.usage_kind.is_none());

        let done = wait_until_finished(&h, job.id).await;
        assert_eq!(done.status, JobStatus::Succeeded);

        let items = h.history.items.lock().unwrap().clone();
        let key = items[0].storage_key.clone().expect("stored");
        assert!(key.ends_with(".mp3"));
        assert!(items[0].url.starts_with("http://localhost/files/artifacts/"));
    }

    #[tokio::test]
    async fn test_transform_without_input_rejected() {
        let h = harness(Behavior::HostedUrl, Some("server-key"), 3).await;
        let err = h
            .runner
            .submit(Uuid::new_v4(), request(GenerationKind::VideoToVideo))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_unknown_provider_rejected() {
        let h = harness(Behavior::HostedUrl, Some("server-key"), 3).await;
        let mut req = request(GenerationKind::TextToImage);
        req.provider = Some("midjourney".to_string());

        let err = h.runner.submit(Uuid::new_v4(), req).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_shutdown_cancels_in_flight() {
        let h = harness(Behavior::WaitForCancel, Some("server-key"), 3).await;
        let user = Uuid::new_v4();
        let job = h
            .runner
            .submit(user, request(GenerationKind::TextToImage))
            .await
            .unwrap();

        h.runner.shutdown(Duration::from_secs(2)).await;

        assert_eq!(h.runner.active_count().await, 0);
        assert_eq!(h.jobs.get(job.id).status, JobStatus::Cancelled);
        assert_eq!(h.usage.used(user, UsageKind::Image), 0);
    }

    #[tokio::test]
    async fn test_result_dropped_when_job_finished_elsewhere() {
        let h = harness(Behavior::Gated, Some("server-key"), 2).await;
        let user = Uuid::new_v4();

        let job = h
            .runner
            .submit(user, request(GenerationKind::TextToImage))
            .await
            .unwrap();

        // Another process cancels the job while the vendor is still working.
        assert!(h
            .jobs
            .finish(job.id, JobStatus::Cancelled, &[], None, Some("Cancelled by user"), None)
            .await
            .unwrap());
        h.usage.release(user, UsageKind::Image).await.unwrap();
        h.provider.gate.notify_one();

        let done = wait_until_finished(&h, job.id).await;
        assert_eq!(done.status, JobStatus::Cancelled);
        assert!(done.history_id.is_none());
        assert!(h.history.items.lock().unwrap().is_empty());
        assert_eq!(h.usage.used(user, UsageKind::Image), 0);

        let artifact = h
            .dir
            .path()
            .join(format!("artifacts/{}/{}.png", user, job.id));
        assert!(!artifact.exists());
    }

    #[tokio::test]
    async fn test_history_failure_fails_job_and_releases_credit() {
        let h = harness(Behavior::HostedUrl, Some("server-key"), 2).await;
        h.history.unavailable.store(true, Ordering::SeqCst);
        let user = Uuid::new_v4();

        let job = h
            .runner
            .submit(user, request(GenerationKind::TextToImage))
            .await
            .unwrap();
        let done = wait_until_finished(&h, job.id).await;

        assert_eq!(done.status, JobStatus::Failed);
        assert!(done.error.unwrap().contains("Could not record result"));
        assert!(done.history_id.is_none());
        assert_eq!(h.usage.used(user, UsageKind::Image), 0);
        assert_eq!(h.runner.active_count().await, 0);
    }

    trait WithInput {
        fn with_input(self) -> Self;
    }

    impl WithInput for CreateGenerationRequest {
        fn with_input(mut self) -> Self {
            self.input_url = Some("https://cdn.example.com/in.png".to_string());
            self
        }
    }
}
