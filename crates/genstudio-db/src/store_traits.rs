//! Narrow repository interfaces used by the generation runner.
//!
//! The runner only needs a handful of operations; expressing them as traits
//! lets it run against in-memory stores in tests.

use async_trait::async_trait;
use genstudio_core::models::{
    GenerationJob, HistoryItem, JobStatus, NewGenerationJob, NewHistoryItem, UsageCounter,
    UsageKind, Vendor,
};
use genstudio_core::AppError;
use uuid::Uuid;

use crate::db::{GenerationJobRepository, UsageRepository, VendorKeyRepository};

#[async_trait]
pub trait UsageStore: Send + Sync {
    async fn ensure_defaults(
        &self,
        user_id: Uuid,
        image_limit: i32,
        video_limit: i32,
    ) -> Result<(), AppError>;

    async fn get(&self, user_id: Uuid, kind: UsageKind)
        -> Result<Option<UsageCounter>, AppError>;

    async fn try_consume(
        &self,
        user_id: Uuid,
        kind: UsageKind,
    ) -> Result<Option<UsageCounter>, AppError>;

    async fn release(&self, user_id: Uuid, kind: UsageKind) -> Result<(), AppError>;
}

#[async_trait]
pub trait JobStore: Send + Sync {
    async fn create(&self, job: &NewGenerationJob) -> Result<GenerationJob, AppError>;

    async fn mark_running(&self, id: Uuid) -> Result<(), AppError>;

    async fn finish(
        &self,
        id: Uuid,
        status: JobStatus,
        logs: &[String],
        result_url: Option<&str>,
        error: Option<&str>,
        history_id: Option<Uuid>,
    ) -> Result<bool, AppError>;

    /// Finish as succeeded together with the history item; `None` when the
    /// job was already terminal.
    async fn succeed(
        &self,
        id: Uuid,
        logs: &[String],
        item: &NewHistoryItem,
    ) -> Result<Option<HistoryItem>, AppError>;
}

#[async_trait]
pub trait VendorKeyStore: Send + Sync {
    async fn get(&self, user_id: Uuid, vendor: Vendor) -> Result<Option<String>, AppError>;
}

#[async_trait]
impl UsageStore for UsageRepository {
    async fn ensure_defaults(
        &self,
        user_id: Uuid,
        image_limit: i32,
        video_limit: i32,
    ) -> Result<(), AppError> {
        UsageRepository::ensure_defaults(self, user_id, image_limit, video_limit).await
    }

    async fn get(
        &self,
        user_id: Uuid,
        kind: UsageKind,
    ) -> Result<Option<UsageCounter>, AppError> {
        UsageRepository::get(self, user_id, kind).await
    }

    async fn try_consume(
        &self,
        user_id: Uuid,
        kind: UsageKind,
    ) -> Result<Option<UsageCounter>, AppError> {
        UsageRepository::try_consume(self, user_id, kind).await
    }

    async fn release(&self, user_id: Uuid, kind: UsageKind) -> Result<(), AppError> {
        UsageRepository::release(self, user_id, kind).await
    }
}

#[async_trait]
impl JobStore for GenerationJobRepository {
    async fn create(&self, job: &NewGenerationJob) -> Result<GenerationJob, AppError> {
        GenerationJobRepository::create(self, job).await
    }

    async fn mark_running(&self, id: Uuid) -> Result<(), AppError> {
        GenerationJobRepository::mark_running(self, id).await
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
        GenerationJobRepository::finish(self, id, status, logs, result_url, error, history_id)
            .await
    }

    async fn succeed(
        &self,
        id: Uuid,
        logs: &[String],
        item: &NewHistoryItem,
    ) -> Result<Option<HistoryItem>, AppError> {
        GenerationJobRepository::succeed(self, id, logs, item).await
    }
}

#[async_trait]
impl VendorKeyStore for VendorKeyRepository {
    async fn get(&self, user_id: Uuid, vendor: Vendor) -> Result<Option<String>, AppError> {
        VendorKeyRepository::get(self, user_id, vendor).await
    }
}
