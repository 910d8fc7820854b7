use super::history::insert_item;
use genstudio_core::models::{
    GenerationJob, HistoryItem, JobStatus, NewGenerationJob, NewHistoryItem,
};
use genstudio_core::AppError;
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

#[derive(Clone)]
pub struct GenerationJobRepository {
    pool: PgPool,
}

impl GenerationJobRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[tracing::instrument(skip(self, job), fields(db.table = "generation_jobs", db.operation = "insert"))]
    pub async fn create(&self, job: &NewGenerationJob) -> Result<GenerationJob, AppError> {
        let created = sqlx::query_as::<Postgres, GenerationJob>(
            r#"
            INSERT INTO generation_jobs (user_id, kind, provider, prompt, input, usage_kind)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(job.user_id)
        .bind(job.kind)
        .bind(&job.provider)
        .bind(&job.prompt)
        .bind(&job.input)
        .bind(job.usage_kind)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to create generation job");
            AppError::Database(e)
        })?;

        tracing::info!(
            job_id = %created.id,
            user_id = %created.user_id,
            kind = %created.kind,
            provider = %created.provider,
            "Generation job created"
        );
        Ok(created)
    }

    #[tracing::instrument(skip(self), fields(db.table = "generation_jobs", db.operation = "select", db.record_id = %id))]
    pub async fn get_for_user(
        &self,
        user_id: Uuid,
        id: Uuid,
    ) -> Result<Option<GenerationJob>, AppError> {
        sqlx::query_as::<Postgres, GenerationJob>(
            "SELECT * FROM generation_jobs WHERE id = $1 AND user_id = $2",
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to get generation job");
            AppError::Database(e)
        })
    }

    #[tracing::instrument(skip(self), fields(db.table = "generation_jobs", db.operation = "select"))]
    pub async fn list_for_user(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<GenerationJob>, AppError> {
        sqlx::query_as::<Postgres, GenerationJob>(
            r#"
            SELECT * FROM generation_jobs
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to list generation jobs");
            AppError::Database(e)
        })
    }

    #[tracing::instrument(skip(self), fields(db.table = "generation_jobs", db.operation = "update", db.record_id = %id))]
    pub async fn mark_running(&self, id: Uuid) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE generation_jobs SET status = 'running', updated_at = NOW()
            WHERE id = $1 AND status = 'queued'
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(AppError::Database)?;
        Ok(())
    }

    /// Write a terminal outcome. Jobs already in a terminal state are left as is;
    /// returns whether this call finished the job.
    #[tracing::instrument(skip(self, logs, result_url, error), fields(db.table = "generation_jobs", db.operation = "update", db.record_id = %id))]
    pub async fn finish(
        &self,
        id: Uuid,
        status: JobStatus,
        logs: &[String],
        result_url: Option<&str>,
        error: Option<&str>,
        history_id: Option<Uuid>,
    ) -> Result<bool, AppError> {
        if !status.is_terminal() {
            return Err(AppError::Internal(format!(
                "Cannot finish job with non-terminal status {}",
                status
            )));
        }

        let result = sqlx::query(
            r#"
            UPDATE generation_jobs
            SET status = $2, logs = $3, result_url = $4, error = $5, history_id = $6,
                updated_at = NOW(), finished_at = NOW()
            WHERE id = $1 AND status IN ('queued', 'running')
            "#,
        )
        .bind(id)
        .bind(status)
        .bind(logs)
        .bind(result_url)
        .bind(error)
        .bind(history_id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to finish generation job");
            AppError::Database(e)
        })?;

        let finished = result.rows_affected() > 0;
        if finished {
            tracing::info!(job_id = %id, status = %status, "Generation job finished");
        }
        Ok(finished)
    }

    /// Mark a job succeeded and create its history item in one transaction.
    /// Returns `None`, writing nothing, when the job was already finished
    /// (cancelled or abandoned) by someone else.
    #[tracing::instrument(skip(self, logs, item), fields(db.table = "generation_jobs", db.operation = "update", db.record_id = %id))]
    pub async fn succeed(
        &self,
        id: Uuid,
        logs: &[String],
        item: &NewHistoryItem,
    ) -> Result<Option<HistoryItem>, AppError> {
        let mut tx = self.pool.begin().await.map_err(AppError::Database)?;

        let status = sqlx::query_scalar::<Postgres, JobStatus>(
            "SELECT status FROM generation_jobs WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to lock generation job");
            AppError::Database(e)
        })?;

        match status {
            Some(status) if !status.is_terminal() => {}
            _ => {
                tx.rollback().await.map_err(AppError::Database)?;
                return Ok(None);
            }
        }

        let created = insert_item(&mut *tx, item).await?;

        sqlx::query(
            r#"
            UPDATE generation_jobs
            SET status = 'succeeded', logs = $2, result_url = $3, error = NULL,
                history_id = $4, updated_at = NOW(), finished_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(logs)
        .bind(&item.url)
        .bind(created.id)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to mark generation job succeeded");
            AppError::Database(e)
        })?;

        tx.commit().await.map_err(AppError::Database)?;
        tracing::info!(job_id = %id, history_id = %created.id, "Generation job succeeded");
        Ok(Some(created))
    }

    /// Fail every job still queued or running. Called at startup: their
    /// runner tasks died with the previous process. Returns the failed jobs
    /// so reserved credits can be released.
    #[tracing::instrument(skip(self), fields(db.table = "generation_jobs", db.operation = "update"))]
    pub async fn abandon_unfinished(&self, reason: &str) -> Result<Vec<GenerationJob>, AppError> {
        let jobs = sqlx::query_as::<Postgres, GenerationJob>(
            r#"
            UPDATE generation_jobs
            SET status = 'failed', error = $1, updated_at = NOW(), finished_at = NOW()
            WHERE status IN ('queued', 'running')
            RETURNING *
            "#,
        )
        .bind(reason)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to abandon unfinished jobs");
            AppError::Database(e)
        })?;

        if !jobs.is_empty() {
            tracing::warn!(count = jobs.len(), "Abandoned unfinished generation jobs");
        }
        Ok(jobs)
    }
}
