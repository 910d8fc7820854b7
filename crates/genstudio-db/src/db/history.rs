use genstudio_core::models::{ContentType, HistoryItem, NewHistoryItem};
use genstudio_core::AppError;
use sqlx::{PgExecutor, PgPool, Postgres};
use uuid::Uuid;

#[derive(Clone)]
pub struct HistoryRepository {
    pool: PgPool,
}

impl HistoryRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[tracing::instrument(skip(self), fields(db.table = "history_items", db.operation = "select", db.record_id = %id))]
    pub async fn get_for_user(
        &self,
        user_id: Uuid,
        id: Uuid,
    ) -> Result<Option<HistoryItem>, AppError> {
        sqlx::query_as::<Postgres, HistoryItem>(
            "SELECT * FROM history_items WHERE id = $1 AND user_id = $2",
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to get history item");
            AppError::Database(e)
        })
    }

    /// Newest first, optionally filtered by content type.
    #[tracing::instrument(skip(self), fields(db.table = "history_items", db.operation = "select"))]
    pub async fn list_for_user(
        &self,
        user_id: Uuid,
        content_type: Option<ContentType>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<HistoryItem>, AppError> {
        sqlx::query_as::<Postgres, HistoryItem>(
            r#"
            SELECT * FROM history_items
            WHERE user_id = $1 AND ($2::content_type IS NULL OR content_type = $2)
            ORDER BY created_at DESC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(user_id)
        .bind(content_type)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to list history");
            AppError::Database(e)
        })
    }

    /// Public gallery across all users.
    #[tracing::instrument(skip(self), fields(db.table = "history_items", db.operation = "select"))]
    pub async fn list_public(
        &self,
        content_type: Option<ContentType>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<HistoryItem>, AppError> {
        sqlx::query_as::<Postgres, HistoryItem>(
            r#"
            SELECT * FROM history_items
            WHERE is_public AND ($1::content_type IS NULL OR content_type = $1)
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(content_type)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to list gallery");
            AppError::Database(e)
        })
    }

    #[tracing::instrument(skip(self), fields(db.table = "history_items", db.operation = "update", db.record_id = %id))]
    pub async fn set_visibility(
        &self,
        user_id: Uuid,
        id: Uuid,
        is_public: bool,
    ) -> Result<Option<HistoryItem>, AppError> {
        sqlx::query_as::<Postgres, HistoryItem>(
            r#"
            UPDATE history_items SET is_public = $3
            WHERE id = $1 AND user_id = $2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(user_id)
        .bind(is_public)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to update history visibility");
            AppError::Database(e)
        })
    }

    /// Returns the deleted row so the caller can remove its stored file.
    #[tracing::instrument(skip(self), fields(db.table = "history_items", db.operation = "delete", db.record_id = %id))]
    pub async fn delete(&self, user_id: Uuid, id: Uuid) -> Result<Option<HistoryItem>, AppError> {
        sqlx::query_as::<Postgres, HistoryItem>(
            "DELETE FROM history_items WHERE id = $1 AND user_id = $2 RETURNING *",
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to delete history item");
            AppError::Database(e)
        })
    }
}

/// History rows are only created by [`GenerationJobRepository::succeed`],
/// inside the transaction that finishes the job.
///
/// [`GenerationJobRepository::succeed`]: super::job::GenerationJobRepository::succeed
#[tracing::instrument(skip(executor, item), fields(db.table = "history_items", db.operation = "insert"))]
pub(crate) async fn insert_item<'e, E>(
    executor: E,
    item: &NewHistoryItem,
) -> Result<HistoryItem, AppError>
where
    E: PgExecutor<'e>,
{
    if item.url.trim().is_empty() {
        return Err(AppError::InvalidInput(
            "History items require a result URL".to_string(),
        ));
    }

    let created = sqlx::query_as::<Postgres, HistoryItem>(
        r#"
        INSERT INTO history_items (user_id, content_type, url, storage_key, prompt, metadata, job_id)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING *
        "#,
    )
    .bind(item.user_id)
    .bind(item.content_type)
    .bind(&item.url)
    .bind(&item.storage_key)
    .bind(&item.prompt)
    .bind(&item.metadata)
    .bind(item.job_id)
    .fetch_one(executor)
    .await
    .map_err(|e| {
        tracing::error!(error = %e, "Failed to create history item");
        AppError::Database(e)
    })?;

    tracing::info!(
        history_id = %created.id,
        user_id = %created.user_id,
        content_type = %created.content_type,
        "History item created"
    );
    Ok(created)
}
