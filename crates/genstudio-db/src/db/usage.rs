use genstudio_core::models::{UsageCounter, UsageKind};
use genstudio_core::AppError;
use sqlx::{PgConnection, PgPool, Postgres};
use uuid::Uuid;

/// Credit counters. Every mutation is a single guarded statement so concurrent
/// requests cannot consume past `credit_limit` or push `used` below zero.
#[derive(Clone)]
pub struct UsageRepository {
    pool: PgPool,
}

impl UsageRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create missing counters with the given limits; existing rows are untouched.
    #[tracing::instrument(skip(self), fields(db.table = "usage_counters", db.operation = "insert"))]
    pub async fn ensure_defaults(
        &self,
        user_id: Uuid,
        image_limit: i32,
        video_limit: i32,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO usage_counters (user_id, kind, used, credit_limit)
            VALUES ($1, 'image', 0, $2), ($1, 'video', 0, $3)
            ON CONFLICT (user_id, kind) DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(image_limit.max(0))
        .bind(video_limit.max(0))
        .execute(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to create usage counters");
            AppError::Database(e)
        })?;
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(db.table = "usage_counters", db.operation = "select"))]
    pub async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<UsageCounter>, AppError> {
        sqlx::query_as::<Postgres, UsageCounter>(
            "SELECT * FROM usage_counters WHERE user_id = $1 ORDER BY kind",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to list usage counters");
            AppError::Database(e)
        })
    }

    #[tracing::instrument(skip(self), fields(db.table = "usage_counters", db.operation = "select"))]
    pub async fn get(
        &self,
        user_id: Uuid,
        kind: UsageKind,
    ) -> Result<Option<UsageCounter>, AppError> {
        sqlx::query_as::<Postgres, UsageCounter>(
            "SELECT * FROM usage_counters WHERE user_id = $1 AND kind = $2",
        )
        .bind(user_id)
        .bind(kind)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)
    }

    /// Consume one credit. `None` means the limit is reached (or no counter exists).
    #[tracing::instrument(skip(self), fields(db.table = "usage_counters", db.operation = "update"))]
    pub async fn try_consume(
        &self,
        user_id: Uuid,
        kind: UsageKind,
    ) -> Result<Option<UsageCounter>, AppError> {
        sqlx::query_as::<Postgres, UsageCounter>(
            r#"
            UPDATE usage_counters
            SET used = used + 1, updated_at = NOW()
            WHERE user_id = $1 AND kind = $2 AND used < credit_limit
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(kind)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to consume credit");
            AppError::Database(e)
        })
    }

    /// Return one credit, saturating at zero.
    #[tracing::instrument(skip(self), fields(db.table = "usage_counters", db.operation = "update"))]
    pub async fn release(&self, user_id: Uuid, kind: UsageKind) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE usage_counters
            SET used = GREATEST(used - 1, 0), updated_at = NOW()
            WHERE user_id = $1 AND kind = $2
            "#,
        )
        .bind(user_id)
        .bind(kind)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to release credit");
            AppError::Database(e)
        })?;
        Ok(())
    }

    /// Admin override of a limit. `used` is kept even when it exceeds the new
    /// limit; consumption stays blocked until usage is back under it.
    #[tracing::instrument(skip(self), fields(db.table = "usage_counters", db.operation = "upsert"))]
    pub async fn set_limit(
        &self,
        user_id: Uuid,
        kind: UsageKind,
        limit: i32,
    ) -> Result<UsageCounter, AppError> {
        if limit < 0 {
            return Err(AppError::InvalidInput(
                "Credit limit must not be negative".to_string(),
            ));
        }

        let counter = sqlx::query_as::<Postgres, UsageCounter>(
            r#"
            INSERT INTO usage_counters (user_id, kind, used, credit_limit)
            VALUES ($1, $2, 0, $3)
            ON CONFLICT (user_id, kind) DO UPDATE
            SET credit_limit = EXCLUDED.credit_limit,
                updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(kind)
        .bind(limit)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to set credit limit");
            AppError::Database(e)
        })?;

        tracing::info!(user_id = %user_id, kind = %kind, limit, "Credit limit updated");
        Ok(counter)
    }

    /// Add credits inside the caller's transaction (payment approval).
    pub async fn grant_in_tx(
        conn: &mut PgConnection,
        user_id: Uuid,
        kind: UsageKind,
        credits: i32,
    ) -> Result<(), AppError> {
        if credits <= 0 {
            return Ok(());
        }

        sqlx::query(
            r#"
            INSERT INTO usage_counters (user_id, kind, used, credit_limit)
            VALUES ($1, $2, 0, $3)
            ON CONFLICT (user_id, kind) DO UPDATE
            SET credit_limit = usage_counters.credit_limit + EXCLUDED.credit_limit,
                updated_at = NOW()
            "#,
        )
        .bind(user_id)
        .bind(kind)
        .bind(credits)
        .execute(conn)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to grant credits");
            AppError::Database(e)
        })?;
        Ok(())
    }
}
