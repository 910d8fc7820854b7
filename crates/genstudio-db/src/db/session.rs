use chrono::{DateTime, Utc};
use genstudio_core::models::Session;
use genstudio_core::AppError;
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

#[derive(Clone)]
pub struct SessionRepository {
    pool: PgPool,
}

impl SessionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// `id` doubles as the token's `jti`.
    #[tracing::instrument(skip(self), fields(db.table = "sessions", db.operation = "insert"))]
    pub async fn create_session(
        &self,
        id: Uuid,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> Result<Session, AppError> {
        sqlx::query_as::<Postgres, Session>(
            r#"
            INSERT INTO sessions (id, user_id, expires_at)
            VALUES ($1, $2, $3)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(user_id)
        .bind(expires_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to create session");
            AppError::Database(e)
        })
    }

    /// Only sessions that are neither revoked nor expired.
    #[tracing::instrument(skip(self), fields(db.table = "sessions", db.operation = "select", db.record_id = %id))]
    pub async fn get_active(&self, id: Uuid) -> Result<Option<Session>, AppError> {
        sqlx::query_as::<Postgres, Session>(
            r#"
            SELECT * FROM sessions
            WHERE id = $1 AND revoked_at IS NULL AND expires_at > NOW()
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to get session");
            AppError::Database(e)
        })
    }

    /// Returns false when the session was already revoked.
    #[tracing::instrument(skip(self), fields(db.table = "sessions", db.operation = "update", db.record_id = %id))]
    pub async fn revoke(&self, id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query(
            "UPDATE sessions SET revoked_at = NOW() WHERE id = $1 AND revoked_at IS NULL",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to revoke session");
            AppError::Database(e)
        })?;

        Ok(result.rows_affected() > 0)
    }

    /// Sign a user out everywhere (used when an admin deactivates them).
    #[tracing::instrument(skip(self), fields(db.table = "sessions", db.operation = "update"))]
    pub async fn revoke_all_for_user(&self, user_id: Uuid) -> Result<u64, AppError> {
        let result = sqlx::query(
            "UPDATE sessions SET revoked_at = NOW() WHERE user_id = $1 AND revoked_at IS NULL",
        )
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to revoke user sessions");
            AppError::Database(e)
        })?;

        Ok(result.rows_affected())
    }
}
