use anyhow::Context;
use genstudio_core::models::{
    NewPaymentRequest, PaymentRequest, PaymentStatus, ReviewDecision, Transition, UsageKind,
};
use genstudio_core::AppError;
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

use super::usage::UsageRepository;

#[derive(Clone)]
pub struct PaymentRepository {
    pool: PgPool,
}

impl PaymentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[tracing::instrument(skip(self, request), fields(db.table = "payment_requests", db.operation = "insert"))]
    pub async fn create(&self, request: &NewPaymentRequest) -> Result<PaymentRequest, AppError> {
        let payment = sqlx::query_as::<Postgres, PaymentRequest>(
            r#"
            INSERT INTO payment_requests (
                user_id, package_id, image_credits, video_credits, amount_cents, currency,
                contact_name, contact_phone, contact_email, payment_reference
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING *
            "#,
        )
        .bind(request.user_id)
        .bind(&request.package.id)
        .bind(request.package.image_credits)
        .bind(request.package.video_credits)
        .bind(request.package.price_cents)
        .bind(&request.package.currency)
        .bind(&request.contact_name)
        .bind(&request.contact_phone)
        .bind(&request.contact_email)
        .bind(&request.payment_reference)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to create payment request");
            AppError::Database(e)
        })?;

        tracing::info!(
            payment_id = %payment.id,
            user_id = %payment.user_id,
            package_id = %payment.package_id,
            "Payment request submitted"
        );
        Ok(payment)
    }

    #[tracing::instrument(skip(self), fields(db.table = "payment_requests", db.operation = "select", db.record_id = %id))]
    pub async fn get(&self, id: Uuid) -> Result<Option<PaymentRequest>, AppError> {
        sqlx::query_as::<Postgres, PaymentRequest>("SELECT * FROM payment_requests WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(AppError::Database)
    }

    #[tracing::instrument(skip(self), fields(db.table = "payment_requests", db.operation = "select"))]
    pub async fn list_for_user(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<PaymentRequest>, AppError> {
        sqlx::query_as::<Postgres, PaymentRequest>(
            r#"
            SELECT * FROM payment_requests
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
            tracing::error!(error = %e, "Failed to list payment requests");
            AppError::Database(e)
        })
    }

    /// Admin review queue. Oldest first so pending requests are handled in order.
    #[tracing::instrument(skip(self), fields(db.table = "payment_requests", db.operation = "select"))]
    pub async fn list_all(
        &self,
        status: Option<PaymentStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<PaymentRequest>, AppError> {
        sqlx::query_as::<Postgres, PaymentRequest>(
            r#"
            SELECT * FROM payment_requests
            WHERE $1::payment_status IS NULL OR status = $1
            ORDER BY created_at ASC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(status)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to list payment requests");
            AppError::Database(e)
        })
    }

    /// Approve or reject a request.
    ///
    /// The row is locked for the duration of the transaction, so concurrent
    /// reviews serialize: the first applies the transition (and on approval
    /// grants the snapshot credits in the same transaction), later identical
    /// decisions see the resolved status and change nothing. Returns the row
    /// and whether this call applied the transition.
    #[tracing::instrument(skip(self, note), fields(db.table = "payment_requests", db.operation = "update", db.record_id = %id))]
    pub async fn resolve(
        &self,
        id: Uuid,
        decision: ReviewDecision,
        reviewer_id: Uuid,
        note: Option<&str>,
    ) -> Result<(PaymentRequest, bool), AppError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin transaction")?;

        let current = sqlx::query_as::<Postgres, PaymentRequest>(
            "SELECT * FROM payment_requests WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(AppError::Database)?
        .ok_or_else(|| AppError::NotFound(format!("Payment request {} not found", id)))?;

        let new_status = match current.status.apply(decision)? {
            Transition::Unchanged(_) => {
                tx.rollback().await.context("Failed to roll back")?;
                tracing::info!(payment_id = %id, status = %current.status, "Payment review repeated, no change");
                return Ok((current, false));
            }
            Transition::Applied(status) => status,
        };

        let updated = sqlx::query_as::<Postgres, PaymentRequest>(
            r#"
            UPDATE payment_requests
            SET status = $2, admin_note = $3, reviewed_by = $4, reviewed_at = NOW(), updated_at = NOW()
            WHERE id = $1 AND status = 'pending'
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(new_status)
        .bind(note)
        .bind(reviewer_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to update payment request");
            AppError::Database(e)
        })?;

        if new_status == PaymentStatus::Approved {
            UsageRepository::grant_in_tx(
                &mut *tx,
                updated.user_id,
                UsageKind::Image,
                updated.image_credits,
            )
            .await?;
            UsageRepository::grant_in_tx(
                &mut *tx,
                updated.user_id,
                UsageKind::Video,
                updated.video_credits,
            )
            .await?;
        }

        tx.commit().await.context("Failed to commit transaction")?;

        tracing::info!(
            payment_id = %id,
            user_id = %updated.user_id,
            status = %updated.status,
            reviewer_id = %reviewer_id,
            image_credits = updated.image_credits,
            video_credits = updated.video_credits,
            "Payment request resolved"
        );

        Ok((updated, true))
    }
}
