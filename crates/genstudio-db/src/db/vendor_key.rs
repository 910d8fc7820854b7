use genstudio_core::models::{Vendor, VendorKeyRecord};
use genstudio_core::{AppError, EncryptionService};
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

/// Per-user vendor API keys, AES-GCM encrypted at rest.
#[derive(Clone)]
pub struct VendorKeyRepository {
    pool: PgPool,
    encryption: EncryptionService,
}

impl VendorKeyRepository {
    pub fn new(pool: PgPool, encryption: EncryptionService) -> Self {
        Self { pool, encryption }
    }

    #[tracing::instrument(skip(self, api_key), fields(db.table = "vendor_keys", db.operation = "upsert"))]
    pub async fn save(
        &self,
        user_id: Uuid,
        vendor: Vendor,
        api_key: &str,
    ) -> Result<VendorKeyRecord, AppError> {
        let encrypted = self.encryption.encrypt(api_key)?;

        let record = sqlx::query_as::<Postgres, VendorKeyRecord>(
            r#"
            INSERT INTO vendor_keys (user_id, vendor, encrypted_key)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id, vendor) DO UPDATE
            SET encrypted_key = EXCLUDED.encrypted_key, updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(vendor.as_str())
        .bind(&encrypted)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to save vendor key");
            AppError::Database(e)
        })?;

        tracing::info!(user_id = %user_id, vendor = %vendor, "Vendor key saved");
        Ok(record)
    }

    /// Decrypted key, if saved.
    #[tracing::instrument(skip(self), fields(db.table = "vendor_keys", db.operation = "select"))]
    pub async fn get(&self, user_id: Uuid, vendor: Vendor) -> Result<Option<String>, AppError> {
        let record = self.get_record(user_id, vendor).await?;
        record
            .map(|r| self.encryption.decrypt(&r.encrypted_key))
            .transpose()
    }

    #[tracing::instrument(skip(self), fields(db.table = "vendor_keys", db.operation = "select"))]
    pub async fn get_record(
        &self,
        user_id: Uuid,
        vendor: Vendor,
    ) -> Result<Option<VendorKeyRecord>, AppError> {
        sqlx::query_as::<Postgres, VendorKeyRecord>(
            "SELECT * FROM vendor_keys WHERE user_id = $1 AND vendor = $2",
        )
        .bind(user_id)
        .bind(vendor.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to get vendor key");
            AppError::Database(e)
        })
    }

    #[tracing::instrument(skip(self), fields(db.table = "vendor_keys", db.operation = "select"))]
    pub async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<VendorKeyRecord>, AppError> {
        sqlx::query_as::<Postgres, VendorKeyRecord>(
            "SELECT * FROM vendor_keys WHERE user_id = $1 ORDER BY vendor",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to list vendor keys");
            AppError::Database(e)
        })
    }

    #[tracing::instrument(skip(self), fields(db.table = "vendor_keys", db.operation = "delete"))]
    pub async fn delete(&self, user_id: Uuid, vendor: Vendor) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM vendor_keys WHERE user_id = $1 AND vendor = $2")
            .bind(user_id)
            .bind(vendor.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to delete vendor key");
                AppError::Database(e)
            })?;
        Ok(result.rows_affected() > 0)
    }

    pub fn decrypt(&self, record: &VendorKeyRecord) -> Result<String, AppError> {
        self.encryption.decrypt(&record.encrypted_key)
    }
}
