//! Repository, vendor and runner wiring

use crate::auth::{AuthState, JwtService};
use crate::services::{ArtifactStore, GenerationRunner, RunnerSettings, RunnerStores};
use crate::state::{AppState, DbState, MediaState};
use anyhow::{Context, Result};
use genstudio_core::models::{GenerationKind, Vendor};
use genstudio_core::{Config, EncryptionService, VendorSettings};
use genstudio_db::{
    GenerationJobRepository, HistoryRepository, PaymentRepository, SessionRepository,
    UsageRepository, UserRepository, VendorKeyRepository,
};
use genstudio_storage::Storage;
use genstudio_vendors::{PollPolicy, ProviderRegistry};
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Timeout for fetching vendor outputs we re-host.
const ARTIFACT_FETCH_TIMEOUT_SECS: u64 = 300;

const ORPHANED_JOB_REASON: &str = "Server restarted before the generation finished";

pub async fn initialize_services(
    config: Config,
    pool: PgPool,
    storage: Arc<dyn Storage>,
) -> Result<Arc<AppState>> {
    let encryption = EncryptionService::from_base64_key(config.encryption_key().context(
        "ENCRYPTION_KEY must be set (base64 of 32 random bytes, e.g. `openssl rand -base64 32`)",
    )?)
    .context("Invalid ENCRYPTION_KEY")?;

    let db = DbState {
        users: UserRepository::new(pool.clone()),
        sessions: SessionRepository::new(pool.clone()),
        usage: UsageRepository::new(pool.clone()),
        history: HistoryRepository::new(pool.clone()),
        payments: PaymentRepository::new(pool.clone()),
        jobs: GenerationJobRepository::new(pool.clone()),
        vendor_keys: VendorKeyRepository::new(pool.clone(), encryption),
        pool,
    };

    recover_orphaned_jobs(&db).await?;

    let registry = build_registry(config.vendors()).await;
    tracing::info!(
        providers = ?registry.list().await.iter().map(|p| p.name.clone()).collect::<Vec<_>>(),
        "Generation providers registered"
    );

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(ARTIFACT_FETCH_TIMEOUT_SECS))
        .build()
        .context("Failed to build artifact HTTP client")?;
    let artifacts = ArtifactStore::new(
        storage.clone(),
        http,
        config.persist_artifacts(),
        config.max_upload_size_bytes(),
    );

    let settings = RunnerSettings {
        server_keys: server_keys(config.vendors()),
        poll: PollPolicy::from(config.poll()),
        default_image_limit: config.default_image_limit(),
        default_video_limit: config.default_video_limit(),
    };
    let stores = RunnerStores {
        usage: Arc::new(db.usage.clone()),
        jobs: Arc::new(db.jobs.clone()),
        vendor_keys: Arc::new(db.vendor_keys.clone()),
    };
    let generation = GenerationRunner::new(stores, registry, artifacts, settings);

    let auth = Arc::new(AuthState {
        jwt: JwtService::new(config.jwt_secret(), config.jwt_expiry_hours()),
        sessions: db.sessions.clone(),
        users: db.users.clone(),
    });

    let media = MediaState {
        storage,
        max_upload_size_bytes: config.max_upload_size_bytes(),
        allowed_content_types: config.upload_allowed_content_types().to_vec(),
    };

    let is_production = config.is_production();
    Ok(Arc::new(AppState {
        db,
        media,
        auth,
        generation,
        config,
        is_production,
    }))
}

/// Fail jobs whose runner died with the previous process and give back
/// the credits they reserved.
async fn recover_orphaned_jobs(db: &DbState) -> Result<()> {
    let orphaned = db
        .jobs
        .abandon_unfinished(ORPHANED_JOB_REASON)
        .await
        .context("Failed to recover unfinished generation jobs")?;

    for job in &orphaned {
        if let Some(kind) = job.usage_kind {
            if let Err(e) = db.usage.release(job.user_id, kind).await {
                tracing::error!(error = %e, job_id = %job.id, "Failed to release credit of orphaned job");
            }
        }
    }
    Ok(())
}

/// Register every compiled-in vendor adapter. An adapter that fails to
/// build is skipped so the others stay usable.
pub async fn build_registry(settings: &VendorSettings) -> ProviderRegistry {
    let registry = ProviderRegistry::new();

    #[cfg(feature = "vendor-fal")]
    match genstudio_vendors::FalProvider::new(settings) {
        Ok(provider) => registry.register(Arc::new(provider)).await,
        Err(e) => tracing::warn!(error = %e, "fal provider unavailable"),
    }

    #[cfg(feature = "vendor-replicate")]
    match genstudio_vendors::ReplicateProvider::new(settings) {
        Ok(provider) => registry.register(Arc::new(provider)).await,
        Err(e) => tracing::warn!(error = %e, "Replicate provider unavailable"),
    }

    #[cfg(feature = "vendor-elevenlabs")]
    match genstudio_vendors::ElevenLabsProvider::new(settings) {
        Ok(provider) => {
            registry.register(Arc::new(provider)).await;
            if let Err(e) = registry
                .set_default(GenerationKind::TextToSpeech, "elevenlabs")
                .await
            {
                tracing::warn!(error = %e, "Could not make ElevenLabs the speech default");
            }
        }
        Err(e) => tracing::warn!(error = %e, "ElevenLabs provider unavailable"),
    }

    registry
}

fn server_keys(settings: &VendorSettings) -> HashMap<Vendor, String> {
    [
        (Vendor::Fal, settings.fal_api_key.as_ref()),
        (Vendor::Replicate, settings.replicate_api_token.as_ref()),
        (Vendor::Elevenlabs, settings.elevenlabs_api_key.as_ref()),
    ]
    .into_iter()
    .filter_map(|(vendor, key)| key.map(|k| (vendor, k.clone())))
    .collect()
}
