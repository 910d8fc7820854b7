//! Application state and sub-state extractors.
//!
//! Handlers take `State<Arc<AppState>>`; middleware pulls the narrower
//! sub-states through `FromRef`.

use crate::auth::AuthState;
use crate::services::GenerationRunner;
use genstudio_core::Config;
use genstudio_db::{
    GenerationJobRepository, HistoryRepository, PaymentRepository, SessionRepository,
    UsageRepository, UserRepository, VendorKeyRepository,
};
use genstudio_storage::Storage;
use sqlx::PgPool;
use std::sync::Arc;

/// Pool and repositories.
#[derive(Clone)]
pub struct DbState {
    pub pool: PgPool,
    pub users: UserRepository,
    pub sessions: SessionRepository,
    pub usage: UsageRepository,
    pub history: HistoryRepository,
    pub payments: PaymentRepository,
    pub jobs: GenerationJobRepository,
    pub vendor_keys: VendorKeyRepository,
}

/// Object storage and upload limits.
#[derive(Clone)]
pub struct MediaState {
    pub storage: Arc<dyn Storage>,
    pub max_upload_size_bytes: usize,
    pub allowed_content_types: Vec<String>,
}

impl MediaState {
    pub fn is_allowed_content_type(&self, content_type: &str) -> bool {
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        self.allowed_content_types.iter().any(|t| *t == essence)
    }
}

#[derive(Clone)]
pub struct AppState {
    pub db: DbState,
    pub media: MediaState,
    pub auth: Arc<AuthState>,
    pub generation: GenerationRunner,
    pub config: Config,
    pub is_production: bool,
}

impl axum::extract::FromRef<Arc<AppState>> for DbState {
    fn from_ref(state: &Arc<AppState>) -> Self {
        state.db.clone()
    }
}

impl axum::extract::FromRef<Arc<AppState>> for MediaState {
    fn from_ref(state: &Arc<AppState>) -> Self {
        state.media.clone()
    }
}

fn _assert_app_state_send_sync() {
    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}
    assert_send::<AppState>();
    assert_sync::<AppState>();
}
