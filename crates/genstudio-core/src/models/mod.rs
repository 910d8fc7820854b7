//! Data models, grouped by feature area.

mod generation;
mod history;
mod payment;
mod usage;
mod user;
mod vendor;

pub use generation::*;
pub use history::*;
pub use payment::*;
pub use usage::*;
pub use user::*;
pub use vendor::*;

use serde::Deserialize;
use utoipa::IntoParams;

use crate::constants::{DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT};

/// `?limit=&offset=` for list endpoints.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
pub struct Pagination {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl Pagination {
    /// Limit clamped to `1..=MAX_PAGE_LIMIT`, offset to `>= 0`.
    pub fn clamped(&self) -> (i64, i64) {
        let limit = self
            .limit
            .unwrap_or(DEFAULT_PAGE_LIMIT)
            .clamp(1, MAX_PAGE_LIMIT);
        let offset = self.offset.unwrap_or(0).max(0);
        (limit, offset)
    }
}
