//! genstudio database layer
//!
//! sqlx repositories over Postgres plus the store traits the generation
//! runner depends on.

pub mod db;
pub mod store_traits;

pub use db::*;
pub use store_traits::{JobStore, UsageStore, VendorKeyStore};
