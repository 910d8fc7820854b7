//! genstudio core library
//!
//! Domain models, error types, configuration and small pure state machines
//! (credit counters, payment review) shared by every genstudio crate.

pub mod config;
pub mod constants;
pub mod encryption;
pub mod error;
pub mod i18n;
pub mod models;
pub mod storage_types;

pub use config::{BaseConfig, Config, PollSettings, StudioConfig, VendorSettings};
pub use encryption::EncryptionService;
pub use error::{AppError, ErrorMetadata, LogLevel};
pub use i18n::{Locale, Message};
pub use storage_types::StorageBackend;
