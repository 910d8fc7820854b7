//! genstudio storage library
//!
//! Object storage for user uploads and re-hosted vendor outputs.
//!
//! # Storage key format
//!
//! `uploads/{user_id}/{filename}` for inputs and
//! `artifacts/{user_id}/{filename}` for generated content. Keys must not
//! contain `..` or a leading `/`.

pub mod factory;
pub mod keys;
#[cfg(feature = "storage-local")]
pub mod local;
#[cfg(feature = "storage-s3")]
pub mod s3;
pub mod traits;

pub use factory::create_storage;
pub use genstudio_core::StorageBackend;
pub use keys::StorageArea;
#[cfg(feature = "storage-local")]
pub use local::LocalStorage;
#[cfg(feature = "storage-s3")]
pub use s3::S3Storage;
pub use traits::{Storage, StorageError, StorageResult};
