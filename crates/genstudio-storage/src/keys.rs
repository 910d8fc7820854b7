//! Storage key layout: `{area}/{owner_id}/{filename}`.

use crate::{StorageError, StorageResult};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageArea {
    /// Files users upload as generation inputs.
    Uploads,
    /// Outputs re-hosted from vendors.
    Artifacts,
}

impl StorageArea {
    pub fn prefix(&self) -> &'static str {
        match self {
            StorageArea::Uploads => "uploads",
            StorageArea::Artifacts => "artifacts",
        }
    }
}

pub fn generate_storage_key(owner_id: Uuid, area: StorageArea, filename: &str) -> String {
    format!("{}/{}/{}", area.prefix(), owner_id, filename)
}

/// Keys must be relative and must not climb out of the storage root.
pub fn validate_key(storage_key: &str) -> StorageResult<()> {
    if storage_key.is_empty()
        || storage_key.contains("..")
        || storage_key.starts_with('/')
        || storage_key.contains('\\')
    {
        return Err(StorageError::InvalidKey(
            "Storage key contains invalid characters".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_layout() {
        let owner = Uuid::nil();
        assert_eq!(
            generate_storage_key(owner, StorageArea::Artifacts, "a.png"),
            format!("artifacts/{}/a.png", owner)
        );
    }

    #[test]
    fn test_invalid_keys() {
        assert!(validate_key("../etc/passwd").is_err());
        assert!(validate_key("/abs").is_err());
        assert!(validate_key("").is_err());
        assert!(validate_key("uploads\\x").is_err());
        assert!(validate_key("uploads/u/file.png").is_ok());
    }
}
