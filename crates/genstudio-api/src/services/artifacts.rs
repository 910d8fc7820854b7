//! Where generated media ends up.
//!
//! Inline vendor output (audio bytes) always goes to our storage. Vendor
//! hosted URLs are copied in when `persist_remote` is set, since vendor CDN
//! links expire; otherwise the vendor URL is recorded as is. Copies are
//! capped at `max_bytes`; anything larger keeps the vendor URL.

use crate::error::storage_error;
use genstudio_core::models::GenerationKind;
use genstudio_core::AppError;
use genstudio_storage::{Storage, StorageArea};
use genstudio_vendors::Artifact;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredArtifact {
    pub url: String,
    /// Set when the file lives in our storage.
    pub storage_key: Option<String>,
}

#[derive(Clone)]
pub struct ArtifactStore {
    storage: Arc<dyn Storage>,
    http: reqwest::Client,
    persist_remote: bool,
    max_bytes: usize,
}

impl ArtifactStore {
    pub fn new(
        storage: Arc<dyn Storage>,
        http: reqwest::Client,
        persist_remote: bool,
        max_bytes: usize,
    ) -> Self {
        Self {
            storage,
            http,
            persist_remote,
            max_bytes,
        }
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    #[tracing::instrument(skip(self, artifact), fields(owner_id = %owner_id, job_id = %job_id))]
    pub async fn store(
        &self,
        owner_id: Uuid,
        job_id: Uuid,
        kind: GenerationKind,
        artifact: Artifact,
    ) -> Result<StoredArtifact, AppError> {
        let filename = format!("{}.{}", job_id, extension_for(artifact.content_type(), kind));

        match artifact {
            Artifact::Bytes { data, content_type } => {
                self.put(owner_id, &filename, &content_type, data.to_vec())
                    .await
            }
            Artifact::Url { url, content_type } => {
                if !self.persist_remote {
                    return Ok(StoredArtifact {
                        url,
                        storage_key: None,
                    });
                }
                match self.fetch(&url).await {
                    Ok(data) => self.put(owner_id, &filename, &content_type, data).await,
                    Err(e) => {
                        tracing::warn!(error = %e, url = %url, "Could not copy vendor output, keeping vendor URL");
                        Ok(StoredArtifact {
                            url,
                            storage_key: None,
                        })
                    }
                }
            }
        }
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>, AppError> {
        let mut response = self
            .http
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(fetch_error)?;

        if let Some(length) = response.content_length() {
            if length > self.max_bytes as u64 {
                return Err(self.too_large());
            }
        }

        // Content-Length is optional, so the cap also applies while reading.
        let mut data = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(fetch_error)? {
            if data.len() + chunk.len() > self.max_bytes {
                return Err(self.too_large());
            }
            data.extend_from_slice(&chunk);
        }
        Ok(data)
    }

    fn too_large(&self) -> AppError {
        AppError::PayloadTooLarge(format!(
            "Vendor output exceeds {} bytes",
            self.max_bytes
        ))
    }

    /// Best-effort removal of an artifact nothing references.
    pub async fn discard(&self, storage_key: &str) {
        if let Err(e) = self.storage.delete(storage_key).await {
            tracing::warn!(error = %e, storage_key, "Failed to remove unreferenced artifact");
        }
    }

    async fn put(
        &self,
        owner_id: Uuid,
        filename: &str,
        content_type: &str,
        data: Vec<u8>,
    ) -> Result<StoredArtifact, AppError> {
        let size = data.len();
        let (storage_key, url) = self
            .storage
            .upload(owner_id, StorageArea::Artifacts, filename, content_type, data)
            .await
            .map_err(storage_error)?;

        tracing::debug!(storage_key = %storage_key, size, "Artifact stored");
        Ok(StoredArtifact {
            url,
            storage_key: Some(storage_key),
        })
    }
}

fn fetch_error(e: reqwest::Error) -> AppError {
    AppError::Internal(format!("Failed to fetch vendor output: {}", e))
}

/// File extension for a stored artifact.
pub fn extension_for(content_type: &str, kind: GenerationKind) -> &'static str {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    match essence.as_str() {
        "image/png" => "png",
        "image/jpeg" | "image/jpg" => "jpg",
        "image/webp" => "webp",
        "image/gif" => "gif",
        "video/mp4" => "mp4",
        "video/webm" => "webm",
        "video/quicktime" => "mov",
        "audio/mpeg" | "audio/mp3" => "mp3",
        "audio/wav" | "audio/x-wav" => "wav",
        "audio/ogg" => "ogg",
        _ => match kind.content_type() {
            genstudio_core::models::ContentType::Image => "png",
            genstudio_core::models::ContentType::Video => "mp4",
            genstudio_core::models::ContentType::Audio => "mp3",
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use genstudio_storage::LocalStorage;
    use std::io::Write;

    async fn local_store(dir: &tempfile::TempDir, persist_remote: bool) -> ArtifactStore {
        capped_store(dir, persist_remote, 1024 * 1024).await
    }

    async fn capped_store(
        dir: &tempfile::TempDir,
        persist_remote: bool,
        max_bytes: usize,
    ) -> ArtifactStore {
        let storage = LocalStorage::new(dir.path(), "http://localhost:3000/files".to_string())
            .await
            .unwrap();
        ArtifactStore::new(
            Arc::new(storage),
            reqwest::Client::new(),
            persist_remote,
            max_bytes,
        )
    }

    fn hosted(url: String) -> Artifact {
        Artifact::Url {
            url,
            content_type: "image/png".to_string(),
        }
    }

    #[test]
    fn test_extension_for() {
        assert_eq!(extension_for("audio/mpeg", GenerationKind::TextToSpeech), "mp3");
        assert_eq!(
            extension_for("image/jpeg; charset=binary", GenerationKind::TextToImage),
            "jpg"
        );
        assert_eq!(
            extension_for("application/octet-stream", GenerationKind::ImageToVideo),
            "mp4"
        );
    }

    #[tokio::test]
    async fn test_bytes_are_always_stored() {
        let dir = tempfile::tempdir().unwrap();
        let store = local_store(&dir, false).await;
        let owner = Uuid::new_v4();
        let job = Uuid::new_v4();

        let stored = store
            .store(
                owner,
                job,
                GenerationKind::TextToSpeech,
                Artifact::Bytes {
                    data: Bytes::from_static(b"ID3audio"),
                    content_type: "audio/mpeg".to_string(),
                },
            )
            .await
            .unwrap();

        let key = stored.storage_key.expect("stored locally");
        assert_eq!(key, format!("artifacts/{}/{}.mp3", owner, job));
        assert!(stored.url.ends_with(&key));
        assert_eq!(store.storage().download(&key).await.unwrap(), b"ID3audio");
    }

    #[tokio::test]
    async fn test_url_kept_when_not_persisting() {
        let dir = tempfile::tempdir().unwrap();
        let store = local_store(&dir, false).await;

        let stored = store
            .store(
                Uuid::new_v4(),
                Uuid::new_v4(),
                GenerationKind::TextToImage,
                Artifact::Url {
                    url: "https://cdn.vendor.test/out.png".to_string(),
                    content_type: "image/png".to_string(),
                },
            )
            .await
            .unwrap();

        assert_eq!(stored.url, "https://cdn.vendor.test/out.png");
        assert!(stored.storage_key.is_none());
    }

    #[tokio::test]
    async fn test_unreachable_url_falls_back_to_vendor_url() {
        let dir = tempfile::tempdir().unwrap();
        let store = local_store(&dir, true).await;

        let stored = store
            .store(
                Uuid::new_v4(),
                Uuid::new_v4(),
                GenerationKind::TextToImage,
                Artifact::Url {
                    url: "http://127.0.0.1:1/out.png".to_string(),
                    content_type: "image/png".to_string(),
                },
            )
            .await
            .unwrap();

        assert_eq!(stored.url, "http://127.0.0.1:1/out.png");
        assert!(stored.storage_key.is_none());
    }

    #[tokio::test]
    async fn test_remote_output_copied_within_limit() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/out.png")
            .with_status(200)
            .with_header("content-type", "image/png")
            .with_body(vec![1u8; 512])
            .create_async()
            .await;
        let dir = tempfile::tempdir().unwrap();
        let store = capped_store(&dir, true, 1024).await;

        let stored = store
            .store(
                Uuid::new_v4(),
                Uuid::new_v4(),
                GenerationKind::TextToImage,
                hosted(format!("{}/out.png", server.url())),
            )
            .await
            .unwrap();

        mock.assert_async().await;
        let key = stored.storage_key.expect("copied");
        assert_eq!(store.storage().download(&key).await.unwrap().len(), 512);
    }

    #[tokio::test]
    async fn test_oversized_remote_output_keeps_vendor_url() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/big.png")
            .with_status(200)
            .with_body(vec![1u8; 4096])
            .create_async()
            .await;
        let dir = tempfile::tempdir().unwrap();
        let store = capped_store(&dir, true, 1024).await;
        let url = format!("{}/big.png", server.url());

        let stored = store
            .store(
                Uuid::new_v4(),
                Uuid::new_v4(),
                GenerationKind::TextToImage,
                hosted(url.clone()),
            )
            .await
            .unwrap();

        assert_eq!(stored.url, url);
        assert!(stored.storage_key.is_none());
    }

    #[tokio::test]
    async fn test_chunked_output_capped_while_reading() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/stream.png")
            .with_status(200)
            .with_chunked_body(|w| {
                for _ in 0..8 {
                    w.write_all(&[2u8; 256])?;
                }
                Ok(())
            })
            .create_async()
            .await;
        let dir = tempfile::tempdir().unwrap();
        let store = capped_store(&dir, true, 1024).await;

        let err = store
            .fetch(&format!("{}/stream.png", server.url()))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::PayloadTooLarge(_)));
    }
}
