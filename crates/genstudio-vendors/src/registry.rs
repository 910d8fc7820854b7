//! Registry of the vendor adapters available to the generation runner

use genstudio_core::models::GenerationKind;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::{VendorError, VendorResult};
use crate::provider::{GenerationProvider, ProviderInfo};

/// Providers by name plus the default provider per generation kind.
///
/// Cheap to clone; clones share the same maps.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: Arc<RwLock<HashMap<String, Arc<dyn GenerationProvider>>>>,
    defaults: Arc<RwLock<HashMap<GenerationKind, String>>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `provider` under its name, replacing any provider with that
    /// name. It becomes the default for each supported kind that has none yet.
    pub async fn register(&self, provider: Arc<dyn GenerationProvider>) {
        let name = provider.name().to_string();
        let kinds = provider.supported_kinds().to_vec();

        let mut providers = self.providers.write().await;
        let mut defaults = self.defaults.write().await;

        for kind in kinds {
            defaults.entry(kind).or_insert_with(|| name.clone());
        }
        providers.insert(name.clone(), provider);

        tracing::debug!(provider = %name, "Registered generation provider");
    }

    /// Make `name` the default for `kind`.
    pub async fn set_default(&self, kind: GenerationKind, name: &str) -> VendorResult<()> {
        let provider = self.get(name).await?;
        if !provider.supports(kind) {
            return Err(VendorError::InvalidRequest(format!(
                "Provider '{}' does not support {}",
                name, kind
            )));
        }
        self.defaults.write().await.insert(kind, name.to_string());
        Ok(())
    }

    pub async fn get(&self, name: &str) -> VendorResult<Arc<dyn GenerationProvider>> {
        let providers = self.providers.read().await;
        providers
            .get(name)
            .cloned()
            .ok_or_else(|| VendorError::InvalidRequest(format!("Provider '{}' not found", name)))
    }

    /// Provider for a request: the explicitly requested one if it supports
    /// `kind`, otherwise the default for `kind`.
    pub async fn resolve(
        &self,
        kind: GenerationKind,
        requested: Option<&str>,
    ) -> VendorResult<Arc<dyn GenerationProvider>> {
        if let Some(name) = requested {
            let provider = self.get(name).await?;
            if !provider.supports(kind) {
                return Err(VendorError::InvalidRequest(format!(
                    "Provider '{}' does not support {}",
                    name, kind
                )));
            }
            return Ok(provider);
        }

        let name = self
            .defaults
            .read()
            .await
            .get(&kind)
            .cloned()
            .ok_or_else(|| {
                VendorError::InvalidRequest(format!("No provider available for {}", kind))
            })?;
        self.get(&name).await
    }

    pub async fn list(&self) -> Vec<ProviderInfo> {
        let providers = self.providers.read().await;
        let mut infos: Vec<ProviderInfo> = providers.values().map(|p| p.info()).collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        infos
    }

    pub async fn contains(&self, name: &str) -> bool {
        self.providers.read().await.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{Artifact, GenerationContext, GenerationOutput};
    use async_trait::async_trait;
    use genstudio_core::models::Vendor;

    #[derive(Debug)]
    struct MockProvider {
        name: String,
        kinds: Vec<GenerationKind>,
    }

    impl MockProvider {
        fn new(name: &str, kinds: &[GenerationKind]) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                kinds: kinds.to_vec(),
            })
        }
    }

    #[async_trait]
    impl GenerationProvider for MockProvider {
        fn name(&self) -> &str {
            &self.name
        }

        fn vendor(&self) -> Vendor {
            Vendor::Fal
        }

        fn supported_kinds(&self) -> &[GenerationKind] {
            &self.kinds
        }

        async fn generate(&self, _context: GenerationContext) -> VendorResult<GenerationOutput> {
            Ok(GenerationOutput {
                artifact: Artifact::Url {
                    url: "https://cdn.example.com/out.png".into(),
                    content_type: "image/png".into(),
                },
                vendor_request_id: None,
                metadata: serde_json::Value::Null,
            })
        }
    }

    #[tokio::test]
    async fn test_new_registry_is_empty() {
        let registry = ProviderRegistry::new();
        assert!(registry.list().await.is_empty());
        assert!(!registry.contains("fal").await);
    }

    #[tokio::test]
    async fn test_first_registered_becomes_default() {
        let registry = ProviderRegistry::new();
        registry
            .register(MockProvider::new("fal", &[GenerationKind::TextToImage]))
            .await;
        registry
            .register(MockProvider::new(
                "replicate",
                &[GenerationKind::TextToImage, GenerationKind::ImageToVideo],
            ))
            .await;

        let image = registry.resolve(GenerationKind::TextToImage, None).await.unwrap();
        assert_eq!(image.name(), "fal");
        let video = registry.resolve(GenerationKind::ImageToVideo, None).await.unwrap();
        assert_eq!(video.name(), "replicate");
    }

    #[tokio::test]
    async fn test_requested_provider_must_support_kind() {
        let registry = ProviderRegistry::new();
        registry
            .register(MockProvider::new("elevenlabs", &[GenerationKind::TextToSpeech]))
            .await;

        let err = registry
            .resolve(GenerationKind::TextToImage, Some("elevenlabs"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("does not support"));

        let ok = registry
            .resolve(GenerationKind::TextToSpeech, Some("elevenlabs"))
            .await
            .unwrap();
        assert_eq!(ok.name(), "elevenlabs");
    }

    #[tokio::test]
    async fn test_set_default_overrides() {
        let registry = ProviderRegistry::new();
        registry
            .register(MockProvider::new("fal", &[GenerationKind::TextToImage]))
            .await;
        registry
            .register(MockProvider::new("replicate", &[GenerationKind::TextToImage]))
            .await;

        registry
            .set_default(GenerationKind::TextToImage, "replicate")
            .await
            .unwrap();
        let chosen = registry.resolve(GenerationKind::TextToImage, None).await.unwrap();
        assert_eq!(chosen.name(), "replicate");

        assert!(registry
            .set_default(GenerationKind::TextToSpeech, "replicate")
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_unknown_kind_or_name() {
        let registry = ProviderRegistry::new();
        assert!(registry.resolve(GenerationKind::StoryToVideo, None).await.is_err());
        let err = registry.get("nonexistent").await.unwrap_err();
        assert!(err.to_string().contains("Provider 'nonexistent' not found"));
    }

    #[tokio::test]
    async fn test_clone_shares_providers() {
        let registry = ProviderRegistry::new();
        registry
            .register(MockProvider::new("fal", &[GenerationKind::TextToImage]))
            .await;
        let cloned = registry.clone();
        assert!(cloned.contains("fal").await);
        assert_eq!(cloned.list().await.len(), 1);
    }
}
