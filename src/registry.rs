//! Merged, filtered model catalog.
//!
//! Each enabled provider's catalog is fetched at most once per process and
//! cached for its lifetime. Listing tolerates individual provider failures;
//! resolving a model id only fetches catalogs that have never been fetched and
//! whose naming convention claims the id.

use crate::catalog::{canonical_model_id, claiming_providers, CatalogRules};
use crate::error::{Result, SmartImageError};
use crate::image::{ModelDescriptor, Provider};
use crate::pool::ClientPool;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::OnceCell;

/// Registry of callable models across enabled providers.
#[derive(Debug)]
pub struct ModelRegistry {
    pool: Arc<ClientPool>,
    catalogs: HashMap<Provider, OnceCell<Vec<ModelDescriptor>>>,
}

impl ModelRegistry {
    /// Creates an empty registry over the pool's enabled providers.
    pub fn new(pool: Arc<ClientPool>) -> Self {
        let catalogs = pool
            .enabled_providers()
            .into_iter()
            .map(|p| (p, OnceCell::new()))
            .collect();
        Self { pool, catalogs }
    }

    /// Lists every non-deprecated model, in provider declaration order.
    ///
    /// A provider whose catalog cannot be fetched is logged and skipped. If
    /// every enabled provider fails, returns
    /// [`SmartImageError::NoProvidersAvailable`]. With no provider enabled the
    /// list is empty.
    pub async fn list_models(&self) -> Result<Vec<ModelDescriptor>> {
        let enabled = self.pool.enabled_providers();
        let mut models = Vec::new();
        let mut failures = Vec::new();

        for provider in &enabled {
            match self.catalog(*provider).await {
                Ok(catalog) => models.extend_from_slice(catalog),
                Err(e) => {
                    tracing::warn!(provider = %provider, error = %e, "skipping provider catalog");
                    failures.push(format!("{}: {}", provider, e));
                }
            }
        }

        if !enabled.is_empty() && failures.len() == enabled.len() {
            return Err(SmartImageError::NoProvidersAvailable(failures.join("; ")));
        }
        Ok(models)
    }

    /// Finds the descriptor for `model_id`.
    ///
    /// Cached catalogs are searched first. Otherwise catalogs of enabled
    /// providers that claim the id and were never fetched are fetched once;
    /// their fetch errors are returned as-is.
    pub async fn resolve(&self, model_id: &str) -> Result<ModelDescriptor> {
        if let Some(model) = self.find_cached(model_id) {
            return Ok(model.clone());
        }

        for provider in claiming_providers(model_id) {
            let Some(cell) = self.catalogs.get(&provider) else {
                continue;
            };
            if cell.initialized() {
                continue;
            }
            let catalog = self.catalog(provider).await?;
            if let Some(model) = find_in(catalog, provider, model_id) {
                return Ok(model.clone());
            }
        }

        Err(SmartImageError::UnknownModel(model_id.to_string()))
    }

    /// Returns true if the provider's catalog has been fetched and cached.
    pub fn is_cached(&self, provider: Provider) -> bool {
        self.catalogs
            .get(&provider)
            .is_some_and(|cell| cell.initialized())
    }

    fn find_cached(&self, model_id: &str) -> Option<&ModelDescriptor> {
        Provider::ALL.into_iter().find_map(|provider| {
            let catalog = self.catalogs.get(&provider)?.get()?;
            find_in(catalog, provider, model_id)
        })
    }

    async fn catalog(&self, provider: Provider) -> Result<&[ModelDescriptor]> {
        let cell = self.catalogs.get(&provider).ok_or_else(|| {
            SmartImageError::ProviderUnavailable {
                provider,
                message: format!("not enabled. Set {}=true", provider.enable_flag()),
            }
        })?;
        let catalog = cell.get_or_try_init(|| self.fetch(provider)).await?;
        Ok(catalog.as_slice())
    }

    async fn fetch(&self, provider: Provider) -> Result<Vec<ModelDescriptor>> {
        let start = Instant::now();
        let client = self.pool.get(provider).await?;
        let timeout = self.pool.config().request_timeout;

        let raw = tokio::time::timeout(timeout, client.list_raw_models())
            .await
            .map_err(|_| {
                SmartImageError::remote(
                    provider,
                    format!("catalog request timed out after {}s", timeout.as_secs()),
                )
            })??;

        let models = CatalogRules::for_provider(provider).filter_catalog(&raw);
        tracing::debug!(
            provider = %provider,
            listed = raw.len(),
            kept = models.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "catalog fetched"
        );
        Ok(models)
    }
}

fn find_in<'a>(
    catalog: &'a [ModelDescriptor],
    provider: Provider,
    model_id: &str,
) -> Option<&'a ModelDescriptor> {
    let canonical = canonical_model_id(provider, model_id);
    catalog.iter().find(|m| m.model_id == canonical)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::testing::{stub_pool, stub_pool_with_timeout, StubProvider};
    use std::time::Duration;

    fn registry(stubs: &[Arc<StubProvider>]) -> ModelRegistry {
        ModelRegistry::new(Arc::new(stub_pool(stubs)))
    }

    fn ids(models: &[ModelDescriptor]) -> Vec<&str> {
        models.iter().map(|m| m.model_id.as_str()).collect()
    }

    #[tokio::test]
    async fn test_no_providers_enabled_lists_nothing() {
        let registry = registry(&[]);
        assert!(registry.list_models().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_models_is_cached() {
        let openai = Arc::new(StubProvider::new(Provider::OpenAi, &["gpt-image-1.5"]));
        let registry = registry(&[Arc::clone(&openai)]);

        let first = registry.list_models().await.unwrap();
        let second = registry.list_models().await.unwrap();
        assert_eq!(first, second);
        assert_eq!(ids(&first), vec!["gpt-image-1.5"]);
        assert_eq!(openai.list_count(), 1);
    }

    #[tokio::test]
    async fn test_list_models_filters_deprecated_and_irrelevant() {
        let openai = Arc::new(StubProvider::new(
            Provider::OpenAi,
            &["gpt-image-1.5", "dall-e-2", "gpt-4o", "whisper-1"],
        ));
        let registry = registry(&[openai]);
        let models = registry.list_models().await.unwrap();
        assert_eq!(ids(&models), vec!["gpt-image-1.5"]);
    }

    #[tokio::test]
    async fn test_partial_failure_returns_union_of_rest() {
        let bedrock = Arc::new(StubProvider::new(Provider::Bedrock, &["amazon.nova-canvas-v1:0"]));
        let openai = Arc::new(StubProvider::new(Provider::OpenAi, &["gpt-image-1.5"]).failing());
        let gemini = Arc::new(StubProvider::new(
            Provider::Gemini,
            &["models/gemini-2.5-flash-image"],
        ));
        let registry = registry(&[bedrock, openai, gemini]);

        let models = registry.list_models().await.unwrap();
        assert_eq!(
            ids(&models),
            vec!["amazon.nova-canvas-v1:0", "models/gemini-2.5-flash-image"]
        );
    }

    #[tokio::test]
    async fn test_total_failure_is_no_providers_available() {
        let openai = Arc::new(StubProvider::new(Provider::OpenAi, &[]).failing());
        let gemini = Arc::new(StubProvider::new(Provider::Gemini, &[]).failing());
        let registry = registry(&[openai, gemini]);

        let err = registry.list_models().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoProvidersAvailableError);
    }

    #[tokio::test]
    async fn test_failed_catalog_is_refetched() {
        let openai = Arc::new(StubProvider::new(Provider::OpenAi, &[]).failing());
        let registry = registry(&[Arc::clone(&openai)]);

        assert!(registry.list_models().await.is_err());
        assert!(registry.list_models().await.is_err());
        assert!(!registry.is_cached(Provider::OpenAi));
        assert_eq!(openai.list_count(), 2);
    }

    #[tokio::test]
    async fn test_resolve_unknown_in_populated_cache() {
        let openai = Arc::new(StubProvider::new(Provider::OpenAi, &["gpt-image-1.5"]));
        let registry = registry(&[Arc::clone(&openai)]);
        registry.list_models().await.unwrap();

        let err = registry.resolve("gpt-image-9").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownModelError);
        assert_eq!(openai.list_count(), 1);
    }

    #[tokio::test]
    async fn test_resolve_fetches_only_claiming_provider() {
        let openai = Arc::new(StubProvider::new(Provider::OpenAi, &["gpt-image-1.5"]));
        let gemini = Arc::new(StubProvider::new(
            Provider::Gemini,
            &["models/gemini-2.5-flash-image"],
        ));
        let registry = registry(&[Arc::clone(&openai), Arc::clone(&gemini)]);

        let model = registry.resolve("gemini-2.5-flash-image").await.unwrap();
        assert_eq!(model.model_id, "models/gemini-2.5-flash-image");
        assert_eq!(model.provider, Provider::Gemini);
        assert_eq!(gemini.list_count(), 1);
        assert_eq!(openai.list_count(), 0);

        registry.resolve("models/gemini-2.5-flash-image").await.unwrap();
        assert_eq!(gemini.list_count(), 1);
    }

    #[tokio::test]
    async fn test_resolve_unclaimed_id_makes_no_calls() {
        let openai = Arc::new(StubProvider::new(Provider::OpenAi, &["gpt-image-1.5"]));
        let registry = registry(&[Arc::clone(&openai)]);

        let err = registry.resolve("midjourney-v7").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownModelError);
        assert_eq!(openai.list_count(), 0);
    }

    #[tokio::test]
    async fn test_resolve_propagates_fetch_error() {
        let openai = Arc::new(StubProvider::new(Provider::OpenAi, &[]).failing());
        let registry = registry(&[openai]);

        let err = registry.resolve("gpt-image-1.5").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RemoteError);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_catalog_times_out_as_remote_error() {
        let openai = Arc::new(
            StubProvider::new(Provider::OpenAi, &["gpt-image-1.5"])
                .with_list_delay(Duration::from_secs(10)),
        );
        let pool = stub_pool_with_timeout(&[Arc::clone(&openai)], Duration::from_secs(1));
        let registry = ModelRegistry::new(Arc::new(pool));

        let err = registry.resolve("gpt-image-1.5").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RemoteError);
        assert_eq!(err.provider(), Some(Provider::OpenAi));
        assert!(err.to_string().contains("timed out after 1s"));
        assert!(!registry.is_cached(Provider::OpenAi));
    }

    #[tokio::test]
    async fn test_concurrent_first_access_fetches_once() {
        let openai = Arc::new(
            StubProvider::new(Provider::OpenAi, &["gpt-image-1.5"])
                .with_list_delay(Duration::from_millis(20)),
        );
        let registry = Arc::new(registry(&[Arc::clone(&openai)]));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                tokio::spawn(async move { registry.list_models().await.map(|m| m.len()) })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), 1);
        }
        assert_eq!(openai.list_count(), 1);
    }
}
