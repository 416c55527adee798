//! Process-scoped provider client pool.
//!
//! Clients are constructed on first use, at most once per provider, even under
//! concurrent first access. A failed construction is not cached and is
//! retried on the next call. Disabled providers never get a client.

use crate::config::ProviderConfig;
use crate::error::{Result, SmartImageError};
use crate::image::{ImageProvider, Provider};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::OnceCell;

/// Builds a provider client from the configuration.
pub trait ClientFactory: Send + Sync {
    /// Constructs the client for `provider`. Only called for enabled providers.
    fn build(&self, provider: Provider, config: &ProviderConfig) -> Result<Arc<dyn ImageProvider>>;
}

impl<F> ClientFactory for F
where
    F: Fn(Provider, &ProviderConfig) -> Result<Arc<dyn ImageProvider>> + Send + Sync,
{
    fn build(&self, provider: Provider, config: &ProviderConfig) -> Result<Arc<dyn ImageProvider>> {
        self(provider, config)
    }
}

/// Factory for the real Bedrock, OpenAI and Gemini clients.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeClientFactory;

impl ClientFactory for NativeClientFactory {
    fn build(&self, provider: Provider, config: &ProviderConfig) -> Result<Arc<dyn ImageProvider>> {
        match provider {
            Provider::Bedrock => build_bedrock(config),
            Provider::OpenAi => build_openai(config),
            Provider::Gemini => build_gemini(config),
        }
    }
}

#[cfg(feature = "bedrock")]
fn build_bedrock(config: &ProviderConfig) -> Result<Arc<dyn ImageProvider>> {
    let settings = config
        .bedrock
        .clone()
        .ok_or_else(|| not_enabled(Provider::Bedrock))?;
    Ok(Arc::new(crate::image::providers::BedrockProvider::new(
        settings,
        config.request_timeout,
    )))
}

#[cfg(not(feature = "bedrock"))]
fn build_bedrock(_config: &ProviderConfig) -> Result<Arc<dyn ImageProvider>> {
    Err(compiled_out(Provider::Bedrock))
}

#[cfg(feature = "openai")]
fn build_openai(config: &ProviderConfig) -> Result<Arc<dyn ImageProvider>> {
    let settings = config
        .openai
        .clone()
        .ok_or_else(|| not_enabled(Provider::OpenAi))?;
    Ok(Arc::new(crate::image::providers::OpenAiImageProvider::new(
        settings,
        config.request_timeout,
    )))
}

#[cfg(not(feature = "openai"))]
fn build_openai(_config: &ProviderConfig) -> Result<Arc<dyn ImageProvider>> {
    Err(compiled_out(Provider::OpenAi))
}

#[cfg(feature = "gemini")]
fn build_gemini(config: &ProviderConfig) -> Result<Arc<dyn ImageProvider>> {
    let settings = config
        .gemini
        .clone()
        .ok_or_else(|| not_enabled(Provider::Gemini))?;
    Ok(Arc::new(crate::image::providers::GeminiProvider::new(
        settings,
        config.request_timeout,
    )))
}

#[cfg(not(feature = "gemini"))]
fn build_gemini(_config: &ProviderConfig) -> Result<Arc<dyn ImageProvider>> {
    Err(compiled_out(Provider::Gemini))
}

fn not_enabled(provider: Provider) -> SmartImageError {
    SmartImageError::ProviderUnavailable {
        provider,
        message: format!("not enabled. Set {}=true", provider.enable_flag()),
    }
}

#[allow(dead_code)]
fn compiled_out(provider: Provider) -> SmartImageError {
    SmartImageError::ProviderUnavailable {
        provider,
        message: format!("support for {} was not compiled in", provider.label()),
    }
}

/// Lazily constructed clients, keyed by provider.
pub struct ClientPool {
    config: Arc<ProviderConfig>,
    factory: Box<dyn ClientFactory>,
    clients: HashMap<Provider, OnceCell<Arc<dyn ImageProvider>>>,
}

impl ClientPool {
    /// Creates a pool that builds the real provider clients.
    pub fn new(config: ProviderConfig) -> Self {
        Self::with_factory(config, NativeClientFactory)
    }

    /// Creates a pool with a custom client factory.
    pub fn with_factory(config: ProviderConfig, factory: impl ClientFactory + 'static) -> Self {
        let clients = config
            .enabled_providers()
            .into_iter()
            .map(|p| (p, OnceCell::new()))
            .collect();
        Self {
            config: Arc::new(config),
            factory: Box::new(factory),
            clients,
        }
    }

    /// The configuration this pool was built from.
    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    /// Enabled providers in declaration order.
    pub fn enabled_providers(&self) -> Vec<Provider> {
        self.config.enabled_providers()
    }

    /// Returns the client for `provider`, constructing it on first use.
    pub async fn get(&self, provider: Provider) -> Result<Arc<dyn ImageProvider>> {
        let cell = self
            .clients
            .get(&provider)
            .ok_or_else(|| not_enabled(provider))?;
        let client = cell
            .get_or_try_init(|| async {
                tracing::debug!(provider = %provider, "constructing provider client");
                self.factory.build(provider, &self.config)
            })
            .await?;
        Ok(Arc::clone(client))
    }

    /// Returns true if the client for `provider` has been constructed.
    pub fn is_constructed(&self, provider: Provider) -> bool {
        self.clients
            .get(&provider)
            .is_some_and(|cell| cell.initialized())
    }
}

impl std::fmt::Debug for ClientPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientPool")
            .field("config", &self.config)
            .field("providers", &self.clients.keys().collect::<Vec<_>>())
            .finish()
    }
}
