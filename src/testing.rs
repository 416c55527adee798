//! In-process stub providers for unit tests.

use crate::config::{BedrockSettings, GeminiSettings, OpenAiSettings, ProviderConfig};
use crate::error::{Result, SmartImageError};
use crate::image::{GenerateParams, ImageProvider, ImageResult, Provider, RawModel, TransformParams};
use crate::pool::ClientPool;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub(crate) const PNG_BYTES: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];

/// Records every call and answers with canned data.
pub(crate) struct StubProvider {
    pub kind: Provider,
    pub models: Vec<RawModel>,
    pub fail_listing: bool,
    pub list_delay: Option<Duration>,
    pub generate_delay: Option<Duration>,
    pub image: Vec<u8>,
    pub list_calls: AtomicUsize,
    pub generate_calls: Mutex<Vec<GenerateParams>>,
    pub transform_calls: Mutex<Vec<TransformParams>>,
}

impl StubProvider {
    pub fn new(kind: Provider, model_ids: &[&str]) -> Self {
        Self {
            kind,
            models: model_ids.iter().map(|id| RawModel::new(*id)).collect(),
            fail_listing: false,
            list_delay: None,
            generate_delay: None,
            image: PNG_BYTES.to_vec(),
            list_calls: AtomicUsize::new(0),
            generate_calls: Mutex::new(Vec::new()),
            transform_calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_models(mut self, models: Vec<RawModel>) -> Self {
        self.models = models;
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail_listing = true;
        self
    }

    pub fn with_list_delay(mut self, delay: Duration) -> Self {
        self.list_delay = Some(delay);
        self
    }

    pub fn with_generate_delay(mut self, delay: Duration) -> Self {
        self.generate_delay = Some(delay);
        self
    }

    pub fn list_count(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn generate_count(&self) -> usize {
        self.generate_calls.lock().unwrap().len()
    }

    pub fn transform_count(&self) -> usize {
        self.transform_calls.lock().unwrap().len()
    }
}

#[async_trait]
impl ImageProvider for StubProvider {
    fn kind(&self) -> Provider {
        self.kind
    }

    async fn list_raw_models(&self) -> Result<Vec<RawModel>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.list_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_listing {
            return Err(SmartImageError::remote(self.kind, "catalog unavailable"));
        }
        Ok(self.models.clone())
    }

    async fn generate(&self, params: &GenerateParams) -> Result<ImageResult> {
        self.generate_calls.lock().unwrap().push(params.clone());
        if let Some(delay) = self.generate_delay {
            tokio::time::sleep(delay).await;
        }
        Ok(ImageResult::from_bytes(
            self.image.clone(),
            self.kind,
            &params.model_id,
        ))
    }

    async fn transform(&self, params: &TransformParams) -> Result<ImageResult> {
        self.transform_calls.lock().unwrap().push(params.clone());
        Ok(ImageResult::from_bytes(
            self.image.clone(),
            self.kind,
            &params.model_id,
        ))
    }
}

/// A configuration enabling exactly the given providers with dummy credentials.
pub(crate) fn config_for(providers: &[Provider]) -> ProviderConfig {
    let mut config = ProviderConfig::disabled();
    for provider in providers {
        config = match provider {
            Provider::Bedrock => config.with_bedrock(BedrockSettings {
                region: "us-east-1".into(),
                profile: None,
            }),
            Provider::OpenAi => config.with_openai(OpenAiSettings {
                api_key: "sk-test".into(),
                base_url: "http://localhost:1".into(),
            }),
            Provider::Gemini => config.with_gemini(GeminiSettings {
                api_key: "AIza-test".into(),
                base_url: "http://localhost:1".into(),
            }),
        };
    }
    config
}

/// A pool serving the given stubs, one per enabled provider.
pub(crate) fn stub_pool(stubs: &[Arc<StubProvider>]) -> ClientPool {
    let providers: Vec<Provider> = stubs.iter().map(|s| s.kind).collect();
    pool_with_config(config_for(&providers), stubs)
}

/// Like [`stub_pool`], with a custom request timeout.
pub(crate) fn stub_pool_with_timeout(stubs: &[Arc<StubProvider>], timeout: Duration) -> ClientPool {
    let providers: Vec<Provider> = stubs.iter().map(|s| s.kind).collect();
    pool_with_config(config_for(&providers).with_timeout(timeout), stubs)
}

fn pool_with_config(config: ProviderConfig, stubs: &[Arc<StubProvider>]) -> ClientPool {
    let stubs = stubs.to_vec();
    ClientPool::with_factory(
        config,
        move |provider: Provider, _: &ProviderConfig| -> Result<Arc<dyn ImageProvider>> {
            stubs
                .iter()
                .find(|s| s.kind == provider)
                .map(|s| Arc::clone(s) as Arc<dyn ImageProvider>)
                .ok_or_else(|| SmartImageError::ProviderUnavailable {
                    provider,
                    message: "no stub".into(),
                })
        },
    )
}
