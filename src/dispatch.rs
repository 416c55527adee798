//! Routes uniform requests to the owning provider.
//!
//! All validation happens here, before any remote call: the model must
//! resolve, the requested size and reference image must match its
//! capabilities, and input images must be readable and recognizable.

use crate::error::{Result, SmartImageError};
use crate::image::{
    GenerateParams, GenerationRequest, ImageFormat, ImageResult, ModelDescriptor, Provider,
    TransformParams, TransformRequest,
};
use crate::pool::ClientPool;
use crate::registry::ModelRegistry;
use async_trait::async_trait;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Reads input images and writes generated ones.
#[async_trait]
pub trait ImageStore: Send + Sync {
    /// Reads the whole file at `path`.
    async fn read(&self, path: &Path) -> std::io::Result<Vec<u8>>;

    /// Writes `data` to `path`, creating parent directories.
    async fn write(&self, path: &Path, data: &[u8]) -> std::io::Result<()>;
}

/// [`ImageStore`] backed by the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsImageStore;

#[async_trait]
impl ImageStore for FsImageStore {
    async fn read(&self, path: &Path) -> std::io::Result<Vec<u8>> {
        tokio::fs::read(path).await
    }

    async fn write(&self, path: &Path, data: &[u8]) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        tokio::fs::write(path, data).await
    }
}

/// Validates requests and invokes the owning provider client.
pub struct Dispatcher {
    registry: Arc<ModelRegistry>,
    pool: Arc<ClientPool>,
    store: Arc<dyn ImageStore>,
    timeout: Duration,
}

impl Dispatcher {
    /// Creates a dispatcher sharing the registry and client pool.
    pub fn new(
        registry: Arc<ModelRegistry>,
        pool: Arc<ClientPool>,
        store: Arc<dyn ImageStore>,
    ) -> Self {
        let timeout = pool.config().request_timeout;
        Self {
            registry,
            pool,
            store,
            timeout,
        }
    }

    /// Generates an image from a text prompt and optional reference image.
    pub async fn generate(&self, request: &GenerationRequest) -> Result<ImageResult> {
        require_prompt(&request.prompt)?;
        let model = self.registry.resolve(&request.model_id).await?;

        if request.reference_image_path.is_some() && !model.capabilities.supports_reference_image
        {
            return Err(SmartImageError::unsupported(
                model.provider,
                format!("{} does not accept a reference image", model.model_id),
            ));
        }
        if !model.accepts_size(request.width, request.height) {
            return Err(SmartImageError::unsupported(
                model.provider,
                format!(
                    "{} does not support {}x{}. Allowed sizes: {}",
                    model.model_id,
                    request.width,
                    request.height,
                    model.allowed_sizes_label()
                ),
            ));
        }
        if request.width == 0 || request.height == 0 {
            return Err(SmartImageError::invalid_input(format!(
                "width and height must be positive, got {}x{}",
                request.width, request.height
            )));
        }

        let reference_image = match &request.reference_image_path {
            Some(path) => Some(self.read_image(path, "reference image").await?),
            None => None,
        };

        let params = GenerateParams {
            model_id: model.model_id.clone(),
            prompt: request.prompt.clone(),
            width: request.width,
            height: request.height,
            reference_image,
        };

        let client = self.pool.get(model.provider).await?;
        self.bounded(&model, "generate", client.generate(&params))
            .await
    }

    /// Transforms an existing image according to a prompt.
    pub async fn transform(&self, request: &TransformRequest) -> Result<ImageResult> {
        require_prompt(&request.prompt)?;
        let model = self.registry.resolve(&request.model_id).await?;
        let source_image = self
            .read_image(&request.source_image_path, "source image")
            .await?;

        let params = TransformParams {
            model_id: model.model_id.clone(),
            source_image,
            prompt: request.prompt.clone(),
        };

        let client = self.pool.get(model.provider).await?;
        self.bounded(&model, "transform", client.transform(&params))
            .await
    }

    async fn read_image(&self, path: &Path, what: &str) -> Result<Vec<u8>> {
        let data = self.store.read(path).await.map_err(|e| {
            SmartImageError::invalid_input(format!(
                "cannot read {} {}: {}",
                what,
                path.display(),
                e
            ))
        })?;
        if ImageFormat::from_magic_bytes(&data).is_none() {
            return Err(SmartImageError::invalid_input(format!(
                "{} {} is not a PNG, JPEG, WebP or GIF image",
                what,
                path.display()
            )));
        }
        Ok(data)
    }

    async fn bounded<F>(
        &self,
        model: &ModelDescriptor,
        operation: &str,
        call: F,
    ) -> Result<ImageResult>
    where
        F: Future<Output = Result<ImageResult>>,
    {
        let start = Instant::now();
        let result = tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| timed_out(model.provider, self.timeout))??;
        tracing::info!(
            provider = %model.provider,
            model = %model.model_id,
            operation,
            duration_ms = start.elapsed().as_millis() as u64,
            size_bytes = result.size(),
            format = %result.format,
            "image produced"
        );
        Ok(result)
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("registry", &self.registry)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

fn require_prompt(prompt: &str) -> Result<()> {
    if prompt.trim().is_empty() {
        return Err(SmartImageError::invalid_input("prompt must not be empty"));
    }
    Ok(())
}

fn timed_out(provider: Provider, timeout: Duration) -> SmartImageError {
    SmartImageError::remote(
        provider,
        format!("request timed out after {}s", timeout.as_secs()),
    )
}
