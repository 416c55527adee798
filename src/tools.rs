//! The four user-facing operations.
//!
//! [`ImageTools`] is what transports call. It owns path expansion and writing
//! results to disk; everything else is delegated to the registry and
//! dispatcher.

use crate::config::ProviderConfig;
use crate::dispatch::{Dispatcher, FsImageStore, ImageStore};
use crate::error::{Result, SmartImageError};
use crate::image::{
    GenerationRequest, ImageFormat, ImageResult, Provider, TransformRequest, DEFAULT_SIZE,
};
use crate::pool::ClientPool;
use crate::registry::ModelRegistry;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

const PROMPT_GUIDE: &str = r#"# Writing image prompts

## Shape of a good prompt
Subject, then details, style, lighting, mood and composition. Lead with what
matters most and separate ideas with commas.

## Subject
Name the subject precisely.
- Weak: "a bird"
- Better: "a kingfisher with iridescent blue wings perched on a mossy branch"

## Setting
Place the subject somewhere.
- "a lighthouse on a basalt cliff above a stormy sea"

## Style
- photorealistic, watercolor, oil painting, ink sketch, 3D render, pixel art

## Lighting
- golden hour, overcast, rim light, neon glow, soft studio light

## Mood
- calm, eerie, playful, nostalgic, dramatic

## Composition
- close-up, wide shot, aerial view, macro, centered, rule of thirds

## Examples
- "An elderly fisherman mending a net on a wooden dock, weathered hands,
  morning fog, muted colors, documentary photograph"
- "A glass teapot of blooming jasmine tea on a slate table, steam, soft
  window light, shallow depth of field, product photography"
- "A floating market city in the clouds, hot air balloons, warm sunset,
  highly detailed digital painting"

## Tips
1. Add detail, but keep it coherent.
2. Avoid contradictions such as "a dark, brightly lit room".
3. When transforming an image, describe the change, not the whole scene.
4. Call list_models to see which models accept reference images and which
   sizes each model supports.
"#;

/// One entry of `list_models`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSummary {
    /// Identifier to pass to `generate_image` / `transform_image`.
    pub model_id: String,
    /// Human-readable name.
    pub display_name: String,
    /// Provider slug (`aws`, `openai`, `gemini`).
    pub provider: Provider,
}

/// Arguments for `generate_image`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerateImageArgs {
    /// Text prompt.
    pub prompt: String,
    /// Model to use.
    pub model_id: String,
    /// Destination file; a leading `~` is expanded.
    pub output_path: String,
    /// Optional reference image path.
    #[serde(default)]
    pub reference_image: Option<String>,
    /// Width in pixels.
    #[serde(default = "default_size")]
    pub width: u32,
    /// Height in pixels.
    #[serde(default = "default_size")]
    pub height: u32,
}

/// Arguments for `transform_image`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformImageArgs {
    /// Image to transform.
    pub image_path: String,
    /// Description of the change.
    pub prompt: String,
    /// Model to use.
    pub model_id: String,
    /// Destination file; a leading `~` is expanded.
    pub output_path: String,
}

/// Result of a generation or transformation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolOutput {
    /// Where the image was written.
    pub output_path: String,
}

fn default_size() -> u32 {
    DEFAULT_SIZE
}

/// Entry point for every transport.
pub struct ImageTools {
    registry: Arc<ModelRegistry>,
    dispatcher: Dispatcher,
    store: Arc<dyn ImageStore>,
}

impl ImageTools {
    /// Builds the tool surface over the real provider clients.
    pub fn new(config: ProviderConfig) -> Self {
        Self::from_pool(ClientPool::new(config))
    }

    /// Builds the tool surface over an existing pool, writing to the filesystem.
    pub fn from_pool(pool: ClientPool) -> Self {
        Self::with_store(pool, Arc::new(FsImageStore))
    }

    /// Builds the tool surface with a custom image store.
    pub fn with_store(pool: ClientPool, store: Arc<dyn ImageStore>) -> Self {
        let pool = Arc::new(pool);
        let registry = Arc::new(ModelRegistry::new(Arc::clone(&pool)));
        let dispatcher = Dispatcher::new(Arc::clone(&registry), pool, Arc::clone(&store));
        Self {
            registry,
            dispatcher,
            store,
        }
    }

    /// Lists every available, non-deprecated model.
    pub async fn list_models(&self) -> Result<Vec<ModelSummary>> {
        let models = self.registry.list_models().await?;
        Ok(models
            .into_iter()
            .map(|m| ModelSummary {
                model_id: m.model_id,
                display_name: m.display_name,
                provider: m.provider,
            })
            .collect())
    }

    /// Generates an image and writes it to `output_path`.
    pub async fn generate_image(&self, args: GenerateImageArgs) -> Result<ToolOutput> {
        let output_path = expand_path(&args.output_path)?;
        let mut request = GenerationRequest::new(args.prompt, args.model_id, &output_path)
            .with_size(args.width, args.height);
        if let Some(reference) = &args.reference_image {
            request = request.with_reference_image(expand_path(reference)?);
        }

        let image = self.dispatcher.generate(&request).await?;
        self.save(&image, &output_path).await
    }

    /// Transforms an existing image and writes the result to `output_path`.
    pub async fn transform_image(&self, args: TransformImageArgs) -> Result<ToolOutput> {
        let output_path = expand_path(&args.output_path)?;
        let request = TransformRequest::new(
            expand_path(&args.image_path)?,
            args.prompt,
            args.model_id,
            &output_path,
        );

        let image = self.dispatcher.transform(&request).await?;
        self.save(&image, &output_path).await
    }

    /// Returns guidance for writing effective prompts.
    pub fn prompt_guide(&self) -> &'static str {
        PROMPT_GUIDE
    }

    async fn save(&self, image: &ImageResult, path: &Path) -> Result<ToolOutput> {
        let declared = path
            .extension()
            .and_then(|e| e.to_str())
            .and_then(ImageFormat::from_extension);
        if declared.is_some_and(|f| f != image.format) {
            tracing::warn!(
                path = %path.display(),
                format = %image.format,
                "output extension does not match image format; writing bytes unchanged"
            );
        }

        self.store.write(path, &image.data).await.map_err(|e| {
            SmartImageError::invalid_input(format!("cannot write {}: {}", path.display(), e))
        })?;
        tracing::debug!(path = %path.display(), size_bytes = image.size(), "image written");

        Ok(ToolOutput {
            output_path: path.display().to_string(),
        })
    }
}

impl std::fmt::Debug for ImageTools {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageTools")
            .field("dispatcher", &self.dispatcher)
            .finish_non_exhaustive()
    }
}

/// Expands a leading `~` and rejects empty paths.
fn expand_path(raw: &str) -> Result<PathBuf> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(SmartImageError::invalid_input("path must not be empty"));
    }
    Ok(PathBuf::from(shellexpand::tilde(trimmed).into_owned()))
}
