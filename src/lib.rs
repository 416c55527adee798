#![warn(missing_docs)]
//! Smart Image - uniform image generation over AWS Bedrock, OpenAI and Gemini.
//!
//! Each back end names its models, shapes its requests and reports its errors
//! differently. This crate hides those differences behind one model catalog,
//! one request shape and one error taxonomy, and exposes four tools:
//! `list_models`, `generate_image`, `transform_image` and `prompt_guide`.
//!
//! # Quick Start
//!
//! ```no_run
//! use smart_image::{GenerateImageArgs, ImageTools, ProviderConfig};
//!
//! #[tokio::main]
//! async fn main() -> smart_image::Result<()> {
//!     let tools = ImageTools::new(ProviderConfig::from_env()?);
//!     for model in tools.list_models().await? {
//!         println!("{} ({})", model.model_id, model.provider);
//!     }
//!     let output = tools
//!         .generate_image(GenerateImageArgs {
//!             prompt: "A lighthouse on a cliff at dusk".into(),
//!             model_id: "amazon.nova-canvas-v1:0".into(),
//!             output_path: "~/lighthouse.png".into(),
//!             reference_image: None,
//!             width: 1024,
//!             height: 1024,
//!         })
//!         .await?;
//!     println!("saved to {}", output.output_path);
//!     Ok(())
//! }
//! ```
//!
//! # Configuration
//!
//! Providers are opt-in through `ENABLE_AWS`, `ENABLE_OPENAI` and
//! `ENABLE_GEMINI`. See [`ProviderConfig::from_env`].
//!
//! # Features
//!
//! - `bedrock`: AWS Bedrock (Nova Canvas, Titan, Stability)
//! - `openai`: OpenAI Images API (gpt-image, dall-e)
//! - `gemini`: Gemini API (Gemini image models, Imagen)
//! - `cli`: the `smart-image` binary

mod error;

pub mod catalog;
pub mod config;
pub mod dispatch;
pub mod image;
pub mod mcp;
pub mod pool;
pub mod registry;
pub mod tools;

#[cfg(test)]
mod testing;

// Re-export error types at crate root
pub use error::{ErrorKind, Result, SmartImageError};

pub use config::{BedrockSettings, GeminiSettings, OpenAiSettings, ProviderConfig};
pub use dispatch::{Dispatcher, FsImageStore, ImageStore};
pub use image::{
    Capabilities, GenerateParams, GenerationRequest, ImageFormat, ImageProvider, ImageResult,
    ModelDescriptor, Provider, RawModel, TransformParams, TransformRequest,
};
pub use mcp::McpServer;
pub use pool::{ClientFactory, ClientPool, NativeClientFactory};
pub use registry::ModelRegistry;
pub use tools::{GenerateImageArgs, ImageTools, ModelSummary, ToolOutput, TransformImageArgs};

#[cfg(feature = "bedrock")]
pub use image::providers::BedrockProvider;

#[cfg(feature = "gemini")]
pub use image::providers::GeminiProvider;

#[cfg(feature = "openai")]
pub use image::providers::OpenAiImageProvider;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::config::ProviderConfig;
    pub use crate::error::{Result, SmartImageError};
    pub use crate::image::{GenerationRequest, ImageProvider, ImageResult, Provider};
    pub use crate::tools::{GenerateImageArgs, ImageTools, TransformImageArgs};
}
