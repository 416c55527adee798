//! Image generation module.

mod provider;
pub mod providers;
mod types;

pub use provider::ImageProvider;
pub use types::{
    Capabilities, GenerateParams, GenerationRequest, ImageFormat, ImageResult, ModelDescriptor,
    Provider, RawModel, TransformParams, TransformRequest, DEFAULT_SIZE,
};
