//! Image provider trait.

use crate::error::Result;
use crate::image::types::{GenerateParams, ImageResult, Provider, RawModel, TransformParams};
use async_trait::async_trait;

/// A remote image-generation back end.
///
/// Implementations build their native handle (credentials, HTTP or SDK
/// session) on the first call to any operation and map every native failure
/// into the shared error categories. They never retry.
#[async_trait]
pub trait ImageProvider: Send + Sync {
    /// Returns the provider identity.
    fn kind(&self) -> Provider;

    /// Fetches the provider's current model catalog, unfiltered.
    async fn list_raw_models(&self) -> Result<Vec<RawModel>>;

    /// Generates an image from a prompt, optionally steered by a reference image.
    async fn generate(&self, params: &GenerateParams) -> Result<ImageResult>;

    /// Transforms an existing image according to a prompt.
    async fn transform(&self, params: &TransformParams) -> Result<ImageResult>;
}
