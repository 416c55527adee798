//! Core types for image generation.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default edge length in pixels for generated images.
pub const DEFAULT_SIZE: u32 = 1024;

/// Supported image formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    /// PNG format (lossless).
    #[default]
    Png,
    /// JPEG format (lossy).
    Jpeg,
    /// WebP format.
    WebP,
    /// GIF format.
    Gif,
}

impl ImageFormat {
    /// Returns the file extension for this format.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
            Self::WebP => "webp",
            Self::Gif => "gif",
        }
    }

    /// Returns the MIME type for this format.
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::WebP => "image/webp",
            Self::Gif => "image/gif",
        }
    }

    /// Attempts to detect format from file extension.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "png" => Some(Self::Png),
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "webp" => Some(Self::WebP),
            "gif" => Some(Self::Gif),
            _ => None,
        }
    }

    /// Maps a MIME type reported by a provider to a format.
    pub fn from_mime_type(mime: &str) -> Option<Self> {
        match mime {
            "image/png" => Some(Self::Png),
            "image/jpeg" | "image/jpg" => Some(Self::Jpeg),
            "image/webp" => Some(Self::WebP),
            "image/gif" => Some(Self::Gif),
            _ => None,
        }
    }

    /// Detects image format from magic bytes.
    pub fn from_magic_bytes(data: &[u8]) -> Option<Self> {
        // PNG: 89 50 4E 47 0D 0A 1A 0A
        if data.starts_with(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]) {
            return Some(Self::Png);
        }

        // JPEG: FF D8 FF
        if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
            return Some(Self::Jpeg);
        }

        if data.starts_with(b"GIF87a") || data.starts_with(b"GIF89a") {
            return Some(Self::Gif);
        }

        // WebP: RIFF....WEBP
        if data.len() >= 12 && data.starts_with(b"RIFF") && &data[8..12] == b"WEBP" {
            return Some(Self::WebP);
        }

        None
    }
}

impl std::fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

/// The remote back ends images can be generated with.
///
/// Declaration order is the order in which catalogs are merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Provider {
    /// AWS Bedrock (Amazon Nova/Titan and Stability models).
    #[serde(rename = "aws")]
    Bedrock,
    /// OpenAI Images API.
    #[serde(rename = "openai")]
    OpenAi,
    /// Google Gemini API (Gemini image and Imagen models).
    #[serde(rename = "gemini")]
    Gemini,
}

impl Provider {
    /// All providers in declaration order.
    pub const ALL: [Provider; 3] = [Provider::Bedrock, Provider::OpenAi, Provider::Gemini];

    /// Short identifier used in configuration and tool output.
    pub fn slug(&self) -> &'static str {
        match self {
            Self::Bedrock => "aws",
            Self::OpenAi => "openai",
            Self::Gemini => "gemini",
        }
    }

    /// Human readable name.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Bedrock => "AWS Bedrock",
            Self::OpenAi => "OpenAI",
            Self::Gemini => "Google Gemini",
        }
    }

    /// Environment flag that enables this provider.
    pub fn enable_flag(&self) -> &'static str {
        match self {
            Self::Bedrock => "ENABLE_AWS",
            Self::OpenAi => "ENABLE_OPENAI",
            Self::Gemini => "ENABLE_GEMINI",
        }
    }

    /// Parses a provider slug (`aws`, `openai`, `gemini`).
    pub fn from_slug(slug: &str) -> Option<Self> {
        match slug.to_lowercase().as_str() {
            "aws" | "bedrock" => Some(Self::Bedrock),
            "openai" => Some(Self::OpenAi),
            "gemini" | "google" => Some(Self::Gemini),
            _ => None,
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.slug())
    }
}

/// What a model can do beyond plain text-to-image.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    /// Accepts a reference image to steer generation.
    pub supports_reference_image: bool,
    /// Accepts arbitrary width/height rather than a fixed set of sizes.
    pub supports_custom_dimensions: bool,
    /// Superseded or retired upstream; never listed.
    pub is_deprecated: bool,
}

/// A normalized, callable model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    /// Provider-namespaced model identifier, as passed to the provider.
    pub model_id: String,
    /// Display name reported by the provider (falls back to the id).
    pub display_name: String,
    /// Provider that serves this model.
    pub provider: Provider,
    /// Capability flags.
    pub capabilities: Capabilities,
    /// Sizes accepted when custom dimensions are not supported.
    pub allowed_sizes: Vec<(u32, u32)>,
    /// Optional provider description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ModelDescriptor {
    /// Returns true if the model accepts the given output size.
    pub fn accepts_size(&self, width: u32, height: u32) -> bool {
        self.capabilities.supports_custom_dimensions
            || self.allowed_sizes.contains(&(width, height))
    }

    /// Formats the allowed sizes as `WxH, WxH`.
    pub fn allowed_sizes_label(&self) -> String {
        self.allowed_sizes
            .iter()
            .map(|(w, h)| format!("{}x{}", w, h))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// A raw catalog entry, before filtering and capability annotation.
#[derive(Debug, Clone, PartialEq)]
pub struct RawModel {
    /// Model identifier as reported by the provider.
    pub model_id: String,
    /// Display name, if the provider reports one.
    pub display_name: Option<String>,
    /// Provider-specific metadata (lifecycle, modalities, owner, ...).
    pub metadata: serde_json::Value,
}

impl RawModel {
    /// Creates a raw entry with no metadata.
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            display_name: None,
            metadata: serde_json::Value::Null,
        }
    }

    /// Sets the display name.
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    /// Sets the metadata object.
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// Reads a string metadata field.
    pub fn meta_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(|v| v.as_str())
    }
}

/// A request to generate an image, as received by the tool surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Text prompt describing the image.
    pub prompt: String,
    /// Model to generate with.
    pub model_id: String,
    /// Where the caller wants the image written.
    pub output_path: PathBuf,
    /// Optional image steering style/content.
    #[serde(default)]
    pub reference_image_path: Option<PathBuf>,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl GenerationRequest {
    /// Creates a request with the default 1024x1024 size.
    pub fn new(
        prompt: impl Into<String>,
        model_id: impl Into<String>,
        output_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            prompt: prompt.into(),
            model_id: model_id.into(),
            output_path: output_path.into(),
            reference_image_path: None,
            width: DEFAULT_SIZE,
            height: DEFAULT_SIZE,
        }
    }

    /// Sets the desired dimensions.
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Sets a reference image path.
    pub fn with_reference_image(mut self, path: impl Into<PathBuf>) -> Self {
        self.reference_image_path = Some(path.into());
        self
    }
}

/// A request to transform an existing image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformRequest {
    /// Image to transform.
    pub source_image_path: PathBuf,
    /// Description of the transformation.
    pub prompt: String,
    /// Model to transform with.
    pub model_id: String,
    /// Where the caller wants the result written.
    pub output_path: PathBuf,
}

impl TransformRequest {
    /// Creates a transform request.
    pub fn new(
        source_image_path: impl Into<PathBuf>,
        prompt: impl Into<String>,
        model_id: impl Into<String>,
        output_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            source_image_path: source_image_path.into(),
            prompt: prompt.into(),
            model_id: model_id.into(),
            output_path: output_path.into(),
        }
    }
}

/// Parameters handed to a provider client for generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerateParams {
    /// Provider model identifier.
    pub model_id: String,
    /// Text prompt.
    pub prompt: String,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Reference image bytes.
    pub reference_image: Option<Vec<u8>>,
}

/// Parameters handed to a provider client for transformation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformParams {
    /// Provider model identifier.
    pub model_id: String,
    /// Source image bytes.
    pub source_image: Vec<u8>,
    /// Text prompt.
    pub prompt: String,
}

/// Provider-agnostic image output, before it is written anywhere.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "image result should be saved or processed"]
pub struct ImageResult {
    /// Raw image bytes.
    pub data: Vec<u8>,
    /// Image format.
    pub format: ImageFormat,
    /// Provider that produced the image.
    pub provider: Provider,
    /// Model that produced the image.
    pub model_id: String,
}

impl ImageResult {
    /// Creates a result, detecting the format from magic bytes (PNG if unknown).
    pub fn from_bytes(data: Vec<u8>, provider: Provider, model_id: impl Into<String>) -> Self {
        let format = ImageFormat::from_magic_bytes(&data).unwrap_or_default();
        Self {
            data,
            format,
            provider,
            model_id: model_id.into(),
        }
    }

    /// Uses a format declared by the provider when the bytes were not recognized.
    #[must_use]
    pub fn with_declared_format(mut self, declared: Option<ImageFormat>) -> Self {
        if let Some(format) = declared {
            if ImageFormat::from_magic_bytes(&self.data).is_none() {
                self.format = format;
            }
        }
        self
    }

    /// Returns the size of the image data in bytes.
    pub fn size(&self) -> usize {
        self.data.len()
    }
}
