//! Per-provider catalog rules.
//!
//! Each provider names and versions its models differently, so relevance,
//! deprecation and capability detection are pure functions over the raw
//! catalog entry, registered per provider in [`CatalogRules`]. Nothing here
//! touches the network.

use crate::image::{Capabilities, ModelDescriptor, Provider, RawModel, DEFAULT_SIZE};

const SQUARE: (u32, u32) = (DEFAULT_SIZE, DEFAULT_SIZE);

/// Bedrock models superseded by newer generations or that only edit images.
const BEDROCK_DEPRECATED: &[&str] = &[
    "amazon.titan-image-generator-v2:0",
    "stability.stable-creative-upscale-v1:0",
    "stability.stable-conservative-upscale-v1:0",
    "stability.stable-fast-upscale-v1:0",
    "stability.stable-image-remove-background-v1:0",
    "stability.stable-image-control-sketch-v1:0",
    "stability.stable-image-control-structure-v1:0",
    "stability.stable-image-search-recolor-v1:0",
    "stability.stable-image-search-replace-v1:0",
    "stability.stable-image-erase-object-v1:0",
    "stability.stable-image-style-guide-v1:0",
    "stability.stable-style-transfer-v1:0",
    "stability.stable-outpaint-v1:0",
    "stability.stable-image-inpaint-v1:0",
];

/// OpenAI image models replaced by the GPT Image 1.5 generation.
const OPENAI_DEPRECATED: &[&str] = &["dall-e-2", "dall-e-3", "gpt-image-1", "gpt-image-1-mini"];

/// Gemini experimental and preview builds with GA replacements.
const GEMINI_DEPRECATED: &[&str] = &[
    "models/gemini-2.0-flash-exp-image-generation",
    "models/imagen-4.0-generate-preview-06-06",
    "models/imagen-4.0-ultra-generate-preview-06-06",
];

const GPT_IMAGE_SIZES: &[(u32, u32)] = &[(1024, 1024), (1536, 1024), (1024, 1536)];
const DALLE_SIZES: &[(u32, u32)] = &[(1024, 1024), (1792, 1024), (1024, 1792)];

/// Request/response schema families served by Bedrock's `InvokeModel`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BedrockFamily {
    /// Amazon Nova Canvas and Titan Image Generator.
    AmazonImage,
    /// Stability SDXL (`text_prompts` / `artifacts`).
    StabilityLegacy,
    /// Stability SD3, Stable Image Ultra/Core (`prompt` / `images`).
    StabilityModern,
}

impl BedrockFamily {
    /// Detects the schema family from a Bedrock model id.
    pub fn detect(model_id: &str) -> Self {
        if model_id.starts_with("amazon.") {
            Self::AmazonImage
        } else if model_id.starts_with("stability.stable-diffusion-xl") {
            Self::StabilityLegacy
        } else {
            Self::StabilityModern
        }
    }

    /// Whether the family takes explicit width/height.
    pub fn supports_custom_dimensions(&self) -> bool {
        matches!(self, Self::AmazonImage | Self::StabilityLegacy)
    }
}

/// Pure predicates describing one provider's catalog conventions.
#[derive(Debug, Clone, Copy)]
pub struct CatalogRules {
    /// Provider these rules apply to.
    pub provider: Provider,
    /// Keeps only image-generation entries.
    pub is_relevant: fn(&RawModel) -> bool,
    /// Flags superseded, preview or retired entries.
    pub is_deprecated: fn(&RawModel) -> bool,
    /// Derives capability flags and allowed sizes (deprecation excluded).
    pub capabilities: fn(&RawModel) -> (Capabilities, Vec<(u32, u32)>),
    /// Whether a model id follows this provider's naming convention.
    pub claims: fn(&str) -> bool,
}

static BEDROCK_RULES: CatalogRules = CatalogRules {
    provider: Provider::Bedrock,
    is_relevant: bedrock_is_relevant,
    is_deprecated: bedrock_is_deprecated,
    capabilities: bedrock_capabilities,
    claims: bedrock_claims,
};

static OPENAI_RULES: CatalogRules = CatalogRules {
    provider: Provider::OpenAi,
    is_relevant: openai_is_relevant,
    is_deprecated: openai_is_deprecated,
    capabilities: openai_capabilities,
    claims: openai_claims,
};

static GEMINI_RULES: CatalogRules = CatalogRules {
    provider: Provider::Gemini,
    is_relevant: gemini_is_relevant,
    is_deprecated: gemini_is_deprecated,
    capabilities: gemini_capabilities,
    claims: gemini_claims,
};

impl CatalogRules {
    /// Returns the rules registered for a provider.
    pub fn for_provider(provider: Provider) -> &'static CatalogRules {
        match provider {
            Provider::Bedrock => &BEDROCK_RULES,
            Provider::OpenAi => &OPENAI_RULES,
            Provider::Gemini => &GEMINI_RULES,
        }
    }

    /// Annotates a raw entry. Returns `None` for irrelevant entries.
    ///
    /// Deprecated entries are returned with `is_deprecated` set so callers can
    /// log what they drop.
    pub fn describe(&self, raw: &RawModel) -> Option<ModelDescriptor> {
        if !(self.is_relevant)(raw) {
            return None;
        }
        let (mut capabilities, allowed_sizes) = (self.capabilities)(raw);
        capabilities.is_deprecated = (self.is_deprecated)(raw);
        Some(ModelDescriptor {
            model_id: raw.model_id.clone(),
            display_name: raw
                .display_name
                .clone()
                .unwrap_or_else(|| raw.model_id.clone()),
            provider: self.provider,
            capabilities,
            allowed_sizes,
            description: raw.meta_str("description").map(str::to_string),
        })
    }

    /// Filters and annotates a whole catalog, keeping catalog order.
    pub fn filter_catalog(&self, raw: &[RawModel]) -> Vec<ModelDescriptor> {
        raw.iter()
            .filter_map(|m| self.describe(m))
            .filter(|d| {
                if d.capabilities.is_deprecated {
                    tracing::trace!(
                        provider = %self.provider,
                        model = %d.model_id,
                        "skipping deprecated model"
                    );
                }
                !d.capabilities.is_deprecated
            })
            .collect()
    }
}

/// Normalizes a user-supplied id to the form the provider's catalog uses.
pub fn canonical_model_id(provider: Provider, model_id: &str) -> String {
    match provider {
        Provider::Gemini if !model_id.starts_with("models/") => format!("models/{}", model_id),
        _ => model_id.to_string(),
    }
}

/// Providers whose naming convention claims the id, in declaration order.
pub fn claiming_providers(model_id: &str) -> Vec<Provider> {
    Provider::ALL
        .into_iter()
        .filter(|p| (CatalogRules::for_provider(*p).claims)(model_id))
        .collect()
}

fn bedrock_is_relevant(raw: &RawModel) -> bool {
    // ListFoundationModels is already filtered to IMAGE output.
    !raw.model_id.is_empty()
}

fn bedrock_is_deprecated(raw: &RawModel) -> bool {
    BEDROCK_DEPRECATED.contains(&raw.model_id.as_str())
        || raw
            .meta_str("lifecycle_status")
            .is_some_and(|s| s.eq_ignore_ascii_case("LEGACY"))
}

fn bedrock_capabilities(raw: &RawModel) -> (Capabilities, Vec<(u32, u32)>) {
    let accepts_images = raw
        .metadata
        .get("input_modalities")
        .and_then(|v| v.as_array())
        .is_some_and(|m| m.iter().any(|v| v.as_str() == Some("IMAGE")));
    let family = BedrockFamily::detect(&raw.model_id);
    (
        Capabilities {
            supports_reference_image: accepts_images,
            supports_custom_dimensions: family.supports_custom_dimensions(),
            is_deprecated: false,
        },
        vec![SQUARE],
    )
}

fn bedrock_claims(model_id: &str) -> bool {
    model_id.starts_with("amazon.") || model_id.starts_with("stability.")
}

fn openai_is_relevant(raw: &RawModel) -> bool {
    let id = raw.model_id.to_lowercase();
    ["image", "dall", "gpt-image"].iter().any(|x| id.contains(x))
}

fn openai_is_deprecated(raw: &RawModel) -> bool {
    OPENAI_DEPRECATED.contains(&raw.model_id.as_str())
}

fn openai_capabilities(raw: &RawModel) -> (Capabilities, Vec<(u32, u32)>) {
    let id = raw.model_id.to_lowercase();
    let is_dalle = id.starts_with("dall-e");
    let sizes = if is_dalle { DALLE_SIZES } else { GPT_IMAGE_SIZES };
    (
        Capabilities {
            // dall-e-3 has no edits endpoint support
            supports_reference_image: !id.starts_with("dall-e-3"),
            supports_custom_dimensions: false,
            is_deprecated: false,
        },
        sizes.to_vec(),
    )
}

fn openai_claims(model_id: &str) -> bool {
    let id = model_id.to_lowercase();
    id.contains("gpt") || id.contains("dall") || id.contains("chatgpt")
}

fn gemini_is_relevant(raw: &RawModel) -> bool {
    raw.model_id.to_lowercase().contains("image")
}

fn gemini_is_deprecated(raw: &RawModel) -> bool {
    GEMINI_DEPRECATED.contains(&raw.model_id.as_str())
        || raw.model_id.contains("-exp-image-generation")
}

fn gemini_capabilities(raw: &RawModel) -> (Capabilities, Vec<(u32, u32)>) {
    (
        Capabilities {
            supports_reference_image: !is_imagen(&raw.model_id),
            supports_custom_dimensions: false,
            is_deprecated: false,
        },
        vec![SQUARE],
    )
}

fn gemini_claims(model_id: &str) -> bool {
    let id = model_id.to_lowercase();
    id.contains("gemini") || id.contains("imagen")
}

/// Imagen models use `:predict` rather than `:generateContent`.
pub fn is_imagen(model_id: &str) -> bool {
    model_id
        .trim_start_matches("models/")
        .to_lowercase()
        .starts_with("imagen")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn bedrock(id: &str, status: &str, inputs: &[&str]) -> RawModel {
        RawModel::new(id).with_metadata(json!({
            "lifecycle_status": status,
            "input_modalities": inputs,
        }))
    }

    #[test]
    fn test_bedrock_filters_legacy_and_excluded() {
        let rules = CatalogRules::for_provider(Provider::Bedrock);
        let catalog = vec![
            bedrock("amazon.nova-canvas-v1:0", "ACTIVE", &["TEXT", "IMAGE"]),
            bedrock("amazon.titan-image-generator-v2:0", "ACTIVE", &["TEXT", "IMAGE"]),
            bedrock("amazon.titan-image-generator-v1", "LEGACY", &["TEXT", "IMAGE"]),
            bedrock("stability.stable-image-inpaint-v1:0", "ACTIVE", &["TEXT", "IMAGE"]),
            bedrock("stability.sd3-5-large-v1:0", "ACTIVE", &["TEXT"]),
        ];
        let ids: Vec<String> = rules
            .filter_catalog(&catalog)
            .into_iter()
            .map(|d| d.model_id)
            .collect();
        assert_eq!(ids, vec!["amazon.nova-canvas-v1:0", "stability.sd3-5-large-v1:0"]);
    }

    #[test]
    fn test_bedrock_capabilities() {
        let rules = CatalogRules::for_provider(Provider::Bedrock);
        let nova = rules
            .describe(&bedrock("amazon.nova-canvas-v1:0", "ACTIVE", &["TEXT", "IMAGE"]))
            .unwrap();
        assert!(nova.capabilities.supports_reference_image);
        assert!(nova.capabilities.supports_custom_dimensions);

        let sd3 = rules
            .describe(&bedrock("stability.sd3-5-large-v1:0", "ACTIVE", &["TEXT"]))
            .unwrap();
        assert!(!sd3.capabilities.supports_reference_image);
        assert!(!sd3.capabilities.supports_custom_dimensions);
        assert_eq!(sd3.allowed_sizes, vec![(1024, 1024)]);
    }

    #[test]
    fn test_openai_keeps_only_current_image_models() {
        let rules = CatalogRules::for_provider(Provider::OpenAi);
        let catalog: Vec<RawModel> =
            ["gpt-4o", "dall-e-3", "gpt-image-1", "gpt-image-1.5", "whisper-1"]
                .into_iter()
                .map(RawModel::new)
                .collect();
        let kept = rules.filter_catalog(&catalog);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].model_id, "gpt-image-1.5");
        assert_eq!(kept[0].display_name, "gpt-image-1.5");
        assert!(kept[0].capabilities.supports_reference_image);
        assert!(kept[0].accepts_size(1536, 1024));
        assert!(!kept[0].accepts_size(512, 768));
    }

    #[test]
    fn test_gemini_rules() {
        let rules = CatalogRules::for_provider(Provider::Gemini);
        let catalog = vec![
            RawModel::new("models/gemini-2.5-flash").with_display_name("Gemini 2.5 Flash"),
            RawModel::new("models/gemini-2.5-flash-image").with_display_name("Nano Banana"),
            RawModel::new("models/gemini-2.0-flash-exp-image-generation"),
            RawModel::new("models/imagen-4.0-generate-001"),
            RawModel::new("models/imagen-4.0-generate-preview-06-06"),
        ];
        let kept = rules.filter_catalog(&catalog);
        let ids: Vec<&str> = kept.iter().map(|d| d.model_id.as_str()).collect();
        assert_eq!(
            ids,
            vec!["models/gemini-2.5-flash-image", "models/imagen-4.0-generate-001"]
        );
        assert_eq!(kept[0].display_name, "Nano Banana");
        assert!(kept[0].capabilities.supports_reference_image);
        assert!(!kept[1].capabilities.supports_reference_image);
    }

    #[test]
    fn test_describe_marks_deprecated() {
        let rules = CatalogRules::for_provider(Provider::OpenAi);
        let d = rules.describe(&RawModel::new("dall-e-2")).unwrap();
        assert!(d.capabilities.is_deprecated);
        assert!(rules.describe(&RawModel::new("tts-1")).is_none());
    }

    #[test]
    fn test_claiming_providers() {
        assert_eq!(claiming_providers("amazon.nova-canvas-v1:0"), vec![Provider::Bedrock]);
        assert_eq!(claiming_providers("gpt-image-1.5"), vec![Provider::OpenAi]);
        assert_eq!(claiming_providers("gemini-2.5-flash-image"), vec![Provider::Gemini]);
        assert_eq!(claiming_providers("models/imagen-4.0-generate-001"), vec![Provider::Gemini]);
        assert!(claiming_providers("midjourney-v6").is_empty());
    }

    #[test]
    fn test_canonical_model_id() {
        assert_eq!(
            canonical_model_id(Provider::Gemini, "gemini-2.5-flash-image"),
            "models/gemini-2.5-flash-image"
        );
        assert_eq!(
            canonical_model_id(Provider::Gemini, "models/gemini-2.5-flash-image"),
            "models/gemini-2.5-flash-image"
        );
        assert_eq!(canonical_model_id(Provider::OpenAi, "gpt-image-1.5"), "gpt-image-1.5");
    }

    #[test]
    fn test_bedrock_family_detection() {
        assert_eq!(BedrockFamily::detect("amazon.nova-canvas-v1:0"), BedrockFamily::AmazonImage);
        assert_eq!(
            BedrockFamily::detect("stability.stable-diffusion-xl-v1"),
            BedrockFamily::StabilityLegacy
        );
        assert_eq!(
            BedrockFamily::detect("stability.stable-image-ultra-v1:1"),
            BedrockFamily::StabilityModern
        );
    }

    #[test]
    fn test_is_imagen() {
        assert!(is_imagen("models/imagen-4.0-generate-001"));
        assert!(is_imagen("imagen-3.0-generate-002"));
        assert!(!is_imagen("models/gemini-2.5-flash-image"));
    }
}
