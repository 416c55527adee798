//! AWS Bedrock image generation provider (Amazon Nova/Titan, Stability).
//!
//! The model catalog comes from the `bedrock` control plane and images from
//! `bedrock-runtime` `InvokeModel`. Request and response bodies differ per
//! model family, see [`BedrockFamily`].

use crate::catalog::BedrockFamily;
use crate::config::BedrockSettings;
use crate::error::{sanitize_error_message, Result, SmartImageError};
use crate::image::provider::ImageProvider;
use crate::image::types::{
    GenerateParams, ImageResult, Provider, RawModel, TransformParams, DEFAULT_SIZE,
};
use async_trait::async_trait;
use aws_config::timeout::TimeoutConfig;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_bedrock::types::ModelModality;
use aws_sdk_bedrockruntime::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_bedrockruntime::primitives::Blob;
use base64::Engine;
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use tokio::sync::OnceCell;

const CFG_SCALE: u32 = 10;
const STEPS: u32 = 50;
const IMAGE_STRENGTH: f64 = 0.7;

/// SDK clients sharing one resolved AWS configuration.
struct BedrockHandle {
    catalog: aws_sdk_bedrock::Client,
    runtime: aws_sdk_bedrockruntime::Client,
}

/// AWS Bedrock image generation provider.
pub struct BedrockProvider {
    settings: BedrockSettings,
    timeout: Duration,
    handle: OnceCell<BedrockHandle>,
}

impl BedrockProvider {
    /// Creates the provider. AWS configuration is resolved on first use.
    pub fn new(settings: BedrockSettings, timeout: Duration) -> Self {
        Self {
            settings,
            timeout,
            handle: OnceCell::new(),
        }
    }

    async fn handle(&self) -> Result<&BedrockHandle> {
        self.handle
            .get_or_try_init(|| async {
                tracing::debug!(
                    region = %self.settings.region,
                    profile = ?self.settings.profile,
                    "resolving AWS configuration"
                );
                let timeouts = TimeoutConfig::builder()
                    .operation_timeout(self.timeout)
                    .build();
                let mut loader = aws_config::defaults(BehaviorVersion::latest())
                    .region(Region::new(self.settings.region.clone()))
                    .timeout_config(timeouts);
                if let Some(profile) = &self.settings.profile {
                    loader = loader.profile_name(profile);
                }
                // Credentials resolve lazily; a missing chain surfaces as an auth
                // error on the first call.
                let sdk_config = loader.load().await;

                Ok::<_, SmartImageError>(BedrockHandle {
                    catalog: aws_sdk_bedrock::Client::new(&sdk_config),
                    runtime: aws_sdk_bedrockruntime::Client::new(&sdk_config),
                })
            })
            .await
    }

    async fn invoke(&self, model_id: &str, body: Value) -> Result<ImageResult> {
        let start = Instant::now();
        let handle = self.handle().await?;
        let payload = serde_json::to_vec(&body)
            .map_err(|e| SmartImageError::remote(Provider::Bedrock, e.to_string()))?;

        let output = handle
            .runtime
            .invoke_model()
            .model_id(model_id)
            .content_type("application/json")
            .accept("application/json")
            .body(Blob::new(payload))
            .send()
            .await
            .map_err(classify_sdk_error)?;

        let data = extract_image(output.body().as_ref())?;
        tracing::debug!(
            model = model_id,
            duration_ms = start.elapsed().as_millis() as u64,
            size_bytes = data.len(),
            "Bedrock image received"
        );
        Ok(ImageResult::from_bytes(data, Provider::Bedrock, model_id))
    }
}

#[async_trait]
impl ImageProvider for BedrockProvider {
    fn kind(&self) -> Provider {
        Provider::Bedrock
    }

    async fn list_raw_models(&self) -> Result<Vec<RawModel>> {
        let handle = self.handle().await?;
        let output = handle
            .catalog
            .list_foundation_models()
            .by_output_modality(ModelModality::Image)
            .send()
            .await
            .map_err(classify_sdk_error)?;

        let models = output
            .model_summaries()
            .iter()
            .map(|summary| {
                let metadata = json!({
                    "provider_name": summary.provider_name(),
                    "input_modalities": summary
                        .input_modalities()
                        .iter()
                        .map(|m| m.as_str())
                        .collect::<Vec<_>>(),
                    "lifecycle_status": summary.model_lifecycle().map(|l| l.status().as_str()),
                });
                let raw = RawModel::new(summary.model_id()).with_metadata(metadata);
                match summary.model_name() {
                    Some(name) => raw.with_display_name(name),
                    None => raw,
                }
            })
            .collect();
        Ok(models)
    }

    async fn generate(&self, params: &GenerateParams) -> Result<ImageResult> {
        let family = BedrockFamily::detect(&params.model_id);
        let custom_size = params.width != DEFAULT_SIZE || params.height != DEFAULT_SIZE;
        if custom_size && !family.supports_custom_dimensions() {
            return Err(SmartImageError::unsupported(
                Provider::Bedrock,
                format!(
                    "{} only generates {}x{} images",
                    params.model_id, DEFAULT_SIZE, DEFAULT_SIZE
                ),
            ));
        }
        // SDXL image-to-image keeps the init image's dimensions.
        if custom_size
            && params.reference_image.is_some()
            && family == BedrockFamily::StabilityLegacy
        {
            return Err(SmartImageError::unsupported(
                Provider::Bedrock,
                format!(
                    "{} only produces {}x{} images from a reference image",
                    params.model_id, DEFAULT_SIZE, DEFAULT_SIZE
                ),
            ));
        }

        let body = match &params.reference_image {
            Some(reference) => image_to_image_body(
                family,
                &params.prompt,
                reference,
                params.width,
                params.height,
            ),
            None => text_to_image_body(family, &params.prompt, params.width, params.height),
        };
        self.invoke(&params.model_id, body).await
    }

    async fn transform(&self, params: &TransformParams) -> Result<ImageResult> {
        let family = BedrockFamily::detect(&params.model_id);
        let body = image_to_image_body(
            family,
            &params.prompt,
            &params.source_image,
            DEFAULT_SIZE,
            DEFAULT_SIZE,
        );
        self.invoke(&params.model_id, body).await
    }
}

fn text_to_image_body(family: BedrockFamily, prompt: &str, width: u32, height: u32) -> Value {
    match family {
        BedrockFamily::AmazonImage => json!({
            "taskType": "TEXT_IMAGE",
            "textToImageParams": { "text": prompt },
            "imageGenerationConfig": { "numberOfImages": 1, "width": width, "height": height },
        }),
        BedrockFamily::StabilityLegacy => json!({
            "text_prompts": [{ "text": prompt }],
            "cfg_scale": CFG_SCALE,
            "steps": STEPS,
            "width": width,
            "height": height,
        }),
        BedrockFamily::StabilityModern => json!({
            "prompt": prompt,
            "mode": "text-to-image",
            "aspect_ratio": "1:1",
            "output_format": "png",
        }),
    }
}

fn image_to_image_body(
    family: BedrockFamily,
    prompt: &str,
    image: &[u8],
    width: u32,
    height: u32,
) -> Value {
    let image_b64 = base64::engine::general_purpose::STANDARD.encode(image);
    match family {
        BedrockFamily::AmazonImage => json!({
            "taskType": "IMAGE_VARIATION",
            "imageVariationParams": { "text": prompt, "images": [image_b64] },
            "imageGenerationConfig": { "numberOfImages": 1, "width": width, "height": height },
        }),
        BedrockFamily::StabilityLegacy => json!({
            "text_prompts": [{ "text": prompt }],
            "init_image": image_b64,
            "cfg_scale": CFG_SCALE,
            "steps": STEPS,
        }),
        BedrockFamily::StabilityModern => json!({
            "prompt": prompt,
            "mode": "image-to-image",
            "image": image_b64,
            "strength": IMAGE_STRENGTH,
            "output_format": "png",
        }),
    }
}

/// Pulls the first base64 image out of any of the family response shapes.
fn extract_image(body: &[u8]) -> Result<Vec<u8>> {
    let value: Value = serde_json::from_slice(body).map_err(|e| {
        SmartImageError::remote(Provider::Bedrock, format!("malformed response: {e}"))
    })?;

    if let Some(error) = value.get("error").and_then(|v| v.as_str()) {
        return Err(SmartImageError::InvalidInput {
            provider: Some(Provider::Bedrock),
            message: sanitize_error_message(error),
        });
    }
    if let Some(reason) = value
        .get("finish_reasons")
        .and_then(|v| v.get(0))
        .and_then(|v| v.as_str())
    {
        return Err(SmartImageError::InvalidInput {
            provider: Some(Provider::Bedrock),
            message: format!("content blocked: {}", reason),
        });
    }

    let b64 = if let Some(image) = value.pointer("/images/0").and_then(|v| v.as_str()) {
        image
    } else if let Some(artifact) = value.pointer("/artifacts/0") {
        if artifact.get("finishReason").and_then(|v| v.as_str()) == Some("CONTENT_FILTERED") {
            return Err(SmartImageError::InvalidInput {
                provider: Some(Provider::Bedrock),
                message: "content blocked: CONTENT_FILTERED".into(),
            });
        }
        artifact
            .get("base64")
            .and_then(|v| v.as_str())
            .ok_or_else(|| SmartImageError::remote(Provider::Bedrock, "artifact has no image"))?
    } else {
        return Err(SmartImageError::remote(
            Provider::Bedrock,
            "response contained no image data",
        ));
    };

    base64::engine::general_purpose::STANDARD
        .decode(b64)
        .map_err(|e| {
            SmartImageError::remote(Provider::Bedrock, format!("invalid base64 image: {e}"))
        })
}

fn classify_sdk_error<E, R>(err: SdkError<E, R>) -> SmartImageError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug + Send + Sync + 'static,
{
    if let SdkError::TimeoutError(_) = &err {
        return SmartImageError::remote(Provider::Bedrock, "request timed out");
    }
    let code = err.code().map(str::to_string);
    let message = err
        .message()
        .map(str::to_string)
        .unwrap_or_else(|| DisplayErrorContext(&err).to_string());
    classify_error_code(code.as_deref(), &message)
}

/// Maps an AWS error code and message into a category.
fn classify_error_code(code: Option<&str>, message: &str) -> SmartImageError {
    let message = sanitize_error_message(message);
    let lower = message.to_lowercase();
    match code {
        Some(
            "AccessDeniedException"
            | "UnrecognizedClientException"
            | "ExpiredTokenException"
            | "InvalidSignatureException"
            | "MissingAuthenticationTokenException",
        ) => SmartImageError::Auth {
            provider: Provider::Bedrock,
            message,
        },
        Some(
            "ThrottlingException" | "ServiceQuotaExceededException" | "TooManyRequestsException",
        ) => SmartImageError::RateLimited {
            provider: Provider::Bedrock,
            retry_after: None,
            message,
        },
        Some("ValidationException") => {
            if ["width", "height", "dimension", "size"]
                .iter()
                .any(|w| lower.contains(w))
            {
                SmartImageError::UnsupportedParameter {
                    provider: Some(Provider::Bedrock),
                    message,
                }
            } else if lower.contains("content filter") || lower.contains("blocked") {
                SmartImageError::InvalidInput {
                    provider: Some(Provider::Bedrock),
                    message: format!("content blocked: {}", message),
                }
            } else if lower.contains("image") {
                SmartImageError::InvalidInput {
                    provider: Some(Provider::Bedrock),
                    message,
                }
            } else {
                SmartImageError::UnsupportedParameter {
                    provider: Some(Provider::Bedrock),
                    message,
                }
            }
        }
        None if lower.contains("credentials") => SmartImageError::Auth {
            provider: Provider::Bedrock,
            message,
        },
        _ => SmartImageError::remote(Provider::Bedrock, message),
    }
}
