//! OpenAI image generation provider (GPT Image, DALL-E).

use crate::config::OpenAiSettings;
use crate::error::{classify_http_status, sanitize_error_message, Result, SmartImageError};
use crate::image::provider::ImageProvider;
use crate::image::types::{
    GenerateParams, ImageFormat, ImageResult, Provider, RawModel, TransformParams,
};
use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tokio::sync::OnceCell;

/// OpenAI image generation provider.
///
/// The HTTP client is built on first use.
pub struct OpenAiImageProvider {
    settings: OpenAiSettings,
    timeout: Duration,
    client: OnceCell<reqwest::Client>,
}

impl OpenAiImageProvider {
    /// Creates the provider without touching the network.
    pub fn new(settings: OpenAiSettings, timeout: Duration) -> Self {
        Self {
            settings,
            timeout,
            client: OnceCell::new(),
        }
    }

    async fn client(&self) -> Result<&reqwest::Client> {
        self.client
            .get_or_try_init(|| async {
                tracing::debug!(base_url = %self.settings.base_url, "building OpenAI client");
                reqwest::Client::builder()
                    .timeout(self.timeout)
                    .build()
                    .map_err(|e| SmartImageError::ProviderUnavailable {
                        provider: Provider::OpenAi,
                        message: e.to_string(),
                    })
            })
            .await
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.settings.base_url, path)
    }

    fn parse_error(
        &self,
        status: u16,
        text: &str,
        headers: &reqwest::header::HeaderMap,
    ) -> SmartImageError {
        let body: Option<OpenAiErrorBody> = serde_json::from_str(text).ok();
        let (code, param, message) = match body {
            Some(b) => (
                b.error.code.unwrap_or_default(),
                b.error.param.unwrap_or_default(),
                b.error.message,
            ),
            None => (String::new(), String::new(), text.to_string()),
        };
        let message = sanitize_error_message(&message);

        if status == 402 || code == "insufficient_quota" || code == "billing_hard_limit_reached" {
            return SmartImageError::RateLimited {
                provider: Provider::OpenAi,
                retry_after: None,
                message,
            };
        }
        if status == 400 {
            if param == "size" || (message.contains("size") && message.contains("supported")) {
                return SmartImageError::UnsupportedParameter {
                    provider: Some(Provider::OpenAi),
                    message,
                };
            }
            let lower = message.to_lowercase();
            if code == "content_policy_violation"
                || code == "moderation_blocked"
                || lower.contains("safety system")
            {
                return SmartImageError::InvalidInput {
                    provider: Some(Provider::OpenAi),
                    message: format!("content blocked: {}", message),
                };
            }
            if param == "image" || param.starts_with("image") || lower.contains("invalid image") {
                return SmartImageError::InvalidInput {
                    provider: Some(Provider::OpenAi),
                    message,
                };
            }
            return SmartImageError::UnsupportedParameter {
                provider: Some(Provider::OpenAi),
                message,
            };
        }
        classify_http_status(Provider::OpenAi, status, &message, headers)
    }

    async fn check(&self, response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let headers = response.headers().clone();
        let text = response.text().await.unwrap_or_default();
        Err(self.parse_error(status.as_u16(), &text, &headers))
    }

    async fn decode_images(
        &self,
        response: reqwest::Response,
        model_id: &str,
        start: Instant,
    ) -> Result<ImageResult> {
        let client = self.client().await?;
        let openai_response: OpenAiImageResponse = response
            .json()
            .await
            .map_err(|e| SmartImageError::from_reqwest(Provider::OpenAi, e))?;

        let image_data = openai_response
            .data
            .into_iter()
            .next()
            .ok_or_else(|| SmartImageError::remote(Provider::OpenAi, "no images in response"))?;

        // Handle b64_json or url response formats
        let data = if let Some(b64) = image_data.b64_json {
            base64::engine::general_purpose::STANDARD
                .decode(&b64)
                .map_err(|e| {
                    SmartImageError::remote(Provider::OpenAi, format!("invalid base64 image: {e}"))
                })?
        } else if let Some(url) = image_data.url {
            let img_response = client
                .get(&url)
                .send()
                .await
                .map_err(|e| SmartImageError::from_reqwest(Provider::OpenAi, e))?;
            if !img_response.status().is_success() {
                return Err(SmartImageError::Remote {
                    provider: Provider::OpenAi,
                    status: Some(img_response.status().as_u16()),
                    message: "failed to download image from URL".into(),
                });
            }
            img_response
                .bytes()
                .await
                .map_err(|e| SmartImageError::from_reqwest(Provider::OpenAi, e))?
                .to_vec()
        } else {
            return Err(SmartImageError::remote(
                Provider::OpenAi,
                "response contained no image data",
            ));
        };

        tracing::debug!(
            model = model_id,
            duration_ms = start.elapsed().as_millis() as u64,
            size_bytes = data.len(),
            "OpenAI image received"
        );
        Ok(ImageResult::from_bytes(data, Provider::OpenAi, model_id))
    }

    /// Sends the edits endpoint request (multipart/form-data).
    async fn edit(
        &self,
        model_id: &str,
        image: &[u8],
        prompt: &str,
        size: Option<String>,
    ) -> Result<ImageResult> {
        let start = Instant::now();
        let client = self.client().await?;

        let format = ImageFormat::from_magic_bytes(image).unwrap_or_default();
        let image_part = reqwest::multipart::Part::bytes(image.to_vec())
            .file_name(format!("image.{}", format.extension()))
            .mime_str(format.mime_type())
            .map_err(|e| SmartImageError::InvalidInput {
                provider: Some(Provider::OpenAi),
                message: e.to_string(),
            })?;

        let mut form = reqwest::multipart::Form::new()
            .text("model", model_id.to_string())
            .text("prompt", prompt.to_string())
            .part("image", image_part);
        if let Some(size) = size {
            form = form.text("size", size);
        }

        let response = client
            .post(self.url("images/edits"))
            .bearer_auth(&self.settings.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| SmartImageError::from_reqwest(Provider::OpenAi, e))?;
        let response = self.check(response).await?;
        self.decode_images(response, model_id, start).await
    }
}

#[async_trait]
impl ImageProvider for OpenAiImageProvider {
    fn kind(&self) -> Provider {
        Provider::OpenAi
    }

    async fn list_raw_models(&self) -> Result<Vec<RawModel>> {
        let client = self.client().await?;
        let response = client
            .get(self.url("models"))
            .bearer_auth(&self.settings.api_key)
            .send()
            .await
            .map_err(|e| SmartImageError::from_reqwest(Provider::OpenAi, e))?;
        let response = self.check(response).await?;
        let list: OpenAiModelList = response
            .json()
            .await
            .map_err(|e| SmartImageError::from_reqwest(Provider::OpenAi, e))?;

        Ok(list.data.into_iter().map(OpenAiModel::into_raw).collect())
    }

    async fn generate(&self, params: &GenerateParams) -> Result<ImageResult> {
        let size = format!("{}x{}", params.width, params.height);

        // Reference images go through the edits endpoint
        if let Some(reference) = &params.reference_image {
            return self
                .edit(&params.model_id, reference, &params.prompt, Some(size))
                .await;
        }

        let start = Instant::now();
        let client = self.client().await?;
        let body = OpenAiImageRequest::new(&params.model_id, &params.prompt, size);

        let response = client
            .post(self.url("images/generations"))
            .bearer_auth(&self.settings.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| SmartImageError::from_reqwest(Provider::OpenAi, e))?;
        let response = self.check(response).await?;
        self.decode_images(response, &params.model_id, start).await
    }

    async fn transform(&self, params: &TransformParams) -> Result<ImageResult> {
        self.edit(&params.model_id, &params.source_image, &params.prompt, None)
            .await
    }
}

#[derive(Debug, Serialize)]
struct OpenAiImageRequest {
    model: String,
    prompt: String,
    n: u32,
    size: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<&'static str>,
}

impl OpenAiImageRequest {
    fn new(model: &str, prompt: &str, size: String) -> Self {
        // GPT Image models always return base64 and reject response_format
        let response_format = model.starts_with("dall-e").then_some("b64_json");
        Self {
            model: model.to_string(),
            prompt: prompt.to_string(),
            n: 1,
            size,
            response_format,
        }
    }
}

#[derive(Debug, Deserialize)]
struct OpenAiImageResponse {
    data: Vec<OpenAiImageData>,
}

#[derive(Debug, Deserialize)]
struct OpenAiImageData {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    b64_json: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiModelList {
    data: Vec<OpenAiModel>,
}

#[derive(Debug, Deserialize)]
struct OpenAiModel {
    id: String,
    #[serde(default)]
    created: Option<i64>,
    #[serde(default)]
    owned_by: Option<String>,
}

impl OpenAiModel {
    fn into_raw(self) -> RawModel {
        let metadata = serde_json::json!({
            "created": self.created,
            "owned_by": self.owned_by,
        });
        RawModel::new(self.id).with_metadata(metadata)
    }
}

#[derive(Debug, Deserialize)]
struct OpenAiErrorBody {
    error: OpenAiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct OpenAiErrorDetail {
    message: String,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    param: Option<String>,
}
