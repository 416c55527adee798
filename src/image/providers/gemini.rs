//! Gemini (Google) image generation provider.
//!
//! Gemini image models are called through `generateContent`; Imagen models
//! through `predict`.

use crate::catalog::{canonical_model_id, is_imagen};
use crate::config::GeminiSettings;
use crate::error::{classify_http_status, sanitize_error_message, Result, SmartImageError};
use crate::image::provider::ImageProvider;
use crate::image::types::{
    GenerateParams, ImageFormat, ImageResult, Provider, RawModel, TransformParams, DEFAULT_SIZE,
};
use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tokio::sync::OnceCell;

const PAGE_SIZE: u32 = 1000;
const TRANSFORM_PREFIX: &str = "Transform this image: ";

/// Gemini image generation provider.
pub struct GeminiProvider {
    settings: GeminiSettings,
    timeout: Duration,
    client: OnceCell<reqwest::Client>,
}

impl GeminiProvider {
    /// Creates the provider without touching the network.
    pub fn new(settings: GeminiSettings, timeout: Duration) -> Self {
        Self {
            settings,
            timeout,
            client: OnceCell::new(),
        }
    }

    async fn client(&self) -> Result<&reqwest::Client> {
        self.client
            .get_or_try_init(|| async {
                tracing::debug!(base_url = %self.settings.base_url, "building Gemini client");
                reqwest::Client::builder()
                    .timeout(self.timeout)
                    .build()
                    .map_err(|e| SmartImageError::ProviderUnavailable {
                        provider: Provider::Gemini,
                        message: e.to_string(),
                    })
            })
            .await
    }

    fn model_url(&self, model_id: &str, method: &str) -> String {
        format!(
            "{}/{}:{}",
            self.settings.base_url,
            canonical_model_id(Provider::Gemini, model_id),
            method
        )
    }

    async fn post<B: Serialize>(&self, url: &str, body: &B) -> Result<reqwest::Response> {
        let client = self.client().await?;
        let response = client
            .post(url)
            .header("x-goog-api-key", &self.settings.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| SmartImageError::from_reqwest(Provider::Gemini, e))?;

        let status = response.status();
        if !status.is_success() {
            let headers = response.headers().clone();
            let text = response.text().await.unwrap_or_default();
            return Err(self.parse_error(status.as_u16(), &text, &headers));
        }
        Ok(response)
    }

    async fn generate_content(
        &self,
        model_id: &str,
        prompt: String,
        image: Option<&[u8]>,
    ) -> Result<ImageResult> {
        let start = Instant::now();
        let body = GeminiRequest::new(prompt, image);
        let response = self
            .post(&self.model_url(model_id, "generateContent"), &body)
            .await?;
        let gemini_response: GeminiResponse = response
            .json()
            .await
            .map_err(|e| SmartImageError::from_reqwest(Provider::Gemini, e))?;

        let (data, declared) = gemini_response.into_image()?;
        tracing::debug!(
            model = model_id,
            duration_ms = start.elapsed().as_millis() as u64,
            size_bytes = data.len(),
            "Gemini image received"
        );
        Ok(ImageResult::from_bytes(data, Provider::Gemini, model_id)
            .with_declared_format(declared))
    }

    async fn predict(&self, model_id: &str, prompt: &str) -> Result<ImageResult> {
        let start = Instant::now();
        let body = ImagenRequest::new(prompt);
        let response = self.post(&self.model_url(model_id, "predict"), &body).await?;
        let imagen_response: ImagenResponse = response
            .json()
            .await
            .map_err(|e| SmartImageError::from_reqwest(Provider::Gemini, e))?;

        let (data, declared) = imagen_response.into_image()?;
        tracing::debug!(
            model = model_id,
            duration_ms = start.elapsed().as_millis() as u64,
            size_bytes = data.len(),
            "Imagen image received"
        );
        Ok(ImageResult::from_bytes(data, Provider::Gemini, model_id)
            .with_declared_format(declared))
    }

    fn parse_error(
        &self,
        status: u16,
        text: &str,
        headers: &reqwest::header::HeaderMap,
    ) -> SmartImageError {
        let message = serde_json::from_str::<GeminiErrorBody>(text)
            .map(|b| b.error.message)
            .unwrap_or_else(|_| text.to_string());
        let message = sanitize_error_message(&message);
        let lower = message.to_lowercase();

        if status == 400 && lower.contains("api key") {
            return SmartImageError::Auth {
                provider: Provider::Gemini,
                message,
            };
        }
        if status == 404 {
            return SmartImageError::Remote {
                provider: Provider::Gemini,
                status: Some(404),
                message: format!("model not found: {}", message),
            };
        }
        if status == 400 {
            if lower.contains("safety") || lower.contains("blocked") || lower.contains("prohibited")
            {
                return SmartImageError::InvalidInput {
                    provider: Some(Provider::Gemini),
                    message: format!("content blocked: {}", message),
                };
            }
            let bad_image = lower.contains("invalid") || lower.contains("unable to process");
            if lower.contains("image") && bad_image {
                return SmartImageError::InvalidInput {
                    provider: Some(Provider::Gemini),
                    message,
                };
            }
            return SmartImageError::UnsupportedParameter {
                provider: Some(Provider::Gemini),
                message,
            };
        }
        classify_http_status(Provider::Gemini, status, &message, headers)
    }
}

#[async_trait]
impl ImageProvider for GeminiProvider {
    fn kind(&self) -> Provider {
        Provider::Gemini
    }

    async fn list_raw_models(&self) -> Result<Vec<RawModel>> {
        let client = self.client().await?;
        let url = format!("{}/models", self.settings.base_url);
        let mut models = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut query = vec![("pageSize", PAGE_SIZE.to_string())];
            if let Some(token) = &page_token {
                query.push(("pageToken", token.clone()));
            }
            let response = client
                .get(&url)
                .header("x-goog-api-key", &self.settings.api_key)
                .query(&query)
                .send()
                .await
                .map_err(|e| SmartImageError::from_reqwest(Provider::Gemini, e))?;

            let status = response.status();
            if !status.is_success() {
                let headers = response.headers().clone();
                let text = response.text().await.unwrap_or_default();
                return Err(self.parse_error(status.as_u16(), &text, &headers));
            }

            let page: GeminiModelList = response
                .json()
                .await
                .map_err(|e| SmartImageError::from_reqwest(Provider::Gemini, e))?;
            models.extend(page.models.into_iter().map(GeminiModel::into_raw));

            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        Ok(models)
    }

    async fn generate(&self, params: &GenerateParams) -> Result<ImageResult> {
        if params.width != DEFAULT_SIZE || params.height != DEFAULT_SIZE {
            return Err(SmartImageError::unsupported(
                Provider::Gemini,
                format!(
                    "{}x{} requested, Gemini only generates {}x{}",
                    params.width, params.height, DEFAULT_SIZE, DEFAULT_SIZE
                ),
            ));
        }

        if is_imagen(&params.model_id) {
            if params.reference_image.is_some() {
                return Err(SmartImageError::unsupported(
                    Provider::Gemini,
                    format!("{} does not accept reference images", params.model_id),
                ));
            }
            return self.predict(&params.model_id, &params.prompt).await;
        }

        self.generate_content(
            &params.model_id,
            params.prompt.clone(),
            params.reference_image.as_deref(),
        )
        .await
    }

    async fn transform(&self, params: &TransformParams) -> Result<ImageResult> {
        if is_imagen(&params.model_id) {
            return Err(SmartImageError::unsupported(
                Provider::Gemini,
                format!("{} cannot transform images", params.model_id),
            ));
        }
        self.generate_content(
            &params.model_id,
            format!("{}{}", TRANSFORM_PREFIX, params.prompt),
            Some(&params.source_image),
        )
        .await
    }
}

// Request/Response types
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    generation_config: GeminiConfig,
}

#[derive(Debug, Serialize)]
struct GeminiContent {
    parts: Vec<GeminiRequestPart>,
}

/// A part in a Gemini request - can be text or inline image data.
#[derive(Debug, Serialize)]
#[serde(untagged)]
enum GeminiRequestPart {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: GeminiInlineData,
    },
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiInlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiConfig {
    response_modalities: Vec<&'static str>,
}

impl GeminiRequest {
    fn new(prompt: String, image: Option<&[u8]>) -> Self {
        let mut parts = vec![GeminiRequestPart::Text { text: prompt }];

        if let Some(image_data) = image {
            let mime_type = ImageFormat::from_magic_bytes(image_data)
                .unwrap_or_default()
                .mime_type()
                .to_string();
            parts.push(GeminiRequestPart::InlineData {
                inline_data: GeminiInlineData {
                    mime_type,
                    data: base64::engine::general_purpose::STANDARD.encode(image_data),
                },
            });
        }

        Self {
            contents: vec![GeminiContent { parts }],
            generation_config: GeminiConfig {
                response_modalities: vec!["TEXT", "IMAGE"],
            },
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    #[serde(default)]
    content: Option<GeminiContentResponse>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
    #[serde(default)]
    block_reason_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiContentResponse {
    #[serde(default)]
    parts: Vec<GeminiPartResponse>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPartResponse {
    #[serde(default)]
    inline_data: Option<GeminiInlineData>,
}

impl GeminiResponse {
    /// Extracts the first inline image and its declared format, mapping blocks
    /// to invalid input.
    fn into_image(self) -> Result<(Vec<u8>, Option<ImageFormat>)> {
        // Blocks are reported with HTTP 200
        if let Some(feedback) = &self.prompt_feedback {
            if let Some(reason) = &feedback.block_reason {
                let msg = feedback
                    .block_reason_message
                    .clone()
                    .unwrap_or_else(|| format!("prompt blocked: {}", reason));
                return Err(SmartImageError::InvalidInput {
                    provider: Some(Provider::Gemini),
                    message: msg,
                });
            }
        }

        let candidate = self
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| SmartImageError::remote(Provider::Gemini, "no candidates in response"))?;

        if let Some(finish_reason) = &candidate.finish_reason {
            match finish_reason.as_str() {
                "SAFETY"
                | "IMAGE_SAFETY"
                | "IMAGE_PROHIBITED_CONTENT"
                | "IMAGE_RECITATION"
                | "RECITATION"
                | "PROHIBITED_CONTENT"
                | "BLOCKLIST" => {
                    return Err(SmartImageError::InvalidInput {
                        provider: Some(Provider::Gemini),
                        message: format!("content blocked by safety filter: {}", finish_reason),
                    });
                }
                _ => {}
            }
        }

        let inline_data = candidate
            .content
            .into_iter()
            .flat_map(|c| c.parts)
            .find_map(|p| p.inline_data)
            .ok_or_else(|| SmartImageError::remote(Provider::Gemini, "no image in response"))?;

        let data = decode_image(&inline_data.data)?;
        Ok((data, ImageFormat::from_mime_type(&inline_data.mime_type)))
    }
}

#[derive(Debug, Serialize)]
struct ImagenRequest {
    instances: Vec<ImagenInstance>,
    parameters: ImagenParameters,
}

#[derive(Debug, Serialize)]
struct ImagenInstance {
    prompt: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ImagenParameters {
    sample_count: u32,
}

impl ImagenRequest {
    fn new(prompt: &str) -> Self {
        Self {
            instances: vec![ImagenInstance {
                prompt: prompt.to_string(),
            }],
            parameters: ImagenParameters { sample_count: 1 },
        }
    }
}

#[derive(Debug, Deserialize)]
struct ImagenResponse {
    #[serde(default)]
    predictions: Vec<ImagenPrediction>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImagenPrediction {
    #[serde(default)]
    bytes_base64_encoded: Option<String>,
    #[serde(default)]
    mime_type: Option<String>,
    #[serde(default)]
    rai_filtered_reason: Option<String>,
}

impl ImagenResponse {
    fn into_image(self) -> Result<(Vec<u8>, Option<ImageFormat>)> {
        let prediction = self.predictions.into_iter().next().ok_or_else(|| {
            // Imagen drops filtered predictions entirely
            SmartImageError::InvalidInput {
                provider: Some(Provider::Gemini),
                message: "no image returned, the prompt may have been filtered".into(),
            }
        })?;
        if let Some(reason) = prediction.rai_filtered_reason {
            return Err(SmartImageError::InvalidInput {
                provider: Some(Provider::Gemini),
                message: format!("content blocked: {}", reason),
            });
        }
        let b64 = prediction
            .bytes_base64_encoded
            .ok_or_else(|| SmartImageError::remote(Provider::Gemini, "prediction has no image"))?;
        let declared = prediction
            .mime_type
            .as_deref()
            .and_then(ImageFormat::from_mime_type);
        Ok((decode_image(&b64)?, declared))
    }
}

fn decode_image(b64: &str) -> Result<Vec<u8>> {
    base64::engine::general_purpose::STANDARD
        .decode(b64)
        .map_err(|e| {
            SmartImageError::remote(Provider::Gemini, format!("invalid base64 image: {e}"))
        })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiModelList {
    #[serde(default)]
    models: Vec<GeminiModel>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiModel {
    name: String,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    supported_generation_methods: Vec<String>,
}

impl GeminiModel {
    fn into_raw(self) -> RawModel {
        let metadata = serde_json::json!({
            "description": self.description,
            "supported_generation_methods": self.supported_generation_methods,
        });
        let raw = RawModel::new(self.name).with_metadata(metadata);
        match self.display_name {
            Some(name) => raw.with_display_name(name),
            None => raw,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GeminiErrorBody {
    error: GeminiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorDetail {
    message: String,
}
