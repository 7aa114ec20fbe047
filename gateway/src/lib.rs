//! Gemini client for the three Doppel generation calls.
//!
//! # Architecture
//!
//! [`GeminiClient`] wraps the non-streaming `generateContent` endpoint and
//! exposes the three request contracts the wizard needs:
//!
//! - [`GeminiClient::describe`] - images in, one text description out
//! - [`GeminiClient::synthesize_set`] - description in, exactly four portraits
//!   out (four concurrent prompts, all-or-nothing)
//! - [`GeminiClient::recompose`] - description + reference image in, one
//!   edited image out
//!
//! All calls are idempotent only in the sense that repeating them is safe;
//! the service is generative, so each repetition produces a different result.
//!
//! # Error Handling
//!
//! Transport failures, non-2xx statuses, in-body service errors and missing
//! payloads are all surfaced as [`GatewayError`]. Callers treat every variant
//! as the same user-facing remote-service failure; the variants exist so the
//! specific cause can be logged.

pub mod response;
pub mod retry;

use std::sync::OnceLock;
use std::time::Duration;

use futures_util::future::try_join_all;
use reqwest::StatusCode;
use serde_json::{Value, json};

use doppel_types::{EncodedImage, Gallery, ImageArtifact, TwinDescription};

use crate::retry::{RetryConfig, RetryOutcome, send_with_retry};

/// Canonical Gemini API base URL.
pub const GEMINI_API_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Default image-capable model.
pub const DEFAULT_IMAGE_MODEL: &str = "gemini-2.5-flash-image";

const CONNECT_TIMEOUT_SECS: u64 = 30;
const REQUEST_TIMEOUT_SECS: u64 = 180;
const MAX_ERROR_BODY_BYTES: usize = 32 * 1024;

const DESCRIBE_PROMPT: &str = "Analyze the person in these images and generate a single, \
     detailed, and flattering description of their physical appearance. Focus on facial \
     features, hair, and overall impression. This description will be used to create a \
     digital avatar.";

fn http_client() -> &'static reqwest::Client {
    static CLIENT: OnceLock<reqwest::Client> = OnceLock::new();
    CLIENT.get_or_init(|| {
        reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .unwrap_or_else(|e| {
                tracing::error!("Failed to build HTTP client: {e}. Falling back to defaults.");
                reqwest::Client::new()
            })
    })
}

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("request failed after {attempts} attempts: {source}")]
    Connection {
        attempts: u32,
        source: reqwest::Error,
    },

    #[error("API error {status}: {body}")]
    Api { status: StatusCode, body: String },

    /// The service returned 200 but carried an error object.
    #[error("service error: {0}")]
    Service(String),

    /// The response had no usable payload of the expected kind.
    #[error("response carried no {0} payload")]
    EmptyResponse(&'static str),
}

/// Read an error body without buffering more than [`MAX_ERROR_BODY_BYTES`].
async fn read_capped_error_body(response: reqwest::Response) -> String {
    use futures_util::StreamExt;
    let mut body = Vec::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let Ok(chunk) = chunk else { break };
        body.extend_from_slice(&chunk);
        if body.len() > MAX_ERROR_BODY_BYTES {
            body.truncate(MAX_ERROR_BODY_BYTES);
            let text = String::from_utf8_lossy(&body);
            return format!("{text}...(truncated)");
        }
    }
    String::from_utf8_lossy(&body).into_owned()
}

// ============================================================================
// Request Bodies
// ============================================================================

fn text_part(text: &str) -> Value {
    json!({ "text": text })
}

fn inline_image_part(image: &EncodedImage) -> Value {
    json!({
        "inlineData": {
            "data": image.payload(),
            "mimeType": image.mime().as_str(),
        }
    })
}

/// Body for the describe call: one inline part per image plus the fixed
/// analysis prompt.
fn describe_body(images: &[EncodedImage]) -> Value {
    let mut parts: Vec<Value> = images.iter().map(inline_image_part).collect();
    parts.push(text_part(DESCRIBE_PROMPT));
    json!({ "contents": { "parts": parts } })
}

/// Body for a single portrait generation prompt. The modality selector asks
/// the model for image output.
fn image_generation_body(prompt: &str) -> Value {
    json!({
        "contents": { "parts": [text_part(prompt)] },
        "generationConfig": {
            "responseModalities": ["IMAGE"],
        }
    })
}

/// Body for the recompose call: reference image first, edit instruction second.
fn recompose_body(description: &TwinDescription, reference: &EncodedImage) -> Value {
    let instruction = format!(
        "The user has provided an image and a description of their 'AI Twin'. Your task is \
         to edit the provided image. Replace the person in the image with the AI Twin, who \
         is described as follows: '{description}'. Keep the background, pose, and style of \
         the original image as closely as possible."
    );
    json!({
        "contents": { "parts": [inline_image_part(reference), text_part(&instruction)] },
        "generationConfig": {
            "responseModalities": ["IMAGE"],
        }
    })
}

/// The four fixed portrait prompts, differing in framing, lighting and mood.
fn gallery_prompts(description: &TwinDescription) -> [String; doppel_types::GALLERY_SIZE] {
    [
        format!(
            "Create a realistic, high-quality studio portrait of a person with the following \
             description: {description}. The person should be looking directly at the camera \
             with a gentle smile."
        ),
        format!(
            "Create a photorealistic image of a person described as: {description}. They \
             should be outdoors, with soft, natural lighting, looking slightly away from the \
             camera."
        ),
        format!(
            "Generate a high-fashion, black and white photograph of a person with this \
             description: {description}. The mood should be sophisticated and timeless."
        ),
        format!(
            "Create a candid, lifestyle photo of a person described as: {description}. They \
             should be laughing or smiling genuinely in a bright, inviting setting like a cafe."
        ),
    ]
}

// ============================================================================
// Client
// ============================================================================

/// Client for the generation service, bound to one model and API key.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    api_key: String,
    model: String,
    base_url: String,
    retry: RetryConfig,
}

impl GeminiClient {
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: DEFAULT_IMAGE_MODEL.to_string(),
            base_url: GEMINI_API_BASE_URL.to_string(),
            retry: RetryConfig::default(),
        }
    }

    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Point the client at a different endpoint. Used by tests to target a
    /// local mock server.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    #[must_use]
    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Generate a detailed appearance description from a set of images.
    pub async fn describe(&self, images: &[EncodedImage]) -> Result<TwinDescription, GatewayError> {
        tracing::info!(count = images.len(), "Requesting AI analysis of images");

        let response = self.generate(&describe_body(images)).await?;
        let text = response
            .first_text()
            .ok_or(GatewayError::EmptyResponse("text"))?;

        tracing::debug!("Description generated");
        TwinDescription::new(text).map_err(|_| GatewayError::EmptyResponse("text"))
    }

    /// Generate the four-portrait gallery from a description.
    ///
    /// The four prompts are issued concurrently and jointly awaited. If any
    /// of them fails to return image data the whole set fails; no partial
    /// gallery is ever accepted.
    pub async fn synthesize_set(
        &self,
        description: &TwinDescription,
    ) -> Result<Gallery, GatewayError> {
        tracing::info!("Requesting AI portrait generation");

        let prompts = gallery_prompts(description);
        let requests = prompts.iter().map(|prompt| self.generate_image(prompt));
        let images = try_join_all(requests).await?;

        tracing::debug!("Gallery generated");
        Gallery::new(images).map_err(|_| GatewayError::EmptyResponse("image"))
    }

    /// Recompose a reference image with the twin's identity.
    pub async fn recompose(
        &self,
        description: &TwinDescription,
        reference: &EncodedImage,
    ) -> Result<ImageArtifact, GatewayError> {
        tracing::info!("Requesting AI image recomposition");

        let response = self
            .generate(&recompose_body(description, reference))
            .await?;
        let payload = response
            .first_inline_image()
            .ok_or(GatewayError::EmptyResponse("image"))?;

        tracing::debug!("Recomposition complete");
        ImageArtifact::from_png_payload(payload).map_err(|_| GatewayError::EmptyResponse("image"))
    }

    async fn generate_image(&self, prompt: &str) -> Result<ImageArtifact, GatewayError> {
        let response = self.generate(&image_generation_body(prompt)).await?;
        let payload = response
            .first_inline_image()
            .ok_or(GatewayError::EmptyResponse("image"))?;
        ImageArtifact::from_png_payload(payload).map_err(|_| GatewayError::EmptyResponse("image"))
    }

    async fn generate(&self, body: &Value) -> Result<response::Response, GatewayError> {
        let url = format!(
            "{}/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        );

        let client = http_client();
        let outcome = send_with_retry(
            || {
                client
                    .post(&url)
                    .header("x-goog-api-key", &self.api_key)
                    .header("content-type", "application/json")
                    .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
                    .json(body)
            },
            &self.retry,
        )
        .await;

        let response = match outcome {
            RetryOutcome::Success(response) => response,
            RetryOutcome::HttpError(response) => {
                let status = response.status();
                let body = read_capped_error_body(response).await;
                return Err(GatewayError::Api { status, body });
            }
            RetryOutcome::ConnectionError { attempts, source } => {
                return Err(GatewayError::Connection { attempts, source });
            }
            RetryOutcome::NonRetryable(e) => return Err(GatewayError::Transport(e)),
        };

        let parsed: response::Response = response.json().await?;

        if let Some(error) = &parsed.error {
            return Err(GatewayError::Service(
                error.message_or_default().to_string(),
            ));
        }

        Ok(parsed)
    }
}
