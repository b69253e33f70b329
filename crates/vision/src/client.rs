//! Chat completion client for the vision model.

use crate::encode::{DEFAULT_JPEG_QUALITY, DEFAULT_MAX_DIMENSION};

pub const DEFAULT_BASE_URL: &str = "https://ark.cn-beijing.volces.com/api/v3";
pub const DEFAULT_MODEL: &str = "doubao-1-5-thinking-vision-pro-250428";
pub const DEFAULT_MAX_TOKENS: u32 = 2000;
pub const DEFAULT_TEMPERATURE: f32 = 0.1;

/// Instruction sent with every image.
pub const DEFAULT_PROMPT: &str = r#"Detect every distinct visual element in this design image (company name, logo, product name, background artwork, seals, other elements).

For each element give:
- a short category label
- a bounding box in normalized coordinates [0,1] with 3 decimals

Boxes must fully cover their element, must not contain another element's box, and should overlap as little as possible.

Return JSON only, in this format:
{
  "layers": [
    {"content": "company name", "position": {"x1": 0.100, "y1": 0.050, "x2": 0.300, "y2": 0.080}}
  ]
}"#;

#[derive(Debug, Clone)]
pub struct VisionConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub max_dimension: u32,
    pub jpeg_quality: u8,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: String::new(),
            model: DEFAULT_MODEL.to_string(),
            prompt: DEFAULT_PROMPT.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
            max_dimension: DEFAULT_MAX_DIMENSION,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

impl VisionConfig {
    pub fn completions_endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum VisionApiError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Vision API error ({status}): {body}")]
    ApiError { status: u16, body: String },
}

/// HTTP client for an OpenAI-compatible `/chat/completions` endpoint.
pub struct VisionClient {
    client: reqwest::Client,
    config: VisionConfig,
}

impl VisionClient {
    pub fn new(config: VisionConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    pub fn config(&self) -> &VisionConfig {
        &self.config
    }

    /// Request body asking the model about one inline image.
    pub fn build_request(&self, image_url: &str) -> serde_json::Value {
        serde_json::json!({
            "model": self.config.model,
            "messages": [{
                "role": "user",
                "content": [
                    {"type": "text", "text": self.config.prompt},
                    {"type": "image_url", "image_url": {"url": image_url}},
                ],
            }],
            "max_tokens": self.config.max_tokens,
            "temperature": self.config.temperature,
        })
    }

    /// Send one image and return the raw completion JSON.
    pub async fn complete(&self, image_url: &str) -> Result<serde_json::Value, VisionApiError> {
        let response = self
            .client
            .post(self.config.completions_endpoint())
            .bearer_auth(&self.config.api_key)
            .json(&self.build_request(image_url))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(VisionApiError::ApiError {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json().await?)
    }
}
