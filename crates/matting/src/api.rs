//! REST client for the matting workflow service.
//!
//! Three endpoints are used: a multipart upload that returns a readable URL,
//! `POST {api_url}/workflow/run` to execute the background-removal workflow,
//! and a plain GET to fetch the produced cutout.

use std::path::Path;

/// Default workflow API base URL.
pub const DEFAULT_API_URL: &str = "https://api.coze.cn/v1";

/// Default background-removal workflow.
pub const DEFAULT_WORKFLOW_ID: &str = "7526719168868237347";

/// Connection settings for [`MattingApi`].
#[derive(Debug, Clone)]
pub struct MattingConfig {
    pub api_url: String,
    pub api_token: String,
    pub workflow_id: String,
    /// Upload endpoint; `None` means `{api_url}/files/upload`.
    pub upload_url: Option<String>,
}

impl Default for MattingConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            api_token: String::new(),
            workflow_id: DEFAULT_WORKFLOW_ID.to_string(),
            upload_url: None,
        }
    }
}

impl MattingConfig {
    pub fn upload_endpoint(&self) -> String {
        self.upload_url
            .clone()
            .unwrap_or_else(|| format!("{}/files/upload", self.api_url.trim_end_matches('/')))
    }

    pub fn workflow_endpoint(&self) -> String {
        format!("{}/workflow/run", self.api_url.trim_end_matches('/'))
    }
}

/// Errors from the matting REST layer.
#[derive(Debug, thiserror::Error)]
pub enum MattingApiError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The service returned a non-2xx status code.
    #[error("Matting API error ({status}): {body}")]
    ApiError { status: u16, body: String },

    /// The workflow ran but reported a non-zero result code.
    #[error("Workflow error ({code}): {msg}")]
    Workflow { code: i64, msg: String },

    /// The upload response carried no usable URL.
    #[error("Upload response has no URL: {0}")]
    MissingUrl(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// HTTP client for the matting service.
pub struct MattingApi {
    client: reqwest::Client,
    config: MattingConfig,
}

impl MattingApi {
    pub fn new(config: MattingConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    /// Create an API client reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, config: MattingConfig) -> Self {
        Self { client, config }
    }

    pub fn config(&self) -> &MattingConfig {
        &self.config
    }

    /// Upload a local file and return the URL the workflow can read it from.
    pub async fn upload_file(&self, path: &Path) -> Result<String, MattingApiError> {
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "layer.png".to_string());

        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(file_name)
            .mime_str("image/png")?;
        let form = reqwest::multipart::Form::new().part("file", part);

        let response = self
            .client
            .post(self.config.upload_endpoint())
            .bearer_auth(&self.config.api_token)
            .multipart(form)
            .send()
            .await?;

        let body: serde_json::Value = Self::parse_response(response).await?;
        extract_upload_url(&body).ok_or_else(|| MattingApiError::MissingUrl(body.to_string()))
    }

    /// Run the configured workflow with `parameters`.
    ///
    /// Sends `POST {api_url}/workflow/run`. A body with a non-zero `code`
    /// is reported as [`MattingApiError::Workflow`].
    pub async fn run_workflow(
        &self,
        parameters: serde_json::Value,
    ) -> Result<serde_json::Value, MattingApiError> {
        let body = serde_json::json!({
            "workflow_id": self.config.workflow_id,
            "parameters": parameters,
        });

        let response = self
            .client
            .post(self.config.workflow_endpoint())
            .bearer_auth(&self.config.api_token)
            .json(&body)
            .send()
            .await?;

        let result: serde_json::Value = Self::parse_response(response).await?;
        match result.get("code").and_then(|c| c.as_i64()) {
            Some(code) if code != 0 => Err(MattingApiError::Workflow {
                code,
                msg: result
                    .get("msg")
                    .and_then(|m| m.as_str())
                    .unwrap_or_default()
                    .to_string(),
            }),
            _ => Ok(result),
        }
    }

    /// Fetch the bytes behind `url`.
    pub async fn download(&self, url: &str) -> Result<Vec<u8>, MattingApiError> {
        let response = self.client.get(url).send().await?;
        let response = Self::ensure_success(response).await?;
        Ok(response.bytes().await?.to_vec())
    }

    // ---- private helpers ----

    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, MattingApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(MattingApiError::ApiError {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, MattingApiError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }
}

/// Find the file URL in an upload response: top-level `url`, or `url` /
/// `file_url` under `data`.
pub fn extract_upload_url(body: &serde_json::Value) -> Option<String> {
    let candidates = [
        body.get("url"),
        body.pointer("/data/url"),
        body.pointer("/data/file_url"),
    ];
    candidates
        .into_iter()
        .flatten()
        .filter_map(|v| v.as_str())
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
