//! [`MattingProvider`] backed by the HTTP workflow service.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use layersplit_core::providers::{MattingProvider, ProviderError};

use crate::api::{MattingApi, MattingApiError};
use crate::parse::parse_workflow_output;

impl From<MattingApiError> for ProviderError {
    fn from(err: MattingApiError) -> Self {
        match err {
            MattingApiError::ApiError { status, body } => ProviderError::Api { status, body },
            MattingApiError::Io(e) => ProviderError::Io(e),
            MattingApiError::MissingUrl(body) => ProviderError::Malformed(body),
            other => ProviderError::Request(other.to_string()),
        }
    }
}

pub struct HttpMattingProvider {
    api: MattingApi,
}

impl HttpMattingProvider {
    pub fn new(api: MattingApi) -> Self {
        Self { api }
    }
}

#[async_trait]
impl MattingProvider for HttpMattingProvider {
    async fn upload(&self, local_path: &Path) -> Result<String, ProviderError> {
        let url = self.api.upload_file(local_path).await?;
        tracing::debug!(path = %local_path.display(), "Uploaded layer for matting");
        Ok(url)
    }

    async fn run_matte(&self, url: &str) -> Result<serde_json::Value, ProviderError> {
        Ok(self
            .api
            .run_workflow(serde_json::json!({ "input": url }))
            .await?)
    }

    fn parse_output(&self, result: &serde_json::Value) -> Option<String> {
        parse_workflow_output(result)
    }

    async fn download(
        &self,
        output_url: &str,
        dest_dir: &Path,
        file_stem: &str,
    ) -> Result<PathBuf, ProviderError> {
        let bytes = self.api.download(output_url).await?;
        if bytes.is_empty() {
            return Err(ProviderError::Malformed(format!(
                "Empty cutout downloaded from {output_url}"
            )));
        }

        tokio::fs::create_dir_all(dest_dir).await?;
        let dest = dest_dir.join(format!("{file_stem}_cutout.png"));
        tokio::fs::write(&dest, &bytes).await?;
        Ok(dest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::MattingConfig;
    use assert_matches::assert_matches;

    #[test]
    fn parse_output_delegates_to_parser() {
        let provider = HttpMattingProvider::new(MattingApi::new(MattingConfig::default()));
        let result = serde_json::json!({"data": "{\"output\": \"https://cdn/z.png\"}"});
        assert_eq!(provider.parse_output(&result).as_deref(), Some("https://cdn/z.png"));
    }

    #[test]
    fn api_errors_map_to_provider_errors() {
        let mapped: ProviderError = MattingApiError::ApiError {
            status: 500,
            body: "oops".into(),
        }
        .into();
        assert_matches!(mapped, ProviderError::Api { status: 500, .. });

        let mapped: ProviderError = MattingApiError::Workflow {
            code: 1,
            msg: "x".into(),
        }
        .into();
        assert_matches!(mapped, ProviderError::Request(_));
    }

    #[tokio::test]
    async fn upload_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let provider = HttpMattingProvider::new(MattingApi::new(MattingConfig::default()));
        let result = provider.upload(&dir.path().join("absent.png")).await;
        assert_matches!(result, Err(ProviderError::Io(_)));
    }
}
