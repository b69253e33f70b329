//! [`Analyzer`] implementation backed by [`VisionClient`].

use std::path::Path;

use async_trait::async_trait;
use layersplit_core::layers::LayerSpec;
use layersplit_core::providers::{Analyzer, AnalyzerError, ExtractError};

use crate::client::{VisionApiError, VisionClient};
use crate::encode::image_data_url;
use crate::extract::extract_layers;

impl From<VisionApiError> for AnalyzerError {
    fn from(err: VisionApiError) -> Self {
        AnalyzerError::Request(err.to_string())
    }
}

pub struct VisionAnalyzer {
    client: VisionClient,
}

impl VisionAnalyzer {
    pub fn new(client: VisionClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Analyzer for VisionAnalyzer {
    async fn analyze(&self, image: &Path) -> Result<serde_json::Value, AnalyzerError> {
        let path = image.to_path_buf();
        let max_dimension = self.client.config().max_dimension;
        let quality = self.client.config().jpeg_quality;

        let data_url = tokio::task::spawn_blocking(move || image_data_url(&path, max_dimension, quality))
            .await
            .map_err(|e| AnalyzerError::Image(e.to_string()))?
            .map_err(|e| AnalyzerError::Image(e.to_string()))?;

        tracing::debug!(
            image = %image.display(),
            payload_bytes = data_url.len(),
            "Sending image to vision model"
        );
        Ok(self.client.complete(&data_url).await?)
    }

    fn extract_layers(&self, response: &serde_json::Value) -> Result<Vec<LayerSpec>, ExtractError> {
        extract_layers(response)
    }
}
