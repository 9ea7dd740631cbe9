pub mod schemas;

use std::time::Duration;
use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use tracing::{debug, info};
use sbx_core::{History, ImageRef, JobGraph};
use crate::config::AppConfig;
use crate::error::{GenerateError, Result};
use crate::generator::backend::schemas::{
    ObjectInfo, PromptRequest, PromptResponse, SystemStats, UploadResponse, validation_message,
};

/// The calls the generation flow makes against the diffusion backend.
#[async_trait]
pub trait DiffusionApi: Send + Sync {
    /// `GET /object_info`.
    async fn object_info(&self) -> Result<ObjectInfo>;

    /// `POST /prompt`, returning the job id.
    async fn queue_prompt(&self, graph: &JobGraph) -> Result<String>;

    /// `GET /history/{prompt_id}`.
    async fn history(&self, prompt_id: &str) -> Result<History>;

    /// `GET /view`. Fails with [`GenerateError::NotFound`] while the file is
    /// still being written.
    async fn view(&self, image: &ImageRef) -> Result<Vec<u8>>;
}

pub struct ComfyBackend {
    client: reqwest::Client,
    api_url: String,
    client_id: String,
    prevalidate: bool,
}

impl ComfyBackend {
    pub fn new(config: &AppConfig) -> Result<Self> {
        Ok(Self::with_url(config.api_url(), config.timeout)?.prevalidating(config.prevalidate))
    }

    pub fn with_url(api_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(GenerateError::from_transport)?;

        Ok(Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            client_id: uuid::Uuid::new_v4().to_string(),
            prevalidate: false,
        })
    }

    /// Submit every graph twice: once to surface validation errors, once for real.
    pub fn prevalidating(mut self, prevalidate: bool) -> Self {
        self.prevalidate = prevalidate;
        self
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_url, path)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self
            .client
            .get(self.url(path))
            .send()
            .await
            .map_err(GenerateError::from_transport)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(GenerateError::UnexpectedResponse(format!(
                "HTTP {} from {}: {}",
                status, path, body
            )));
        }

        response
            .json()
            .await
            .map_err(|e| GenerateError::UnexpectedResponse(format!("{}: {}", path, e)))
    }

    async fn post_prompt(&self, body: &PromptRequest<'_>) -> Result<String> {
        let response = self
            .client
            .post(self.url("/prompt"))
            .json(body)
            .send()
            .await
            .map_err(GenerateError::from_transport)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(GenerateError::Validation(format!(
                "HTTP {}: {}",
                status,
                validation_message(&body)
            )));
        }

        let parsed: PromptResponse = response
            .json()
            .await
            .map_err(|e| GenerateError::UnexpectedResponse(format!("/prompt: {}", e)))?;

        debug!("Queue position: {:?}", parsed.number);
        if !parsed.node_errors.is_empty() {
            return Err(GenerateError::Validation(
                serde_json::Value::Object(parsed.node_errors).to_string(),
            ));
        }

        parsed
            .prompt_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| GenerateError::UnexpectedResponse("/prompt returned no prompt_id".into()))
    }

    /// `GET /system_stats`.
    pub async fn system_stats(&self) -> Result<SystemStats> {
        self.get_json("/system_stats").await
    }

    /// `POST /upload/image`, returning the name the backend stored the file under.
    pub async fn upload_image(&self, file_name: &str, bytes: Vec<u8>) -> Result<UploadResponse> {
        let form = Form::new()
            .part("image", Part::bytes(bytes).file_name(file_name.to_string()))
            .text("overwrite", "true");

        let response = self
            .client
            .post(self.url("/upload/image"))
            .multipart(form)
            .send()
            .await
            .map_err(GenerateError::from_transport)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(GenerateError::UnexpectedResponse(format!(
                "HTTP {} from /upload/image: {}",
                status, body
            )));
        }

        response
            .json()
            .await
            .map_err(|e| GenerateError::UnexpectedResponse(format!("/upload/image: {}", e)))
    }
}

#[async_trait]
impl DiffusionApi for ComfyBackend {
    async fn object_info(&self) -> Result<ObjectInfo> {
        self.get_json("/object_info").await
    }

    async fn queue_prompt(&self, graph: &JobGraph) -> Result<String> {
        let body = PromptRequest {
            prompt: graph,
            client_id: &self.client_id,
        };
        debug!(
            workflow = %serde_json::to_string(graph).unwrap_or_default(),
            "Prepared workflow"
        );

        if self.prevalidate {
            info!("Validating workflow...");
            let validated_id = self.post_prompt(&body).await?;
            debug!("Validation round-trip accepted as {}", validated_id);
        }

        info!("Sending workflow to backend");
        self.post_prompt(&body).await
    }

    async fn history(&self, prompt_id: &str) -> Result<History> {
        self.get_json(&format!("/history/{}", prompt_id)).await
    }

    async fn view(&self, image: &ImageRef) -> Result<Vec<u8>> {
        let mut query = vec![("filename", image.filename.as_str())];
        if !image.subfolder.is_empty() {
            query.push(("subfolder", image.subfolder.as_str()));
        }
        if let Some(kind) = image.kind.as_deref() {
            query.push(("type", kind));
        }

        let response = self
            .client
            .get(self.url("/view"))
            .query(&query)
            .send()
            .await
            .map_err(GenerateError::from_transport)?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(GenerateError::NotFound(image.filename.clone())),
            status if !status.is_success() => Err(GenerateError::UnexpectedResponse(format!(
                "HTTP {} from /view for {}",
                status, image.filename
            ))),
            _ => {
                let bytes = response.bytes().await.map_err(GenerateError::from_transport)?;
                Ok(bytes.to_vec())
            }
        }
    }
}
