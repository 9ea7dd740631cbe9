use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use serde_json::json;
use tracing::error;
use crate::error::GenerateError;

/// Fields of the HTML form on `/`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GenerateForm {
    #[serde(default)]
    pub prompt: String,
    pub negative: Option<String>,
    pub model: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GenerateBody {
    #[serde(default)]
    pub prompt: String,
    pub negative_prompt: Option<String>,
    pub model: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub area_id: Option<String>,
}

#[derive(Debug)]
pub enum ApiError {
    Generate(GenerateError),
    BadRequest(String),
    Internal(anyhow::Error),
}

impl From<GenerateError> for ApiError {
    fn from(err: GenerateError) -> Self {
        Self::Generate(err)
    }
}

impl From<sbx_core::Error> for ApiError {
    fn from(err: sbx_core::Error) -> Self {
        Self::BadRequest(err.to_string())
    }
}

impl From<minijinja::Error> for ApiError {
    fn from(err: minijinja::Error) -> Self {
        Self::Internal(err.into())
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Generate(err) => match err {
                GenerateError::Request(_) => StatusCode::BAD_REQUEST,
                GenerateError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
                GenerateError::GenerationFailed(_)
                | GenerateError::NotFound(_)
                | GenerateError::UnexpectedResponse(_) => StatusCode::BAD_GATEWAY,
                GenerateError::Connection(_) => StatusCode::SERVICE_UNAVAILABLE,
                GenerateError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
                GenerateError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            Self::Generate(err) => err.to_string(),
            Self::BadRequest(msg) => msg.clone(),
            Self::Internal(err) => format!("{:#}", err),
        };
        error!("{} {}", status, message);
        (status, Json(json!({ "error": message }))).into_response()
    }
}
