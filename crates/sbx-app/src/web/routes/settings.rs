use std::sync::Arc;
use axum::extract::State;
use axum::Json;
use sbx_core::GenerationDefaults;
use crate::web::schemas::ApiError;
use crate::web::state::WebState;

pub async fn get_settings(State(state): State<Arc<WebState>>) -> Json<GenerationDefaults> {
    Json(state.settings().await)
}

pub async fn put_settings(
    State(state): State<Arc<WebState>>,
    Json(settings): Json<GenerationDefaults>,
) -> Result<Json<GenerationDefaults>, ApiError> {
    if settings.width == 0 || settings.height == 0 {
        return Err(ApiError::BadRequest("width and height must be positive".into()));
    }
    if settings.model_name.trim().is_empty() {
        return Err(ApiError::BadRequest("model_name is required".into()));
    }

    state.save_settings(settings.clone()).await?;
    Ok(Json(settings))
}

pub async fn list_models(State(state): State<Arc<WebState>>) -> Result<Json<Vec<String>>, ApiError> {
    Ok(Json(state.generator.available_checkpoints().await?))
}
