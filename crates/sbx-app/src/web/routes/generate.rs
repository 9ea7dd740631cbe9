use std::sync::Arc;
use axum::extract::{Form, State};
use axum::response::Html;
use axum::Json;
use tracing::error;
use sbx_core::{GenerationDefaults, GenerationRequest};
use crate::generator::artifact::Artifact;
use crate::web::page::{Page, render};
use crate::web::schemas::{ApiError, GenerateBody, GenerateForm};
use crate::web::state::WebState;

pub async fn index(State(state): State<Arc<WebState>>) -> Result<Html<String>, ApiError> {
    Ok(Html(render(&Page::default(), &state.settings().await)?))
}

/// Form submission from the page; always answers with the page.
pub async fn generate_page(
    State(state): State<Arc<WebState>>,
    Form(form): Form<GenerateForm>,
) -> Result<Html<String>, ApiError> {
    let defaults = state.settings().await;

    if form.prompt.trim().is_empty() {
        return respond(&form.prompt, &defaults, None, Some("Prompt is required"));
    }

    let request = match GenerationRequest::builder(form.prompt.clone())
        .negative_prompt(form.negative.clone())
        .model_name(form.model.clone())
        .build(&defaults)
    {
        Ok(request) => request,
        Err(e) => return respond(&form.prompt, &defaults, None, Some(e.to_string().as_str())),
    };

    match state.generator.generate(&request).await {
        Ok(artifact) => respond(&form.prompt, &defaults, Some(artifact.public_path.as_str()), None),
        Err(e) => {
            error!("Error: {}", e);
            let message = format!("Failed to generate image: {}", e);
            respond(&form.prompt, &defaults, None, Some(message.as_str()))
        }
    }
}

fn respond(
    prompt: &str,
    defaults: &GenerationDefaults,
    image_path: Option<&str>,
    error: Option<&str>,
) -> Result<Html<String>, ApiError> {
    let page = Page {
        prompt,
        image_path,
        error,
    };
    Ok(Html(render(&page, defaults)?))
}

pub async fn generate_json(
    State(state): State<Arc<WebState>>,
    Json(body): Json<GenerateBody>,
) -> Result<Json<Artifact>, ApiError> {
    let request = GenerationRequest::builder(body.prompt)
        .negative_prompt(body.negative_prompt)
        .model_name(body.model)
        .size(body.width, body.height)
        .area_id(body.area_id)
        .build(&state.settings().await)?;

    Ok(Json(state.generator.generate(&request).await?))
}
