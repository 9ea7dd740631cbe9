use std::sync::Arc;
use axum::Router;
use axum::routing::{get, post};
use crate::web::state::WebState;

mod generate;
mod settings;

pub fn page_routes() -> Router<Arc<WebState>> {
    Router::new()
        .route("/", get(generate::index))
        .route("/generate", post(generate::generate_page))
}

pub fn api_routes() -> Router<Arc<WebState>> {
    Router::new()
        .route("/api/generate", post(generate::generate_json))
        .route("/api/models", get(settings::list_models))
        .route(
            "/api/settings",
            get(settings::get_settings).put(settings::put_settings),
        )
}
