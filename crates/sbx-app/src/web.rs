mod page;
mod routes;
mod schemas;
mod state;

use std::path::Path;
use std::sync::Arc;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::services::ServeDir;
use tracing::info;
use sbx_core::GenerationDefaults;
use crate::config::AppConfig;
use crate::generator::Generator;
use crate::settings::SettingsStore;
use crate::web::routes::{api_routes, page_routes};

pub use state::WebState;

pub fn router(state: Arc<WebState>, public_dir: &Path) -> Router {
    Router::new()
        .merge(page_routes())
        .merge(api_routes())
        .fallback_service(ServeDir::new(public_dir))
        .with_state(state)
}

pub async fn serve(
    config: &AppConfig,
    settings_store: SettingsStore,
    settings: GenerationDefaults,
) -> anyhow::Result<()> {
    tokio::fs::create_dir_all(config.images_dir()).await?;
    tokio::fs::create_dir_all(config.survival_dir()).await?;

    let generator = Generator::new(config)?;
    let state = Arc::new(WebState::new(generator, settings_store, settings));

    let app = router(state, &config.public_dir);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr).await?;
    info!("Web UI server running at http://localhost:{}", config.port);
    info!("Using backend at {}", config.api_url());

    axum::serve(listener, app).await?;
    Ok(())
}
