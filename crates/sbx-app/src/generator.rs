use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use sbx_core::{GenerationRequest, build_graph};
use crate::config::AppConfig;
use crate::error::Result;
use crate::generator::artifact::{Artifact, ArtifactStore, SlotLocks};
use crate::generator::backend::{ComfyBackend, DiffusionApi};
use crate::generator::poller::{DEFAULT_DEADLINE, DEFAULT_INTERVAL, Poller};

pub mod artifact;
pub mod backend;
pub mod poller;

/// Runs one text-to-image request end to end: check the backend, build and
/// submit the graph, wait for the image, store it.
pub struct Generator {
    api: Arc<dyn DiffusionApi>,
    store: ArtifactStore,
    slots: SlotLocks,
    interval: Duration,
    deadline: Duration,
}

impl Generator {
    pub fn new(config: &AppConfig) -> Result<Self> {
        let backend = ComfyBackend::new(config)?;
        Ok(Self::with_api(Arc::new(backend), ArtifactStore::under(&config.public_dir))
            .polling(config.poll_interval, config.timeout))
    }

    pub fn with_api(api: Arc<dyn DiffusionApi>, store: ArtifactStore) -> Self {
        Self {
            api,
            store,
            slots: SlotLocks::default(),
            interval: DEFAULT_INTERVAL,
            deadline: DEFAULT_DEADLINE,
        }
    }

    pub fn polling(mut self, interval: Duration, deadline: Duration) -> Self {
        self.interval = interval;
        self.deadline = deadline;
        self
    }

    /// Checkpoint names the backend advertises.
    pub async fn available_checkpoints(&self) -> Result<Vec<String>> {
        Ok(self.api.object_info().await?.checkpoints())
    }

    pub async fn generate(&self, request: &GenerationRequest) -> Result<Artifact> {
        info!("Generating image with prompt: {}", request.prompt());
        info!("Negative prompt: {}", request.negative_prompt());
        info!("Using model: {}", request.model_name());
        info!("Dimensions: {}x{}", request.width(), request.height());

        let destination = self.store.destination(request.slot());
        let _slot = self.slots.acquire(&destination).await;

        info!("Checking available models...");
        let object_info = self.api.object_info().await?;
        let checkpoints = object_info.checkpoints();
        info!("Backend offers {} operations", object_info.len());
        debug!("Available checkpoints: {:?}", checkpoints);
        if !checkpoints.is_empty() && !checkpoints.iter().any(|c| c == request.model_name()) {
            warn!(
                "Model {} is not in the backend's checkpoint list, submitting anyway",
                request.model_name()
            );
        }

        let graph = build_graph(request);
        graph.validate()?;
        let prompt_id = self.api.queue_prompt(&graph).await?;
        info!("Prompt queued with ID: {}", prompt_id);

        let retrieved = Poller::new(self.api.as_ref())
            .interval(self.interval)
            .deadline(self.deadline)
            .poll(&prompt_id)
            .await?;

        Ok(self.store.save(request.slot(), &retrieved.bytes).await?)
    }
}
