use tokio::sync::RwLock;
use sbx_core::GenerationDefaults;
use crate::generator::Generator;
use crate::settings::SettingsStore;

pub struct WebState {
    pub generator: Generator,
    settings: RwLock<GenerationDefaults>,
    settings_store: SettingsStore,
}

impl WebState {
    pub fn new(generator: Generator, settings_store: SettingsStore, settings: GenerationDefaults) -> Self {
        Self {
            generator,
            settings: RwLock::new(settings),
            settings_store,
        }
    }

    pub async fn settings(&self) -> GenerationDefaults {
        self.settings.read().await.clone()
    }

    /// Persists first, so a failed write leaves the live settings untouched.
    pub async fn save_settings(&self, settings: GenerationDefaults) -> anyhow::Result<()> {
        let mut current = self.settings.write().await;
        self.settings_store.save(&settings).await?;
        *current = settings;
        Ok(())
    }
}
