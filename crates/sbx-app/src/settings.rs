use std::io::ErrorKind;
use std::path::PathBuf;
use anyhow::Context;
use tracing::info;
use sbx_core::GenerationDefaults;

/// JSON file holding the defaults the web UI fills into requests.
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// A missing file yields the built-in defaults.
    pub async fn load(&self) -> anyhow::Result<GenerationDefaults> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => serde_json::from_str(&text)
                .with_context(|| format!("invalid settings file {}", self.path.display())),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("No settings at {}, using defaults", self.path.display());
                Ok(GenerationDefaults::default())
            }
            Err(e) => Err(e).with_context(|| format!("failed to read {}", self.path.display())),
        }
    }

    pub async fn save(&self, settings: &GenerationDefaults) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let text = serde_json::to_string_pretty(settings)?;
        tokio::fs::write(&self.path, text)
            .await
            .with_context(|| format!("failed to write {}", self.path.display()))?;
        info!("Settings saved to {}", self.path.display());
        Ok(())
    }
}
