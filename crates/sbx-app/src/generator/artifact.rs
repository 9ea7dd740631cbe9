use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use serde::Serialize;
use tokio::fs;
use tokio::sync::OwnedMutexGuard;
use tracing::info;
use sbx_core::OutputSlot;

/// A stored image and the path it is served under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Artifact {
    #[serde(skip)]
    pub path: PathBuf,
    #[serde(rename = "path")]
    pub public_path: String,
}

/// Maps output slots to fixed files below the public directory. Each slot
/// holds at most one image; saving replaces the previous one.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    images_dir: PathBuf,
    survival_dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(images_dir: impl Into<PathBuf>, survival_dir: impl Into<PathBuf>) -> Self {
        Self {
            images_dir: images_dir.into(),
            survival_dir: survival_dir.into(),
        }
    }

    /// `public/images` and `public/survival`.
    pub fn under(public_dir: &Path) -> Self {
        Self::new(public_dir.join("images"), public_dir.join("survival"))
    }

    fn dir(&self, slot: &OutputSlot) -> &Path {
        match slot {
            OutputSlot::Generated => &self.images_dir,
            OutputSlot::Area(_) => &self.survival_dir,
        }
    }

    pub fn destination(&self, slot: &OutputSlot) -> PathBuf {
        self.dir(slot).join(slot.file_name())
    }

    pub fn public_path(slot: &OutputSlot) -> String {
        match slot {
            OutputSlot::Generated => format!("/images/{}", slot.file_name()),
            OutputSlot::Area(_) => format!("/survival/{}", slot.file_name()),
        }
    }

    /// Creates the directory if needed, removes the previous file, then writes.
    pub async fn save(&self, slot: &OutputSlot, bytes: &[u8]) -> std::io::Result<Artifact> {
        let dir = self.dir(slot);
        fs::create_dir_all(dir).await?;

        let path = self.destination(slot);
        match fs::remove_file(&path).await {
            Ok(()) => info!("Removed previous image at {}", path.display()),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }

        fs::write(&path, bytes).await?;
        info!("Image saved to: {}", path.display());

        Ok(Artifact {
            path,
            public_path: Self::public_path(slot),
        })
    }
}

/// One async mutex per destination path, so two generations aimed at the
/// same slot run one after the other instead of clobbering each other.
#[derive(Debug, Default)]
pub struct SlotLocks {
    locks: Mutex<HashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>>,
}

impl SlotLocks {
    pub async fn acquire(&self, path: &Path) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            locks.entry(path.to_path_buf()).or_default().clone()
        };
        lock.lock_owned().await
    }
}
