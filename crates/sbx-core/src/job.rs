use crate::history::{HistoryEntry, ImageRef};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    /// No history entry yet.
    Pending,
    /// Entry exists but carries no images.
    Running,
    Completed(Vec<ImageRef>),
    Failed(String),
}

impl JobStatus {
    /// Normalizes the history shapes the backend produces. An explicit
    /// failure wins over any outputs. `status.completed` without images is
    /// still `Running`: there is nothing to fetch yet.
    pub fn infer(entry: Option<&HistoryEntry>) -> Self {
        let Some(entry) = entry else {
            return Self::Pending;
        };

        if let Some(status) = entry.status.as_ref().filter(|s| s.is_failed()) {
            return Self::Failed(status.error_message());
        }

        let images = entry.images();
        if images.is_empty() {
            Self::Running
        } else {
            Self::Completed(images)
        }
    }
}
