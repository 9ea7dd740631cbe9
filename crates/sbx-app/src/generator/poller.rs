use std::time::Duration;
use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};
use sbx_core::{ImageRef, JobStatus};
use crate::error::{GenerateError, Result};
use crate::generator::backend::DiffusionApi;

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(300);

/// An output the backend reported and actually served.
#[derive(Debug, Clone, PartialEq)]
pub struct Retrieved {
    pub image: ImageRef,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PollState {
    Polling,
    Found(Retrieved),
    Failed(String),
    TimedOut,
}

/// Waits for a submitted job to produce an image the backend can serve.
///
/// Reaching `Found` takes two things: the history must list an output image
/// and `/view` must return its bytes. The backend records outputs before the
/// file is servable, so fetch failures keep the poller in `Polling`.
pub struct Poller<'a> {
    api: &'a dyn DiffusionApi,
    interval: Duration,
    deadline: Duration,
}

impl<'a> Poller<'a> {
    pub fn new(api: &'a dyn DiffusionApi) -> Self {
        Self {
            api,
            interval: DEFAULT_INTERVAL,
            deadline: DEFAULT_DEADLINE,
        }
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    pub async fn poll(&self, prompt_id: &str) -> Result<Retrieved> {
        info!("Waiting for generation of {} to complete...", prompt_id);
        let started = Instant::now();

        loop {
            match self.advance(prompt_id, started).await {
                PollState::Polling => sleep(self.interval).await,
                PollState::Found(retrieved) => return Ok(retrieved),
                PollState::Failed(message) => return Err(GenerateError::GenerationFailed(message)),
                PollState::TimedOut => return Err(GenerateError::Timeout(self.deadline)),
            }
        }
    }

    /// One transition out of `Polling`.
    pub async fn advance(&self, prompt_id: &str, started: Instant) -> PollState {
        if started.elapsed() >= self.deadline {
            return PollState::TimedOut;
        }

        debug!("Checking history...");
        let history = match self.api.history(prompt_id).await {
            Ok(history) => history,
            Err(e) => {
                warn!("Error checking history: {}", e);
                return PollState::Polling;
            }
        };

        match JobStatus::infer(history.get(prompt_id)) {
            JobStatus::Pending => {
                debug!("No history entry yet");
                PollState::Polling
            }
            JobStatus::Running => {
                debug!("Job is running, no outputs yet");
                PollState::Polling
            }
            JobStatus::Failed(message) => PollState::Failed(message),
            JobStatus::Completed(images) => {
                // First image-bearing node in id order wins.
                for image in images {
                    info!("Found image: {}", image.filename);
                    match self.api.view(&image).await {
                        Ok(bytes) => return PollState::Found(Retrieved { image, bytes }),
                        Err(GenerateError::NotFound(_)) => {
                            info!("Image not available yet, waiting...");
                        }
                        Err(e) => warn!("Fetching {} failed: {}", image.filename, e),
                    }
                }
                PollState::Polling
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use crate::testing::ScriptedApi;

    fn completed(filename: &str) -> serde_json::Value {
        json!({ "scripted": { "outputs": { "9": { "images": [{ "filename": filename }] } } } })
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out_on_empty_history() {
        let api = ScriptedApi::new();
        let poller = Poller::new(&api).deadline(Duration::from_secs(2));

        let err = poller.poll("scripted").await.unwrap_err();
        assert!(matches!(err, GenerateError::Timeout(d) if d == Duration::from_secs(2)));
        assert!(api.history_calls() >= 2);
        assert_eq!(api.view_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_wins_over_outputs() {
        let api = ScriptedApi::new().push_history(Ok(json!({
            "scripted": {
                "status": { "failed": true, "error": "out of memory" },
                "outputs": { "9": { "images": [{ "filename": "x.png" }] } }
            }
        })));

        let err = Poller::new(&api).poll("scripted").await.unwrap_err();
        assert!(matches!(err, GenerateError::GenerationFailed(msg) if msg == "out of memory"));
        assert_eq!(api.view_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_keeps_polling_through_transient_not_found() {
        let api = ScriptedApi::new()
            .push_history(Ok(completed("x.png")))
            .push_history(Ok(completed("x.png")))
            .push_history(Ok(completed("x.png")))
            .push_view(Err(GenerateError::NotFound("x.png".into())))
            .push_view(Err(GenerateError::NotFound("x.png".into())))
            .push_view(Ok(b"png".to_vec()));

        let retrieved = Poller::new(&api)
            .deadline(Duration::from_secs(10))
            .poll("scripted")
            .await
            .unwrap();

        assert_eq!(retrieved.image.filename, "x.png");
        assert_eq!(retrieved.bytes, b"png".to_vec());
        assert_eq!(api.view_calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_history_errors_are_swallowed() {
        let api = ScriptedApi::new()
            .push_history(Err(GenerateError::Connection("connection reset".into())))
            .push_history(Ok(json!({})))
            .push_history(Ok(json!({ "scripted": {} })))
            .push_history(Ok(completed("x.png")))
            .push_view(Ok(vec![7]));

        let retrieved = Poller::new(&api).poll("scripted").await.unwrap();
        assert_eq!(retrieved.bytes, vec![7]);
        assert_eq!(api.history_calls(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_image_node_in_id_order_wins() {
        let api = ScriptedApi::new()
            .push_history(Ok(json!({
                "scripted": { "outputs": {
                    "9": { "images": [{ "filename": "b.png" }] },
                    "12": { "images": [{ "filename": "a.png" }] }
                } }
            })))
            .push_view(Ok(vec![1]));

        let retrieved = Poller::new(&api).poll("scripted").await.unwrap();
        assert_eq!(retrieved.image.filename, "a.png");
    }

    #[tokio::test(start_paused = true)]
    async fn test_falls_through_to_next_node_when_fetch_fails() {
        let api = ScriptedApi::new()
            .push_history(Ok(json!({
                "scripted": { "outputs": {
                    "12": { "images": [{ "filename": "a.png" }] },
                    "9": { "images": [{ "filename": "b.png" }] }
                } }
            })))
            .push_view(Err(GenerateError::NotFound("a.png".into())))
            .push_view(Ok(vec![2]));

        let retrieved = Poller::new(&api).poll("scripted").await.unwrap();
        assert_eq!(retrieved.image.filename, "b.png");
        assert_eq!(api.history_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_advance_reports_timed_out_after_deadline() {
        let api = ScriptedApi::new();
        let poller = Poller::new(&api).deadline(Duration::from_secs(1));
        let started = Instant::now();

        assert_eq!(poller.advance("scripted", started).await, PollState::Polling);
        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(poller.advance("scripted", started).await, PollState::TimedOut);
    }
}
