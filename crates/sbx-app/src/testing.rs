//! Test doubles for the diffusion backend: an in-process HTTP server speaking
//! the backend's API and a scripted in-memory [`DiffusionApi`].

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use async_trait::async_trait;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Value, json};
use tokio::sync::oneshot;
use sbx_core::{History, ImageRef, JobGraph};
use crate::error::{GenerateError, Result};
use crate::generator::backend::DiffusionApi;
use crate::generator::backend::schemas::ObjectInfo;

#[derive(Default)]
struct MockInner {
    prompt_id: String,
    prompt_posts: usize,
    last_prompt: Option<Value>,
    rejection: Option<String>,
    history: Value,
    /// filename -> (bytes, remaining 404 answers before serving)
    images: HashMap<String, (Vec<u8>, usize)>,
}

#[derive(Clone)]
struct MockState(Arc<Mutex<MockInner>>);

impl MockState {
    fn lock(&self) -> MutexGuard<'_, MockInner> {
        self.0.lock().unwrap_or_else(|e| e.into_inner())
    }
}

pub struct MockComfy {
    port: u16,
    state: MockState,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<tokio::task::JoinHandle<()>>,
}

async fn object_info() -> Json<Value> {
    Json(json!({
        "CheckpointLoaderSimple": {
            "input": { "required": { "ckpt_name": [["dreamshaper_8.safetensors", "sdxl.safetensors"]] } }
        },
        "KSampler": {},
        "EmptyLatentImage": {},
        "CLIPTextEncode": {},
        "VAEDecode": {},
        "SaveImage": {}
    }))
}

async fn queue_prompt(State(state): State<MockState>, Json(body): Json<Value>) -> Response {
    let mut inner = state.lock();
    if let Some(rejection) = inner.rejection.clone() {
        return (
            StatusCode::BAD_REQUEST,
            [("content-type", "application/json")],
            rejection,
        )
            .into_response();
    }

    inner.prompt_posts += 1;
    inner.last_prompt = Some(body);
    Json(json!({
        "prompt_id": inner.prompt_id,
        "number": inner.prompt_posts,
        "node_errors": {}
    }))
    .into_response()
}

async fn history(State(state): State<MockState>, Path(_id): Path<String>) -> Json<Value> {
    Json(state.lock().history.clone())
}

async fn view(
    State(state): State<MockState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let mut inner = state.lock();
    let Some(filename) = params.get("filename") else {
        return StatusCode::BAD_REQUEST.into_response();
    };

    match inner.images.get_mut(filename) {
        Some((_, pending)) if *pending > 0 => {
            *pending -= 1;
            StatusCode::NOT_FOUND.into_response()
        }
        Some((bytes, _)) => bytes.clone().into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn system_stats() -> Json<Value> {
    Json(json!({
        "system": {
            "comfyui_version": "0.3.10",
            "python_version": "3.11.9",
            "pytorch_version": "2.5.1+cu124"
        },
        "devices": [{
            "name": "cuda:0 NVIDIA GeForce RTX 4090",
            "vram_total": 25757220864u64,
            "vram_free": 24000000000u64
        }]
    }))
}

async fn upload_image() -> Json<Value> {
    Json(json!({ "name": "mask.png", "subfolder": "", "type": "input" }))
}

impl MockComfy {
    pub async fn start() -> anyhow::Result<Self> {
        let state = MockState(Arc::new(Mutex::new(MockInner {
            prompt_id: "prompt-1".to_string(),
            history: json!({}),
            ..Default::default()
        })));

        let app = Router::new()
            .route("/api/object_info", get(object_info))
            .route("/api/prompt", post(queue_prompt))
            .route("/api/history/{id}", get(history))
            .route("/api/view", get(view))
            .route("/api/system_stats", get(system_stats))
            .route("/api/upload/image", post(upload_image))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let port = listener.local_addr()?.port();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            let _ = axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await;
        });

        Ok(Self {
            port,
            state,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    pub fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    pub fn api_url(&self) -> String {
        format!("{}/api", self.base_url())
    }

    pub fn prompt_id(&self) -> String {
        self.state.lock().prompt_id.clone()
    }

    pub fn prompt_posts(&self) -> usize {
        self.state.lock().prompt_posts
    }

    pub fn last_prompt(&self) -> Option<Value> {
        self.state.lock().last_prompt.clone()
    }

    /// Answer every `/prompt` with HTTP 400 and this body.
    pub fn reject_prompts(&self, body: &str) {
        self.state.lock().rejection = Some(body.to_string());
    }

    pub fn set_history(&self, history: Value) {
        self.state.lock().history = history;
    }

    /// Serve `bytes` under `filename` after answering 404 `not_found_first` times.
    pub fn serve_image(&self, filename: &str, bytes: Vec<u8>, not_found_first: usize) {
        self.state
            .lock()
            .images
            .insert(filename.to_string(), (bytes, not_found_first));
    }

    /// History reports `filename` as the output of node 9 and the file is servable.
    pub fn complete_with(&self, filename: &str, bytes: Vec<u8>) {
        let mut history = serde_json::Map::new();
        history.insert(
            self.prompt_id(),
            json!({ "outputs": { "9": { "images": [{ "filename": filename }] } } }),
        );
        self.set_history(Value::Object(history));
        self.serve_image(filename, bytes, 0);
    }

    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

/// In-memory backend that replays queued answers.
#[derive(Default)]
pub struct ScriptedApi {
    object_info_error: Mutex<Option<GenerateError>>,
    submissions: Mutex<Vec<JobGraph>>,
    histories: Mutex<VecDeque<Result<History>>>,
    views: Mutex<VecDeque<Result<Vec<u8>>>>,
    history_calls: Mutex<usize>,
    view_calls: Mutex<usize>,
}

fn locked<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

impl ScriptedApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_object_info(self, err: GenerateError) -> Self {
        *locked(&self.object_info_error) = Some(err);
        self
    }

    /// Queue a history answer. Once the queue runs dry every poll sees an
    /// empty history.
    pub fn push_history(self, answer: Result<Value>) -> Self {
        let answer = answer.map(|v| serde_json::from_value(v).expect("history fixture"));
        locked(&self.histories).push_back(answer);
        self
    }

    /// Queue a `/view` answer. Once the queue runs dry every fetch is a 404.
    pub fn push_view(self, answer: Result<Vec<u8>>) -> Self {
        locked(&self.views).push_back(answer);
        self
    }

    pub fn submissions(&self) -> Vec<JobGraph> {
        locked(&self.submissions).clone()
    }

    pub fn history_calls(&self) -> usize {
        *locked(&self.history_calls)
    }

    pub fn view_calls(&self) -> usize {
        *locked(&self.view_calls)
    }
}

#[async_trait]
impl DiffusionApi for ScriptedApi {
    async fn object_info(&self) -> Result<ObjectInfo> {
        match locked(&self.object_info_error).take() {
            Some(err) => Err(err),
            None => Ok(ObjectInfo::default()),
        }
    }

    async fn queue_prompt(&self, graph: &JobGraph) -> Result<String> {
        locked(&self.submissions).push(graph.clone());
        Ok("scripted".to_string())
    }

    async fn history(&self, _prompt_id: &str) -> Result<History> {
        *locked(&self.history_calls) += 1;
        locked(&self.histories)
            .pop_front()
            .unwrap_or_else(|| Ok(History::new()))
    }

    async fn view(&self, image: &ImageRef) -> Result<Vec<u8>> {
        *locked(&self.view_calls) += 1;
        locked(&self.views)
            .pop_front()
            .unwrap_or_else(|| Err(GenerateError::NotFound(image.filename.clone())))
    }
}
