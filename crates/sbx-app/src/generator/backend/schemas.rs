use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sbx_core::JobGraph;
use sbx_core::workflow::NodeKind;

#[derive(Debug, Clone, Serialize)]
pub struct PromptRequest<'a> {
    pub prompt: &'a JobGraph,
    pub client_id: &'a str,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct PromptResponse {
    pub prompt_id: Option<String>,
    #[serde(default)]
    pub number: Option<u64>,
    #[serde(default)]
    pub node_errors: Map<String, Value>,
}

/// Body of `GET /object_info`: operation name to its schema.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct ObjectInfo(Map<String, Value>);

impl ObjectInfo {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn has(&self, kind: NodeKind) -> bool {
        self.0.contains_key(kind.class_name())
    }

    /// Checkpoint names, read from the loader's `ckpt_name` enumeration:
    /// `{"input": {"required": {"ckpt_name": [["a.safetensors", ...], ...]}}}`.
    pub fn checkpoints(&self) -> Vec<String> {
        self.0
            .get(NodeKind::CheckpointLoaderSimple.class_name())
            .and_then(|op| op.pointer("/input/required/ckpt_name/0"))
            .and_then(Value::as_array)
            .map(|names| {
                names
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SystemStats {
    pub system: SystemInfo,
    #[serde(default)]
    pub devices: Vec<DeviceInfo>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SystemInfo {
    #[serde(default)]
    pub comfyui_version: Option<String>,
    #[serde(default)]
    pub python_version: Option<String>,
    #[serde(default)]
    pub pytorch_version: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeviceInfo {
    pub name: String,
    #[serde(default)]
    pub vram_total: u64,
    #[serde(default)]
    pub vram_free: u64,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct UploadResponse {
    pub name: String,
    #[serde(default)]
    pub subfolder: String,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
}

/// Human-readable reason from a rejected `/prompt` body. The backend sends
/// either `{"error": "..."}` or `{"error": {"message", "details"}, "node_errors"}`.
pub fn validation_message(body: &str) -> String {
    let Ok(value) = serde_json::from_str::<Value>(body) else {
        return body.trim().to_string();
    };

    match value.get("error") {
        Some(Value::String(message)) => message.clone(),
        Some(Value::Object(error)) => {
            let message = error.get("message").and_then(Value::as_str).unwrap_or_default();
            let details = error.get("details").and_then(Value::as_str).unwrap_or_default();
            match (message.is_empty(), details.is_empty()) {
                (false, false) => format!("{}: {}", message, details),
                (false, true) => message.to_string(),
                (true, false) => details.to_string(),
                (true, true) => value.to_string(),
            }
        }
        _ => value.to_string(),
    }
}
