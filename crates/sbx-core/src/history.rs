use std::collections::{BTreeMap, HashMap};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Body of `GET /history/{id}`: job id to its record.
pub type History = HashMap<String, HistoryEntry>;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryEntry {
    #[serde(default)]
    pub status: Option<EntryStatus>,
    /// Keyed by node id. Iterates in ascending id order.
    #[serde(default)]
    pub outputs: Option<BTreeMap<String, NodeOutput>>,
}

/// Both shapes seen in the wild: explicit `completed`/`failed`/`error` flags
/// and ComfyUI's `status_str` with an event log in `messages`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EntryStatus {
    #[serde(default)]
    pub completed: Option<bool>,
    #[serde(default)]
    pub failed: Option<bool>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub status_str: Option<String>,
    #[serde(default)]
    pub messages: Vec<Value>,
}

impl EntryStatus {
    pub fn is_failed(&self) -> bool {
        self.failed == Some(true) || self.status_str.as_deref() == Some("error")
    }

    /// Best available failure message.
    pub fn error_message(&self) -> String {
        if let Some(error) = self.error.as_deref().filter(|e| !e.is_empty()) {
            return error.to_string();
        }

        // messages: [["execution_error", { "exception_message": "...", ... }], ...]
        self.messages
            .iter()
            .filter_map(|m| m.as_array())
            .filter(|m| m.first().and_then(Value::as_str) == Some("execution_error"))
            .find_map(|m| {
                m.get(1)?
                    .get("exception_message")?
                    .as_str()
                    .map(|s| s.trim().to_string())
            })
            .unwrap_or_else(|| "generation failed without an error message".to_string())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NodeOutput {
    #[serde(default)]
    pub images: Vec<ImageRef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    pub filename: String,
    #[serde(default)]
    pub subfolder: String,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
}

impl ImageRef {
    pub fn named(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            subfolder: String::new(),
            kind: None,
        }
    }
}

impl HistoryEntry {
    /// First image of every node that produced one, in node order.
    pub fn images(&self) -> Vec<ImageRef> {
        self.outputs
            .iter()
            .flat_map(|outputs| outputs.values())
            .filter_map(|node| node.images.first().cloned())
            .collect()
    }
}
