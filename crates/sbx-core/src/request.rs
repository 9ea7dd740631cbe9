use std::fmt;
use serde::{Deserialize, Serialize};
use crate::error::{Error, Result};

pub const DEFAULT_NEGATIVE_PROMPT: &str = "text, watermark";
pub const DEFAULT_MODEL: &str = "dreamshaper_8.safetensors";
pub const DEFAULT_WIDTH: u32 = 448;
pub const DEFAULT_HEIGHT: u32 = 640;

/// Values used for every field a caller leaves out of a request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GenerationDefaults {
    pub negative_prompt: String,
    pub model_name: String,
    pub width: u32,
    pub height: u32,
}

impl Default for GenerationDefaults {
    fn default() -> Self {
        Self {
            negative_prompt: DEFAULT_NEGATIVE_PROMPT.to_string(),
            model_name: DEFAULT_MODEL.to_string(),
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
        }
    }
}

/// Correlation token of a consuming application, used as part of a filename.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct AreaId(String);

impl AreaId {
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(Error::InvalidRequest("area id is empty".into()));
        }
        if !raw.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
            return Err(Error::InvalidRequest(format!(
                "area id '{}' may only contain letters, digits, '-' and '_'",
                raw
            )));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AreaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where the produced artifact ends up.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OutputSlot {
    /// The shared `generated.png` of the web UI.
    Generated,
    /// `area_<id>.png` in the survival directory.
    Area(AreaId),
}

impl OutputSlot {
    pub fn file_name(&self) -> String {
        match self {
            Self::Generated => "generated.png".to_string(),
            Self::Area(id) => format!("area_{}.png", id),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    prompt: String,
    negative_prompt: String,
    model_name: String,
    width: u32,
    height: u32,
    slot: OutputSlot,
}

impl GenerationRequest {
    pub fn builder(prompt: impl Into<String>) -> RequestBuilder {
        RequestBuilder {
            prompt: prompt.into(),
            negative_prompt: None,
            model_name: None,
            width: None,
            height: None,
            area_id: None,
        }
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn negative_prompt(&self) -> &str {
        &self.negative_prompt
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn slot(&self) -> &OutputSlot {
        &self.slot
    }
}

/// Collects optional caller input. Empty strings and zero dimensions are
/// treated as "not given" and replaced by the defaults at build time.
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    prompt: String,
    negative_prompt: Option<String>,
    model_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    area_id: Option<String>,
}

impl RequestBuilder {
    pub fn negative_prompt(mut self, value: Option<impl Into<String>>) -> Self {
        self.negative_prompt = non_empty(value);
        self
    }

    pub fn model_name(mut self, value: Option<impl Into<String>>) -> Self {
        self.model_name = non_empty(value);
        self
    }

    pub fn size(mut self, width: Option<u32>, height: Option<u32>) -> Self {
        self.width = width.filter(|w| *w > 0);
        self.height = height.filter(|h| *h > 0);
        self
    }

    pub fn area_id(mut self, value: Option<impl Into<String>>) -> Self {
        self.area_id = non_empty(value);
        self
    }

    pub fn build(self, defaults: &GenerationDefaults) -> Result<GenerationRequest> {
        let prompt = self.prompt.trim();
        if prompt.is_empty() {
            return Err(Error::InvalidRequest("prompt is required".into()));
        }

        let width = self.width.unwrap_or(defaults.width);
        let height = self.height.unwrap_or(defaults.height);
        if width == 0 || height == 0 {
            return Err(Error::InvalidRequest(format!(
                "dimensions must be positive, got {}x{}",
                width, height
            )));
        }

        let slot = match self.area_id {
            Some(raw) => OutputSlot::Area(AreaId::parse(&raw)?),
            None => OutputSlot::Generated,
        };

        Ok(GenerationRequest {
            prompt: prompt.to_string(),
            negative_prompt: self
                .negative_prompt
                .unwrap_or_else(|| defaults.negative_prompt.clone()),
            model_name: self
                .model_name
                .unwrap_or_else(|| defaults.model_name.clone()),
            width,
            height,
            slot,
        })
    }
}

fn non_empty(value: Option<impl Into<String>>) -> Option<String> {
    value
        .map(Into::into)
        .filter(|s: &String| !s.trim().is_empty())
}
