//! Declarative job graphs in the backend's API format.
//!
//! A graph maps node ids to `{ "class_type", "inputs" }`. An input is either a
//! literal or a link to another node's output, serialized as `["<node>", slot]`.

use std::collections::{BTreeMap, HashMap};
use rand::Rng;
use serde::{Deserialize, Serialize};
use crate::error::{Error, Result};
use crate::request::GenerationRequest;

/// Seeds are drawn from `0..SEED_RANGE`.
pub const SEED_RANGE: u64 = 1_000_000;
pub const FILENAME_PREFIX: &str = "ai-sandbox";

pub const SAMPLER: &str = "3";
pub const CHECKPOINT: &str = "4";
pub const LATENT: &str = "5";
pub const POSITIVE: &str = "6";
pub const NEGATIVE: &str = "7";
pub const DECODER: &str = "8";
pub const SAVER: &str = "9";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeKind {
    KSampler,
    CheckpointLoaderSimple,
    EmptyLatentImage,
    #[serde(rename = "CLIPTextEncode")]
    ClipTextEncode,
    #[serde(rename = "VAEDecode")]
    VaeDecode,
    SaveImage,
}

impl NodeKind {
    /// Operation name as the backend knows it.
    pub fn class_name(&self) -> &'static str {
        match self {
            Self::KSampler => "KSampler",
            Self::CheckpointLoaderSimple => "CheckpointLoaderSimple",
            Self::EmptyLatentImage => "EmptyLatentImage",
            Self::ClipTextEncode => "CLIPTextEncode",
            Self::VaeDecode => "VAEDecode",
            Self::SaveImage => "SaveImage",
        }
    }

    pub fn all() -> [NodeKind; 6] {
        [
            Self::KSampler,
            Self::CheckpointLoaderSimple,
            Self::EmptyLatentImage,
            Self::ClipTextEncode,
            Self::VaeDecode,
            Self::SaveImage,
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Input {
    Link(String, u32),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Input {
    pub fn link(node: &str, slot: u32) -> Self {
        Self::Link(node.to_string(), slot)
    }
}

impl From<&str> for Input {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<i64> for Input {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<u32> for Input {
    fn from(value: u32) -> Self {
        Self::Int(value.into())
    }
}

impl From<f64> for Input {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub class_type: NodeKind,
    pub inputs: BTreeMap<String, Input>,
}

impl Node {
    pub fn new(class_type: NodeKind) -> Self {
        Self {
            class_type,
            inputs: BTreeMap::new(),
        }
    }

    pub fn with(mut self, name: &str, value: impl Into<Input>) -> Self {
        self.inputs.insert(name.to_string(), value.into());
        self
    }

    fn links(&self) -> impl Iterator<Item = &str> {
        self.inputs.values().filter_map(|input| match input {
            Input::Link(node, _) => Some(node.as_str()),
            _ => None,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobGraph {
    nodes: BTreeMap<String, Node>,
}

impl JobGraph {
    pub fn insert(&mut self, id: &str, node: Node) {
        self.nodes.insert(id.to_string(), node);
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = (&str, &Node)> {
        self.nodes.iter().map(|(id, node)| (id.as_str(), node))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Seed of the sampler node, if the graph has one.
    pub fn seed(&self) -> Option<i64> {
        match self.node(SAMPLER)?.inputs.get("seed")? {
            Input::Int(seed) => Some(*seed),
            _ => None,
        }
    }

    /// Checks that the graph is non-empty, that every link resolves inside
    /// the graph, and that the links form no cycle.
    pub fn validate(&self) -> Result<()> {
        if self.is_empty() {
            return Err(Error::InvalidGraph("graph has no nodes".into()));
        }

        for (id, node) in self.nodes() {
            for target in node.links() {
                if !self.nodes.contains_key(target) {
                    return Err(Error::InvalidGraph(format!(
                        "node '{}' links to missing node '{}'",
                        id, target
                    )));
                }
            }
        }

        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Visiting,
            Done,
        }

        fn visit<'a>(
            graph: &'a JobGraph,
            id: &'a str,
            marks: &mut HashMap<&'a str, Mark>,
        ) -> Result<()> {
            match marks.get(id) {
                Some(Mark::Done) => return Ok(()),
                Some(Mark::Visiting) => {
                    return Err(Error::InvalidGraph(format!("cycle through node '{}'", id)));
                }
                None => {}
            }
            marks.insert(id, Mark::Visiting);
            if let Some(node) = graph.nodes.get(id) {
                for target in node.links() {
                    visit(graph, target, marks)?;
                }
            }
            marks.insert(id, Mark::Done);
            Ok(())
        }

        let mut marks = HashMap::new();
        for id in self.nodes.keys() {
            visit(self, id, &mut marks)?;
        }
        Ok(())
    }
}

/// Fixed sampler hyperparameters.
#[derive(Debug, Clone, PartialEq)]
pub struct SamplerSettings {
    pub steps: u32,
    pub cfg: f64,
    pub sampler_name: &'static str,
    pub scheduler: &'static str,
    pub denoise: f64,
}

impl Default for SamplerSettings {
    fn default() -> Self {
        Self {
            steps: 20,
            cfg: 7.0,
            sampler_name: "euler",
            scheduler: "normal",
            denoise: 1.0,
        }
    }
}

/// Builds the text-to-image graph with a fresh random seed, so identical
/// prompts still produce distinct images.
pub fn build_graph(request: &GenerationRequest) -> JobGraph {
    let seed = rand::thread_rng().gen_range(0..SEED_RANGE);
    build_graph_with_seed(request, seed)
}

pub fn build_graph_with_seed(request: &GenerationRequest, seed: u64) -> JobGraph {
    let sampler = SamplerSettings::default();
    let mut graph = JobGraph::default();

    graph.insert(
        SAMPLER,
        Node::new(NodeKind::KSampler)
            .with("seed", seed as i64)
            .with("steps", sampler.steps)
            .with("cfg", sampler.cfg)
            .with("sampler_name", sampler.sampler_name)
            .with("scheduler", sampler.scheduler)
            .with("denoise", sampler.denoise)
            .with("model", Input::link(CHECKPOINT, 0))
            .with("positive", Input::link(POSITIVE, 0))
            .with("negative", Input::link(NEGATIVE, 0))
            .with("latent_image", Input::link(LATENT, 0)),
    );
    graph.insert(
        CHECKPOINT,
        Node::new(NodeKind::CheckpointLoaderSimple).with("ckpt_name", request.model_name()),
    );
    graph.insert(
        LATENT,
        Node::new(NodeKind::EmptyLatentImage)
            .with("width", request.width())
            .with("height", request.height())
            .with("batch_size", 1u32),
    );
    graph.insert(
        POSITIVE,
        Node::new(NodeKind::ClipTextEncode)
            .with("text", request.prompt())
            .with("clip", Input::link(CHECKPOINT, 1)),
    );
    graph.insert(
        NEGATIVE,
        Node::new(NodeKind::ClipTextEncode)
            .with("text", request.negative_prompt())
            .with("clip", Input::link(CHECKPOINT, 1)),
    );
    graph.insert(
        DECODER,
        Node::new(NodeKind::VaeDecode)
            .with("samples", Input::link(SAMPLER, 0))
            .with("vae", Input::link(CHECKPOINT, 2)),
    );
    graph.insert(
        SAVER,
        Node::new(NodeKind::SaveImage)
            .with("filename_prefix", FILENAME_PREFIX)
            .with("images", Input::link(DECODER, 0)),
    );

    graph
}
