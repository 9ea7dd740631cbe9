pub mod error;
pub mod history;
pub mod job;
pub mod request;
pub mod workflow;

pub use error::{Error, Result};
pub use history::{History, HistoryEntry, ImageRef};
pub use job::JobStatus;
pub use request::{AreaId, GenerationDefaults, GenerationRequest, OutputSlot};
pub use workflow::{JobGraph, build_graph, build_graph_with_seed};
