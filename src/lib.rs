pub mod config;
pub mod constants;
pub mod error;
pub mod manifest;
pub mod observability;
pub mod pipeline;
pub mod schema;
pub mod sink;
pub mod stats;

pub use config::PipelineConfig;
pub use error::{PipelineError, Result};
pub use pipeline::{Pipeline, PipelineResult, StageOptions};
pub use sink::{DirectorySink, Layer, LayerSink, MemorySink};
