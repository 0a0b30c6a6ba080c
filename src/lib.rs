pub mod align;
pub mod args;
pub mod audio;
pub mod burn;
pub mod concat;
pub mod config;
pub mod error;
pub mod ffmpeg;
pub mod overlay;
pub mod pipeline;
pub mod progress;
pub mod script;
pub mod segment;
pub mod store;
pub mod subtitle;
pub mod tts;
pub mod utils;

pub use config::{CursorPolicy, PipelineConfig};
pub use error::{PipelineError, PipelineResult};
pub use pipeline::{RowOutcome, RowPipeline, RowStage, RunContext, RunReport};
