pub mod coordinator;
mod playback;
pub mod queue;
mod synthesis;

pub use coordinator::{PipelineConfig, PipelineState, SpeechPipeline};
pub use queue::{OverflowPolicy, PipelineStats, QueuePolicy};
