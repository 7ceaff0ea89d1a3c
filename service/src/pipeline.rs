mod generic_pipeline;
mod pipeline_step;

pub use generic_pipeline::Pipeline;
pub use pipeline_step::{PipelineStep, StepAction};
