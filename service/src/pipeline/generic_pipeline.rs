use super::pipeline_step::{PipelineStep, StepAction};
use crate::error::Error;

/// Runs a fixed list of steps against a shared context, in order.
///
/// Control is handed back to the executor between steps so that long
/// pipelines do not starve other tasks on the same runtime.
pub struct Pipeline<T> {
    pub steps: Vec<Box<dyn PipelineStep<T>>>,
}

impl<T: Send> Pipeline<T> {
    pub fn with_steps(steps: Vec<Box<dyn PipelineStep<T>>>) -> Self {
        Self { steps }
    }

    /// Returns `Ok(())` when every step continued or one asked to skip the
    /// rest, and the step's error when one aborted.
    pub async fn execute(&self, context: &mut T) -> Result<(), Error> {
        for step in &self.steps {
            if !step.should_execute(context) {
                tracing::debug!(step = step.name(), "Step skipped based on context");
                continue;
            }

            tracing::debug!(step = step.name(), "Executing step");

            match step.execute(context).await {
                StepAction::Continue => {}
                StepAction::Skip => {
                    tracing::info!(step = step.name(), "Step requested skip, stopping pipeline");
                    return Ok(());
                }
                StepAction::Abort(error) => {
                    tracing::warn!(step = step.name(), error = %error, "Step aborted the pipeline");
                    return Err(error);
                }
            }

            async_std::task::yield_now().await;
        }

        Ok(())
    }
}
