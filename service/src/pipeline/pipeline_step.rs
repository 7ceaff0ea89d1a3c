use crate::error::Error;

/// What the pipeline does after a step returns.
#[derive(Debug, Clone, PartialEq)]
pub enum StepAction {
    /// Run the next step
    Continue,
    /// Stop successfully without running the remaining steps
    Skip,
    /// Stop with an error
    Abort(Error),
}

/// One unit of work in a [`Pipeline`](super::Pipeline).
///
/// Steps read their dependencies from the context `T` and record their
/// results back into it. They never return errors directly; a failure is
/// reported as [`StepAction::Abort`].
///
/// ```ignore
/// struct MarkDeletedStep;
///
/// #[async_trait::async_trait]
/// impl PipelineStep<DeletionContext> for MarkDeletedStep {
///     fn name(&self) -> &'static str {
///         "mark_deleted"
///     }
///
///     async fn execute(&self, context: &mut DeletionContext) -> StepAction {
///         match context.store.set_diary_deleted(&context.diary_id, true).await {
///             Ok(()) => StepAction::Continue,
///             Err(e) => StepAction::Abort(e.into()),
///         }
///     }
/// }
/// ```
#[async_trait::async_trait]
pub trait PipelineStep<T>: Send + Sync {
    fn name(&self) -> &'static str;

    /// Checked right before `execute`. Returning `false` skips only this step.
    fn should_execute(&self, _context: &T) -> bool {
        true
    }

    async fn execute(&self, context: &mut T) -> StepAction;
}
