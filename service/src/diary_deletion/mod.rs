pub mod context;
pub mod job_registry;
pub mod pipeline;
pub mod service;
pub mod steps;

pub use job_registry::{FailureOutcome, JobRegistry};
pub use service::{DeletionHandle, DiaryDeletionService};
