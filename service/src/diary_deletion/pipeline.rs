use crate::{
    diary_deletion::{
        context::DeletionContext,
        steps::{DeleteDiaryDocumentStep, DeleteStorageStep, DeleteVideosStep, SoftDeleteDiaryStep},
    },
    pipeline::Pipeline,
};

impl Pipeline<DeletionContext> {
    pub fn new() -> Self {
        Self::with_steps(vec![
            Box::new(SoftDeleteDiaryStep),
            Box::new(DeleteVideosStep),
            Box::new(DeleteStorageStep),
            Box::new(DeleteDiaryDocumentStep),
        ])
    }
}
