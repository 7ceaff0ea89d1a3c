use crate::database_error::DatabaseError;

/// Upper bound of operations the store accepts in one atomic batch.
pub const MAX_BATCH_OPERATIONS: usize = 500;

#[derive(Debug, Clone, PartialEq)]
pub enum BatchOp {
    /// Deleting a missing video is not an error.
    DeleteVideo(String),
    /// Deleting a missing diary is not an error.
    DeleteDiary(String),
    /// Fails the whole batch when the diary does not exist.
    SetDiaryDeleted { diary_id: String, is_deleted: bool },
}

/// A set of writes committed atomically.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    ops: Vec<BatchOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delete_video(&mut self, video_id: impl Into<String>) -> &mut Self {
        self.ops.push(BatchOp::DeleteVideo(video_id.into()));
        self
    }

    pub fn delete_diary(&mut self, diary_id: impl Into<String>) -> &mut Self {
        self.ops.push(BatchOp::DeleteDiary(diary_id.into()));
        self
    }

    pub fn set_diary_deleted(&mut self, diary_id: impl Into<String>, is_deleted: bool) -> &mut Self {
        self.ops.push(BatchOp::SetDiaryDeleted {
            diary_id: diary_id.into(),
            is_deleted,
        });
        self
    }

    pub fn ops(&self) -> &[BatchOp] {
        &self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn validate(&self) -> Result<(), DatabaseError> {
        if self.ops.len() > MAX_BATCH_OPERATIONS {
            return Err(DatabaseError::BatchTooLarge(self.ops.len()));
        }
        Ok(())
    }
}

impl FromIterator<BatchOp> for WriteBatch {
    fn from_iter<I: IntoIterator<Item = BatchOp>>(iter: I) -> Self {
        Self {
            ops: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rejects_oversized_batch() {
        let batch: WriteBatch = (0..=MAX_BATCH_OPERATIONS)
            .map(|i| BatchOp::DeleteVideo(format!("v{}", i)))
            .collect();
        assert_eq!(
            batch.validate(),
            Err(DatabaseError::BatchTooLarge(MAX_BATCH_OPERATIONS + 1))
        );
    }

    #[test]
    fn test_builder_keeps_order() {
        let mut batch = WriteBatch::new();
        batch.delete_video("v1").delete_diary("d1");
        assert_eq!(
            batch.ops(),
            &[
                BatchOp::DeleteVideo("v1".to_string()),
                BatchOp::DeleteDiary("d1".to_string())
            ]
        );
        assert!(batch.validate().is_ok());
    }
}
