use std::sync::Arc;

use sqlx::{Pool, Sqlite};

use crate::repository::{
    diary_repository::DiaryRepository, diary_video_repository::DiaryVideoRepository,
};

#[derive(Debug)]
pub struct RepositoryManager {
    diary_repository: DiaryRepository,
    diary_video_repository: DiaryVideoRepository,
    pool: Arc<Pool<Sqlite>>,
}

impl RepositoryManager {
    pub fn new(pool: Arc<Pool<Sqlite>>) -> Self {
        let diary_repository = DiaryRepository::new(pool.clone());
        let diary_video_repository = DiaryVideoRepository::new(pool.clone());

        Self {
            diary_repository,
            diary_video_repository,
            pool,
        }
    }

    pub fn get_diary_repository(&self) -> &DiaryRepository {
        &self.diary_repository
    }

    pub fn get_diary_video_repository(&self) -> &DiaryVideoRepository {
        &self.diary_video_repository
    }

    pub fn get_pool(&self) -> Arc<Pool<Sqlite>> {
        self.pool.clone()
    }
}
