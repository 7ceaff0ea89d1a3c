use std::sync::{Arc, OnceLock};

use cloud_storage::CloudStorageOps;
use database::{DocumentStoreOps, SqliteDocumentStore, get_db_pool, repository_manager::RepositoryManager};
use local_cache::LocalCache;

use crate::{
    diary_cache::DiaryCache, diary_collection::DiaryCollectionController,
    diary_deletion::DiaryDeletionService, error::Error, scheduler::AsyncStdScheduler,
    settings::Settings,
};

/// Builds the services on top of the SQLite document store.
pub async fn create_app_services(
    principal: Option<String>,
    cloud_storage: Arc<dyn CloudStorageOps>,
    local_cache: Arc<dyn LocalCache>,
    settings: Settings,
) -> Result<Arc<AppServices>, Error> {
    let pool = get_db_pool().await?;
    let repository_manager = Arc::new(RepositoryManager::new(pool));
    let store = Arc::new(SqliteDocumentStore::new(repository_manager));

    Ok(Arc::new(AppServices::new(
        principal,
        store,
        cloud_storage,
        local_cache,
        Arc::new(settings),
    )))
}

pub struct AppServices {
    principal: Option<String>,
    store: Arc<dyn DocumentStoreOps>,
    cloud_storage: Arc<dyn CloudStorageOps>,
    cache: DiaryCache,
    settings: Arc<Settings>,
    diary_deletion: OnceLock<DiaryDeletionService>,
    diary_collection: OnceLock<DiaryCollectionController>,
}

impl AppServices {
    pub fn new(
        principal: Option<String>,
        store: Arc<dyn DocumentStoreOps>,
        cloud_storage: Arc<dyn CloudStorageOps>,
        local_cache: Arc<dyn LocalCache>,
        settings: Arc<Settings>,
    ) -> Self {
        Self {
            principal,
            store,
            cloud_storage,
            cache: DiaryCache::new(local_cache),
            settings,
            diary_deletion: OnceLock::new(),
            diary_collection: OnceLock::new(),
        }
    }

    pub fn diary_deletion(&self) -> DiaryDeletionService {
        self.diary_deletion
            .get_or_init(|| {
                DiaryDeletionService::new(
                    Arc::clone(&self.store),
                    Arc::clone(&self.cloud_storage),
                    Arc::clone(&self.settings),
                )
            })
            .clone()
    }

    pub fn diary_collection(&self) -> DiaryCollectionController {
        self.diary_collection
            .get_or_init(|| {
                DiaryCollectionController::new(
                    self.principal.clone(),
                    Arc::clone(&self.store),
                    Arc::clone(&self.cloud_storage),
                    self.cache.clone(),
                    self.diary_deletion(),
                    Arc::new(AsyncStdScheduler),
                )
            })
            .clone()
    }

    pub fn diary_cache(&self) -> DiaryCache {
        self.cache.clone()
    }

    pub fn principal(&self) -> Option<&str> {
        self.principal.as_deref()
    }

    pub fn settings(&self) -> Arc<Settings> {
        Arc::clone(&self.settings)
    }
}

#[cfg(test)]
mod tests {
    use cloud_storage::mock::MockCloudStorage;
    use database::mock::MockDocumentStore;
    use local_cache::MemoryLocalCache;

    use super::*;
    use crate::test_utils::diary;

    #[async_std::test]
    async fn test_controller_and_deletion_share_one_registry() {
        let store = MockDocumentStore::new();
        store.add_diary(diary("d1", "u1"));
        let services = AppServices::new(
            Some("u1".to_string()),
            Arc::new(store.clone()),
            Arc::new(MockCloudStorage::new()),
            Arc::new(MemoryLocalCache::new()),
            Arc::new(Settings::default()),
        );

        services.diary_collection().load("u1").await.unwrap();
        let job_id = services
            .diary_collection()
            .delete("d1")
            .await
            .unwrap()
            .unwrap();

        let job = services.diary_deletion().wait_for_settled(&job_id).await.unwrap();
        assert!(job.is_terminal());
        assert!(store.diary("d1").is_none());
        assert_eq!(services.principal(), Some("u1"));
    }
}
