mod batch;
pub mod database_error;
mod database_path;
pub mod document_store;
pub mod mock;
mod models;
pub mod ops;
pub mod repository;
pub mod repository_manager;

use std::{str::FromStr, sync::Arc};

use sqlx::{
    Pool, Sqlite, SqlitePool,
    migrate,
    sqlite::SqliteConnectOptions,
};

pub use batch::{BatchOp, MAX_BATCH_OPERATIONS, WriteBatch};
pub use database_error::DatabaseError;
pub use document_store::SqliteDocumentStore;
pub use ops::DocumentStoreOps;

/// Connects to the database at `DATABASE_URL` (or the default data dir),
/// creating the file if needed and applying pending migrations.
pub async fn get_db_pool() -> Result<Arc<Pool<Sqlite>>, DatabaseError> {
    let db_url = database_path::get_database_url()?;
    tracing::info!(db_url = %db_url, "Connecting to database");
    let options = SqliteConnectOptions::from_str(&db_url)?.create_if_missing(true);
    let pool = SqlitePool::connect_with(options).await?;
    migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(|e| DatabaseError::Unavailable(format!("Migration failed: {}", e)))?;
    Ok(Arc::new(pool))
}

pub async fn setup_test_db() -> SqlitePool {
    // Create an in-memory database connection
    let pool = SqlitePool::connect("sqlite::memory:")
        .await
        .expect("Failed to connect to the in-memory SQLite database");

    // Run migrations
    migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    pool
}
