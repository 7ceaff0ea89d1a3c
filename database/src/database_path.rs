use std::env;

use crate::database_error::DatabaseError;

/// Returns the database URL in the format sqlite:///absolute/path/to/db.sqlite
pub fn get_database_url() -> Result<String, DatabaseError> {
    dotenvy::dotenv().ok();
    if let Ok(env_url) = env::var("DATABASE_URL") {
        return Ok(env_url);
    }

    let db_path = file_system::get_database_path().map_err(|e| {
        DatabaseError::Unavailable(format!("Failed to resolve database path: {}", e))
    })?;

    Ok(format!("sqlite://{}", db_path.display()))
}
