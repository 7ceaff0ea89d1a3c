use std::{fs, io, path::PathBuf};

use directories_next::ProjectDirs;

/// Returns path to database file located in default data dir for application.
pub fn get_database_path() -> io::Result<PathBuf> {
    Ok(get_default_data_dir()?.join("db.sqlite"))
}

/// Returns the directory backing the local snapshot cache.
pub fn get_local_cache_dir() -> io::Result<PathBuf> {
    ensure_dir(get_default_data_dir()?.join("cache"))
}

/// Returns the root directory used by the directory-backed blob store.
pub fn get_blob_root_dir() -> io::Result<PathBuf> {
    ensure_dir(get_default_data_dir()?.join("blobs"))
}

/// Returns the directory for rotated application logs.
pub fn get_log_dir() -> io::Result<PathBuf> {
    ensure_dir(get_default_data_dir()?.join("logs"))
}

fn get_default_data_dir() -> io::Result<PathBuf> {
    let project_dirs = get_project_dirs()?;
    ensure_dir(project_dirs.data_local_dir().to_path_buf())
}

fn ensure_dir(dir: PathBuf) -> io::Result<PathBuf> {
    fs::create_dir_all(&dir)?;
    Ok(dir)
}

fn get_project_dirs() -> io::Result<ProjectDirs> {
    ProjectDirs::from("org", "videodiary", "video-diary").ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::NotFound,
            "could not determine project directory",
        )
    })
}
