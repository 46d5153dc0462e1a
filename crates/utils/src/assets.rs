use std::path::PathBuf;

use directories::ProjectDirs;

/// Directory holding the default SQLite database and local cart storage.
///
/// Falls back to `./.seedwave` when the platform has no home directory.
pub fn data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("SEEDWAVE_DATA_DIR") {
        return PathBuf::from(dir);
    }
    ProjectDirs::from("za", "fruitful", "seedwave")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".seedwave"))
}

pub fn default_database_path() -> PathBuf {
    data_dir().join("seedwave.db")
}
