use directories::ProjectDirs;
use std::path::PathBuf;

pub fn data_root() -> PathBuf {
    if let Some(pd) = ProjectDirs::from("com", "risevocab", "RiseVocab") {
        pd.data_dir().to_path_buf()
    } else {
        // Fallback: current dir
        std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
    }
}

pub fn default_store_file() -> (PathBuf, PathBuf) {
    store_files_at(data_root().join("progress.json"))
}

/// Backups live next to the store file in `backups/`.
pub fn store_files_at(file: PathBuf) -> (PathBuf, PathBuf) {
    let backups = file
        .parent()
        .map(|p| p.join("backups"))
        .unwrap_or_else(|| PathBuf::from("backups"));
    (file, backups)
}
