// File system helpers for ledger and artifacts
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to get data directory")]
    NoDataDir,
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Ledger file name inside the data directory
pub const LEDGER_FILE: &str = "experiments.db";

/// Per-user data directory for the ledger
pub fn default_data_dir() -> StorageResult<PathBuf> {
    let data_dir = dirs::data_dir().ok_or(StorageError::NoDataDir)?;
    let app_dir = data_dir.join("mocap-actions");
    fs::create_dir_all(&app_dir)?;
    Ok(app_dir)
}

pub fn default_ledger_path() -> StorageResult<PathBuf> {
    Ok(default_data_dir()?.join(LEDGER_FILE))
}

/// Write `data` to `dir/filename`; returns the path and its SHA256 hash
pub fn store_file(dir: &Path, filename: &str, data: &[u8]) -> StorageResult<(PathBuf, String)> {
    fs::create_dir_all(dir)?;
    let path = dir.join(filename);
    fs::write(&path, data)?;
    Ok((path, calculate_sha256(data)))
}

/// SHA256 hash and size of an existing file
pub fn file_digest(path: &Path) -> StorageResult<(String, i64)> {
    let data = fs::read(path)?;
    Ok((calculate_sha256(&data), data.len() as i64))
}

pub fn calculate_sha256(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calculate_sha256() {
        let hash = calculate_sha256(b"hello world");
        assert_eq!(
            hash,
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn test_store_file_and_digest() {
        let dir = tempfile::TempDir::new().unwrap();
        let (path, sha) = store_file(&dir.path().join("exp"), "pred.csv", b"label\n1\n").unwrap();
        assert!(path.ends_with("exp/pred.csv"));

        let (digest, bytes) = file_digest(&path).unwrap();
        assert_eq!(digest, sha);
        assert_eq!(bytes, 8);
    }
}
