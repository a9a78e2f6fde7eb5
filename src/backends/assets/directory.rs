// SPDX-License-Identifier: MPL-2.0

//! Filters unpacked in a directory on disk

use super::{AssetStore, validate_component};
use crate::errors::StorageError;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Asset store backed by `<root>/<filter_id>/<name>` files
#[derive(Debug, Clone)]
pub struct DirectoryAssetStore {
    root: PathBuf,
}

impl DirectoryAssetStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn asset_path(&self, filter_id: &str, name: &str) -> Result<PathBuf, StorageError> {
        validate_component(filter_id)?;
        validate_component(name)?;
        Ok(self.root.join(filter_id).join(name))
    }
}

fn map_io(err: std::io::Error, path: &Path) -> StorageError {
    match err.kind() {
        ErrorKind::NotFound => StorageError::NotFound(path.display().to_string()),
        _ => StorageError::Io(format!("{}: {}", path.display(), err)),
    }
}

fn sorted_entries(dir: &Path, want_dirs: bool) -> Result<Vec<String>, StorageError> {
    let entries = std::fs::read_dir(dir).map_err(|e| map_io(e, dir))?;

    let mut names: Vec<String> = entries
        .flatten()
        .filter(|entry| {
            entry
                .file_type()
                .map(|t| if want_dirs { t.is_dir() } else { t.is_file() })
                .unwrap_or(false)
        })
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| !name.starts_with('.'))
        .collect();
    names.sort();
    Ok(names)
}

impl AssetStore for DirectoryAssetStore {
    fn exists(&self, filter_id: &str, name: &str) -> bool {
        self.asset_path(filter_id, name)
            .map(|path| path.is_file())
            .unwrap_or(false)
    }

    fn read(&self, filter_id: &str, name: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.asset_path(filter_id, name)?;
        debug!(path = %path.display(), "Reading filter asset");
        std::fs::read(&path).map_err(|e| map_io(e, &path))
    }

    fn list(&self, filter_id: &str) -> Result<Vec<String>, StorageError> {
        validate_component(filter_id)?;
        sorted_entries(&self.root.join(filter_id), false)
    }

    fn list_filters(&self) -> Result<Vec<String>, StorageError> {
        sorted_entries(&self.root, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_root(tag: &str) -> PathBuf {
        let root = std::env::temp_dir().join(format!(
            "stylecam-assets-{}-{}",
            tag,
            uuid::Uuid::new_v4()
        ));
        std::fs::create_dir_all(root.join("sparkle")).unwrap();
        std::fs::write(root.join("sparkle/filter.json"), b"{}").unwrap();
        std::fs::write(root.join("sparkle/star.png"), b"png").unwrap();
        std::fs::create_dir_all(root.join("aurora")).unwrap();
        root
    }

    #[test]
    fn test_reads_and_lists() {
        let root = temp_root("list");
        let store = DirectoryAssetStore::new(&root);

        assert_eq!(store.list_filters().unwrap(), vec!["aurora", "sparkle"]);
        assert_eq!(store.list("sparkle").unwrap(), vec!["filter.json", "star.png"]);
        assert!(store.exists("sparkle", "star.png"));
        assert_eq!(store.read("sparkle", "star.png").unwrap(), b"png");

        std::fs::remove_dir_all(root).ok();
    }

    #[test]
    fn test_missing_entries_are_not_found() {
        let root = temp_root("missing");
        let store = DirectoryAssetStore::new(&root);

        assert!(!store.exists("sparkle", "moon.png"));
        assert!(matches!(
            store.read("sparkle", "moon.png"),
            Err(StorageError::NotFound(_))
        ));
        assert!(matches!(store.list("nope"), Err(StorageError::NotFound(_))));

        std::fs::remove_dir_all(root).ok();
    }

    #[test]
    fn test_rejects_escaping_paths() {
        let store = DirectoryAssetStore::new("/tmp");
        assert!(matches!(
            store.read("..", "passwd"),
            Err(StorageError::InvalidPath(_))
        ));
        assert!(!store.exists("sparkle", "../filter.json"));
    }
}
