//! Directory-backed asset storage
//!
//! Layout under the map root, with every directory configurable:
//! ```text
//! maps/
//! ├── overlays/            fresh uploads
//! ├── awaiting-approval/   markers referenced by a placement
//! ├── template/            base maps, {map}.png
//! └── current/             composites, {map}_v001.png ...
//! ```

use async_trait::async_trait;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use tokio::fs;

use super::asset_storage::{
    AssetStorage, StorageArea, StorageError, StoredEntry, StoredFile, validate_name,
};

/// Name prefix of files still being written
const STAGING_PREFIX: &str = ".staging-";

/// Directory for each storage area
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageLayout {
    pub root: PathBuf,
    pub overlays: PathBuf,
    pub awaiting: PathBuf,
    pub templates: PathBuf,
    pub current: PathBuf,
}

impl StorageLayout {
    /// Default directory names under `root`
    pub fn under(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref().to_path_buf();
        Self {
            overlays: root.join(StorageArea::Overlays.default_dir()),
            awaiting: root.join(StorageArea::Awaiting.default_dir()),
            templates: root.join(StorageArea::Templates.default_dir()),
            current: root.join(StorageArea::Current.default_dir()),
            root,
        }
    }

    pub fn dir(&self, area: StorageArea) -> &Path {
        match area {
            StorageArea::Overlays => &self.overlays,
            StorageArea::Awaiting => &self.awaiting,
            StorageArea::Templates => &self.templates,
            StorageArea::Current => &self.current,
        }
    }
}

/// File system implementation of [`AssetStorage`]
#[derive(Debug, Clone)]
pub struct FileSystemStorage {
    layout: StorageLayout,
    public_prefix: String,
}

impl FileSystemStorage {
    /// Create the storage, making sure every area directory exists
    pub async fn new(layout: StorageLayout) -> Result<Self, StorageError> {
        for area in StorageArea::ALL {
            let dir = layout.dir(area);
            fs::create_dir_all(dir).await.map_err(|e| {
                StorageError::Backend(format!("Failed to create {}: {}", dir.display(), e))
            })?;
        }

        Ok(Self {
            layout,
            public_prefix: "/maps".to_string(),
        })
    }

    /// Serve files under a different URL prefix
    pub fn with_public_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.public_prefix = prefix.into().trim_end_matches('/').to_string();
        self
    }

    pub fn layout(&self) -> &StorageLayout {
        &self.layout
    }

    fn path_for(&self, area: StorageArea, name: &str) -> Result<PathBuf, StorageError> {
        validate_name(name)?;
        Ok(self.layout.dir(area).join(name))
    }

    async fn ensure_dir(&self, area: StorageArea) -> Result<(), StorageError> {
        let dir = self.layout.dir(area);
        fs::create_dir_all(dir)
            .await
            .map_err(|e| StorageError::Backend(format!("Failed to create {}: {}", dir.display(), e)))
    }
}

fn io_error(file: &StoredFile, err: std::io::Error) -> StorageError {
    if err.kind() == ErrorKind::NotFound {
        StorageError::NotFound(file.to_string())
    } else {
        StorageError::Backend(format!("{}: {}", file, err))
    }
}

#[async_trait]
impl AssetStorage for FileSystemStorage {
    async fn put(&self, area: StorageArea, name: &str, data: Vec<u8>) -> Result<(), StorageError> {
        let path = self.path_for(area, name)?;
        self.ensure_dir(area).await?;
        let file = StoredFile::new(area, name);
        let dir = self.layout.dir(area).to_path_buf();

        // Readers only ever see the complete file under its final name
        tokio::task::spawn_blocking(move || -> std::io::Result<()> {
            let mut staged = tempfile::Builder::new()
                .prefix(STAGING_PREFIX)
                .suffix(".part")
                .tempfile_in(&dir)?;
            staged.write_all(&data)?;
            staged.as_file().sync_all()?;
            staged.persist(&path).map_err(|e| e.error)?;
            Ok(())
        })
        .await
        .map_err(|e| StorageError::Backend(format!("{}: write task failed: {}", file, e)))?
        .map_err(|e| io_error(&file, e))
    }

    async fn get(&self, area: StorageArea, name: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.path_for(area, name)?;
        fs::read(&path)
            .await
            .map_err(|e| io_error(&StoredFile::new(area, name), e))
    }

    async fn exists(&self, area: StorageArea, name: &str) -> Result<bool, StorageError> {
        let path = self.path_for(area, name)?;
        fs::try_exists(&path)
            .await
            .map_err(|e| io_error(&StoredFile::new(area, name), e))
    }

    async fn delete(&self, area: StorageArea, name: &str) -> Result<(), StorageError> {
        let path = self.path_for(area, name)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error(&StoredFile::new(area, name), e)),
        }
    }

    async fn relocate(
        &self,
        from: StorageArea,
        to: StorageArea,
        name: &str,
    ) -> Result<(), StorageError> {
        let source = self.path_for(from, name)?;
        let target = self.path_for(to, name)?;
        let file = StoredFile::new(from, name);
        self.ensure_dir(to).await?;

        if fs::rename(&source, &target).await.is_ok() {
            return Ok(());
        }

        // rename fails across devices; fall back to copy + remove
        fs::copy(&source, &target)
            .await
            .map_err(|e| io_error(&file, e))?;
        fs::remove_file(&source)
            .await
            .map_err(|e| io_error(&file, e))
    }

    async fn list(&self, area: StorageArea) -> Result<Vec<StoredEntry>, StorageError> {
        let dir = self.layout.dir(area);
        let mut entries = match fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(StorageError::Backend(format!(
                    "Failed to list {}: {}",
                    dir.display(),
                    e
                )));
            }
        };

        let mut listed = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StorageError::Backend(format!("Failed to list {}: {}", dir.display(), e)))?
        {
            let metadata = match entry.metadata().await {
                Ok(metadata) if metadata.is_file() => metadata,
                _ => continue,
            };
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if name.starts_with(STAGING_PREFIX) {
                continue;
            }
            let modified = metadata
                .modified()
                .map(OffsetDateTime::from)
                .unwrap_or(OffsetDateTime::UNIX_EPOCH);
            listed.push(StoredEntry { name, modified });
        }

        Ok(listed)
    }

    fn public_path(&self, file: &StoredFile) -> String {
        let dir = self.layout.dir(file.area);
        let relative = dir
            .strip_prefix(&self.layout.root)
            .map(|p| p.to_string_lossy().replace('\\', "/"))
            .unwrap_or_else(|_| file.area.default_dir().to_string());
        format!("{}/{}/{}", self.public_prefix, relative, file.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn storage() -> (TempDir, FileSystemStorage) {
        let dir = TempDir::new().unwrap();
        let storage = FileSystemStorage::new(StorageLayout::under(dir.path()))
            .await
            .unwrap();
        (dir, storage)
    }

    #[tokio::test]
    async fn test_new_creates_area_directories() {
        let (dir, _storage) = storage().await;
        for name in ["overlays", "awaiting-approval", "template", "current"] {
            assert!(dir.path().join(name).is_dir(), "{name} missing");
        }
    }

    #[tokio::test]
    async fn test_failed_put_leaves_nothing_behind() {
        let (dir, storage) = storage().await;
        // A directory squatting on the target name makes the final rename fail
        std::fs::create_dir(dir.path().join("current/Chernarus_v001.png")).unwrap();

        let result = storage
            .put(StorageArea::Current, "Chernarus_v001.png", vec![7; 4096])
            .await;
        assert!(matches!(result, Err(StorageError::Backend(_))));

        let leftovers: Vec<_> = std::fs::read_dir(dir.path().join("current"))
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(leftovers, vec![std::ffi::OsString::from("Chernarus_v001.png")]);
        assert!(storage.list(StorageArea::Current).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_put_replaces_existing_file() {
        let (_dir, storage) = storage().await;
        storage
            .put(StorageArea::Templates, "Chernarus.png", b"old".to_vec())
            .await
            .unwrap();
        storage
            .put(StorageArea::Templates, "Chernarus.png", b"new".to_vec())
            .await
            .unwrap();
        assert_eq!(
            storage.get(StorageArea::Templates, "Chernarus.png").await.unwrap(),
            b"new".to_vec()
        );
        assert_eq!(storage.list(StorageArea::Templates).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_put_get_and_relocate() {
        let (dir, storage) = storage().await;
        storage
            .put(StorageArea::Overlays, "m.png", b"data".to_vec())
            .await
            .unwrap();
        assert!(dir.path().join("overlays/m.png").is_file());

        storage
            .relocate(StorageArea::Overlays, StorageArea::Awaiting, "m.png")
            .await
            .unwrap();
        assert!(!storage.exists(StorageArea::Overlays, "m.png").await.unwrap());
        assert_eq!(
            storage.get(StorageArea::Awaiting, "m.png").await.unwrap(),
            b"data".to_vec()
        );
    }

    #[tokio::test]
    async fn test_relocate_missing_file_is_not_found() {
        let (_dir, storage) = storage().await;
        let result = storage
            .relocate(StorageArea::Overlays, StorageArea::Awaiting, "gone.png")
            .await;
        assert!(matches!(result, Err(StorageError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_list_skips_directories() {
        let (dir, storage) = storage().await;
        storage
            .put(StorageArea::Current, "a_v001.png", vec![1])
            .await
            .unwrap();
        std::fs::create_dir(dir.path().join("current/nested")).unwrap();

        let names: Vec<String> = storage
            .list(StorageArea::Current)
            .await
            .unwrap()
            .into_iter()
            .map(|entry| entry.name)
            .collect();
        assert_eq!(names, vec!["a_v001.png".to_string()]);
    }

    #[tokio::test]
    async fn test_public_path_follows_layout() {
        let dir = TempDir::new().unwrap();
        let mut layout = StorageLayout::under(dir.path());
        layout.current = dir.path().join("published");
        let storage = FileSystemStorage::new(layout).await.unwrap();

        let file = StoredFile::new(StorageArea::Current, "Chernarus_v002.png");
        assert_eq!(storage.public_path(&file), "/maps/published/Chernarus_v002.png");
    }

    #[tokio::test]
    async fn test_delete_missing_is_ok() {
        let (_dir, storage) = storage().await;
        storage.delete(StorageArea::Templates, "none.png").await.unwrap();
    }
}
