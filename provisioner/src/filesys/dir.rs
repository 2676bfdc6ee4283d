//! Directory operations

use std::path::{Path, PathBuf};

use tokio::fs;

use crate::errors::ProvisionError;
use crate::filesys::file::File;

/// A directory wrapper with path
#[derive(Debug, Clone)]
pub struct Dir {
    path: PathBuf,
}

impl Dir {
    /// Create a new directory reference
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Get the directory path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check if the path exists (directory or otherwise)
    pub async fn exists(&self) -> bool {
        fs::metadata(&self.path).await.is_ok()
    }

    /// Check if the path exists and is a directory
    pub async fn is_dir(&self) -> bool {
        fs::metadata(&self.path)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
    }

    /// Create the directory (and parents). Pre-existing directories are fine.
    pub async fn create(&self) -> Result<(), ProvisionError> {
        fs::create_dir_all(&self.path).await?;
        Ok(())
    }

    /// Replace the permission bits of the directory. A no-op on non-Unix platforms.
    pub async fn set_mode(&self, mode: u32) -> Result<(), ProvisionError> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.path, std::fs::Permissions::from_mode(mode)).await?;
        }
        #[cfg(not(unix))]
        let _ = mode;
        Ok(())
    }

    /// Check whether the directory has any entry at all
    pub async fn is_empty(&self) -> Result<bool, ProvisionError> {
        let mut entries = fs::read_dir(&self.path).await?;
        Ok(entries.next_entry().await?.is_none())
    }

    /// List regular files in the directory
    pub async fn list_files(&self) -> Result<Vec<PathBuf>, ProvisionError> {
        let mut files = Vec::new();
        let mut entries = fs::read_dir(&self.path).await?;

        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                files.push(entry.path());
            }
        }

        files.sort();
        Ok(files)
    }

    /// Get a file within this directory
    pub fn file(&self, name: &str) -> File {
        File::new(self.path.join(name))
    }

    /// Get a subdirectory
    pub fn subdir(&self, name: &str) -> Dir {
        Dir::new(self.path.join(name))
    }
}
