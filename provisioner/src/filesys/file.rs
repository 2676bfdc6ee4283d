//! File operations

use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Serialize};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::errors::ProvisionError;

/// Owner read/write only
pub const MODE_PRIVATE: u32 = 0o600;

/// Owner read/write, group read
pub const MODE_GROUP_READ: u32 = 0o640;

/// Owner read/write, group and others read
pub const MODE_WORLD_READ: u32 = 0o644;

/// A file wrapper with path
#[derive(Debug, Clone)]
pub struct File {
    path: PathBuf,
}

impl File {
    /// Create a new file reference
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Get the file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check if the path exists (file or otherwise)
    pub async fn exists(&self) -> bool {
        fs::metadata(&self.path).await.is_ok()
    }

    /// Check if the path exists and is a regular file
    pub async fn is_file(&self) -> bool {
        fs::metadata(&self.path)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false)
    }

    /// Read file contents as string
    pub async fn read_string(&self) -> Result<String, ProvisionError> {
        let mut file = fs::File::open(&self.path).await?;
        let mut contents = String::new();
        file.read_to_string(&mut contents).await?;
        Ok(contents)
    }

    /// Read file as JSON
    pub async fn read_json<T: DeserializeOwned>(&self) -> Result<T, ProvisionError> {
        let contents = self.read_string().await?;
        let value = serde_json::from_str(&contents)?;
        Ok(value)
    }

    /// Write string to file, truncating any previous content
    pub async fn write_string(&self, contents: &str) -> Result<(), ProvisionError> {
        self.ensure_parent().await?;

        let mut file = fs::File::create(&self.path).await?;
        file.write_all(contents.as_bytes()).await?;
        file.sync_all().await?;
        Ok(())
    }

    /// Atomically replace the file with `contents` carrying `mode`. The
    /// temporary file gets its final bits before the rename, so the content
    /// never appears under the target path with other permissions.
    pub async fn write_with_mode(&self, contents: &str, mode: u32) -> Result<(), ProvisionError> {
        self.replace(contents.as_bytes(), Some(mode)).await
    }

    /// Atomic write using a sibling temporary file and a rename.
    ///
    /// Readers of the target never observe a partially written file. The
    /// temporary name is unique per call so that independent writers do not
    /// interleave inside the same temporary file.
    pub async fn write_atomic(&self, contents: &[u8]) -> Result<(), ProvisionError> {
        self.replace(contents, None).await
    }

    /// Atomically write JSON to file with the given permission bits
    pub async fn write_json_with_mode<T: Serialize>(
        &self,
        value: &T,
        mode: u32,
    ) -> Result<(), ProvisionError> {
        let mut contents = serde_json::to_string_pretty(value)?;
        contents.push('\n');
        self.replace(contents.as_bytes(), Some(mode)).await
    }

    async fn replace(&self, contents: &[u8], mode: Option<u32>) -> Result<(), ProvisionError> {
        self.ensure_parent().await?;

        let temp = File::new(self.temp_sibling());
        let result = async {
            let mut options = fs::OpenOptions::new();
            options.write(true).create_new(true);
            #[cfg(unix)]
            if let Some(mode) = mode {
                options.mode(mode);
            }

            let mut file = options.open(temp.path()).await?;
            file.write_all(contents).await?;
            file.sync_all().await?;
            drop(file);

            // creation bits are filtered by the umask
            if let Some(mode) = mode {
                temp.set_mode(mode).await?;
            }
            fs::rename(temp.path(), &self.path).await?;
            Ok::<(), ProvisionError>(())
        }
        .await;

        if result.is_err() {
            let _ = fs::remove_file(temp.path()).await;
        }
        result
    }

    /// Replace the permission bits of the file. A no-op on non-Unix platforms.
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

    async fn ensure_parent(&self) -> Result<(), ProvisionError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }
        Ok(())
    }

    fn temp_sibling(&self) -> PathBuf {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "file".to_string());
        self.path
            .with_file_name(format!(".{}.{}.tmp", name, uuid::Uuid::new_v4().simple()))
    }
}
