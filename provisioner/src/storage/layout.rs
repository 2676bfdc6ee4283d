//! Layout of the Greengrass root directory

use std::path::PathBuf;

use crate::errors::ProvisionError;
use crate::filesys::dir::Dir;
use crate::filesys::file::File;

/// Recognized runtime configuration file names, in lookup order
pub const CONFIG_FILE_NAMES: [&str; 3] = ["config.yaml", "config.yml", "config.json"];

/// Name of the generated runtime configuration file
pub const GENERATED_CONFIG_FILE: &str = "config.yaml";

/// Name of the root CA file written under `certs/`
pub const ROOT_CA_FILE: &str = "root.ca.pem";

/// Name of the working root subdirectory
pub const WORKING_ROOT_DIR: &str = "ggc-root";

/// Storage layout for a Greengrass installation
#[derive(Debug, Clone)]
pub struct StorageLayout {
    /// Root directory of the installation
    pub base_dir: PathBuf,
}

impl StorageLayout {
    /// Create a new storage layout
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Get the root directory
    pub fn root_dir(&self) -> Dir {
        Dir::new(self.base_dir.clone())
    }

    /// Get the configuration directory
    pub fn config_dir(&self) -> Dir {
        Dir::new(self.base_dir.join("config"))
    }

    /// Get the certificates directory
    pub fn certs_dir(&self) -> Dir {
        Dir::new(self.base_dir.join("certs"))
    }

    /// Get the logs directory
    pub fn logs_dir(&self) -> Dir {
        Dir::new(self.base_dir.join("logs"))
    }

    /// Get the work directory
    pub fn work_dir(&self) -> Dir {
        Dir::new(self.base_dir.join("work"))
    }

    /// Get the packages directory
    pub fn packages_dir(&self) -> Dir {
        Dir::new(self.base_dir.join("packages"))
    }

    /// Get the deployments directory
    pub fn deployments_dir(&self) -> Dir {
        Dir::new(self.base_dir.join("deployments"))
    }

    /// Get the working root directory
    pub fn working_root_dir(&self) -> Dir {
        Dir::new(self.base_dir.join(WORKING_ROOT_DIR))
    }

    /// Get the recipes directory (only present on v2 installations)
    pub fn recipes_dir(&self) -> Dir {
        Dir::new(self.base_dir.join("recipes"))
    }

    /// Get the runtime library directory
    pub fn lib_dir(&self) -> Dir {
        Dir::new(self.base_dir.join("lib"))
    }

    /// Get the candidate configuration files, in lookup order
    pub fn config_files(&self) -> Vec<File> {
        let config_dir = self.config_dir();
        CONFIG_FILE_NAMES
            .iter()
            .map(|name| config_dir.file(name))
            .collect()
    }

    /// Get the generated runtime configuration file
    pub fn generated_config_file(&self) -> File {
        self.config_dir().file(GENERATED_CONFIG_FILE)
    }

    /// Get the device certificate file for an identity
    pub fn certificate_file(&self, identity_name: &str) -> File {
        self.certs_dir().file(&format!("{}.cert.pem", identity_name))
    }

    /// Get the private key file for an identity
    pub fn private_key_file(&self, identity_name: &str) -> File {
        self.certs_dir().file(&format!("{}.private.key", identity_name))
    }

    /// Get the root CA file
    pub fn root_ca_file(&self) -> File {
        self.certs_dir().file(ROOT_CA_FILE)
    }

    /// Get the runtime jar
    pub fn nucleus_jar(&self) -> File {
        self.lib_dir().file("Greengrass.jar")
    }

    /// Get the runtime log file
    pub fn runtime_log_file(&self) -> File {
        self.logs_dir().file("greengrass.log")
    }

    /// Setup the storage layout (create directories)
    pub async fn setup(&self) -> Result<(), ProvisionError> {
        self.root_dir().create().await?;
        self.config_dir().create().await?;
        self.certs_dir().create().await?;
        self.logs_dir().create().await?;
        self.work_dir().create().await?;
        self.packages_dir().create().await?;
        self.deployments_dir().create().await?;
        self.working_root_dir().create().await?;
        Ok(())
    }
}

impl Default for StorageLayout {
    fn default() -> Self {
        Self::new("/greengrass/v2")
    }
}
