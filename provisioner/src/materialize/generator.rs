//! Runtime configuration and credential materialization
//!
//! Turns a [`DeviceRecord`] into the on-disk tree the runtime expects:
//!
//! ```text
//! <root>/
//!   config/config.yaml
//!   certs/<identity>.cert.pem
//!   certs/<identity>.private.key
//!   certs/root.ca.pem
//!   logs/ work/ packages/ deployments/ ggc-root/
//! ```
//!
//! Every run regenerates the whole tree. A failed step stops the run and the
//! files already written must not be trusted.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::errors::{MaterializeError, MaterializeStep};
use crate::filesys::dir::Dir;
use crate::filesys::file::{File, MODE_GROUP_READ, MODE_PRIVATE};
use crate::records::record::DeviceRecord;
use crate::storage::layout::StorageLayout;
use crate::utils::sha256_hash;

/// Owner full access, group read and traverse
pub const MODE_GROUP_DIR: u32 = 0o750;

const LOG_LEVEL: &str = "INFO";
const LOG_FILE_SIZE_KB: u32 = 1024;
const LOG_TOTAL_SIZE_KB: u32 = 25600;
const LOG_FORMAT: &str = "JSON";

const DEPLOYMENT_POLLING_FREQUENCY_SECS: u32 = 15;
const COMPONENT_STORE_MAX_SIZE_BYTES: u64 = 10_737_418_240;
const DEPLOYMENT_STATUS_KEEP_ALIVE_SECS: u32 = 60;

/// Files produced by a successful materialization
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GeneratedArtifacts {
    pub config_file: PathBuf,
    pub certificate: PathBuf,
    pub private_key: PathBuf,
    pub root_ca: PathBuf,
}

/// Writes credentials and runtime configuration under a root directory
#[derive(Debug, Clone)]
pub struct ConfigMaterializer {
    layout: StorageLayout,
}

impl ConfigMaterializer {
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            layout: StorageLayout::new(root_dir),
        }
    }

    pub fn layout(&self) -> &StorageLayout {
        &self.layout
    }

    /// Run all steps in order, stopping at the first failure
    pub async fn materialize(
        &self,
        record: &DeviceRecord,
    ) -> Result<GeneratedArtifacts, MaterializeError> {
        info!(
            "Generating Greengrass configuration for device: {}",
            record.device_id
        );

        self.create_directories().await?;
        self.write_credentials(record).await?;
        self.write_runtime_config(record).await?;
        self.validate().await?;

        let artifacts = GeneratedArtifacts {
            config_file: self.layout.generated_config_file().path().to_path_buf(),
            certificate: self
                .layout
                .certificate_file(&record.identity_name)
                .path()
                .to_path_buf(),
            private_key: self
                .layout
                .private_key_file(&record.identity_name)
                .path()
                .to_path_buf(),
            root_ca: self.layout.root_ca_file().path().to_path_buf(),
        };
        info!("Successfully generated Greengrass configuration");
        Ok(artifacts)
    }

    async fn create_directories(&self) -> Result<(), MaterializeError> {
        let step = MaterializeStep::Directories;
        self.layout.setup().await.map_err(|e| {
            MaterializeError::new(step, format!("failed to create directory structure: {}", e))
        })?;

        for dir in [self.layout.root_dir(), self.layout.certs_dir()] {
            dir.set_mode(MODE_GROUP_DIR).await.map_err(|e| {
                MaterializeError::new(
                    step,
                    format!("failed to set permissions on {}: {}", dir.path().display(), e),
                )
            })?;
        }

        debug!("Created Greengrass directory structure");
        Ok(())
    }

    async fn write_credentials(&self, record: &DeviceRecord) -> Result<(), MaterializeError> {
        let step = MaterializeStep::Credentials;
        let root_ca = self.resolve_root_ca(&record.root_ca).await?;

        for (label, content) in [
            ("certificate", record.certificate_pem.as_str()),
            ("private key", record.private_key_pem.as_str()),
            ("root CA", root_ca.as_str()),
        ] {
            if content.trim().is_empty() {
                return Err(MaterializeError::new(step, format!("{} content is empty", label)));
            }
        }

        check_certificate_pem("certificate", &record.certificate_pem);
        check_certificate_pem("root CA", &root_ca);
        check_private_key_pem(&record.private_key_pem);

        let identity = &record.identity_name;
        write_credential(
            &self.layout.certificate_file(identity),
            &record.certificate_pem,
            MODE_GROUP_READ,
        )
        .await?;
        write_credential(
            &self.layout.private_key_file(identity),
            &record.private_key_pem,
            MODE_PRIVATE,
        )
        .await?;
        write_credential(&self.layout.root_ca_file(), &root_ca, MODE_GROUP_READ).await?;

        info!(
            "Wrote credentials for {} (certificate sha256 {}, root CA sha256 {})",
            identity,
            sha256_hash(record.certificate_pem.as_bytes()),
            sha256_hash(root_ca.as_bytes())
        );
        Ok(())
    }

    /// A value naming a readable file is replaced by the file's content; any
    /// other value is the certificate itself
    async fn resolve_root_ca(&self, value: &str) -> Result<String, MaterializeError> {
        let file = File::new(value.trim());
        if value.contains('\n') || !file.is_file().await {
            return Ok(value.to_string());
        }
        debug!("Reading root CA from {}", file.path().display());
        file.read_string().await.map_err(|e| {
            MaterializeError::new(
                MaterializeStep::Credentials,
                format!("failed to read root CA file {}: {}", file.path().display(), e),
            )
        })
    }

    async fn write_runtime_config(&self, record: &DeviceRecord) -> Result<(), MaterializeError> {
        let step = MaterializeStep::RuntimeConfig;
        let file = self.layout.generated_config_file();
        let content = self.render_runtime_config(record).map_err(|e| {
            MaterializeError::new(step, format!("failed to render configuration: {}", e))
        })?;

        file.write_with_mode(&content, MODE_GROUP_READ)
            .await
            .map_err(|e| {
                MaterializeError::new(
                    step,
                    format!("failed to write {}: {}", file.path().display(), e),
                )
            })?;

        if record.custom_domain.is_some() {
            debug!("Custom domain is not used by the generated configuration");
        }
        debug!("Generated runtime configuration file");
        Ok(())
    }

    async fn validate(&self) -> Result<(), MaterializeError> {
        let step = MaterializeStep::Validation;
        let file = self.layout.generated_config_file();
        let content = file.read_string().await.map_err(|e| {
            MaterializeError::new(
                step,
                format!("{} cannot be read back: {}", file.path().display(), e),
            )
        })?;
        if content.trim().is_empty() {
            return Err(MaterializeError::new(
                step,
                format!("{} is empty", file.path().display()),
            ));
        }

        let certs_dir = self.layout.certs_dir();
        if !has_credential_file(&certs_dir).await {
            return Err(MaterializeError::new(
                step,
                "no certificates found in certs directory",
            ));
        }

        debug!("Configuration validation passed");
        Ok(())
    }

    /// Render the runtime configuration document for a record
    pub fn render_runtime_config(&self, record: &DeviceRecord) -> Result<String, serde_yaml::Error> {
        let root = absolute_root(&self.layout.base_dir);
        let root_str = root.to_string_lossy().into_owned();
        let certs = root.join("certs");
        let identity = &record.identity_name;
        let grouped = record.group().is_some();

        let document = RuntimeConfig {
            system: SystemSection {
                certificate_file_path: certs
                    .join(format!("{}.cert.pem", identity))
                    .to_string_lossy()
                    .into_owned(),
                private_key_path: certs
                    .join(format!("{}.private.key", identity))
                    .to_string_lossy()
                    .into_owned(),
                root_ca_path: certs.join("root.ca.pem").to_string_lossy().into_owned(),
                rootpath: root_str,
                thing_name: identity.clone(),
            },
            services: Services {
                nucleus: NucleusService {
                    version: record.runtime_version().to_string(),
                    configuration: NucleusConfiguration {
                        aws_region: record.region.clone(),
                        iot_role_alias: record.credential_role.clone(),
                        iot_data_endpoint: record.endpoint.clone(),
                        iot_cred_endpoint: record.credential_role_endpoint.clone(),
                        mqtt: record.mqtt_port.map(|port| MqttSection { port }),
                        network_proxy: record.proxy_url().map(|url| NetworkProxySection {
                            proxy: ProxySection {
                                url: url.to_string(),
                            },
                        }),
                        logging: LoggingSection {
                            level: LOG_LEVEL,
                            file_size_kb: LOG_FILE_SIZE_KB,
                            total_logs_size_kb: LOG_TOTAL_SIZE_KB,
                            format: LOG_FORMAT,
                        },
                        deployment_polling_frequency: grouped
                            .then_some(DEPLOYMENT_POLLING_FREQUENCY_SECS),
                        component_store_max_size_bytes: grouped
                            .then_some(COMPONENT_STORE_MAX_SIZE_BYTES),
                        deployment_status_keep_alive_frequency: grouped
                            .then_some(DEPLOYMENT_STATUS_KEEP_ALIVE_SECS),
                    },
                },
            },
        };

        serde_yaml::to_string(&document)
    }
}

#[derive(Debug, Serialize)]
struct RuntimeConfig {
    system: SystemSection,
    services: Services,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SystemSection {
    certificate_file_path: String,
    private_key_path: String,
    root_ca_path: String,
    rootpath: String,
    thing_name: String,
}

#[derive(Debug, Serialize)]
struct Services {
    #[serde(rename = "aws.greengrass.Nucleus")]
    nucleus: NucleusService,
}

#[derive(Debug, Serialize)]
struct NucleusService {
    version: String,
    configuration: NucleusConfiguration,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct NucleusConfiguration {
    aws_region: String,
    iot_role_alias: String,
    iot_data_endpoint: String,
    iot_cred_endpoint: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    mqtt: Option<MqttSection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    network_proxy: Option<NetworkProxySection>,
    logging: LoggingSection,
    #[serde(skip_serializing_if = "Option::is_none")]
    deployment_polling_frequency: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    component_store_max_size_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    deployment_status_keep_alive_frequency: Option<u32>,
}

#[derive(Debug, Serialize)]
struct MqttSection {
    port: u16,
}

#[derive(Debug, Serialize)]
struct NetworkProxySection {
    proxy: ProxySection,
}

#[derive(Debug, Serialize)]
struct ProxySection {
    url: String,
}

#[derive(Debug, Serialize)]
struct LoggingSection {
    level: &'static str,
    #[serde(rename = "fileSizeKB")]
    file_size_kb: u32,
    #[serde(rename = "totalLogsSizeKB")]
    total_logs_size_kb: u32,
    format: &'static str,
}

async fn write_credential(file: &File, content: &str, mode: u32) -> Result<(), MaterializeError> {
    file.write_with_mode(content, mode).await.map_err(|e| {
        MaterializeError::new(
            MaterializeStep::Credentials,
            format!("failed to write {}: {}", file.path().display(), e),
        )
    })?;
    debug!("Wrote {} with mode {:o}", file.path().display(), mode);
    Ok(())
}

async fn has_credential_file(dir: &Dir) -> bool {
    let Ok(files) = dir.list_files().await else {
        return false;
    };
    files.iter().any(|path| {
        matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("pem") | Some("key")
        )
    })
}

fn check_certificate_pem(label: &str, content: &str) {
    let count = rustls_pemfile::certs(&mut content.as_bytes())
        .filter(|item| item.is_ok())
        .count();
    if count == 0 {
        warn!("{} does not contain a PEM certificate", label);
    }
}

fn check_private_key_pem(content: &str) {
    match rustls_pemfile::private_key(&mut content.as_bytes()) {
        Ok(Some(_)) => {}
        _ => warn!("private key does not contain a PEM key"),
    }
}

fn absolute_root(root: &Path) -> PathBuf {
    std::path::absolute(root).unwrap_or_else(|_| root.to_path_buf())
}
