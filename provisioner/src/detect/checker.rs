//! Detection of an existing Greengrass installation
//!
//! Decides whether a root directory is not provisioned, provisioned, or holds
//! files whose content is unusable. The configuration check is a shallow
//! structural test on purpose: YAML files only need the `system:` and
//! `services:` markers somewhere in their text.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::filesys::file::File;
use crate::storage::layout::StorageLayout;

/// Key holding the identity name in the runtime configuration
pub const IDENTITY_KEY: &str = "thingName";

/// Section holding the identity in legacy JSON configurations
pub const LEGACY_IDENTITY_SECTION: &str = "coreThing";

static IDENTITY_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"{}:\s*(\S+)", IDENTITY_KEY)).expect("identity pattern is valid")
});

/// Runtime generation found on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeVersion {
    V1,
    V2,
    Unknown,
}

impl RuntimeVersion {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuntimeVersion::V1 => "v1",
            RuntimeVersion::V2 => "v2",
            RuntimeVersion::Unknown => "unknown",
        }
    }
}

impl fmt::Display for RuntimeVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Piece of an installation required for it to count as provisioned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequiredComponent {
    Config,
    Certificates,
    WorkingRoot,
}

impl RequiredComponent {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequiredComponent::Config => "config",
            RequiredComponent::Certificates => "certificates",
            RequiredComponent::WorkingRoot => "ggc-root",
        }
    }
}

impl fmt::Display for RequiredComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a detection run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisioningStatus {
    pub is_provisioned: bool,
    pub detected_version: RuntimeVersion,
    pub identity_name: String,
    pub missing_components: Vec<RequiredComponent>,
    /// Configuration file that passed validation
    pub config_file: Option<PathBuf>,
    pub details: String,
}

impl ProvisioningStatus {
    fn not_provisioned(details: impl Into<String>) -> Self {
        Self {
            is_provisioned: false,
            detected_version: RuntimeVersion::Unknown,
            identity_name: "unknown".to_string(),
            missing_components: Vec::new(),
            config_file: None,
            details: details.into(),
        }
    }

    /// Whether a component was reported missing
    pub fn is_missing(&self, component: RequiredComponent) -> bool {
        self.missing_components.contains(&component)
    }
}

/// Inspects a root directory for an existing installation
#[derive(Debug, Clone)]
pub struct ProvisioningDetector {
    layout: StorageLayout,
}

impl ProvisioningDetector {
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            layout: StorageLayout::new(root_dir),
        }
    }

    pub fn root_dir(&self) -> &Path {
        &self.layout.base_dir
    }

    /// Inspect the root directory
    pub async fn detect(&self) -> ProvisioningStatus {
        info!(
            "Checking Greengrass provisioning status at: {}",
            self.root_dir().display()
        );

        if !self.layout.root_dir().exists().await {
            info!("Greengrass root directory does not exist");
            return ProvisioningStatus::not_provisioned("root directory does not exist");
        }

        let has_config = self.check_config_exists().await;
        let has_certs = self.check_certificates_exist().await;
        let has_root = self.check_working_root_exists().await;

        let mut missing = Vec::new();
        if !has_config {
            missing.push(RequiredComponent::Config);
        }
        if !has_certs {
            missing.push(RequiredComponent::Certificates);
        }
        if !has_root {
            missing.push(RequiredComponent::WorkingRoot);
        }

        if !missing.is_empty() {
            let names: Vec<&str> = missing.iter().map(|c| c.as_str()).collect();
            let mut status =
                ProvisioningStatus::not_provisioned(format!("missing components: {}", names.join(", ")));
            status.missing_components = missing;
            info!("Greengrass is not provisioned, {}", status.details);
            return status;
        }

        match self.validate_config().await {
            Some(config_file) => {
                let identity_name = self.read_identity_name().await;
                let detected_version = self.detect_version().await;
                info!(
                    "Greengrass is already provisioned. Identity: {}, version: {}",
                    identity_name, detected_version
                );
                ProvisioningStatus {
                    is_provisioned: true,
                    detected_version,
                    identity_name,
                    missing_components: Vec::new(),
                    config_file: Some(config_file),
                    details: "fully provisioned".to_string(),
                }
            }
            None => {
                warn!("Greengrass configuration file is invalid");
                ProvisioningStatus::not_provisioned("configuration file is invalid or corrupted")
            }
        }
    }

    /// Any recognized configuration file exists
    pub async fn check_config_exists(&self) -> bool {
        for file in self.layout.config_files() {
            if file.exists().await {
                debug!("Configuration file found: {}", file.path().display());
                return true;
            }
        }
        debug!(
            "No configuration file found in {}",
            self.layout.config_dir().path().display()
        );
        false
    }

    /// The certs directory holds at least one certificate and one key
    pub async fn check_certificates_exist(&self) -> bool {
        let certs_dir = self.layout.certs_dir();
        if !certs_dir.is_dir().await {
            debug!("Certificates directory does not exist");
            return false;
        }
        match certs_dir.is_empty().await {
            Ok(false) => {}
            Ok(true) => return false,
            Err(e) => {
                warn!(
                    "Error checking directory {}: {}",
                    certs_dir.path().display(),
                    e
                );
                return false;
            }
        }

        let files = match certs_dir.list_files().await {
            Ok(files) => files,
            Err(e) => {
                warn!("Error listing {}: {}", certs_dir.path().display(), e);
                return false;
            }
        };

        let mut found_cert = false;
        let mut found_key = false;
        for path in &files {
            let Some(name) = path.file_name().map(|n| n.to_string_lossy()) else {
                continue;
            };
            found_cert |= is_certificate_name(&name);
            found_key |= is_key_name(&name);
        }

        debug!("Certificates check - cert: {}, key: {}", found_cert, found_key);
        found_cert && found_key
    }

    /// The working root subdirectory exists as a directory
    pub async fn check_working_root_exists(&self) -> bool {
        let exists = self.layout.working_root_dir().is_dir().await;
        debug!("Working root directory exists: {}", exists);
        exists
    }

    /// Return the first recognized configuration file whose content passes the
    /// structural check
    pub async fn validate_config(&self) -> Option<PathBuf> {
        for file in self.layout.config_files() {
            if !file.exists().await {
                continue;
            }
            let content = match file.read_string().await {
                Ok(content) => content,
                Err(e) => {
                    warn!(
                        "Error reading config file {}: {}",
                        file.path().display(),
                        e
                    );
                    continue;
                }
            };
            if content.is_empty() {
                warn!("Configuration file is empty: {}", file.path().display());
                continue;
            }
            if is_valid_config(&file, &content) {
                debug!("Valid configuration found: {}", file.path().display());
                return Some(file.path().to_path_buf());
            }
        }
        None
    }

    /// `v2` when a recipes directory or YAML configuration exists, `v1` for a
    /// JSON-only configuration, `unknown` otherwise
    pub async fn detect_version(&self) -> RuntimeVersion {
        if self.layout.recipes_dir().exists().await {
            return RuntimeVersion::V2;
        }
        for file in self.layout.config_files() {
            if file.exists().await {
                return match ConfigFormat::of(&file) {
                    ConfigFormat::Yaml => RuntimeVersion::V2,
                    ConfigFormat::Json => RuntimeVersion::V1,
                    ConfigFormat::Other => continue,
                };
            }
        }
        RuntimeVersion::Unknown
    }

    /// Best-effort identity name, `unknown` when none can be extracted
    pub async fn read_identity_name(&self) -> String {
        for file in self.layout.config_files() {
            if !file.exists().await {
                continue;
            }
            let Ok(content) = file.read_string().await else {
                continue;
            };
            let name = match ConfigFormat::of(&file) {
                ConfigFormat::Yaml => identity_from_yaml(&content),
                ConfigFormat::Json => identity_from_json(&content),
                ConfigFormat::Other => None,
            };
            if let Some(name) = name {
                return name;
            }
        }
        "unknown".to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConfigFormat {
    Yaml,
    Json,
    Other,
}

impl ConfigFormat {
    fn of(file: &File) -> Self {
        match file.path().extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => ConfigFormat::Yaml,
            Some("json") => ConfigFormat::Json,
            _ => ConfigFormat::Other,
        }
    }
}

fn is_valid_config(file: &File, content: &str) -> bool {
    match ConfigFormat::of(file) {
        ConfigFormat::Yaml => content.contains("system:") && content.contains("services:"),
        ConfigFormat::Json => match serde_json::from_str::<serde_json::Value>(content) {
            Ok(json) => {
                json.get(LEGACY_IDENTITY_SECTION).is_some() || json.get("system").is_some()
            }
            Err(e) => {
                warn!("Invalid JSON in config file {}: {}", file.path().display(), e);
                false
            }
        },
        ConfigFormat::Other => false,
    }
}

/// Certificate file naming conventions: `*.cert.pem` or `*.crt`
pub fn is_certificate_name(name: &str) -> bool {
    name.contains(".cert.pem") || name.contains(".crt")
}

/// Key file naming conventions: `*.private.key` or `*.key`
pub fn is_key_name(name: &str) -> bool {
    name.contains(".private.key") || name.contains(".key")
}

fn identity_from_yaml(content: &str) -> Option<String> {
    let token = IDENTITY_PATTERN.captures(content)?.get(1)?.as_str();
    let token = token.trim_matches(|c| c == '"' || c == '\'');
    (!token.is_empty()).then(|| token.to_string())
}

fn identity_from_json(content: &str) -> Option<String> {
    let json: serde_json::Value = serde_json::from_str(content).ok()?;
    [LEGACY_IDENTITY_SECTION, "system"]
        .iter()
        .filter_map(|section| json.get(section)?.get(IDENTITY_KEY)?.as_str())
        .find(|name| !name.is_empty())
        .map(str::to_string)
}
