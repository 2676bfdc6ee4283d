//! Settings file management

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::ProvisionError;
use crate::filesys::file::File;
use crate::logs::LogLevel;

/// Default location of the settings file
pub const DEFAULT_SETTINGS_PATH: &str = "/etc/ggprov/settings.json";

/// Service settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Directory for the log file
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,

    /// Emit console logs as JSON
    #[serde(default)]
    pub json_logs: bool,

    /// Reachability probe configuration
    #[serde(default)]
    pub probe: ProbeSettings,

    /// Activation configuration
    #[serde(default)]
    pub activation: ActivationSettings,
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("/var/log")
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            log_dir: default_log_dir(),
            json_logs: false,
            probe: ProbeSettings::default(),
            activation: ActivationSettings::default(),
        }
    }
}

impl Settings {
    /// Load settings from a file. A missing file yields the defaults.
    pub async fn load(file: &File) -> Result<Self, ProvisionError> {
        if !file.exists().await {
            debug!("Settings file {:?} not found, using defaults", file.path());
            return Ok(Self::default());
        }
        file.read_json::<Settings>().await.map_err(|e| {
            ProvisionError::ConfigError(format!(
                "Invalid settings file {}: {}",
                file.path().display(),
                e
            ))
        })
    }
}

/// Reachability probe settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeSettings {
    /// Total request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Host resolved first to detect a missing network
    #[serde(default = "default_dns_host")]
    pub dns_host: String,

    /// HTTPS host checked second to detect TLS or proxy breakage
    #[serde(default = "default_trust_anchor_url")]
    pub trust_anchor_url: String,

    /// Cloud endpoints tried in order when no custom endpoint is set
    #[serde(default = "default_candidate_endpoints")]
    pub candidate_endpoints: Vec<String>,

    /// Custom endpoint replacing the candidate list
    #[serde(default)]
    pub custom_endpoint: Option<String>,
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_dns_host() -> String {
    "amazonaws.com".to_string()
}

fn default_trust_anchor_url() -> String {
    "https://www.amazontrust.com".to_string()
}

fn default_candidate_endpoints() -> Vec<String> {
    vec![
        "https://iot.us-east-1.amazonaws.com".to_string(),
        "https://iot.us-west-2.amazonaws.com".to_string(),
        "https://greengrass.us-east-1.amazonaws.com".to_string(),
        "https://www.amazontrust.com".to_string(),
    ]
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            dns_host: default_dns_host(),
            trust_anchor_url: default_trust_anchor_url(),
            candidate_endpoints: default_candidate_endpoints(),
            custom_endpoint: None,
        }
    }
}

/// Activation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivationSettings {
    /// System user the runtime runs as
    #[serde(default = "default_user")]
    pub user: String,

    /// System group the runtime runs as
    #[serde(default = "default_group")]
    pub group: String,

    /// JAVA_HOME for the runtime; detected from `java` on PATH when absent
    #[serde(default)]
    pub java_home: Option<String>,

    /// Skip all OS changes during activation
    #[serde(default)]
    pub dry_run: bool,
}

fn default_user() -> String {
    "ggc_user".to_string()
}

fn default_group() -> String {
    "ggc_group".to_string()
}

impl Default for ActivationSettings {
    fn default() -> Self {
        Self {
            user: default_user(),
            group: default_group(),
            java_home: None,
            dry_run: false,
        }
    }
}
