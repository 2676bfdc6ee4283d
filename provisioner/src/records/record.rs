//! Device provisioning record

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::ProvisionError;

/// Runtime version used when a record does not name one
pub const DEFAULT_RUNTIME_VERSION: &str = "2.9.0";

/// One device's provisioning inputs, as stored in the record store
#[derive(Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub device_id: String,
    pub identity_name: String,
    /// Cloud data-plane host
    pub endpoint: String,
    pub region: String,
    /// Certificate content or a filesystem path to it
    pub root_ca: String,
    pub certificate_pem: String,
    pub private_key_pem: String,
    pub credential_role: String,
    pub credential_role_endpoint: String,

    #[serde(default)]
    pub runtime_version: Option<String>,
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub initial_components: Vec<String>,
    #[serde(default)]
    pub proxy_url: Option<String>,
    #[serde(default)]
    pub mqtt_port: Option<u16>,
    /// Accepted but not used when generating the runtime configuration
    #[serde(default)]
    pub custom_domain: Option<String>,
}

impl DeviceRecord {
    /// Names of required fields that are empty
    pub fn missing_fields(&self) -> Vec<&'static str> {
        [
            ("device_id", &self.device_id),
            ("identity_name", &self.identity_name),
            ("endpoint", &self.endpoint),
            ("region", &self.region),
            ("root_ca", &self.root_ca),
            ("certificate_pem", &self.certificate_pem),
            ("private_key_pem", &self.private_key_pem),
            ("credential_role", &self.credential_role),
            ("credential_role_endpoint", &self.credential_role_endpoint),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
        .collect()
    }

    /// Check that every required field is present
    pub fn validate(&self) -> Result<(), ProvisionError> {
        let missing = self.missing_fields();
        if missing.is_empty() {
            return Ok(());
        }
        Err(ProvisionError::RecordError(format!(
            "device record '{}' has empty required fields: {}",
            self.device_id,
            missing.join(", ")
        )))
    }

    /// Runtime version to install
    pub fn runtime_version(&self) -> &str {
        match self.runtime_version.as_deref() {
            Some(version) if !version.is_empty() => version,
            _ => DEFAULT_RUNTIME_VERSION,
        }
    }

    /// Deployment group, if one is set
    pub fn group(&self) -> Option<&str> {
        self.group.as_deref().filter(|g| !g.is_empty())
    }

    /// Proxy URL, if one is set
    pub fn proxy_url(&self) -> Option<&str> {
        self.proxy_url.as_deref().filter(|p| !p.is_empty())
    }
}

// Keeps the private key out of logs
impl fmt::Debug for DeviceRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceRecord")
            .field("device_id", &self.device_id)
            .field("identity_name", &self.identity_name)
            .field("endpoint", &self.endpoint)
            .field("region", &self.region)
            .field("credential_role", &self.credential_role)
            .field("credential_role_endpoint", &self.credential_role_endpoint)
            .field("runtime_version", &self.runtime_version)
            .field("group", &self.group)
            .field("initial_components", &self.initial_components)
            .field("proxy_url", &self.proxy_url)
            .field("mqtt_port", &self.mqtt_port)
            .field("custom_domain", &self.custom_domain)
            .field("private_key_pem", &"<redacted>")
            .finish_non_exhaustive()
    }
}

/// Split a comma-separated component list, trimming items and dropping empty ones
pub fn parse_components(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete() -> DeviceRecord {
        DeviceRecord {
            device_id: "d1".into(),
            identity_name: "Thing1".into(),
            endpoint: "iot.example.com".into(),
            region: "us-east-1".into(),
            root_ca: "CA".into(),
            certificate_pem: "CERT".into(),
            private_key_pem: "KEY".into(),
            credential_role: "Role1".into(),
            credential_role_endpoint: "cred.example.com".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_parse_components() {
        assert_eq!(
            parse_components(" aws.greengrass.Cli, ,aws.greengrass.Nucleus ,"),
            vec!["aws.greengrass.Cli", "aws.greengrass.Nucleus"]
        );
        assert!(parse_components("").is_empty());
    }

    #[test]
    fn test_validate_names_empty_fields() {
        assert!(complete().validate().is_ok());

        let record = DeviceRecord {
            endpoint: String::new(),
            private_key_pem: "  ".into(),
            ..complete()
        };
        assert_eq!(record.missing_fields(), vec!["endpoint", "private_key_pem"]);
        let err = record.validate().unwrap_err().to_string();
        assert!(err.contains("endpoint, private_key_pem"));
    }

    #[test]
    fn test_optional_defaults() {
        let record = complete();
        assert_eq!(record.runtime_version(), DEFAULT_RUNTIME_VERSION);
        assert_eq!(record.group(), None);

        let record = DeviceRecord {
            runtime_version: Some("2.12.1".into()),
            group: Some(String::new()),
            ..complete()
        };
        assert_eq!(record.runtime_version(), "2.12.1");
        assert_eq!(record.group(), None);
    }

    #[test]
    fn test_debug_redacts_private_key() {
        let rendered = format!("{:?}", complete());
        assert!(rendered.contains("Thing1"));
        assert!(!rendered.contains("KEY\""));
        assert!(rendered.contains("<redacted>"));
    }
}
