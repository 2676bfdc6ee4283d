//! Provisioning phases and the persisted status record

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One named state of the provisioning workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    Starting,
    CheckingProvisioning,
    AlreadyProvisioned,
    CheckingConnectivity,
    NoConnectivity,
    ReadingDatabase,
    GeneratingConfig,
    Provisioning,
    Completed,
    Error,
}

impl Phase {
    pub const ALL: [Phase; 10] = [
        Phase::Starting,
        Phase::CheckingProvisioning,
        Phase::AlreadyProvisioned,
        Phase::CheckingConnectivity,
        Phase::NoConnectivity,
        Phase::ReadingDatabase,
        Phase::GeneratingConfig,
        Phase::Provisioning,
        Phase::Completed,
        Phase::Error,
    ];

    /// Name written to the status file
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Starting => "STARTING",
            Phase::CheckingProvisioning => "CHECKING_PROVISIONING",
            Phase::AlreadyProvisioned => "ALREADY_PROVISIONED",
            Phase::CheckingConnectivity => "CHECKING_CONNECTIVITY",
            Phase::NoConnectivity => "NO_CONNECTIVITY",
            Phase::ReadingDatabase => "READING_DATABASE",
            Phase::GeneratingConfig => "GENERATING_CONFIG",
            Phase::Provisioning => "PROVISIONING",
            Phase::Completed => "COMPLETED",
            Phase::Error => "ERROR",
        }
    }

    /// Message used when a report carries none. `Error` has no default.
    pub fn default_message(&self) -> Option<&'static str> {
        match self {
            Phase::Starting => Some("Service is starting"),
            Phase::CheckingProvisioning => Some("Checking if Greengrass is already provisioned"),
            Phase::AlreadyProvisioned => Some("Greengrass is already provisioned"),
            Phase::CheckingConnectivity => Some("Checking internet connectivity"),
            Phase::NoConnectivity => Some("No internet connectivity available"),
            Phase::ReadingDatabase => Some("Reading configuration from database"),
            Phase::GeneratingConfig => Some("Generating Greengrass configuration"),
            Phase::Provisioning => Some("Provisioning Greengrass device"),
            Phase::Completed => Some("Provisioning completed successfully"),
            Phase::Error => None,
        }
    }

    /// Progress used when a report carries none. `Error` keeps the last value.
    pub fn default_progress(&self) -> Option<u8> {
        match self {
            Phase::Starting => Some(5),
            Phase::CheckingProvisioning => Some(10),
            Phase::CheckingConnectivity | Phase::NoConnectivity => Some(20),
            Phase::ReadingDatabase => Some(40),
            Phase::GeneratingConfig => Some(60),
            Phase::Provisioning => Some(80),
            Phase::AlreadyProvisioned | Phase::Completed => Some(100),
            Phase::Error => None,
        }
    }

    /// Whether the workflow stops in this phase
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Phase::AlreadyProvisioned | Phase::NoConnectivity | Phase::Completed | Phase::Error
        )
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Externally observed progress snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusRecord {
    #[serde(rename = "status")]
    pub phase: Phase,

    pub message: String,

    #[serde(with = "utc_seconds")]
    pub timestamp: DateTime<Utc>,

    #[serde(rename = "progress_percentage")]
    pub progress_percent: u8,

    #[serde(
        rename = "error_details",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub error_detail: Option<String>,
}

impl StatusRecord {
    /// Record written when the process starts
    pub fn starting() -> Self {
        Self {
            phase: Phase::Starting,
            message: Phase::Starting
                .default_message()
                .unwrap_or_default()
                .to_string(),
            timestamp: Utc::now(),
            progress_percent: 0,
            error_detail: None,
        }
    }
}

/// `YYYY-MM-DDTHH:MM:SSZ` timestamps
mod utc_seconds {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

    pub fn serialize<S>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        NaiveDateTime::parse_from_str(&s, FORMAT)
            .map(|naive| naive.and_utc())
            .map_err(serde::de::Error::custom)
    }
}
