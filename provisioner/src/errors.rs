//! Error types for the provisioning service

use std::fmt;

use thiserror::Error;

/// Main error type for the provisioning service
#[derive(Error, Debug)]
pub enum ProvisionError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Database not connected")]
    NotConnected,

    #[error("{0}")]
    RecordError(String),

    #[error("Connectivity error: {0}")]
    ConnectivityError(String),

    #[error(transparent)]
    MaterializeError(#[from] MaterializeError),

    #[error("Activation error: {0}")]
    ActivationError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Status error: {0}")]
    StatusError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<anyhow::Error> for ProvisionError {
    fn from(err: anyhow::Error) -> Self {
        ProvisionError::Internal(format!("{:#}", err))
    }
}

impl From<rusqlite::Error> for ProvisionError {
    fn from(err: rusqlite::Error) -> Self {
        ProvisionError::DatabaseError(err.to_string())
    }
}

/// Materialization step that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaterializeStep {
    Directories,
    Credentials,
    RuntimeConfig,
    Validation,
}

impl MaterializeStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            MaterializeStep::Directories => "directories",
            MaterializeStep::Credentials => "credentials",
            MaterializeStep::RuntimeConfig => "runtime-config",
            MaterializeStep::Validation => "validation",
        }
    }
}

impl fmt::Display for MaterializeStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure of a single materialization step
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{step} step failed: {message}")]
pub struct MaterializeError {
    pub step: MaterializeStep,
    pub message: String,
}

impl MaterializeError {
    pub fn new(step: MaterializeStep, message: impl Into<String>) -> Self {
        Self {
            step,
            message: message.into(),
        }
    }
}
