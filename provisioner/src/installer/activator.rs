//! Activation of the downstream runtime

use std::fmt;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::debug;

use crate::errors::ProvisionError;
use crate::materialize::generator::GeneratedArtifacts;
use crate::records::record::DeviceRecord;

/// Steps of an activation, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivationStep {
    Initializing,
    DownloadingRuntime,
    InstallingRuntime,
    ConfiguringService,
    StartingService,
    VerifyingConnection,
    Completed,
}

impl ActivationStep {
    pub const ALL: [ActivationStep; 7] = [
        ActivationStep::Initializing,
        ActivationStep::DownloadingRuntime,
        ActivationStep::InstallingRuntime,
        ActivationStep::ConfiguringService,
        ActivationStep::StartingService,
        ActivationStep::VerifyingConnection,
        ActivationStep::Completed,
    ];

    pub fn percent(&self) -> u8 {
        match self {
            ActivationStep::Initializing => 0,
            ActivationStep::DownloadingRuntime => 20,
            ActivationStep::InstallingRuntime => 40,
            ActivationStep::ConfiguringService => 60,
            ActivationStep::StartingService => 80,
            ActivationStep::VerifyingConnection => 90,
            ActivationStep::Completed => 100,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            ActivationStep::Initializing => "Initializing provisioning process",
            ActivationStep::DownloadingRuntime => "Downloading Greengrass nucleus",
            ActivationStep::InstallingRuntime => "Installing Greengrass nucleus",
            ActivationStep::ConfiguringService => "Configuring systemd service",
            ActivationStep::StartingService => "Starting Greengrass service",
            ActivationStep::VerifyingConnection => "Verifying Greengrass connection",
            ActivationStep::Completed => "Provisioning completed successfully",
        }
    }
}

impl fmt::Display for ActivationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// Progress notification sent while activating
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivationProgress {
    pub step: ActivationStep,
    pub percent: u8,
    pub message: String,
}

impl From<ActivationStep> for ActivationProgress {
    fn from(step: ActivationStep) -> Self {
        Self {
            step,
            percent: step.percent(),
            message: step.message().to_string(),
        }
    }
}

pub type ProgressSender = mpsc::UnboundedSender<ActivationProgress>;
pub type ProgressReceiver = mpsc::UnboundedReceiver<ActivationProgress>;

pub fn progress_channel() -> (ProgressSender, ProgressReceiver) {
    mpsc::unbounded_channel()
}

/// Send a step notification. A dropped receiver is not an error.
pub fn notify(progress: &ProgressSender, step: ActivationStep) {
    if progress.send(step.into()).is_err() {
        debug!("Progress receiver closed, dropping step: {}", step);
    }
}

/// Installs and starts the runtime from materialized files
#[async_trait]
pub trait Activator: Send + Sync {
    async fn activate(
        &self,
        record: &DeviceRecord,
        artifacts: &GeneratedArtifacts,
        progress: ProgressSender,
    ) -> Result<(), ProvisionError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_steps_are_ordered() {
        let percents: Vec<u8> = ActivationStep::ALL.iter().map(|s| s.percent()).collect();
        assert_eq!(percents, vec![0, 20, 40, 60, 80, 90, 100]);
    }

    #[tokio::test]
    async fn test_notify_after_receiver_dropped() {
        let (tx, mut rx) = progress_channel();
        notify(&tx, ActivationStep::Initializing);
        assert_eq!(rx.recv().await.unwrap().percent, 0);

        drop(rx);
        notify(&tx, ActivationStep::Completed);
    }
}
