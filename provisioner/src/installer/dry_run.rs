//! Activation without OS changes

use async_trait::async_trait;
use tracing::info;

use crate::errors::ProvisionError;
use crate::installer::activator::{notify, ActivationStep, Activator, ProgressSender};
use crate::materialize::generator::GeneratedArtifacts;
use crate::records::record::DeviceRecord;
use crate::storage::layout::StorageLayout;

const PLACEHOLDER_JAR: &str = "Mock Greengrass JAR for testing";

/// Reports every activation step and writes a placeholder runtime jar, but
/// creates no users, downloads nothing and leaves systemd alone
#[derive(Debug, Clone)]
pub struct DryRunActivator {
    layout: StorageLayout,
}

impl DryRunActivator {
    pub fn new(layout: StorageLayout) -> Self {
        Self { layout }
    }
}

#[async_trait]
impl Activator for DryRunActivator {
    async fn activate(
        &self,
        record: &DeviceRecord,
        _artifacts: &GeneratedArtifacts,
        progress: ProgressSender,
    ) -> Result<(), ProvisionError> {
        info!("Dry run: activating {} without system changes", record.identity_name);

        notify(&progress, ActivationStep::Initializing);
        notify(&progress, ActivationStep::DownloadingRuntime);
        let jar = self.layout.nucleus_jar();
        if !jar.exists().await {
            jar.write_string(PLACEHOLDER_JAR).await?;
            info!("Dry run: created placeholder {}", jar.path().display());
        }

        for step in [
            ActivationStep::InstallingRuntime,
            ActivationStep::ConfiguringService,
            ActivationStep::StartingService,
            ActivationStep::VerifyingConnection,
            ActivationStep::Completed,
        ] {
            notify(&progress, step);
        }
        Ok(())
    }
}
