//! Provisioning run
//!
//! The [`Orchestrator`] drives one run through a fixed sequence of phases and
//! is the only writer of the status file:
//!
//! ```text
//! STARTING -> CHECKING_PROVISIONING -> ALREADY_PROVISIONED
//!                                   -> CHECKING_CONNECTIVITY -> NO_CONNECTIVITY
//!                                                            -> READING_DATABASE
//!          -> GENERATING_CONFIG -> PROVISIONING -> COMPLETED
//! ```
//!
//! Any failure ends the run in `ERROR`. Nothing is retried; a supervisor
//! re-runs the process and detection short-circuits finished work.

use std::path::PathBuf;

use tracing::{error, info, warn};

use crate::app::options::AppOptions;
use crate::detect::checker::ProvisioningDetector;
use crate::errors::ProvisionError;
use crate::installer::activator::{progress_channel, ActivationProgress, Activator};
use crate::installer::dry_run::DryRunActivator;
use crate::installer::nucleus::NucleusActivator;
use crate::materialize::generator::ConfigMaterializer;
use crate::network::probe::{HttpProbe, ReachabilityProbe};
use crate::records::record::DeviceRecord;
use crate::records::sqlite::SqliteRecordStore;
use crate::records::store::RecordStore;
use crate::status::phase::Phase;
use crate::status::recorder::StatusRecorder;
use crate::storage::layout::StorageLayout;
use crate::utils::device_identifier;

/// Device id looked up when the hardware identifier has no record
pub const DEFAULT_DEVICE_ID: &str = "default";

/// Message written with every terminal error
pub const FAILURE_MESSAGE: &str = "Provisioning failed";

/// How a run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    AlreadyProvisioned { identity_name: String },
    Completed,
    NoConnectivity { error: String },
    Failed { detail: String },
}

impl Outcome {
    /// Process exit code: 0 success, 2 no connectivity, 1 anything else
    pub fn exit_code(&self) -> i32 {
        match self {
            Outcome::AlreadyProvisioned { .. } | Outcome::Completed => 0,
            Outcome::NoConnectivity { .. } => 2,
            Outcome::Failed { .. } => 1,
        }
    }

    pub fn is_success(&self) -> bool {
        self.exit_code() == 0
    }
}

/// Sequences detection, probing, lookup, materialization and activation
pub struct Orchestrator {
    recorder: StatusRecorder,
    detector: ProvisioningDetector,
    probe: Box<dyn ReachabilityProbe>,
    store: Box<dyn RecordStore>,
    materializer: ConfigMaterializer,
    activator: Box<dyn Activator>,
    device_id: Option<String>,
    hardware_identifier: Option<String>,
}

impl Orchestrator {
    pub fn new(
        recorder: StatusRecorder,
        root_dir: impl Into<PathBuf>,
        probe: Box<dyn ReachabilityProbe>,
        store: Box<dyn RecordStore>,
        activator: Box<dyn Activator>,
    ) -> Self {
        let root_dir = root_dir.into();
        Self {
            recorder,
            detector: ProvisioningDetector::new(root_dir.clone()),
            probe,
            store,
            materializer: ConfigMaterializer::new(root_dir),
            activator,
            device_id: None,
            hardware_identifier: None,
        }
    }

    /// Look this device id up directly
    pub fn with_device_id(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = Some(device_id.into());
        self
    }

    /// Use this hardware identifier instead of discovering one
    pub fn with_hardware_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.hardware_identifier = Some(identifier.into());
        self
    }

    pub fn recorder(&self) -> &StatusRecorder {
        &self.recorder
    }

    /// Run every phase once
    pub async fn run(&mut self) -> Outcome {
        let outcome = match self.execute().await {
            Ok(outcome) => outcome,
            Err(e) => {
                let detail = e.to_string();
                error!("Fatal error: {}", detail);
                if let Err(status_err) = self.recorder.report_error(FAILURE_MESSAGE, &detail).await {
                    warn!("Could not record failure: {}", status_err);
                }
                Outcome::Failed { detail }
            }
        };
        self.store.disconnect();
        outcome
    }

    async fn execute(&mut self) -> Result<Outcome, ProvisionError> {
        report(&mut self.recorder, Phase::CheckingProvisioning, "", None).await;
        let status = self.detector.detect().await;
        if status.is_provisioned {
            info!(
                "Greengrass is already provisioned for thing: {}",
                status.identity_name
            );
            let message = format!("Already provisioned as {}", status.identity_name);
            report(&mut self.recorder, Phase::AlreadyProvisioned, &message, None).await;
            return Ok(Outcome::AlreadyProvisioned {
                identity_name: status.identity_name,
            });
        }
        info!("Not provisioned: {}", status.details);

        report(&mut self.recorder, Phase::CheckingConnectivity, "", None).await;
        let connectivity = self.probe.check_overall().await;
        if !connectivity.connected {
            error!("No internet connectivity: {}", connectivity.error);
            report(
                &mut self.recorder,
                Phase::NoConnectivity,
                &connectivity.error,
                None,
            )
            .await;
            return Ok(Outcome::NoConnectivity {
                error: connectivity.error,
            });
        }

        report(&mut self.recorder, Phase::ReadingDatabase, "", None).await;
        let record = self.lookup_record().await?;
        record.validate()?;
        info!(
            "Found configuration for device: {} (Thing: {})",
            record.device_id, record.identity_name
        );

        report(&mut self.recorder, Phase::GeneratingConfig, "", None).await;
        let artifacts = self.materializer.materialize(&record).await?;

        report(&mut self.recorder, Phase::Provisioning, "", None).await;
        let (tx, mut rx) = progress_channel();
        let activation = self.activator.activate(&record, &artifacts, tx);
        tokio::pin!(activation);
        let result = loop {
            tokio::select! {
                biased;
                Some(progress) = rx.recv() => {
                    report_progress(&mut self.recorder, progress).await;
                }
                result = &mut activation => break result,
            }
        };
        while let Ok(progress) = rx.try_recv() {
            report_progress(&mut self.recorder, progress).await;
        }
        result?;

        report(
            &mut self.recorder,
            Phase::Completed,
            "Greengrass provisioning completed successfully",
            Some(100),
        )
        .await;
        info!("Greengrass provisioning completed successfully!");
        Ok(Outcome::Completed)
    }

    async fn lookup_record(&mut self) -> Result<DeviceRecord, ProvisionError> {
        if !self.store.connect() {
            return Err(ProvisionError::DatabaseError(format!(
                "Failed to connect to database: {}",
                self.store.last_error()
            )));
        }

        if let Some(device_id) = self.device_id.clone() {
            info!("Looking up configuration for device id: {}", device_id);
            return self.store.get_by_primary_id(&device_id)?.ok_or_else(no_record);
        }

        let identifier = match self.hardware_identifier.clone() {
            Some(identifier) => identifier,
            None => device_identifier().await,
        };
        info!("Looking up configuration for device: {}", identifier);
        if let Some(record) = self.store.get_by_secondary_identifier(&identifier)? {
            return Ok(record);
        }

        info!("Falling back to device id: {}", DEFAULT_DEVICE_ID);
        self.store
            .get_by_primary_id(DEFAULT_DEVICE_ID)?
            .ok_or_else(no_record)
    }
}

fn no_record() -> ProvisionError {
    ProvisionError::RecordError("No device configuration found in database".to_string())
}

/// Status write failures are logged and the run continues
async fn report(recorder: &mut StatusRecorder, phase: Phase, message: &str, progress: Option<i32>) {
    if let Err(e) = recorder.report(phase, message, progress).await {
        warn!("Continuing without status update for {}: {}", phase, e);
    }
}

async fn report_progress(recorder: &mut StatusRecorder, progress: ActivationProgress) {
    report(
        recorder,
        Phase::Provisioning,
        &progress.message,
        Some(i32::from(progress.percent)),
    )
    .await;
}

/// Build the collaborators from options and run once
pub async fn run(options: AppOptions) -> Result<Outcome, ProvisionError> {
    info!("Greengrass provisioning service starting...");
    info!("Database path: {}", options.database_path.display());
    info!("Greengrass path: {}", options.greengrass_path.display());
    info!("Status file: {}", options.status_file.display());

    let recorder = StatusRecorder::new(&options.status_file).await;
    let probe = HttpProbe::new(&options.probe)?;
    let store = SqliteRecordStore::new(&options.database_path);

    let layout = StorageLayout::new(&options.greengrass_path);
    let activator: Box<dyn Activator> = if options.activation.dry_run {
        info!("Activation runs in dry-run mode");
        Box::new(DryRunActivator::new(layout))
    } else {
        Box::new(NucleusActivator::new(layout, options.activation.clone())?)
    };

    let mut orchestrator = Orchestrator::new(
        recorder,
        &options.greengrass_path,
        Box::new(probe),
        Box::new(store),
        activator,
    );
    if let Some(device_id) = &options.device_id {
        orchestrator = orchestrator.with_device_id(device_id);
    }

    Ok(orchestrator.run().await)
}
