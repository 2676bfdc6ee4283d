//! Systemd-based runtime activation
//!
//! Creates the service account, fetches the runtime jar, hands the root over
//! to the service account, installs a systemd unit and starts it. Start-up is
//! judged from `systemctl is-active` after a fixed delay and from the tail of
//! the runtime log.

use std::path::Path;
use std::process::Stdio;
use std::sync::LazyLock;
use std::time::Duration;

use anyhow::{bail, Context};
use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use tokio::process::Command;
use tracing::{debug, error, info, warn};

use crate::errors::ProvisionError;
use crate::filesys::file::{File, MODE_WORLD_READ};
use crate::installer::activator::{notify, ActivationStep, Activator, ProgressSender};
use crate::materialize::generator::GeneratedArtifacts;
use crate::records::record::DeviceRecord;
use crate::storage::layout::StorageLayout;
use crate::storage::settings::ActivationSettings;

/// Name of the systemd service
pub const SERVICE_NAME: &str = "greengrass.service";

/// Location of the installed unit file
pub const UNIT_FILE_PATH: &str = "/etc/systemd/system/greengrass.service";

const NUCLEUS_DOWNLOAD_URL: &str = "https://d2s8p88vqu9w66.cloudfront.net/releases";
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(300);
const START_GRACE_PERIOD: Duration = Duration::from_secs(5);
const LOG_WAIT_ATTEMPTS: u32 = 30;
const LOG_WAIT_INTERVAL: Duration = Duration::from_secs(1);
const LOG_TAIL_LINES: usize = 50;

static LOG_SUCCESS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)connected|established|successful").expect("valid pattern"));
static LOG_FAILURE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)error|failed").expect("valid pattern"));

/// Download location of a runtime release
pub fn nucleus_download_url(version: &str) -> String {
    format!("{}/greengrass-{}.zip", NUCLEUS_DOWNLOAD_URL, version)
}

/// Activates the runtime as a systemd service
#[derive(Debug, Clone)]
pub struct NucleusActivator {
    layout: StorageLayout,
    settings: ActivationSettings,
    unit_file: File,
    client: Client,
}

impl NucleusActivator {
    pub fn new(layout: StorageLayout, settings: ActivationSettings) -> Result<Self, ProvisionError> {
        let client = Client::builder().timeout(DOWNLOAD_TIMEOUT).build()?;
        Ok(Self {
            layout,
            settings,
            unit_file: File::new(UNIT_FILE_PATH),
            client,
        })
    }

    async fn ensure_service_account(&self) -> Result<(), ProvisionError> {
        let user = self.settings.user.as_str();
        let group = self.settings.group.as_str();

        if run("id", &["-u", user]).await.is_ok() {
            info!("Greengrass user {} already exists", user);
            return Ok(());
        }

        if let Err(e) = run("groupadd", &["--system", group]).await {
            debug!("groupadd {}: {}", group, e);
        }
        run(
            "useradd",
            &["--system", "--gid", group, "--shell", "/bin/false", user],
        )
        .await
        .map_err(|e| activation_error("Failed to create Greengrass user", e))?;

        info!("Created Greengrass user {}:{}", user, group);
        Ok(())
    }

    async fn ensure_runtime(&self, version: &str) -> Result<(), ProvisionError> {
        let jar = self.layout.nucleus_jar();
        if jar.exists().await {
            info!("Greengrass nucleus already exists, skipping download");
            return Ok(());
        }

        let url = nucleus_download_url(version);
        info!("Downloading Greengrass nucleus version {} from {}", version, url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| activation_error("Failed to download Greengrass nucleus", e))?;
        let body = response
            .bytes()
            .await
            .map_err(|e| activation_error("Failed to download Greengrass nucleus", e))?;

        jar.write_atomic(&body).await?;
        info!("Saved {} bytes to {}", body.len(), jar.path().display());
        Ok(())
    }

    async fn hand_over_root(&self) -> Result<(), ProvisionError> {
        let owner = format!("{}:{}", self.settings.user, self.settings.group);
        let root = self.layout.base_dir.to_string_lossy().into_owned();
        run("chown", &["-R", owner.as_str(), root.as_str()])
            .await
            .map_err(|e| activation_error("Failed to install Greengrass nucleus", e))?;
        Ok(())
    }

    async fn java_home(&self) -> String {
        if let Some(home) = &self.settings.java_home {
            return home.clone();
        }
        match run("which", &["java"]).await {
            Ok(path) => java_home_from_binary(Path::new(path.trim())).await,
            Err(e) => {
                warn!("Could not locate java: {}", e);
                String::new()
            }
        }
    }

    async fn configure_service(&self, artifacts: &GeneratedArtifacts) -> Result<(), ProvisionError> {
        let unit = render_unit(
            &self.layout.base_dir,
            &artifacts.config_file,
            &self.settings,
            &self.java_home().await,
        );
        self.unit_file.write_atomic(unit.as_bytes()).await?;
        self.unit_file.set_mode(MODE_WORLD_READ).await?;

        run("systemctl", &["daemon-reload"])
            .await
            .map_err(|e| activation_error("Failed to reload systemd", e))?;
        run("systemctl", &["enable", SERVICE_NAME])
            .await
            .map_err(|e| activation_error("Failed to enable Greengrass service", e))?;

        info!("Configured systemd service for Greengrass");
        Ok(())
    }

    async fn start_service(&self) -> Result<(), ProvisionError> {
        let _ = run("systemctl", &["stop", SERVICE_NAME]).await;
        run("systemctl", &["start", SERVICE_NAME])
            .await
            .map_err(|e| activation_error("Failed to start Greengrass service", e))?;

        tokio::time::sleep(START_GRACE_PERIOD).await;

        run("systemctl", &["is-active", SERVICE_NAME])
            .await
            .map_err(|e| activation_error("Greengrass service is not active", e))?;

        info!("Greengrass service started successfully");
        Ok(())
    }

    async fn verify_connection(&self) -> Result<(), ProvisionError> {
        let log = self.layout.runtime_log_file();
        let mut attempts = 0;
        while !log.exists().await && attempts < LOG_WAIT_ATTEMPTS {
            tokio::time::sleep(LOG_WAIT_INTERVAL).await;
            attempts += 1;
        }

        if !log.exists().await {
            warn!("Greengrass log file not found, assuming connection is ok");
            return Ok(());
        }

        let content = log.read_string().await?;
        match scan_log_tail(&content) {
            LogVerdict::Connected => {
                info!("Greengrass connection verified from logs");
                Ok(())
            }
            LogVerdict::Failed(lines) => {
                warn!("Found errors in Greengrass logs: {}", lines);
                Err(ProvisionError::ActivationError(format!(
                    "Failed to verify Greengrass connection: {}",
                    lines
                )))
            }
            LogVerdict::Quiet => {
                info!("No errors found in logs, assuming connection successful");
                Ok(())
            }
        }
    }
}

#[async_trait]
impl Activator for NucleusActivator {
    async fn activate(
        &self,
        record: &DeviceRecord,
        artifacts: &GeneratedArtifacts,
        progress: ProgressSender,
    ) -> Result<(), ProvisionError> {
        info!(
            "Starting Greengrass provisioning for device: {}",
            record.device_id
        );

        notify(&progress, ActivationStep::Initializing);
        self.ensure_service_account().await?;

        notify(&progress, ActivationStep::DownloadingRuntime);
        self.ensure_runtime(record.runtime_version()).await?;

        notify(&progress, ActivationStep::InstallingRuntime);
        self.hand_over_root().await?;

        notify(&progress, ActivationStep::ConfiguringService);
        self.configure_service(artifacts).await?;

        notify(&progress, ActivationStep::StartingService);
        self.start_service().await?;

        notify(&progress, ActivationStep::VerifyingConnection);
        self.verify_connection().await?;

        notify(&progress, ActivationStep::Completed);
        info!("Greengrass provisioning completed successfully");
        Ok(())
    }
}

fn activation_error(context: &str, err: impl std::fmt::Display) -> ProvisionError {
    error!("{}: {:#}", context, err);
    ProvisionError::ActivationError(format!("{}: {:#}", context, err))
}

/// Run a command to completion, returning stdout on success
async fn run(program: &str, args: &[&str]) -> anyhow::Result<String> {
    debug!("Running {} {}", program, args.join(" "));
    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .await
        .with_context(|| format!("Failed to run {}", program))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("{} exited with {}: {}", program, output.status, stderr.trim());
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

async fn java_home_from_binary(java: &Path) -> String {
    let resolved = tokio::fs::canonicalize(java)
        .await
        .unwrap_or_else(|_| java.to_path_buf());
    // <home>/bin/java
    resolved
        .parent()
        .and_then(Path::parent)
        .map(|home| home.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Systemd unit running the runtime jar from `root`
pub fn render_unit(
    root: &Path,
    config_file: &Path,
    settings: &ActivationSettings,
    java_home: &str,
) -> String {
    let jar = root.join("lib").join("Greengrass.jar");
    let root = root.to_string_lossy();
    format!(
        "[Unit]
Description=Greengrass Core
After=network.target

[Service]
Type=simple
PIDFile={root}/alts/loader.pid
RemainAfterExit=no
Restart=on-failure
RestartSec=10
User={user}
Group={group}
Environment=\"JAVA_HOME={java_home}\"
ExecStart=/usr/bin/java -Dlog.store=FILE -Droot={root} -jar {jar} --config-path {config}
StandardOutput=journal
StandardError=journal

[Install]
WantedBy=multi-user.target
",
        root = root,
        user = settings.user,
        group = settings.group,
        java_home = java_home,
        jar = jar.display(),
        config = config_file.display(),
    )
}

#[derive(Debug, PartialEq, Eq)]
enum LogVerdict {
    Connected,
    Failed(String),
    Quiet,
}

fn scan_log_tail(content: &str) -> LogVerdict {
    let lines: Vec<&str> = content.lines().collect();
    let tail = &lines[lines.len().saturating_sub(LOG_TAIL_LINES)..];

    if tail.iter().any(|line| LOG_SUCCESS.is_match(line)) {
        return LogVerdict::Connected;
    }
    let failures: Vec<&str> = tail
        .iter()
        .copied()
        .filter(|line| LOG_FAILURE.is_match(line))
        .collect();
    if failures.is_empty() {
        LogVerdict::Quiet
    } else {
        LogVerdict::Failed(failures.join("\n"))
    }
}
