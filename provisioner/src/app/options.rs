//! Command line and resolved application options

use std::path::PathBuf;

use clap::Parser;

use crate::logs::{LogLevel, LogOptions};
use crate::status::recorder::DEFAULT_STATUS_FILE;
use crate::storage::settings::{ActivationSettings, ProbeSettings, Settings, DEFAULT_SETTINGS_PATH};

const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("GIT_HASH"),
    ", built ",
    env!("BUILD_TIME"),
    ")"
);

/// Provision an edge device for the Greengrass runtime
#[derive(Debug, Clone, Parser)]
#[command(name = "ggprov", version = VERSION)]
pub struct Cli {
    /// Path to the device configuration database
    #[arg(short = 'd', long, value_parser = existing_file)]
    pub database_path: PathBuf,

    /// Greengrass root directory
    #[arg(short = 'g', long, value_parser = existing_dir)]
    pub greengrass_path: PathBuf,

    /// Status file polled by monitors
    #[arg(short = 's', long, default_value = DEFAULT_STATUS_FILE)]
    pub status_file: PathBuf,

    /// Debug output on the console
    #[arg(short = 'v', long)]
    pub verbose: bool,

    /// Settings file
    #[arg(long, default_value = DEFAULT_SETTINGS_PATH)]
    pub settings: PathBuf,

    /// Look this device id up instead of discovering a hardware identifier
    #[arg(long)]
    pub device_id: Option<String>,

    /// Reachability endpoint replacing the built-in candidates
    #[arg(long)]
    pub endpoint: Option<String>,

    /// Skip user, download and systemd changes during activation
    #[arg(long)]
    pub dry_run: bool,
}

fn existing_file(raw: &str) -> Result<PathBuf, String> {
    let path = PathBuf::from(raw);
    if path.is_file() {
        Ok(path)
    } else {
        Err(format!("database file does not exist: {}", raw))
    }
}

fn existing_dir(raw: &str) -> Result<PathBuf, String> {
    let path = PathBuf::from(raw);
    if path.is_dir() {
        Ok(path)
    } else {
        Err(format!("greengrass directory does not exist: {}", raw))
    }
}

/// Overrides read from the environment
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvOverrides {
    /// `TEST_MODE=true`
    pub test_mode: bool,
    /// `IOT_ENDPOINT`, only honoured in test mode
    pub iot_endpoint: Option<String>,
}

impl EnvOverrides {
    pub fn from_env() -> Self {
        Self::from_vars(
            std::env::var("TEST_MODE").ok().as_deref(),
            std::env::var("IOT_ENDPOINT").ok().as_deref(),
        )
    }

    pub fn from_vars(test_mode: Option<&str>, iot_endpoint: Option<&str>) -> Self {
        Self {
            test_mode: test_mode == Some("true"),
            iot_endpoint: iot_endpoint
                .map(str::trim)
                .filter(|e| !e.is_empty())
                .map(str::to_string),
        }
    }

    /// Mock endpoint used by the probe, when test mode supplies one
    pub fn mock_endpoint(&self) -> Option<String> {
        match (&self.iot_endpoint, self.test_mode) {
            (Some(host), true) => Some(format!("http://{}", host)),
            _ => None,
        }
    }
}

/// Options for one provisioning run
#[derive(Debug, Clone)]
pub struct AppOptions {
    pub database_path: PathBuf,
    pub greengrass_path: PathBuf,
    pub status_file: PathBuf,
    pub device_id: Option<String>,
    pub probe: ProbeSettings,
    pub activation: ActivationSettings,
    pub logging: LogOptions,
}

impl AppOptions {
    /// Merge settings, environment and command line, later layers winning
    pub fn resolve(cli: Cli, settings: Settings, env: &EnvOverrides) -> Self {
        let mut probe = settings.probe;
        if let Some(endpoint) = cli.endpoint {
            probe.custom_endpoint = Some(endpoint);
        }
        if let Some(mock) = env.mock_endpoint() {
            probe.candidate_endpoints = vec![mock.clone()];
            probe.custom_endpoint = Some(mock);
        }

        let mut activation = settings.activation;
        activation.dry_run |= cli.dry_run || env.test_mode;

        let logging = LogOptions {
            log_level: if cli.verbose {
                LogLevel::Debug
            } else {
                settings.log_level
            },
            console: true,
            log_dir: Some(settings.log_dir),
            json_format: settings.json_logs,
        };

        Self {
            database_path: cli.database_path,
            greengrass_path: cli.greengrass_path,
            status_file: cli.status_file,
            device_id: cli.device_id.filter(|id| !id.trim().is_empty()),
            probe,
            activation,
            logging,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> (tempfile::TempDir, String, String) {
        let tmp = tempfile::TempDir::new().unwrap();
        let db = tmp.path().join("devices.db");
        std::fs::write(&db, "").unwrap();
        let root = tmp.path().join("gg");
        std::fs::create_dir(&root).unwrap();
        (
            tmp,
            db.to_string_lossy().into_owned(),
            root.to_string_lossy().into_owned(),
        )
    }

    #[test]
    fn test_parse_defaults() {
        let (_tmp, db, root) = fixture();
        let cli = Cli::try_parse_from(["ggprov", "-d", &db, "-g", &root]).unwrap();
        assert_eq!(cli.status_file, PathBuf::from(DEFAULT_STATUS_FILE));
        assert_eq!(cli.settings, PathBuf::from(DEFAULT_SETTINGS_PATH));
        assert!(!cli.verbose);
        assert!(!cli.dry_run);
    }

    #[test]
    fn test_parse_rejects_missing_paths() {
        let (tmp, db, root) = fixture();
        let missing = tmp.path().join("missing").to_string_lossy().into_owned();
        assert!(Cli::try_parse_from(["ggprov", "-d", &missing, "-g", &root]).is_err());
        assert!(Cli::try_parse_from(["ggprov", "-d", &db, "-g", &missing]).is_err());
        // a directory is not a database file
        assert!(Cli::try_parse_from(["ggprov", "-d", &root, "-g", &root]).is_err());
        assert!(Cli::try_parse_from(["ggprov", "-g", &root]).is_err());
    }

    #[test]
    fn test_resolve_layers() {
        let (_tmp, db, root) = fixture();
        let cli = Cli::try_parse_from([
            "ggprov",
            "-d",
            &db,
            "-g",
            &root,
            "-v",
            "--endpoint",
            "https://iot.example.com",
            "--device-id",
            "d1",
        ])
        .unwrap();

        let options = AppOptions::resolve(cli, Settings::default(), &EnvOverrides::default());
        assert_eq!(options.logging.log_level, LogLevel::Debug);
        assert!(options.logging.console);
        assert_eq!(
            options.probe.custom_endpoint.as_deref(),
            Some("https://iot.example.com")
        );
        assert_eq!(options.device_id.as_deref(), Some("d1"));
        assert!(!options.activation.dry_run);
    }

    #[test]
    fn test_test_mode_overrides_probe_and_activation() {
        let (_tmp, db, root) = fixture();
        let cli = Cli::try_parse_from(["ggprov", "-d", &db, "-g", &root]).unwrap();
        let env = EnvOverrides::from_vars(Some("true"), Some("mock-iot:8080"));

        let options = AppOptions::resolve(cli, Settings::default(), &env);
        assert_eq!(options.probe.candidate_endpoints, vec!["http://mock-iot:8080"]);
        assert_eq!(
            options.probe.custom_endpoint.as_deref(),
            Some("http://mock-iot:8080")
        );
        assert!(options.activation.dry_run);

        let env = EnvOverrides::from_vars(Some("false"), Some("mock-iot:8080"));
        assert_eq!(env.mock_endpoint(), None);
    }
}
