//! ggprov - entry point
//!
//! Provisions an edge device for the Greengrass runtime once per boot and
//! exits: 0 on success or when already provisioned, 2 without connectivity,
//! 1 on any other failure.

use clap::Parser;
use tracing::{error, info};

use ggprov::app::options::{AppOptions, Cli, EnvOverrides};
use ggprov::app::run::run;
use ggprov::filesys::file::File;
use ggprov::logs::init_logging;
use ggprov::storage::settings::Settings;
use ggprov::utils::version_info;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = if e.use_stderr() { 1 } else { 0 };
            let _ = e.print();
            std::process::exit(code);
        }
    };

    let settings = match Settings::load(&File::new(&cli.settings)).await {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };

    let options = AppOptions::resolve(cli, settings, &EnvOverrides::from_env());
    let guard = match init_logging(options.logging.clone()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {}", e);
            None
        }
    };

    let version = version_info();
    info!(
        "ggprov {} ({}, built {})",
        version.version, version.git_hash, version.build_time
    );

    let code = match run(options).await {
        Ok(outcome) => {
            info!("Provisioning finished: {:?}", outcome);
            outcome.exit_code()
        }
        Err(e) => {
            error!("Provisioning could not start: {}", e);
            1
        }
    };

    // flush the file writer before exiting
    drop(guard);
    std::process::exit(code);
}
