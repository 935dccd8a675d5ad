//! # DeusVM Daemon
//!
//! Runs on a hypervisor host and exposes VM lifecycle, image repository and
//! disk provisioning operations over a REST API.
//!
//! ## Usage
//! ```bash
//! deusvm --config /etc/deusvm/deusvm.yaml
//! LIBVIRT_ADDR=qemu:///system deusvm --listen 127.0.0.1:8080
//! ```

use anyhow::Result;
use clap::Parser;
use deusvm_common::LogFormat;
use tracing::{error, info};

mod cli;
mod config;
mod http_server;
mod server;

use cli::Args;
use config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // Load configuration before logging so the file can set the level
    let config_path = Config::locate(args.config.as_deref())?;
    let config = match &config_path {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    }
    .with_cli_overrides(&args);

    match config.logging.log_format()? {
        LogFormat::Pretty => deusvm_common::init_logging(&config.logging.level)?,
        LogFormat::Json => deusvm_common::init_logging_json(&config.logging.level)?,
    }

    info!(version = env!("CARGO_PKG_VERSION"), "Starting DeusVM daemon");

    match &config_path {
        Some(path) => info!(config_path = %path.display(), "Configuration loaded"),
        None => info!("No config file found, using CLI arguments and defaults"),
    }

    info!(
        listen = %config.api.listen_address,
        hypervisor = ?config.hypervisor.resolved_backend(),
        images = %config.storage.images_path,
        disks = %config.storage.disks_path,
        "Daemon configured"
    );

    if let Err(e) = server::run(config).await {
        error!(error = %e, "Server failed");
        return Err(e);
    }

    Ok(())
}
