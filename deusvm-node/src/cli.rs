//! Command-line argument parsing.

use clap::Parser;

/// DeusVM daemon - VM lifecycle and image repository over REST
#[derive(Parser, Debug, Default)]
#[command(name = "deusvm")]
#[command(about = "DeusVM daemon - VM lifecycle and image repository over REST")]
#[command(version)]
pub struct Args {
    /// Path to configuration file (optional, defaults used if not found)
    #[arg(short, long, env = "DEUSVM_CONFIG")]
    pub config: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, env = "DEUSVM_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Log format (pretty, json)
    #[arg(long, env = "DEUSVM_LOG_FORMAT")]
    pub log_format: Option<String>,

    /// Listen address for the REST API
    #[arg(long, env = "DEUSVM_API_LISTEN_ADDRESS")]
    pub listen: Option<String>,

    /// Bearer token required on every API request
    #[arg(long, env = "DEUSVM_API_AUTH_TOKEN", hide_env_values = true)]
    pub auth_token: Option<String>,

    /// Directory holding base images
    #[arg(long, env = "DEUSVM_STORAGE_IMAGES_PATH")]
    pub images_path: Option<String>,

    /// Directory holding per-VM disks
    #[arg(long, env = "DEUSVM_STORAGE_DISKS_PATH")]
    pub disks_path: Option<String>,

    /// Libvirt connection URI; setting it selects the libvirt backend
    #[arg(long, env = "LIBVIRT_ADDR")]
    pub libvirt_uri: Option<String>,

    /// Use the in-memory simulated backend regardless of configuration
    #[arg(long)]
    pub dev: bool,
}
