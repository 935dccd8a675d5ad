//! Configuration management for the daemon.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use deusvm_common::LogFormat;
use deusvm_hypervisor::{DEFAULT_DISKS_PATH, DEFAULT_IMAGES_PATH};

use crate::cli::Args;

/// Locations searched when no `--config` is given, in order.
pub const DEFAULT_CONFIG_PATHS: &[&str] = &["/etc/deusvm/deusvm.yaml", "./deusvm.yaml"];

/// Main configuration structure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// REST API configuration
    pub api: ApiConfig,
    /// Image and disk directories
    pub storage: StorageConfig,
    /// Lifecycle backend configuration
    pub hypervisor: HypervisorConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_yaml(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Parse configuration from YAML text.
    pub fn from_yaml(content: &str) -> Result<Self> {
        // An empty document deserializes as null, not as an empty mapping.
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }

    /// Resolve the configuration file to use.
    ///
    /// An explicit path must exist. Otherwise the default locations are
    /// tried and the first existing one wins; `None` means run on defaults.
    pub fn locate(explicit: Option<&str>) -> Result<Option<PathBuf>> {
        if let Some(path) = explicit {
            let path = PathBuf::from(path);
            if !path.exists() {
                anyhow::bail!("Config file not found: {}", path.display());
            }
            return Ok(Some(path));
        }

        Ok(DEFAULT_CONFIG_PATHS
            .iter()
            .map(PathBuf::from)
            .find(|p| p.exists()))
    }

    /// Apply CLI argument (and environment) overrides to the configuration.
    pub fn with_cli_overrides(mut self, args: &Args) -> Self {
        if let Some(ref listen) = args.listen {
            self.api.listen_address = listen.clone();
        }

        if let Some(ref token) = args.auth_token {
            self.api.auth_token = Some(token.clone());
        }

        if let Some(ref path) = args.images_path {
            self.storage.images_path = path.clone();
        }

        if let Some(ref path) = args.disks_path {
            self.storage.disks_path = path.clone();
        }

        if let Some(ref uri) = args.libvirt_uri {
            self.hypervisor.libvirt_uri = Some(uri.clone());
        }

        if let Some(ref level) = args.log_level {
            self.logging.level = level.clone();
        }

        if let Some(ref format) = args.log_format {
            self.logging.format = format.clone();
        }

        if args.dev {
            self.hypervisor.backend = Some(HypervisorBackend::Simulated);
        }

        self
    }
}

/// REST API configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Address to listen on; a bare `:port` binds all interfaces
    pub listen_address: String,
    /// Bearer token required on every request when set
    pub auth_token: Option<String>,
    /// Per-request deadline in seconds (0 disables it)
    pub request_timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen_address: ":8080".to_string(),
            auth_token: None,
            request_timeout_secs: 600,
        }
    }
}

impl ApiConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        let addr = self.listen_address.trim();
        let addr = if addr.starts_with(':') {
            format!("0.0.0.0{}", addr)
        } else {
            addr.to_string()
        };
        addr.parse()
            .with_context(|| format!("Invalid listen address: {}", self.listen_address))
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_secs > 0).then(|| Duration::from_secs(self.request_timeout_secs))
    }

    /// The configured token, ignoring empty strings.
    pub fn auth_token(&self) -> Option<&str> {
        self.auth_token.as_deref().filter(|t| !t.is_empty())
    }
}

/// Image and disk directories.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub images_path: String,
    pub disks_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            images_path: DEFAULT_IMAGES_PATH.to_string(),
            disks_path: DEFAULT_DISKS_PATH.to_string(),
        }
    }
}

/// Lifecycle backend configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct HypervisorConfig {
    /// Backend type; when unset, a libvirt URI selects libvirt
    pub backend: Option<HypervisorBackend>,
    /// Libvirt connection URI
    pub libvirt_uri: Option<String>,
}

impl HypervisorConfig {
    /// The backend to run with.
    pub fn resolved_backend(&self) -> HypervisorBackend {
        match self.backend {
            Some(backend) => backend,
            None if self.libvirt_uri().is_some() => HypervisorBackend::Libvirt,
            None => HypervisorBackend::Simulated,
        }
    }

    /// The configured URI, ignoring empty strings.
    pub fn libvirt_uri(&self) -> Option<&str> {
        self.libvirt_uri.as_deref().filter(|u| !u.trim().is_empty())
    }
}

/// Lifecycle backend type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HypervisorBackend {
    /// In-memory backend for testing/development
    Simulated,
    /// Libvirt/QEMU backend
    Libvirt,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// `pretty` or `json`
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl LoggingConfig {
    pub fn log_format(&self) -> Result<LogFormat> {
        self.format.parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.api.socket_addr().unwrap().port(), 8080);
        assert_eq!(config.storage.images_path, DEFAULT_IMAGES_PATH);
        assert_eq!(config.storage.disks_path, DEFAULT_DISKS_PATH);
        assert_eq!(config.hypervisor.resolved_backend(), HypervisorBackend::Simulated);
        assert!(config.api.auth_token().is_none());
        assert_eq!(config.logging.log_format().unwrap(), LogFormat::Pretty);
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = Config::from_yaml(
            r#"
api:
  listen_address: "127.0.0.1:9000"
  auth_token: secret
storage:
  images_path: /srv/images
logging:
  format: json
"#,
        )
        .unwrap();

        assert_eq!(config.api.socket_addr().unwrap().to_string(), "127.0.0.1:9000");
        assert_eq!(config.api.auth_token(), Some("secret"));
        assert_eq!(config.api.request_timeout_secs, 600);
        assert_eq!(config.storage.images_path, "/srv/images");
        assert_eq!(config.storage.disks_path, DEFAULT_DISKS_PATH);
        assert_eq!(config.logging.log_format().unwrap(), LogFormat::Json);
    }

    #[test]
    fn test_empty_yaml_is_default() {
        let config = Config::from_yaml("\n").unwrap();
        assert_eq!(config.api.listen_address, ":8080");
    }

    #[test]
    fn test_libvirt_uri_selects_libvirt() {
        let config = Config::from_yaml("hypervisor:\n  libvirt_uri: qemu:///system\n").unwrap();
        assert_eq!(config.hypervisor.resolved_backend(), HypervisorBackend::Libvirt);

        let config = Config::from_yaml(
            "hypervisor:\n  backend: simulated\n  libvirt_uri: qemu:///system\n",
        )
        .unwrap();
        assert_eq!(config.hypervisor.resolved_backend(), HypervisorBackend::Simulated);

        let config = Config::from_yaml("hypervisor:\n  libvirt_uri: \"\"\n").unwrap();
        assert_eq!(config.hypervisor.resolved_backend(), HypervisorBackend::Simulated);
    }

    #[test]
    fn test_cli_overrides_file() {
        let args = Args {
            listen: Some("127.0.0.1:1234".to_string()),
            images_path: Some("/tmp/images".to_string()),
            libvirt_uri: Some("qemu:///session".to_string()),
            log_level: Some("debug".to_string()),
            ..Args::default()
        };

        let config = Config::default().with_cli_overrides(&args);
        assert_eq!(config.api.listen_address, "127.0.0.1:1234");
        assert_eq!(config.storage.images_path, "/tmp/images");
        assert_eq!(config.hypervisor.resolved_backend(), HypervisorBackend::Libvirt);
        assert_eq!(config.logging.level, "debug");

        let dev = Args { dev: true, ..args };
        let config = Config::default().with_cli_overrides(&dev);
        assert_eq!(config.hypervisor.resolved_backend(), HypervisorBackend::Simulated);
    }

    #[test]
    fn test_load_file_and_locate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deusvm.yaml");
        std::fs::write(&path, "api:\n  request_timeout_secs: 0\n").unwrap();

        let located = Config::locate(Some(path.to_str().unwrap())).unwrap();
        assert_eq!(located.as_deref(), Some(path.as_path()));

        let config = Config::load(&path).unwrap();
        assert!(config.api.request_timeout().is_none());

        assert!(Config::locate(Some("/nonexistent/deusvm.yaml")).is_err());
        assert!(Config::load(dir.path().join("missing.yaml")).is_err());
    }

    #[test]
    fn test_invalid_yaml_is_an_error() {
        assert!(Config::from_yaml("api: [unclosed").is_err());
        assert!(Config::from_yaml("hypervisor:\n  backend: xen\n").is_err());
    }
}
