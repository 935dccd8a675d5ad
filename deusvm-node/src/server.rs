//! Daemon wiring: backend selection, storage, signal handling and the API server.

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use deusvm_hypervisor::{libvirt, ImageStore, LifecycleManager, SimulatedBackend};

use crate::config::{Config, HypervisorBackend};
use crate::http_server::{run_http_server, AppState};

/// Build the lifecycle backend named by the configuration.
///
/// Falls back to the simulated backend when libvirt is requested but not
/// compiled in, or when the control plane cannot be reached at startup.
pub async fn build_lifecycle(config: &Config) -> Arc<dyn LifecycleManager> {
    info!(libvirt_compiled = libvirt::is_available(), "Selecting lifecycle backend");
    match config.hypervisor.resolved_backend() {
        HypervisorBackend::Simulated => {
            info!("Using simulated lifecycle backend");
            Arc::new(SimulatedBackend::new())
        }
        HypervisorBackend::Libvirt => {
            #[cfg(feature = "libvirt")]
            {
                use deusvm_hypervisor::{LibvirtAdapter, VirtConnector, DEFAULT_LIBVIRT_URI};

                let connector = VirtConnector::new(
                    config.hypervisor.libvirt_uri().unwrap_or(DEFAULT_LIBVIRT_URI),
                );
                let uri = connector.uri().to_string();
                info!(uri = %uri, "Using libvirt lifecycle backend");
                let adapter: Arc<dyn LifecycleManager> = Arc::new(LibvirtAdapter::new(connector));

                match adapter.list_vms(&CancellationToken::new()).await {
                    Ok(vms) => {
                        info!(domains = vms.len(), "Connected to libvirt");
                        adapter
                    }
                    Err(e) => {
                        warn!(uri = %uri, error = %e, "Failed to reach libvirt, falling back to simulated backend");
                        Arc::new(SimulatedBackend::new())
                    }
                }
            }
            #[cfg(not(feature = "libvirt"))]
            {
                warn!("Libvirt backend requested but not compiled in, falling back to simulated backend");
                Arc::new(SimulatedBackend::new())
            }
        }
    }
}

/// Run the daemon until SIGINT or SIGTERM.
pub async fn run(config: Config) -> Result<()> {
    let lifecycle = build_lifecycle(&config).await;

    let images = ImageStore::new(&config.storage.images_path)
        .with_context(|| format!("Failed to open image repository {}", config.storage.images_path))?;
    let disks = images
        .disk_provisioner(&config.storage.disks_path)
        .with_context(|| format!("Failed to open disks directory {}", config.storage.disks_path))?;

    let addr = config.api.socket_addr()?;
    let shutdown = CancellationToken::new();

    if config.api.auth_token().is_some() {
        info!("Bearer token authentication enabled");
    } else {
        warn!("No API auth token configured, API is unauthenticated");
    }

    let state = Arc::new(AppState {
        lifecycle,
        images: Arc::new(images),
        disks: Arc::new(disks),
        shutdown: shutdown.clone(),
        request_timeout: config.api.request_timeout(),
        auth_token: config.api.auth_token().map(str::to_string),
    });

    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = wait_for_shutdown_signal().await {
            error!(error = %e, "Failed to install signal handlers");
            return;
        }
        info!("Shutting down");
        signal_token.cancel();
    });

    run_http_server(addr, state).await
}

/// Wait for shutdown signal (SIGTERM, SIGINT, or Ctrl+C)
async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C");
    }

    Ok(())
}
