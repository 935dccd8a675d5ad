//! # DeusVM Hypervisor
//!
//! Core of the DeusVM control plane: VM lifecycle backends and the local
//! disk image repository.
//!
//! Two lifecycle backends implement the same contract:
//! - **Simulated** - in-memory, for tests and development
//! - **Libvirt** - delegates to the virtualization control plane
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │        LifecycleManager Trait           │
//! │  (create_vm, start_vm, stop_vm, etc.)   │
//! └─────────────────────┬───────────────────┘
//!                       │
//!         ┌─────────────┴─────────────┐
//!         ▼                           ▼
//! ┌───────────────────┐     ┌───────────────────┐
//! │ SimulatedBackend  │     │  LibvirtAdapter   │
//! │    (in memory)    │     │   (via libvirt)   │
//! └───────────────────┘     └───────────────────┘
//!
//! ┌─────────────────────────────────────────┐
//! │   ImageStore ──► DiskProvisioner        │
//! │   (download, list, delete, copy)        │
//! └─────────────────────────────────────────┘
//! ```
//!
//! Every operation takes a [`tokio_util::sync::CancellationToken`] and
//! returns `Cancelled` once it observes cancellation.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use deusvm_hypervisor::{CreateVmRequest, LifecycleManager, SimulatedBackend};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() {
//!     let backend = SimulatedBackend::new();
//!     let cancel = CancellationToken::new();
//!
//!     let req = CreateVmRequest::new("web-1", 2, 2 << 30, 10 << 30, "ubuntu.qcow2");
//!     let vm = backend.create_vm(req, &cancel).await.unwrap();
//!     backend.start_vm(&vm.id, &cancel).await.unwrap();
//! }
//! ```

pub mod error;
pub mod libvirt;
pub mod simulated;
pub mod storage;
pub mod traits;
pub mod types;
mod xml;

pub use error::{ErrorKind, HypervisorError, Result};
pub use libvirt::{Connector, DomainSession, DomainState, DomainSummary, LibvirtAdapter, DEFAULT_LIBVIRT_URI};
pub use simulated::SimulatedBackend;
pub use storage::{validate_name, DiskProvisioner, ImageStore, DEFAULT_DISKS_PATH, DEFAULT_IMAGES_PATH};
pub use traits::LifecycleManager;
pub use types::*;

#[cfg(feature = "libvirt")]
pub use libvirt::VirtConnector;
