//! Libvirt-backed lifecycle adapter.
//!
//! The adapter owns no VM state. Every operation opens a fresh session to
//! the virtualization control plane, performs its calls, and closes the
//! session on return, so concurrent operations never share a connection.
//!
//! Sessions come from a [`Connector`]. The production connector talks to
//! libvirt through the `virt` crate and requires the `libvirt` feature.
//!
//! ```text
//! LifecycleManager ──► LibvirtAdapter<C: Connector>
//!                            │ open() per call
//!                            ▼
//!                     Box<dyn DomainSession> ──► libvirtd
//! ```

mod adapter;

#[cfg(feature = "libvirt")]
mod backend;

pub use adapter::LibvirtAdapter;

#[cfg(feature = "libvirt")]
pub use backend::VirtConnector;

use crate::error::Result;
use crate::types::VmStatus;

/// Default libvirt URI used when none is configured.
pub const DEFAULT_LIBVIRT_URI: &str = "qemu:///system";

/// Check if the libvirt connector is compiled in.
pub fn is_available() -> bool {
    cfg!(feature = "libvirt")
}

/// Domain run state as reported by the control plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DomainState {
    NoState,
    Running,
    Blocked,
    Paused,
    ShuttingDown,
    Shutoff,
    Crashed,
    Suspended,
}

impl DomainState {
    /// Translate into the core's coarse status.
    pub fn to_vm_status(self) -> VmStatus {
        match self {
            DomainState::Running | DomainState::Blocked => VmStatus::Running,
            DomainState::Shutoff | DomainState::Crashed => VmStatus::Stopped,
            DomainState::NoState
            | DomainState::Paused
            | DomainState::ShuttingDown
            | DomainState::Suspended => VmStatus::Unknown,
        }
    }
}

/// What the control plane can tell us about a defined domain.
///
/// Disk size, image reference and creation time are not part of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainSummary {
    pub uuid: String,
    pub name: String,
    pub state: DomainState,
    pub active: bool,
    pub vcpus: u32,
    pub memory_kib: u64,
}

/// One open connection to the control plane.
///
/// Calls block. The connection is closed when the session is dropped.
pub trait DomainSession {
    /// Define (but do not start) a domain, returning its UUID.
    fn define_domain(&mut self, xml: &str) -> Result<String>;

    /// Look a domain up by UUID string. `Ok(None)` if there is no match.
    fn lookup_by_uuid(&mut self, uuid: &str) -> Result<Option<DomainSummary>>;

    /// Look a domain up by name. `Ok(None)` if there is no match.
    fn lookup_by_name(&mut self, name: &str) -> Result<Option<DomainSummary>>;

    /// Power the domain on.
    fn start(&mut self, uuid: &str) -> Result<()>;

    /// Request a graceful (ACPI) shutdown.
    fn shutdown(&mut self, uuid: &str) -> Result<()>;

    /// Force the domain off.
    fn destroy(&mut self, uuid: &str) -> Result<()>;

    /// Remove the domain definition.
    fn undefine(&mut self, uuid: &str) -> Result<()>;

    /// All defined domains, active and inactive.
    fn list_domains(&mut self) -> Result<Vec<DomainSummary>>;
}

/// Opens sessions to the control plane.
///
/// Failing to open a session is an `Upstream` error.
pub trait Connector: Send + Sync + 'static {
    fn open(&self) -> Result<Box<dyn DomainSession>>;
}
