//! Core VM lifecycle abstraction trait.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::types::{CreateVmRequest, VmRecord};

/// VM lifecycle contract.
///
/// Implemented by the in-process [`SimulatedBackend`](crate::SimulatedBackend)
/// and the libvirt-backed [`LibvirtAdapter`](crate::LibvirtAdapter). Callers
/// hold an `Arc<dyn LifecycleManager>` and never inspect which one is active.
///
/// Every operation takes a cancellation token. A call whose token fires
/// returns [`HypervisorError::Cancelled`](crate::HypervisorError::Cancelled)
/// without leaving a partially applied mutation behind.
///
/// `start_vm` on a running VM and `stop_vm` on a stopped VM succeed without
/// doing anything.
#[async_trait]
pub trait LifecycleManager: Send + Sync {
    /// Short backend name used in logs and health output.
    fn backend_name(&self) -> &'static str;

    /// Create (define) a new VM. The VM is not started.
    async fn create_vm(&self, req: CreateVmRequest, cancel: &CancellationToken) -> Result<VmRecord>;

    /// Delete a VM, powering it off first if necessary.
    async fn delete_vm(&self, id: &str, cancel: &CancellationToken) -> Result<()>;

    /// Power a VM on.
    async fn start_vm(&self, id: &str, cancel: &CancellationToken) -> Result<()>;

    /// Power a VM off.
    async fn stop_vm(&self, id: &str, cancel: &CancellationToken) -> Result<()>;

    /// Get a snapshot of one VM.
    async fn get_vm(&self, id: &str, cancel: &CancellationToken) -> Result<VmRecord>;

    /// List all VMs. Order is not significant.
    async fn list_vms(&self, cancel: &CancellationToken) -> Result<Vec<VmRecord>>;
}
