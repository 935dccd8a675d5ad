//! Simulated lifecycle backend for testing and local development.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use crate::error::{ensure_not_cancelled, HypervisorError, Result};
use crate::traits::LifecycleManager;
use crate::types::{CreateVmRequest, VmRecord, VmStatus};

/// In-process lifecycle backend.
///
/// Keeps VM records in memory without touching any hypervisor. Useful for:
/// - Unit and integration testing
/// - Development without libvirt installed
///
/// Nothing is persisted; all records are lost when the process exits.
pub struct SimulatedBackend {
    table: RwLock<VmTable>,
}

/// Records keyed by id, with a unique secondary index keyed by name.
#[derive(Default)]
struct VmTable {
    vms: HashMap<String, VmRecord>,
    by_name: HashMap<String, String>,
}

impl SimulatedBackend {
    /// Create a new, empty simulated backend.
    pub fn new() -> Self {
        info!("Creating simulated lifecycle backend");
        Self {
            table: RwLock::new(VmTable::default()),
        }
    }

    /// Set the status of an existing VM under the write lock.
    fn set_status(&self, id: &str, status: VmStatus) -> Result<()> {
        let mut table = self.table.write().map_err(|_| HypervisorError::lock_poisoned())?;

        let vm = table
            .vms
            .get_mut(id)
            .ok_or_else(|| HypervisorError::NotFound(format!("VM {}", id)))?;

        if vm.status == status {
            debug!(status = %status, "VM already in requested state");
            return Ok(());
        }

        vm.status = status;
        Ok(())
    }
}

impl Default for SimulatedBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LifecycleManager for SimulatedBackend {
    fn backend_name(&self) -> &'static str {
        "simulated"
    }

    #[instrument(skip(self, req, cancel), fields(vm_name = %req.name))]
    async fn create_vm(&self, req: CreateVmRequest, cancel: &CancellationToken) -> Result<VmRecord> {
        req.validate()?;
        ensure_not_cancelled(cancel, "create VM")?;

        // Name check, id allocation and both inserts share one critical section.
        let mut table = self.table.write().map_err(|_| HypervisorError::lock_poisoned())?;

        if table.by_name.contains_key(&req.name) {
            return Err(HypervisorError::Conflict(format!(
                "VM with name {:?} already exists",
                req.name
            )));
        }

        let mut id = uuid::Uuid::new_v4().to_string();
        while table.vms.contains_key(&id) {
            id = uuid::Uuid::new_v4().to_string();
        }

        let vm = VmRecord {
            id: id.clone(),
            name: req.name,
            cpu: req.cpu,
            memory_bytes: req.memory_bytes,
            disk_bytes: req.disk_bytes,
            image: req.image,
            status: VmStatus::Stopped,
            created_at: Some(chrono::Utc::now()),
        };

        table.by_name.insert(vm.name.clone(), id.clone());
        table.vms.insert(id.clone(), vm.clone());

        info!(vm_id = %id, "Simulated VM created");
        Ok(vm)
    }

    #[instrument(skip(self, cancel), fields(vm_id = %id))]
    async fn delete_vm(&self, id: &str, cancel: &CancellationToken) -> Result<()> {
        ensure_not_cancelled(cancel, "delete VM")?;

        let mut table = self.table.write().map_err(|_| HypervisorError::lock_poisoned())?;

        let vm = table
            .vms
            .remove(id)
            .ok_or_else(|| HypervisorError::NotFound(format!("VM {}", id)))?;
        table.by_name.remove(&vm.name);

        info!(vm_name = %vm.name, "Simulated VM deleted");
        Ok(())
    }

    #[instrument(skip(self, cancel), fields(vm_id = %id))]
    async fn start_vm(&self, id: &str, cancel: &CancellationToken) -> Result<()> {
        ensure_not_cancelled(cancel, "start VM")?;
        self.set_status(id, VmStatus::Running)?;
        info!("Simulated VM started");
        Ok(())
    }

    #[instrument(skip(self, cancel), fields(vm_id = %id))]
    async fn stop_vm(&self, id: &str, cancel: &CancellationToken) -> Result<()> {
        ensure_not_cancelled(cancel, "stop VM")?;
        self.set_status(id, VmStatus::Stopped)?;
        info!("Simulated VM stopped");
        Ok(())
    }

    #[instrument(skip(self, cancel), fields(vm_id = %id))]
    async fn get_vm(&self, id: &str, cancel: &CancellationToken) -> Result<VmRecord> {
        ensure_not_cancelled(cancel, "get VM")?;

        let table = self.table.read().map_err(|_| HypervisorError::lock_poisoned())?;

        table
            .vms
            .get(id)
            .cloned()
            .ok_or_else(|| HypervisorError::NotFound(format!("VM {}", id)))
    }

    async fn list_vms(&self, cancel: &CancellationToken) -> Result<Vec<VmRecord>> {
        ensure_not_cancelled(cancel, "list VMs")?;

        let table = self.table.read().map_err(|_| HypervisorError::lock_poisoned())?;
        let result: Vec<VmRecord> = table.vms.values().cloned().collect();

        debug!(count = result.len(), "Listed VMs");
        Ok(result)
    }
}
