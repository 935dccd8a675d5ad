//! Lifecycle operations translated into control plane sessions.

use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::{Connector, DomainSession, DomainSummary};
use crate::error::{ensure_not_cancelled, HypervisorError, Result};
use crate::traits::LifecycleManager;
use crate::types::{CreateVmRequest, VmRecord, VmStatus};
use crate::xml::DomainXmlBuilder;

/// Lifecycle backend that delegates every VM to the virtualization control plane.
///
/// Records returned by `get_vm` and `list_vms` carry zero disk size, an empty
/// image reference and no creation time: the control plane does not keep them.
///
/// Two concurrent calls against the same VM race on the control plane's own
/// semantics. Name uniqueness on create is checked, then defined, in separate
/// steps of the same session.
pub struct LibvirtAdapter<C: Connector> {
    connector: Arc<C>,
}

impl<C: Connector> LibvirtAdapter<C> {
    /// Create an adapter that opens sessions through `connector`.
    pub fn new(connector: C) -> Self {
        Self {
            connector: Arc::new(connector),
        }
    }

    /// Run `f` against a fresh session on the blocking pool.
    ///
    /// The session is opened and dropped inside the blocking task. If the
    /// token fires first the call returns `Cancelled` right away. The task
    /// re-checks the token once the session is open, and `f` re-checks it
    /// before every mutating call, so at most the primitive already in
    /// flight completes after cancellation.
    async fn with_session<T, F>(
        &self,
        operation: &'static str,
        cancel: &CancellationToken,
        f: F,
    ) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut dyn DomainSession, &CancellationToken) -> Result<T> + Send + 'static,
    {
        ensure_not_cancelled(cancel, operation)?;

        let connector = self.connector.clone();
        let task_cancel = cancel.clone();
        let task = tokio::task::spawn_blocking(move || {
            let mut session = connector.open()?;
            ensure_not_cancelled(&task_cancel, operation)?;
            f(session.as_mut(), &task_cancel)
        });

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                warn!(operation, "Cancelled while waiting on the control plane");
                Err(HypervisorError::Cancelled(operation.to_string()))
            }
            joined = task => joined.map_err(|e| {
                HypervisorError::Internal(format!("{} session task failed: {}", operation, e))
            })?,
        }
    }
}

/// Find a domain by UUID, falling back to its name.
fn resolve(session: &mut dyn DomainSession, id: &str) -> Result<DomainSummary> {
    if let Some(domain) = session.lookup_by_uuid(id)? {
        return Ok(domain);
    }
    session
        .lookup_by_name(id)?
        .ok_or_else(|| HypervisorError::NotFound(format!("VM {}", id)))
}

fn record_from_domain(domain: DomainSummary) -> VmRecord {
    VmRecord {
        id: domain.uuid,
        name: domain.name,
        cpu: domain.vcpus,
        memory_bytes: domain.memory_kib * 1024,
        disk_bytes: 0,
        image: String::new(),
        status: domain.state.to_vm_status(),
        created_at: None,
    }
}

#[async_trait]
impl<C: Connector> LifecycleManager for LibvirtAdapter<C> {
    fn backend_name(&self) -> &'static str {
        "libvirt"
    }

    #[instrument(skip(self, req, cancel), fields(vm_name = %req.name))]
    async fn create_vm(&self, req: CreateVmRequest, cancel: &CancellationToken) -> Result<VmRecord> {
        req.validate()?;
        if req.image.trim().is_empty() {
            return Err(HypervisorError::InvalidRequest(
                "image must not be empty".to_string(),
            ));
        }

        let xml = DomainXmlBuilder::new(&req).build();
        debug!(xml = %xml, "Generated domain XML");

        let name = req.name.clone();
        let uuid = self
            .with_session("create VM", cancel, move |session, cancel| {
                if session.lookup_by_name(&name)?.is_some() {
                    return Err(HypervisorError::Conflict(format!(
                        "VM with name {:?} already exists",
                        name
                    )));
                }
                ensure_not_cancelled(cancel, "create VM")?;
                session.define_domain(&xml)
            })
            .await?;

        info!(vm_id = %uuid, "Domain defined");

        Ok(VmRecord {
            id: uuid,
            name: req.name,
            cpu: req.cpu,
            memory_bytes: req.memory_bytes,
            disk_bytes: req.disk_bytes,
            image: req.image,
            status: VmStatus::Stopped,
            created_at: Some(chrono::Utc::now()),
        })
    }

    #[instrument(skip(self, cancel), fields(vm_id = %id))]
    async fn delete_vm(&self, id: &str, cancel: &CancellationToken) -> Result<()> {
        let id = id.to_string();
        self.with_session("delete VM", cancel, move |session, cancel| {
            let domain = resolve(session, &id)?;
            if domain.active {
                ensure_not_cancelled(cancel, "delete VM")?;
                info!(vm_id = %domain.uuid, "Forcing domain off before undefine");
                session.destroy(&domain.uuid)?;
            }
            ensure_not_cancelled(cancel, "delete VM")?;
            session.undefine(&domain.uuid)
        })
        .await?;

        info!("Domain undefined");
        Ok(())
    }

    #[instrument(skip(self, cancel), fields(vm_id = %id))]
    async fn start_vm(&self, id: &str, cancel: &CancellationToken) -> Result<()> {
        let id = id.to_string();
        self.with_session("start VM", cancel, move |session, cancel| {
            let domain = resolve(session, &id)?;
            if domain.active {
                debug!("Domain already active");
                return Ok(());
            }
            ensure_not_cancelled(cancel, "start VM")?;
            session.start(&domain.uuid)
        })
        .await?;

        info!("Domain started");
        Ok(())
    }

    #[instrument(skip(self, cancel), fields(vm_id = %id))]
    async fn stop_vm(&self, id: &str, cancel: &CancellationToken) -> Result<()> {
        let id = id.to_string();
        self.with_session("stop VM", cancel, move |session, cancel| {
            let domain = resolve(session, &id)?;
            if !domain.active {
                debug!("Domain already inactive");
                return Ok(());
            }
            ensure_not_cancelled(cancel, "stop VM")?;
            session.shutdown(&domain.uuid)
        })
        .await?;

        info!("Graceful shutdown requested");
        Ok(())
    }

    #[instrument(skip(self, cancel), fields(vm_id = %id))]
    async fn get_vm(&self, id: &str, cancel: &CancellationToken) -> Result<VmRecord> {
        let id = id.to_string();
        let domain = self
            .with_session("get VM", cancel, move |session, _| resolve(session, &id))
            .await?;

        Ok(record_from_domain(domain))
    }

    #[instrument(skip(self, cancel))]
    async fn list_vms(&self, cancel: &CancellationToken) -> Result<Vec<VmRecord>> {
        let domains = self
            .with_session("list VMs", cancel, |session, _| session.list_domains())
            .await?;

        let vms: Vec<VmRecord> = domains.into_iter().map(record_from_domain).collect();
        debug!(count = vms.len(), "Listed VMs");
        Ok(vms)
    }
}
