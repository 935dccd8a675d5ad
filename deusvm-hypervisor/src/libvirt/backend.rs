//! Libvirt connector implementation.

use tracing::{debug, warn};
use virt::connect::Connect;
use virt::domain::Domain;
use virt::error::ErrorNumber;
use virt::sys;

use super::{Connector, DomainSession, DomainState, DomainSummary};
use crate::error::{HypervisorError, Result};

/// Opens a new libvirt connection for every session.
///
/// Common URIs:
/// - `qemu:///system` - System-wide QEMU/KVM
/// - `qemu:///session` - User session QEMU
/// - `qemu+ssh://user@host/system` - Remote via SSH
pub struct VirtConnector {
    uri: String,
}

impl VirtConnector {
    /// Create a connector for `uri`. An empty URI means `qemu:///system`.
    pub fn new(uri: &str) -> Self {
        let uri = if uri.trim().is_empty() {
            super::DEFAULT_LIBVIRT_URI
        } else {
            uri
        };
        Self {
            uri: uri.to_string(),
        }
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }
}

impl Connector for VirtConnector {
    fn open(&self) -> Result<Box<dyn DomainSession>> {
        debug!(uri = %self.uri, "Opening libvirt session");

        let connection = Connect::open(Some(self.uri.as_str())).map_err(|e| {
            HypervisorError::Upstream(format!("libvirt connect {}: {}", self.uri, e))
        })?;

        Ok(Box::new(VirtSession { connection }))
    }
}

struct VirtSession {
    connection: Connect,
}

impl Drop for VirtSession {
    fn drop(&mut self) {
        if let Err(e) = self.connection.close() {
            warn!(error = %e, "Failed to close libvirt connection");
        }
    }
}

/// Convert libvirt domain state to DomainState.
fn state_from_libvirt(state: sys::virDomainState) -> DomainState {
    match state {
        sys::VIR_DOMAIN_RUNNING => DomainState::Running,
        sys::VIR_DOMAIN_BLOCKED => DomainState::Blocked,
        sys::VIR_DOMAIN_PAUSED => DomainState::Paused,
        sys::VIR_DOMAIN_SHUTDOWN => DomainState::ShuttingDown,
        sys::VIR_DOMAIN_SHUTOFF => DomainState::Shutoff,
        sys::VIR_DOMAIN_CRASHED => DomainState::Crashed,
        sys::VIR_DOMAIN_PMSUSPENDED => DomainState::Suspended,
        _ => DomainState::NoState,
    }
}

fn upstream(what: &str, e: virt::error::Error) -> HypervisorError {
    HypervisorError::Upstream(format!("{}: {}", what, e))
}

/// Whether a lookup failed because the domain does not exist.
///
/// A string that does not parse as a UUID is rejected with `InvalidArg`
/// before libvirtd is consulted, which also means no such domain.
fn is_missing_domain(code: ErrorNumber) -> bool {
    matches!(code, ErrorNumber::NoDomain | ErrorNumber::InvalidArg)
}

fn lookup_result(
    what: &str,
    result: std::result::Result<Domain, virt::error::Error>,
) -> Result<Option<Domain>> {
    match result {
        Ok(domain) => Ok(Some(domain)),
        Err(e) if is_missing_domain(e.code()) => Ok(None),
        Err(e) => Err(upstream(what, e)),
    }
}

fn summarize(domain: &Domain) -> Result<DomainSummary> {
    let uuid = domain.get_uuid_string().map_err(|e| upstream("get uuid", e))?;
    let name = domain.get_name().map_err(|e| upstream("get name", e))?;
    let info = domain.get_info().map_err(|e| upstream("get info", e))?;
    let active = domain.is_active().map_err(|e| upstream("is active", e))?;

    Ok(DomainSummary {
        uuid,
        name,
        state: state_from_libvirt(info.state),
        active,
        vcpus: info.nr_virt_cpu,
        memory_kib: info.memory,
    })
}

impl VirtSession {
    fn domain(&self, uuid: &str) -> Result<Domain> {
        lookup_result("lookup domain", Domain::lookup_by_uuid_string(&self.connection, uuid))?
            .ok_or_else(|| HypervisorError::NotFound(format!("VM {}", uuid)))
    }
}

impl DomainSession for VirtSession {
    fn define_domain(&mut self, xml: &str) -> Result<String> {
        let domain = Domain::define_xml(&self.connection, xml)
            .map_err(|e| upstream("define domain", e))?;

        domain.get_uuid_string().map_err(|e| upstream("get uuid", e))
    }

    fn lookup_by_uuid(&mut self, uuid: &str) -> Result<Option<DomainSummary>> {
        lookup_result("lookup by uuid", Domain::lookup_by_uuid_string(&self.connection, uuid))?
            .map(|domain| summarize(&domain))
            .transpose()
    }

    fn lookup_by_name(&mut self, name: &str) -> Result<Option<DomainSummary>> {
        lookup_result("lookup by name", Domain::lookup_by_name(&self.connection, name))?
            .map(|domain| summarize(&domain))
            .transpose()
    }

    fn start(&mut self, uuid: &str) -> Result<()> {
        self.domain(uuid)?
            .create()
            .map_err(|e| upstream("start", e))?;
        Ok(())
    }

    fn shutdown(&mut self, uuid: &str) -> Result<()> {
        self.domain(uuid)?
            .shutdown()
            .map_err(|e| upstream("shutdown", e))?;
        Ok(())
    }

    fn destroy(&mut self, uuid: &str) -> Result<()> {
        self.domain(uuid)?
            .destroy()
            .map_err(|e| upstream("destroy", e))
    }

    fn undefine(&mut self, uuid: &str) -> Result<()> {
        self.domain(uuid)?
            .undefine()
            .map_err(|e| upstream("undefine", e))
    }

    fn list_domains(&mut self) -> Result<Vec<DomainSummary>> {
        let flags = sys::VIR_CONNECT_LIST_DOMAINS_ACTIVE | sys::VIR_CONNECT_LIST_DOMAINS_INACTIVE;

        let domains = self
            .connection
            .list_all_domains(flags)
            .map_err(|e| upstream("list domains", e))?;

        domains.iter().map(summarize).collect()
    }
}
