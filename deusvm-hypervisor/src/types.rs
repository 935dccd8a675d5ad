//! Type definitions for VM records and image records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{HypervisorError, Result};

// =============================================================================
// VIRTUAL MACHINES
// =============================================================================

/// Power status of a VM as seen by the control plane core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VmStatus {
    Unknown,
    Stopped,
    Running,
}

impl VmStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VmStatus::Unknown => "unknown",
            VmStatus::Stopped => "stopped",
            VmStatus::Running => "running",
        }
    }
}

impl std::fmt::Display for VmStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of a VM's identity, sizing and status.
///
/// Records are always returned by value; backends never hand out references
/// into their own state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmRecord {
    /// Backend-assigned identifier
    pub id: String,
    /// Caller-chosen name, unique among live VMs of one backend
    pub name: String,
    /// vCPU count
    pub cpu: u32,
    /// Memory size in bytes
    pub memory_bytes: u64,
    /// Disk size in bytes (advisory; zero when the backend cannot report it)
    pub disk_bytes: u64,
    /// Opaque image reference (empty when the backend cannot report it)
    pub image: String,
    /// Current status
    pub status: VmStatus,
    /// Creation time (absent when the backend cannot report it)
    pub created_at: Option<DateTime<Utc>>,
}

/// Parameters for creating a VM.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateVmRequest {
    pub name: String,
    pub cpu: u32,
    pub memory_bytes: u64,
    pub disk_bytes: u64,
    pub image: String,
}

impl CreateVmRequest {
    /// Create a request with the given name, image and sizing.
    pub fn new(
        name: impl Into<String>,
        cpu: u32,
        memory_bytes: u64,
        disk_bytes: u64,
        image: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            cpu,
            memory_bytes,
            disk_bytes,
            image: image.into(),
        }
    }

    /// Check the constraints every backend enforces before mutating anything.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(HypervisorError::InvalidRequest("name must not be empty".to_string()));
        }
        if self.cpu == 0 {
            return Err(HypervisorError::InvalidRequest("cpu must be positive".to_string()));
        }
        if self.memory_bytes == 0 {
            return Err(HypervisorError::InvalidRequest("memory must be positive".to_string()));
        }
        // Domain memory is declared in whole KiB.
        if self.memory_bytes < 1024 {
            return Err(HypervisorError::InvalidRequest(
                "memory must be at least 1 KiB".to_string(),
            ));
        }
        if self.disk_bytes == 0 {
            return Err(HypervisorError::InvalidRequest("disk must be positive".to_string()));
        }
        Ok(())
    }
}

// =============================================================================
// IMAGES
// =============================================================================

/// Disk image format, guessed from the file name suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Qcow2,
    Raw,
    Unknown,
}

impl ImageFormat {
    /// Detect the format from a file name (case-insensitive suffix match).
    pub fn from_name(name: &str) -> Self {
        let lower = name.to_ascii_lowercase();
        if lower.ends_with(".qcow2") {
            ImageFormat::Qcow2
        } else if lower.ends_with(".raw") {
            ImageFormat::Raw
        } else {
            ImageFormat::Unknown
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ImageFormat::Qcow2 => "qcow2",
            ImageFormat::Raw => "raw",
            ImageFormat::Unknown => "unknown",
        }
    }
}

/// A named artifact in the image repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRecord {
    /// Sanitized file name, the artifact's identity on disk
    pub name: String,
    /// Location inside the repository directory
    pub path: String,
    /// Size in bytes
    pub size_bytes: u64,
    /// Format guessed from the name
    pub format: ImageFormat,
    /// Hex SHA-256 of the content; empty for listed (not freshly acquired) entries
    pub sha256: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_detection() {
        assert_eq!(ImageFormat::from_name("ubuntu.qcow2"), ImageFormat::Qcow2);
        assert_eq!(ImageFormat::from_name("UBUNTU.QCOW2"), ImageFormat::Qcow2);
        assert_eq!(ImageFormat::from_name("disk.raw"), ImageFormat::Raw);
        assert_eq!(ImageFormat::from_name("debian.img"), ImageFormat::Unknown);
        assert_eq!(ImageFormat::from_name("qcow2"), ImageFormat::Unknown);
    }

    #[test]
    fn test_request_validation() {
        let ok = CreateVmRequest::new("web", 2, 1 << 30, 10 << 30, "ubuntu.qcow2");
        assert!(ok.validate().is_ok());

        let cases = [
            CreateVmRequest::new("", 2, 1 << 30, 10 << 30, "x"),
            CreateVmRequest::new("web", 0, 1 << 30, 10 << 30, "x"),
            CreateVmRequest::new("web", 2, 0, 10 << 30, "x"),
            CreateVmRequest::new("web", 2, 512, 10 << 30, "x"),
            CreateVmRequest::new("web", 2, 1023, 10 << 30, "x"),
            CreateVmRequest::new("web", 2, 1 << 30, 0, "x"),
        ];
        for req in cases {
            let err = req.validate().unwrap_err();
            assert!(matches!(err, HypervisorError::InvalidRequest(_)), "{:?}", req);
        }
    }

    #[test]
    fn test_one_kib_of_memory_is_accepted() {
        let req = CreateVmRequest::new("tiny", 1, 1024, 1, "x");
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let json = serde_json::to_string(&VmStatus::Running).unwrap();
        assert_eq!(json, "\"running\"");
    }
}
