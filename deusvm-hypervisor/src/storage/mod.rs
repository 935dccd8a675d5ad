//! Image repository and disk provisioning.
//!
//! The repository is a flat directory of files named exactly by the
//! sanitized image name, with no sidecar metadata:
//!
//! ```text
//! /var/lib/deusvm/images/
//!   ├── ubuntu-22.04.qcow2
//!   ├── debian-12.raw
//!   └── .alpine.qcow2.<uuid>.part   (in-flight download, never listed)
//! ```
//!
//! Writes go to a hidden temporary sibling and become visible under their
//! final name through a single rename.

mod disks;
mod images;

pub use disks::DiskProvisioner;
pub use images::ImageStore;

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::warn;

use crate::error::{HypervisorError, Result};

/// Default repository directory for base images.
pub const DEFAULT_IMAGES_PATH: &str = "/var/lib/deusvm/images";

/// Default directory for per-VM disks.
pub const DEFAULT_DISKS_PATH: &str = "/var/lib/deusvm/disks";

/// Suffix reserved for in-flight writes.
const PARTIAL_SUFFIX: &str = ".part";

/// Check that `name` can only ever address a file directly inside the repository.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(HypervisorError::InvalidRequest("image name must not be empty".to_string()));
    }
    if name == "." || name.contains("..") {
        return Err(HypervisorError::InvalidRequest(format!(
            "image name {:?} must not reference a parent directory",
            name
        )));
    }
    if name.chars().any(|c| std::path::is_separator(c) || c == '\\' || c == '\0') {
        return Err(HypervisorError::InvalidRequest(format!(
            "image name {:?} must not contain path separators",
            name
        )));
    }
    if name.ends_with(PARTIAL_SUFFIX) {
        return Err(HypervisorError::InvalidRequest(format!(
            "image name {:?} uses the reserved suffix {}",
            name, PARTIAL_SUFFIX
        )));
    }
    Ok(())
}

/// Whether a directory entry is an in-flight temporary file.
fn is_partial(file_name: &str) -> bool {
    file_name.ends_with(PARTIAL_SUFFIX)
}

/// Hidden sibling path used while `final_path` is being written.
fn partial_path(final_path: &Path) -> PathBuf {
    let file_name = final_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    final_path.with_file_name(format!(
        ".{}.{}{}",
        file_name,
        uuid::Uuid::new_v4().simple(),
        PARTIAL_SUFFIX
    ))
}

/// Final paths currently being written by this process.
#[derive(Debug, Default)]
pub(crate) struct ClaimSet {
    paths: Mutex<HashSet<PathBuf>>,
}

impl ClaimSet {
    /// Reserve `path` for writing until the returned claim is dropped.
    pub(crate) fn claim(self: &Arc<Self>, path: &Path) -> Result<Claim> {
        let mut paths = self.paths.lock().map_err(|_| HypervisorError::lock_poisoned())?;
        if !paths.insert(path.to_path_buf()) {
            return Err(HypervisorError::Conflict(format!(
                "{} is already being written",
                path.display()
            )));
        }
        Ok(Claim {
            set: self.clone(),
            path: path.to_path_buf(),
        })
    }
}

#[derive(Debug)]
pub(crate) struct Claim {
    set: Arc<ClaimSet>,
    path: PathBuf,
}

impl Drop for Claim {
    fn drop(&mut self) {
        let mut paths = self.set.paths.lock().unwrap_or_else(|e| e.into_inner());
        paths.remove(&self.path);
    }
}

/// Removes a temporary file on drop unless it was committed.
///
/// Covers early returns and futures dropped mid-write alike.
struct PartialFile {
    path: PathBuf,
    committed: bool,
}

impl PartialFile {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            committed: false,
        }
    }

    fn path(&self) -> &Path {
        &self.path
    }

    /// Rename into `final_path`; after this the file is no longer ours to remove.
    async fn commit(mut self, final_path: &Path) -> Result<()> {
        tokio::fs::rename(&self.path, final_path).await.map_err(|e| {
            HypervisorError::io(format!("rename into {}", final_path.display()), e)
        })?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for PartialFile {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %self.path.display(), error = %e, "Failed to remove temporary file");
            }
        }
    }
}
