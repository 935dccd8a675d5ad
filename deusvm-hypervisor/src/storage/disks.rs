//! Per-VM disk provisioning from repository images.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::{self, File};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use super::{partial_path, validate_name, ClaimSet, PartialFile};
use crate::error::{ensure_not_cancelled, HypervisorError, Result};

const COPY_CHUNK_SIZE: usize = 1024 * 1024;

/// Copies base images into a disks directory.
///
/// Obtained from [`crate::ImageStore::disk_provisioner`].
pub struct DiskProvisioner {
    images_dir: PathBuf,
    disks_dir: PathBuf,
    claims: Arc<ClaimSet>,
}

impl DiskProvisioner {
    pub(crate) fn new(images_dir: PathBuf, disks_dir: PathBuf, claims: Arc<ClaimSet>) -> Result<Self> {
        if disks_dir.as_os_str().is_empty() {
            return Err(HypervisorError::InvalidRequest(
                "disks directory is required".to_string(),
            ));
        }
        std::fs::create_dir_all(&disks_dir).map_err(|e| {
            HypervisorError::io(format!("create disks directory {}", disks_dir.display()), e)
        })?;

        Ok(Self {
            images_dir,
            disks_dir,
            claims,
        })
    }

    /// The directory disks are written to.
    pub fn disks_dir(&self) -> &Path {
        &self.disks_dir
    }

    /// Copy image `base_name` into a new disk named `disk_name`.
    ///
    /// The copy is a full byte copy; `size_bytes` is recorded but the disk
    /// is not resized. An existing disk is never overwritten.
    #[instrument(skip(self, cancel), fields(base = %base_name, disk = %disk_name))]
    pub async fn create_disk_from_base(
        &self,
        base_name: &str,
        disk_name: &str,
        size_bytes: u64,
        cancel: &CancellationToken,
    ) -> Result<PathBuf> {
        validate_name(base_name)?;
        validate_name(disk_name)?;

        let base_path = self.images_dir.join(base_name);
        let disk_path = self.disks_dir.join(disk_name);
        if base_path == disk_path {
            return Err(HypervisorError::InvalidRequest(format!(
                "disk {} would overwrite its base image",
                disk_name
            )));
        }

        let _claim = self.claims.claim(&disk_path)?;
        ensure_not_cancelled(cancel, "create disk")?;

        if fs::try_exists(&disk_path).await.map_err(|e| {
            HypervisorError::io(format!("stat {}", disk_path.display()), e)
        })? {
            return Err(HypervisorError::Conflict(format!("disk {} already exists", disk_name)));
        }

        let mut source = File::open(&base_path).await.map_err(|e| {
            HypervisorError::io_or_not_found(format!("open base image {}", base_name), e)
        })?;

        info!(size_bytes, "Creating disk from base image");

        let partial = PartialFile::new(partial_path(&disk_path));
        let mut target = File::create(partial.path()).await.map_err(|e| {
            HypervisorError::io(format!("create {}", partial.path().display()), e)
        })?;

        let mut buf = vec![0u8; COPY_CHUNK_SIZE];
        let mut copied: u64 = 0;
        loop {
            ensure_not_cancelled(cancel, "create disk")?;

            let n = source.read(&mut buf).await.map_err(|e| {
                HypervisorError::io(format!("read {}", base_path.display()), e)
            })?;
            if n == 0 {
                break;
            }
            target.write_all(&buf[..n]).await.map_err(|e| {
                HypervisorError::io(format!("write {}", partial.path().display()), e)
            })?;
            copied += n as u64;
        }

        target.flush().await.map_err(|e| {
            HypervisorError::io(format!("flush {}", partial.path().display()), e)
        })?;
        target.sync_all().await.map_err(|e| {
            HypervisorError::io(format!("sync {}", partial.path().display()), e)
        })?;
        drop(target);

        ensure_not_cancelled(cancel, "create disk")?;
        partial.commit(&disk_path).await?;

        debug!(copied, "Disk copy complete");
        info!(path = %disk_path.display(), "Disk created");
        Ok(disk_path)
    }
}
