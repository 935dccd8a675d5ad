//! Image repository backed by a local directory.

use futures::StreamExt;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::{is_partial, partial_path, validate_name, ClaimSet, DiskProvisioner, PartialFile};
use crate::error::{ensure_not_cancelled, HypervisorError, Result};
use crate::types::{ImageFormat, ImageRecord};

/// Downloads, lists and deletes base images in a repository directory.
///
/// The store is the only writer of its directory. A name present in the
/// directory always refers to a completely written artifact.
pub struct ImageStore {
    images_dir: PathBuf,
    client: reqwest::Client,
    claims: Arc<ClaimSet>,
}

impl ImageStore {
    /// Open (creating if needed) the repository at `images_dir`.
    pub fn new(images_dir: impl Into<PathBuf>) -> Result<Self> {
        let images_dir = images_dir.into();
        if images_dir.as_os_str().is_empty() {
            return Err(HypervisorError::InvalidRequest(
                "images directory is required".to_string(),
            ));
        }

        std::fs::create_dir_all(&images_dir).map_err(|e| {
            HypervisorError::io(format!("create images directory {}", images_dir.display()), e)
        })?;

        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| HypervisorError::Internal(format!("HTTP client: {}", e)))?;

        info!(path = %images_dir.display(), "Image repository ready");

        Ok(Self {
            images_dir,
            client,
            claims: Arc::new(ClaimSet::default()),
        })
    }

    /// The repository directory.
    pub fn images_dir(&self) -> &Path {
        &self.images_dir
    }

    /// Resolve a validated image name to its location in the repository.
    pub fn image_path(&self, name: &str) -> Result<PathBuf> {
        validate_name(name)?;
        Ok(self.images_dir.join(name))
    }

    /// Create a provisioner that copies images from this repository into `disks_dir`.
    ///
    /// The provisioner shares this store's write claims, so a disk and an
    /// image can never be written under the same path at once.
    pub fn disk_provisioner(&self, disks_dir: impl Into<PathBuf>) -> Result<DiskProvisioner> {
        DiskProvisioner::new(self.images_dir.clone(), disks_dir.into(), self.claims.clone())
    }

    /// Stream `source_url` into the repository under `name`.
    ///
    /// The body is hashed while it is written, so the network stream is read
    /// exactly once. Nothing appears under `name` until the file is complete
    /// and synced; any failure or cancellation removes the temporary file.
    #[instrument(skip(self, cancel), fields(image = %name))]
    pub async fn save_image_from_url(
        &self,
        name: &str,
        source_url: &str,
        cancel: &CancellationToken,
    ) -> Result<ImageRecord> {
        let path = self.image_path(name)?;
        let url = reqwest::Url::parse(source_url).map_err(|e| {
            HypervisorError::InvalidRequest(format!("invalid source URL {:?}: {}", source_url, e))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(HypervisorError::InvalidRequest(format!(
                "unsupported source URL scheme {:?}",
                url.scheme()
            )));
        }

        let _claim = self.claims.claim(&path)?;
        ensure_not_cancelled(cancel, "download image")?;

        info!(url = %url, "Downloading image");

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(HypervisorError::Cancelled("download image".to_string()));
            }
            response = self.client.get(url.clone()).send() => response
                .map_err(|e| HypervisorError::Upstream(format!("download {}: {}", url, e)))?,
        };

        let status = response.status();
        if !status.is_success() {
            return Err(HypervisorError::Upstream(format!(
                "download {}: server returned {}",
                url, status
            )));
        }

        let partial = PartialFile::new(partial_path(&path));
        let mut file = File::create(partial.path()).await.map_err(|e| {
            HypervisorError::io(format!("create {}", partial.path().display()), e)
        })?;

        let mut hasher = Sha256::new();
        let mut size_bytes: u64 = 0;
        let mut stream = response.bytes_stream();

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    warn!(received = size_bytes, "Download cancelled");
                    return Err(HypervisorError::Cancelled("download image".to_string()));
                }
                next = stream.next() => next,
            };

            let Some(chunk) = next else { break };
            let chunk = chunk.map_err(|e| {
                HypervisorError::Upstream(format!("read body of {}: {}", url, e))
            })?;

            hasher.update(&chunk);
            file.write_all(&chunk).await.map_err(|e| {
                HypervisorError::io(format!("write {}", partial.path().display()), e)
            })?;
            size_bytes += chunk.len() as u64;
        }

        file.flush().await.map_err(|e| {
            HypervisorError::io(format!("flush {}", partial.path().display()), e)
        })?;
        file.sync_all().await.map_err(|e| {
            HypervisorError::io(format!("sync {}", partial.path().display()), e)
        })?;
        drop(file);

        ensure_not_cancelled(cancel, "download image")?;
        partial.commit(&path).await?;

        let sha256 = hex::encode(hasher.finalize());
        info!(size_bytes, sha256 = %sha256, "Image saved");

        Ok(ImageRecord {
            name: name.to_string(),
            path: path.display().to_string(),
            size_bytes,
            format: ImageFormat::from_name(name),
            sha256,
        })
    }

    /// List the regular files in the repository.
    ///
    /// Digests are not recomputed, so every listed record has an empty `sha256`.
    #[instrument(skip(self, cancel))]
    pub async fn list_images(&self, cancel: &CancellationToken) -> Result<Vec<ImageRecord>> {
        ensure_not_cancelled(cancel, "list images")?;

        let mut entries = fs::read_dir(&self.images_dir).await.map_err(|e| {
            HypervisorError::io(format!("read directory {}", self.images_dir.display()), e)
        })?;

        let mut images = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| {
            HypervisorError::io(format!("read directory {}", self.images_dir.display()), e)
        })? {
            ensure_not_cancelled(cancel, "list images")?;

            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                warn!(entry = ?entry.file_name(), "Skipping non UTF-8 file name");
                continue;
            };
            if is_partial(&name) {
                continue;
            }

            let metadata = match entry.metadata().await {
                Ok(metadata) => metadata,
                // Removed between enumeration and stat.
                Err(e) => {
                    debug!(image = %name, error = %e, "Skipping unreadable entry");
                    continue;
                }
            };
            if !metadata.is_file() {
                continue;
            }

            images.push(ImageRecord {
                path: entry.path().display().to_string(),
                size_bytes: metadata.len(),
                format: ImageFormat::from_name(&name),
                sha256: String::new(),
                name,
            });
        }

        images.sort_by(|a, b| a.name.cmp(&b.name));
        debug!(count = images.len(), "Listed images");
        Ok(images)
    }

    /// Remove an image from the repository.
    #[instrument(skip(self, cancel), fields(image = %name))]
    pub async fn delete_image(&self, name: &str, cancel: &CancellationToken) -> Result<()> {
        let path = self.image_path(name)?;
        ensure_not_cancelled(cancel, "delete image")?;

        fs::remove_file(&path).await.map_err(|e| {
            HypervisorError::io_or_not_found(format!("remove image {}", name), e)
        })?;

        info!("Image deleted");
        Ok(())
    }
}
