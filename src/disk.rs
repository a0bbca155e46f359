//! Free-space gate for new conversions.
//!
//! ## Why fail open?
//!
//! The free-space query is advisory. On exotic filesystems (some container
//! overlays, network mounts) `statvfs` can fail even though writes succeed.
//! Refusing every upload in that case would take the service down for a
//! reading we cannot make, so an unreadable volume reports `u64::MAX` and the
//! failure is logged.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Source of free-space readings.
pub trait FreeSpaceProbe: Send + Sync {
    /// Bytes available to unprivileged writers on the volume holding `path`.
    fn available_bytes(&self, path: &Path) -> std::io::Result<u64>;
}

/// Production probe backed by `fs2::available_space`.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsFreeSpace;

impl FreeSpaceProbe for FsFreeSpace {
    fn available_bytes(&self, path: &Path) -> std::io::Result<u64> {
        fs2::available_space(path)
    }
}

/// Compares the free space of the storage volume against a threshold.
#[derive(Clone)]
pub struct DiskGuard {
    root: PathBuf,
    min_free_bytes: u64,
    probe: Arc<dyn FreeSpaceProbe>,
}

impl std::fmt::Debug for DiskGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiskGuard")
            .field("root", &self.root)
            .field("min_free_bytes", &self.min_free_bytes)
            .finish()
    }
}

impl DiskGuard {
    /// Guard the volume holding `root` using the filesystem probe.
    pub fn new(root: impl Into<PathBuf>, min_free_bytes: u64) -> Self {
        Self::with_probe(root, min_free_bytes, Arc::new(FsFreeSpace))
    }

    pub fn with_probe(
        root: impl Into<PathBuf>,
        min_free_bytes: u64,
        probe: Arc<dyn FreeSpaceProbe>,
    ) -> Self {
        Self {
            root: root.into(),
            min_free_bytes,
            probe,
        }
    }

    pub fn min_free_bytes(&self) -> u64 {
        self.min_free_bytes
    }

    /// Available bytes on the storage volume, or `u64::MAX` if unreadable.
    pub fn free_space(&self) -> u64 {
        // The session roots may not exist yet on a fresh install; measure the
        // nearest existing ancestor instead.
        let target = nearest_existing(&self.root);
        match self.probe.available_bytes(&target) {
            Ok(bytes) => {
                debug!(path = %target.display(), free_mb = bytes / (1024 * 1024), "Disk space check");
                bytes
            }
            Err(e) => {
                warn!(path = %target.display(), error = %e, "Could not read free disk space; assuming enough");
                u64::MAX
            }
        }
    }

    /// True when at least the configured minimum is free.
    pub fn has_enough_space(&self) -> bool {
        self.free_space() >= self.min_free_bytes
    }
}

fn nearest_existing(path: &Path) -> PathBuf {
    let mut current = path;
    loop {
        if current.exists() {
            return current.to_path_buf();
        }
        match current.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => current = parent,
            _ => return PathBuf::from("."),
        }
    }
}
