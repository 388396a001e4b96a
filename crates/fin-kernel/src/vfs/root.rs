//! Root: the mount table and the entry point for every filesystem call.
//!
//! Devices are grafted into one tree at mount points:
//!
//! ```text
//! /            # root device (tmpfs or a drive)
//! ├── /dev/    # DevDevice: lists devices, source for `mount`
//! └── /tmp/    # another tmpfs
//! ```
//!
//! A path is resolved by picking the longest mount point that is a
//! component-wise prefix of it; the remainder goes to that device. Mount
//! points are unique, so there are never two candidates of the same length.
//!
//! Ancestors of mount points are always directories, even when no device
//! covers them (for example `/` before a root device is mounted).

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, PoisonError, RwLock};

use super::device::{Device, same_device};
use super::node::Node;
use super::path::VfsPath;
use super::stream::{FileMode, FileStream};
use crate::error::{FsError, FsResult};

/// A mounted device as listed by [`Root::mounts`].
#[derive(Debug, Clone)]
pub struct MountInfo {
    pub path: VfsPath,
    pub device_type: String,
    pub read_only: bool,
}

/// The device responsible for a path.
#[derive(Debug, Clone)]
pub struct Resolved {
    pub device: Arc<dyn Device>,
    pub mount_point: VfsPath,
    /// The path as the device sees it.
    pub relative: VfsPath,
}

/// Mount table plus path routing.
#[derive(Debug, Default)]
pub struct Root {
    mounts: RwLock<MountTable>,
}

impl Root {
    /// Create an empty root with nothing mounted.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mount a device instance at `mount_point`.
    ///
    /// Re-mounting at an identical point is rejected, not merged.
    pub fn mount_device(&self, device: Arc<dyn Device>, mount_point: &str) -> FsResult<()> {
        let point = VfsPath::parse(mount_point)?;
        let mut mounts = self.mounts.write().unwrap_or_else(PoisonError::into_inner);
        if mounts.contains_key(&point) {
            return Err(FsError::AlreadyMounted(point.to_string()));
        }
        tracing::debug!(path = %point, kind = device.type_tag(), "vfs.mount");
        mounts.insert(point, device);
        Ok(())
    }

    /// Mount the device found at `device_path` (typically `/dev/<name>`).
    pub fn mount(&self, device_path: &str, mount_point: &str) -> FsResult<()> {
        match self.get(device_path)? {
            Node::Device(device) => self.mount_device(device, mount_point),
            _ => Err(FsError::NotMountable(VfsPath::parse(device_path)?.to_string())),
        }
    }

    /// Remove the mount at exactly `mount_point`.
    ///
    /// Refused with [`FsError::Busy`] while other mounts lie beneath the point
    /// or while the device has open streams.
    pub fn unmount(&self, mount_point: &str) -> FsResult<()> {
        let point = VfsPath::parse(mount_point)?;
        let mut mounts = self.mounts.write().unwrap_or_else(PoisonError::into_inner);
        let device = mounts
            .get(&point)
            .ok_or_else(|| FsError::NotMounted(point.to_string()))?;

        if mounts.keys().any(|other| other != &point && other.starts_with(&point)) {
            tracing::debug!(path = %point, "vfs.unmount refused: nested mounts");
            return Err(FsError::Busy(point.to_string()));
        }
        let open = device.open_streams();
        if open > 0 {
            tracing::debug!(path = %point, open, "vfs.unmount refused: open streams");
            return Err(FsError::Busy(point.to_string()));
        }

        mounts.remove(&point);
        tracing::debug!(path = %point, "vfs.unmount");
        Ok(())
    }

    /// Drop every mount regardless of open streams. Used at kernel shutdown;
    /// streams still open turn stale once their device is gone.
    pub fn unmount_all(&self) -> usize {
        let mut mounts = self.mounts.write().unwrap_or_else(PoisonError::into_inner);
        let count = mounts.len();
        mounts.clear();
        count
    }

    /// List all mount points in path order.
    pub fn mounts(&self) -> Vec<MountInfo> {
        self.mounts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(path, device)| MountInfo {
                path: path.clone(),
                device_type: device.type_tag().to_string(),
                read_only: device.read_only(),
            })
            .collect()
    }

    /// Where `device` is mounted, if anywhere. Returns the first point in path order.
    pub fn mount_point_of(&self, device: &Arc<dyn Device>) -> Option<VfsPath> {
        self.mounts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|(_, mounted)| same_device(mounted, device))
            .map(|(path, _)| path.clone())
    }

    /// Find the device that owns `path` (longest prefix wins).
    pub fn resolve(&self, path: &str) -> FsResult<Resolved> {
        let path = VfsPath::parse(path)?;
        self.resolve_path(&path)
            .ok_or_else(|| FsError::NotFound(path.to_string()))
    }

    fn resolve_path(&self, path: &VfsPath) -> Option<Resolved> {
        let mounts = self.mounts.read().unwrap_or_else(PoisonError::into_inner);
        resolve_in(&mounts, path)
    }

    /// Names of mount points directly beneath `path`.
    fn child_mounts(&self, path: &VfsPath) -> BTreeSet<String> {
        let mounts = self.mounts.read().unwrap_or_else(PoisonError::into_inner);
        mounts
            .keys()
            .filter(|point| point.depth() > path.depth() && point.starts_with(path))
            .map(|point| point.components()[path.depth()].clone())
            .collect()
    }

    /// Resolve a path to a node.
    pub fn get(&self, path: &str) -> FsResult<Node> {
        let path = VfsPath::parse(path)?;
        let synthesized = !self.child_mounts(&path).is_empty();
        match self.resolve_path(&path) {
            Some(resolved) => match resolved.device.get(&resolved.relative) {
                Err(FsError::NotFound(_)) | Err(FsError::NotADirectory(_)) if synthesized => {
                    Ok(Node::Directory)
                }
                other => other,
            },
            None if synthesized => Ok(Node::Directory),
            None => Err(FsError::NotFound(path.to_string())),
        }
    }

    /// Check if a path exists.
    pub fn exists(&self, path: &str) -> bool {
        self.get(path).is_ok()
    }

    pub fn is_file(&self, path: &str) -> bool {
        matches!(self.get(path), Ok(Node::File(_)))
    }

    pub fn is_dir(&self, path: &str) -> bool {
        matches!(self.get(path), Ok(Node::Directory))
    }

    /// Names in a directory, including mount points directly beneath it.
    pub fn children(&self, path: &str) -> FsResult<BTreeSet<String>> {
        let path = VfsPath::parse(path)?;
        let mounted = self.child_mounts(&path);
        match self.resolve_path(&path) {
            Some(resolved) => match resolved.device.children(&resolved.relative) {
                Ok(mut names) => {
                    names.extend(mounted);
                    Ok(names)
                }
                Err(FsError::NotFound(_)) | Err(FsError::NotADirectory(_))
                    if !mounted.is_empty() =>
                {
                    Ok(mounted)
                }
                Err(e) => Err(e),
            },
            None if !mounted.is_empty() => Ok(mounted),
            None => Err(FsError::NotFound(path.to_string())),
        }
    }

    /// Create a directory on the owning device.
    pub fn create_dir(&self, path: &str, recursive: bool) -> FsResult<()> {
        let resolved = self.resolve(path)?;
        resolved.device.create_dir(&resolved.relative, recursive)
    }

    /// Remove a file or directory. Mount points and their ancestors are
    /// refused with [`FsError::Busy`].
    pub fn remove(&self, path: &str, recursive: bool) -> FsResult<()> {
        let path = VfsPath::parse(path)?;
        // Held through the device call so no mount can appear under `path`.
        let mounts = self.mounts.read().unwrap_or_else(PoisonError::into_inner);
        if holds_mount(&mounts, &path) {
            return Err(FsError::Busy(path.to_string()));
        }
        let resolved =
            resolve_in(&mounts, &path).ok_or_else(|| FsError::NotFound(path.to_string()))?;
        resolved.device.remove(&resolved.relative, recursive)
    }

    /// Move an entry. Both ends must live on the same device; a cross-device
    /// move is refused before anything changes.
    pub fn rename(&self, from: &str, to: &str) -> FsResult<()> {
        let from = VfsPath::parse(from)?;
        let to = VfsPath::parse(to)?;
        let mounts = self.mounts.read().unwrap_or_else(PoisonError::into_inner);
        let source =
            resolve_in(&mounts, &from).ok_or_else(|| FsError::NotFound(from.to_string()))?;
        let target = resolve_in(&mounts, &to).ok_or_else(|| FsError::NotFound(to.to_string()))?;
        if !same_device(&source.device, &target.device) {
            return Err(FsError::CrossDeviceMoveUnsupported {
                from: from.to_string(),
                to: to.to_string(),
            });
        }
        if holds_mount(&mounts, &from) {
            return Err(FsError::Busy(from.to_string()));
        }
        source.device.rename(&source.relative, &target.relative)
    }

    /// Open a stream on the owning device.
    pub fn open(&self, path: &str, mode: FileMode) -> FsResult<FileStream> {
        let resolved = self.resolve(path)?;
        resolved.device.open(&resolved.relative, mode)
    }

    /// Read a whole file in one call.
    pub fn read_file(&self, path: &str) -> FsResult<Vec<u8>> {
        let mut stream = self.open(path, FileMode::Read)?;
        let data = stream.read_all()?;
        stream.close()?;
        Ok(data)
    }

    /// Replace a file's content in one call, creating it if needed.
    pub fn write_file(&self, path: &str, data: &[u8]) -> FsResult<()> {
        let mut stream = self.open(path, FileMode::Write)?;
        stream.write(data)?;
        stream.close()
    }
}

type MountTable = BTreeMap<VfsPath, Arc<dyn Device>>;

fn resolve_in(mounts: &MountTable, path: &VfsPath) -> Option<Resolved> {
    mounts
        .iter()
        .filter(|(point, _)| path.starts_with(point))
        .max_by_key(|(point, _)| point.depth())
        .and_then(|(point, device)| {
            Some(Resolved {
                device: device.clone(),
                mount_point: point.clone(),
                relative: path.strip_prefix(point)?,
            })
        })
}

/// True if `path` is a mount point or lies above one.
fn holds_mount(mounts: &MountTable, path: &VfsPath) -> bool {
    mounts.keys().any(|point| point.starts_with(path))
}
