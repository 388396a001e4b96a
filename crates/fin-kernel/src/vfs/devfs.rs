//! DevDevice: a read-only device that lists the other devices of a kernel.
//!
//! Once the kernel initializes its filesystem, this device is mounted (usually
//! at `/dev`) and every registered device shows up as an entry:
//!
//! ```text
//! /dev/
//! ├── drive0   ← tmpfs created by make_device("tmpfs", "drive0")
//! └── floppy   ← a device plugged in by the host
//! ```
//!
//! Entries resolve to [`Node::Device`], which is what `mount` expects as its
//! source. The listing itself cannot be modified through filesystem calls.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use super::device::Device;
use super::node::Node;
use super::path::VfsPath;
use super::stream::{FileMode, FileStream};
use crate::error::{FsError, FsResult};

/// Type tag of the device listing.
pub const DEVFS_TAG: &str = "devfs";

/// A synthesized device whose root lists registered devices by name.
#[derive(Default)]
pub struct DevDevice {
    devices: RwLock<BTreeMap<String, Arc<dyn Device>>>,
}

impl DevDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a device under `name`.
    pub fn add_device(&self, name: &str, device: Arc<dyn Device>) -> FsResult<()> {
        if name.is_empty() || name == "." || name == ".." || name.contains('/') {
            return Err(FsError::InvalidPath(name.to_string()));
        }
        let mut devices = self.devices.write().unwrap_or_else(PoisonError::into_inner);
        if devices.contains_key(name) {
            return Err(FsError::AlreadyExists(format!("/{}", name)));
        }
        tracing::debug!(name, kind = device.type_tag(), "vfs.devfs: add device");
        devices.insert(name.to_string(), device);
        Ok(())
    }

    /// Unregister a device. Existing mounts of it stay until unmounted.
    pub fn remove_device(&self, name: &str) -> FsResult<Arc<dyn Device>> {
        let mut devices = self.devices.write().unwrap_or_else(PoisonError::into_inner);
        let device = devices
            .remove(name)
            .ok_or_else(|| FsError::NotFound(format!("/{}", name)))?;
        tracing::debug!(name, "vfs.devfs: remove device");
        Ok(device)
    }

    /// Look up a device by name.
    pub fn device(&self, name: &str) -> Option<Arc<dyn Device>> {
        self.devices
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Names of all registered devices.
    pub fn names(&self) -> BTreeSet<String> {
        self.devices
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }
}

impl fmt::Debug for DevDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DevDevice")
            .field("devices", &self.names())
            .finish()
    }
}

impl Device for DevDevice {
    fn type_tag(&self) -> &str {
        DEVFS_TAG
    }

    fn get(&self, path: &VfsPath) -> FsResult<Node> {
        match path.components() {
            [] => Ok(Node::Directory),
            [name] => self
                .device(name)
                .map(Node::Device)
                .ok_or_else(|| FsError::NotFound(path.to_string())),
            [name, ..] => {
                if self.device(name).is_some() {
                    Err(FsError::NotADirectory(format!("/{}", name)))
                } else {
                    Err(FsError::NotFound(format!("/{}", name)))
                }
            }
        }
    }

    fn children(&self, path: &VfsPath) -> FsResult<BTreeSet<String>> {
        match self.get(path)? {
            Node::Directory => Ok(self.names()),
            _ => Err(FsError::NotADirectory(path.to_string())),
        }
    }

    fn create_dir(&self, path: &VfsPath, _recursive: bool) -> FsResult<()> {
        Err(FsError::ReadOnly(path.to_string()))
    }

    fn remove(&self, path: &VfsPath, _recursive: bool) -> FsResult<()> {
        Err(FsError::ReadOnly(path.to_string()))
    }

    fn rename(&self, from: &VfsPath, _to: &VfsPath) -> FsResult<()> {
        Err(FsError::ReadOnly(from.to_string()))
    }

    fn open(&self, path: &VfsPath, mode: FileMode) -> FsResult<FileStream> {
        self.get(path)?;
        if mode.can_write() {
            return Err(FsError::ReadOnly(path.to_string()));
        }
        Err(FsError::NotAFile(path.to_string()))
    }

    fn read_only(&self) -> bool {
        true
    }
}
