//! The storage backend abstraction.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use super::node::Node;
use super::path::VfsPath;
use super::stream::{FileMode, FileStream};
use crate::error::FsResult;

/// A storage backend with exactly one root directory.
///
/// All paths are relative to the device root. For example, if a device is
/// mounted at `/tmp`, then `/tmp/a/f.txt` reaches the device as `/a/f.txt`.
/// The device never learns where it is mounted.
///
/// Every mutating operation must be atomic with respect to concurrent lookups:
/// an observer sees either the old tree or the new one.
pub trait Device: Send + Sync + fmt::Debug {
    /// The type tag this device was created from (`tmpfs`, `devfs`, ...).
    fn type_tag(&self) -> &str;

    /// Resolve a path to a node.
    fn get(&self, path: &VfsPath) -> FsResult<Node>;

    /// Names of the entries in a directory.
    fn children(&self, path: &VfsPath) -> FsResult<BTreeSet<String>>;

    /// Create a directory. With `recursive`, missing parents are created and
    /// an existing directory is accepted.
    fn create_dir(&self, path: &VfsPath, recursive: bool) -> FsResult<()>;

    /// Remove a file or directory. Without `recursive`, a non-empty directory
    /// is refused.
    fn remove(&self, path: &VfsPath, recursive: bool) -> FsResult<()>;

    /// Move an entry within this device.
    fn rename(&self, from: &VfsPath, to: &VfsPath) -> FsResult<()>;

    /// Open a file stream.
    fn open(&self, path: &VfsPath, mode: FileMode) -> FsResult<FileStream>;

    /// Number of streams opened on this device that are not yet closed.
    fn open_streams(&self) -> usize {
        0
    }

    /// Returns true if the tree cannot be modified.
    fn read_only(&self) -> bool {
        false
    }

    /// Check if a path exists.
    fn exists(&self, path: &VfsPath) -> bool {
        self.get(path).is_ok()
    }
}

/// Identity comparison for shared devices.
///
/// Compares the data pointers only; two `Arc<dyn Device>` to the same
/// allocation may carry different vtable pointers.
pub fn same_device(a: &Arc<dyn Device>, b: &Arc<dyn Device>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}
