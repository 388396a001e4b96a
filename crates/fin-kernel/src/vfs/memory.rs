//! In-memory device implementation.
//!
//! Backs the `tmpfs` device type. All data is ephemeral and lost when the
//! last reference to the device is dropped.

use std::collections::BTreeSet;
use std::sync::{PoisonError, RwLock};

use super::device::Device;
use super::node::{Directory, Entry, File, Lookup, Node};
use super::path::VfsPath;
use super::stream::{FileMode, FileStream, StreamTracker};
use crate::error::{FsError, FsResult};

/// Type tag accepted by `make_device` for an in-memory device.
pub const TMPFS_TAG: &str = "tmpfs";

/// In-memory device.
///
/// Thread-safe via one coarse `RwLock` over the whole tree; every mutation
/// runs under a single write guard.
#[derive(Debug, Default)]
pub struct MemDevice {
    root: RwLock<Directory>,
    streams: StreamTracker,
}

impl MemDevice {
    /// Create a new empty in-memory device.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Device for MemDevice {
    fn type_tag(&self) -> &str {
        TMPFS_TAG
    }

    fn get(&self, path: &VfsPath) -> FsResult<Node> {
        let root = self.root.read().unwrap_or_else(PoisonError::into_inner);
        match root.lookup(path)? {
            Lookup::File(file) => Ok(Node::File(file.clone())),
            Lookup::Directory(_) => Ok(Node::Directory),
        }
    }

    fn children(&self, path: &VfsPath) -> FsResult<BTreeSet<String>> {
        let root = self.root.read().unwrap_or_else(PoisonError::into_inner);
        match root.lookup(path)? {
            Lookup::Directory(dir) => Ok(dir.names()),
            Lookup::File(_) => Err(FsError::NotADirectory(path.to_string())),
        }
    }

    fn create_dir(&self, path: &VfsPath, recursive: bool) -> FsResult<()> {
        let Some((parent, name)) = path.split_last() else {
            // The root always exists
            return if recursive {
                Ok(())
            } else {
                Err(FsError::AlreadyExists(path.to_string()))
            };
        };

        let mut root = self.root.write().unwrap_or_else(PoisonError::into_inner);
        let dir = root.dir_mut(&parent, recursive)?;
        match dir.get(name) {
            Some(Entry::Directory(_)) if recursive => Ok(()),
            Some(_) => Err(FsError::AlreadyExists(path.to_string())),
            None => {
                dir.insert(name, Entry::Directory(Directory::new()));
                Ok(())
            }
        }
    }

    fn remove(&self, path: &VfsPath, recursive: bool) -> FsResult<()> {
        let Some((parent, name)) = path.split_last() else {
            return Err(FsError::InvalidPath(
                "cannot remove the device root".to_string(),
            ));
        };

        let mut root = self.root.write().unwrap_or_else(PoisonError::into_inner);
        let dir = root.dir_mut(&parent, false)?;
        match dir.get(name) {
            None => Err(FsError::NotFound(path.to_string())),
            Some(Entry::Directory(child)) if !recursive && !child.is_empty() => {
                Err(FsError::DirectoryNotEmpty(path.to_string()))
            }
            Some(_) => {
                dir.take(name);
                Ok(())
            }
        }
    }

    fn rename(&self, from: &VfsPath, to: &VfsPath) -> FsResult<()> {
        let (Some((from_parent, from_name)), Some((to_parent, to_name))) =
            (from.split_last(), to.split_last())
        else {
            return Err(FsError::InvalidPath(
                "cannot move the device root".to_string(),
            ));
        };
        if from == to {
            return self.get(from).map(|_| ());
        }
        if to.starts_with(from) {
            return Err(FsError::InvalidPath(format!(
                "cannot move {} into itself ({})",
                from, to
            )));
        }

        let mut root = self.root.write().unwrap_or_else(PoisonError::into_inner);

        // Validate everything before the first mutation
        root.lookup(from)?;
        match root.lookup(&to_parent)? {
            Lookup::Directory(dir) => {
                if dir.get(to_name).is_some() {
                    return Err(FsError::AlreadyExists(to.to_string()));
                }
            }
            Lookup::File(_) => return Err(FsError::NotADirectory(to_parent.to_string())),
        }

        let entry = root
            .dir_mut(&from_parent, false)?
            .take(from_name)
            .ok_or_else(|| FsError::NotFound(from.to_string()))?;
        root.dir_mut(&to_parent, false)?.insert(to_name, entry);
        Ok(())
    }

    fn open(&self, path: &VfsPath, mode: FileMode) -> FsResult<FileStream> {
        let Some((parent, name)) = path.split_last() else {
            return Err(FsError::NotAFile(path.to_string()));
        };

        let file = if mode.requires_existing() {
            let root = self.root.read().unwrap_or_else(PoisonError::into_inner);
            match root.lookup(path)? {
                Lookup::File(file) => file.clone(),
                Lookup::Directory(_) => return Err(FsError::NotAFile(path.to_string())),
            }
        } else {
            let mut root = self.root.write().unwrap_or_else(PoisonError::into_inner);
            let dir = root.dir_mut(&parent, false)?;
            match dir.get(name) {
                Some(Entry::File(file)) => file.clone(),
                Some(Entry::Directory(_)) => return Err(FsError::NotAFile(path.to_string())),
                None => {
                    let file = File::new();
                    dir.insert(name, Entry::File(file.clone()));
                    file
                }
            }
        };

        if mode.truncates() {
            file.commit(&[]);
        }

        tracing::trace!(path = %path, mode = %mode, "vfs.tmpfs: open");
        Ok(FileStream::new(&file, path.clone(), mode, self.streams.track()))
    }

    fn open_streams(&self) -> usize {
        self.streams.open_count()
    }
}
