//! Filesystem tree units.
//!
//! A [`Directory`] owns its children outright. File content lives behind an
//! `Arc<File>` so that open streams can keep a `Weak` back-reference: once the
//! file is removed from its directory the last strong reference goes away and
//! every stream on it becomes stale.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::SystemTime;

use super::device::Device;
use super::path::VfsPath;
use crate::error::{FsError, FsResult};

/// Byte content plus metadata of a regular file.
#[derive(Debug)]
pub struct File {
    data: RwLock<FileData>,
}

#[derive(Debug)]
struct FileData {
    bytes: Vec<u8>,
    modified: SystemTime,
}

impl File {
    pub fn new() -> Arc<Self> {
        Self::with_content(Vec::new())
    }

    pub fn with_content(bytes: Vec<u8>) -> Arc<Self> {
        Arc::new(Self {
            data: RwLock::new(FileData {
                bytes,
                modified: SystemTime::now(),
            }),
        })
    }

    /// Size in bytes.
    pub fn size(&self) -> u64 {
        self.data
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .bytes
            .len() as u64
    }

    /// Last time content was committed.
    pub fn modified(&self) -> SystemTime {
        self.data
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .modified
    }

    /// Copy of the current content.
    pub(crate) fn snapshot(&self) -> Vec<u8> {
        self.data
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .bytes
            .clone()
    }

    /// Replace the content in one step.
    pub(crate) fn commit(&self, bytes: &[u8]) {
        let mut data = self.data.write().unwrap_or_else(PoisonError::into_inner);
        data.bytes.clear();
        data.bytes.extend_from_slice(bytes);
        data.modified = SystemTime::now();
    }
}

/// A child slot inside a [`Directory`].
#[derive(Debug)]
pub(crate) enum Entry {
    File(Arc<File>),
    Directory(Directory),
}

/// A borrowed view of whatever a path lookup landed on.
#[derive(Debug)]
pub(crate) enum Lookup<'a> {
    File(&'a Arc<File>),
    Directory(&'a Directory),
}

/// Children ordered by name; names are unique.
#[derive(Debug, Default)]
pub struct Directory {
    children: BTreeMap<String, Entry>,
}

impl Directory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    pub fn names(&self) -> BTreeSet<String> {
        self.children.keys().cloned().collect()
    }

    pub(crate) fn get(&self, name: &str) -> Option<&Entry> {
        self.children.get(name)
    }

    pub(crate) fn insert(&mut self, name: &str, entry: Entry) {
        self.children.insert(name.to_string(), entry);
    }

    pub(crate) fn take(&mut self, name: &str) -> Option<Entry> {
        self.children.remove(name)
    }

    /// Walk `path` from this directory.
    pub(crate) fn lookup(&self, path: &VfsPath) -> FsResult<Lookup<'_>> {
        let components = path.components();
        let mut dir = self;
        for (depth, name) in components.iter().enumerate() {
            let last = depth + 1 == components.len();
            match dir.children.get(name) {
                Some(Entry::Directory(child)) => {
                    if last {
                        return Ok(Lookup::Directory(child));
                    }
                    dir = child;
                }
                Some(Entry::File(file)) => {
                    if last {
                        return Ok(Lookup::File(file));
                    }
                    return Err(FsError::NotADirectory(path.truncated(depth + 1).to_string()));
                }
                None => return Err(FsError::NotFound(path.truncated(depth + 1).to_string())),
            }
        }
        Ok(Lookup::Directory(dir))
    }

    /// Walk to the directory at `path`, optionally creating missing components.
    ///
    /// Creation only ever happens once the walk has left the existing tree, so
    /// a failure (a file in the way) is always detected before anything is
    /// inserted.
    pub(crate) fn dir_mut(&mut self, path: &VfsPath, create: bool) -> FsResult<&mut Directory> {
        let mut dir = self;
        for (depth, name) in path.components().iter().enumerate() {
            if create && !dir.children.contains_key(name) {
                dir.children
                    .insert(name.clone(), Entry::Directory(Directory::new()));
            }
            dir = match dir.children.get_mut(name) {
                Some(Entry::Directory(child)) => child,
                Some(Entry::File(_)) => {
                    return Err(FsError::NotADirectory(path.truncated(depth + 1).to_string()));
                }
                None => return Err(FsError::NotFound(path.truncated(depth + 1).to_string())),
            };
        }
        Ok(dir)
    }
}

/// What a path resolves to, as seen from outside a device.
#[derive(Clone)]
pub enum Node {
    File(Arc<File>),
    Directory,
    /// A device exposed by the device listing; the only node kind `mount` accepts.
    Device(Arc<dyn Device>),
}

impl Node {
    pub fn is_file(&self) -> bool {
        matches!(self, Node::File(_))
    }

    pub fn is_dir(&self) -> bool {
        matches!(self, Node::Directory)
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::File(file) => f.debug_tuple("File").field(&file.size()).finish(),
            Node::Directory => f.write_str("Directory"),
            Node::Device(device) => f.debug_tuple("Device").field(&device.type_tag()).finish(),
        }
    }
}
