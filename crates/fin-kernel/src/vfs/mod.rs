//! Virtual filesystem for in-simulation computers.
//!
//! Each computer sees one tree assembled from devices:
//!
//! - **MemDevice**: in-memory storage (`tmpfs`), used for drives and `/tmp`
//! - **DevDevice**: read-only listing of the computer's devices (`devfs`)
//! - **Root**: the mount table that routes paths to devices
//!
//! # Design
//!
//! A kernel owns `/`. Devices are mounted at paths:
//!
//! ```text
//! /            # root drive (tmpfs)
//! ├── /dev/    # DevDevice
//! └── /tmp/    # tmpfs
//! ```
//!
//! The root finds the longest matching mount point and hands the remaining
//! path to that device. Files are read and written through [`FileStream`]s,
//! which buffer privately and commit on flush or close.

mod devfs;
mod device;
mod memory;
mod node;
mod path;
mod root;
mod stream;

pub use devfs::{DEVFS_TAG, DevDevice};
pub use device::{Device, same_device};
pub use memory::{MemDevice, TMPFS_TAG};
pub use node::{Directory, File, Node};
pub use path::VfsPath;
pub use root::{MountInfo, Resolved, Root};
pub use stream::{FileMode, FileStream, Lines, ReadFormat, ReadValue, Whence};
