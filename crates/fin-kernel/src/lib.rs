//! fin-kernel: the core of an in-simulation computer.
//!
//! This crate provides:
//!
//! - **VFS**: devices, a node tree, file streams and a mount table with
//!   longest-prefix resolution
//! - **Signals**: listener registration, sender-side routing and the
//!   cooperative pull/yield wait protocol
//! - **Kernel**: the per-computer context that owns one filesystem root and
//!   one network listener
//!
//! Script bindings, the in-world object layer and persistence sit outside
//! this crate and talk to it through the types re-exported here.

pub mod config;
pub mod error;
pub mod kernel;
pub mod signal;
pub mod vfs;

pub use config::KernelConfig;
pub use error::{FsError, FsResult, KernelError, KernelResult, SignalError, SignalResult};
pub use kernel::{KernelState, KernelSystem};
