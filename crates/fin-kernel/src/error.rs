//! Error taxonomy shared by the filesystem and signal engines.
//!
//! Every error here is recoverable. Devices hand errors to the [`Root`],
//! which hands them to the caller without changing their kind.
//!
//! [`Root`]: crate::vfs::Root

use thiserror::Error;

use crate::signal::ObjectId;

/// Filesystem failures. Path payloads are rendered as `/`-separated strings.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FsError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("not a directory: {0}")]
    NotADirectory(String),

    #[error("not a file: {0}")]
    NotAFile(String),

    #[error("directory not empty: {0}")]
    DirectoryNotEmpty(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("already mounted: {0}")]
    AlreadyMounted(String),

    #[error("not mounted: {0}")]
    NotMounted(String),

    #[error("not a mountable device: {0}")]
    NotMountable(String),

    /// Unmount or removal refused because something still depends on the path.
    #[error("device or resource busy: {0}")]
    Busy(String),

    #[error("read-only filesystem: {0}")]
    ReadOnly(String),

    #[error("unsupported device type: {0}")]
    UnsupportedDeviceType(String),

    #[error("stream is closed")]
    ClosedStream,

    #[error("invalid file mode: {0}")]
    InvalidMode(String),

    /// Read on a write-only stream, or write on a read-only one.
    #[error("operation not permitted in mode '{0}'")]
    ModeViolation(String),

    #[error("invalid seek: resulting position {0} is negative")]
    InvalidSeek(i64),

    /// A write would grow the file past what can be allocated.
    #[error("file too large: {0}")]
    TooLarge(String),

    #[error("parse error: {0}")]
    ParseError(String),

    #[error("cannot move across devices: {from} -> {to}")]
    CrossDeviceMoveUnsupported { from: String, to: String },
}

pub type FsResult<T> = Result<T, FsError>;

/// Signal registration and wait failures.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SignalError {
    #[error("object is not valid: {0}")]
    InvalidObject(ObjectId),

    #[error("object {0} cannot send signals")]
    UnsupportedSender(ObjectId),

    #[error("processor is already waiting for a signal")]
    AlreadyWaiting,

    #[error("invalid pull timeout: {0}")]
    InvalidTimeout(f64),

    /// The wait was discarded because the processor was torn down.
    #[error("wait cancelled")]
    Cancelled,
}

pub type SignalResult<T> = Result<T, SignalError>;

/// Kernel-level failures.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum KernelError {
    #[error(transparent)]
    Fs(#[from] FsError),

    #[error(transparent)]
    Signal(#[from] SignalError),

    #[error("kernel is shut off")]
    Shutoff,
}

pub type KernelResult<T> = Result<T, KernelError>;
