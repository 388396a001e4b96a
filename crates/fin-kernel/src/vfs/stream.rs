//! Open file handles.
//!
//! A [`FileStream`] works on a private copy of the file content: reads and
//! writes touch only that buffer, and `flush`/`close` commit it back to the
//! [`File`] in one step. The stream keeps a `Weak` reference to the file, so
//! removing the file from the tree turns every stream on it stale.
//!
//! Streams are owned by exactly one opener. Dropping a stream closes it.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use super::node::File;
use super::path::VfsPath;
use crate::error::{FsError, FsResult};

/// How a stream was opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileMode {
    /// `r`: read only, the file must exist.
    Read,
    /// `w`: write only, create or truncate.
    Write,
    /// `a`: write only at the end, create if absent.
    Append,
    /// `+r`: read and write, the file must exist.
    UpdateRead,
    /// `+w`: read and write, create or truncate.
    UpdateWrite,
    /// `+a`: read anywhere, write at the end, create if absent.
    UpdateAppend,
}

impl FileMode {
    pub fn token(self) -> &'static str {
        match self {
            FileMode::Read => "r",
            FileMode::Write => "w",
            FileMode::Append => "a",
            FileMode::UpdateRead => "+r",
            FileMode::UpdateWrite => "+w",
            FileMode::UpdateAppend => "+a",
        }
    }

    pub fn can_read(self) -> bool {
        !matches!(self, FileMode::Write | FileMode::Append)
    }

    pub fn can_write(self) -> bool {
        self != FileMode::Read
    }

    /// The file must already exist for this mode.
    pub fn requires_existing(self) -> bool {
        matches!(self, FileMode::Read | FileMode::UpdateRead)
    }

    pub fn truncates(self) -> bool {
        matches!(self, FileMode::Write | FileMode::UpdateWrite)
    }

    /// Every write lands at the end of the content.
    pub fn appends(self) -> bool {
        matches!(self, FileMode::Append | FileMode::UpdateAppend)
    }
}

impl fmt::Display for FileMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

impl FromStr for FileMode {
    type Err = FsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "r" => Ok(FileMode::Read),
            "w" => Ok(FileMode::Write),
            "a" => Ok(FileMode::Append),
            "+r" | "r+" => Ok(FileMode::UpdateRead),
            "+w" | "w+" => Ok(FileMode::UpdateWrite),
            "+a" | "a+" => Ok(FileMode::UpdateAppend),
            other => Err(FsError::InvalidMode(other.to_string())),
        }
    }
}

/// Reference point for [`FileStream::seek`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    Set,
    Cur,
    End,
}

impl FromStr for Whence {
    type Err = FsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "set" | "start" => Ok(Whence::Set),
            "cur" | "current" => Ok(Whence::Cur),
            "end" => Ok(Whence::End),
            other => Err(FsError::ParseError(format!("invalid seek origin '{}'", other))),
        }
    }
}

/// One item of a `read(...)` format list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadFormat {
    /// Up to `n` bytes.
    Bytes(usize),
    Line,
    All,
    Number,
}

impl FromStr for ReadFormat {
    type Err = FsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim_start_matches('*') {
            "l" | "line" => Ok(ReadFormat::Line),
            "a" | "all" => Ok(ReadFormat::All),
            "n" | "number" => Ok(ReadFormat::Number),
            other => other
                .parse::<usize>()
                .map(ReadFormat::Bytes)
                .map_err(|_| FsError::ParseError(format!("invalid read format '{}'", s))),
        }
    }
}

/// Result of one [`FileStream::read`] format item.
#[derive(Debug, Clone, PartialEq)]
pub enum ReadValue {
    Bytes(Vec<u8>),
    Line(String),
    Number(f64),
    /// Nothing left to read for this format.
    Eof,
}

/// Counts the open streams of one device.
#[derive(Debug, Default, Clone)]
pub(crate) struct StreamTracker {
    open: Arc<AtomicUsize>,
}

impl StreamTracker {
    pub(crate) fn track(&self) -> StreamToken {
        self.open.fetch_add(1, Ordering::SeqCst);
        StreamToken {
            open: Arc::clone(&self.open),
        }
    }

    pub(crate) fn open_count(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }
}

/// Held by an open stream; releasing it decrements the device's count.
#[derive(Debug)]
pub(crate) struct StreamToken {
    open: Arc<AtomicUsize>,
}

impl Drop for StreamToken {
    fn drop(&mut self) {
        self.open.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A live handle to an opened file.
#[derive(Debug)]
pub struct FileStream {
    file: Weak<File>,
    path: VfsPath,
    mode: FileMode,
    buffer: Vec<u8>,
    pos: usize,
    dirty: bool,
    /// `None` once closed.
    token: Option<StreamToken>,
}

impl FileStream {
    /// Open a stream on `file`. Truncation is the device's job.
    pub(crate) fn new(file: &Arc<File>, path: VfsPath, mode: FileMode, token: StreamToken) -> Self {
        let buffer = file.snapshot();
        let pos = if mode.appends() { buffer.len() } else { 0 };
        Self {
            file: Arc::downgrade(file),
            path,
            mode,
            buffer,
            pos,
            dirty: false,
            token: Some(token),
        }
    }

    pub fn mode(&self) -> FileMode {
        self.mode
    }

    /// Device-relative path the stream was opened with.
    pub fn path(&self) -> &VfsPath {
        &self.path
    }

    pub fn position(&self) -> u64 {
        self.pos as u64
    }

    pub fn is_open(&self) -> bool {
        self.token.is_some()
    }

    /// True once the cursor has reached the end of the content.
    pub fn is_eof(&self) -> bool {
        self.pos >= self.buffer.len()
    }

    fn live(&self) -> FsResult<Arc<File>> {
        if self.token.is_none() {
            return Err(FsError::ClosedStream);
        }
        self.file
            .upgrade()
            .ok_or_else(|| FsError::NotFound(self.path.to_string()))
    }

    fn check_readable(&self) -> FsResult<()> {
        self.live()?;
        if !self.mode.can_read() {
            return Err(FsError::ModeViolation(self.mode.to_string()));
        }
        Ok(())
    }

    fn check_writable(&self) -> FsResult<()> {
        self.live()?;
        if !self.mode.can_write() {
            return Err(FsError::ModeViolation(self.mode.to_string()));
        }
        Ok(())
    }

    /// Write at the cursor and advance it. Append modes jump to the end first;
    /// a cursor past the end zero-fills the gap.
    pub fn write(&mut self, data: &[u8]) -> FsResult<()> {
        self.check_writable()?;
        if self.mode.appends() {
            self.pos = self.buffer.len();
        }
        let end = self
            .pos
            .checked_add(data.len())
            .ok_or_else(|| FsError::TooLarge(self.path.to_string()))?;
        if end > self.buffer.len() {
            self.buffer
                .try_reserve(end - self.buffer.len())
                .map_err(|_| FsError::TooLarge(self.path.to_string()))?;
            self.buffer.resize(end, 0);
        }
        self.buffer[self.pos..end].copy_from_slice(data);
        self.pos = end;
        self.dirty = true;
        Ok(())
    }

    /// Read up to the next newline. The newline is consumed but not returned.
    pub fn read_line(&mut self) -> FsResult<Option<String>> {
        self.check_readable()?;
        if self.is_eof() {
            return Ok(None);
        }
        let rest = &self.buffer[self.pos..];
        let (line, consumed) = match rest.iter().position(|&b| b == b'\n') {
            Some(idx) => (&rest[..idx], idx + 1),
            None => (rest, rest.len()),
        };
        let line = String::from_utf8_lossy(line).into_owned();
        self.pos += consumed;
        Ok(Some(line))
    }

    /// Everything from the cursor to the end.
    pub fn read_all(&mut self) -> FsResult<Vec<u8>> {
        self.check_readable()?;
        let start = self.pos.min(self.buffer.len());
        let rest = self.buffer[start..].to_vec();
        self.pos = self.buffer.len().max(self.pos);
        Ok(rest)
    }

    /// Exactly `n` bytes, or fewer at the end of the content.
    pub fn read_chars(&mut self, n: usize) -> FsResult<Vec<u8>> {
        self.check_readable()?;
        let start = self.pos.min(self.buffer.len());
        let end = start.saturating_add(n).min(self.buffer.len());
        let chunk = self.buffer[start..end].to_vec();
        self.pos = self.pos.max(end);
        Ok(chunk)
    }

    /// Parse a numeric token after optional whitespace.
    ///
    /// Accepts decimal (`-1.5e3`) and hexadecimal (`0x1F`) integers. On
    /// failure the cursor does not move.
    pub fn read_number(&mut self) -> FsResult<f64> {
        self.check_readable()?;
        let start = self.pos.min(self.buffer.len());
        match scan_number(&self.buffer[start..]) {
            Some((value, consumed)) => {
                self.pos = start + consumed;
                Ok(value)
            }
            None => {
                let preview: String = String::from_utf8_lossy(&self.buffer[start..])
                    .trim_start()
                    .chars()
                    .take(16)
                    .collect();
                Err(FsError::ParseError(format!(
                    "expected a number, found '{}'",
                    preview
                )))
            }
        }
    }

    /// Read one item of a format list.
    pub fn read(&mut self, format: ReadFormat) -> FsResult<ReadValue> {
        match format {
            ReadFormat::Bytes(n) => {
                self.check_readable()?;
                if self.is_eof() && n > 0 {
                    return Ok(ReadValue::Eof);
                }
                self.read_chars(n).map(ReadValue::Bytes)
            }
            ReadFormat::Line => Ok(match self.read_line()? {
                Some(line) => ReadValue::Line(line),
                None => ReadValue::Eof,
            }),
            ReadFormat::All => self.read_all().map(ReadValue::Bytes),
            ReadFormat::Number => self.read_number().map(ReadValue::Number),
        }
    }

    /// Iterate the remaining lines.
    pub fn lines(&mut self) -> Lines<'_> {
        Lines {
            stream: self,
            done: false,
        }
    }

    /// Move the cursor and return the new absolute position.
    pub fn seek(&mut self, whence: Whence, offset: i64) -> FsResult<u64> {
        self.live()?;
        let base = match whence {
            Whence::Set => 0,
            Whence::Cur => self.pos,
            Whence::End => self.buffer.len(),
        };
        let target = i64::try_from(base)
            .ok()
            .and_then(|base| base.checked_add(offset))
            .ok_or(FsError::InvalidSeek(i64::MIN))?;
        if target < 0 {
            return Err(FsError::InvalidSeek(target));
        }
        self.pos = usize::try_from(target).map_err(|_| FsError::InvalidSeek(target))?;
        Ok(self.pos as u64)
    }

    /// Commit buffered writes to the file.
    pub fn flush(&mut self) -> FsResult<()> {
        let file = self.live()?;
        if self.dirty {
            file.commit(&self.buffer);
            self.dirty = false;
        }
        Ok(())
    }

    /// Flush and release the stream. Closing a closed stream is a no-op.
    ///
    /// The stream is released even when the final flush fails; the failure
    /// is still reported.
    pub fn close(&mut self) -> FsResult<()> {
        if self.token.is_none() {
            return Ok(());
        }
        let flushed = self.flush();
        self.token = None;
        self.buffer = Vec::new();
        self.pos = 0;
        flushed
    }
}

impl Drop for FileStream {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!(path = %self.path, error = %e, "vfs.stream: close on drop failed");
        }
    }
}

/// Iterator over the remaining lines of a stream.
pub struct Lines<'a> {
    stream: &'a mut FileStream,
    done: bool,
}

impl Iterator for Lines<'_> {
    type Item = FsResult<String>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.stream.read_line() {
            Ok(Some(line)) => Some(Ok(line)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Scan a number at the start of `bytes`, returning the value and the number
/// of bytes consumed (including leading whitespace).
fn scan_number(bytes: &[u8]) -> Option<(f64, usize)> {
    let mut i = 0;
    while bytes.get(i).is_some_and(u8::is_ascii_whitespace) {
        i += 1;
    }
    let start = i;
    let negative = bytes.get(i) == Some(&b'-');
    if matches!(bytes.get(i), Some(b'+' | b'-')) {
        i += 1;
    }

    if bytes.get(i) == Some(&b'0') && matches!(bytes.get(i + 1), Some(b'x' | b'X')) {
        let digits_start = i + 2;
        let mut end = digits_start;
        while bytes.get(end).is_some_and(u8::is_ascii_hexdigit) {
            end += 1;
        }
        if end == digits_start {
            return None;
        }
        let text = std::str::from_utf8(&bytes[digits_start..end]).ok()?;
        let magnitude = u64::from_str_radix(text, 16).ok()? as f64;
        return Some((if negative { -magnitude } else { magnitude }, end));
    }

    let mut digits = 0;
    while bytes.get(i).is_some_and(u8::is_ascii_digit) {
        i += 1;
        digits += 1;
    }
    if bytes.get(i) == Some(&b'.') {
        i += 1;
        while bytes.get(i).is_some_and(u8::is_ascii_digit) {
            i += 1;
            digits += 1;
        }
    }
    if digits == 0 {
        return None;
    }
    if matches!(bytes.get(i), Some(b'e' | b'E')) {
        let mut end = i + 1;
        if matches!(bytes.get(end), Some(b'+' | b'-')) {
            end += 1;
        }
        let exponent_start = end;
        while bytes.get(end).is_some_and(u8::is_ascii_digit) {
            end += 1;
        }
        if end > exponent_start {
            i = end;
        }
    }
    let text = std::str::from_utf8(&bytes[start..i]).ok()?;
    text.parse::<f64>().ok().map(|value| (value, i))
}
