//! Virtual file system bridging user-provided streams into the engine.
//!
//! The engine never touches the OS filesystem directly; sounds opened by
//! path go through a [`Vfs`] whose callbacks the application supplies.
//! This keeps asset packing, archives, and in-memory stores out of the
//! engine's concern.

use std::sync::Arc;

use crate::error::{EngineError, Status};

/// Where a seek offset is measured from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SeekOrigin {
    Start,
    Current,
    End,
}

/// How a file is opened. Only [`OpenMode::Read`] is supported; the engine
/// never writes through the VFS.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpenMode {
    Read,
    Write,
}

/// Byte-size info for an open file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FileInfo {
    pub size_in_bytes: u64,
}

/// A seekable byte stream supplied by the application.
///
/// Positions are absolute byte offsets from the start of the stream.
/// Implementations may be called from the audio thread while a sound is
/// streaming, so they should avoid blocking I/O where that matters.
pub trait StreamReader: Send {
    fn stream_position(&mut self) -> Result<u64, EngineError>;

    fn set_stream_position(&mut self, position: u64) -> Status;

    /// Reads up to `out.len()` bytes, returning how many were read. A
    /// short read does not imply end of stream; zero does.
    fn read_data(&mut self, out: &mut [u8]) -> Result<usize, EngineError>;
}

type CreateReaderFn =
    dyn Fn(&str) -> Result<Box<dyn StreamReader>, EngineError> + Send + Sync;
type FileSizeFn = dyn Fn(&str) -> Result<u64, EngineError> + Send + Sync;

/// Application-supplied file system. Cheap to share; the engine holds one
/// behind an [`Arc`] and consults it whenever a sound is opened by path.
pub struct Vfs {
    create_reader: Box<CreateReaderFn>,
    file_size: Box<FileSizeFn>,
}

impl Vfs {
    pub fn new(
        create_reader: impl Fn(&str) -> Result<Box<dyn StreamReader>, EngineError>
            + Send
            + Sync
            + 'static,
        file_size: impl Fn(&str) -> Result<u64, EngineError> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            create_reader: Box::new(create_reader),
            file_size: Box::new(file_size),
        })
    }

    /// Opens `path` for reading. [`OpenMode::Write`] is refused with
    /// [`EngineError::NotImplemented`].
    pub fn open(&self, path: &str, mode: OpenMode) -> Result<VfsFile, EngineError> {
        if mode != OpenMode::Read {
            return Err(EngineError::NotImplemented);
        }
        let size = (self.file_size)(path)?;
        let reader = (self.create_reader)(path)?;
        Ok(VfsFile {
            reader,
            size,
            position: 0,
        })
    }
}

/// An open VFS file: a reader plus the size captured at open time.
///
/// Reads are clamped to the file size; a read at or past the end returns
/// `Ok(0)`.
pub struct VfsFile {
    reader: Box<dyn StreamReader>,
    size: u64,
    position: u64,
}

impl VfsFile {
    /// Reads up to `out.len()` bytes at the current position, returning
    /// how many were read.
    pub fn read(&mut self, out: &mut [u8]) -> Result<usize, EngineError> {
        let remaining = self.size.saturating_sub(self.position);
        let want = (out.len() as u64).min(remaining) as usize;
        if want == 0 {
            return Ok(0);
        }
        let read = self.reader.read_data(&mut out[..want])?;
        self.position += read as u64;
        Ok(read)
    }

    /// Moves the read position. Seeking before the start of the file is
    /// rejected; seeking past the end is allowed and reads return zero
    /// bytes there.
    pub fn seek(&mut self, origin: SeekOrigin, offset: i64) -> Status {
        let base = match origin {
            SeekOrigin::Start => 0,
            SeekOrigin::Current => self.position as i64,
            SeekOrigin::End => self.size as i64,
        };
        let target = base.checked_add(offset).ok_or(EngineError::InvalidArgs)?;
        if target < 0 {
            return Err(EngineError::InvalidArgs);
        }
        self.reader.set_stream_position(target as u64)?;
        self.position = target as u64;
        Ok(())
    }

    pub fn tell(&self) -> u64 {
        self.position
    }

    pub fn info(&self) -> FileInfo {
        FileInfo {
            size_in_bytes: self.size,
        }
    }
}
