//! Byte-stream adapters over regular file content.

use std::io;
use std::sync::Arc;

use crate::error::Error;
use crate::error::Result;
use crate::file::File;
use crate::file::Inner;
use crate::regular::RegularFile;
use crate::state::FileSystemState;
use crate::time::FileTimeSource;

pub(crate) fn regular_content(inner: &mut Inner) -> &mut RegularFile {
    match inner.regular_mut() {
        Some(regular) => regular,
        None => unreachable!("stream opened on a non-regular file"),
    }
}

/// A sequential reader over a regular file.
///
/// Holds its own position. Reading moves the position and refreshes the
/// file's access time. Every operation after [`close`](InputStream::close)
/// fails with an I/O error; closing again is a no-op. Dropping an unclosed
/// stream closes it.
pub struct InputStream {
    file: Arc<File>,
    state: Arc<FileSystemState>,
    clock: Arc<dyn FileTimeSource>,
    pos: u64,
    open: bool,
}

impl InputStream {
    pub(crate) fn open(
        file: Arc<File>,
        state: Arc<FileSystemState>,
        clock: Arc<dyn FileTimeSource>,
    ) -> InputStream {
        file.opened();
        state.register();
        InputStream {
            file,
            state,
            clock,
            pos: 0,
            open: true,
        }
    }

    fn check_open(&self) -> Result<()> {
        if self.open {
            Ok(())
        } else {
            Err(Error::closed_stream())
        }
    }

    /// Reads a single byte, or `None` at end of file.
    pub fn read_byte(&mut self) -> Result<Option<u8>> {
        let mut buf = [0u8; 1];
        Ok(match self.read(&mut buf)? {
            0 => None,
            _ => Some(buf[0]),
        })
    }

    /// Reads up to `buf.len()` bytes at the current position. Returns the
    /// number of bytes read, zero at end of file.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.check_open()?;
        if buf.is_empty() {
            return Ok(0);
        }
        let mut inner = self.file.lock();
        let n = match regular_content(&mut inner).read(self.pos, buf) {
            Some(n) => n,
            None => return Ok(0),
        };
        inner.set_accessed(self.clock.now());
        drop(inner);
        self.pos += n as u64;
        Ok(n)
    }

    /// Skips up to `n` bytes, clamped to the bytes remaining; a negative
    /// `n` skips nothing. Returns the number of bytes skipped.
    pub fn skip(&mut self, n: i64) -> Result<u64> {
        self.check_open()?;
        if n <= 0 {
            return Ok(0);
        }
        let size = {
            let mut inner = self.file.lock();
            regular_content(&mut inner).size()
        };
        let skipped = (n as u64).min(size.saturating_sub(self.pos));
        self.pos += skipped;
        Ok(skipped)
    }

    /// Bytes between the current position and the end of file.
    pub fn available(&self) -> Result<u64> {
        self.check_open()?;
        Ok(self.file.size().saturating_sub(self.pos))
    }

    /// Closes the stream, releasing its handle on the file and the
    /// filesystem. The first close counts; later calls do nothing.
    pub fn close(&mut self) {
        if !self.open {
            return;
        }
        self.open = false;
        self.file.closed();
        self.state.unregister();
    }
}

impl std::fmt::Debug for InputStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InputStream")
            .field("file", &self.file.id())
            .field("pos", &self.pos)
            .field("open", &self.open)
            .finish_non_exhaustive()
    }
}

impl io::Read for InputStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        InputStream::read(self, buf).map_err(io::Error::from)
    }
}

impl Drop for InputStream {
    fn drop(&mut self) {
        self.close();
    }
}

/// A sequential writer over a regular file.
///
/// In append mode every write first moves the position to the end of file,
/// under the file's lock, so concurrent appenders never interleave within
/// one write. Close is idempotent; dropping an unclosed stream closes it.
pub struct OutputStream {
    file: Arc<File>,
    state: Arc<FileSystemState>,
    clock: Arc<dyn FileTimeSource>,
    pos: u64,
    append: bool,
    open: bool,
}

impl OutputStream {
    pub(crate) fn open(
        file: Arc<File>,
        state: Arc<FileSystemState>,
        clock: Arc<dyn FileTimeSource>,
        append: bool,
    ) -> OutputStream {
        file.opened();
        state.register();
        OutputStream {
            file,
            state,
            clock,
            pos: 0,
            append,
            open: true,
        }
    }

    fn check_open(&self) -> Result<()> {
        if self.open {
            Ok(())
        } else {
            Err(Error::closed_stream())
        }
    }

    /// Writes a single byte at the current position.
    pub fn write_byte(&mut self, b: u8) -> Result<()> {
        self.write(&[b]).map(|_| ())
    }

    /// Writes `buf` at the current position, extending the file as needed
    /// and zero-filling any gap past the old end of file. Advances the
    /// position past the written bytes.
    pub fn write(&mut self, buf: &[u8]) -> Result<usize> {
        self.check_open()?;
        let mut inner = self.file.lock();
        let regular = regular_content(&mut inner);
        if self.append {
            self.pos = regular.size();
        }
        let n = regular.write(self.pos, buf)?;
        inner.set_modified(self.clock.now());
        drop(inner);
        self.pos += n as u64;
        Ok(n)
    }

    /// Closes the stream, releasing its handle on the file and the
    /// filesystem. The first close counts; later calls do nothing.
    pub fn close(&mut self) {
        if !self.open {
            return;
        }
        self.open = false;
        self.file.closed();
        self.state.unregister();
    }
}

impl std::fmt::Debug for OutputStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputStream")
            .field("file", &self.file.id())
            .field("pos", &self.pos)
            .field("append", &self.append)
            .field("open", &self.open)
            .finish_non_exhaustive()
    }
}

impl io::Write for OutputStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        OutputStream::write(self, buf).map_err(io::Error::from)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.check_open().map_err(io::Error::from)
    }
}

impl Drop for OutputStream {
    fn drop(&mut self) {
        self.close();
    }
}
