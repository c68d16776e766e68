//! A positioned random-access channel over a regular file.

use std::io;
use std::io::SeekFrom;
use std::sync::Arc;

use crate::error::Error;
use crate::error::Result;
use crate::file::File;
use crate::options::OpenOptions;
use crate::state::FileSystemState;
use crate::stream::regular_content;
use crate::time::FileTimeSource;

/// A random-access adapter over a regular file, honoring the open options
/// it was created with: reads need READ, writes need WRITE, and in APPEND
/// mode every write lands at the end of file.
///
/// The channel keeps one position shared by reads and writes, like a file
/// descriptor; the `*_at` variants address the file directly without
/// touching it. Close is idempotent; dropping an unclosed channel closes
/// it.
pub struct FileChannel {
    file: Arc<File>,
    state: Arc<FileSystemState>,
    clock: Arc<dyn FileTimeSource>,
    options: OpenOptions,
    pos: u64,
    open: bool,
}

impl FileChannel {
    pub(crate) fn open(
        file: Arc<File>,
        state: Arc<FileSystemState>,
        clock: Arc<dyn FileTimeSource>,
        options: OpenOptions,
    ) -> FileChannel {
        file.opened();
        state.register();
        FileChannel {
            file,
            state,
            clock,
            options,
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

    fn check_readable(&self) -> Result<()> {
        self.check_open()?;
        if self.options.is_readable() {
            Ok(())
        } else {
            Err(Error::AccessDenied("channel is not open for reading".to_owned()))
        }
    }

    fn check_writable(&self) -> Result<()> {
        self.check_open()?;
        if self.options.is_writable() {
            Ok(())
        } else {
            Err(Error::AccessDenied("channel is not open for writing".to_owned()))
        }
    }

    /// The current position.
    pub fn position(&self) -> u64 {
        self.pos
    }

    /// Moves the position; positions past the end of file are legal and
    /// read as end of file until something is written there.
    pub fn set_position(&mut self, pos: u64) -> Result<()> {
        self.check_open()?;
        self.pos = pos;
        Ok(())
    }

    /// The file's current size.
    pub fn size(&self) -> Result<u64> {
        self.check_open()?;
        Ok(self.file.size())
    }

    /// Reads at the channel position, advancing it.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let n = self.read_at(self.pos, buf)?;
        self.pos += n as u64;
        Ok(n)
    }

    /// Reads at `pos` without moving the channel position. Returns zero at
    /// end of file.
    pub fn read_at(&mut self, pos: u64, buf: &mut [u8]) -> Result<usize> {
        self.check_readable()?;
        let mut inner = self.file.lock();
        let n = regular_content(&mut inner).read(pos, buf).unwrap_or(0);
        inner.set_accessed(self.clock.now());
        Ok(n)
    }

    /// Writes at the channel position (at end of file in append mode),
    /// advancing the position past the written bytes.
    pub fn write(&mut self, buf: &[u8]) -> Result<usize> {
        self.check_writable()?;
        let mut inner = self.file.lock();
        let regular = regular_content(&mut inner);
        if self.options.is_append() {
            self.pos = regular.size();
        }
        let n = regular.write(self.pos, buf)?;
        inner.set_modified(self.clock.now());
        drop(inner);
        self.pos += n as u64;
        Ok(n)
    }

    /// Writes at `pos` without moving the channel position.
    pub fn write_at(&mut self, pos: u64, buf: &[u8]) -> Result<usize> {
        self.check_writable()?;
        let mut inner = self.file.lock();
        let n = regular_content(&mut inner).write(pos, buf)?;
        inner.set_modified(self.clock.now());
        Ok(n)
    }

    /// Truncates the file to `size` if it is currently larger; the position
    /// is pulled back to `size` if it pointed past it.
    pub fn truncate(&mut self, size: u64) -> Result<()> {
        self.check_writable()?;
        let mut inner = self.file.lock();
        regular_content(&mut inner).truncate(size);
        inner.set_modified(self.clock.now());
        drop(inner);
        if self.pos > size {
            self.pos = size;
        }
        Ok(())
    }

    /// Writes up to `count` bytes starting at `pos` into `writer`. The
    /// channel position does not move.
    pub fn transfer_to(&mut self, pos: u64, count: u64, writer: &mut dyn io::Write) -> Result<u64> {
        self.check_readable()?;
        let mut inner = self.file.lock();
        let n = regular_content(&mut inner).transfer_to(pos, count, writer)?;
        inner.set_accessed(self.clock.now());
        Ok(n)
    }

    /// Reads up to `count` bytes from `reader`, writing them at `pos`. The
    /// channel position does not move.
    pub fn transfer_from(
        &mut self,
        reader: &mut dyn io::Read,
        pos: u64,
        count: u64,
    ) -> Result<u64> {
        self.check_writable()?;
        let mut inner = self.file.lock();
        let n = regular_content(&mut inner).transfer_from(reader, pos, count)?;
        inner.set_modified(self.clock.now());
        Ok(n)
    }

    /// Closes the channel, releasing its handle on the file and the
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

impl std::fmt::Debug for FileChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileChannel")
            .field("file", &self.file.id())
            .field("options", &self.options)
            .field("pos", &self.pos)
            .field("open", &self.open)
            .finish_non_exhaustive()
    }
}

impl io::Read for FileChannel {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        FileChannel::read(self, buf).map_err(io::Error::from)
    }
}

impl io::Write for FileChannel {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        FileChannel::write(self, buf).map_err(io::Error::from)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.check_open().map_err(io::Error::from)
    }
}

impl io::Seek for FileChannel {
    fn seek(&mut self, seek: SeekFrom) -> io::Result<u64> {
        let base = match seek {
            SeekFrom::Start(offset) => {
                self.set_position(offset).map_err(io::Error::from)?;
                return Ok(self.pos);
            }
            SeekFrom::Current(_) => self.pos as i64,
            SeekFrom::End(_) => self.size().map_err(io::Error::from)? as i64,
        };
        let delta = match seek {
            SeekFrom::Current(delta) | SeekFrom::End(delta) => delta,
            SeekFrom::Start(_) => 0,
        };
        let target = base + delta;
        if target < 0 {
            return Err(io::Error::from(Error::IllegalArgument(
                "cannot seek before the start of the file".to_owned(),
            )));
        }
        self.set_position(target as u64).map_err(io::Error::from)?;
        Ok(self.pos)
    }
}

impl Drop for FileChannel {
    fn drop(&mut self) {
        self.close();
    }
}
