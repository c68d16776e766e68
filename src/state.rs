//! Filesystem lifecycle: open-handle counting and close-once teardown.

use parking_lot::Mutex;

use crate::error::Error;
use crate::error::Result;

type Disposer = Box<dyn FnOnce() + Send>;

struct StateInner {
    open_handles: usize,
    closed: bool,
    disposer: Option<Disposer>,
}

/// Shared lifecycle state for one filesystem.
///
/// Streams and channels register while open. `close` marks the filesystem
/// closed immediately (new operations fail with `ClosedFileSystem`) but
/// defers the registered disposer until the handle count drains to zero;
/// open streams keep working until their own close.
pub struct FileSystemState {
    inner: Mutex<StateInner>,
}

impl std::fmt::Debug for FileSystemState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("FileSystemState")
            .field("open_handles", &inner.open_handles)
            .field("closed", &inner.closed)
            .finish_non_exhaustive()
    }
}

impl FileSystemState {
    /// Creates open state with `disposer` to run at final teardown.
    pub(crate) fn new(disposer: Disposer) -> FileSystemState {
        FileSystemState {
            inner: Mutex::new(StateInner {
                open_handles: 0,
                closed: false,
                disposer: Some(disposer),
            }),
        }
    }

    /// Fails with `ClosedFileSystem` once [`close`](Self::close) has run.
    pub fn check_open(&self) -> Result<()> {
        if self.inner.lock().closed {
            Err(Error::ClosedFileSystem)
        } else {
            Ok(())
        }
    }

    /// True until the filesystem is closed.
    pub fn is_open(&self) -> bool {
        !self.inner.lock().closed
    }

    /// Number of registered open handles.
    pub fn open_handle_count(&self) -> usize {
        self.inner.lock().open_handles
    }

    /// Counts a newly opened stream or channel.
    pub(crate) fn register(&self) {
        self.inner.lock().open_handles += 1;
    }

    /// Counts a stream or channel close. The last close after the
    /// filesystem itself has closed runs the disposer.
    pub(crate) fn unregister(&self) {
        let disposer = {
            let mut inner = self.inner.lock();
            debug_assert!(inner.open_handles > 0, "open handle count underflow");
            inner.open_handles -= 1;
            if inner.closed && inner.open_handles == 0 {
                inner.disposer.take()
            } else {
                None
            }
        };
        if let Some(disposer) = disposer {
            disposer();
        }
    }

    /// Closes the filesystem. Idempotent; the disposer runs exactly once,
    /// immediately if no handles are open, otherwise at the last handle
    /// close.
    pub(crate) fn close(&self) {
        let disposer = {
            let mut inner = self.inner.lock();
            if inner.closed {
                return;
            }
            inner.closed = true;
            if inner.open_handles == 0 {
                inner.disposer.take()
            } else {
                None
            }
        };
        if let Some(disposer) = disposer {
            disposer();
        }
    }
}
