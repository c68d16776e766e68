//! Domain errors surfaced at the filesystem boundary.
//!
//! Errors of this type propagate to the caller unchanged; nothing in the
//! crate catches them internally. Programming errors (out-of-range indices,
//! broken invariants) panic instead.

use std::io;

use thiserror::Error;

/// Specialized `Result` for filesystem operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors reported by filesystem operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The path does not resolve to an existing file.
    #[error("no such file: {0}")]
    NoSuchFile(String),
    /// The target path already has an entry.
    #[error("file already exists: {0}")]
    FileAlreadyExists(String),
    /// A non-directory was found where a directory was required.
    #[error("not a directory: {0}")]
    NotDirectory(String),
    /// A directory was found where a non-directory was required.
    #[error("is a directory: {0}")]
    IsDirectory(String),
    /// The directory still has entries.
    #[error("directory not empty: {0}")]
    DirectoryNotEmpty(String),
    /// The file is not a symbolic link.
    #[error("not a symbolic link: {0}")]
    NotSymbolicLink(String),
    /// Symbolic link resolution exceeded the depth budget.
    #[error("too many levels of symbolic links: {0}")]
    Loop(String),
    /// The operation is not permitted on the target.
    #[error("access denied: {0}")]
    AccessDenied(String),
    /// The string cannot be parsed as a path of the filesystem's type.
    #[error("invalid path: {0}")]
    InvalidPath(String),
    /// The block pool is exhausted.
    #[error("out of space")]
    OutOfSpace,
    /// The filesystem has been closed.
    #[error("file system is closed")]
    ClosedFileSystem,
    /// The watch service has been closed.
    #[error("watch service is closed")]
    ClosedWatchService,
    /// The operation or attribute is not supported.
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),
    /// An argument is structurally valid but semantically rejected.
    #[error("illegal argument: {0}")]
    IllegalArgument(String),
    /// An I/O failure, e.g. an operation on a closed stream.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// A thread blocked in the watch service was interrupted.
    #[error("interrupted")]
    Interrupted,
}

impl From<Error> for io::Error {
    fn from(err: Error) -> io::Error {
        let kind = match &err {
            Error::NoSuchFile(_) => io::ErrorKind::NotFound,
            Error::FileAlreadyExists(_) => io::ErrorKind::AlreadyExists,
            Error::AccessDenied(_) => io::ErrorKind::PermissionDenied,
            Error::OutOfSpace => io::ErrorKind::StorageFull,
            Error::UnsupportedOperation(_) => io::ErrorKind::Unsupported,
            Error::IllegalArgument(_) | Error::InvalidPath(_) => io::ErrorKind::InvalidInput,
            Error::Interrupted => io::ErrorKind::Interrupted,
            Error::Io(e) => e.kind(),
            _ => io::ErrorKind::Other,
        };
        io::Error::new(kind, err.to_string())
    }
}

impl Error {
    /// Shorthand for the "closed stream" I/O failure shared by the stream
    /// adapters.
    pub(crate) fn closed_stream() -> Error {
        Error::Io(io::Error::new(io::ErrorKind::Other, "stream is closed"))
    }
}

#[cfg(test)]
mod test {
    use std::io;

    use crate::error::Error;

    #[test]
    fn io_error_kind_mapping() {
        let err: io::Error = Error::NoSuchFile("/a/b".to_owned()).into();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);

        let err: io::Error = Error::OutOfSpace.into();
        assert_eq!(err.kind(), io::ErrorKind::StorageFull);

        let err: io::Error = Error::UnsupportedOperation("'WRITE' not allowed".to_owned()).into();
        assert_eq!(err.kind(), io::ErrorKind::Unsupported);
    }

    #[test]
    fn display_includes_path() {
        let err = Error::DirectoryNotEmpty("/work".to_owned());
        assert_eq!(err.to_string(), "directory not empty: /work");
    }

    #[test]
    fn io_round_trip_preserves_kind() {
        let inner = io::Error::new(io::ErrorKind::WouldBlock, "try again");
        let err = Error::from(inner);
        let back: io::Error = err.into();
        assert_eq!(io::ErrorKind::WouldBlock, back.kind());
    }
}
