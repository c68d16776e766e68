//! Parsing and validation of open, copy and link option sets.

use std::fmt;

use bitflags::bitflags;

use crate::error::Error;
use crate::error::Result;

/// Options for opening a file.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum OpenOption {
    /// Open for reading.
    Read,
    /// Open for writing.
    Write,
    /// Open for writing with every write at the end of file.
    Append,
    /// Truncate existing content when opening for write.
    TruncateExisting,
    /// Create the file if it does not exist.
    Create,
    /// Create the file, failing if it already exists.
    CreateNew,
    /// Accepted and ignored: in-memory content has no sparse representation.
    Sparse,
    /// Accepted and ignored: there is no device to sync to.
    Sync,
    /// Accepted and ignored: there is no device to sync to.
    Dsync,
    /// Do not follow a trailing symbolic link.
    NofollowLinks,
}

impl fmt::Display for OpenOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OpenOption::Read => "READ",
            OpenOption::Write => "WRITE",
            OpenOption::Append => "APPEND",
            OpenOption::TruncateExisting => "TRUNCATE_EXISTING",
            OpenOption::Create => "CREATE",
            OpenOption::CreateNew => "CREATE_NEW",
            OpenOption::Sparse => "SPARSE",
            OpenOption::Sync => "SYNC",
            OpenOption::Dsync => "DSYNC",
            OpenOption::NofollowLinks => "NOFOLLOW_LINKS",
        };
        f.write_str(s)
    }
}

bitflags! {
    /// A collapsed set of open options. Duplicates in the input fold into
    /// one bit.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct OpenOptions: u16 {
        /// READ
        const READ = 1 << 0;
        /// WRITE
        const WRITE = 1 << 1;
        /// APPEND
        const APPEND = 1 << 2;
        /// TRUNCATE_EXISTING
        const TRUNCATE_EXISTING = 1 << 3;
        /// CREATE
        const CREATE = 1 << 4;
        /// CREATE_NEW
        const CREATE_NEW = 1 << 5;
        /// SPARSE
        const SPARSE = 1 << 6;
        /// SYNC
        const SYNC = 1 << 7;
        /// DSYNC
        const DSYNC = 1 << 8;
        /// NOFOLLOW_LINKS
        const NOFOLLOW_LINKS = 1 << 9;
    }
}

impl From<OpenOption> for OpenOptions {
    fn from(option: OpenOption) -> OpenOptions {
        match option {
            OpenOption::Read => OpenOptions::READ,
            OpenOption::Write => OpenOptions::WRITE,
            OpenOption::Append => OpenOptions::APPEND,
            OpenOption::TruncateExisting => OpenOptions::TRUNCATE_EXISTING,
            OpenOption::Create => OpenOptions::CREATE,
            OpenOption::CreateNew => OpenOptions::CREATE_NEW,
            OpenOption::Sparse => OpenOptions::SPARSE,
            OpenOption::Sync => OpenOptions::SYNC,
            OpenOption::Dsync => OpenOptions::DSYNC,
            OpenOption::NofollowLinks => OpenOptions::NOFOLLOW_LINKS,
        }
    }
}

impl OpenOptions {
    fn collapse(options: &[OpenOption]) -> OpenOptions {
        options
            .iter()
            .fold(OpenOptions::empty(), |set, &option| set | option.into())
    }

    /// Validates options for an input stream. WRITE and APPEND are refused;
    /// READ is implied.
    pub fn for_input_stream(options: &[OpenOption]) -> Result<OpenOptions> {
        for &option in options {
            if matches!(option, OpenOption::Write | OpenOption::Append) {
                return Err(Error::UnsupportedOperation(format!("'{option}' not allowed")));
            }
        }
        Ok(OpenOptions::collapse(options) | OpenOptions::READ)
    }

    /// Validates options for an output stream. READ is refused; WRITE is
    /// implied.
    pub fn for_output_stream(options: &[OpenOption]) -> Result<OpenOptions> {
        for &option in options {
            if matches!(option, OpenOption::Read) {
                return Err(Error::UnsupportedOperation(format!("'{option}' not allowed")));
            }
        }
        Ok(OpenOptions::collapse(options) | OpenOptions::WRITE)
    }

    /// Validates options for a file channel. READ combined with APPEND is
    /// refused; with none of READ/WRITE/APPEND present the channel defaults
    /// to read-only; APPEND implies WRITE.
    pub fn for_channel(options: &[OpenOption]) -> Result<OpenOptions> {
        let mut set = OpenOptions::collapse(options);
        if set.contains(OpenOptions::READ | OpenOptions::APPEND) {
            return Err(Error::UnsupportedOperation(
                "'READ' + 'APPEND' not allowed".to_owned(),
            ));
        }
        if set.contains(OpenOptions::APPEND) {
            set |= OpenOptions::WRITE;
        } else if !set.intersects(OpenOptions::READ | OpenOptions::WRITE) {
            set |= OpenOptions::READ;
        }
        Ok(set)
    }

    /// True if the set allows reading.
    pub fn is_readable(self) -> bool {
        self.contains(OpenOptions::READ)
    }

    /// True if the set allows writing.
    pub fn is_writable(self) -> bool {
        self.contains(OpenOptions::WRITE)
    }

    /// True if writes go to the end of file.
    pub fn is_append(self) -> bool {
        self.contains(OpenOptions::APPEND)
    }
}

/// Options for copy and move operations.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum CopyOption {
    /// Replace an existing file at the target.
    ReplaceExisting,
    /// Copy the source's attributes to the target.
    CopyAttributes,
    /// Move as a single atomic operation.
    AtomicMove,
    /// Do not follow a trailing symbolic link on the source.
    NofollowLinks,
}

bitflags! {
    /// A collapsed set of copy options.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct CopyOptions: u8 {
        /// REPLACE_EXISTING
        const REPLACE_EXISTING = 1 << 0;
        /// COPY_ATTRIBUTES
        const COPY_ATTRIBUTES = 1 << 1;
        /// ATOMIC_MOVE
        const ATOMIC_MOVE = 1 << 2;
        /// NOFOLLOW_LINKS
        const NOFOLLOW_LINKS = 1 << 3;
    }
}

impl CopyOptions {
    /// Collapses a list of copy options into a set.
    pub fn from_options(options: &[CopyOption]) -> CopyOptions {
        options
            .iter()
            .fold(CopyOptions::empty(), |set, option| {
                set | match option {
                    CopyOption::ReplaceExisting => CopyOptions::REPLACE_EXISTING,
                    CopyOption::CopyAttributes => CopyOptions::COPY_ATTRIBUTES,
                    CopyOption::AtomicMove => CopyOptions::ATOMIC_MOVE,
                    CopyOption::NofollowLinks => CopyOptions::NOFOLLOW_LINKS,
                }
            })
    }

    /// Validates the set for a copy (not a move): ATOMIC_MOVE is refused.
    pub fn for_copy(options: &[CopyOption]) -> Result<CopyOptions> {
        let set = CopyOptions::from_options(options);
        if set.contains(CopyOptions::ATOMIC_MOVE) {
            return Err(Error::UnsupportedOperation(
                "'ATOMIC_MOVE' not allowed for copy".to_owned(),
            ));
        }
        Ok(set)
    }

    /// Validates the set for a move. COPY_ATTRIBUTES is meaningless for a
    /// move (attributes travel with the file) and is refused.
    pub fn for_move(options: &[CopyOption]) -> Result<CopyOptions> {
        let set = CopyOptions::from_options(options);
        if set.contains(CopyOptions::COPY_ATTRIBUTES) {
            return Err(Error::UnsupportedOperation(
                "'COPY_ATTRIBUTES' not allowed for move".to_owned(),
            ));
        }
        Ok(set)
    }
}

/// Options for operations that may follow symbolic links.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum LinkOption {
    /// Do not follow a trailing symbolic link.
    NofollowLinks,
}

/// True when `options` asks for the trailing symlink itself.
pub(crate) fn nofollow(options: &[LinkOption]) -> bool {
    options.contains(&LinkOption::NofollowLinks)
}
