//! An in-memory filesystem.
//!
//! `heapfs` keeps a whole hierarchical file tree on the heap: directories,
//! regular files, symbolic links, attributes and watch state. Nothing ever
//! touches the host OS, which makes it a drop-in stand-in for a disk-backed
//! filesystem in tests and sandboxed tools.
//!
//! ```
//! use std::io::Read;
//!
//! use heapfs::Config;
//! use heapfs::FileSystem;
//!
//! # fn main() -> heapfs::Result<()> {
//! let fs = FileSystem::new(Config::unix())?;
//! let dir = fs.path("/data")?;
//! fs.create_directory(&dir)?;
//!
//! let file = fs.path("/data/hello.txt")?;
//! let mut out = fs.new_output_stream(&file, &[])?;
//! out.write(b"hello world")?;
//! out.close();
//!
//! let mut text = String::new();
//! fs.new_input_stream(&file, &[])?.read_to_string(&mut text)?;
//! assert_eq!("hello world", text);
//! # Ok(())
//! # }
//! ```

#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub
)]

pub use crate::attr::AttrValue;
pub use crate::attr::AttributeProvider;
pub use crate::attr::AttributeService;
pub use crate::attr::BasicFileAttributes;
pub use crate::attr::DosFileAttributes;
pub use crate::attr::GroupPrincipal;
pub use crate::attr::PosixFileAttributes;
pub use crate::attr::PosixPermissions;
pub use crate::attr::UserPrincipal;
pub use crate::channel::FileChannel;
pub use crate::config::Config;
pub use crate::config::ConfigBuilder;
pub use crate::config::Features;
pub use crate::dir::DirEntry;
pub use crate::dir::Directory;
pub use crate::disk::Block;
pub use crate::disk::HeapDisk;
pub use crate::error::Error;
pub use crate::error::Result;
pub use crate::file::File;
pub use crate::file::FileKind;
pub use crate::fs::FileSystem;
pub use crate::matcher::PathMatcher;
pub use crate::name::Name;
pub use crate::name::Normalization;
pub use crate::options::CopyOption;
pub use crate::options::CopyOptions;
pub use crate::options::LinkOption;
pub use crate::options::OpenOption;
pub use crate::options::OpenOptions;
pub use crate::path::EntryPath;
pub use crate::path::PathService;
pub use crate::path::PathType;
pub use crate::regular::RegularFile;
pub use crate::state::FileSystemState;
pub use crate::stream::InputStream;
pub use crate::stream::OutputStream;
pub use crate::time::FileTime;
pub use crate::time::FileTimeSource;
pub use crate::time::FixedTimeSource;
pub use crate::time::SystemTimeSource;
pub use crate::watch::EventKind;
pub use crate::watch::MAX_QUEUE_SIZE;
pub use crate::watch::WatchEvent;
pub use crate::watch::WatchKey;
pub use crate::watch::WatchService;

mod attr;
mod channel;
mod config;
mod dir;
mod disk;
mod error;
mod file;
mod fs;
mod matcher;
mod name;
mod options;
mod path;
mod regular;
mod state;
mod stream;
mod time;
mod watch;
