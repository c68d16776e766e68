//! The `basic` attribute view.

use crate::attr::AttrValue;
use crate::attr::AttributeProvider;
use crate::attr::check_not_create;
use crate::attr::file_kind_flags;
use crate::attr::read_only;
use crate::attr::type_mismatch;
use crate::attr::unknown_attribute;
use crate::error::Result;
use crate::file::File;
use crate::file::FileKind;
use crate::time::FileTime;

/// Provider for the always-present `basic` view. Sizes, kind flags and the
/// file key are derived from the file itself; only the three timestamps are
/// settable.
pub(crate) struct BasicAttributeProvider;

const ATTRIBUTES: &[&str] = &[
    "size",
    "fileKey",
    "isDirectory",
    "isRegularFile",
    "isSymbolicLink",
    "isOther",
    "creationTime",
    "lastModifiedTime",
    "lastAccessTime",
];

impl AttributeProvider for BasicAttributeProvider {
    fn name(&self) -> &'static str {
        "basic"
    }

    fn fixed_attributes(&self) -> &'static [&'static str] {
        ATTRIBUTES
    }

    fn get(&self, file: &File, attr: &str) -> Option<AttrValue> {
        let (regular, directory, symlink) = file_kind_flags(file.kind());
        match attr {
            "size" => Some(AttrValue::Long(file.size())),
            "fileKey" => Some(AttrValue::Long(file.id())),
            "isDirectory" => Some(AttrValue::Bool(directory)),
            "isRegularFile" => Some(AttrValue::Bool(regular)),
            "isSymbolicLink" => Some(AttrValue::Bool(symlink)),
            "isOther" => Some(AttrValue::Bool(false)),
            "creationTime" => Some(AttrValue::Time(file.creation_time())),
            "lastModifiedTime" => Some(AttrValue::Time(file.last_modified_time())),
            "lastAccessTime" => Some(AttrValue::Time(file.last_access_time())),
            _ => None,
        }
    }

    fn set(&self, file: &File, attr: &str, value: AttrValue, create: bool) -> Result<()> {
        match attr {
            "creationTime" | "lastModifiedTime" | "lastAccessTime" => {
                check_not_create(self.name(), attr, create)?;
                let AttrValue::Time(time) = value else {
                    return Err(type_mismatch(self.name(), attr, "file-time", &value));
                };
                let mut inner = file.lock();
                match attr {
                    "creationTime" => inner.set_created(time),
                    "lastModifiedTime" => inner.set_modified(time),
                    _ => inner.set_accessed(time),
                }
                Ok(())
            }
            _ if ATTRIBUTES.contains(&attr) => Err(read_only(self.name(), attr, create)),
            _ => Err(unknown_attribute(self.name(), attr)),
        }
    }
}

/// A point-in-time snapshot of the `basic` view.
#[derive(Clone, Debug)]
pub struct BasicFileAttributes {
    size: u64,
    file_key: u64,
    kind: FileKind,
    creation_time: FileTime,
    last_modified_time: FileTime,
    last_access_time: FileTime,
}

impl BasicFileAttributes {
    pub(crate) fn read(file: &File) -> BasicFileAttributes {
        BasicFileAttributes {
            size: file.size(),
            file_key: file.id(),
            kind: file.kind(),
            creation_time: file.creation_time(),
            last_modified_time: file.last_modified_time(),
            last_access_time: file.last_access_time(),
        }
    }

    /// Content size in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// The file's unique key within its filesystem.
    pub fn file_key(&self) -> u64 {
        self.file_key
    }

    /// True for a directory.
    pub fn is_directory(&self) -> bool {
        self.kind == FileKind::Directory
    }

    /// True for a regular file.
    pub fn is_regular_file(&self) -> bool {
        self.kind == FileKind::Regular
    }

    /// True for a symbolic link.
    pub fn is_symbolic_link(&self) -> bool {
        self.kind == FileKind::SymbolicLink
    }

    /// Always false: every file is one of the three kinds.
    pub fn is_other(&self) -> bool {
        false
    }

    /// Creation timestamp.
    pub fn creation_time(&self) -> FileTime {
        self.creation_time
    }

    /// Last-modification timestamp.
    pub fn last_modified_time(&self) -> FileTime {
        self.last_modified_time
    }

    /// Last-access timestamp.
    pub fn last_access_time(&self) -> FileTime {
        self.last_access_time
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use crate::attr::AttrValue;
    use crate::attr::AttributeProvider;
    use crate::attr::basic::BasicAttributeProvider;
    use crate::disk::HeapDisk;
    use crate::error::Error;
    use crate::file::File;
    use crate::time::FileTime;

    fn file() -> Arc<File> {
        let disk = Arc::new(HeapDisk::new(8, 64, 8));
        File::new_regular(7, disk, FileTime::from_seconds(50))
    }

    #[test]
    fn derived_values() {
        let f = file();
        f.lock().regular_mut().unwrap().write(0, &[0; 10]).unwrap();
        let p = BasicAttributeProvider;
        assert_eq!(Some(AttrValue::Long(10)), p.get(&f, "size"));
        assert_eq!(Some(AttrValue::Long(7)), p.get(&f, "fileKey"));
        assert_eq!(Some(AttrValue::Bool(true)), p.get(&f, "isRegularFile"));
        assert_eq!(Some(AttrValue::Bool(false)), p.get(&f, "isDirectory"));
        assert_eq!(Some(AttrValue::Bool(false)), p.get(&f, "isOther"));
    }

    #[test]
    fn times_are_settable() {
        let f = file();
        let p = BasicAttributeProvider;
        let t = AttrValue::Time(FileTime::from_seconds(99));
        p.set(&f, "lastModifiedTime", t.clone(), false).unwrap();
        assert_eq!(Some(t), p.get(&f, "lastModifiedTime"));
    }

    #[test]
    fn size_is_read_only() {
        let f = file();
        let p = BasicAttributeProvider;
        let err = p.set(&f, "size", AttrValue::Long(1), false).unwrap_err();
        assert!(matches!(err, Error::IllegalArgument(_)));
        let err = p.set(&f, "size", AttrValue::Long(1), true).unwrap_err();
        assert!(matches!(err, Error::UnsupportedOperation(_)));
    }

    #[test]
    fn time_type_is_checked() {
        let f = file();
        let p = BasicAttributeProvider;
        let err = p
            .set(&f, "lastModifiedTime", AttrValue::Bool(true), false)
            .unwrap_err();
        assert!(matches!(err, Error::IllegalArgument(_)));
    }

    #[test]
    fn create_time_set_is_unsupported_even_for_writable() {
        let f = file();
        let p = BasicAttributeProvider;
        let err = p
            .set(
                &f,
                "lastModifiedTime",
                AttrValue::Time(FileTime::EPOCH),
                true,
            )
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedOperation(_)));
    }
}
