//! The inode: identity, link count, timestamps, attributes and content.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering;

use parking_lot::Mutex;
use parking_lot::MutexGuard;
#[cfg(feature = "serializable")]
use serde::Deserialize;
#[cfg(feature = "serializable")]
use serde::Serialize;

use crate::attr::AttrValue;
use crate::dir::Directory;
use crate::disk::HeapDisk;
use crate::path::EntryPath;
use crate::regular::RegularFile;
use crate::time::FileTime;

/// What a file is: the shape of its content.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub enum FileKind {
    /// A directory of named entries.
    Directory,
    /// A regular file holding bytes.
    Regular,
    /// A symbolic link holding a target path.
    SymbolicLink,
}

/// A file's content, matching its [`FileKind`].
#[derive(Debug)]
pub(crate) enum Content {
    Directory(Directory),
    Regular(RegularFile),
    Symlink(EntryPath),
}

/// The mutable part of a file, guarded by the file's lock.
#[derive(Debug)]
pub(crate) struct Inner {
    created: FileTime,
    modified: FileTime,
    accessed: FileTime,
    attrs: BTreeMap<String, AttrValue>,
    content: Content,
}

impl Inner {
    pub(crate) fn directory(&self) -> Option<&Directory> {
        match &self.content {
            Content::Directory(d) => Some(d),
            _ => None,
        }
    }

    pub(crate) fn directory_mut(&mut self) -> Option<&mut Directory> {
        match &mut self.content {
            Content::Directory(d) => Some(d),
            _ => None,
        }
    }

    pub(crate) fn regular(&self) -> Option<&RegularFile> {
        match &self.content {
            Content::Regular(r) => Some(r),
            _ => None,
        }
    }

    pub(crate) fn regular_mut(&mut self) -> Option<&mut RegularFile> {
        match &mut self.content {
            Content::Regular(r) => Some(r),
            _ => None,
        }
    }

    pub(crate) fn symlink_target(&self) -> Option<&EntryPath> {
        match &self.content {
            Content::Symlink(target) => Some(target),
            _ => None,
        }
    }

    pub(crate) fn created(&self) -> FileTime {
        self.created
    }

    pub(crate) fn modified(&self) -> FileTime {
        self.modified
    }

    pub(crate) fn accessed(&self) -> FileTime {
        self.accessed
    }

    pub(crate) fn set_created(&mut self, t: FileTime) {
        self.created = t;
    }

    pub(crate) fn set_modified(&mut self, t: FileTime) {
        self.modified = t;
    }

    pub(crate) fn set_accessed(&mut self, t: FileTime) {
        self.accessed = t;
    }

    pub(crate) fn attrs(&self) -> &BTreeMap<String, AttrValue> {
        &self.attrs
    }

    pub(crate) fn attrs_mut(&mut self) -> &mut BTreeMap<String, AttrValue> {
        &mut self.attrs
    }
}

/// A file: the indirection between directory entries and content.
///
/// The id is stable and unique within one filesystem. The hard-link count is
/// atomic so that directory tables can adjust it while holding only their
/// own lock; everything else mutable lives behind the file's single lock.
/// When two files must be locked together, [`lock_two`] takes them in
/// ascending id order.
pub struct File {
    id: u64,
    kind: FileKind,
    links: AtomicU32,
    inner: Mutex<Inner>,
}

impl File {
    fn inner(kind_content: Content, created: FileTime) -> Inner {
        Inner {
            created,
            modified: created,
            accessed: created,
            attrs: BTreeMap::new(),
            content: kind_content,
        }
    }

    /// Creates a directory file. Its parent pointer is wired up when it is
    /// linked into another directory.
    pub(crate) fn new_directory(id: u64, created: FileTime) -> Arc<File> {
        Arc::new_cyclic(|this| File {
            id,
            kind: FileKind::Directory,
            links: AtomicU32::new(0),
            inner: Mutex::new(File::inner(
                Content::Directory(Directory::new(this.clone())),
                created,
            )),
        })
    }

    /// Creates a root directory: one that is its own parent.
    pub(crate) fn new_root_directory(id: u64, created: FileTime) -> Arc<File> {
        Arc::new_cyclic(|this| File {
            id,
            kind: FileKind::Directory,
            links: AtomicU32::new(0),
            inner: Mutex::new(File::inner(
                Content::Directory(Directory::new_root(this.clone())),
                created,
            )),
        })
    }

    /// Creates a regular file with empty content backed by `disk`.
    pub(crate) fn new_regular(id: u64, disk: Arc<HeapDisk>, created: FileTime) -> Arc<File> {
        Arc::new(File {
            id,
            kind: FileKind::Regular,
            links: AtomicU32::new(0),
            inner: Mutex::new(File::inner(Content::Regular(RegularFile::new(disk)), created)),
        })
    }

    /// Creates a symbolic link holding `target` verbatim.
    pub(crate) fn new_symlink(id: u64, target: EntryPath, created: FileTime) -> Arc<File> {
        Arc::new(File {
            id,
            kind: FileKind::SymbolicLink,
            links: AtomicU32::new(0),
            inner: Mutex::new(File::inner(Content::Symlink(target), created)),
        })
    }

    /// The file's stable identity within its filesystem.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The shape of the file's content.
    pub fn kind(&self) -> FileKind {
        self.kind
    }

    /// True if this file is a directory.
    pub fn is_directory(&self) -> bool {
        self.kind == FileKind::Directory
    }

    /// True if this file is a regular file.
    pub fn is_regular(&self) -> bool {
        self.kind == FileKind::Regular
    }

    /// True if this file is a symbolic link.
    pub fn is_symlink(&self) -> bool {
        self.kind == FileKind::SymbolicLink
    }

    /// Number of directory entries pointing at this file.
    pub fn links(&self) -> u32 {
        self.links.load(Ordering::Acquire)
    }

    pub(crate) fn incr_links(&self) {
        self.links.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn decr_links(&self) {
        let prev = self.links.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(prev > 0, "link count underflow");
    }

    /// Content size in bytes: the byte count for a regular file, zero for
    /// directories and symbolic links.
    pub fn size(&self) -> u64 {
        self.inner
            .lock()
            .regular()
            .map(|r| r.size())
            .unwrap_or(0)
    }

    /// Creation timestamp.
    pub fn creation_time(&self) -> FileTime {
        self.inner.lock().created()
    }

    /// Last-modification timestamp.
    pub fn last_modified_time(&self) -> FileTime {
        self.inner.lock().modified()
    }

    /// Last-access timestamp.
    pub fn last_access_time(&self) -> FileTime {
        self.inner.lock().accessed()
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock()
    }

    /// The symbolic link target, if this file is a symlink.
    pub(crate) fn symlink_target(&self) -> Option<EntryPath> {
        self.inner.lock().symlink_target().cloned()
    }

    /// A single stored attribute, by `"view:attr"` key.
    pub(crate) fn attr(&self, key: &str) -> Option<AttrValue> {
        self.inner.lock().attrs().get(key).cloned()
    }

    pub(crate) fn set_attr(&self, key: impl Into<String>, value: AttrValue) {
        self.inner.lock().attrs_mut().insert(key.into(), value);
    }

    pub(crate) fn remove_attr(&self, key: &str) -> Option<AttrValue> {
        self.inner.lock().attrs_mut().remove(key)
    }

    /// Stored attribute keys beginning with `"view:"`, in sorted order.
    pub(crate) fn attr_keys_for_view(&self, view: &str) -> Vec<String> {
        let prefix = format!("{view}:");
        self.inner
            .lock()
            .attrs()
            .keys()
            .filter(|k| k.starts_with(&prefix))
            .cloned()
            .collect()
    }

    /// Registers one more open handle on a regular file.
    pub(crate) fn opened(&self) {
        if let Some(regular) = self.inner.lock().regular_mut() {
            regular.opened();
        }
    }

    /// Drops one open handle; on the last close of an unlinked file the
    /// content's blocks go back to the disk.
    pub(crate) fn closed(&self) {
        let mut inner = self.inner.lock();
        if let Some(regular) = inner.regular_mut() {
            if regular.closed() == 0 && self.links() == 0 {
                regular.delete_contents();
            }
        }
    }

    /// Releases content after an unlink if no open handle keeps it alive.
    pub(crate) fn maybe_reclaim(&self) {
        if self.links() > 0 {
            return;
        }
        let mut inner = self.inner.lock();
        if let Some(regular) = inner.regular_mut() {
            if regular.open_count() == 0 {
                regular.delete_contents();
            }
        }
    }
}

impl fmt::Debug for File {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("File")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("links", &self.links())
            .finish_non_exhaustive()
    }
}

/// Locks two distinct files in ascending id order, returning the guards in
/// argument order.
pub(crate) fn lock_two<'a>(
    a: &'a File,
    b: &'a File,
) -> (MutexGuard<'a, Inner>, MutexGuard<'a, Inner>) {
    debug_assert_ne!(a.id, b.id, "attempted to lock a file against itself");
    if a.id < b.id {
        let ga = a.inner.lock();
        let gb = b.inner.lock();
        (ga, gb)
    } else {
        let gb = b.inner.lock();
        let ga = a.inner.lock();
        (ga, gb)
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use crate::attr::AttrValue;
    use crate::disk::HeapDisk;
    use crate::file::File;
    use crate::file::FileKind;
    use crate::file::lock_two;
    use crate::time::FileTime;

    fn disk() -> Arc<HeapDisk> {
        Arc::new(HeapDisk::new(4, 64, 8))
    }

    #[test]
    fn kinds() {
        let d = File::new_directory(1, FileTime::EPOCH);
        let r = File::new_regular(2, disk(), FileTime::EPOCH);
        let l = File::new_symlink(3, crate::path::EntryPath::empty(), FileTime::EPOCH);
        assert_eq!(FileKind::Directory, d.kind());
        assert!(d.is_directory() && !d.is_regular() && !d.is_symlink());
        assert!(r.is_regular());
        assert!(l.is_symlink());
    }

    #[test]
    fn link_counting() {
        let f = File::new_regular(1, disk(), FileTime::EPOCH);
        assert_eq!(0, f.links());
        f.incr_links();
        f.incr_links();
        assert_eq!(2, f.links());
        f.decr_links();
        assert_eq!(1, f.links());
    }

    #[test]
    fn reclaim_waits_for_open_handles() {
        let f = File::new_regular(1, disk(), FileTime::EPOCH);
        f.lock().regular_mut().unwrap().write(0, &[1; 10]).unwrap();
        assert!(f.lock().regular().unwrap().block_count() > 0);

        f.opened();
        // Unlinked while open: content must survive.
        f.maybe_reclaim();
        assert!(f.lock().regular().unwrap().block_count() > 0);
        // Last close releases it.
        f.closed();
        assert_eq!(0, f.lock().regular().unwrap().block_count());
    }

    #[test]
    fn attrs_round_trip() {
        let f = File::new_regular(1, disk(), FileTime::EPOCH);
        f.set_attr("dos:hidden", AttrValue::Bool(true));
        assert_eq!(Some(AttrValue::Bool(true)), f.attr("dos:hidden"));
        assert_eq!(vec!["dos:hidden".to_owned()], f.attr_keys_for_view("dos"));
        f.remove_attr("dos:hidden");
        assert_eq!(None, f.attr("dos:hidden"));
    }

    #[test]
    fn lock_two_orders_by_id() {
        let a = File::new_regular(1, disk(), FileTime::EPOCH);
        let b = File::new_regular(2, disk(), FileTime::EPOCH);
        // Either argument order works without deadlocking in sequence.
        {
            let (_ga, _gb) = lock_two(&a, &b);
        }
        {
            let (_gb, _ga) = lock_two(&b, &a);
        }
    }

    #[test]
    fn size_is_zero_for_non_regular() {
        let d = File::new_directory(1, FileTime::EPOCH);
        assert_eq!(0, d.size());
    }
}
