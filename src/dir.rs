//! The directory entry table.

use std::collections::hash_map::DefaultHasher;
use std::hash::Hash;
use std::hash::Hasher;
use std::sync::Arc;
use std::sync::Weak;

use crate::error::Error;
use crate::error::Result;
use crate::file::File;
use crate::name::Name;

/// Smallest table capacity; always a power of two.
const MIN_TABLE_SIZE: usize = 16;

/// A live directory entry: a name bound to a file.
#[derive(Clone, Debug)]
pub struct DirEntry {
    /// The entry's name within its directory.
    pub name: Name,
    /// The file the entry points at.
    pub file: Arc<File>,
}

#[derive(Debug)]
enum Slot {
    Empty,
    /// A deleted entry. Participates in probe chains until the next rehash.
    Tombstone,
    Occupied(DirEntry),
}

/// Directory content: an open-addressed hash table of entries keyed by
/// canonical name, with linear probing and tombstone deletion.
///
/// The table rehashes (discarding tombstones) once live entries plus
/// tombstones reach 3/4 of capacity. The `.` and `..` entries are not
/// stored; they are synthesized from the `this`/`parent` back-pointers on
/// read, so a lookup of either never misses.
#[derive(Debug)]
pub struct Directory {
    slots: Box<[Slot]>,
    live: usize,
    tombstones: usize,
    this: Weak<File>,
    parent: Weak<File>,
}

fn new_slots(capacity: usize) -> Box<[Slot]> {
    let mut v = Vec::with_capacity(capacity);
    v.resize_with(capacity, || Slot::Empty);
    v.into_boxed_slice()
}

fn hash_name(name: &Name) -> u64 {
    let mut h = DefaultHasher::new();
    name.canonical().hash(&mut h);
    h.finish()
}

enum Probe {
    /// The name is present at this index.
    Found(usize),
    /// The name is absent; this is where it would be inserted.
    Insert(usize),
}

impl Directory {
    /// Creates an empty table for the directory file `this`. The parent
    /// pointer starts unset and is wired up when the directory is linked.
    pub(crate) fn new(this: Weak<File>) -> Directory {
        Directory {
            slots: new_slots(MIN_TABLE_SIZE),
            live: 0,
            tombstones: 0,
            this,
            parent: Weak::new(),
        }
    }

    /// Creates the table for a root directory, whose parent is itself.
    pub(crate) fn new_root(this: Weak<File>) -> Directory {
        Directory {
            slots: new_slots(MIN_TABLE_SIZE),
            live: 0,
            tombstones: 0,
            parent: this.clone(),
            this,
        }
    }

    /// Number of live entries, excluding `.` and `..`.
    pub fn entry_count(&self) -> usize {
        self.live
    }

    /// True when the directory has no entries other than `.` and `..`.
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// True for a root directory, i.e. one that is its own parent.
    pub fn is_root(&self) -> bool {
        Weak::ptr_eq(&self.this, &self.parent)
    }

    /// The directory file this table belongs to.
    pub fn self_file(&self) -> Option<Arc<File>> {
        self.this.upgrade()
    }

    /// The parent directory file, if linked.
    pub fn parent(&self) -> Option<Arc<File>> {
        self.parent.upgrade()
    }

    pub(crate) fn set_parent(&mut self, parent: Weak<File>) {
        self.parent = parent;
    }

    fn probe(&self, name: &Name) -> Probe {
        let mask = self.slots.len() - 1;
        let mut index = hash_name(name) as usize & mask;
        let mut first_tombstone = None;
        loop {
            match &self.slots[index] {
                Slot::Empty => {
                    return Probe::Insert(first_tombstone.unwrap_or(index));
                }
                Slot::Tombstone => {
                    if first_tombstone.is_none() {
                        first_tombstone = Some(index);
                    }
                }
                Slot::Occupied(entry) => {
                    if entry.name == *name {
                        return Probe::Found(index);
                    }
                }
            }
            index = (index + 1) & mask;
        }
    }

    /// Looks up `name`. `.` resolves to this directory's own file and `..`
    /// to its parent.
    pub fn get(&self, name: &Name) -> Option<Arc<File>> {
        if name.is_self() {
            return self.this.upgrade();
        }
        if name.is_parent() {
            return self.parent.upgrade();
        }
        match self.probe(name) {
            Probe::Found(index) => match &self.slots[index] {
                Slot::Occupied(entry) => Some(entry.file.clone()),
                _ => unreachable!("probe returned a non-occupied slot"),
            },
            Probe::Insert(_) => None,
        }
    }

    /// Binds `name` to `file` and increments the file's link count.
    ///
    /// Fails with `IllegalArgument` for the reserved names (`.`, `..`, the
    /// empty name) and `FileAlreadyExists` if the name is taken.
    pub fn link(&mut self, name: Name, file: Arc<File>) -> Result<()> {
        if name.is_reserved() {
            return Err(Error::IllegalArgument(format!(
                "cannot link reserved name \"{name}\""
            )));
        }
        self.ensure_room();
        match self.probe(&name) {
            Probe::Found(_) => Err(Error::FileAlreadyExists(name.display().to_owned())),
            Probe::Insert(index) => {
                if matches!(self.slots[index], Slot::Tombstone) {
                    self.tombstones -= 1;
                }
                file.incr_links();
                self.slots[index] = Slot::Occupied(DirEntry { name, file });
                self.live += 1;
                Ok(())
            }
        }
    }

    /// Removes the entry for `name`, decrements the file's link count, and
    /// returns the unlinked file.
    ///
    /// Fails with `IllegalArgument` for `.`/`..` and `NoSuchFile` when the
    /// name is absent.
    pub fn unlink(&mut self, name: &Name) -> Result<Arc<File>> {
        if name.is_self() || name.is_parent() {
            return Err(Error::IllegalArgument(format!(
                "cannot unlink \"{name}\""
            )));
        }
        match self.probe(name) {
            Probe::Found(index) => {
                let slot = std::mem::replace(&mut self.slots[index], Slot::Tombstone);
                self.live -= 1;
                self.tombstones += 1;
                match slot {
                    Slot::Occupied(entry) => {
                        entry.file.decr_links();
                        Ok(entry.file)
                    }
                    _ => unreachable!("probe returned a non-occupied slot"),
                }
            }
            Probe::Insert(_) => Err(Error::NoSuchFile(name.display().to_owned())),
        }
    }

    /// Snapshot of all entries. The first two are always `.` and `..`; the
    /// rest come in table order, which is otherwise unspecified.
    pub fn entries(&self) -> Vec<DirEntry> {
        let mut out = Vec::with_capacity(self.live + 2);
        if let Some(this) = self.this.upgrade() {
            out.push(DirEntry {
                name: Name::self_name(),
                file: this,
            });
        }
        if let Some(parent) = self.parent.upgrade() {
            out.push(DirEntry {
                name: Name::parent_name(),
                file: parent,
            });
        }
        out.extend(self.live_entries().cloned());
        out
    }

    /// Iterates the live entries in table order, without `.` and `..`.
    pub fn live_entries(&self) -> impl Iterator<Item = &DirEntry> {
        self.slots.iter().filter_map(|slot| match slot {
            Slot::Occupied(entry) => Some(entry),
            _ => None,
        })
    }

    /// Rehashes when the next insert would push live + tombstone load to 3/4
    /// of capacity. Tombstones are dropped; capacity grows from the live
    /// count alone.
    fn ensure_room(&mut self) {
        if (self.live + self.tombstones + 1) * 4 <= self.slots.len() * 3 {
            return;
        }
        let capacity = ((self.live + 1) * 2)
            .next_power_of_two()
            .max(MIN_TABLE_SIZE);
        let old = std::mem::replace(&mut self.slots, new_slots(capacity));
        self.tombstones = 0;
        let mask = capacity - 1;
        for slot in old {
            if let Slot::Occupied(entry) = slot {
                let mut index = hash_name(&entry.name) as usize & mask;
                while !matches!(self.slots[index], Slot::Empty) {
                    index = (index + 1) & mask;
                }
                self.slots[index] = Slot::Occupied(entry);
            }
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use crate::disk::HeapDisk;
    use crate::file::File;
    use crate::file::FileKind;
    use crate::name::Name;
    use crate::time::FileTime;

    use super::Directory;

    fn regular(id: u64) -> Arc<File> {
        let disk = Arc::new(HeapDisk::new(8, 1024, 16));
        File::new_regular(id, disk, FileTime::EPOCH)
    }

    fn directory(id: u64) -> Arc<File> {
        File::new_directory(id, FileTime::EPOCH)
    }

    fn root(id: u64) -> Arc<File> {
        File::new_root_directory(id, FileTime::EPOCH)
    }

    fn with_dir<R>(file: &Arc<File>, f: impl FnOnce(&mut Directory) -> R) -> R {
        let mut guard = file.lock();
        f(guard.directory_mut().unwrap())
    }

    #[test]
    fn link_get_unlink() {
        let dir = directory(1);
        let child = regular(2);
        with_dir(&dir, |d| d.link(Name::simple("a"), child.clone())).unwrap();
        assert_eq!(1, child.links());

        let got = with_dir(&dir, |d| d.get(&Name::simple("a"))).unwrap();
        assert_eq!(2, got.id());

        let unlinked = with_dir(&dir, |d| d.unlink(&Name::simple("a"))).unwrap();
        assert_eq!(2, unlinked.id());
        assert_eq!(0, child.links());
        assert!(with_dir(&dir, |d| d.get(&Name::simple("a"))).is_none());
    }

    #[test]
    fn duplicate_link_fails() {
        let dir = directory(1);
        with_dir(&dir, |d| d.link(Name::simple("a"), regular(2))).unwrap();
        let err = with_dir(&dir, |d| d.link(Name::simple("a"), regular(3))).unwrap_err();
        assert!(matches!(err, crate::Error::FileAlreadyExists(_)));
    }

    #[test]
    fn reserved_names_rejected() {
        let dir = directory(1);
        for name in [".", "..", ""] {
            let err = with_dir(&dir, |d| d.link(Name::simple(name), regular(2))).unwrap_err();
            assert!(matches!(err, crate::Error::IllegalArgument(_)));
        }
        for name in [".", ".."] {
            let err = with_dir(&dir, |d| d.unlink(&Name::simple(name))).unwrap_err();
            assert!(matches!(err, crate::Error::IllegalArgument(_)));
        }
    }

    #[test]
    fn dot_and_dotdot_resolve_through_back_pointers() {
        let parent = directory(1);
        let child = directory(2);
        with_dir(&parent, |d| d.link(Name::simple("sub"), child.clone())).unwrap();
        with_dir(&child, |d| d.set_parent(Arc::downgrade(&parent)));

        let this = with_dir(&child, |d| d.get(&Name::self_name())).unwrap();
        assert_eq!(2, this.id());
        let up = with_dir(&child, |d| d.get(&Name::parent_name())).unwrap();
        assert_eq!(1, up.id());
    }

    #[test]
    fn root_is_its_own_parent() {
        let r = root(1);
        with_dir(&r, |d| {
            assert!(d.is_root());
            let parent = d.get(&Name::parent_name()).unwrap();
            assert_eq!(1, parent.id());
        });
        let plain = directory(2);
        with_dir(&plain, |d| assert!(!d.is_root()));
    }

    #[test]
    fn entries_start_with_dot_and_dotdot() {
        let parent = root(1);
        let dir = directory(2);
        with_dir(&parent, |d| d.link(Name::simple("x"), dir.clone())).unwrap();
        with_dir(&dir, |d| d.set_parent(Arc::downgrade(&parent)));
        with_dir(&dir, |d| d.link(Name::simple("a"), regular(3))).unwrap();
        with_dir(&dir, |d| d.link(Name::simple("b"), regular(4))).unwrap();

        let entries = with_dir(&dir, |d| d.entries());
        assert_eq!(4, entries.len());
        assert!(entries[0].name.is_self());
        assert_eq!(2, entries[0].file.id());
        assert!(entries[1].name.is_parent());
        assert_eq!(1, entries[1].file.id());
        let mut rest: Vec<_> = entries[2..]
            .iter()
            .map(|e| e.name.display().to_owned())
            .collect();
        rest.sort();
        assert_eq!(vec!["a", "b"], rest);
    }

    #[test]
    fn survives_rehash_and_tombstones() {
        let dir = directory(1);
        // Grow well past the initial capacity, with interleaved deletions so
        // tombstones pile up and get cleared by rehashes.
        with_dir(&dir, |d| {
            for i in 0..200u64 {
                d.link(Name::simple(format!("f{i}")), regular(i + 10)).unwrap();
                if i % 3 == 0 {
                    d.unlink(&Name::simple(format!("f{i}"))).unwrap();
                }
            }
            for i in 0..200u64 {
                let got = d.get(&Name::simple(format!("f{i}")));
                if i % 3 == 0 {
                    assert!(got.is_none(), "f{i} should be deleted");
                } else {
                    assert_eq!(i + 10, got.unwrap().id());
                }
            }
            assert_eq!(200 - 67, d.entry_count());
        });
    }

    #[test]
    fn tombstone_slot_is_reusable() {
        let dir = directory(1);
        with_dir(&dir, |d| {
            d.link(Name::simple("a"), regular(2)).unwrap();
            d.unlink(&Name::simple("a")).unwrap();
            d.link(Name::simple("a"), regular(3)).unwrap();
            assert_eq!(3, d.get(&Name::simple("a")).unwrap().id());
            assert_eq!(1, d.entry_count());
        });
    }

    #[test]
    fn canonical_equality_governs_lookup() {
        let dir = directory(1);
        with_dir(&dir, |d| {
            d.link(Name::create("Foo", "foo"), regular(2)).unwrap();
            // Same canonical form finds the entry; display differs.
            assert_eq!(2, d.get(&Name::create("FOO", "foo")).unwrap().id());
            assert!(d.get(&Name::simple("Foo")).is_none());
        });
    }
}
