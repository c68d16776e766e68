//! The `unix` attribute view: read-only values synthesized from the rest of
//! the file's state.

use std::collections::hash_map::DefaultHasher;
use std::hash::Hash;
use std::hash::Hasher;

use crate::attr::AttrValue;
use crate::attr::AttributeProvider;
use crate::attr::PosixPermissions;
use crate::attr::read_only;
use crate::attr::unknown_attribute;
use crate::error::Result;
use crate::file::File;
use crate::file::FileKind;

const ATTRIBUTES: &[&str] = &["uid", "gid", "mode", "ctime", "nlink", "dev", "rdev", "ino"];

/// Mode bits for the file kind, as `stat(2)` reports them.
fn kind_mode_bits(kind: FileKind) -> u32 {
    match kind {
        FileKind::Directory => 0o040000,
        FileKind::Regular => 0o100000,
        FileKind::SymbolicLink => 0o120000,
    }
}

/// A stable non-negative id derived from a principal name. There is no real
/// user database to consult; equal names map to equal ids.
fn principal_id(name: &str) -> i32 {
    let mut h = DefaultHasher::new();
    name.hash(&mut h);
    (h.finish() & 0x7fff_ffff) as i32
}

pub(crate) struct UnixAttributeProvider;

impl AttributeProvider for UnixAttributeProvider {
    fn name(&self) -> &'static str {
        "unix"
    }

    fn inherits(&self) -> &'static [&'static str] {
        &["basic", "owner", "posix"]
    }

    fn fixed_attributes(&self) -> &'static [&'static str] {
        ATTRIBUTES
    }

    fn get(&self, file: &File, attr: &str) -> Option<AttrValue> {
        match attr {
            "uid" => match file.attr("owner:owner") {
                Some(AttrValue::User(user)) => Some(AttrValue::Int(principal_id(user.name()))),
                _ => None,
            },
            "gid" => match file.attr("posix:group") {
                Some(AttrValue::Group(group)) => {
                    Some(AttrValue::Int(principal_id(group.name())))
                }
                _ => None,
            },
            "mode" => {
                let perms = match file.attr("posix:permissions") {
                    Some(AttrValue::Perms(perms)) => perms,
                    _ => PosixPermissions::empty(),
                };
                Some(AttrValue::Int(
                    (kind_mode_bits(file.kind()) | perms.mode_bits()) as i32,
                ))
            }
            "ctime" => Some(AttrValue::Time(file.creation_time())),
            "nlink" => Some(AttrValue::Int(file.links() as i32)),
            "dev" => Some(AttrValue::Long(1)),
            "rdev" => Some(AttrValue::Long(0)),
            "ino" => Some(AttrValue::Long(file.id())),
            _ => None,
        }
    }

    fn set(&self, _file: &File, attr: &str, _value: AttrValue, create: bool) -> Result<()> {
        if ATTRIBUTES.contains(&attr) {
            Err(read_only(self.name(), attr, create))
        } else {
            Err(unknown_attribute(self.name(), attr))
        }
    }
}

#[cfg(test)]
mod test {
    use std::collections::BTreeMap;
    use std::collections::BTreeSet;
    use std::sync::Arc;

    use crate::attr::AttrValue;
    use crate::attr::AttributeProvider;
    use crate::attr::AttributeService;
    use crate::attr::unix::UnixAttributeProvider;
    use crate::disk::HeapDisk;
    use crate::error::Error;
    use crate::file::File;
    use crate::time::FileTime;

    fn service() -> AttributeService {
        let views: BTreeSet<String> = ["unix".to_owned()].into_iter().collect();
        AttributeService::new(&views, BTreeMap::new()).unwrap()
    }

    fn file(svc: &AttributeService) -> Arc<File> {
        let disk = Arc::new(HeapDisk::new(8, 64, 8));
        let f = File::new_regular(42, disk, FileTime::from_seconds(7));
        svc.set_initial_attributes(&f).unwrap();
        f
    }

    #[test]
    fn synthesized_values() {
        let svc = service();
        let f = file(&svc);
        f.incr_links();
        let p = UnixAttributeProvider;

        assert_eq!(Some(AttrValue::Long(42)), p.get(&f, "ino"));
        assert_eq!(Some(AttrValue::Long(1)), p.get(&f, "dev"));
        assert_eq!(Some(AttrValue::Long(0)), p.get(&f, "rdev"));
        assert_eq!(Some(AttrValue::Int(1)), p.get(&f, "nlink"));
        assert_eq!(
            Some(AttrValue::Time(FileTime::from_seconds(7))),
            p.get(&f, "ctime")
        );
        // Default permissions are rw-r--r-- on a regular file.
        assert_eq!(Some(AttrValue::Int(0o100644)), p.get(&f, "mode"));
    }

    #[test]
    fn principal_ids_are_stable() {
        let svc = service();
        let f = file(&svc);
        let p = UnixAttributeProvider;
        let uid1 = p.get(&f, "uid").unwrap();
        let uid2 = p.get(&f, "uid").unwrap();
        assert_eq!(uid1, uid2);
        let AttrValue::Int(uid) = uid1 else {
            panic!("uid should be an int")
        };
        assert!(uid >= 0);
        // uid and gid come from different names, so they differ.
        assert_ne!(Some(uid1), p.get(&f, "gid"));
    }

    #[test]
    fn everything_is_read_only() {
        let svc = service();
        let f = file(&svc);
        let p = UnixAttributeProvider;
        let err = p.set(&f, "uid", AttrValue::Int(1), false).unwrap_err();
        assert!(matches!(err, Error::IllegalArgument(_)));
        let err = p.set(&f, "uid", AttrValue::Int(1), true).unwrap_err();
        assert!(matches!(err, Error::UnsupportedOperation(_)));
    }
}
