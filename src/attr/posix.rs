//! The `posix` attribute view.

use std::collections::BTreeMap;
use std::fmt;

use bitflags::bitflags;

use crate::attr::AttrValue;
use crate::attr::AttributeProvider;
use crate::attr::BasicFileAttributes;
use crate::attr::GroupPrincipal;
use crate::attr::UserPrincipal;
use crate::attr::check_not_create;
use crate::attr::type_mismatch;
use crate::attr::unknown_attribute;
use crate::error::Error;
use crate::error::Result;
use crate::file::File;

/// Default permissions when the configuration does not override them.
const DEFAULT_PERMISSIONS: u32 = 0o644;
/// Default group name when the configuration does not override it.
const DEFAULT_GROUP: &str = "group";

bitflags! {
    /// POSIX permission bits, `rwxrwxrwx`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PosixPermissions: u16 {
        /// `r--------`
        const OWNER_READ = 0o400;
        /// `-w-------`
        const OWNER_WRITE = 0o200;
        /// `--x------`
        const OWNER_EXECUTE = 0o100;
        /// `---r-----`
        const GROUP_READ = 0o040;
        /// `----w----`
        const GROUP_WRITE = 0o020;
        /// `-----x---`
        const GROUP_EXECUTE = 0o010;
        /// `------r--`
        const OTHERS_READ = 0o004;
        /// `-------w-`
        const OTHERS_WRITE = 0o002;
        /// `--------x`
        const OTHERS_EXECUTE = 0o001;
    }
}

impl PosixPermissions {
    /// Builds a permission set from the low nine bits of `mode`.
    pub fn from_mode_bits(mode: u32) -> PosixPermissions {
        PosixPermissions::from_bits_truncate((mode & 0o777) as u16)
    }

    /// The permission set as mode bits.
    pub fn mode_bits(self) -> u32 {
        u32::from(self.bits())
    }

    /// Parses a nine-character `rwxrwxrwx` string, `-` for an absent bit.
    pub fn from_permission_string(s: &str) -> Result<PosixPermissions> {
        let chars: Vec<char> = s.chars().collect();
        if chars.len() != 9 {
            return Err(Error::IllegalArgument(format!(
                "invalid permission string: {s}"
            )));
        }
        let mut bits = 0u16;
        for (i, &(expected, bit)) in [
            ('r', 0o400u16),
            ('w', 0o200),
            ('x', 0o100),
            ('r', 0o040),
            ('w', 0o020),
            ('x', 0o010),
            ('r', 0o004),
            ('w', 0o002),
            ('x', 0o001),
        ]
        .iter()
        .enumerate()
        {
            if chars[i] == expected {
                bits |= bit;
            } else if chars[i] != '-' {
                return Err(Error::IllegalArgument(format!(
                    "invalid permission string: {s}"
                )));
            }
        }
        Ok(PosixPermissions::from_bits_truncate(bits))
    }
}

impl fmt::Display for PosixPermissions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &(bit, c) in &[
            (PosixPermissions::OWNER_READ, 'r'),
            (PosixPermissions::OWNER_WRITE, 'w'),
            (PosixPermissions::OWNER_EXECUTE, 'x'),
            (PosixPermissions::GROUP_READ, 'r'),
            (PosixPermissions::GROUP_WRITE, 'w'),
            (PosixPermissions::GROUP_EXECUTE, 'x'),
            (PosixPermissions::OTHERS_READ, 'r'),
            (PosixPermissions::OTHERS_WRITE, 'w'),
            (PosixPermissions::OTHERS_EXECUTE, 'x'),
        ] {
            write!(f, "{}", if self.contains(bit) { c } else { '-' })?;
        }
        Ok(())
    }
}

pub(crate) struct PosixAttributeProvider;

impl PosixAttributeProvider {
    fn default_group(user_defaults: &BTreeMap<String, AttrValue>) -> Result<GroupPrincipal> {
        match user_defaults.get("posix:group") {
            None => Ok(GroupPrincipal::named(DEFAULT_GROUP)),
            Some(AttrValue::Str(name)) => Ok(GroupPrincipal::named(name.clone())),
            Some(AttrValue::Group(group)) => Ok(group.clone()),
            Some(other) => Err(Error::IllegalArgument(format!(
                "invalid default for 'posix:group': expected a principal, got {}",
                other.type_name()
            ))),
        }
    }

    fn default_permissions(
        user_defaults: &BTreeMap<String, AttrValue>,
    ) -> Result<PosixPermissions> {
        match user_defaults.get("posix:permissions") {
            None => Ok(PosixPermissions::from_mode_bits(DEFAULT_PERMISSIONS)),
            Some(AttrValue::Str(s)) => PosixPermissions::from_permission_string(s),
            Some(AttrValue::Perms(perms)) => Ok(*perms),
            Some(other) => Err(Error::IllegalArgument(format!(
                "invalid default for 'posix:permissions': expected permissions, got {}",
                other.type_name()
            ))),
        }
    }
}

impl AttributeProvider for PosixAttributeProvider {
    fn name(&self) -> &'static str {
        "posix"
    }

    fn inherits(&self) -> &'static [&'static str] {
        &["basic", "owner"]
    }

    fn fixed_attributes(&self) -> &'static [&'static str] {
        &["group", "permissions"]
    }

    fn default_values(
        &self,
        user_defaults: &BTreeMap<String, AttrValue>,
    ) -> Result<Vec<(&'static str, AttrValue)>> {
        Ok(vec![
            (
                "group",
                AttrValue::Group(PosixAttributeProvider::default_group(user_defaults)?),
            ),
            (
                "permissions",
                AttrValue::Perms(PosixAttributeProvider::default_permissions(user_defaults)?),
            ),
        ])
    }

    fn get(&self, file: &File, attr: &str) -> Option<AttrValue> {
        match attr {
            "group" => file.attr("posix:group"),
            "permissions" => file.attr("posix:permissions"),
            _ => None,
        }
    }

    fn set(&self, file: &File, attr: &str, value: AttrValue, create: bool) -> Result<()> {
        match attr {
            "group" => {
                check_not_create(self.name(), attr, create)?;
                let AttrValue::Group(_) = &value else {
                    return Err(type_mismatch(self.name(), attr, "group-principal", &value));
                };
                file.set_attr("posix:group", value);
                Ok(())
            }
            // The one attribute that may be supplied at create time.
            "permissions" => {
                let AttrValue::Perms(_) = &value else {
                    return Err(type_mismatch(self.name(), attr, "permissions", &value));
                };
                file.set_attr("posix:permissions", value);
                Ok(())
            }
            _ => Err(unknown_attribute(self.name(), attr)),
        }
    }
}

/// A point-in-time snapshot of the `posix` view.
#[derive(Clone, Debug)]
pub struct PosixFileAttributes {
    basic: BasicFileAttributes,
    owner: Option<UserPrincipal>,
    group: Option<GroupPrincipal>,
    permissions: PosixPermissions,
}

impl PosixFileAttributes {
    pub(crate) fn read(file: &File) -> PosixFileAttributes {
        let owner = match file.attr("owner:owner") {
            Some(AttrValue::User(user)) => Some(user),
            _ => None,
        };
        let group = match file.attr("posix:group") {
            Some(AttrValue::Group(group)) => Some(group),
            _ => None,
        };
        let permissions = match file.attr("posix:permissions") {
            Some(AttrValue::Perms(perms)) => perms,
            _ => PosixPermissions::empty(),
        };
        PosixFileAttributes {
            basic: BasicFileAttributes::read(file),
            owner,
            group,
            permissions,
        }
    }

    /// The shared `basic` snapshot.
    pub fn basic(&self) -> &BasicFileAttributes {
        &self.basic
    }

    /// The owning principal.
    pub fn owner(&self) -> Option<&UserPrincipal> {
        self.owner.as_ref()
    }

    /// The owning group.
    pub fn group(&self) -> Option<&GroupPrincipal> {
        self.group.as_ref()
    }

    /// The permission bits.
    pub fn permissions(&self) -> PosixPermissions {
        self.permissions
    }
}

#[cfg(test)]
mod test {
    use crate::attr::posix::PosixPermissions;
    use crate::error::Error;

    #[test]
    fn permission_string_round_trip() {
        for (s, bits) in [
            ("rw-r--r--", 0o644),
            ("rwxr-x---", 0o750),
            ("---------", 0o000),
            ("rwxrwxrwx", 0o777),
        ] {
            let perms = PosixPermissions::from_permission_string(s).unwrap();
            assert_eq!(bits, perms.mode_bits(), "{s}");
            assert_eq!(s, perms.to_string());
        }
    }

    #[test]
    fn bad_permission_strings() {
        for s in ["", "rw-", "rw-r--r-x-", "zw-r--r--", "rw-r--r-w"] {
            assert!(
                matches!(
                    PosixPermissions::from_permission_string(s),
                    Err(Error::IllegalArgument(_))
                ),
                "{s}"
            );
        }
    }

    #[test]
    fn mode_bits_mask() {
        let perms = PosixPermissions::from_mode_bits(0o40755);
        assert_eq!(0o755, perms.mode_bits());
    }
}
