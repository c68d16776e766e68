//! The `dos` attribute view.

use std::collections::BTreeMap;

use crate::attr::AttrValue;
use crate::attr::AttributeProvider;
use crate::attr::BasicFileAttributes;
use crate::attr::check_not_create;
use crate::attr::type_mismatch;
use crate::attr::unknown_attribute;
use crate::error::Result;
use crate::file::File;

const ATTRIBUTES: &[&str] = &["hidden", "archive", "readonly", "system"];

pub(crate) struct DosAttributeProvider;

impl AttributeProvider for DosAttributeProvider {
    fn name(&self) -> &'static str {
        "dos"
    }

    fn inherits(&self) -> &'static [&'static str] {
        &["basic"]
    }

    fn fixed_attributes(&self) -> &'static [&'static str] {
        ATTRIBUTES
    }

    fn default_values(
        &self,
        user_defaults: &BTreeMap<String, AttrValue>,
    ) -> Result<Vec<(&'static str, AttrValue)>> {
        let mut out = Vec::with_capacity(ATTRIBUTES.len());
        for &attr in ATTRIBUTES {
            let value = match user_defaults.get(&format!("dos:{attr}")) {
                None => AttrValue::Bool(false),
                Some(AttrValue::Bool(b)) => AttrValue::Bool(*b),
                Some(other) => {
                    return Err(type_mismatch(self.name(), attr, "bool", other));
                }
            };
            out.push((attr, value));
        }
        Ok(out)
    }

    fn get(&self, file: &File, attr: &str) -> Option<AttrValue> {
        if ATTRIBUTES.contains(&attr) {
            file.attr(&format!("dos:{attr}"))
        } else {
            None
        }
    }

    fn set(&self, file: &File, attr: &str, value: AttrValue, create: bool) -> Result<()> {
        if !ATTRIBUTES.contains(&attr) {
            return Err(unknown_attribute(self.name(), attr));
        }
        check_not_create(self.name(), attr, create)?;
        let AttrValue::Bool(_) = &value else {
            return Err(type_mismatch(self.name(), attr, "bool", &value));
        };
        file.set_attr(format!("dos:{attr}"), value);
        Ok(())
    }
}

/// A point-in-time snapshot of the `dos` view.
#[derive(Clone, Debug)]
pub struct DosFileAttributes {
    basic: BasicFileAttributes,
    hidden: bool,
    archive: bool,
    readonly: bool,
    system: bool,
}

impl DosFileAttributes {
    pub(crate) fn read(file: &File) -> DosFileAttributes {
        let flag = |key: &str| matches!(file.attr(key), Some(AttrValue::Bool(true)));
        DosFileAttributes {
            basic: BasicFileAttributes::read(file),
            hidden: flag("dos:hidden"),
            archive: flag("dos:archive"),
            readonly: flag("dos:readonly"),
            system: flag("dos:system"),
        }
    }

    /// The shared `basic` snapshot.
    pub fn basic(&self) -> &BasicFileAttributes {
        &self.basic
    }

    /// The hidden flag.
    pub fn is_hidden(&self) -> bool {
        self.hidden
    }

    /// The archive flag.
    pub fn is_archive(&self) -> bool {
        self.archive
    }

    /// The read-only flag. Stored and reported, never enforced.
    pub fn is_read_only(&self) -> bool {
        self.readonly
    }

    /// The system flag.
    pub fn is_system(&self) -> bool {
        self.system
    }
}
