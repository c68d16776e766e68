//! The attribute subsystem: typed attribute values, per-view providers and
//! the service that dispatches `"view:attr"` lookups across them.

mod basic;
mod dos;
mod owner;
mod posix;
mod unix;
mod user;

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use log::debug;

pub use basic::BasicFileAttributes;
pub use dos::DosFileAttributes;
pub use posix::PosixFileAttributes;
pub use posix::PosixPermissions;

use crate::error::Error;
use crate::error::Result;
use crate::file::File;
use crate::file::FileKind;
use crate::time::FileTime;

/// A user principal, identified by name.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct UserPrincipal(String);

impl UserPrincipal {
    /// A principal named `name`.
    pub fn named(name: impl Into<String>) -> UserPrincipal {
        UserPrincipal(name.into())
    }

    /// The principal's name.
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserPrincipal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A group principal, identified by name.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct GroupPrincipal(String);

impl GroupPrincipal {
    /// A group named `name`.
    pub fn named(name: impl Into<String>) -> GroupPrincipal {
        GroupPrincipal(name.into())
    }

    /// The group's name.
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GroupPrincipal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An attribute value: a closed union of every type the providers traffic
/// in. No runtime reflection; each provider checks the variant it expects.
#[derive(Clone, Debug, PartialEq)]
pub enum AttrValue {
    /// A boolean flag (the `dos:` flags, `basic:isDirectory`, ...).
    Bool(bool),
    /// A signed 32-bit value (`unix:uid`, `unix:nlink`, ...).
    Int(i32),
    /// An unsigned 64-bit value (`basic:size`, `basic:fileKey`, ...).
    Long(u64),
    /// A timestamp.
    Time(FileTime),
    /// Raw bytes (`user:` extended attributes).
    Bytes(Vec<u8>),
    /// A string (principal names in configured defaults).
    Str(String),
    /// A user principal (`owner:owner`).
    User(UserPrincipal),
    /// A group principal (`posix:group`).
    Group(GroupPrincipal),
    /// A POSIX permission set (`posix:permissions`).
    Perms(PosixPermissions),
}

impl AttrValue {
    /// A short name for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            AttrValue::Bool(_) => "bool",
            AttrValue::Int(_) => "int",
            AttrValue::Long(_) => "long",
            AttrValue::Time(_) => "file-time",
            AttrValue::Bytes(_) => "bytes",
            AttrValue::Str(_) => "string",
            AttrValue::User(_) => "user-principal",
            AttrValue::Group(_) => "group-principal",
            AttrValue::Perms(_) => "permissions",
        }
    }
}

/// One attribute view: a named group of attributes with typed get/set
/// behavior over a file's attribute map.
pub trait AttributeProvider: Send + Sync {
    /// The view name, e.g. `"basic"`.
    fn name(&self) -> &'static str;

    /// Views that must be present for this one to function.
    fn inherits(&self) -> &'static [&'static str] {
        &[]
    }

    /// The attribute names this view always exposes. The `user` view has
    /// none: its attributes are whatever was stored.
    fn fixed_attributes(&self) -> &'static [&'static str];

    /// Whether `attr` is readable through this view.
    fn supports(&self, attr: &str) -> bool {
        self.fixed_attributes().contains(&attr)
    }

    /// The `attr -> value` pairs stored on every new file of a filesystem
    /// configured with this view. `user_defaults` holds the configured
    /// `"view:attr"` overrides.
    fn default_values(
        &self,
        user_defaults: &BTreeMap<String, AttrValue>,
    ) -> Result<Vec<(&'static str, AttrValue)>> {
        let _ = user_defaults;
        Ok(Vec::new())
    }

    /// Reads one attribute. `None` means the view does not know the name.
    fn get(&self, file: &File, attr: &str) -> Option<AttrValue>;

    /// Writes one attribute. `create` marks a create-time set, which most
    /// attributes refuse.
    fn set(&self, file: &File, attr: &str, value: AttrValue, create: bool) -> Result<()>;
}

/// The error for writing an attribute the view can only read: an illegal
/// argument normally, an unsupported operation at create time.
fn read_only(view: &str, attr: &str, create: bool) -> Error {
    if create {
        Error::UnsupportedOperation(format!("cannot set '{view}:{attr}' on file creation"))
    } else {
        Error::IllegalArgument(format!("attribute '{view}:{attr}' is not settable"))
    }
}

/// Guard for writable attributes that still refuse create-time sets.
fn check_not_create(view: &str, attr: &str, create: bool) -> Result<()> {
    if create {
        Err(Error::UnsupportedOperation(format!(
            "cannot set '{view}:{attr}' on file creation"
        )))
    } else {
        Ok(())
    }
}

fn unknown_attribute(view: &str, attr: &str) -> Error {
    Error::UnsupportedOperation(format!("unknown attribute '{view}:{attr}'"))
}

fn type_mismatch(view: &str, attr: &str, expected: &str, actual: &AttrValue) -> Error {
    Error::IllegalArgument(format!(
        "invalid type for attribute '{view}:{attr}': expected {expected}, got {}",
        actual.type_name()
    ))
}

/// Splits `"view:attr"`, defaulting a bare name to the `basic` view.
fn parse_attr_key(key: &str) -> (&str, &str) {
    match key.split_once(':') {
        Some((view, attr)) => (view, attr),
        None => ("basic", key),
    }
}

/// Dispatches attribute operations across the configured providers.
///
/// Construction resolves view dependencies: inherited views are included
/// automatically (configuring `posix` pulls in `owner`), providers are
/// ordered so that every view's dependencies precede it, and an unknown
/// view name fails fast.
pub struct AttributeService {
    providers: Vec<Arc<dyn AttributeProvider>>,
    user_defaults: BTreeMap<String, AttrValue>,
}

fn registry() -> Vec<Arc<dyn AttributeProvider>> {
    vec![
        Arc::new(basic::BasicAttributeProvider),
        Arc::new(owner::OwnerAttributeProvider),
        Arc::new(posix::PosixAttributeProvider),
        Arc::new(dos::DosAttributeProvider),
        Arc::new(unix::UnixAttributeProvider),
        Arc::new(user::UserDefinedAttributeProvider),
    ]
}

impl AttributeService {
    /// Builds a service exposing `views` (plus `basic`, which is always
    /// implied, and anything the requested views inherit).
    pub fn new(
        views: &BTreeSet<String>,
        user_defaults: BTreeMap<String, AttrValue>,
    ) -> Result<AttributeService> {
        let registry = registry();
        let lookup = |name: &str| {
            registry
                .iter()
                .find(|p| p.name() == name)
                .cloned()
                .ok_or_else(|| {
                    Error::IllegalArgument(format!("unknown attribute view: {name}"))
                })
        };

        // Requested views plus the transitive closure of what they inherit.
        let mut wanted: Vec<Arc<dyn AttributeProvider>> = vec![lookup("basic")?];
        let mut queue: Vec<String> = views.iter().cloned().collect();
        while let Some(name) = queue.pop() {
            if wanted.iter().any(|p| p.name() == name) {
                continue;
            }
            let provider = lookup(&name)?;
            queue.extend(provider.inherits().iter().map(|s| (*s).to_owned()));
            wanted.push(provider);
        }

        // Order so each provider's inherited views precede it. The
        // dependency graph is tiny and acyclic; a missing dependency here is
        // a provider bug.
        let mut providers: Vec<Arc<dyn AttributeProvider>> = Vec::with_capacity(wanted.len());
        while !wanted.is_empty() {
            let before = providers.len();
            wanted.retain(|candidate| {
                let ready = candidate
                    .inherits()
                    .iter()
                    .all(|dep| providers.iter().any(|p| p.name() == *dep));
                if ready {
                    providers.push(candidate.clone());
                }
                !ready
            });
            if providers.len() == before {
                let stuck: Vec<_> = wanted.iter().map(|p| p.name()).collect();
                return Err(Error::IllegalArgument(format!(
                    "attribute views with unresolvable dependencies: {stuck:?}"
                )));
            }
        }

        let service = AttributeService {
            providers,
            user_defaults,
        };
        // Surface bad configured defaults now rather than on first create.
        for provider in &service.providers {
            provider.default_values(&service.user_defaults)?;
        }
        debug!(
            "attribute service views: {:?}",
            service.supported_views()
        );
        Ok(service)
    }

    /// The views this service exposes, in dependency order.
    pub fn supported_views(&self) -> Vec<&'static str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    /// Whether `view` is exposed.
    pub fn supports_view(&self, view: &str) -> bool {
        self.providers.iter().any(|p| p.name() == view)
    }

    fn provider(&self, view: &str) -> Result<&Arc<dyn AttributeProvider>> {
        self.providers
            .iter()
            .find(|p| p.name() == view)
            .ok_or_else(|| {
                Error::UnsupportedOperation(format!("attribute view '{view}' is not supported"))
            })
    }

    /// Stores every configured view's default attribute values on a newly
    /// created file, in dependency order.
    pub fn set_initial_attributes(&self, file: &File) -> Result<()> {
        for provider in &self.providers {
            for (attr, value) in provider.default_values(&self.user_defaults)? {
                file.set_attr(format!("{}:{attr}", provider.name()), value);
            }
        }
        Ok(())
    }

    /// Reads `"view:attr"` (or `"attr"`, implying `basic`).
    pub fn get_attribute(&self, file: &File, key: &str) -> Result<AttrValue> {
        let (view, attr) = parse_attr_key(key);
        let provider = self.provider(view)?;
        provider
            .get(file, attr)
            .ok_or_else(|| unknown_attribute(view, attr))
    }

    /// Writes `"view:attr"`. `create` marks a create-time set.
    pub fn set_attribute(
        &self,
        file: &File,
        key: &str,
        value: AttrValue,
        create: bool,
    ) -> Result<()> {
        let (view, attr) = parse_attr_key(key);
        let provider = self.provider(view)?;
        provider.set(file, attr, value, create)
    }

    /// Reads a set of attributes: `"view:*"` for all of a view, or
    /// `"view:a,b"` for a selection. A bare spec implies the `basic` view.
    /// Returned keys are un-prefixed attribute names.
    pub fn read_attributes(
        &self,
        file: &File,
        spec: &str,
    ) -> Result<BTreeMap<String, AttrValue>> {
        let (view, attrs) = parse_attr_key(spec);
        let provider = self.provider(view)?;
        let mut out = BTreeMap::new();
        if attrs == "*" {
            for attr in provider.fixed_attributes() {
                if let Some(value) = provider.get(file, attr) {
                    out.insert((*attr).to_owned(), value);
                }
            }
            // The user view has no fixed attributes; list what is stored.
            if provider.fixed_attributes().is_empty() {
                for key in file.attr_keys_for_view(view) {
                    let attr = &key[view.len() + 1..];
                    if let Some(value) = provider.get(file, attr) {
                        out.insert(attr.to_owned(), value);
                    }
                }
            }
        } else {
            for attr in attrs.split(',') {
                let value = provider
                    .get(file, attr)
                    .ok_or_else(|| unknown_attribute(view, attr))?;
                out.insert(attr.to_owned(), value);
            }
        }
        Ok(out)
    }

    /// A typed `basic` snapshot.
    pub fn basic_attributes(&self, file: &File) -> BasicFileAttributes {
        BasicFileAttributes::read(file)
    }

    /// A typed `dos` snapshot; fails if the view is not configured.
    pub fn dos_attributes(&self, file: &File) -> Result<DosFileAttributes> {
        self.provider("dos")?;
        Ok(DosFileAttributes::read(file))
    }

    /// A typed `posix` snapshot; fails if the view is not configured.
    pub fn posix_attributes(&self, file: &File) -> Result<PosixFileAttributes> {
        self.provider("posix")?;
        Ok(PosixFileAttributes::read(file))
    }

    /// Copies stored attributes from `from` onto `to` (COPY_ATTRIBUTES).
    /// Derived attributes need no copying; timestamps travel separately.
    pub fn copy_attributes(&self, from: &File, to: &File) {
        for provider in &self.providers {
            for key in from.attr_keys_for_view(provider.name()) {
                if let Some(value) = from.attr(&key) {
                    to.set_attr(key, value);
                }
            }
        }
    }
}

impl fmt::Debug for AttributeService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttributeService")
            .field("views", &self.supported_views())
            .finish_non_exhaustive()
    }
}

fn file_kind_flags(kind: FileKind) -> (bool, bool, bool) {
    (
        kind == FileKind::Regular,
        kind == FileKind::Directory,
        kind == FileKind::SymbolicLink,
    )
}
