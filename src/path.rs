//! Paths: the path value type, the unix/windows path grammars, and the
//! service that parses, renders and compares paths for one filesystem.

use std::cmp::Ordering;
use std::collections::hash_map::DefaultHasher;
use std::hash::Hash;
use std::hash::Hasher;

use smallvec::SmallVec;

use crate::error::Error;
use crate::error::Result;
use crate::matcher::PathMatcher;
use crate::name::Name;
use crate::name::Normalization;
use crate::name::normalize;

/// A parsed path: an optional root plus a list of component names.
///
/// A path is absolute iff it has a root. The empty path has no root and a
/// single empty name. Structural equality compares canonical name forms;
/// display-form comparison, when configured, goes through
/// [`PathService::compare_paths`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct EntryPath {
    root: Option<Name>,
    names: SmallVec<[Name; 4]>,
}

impl EntryPath {
    /// The empty path: no root, one empty name.
    pub fn empty() -> EntryPath {
        EntryPath {
            root: None,
            names: SmallVec::from_elem(Name::empty(), 1),
        }
    }

    pub(crate) fn new(root: Option<Name>, names: impl IntoIterator<Item = Name>) -> EntryPath {
        let names: SmallVec<[Name; 4]> = names.into_iter().collect();
        if root.is_none() && names.is_empty() {
            return EntryPath::empty();
        }
        EntryPath { root, names }
    }

    /// The root name, if the path is absolute.
    pub fn root(&self) -> Option<&Name> {
        self.root.as_ref()
    }

    /// The component names. For the empty path this is a single empty name.
    pub fn names(&self) -> &[Name] {
        &self.names
    }

    /// True iff the path has a root.
    pub fn is_absolute(&self) -> bool {
        self.root.is_some()
    }

    /// True for the empty path.
    pub fn is_empty_path(&self) -> bool {
        self.root.is_none() && self.names.len() == 1 && self.names[0].canonical().is_empty()
    }

    /// Number of component names.
    pub fn name_count(&self) -> usize {
        self.names.len()
    }

    /// The final component, if there is one.
    pub fn file_name(&self) -> Option<&Name> {
        if self.is_empty_path() {
            return None;
        }
        self.names.last()
    }

    /// The path without its final component: the root for a single-name
    /// absolute path, `None` for a root-only or single-name relative path.
    pub fn parent(&self) -> Option<EntryPath> {
        if self.is_empty_path() || self.names.is_empty() {
            return None;
        }
        if self.names.len() == 1 && self.root.is_none() {
            return None;
        }
        Some(EntryPath {
            root: self.root.clone(),
            names: self.names[..self.names.len() - 1].iter().cloned().collect(),
        })
    }

    /// A relative path over `names[begin..end]`.
    pub fn subpath(&self, begin: usize, end: usize) -> Result<EntryPath> {
        if begin >= end || end > self.names.len() {
            return Err(Error::IllegalArgument(format!(
                "invalid subpath range {begin}..{end} for {} names",
                self.names.len()
            )));
        }
        Ok(EntryPath {
            root: None,
            names: self.names[begin..end].iter().cloned().collect(),
        })
    }

    /// True when this path has `other`'s root and `other`'s names as a
    /// prefix of its own.
    pub fn starts_with(&self, other: &EntryPath) -> bool {
        self.root == other.root
            && self.names.len() >= other.names.len()
            && self.names[..other.names.len()] == other.names[..]
    }

    /// True when `other`'s names are a suffix of this path's. An absolute
    /// `other` must match the whole path, root included.
    pub fn ends_with(&self, other: &EntryPath) -> bool {
        if other.root.is_some() {
            return self.root == other.root && self.names == other.names;
        }
        self.names.len() >= other.names.len()
            && self.names[self.names.len() - other.names.len()..] == other.names[..]
    }

    /// Resolves `other` against this path: an absolute `other` wins, an
    /// empty `other` yields this path, anything else appends.
    pub fn resolve(&self, other: &EntryPath) -> EntryPath {
        if other.is_absolute() {
            return other.clone();
        }
        if other.is_empty_path() {
            return self.clone();
        }
        let mut names = self.names.clone();
        if self.is_empty_path() {
            names.clear();
        }
        names.extend(other.names.iter().cloned());
        EntryPath {
            root: self.root.clone(),
            names,
        }
    }

    /// Resolves `other` against this path's parent.
    pub fn resolve_sibling(&self, other: &EntryPath) -> EntryPath {
        match self.parent() {
            Some(parent) => parent.resolve(other),
            None => other.clone(),
        }
    }

    /// The relative path from this path to `other`.
    ///
    /// Both paths must agree on having a root; otherwise the call fails with
    /// `IllegalArgument`.
    pub fn relativize(&self, other: &EntryPath) -> Result<EntryPath> {
        if self.root != other.root {
            return Err(Error::IllegalArgument(
                "cannot relativize paths with different roots".to_owned(),
            ));
        }
        if self == other {
            return Ok(EntryPath::empty());
        }
        let common = self
            .names
            .iter()
            .zip(other.names.iter())
            .take_while(|(a, b)| a == b)
            .count();
        let mut names: SmallVec<[Name; 4]> = SmallVec::new();
        for _ in common..self.names.len() {
            names.push(Name::parent_name());
        }
        names.extend(other.names[common..].iter().cloned());
        Ok(EntryPath { root: None, names })
    }

    /// Lexically normalizes the path: drops `.` components and folds
    /// `name/..` pairs. Leading `..` components survive on a relative path
    /// and vanish at the root of an absolute one.
    pub fn normalize(&self) -> EntryPath {
        if self.is_empty_path() {
            return self.clone();
        }
        let mut out: SmallVec<[Name; 4]> = SmallVec::new();
        for name in &self.names {
            if name.is_self() {
                continue;
            }
            if name.is_parent() {
                match out.last() {
                    Some(last) if !last.is_parent() => {
                        out.pop();
                    }
                    _ if self.root.is_some() => {
                        // `..` at the root stays at the root.
                    }
                    _ => out.push(name.clone()),
                }
                continue;
            }
            out.push(name.clone());
        }
        EntryPath::new(self.root.clone(), out)
    }
}

/// The grammar of a path flavor: separator, root syntax, rendering.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PathType {
    kind: PathTypeKind,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum PathTypeKind {
    Unix,
    Windows,
}

/// Raw parse output: root and name strings before normalization.
pub(crate) struct ParsedPath {
    pub(crate) root: Option<String>,
    pub(crate) names: Vec<String>,
}

/// Characters windows forbids inside a component name.
const WINDOWS_RESERVED_CHARS: &[char] = &['<', '>', ':', '"', '|', '?', '*'];

impl PathType {
    /// The unix grammar: separator `/`, single root `/`.
    pub fn unix() -> PathType {
        PathType {
            kind: PathTypeKind::Unix,
        }
    }

    /// The windows grammar: separator `\`, drive roots like `C:\` and UNC
    /// roots like `\\host\share\`; `/` is accepted as a separator on input.
    pub fn windows() -> PathType {
        PathType {
            kind: PathTypeKind::Windows,
        }
    }

    /// The separator emitted when rendering.
    pub fn separator(&self) -> &'static str {
        match self.kind {
            PathTypeKind::Unix => "/",
            PathTypeKind::Windows => "\\",
        }
    }

    /// Whether name matching ignores case for this path flavor.
    pub fn case_insensitive_matching(&self) -> bool {
        matches!(self.kind, PathTypeKind::Windows)
    }

    pub(crate) fn parse(&self, input: &str) -> Result<ParsedPath> {
        match self.kind {
            PathTypeKind::Unix => self.parse_unix(input),
            PathTypeKind::Windows => self.parse_windows(input),
        }
    }

    fn parse_unix(&self, input: &str) -> Result<ParsedPath> {
        let (root, rest) = match input.strip_prefix('/') {
            Some(rest) => (Some("/".to_owned()), rest),
            None => (None, input),
        };
        let names = rest
            .split('/')
            .filter(|part| !part.is_empty())
            .map(str::to_owned)
            .collect();
        Ok(ParsedPath { root, names })
    }

    fn parse_windows(&self, input: &str) -> Result<ParsedPath> {
        let input = input.replace('/', "\\");
        let (root, rest) = if let Some(rest) = input.strip_prefix("\\\\") {
            // UNC: \\host\share\...
            let mut parts = rest.splitn(3, '\\');
            let host = parts.next().unwrap_or("");
            let share = parts.next().unwrap_or("");
            if host.is_empty() || share.is_empty() {
                return Err(Error::InvalidPath(format!(
                    "UNC path is missing hostname or share: {input}"
                )));
            }
            let tail = parts.next().unwrap_or("").to_owned();
            (Some(format!("\\\\{host}\\{share}\\")), tail)
        } else if input.len() >= 2 && input.as_bytes()[1] == b':' {
            let drive = input.chars().next().filter(|c| c.is_ascii_alphabetic());
            let Some(drive) = drive else {
                return Err(Error::InvalidPath(format!("invalid drive letter: {input}")));
            };
            match input[2..].strip_prefix('\\') {
                Some(tail) => (Some(format!("{drive}:\\")), tail.to_owned()),
                None if input.len() == 2 => (Some(format!("{drive}:\\")), String::new()),
                None => {
                    return Err(Error::InvalidPath(format!(
                        "drive-relative paths are not supported: {input}"
                    )));
                }
            }
        } else {
            (None, input.clone())
        };

        let mut names = Vec::new();
        for part in rest.split('\\').filter(|part| !part.is_empty()) {
            if part.contains(WINDOWS_RESERVED_CHARS) {
                return Err(Error::InvalidPath(format!(
                    "name \"{part}\" contains a reserved character"
                )));
            }
            names.push(part.to_owned());
        }
        Ok(ParsedPath { root, names })
    }

    /// Renders a root string and name strings into one path string.
    pub(crate) fn render<'a>(
        &self,
        root: Option<&str>,
        names: impl Iterator<Item = &'a str>,
    ) -> String {
        let joined = names.collect::<Vec<_>>().join(self.separator());
        match root {
            Some(root) => format!("{root}{joined}"),
            None => joined,
        }
    }
}

/// Which name form drives path equality, hashing and ordering.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum EqualityForm {
    Display,
    Canonical,
}

/// Per-filesystem path factory: applies the configured name normalizations,
/// parses and renders paths of the filesystem's [`PathType`], and owns path
/// hashing/ordering so that they stay mutually consistent.
#[derive(Debug)]
pub struct PathService {
    path_type: PathType,
    display_normalizations: Vec<Normalization>,
    canonical_normalizations: Vec<Normalization>,
    equality_form: EqualityForm,
}

impl PathService {
    /// Creates a service for `path_type` with the given normalization modes.
    pub fn new(
        path_type: PathType,
        display_normalizations: Vec<Normalization>,
        canonical_normalizations: Vec<Normalization>,
        equality_uses_canonical_form: bool,
    ) -> PathService {
        PathService {
            path_type,
            display_normalizations,
            canonical_normalizations,
            equality_form: if equality_uses_canonical_form {
                EqualityForm::Canonical
            } else {
                EqualityForm::Display
            },
        }
    }

    /// A service with no normalization, hashing on display form.
    pub fn plain(path_type: PathType) -> PathService {
        PathService::new(path_type, Vec::new(), Vec::new(), false)
    }

    /// The path grammar this service speaks.
    pub fn path_type(&self) -> PathType {
        self.path_type
    }

    /// Creates a name from raw input, applying the configured display and
    /// canonical normalizations. `.` and `..` pass through untouched.
    pub fn name(&self, s: &str) -> Name {
        if s == "." || s == ".." {
            return Name::simple(s);
        }
        Name::create(
            normalize(s, &self.display_normalizations),
            normalize(s, &self.canonical_normalizations),
        )
    }

    /// The empty path.
    pub fn empty_path(&self) -> EntryPath {
        EntryPath::empty()
    }

    /// A root-only absolute path.
    pub fn create_root(&self, root: Name) -> EntryPath {
        EntryPath::new(Some(root), [])
    }

    /// A relative single-name path.
    pub fn create_file_name(&self, name: Name) -> EntryPath {
        EntryPath::new(None, [name])
    }

    /// A relative path over `names`.
    pub fn create_relative_path(&self, names: impl IntoIterator<Item = Name>) -> EntryPath {
        EntryPath::new(None, names)
    }

    /// A path from optional root plus names.
    pub fn create_path(
        &self,
        root: Option<Name>,
        names: impl IntoIterator<Item = Name>,
    ) -> EntryPath {
        EntryPath::new(root, names)
    }

    /// Parses one or more strings into a path. The pieces are joined with
    /// the separator; empty pieces and empty components are ignored, so
    /// `parse_path(&["", "foo"])` is the relative path `foo`.
    pub fn parse_path<S: AsRef<str>>(&self, parts: &[S]) -> Result<EntryPath> {
        let joined = parts
            .iter()
            .map(AsRef::as_ref)
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(self.path_type.separator());
        let parsed = self.path_type.parse(&joined)?;
        let root = parsed.root.as_deref().map(|r| self.name(r));
        let names = parsed.names.iter().map(|n| self.name(n));
        Ok(EntryPath::new(root, names))
    }

    /// Renders a path using display name forms.
    pub fn to_string(&self, path: &EntryPath) -> String {
        if path.is_empty_path() {
            return String::new();
        }
        self.path_type.render(
            path.root().map(Name::display),
            path.names().iter().map(Name::display),
        )
    }

    fn equality_key(&self, path: &EntryPath, out: &mut Vec<String>) {
        let form = |name: &Name| match self.equality_form {
            EqualityForm::Display => name.display().to_owned(),
            EqualityForm::Canonical => name.canonical().to_owned(),
        };
        out.push(match path.root() {
            Some(root) => form(root),
            None => String::new(),
        });
        out.extend(path.names().iter().map(form));
    }

    /// Hashes a path consistently with [`compare_paths`](Self::compare_paths).
    pub fn hash_path(&self, path: &EntryPath) -> u64 {
        let mut key = Vec::new();
        self.equality_key(path, &mut key);
        let mut h = DefaultHasher::new();
        key.hash(&mut h);
        h.finish()
    }

    /// Orders two paths by the configured equality form. Equal order implies
    /// equal [`hash_path`](Self::hash_path).
    pub fn compare_paths(&self, a: &EntryPath, b: &EntryPath) -> Ordering {
        let mut ka = Vec::new();
        let mut kb = Vec::new();
        self.equality_key(a, &mut ka);
        self.equality_key(b, &mut kb);
        ka.cmp(&kb)
    }

    /// Compiles a `glob:PATTERN` or `regex:PATTERN` matcher for paths of
    /// this service's type.
    pub fn create_path_matcher(&self, syntax_and_pattern: &str) -> Result<PathMatcher> {
        PathMatcher::compile(syntax_and_pattern, self.path_type)
    }
}

#[cfg(test)]
mod test {
    use std::cmp::Ordering;

    use crate::error::Error;
    use crate::name::Name;
    use crate::name::Normalization;
    use crate::path::EntryPath;
    use crate::path::PathService;
    use crate::path::PathType;

    fn unix() -> PathService {
        PathService::plain(PathType::unix())
    }

    fn windows() -> PathService {
        PathService::plain(PathType::windows())
    }

    fn parse(svc: &PathService, s: &str) -> EntryPath {
        svc.parse_path(&[s]).unwrap()
    }

    #[test]
    fn parse_ignores_empty_components() {
        let svc = unix();
        let p = svc.parse_path(&["", "foo"]).unwrap();
        assert_eq!("foo", svc.to_string(&p));
        assert!(!p.is_absolute());

        let p = parse(&svc, "/a//b/");
        assert_eq!("/a/b", svc.to_string(&p));

        let p = svc.parse_path(&["a", "b", "c"]).unwrap();
        assert_eq!("a/b/c", svc.to_string(&p));
    }

    #[test]
    fn empty_string_parses_to_empty_path() {
        let svc = unix();
        let p = parse(&svc, "");
        assert!(p.is_empty_path());
        assert_eq!(1, p.name_count());
        assert_eq!("", svc.to_string(&p));
    }

    #[test]
    fn unix_root_round_trip() {
        let svc = unix();
        let p = parse(&svc, "/");
        assert!(p.is_absolute());
        assert_eq!(0, p.names().len());
        assert_eq!("/", svc.to_string(&p));
        assert_eq!("/a/b", svc.to_string(&parse(&svc, "/a/b")));
    }

    #[test]
    fn parse_to_string_round_trip() {
        let svc = unix();
        for s in ["/", "/a/b/c", "a", "a/b", ""] {
            let p = parse(&svc, s);
            assert_eq!(s, svc.to_string(&p));
            let again = parse(&svc, &svc.to_string(&p));
            assert_eq!(svc.to_string(&p), svc.to_string(&again));
        }
    }

    #[test]
    fn normalize_folds_dots() {
        let svc = unix();
        let p = parse(&svc, "/a/./b/../c");
        assert_eq!("/a/c", svc.to_string(&p.normalize()));

        assert_eq!("a/b", svc.to_string(&parse(&svc, "a/./b").normalize()));
        assert_eq!("../b", svc.to_string(&parse(&svc, "../a/../b").normalize()));
        // `..` disappears at the root.
        assert_eq!("/b", svc.to_string(&parse(&svc, "/../b").normalize()));
        assert_eq!("", svc.to_string(&parse(&svc, "a/..").normalize()));
    }

    #[test]
    fn parent_and_file_name() {
        let svc = unix();
        let p = parse(&svc, "/a/b");
        assert_eq!("b", p.file_name().unwrap().display());
        assert_eq!("/a", svc.to_string(&p.parent().unwrap()));
        assert_eq!("/", svc.to_string(&parse(&svc, "/a").parent().unwrap()));
        assert!(parse(&svc, "/").parent().is_none());
        assert!(parse(&svc, "a").parent().is_none());
        assert!(parse(&svc, "").file_name().is_none());
    }

    #[test]
    fn resolve_rules() {
        let svc = unix();
        let base = parse(&svc, "/a/b");
        assert_eq!("/a/b/c", svc.to_string(&base.resolve(&parse(&svc, "c"))));
        assert_eq!("/x", svc.to_string(&base.resolve(&parse(&svc, "/x"))));
        assert_eq!("/a/b", svc.to_string(&base.resolve(&parse(&svc, ""))));
        assert_eq!(
            "/a/c",
            svc.to_string(&base.resolve_sibling(&parse(&svc, "c")))
        );
        // Resolving against the empty path drops the placeholder name.
        assert_eq!("c", svc.to_string(&parse(&svc, "").resolve(&parse(&svc, "c"))));
    }

    #[test]
    fn relativize_rules() {
        let svc = unix();
        let a = parse(&svc, "/a/b");
        assert_eq!(
            "c/d",
            svc.to_string(&a.relativize(&parse(&svc, "/a/b/c/d")).unwrap())
        );
        assert_eq!(
            "../x",
            svc.to_string(&a.relativize(&parse(&svc, "/a/x")).unwrap())
        );
        assert!(a.relativize(&parse(&svc, "/a/b")).unwrap().is_empty_path());
        assert!(matches!(
            a.relativize(&parse(&svc, "rel")),
            Err(Error::IllegalArgument(_))
        ));
    }

    #[test]
    fn starts_and_ends_with() {
        let svc = unix();
        let p = parse(&svc, "/a/b/c");
        assert!(p.starts_with(&parse(&svc, "/a/b")));
        assert!(!p.starts_with(&parse(&svc, "a/b")));
        assert!(p.ends_with(&parse(&svc, "b/c")));
        assert!(p.ends_with(&parse(&svc, "/a/b/c")));
        assert!(!p.ends_with(&parse(&svc, "/b/c")));
    }

    #[test]
    fn subpath_range() {
        let svc = unix();
        let p = parse(&svc, "/a/b/c/d");
        assert_eq!("b/c", svc.to_string(&p.subpath(1, 3).unwrap()));
        assert!(p.subpath(2, 2).is_err());
        assert!(p.subpath(0, 9).is_err());
    }

    #[test]
    fn windows_drive_roots() {
        let svc = windows();
        let p = parse(&svc, "C:\\foo\\bar");
        assert_eq!("C:\\", p.root().unwrap().display());
        assert_eq!("C:\\foo\\bar", svc.to_string(&p));
        // Forward slashes are accepted on input, backslash is emitted.
        assert_eq!("C:\\foo\\bar", svc.to_string(&parse(&svc, "C:/foo/bar")));
        assert_eq!("C:\\", svc.to_string(&parse(&svc, "C:\\")));
    }

    #[test]
    fn windows_unc_roots() {
        let svc = windows();
        let p = parse(&svc, "\\\\host\\share\\x");
        assert_eq!("\\\\host\\share\\", p.root().unwrap().display());
        assert_eq!("\\\\host\\share\\x", svc.to_string(&p));
        assert!(matches!(
            svc.parse_path(&["\\\\host"]),
            Err(Error::InvalidPath(_))
        ));
    }

    #[test]
    fn windows_rejects_bad_input() {
        let svc = windows();
        assert!(matches!(
            svc.parse_path(&["C:foo"]),
            Err(Error::InvalidPath(_))
        ));
        assert!(matches!(
            svc.parse_path(&["a\\b|c"]),
            Err(Error::InvalidPath(_))
        ));
    }

    #[test]
    fn canonical_equality_service() {
        let svc = PathService::new(
            PathType::windows(),
            Vec::new(),
            vec![Normalization::CaseFoldAscii],
            true,
        );
        let a = svc.parse_path(&["C:\\Foo"]).unwrap();
        let b = svc.parse_path(&["c:\\fOO"]).unwrap();
        assert_eq!(Ordering::Equal, svc.compare_paths(&a, &b));
        assert_eq!(svc.hash_path(&a), svc.hash_path(&b));
        // Display form is preserved.
        assert_eq!("C:\\Foo", svc.to_string(&a));
    }

    #[test]
    fn display_equality_service() {
        let svc = unix();
        let a = parse(&svc, "/Foo");
        let b = parse(&svc, "/foo");
        assert_ne!(Ordering::Equal, svc.compare_paths(&a, &b));
    }

    #[test]
    fn compare_zero_implies_hash_equal() {
        let svc = PathService::new(
            PathType::unix(),
            Vec::new(),
            vec![Normalization::CaseFoldUnicode],
            true,
        );
        let paths = ["/a/B", "/A/b", "/c", "d/E", ""];
        for x in paths {
            for y in paths {
                let px = parse(&svc, x);
                let py = parse(&svc, y);
                if svc.compare_paths(&px, &py) == Ordering::Equal {
                    assert_eq!(svc.hash_path(&px), svc.hash_path(&py), "{x} vs {y}");
                }
            }
        }
    }

    #[test]
    fn normalized_names_flow_into_paths() {
        let svc = PathService::new(
            PathType::unix(),
            vec![Normalization::Nfc],
            vec![Normalization::Nfc, Normalization::CaseFoldUnicode],
            true,
        );
        let p = svc.parse_path(&["/CAFE\u{301}"]).unwrap();
        assert_eq!("/CAF\u{c9}", svc.to_string(&p));
        assert_eq!("caf\u{e9}", p.names()[0].canonical());
    }

    #[test]
    fn dot_names_escape_normalization() {
        let svc = PathService::new(
            PathType::unix(),
            Vec::new(),
            vec![Normalization::CaseFoldAscii],
            true,
        );
        let name = svc.name("..");
        assert!(name.is_parent());
        assert_eq!(Name::parent_name(), name);
    }
}
