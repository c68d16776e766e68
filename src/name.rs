//! Path component names.

use std::borrow::Borrow;
use std::cmp::Ordering;
use std::fmt;
use std::hash::Hash;
use std::hash::Hasher;

#[cfg(feature = "serializable")]
use serde::Deserialize;
#[cfg(feature = "serializable")]
use serde::Serialize;
use unicode_normalization::UnicodeNormalization;

/// An immutable path component: a pair of the string as the user wrote it
/// (`display`) and the normalized string used for equality (`canonical`).
///
/// Equality, ordering and hashing all use the canonical form; rendering uses
/// the display form. Both forms are fixed when the name is created, so a
/// filesystem's normalization settings apply uniformly to every name it ever
/// sees.
#[derive(Clone, Debug)]
pub struct Name {
    display: Box<str>,
    canonical: Box<str>,
}

impl Name {
    /// Creates a name whose display and canonical forms are both `s`.
    pub fn simple(s: impl Into<String>) -> Name {
        let s: Box<str> = s.into().into_boxed_str();
        Name {
            display: s.clone(),
            canonical: s,
        }
    }

    /// Creates a name with distinct display and canonical forms.
    pub fn create(display: impl Into<String>, canonical: impl Into<String>) -> Name {
        Name {
            display: display.into().into_boxed_str(),
            canonical: canonical.into().into_boxed_str(),
        }
    }

    /// The self entry, `"."`.
    pub fn self_name() -> Name {
        Name::simple(".")
    }

    /// The parent entry, `".."`.
    pub fn parent_name() -> Name {
        Name::simple("..")
    }

    /// The empty name used by empty paths and root markers.
    pub fn empty() -> Name {
        Name::simple("")
    }

    /// The form rendered to users.
    pub fn display(&self) -> &str {
        &self.display
    }

    /// The normalized form used for equality and hashing.
    pub fn canonical(&self) -> &str {
        &self.canonical
    }

    /// True for the `"."` pseudo-entry name.
    pub fn is_self(&self) -> bool {
        &*self.canonical == "."
    }

    /// True for the `".."` pseudo-entry name.
    pub fn is_parent(&self) -> bool {
        &*self.canonical == ".."
    }

    /// True for `"."`, `".."` and the empty name, which may not be linked in
    /// a directory.
    pub fn is_reserved(&self) -> bool {
        matches!(&*self.canonical, "." | ".." | "")
    }
}

impl PartialEq for Name {
    fn eq(&self, other: &Name) -> bool {
        self.canonical == other.canonical
    }
}

impl Eq for Name {}

impl Hash for Name {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.canonical.hash(state);
    }
}

impl PartialOrd for Name {
    fn partial_cmp(&self, other: &Name) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Name {
    fn cmp(&self, other: &Name) -> Ordering {
        self.canonical.cmp(&other.canonical)
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display)
    }
}

impl Borrow<str> for Name {
    fn borrow(&self) -> &str {
        &self.canonical
    }
}

/// A normalization applied to name strings when a filesystem creates names.
///
/// A configuration holds a set of these per form (display and canonical).
/// Composition order is fixed: a Unicode normalization first, then a case
/// fold, so that folding operates on composed (or decomposed) text.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub enum Normalization {
    /// Unicode canonical composition (NFC).
    Nfc,
    /// Unicode canonical decomposition (NFD).
    Nfd,
    /// Lowercase folding of ASCII letters only.
    CaseFoldAscii,
    /// Full Unicode lowercase folding.
    CaseFoldUnicode,
}

impl Normalization {
    fn apply(self, s: &str) -> String {
        match self {
            Normalization::Nfc => s.nfc().collect(),
            Normalization::Nfd => s.nfd().collect(),
            Normalization::CaseFoldAscii => s.to_ascii_lowercase(),
            Normalization::CaseFoldUnicode => s.chars().flat_map(char::to_lowercase).collect(),
        }
    }
}

/// Applies `modes` to `s` in composition order. The slice is treated as a
/// set; duplicates are harmless.
pub(crate) fn normalize(s: &str, modes: &[Normalization]) -> String {
    let mut modes = modes.to_vec();
    modes.sort_unstable();
    modes.dedup();
    let mut out = s.to_owned();
    for mode in modes {
        out = mode.apply(&out);
    }
    out
}

/// Rejects mode sets that combine contradictory normalizations.
pub(crate) fn check_normalizations(modes: &[Normalization]) -> Result<(), String> {
    let has = |m: Normalization| modes.contains(&m);
    if has(Normalization::Nfc) && has(Normalization::Nfd) {
        return Err("NFC and NFD normalization cannot be combined".to_owned());
    }
    if has(Normalization::CaseFoldAscii) && has(Normalization::CaseFoldUnicode) {
        return Err("ASCII and Unicode case folding cannot be combined".to_owned());
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::Hash;
    use std::hash::Hasher;

    use crate::name::Name;
    use crate::name::Normalization;
    use crate::name::check_normalizations;
    use crate::name::normalize;

    fn hash_of(name: &Name) -> u64 {
        let mut h = DefaultHasher::new();
        name.hash(&mut h);
        h.finish()
    }

    #[test]
    fn equality_uses_canonical_form() {
        let a = Name::create("Foo", "foo");
        let b = Name::create("FOO", "foo");
        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));
        assert_ne!(a.display(), b.display());
    }

    #[test]
    fn simple_name_has_matching_forms() {
        let n = Name::simple("bar");
        assert_eq!("bar", n.display());
        assert_eq!("bar", n.canonical());
    }

    #[test]
    fn reserved_names() {
        assert!(Name::self_name().is_reserved());
        assert!(Name::parent_name().is_reserved());
        assert!(Name::empty().is_reserved());
        assert!(!Name::simple("...").is_reserved());
    }

    #[test]
    fn case_folds() {
        assert_eq!("foo", normalize("FOO", &[Normalization::CaseFoldAscii]));
        // ASCII folding leaves non-ASCII letters alone.
        assert_eq!("Äbc", normalize("ÄBC", &[Normalization::CaseFoldAscii]));
        assert_eq!("äbc", normalize("ÄBC", &[Normalization::CaseFoldUnicode]));
    }

    #[test]
    fn unicode_normalization_forms() {
        // U+00E9 vs 'e' + U+0301
        let composed = "caf\u{e9}";
        let decomposed = "cafe\u{301}";
        assert_eq!(composed, normalize(decomposed, &[Normalization::Nfc]));
        assert_eq!(decomposed, normalize(composed, &[Normalization::Nfd]));
    }

    #[test]
    fn fold_applies_after_unicode_normalization() {
        let decomposed = "CAFE\u{301}";
        assert_eq!(
            "caf\u{e9}",
            normalize(
                decomposed,
                &[Normalization::CaseFoldUnicode, Normalization::Nfc]
            )
        );
    }

    #[test]
    fn contradictory_modes_rejected() {
        assert!(check_normalizations(&[Normalization::Nfc, Normalization::Nfd]).is_err());
        assert!(
            check_normalizations(&[
                Normalization::CaseFoldAscii,
                Normalization::CaseFoldUnicode
            ])
            .is_err()
        );
        assert!(check_normalizations(&[Normalization::Nfc]).is_ok());
    }
}
