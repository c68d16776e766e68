//! Path matchers: `glob:` and `regex:` pattern compilation.

use regex::Regex;
use regex::RegexBuilder;

use crate::error::Error;
use crate::error::Result;
use crate::path::EntryPath;
use crate::path::PathType;

/// A compiled path matcher. Both supported syntaxes lower to a single
/// anchored regular expression over the rendered path string; windows
/// matchers match case-insensitively.
#[derive(Debug)]
pub struct PathMatcher {
    regex: Regex,
    path_type: PathType,
}

impl PathMatcher {
    /// Compiles a `"syntax:pattern"` string. Supported syntaxes are `glob`
    /// and `regex`; anything else fails with `UnsupportedOperation`, and a
    /// malformed pattern fails with `IllegalArgument`.
    pub fn compile(syntax_and_pattern: &str, path_type: PathType) -> Result<PathMatcher> {
        let (syntax, pattern) = syntax_and_pattern.split_once(':').ok_or_else(|| {
            Error::IllegalArgument(format!(
                "must be of the form \"syntax:pattern\": {syntax_and_pattern}"
            ))
        })?;
        let regex = match syntax {
            "glob" => glob_to_regex(pattern, path_type.separator())?,
            "regex" => pattern.to_owned(),
            _ => {
                return Err(Error::UnsupportedOperation(format!(
                    "unsupported path matcher syntax: {syntax}"
                )));
            }
        };
        let anchored = format!(r"\A(?:{regex})\z");
        let regex = RegexBuilder::new(&anchored)
            .case_insensitive(path_type.case_insensitive_matching())
            .build()
            .map_err(|e| Error::IllegalArgument(format!("invalid pattern: {e}")))?;
        Ok(PathMatcher { regex, path_type })
    }

    /// Tests a path by rendering it with its display names.
    pub fn matches(&self, path: &EntryPath) -> bool {
        let rendered = self.path_type.render(
            path.root().map(|r| r.display()),
            path.names().iter().map(|n| n.display()),
        );
        self.matches_str(&rendered)
    }

    /// Tests an already rendered path string.
    pub fn matches_str(&self, rendered: &str) -> bool {
        self.regex.is_match(rendered)
    }
}

fn regex_escape_char(c: char, out: &mut String) {
    if c.is_ascii_alphanumeric() || c == '_' {
        out.push(c);
    } else {
        out.push('\\');
        out.push(c);
    }
}

/// Translates a glob pattern into regex syntax.
///
/// `*` matches a run of non-separator characters, `**` any run at all, `?`
/// one non-separator character; `[...]` is a character class that never
/// matches the separator (`!` negates); `{a,b}` is a non-nestable
/// alternation; `\` escapes the next character.
fn glob_to_regex(glob: &str, separator: &str) -> Result<String> {
    let sep_class = if separator == "\\" { r"\\" } else { separator };
    let mut out = String::with_capacity(glob.len() * 2);
    let mut chars = glob.chars().peekable();
    let mut group_depth = 0u32;
    while let Some(c) = chars.next() {
        match c {
            '*' => {
                if chars.peek() == Some(&'*') {
                    chars.next();
                    out.push_str(".*");
                } else {
                    out.push_str(&format!("[^{sep_class}]*"));
                }
            }
            '?' => out.push_str(&format!("[^{sep_class}]")),
            '\\' => match chars.next() {
                Some(escaped) => regex_escape_char(escaped, &mut out),
                None => {
                    return Err(Error::IllegalArgument(
                        "glob pattern ends with a trailing escape".to_owned(),
                    ));
                }
            },
            '[' => {
                out.push('[');
                if chars.peek() == Some(&'!') {
                    chars.next();
                    out.push('^');
                    out.push_str(sep_class);
                }
                let mut closed = false;
                let mut first = true;
                while let Some(cc) = chars.next() {
                    match cc {
                        ']' if !first => {
                            closed = true;
                            break;
                        }
                        '\\' => {
                            out.push_str("\\\\");
                        }
                        // Escape everything the regex class grammar treats
                        // specially; `-` stays bare so ranges survive.
                        '^' | '[' | ']' | '&' | '~' => {
                            out.push('\\');
                            out.push(cc);
                        }
                        _ if separator.contains(cc) => {
                            return Err(Error::IllegalArgument(
                                "glob character class may not contain the separator".to_owned(),
                            ));
                        }
                        _ => out.push(cc),
                    }
                    first = false;
                }
                if !closed {
                    return Err(Error::IllegalArgument(
                        "glob pattern has an unclosed character class".to_owned(),
                    ));
                }
                out.push(']');
            }
            '{' => {
                if group_depth > 0 {
                    return Err(Error::IllegalArgument(
                        "glob groups may not be nested".to_owned(),
                    ));
                }
                group_depth += 1;
                out.push_str("(?:");
            }
            '}' => {
                if group_depth == 0 {
                    return Err(Error::IllegalArgument(
                        "glob pattern has an unmatched '}'".to_owned(),
                    ));
                }
                group_depth -= 1;
                out.push(')');
            }
            ',' if group_depth > 0 => out.push('|'),
            _ => regex_escape_char(c, &mut out),
        }
    }
    if group_depth > 0 {
        return Err(Error::IllegalArgument(
            "glob pattern has an unclosed group".to_owned(),
        ));
    }
    Ok(out)
}
