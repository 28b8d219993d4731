//! Wildcard expressions.
//!
//! A wildcard expression is plain text compared with the whole subject string,
//! case-insensitively. `*` matches any run of characters and `?` any single
//! character; there is no escape for them.
//!
//! An expression can start with `**options ` (options, then one space):
//!
//! | option | meaning |
//! |---|---|
//! | `t` | literal text, `*` and `?` are not special |
//! | `r`, `R` | regular expression (found anywhere in the subject) |
//! | `m` | several expressions separated by `\|\|`, or by the text in `m(sep)` |
//! | `c` | case-sensitive |
//! | `n` | negate the result |
//!
//! In a multi expression every part with option `n` must match (that is, must
//! not match without `n`), and at least one of the other parts must match.
//!
//! # Example
//!
//! ```ignore
//! use horizon_probe_core::Wildex;
//!
//! let w: Wildex = "Save*".parse()?;
//! assert!(w.is_match("save as"));
//! let w: Wildex = "**mn Cancel||Close".parse()?;
//! assert!(w.is_match("OK"));
//! ```

use std::str::FromStr;

use regex::{Regex, RegexBuilder};

use crate::error::{Error, Result};

#[derive(Debug, Clone)]
enum Kind {
    Text(String),
    Wildcard(Regex),
    Regex(Regex),
    Multi(Vec<Wildex>),
}

/// A parsed wildcard expression.
#[derive(Debug, Clone)]
pub struct Wildex {
    kind: Kind,
    ignore_case: bool,
    not: bool,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Type {
    Wildcard,
    Text,
    Regex,
    Multi,
}

const OPTIONS_ERROR: &str = "Invalid \"**options \" in wildcard expression.";

impl Wildex {
    /// Parse an expression. Case-insensitive unless it has option `c`.
    pub fn parse(expr: &str) -> Result<Self> {
        Self::parse_with_case(expr, false)
    }

    fn parse_with_case(expr: &str, match_case: bool) -> Result<Self> {
        let mut ty = Type::Wildcard;
        let mut ignore_case = !match_case;
        let mut not = false;
        let mut split: Option<&str> = None;
        let mut text = expr;

        if let Some(rest) = expr.strip_prefix("**").filter(|r| !r.is_empty()) {
            let mut chars = rest.char_indices().peekable();
            let mut prev = '*';
            let body = loop {
                let Some((i, c)) = chars.next() else {
                    return Err(Error::invalid_parameter(OPTIONS_ERROR));
                };
                match c {
                    ' ' => break &rest[i + 1..],
                    't' | 'r' | 'R' | 'm' if ty == Type::Wildcard => {
                        ty = match c {
                            't' => Type::Text,
                            'm' => Type::Multi,
                            _ => Type::Regex,
                        };
                    }
                    'c' => ignore_case = false,
                    'n' => not = true,
                    '(' if prev == 'm' => {
                        let tail = &rest[i + 1..];
                        let end = tail
                            .find(')')
                            .filter(|&e| e > 0)
                            .ok_or_else(|| Error::invalid_parameter(OPTIONS_ERROR))?;
                        split = Some(&tail[..end]);
                        // skip the separator and the closing parenthesis
                        for _ in 0..=tail[..end].chars().count() {
                            chars.next();
                        }
                    }
                    _ => return Err(Error::invalid_parameter(OPTIONS_ERROR)),
                }
                prev = c;
            };
            text = body;

            match ty {
                Type::Regex => {
                    let re = RegexBuilder::new(text)
                        .case_insensitive(ignore_case)
                        .build()
                        .map_err(|e| Error::invalid_parameter(format!("Invalid regular expression. {e}")))?;
                    return Ok(Self {
                        kind: Kind::Regex(re),
                        ignore_case,
                        not,
                    });
                }
                Type::Multi => {
                    let parts = text
                        .split(split.unwrap_or("||"))
                        .map(|p| Self::parse_with_case(p, !ignore_case))
                        .collect::<Result<Vec<_>>>()?;
                    return Ok(Self {
                        kind: Kind::Multi(parts),
                        ignore_case,
                        not,
                    });
                }
                Type::Wildcard | Type::Text => {}
            }
        }

        let kind = if ty == Type::Wildcard && has_wildcard_chars(text) {
            Kind::Wildcard(wildcard_regex(text, ignore_case)?)
        } else {
            Kind::Text(text.to_owned())
        };
        Ok(Self {
            kind,
            ignore_case,
            not,
        })
    }

    /// Whether the expression has option `n`.
    pub fn is_not(&self) -> bool {
        self.not
    }

    pub fn is_case_insensitive(&self) -> bool {
        self.ignore_case
    }

    /// Compare a string with the expression.
    pub fn is_match(&self, s: &str) -> bool {
        let r = match &self.kind {
            Kind::Text(t) => {
                if self.ignore_case {
                    t.to_lowercase() == s.to_lowercase()
                } else {
                    t == s
                }
            }
            Kind::Wildcard(re) | Kind::Regex(re) => re.is_match(s),
            Kind::Multi(parts) => return self.multi_match(parts, s),
        };
        r ^ self.not
    }

    fn multi_match(&self, parts: &[Wildex], s: &str) -> bool {
        let mut n_not = 0;
        for p in parts.iter().filter(|p| p.not) {
            if !p.is_match(s) {
                return self.not;
            }
            n_not += 1;
        }
        if n_not == parts.len() {
            return !self.not;
        }
        if parts.iter().any(|p| !p.not && p.is_match(s)) {
            !self.not
        } else {
            self.not
        }
    }
}

impl FromStr for Wildex {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Whether `s` contains `*` or `?`.
pub fn has_wildcard_chars(s: &str) -> bool {
    s.contains(['*', '?'])
}

fn wildcard_regex(pattern: &str, ignore_case: bool) -> Result<Regex> {
    let mut re = String::with_capacity(pattern.len() + 8);
    re.push_str("^(?s:");
    let mut buf = [0u8; 4];
    for c in pattern.chars() {
        match c {
            '*' => re.push_str(".*"),
            '?' => re.push('.'),
            c => re.push_str(&regex::escape(c.encode_utf8(&mut buf))),
        }
    }
    re.push_str(")$");
    RegexBuilder::new(&re)
        .case_insensitive(ignore_case)
        .build()
        .map_err(|e| Error::invalid_parameter(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn m(expr: &str, s: &str) -> bool {
        Wildex::parse(expr).unwrap().is_match(s)
    }

    #[test]
    fn test_plain_text_is_whole_and_case_insensitive() {
        assert!(m("OK", "ok"));
        assert!(!m("OK", "OK button"));
        assert!(m("", ""));
        assert!(!m("", "x"));
    }

    #[test]
    fn test_wildcards() {
        assert!(m("Save*", "Save as..."));
        assert!(m("*.txt", "notes.TXT"));
        assert!(m("date ????-??", "date 2024-01"));
        assert!(!m("date ????-??", "date 24-01"));
        assert!(m("*", ""));
        assert!(m("a*b", "a\nb"));
    }

    #[test]
    fn test_options() {
        assert!(m("**t a*", "A*"));
        assert!(!m("**t a*", "abc"));
        assert!(!m("**c OK", "ok"));
        assert!(m("**n OK", "Cancel"));
        assert!(m("**r ^\\d+$", "123"));
        assert!(m("**rc ^[a-z]+$", "abc"));
        assert!(!m("**rc ^[a-z]+$", "ABC"));
    }

    #[test]
    fn test_multi() {
        assert!(m("**m OK||Cancel", "cancel"));
        assert!(!m("**m OK||Cancel", "Close"));
        assert!(m("**mn OK||Cancel", "Close"));
        assert!(m("**m(;) a*;b*", "beta"));
        // every negated part must hold, one plain part must match
        assert!(m("**m A*||**n *x*", "Alpha"));
        assert!(!m("**m A*||**n *x*", "Alex"));
    }

    #[test]
    fn test_invalid_expressions() {
        for bad in ["**q x", "**r (", "**m(", "**t"] {
            match Wildex::parse(bad) {
                Err(Error::InvalidParameter(_)) => {}
                other => panic!("{bad}: unexpected {other:?}"),
            }
        }
    }

    #[test]
    fn test_double_star_without_options_is_wildcard() {
        assert!(m("**", "anything"));
    }
}
