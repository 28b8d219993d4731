//! Navigation strings.
//!
//! A path is a list of steps separated by spaces or commas. Each step is a
//! direction word or its two-letter abbreviation, optionally followed by a
//! count, attached or as the next token:
//!
//! ```text
//! parent            pa
//! next 2            ne2
//! previous          pr
//! first, last       fi, la
//! child 3           ch3      (1-based index)
//! #9                raw navigation direction code
//! ```
//!
//! Sub-elements navigate arithmetically within their parent; objects use
//! the backend's navigation.

use std::fmt;
use std::str::FromStr;

use horizon_probe_core::logging::targets;
use horizon_probe_core::{Ao, Child, Error, MiscFlags, NavDir, Result};

/// One direction of a navigation step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavKind {
    Parent,
    Next,
    Previous,
    FirstChild,
    LastChild,
    /// The n-th child, 1-based.
    Child(u32),
    /// A backend direction code.
    Raw(NavDir),
}

/// A direction and how many times to go there.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NavStep {
    pub kind: NavKind,
    pub count: u32,
}

/// A parsed navigation string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavPath {
    steps: Vec<NavStep>,
}

impl NavPath {
    pub fn steps(&self) -> &[NavStep] {
        &self.steps
    }
}

fn invalid(token: &str) -> Error {
    Error::invalid_parameter(format!("Invalid navigation string near '{token}'."))
}

fn parse_count(s: &str, token: &str) -> Result<u32> {
    s.parse::<u32>()
        .ok()
        .filter(|&n| n >= 1)
        .ok_or_else(|| invalid(token))
}

impl FromStr for NavPath {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut tokens = s
            .split([' ', ','])
            .filter(|t| !t.is_empty())
            .peekable();
        let mut steps = Vec::new();

        while let Some(token) = tokens.next() {
            let (word, digits) = match token.strip_prefix('#') {
                Some(code) => {
                    let code: i32 = code.parse().map_err(|_| invalid(token))?;
                    ("#", code.to_string())
                }
                None => {
                    let split = token
                        .find(|c: char| c.is_ascii_digit())
                        .unwrap_or(token.len());
                    (&token[..split], token[split..].to_owned())
                }
            };
            // a count may follow as its own token
            let mut argument = (!digits.is_empty() && word != "#").then_some(digits.as_str());
            let next_is_number = tokens
                .peek()
                .is_some_and(|t| t.bytes().all(|b| b.is_ascii_digit()));
            if argument.is_none() && next_is_number {
                argument = tokens.next();
            }

            let n = argument.map(|a| parse_count(a, token)).transpose()?;
            let kind = match word.to_ascii_lowercase().as_str() {
                "parent" | "pa" => NavKind::Parent,
                "next" | "ne" => NavKind::Next,
                "previous" | "pr" => NavKind::Previous,
                "first" | "fi" => NavKind::FirstChild,
                "last" | "la" => NavKind::LastChild,
                "child" | "ch" => {
                    steps.push(NavStep {
                        kind: NavKind::Child(n.unwrap_or(1)),
                        count: 1,
                    });
                    continue;
                }
                "#" => NavKind::Raw(NavDir(digits.parse().map_err(|_| invalid(token))?)),
                _ => return Err(invalid(token)),
            };
            steps.push(NavStep {
                kind,
                count: n.unwrap_or(1),
            });
        }

        if steps.is_empty() {
            return Err(Error::invalid_parameter("Empty navigation string."));
        }
        Ok(Self { steps })
    }
}

impl fmt::Display for NavPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, step) in self.steps.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            match step.kind {
                NavKind::Parent => f.write_str("pa")?,
                NavKind::Next => f.write_str("ne")?,
                NavKind::Previous => f.write_str("pr")?,
                NavKind::FirstChild => f.write_str("fi")?,
                NavKind::LastChild => f.write_str("la")?,
                NavKind::Child(n) => write!(f, "ch{n}")?,
                NavKind::Raw(dir) => write!(f, "#{}", dir.0)?,
            }
            if step.count > 1 {
                write!(f, " {}", step.count)?;
            }
        }
        Ok(())
    }
}

/// Follow `path` from `from`.
///
/// A step that leads nowhere ends the walk with [`Error::NotFound`].
pub fn navigate(from: &Ao, path: &NavPath) -> Result<Ao> {
    let mut cur = from.clone();
    for step in path.steps() {
        for _ in 0..step.count {
            cur = navigate_once(&cur, step.kind)?.ok_or(Error::NotFound)?;
        }
    }
    tracing::trace!(target: targets::RESOLVE, path = %path, to = ?cur, "navigated");
    Ok(cur)
}

fn inherit(ao: &Ao) -> MiscFlags {
    ao.flags() & MiscFlags::INHERIT
}

fn navigate_once(ao: &Ao, kind: NavKind) -> Result<Option<Ao>> {
    if ao.elem() != 0 {
        return navigate_element(ao, kind);
    }
    let node = ao.node();
    match kind {
        NavKind::Parent => Ok(node
            .parent()?
            .map(|p| Ao::with_flags(p, 0, inherit(ao)))),
        NavKind::Child(n) => {
            let index = n as usize - 1;
            Ok(node
                .children()?
                .into_iter()
                .nth(index)
                .map(|c| Ao::child_of(ao, c)))
        }
        NavKind::FirstChild | NavKind::LastChild => {
            let dir = if kind == NavKind::FirstChild {
                NavDir::FIRST_CHILD
            } else {
                NavDir::LAST_CHILD
            };
            match node.navigate(dir, 0) {
                Ok(child) => Ok(child.map(|c| Ao::child_of(ao, c))),
                // some backends do not navigate to children
                Err(_) => {
                    let mut kids = node.children()?;
                    let child = if kind == NavKind::FirstChild {
                        (!kids.is_empty()).then(|| kids.swap_remove(0))
                    } else {
                        kids.pop()
                    };
                    Ok(child.map(|c| Ao::child_of(ao, c)))
                }
            }
        }
        NavKind::Next | NavKind::Previous => {
            let dir = if kind == NavKind::Next { NavDir::NEXT } else { NavDir::PREVIOUS };
            match node.navigate(dir, 0)? {
                Some(Child::Node(n)) => Ok(Some(Ao::with_flags(n, 0, inherit(ao)))),
                // a sibling sub-element is relative to the parent
                Some(Child::Element(i)) => Ok(node
                    .parent()?
                    .map(|p| Ao::with_flags(p, i, inherit(ao)))),
                None => Ok(None),
            }
        }
        NavKind::Raw(dir) => Ok(node.navigate(dir, 0)?.map(|c| Ao::child_of(ao, c))),
    }
}

fn navigate_element(ao: &Ao, kind: NavKind) -> Result<Option<Ao>> {
    let node = ao.node();
    let elem = ao.elem();
    let to = match kind {
        NavKind::Parent => 0,
        NavKind::Next => {
            let count = node.child_count()?;
            if usize::try_from(elem).is_ok_and(|e| e < count) {
                elem + 1
            } else {
                return Ok(None);
            }
        }
        NavKind::Previous if elem > 1 => elem - 1,
        NavKind::Raw(dir) => {
            return Ok(node
                .navigate(dir, elem)?
                .map(|c| Ao::with_flags(node.clone(), 0, inherit(ao)).resolve(c)));
        }
        _ => return Ok(None),
    };
    Ok(Some(Ao::with_flags(node.clone(), to, inherit(ao))))
}
