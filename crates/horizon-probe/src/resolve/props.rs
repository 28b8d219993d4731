//! Property selectors.
//!
//! A selector is one character, or `@` followed by an HTML attribute name:
//!
//! | selector | property |
//! |---|---|
//! | `R` | role, as a role name or custom role string |
//! | `n` `v` `d` `h` `a` `k` | name, value, description, help, default action, keyboard shortcut |
//! | `u` `U` | modern backend automation id, class name |
//! | `s` | state |
//! | `r` | rectangle |
//! | `w` | native window |
//! | `@name` | HTML attribute, read in the browser process |

use std::str::FromStr;

use horizon_probe_core::{Ao, Error, Result, StringProp};
use horizon_probe_marshal::PropValue;

use crate::context::Context;
use crate::dpi::DpiScaler;

/// What [`get_property`] reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropSelector {
    Role,
    String(StringProp),
    State,
    Rect,
    Window,
    Html(String),
}

impl PropSelector {
    /// The selector for a one-character code.
    pub fn from_char(c: char) -> Result<Self> {
        Ok(match c {
            'R' => Self::Role,
            'n' => Self::String(StringProp::Name),
            'v' => Self::String(StringProp::Value),
            'd' => Self::String(StringProp::Description),
            'h' => Self::String(StringProp::Help),
            'a' => Self::String(StringProp::DefaultAction),
            'k' => Self::String(StringProp::KeyboardShortcut),
            'u' => Self::String(StringProp::AutomationId),
            'U' => Self::String(StringProp::ClassName),
            's' => Self::State,
            'r' => Self::Rect,
            'w' => Self::Window,
            other => return Err(Error::invalid_parameter(format!("Unknown property selector '{other}'."))),
        })
    }
}

impl FromStr for PropSelector {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if let Some(name) = s.strip_prefix('@') {
            if name.is_empty() {
                return Err(Error::invalid_parameter("Missing attribute name after @."));
            }
            return Ok(Self::Html(name.to_owned()));
        }
        let mut chars = s.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Self::from_char(c),
            _ => Err(Error::invalid_parameter(format!("Unknown property selector '{s}'."))),
        }
    }
}

/// Read one property of `ao` in this process.
///
/// Rectangles of objects obtained in process are converted to physical
/// pixels when the window is DPI-scaled. HTML attributes need the DOM of
/// the browser process; use the browser module for them.
pub fn get_property(ctx: &Context, ao: &Ao, selector: &PropSelector) -> Result<PropValue> {
    Ok(match selector {
        PropSelector::Role => PropValue::Text(ao.role()?.to_role_string().into_owned()),
        PropSelector::String(prop) => PropValue::Text(ao.string_prop(*prop)?.unwrap_or_default()),
        PropSelector::State => PropValue::State(ao.state()?),
        PropSelector::Rect => {
            let r = ao.location()?;
            match ao.window().filter(|_| ao.is_in_proc()) {
                Some(w) => {
                    let scaler = DpiScaler::new(ctx.windows.as_ref(), w, true);
                    PropValue::Rect(scaler.scale(r, false).rect().unwrap_or(r))
                }
                None => PropValue::Rect(r),
            }
        }
        PropSelector::Window => match ao.window() {
            Some(w) => PropValue::Window(w),
            None => PropValue::None,
        },
        PropSelector::Html(_) => return Err(Error::NotSupported),
    })
}

#[cfg(test)]
mod tests {
    use horizon_probe_core::{MiscFlags, ProbeConfig, Rect, Role, RoleValue, State, WindowHandle};

    use super::*;
    use crate::mock::{MockDesktop, MockNode, MockWindow};

    fn context() -> (std::sync::Arc<MockDesktop>, Context) {
        let d = MockDesktop::new();
        let ctx = Context::new(d.clone(), d.clone(), ProbeConfig::default());
        (d, ctx)
    }

    #[test]
    fn test_parse_selectors() {
        assert_eq!("n".parse::<PropSelector>().unwrap(), PropSelector::String(StringProp::Name));
        assert_eq!("U".parse::<PropSelector>().unwrap(), PropSelector::String(StringProp::ClassName));
        assert_eq!("@href".parse::<PropSelector>().unwrap(), PropSelector::Html("href".into()));
        assert!("@".parse::<PropSelector>().is_err());
        assert!("nv".parse::<PropSelector>().is_err());
        assert!(matches!(PropSelector::from_char('x'), Err(Error::InvalidParameter(_))));
    }

    #[test]
    fn test_read_properties() {
        let (_d, ctx) = context();
        let node = MockNode::build(Role::PUSHBUTTON, "OK")
            .value("v")
            .prop(StringProp::Description, "confirms")
            .state(State::FOCUSABLE)
            .rect(Rect::new(1, 2, 3, 4))
            .window(WindowHandle(0x44))
            .finish();
        let ao = Ao::new(node);
        let get = |s: &str| get_property(&ctx, &ao, &s.parse().unwrap()).unwrap();
        assert_eq!(get("R"), PropValue::Text("PUSHBUTTON".into()));
        assert_eq!(get("n"), PropValue::Text("OK".into()));
        assert_eq!(get("v"), PropValue::Text("v".into()));
        assert_eq!(get("d"), PropValue::Text("confirms".into()));
        assert_eq!(get("h"), PropValue::Text(String::new()));
        assert_eq!(get("s"), PropValue::State(State::FOCUSABLE));
        assert_eq!(get("r"), PropValue::Rect(Rect::new(1, 2, 3, 4)));
        assert_eq!(get("w"), PropValue::Window(WindowHandle(0x44)));
        // reading twice gives the same value
        assert_eq!(get("n"), get("n"));
    }

    #[test]
    fn test_custom_role_string() {
        let (_d, ctx) = context();
        let ao = Ao::new(MockNode::build(RoleValue::Custom("div".into()), "").finish());
        let v = get_property(&ctx, &ao, &PropSelector::Role).unwrap();
        assert_eq!(v, PropValue::Text("div".into()));
    }

    #[test]
    fn test_in_proc_rect_is_scaled() {
        let (d, ctx) = context();
        let w = WindowHandle(0x50);
        d.add_window(MockWindow::top_level(w, "App").rect(Rect::new(0, 0, 300, 300)).dpi_scaled(150));
        let node = MockNode::build(Role::PUSHBUTTON, "OK").rect(Rect::new(10, 10, 20, 20)).window(w).finish();

        let out_of_proc = Ao::new(node.clone());
        let v = get_property(&ctx, &out_of_proc, &PropSelector::Rect).unwrap();
        assert_eq!(v, PropValue::Rect(Rect::new(10, 10, 20, 20)));

        let in_proc = Ao::with_flags(node, 0, MiscFlags::IN_PROC);
        let v = get_property(&ctx, &in_proc, &PropSelector::Rect).unwrap();
        assert_eq!(v, PropValue::Rect(Rect::new(15, 15, 30, 30)));
    }
}
