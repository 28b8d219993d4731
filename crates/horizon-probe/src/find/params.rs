//! Parsed find parameters.
//!
//! [`FindSpec::parse`] turns the textual parameters of a [`FindRequest`] into
//! the filters the engine tests on every visited object. Parsing happens on
//! whichever side runs the search, so an in-process broker reports the same
//! error text as an out-of-process search.

use horizon_probe_core::{
    Ao, Error, FindFlags, ProbeConfig, Rect, Result, SearchScope, State, StringProp, Wildex,
};
use horizon_probe_marshal::FindRequest;

const MISSING_EQUALS: &str = "Missing = in prop string.";
const UNKNOWN_NAME: &str = "Unknown name in prop. For HTML attributes use prefix @.";
const UNKNOWN_STATE: &str = "Unknown state name.";
const INVALID_RECT: &str = "Invalid rect format.";
const INVALID_PROP: &str = "Invalid prop string.";
const PREFIX_CONFLICT: &str =
    "role prefix cannot be used with: flag UIA, flag ClientArea, prop 'class', prop 'id'.";

/// A property constraint tested on every candidate.
#[derive(Debug, Clone)]
pub enum PropFilter {
    /// A string property of the object.
    String { prop: StringProp, value: Wildex },
    /// An HTML attribute of the object's DOM node. `name` has no `@`.
    Html { name: String, value: Wildex },
}

/// `rect` constraint. Unset fields match anything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RectFilter {
    pub left: Option<i32>,
    pub top: Option<i32>,
    pub width: Option<i32>,
    pub height: Option<i32>,
}

impl RectFilter {
    pub fn is_set(&self) -> bool {
        self.left.is_some() || self.top.is_some() || self.width.is_some() || self.height.is_some()
    }

    pub fn matches(&self, r: &Rect) -> bool {
        self.left.is_none_or(|v| v == r.left)
            && self.top.is_none_or(|v| v == r.top)
            && self.width.is_none_or(|v| v == r.width())
            && self.height.is_none_or(|v| v == r.height())
    }

    fn scope(&self) -> SearchScope {
        let mut scope = SearchScope::empty();
        scope.set(SearchScope::IS_RECT_L, self.left.is_some());
        scope.set(SearchScope::IS_RECT_T, self.top.is_some());
        scope.set(SearchScope::IS_RECT_W, self.width.is_some());
        scope.set(SearchScope::IS_RECT_H, self.height.is_some());
        scope
    }
}

/// How child windows are selected by `class` and `id`.
#[derive(Debug, Clone, Default)]
pub struct ControlFilter {
    pub class: Option<Wildex>,
    pub id: Option<i32>,
    /// WinForms control name; may be empty.
    pub winforms: Option<String>,
}

/// Find parameters, parsed.
#[derive(Debug, Clone)]
pub struct FindSpec {
    /// Role string to compare exactly, without browser prefix.
    pub role: Option<String>,
    pub name: Option<Wildex>,
    pub props: Vec<PropFilter>,
    pub flags: FindFlags,
    pub scope: SearchScope,
    pub state_yes: State,
    pub state_no: State,
    pub min_level: usize,
    pub max_level: usize,
    pub max_children: usize,
    /// Roles whose descendants are not searched.
    pub notin: Vec<String>,
    pub rect: RectFilter,
    /// Required sub-element index (`item`).
    pub elem: Option<i32>,
    pub controls: Option<ControlFilter>,
    /// Document URL, for browser searches.
    pub url: Option<Wildex>,
}

impl FindSpec {
    /// Parse and validate request parameters.
    pub fn parse(req: &FindRequest, config: &ProbeConfig) -> Result<Self> {
        let mut spec = Self {
            role: req.role.clone().filter(|r| !r.is_empty()),
            name: req.name.as_deref().map(Wildex::parse).transpose()?,
            props: Vec::new(),
            flags: req.flags,
            scope: req.scope,
            state_yes: State::empty(),
            state_no: State::empty(),
            min_level: 0,
            max_level: config.find.max_level as usize,
            max_children: config.find.max_children as usize,
            notin: Vec::new(),
            rect: RectFilter::default(),
            elem: None,
            controls: None,
            url: None,
        };
        if let Some(prop) = req.prop.as_deref() {
            spec.parse_props(prop)?;
        }

        if spec.scope.contains(SearchScope::IN_WEB_PAGE) {
            spec.flags |= FindFlags::MENU_TOO;
            if spec.flags.intersects(FindFlags::UIA | FindFlags::CLIENT_AREA)
                || spec.scope.contains(SearchScope::IN_CONTROLS)
            {
                return Err(Error::invalid_parameter(PREFIX_CONFLICT));
            }
        }
        Ok(spec)
    }

    /// A spec that matches every object, for captures and internal walks.
    pub fn match_all(flags: FindFlags, scope: SearchScope, config: &ProbeConfig) -> Self {
        Self {
            role: None,
            name: None,
            props: Vec::new(),
            flags,
            scope,
            state_yes: State::empty(),
            state_no: State::empty(),
            min_level: 0,
            max_level: config.find.max_level as usize,
            max_children: config.find.max_children as usize,
            notin: Vec::new(),
            rect: RectFilter::default(),
            elem: None,
            controls: None,
            url: None,
        }
    }

    pub fn has_html_filters(&self) -> bool {
        self.props.iter().any(|p| matches!(p, PropFilter::Html { .. }))
    }

    /// Whether the `rect` constraint accepts `ao`. A failed location read
    /// compares as an empty rectangle at the origin.
    pub fn rect_matches(&self, ao: &Ao) -> bool {
        if !self.rect.is_set() {
            return true;
        }
        self.rect.matches(&ao.location().unwrap_or_default())
    }

    fn parse_props(&mut self, prop: &str) -> Result<()> {
        let items = prop
            .split(['\0', '\n'])
            .map(|item| item.trim_start_matches(|c: char| c <= ' ').trim_end_matches('\r'));
        for item in items.filter(|item| !item.is_empty()) {
            let (name, value) = item
                .split_once('=')
                .ok_or_else(|| Error::invalid_parameter(MISSING_EQUALS))?;
            self.parse_prop(name, value)?;
        }
        Ok(())
    }

    fn parse_prop(&mut self, name: &str, value: &str) -> Result<()> {
        if let Some(attr) = name.strip_prefix('@') {
            self.props.push(PropFilter::Html {
                name: attr.to_owned(),
                value: Wildex::parse(value)?,
            });
            return Ok(());
        }
        if let Some(prop) = StringProp::from_prop_name(name).filter(|p| *p != StringProp::Name) {
            self.props.push(PropFilter::String {
                prop,
                value: Wildex::parse(value)?,
            });
            return Ok(());
        }

        // The WinForms name may be empty; every other value may not.
        if value.is_empty() && name != "id" && is_known_prop(name) {
            return Err(invalid());
        }
        match name {
            "state" => self.parse_state(value)?,
            "level" => self.parse_level(value)?,
            "maxcc" => {
                let n = parse_int(value).ok_or_else(invalid)?;
                self.max_children = usize::try_from(n).ok().filter(|&n| n >= 1).ok_or_else(invalid)?;
            }
            "notin" => {
                self.notin = value.split(',').map(|r| r.trim().to_owned()).collect();
            }
            "rect" => {
                self.rect = parse_rect(value)?;
                self.scope |= self.rect.scope();
            }
            "item" => {
                let elem = parse_int(value).ok_or_else(invalid)?;
                self.elem = Some(i32::try_from(elem).map_err(|_| invalid())?);
                self.scope |= SearchScope::IS_ELEM;
            }
            "class" => {
                self.controls.get_or_insert_with(ControlFilter::default).class =
                    Some(Wildex::parse(value)?);
                self.scope |= SearchScope::IN_CONTROLS;
            }
            "id" => {
                let controls = self.controls.get_or_insert_with(ControlFilter::default);
                match parse_int(value).filter(|_| !value.is_empty()) {
                    Some(id) => {
                        controls.id = Some(i32::try_from(id).map_err(|_| invalid())?);
                        self.scope |= SearchScope::IS_ID;
                    }
                    None => controls.winforms = Some(value.to_owned()),
                }
                self.scope |= SearchScope::IN_CONTROLS;
            }
            "url" => self.url = Some(Wildex::parse(value)?),
            _ => return Err(Error::invalid_parameter(UNKNOWN_NAME)),
        }
        Ok(())
    }

    fn parse_state(&mut self, value: &str) -> Result<()> {
        for token in value.split(',') {
            let token = token.strip_prefix(' ').unwrap_or(token);
            let (negate, token) = match token.strip_prefix('!') {
                Some(rest) => (true, rest),
                None => (false, token),
            };
            let state = if token.starts_with(|c: char| c.is_ascii_digit()) {
                let bits = parse_int(token).ok_or_else(invalid)?;
                State::from_bits_retain(u32::try_from(bits).map_err(|_| invalid())?)
            } else {
                State::parse_name(token).ok_or_else(|| Error::invalid_parameter(UNKNOWN_STATE))?
            };
            if negate {
                self.state_no |= state;
            } else {
                self.state_yes |= state;
            }
        }
        Ok(())
    }

    fn parse_level(&mut self, value: &str) -> Result<()> {
        let (min, max) = match value.split_once(' ') {
            Some((min, max)) => (min, Some(max)),
            None => (value, None),
        };
        let min = parse_int(min)
            .and_then(|v| usize::try_from(v).ok())
            .ok_or_else(invalid)?;
        let max = match max {
            Some(max) => parse_int(max)
                .and_then(|v| usize::try_from(v).ok())
                .filter(|&v| v >= min)
                .ok_or_else(invalid)?,
            None => min,
        };
        self.min_level = min;
        self.max_level = max;
        Ok(())
    }
}

fn invalid() -> Error {
    Error::invalid_parameter(INVALID_PROP)
}

fn is_known_prop(name: &str) -> bool {
    matches!(
        name,
        "state" | "level" | "maxcc" | "notin" | "rect" | "item" | "class" | "id" | "url"
    )
}

/// A whole-token integer, decimal or `0x` hex, optionally negative.
fn parse_int(s: &str) -> Option<i64> {
    let (negative, digits) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    let v = match digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        Some(hex) => i64::from_str_radix(hex, 16).ok()?,
        None if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) => {
            digits.parse().ok()?
        }
        None => return None,
    };
    Some(if negative { -v } else { v })
}

fn parse_rect(s: &str) -> Result<RectFilter> {
    let bad = || Error::invalid_parameter(INVALID_RECT);
    let body = s
        .strip_prefix('{')
        .and_then(|s| s.strip_suffix('}'))
        .ok_or_else(bad)?;
    let mut rect = RectFilter::default();
    for field in body.split_whitespace() {
        let (key, value) = field.split_once('=').ok_or_else(bad)?;
        let value = parse_int(value)
            .and_then(|v| i32::try_from(v).ok())
            .ok_or_else(bad)?;
        let slot = match key {
            "L" => &mut rect.left,
            "T" => &mut rect.top,
            "W" => &mut rect.width,
            "H" => &mut rect.height,
            _ => return Err(bad()),
        };
        *slot = Some(value);
    }
    Ok(rect)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(prop: &str) -> FindRequest {
        FindRequest {
            prop: Some(prop.to_owned()),
            ..FindRequest::default()
        }
    }

    fn parse(prop: &str) -> Result<FindSpec> {
        FindSpec::parse(&request(prop), &ProbeConfig::default())
    }

    fn error_text(prop: &str) -> String {
        match parse(prop) {
            Err(Error::InvalidParameter(text)) => text,
            other => panic!("expected invalid parameter, got {other:?}"),
        }
    }

    #[test]
    fn test_string_and_html_props() {
        let spec = parse("value=abc\0 @href=*.html\0desc=x").unwrap();
        assert_eq!(spec.props.len(), 3);
        assert!(matches!(&spec.props[0], PropFilter::String { prop: StringProp::Value, .. }));
        assert!(matches!(&spec.props[1], PropFilter::Html { name, .. } if name == "href"));
        assert!(spec.has_html_filters());
    }

    #[test]
    fn test_line_separated_props() {
        let spec = parse("level=2 4\r\nmaxcc=5\n").unwrap();
        assert_eq!((spec.min_level, spec.max_level), (2, 4));
        assert_eq!(spec.max_children, 5);
    }

    #[test]
    fn test_state_list() {
        let spec = parse("state=CHECKED, !disabled2").unwrap_err();
        assert!(matches!(spec, Error::InvalidParameter(t) if t == UNKNOWN_STATE));
        let spec = parse("state=checked, !UNAVAILABLE,0x100").unwrap();
        assert_eq!(spec.state_yes, State::CHECKED | State::DEFAULT);
        assert_eq!(spec.state_no, State::UNAVAILABLE);
    }

    #[test]
    fn test_rect_subset() {
        let spec = parse("rect={L=10 W=20}").unwrap();
        assert_eq!(spec.rect.left, Some(10));
        assert_eq!(spec.rect.width, Some(20));
        assert_eq!(spec.rect.top, None);
        assert!(spec.scope.contains(SearchScope::IS_RECT_L | SearchScope::IS_RECT_W));
        assert!(!spec.scope.contains(SearchScope::IS_RECT_T));
        assert!(spec.rect.matches(&Rect::from_xywh(10, 99, 20, 5)));
        assert!(!spec.rect.matches(&Rect::from_xywh(11, 99, 20, 5)));
    }

    #[test]
    fn test_controls() {
        let spec = parse("id=15").unwrap();
        assert_eq!(spec.controls.as_ref().unwrap().id, Some(15));
        assert!(spec.scope.contains(SearchScope::IN_CONTROLS | SearchScope::IS_ID));

        let spec = parse("id=").unwrap();
        assert_eq!(spec.controls.as_ref().unwrap().winforms.as_deref(), Some(""));
        assert!(!spec.scope.contains(SearchScope::IS_ID));

        let spec = parse("class=Edit").unwrap();
        assert!(spec.controls.unwrap().class.unwrap().is_match("edit"));
    }

    #[test]
    fn test_error_texts() {
        assert_eq!(error_text("value"), MISSING_EQUALS);
        assert_eq!(error_text("color=red"), UNKNOWN_NAME);
        assert_eq!(error_text("rect=10"), INVALID_RECT);
        assert_eq!(error_text("rect={X=1}"), INVALID_RECT);
        assert_eq!(error_text("level=3 1"), INVALID_PROP);
        assert_eq!(error_text("level="), INVALID_PROP);
        assert_eq!(error_text("maxcc=0"), INVALID_PROP);
        assert_eq!(error_text("item=x"), INVALID_PROP);
    }

    #[test]
    fn test_out_of_range_numbers() {
        assert_eq!(error_text("item=4294967296"), INVALID_PROP);
        assert_eq!(error_text("id=0x100000000"), INVALID_PROP);
        assert_eq!(error_text("state=4294967296"), INVALID_PROP);

        let spec = parse("item=-2147483648").unwrap();
        assert_eq!(spec.elem, Some(i32::MIN));
        let spec = parse("id=2147483647").unwrap();
        assert_eq!(spec.controls.unwrap().id, Some(i32::MAX));
    }

    #[test]
    fn test_notin_list() {
        let spec = parse("notin=LIST, TREE,TABLE").unwrap();
        assert_eq!(spec.notin, ["LIST", "TREE", "TABLE"]);
    }

    #[test]
    fn test_web_prefix_conflicts() {
        let mut req = request("class=Edit");
        req.scope = SearchScope::IN_WEB_PAGE;
        let err = FindSpec::parse(&req, &ProbeConfig::default()).unwrap_err();
        assert!(matches!(err, Error::InvalidParameter(t) if t == PREFIX_CONFLICT));

        let req = FindRequest {
            scope: SearchScope::IN_WEB_PAGE,
            ..FindRequest::default()
        };
        let spec = FindSpec::parse(&req, &ProbeConfig::default()).unwrap();
        assert!(spec.flags.contains(FindFlags::MENU_TOO));
    }
}
