//! The traversal and the per-object match state machine.
//!
//! Every visited object goes through the same steps: decide whether its
//! children may be searched, test it against the filters, and dispatch to
//! the sink. The children decision does not depend on whether the object
//! itself matched.

use std::borrow::Cow;

use horizon_probe_core::logging::{AoTreeDebug, span_names, targets};
use horizon_probe_core::{
    Ao, Error, FindFlags, MiscFlags, ObjectId, Result, Role, RoleValue, SearchScope, StringProp,
    Visibility, Wildex, WindowHandle,
};

use super::{FindControl, FindSink, FindSpec, Flow, LazyState, PropFilter, Visit, document, walk};
use crate::browser;
use crate::context::Context;
use crate::platform::classes;

/// Marking state of one object. See [`FindFlags::MARK`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    /// Not marking; a failed test ends matching.
    Off,
    /// Marking and every test so far passed.
    Testing,
    /// Marking, but a test failed; remaining tests are skipped.
    Failed,
}

/// One search.
pub struct Finder<'a> {
    ctx: &'a Context,
    spec: &'a FindSpec,
    sink: &'a mut dyn FindSink,
    flags: FindFlags,
    scope: SearchScope,
    /// The window searched, if it is a top-level window.
    top_level: Option<WindowHandle>,
    found: bool,
}

impl<'a> Finder<'a> {
    pub fn new(ctx: &'a Context, spec: &'a FindSpec, sink: &'a mut dyn FindSink) -> Self {
        Self {
            ctx,
            spec,
            sink,
            flags: spec.flags,
            scope: spec.scope,
            top_level: None,
            found: false,
        }
    }

    /// Search the descendants of `root`.
    pub fn find_in_object(mut self, root: &Ao) -> Result<()> {
        if self.scope.contains(SearchScope::IN_WEB_PAGE) {
            return Err(Error::invalid_parameter(
                "Don't use role prefix when searching in elm.",
            ));
        }
        if self.scope.contains(SearchScope::IN_CONTROLS) {
            return Err(Error::invalid_parameter(
                "Don't use class/id when searching in elm.",
            ));
        }
        let _span = tracing::debug_span!(target: targets::FIND, span_names::FIND, root = ?root).entered();
        if !self.descend(root, 0) {
            self.trace_unmatched(root);
        }
        self.result()
    }

    /// Search in window `w`.
    pub fn find_in_window(mut self, w: WindowHandle) -> Result<()> {
        let (ctx, spec) = (self.ctx, self.spec);
        let ws = ctx.windows.as_ref();
        if !ws.is_window(w) {
            return Err(Error::WindowGone);
        }
        let _span = tracing::debug_span!(target: targets::FIND, span_names::FIND, window = %w).entered();

        if self.scope.contains(SearchScope::IN_WEB_PAGE) {
            if self.scope.contains(SearchScope::IN_IES) {
                self.find_in_wnd(w, false, false)?;
            } else {
                let mut doc = document::find_document(ctx, w, self.scope, spec.url.as_ref())?;
                match self.visit(&mut doc, 0, 0) {
                    Flow::SkipChildren => return Err(Error::NotFound),
                    Flow::Continue => {
                        self.descend(&doc, 1);
                    }
                    Flow::Stop => {}
                }
            }
        } else {
            let class = ws.class_name(w).unwrap_or_default();
            let is_java = !self.flags.contains(FindFlags::UIA)
                && spec
                    .role
                    .as_deref()
                    .is_none_or(|r| r.starts_with(|c: char| c.is_ascii_lowercase()))
                && classes::is_java_class(&class);
            if let Some(controls) = &spec.controls {
                for c in ws.child_windows(w) {
                    if !self.flags.contains(FindFlags::HIDDEN_TOO) && !ws.is_visible_in_window(c, w) {
                        continue;
                    }
                    if controls.id.is_some_and(|id| ws.control_id(c) != id) {
                        continue;
                    }
                    let c_class = ws.class_name(c).unwrap_or_default();
                    if controls.class.as_ref().is_some_and(|x| !x.is_match(&c_class)) {
                        continue;
                    }
                    if let Some(name) = &controls.winforms {
                        if ws.winforms_name(c).as_deref() != Some(name.as_str()) {
                            continue;
                        }
                    }
                    match self.find_in_wnd(c, true, is_java && classes::is_java_class(&c_class)) {
                        Ok(true) => break,
                        Ok(false) => {}
                        Err(e) => {
                            tracing::trace!(target: targets::FIND, control = %c, error = %e, "skipping control");
                        }
                    }
                }
            } else {
                if !ws.is_child(w) {
                    self.top_level = Some(w);
                    if !self.flags.contains(FindFlags::UIA) && !is_java && classes::is_firefox_class(&class) {
                        self.scope |= SearchScope::IN_FIREFOX_NOT_WEB_NOT_UIA;
                    }
                }
                if let Err(e) = self.find_in_wnd(w, false, is_java) {
                    tracing::debug!(target: targets::FIND, window = %w, error = %e, "no root object");
                }
            }
        }

        if !self.found && !ws.is_window(w) {
            return Err(Error::WindowGone);
        }
        self.result()
    }

    fn result(&self) -> Result<()> {
        if self.found { Ok(()) } else { Err(Error::NotFound) }
    }

    /// Search the tree of one window. Returns whether the walk stopped.
    fn find_in_wnd(&mut self, w: WindowHandle, is_control: bool, is_java: bool) -> Result<bool> {
        let ctx = self.ctx;
        let backends = ctx.backends.as_ref();
        let java_root = is_java
            .then(|| backends.java_from_window(w, false))
            .flatten();
        let mut root = if let Some(node) = java_root {
            Ao::with_flags(node, 0, MiscFlags::JAVA)
        } else if self.flags.contains(FindFlags::UIA) {
            ctx.modern_ao(backends.modern_from_window(w)?)
        } else {
            let client = self.flags.contains(FindFlags::CLIENT_AREA);
            let id = if client { ObjectId::CLIENT } else { ObjectId::WINDOW };
            let mut ao = Ao::new(backends.legacy_from_window(w, id)?);
            ao.set_role_byte(if client { Role::CLIENT } else { Role::WINDOW });
            ao
        };

        let mut level = 0;
        if is_control {
            match self.visit(&mut root, 0, 0) {
                Flow::Stop => return Ok(true),
                Flow::SkipChildren => return Ok(false),
                Flow::Continue => level = 1,
            }
        }
        let stopped = self.descend(&root, level);
        if !stopped {
            self.trace_unmatched(&root);
        }
        Ok(stopped)
    }

    /// Dump the tree a single-result search walked without a match.
    fn trace_unmatched(&self, root: &Ao) {
        if self.found
            || self.scope.intersects(SearchScope::FIND_ALL | SearchScope::GET_RECTS)
            || !tracing::enabled!(target: targets::FIND, tracing::Level::TRACE)
        {
            return;
        }
        match AoTreeDebug::new().format_subtree(root) {
            Ok(tree) => tracing::trace!(target: targets::FIND, "no match in:\n{tree}"),
            Err(e) => tracing::trace!(target: targets::FIND, error = %e, "cannot dump searched tree"),
        }
    }

    fn descend(&mut self, parent: &Ao, level: usize) -> bool {
        let max_children = self.spec.max_children;
        let reverse = self.flags.contains(FindFlags::REVERSE);
        walk(self, parent, level, max_children, reverse)
    }

    fn skip_if_invisible(&self, role: Role) -> bool {
        self.ctx.config.find.skip_if_invisible_roles.contains(&role)
    }

    /// Whether the object is most likely the client area of the top-level
    /// window being searched.
    fn is_top_level_client(&self, role: Role, level: usize) -> bool {
        self.top_level.is_some()
            && level == 0
            && !self.flags.contains(FindFlags::CLIENT_AREA)
            && !self.ctx.config.find.top_level_nonclient_roles.contains(&role)
    }

    fn dispatch(&mut self, control: FindControl) -> Option<Flow> {
        match control {
            FindControl::Continue => None,
            FindControl::SkipChildren => Some(Flow::SkipChildren),
            FindControl::StopFound => {
                self.found = true;
                Some(Flow::Stop)
            }
            FindControl::StopNotFound => Some(Flow::Stop),
        }
    }
}

/// Whether a string property of `ao` matches. A failed read compares as "".
pub(crate) fn string_matches(ao: &Ao, prop: StringProp, value: &Wildex) -> bool {
    let s = ao.string_prop(prop).ok().flatten().unwrap_or_default();
    value.is_match(&s)
}

/// Firefox windows searched without a page prefix: property pages of
/// background tabs are hidden and may hold huge documents.
pub(crate) fn is_background_tab(
    scope: SearchScope,
    role: Role,
    skip_children: bool,
    level: usize,
    state: &mut LazyState,
    ao: &Ao,
) -> bool {
    scope.contains(SearchScope::IN_FIREFOX_NOT_WEB_NOT_UIA)
        && role == Role::PROPERTYPAGE
        && !skip_children
        && level < 5
        && state.get(ao).is_hidden()
}

impl Visit for Finder<'_> {
    fn visit(&mut self, ao: &mut Ao, level: usize, siblings: usize) -> Flow {
        let spec = self.spec;
        let mut skip_children = ao.elem() != 0 || level >= spec.max_level;
        let hidden_too = self.flags.contains(FindFlags::HIDDEN_TOO);
        let mut state = LazyState::default();

        let role_value = ao.role().ok();
        let role = role_value.as_ref().map_or(Role::NONE, RoleValue::role);
        ao.set_role_byte(role);
        ao.set_level(level);

        if is_background_tab(self.scope, role, skip_children, level, &mut state, ao) {
            return Flow::SkipChildren;
        }

        if self.scope.contains(SearchScope::GET_RECTS) {
            let s = state.get(ao);
            return match self.sink.on_visit(ao, s, siblings) {
                FindControl::Continue if skip_children => Flow::SkipChildren,
                FindControl::Continue => Flow::Continue,
                FindControl::SkipChildren => Flow::SkipChildren,
                FindControl::StopFound | FindControl::StopNotFound => Flow::Stop,
            };
        }

        let role_string: Cow<'_, str> = match &role_value {
            Some(r) => r.to_role_string(),
            None => Cow::Borrowed(""),
        };
        if !skip_children && spec.notin.iter().any(|r| *r == role_string) {
            skip_children = true;
        }

        if level >= spec.min_level {
            'matching: {
                let mut mark = if !self.flags.contains(FindFlags::MARK) {
                    Mark::Off
                } else if self.flags.contains(FindFlags::MARKED_) {
                    // only one object is marked
                    Mark::Failed
                } else {
                    Mark::Testing
                };

                if mark != Mark::Failed && spec.role.as_deref().is_some_and(|r| r != role_string) {
                    if mark == Mark::Off {
                        break 'matching;
                    }
                    mark = Mark::Failed;
                }

                if spec.elem.is_some_and(|e| e != ao.elem()) {
                    break 'matching;
                }

                if mark == Mark::Testing && !spec.rect_matches(ao) {
                    mark = Mark::Failed;
                }

                if let Some(name) = &spec.name {
                    if mark != Mark::Failed && !string_matches(ao, StringProp::Name, name) {
                        if mark == Mark::Off {
                            break 'matching;
                        }
                        mark = Mark::Failed;
                    }
                }

                if !hidden_too {
                    let hide = match state.get(ao).visibility() {
                        Visibility::Visible => false,
                        Visibility::Invisible => true,
                        Visibility::InvisibleOffscreen => self.skip_if_invisible(role),
                    };
                    if hide && !self.is_top_level_client(role, level) {
                        return Flow::SkipChildren;
                    }
                }

                if !(spec.state_yes | spec.state_no).is_empty() && mark != Mark::Failed {
                    let s = state.get(ao);
                    if !s.contains(spec.state_yes) || s.intersects(spec.state_no) {
                        if mark == Mark::Off {
                            break 'matching;
                        }
                        mark = Mark::Failed;
                    }
                }

                if mark == Mark::Off && !spec.rect_matches(ao) {
                    break 'matching;
                }

                let mut has_html = false;
                for p in &spec.props {
                    match p {
                        PropFilter::String { prop, value } => {
                            if !string_matches(ao, *prop, value) {
                                break 'matching;
                            }
                        }
                        PropFilter::Html { .. } => has_html = true,
                    }
                }
                if has_html && (ao.elem() != 0 || !browser::match_html_attributes(ao, &spec.props)) {
                    break 'matching;
                }

                if mark == Mark::Testing {
                    ao.insert_flags(MiscFlags::MARKED);
                    self.flags |= FindFlags::MARKED_;
                }

                let control = self.sink.on_match(ao);
                if let Some(flow) = self.dispatch(control) {
                    return flow;
                }
            }
        }

        if !skip_children {
            skip_children = role == Role::MENUITEM
                && !self.flags.contains(FindFlags::MENU_TOO)
                && !matches!(spec.role.as_deref(), Some("MENUITEM" | "MENUPOPUP"));
            if !skip_children
                && !hidden_too
                && self.skip_if_invisible(role)
                && !self.is_top_level_client(role, level)
            {
                skip_children = state.get(ao).visibility() != Visibility::Visible;
            }
        }
        if skip_children { Flow::SkipChildren } else { Flow::Continue }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use horizon_probe_core::{FindFlags, ProbeConfig, Rect, State};
    use horizon_probe_marshal::FindRequest;

    use super::*;
    use crate::mock::{MockDesktop, MockItem, MockNode, MockWindow};

    const W: WindowHandle = WindowHandle(0x100);

    fn context(root: Arc<MockNode>) -> Context {
        let d = MockDesktop::new();
        d.add_window(MockWindow::top_level(W, "Dialog").client(root));
        Context::new(d.clone(), d, ProbeConfig::default())
    }

    fn spec(role: Option<&str>, name: Option<&str>, prop: Option<&str>, flags: FindFlags) -> FindSpec {
        let req = FindRequest {
            role: role.map(str::to_owned),
            name: name.map(str::to_owned),
            prop: prop.map(str::to_owned),
            // search the client object so that level 0 holds the dialog's controls
            flags: flags | FindFlags::CLIENT_AREA,
            ..FindRequest::default()
        };
        FindSpec::parse(&req, &ProbeConfig::default()).unwrap()
    }

    /// Names of all matches, in order.
    fn find_all(ctx: &Context, spec: &FindSpec) -> Vec<String> {
        let mut names = Vec::new();
        let mut sink = |ao: &Ao| {
            names.push(ao.name().unwrap().unwrap_or_default());
            FindControl::Continue
        };
        let _ = Finder::new(ctx, spec, &mut sink).find_in_window(W);
        names
    }

    fn dialog() -> Arc<MockNode> {
        MockNode::build(Role::CLIENT, "")
            .child(
                MockNode::build(Role::GROUPING, "options")
                    .child(MockNode::build(Role::CHECKBUTTON, "Bold").state(State::CHECKED))
                    .child(MockNode::build(Role::CHECKBUTTON, "Italic")),
            )
            .child(MockNode::build(Role::PUSHBUTTON, "OK").rect(Rect::from_xywh(10, 20, 80, 25)))
            .child(MockNode::build(Role::PUSHBUTTON, "Cancel"))
            .finish()
    }

    #[test]
    fn test_first_match_is_reported() {
        let ctx = context(dialog());
        let spec = spec(Some("PUSHBUTTON"), Some("OK"), None, FindFlags::empty());
        let mut found = None;
        let mut sink = |ao: &Ao| {
            found = Some(ao.clone());
            FindControl::StopFound
        };
        Finder::new(&ctx, &spec, &mut sink).find_in_window(W).unwrap();
        let found = found.unwrap();
        assert_eq!(found.name().unwrap().as_deref(), Some("OK"));
        assert_eq!(found.role_byte(), Role::PUSHBUTTON);
        assert_eq!(found.level(), 0);
    }

    #[test]
    fn test_not_found() {
        let ctx = context(dialog());
        let spec = spec(Some("PUSHBUTTON"), Some("Missing"), None, FindFlags::empty());
        let mut sink = |_: &Ao| FindControl::StopFound;
        let err = Finder::new(&ctx, &spec, &mut sink).find_in_window(W).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_reverse_order() {
        let ctx = context(dialog());
        let forward = find_all(&ctx, &spec(None, None, None, FindFlags::empty()));
        let backward = find_all(&ctx, &spec(None, None, None, FindFlags::REVERSE));
        assert_eq!(forward, ["options", "Bold", "Italic", "OK", "Cancel"]);
        // reversal is per sibling list, so parents still precede children
        assert_eq!(backward, ["Cancel", "OK", "options", "Italic", "Bold"]);
    }

    #[test]
    fn test_level_range() {
        let ctx = context(dialog());
        assert_eq!(find_all(&ctx, &spec(None, None, Some("level=1"), FindFlags::empty())), ["Bold", "Italic"]);
        assert_eq!(
            find_all(&ctx, &spec(None, None, Some("level=0"), FindFlags::empty())),
            ["options", "OK", "Cancel"]
        );
    }

    #[test]
    fn test_state_and_rect_filters() {
        let ctx = context(dialog());
        assert_eq!(find_all(&ctx, &spec(None, None, Some("state=checked"), FindFlags::empty())), ["Bold"]);
        assert_eq!(
            find_all(&ctx, &spec(Some("CHECKBUTTON"), None, Some("state=!checked"), FindFlags::empty())),
            ["Italic"]
        );
        assert_eq!(find_all(&ctx, &spec(None, None, Some("rect={L=10 H=25}"), FindFlags::empty())), ["OK"]);
    }

    #[test]
    fn test_notin_skips_descendants() {
        let ctx = context(dialog());
        assert_eq!(
            find_all(&ctx, &spec(None, None, Some("notin=GROUPING"), FindFlags::empty())),
            ["options", "OK", "Cancel"]
        );
    }

    #[test]
    fn test_invisible_grouping_is_pruned() {
        let root = MockNode::build(Role::CLIENT, "")
            .child(
                MockNode::build(Role::GROUPING, "hidden")
                    .state(State::INVISIBLE | State::OFFSCREEN)
                    .child(MockNode::build(Role::PANE, "").child(MockNode::build(Role::LINK, "deep"))),
            )
            .finish();
        let ctx = context(root);
        assert!(find_all(&ctx, &spec(Some("LINK"), None, None, FindFlags::empty())).is_empty());
        assert_eq!(find_all(&ctx, &spec(Some("LINK"), None, None, FindFlags::HIDDEN_TOO)), ["deep"]);
    }

    #[test]
    fn test_offscreen_container_keeps_children() {
        // INVISIBLE+OFFSCREEN on a role outside the skip list: the object is
        // still searched and so are its children
        let root = MockNode::build(Role::CLIENT, "")
            .child(
                MockNode::build(Role::LIST, "list")
                    .state(State::INVISIBLE | State::OFFSCREEN)
                    .child(MockNode::build(Role::LISTITEM, "item")),
            )
            .finish();
        let ctx = context(root);
        assert_eq!(find_all(&ctx, &spec(None, None, None, FindFlags::empty())), ["list", "item"]);
    }

    #[test]
    fn test_menu_items_not_entered() {
        let root = MockNode::build(Role::CLIENT, "")
            .child(MockNode::build(Role::MENUITEM, "File").child(MockNode::build(Role::MENUITEM, "Open")))
            .finish();
        let ctx = context(root);
        assert_eq!(find_all(&ctx, &spec(Some("MENUITEM"), None, None, FindFlags::empty())), ["File", "Open"]);
        assert_eq!(find_all(&ctx, &spec(None, None, None, FindFlags::empty())), ["File"]);
        assert_eq!(find_all(&ctx, &spec(None, None, None, FindFlags::MENU_TOO)), ["File", "Open"]);
    }

    #[test]
    fn test_items_match_by_index() {
        let root = MockNode::build(Role::CLIENT, "")
            .child(
                MockNode::build(Role::LIST, "list")
                    .item(MockItem::new(Role::LISTITEM, "a"))
                    .item(MockItem::new(Role::LISTITEM, "b")),
            )
            .finish();
        let ctx = context(root);
        assert_eq!(find_all(&ctx, &spec(None, None, Some("item=2"), FindFlags::empty())), ["b"]);
    }

    #[test]
    fn test_mark_mode_marks_first_match_only() {
        let ctx = context(dialog());
        let spec = spec(Some("PUSHBUTTON"), None, None, FindFlags::MARK);
        let mut seen = Vec::new();
        let mut sink = |ao: &Ao| {
            seen.push((ao.name().unwrap().unwrap_or_default(), ao.flags().contains(MiscFlags::MARKED)));
            FindControl::Continue
        };
        let _ = Finder::new(&ctx, &spec, &mut sink).find_in_window(W);
        let marked: Vec<_> = seen.iter().filter(|(_, m)| *m).map(|(n, _)| n.as_str()).collect();
        assert_eq!(marked, ["OK"]);
        assert_eq!(seen.len(), 5);
    }

    #[test]
    fn test_find_in_object_rejects_window_filters() {
        let root = dialog();
        let ctx = context(root.clone());
        let spec = spec(None, None, Some("class=Edit"), FindFlags::empty());
        let mut sink = |_: &Ao| FindControl::StopFound;
        let err = Finder::new(&ctx, &spec, &mut sink)
            .find_in_object(&Ao::new(root))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidParameter(_)));
    }

    #[test]
    fn test_window_gone() {
        let ctx = context(dialog());
        let spec = spec(None, None, None, FindFlags::empty());
        let mut sink = |_: &Ao| FindControl::StopFound;
        let err = Finder::new(&ctx, &spec, &mut sink)
            .find_in_window(WindowHandle(0x999))
            .unwrap_err();
        assert!(matches!(err, Error::WindowGone));
    }

    #[test]
    fn test_controls_by_id() {
        let d = MockDesktop::new();
        let edit = MockNode::build(Role::WINDOW, "")
            .child(MockNode::build(Role::TEXT, "name field"))
            .finish();
        d.add_window(MockWindow::top_level(W, "Dialog").client(dialog()));
        d.add_window(
            MockWindow::child(WindowHandle(0x101), "Edit", W)
                .control_id(1001)
                .client(edit),
        );
        let ctx = Context::new(d.clone(), d, ProbeConfig::default());
        assert_eq!(find_all(&ctx, &spec(None, None, Some("id=1001"), FindFlags::empty())), ["", "name field"]);
        assert!(find_all(&ctx, &spec(None, None, Some("id=7"), FindFlags::empty())).is_empty());
    }
}
