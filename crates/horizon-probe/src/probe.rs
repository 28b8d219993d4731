//! The caller-side entry point.
//!
//! [`Probe`] decides for every call whether to run it inside the target
//! process (through a broker) or here, and falls back to running it here
//! once when the broker cannot be had.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;

use horizon_probe_core::logging::targets;
use horizon_probe_core::{
    Ao, Error, FindFlags, FocusFlags, MarshalSide, MiscFlags, ObjectId, Point, PointFlags, Rect, Result,
    SearchScope, SpecialWindow, WindowFlags, WindowHandle,
};
use horizon_probe_marshal::{
    FindRequest, FocusedRequest, FromPointRequest, FromWindowRequest, GetHtmlRequest,
    NavigateRequest, PropValue,
};

use crate::bridge::BridgeCall;
use crate::browser;
use crate::context::Context;
use crate::find::{FindControl, FindSink, FindSpec, Finder, FirstMatch, RectCapture, RectClip};
use crate::platform::{Injector, NoInjector, classes};
use crate::resolve::{self, NavPath, PropSelector, WindowObject};

/// How often a from-point query is repeated when the window under the
/// point changes while it runs.
const FROM_POINT_RETRIES: usize = 5;

/// Where a search starts.
#[derive(Debug, Clone, Copy)]
pub enum FindRoot<'a> {
    /// The tree of a window, or of its browser page with a role prefix.
    Window(WindowHandle),
    /// The descendants of an object.
    Object(&'a Ao),
}

/// Result of [`Probe::find_first`].
#[derive(Debug, Clone)]
pub enum Found {
    Object(Ao),
    /// The property named by the request's `result_prop`.
    Property(PropValue),
    /// Found, with `result_prop` `'-'`.
    Nothing,
}

impl Found {
    pub fn into_object(self) -> Option<Ao> {
        match self {
            Self::Object(ao) => Some(ao),
            _ => None,
        }
    }
}

/// What a find-all callback wants next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnMatch {
    Continue,
    /// Do not search the descendants of this match. Results that come back
    /// from a broker are already complete, so there it acts as `Continue`.
    SkipSubtree,
    /// Stop and keep this match, after `skip` earlier keeps.
    Keep,
}

/// Where a call runs.
#[derive(Debug, Clone, Copy)]
struct Route<'a> {
    window: WindowHandle,
    target: Option<&'a Ao>,
    not_in_proc: bool,
}

/// Whether `e` calls for running the action here instead.
fn falls_back(e: &Error) -> bool {
    matches!(e, Error::BackendUnavailable(f) if f.allows_fallback())
}

/// Accessible-object queries against a desktop.
pub struct Probe {
    ctx: Context,
    injector: Arc<dyn Injector>,
    enabled_browsers: Mutex<HashSet<WindowHandle>>,
}

impl Probe {
    pub fn new(ctx: Context, injector: Arc<dyn Injector>) -> Self {
        Self {
            ctx,
            injector,
            enabled_browsers: Mutex::new(HashSet::new()),
        }
    }

    /// A probe that never uses brokers.
    pub fn out_of_process(ctx: Context) -> Self {
        Self::new(ctx, Arc::new(NoInjector))
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    /// A broker link to the process of `w`, or `None` to run here.
    ///
    /// Injection failures that allow it (window of this thread, process
    /// refuses in-process use, failed injection) give `None`; others are
    /// errors.
    pub(crate) fn broker(&self, w: WindowHandle, not_in_proc: bool) -> Result<Option<BridgeCall>> {
        if not_in_proc || w.is_null() {
            return Ok(None);
        }
        match self.injector.broker_for_window(w) {
            Ok(broker) => Ok(Some(BridgeCall::new(broker))),
            Err(failure) if failure.allows_fallback() => {
                tracing::debug!(target: targets::BRIDGE, window = %w, ?failure, "no broker, running out of process");
                Ok(None)
            }
            Err(failure) => Err(Error::BackendUnavailable(failure)),
        }
    }

    fn note_fallback(&self, w: WindowHandle, e: &Error) {
        tracing::debug!(target: targets::BRIDGE, window = %w, error = %e, "broker call failed, running out of process");
    }

    pub(crate) fn is_browser_enabled(&self, w: WindowHandle) -> bool {
        self.enabled_browsers.lock().contains(&w)
    }

    pub(crate) fn remember_browser_enabled(&self, w: WindowHandle) {
        self.enabled_browsers.lock().insert(w);
    }

    // -----------------------------------------------------------------------
    // Find
    // -----------------------------------------------------------------------

    /// Apply the role prefix and browser detection to `req`, and pick where
    /// the search runs.
    fn route<'a>(&self, root: FindRoot<'a>, req: &mut FindRequest) -> Route<'a> {
        let ws = self.ctx.windows.as_ref();
        let prefix = req
            .role
            .as_deref()
            .and_then(browser::split_role_prefix)
            .map(|(prefix, rest)| (prefix, rest.to_owned()));
        if let Some((_, rest)) = &prefix {
            req.role = (!rest.is_empty()).then(|| rest.clone());
        }

        match root {
            FindRoot::Window(w) => {
                if let Some((prefix, _)) = prefix {
                    let (scope, control) = browser::prefix_scope(ws, prefix, w);
                    req.scope |= scope;
                    if scope.contains(SearchScope::IN_CHROME_PAGE) {
                        let top = control.and_then(|c| ws.root(c)).unwrap_or(w);
                        browser::enable_chrome(self, top, control);
                    }
                }
                let w = browser::detect_web_control(ws, w, &mut req.scope);
                let is_java = !req.flags.contains(FindFlags::UIA)
                    && classes::is_java_class(&ws.class_name(w).unwrap_or_default());
                Route {
                    window: w,
                    target: None,
                    not_in_proc: req.flags.contains(FindFlags::NOT_IN_PROC)
                        || req.scope.contains(SearchScope::NOT_IN_PROC)
                        || is_java,
                }
            }
            FindRoot::Object(ao) => {
                if prefix.is_some() {
                    // rejected by the engine with a message
                    req.scope |= SearchScope::IN_WEB_PAGE;
                }
                let window = ao.window().unwrap_or(WindowHandle::NULL);
                Route {
                    window,
                    target: Some(ao),
                    not_in_proc: !ao.is_in_proc() || req.flags.contains(FindFlags::NOT_IN_PROC),
                }
            }
        }
    }

    fn find_here(&self, route: &Route<'_>, spec: &FindSpec, sink: &mut dyn FindSink) -> Result<()> {
        let finder = Finder::new(&self.ctx, spec, sink);
        match route.target {
            Some(ao) => finder.find_in_object(ao),
            None => finder.find_in_window(route.window),
        }
    }

    /// The first match of `req`, after `req.skip` earlier ones.
    ///
    /// With `result_prop`, only that property of the match is returned.
    pub fn find_first(&self, root: FindRoot<'_>, req: &FindRequest) -> Result<Found> {
        let mut req = req.clone();
        req.scope.remove(SearchScope::FIND_ALL | SearchScope::GET_RECTS);
        let selector = match req.result_prop {
            None | Some('-') => None,
            Some(c) => Some(PropSelector::from_char(c)?),
        };
        let route = self.route(root, &mut req);

        if let Some(bridge) = self.broker(route.window, route.not_in_proc)? {
            let remote = bridge.call(&req, route.window, route.target).and_then(|payload| {
                Ok(match req.result_prop {
                    Some('-') => Found::Nothing,
                    Some(_) => Found::Property(bridge.property(&payload)?),
                    None => Found::Object(bridge.first_result(payload)?),
                })
            });
            match remote {
                Err(e) if falls_back(&e) => self.note_fallback(route.window, &e),
                r => return r,
            }
        }

        let spec = FindSpec::parse(&req, &self.ctx.config)?;
        let mut first = FirstMatch::new(req.skip.max(0) as u32);
        self.find_here(&route, &spec, &mut first)?;
        let ao = first.into_found().ok_or(Error::NotFound)?;
        Ok(match (req.result_prop, selector) {
            (Some('-'), _) => Found::Nothing,
            (_, Some(selector)) => Found::Property(resolve::get_property(&self.ctx, &ao, &selector)?),
            _ => Found::Object(ao),
        })
    }

    /// Report every match of `req` to `on_match`, in traversal order.
    ///
    /// Returns the match kept by [`OnMatch::Keep`], or `None` when the
    /// search ran to the end. With [`SearchScope::GET_RECTS`], every
    /// visible object is reported with its rectangle instead.
    pub fn find_all(
        &self,
        root: FindRoot<'_>,
        req: &FindRequest,
        on_match: &mut dyn FnMut(&Ao, Option<&Rect>) -> OnMatch,
    ) -> Result<Option<Ao>> {
        let mut skip = req.skip.max(0);
        let mut keep = |ao: &Ao, rect: Option<&Rect>| -> Option<FindControl> {
            match on_match(ao, rect) {
                OnMatch::Continue => Some(FindControl::Continue),
                OnMatch::SkipSubtree => Some(FindControl::SkipChildren),
                OnMatch::Keep if skip > 0 => {
                    skip -= 1;
                    Some(FindControl::Continue)
                }
                OnMatch::Keep => None,
            }
        };

        if req.scope.contains(SearchScope::GET_RECTS) {
            let FindRoot::Window(w) = root else {
                return Err(Error::invalid_parameter("Rectangles can be captured only in a window."));
            };
            for (ao, rect) in self.capture_rects(w, req)? {
                if keep(&ao, Some(&rect)).is_none() {
                    return Ok(Some(ao));
                }
            }
            return Ok(None);
        }

        let mut req = req.clone();
        req.scope.insert(SearchScope::FIND_ALL);
        req.skip = 0;
        let route = self.route(root, &mut req);

        if let Some(bridge) = self.broker(route.window, route.not_in_proc)? {
            match bridge.call(&req, route.window, route.target) {
                Ok(payload) => {
                    let mut reader = bridge.results(payload);
                    while let Some(record) = reader.next_record()? {
                        if keep(&record.ao, None).is_none() {
                            reader.release_remaining();
                            return Ok(Some(record.ao));
                        }
                    }
                    return Ok(None);
                }
                Err(e) if falls_back(&e) => self.note_fallback(route.window, &e),
                Err(e) => return Err(e),
            }
        }

        let spec = FindSpec::parse(&req, &self.ctx.config)?;
        let mut kept = None;
        let mut sink = |ao: &Ao| match keep(ao, None) {
            Some(control) => control,
            None => {
                kept = Some(ao.clone());
                FindControl::StopFound
            }
        };
        match self.find_here(&route, &spec, &mut sink) {
            Ok(()) | Err(Error::NotFound) => Ok(kept),
            Err(e) => Err(e),
        }
    }

    /// Rectangles of the visible objects of window `w`, filtered for
    /// display. Out of process they are clipped to the window rectangle.
    pub fn capture_rects(&self, w: WindowHandle, req: &FindRequest) -> Result<Vec<(Ao, Rect)>> {
        let mut req = req.clone();
        req.scope.insert(SearchScope::GET_RECTS | SearchScope::FIND_ALL);
        let route = self.route(FindRoot::Window(w), &mut req);

        if let Some(bridge) = self.broker(route.window, route.not_in_proc)? {
            match bridge.call(&req, route.window, None) {
                Ok(payload) => {
                    let mut reader = bridge.results(payload);
                    let mut rects = Vec::new();
                    while let Some(record) = reader.next_record()? {
                        let rect = record.rect.ok_or(Error::marshal(MarshalSide::Client))?;
                        rects.push((record.ao, rect));
                    }
                    return Ok(rects);
                }
                Err(e) if falls_back(&e) => self.note_fallback(route.window, &e),
                Err(e) => return Err(e),
            }
        }

        let ctx = &self.ctx;
        let ws = ctx.windows.as_ref();
        let spec = FindSpec::parse(&req, &ctx.config)?;
        let clip = RectClip::Window(ws.window_rect(route.window));
        let mut capture = RectCapture::new(ws, &ctx.config.rects, spec.flags.contains(FindFlags::HIDDEN_TOO), clip);
        match self.find_here(&route, &spec, &mut capture) {
            Ok(()) | Err(Error::NotFound) => {}
            Err(e) => return Err(e),
        }
        Ok(capture.finish().into_iter().map(|c| (c.ao, c.rect)).collect())
    }

    // -----------------------------------------------------------------------
    // Single objects
    // -----------------------------------------------------------------------

    /// The object at screen point `p`.
    pub fn from_point(&self, p: Point, flags: PointFlags) -> Result<Ao> {
        let ws = self.ctx.windows.as_ref();
        for _ in 0..FROM_POINT_RETRIES {
            let w = ws.window_from_point(p).ok_or(Error::NotFound)?;
            match self.from_point_in(p, flags, w) {
                Err(Error::WindowChanged) => {
                    tracing::trace!(target: targets::RESOLVE, window = %w, "window under point changed, retrying");
                }
                r => return r,
            }
        }
        Err(Error::NotFound)
    }

    fn from_point_in(&self, p: Point, flags: PointFlags, w: WindowHandle) -> Result<Ao> {
        let ctx = &self.ctx;
        let ws = ctx.windows.as_ref();
        let top = ws.root(w).unwrap_or(w);
        let special = classes::special_window(ws, top, w);

        match special {
            SpecialWindow::Java if !flags.contains(PointFlags::UIA) => {
                if let Some(node) = ctx.backends.java_from_point(p, w) {
                    let mut ao = Ao::with_flags(node, 0, MiscFlags::JAVA);
                    ao.ensure_role();
                    return Ok(ao);
                }
            }
            SpecialWindow::Chrome => browser::enable_chrome(self, top, None),
            SpecialWindow::ChromeControl => browser::enable_chrome(self, w, None),
            SpecialWindow::ChromeRenderHost => browser::enable_chrome(self, top, Some(w)),
            _ => {}
        }

        if let Some(bridge) = self.broker(w, flags.contains(PointFlags::NOT_IN_PROC))? {
            let mut remote_flags = flags;
            remote_flags.set(PointFlags::DPI_SCALED_, ws.is_dpi_scaled(w));
            let req = FromPointRequest {
                point: p,
                flags: remote_flags,
                special,
            };
            match bridge.call(&req, w, None).and_then(|payload| bridge.first_result(payload)) {
                Err(e) if falls_back(&e) => self.note_fallback(w, &e),
                r => return r,
            }
        }
        resolve::from_point_local(ctx, p, flags, special, w, false)
    }

    /// The focused object of window `w`, or of the foreground window.
    pub fn focused(&self, w: Option<WindowHandle>, flags: FocusFlags) -> Result<Ao> {
        let ctx = &self.ctx;
        let ws = ctx.windows.as_ref();
        let w = w.or_else(|| ws.foreground_window()).ok_or(Error::NotFound)?;
        if !ws.is_window(w) {
            return Err(Error::WindowGone);
        }

        let top = ws.root(w).unwrap_or(w);
        if !flags.contains(FocusFlags::UIA) && classes::is_java_class(&ws.class_name(top).unwrap_or_default()) {
            if let Some(node) = ctx.backends.java_from_window(w, true) {
                let mut ao = Ao::with_flags(node, 0, MiscFlags::JAVA);
                ao.ensure_role();
                return Ok(ao);
            }
        }

        if let Some(bridge) = self.broker(w, flags.contains(FocusFlags::NOT_IN_PROC))? {
            let req = FocusedRequest { flags };
            match bridge.call(&req, w, None).and_then(|payload| bridge.first_result(payload)) {
                Err(e) if falls_back(&e) => self.note_fallback(w, &e),
                r => return r,
            }
        }
        resolve::focused_local(ctx, w, flags, false)
    }

    /// Object `id` of window `w`, or its name with [`WindowFlags::NAME`].
    pub fn from_window(&self, w: WindowHandle, id: ObjectId, flags: WindowFlags) -> Result<WindowObject> {
        let ctx = &self.ctx;
        if !ctx.windows.is_window(w) {
            return Err(Error::WindowGone);
        }
        let not_in_proc = flags.contains(WindowFlags::NOT_IN_PROC) || id == ObjectId::JAVA;
        if let Some(bridge) = self.broker(w, not_in_proc)? {
            let req = FromWindowRequest { object_id: id, flags };
            let remote = bridge.call(&req, w, None).and_then(|payload| {
                if flags.contains(WindowFlags::NAME) {
                    bridge.text(&payload).map(WindowObject::Name)
                } else {
                    bridge.first_result(payload).map(WindowObject::Object)
                }
            });
            match remote {
                Err(e) if falls_back(&e) => self.note_fallback(w, &e),
                r => return r,
            }
        }
        resolve::from_window_local(ctx, w, id, flags, false)
    }

    /// Follow navigation string `path` from `from`.
    pub fn navigate(&self, from: &Ao, path: &str) -> Result<Ao> {
        let parsed: NavPath = path.parse()?;
        if from.is_in_proc() {
            if let Some(w) = from.window() {
                if let Some(bridge) = self.broker(w, false)? {
                    let req = NavigateRequest {
                        elem: from.elem(),
                        path: path.to_owned(),
                    };
                    match bridge.call(&req, w, Some(from)).and_then(|payload| bridge.first_result(payload)) {
                        Err(e) if falls_back(&e) => self.note_fallback(w, &e),
                        r => return r,
                    }
                }
            }
        }
        let mut to = resolve::navigate(from, &parsed)?;
        to.ensure_role();
        Ok(to)
    }

    /// Read one property of `ao`.
    pub fn get_property(&self, ao: &Ao, selector: &PropSelector) -> Result<PropValue> {
        match selector {
            PropSelector::Html(name) => self.get_html(ao, name).map(PropValue::Text),
            selector => resolve::get_property(&self.ctx, ao, selector),
        }
    }

    /// HTML data of `ao`; see [`browser::html`] for `what`.
    ///
    /// The DOM lives in the browser process, so `ao` must have been obtained
    /// there and must not be a sub-element.
    pub fn get_html(&self, ao: &Ao, what: &str) -> Result<String> {
        if !ao.is_in_proc() || ao.elem() != 0 {
            return Err(Error::NotSupported);
        }
        let w = ao.window().ok_or(Error::NotSupported)?;
        if let Some(bridge) = self.broker(w, false)? {
            let req = GetHtmlRequest { what: what.to_owned() };
            match bridge.call(&req, w, Some(ao)).and_then(|payload| bridge.text(&payload)) {
                Err(e) if falls_back(&e) => self.note_fallback(w, &e),
                r => return r,
            }
        }
        browser::html(ao, what)
    }

    /// Make the page tree of the Chromium window `w` available, waiting for
    /// the browser to build it. Done once per window.
    pub fn enable_browser(&self, w: WindowHandle) {
        let ws = self.ctx.windows.as_ref();
        let control = (ws.is_child(w) && classes::class_is(ws, w, classes::CHROME_RENDER_WIDGET)).then_some(w);
        let top = control.and_then(|c| ws.root(c)).unwrap_or(w);
        browser::enable_chrome(self, top, control);
    }
}

impl std::fmt::Debug for Probe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Probe")
            .field("ctx", &self.ctx)
            .field("enabled_browsers", &self.enabled_browsers.lock().len())
            .finish_non_exhaustive()
    }
}

static_assertions::assert_impl_all!(Probe: Send, Sync);

#[cfg(test)]
mod tests {
    use horizon_probe_core::{ProbeConfig, Role};

    use super::*;
    use crate::mock::{MockDesktop, MockNode, MockWindow};

    const W: WindowHandle = WindowHandle(0x40);

    fn probe() -> Probe {
        let d = MockDesktop::new();
        d.add_window(
            MockWindow::top_level(W, "#32770").legacy(
                ObjectId::WINDOW,
                MockNode::build(Role::WINDOW, "Dialog")
                    .window(W)
                    .child(
                        MockNode::build(Role::CLIENT, "")
                            .child(MockNode::build(Role::PUSHBUTTON, "OK"))
                            .child(MockNode::build(Role::PUSHBUTTON, "Cancel")),
                    )
                    .finish(),
            ),
        );
        Probe::out_of_process(Context::new(d.clone(), d, ProbeConfig::default()))
    }

    fn request(role: &str) -> FindRequest {
        FindRequest {
            role: Some(role.into()),
            ..Default::default()
        }
    }

    fn name(ao: &Ao) -> String {
        ao.name().unwrap().unwrap_or_default()
    }

    #[test]
    fn test_find_first_with_skip() {
        let p = probe();
        let found = p.find_first(FindRoot::Window(W), &request("PUSHBUTTON")).unwrap();
        assert_eq!(name(&found.into_object().unwrap()), "OK");

        let mut req = request("PUSHBUTTON");
        req.skip = 1;
        let found = p.find_first(FindRoot::Window(W), &req).unwrap();
        assert_eq!(name(&found.into_object().unwrap()), "Cancel");

        req.skip = 2;
        assert!(p.find_first(FindRoot::Window(W), &req).unwrap_err().is_not_found());
    }

    #[test]
    fn test_find_first_result_prop() {
        let p = probe();
        let mut req = request("PUSHBUTTON");
        req.result_prop = Some('n');
        match p.find_first(FindRoot::Window(W), &req).unwrap() {
            Found::Property(PropValue::Text(s)) => assert_eq!(s, "OK"),
            other => panic!("unexpected {other:?}"),
        }
        req.result_prop = Some('-');
        assert!(matches!(p.find_first(FindRoot::Window(W), &req).unwrap(), Found::Nothing));
        req.result_prop = Some('?');
        assert!(matches!(p.find_first(FindRoot::Window(W), &req), Err(Error::InvalidParameter(_))));
    }

    #[test]
    fn test_find_all_keep_and_skip() {
        let p = probe();
        let mut seen = Vec::new();
        let kept = p
            .find_all(FindRoot::Window(W), &request("PUSHBUTTON"), &mut |ao, rect| {
                assert!(rect.is_none());
                seen.push(name(ao));
                OnMatch::Continue
            })
            .unwrap();
        assert!(kept.is_none());
        assert_eq!(seen, ["OK", "Cancel"]);

        let mut req = request("PUSHBUTTON");
        req.skip = 1;
        let kept = p
            .find_all(FindRoot::Window(W), &req, &mut |_, _| OnMatch::Keep)
            .unwrap()
            .unwrap();
        assert_eq!(name(&kept), "Cancel");
    }

    #[test]
    fn test_role_prefix_on_object_root() {
        let p = probe();
        let root = p.find_first(FindRoot::Window(W), &request("CLIENT")).unwrap().into_object().unwrap();
        let err = p.find_first(FindRoot::Object(&root), &request("web:LINK")).unwrap_err();
        assert!(matches!(err, Error::InvalidParameter(_)));
        let found = p.find_first(FindRoot::Object(&root), &request("PUSHBUTTON")).unwrap();
        assert_eq!(name(&found.into_object().unwrap()), "OK");
    }

    #[test]
    fn test_html_needs_in_proc_object() {
        let p = probe();
        let ok = p.find_first(FindRoot::Window(W), &request("PUSHBUTTON")).unwrap().into_object().unwrap();
        assert!(matches!(p.get_html(&ok, "'t"), Err(Error::NotSupported)));
        assert!(matches!(
            p.get_property(&ok, &PropSelector::Html("href".into())),
            Err(Error::NotSupported)
        ));
    }
}
