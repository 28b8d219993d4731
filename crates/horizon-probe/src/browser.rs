//! Browser integration.
//!
//! - HTML of DOM-backed objects ([`html`]) and HTML attribute filters of the
//!   find engine ([`match_html_attributes`])
//! - Role prefixes (`web:`, `chrome:`, `firefox:`) that restrict a find to
//!   the page document ([`split_role_prefix`], [`prefix_scope`])
//! - Enabling the accessibility tree of Chromium windows, which builds it
//!   lazily ([`enable_attempt`] and the retry loop behind
//!   [`Probe::enable_browser`](crate::Probe::enable_browser))

use std::sync::Arc;
use std::time::{Duration, Instant};

use horizon_probe_core::logging::{span_names, targets};
use horizon_probe_core::{
    Ao, DomNode, DomNodeType, Error, ObjectId, Point, Rect, Result, SearchScope, WindowHandle,
};
use horizon_probe_marshal::EnableBrowserRequest;

use crate::context::Context;
use crate::find::{DocumentFilter, PropFilter, find_document_simple};
use crate::platform::{WindowSystem, classes};
use crate::probe::Probe;

// ---------------------------------------------------------------------------
// HTML
// ---------------------------------------------------------------------------

/// Read HTML data of `ao`.
///
/// `what` is `'t` (tag), `'o` (outer HTML), `'i` (inner HTML), `'a`
/// (attributes as `name=value` pairs, each followed by a NUL), `'s` (scroll
/// into view; returns an empty string) or an attribute name. A missing
/// attribute reads as an empty string.
pub fn html(ao: &Ao, what: &str) -> Result<String> {
    if ao.elem() != 0 {
        return Err(Error::NotSupported);
    }
    let dom = ao.node().dom().ok_or(Error::NotSupported)?;

    let Some(selector) = what.strip_prefix('\'') else {
        return Ok(dom.attribute(what)?.unwrap_or_default());
    };
    match selector {
        "t" => Ok(dom.info()?.tag),
        "o" => outer_html(dom.as_ref())?.ok_or(Error::NotFound),
        "i" => inner_html(dom.as_ref())?.ok_or(Error::NotFound),
        "a" => {
            let mut s = String::new();
            for (name, value) in dom.attributes()? {
                if name.is_empty() {
                    continue;
                }
                s.push_str(&name);
                s.push('=');
                s.push_str(&value);
                s.push('\0');
            }
            Ok(s)
        }
        "s" => {
            dom.scroll_into_view()?;
            Ok(String::new())
        }
        _ => Err(Error::invalid_parameter(format!("Unknown HTML selector '{what}'."))),
    }
}

/// Whether every `@name` filter in `props` matches the DOM attributes of
/// `ao`. Objects without a DOM node match none.
pub fn match_html_attributes(ao: &Ao, props: &[PropFilter]) -> bool {
    let mut dom = None;
    for p in props {
        let PropFilter::Html { name, value } = p else {
            continue;
        };
        if dom.is_none() {
            match ao.node().dom() {
                Some(d) => dom = Some(d),
                None => return false,
            }
        }
        let Some(d) = &dom else { return false };
        let attribute = match d.attribute(name) {
            Ok(v) => v.unwrap_or_default(),
            Err(e) => {
                tracing::trace!(target: targets::BROWSER, attribute = %name, error = %e, "attribute read failed");
                return false;
            }
        };
        if !value.is_match(&attribute) {
            return false;
        }
    }
    true
}

fn append_head(s: &mut String, tag: &str, dom: &dyn DomNode) {
    s.push('<');
    s.push_str(tag);
    for (name, value) in dom.attributes().unwrap_or_default() {
        s.push(' ');
        s.push_str(&name);
        s.push_str("=\"");
        s.push_str(&value);
        s.push('"');
    }
    s.push('>');
}

fn append_tail(s: &mut String, tag: &str) {
    s.push_str("</");
    s.push_str(tag);
    s.push('>');
}

/// Compose the HTML of the children of `dom` from their tags, attributes and
/// text. For engines without native inner HTML.
fn compose_inner(s: &mut String, dom: &dyn DomNode, child_count: usize) {
    for i in 0..child_count {
        match dom.child(i) {
            Ok(child) => compose(s, child.as_ref()),
            Err(e) => {
                tracing::trace!(target: targets::BROWSER, index = i, error = %e, "DOM child failed");
                if i == 0 {
                    return;
                }
            }
        }
    }
}

fn compose(s: &mut String, dom: &dyn DomNode) {
    let Ok(info) = dom.info() else { return };
    if info.tag.is_empty() {
        s.push_str(&info.text);
    } else {
        append_head(s, &info.tag, dom);
        compose_inner(s, dom, info.child_count);
        append_tail(s, &info.tag);
    }
}

fn outer_html(dom: &dyn DomNode) -> Result<Option<String>> {
    let info = dom.info()?;
    if info.tag.is_empty() {
        return Ok(Some(info.text));
    }
    let is_doc = info.node_type == DomNodeType::Document;
    if !is_doc {
        if let Ok(Some(native)) = dom.outer_html() {
            return Ok(Some(native));
        }
    }
    let tag = if is_doc { "body" } else { info.tag.as_str() };

    let mut s = String::new();
    append_head(&mut s, tag, dom);
    if info.child_count > 0 {
        match dom.inner_html() {
            Ok(Some(inner)) => s.push_str(&inner),
            Ok(None) => compose_inner(&mut s, dom, info.child_count),
            Err(_) if is_doc => return body_html(dom, true),
            Err(e) => {
                tracing::trace!(target: targets::BROWSER, error = %e, "inner HTML failed");
            }
        }
    }
    append_tail(&mut s, tag);
    Ok(Some(s))
}

fn inner_html(dom: &dyn DomNode) -> Result<Option<String>> {
    match dom.inner_html() {
        Ok(Some(s)) => Ok(Some(s)),
        Ok(None) => {
            let info = dom.info()?;
            let mut s = String::new();
            compose_inner(&mut s, dom, info.child_count);
            Ok(Some(s))
        }
        Err(_) => body_html(dom, false),
    }
}

/// HTML of the `BODY` inside the `HTML` child of a document node, for
/// engines that give no HTML for documents.
fn body_html(doc: &dyn DomNode, outer: bool) -> Result<Option<String>> {
    let Some(html) = find_element_child(doc, "HTML") else {
        return Ok(None);
    };
    let Some(body) = find_element_child(html.as_ref(), "BODY") else {
        return Ok(None);
    };
    if outer {
        outer_html(body.as_ref())
    } else {
        body.inner_html()
    }
}

/// The last element child of `dom` with tag `tag`. The wanted child is
/// usually the last one (doctype then `HTML`, `HEAD` then `BODY`).
fn find_element_child(dom: &dyn DomNode, tag: &str) -> Option<Arc<dyn DomNode>> {
    let count = dom.info().ok()?.child_count;
    (0..count).rev().find_map(|i| {
        let child = dom.child(i).ok()?;
        let info = child.info().ok()?;
        (info.node_type == DomNodeType::Element && info.tag.eq_ignore_ascii_case(tag)).then_some(child)
    })
}

// ---------------------------------------------------------------------------
// Role prefixes
// ---------------------------------------------------------------------------

/// A browser role prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RolePrefix {
    /// `web:`: any browser, detected by window class.
    Web,
    Chrome,
    Firefox,
}

/// Split `web:ROLE`, `chrome:ROLE` or `firefox:ROLE`. Other roles, including
/// custom roles that contain `:`, are not prefixed.
pub fn split_role_prefix(role: &str) -> Option<(RolePrefix, &str)> {
    let (prefix, rest) = role.split_once(':')?;
    let prefix = match prefix {
        "web" => RolePrefix::Web,
        "chrome" => RolePrefix::Chrome,
        "firefox" => RolePrefix::Firefox,
        _ => return None,
    };
    Some((prefix, rest))
}

/// The search scope a prefix selects for window `w`, and the Chromium render
/// widget to enable if `w` is one.
pub fn prefix_scope(ws: &dyn WindowSystem, prefix: RolePrefix, w: WindowHandle) -> (SearchScope, Option<WindowHandle>) {
    let mut scope = SearchScope::IN_WEB_PAGE;
    let mut control = None;
    match prefix {
        RolePrefix::Web => {
            if ws.is_child(w) {
                if classes::class_is(ws, w, classes::CHROME_RENDER_WIDGET) {
                    scope |= SearchScope::IN_CHROME_PAGE;
                    control = Some(w);
                } else if classes::class_is(ws, w, classes::IE_SERVER) {
                    scope |= SearchScope::IN_IES;
                }
            } else {
                let class = ws.class_name(w).unwrap_or_default();
                if classes::is_chrome_class(&class) {
                    scope |= SearchScope::IN_CHROME_PAGE;
                } else if classes::is_firefox_class(&class) {
                    scope |= SearchScope::IN_FIREFOX_PAGE;
                }
            }
        }
        RolePrefix::Chrome => {
            scope |= SearchScope::IN_CHROME_PAGE;
            if ws.is_child(w) && classes::class_is(ws, w, classes::CHROME_RENDER_WIDGET) {
                control = Some(w);
            }
        }
        RolePrefix::Firefox => scope |= SearchScope::IN_FIREFOX_PAGE,
    }
    (scope, control)
}

/// For `web:` searches whose browser was not recognized by the window class:
/// look for an embedded browser control in `w`. Returns the window to
/// search, which is the control itself for legacy web browser controls.
pub fn detect_web_control(ws: &dyn WindowSystem, w: WindowHandle, scope: &mut SearchScope) -> WindowHandle {
    let browsers = SearchScope::IN_CHROME_PAGE | SearchScope::IN_FIREFOX_PAGE | SearchScope::IN_IES;
    if !scope.contains(SearchScope::IN_WEB_PAGE) || scope.intersects(browsers) {
        return w;
    }
    if let Some(ies) = classes::find_child_by_class(ws, w, classes::IE_SERVER, true) {
        *scope |= SearchScope::IN_IES;
        return ies;
    }
    if classes::find_child_by_class(ws, w, classes::CHROME_RENDER_WIDGET, true).is_some() {
        *scope |= SearchScope::IN_CHROME_PAGE;
    }
    w
}

// ---------------------------------------------------------------------------
// Chromium enabling
// ---------------------------------------------------------------------------

/// The point probed by hit-testing on attempt `attempt`, in screen
/// coordinates. Later attempts walk a 4x4 grid over the page area.
fn probe_point(client: Rect, attempt: i32) -> Point {
    let Rect { left, mut top, right, bottom } = client;
    let j = attempt - 4;
    if j < 0 {
        return Point::new((left + right) / 2, bottom - 10);
    }
    let j = j % 16;
    top += 80;
    let (wid, hei) = (right - left, bottom - top);
    Point::new((j % 4) * (wid / 4) + wid / 8 + left, (j / 4) * (hei / 4) + hei / 8 + top)
}

/// One attempt to make the page document of a Chromium window available.
///
/// `control` is the render widget window, if known; its client object is
/// the document. Otherwise the document is searched in the client object of
/// `w`, after a hit test that makes Chromium attach the page tree.
///
/// Returns `Ok` once the document has children, [`Error::BrowserNotReady`]
/// while it has none, and [`Error::NotFound`] if there is no document yet.
pub fn enable_attempt(ctx: &Context, w: WindowHandle, attempt: i32, control: Option<WindowHandle>) -> Result<()> {
    let client = |w| {
        ctx.backends
            .legacy_from_window(w, ObjectId::CLIENT)
            .map(Ao::new)
            .map_err(|_| Error::NotFound)
    };

    let window_client = if attempt == 0 || control.is_none() {
        Some(client(w)?)
    } else {
        None
    };

    let doc = match (control, &window_client) {
        (Some(c), _) => client(c)?,
        (None, Some(aw)) => {
            if let Some(r) = ctx.windows.client_rect(w) {
                let p = probe_point(r, attempt);
                // the answer does not matter; Chromium needs to be asked
                let _ = aw.node().hit_test(p);
            }
            find_document_simple(ctx, aw, SearchScope::IN_CHROME_PAGE, DocumentFilter::Any)
                .map_err(|_| Error::NotFound)?
        }
        (None, None) => return Err(Error::NotFound),
    };

    let enabled = doc.node().child_count().is_ok_and(|n| n > 0);
    if attempt == 0 && !enabled {
        // reading the name starts building the tree
        if let Err(e) = doc.name() {
            tracing::trace!(target: targets::BROWSER, window = %w, error = %e, "page name read failed");
        }
    }
    if enabled {
        // the page DOM is read once after enabling
        if let Some(Err(e)) = doc.node().dom().map(|dom| dom.info()) {
            tracing::trace!(target: targets::BROWSER, window = %w, error = %e, "page DOM read failed");
        }
        Ok(())
    } else {
        Err(Error::BrowserNotReady)
    }
}

/// The enabling loop. See [`Probe::enable_browser`].
pub(crate) fn enable_chrome(probe: &Probe, w: WindowHandle, control: Option<WindowHandle>) {
    if probe.is_browser_enabled(w) {
        return;
    }
    let ctx = probe.context();
    let ws = ctx.windows.as_ref();
    let top = w;
    let mut w = w;
    let mut control = control;

    match control {
        Some(c) => match ws.parent(c) {
            Some(p) => w = p,
            None => return,
        },
        None => {
            control = classes::find_child_by_class(ws, w, classes::CHROME_RENDER_WIDGET, false);
            if control.is_none() {
                control = classes::find_child_by_class(ws, w, classes::CHROME_RENDER_WIDGET, true);
                if let Some(p) = control.and_then(|c| ws.parent(c)) {
                    w = p;
                }
            }
            if control.is_none() && (ws.is_popup(w) || !ws.is_window(w)) {
                return;
            }
        }
    }

    let _span = tracing::debug_span!(target: targets::BROWSER, span_names::BROWSER_ENABLE, window = %top).entered();
    let config = &ctx.config.browser;
    let bridge = probe.broker(w, false).ok().flatten();
    let in_proc = bridge.is_some();
    let (attempts, base_sleep) = if in_proc {
        (config.in_proc_attempts as i32, config.in_proc_sleep_ms)
    } else {
        (config.out_proc_attempts as i32, config.out_proc_sleep_ms)
    };

    let started = Instant::now();
    let mut not_found = 0;
    let mut i = 0;
    while i < attempts {
        let result = match &bridge {
            Some(bridge) => {
                let req = EnableBrowserRequest {
                    attempt: i,
                    control: control.unwrap_or(WindowHandle::NULL),
                };
                bridge.call(&req, w, None).map(drop)
            }
            None => enable_attempt(ctx, w, i, control),
        };
        tracing::trace!(target: targets::BROWSER, attempt = i, ?result, "enable attempt");

        if matches!(result, Err(Error::NotFound)) {
            if !ws.is_window(w) {
                return;
            }
            if control.is_none() {
                break;
            }
        }
        if matches!(result, Err(Error::BrowserNotReady))
            && i == attempts - 1
            && control.is_none()
            && ws.foreground_window() != Some(top)
        {
            // try again next time; the window may be covered
            return;
        }

        ws.sleep(Duration::from_millis(base_sleep + i as u64));
        match result {
            Ok(()) => break,
            Err(Error::NotFound) => {
                not_found += 1;
                if not_found < config.max_not_found {
                    i = 0;
                    continue;
                }
                break;
            }
            Err(_) => not_found = 0,
        }
        i += 1;
    }

    probe.remember_browser_enabled(top);
    let elapsed = started.elapsed();
    if elapsed > Duration::from_millis(config.slow_warning_ms) {
        tracing::warn!(
            target: targets::BROWSER,
            window = %top,
            elapsed_ms = elapsed.as_millis() as u64,
            "enabling browser accessibility is slow; start the browser with --force-renderer-accessibility"
        );
    }
}
