//! Locating the page document of a browser window.

use horizon_probe_core::logging::targets;
use horizon_probe_core::{
    Ao, Child, Error, NavDir, ObjectId, Result, Role, SearchScope, State, StringProp, Wildex,
    WindowHandle,
};

use super::{Flow, LazyState, Visit, engine, walk};
use crate::context::Context;
use crate::platform::classes;

/// Which documents count as the page.
#[derive(Debug, Clone, Copy)]
pub enum DocumentFilter<'a> {
    /// Any visible document. Used while enabling accessibility, when the
    /// active page does not matter yet.
    Any,
    /// The page of a find. In Chromium windows the document value must be a
    /// URL; `Some` further requires it to match.
    Page(Option<&'a Wildex>),
}

/// The document of the page shown in `w`.
pub fn find_document(
    ctx: &Context,
    w: WindowHandle,
    scope: SearchScope,
    url: Option<&Wildex>,
) -> Result<Ao> {
    let client = ctx
        .backends
        .legacy_from_window(w, ObjectId::CLIENT)
        .map_err(|_| Error::NotFound)?;
    let client = Ao::new(client);

    if scope.contains(SearchScope::IN_FIREFOX_PAGE) {
        match client.node().navigate(NavDir::FIREFOX_DOCUMENT, 0) {
            Ok(Some(Child::Node(doc))) => return Ok(Ao::new(doc)),
            // Fails the first time after the browser starts; the walk below
            // usually finds it then.
            other => {
                tracing::debug!(target: targets::BROWSER, window = %w, ?other, "document navigation failed")
            }
        }
    } else if scope.contains(SearchScope::IN_CHROME_PAGE)
        && ctx.windows.is_child(w)
        && classes::class_is(ctx.windows.as_ref(), w, classes::CHROME_RENDER_WIDGET)
    {
        return Ok(client);
    }

    find_document_simple(ctx, &client, scope, DocumentFilter::Page(url))
}

/// Search the descendants of `root` for a visible document.
///
/// When no Chromium document has a web URL, falls back to the most likely
/// candidate: the only one, or of two the one whose name starts the window
/// title.
pub fn find_document_simple(
    ctx: &Context,
    root: &Ao,
    scope: SearchScope,
    filter: DocumentFilter<'_>,
) -> Result<Ao> {
    let mut scope = scope & (SearchScope::IN_CHROME_PAGE | SearchScope::IN_FIREFOX_PAGE);
    let mut reverse = false;
    if scope.contains(SearchScope::IN_FIREFOX_PAGE) {
        scope |= SearchScope::IN_FIREFOX_NOT_WEB_NOT_UIA;
    } else if scope.contains(SearchScope::IN_CHROME_PAGE) {
        reverse = true;
    }

    let mut search = DocumentSearch {
        ctx,
        scope,
        filter,
        doc: None,
        candidates: Vec::new(),
    };
    walk(&mut search, root, 0, ctx.config.find.max_children as usize, reverse);
    if let Some(doc) = search.doc {
        return Ok(doc);
    }

    let mut candidates = search.candidates;
    match candidates.len() {
        1 => Ok(candidates.remove(0)),
        2 => pick_by_window_name(ctx, &candidates).ok_or(Error::NotFound),
        _ => Err(Error::NotFound),
    }
}

fn pick_by_window_name(ctx: &Context, docs: &[Ao]) -> Option<Ao> {
    let ws = ctx.windows.as_ref();
    let mut w = docs[0].window()?;
    if classes::class_is(ws, w, classes::CHROME_RENDER_WIDGET) {
        w = ws.parent(w)?;
    }
    let title = ws.window_name(w)?;
    docs.iter()
        .find(|d| {
            let name = d.name().ok().flatten().unwrap_or_default();
            !name.is_empty()
                && name.len() < title.len()
                && title.as_bytes()[name.len()] == b' '
                && title.starts_with(name.as_str())
        })
        .cloned()
}

struct DocumentSearch<'a> {
    ctx: &'a Context,
    scope: SearchScope,
    filter: DocumentFilter<'a>,
    doc: Option<Ao>,
    /// Visible Chromium documents without a web URL, at most two.
    candidates: Vec<Ao>,
}

impl DocumentSearch<'_> {
    fn is_web_url(&self, value: &str) -> bool {
        value.len() >= 6
            && self
                .ctx
                .config
                .document
                .url_schemes
                .iter()
                .any(|s| value.starts_with(s.as_str()))
    }

    fn on_document(&mut self, ao: &Ao) -> Flow {
        match ao.state() {
            Ok(s) if !s.contains(State::INVISIBLE) => {}
            _ => return Flow::SkipChildren,
        }
        if let (DocumentFilter::Page(url), true) =
            (self.filter, self.scope.contains(SearchScope::IN_CHROME_PAGE))
        {
            let value = ao.string_prop(StringProp::Value).ok().flatten().unwrap_or_default();
            if value.is_empty() {
                return Flow::SkipChildren;
            }
            match url {
                Some(url) if !url.is_match(&value) => return Flow::SkipChildren,
                Some(_) => {}
                None if !self.is_web_url(&value) => {
                    if self.candidates.len() < 2 && !value.starts_with("devtools:") {
                        self.candidates.push(ao.clone());
                    }
                    return Flow::SkipChildren;
                }
                None => {}
            }
        }
        self.doc = Some(ao.clone());
        Flow::Stop
    }
}

impl Visit for DocumentSearch<'_> {
    fn visit(&mut self, ao: &mut Ao, level: usize, _siblings: usize) -> Flow {
        let skip_children =
            ao.elem() != 0 || level >= self.ctx.config.document.max_level as usize;
        let role = ao.ensure_role();
        ao.set_level(level);
        let mut state = LazyState::default();
        if engine::is_background_tab(self.scope, role, skip_children, level, &mut state, ao) {
            return Flow::SkipChildren;
        }
        if ao.elem() != 0 {
            return Flow::SkipChildren;
        }

        let flow = if role == Role::DOCUMENT {
            self.on_document(ao)
        } else if self.ctx.config.document.skip_roles.contains(&role) {
            Flow::SkipChildren
        } else {
            Flow::Continue
        };
        match flow {
            Flow::Continue if skip_children => Flow::SkipChildren,
            flow => flow,
        }
    }
}

#[cfg(test)]
mod tests {
    use horizon_probe_core::{ProbeConfig, Role};

    use super::*;
    use crate::mock::{MockDesktop, MockNode, MockWindow};

    const W: WindowHandle = WindowHandle(0x200);

    fn context(client: std::sync::Arc<MockNode>, title: &str) -> Context {
        let d = MockDesktop::new();
        d.add_window(
            MockWindow::top_level(W, classes::CHROME_WIDGET)
                .name(title)
                .client(client),
        );
        Context::new(d.clone(), d, ProbeConfig::default())
    }

    fn doc(name: &str, value: &str) -> horizon_probe_core::NodeRef {
        MockNode::build(Role::DOCUMENT, name).value(value).window(W).finish()
    }

    fn name_of(ao: &Ao) -> String {
        ao.name().unwrap().unwrap_or_default()
    }

    #[test]
    fn test_web_url_wins() {
        let client = MockNode::build(Role::CLIENT, "")
            .child(MockNode::build(Role::DOCUMENT, "side").value("chrome://side"))
            .child(
                MockNode::build(Role::PANE, "")
                    .child(MockNode::build(Role::DOCUMENT, "page").value("https://example.com/")),
            )
            .finish();
        let ctx = context(client, "page - Browser");
        let d = find_document(&ctx, W, SearchScope::IN_WEB_PAGE | SearchScope::IN_CHROME_PAGE, None).unwrap();
        assert_eq!(name_of(&d), "page");
    }

    #[test]
    fn test_url_filter() {
        let client = MockNode::build(Role::CLIENT, "")
            .child(MockNode::build(Role::DOCUMENT, "a").value("https://a.example/"))
            .child(MockNode::build(Role::DOCUMENT, "b").value("https://b.example/"))
            .finish();
        let ctx = context(client, "Browser");
        let url = Wildex::parse("*b.example*").unwrap();
        let d = find_document(&ctx, W, SearchScope::IN_CHROME_PAGE, Some(&url)).unwrap();
        assert_eq!(name_of(&d), "b");
    }

    #[test]
    fn test_two_candidates_resolved_by_title() {
        let client = MockNode::build(Role::CLIENT, "")
            .child(MockNode::build(Role::DOCUMENT, "Settings").value("chrome://settings").window(W))
            .child(MockNode::build(Role::DOCUMENT, "Inbox").value("about:blank").window(W))
            .finish();
        let ctx = context(client, "Inbox - Browser");
        let d = find_document(&ctx, W, SearchScope::IN_CHROME_PAGE, None).unwrap();
        assert_eq!(name_of(&d), "Inbox");
    }

    #[test]
    fn test_single_candidate_used() {
        let client = MockNode::build(Role::CLIENT, "")
            .child(MockNode::build(Role::DOCUMENT, "local").value("about:blank"))
            .child(MockNode::build(Role::DOCUMENT, "tools").value("devtools://x"))
            .finish();
        let ctx = context(client, "Browser");
        let d = find_document(&ctx, W, SearchScope::IN_CHROME_PAGE, None).unwrap();
        assert_eq!(name_of(&d), "local");
    }

    #[test]
    fn test_invisible_and_toolbar_skipped() {
        let client = MockNode::build(Role::CLIENT, "")
            .child(MockNode::build(Role::DOCUMENT, "hidden").value("https://h/").state(State::INVISIBLE))
            .child(
                MockNode::build(Role::TOOLBAR, "")
                    .child(MockNode::build(Role::DOCUMENT, "bar").value("https://t/")),
            )
            .finish();
        let ctx = context(client, "Browser");
        let err = find_document(&ctx, W, SearchScope::IN_CHROME_PAGE, None).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_firefox_navigation_shortcut() {
        let page = doc("ff page", "");
        let client = MockNode::build(Role::CLIENT, "")
            .navigation(NavDir::FIREFOX_DOCUMENT, page)
            .finish();
        let ctx = context(client, "Firefox");
        let d = find_document(&ctx, W, SearchScope::IN_FIREFOX_PAGE, None).unwrap();
        assert_eq!(name_of(&d), "ff page");
    }

    #[test]
    fn test_any_filter_accepts_any_visible_document() {
        let client = MockNode::build(Role::CLIENT, "")
            .child(MockNode::build(Role::DOCUMENT, "blank"))
            .finish();
        let ctx = context(client.clone(), "Browser");
        let d = find_document_simple(&ctx, &Ao::new(client), SearchScope::IN_CHROME_PAGE, DocumentFilter::Any)
            .unwrap();
        assert_eq!(name_of(&d), "blank");
    }
}
