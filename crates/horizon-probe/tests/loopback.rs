//! Queries routed through a loopback broker.
//!
//! The broker runs the same engine against the same desktop, so every call
//! can be compared with its out-of-process counterpart.

use std::sync::Arc;

use horizon_probe::mock::{LoopbackBroker, LoopbackInjector, MockDesktop, MockDom, MockNode, MockWindow};
use horizon_probe::{Context, FindRoot, OnMatch, Probe, PropSelector, WindowObject};
use horizon_probe_core::{
    Ao, Error, FindFlags, FocusFlags, InjectFailure, NodeRef, ObjectId, Point, PointFlags, ProbeConfig, Rect,
    Role, State, WindowFlags, WindowHandle,
};
use horizon_probe_marshal::FindRequest;

const W: WindowHandle = WindowHandle(0x40);

struct Fixture {
    desktop: Arc<MockDesktop>,
    injector: Arc<LoopbackInjector>,
    probe: Probe,
    root: Arc<MockNode>,
}

impl Fixture {
    fn broker(&self) -> &Arc<LoopbackBroker> {
        self.injector.broker()
    }
}

fn dialog() -> Arc<MockNode> {
    MockNode::build(Role::WINDOW, "Dialog")
        .window(W)
        .rect(Rect::new(0, 0, 200, 100))
        .child(
            MockNode::build(Role::CLIENT, "")
                .rect(Rect::new(0, 20, 200, 100))
                .child(MockNode::build(Role::PUSHBUTTON, "OK").rect(Rect::new(10, 30, 60, 50)))
                .child(
                    MockNode::build(Role::PUSHBUTTON, "Cancel")
                        .rect(Rect::new(70, 30, 120, 50))
                        .state(State::FOCUSED),
                )
                .child(MockNode::build(Role::PUSHBUTTON, "Apply").rect(Rect::new(130, 30, 180, 50)))
                .child(
                    MockNode::build(Role::LINK, "Help")
                        .rect(Rect::new(10, 60, 60, 80))
                        .dom(MockDom::element("A").attr("href", "https://example.com/help").into_node()),
                ),
        )
        .finish()
}

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("horizon_probe::bridge=trace,horizon_probe::find=trace")
        .with_test_writer()
        .try_init();
}

fn setup(root: Arc<MockNode>) -> Fixture {
    setup_on(MockDesktop::new(), root)
}

fn setup_on(desktop: Arc<MockDesktop>, root: Arc<MockNode>) -> Fixture {
    init_logging();
    let window_object: NodeRef = root.clone();
    let client: NodeRef = root.child(0).unwrap();
    desktop.add_window(
        MockWindow::top_level(W, "#32770")
            .name("Dialog")
            .rect(Rect::new(0, 0, 200, 100))
            .legacy(ObjectId::WINDOW, window_object)
            .client(client),
    );
    let ctx = Context::new(desktop.clone(), desktop.clone(), ProbeConfig::default());
    let injector = Arc::new(LoopbackInjector::new(LoopbackBroker::new(ctx.clone())));
    let probe = Probe::new(ctx, injector.clone());
    Fixture {
        desktop,
        injector,
        probe,
        root,
    }
}

fn request(role: &str, name: Option<&str>) -> FindRequest {
    FindRequest {
        role: Some(role.into()),
        name: name.map(str::to_owned),
        ..Default::default()
    }
}

fn name(ao: &Ao) -> String {
    ao.name().unwrap().unwrap_or_default()
}

fn find(f: &Fixture, req: &FindRequest) -> Ao {
    f.probe.find_first(FindRoot::Window(W), req).unwrap().into_object().unwrap()
}

fn find_all_names(f: &Fixture, req: &FindRequest) -> Vec<String> {
    let mut names = Vec::new();
    let kept = f
        .probe
        .find_all(FindRoot::Window(W), req, &mut |ao, _| {
            names.push(name(ao));
            OnMatch::Continue
        })
        .unwrap();
    assert!(kept.is_none());
    names
}

#[test]
fn test_find_runs_in_target_process() {
    let f = setup(dialog());
    let ok = find(&f, &request("PUSHBUTTON", Some("OK")));
    assert_eq!(name(&ok), "OK");
    assert_eq!(ok.role_byte(), Role::PUSHBUTTON);
    assert!(ok.is_in_proc());
    assert_eq!(f.broker().calls(), 1);

    let err = f
        .probe
        .find_first(FindRoot::Window(W), &request("PUSHBUTTON", Some("Missing")))
        .unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(f.broker().live_handles(), 0);
}

#[test]
fn test_injection_failure_falls_back() {
    let f = setup(dialog());
    f.injector.fail_with(Some(InjectFailure::InjectionFailed));
    let ok = find(&f, &request("PUSHBUTTON", Some("OK")));
    assert_eq!(name(&ok), "OK");
    assert!(!ok.is_in_proc());
    assert_eq!(f.broker().calls(), 0);

    f.injector.fail_with(Some(InjectFailure::Other(7)));
    let err = f
        .probe
        .find_first(FindRoot::Window(W), &request("PUSHBUTTON", Some("OK")))
        .unwrap_err();
    assert!(matches!(err, Error::BackendUnavailable(InjectFailure::Other(7))));
}

#[test]
fn test_dead_broker_falls_back() {
    let f = setup(dialog());
    f.broker().kill();
    let ok = find(&f, &request("PUSHBUTTON", Some("Apply")));
    assert_eq!(name(&ok), "Apply");
    assert!(!ok.is_in_proc());
    assert_eq!(f.broker().calls(), 1);
}

#[test]
fn test_find_all_reverse_matches_local_order() {
    let f = setup(dialog());
    let forward = find_all_names(&f, &request("PUSHBUTTON", None));
    assert_eq!(forward, ["OK", "Cancel", "Apply"]);

    let mut req = request("PUSHBUTTON", None);
    req.flags = FindFlags::REVERSE;
    let backward = find_all_names(&f, &req);
    assert_eq!(backward, ["Apply", "Cancel", "OK"]);

    req.flags |= FindFlags::NOT_IN_PROC;
    assert_eq!(find_all_names(&f, &req), backward);
    assert_eq!(f.broker().calls(), 2);
}

#[test]
fn test_kept_match_releases_the_rest() {
    let f = setup(dialog());
    let kept = f
        .probe
        .find_all(FindRoot::Window(W), &request("PUSHBUTTON", None), &mut |ao, _| {
            if name(ao) == "OK" { OnMatch::Keep } else { OnMatch::Continue }
        })
        .unwrap()
        .unwrap();
    assert_eq!(name(&kept), "OK");
    assert!(kept.is_in_proc());
    assert_eq!(f.broker().live_handles(), 0);
}

#[test]
fn test_hidden_subtree_needs_hidden_too() {
    let root = MockNode::build(Role::WINDOW, "Dialog")
        .window(W)
        .child(
            MockNode::build(Role::CLIENT, "").child(
                MockNode::build(Role::GROUPING, "collapsed")
                    .state(State::INVISIBLE | State::OFFSCREEN)
                    .child(MockNode::build(Role::PANE, "").child(MockNode::build(Role::LINK, "deep"))),
            ),
        )
        .finish();
    let f = setup(root);
    let err = f
        .probe
        .find_first(FindRoot::Window(W), &request("LINK", None))
        .unwrap_err();
    assert!(err.is_not_found());

    let mut req = request("LINK", None);
    req.flags = FindFlags::HIDDEN_TOO;
    assert_eq!(name(&find(&f, &req)), "deep");
}

#[test]
fn test_window_closed_mid_search_releases_results() {
    let desktop = MockDesktop::new();
    let closer = Arc::downgrade(&desktop);
    let root = MockNode::build(Role::WINDOW, "Dialog")
        .window(W)
        .child(
            MockNode::build(Role::CLIENT, "")
                .child(MockNode::build(Role::PUSHBUTTON, "OK"))
                .child(MockNode::build(Role::PUSHBUTTON, "Cancel"))
                .child(MockNode::build(Role::GROUPING, "closing").on_children(move || {
                    if let Some(d) = closer.upgrade() {
                        d.remove_window(W);
                    }
                })),
        )
        .finish();
    let f = setup_on(desktop, root);

    let mut seen = 0;
    let err = f
        .probe
        .find_all(FindRoot::Window(W), &request("PUSHBUTTON", None), &mut |_, _| {
            seen += 1;
            OnMatch::Continue
        })
        .unwrap_err();
    assert!(matches!(err, Error::WindowGone));
    // both buttons were marshaled before the window closed
    assert_eq!(seen, 0);
    assert_eq!(f.broker().calls(), 1);
    assert_eq!(f.broker().live_handles(), 0);
}

#[test]
fn test_rects_match_local_capture() {
    let f = setup(dialog());
    let req = FindRequest::default();
    let remote = f.probe.capture_rects(W, &req).unwrap();

    let mut local_req = req.clone();
    local_req.flags = FindFlags::NOT_IN_PROC;
    let local = f.probe.capture_rects(W, &local_req).unwrap();

    let describe = |rects: &[(Ao, Rect)]| -> Vec<(String, Rect)> {
        rects.iter().map(|(ao, r)| (name(ao), *r)).collect()
    };
    assert_eq!(describe(&remote), describe(&local));
    assert!(describe(&remote).contains(&("OK".to_owned(), Rect::new(10, 30, 60, 50))));
    assert!(remote.iter().all(|(ao, _)| ao.is_in_proc()));
    assert_eq!(f.broker().live_handles(), 0);
}

#[test]
fn test_navigation_through_broker() {
    let f = setup(dialog());
    let ok = find(&f, &request("PUSHBUTTON", Some("OK")));
    let calls = f.broker().calls();

    let next = f.probe.navigate(&ok, "next").unwrap();
    assert_eq!(name(&next), "Cancel");
    assert!(next.is_in_proc());
    assert_eq!(f.broker().calls(), calls + 1);

    let parent = f.probe.navigate(&ok, "parent").unwrap();
    assert_eq!(parent.role_byte(), Role::CLIENT);

    // objects found here navigate here
    let local = Ao::new(f.root.find("OK").unwrap());
    assert_eq!(name(&f.probe.navigate(&local, "ne2").unwrap()), "Apply");
    assert_eq!(f.broker().calls(), calls + 2);
    assert_eq!(f.broker().live_handles(), 0);
}

#[test]
fn test_point_focus_and_window_objects() {
    let f = setup(dialog());
    let ok: NodeRef = f.root.find("OK").unwrap();
    f.desktop.add_point_target(Rect::new(10, 30, 60, 50), Some((ok, 0)), None);

    let at = f.probe.from_point(Point::new(20, 40), PointFlags::empty()).unwrap();
    assert_eq!(name(&at), "OK");
    assert!(at.is_in_proc());
    let at = f.probe.from_point(Point::new(20, 40), PointFlags::NOT_IN_PROC).unwrap();
    assert!(!at.is_in_proc());

    f.desktop.set_foreground(Some(W));
    let focused = f.probe.focused(None, FocusFlags::empty()).unwrap();
    assert_eq!(name(&focused), "Cancel");
    assert!(focused.is_in_proc());

    let client = f
        .probe
        .from_window(W, ObjectId::CLIENT, WindowFlags::empty())
        .unwrap()
        .into_object()
        .unwrap();
    assert_eq!(client.role_byte(), Role::CLIENT);
    assert!(client.is_in_proc());

    assert!(matches!(
        f.probe.from_window(WindowHandle(0x99), ObjectId::CLIENT, WindowFlags::empty()),
        Err(Error::WindowGone)
    ));
    assert!(matches!(
        f.probe.from_window(W, ObjectId::CLIENT, WindowFlags::NAME).unwrap(),
        WindowObject::Name(_)
    ));
    assert_eq!(f.broker().live_handles(), 0);
}

#[test]
fn test_html_of_in_process_object() {
    let f = setup(dialog());
    let link = find(&f, &request("LINK", Some("Help")));
    assert!(link.is_in_proc());
    assert_eq!(f.probe.get_html(&link, "href").unwrap(), "https://example.com/help");
    assert_eq!(f.probe.get_html(&link, "'t").unwrap(), "A");
    assert_eq!(
        f.probe
            .get_property(&link, &PropSelector::Html("href".into()))
            .unwrap()
            .to_text(),
        "https://example.com/help"
    );
    assert!(matches!(f.probe.get_html(&link, "'x"), Err(Error::InvalidParameter(_))));
    assert_eq!(f.broker().live_handles(), 0);
}
