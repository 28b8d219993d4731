//! Chromium page discovery and the enabling loop.

use std::sync::Arc;
use std::time::Duration;

use horizon_probe::mock::{LoopbackBroker, LoopbackInjector, MockDesktop, MockNode, MockWindow};
use horizon_probe::platform::classes;
use horizon_probe::{Context, FindRoot, Probe};
use horizon_probe_core::{Ao, NodeRef, ProbeConfig, Role, WindowHandle};
use horizon_probe_marshal::FindRequest;

const C: WindowHandle = WindowHandle(0x70);

fn desktop(client: NodeRef, title: &str) -> Arc<MockDesktop> {
    let d = MockDesktop::new();
    d.add_window(MockWindow::top_level(C, classes::CHROME_WIDGET).name(title).client(client));
    d
}

fn context(d: &Arc<MockDesktop>) -> Context {
    Context::new(d.clone(), d.clone(), ProbeConfig::default())
}

fn in_process(d: &Arc<MockDesktop>) -> (Probe, Arc<LoopbackInjector>) {
    let ctx = context(d);
    let injector = Arc::new(LoopbackInjector::new(LoopbackBroker::new(ctx.clone())));
    (Probe::new(ctx, injector.clone()), injector)
}

fn page(links: &[&str]) -> NodeRef {
    let mut doc = MockNode::build(Role::DOCUMENT, "Home").value("https://example.com/").window(C);
    for link in links {
        doc = doc.child(MockNode::build(Role::LINK, link));
    }
    MockNode::build(Role::CLIENT, "").window(C).child(doc).finish()
}

fn web_request(role: &str, name: Option<&str>) -> FindRequest {
    FindRequest {
        role: Some(role.into()),
        name: name.map(str::to_owned),
        ..Default::default()
    }
}

fn name(ao: &Ao) -> String {
    ao.name().unwrap().unwrap_or_default()
}

fn ms(v: u64) -> Duration {
    Duration::from_millis(v)
}

#[test]
fn test_prefixed_find_enables_once() {
    let d = desktop(page(&["Docs", "Blog"]), "Home - Chromium");
    let (probe, injector) = in_process(&d);

    let docs = probe
        .find_first(FindRoot::Window(C), &web_request("chrome:LINK", Some("Docs")))
        .unwrap()
        .into_object()
        .unwrap();
    assert_eq!(name(&docs), "Docs");
    assert!(docs.is_in_proc());
    // ready on the first attempt
    assert_eq!(d.sleeps(), [ms(10)]);

    let blog = probe
        .find_first(FindRoot::Window(C), &web_request("web:LINK", Some("Blog")))
        .unwrap()
        .into_object()
        .unwrap();
    assert_eq!(name(&blog), "Blog");
    assert_eq!(d.sleeps().len(), 1);
    // one enable call and two searches
    assert_eq!(injector.broker().calls(), 3);
    assert_eq!(injector.broker().live_handles(), 0);
}

#[test]
fn test_page_not_ready_out_of_process() {
    let d = desktop(page(&[]), "Home - Chromium");
    d.set_foreground(Some(C));
    let probe = Probe::out_of_process(context(&d));

    probe.enable_browser(C);
    let expected: Vec<Duration> = (0..25).map(|i| ms(100 + i)).collect();
    assert_eq!(d.sleeps(), expected);

    // remembered even though the page never got children
    probe.enable_browser(C);
    assert_eq!(d.sleeps().len(), 25);
}

#[test]
fn test_covered_window_is_retried_later() {
    let d = desktop(page(&[]), "Home - Chromium");
    d.set_foreground(None);
    let probe = Probe::out_of_process(context(&d));

    probe.enable_browser(C);
    assert_eq!(d.sleeps().len(), 24);
    probe.enable_browser(C);
    assert_eq!(d.sleeps().len(), 48);
}

#[test]
fn test_window_without_page_gives_up() {
    let client: NodeRef = MockNode::build(Role::CLIENT, "").window(C).finish();
    let d = desktop(client, "Chromium");
    let probe = Probe::out_of_process(context(&d));

    probe.enable_browser(C);
    assert!(d.sleeps().is_empty());
    let err = probe
        .find_first(FindRoot::Window(C), &web_request("chrome:LINK", None))
        .unwrap_err();
    assert!(err.is_not_found());
    assert!(d.sleeps().is_empty());
}

#[test]
fn test_page_chosen_by_window_title() {
    let client: NodeRef = MockNode::build(Role::CLIENT, "")
        .window(C)
        .child(
            MockNode::build(Role::DOCUMENT, "Settings")
                .value("chrome://settings")
                .window(C)
                .child(MockNode::build(Role::LINK, "in settings")),
        )
        .child(
            MockNode::build(Role::DOCUMENT, "Inbox")
                .value("about:blank")
                .window(C)
                .child(MockNode::build(Role::LINK, "in inbox")),
        )
        .finish();
    let d = desktop(client, "Inbox - Chromium");
    let (probe, _) = in_process(&d);

    let link = probe
        .find_first(FindRoot::Window(C), &web_request("chrome:LINK", None))
        .unwrap()
        .into_object()
        .unwrap();
    assert_eq!(name(&link), "in inbox");
}
