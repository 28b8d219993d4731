//! In-memory desktop for tests and demos.
//!
//! - [`MockNode`]: a legacy accessible tree node, built with [`MockBuilder`]
//! - [`MockDom`]: a DOM node for browser documents
//! - [`MockElement`]: a modern backend element
//! - [`MockDesktop`]: windows, backend roots and point targets; implements
//!   [`WindowSystem`] and [`BackendResolver`]
//!
//! # Example
//!
//! ```ignore
//! use horizon_probe::mock::{MockDesktop, MockNode, MockWindow};
//! use horizon_probe_core::{Role, WindowHandle};
//!
//! let root = MockNode::build(Role::CLIENT, "")
//!     .child(MockNode::build(Role::PUSHBUTTON, "OK"))
//!     .finish();
//! let desktop = MockDesktop::new();
//! desktop.add_window(MockWindow::top_level(WindowHandle(0x10), "#32770").client(root));
//! ```

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};

use horizon_probe_core::{
    AccessibleNode, BackendKind, Child, DomNode, DomNodeInfo, DomNodeType, Error, NavDir,
    NodeRef, ObjectId, Point, Rect, Result, Role, RoleValue, SelectFlags, SpecialAction, State,
    StringProp, WindowHandle,
};

pub use crate::bridge::{LoopbackBroker, LoopbackInjector};
use crate::platform::{BackendResolver, WindowSystem};
use crate::shim::{ElementFlags, ElementRef, ExpandState, UiaElement, UiaProperty, WalkStep};

// ---------------------------------------------------------------------------
// Legacy nodes
// ---------------------------------------------------------------------------

/// A simple sub-element of a [`MockNode`].
#[derive(Debug, Clone)]
pub struct MockItem {
    role: Role,
    name: String,
    state: State,
    rect: Rect,
}

impl MockItem {
    pub fn new(role: Role, name: &str) -> Self {
        Self {
            role,
            name: name.to_owned(),
            state: State::empty(),
            rect: Rect::default(),
        }
    }

    pub fn state(mut self, state: State) -> Self {
        self.state = state;
        self
    }

    pub fn rect(mut self, rect: Rect) -> Self {
        self.rect = rect;
        self
    }
}

type Hook = Arc<dyn Fn() + Send + Sync>;

#[derive(Debug)]
enum Kid {
    Node(Arc<MockNode>),
    Item(MockItem),
}

/// A legacy accessible node.
pub struct MockNode {
    role: RoleValue,
    name: Option<String>,
    strings: HashMap<StringProp, String>,
    value: Mutex<Option<String>>,
    state: State,
    rect: Rect,
    window: Option<WindowHandle>,
    backend: BackendKind,
    kids: Vec<Kid>,
    parent: Weak<MockNode>,
    dom: Option<Arc<MockDom>>,
    navigation: Vec<(NavDir, NodeRef)>,
    failing: bool,
    on_children: Option<Hook>,
    role_reads: AtomicUsize,
    hit_tests: Mutex<Vec<Point>>,
    actions: Mutex<Vec<String>>,
}

/// Builder for [`MockNode`] trees.
pub struct MockBuilder {
    role: RoleValue,
    name: Option<String>,
    strings: HashMap<StringProp, String>,
    value: Option<String>,
    state: State,
    rect: Rect,
    window: Option<WindowHandle>,
    backend: BackendKind,
    kids: Vec<KidBuilder>,
    dom: Option<Arc<MockDom>>,
    navigation: Vec<(NavDir, NodeRef)>,
    failing: bool,
    on_children: Option<Hook>,
}

enum KidBuilder {
    Node(MockBuilder),
    Item(MockItem),
}

impl MockBuilder {
    pub fn prop(mut self, prop: StringProp, value: &str) -> Self {
        if prop == StringProp::Value {
            self.value = Some(value.to_owned());
        } else if prop == StringProp::Name {
            self.name = Some(value.to_owned());
        } else {
            self.strings.insert(prop, value.to_owned());
        }
        self
    }

    pub fn value(self, value: &str) -> Self {
        self.prop(StringProp::Value, value)
    }

    pub fn no_name(mut self) -> Self {
        self.name = None;
        self
    }

    pub fn state(mut self, state: State) -> Self {
        self.state = state;
        self
    }

    pub fn rect(mut self, rect: Rect) -> Self {
        self.rect = rect;
        self
    }

    /// The hosting window. Children without one report their parent's.
    pub fn window(mut self, w: WindowHandle) -> Self {
        self.window = Some(w);
        self
    }

    pub fn backend(mut self, backend: BackendKind) -> Self {
        self.backend = backend;
        self
    }

    pub fn child(mut self, child: MockBuilder) -> Self {
        self.kids.push(KidBuilder::Node(child));
        self
    }

    pub fn item(mut self, item: MockItem) -> Self {
        self.kids.push(KidBuilder::Item(item));
        self
    }

    pub fn dom(mut self, dom: Arc<MockDom>) -> Self {
        self.dom = Some(dom);
        self
    }

    /// Answer `dir` with `target`, e.g. [`NavDir::FIREFOX_DOCUMENT`].
    pub fn navigation(mut self, dir: NavDir, target: NodeRef) -> Self {
        self.navigation.push((dir, target));
        self
    }

    /// Every property query fails.
    pub fn failing(mut self) -> Self {
        self.failing = true;
        self
    }

    /// Run `f` each time the children are listed.
    pub fn on_children(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_children = Some(Arc::new(f));
        self
    }

    pub fn finish(self) -> Arc<MockNode> {
        self.finish_with(Weak::new())
    }

    fn finish_with(self, parent: Weak<MockNode>) -> Arc<MockNode> {
        Arc::new_cyclic(|me| {
            let kids = self
                .kids
                .into_iter()
                .map(|k| match k {
                    KidBuilder::Node(b) => Kid::Node(b.finish_with(me.clone())),
                    KidBuilder::Item(i) => Kid::Item(i),
                })
                .collect();
            MockNode {
                role: self.role,
                name: self.name,
                strings: self.strings,
                value: Mutex::new(self.value),
                state: self.state,
                rect: self.rect,
                window: self.window,
                backend: self.backend,
                kids,
                parent,
                dom: self.dom,
                navigation: self.navigation,
                failing: self.failing,
                on_children: self.on_children,
                role_reads: AtomicUsize::new(0),
                hit_tests: Mutex::new(Vec::new()),
                actions: Mutex::new(Vec::new()),
            }
        })
    }
}

impl MockNode {
    pub fn build(role: impl Into<RoleValue>, name: &str) -> MockBuilder {
        MockBuilder {
            role: role.into(),
            name: Some(name.to_owned()),
            strings: HashMap::new(),
            value: None,
            state: State::empty(),
            rect: Rect::default(),
            window: None,
            backend: BackendKind::Legacy,
            kids: Vec::new(),
            dom: None,
            navigation: Vec::new(),
            failing: false,
            on_children: None,
        }
    }

    /// The `i`-th node child, skipping sub-elements.
    pub fn child(&self, i: usize) -> Option<Arc<MockNode>> {
        self.kids
            .iter()
            .filter_map(|k| match k {
                Kid::Node(n) => Some(n.clone()),
                Kid::Item(_) => None,
            })
            .nth(i)
    }

    /// First descendant node (pre-order) with this name.
    pub fn find(&self, name: &str) -> Option<Arc<MockNode>> {
        for k in &self.kids {
            if let Kid::Node(n) = k {
                if n.name.as_deref() == Some(name) {
                    return Some(n.clone());
                }
                if let Some(found) = n.find(name) {
                    return Some(found);
                }
            }
        }
        None
    }

    /// How many times the role was read.
    pub fn role_reads(&self) -> usize {
        self.role_reads.load(Ordering::Relaxed)
    }

    pub fn hit_tests(&self) -> Vec<Point> {
        self.hit_tests.lock().clone()
    }

    /// Actions performed on the node and its sub-elements.
    pub fn actions(&self) -> Vec<String> {
        self.actions.lock().clone()
    }

    fn item(&self, elem: i32) -> Result<&MockItem> {
        let i = usize::try_from(elem - 1).map_err(|_| Error::invalid_parameter("elem"))?;
        self.kids
            .iter()
            .filter_map(|k| match k {
                Kid::Item(item) => Some(item),
                Kid::Node(_) => None,
            })
            .nth(i)
            .ok_or_else(|| Error::invalid_parameter("elem"))
    }

    fn item_count(&self) -> usize {
        self.kids.iter().filter(|k| matches!(k, Kid::Item(_))).count()
    }

    fn check(&self) -> Result<()> {
        if self.failing {
            Err(Error::Backend(horizon_probe_core::codes::FAIL))
        } else {
            Ok(())
        }
    }

    fn has_focus(&self) -> bool {
        self.state.contains(State::FOCUSED)
            || self.kids.iter().any(|k| match k {
                Kid::Node(n) => n.has_focus(),
                Kid::Item(i) => i.state.contains(State::FOCUSED),
            })
    }

    fn to_child(&self, kid: &Kid) -> Child {
        match kid {
            Kid::Node(n) => Child::Node(n.clone()),
            Kid::Item(_) => {
                let index = self
                    .kids
                    .iter()
                    .filter(|k| matches!(k, Kid::Item(_)))
                    .position(|k| std::ptr::eq(k, kid))
                    .unwrap_or(0);
                Child::Element(index as i32 + 1)
            }
        }
    }

    fn sibling(&self, offset: isize) -> Option<Child> {
        let parent = self.parent.upgrade()?;
        let pos = parent.kids.iter().position(|k| match k {
            Kid::Node(n) => std::ptr::eq(Arc::as_ptr(n), self),
            Kid::Item(_) => false,
        })?;
        let at = pos.checked_add_signed(offset)?;
        match parent.kids.get(at)? {
            Kid::Node(n) => Some(Child::Node(n.clone())),
            Kid::Item(_) => None,
        }
    }
}

impl std::fmt::Debug for MockNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockNode")
            .field("role", &self.role)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl AccessibleNode for MockNode {
    fn backend(&self) -> BackendKind {
        self.backend
    }

    fn parent(&self) -> Result<Option<NodeRef>> {
        self.check()?;
        Ok(self.parent.upgrade().map(|p| p as NodeRef))
    }

    fn child_count(&self) -> Result<usize> {
        self.check()?;
        Ok(self.kids.len())
    }

    fn children(&self) -> Result<Vec<Child>> {
        self.check()?;
        if let Some(f) = &self.on_children {
            f();
        }
        Ok(self.kids.iter().map(|k| self.to_child(k)).collect())
    }

    fn string_prop(&self, prop: StringProp, elem: i32) -> Result<Option<String>> {
        self.check()?;
        if elem != 0 {
            let item = self.item(elem)?;
            return Ok((prop == StringProp::Name).then(|| item.name.clone()));
        }
        Ok(match prop {
            StringProp::Name => self.name.clone(),
            StringProp::Value => self.value.lock().clone(),
            other => self.strings.get(&other).cloned(),
        })
    }

    fn role(&self, elem: i32) -> Result<RoleValue> {
        self.role_reads.fetch_add(1, Ordering::Relaxed);
        self.check()?;
        if elem != 0 {
            return Ok(self.item(elem)?.role.into());
        }
        Ok(self.role.clone())
    }

    fn state(&self, elem: i32) -> Result<State> {
        self.check()?;
        if elem != 0 {
            return Ok(self.item(elem)?.state);
        }
        Ok(self.state)
    }

    fn location(&self, elem: i32) -> Result<Rect> {
        self.check()?;
        if elem != 0 {
            return Ok(self.item(elem)?.rect);
        }
        Ok(self.rect)
    }

    fn navigate(&self, dir: NavDir, elem: i32) -> Result<Option<Child>> {
        self.check()?;
        if elem != 0 {
            let count = self.item_count() as i32;
            let to = match dir {
                NavDir::NEXT => elem + 1,
                NavDir::PREVIOUS => elem - 1,
                _ => return Ok(None),
            };
            return Ok((1..=count).contains(&to).then_some(Child::Element(to)));
        }
        if let Some((_, target)) = self.navigation.iter().find(|(d, _)| *d == dir) {
            return Ok(Some(Child::Node(target.clone())));
        }
        Ok(match dir {
            NavDir::NEXT => self.sibling(1),
            NavDir::PREVIOUS => self.sibling(-1),
            NavDir::FIRST_CHILD => self.kids.first().map(|k| self.to_child(k)),
            NavDir::LAST_CHILD => self.kids.last().map(|k| self.to_child(k)),
            _ => None,
        })
    }

    fn hit_test(&self, point: Point) -> Result<Option<Child>> {
        self.hit_tests.lock().push(point);
        Ok(None)
    }

    fn focus(&self) -> Result<Option<Child>> {
        self.check()?;
        if self.state.contains(State::FOCUSED) {
            return Ok(Some(Child::Element(0)));
        }
        Ok(self
            .kids
            .iter()
            .find(|k| match k {
                Kid::Node(n) => n.has_focus(),
                Kid::Item(i) => i.state.contains(State::FOCUSED),
            })
            .map(|k| self.to_child(k)))
    }

    fn do_default_action(&self, elem: i32) -> Result<()> {
        self.check()?;
        self.actions.lock().push(format!("default {elem}"));
        Ok(())
    }

    fn do_special_action(&self, action: SpecialAction, elem: i32) -> Result<()> {
        self.check()?;
        self.actions.lock().push(format!("{action:?} {elem}"));
        Ok(())
    }

    fn set_value(&self, elem: i32, value: &str) -> Result<()> {
        self.check()?;
        if elem != 0 {
            return Err(Error::NotSupported);
        }
        *self.value.lock() = Some(value.to_owned());
        Ok(())
    }

    fn select(&self, elem: i32, flags: SelectFlags) -> Result<()> {
        self.check()?;
        self.actions
            .lock()
            .push(format!("select {elem} {:#x}", flags.bits()));
        Ok(())
    }

    fn window(&self) -> Option<WindowHandle> {
        self.window
            .or_else(|| self.parent.upgrade().and_then(|p| p.window()))
    }

    fn dom(&self) -> Option<Arc<dyn DomNode>> {
        self.dom.clone().map(|d| d as Arc<dyn DomNode>)
    }
}

// ---------------------------------------------------------------------------
// DOM
// ---------------------------------------------------------------------------

/// A DOM node.
#[derive(Debug)]
pub struct MockDom {
    tag: String,
    text: String,
    node_type: DomNodeType,
    attributes: Vec<(String, String)>,
    children: Vec<Arc<MockDom>>,
    inner: Option<String>,
    inner_fails: bool,
    scrolls: AtomicUsize,
}

impl MockDom {
    fn new(tag: &str, text: &str, node_type: DomNodeType) -> Self {
        Self {
            tag: tag.to_owned(),
            text: text.to_owned(),
            node_type,
            attributes: Vec::new(),
            children: Vec::new(),
            inner: None,
            inner_fails: false,
            scrolls: AtomicUsize::new(0),
        }
    }

    pub fn element(tag: &str) -> Self {
        Self::new(tag, "", DomNodeType::Element)
    }

    pub fn text(text: &str) -> Self {
        Self::new("", text, DomNodeType::Text)
    }

    pub fn document() -> Self {
        Self::new("#document", "", DomNodeType::Document)
    }

    pub fn attr(mut self, name: &str, value: &str) -> Self {
        self.attributes.push((name.to_owned(), value.to_owned()));
        self
    }

    pub fn child(mut self, child: MockDom) -> Self {
        self.children.push(Arc::new(child));
        self
    }

    /// Inner HTML as the engine would return it natively.
    pub fn native_inner(mut self, html: &str) -> Self {
        self.inner = Some(html.to_owned());
        self
    }

    /// Native inner HTML fails, as on some engines' document nodes.
    pub fn inner_fails(mut self) -> Self {
        self.inner_fails = true;
        self
    }

    pub fn into_node(self) -> Arc<MockDom> {
        Arc::new(self)
    }

    pub fn scrolls(&self) -> usize {
        self.scrolls.load(Ordering::Relaxed)
    }
}

impl DomNode for MockDom {
    fn info(&self) -> Result<DomNodeInfo> {
        Ok(DomNodeInfo {
            tag: self.tag.clone(),
            text: self.text.clone(),
            node_type: self.node_type,
            child_count: self.children.len(),
        })
    }

    fn attributes(&self) -> Result<Vec<(String, String)>> {
        Ok(self.attributes.clone())
    }

    fn child(&self, index: usize) -> Result<Arc<dyn DomNode>> {
        self.children
            .get(index)
            .map(|c| c.clone() as Arc<dyn DomNode>)
            .ok_or(Error::NotFound)
    }

    fn inner_html(&self) -> Result<Option<String>> {
        if self.inner_fails {
            return Err(Error::Backend(horizon_probe_core::codes::FAIL));
        }
        Ok(self.inner.clone())
    }

    fn scroll_into_view(&self) -> Result<()> {
        self.scrolls.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Modern elements
// ---------------------------------------------------------------------------

bitflags::bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    struct Patterns: u16 {
        const INVOKE = 1;
        const TOGGLE = 2;
        const EXPAND = 4;
        const SELECT = 8;
        const SCROLL = 0x10;
        const VALUE = 0x20;
        const LEGACY = 0x40;
    }
}

/// A modern backend element.
pub struct MockElement {
    control_type: i32,
    name: Option<String>,
    props: HashMap<UiaProperty, String>,
    rect: Rect,
    native_window: Option<WindowHandle>,
    flags: ElementFlags,
    patterns: Patterns,
    expand_state: Mutex<ExpandState>,
    value: Mutex<Option<String>>,
    legacy_description: Option<String>,
    legacy_default_action: Option<String>,
    legacy_state: Option<State>,
    children: Vec<Arc<MockElement>>,
    parent: Weak<MockElement>,
    calls: Mutex<Vec<&'static str>>,
    child_queries: AtomicUsize,
}

/// Builder for [`MockElement`] trees.
pub struct MockElementBuilder {
    control_type: i32,
    name: Option<String>,
    props: HashMap<UiaProperty, String>,
    rect: Rect,
    native_window: Option<WindowHandle>,
    flags: ElementFlags,
    patterns: Patterns,
    expand_state: ExpandState,
    value: Option<String>,
    legacy_description: Option<String>,
    legacy_default_action: Option<String>,
    legacy_state: Option<State>,
    children: Vec<MockElementBuilder>,
}

impl MockElementBuilder {
    pub fn property(mut self, prop: UiaProperty, value: &str) -> Self {
        self.props.insert(prop, value.to_owned());
        self
    }

    pub fn rect(mut self, rect: Rect) -> Self {
        self.rect = rect;
        self
    }

    pub fn native_window(mut self, w: WindowHandle) -> Self {
        self.native_window = Some(w);
        self
    }

    pub fn flags(mut self, flags: ElementFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn invokable(mut self) -> Self {
        self.patterns |= Patterns::INVOKE;
        self
    }

    pub fn toggleable(mut self) -> Self {
        self.patterns |= Patterns::TOGGLE;
        self
    }

    pub fn expandable(mut self, state: ExpandState) -> Self {
        self.patterns |= Patterns::EXPAND;
        self.expand_state = state;
        self
    }

    pub fn selectable(mut self) -> Self {
        self.patterns |= Patterns::SELECT;
        self
    }

    pub fn scrollable(mut self) -> Self {
        self.patterns |= Patterns::SCROLL;
        self
    }

    pub fn value(mut self, value: &str) -> Self {
        self.patterns |= Patterns::VALUE;
        self.value = Some(value.to_owned());
        self
    }

    pub fn legacy_description(mut self, d: &str) -> Self {
        self.patterns |= Patterns::LEGACY;
        self.legacy_description = Some(d.to_owned());
        self
    }

    pub fn legacy_default_action(mut self, a: &str) -> Self {
        self.patterns |= Patterns::LEGACY;
        self.legacy_default_action = Some(a.to_owned());
        self
    }

    pub fn legacy_state(mut self, s: State) -> Self {
        self.patterns |= Patterns::LEGACY;
        self.legacy_state = Some(s);
        self
    }

    pub fn child(mut self, child: MockElementBuilder) -> Self {
        self.children.push(child);
        self
    }

    pub fn finish(self) -> Arc<MockElement> {
        self.finish_with(Weak::new())
    }

    fn finish_with(self, parent: Weak<MockElement>) -> Arc<MockElement> {
        Arc::new_cyclic(|me| MockElement {
            control_type: self.control_type,
            name: self.name,
            props: self.props,
            rect: self.rect,
            native_window: self.native_window,
            flags: self.flags,
            patterns: self.patterns,
            expand_state: Mutex::new(self.expand_state),
            value: Mutex::new(self.value),
            legacy_description: self.legacy_description,
            legacy_default_action: self.legacy_default_action,
            legacy_state: self.legacy_state,
            children: self
                .children
                .into_iter()
                .map(|c| c.finish_with(me.clone()))
                .collect(),
            parent,
            calls: Mutex::new(Vec::new()),
            child_queries: AtomicUsize::new(0),
        })
    }
}

impl MockElement {
    pub fn build(control_type: i32, name: &str) -> MockElementBuilder {
        MockElementBuilder {
            control_type,
            name: Some(name.to_owned()),
            props: HashMap::new(),
            rect: Rect::default(),
            native_window: None,
            flags: ElementFlags::ENABLED,
            patterns: Patterns::empty(),
            expand_state: ExpandState::LeafNode,
            value: None,
            legacy_description: None,
            legacy_default_action: None,
            legacy_state: None,
            children: Vec::new(),
        }
    }

    pub fn child_at(&self, i: usize) -> Option<Arc<MockElement>> {
        self.children.get(i).cloned()
    }

    /// Pattern methods called so far, in order.
    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().clone()
    }

    pub fn set_expand_state(&self, state: ExpandState) {
        *self.expand_state.lock() = state;
    }

    /// How many times the child list was queried.
    pub fn child_queries(&self) -> usize {
        self.child_queries.load(Ordering::Relaxed)
    }

    fn pattern(&self, p: Patterns, call: &'static str) -> Result<()> {
        if !self.patterns.contains(p) {
            return Err(Error::NotSupported);
        }
        self.calls.lock().push(call);
        Ok(())
    }

    fn sibling(&self, offset: isize) -> Option<ElementRef> {
        let parent = self.parent.upgrade()?;
        let pos = parent
            .children
            .iter()
            .position(|c| std::ptr::eq(Arc::as_ptr(c), self))?;
        let at = pos.checked_add_signed(offset)?;
        parent.children.get(at).map(|c| c.clone() as ElementRef)
    }
}

impl std::fmt::Debug for MockElement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockElement")
            .field("control_type", &self.control_type)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl UiaElement for MockElement {
    fn control_type(&self) -> Result<i32> {
        Ok(self.control_type)
    }

    fn name(&self) -> Result<Option<String>> {
        Ok(self.name.clone())
    }

    fn property(&self, prop: UiaProperty) -> Result<Option<String>> {
        Ok(self.props.get(&prop).cloned())
    }

    fn bounding_rect(&self) -> Result<Rect> {
        Ok(self.rect)
    }

    fn native_window(&self) -> Result<Option<WindowHandle>> {
        Ok(self.native_window)
    }

    fn element_flags(&self) -> Result<ElementFlags> {
        Ok(self.flags)
    }

    fn children(&self) -> Result<Vec<ElementRef>> {
        self.child_queries.fetch_add(1, Ordering::Relaxed);
        Ok(self
            .children
            .iter()
            .map(|c| c.clone() as ElementRef)
            .collect())
    }

    fn walk(&self, step: WalkStep) -> Result<Option<ElementRef>> {
        Ok(match step {
            WalkStep::Parent => self.parent.upgrade().map(|p| p as ElementRef),
            WalkStep::Next => self.sibling(1),
            WalkStep::Previous => self.sibling(-1),
            WalkStep::FirstChild => self.children.first().map(|c| c.clone() as ElementRef),
            WalkStep::LastChild => self.children.last().map(|c| c.clone() as ElementRef),
        })
    }

    fn set_focus(&self) -> Result<()> {
        self.calls.lock().push("set_focus");
        Ok(())
    }

    fn value(&self) -> Result<Option<String>> {
        if !self.patterns.contains(Patterns::VALUE) {
            return Err(Error::NotSupported);
        }
        Ok(self.value.lock().clone())
    }

    fn set_value(&self, value: &str) -> Result<()> {
        self.pattern(Patterns::VALUE, "set_value")?;
        *self.value.lock() = Some(value.to_owned());
        Ok(())
    }

    fn invoke(&self) -> Result<()> {
        self.pattern(Patterns::INVOKE, "invoke")
    }

    fn toggle(&self) -> Result<()> {
        self.pattern(Patterns::TOGGLE, "toggle")
    }

    fn expand_state(&self) -> Result<ExpandState> {
        if !self.patterns.contains(Patterns::EXPAND) {
            return Err(Error::NotSupported);
        }
        Ok(*self.expand_state.lock())
    }

    fn expand(&self) -> Result<()> {
        self.pattern(Patterns::EXPAND, "expand")?;
        *self.expand_state.lock() = ExpandState::Expanded;
        Ok(())
    }

    fn collapse(&self) -> Result<()> {
        self.pattern(Patterns::EXPAND, "collapse")?;
        *self.expand_state.lock() = ExpandState::Collapsed;
        Ok(())
    }

    fn select(&self) -> Result<()> {
        self.pattern(Patterns::SELECT, "select")
    }

    fn add_to_selection(&self) -> Result<()> {
        self.pattern(Patterns::SELECT, "add_to_selection")
    }

    fn remove_from_selection(&self) -> Result<()> {
        self.pattern(Patterns::SELECT, "remove_from_selection")
    }

    fn scroll_into_view(&self) -> Result<()> {
        self.pattern(Patterns::SCROLL, "scroll_into_view")
    }

    fn legacy_description(&self) -> Result<Option<String>> {
        if !self.patterns.contains(Patterns::LEGACY) {
            return Err(Error::NotSupported);
        }
        Ok(self.legacy_description.clone())
    }

    fn legacy_default_action(&self) -> Result<Option<String>> {
        if !self.patterns.contains(Patterns::LEGACY) {
            return Err(Error::NotSupported);
        }
        Ok(self.legacy_default_action.clone())
    }

    fn legacy_state(&self) -> Result<State> {
        self.legacy_state.ok_or(Error::NotSupported)
    }

    fn legacy_do_default_action(&self) -> Result<()> {
        self.pattern(Patterns::LEGACY, "legacy_default_action")
    }
}

// ---------------------------------------------------------------------------
// Desktop
// ---------------------------------------------------------------------------

/// One window of a [`MockDesktop`].
#[derive(Debug, Clone)]
pub struct MockWindow {
    handle: WindowHandle,
    class: String,
    name: String,
    parent: Option<WindowHandle>,
    popup: bool,
    visible: bool,
    control_id: i32,
    winforms_name: Option<String>,
    rect: Rect,
    client: Option<Rect>,
    this_thread: bool,
    dpi_percent: Option<i32>,
    legacy: HashMap<ObjectId, NodeRef>,
    modern: Option<ElementRef>,
    java: Option<NodeRef>,
    java_focused: Option<NodeRef>,
}

impl MockWindow {
    fn new(handle: WindowHandle, class: &str, parent: Option<WindowHandle>) -> Self {
        Self {
            handle,
            class: class.to_owned(),
            name: String::new(),
            parent,
            popup: false,
            visible: true,
            control_id: 0,
            winforms_name: None,
            rect: Rect::new(0, 0, 800, 600),
            client: None,
            this_thread: false,
            dpi_percent: None,
            legacy: HashMap::new(),
            modern: None,
            java: None,
            java_focused: None,
        }
    }

    pub fn top_level(handle: WindowHandle, class: &str) -> Self {
        Self::new(handle, class, None)
    }

    pub fn child(handle: WindowHandle, class: &str, parent: WindowHandle) -> Self {
        Self::new(handle, class, Some(parent))
    }

    pub fn name(mut self, name: &str) -> Self {
        self.name = name.to_owned();
        self
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    pub fn popup(mut self) -> Self {
        self.popup = true;
        self
    }

    pub fn control_id(mut self, id: i32) -> Self {
        self.control_id = id;
        self
    }

    pub fn winforms_name(mut self, name: &str) -> Self {
        self.winforms_name = Some(name.to_owned());
        self
    }

    pub fn rect(mut self, rect: Rect) -> Self {
        self.rect = rect;
        self
    }

    pub fn client_rect(mut self, rect: Rect) -> Self {
        self.client = Some(rect);
        self
    }

    pub fn this_thread(mut self) -> Self {
        self.this_thread = true;
        self
    }

    /// The system scales the window by `percent`.
    pub fn dpi_scaled(mut self, percent: i32) -> Self {
        self.dpi_percent = Some(percent);
        self
    }

    pub fn legacy(mut self, id: ObjectId, node: NodeRef) -> Self {
        self.legacy.insert(id, node);
        self
    }

    /// The client object; also serves as the window object unless one is set.
    pub fn client(self, node: NodeRef) -> Self {
        self.legacy(ObjectId::CLIENT, node)
    }

    pub fn modern(mut self, element: ElementRef) -> Self {
        self.modern = Some(element);
        self
    }

    pub fn java(mut self, root: NodeRef, focused: Option<NodeRef>) -> Self {
        self.java = Some(root);
        self.java_focused = focused;
        self
    }
}

struct PointTarget {
    rect: Rect,
    legacy: Option<(NodeRef, i32)>,
    modern: Option<ElementRef>,
}

/// An in-memory desktop.
#[derive(Default)]
pub struct MockDesktop {
    windows: RwLock<Vec<MockWindow>>,
    targets: RwLock<Vec<PointTarget>>,
    scripted_points: Mutex<VecDeque<WindowHandle>>,
    foreground: RwLock<Option<WindowHandle>>,
    modern_focus: RwLock<Option<ElementRef>>,
    sleeps: Mutex<Vec<Duration>>,
}

impl MockDesktop {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_window(&self, w: MockWindow) {
        self.windows.write().push(w);
    }

    /// Destroy a window and its descendants.
    pub fn remove_window(&self, h: WindowHandle) {
        let doomed: Vec<WindowHandle> = std::iter::once(h)
            .chain(self.child_windows(h))
            .collect();
        self.windows.write().retain(|w| !doomed.contains(&w.handle));
    }

    /// Objects reported for points inside `rect`. Later targets win.
    pub fn add_point_target(
        &self,
        rect: Rect,
        legacy: Option<(NodeRef, i32)>,
        modern: Option<ElementRef>,
    ) {
        self.targets.write().push(PointTarget {
            rect,
            legacy,
            modern,
        });
    }

    /// Answers for the next `window_from_point` calls, before geometry is
    /// consulted.
    pub fn script_window_from_point(&self, windows: impl IntoIterator<Item = WindowHandle>) {
        self.scripted_points.lock().extend(windows);
    }

    pub fn set_foreground(&self, w: Option<WindowHandle>) {
        *self.foreground.write() = w;
    }

    pub fn set_modern_focus(&self, e: Option<ElementRef>) {
        *self.modern_focus.write() = e;
    }

    /// Sleeps requested so far.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().clone()
    }

    fn with_window<T>(&self, h: WindowHandle, f: impl FnOnce(&MockWindow) -> T) -> Option<T> {
        self.windows.read().iter().find(|w| w.handle == h).map(f)
    }

    fn depth(&self, h: WindowHandle) -> usize {
        let mut depth = 0;
        let mut cur = self.parent(h);
        while let Some(p) = cur {
            depth += 1;
            cur = self.parent(p);
        }
        depth
    }

    fn direct_children(&self, h: WindowHandle) -> Vec<WindowHandle> {
        self.windows
            .read()
            .iter()
            .filter(|w| w.parent == Some(h))
            .map(|w| w.handle)
            .collect()
    }

    fn scale(&self, h: WindowHandle) -> Option<i32> {
        self.with_window(h, |w| w.dpi_percent).flatten()
    }
}

fn scale_rect(r: Rect, num: i32, den: i32) -> Rect {
    Rect::new(r.left * num / den, r.top * num / den, r.right * num / den, r.bottom * num / den)
}

impl WindowSystem for MockDesktop {
    fn is_window(&self, w: WindowHandle) -> bool {
        self.with_window(w, |_| ()).is_some()
    }

    fn class_name(&self, w: WindowHandle) -> Option<String> {
        self.with_window(w, |w| w.class.clone())
    }

    fn window_name(&self, w: WindowHandle) -> Option<String> {
        self.with_window(w, |w| w.name.clone())
    }

    fn is_child(&self, w: WindowHandle) -> bool {
        self.with_window(w, |w| w.parent.is_some()).unwrap_or(false)
    }

    fn is_popup(&self, w: WindowHandle) -> bool {
        self.with_window(w, |w| w.popup).unwrap_or(false)
    }

    fn is_visible(&self, w: WindowHandle) -> bool {
        self.with_window(w, |w| w.visible).unwrap_or(false)
    }

    fn is_visible_in_window(&self, c: WindowHandle, top: WindowHandle) -> bool {
        let mut cur = Some(c);
        while let Some(w) = cur {
            if w == top {
                return true;
            }
            if !self.is_visible(w) {
                return false;
            }
            cur = self.parent(w);
        }
        false
    }

    fn parent(&self, w: WindowHandle) -> Option<WindowHandle> {
        self.with_window(w, |w| w.parent).flatten()
    }

    fn root(&self, w: WindowHandle) -> Option<WindowHandle> {
        if !self.is_window(w) {
            return None;
        }
        let mut cur = w;
        while let Some(p) = self.parent(cur) {
            cur = p;
        }
        Some(cur)
    }

    fn child_windows(&self, w: WindowHandle) -> Vec<WindowHandle> {
        let mut out = Vec::new();
        for c in self.direct_children(w) {
            out.push(c);
            out.extend(self.child_windows(c));
        }
        out
    }

    fn is_only_child(&self, w: WindowHandle) -> bool {
        self.parent(w)
            .is_some_and(|p| self.direct_children(p).len() == 1)
    }

    fn control_id(&self, w: WindowHandle) -> i32 {
        self.with_window(w, |w| w.control_id).unwrap_or(0)
    }

    fn winforms_name(&self, w: WindowHandle) -> Option<String> {
        self.with_window(w, |w| w.winforms_name.clone()).flatten()
    }

    fn window_rect(&self, w: WindowHandle) -> Option<Rect> {
        self.with_window(w, |w| w.rect)
    }

    fn client_rect(&self, w: WindowHandle) -> Option<Rect> {
        self.with_window(w, |w| w.client.unwrap_or(w.rect))
    }

    fn logical_window_rect(&self, w: WindowHandle) -> Option<Rect> {
        let rect = self.window_rect(w)?;
        Some(match self.scale(w) {
            Some(percent) => scale_rect(rect, 100, percent),
            None => rect,
        })
    }

    fn window_from_point(&self, p: Point) -> Option<WindowHandle> {
        if let Some(w) = self.scripted_points.lock().pop_front() {
            return Some(w);
        }
        let candidates: Vec<WindowHandle> = self
            .windows
            .read()
            .iter()
            .filter(|w| w.rect.contains(p))
            .map(|w| w.handle)
            .collect();
        candidates
            .into_iter()
            .filter(|&w| {
                self.root(w)
                    .is_some_and(|top| self.is_visible(top) && self.is_visible_in_window(w, top))
            })
            .max_by_key(|&w| self.depth(w))
    }

    fn is_of_this_thread(&self, w: WindowHandle) -> bool {
        self.with_window(w, |w| w.this_thread).unwrap_or(false)
    }

    fn foreground_window(&self) -> Option<WindowHandle> {
        *self.foreground.read()
    }

    fn is_dpi_scaled(&self, w: WindowHandle) -> bool {
        self.scale(w).is_some()
    }

    fn logical_to_physical(&self, w: WindowHandle, r: Rect) -> Option<Rect> {
        Some(match self.scale(w) {
            Some(percent) => scale_rect(r, percent, 100),
            None => r,
        })
    }

    fn physical_to_logical(&self, w: WindowHandle, p: Point) -> Option<Point> {
        if !self.is_window(w) {
            return None;
        }
        Some(match self.scale(w) {
            Some(percent) => Point::new(p.x * 100 / percent, p.y * 100 / percent),
            None => p,
        })
    }

    fn sleep(&self, d: Duration) {
        self.sleeps.lock().push(d);
    }
}

impl BackendResolver for MockDesktop {
    fn legacy_from_window(&self, w: WindowHandle, id: ObjectId) -> Result<NodeRef> {
        let found = self
            .with_window(w, |win| {
                win.legacy.get(&id).cloned().or_else(|| {
                    (id == ObjectId::WINDOW)
                        .then(|| win.legacy.get(&ObjectId::CLIENT).cloned())
                        .flatten()
                })
            })
            .ok_or(Error::WindowGone)?;
        found.ok_or(Error::NotFound)
    }

    fn legacy_from_point(&self, p: Point) -> Result<(NodeRef, i32)> {
        self.targets
            .read()
            .iter()
            .rev()
            .filter(|t| t.rect.contains(p))
            .find_map(|t| t.legacy.clone())
            .ok_or(Error::NotFound)
    }

    fn modern_from_window(&self, w: WindowHandle) -> Result<ElementRef> {
        self.with_window(w, |win| win.modern.clone())
            .ok_or(Error::WindowGone)?
            .ok_or(Error::NotFound)
    }

    fn modern_from_point(&self, p: Point) -> Result<ElementRef> {
        self.targets
            .read()
            .iter()
            .rev()
            .filter(|t| t.rect.contains(p))
            .find_map(|t| t.modern.clone())
            .ok_or(Error::NotFound)
    }

    fn modern_focused(&self) -> Result<ElementRef> {
        self.modern_focus.read().clone().ok_or(Error::NotFound)
    }

    fn java_from_window(&self, w: WindowHandle, focused: bool) -> Option<NodeRef> {
        self.with_window(w, |win| {
            if focused {
                win.java_focused.clone()
            } else {
                win.java.clone()
            }
        })
        .flatten()
    }

    fn java_from_point(&self, _p: Point, w: WindowHandle) -> Option<NodeRef> {
        self.java_from_window(w, false)
    }
}

static_assertions::assert_impl_all!(MockDesktop: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tree_links() {
        let root = MockNode::build(Role::CLIENT, "root")
            .window(WindowHandle(0x10))
            .child(MockNode::build(Role::LIST, "list").item(MockItem::new(Role::LISTITEM, "a")))
            .child(MockNode::build(Role::PUSHBUTTON, "OK"))
            .finish();
        let list = root.find("list").unwrap();
        assert_eq!(list.window(), Some(WindowHandle(0x10)));
        assert!(list.parent().unwrap().is_some());
        let Some(Child::Node(next)) = list.navigate(NavDir::NEXT, 0).unwrap() else {
            panic!("expected a sibling");
        };
        assert_eq!(next.name(0).unwrap().as_deref(), Some("OK"));
        assert_eq!(list.name(1).unwrap().as_deref(), Some("a"));
        assert!(matches!(list.children().unwrap()[..], [Child::Element(1)]));
    }

    #[test]
    fn test_window_from_point_prefers_deepest() {
        let d = MockDesktop::new();
        d.add_window(MockWindow::top_level(WindowHandle(1), "Top").rect(Rect::new(0, 0, 100, 100)));
        d.add_window(
            MockWindow::child(WindowHandle(2), "Edit", WindowHandle(1)).rect(Rect::new(10, 10, 50, 50)),
        );
        assert_eq!(d.window_from_point(Point::new(20, 20)), Some(WindowHandle(2)));
        assert_eq!(d.window_from_point(Point::new(80, 80)), Some(WindowHandle(1)));
        assert_eq!(d.window_from_point(Point::new(200, 200)), None);
    }

    #[test]
    fn test_remove_window_takes_descendants() {
        let d = MockDesktop::new();
        d.add_window(MockWindow::top_level(WindowHandle(1), "Top"));
        d.add_window(MockWindow::child(WindowHandle(2), "A", WindowHandle(1)));
        d.add_window(MockWindow::child(WindowHandle(3), "B", WindowHandle(2)));
        assert_eq!(d.child_windows(WindowHandle(1)), vec![WindowHandle(2), WindowHandle(3)]);
        d.remove_window(WindowHandle(2));
        assert!(!d.is_window(WindowHandle(3)));
        assert!(d.is_window(WindowHandle(1)));
    }
}
