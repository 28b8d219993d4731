//! Modern backend presented as legacy accessible nodes.
//!
//! [`UiaAccessible`] wraps one [`UiaElement`] of the modern (UI Automation)
//! tree and implements [`AccessibleNode`], so the find engine, resolvers and
//! result stream handle both backends the same way.
//!
//! Properties try the modern source first and fall back to the element's
//! legacy pattern:
//!
//! | selector | modern source | fallback |
//! |---|---|---|
//! | description | full description | legacy description |
//! | value | value pattern | |
//! | help | help text | |
//! | keyboard shortcut | accelerator key | access key |
//! | default action | | legacy default action |
//! | state | | legacy state, then element flags |
//!
//! Modern elements have no sub-elements: any `elem` other than 0 is an
//! invalid parameter.
//!
//! # Element lifetime
//!
//! Every live wrapper is counted. A broker must not be unloaded while
//! [`live_wrappers`] is non-zero, because callers may still hold references
//! that will be released later; [`can_unload`] checks this and logs the
//! reason.
//!
//! # Example
//!
//! ```ignore
//! use horizon_probe::shim::UiaAccessible;
//!
//! let node = UiaAccessible::new(element, config.shim.child_cache_ttl());
//! let role = node.role(0)?;
//! ```

pub mod control_type;

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use horizon_probe_core::logging::targets;
use horizon_probe_core::{
    AccessibleNode, BackendKind, Child, Error, NavDir, NodeRef, Rect, Result, RoleValue,
    SelectFlags, SpecialAction, State, StringProp, WindowHandle,
};

/// Shared modern element reference.
pub type ElementRef = Arc<dyn UiaElement>;

/// Properties read with a plain property query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UiaProperty {
    FullDescription,
    HelpText,
    AcceleratorKey,
    AccessKey,
    AutomationId,
    ClassName,
}

/// Steps of the control-view tree walker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WalkStep {
    Parent,
    Next,
    Previous,
    FirstChild,
    LastChild,
}

/// Expand/collapse pattern state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExpandState {
    Collapsed,
    Expanded,
    PartiallyExpanded,
    LeafNode,
}

bitflags::bitflags! {
    /// Boolean element properties, used when an element has no legacy state.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct ElementFlags: u8 {
        const OFFSCREEN = 1;
        const ENABLED = 2;
        const KEYBOARD_FOCUSABLE = 4;
        const HAS_KEYBOARD_FOCUS = 8;
    }
}

/// One element of the modern tree.
///
/// Pattern methods return [`Error::NotSupported`] when the element does not
/// have the pattern; any other error means the pattern exists but the call
/// failed.
pub trait UiaElement: Send + Sync + fmt::Debug {
    fn control_type(&self) -> Result<i32>;

    fn name(&self) -> Result<Option<String>>;

    fn property(&self, prop: UiaProperty) -> Result<Option<String>>;

    fn bounding_rect(&self) -> Result<Rect>;

    /// The native window of this element itself, if it has one.
    fn native_window(&self) -> Result<Option<WindowHandle>>;

    fn element_flags(&self) -> Result<ElementFlags>;

    /// Children in the control view.
    fn children(&self) -> Result<Vec<ElementRef>>;

    /// Walk the control view. `Ok(None)` if there is nothing in that direction.
    fn walk(&self, step: WalkStep) -> Result<Option<ElementRef>>;

    fn set_focus(&self) -> Result<()>;

    fn value(&self) -> Result<Option<String>> {
        Err(Error::NotSupported)
    }

    fn set_value(&self, _value: &str) -> Result<()> {
        Err(Error::NotSupported)
    }

    fn invoke(&self) -> Result<()> {
        Err(Error::NotSupported)
    }

    fn toggle(&self) -> Result<()> {
        Err(Error::NotSupported)
    }

    fn expand_state(&self) -> Result<ExpandState> {
        Err(Error::NotSupported)
    }

    fn expand(&self) -> Result<()> {
        Err(Error::NotSupported)
    }

    fn collapse(&self) -> Result<()> {
        Err(Error::NotSupported)
    }

    /// Selection item pattern: select only this item.
    fn select(&self) -> Result<()> {
        Err(Error::NotSupported)
    }

    fn add_to_selection(&self) -> Result<()> {
        Err(Error::NotSupported)
    }

    fn remove_from_selection(&self) -> Result<()> {
        Err(Error::NotSupported)
    }

    fn scroll_into_view(&self) -> Result<()> {
        Err(Error::NotSupported)
    }

    fn legacy_description(&self) -> Result<Option<String>> {
        Err(Error::NotSupported)
    }

    fn legacy_default_action(&self) -> Result<Option<String>> {
        Err(Error::NotSupported)
    }

    fn legacy_state(&self) -> Result<State> {
        Err(Error::NotSupported)
    }

    fn legacy_do_default_action(&self) -> Result<()> {
        Err(Error::NotSupported)
    }
}

static LIVE_WRAPPERS: AtomicUsize = AtomicUsize::new(0);

/// Number of [`UiaAccessible`] wrappers alive in this process.
pub fn live_wrappers() -> usize {
    LIVE_WRAPPERS.load(Ordering::Acquire)
}

/// Whether the process may drop broker code. False while wrappers are alive.
pub fn can_unload() -> bool {
    let n = live_wrappers();
    if n != 0 {
        tracing::warn!(target: targets::SHIM, live = n, "cannot unload: modern backend wrappers are alive");
    }
    n == 0
}

struct ChildCache {
    taken: Instant,
    children: Vec<ElementRef>,
}

/// A modern element presented as an [`AccessibleNode`].
pub struct UiaAccessible {
    element: ElementRef,
    ttl: Duration,
    children: Mutex<Option<ChildCache>>,
}

impl UiaAccessible {
    /// Wrap an element. Child lists are reused for `child_cache_ttl`.
    pub fn new(element: ElementRef, child_cache_ttl: Duration) -> Self {
        LIVE_WRAPPERS.fetch_add(1, Ordering::AcqRel);
        Self {
            element,
            ttl: child_cache_ttl,
            children: Mutex::new(None),
        }
    }

    /// Wrap an element as a shared node.
    pub fn node(element: ElementRef, child_cache_ttl: Duration) -> NodeRef {
        Arc::new(Self::new(element, child_cache_ttl))
    }

    pub fn element(&self) -> &ElementRef {
        &self.element
    }

    fn wrap(&self, element: ElementRef) -> NodeRef {
        Self::node(element, self.ttl)
    }

    fn check_elem(elem: i32) -> Result<()> {
        if elem == 0 {
            Ok(())
        } else {
            Err(Error::invalid_parameter(
                "Modern backend objects have no sub-elements.",
            ))
        }
    }

    fn cached_children(&self) -> Result<Vec<ElementRef>> {
        let mut cache = self.children.lock();
        if let Some(c) = cache.as_ref() {
            if c.taken.elapsed() < self.ttl {
                return Ok(c.children.clone());
            }
        }
        let children = self.element.children()?;
        *cache = Some(ChildCache {
            taken: Instant::now(),
            children: children.clone(),
        });
        Ok(children)
    }

    fn description(&self) -> Result<Option<String>> {
        match self.element.property(UiaProperty::FullDescription)? {
            Some(d) if !d.is_empty() => Ok(Some(d)),
            _ => self.element.legacy_description(),
        }
    }

    fn keyboard_shortcut(&self) -> Result<Option<String>> {
        match self.element.property(UiaProperty::AcceleratorKey)? {
            Some(k) if !k.is_empty() => Ok(Some(k)),
            _ => self.element.property(UiaProperty::AccessKey),
        }
    }

    fn derived_state(&self) -> Result<State> {
        let flags = self.element.element_flags()?;
        let mut state = State::empty();
        if flags.contains(ElementFlags::OFFSCREEN) {
            state |= State::OFFSCREEN;
        }
        if !flags.contains(ElementFlags::ENABLED) {
            state |= State::UNAVAILABLE;
        }
        if flags.contains(ElementFlags::KEYBOARD_FOCUSABLE) {
            state |= State::FOCUSABLE;
        }
        if flags.contains(ElementFlags::HAS_KEYBOARD_FOCUS) {
            state |= State::FOCUSED;
        }
        Ok(state)
    }

    /// Expand (`Some(true)`), collapse (`Some(false)`) or toggle (`None`).
    fn expand_collapse(&self, expand: Option<bool>) -> Result<()> {
        let expand = match expand {
            Some(e) => e,
            None => match self.element.expand_state()? {
                ExpandState::Expanded => false,
                ExpandState::LeafNode => return Ok(()),
                ExpandState::Collapsed | ExpandState::PartiallyExpanded => true,
            },
        };
        if expand {
            self.element.expand()
        } else {
            self.element.collapse()
        }
    }
}

/// Run `actions` in order until one finds its pattern; return its result.
fn first_supported(actions: &[&dyn Fn() -> Result<()>]) -> Result<()> {
    for action in actions {
        match action() {
            Err(Error::NotSupported) => continue,
            r => return r,
        }
    }
    Err(Error::NotSupported)
}

impl Drop for UiaAccessible {
    fn drop(&mut self) {
        LIVE_WRAPPERS.fetch_sub(1, Ordering::AcqRel);
    }
}

impl fmt::Debug for UiaAccessible {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UiaAccessible")
            .field("element", &self.element)
            .finish_non_exhaustive()
    }
}

impl AccessibleNode for UiaAccessible {
    fn backend(&self) -> BackendKind {
        BackendKind::Modern
    }

    fn parent(&self) -> Result<Option<NodeRef>> {
        Ok(self
            .element
            .walk(WalkStep::Parent)?
            .map(|p| self.wrap(p)))
    }

    fn child_count(&self) -> Result<usize> {
        Ok(self.cached_children()?.len())
    }

    fn children(&self) -> Result<Vec<Child>> {
        Ok(self
            .cached_children()?
            .into_iter()
            .map(|e| Child::Node(self.wrap(e)))
            .collect())
    }

    fn string_prop(&self, prop: StringProp, elem: i32) -> Result<Option<String>> {
        Self::check_elem(elem)?;
        match prop {
            StringProp::Name => self.element.name(),
            StringProp::Value => self.element.value(),
            StringProp::Description => self.description(),
            StringProp::Help => self.element.property(UiaProperty::HelpText),
            StringProp::DefaultAction => self.element.legacy_default_action(),
            StringProp::KeyboardShortcut => self.keyboard_shortcut(),
            StringProp::AutomationId => self.element.property(UiaProperty::AutomationId),
            StringProp::ClassName => self.element.property(UiaProperty::ClassName),
        }
    }

    fn role(&self, elem: i32) -> Result<RoleValue> {
        Self::check_elem(elem)?;
        Ok(control_type::role_of(self.element.control_type()?))
    }

    fn state(&self, elem: i32) -> Result<State> {
        Self::check_elem(elem)?;
        match self.element.legacy_state() {
            Err(Error::NotSupported) => self.derived_state(),
            r => r,
        }
    }

    fn location(&self, elem: i32) -> Result<Rect> {
        Self::check_elem(elem)?;
        self.element.bounding_rect()
    }

    fn navigate(&self, dir: NavDir, elem: i32) -> Result<Option<Child>> {
        Self::check_elem(elem)?;
        let step = match dir {
            NavDir::NEXT => WalkStep::Next,
            NavDir::PREVIOUS => WalkStep::Previous,
            NavDir::FIRST_CHILD => WalkStep::FirstChild,
            NavDir::LAST_CHILD => WalkStep::LastChild,
            NavDir::UP | NavDir::DOWN | NavDir::LEFT | NavDir::RIGHT => return Ok(None),
            other => {
                return Err(Error::invalid_parameter(format!(
                    "Navigation code {} is not supported by modern backend objects.",
                    other.0
                )));
            }
        };
        Ok(self.element.walk(step)?.map(|e| Child::Node(self.wrap(e))))
    }

    fn do_default_action(&self, elem: i32) -> Result<()> {
        Self::check_elem(elem)?;
        let e = &self.element;
        let actions: [&dyn Fn() -> Result<()>; 5] = [
            &|| e.invoke(),
            &|| e.toggle(),
            &|| self.expand_collapse(None),
            &|| e.select(),
            &|| e.legacy_do_default_action(),
        ];
        first_supported(&actions)
    }

    fn do_special_action(&self, action: SpecialAction, elem: i32) -> Result<()> {
        Self::check_elem(elem)?;
        let e = &self.element;
        let actions: [&dyn Fn() -> Result<()>; 2] = match action {
            SpecialAction::ScrollIntoView => return e.scroll_into_view(),
            SpecialAction::Check => [&|| e.toggle(), &|| e.invoke()],
            SpecialAction::Expand => [&|| self.expand_collapse(Some(true)), &|| e.toggle()],
            SpecialAction::Collapse => [&|| self.expand_collapse(Some(false)), &|| e.toggle()],
        };
        first_supported(&actions)
    }

    fn set_value(&self, elem: i32, value: &str) -> Result<()> {
        Self::check_elem(elem)?;
        self.element.set_value(value)
    }

    fn select(&self, elem: i32, flags: SelectFlags) -> Result<()> {
        Self::check_elem(elem)?;
        if flags.contains(SelectFlags::EXTEND_SELECTION) {
            return Err(Error::invalid_parameter(
                "Extending the selection is not supported by modern backend objects.",
            ));
        }
        if flags.contains(SelectFlags::TAKE_SELECTION) {
            self.element.select()?;
        }
        if flags.contains(SelectFlags::ADD_SELECTION) {
            self.element.add_to_selection()?;
        }
        if flags.contains(SelectFlags::REMOVE_SELECTION) {
            self.element.remove_from_selection()?;
        }
        if flags.contains(SelectFlags::TAKE_FOCUS) {
            self.element.set_focus()?;
        }
        Ok(())
    }

    fn window(&self) -> Option<WindowHandle> {
        let mut e = self.element.clone();
        loop {
            match e.native_window() {
                Ok(Some(w)) if !w.is_null() => return Some(w),
                Ok(_) => {}
                Err(_) => return None,
            }
            e = e.walk(WalkStep::Parent).ok()??;
        }
    }
}

static_assertions::assert_impl_all!(UiaAccessible: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockElement;
    use horizon_probe_core::Role;

    const TTL: Duration = Duration::from_millis(40);

    #[test]
    fn test_description_falls_back_to_legacy() {
        let e = MockElement::build(control_type::BUTTON, "OK")
            .property(UiaProperty::FullDescription, "")
            .legacy_description("Closes the dialog")
            .finish();
        let node = UiaAccessible::new(e, TTL);
        assert_eq!(
            node.string_prop(StringProp::Description, 0).unwrap().as_deref(),
            Some("Closes the dialog")
        );
    }

    #[test]
    fn test_keyboard_shortcut_prefers_accelerator() {
        let e = MockElement::build(control_type::MENU_ITEM, "Open")
            .property(UiaProperty::AcceleratorKey, "Ctrl+O")
            .property(UiaProperty::AccessKey, "O")
            .finish();
        let node = UiaAccessible::new(e, TTL);
        assert_eq!(
            node.string_prop(StringProp::KeyboardShortcut, 0).unwrap().as_deref(),
            Some("Ctrl+O")
        );

        let e = MockElement::build(control_type::MENU_ITEM, "Open")
            .property(UiaProperty::AccessKey, "O")
            .finish();
        let node = UiaAccessible::new(e, TTL);
        assert_eq!(
            node.string_prop(StringProp::KeyboardShortcut, 0).unwrap().as_deref(),
            Some("O")
        );
    }

    #[test]
    fn test_sub_elements_are_rejected() {
        let node = UiaAccessible::new(MockElement::build(control_type::LIST, "").finish(), TTL);
        assert!(matches!(node.role(1), Err(Error::InvalidParameter(_))));
        assert!(matches!(node.location(3), Err(Error::InvalidParameter(_))));
        assert_eq!(node.role(0).unwrap().role(), Role::LIST);
    }

    #[test]
    fn test_default_action_uses_first_available_pattern() {
        let e = MockElement::build(control_type::TREE_ITEM, "Folder")
            .expandable(ExpandState::Collapsed)
            .selectable()
            .finish();
        let node = UiaAccessible::new(e.clone(), TTL);
        node.do_default_action(0).unwrap();
        assert_eq!(e.calls(), vec!["expand"]);

        e.set_expand_state(ExpandState::Expanded);
        node.do_default_action(0).unwrap();
        assert_eq!(e.calls(), vec!["expand", "collapse"]);

        e.set_expand_state(ExpandState::LeafNode);
        node.do_default_action(0).unwrap();
        assert_eq!(e.calls(), vec!["expand", "collapse"], "leaf nodes do nothing");
    }

    #[test]
    fn test_default_action_without_patterns() {
        let e = MockElement::build(control_type::TEXT, "label").finish();
        let node = UiaAccessible::new(e, TTL);
        assert!(matches!(node.do_default_action(0), Err(Error::NotSupported)));
    }

    #[test]
    fn test_check_falls_back_to_invoke() {
        let e = MockElement::build(control_type::BUTTON, "Bold").invokable().finish();
        let node = UiaAccessible::new(e.clone(), TTL);
        node.do_special_action(SpecialAction::Check, 0).unwrap();
        assert_eq!(e.calls(), vec!["invoke"]);
    }

    #[test]
    fn test_select_rejects_extend_and_orders_focus_last() {
        let e = MockElement::build(control_type::LIST_ITEM, "a").selectable().finish();
        let node = UiaAccessible::new(e.clone(), TTL);
        assert!(matches!(
            node.select(0, SelectFlags::EXTEND_SELECTION),
            Err(Error::InvalidParameter(_))
        ));
        node.select(0, SelectFlags::TAKE_FOCUS | SelectFlags::TAKE_SELECTION)
            .unwrap();
        assert_eq!(e.calls(), vec!["select", "set_focus"]);
    }

    #[test]
    fn test_state_falls_back_to_element_flags() {
        let e = MockElement::build(control_type::EDIT, "")
            .flags(ElementFlags::OFFSCREEN | ElementFlags::KEYBOARD_FOCUSABLE)
            .finish();
        let node = UiaAccessible::new(e, TTL);
        assert_eq!(
            node.state(0).unwrap(),
            State::OFFSCREEN | State::UNAVAILABLE | State::FOCUSABLE
        );

        let e = MockElement::build(control_type::EDIT, "")
            .legacy_state(State::READONLY)
            .finish();
        assert_eq!(UiaAccessible::new(e, TTL).state(0).unwrap(), State::READONLY);
    }

    #[test]
    fn test_children_are_cached() {
        let root = MockElement::build(control_type::LIST, "")
            .child(MockElement::build(control_type::LIST_ITEM, "a"))
            .child(MockElement::build(control_type::LIST_ITEM, "b"))
            .finish();
        let node = UiaAccessible::new(root.clone(), Duration::from_secs(60));
        assert_eq!(node.child_count().unwrap(), 2);
        assert_eq!(node.children().unwrap().len(), 2);
        assert_eq!(root.child_queries(), 1);

        let node = UiaAccessible::new(root.clone(), Duration::ZERO);
        node.child_count().unwrap();
        std::thread::sleep(Duration::from_millis(2));
        node.child_count().unwrap();
        assert_eq!(root.child_queries(), 3);
    }

    #[test]
    fn test_window_walks_to_nearest_native_window() {
        let root = MockElement::build(control_type::WINDOW, "App")
            .native_window(WindowHandle(0x50))
            .child(MockElement::build(control_type::PANE, "")
                .child(MockElement::build(control_type::BUTTON, "OK")))
            .finish();
        let pane = root.child_at(0).unwrap();
        let button = pane.child_at(0).unwrap();
        let node = UiaAccessible::new(button, TTL);
        assert_eq!(node.window(), Some(WindowHandle(0x50)));
    }

    #[test]
    fn test_navigation_codes() {
        let root = MockElement::build(control_type::LIST, "")
            .child(MockElement::build(control_type::LIST_ITEM, "a"))
            .child(MockElement::build(control_type::LIST_ITEM, "b"))
            .finish();
        let a = UiaAccessible::new(root.child_at(0).unwrap(), TTL);
        let Some(Child::Node(b)) = a.navigate(NavDir::NEXT, 0).unwrap() else {
            panic!("expected next sibling");
        };
        assert_eq!(b.name(0).unwrap().as_deref(), Some("b"));
        assert!(a.navigate(NavDir::UP, 0).unwrap().is_none());
        assert!(matches!(
            a.navigate(NavDir(0x1009), 0),
            Err(Error::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_live_wrappers_block_unload() {
        let node = UiaAccessible::new(MockElement::build(control_type::PANE, "").finish(), TTL);
        assert!(live_wrappers() >= 1);
        assert!(!can_unload());
        drop(node);
    }
}
