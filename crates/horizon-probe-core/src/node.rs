//! The backend-neutral accessible node interface.
//!
//! Every backend (legacy tree, modern tree through the unification shim, Java
//! access bridge) exposes its nodes as [`AccessibleNode`] trait objects. A node
//! answers for itself (`elem == 0`) and for its simple sub-elements
//! (`elem > 0`), which have no node of their own.
//!
//! Per-node failures are reported as errors; the find engine treats them as
//! "does not match" and keeps walking.

use std::fmt;
use std::sync::Arc;

use crate::dom::DomNode;
use crate::error::{Error, Result};
use crate::flags::{NavDir, SelectFlags};
use crate::geometry::{Point, Rect};
use crate::role::RoleValue;
use crate::state::State;
use crate::window::WindowHandle;

/// Shared, reference-counted node. Cloning is the AddRef, dropping the Release.
pub type NodeRef = Arc<dyn AccessibleNode>;

/// Which backend produced a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    /// The legacy COM-style tree.
    Legacy,
    /// The modern UI Automation tree, presented through the unification shim.
    Modern,
    /// The Java access bridge tree.
    Java,
}

/// A child as returned by [`AccessibleNode::children`] and navigation.
#[derive(Debug, Clone)]
pub enum Child {
    /// A full node with its own interface.
    Node(NodeRef),
    /// A simple sub-element of the queried node, addressed by 1-based index.
    Element(i32),
}

/// String properties readable from any node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StringProp {
    Name,
    Value,
    Description,
    Help,
    DefaultAction,
    KeyboardShortcut,
    /// Modern backend automation id.
    AutomationId,
    /// Modern backend class name.
    ClassName,
}

impl StringProp {
    /// The property name used in find `prop` strings.
    pub fn prop_name(self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Value => "value",
            Self::Description => "desc",
            Self::Help => "help",
            Self::DefaultAction => "action",
            Self::KeyboardShortcut => "key",
            Self::AutomationId => "uiaid",
            Self::ClassName => "uiacn",
        }
    }

    /// Inverse of [`StringProp::prop_name`].
    pub fn from_prop_name(name: &str) -> Option<Self> {
        Some(match name {
            "name" => Self::Name,
            "value" => Self::Value,
            "desc" => Self::Description,
            "help" => Self::Help,
            "action" => Self::DefaultAction,
            "key" => Self::KeyboardShortcut,
            "uiaid" => Self::AutomationId,
            "uiacn" => Self::ClassName,
            _ => return None,
        })
    }
}

/// Actions beyond the default action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpecialAction {
    ScrollIntoView,
    Check,
    Expand,
    Collapse,
}

/// One node of an accessible tree.
///
/// Methods taking `elem` address the node itself when `elem == 0` and a
/// simple sub-element otherwise.
pub trait AccessibleNode: Send + Sync + fmt::Debug {
    /// The backend this node belongs to.
    fn backend(&self) -> BackendKind {
        BackendKind::Legacy
    }

    fn parent(&self) -> Result<Option<NodeRef>>;

    fn child_count(&self) -> Result<usize>;

    /// All children in backend order.
    fn children(&self) -> Result<Vec<Child>>;

    fn string_prop(&self, prop: StringProp, elem: i32) -> Result<Option<String>>;

    fn role(&self, elem: i32) -> Result<RoleValue>;

    fn state(&self, elem: i32) -> Result<State>;

    /// Screen rectangle.
    fn location(&self, elem: i32) -> Result<Rect>;

    /// Spatial or logical navigation. `Ok(None)` means there is nothing in
    /// that direction.
    fn navigate(&self, dir: NavDir, elem: i32) -> Result<Option<Child>>;

    /// The child (or the node itself, as `Element(0)`) at a screen point.
    fn hit_test(&self, _point: Point) -> Result<Option<Child>> {
        Err(Error::NotSupported)
    }

    /// The focused child, or `Element(0)` if the node itself is focused.
    fn focus(&self) -> Result<Option<Child>> {
        Err(Error::NotSupported)
    }

    fn do_default_action(&self, elem: i32) -> Result<()>;

    fn do_special_action(&self, _action: SpecialAction, _elem: i32) -> Result<()> {
        Err(Error::NotSupported)
    }

    fn set_value(&self, _elem: i32, _value: &str) -> Result<()> {
        Err(Error::NotSupported)
    }

    fn select(&self, _elem: i32, _flags: SelectFlags) -> Result<()> {
        Err(Error::NotSupported)
    }

    /// The native window that hosts this node.
    fn window(&self) -> Option<WindowHandle> {
        None
    }

    /// The DOM node behind this object, for browser engines that expose one.
    fn dom(&self) -> Option<Arc<dyn DomNode>> {
        None
    }

    fn name(&self, elem: i32) -> Result<Option<String>> {
        self.string_prop(StringProp::Name, elem)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prop_names_round_trip() {
        for p in [
            StringProp::Name,
            StringProp::Value,
            StringProp::Description,
            StringProp::Help,
            StringProp::DefaultAction,
            StringProp::KeyboardShortcut,
            StringProp::AutomationId,
            StringProp::ClassName,
        ] {
            assert_eq!(StringProp::from_prop_name(p.prop_name()), Some(p));
        }
        assert_eq!(StringProp::from_prop_name("state"), None);
    }
}
