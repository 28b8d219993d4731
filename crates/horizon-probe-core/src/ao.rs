//! Accessible-object handles.
//!
//! An [`Ao`] is a node reference plus a sub-element index plus a few cached
//! classification bits. It is the value that flows through the find engine,
//! the resolvers and the result stream.
//!
//! # Ownership
//!
//! The node is held by [`NodeRef`], so the reference-counting rules are the
//! ones of [`Arc`](std::sync::Arc): cloning an `Ao` is an AddRef, dropping it
//! is a Release, and moving it transfers ownership. A sub-element handle
//! (`elem != 0`) always holds its parent's node; it never has a node of its
//! own.
//!
//! # Example
//!
//! ```ignore
//! use horizon_probe_core::{Ao, Role};
//!
//! let mut ao = Ao::new(node);
//! ao.ensure_role();
//! if ao.role_byte() == Role::PUSHBUTTON {
//!     ao.do_default_action()?;
//! }
//! ```

use std::fmt;
use std::sync::Arc;

use crate::error::Result;
use crate::flags::MiscFlags;
use crate::geometry::Rect;
use crate::node::{BackendKind, Child, NodeRef, StringProp};
use crate::role::{Role, RoleValue};
use crate::state::State;
use crate::window::WindowHandle;

/// Cached classification of an [`Ao`]. Four bytes on the wire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct AoMisc {
    pub flags: MiscFlags,
    /// [`Role::NONE`] if not computed.
    pub role: Role,
    /// Depth below the search root; 0 if not set.
    pub level: u16,
}

/// An accessible-object handle.
#[derive(Clone)]
pub struct Ao {
    node: NodeRef,
    elem: i32,
    misc: AoMisc,
}

impl Ao {
    /// Wrap a node. The handle takes over the reference.
    pub fn new(node: NodeRef) -> Self {
        Self::with_flags(node, 0, MiscFlags::empty())
    }

    /// Wrap a node or one of its sub-elements with classification flags.
    pub fn with_flags(node: NodeRef, elem: i32, flags: MiscFlags) -> Self {
        Self {
            node,
            elem,
            misc: AoMisc {
                flags,
                ..AoMisc::default()
            },
        }
    }

    /// A child of `parent`. Inherits the in-proc and backend flags.
    pub fn child_of(parent: &Ao, child: Child) -> Self {
        let flags = parent.misc.flags & MiscFlags::INHERIT;
        match child {
            Child::Node(node) => Self::with_flags(node, 0, flags),
            Child::Element(elem) => Self::with_flags(parent.node.clone(), elem, flags),
        }
    }

    /// Resolve a navigation result relative to `self`.
    ///
    /// `Element(0)` means `self`'s node itself.
    pub fn resolve(&self, child: Child) -> Self {
        Self::child_of(self, child)
    }

    pub fn node(&self) -> &NodeRef {
        &self.node
    }

    pub fn elem(&self) -> i32 {
        self.elem
    }

    pub fn misc(&self) -> AoMisc {
        self.misc
    }

    pub fn set_misc(&mut self, misc: AoMisc) {
        self.misc = misc;
    }

    pub fn flags(&self) -> MiscFlags {
        self.misc.flags
    }

    pub fn insert_flags(&mut self, flags: MiscFlags) {
        self.misc.flags |= flags;
    }

    pub fn is_in_proc(&self) -> bool {
        self.misc.flags.contains(MiscFlags::IN_PROC)
    }

    /// The cached role byte. [`Role::NONE`] if not computed yet.
    pub fn role_byte(&self) -> Role {
        self.misc.role
    }

    pub fn set_role_byte(&mut self, role: Role) {
        self.misc.role = role;
    }

    /// Compute and cache the role byte if it is not cached yet.
    ///
    /// Returns [`Role::NONE`] if the backend fails.
    pub fn ensure_role(&mut self) -> Role {
        if self.misc.role == Role::NONE {
            if let Ok(role) = self.node.role(self.elem) {
                self.misc.role = role.role();
            }
        }
        self.misc.role
    }

    pub fn level(&self) -> u16 {
        self.misc.level
    }

    /// Set the level, saturating at `u16::MAX`.
    pub fn set_level(&mut self, level: usize) {
        self.misc.level = u16::try_from(level).unwrap_or(u16::MAX);
    }

    /// Which backend the handle refers to, by its flags.
    pub fn backend(&self) -> BackendKind {
        if self.misc.flags.contains(MiscFlags::UIA) {
            BackendKind::Modern
        } else if self.misc.flags.contains(MiscFlags::JAVA) {
            BackendKind::Java
        } else {
            BackendKind::Legacy
        }
    }

    /// Whether both handles hold the same node, regardless of sub-element.
    pub fn shares_node(&self, other: &Ao) -> bool {
        Arc::ptr_eq(&self.node, &other.node)
    }

    /// Whether both handles address the same object.
    pub fn same_object(&self, other: &Ao) -> bool {
        self.shares_node(other) && self.elem == other.elem
    }

    /// Number of live references to the node. Diagnostic only.
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.node)
    }

    /// Give up the handle, keeping the node.
    pub fn into_node(self) -> NodeRef {
        self.node
    }

    pub fn role(&self) -> Result<RoleValue> {
        self.node.role(self.elem)
    }

    pub fn state(&self) -> Result<State> {
        self.node.state(self.elem)
    }

    pub fn location(&self) -> Result<Rect> {
        self.node.location(self.elem)
    }

    pub fn name(&self) -> Result<Option<String>> {
        self.node.string_prop(StringProp::Name, self.elem)
    }

    pub fn string_prop(&self, prop: StringProp) -> Result<Option<String>> {
        self.node.string_prop(prop, self.elem)
    }

    pub fn do_default_action(&self) -> Result<()> {
        self.node.do_default_action(self.elem)
    }

    pub fn window(&self) -> Option<WindowHandle> {
        self.node.window()
    }
}

impl fmt::Debug for Ao {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ao")
            .field("node", &self.node)
            .field("elem", &self.elem)
            .field("misc", &self.misc)
            .finish()
    }
}

static_assertions::assert_impl_all!(Ao: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::flags::NavDir;

    #[derive(Debug)]
    struct Leaf(Role);

    impl crate::node::AccessibleNode for Leaf {
        fn parent(&self) -> Result<Option<NodeRef>> {
            Ok(None)
        }
        fn child_count(&self) -> Result<usize> {
            Ok(2)
        }
        fn children(&self) -> Result<Vec<Child>> {
            Ok(vec![Child::Element(1), Child::Element(2)])
        }
        fn string_prop(&self, _prop: StringProp, _elem: i32) -> Result<Option<String>> {
            Ok(None)
        }
        fn role(&self, elem: i32) -> Result<RoleValue> {
            if elem == 0 {
                Ok(self.0.into())
            } else {
                Ok(Role::LISTITEM.into())
            }
        }
        fn state(&self, _elem: i32) -> Result<State> {
            Ok(State::empty())
        }
        fn location(&self, _elem: i32) -> Result<Rect> {
            Err(Error::NotSupported)
        }
        fn navigate(&self, _dir: NavDir, _elem: i32) -> Result<Option<Child>> {
            Ok(None)
        }
        fn do_default_action(&self, _elem: i32) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_child_inherits_flags_and_shares_node() {
        let parent = Ao::with_flags(
            Arc::new(Leaf(Role::LIST)),
            0,
            MiscFlags::IN_PROC | MiscFlags::MARKED,
        );
        let mut item = Ao::child_of(&parent, Child::Element(2));
        assert_eq!(item.flags(), MiscFlags::IN_PROC);
        assert!(item.shares_node(&parent));
        assert!(!item.same_object(&parent));
        assert_eq!(parent.ref_count(), 2);
        assert_eq!(item.ensure_role(), Role::LISTITEM);
        drop(item);
        assert_eq!(parent.ref_count(), 1);
    }

    #[test]
    fn test_level_saturates() {
        let mut ao = Ao::new(Arc::new(Leaf(Role::LIST)));
        ao.set_level(70_000);
        assert_eq!(ao.level(), u16::MAX);
        ao.set_level(3);
        assert_eq!(ao.level(), 3);
    }
}
