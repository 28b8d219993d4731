//! Core types for Horizon Probe.
//!
//! This crate holds the values shared by every part of the probe, on both
//! sides of a process boundary:
//!
//! - **Accessible-object handles**: [`Ao`], a node reference plus sub-element
//!   index plus cached classification
//! - **Backend interface**: [`AccessibleNode`], implemented by the legacy tree,
//!   the modern-tree unification shim and the Java bridge
//! - **Roles, states and flags**: [`Role`], [`State`], [`FindFlags`] and friends
//! - **Wildcard expressions**: [`Wildex`]
//! - **Errors** with stable status codes: [`Error`]
//! - **Configuration**: [`ProbeConfig`]
//!
//! # Example
//!
//! ```ignore
//! use horizon_probe_core::{Ao, Role, StringProp, Wildex};
//!
//! let wanted: Wildex = "Save*".parse()?;
//! let mut ao = Ao::new(node);
//! if ao.ensure_role() == Role::PUSHBUTTON
//!     && ao.name()?.is_some_and(|n| wanted.is_match(&n))
//! {
//!     ao.do_default_action()?;
//! }
//! ```

mod ao;
pub mod config;
pub mod dom;
mod error;
pub mod flags;
mod geometry;
pub mod logging;
mod node;
mod role;
mod state;
pub mod wildex;
mod window;

pub use ao::{Ao, AoMisc};
pub use config::ProbeConfig;
pub use dom::{DomNode, DomNodeInfo, DomNodeType};
pub use error::{Error, InjectFailure, MarshalSide, Result, codes};
pub use flags::{
    FindFlags, FocusFlags, MiscFlags, NavDir, ObjectId, PointFlags, SearchScope, SelectFlags,
    WindowFlags,
};
pub use geometry::{Point, Rect};
pub use logging::{AoTreeDebug, TreeFormatOptions, TreeStyle};
pub use node::{AccessibleNode, BackendKind, Child, NodeRef, SpecialAction, StringProp};
pub use role::{Role, RoleValue};
pub use state::{State, Visibility};
pub use wildex::Wildex;
pub use window::{SpecialWindow, WindowHandle};
