//! Collaborator interfaces.
//!
//! The probe does not talk to the operating system directly. Everything it
//! needs from the windowing system, from the accessibility backends and from
//! the injection mechanism goes through the traits below:
//!
//! - [`WindowSystem`]: class names, styles, geometry, DPI, window-from-point
//! - [`BackendResolver`]: root objects of the legacy, modern and Java trees
//! - [`Injector`] and [`Broker`]: reaching code resident in a target process
//!
//! On Windows, [`windows`] provides the native implementations. Tests use
//! [`crate::mock`].

pub mod classes;
#[cfg(target_os = "windows")]
pub mod windows;

use std::sync::Arc;
use std::time::Duration;

use horizon_probe_core::{
    InjectFailure, NodeRef, ObjectId, Point, Rect, Result, WindowHandle,
};
use horizon_probe_marshal::{BrokerReply, InterfaceMarshaler};

use crate::shim::ElementRef;

/// Window queries used by the find engine, resolvers and DPI adapter.
pub trait WindowSystem: Send + Sync {
    fn is_window(&self, w: WindowHandle) -> bool;

    fn class_name(&self, w: WindowHandle) -> Option<String>;

    /// The window text.
    fn window_name(&self, w: WindowHandle) -> Option<String>;

    /// Whether the window has the child style.
    fn is_child(&self, w: WindowHandle) -> bool;

    /// Whether the window has the popup style.
    fn is_popup(&self, w: WindowHandle) -> bool;

    fn is_visible(&self, w: WindowHandle) -> bool;

    /// Whether `c` and all its ancestors below `top` are visible. `top` itself
    /// may be hidden.
    fn is_visible_in_window(&self, c: WindowHandle, top: WindowHandle) -> bool;

    fn parent(&self, w: WindowHandle) -> Option<WindowHandle>;

    /// The top-level ancestor, or `w` itself if it is top-level.
    fn root(&self, w: WindowHandle) -> Option<WindowHandle>;

    /// All descendant windows in enumeration order.
    fn child_windows(&self, w: WindowHandle) -> Vec<WindowHandle>;

    /// Whether `w` has no sibling windows.
    fn is_only_child(&self, w: WindowHandle) -> bool;

    fn control_id(&self, w: WindowHandle) -> i32;

    /// The control name set by WinForms, if the window is a WinForms control.
    fn winforms_name(&self, w: WindowHandle) -> Option<String>;

    /// Window rectangle in screen coordinates.
    fn window_rect(&self, w: WindowHandle) -> Option<Rect>;

    /// Client rectangle in screen coordinates.
    fn client_rect(&self, w: WindowHandle) -> Option<Rect>;

    /// Window rectangle as seen by a DPI-unaware thread.
    fn logical_window_rect(&self, w: WindowHandle) -> Option<Rect>;

    fn window_from_point(&self, p: Point) -> Option<WindowHandle>;

    /// Whether the window belongs to the calling thread.
    fn is_of_this_thread(&self, w: WindowHandle) -> bool;

    fn foreground_window(&self) -> Option<WindowHandle>;

    /// Whether the system scales the window (DPI virtualization), so that
    /// its logical and physical rectangles differ.
    fn is_dpi_scaled(&self, w: WindowHandle) -> bool;

    /// Convert a logical rectangle of `w` to physical pixels. `None` if the
    /// rectangle is not within the window.
    fn logical_to_physical(&self, w: WindowHandle, r: Rect) -> Option<Rect>;

    /// Convert a physical screen point to the logical space of `w`.
    fn physical_to_logical(&self, w: WindowHandle, p: Point) -> Option<Point>;

    /// Block the calling thread. Retry loops sleep through this so that tests
    /// can observe the delays without waiting.
    fn sleep(&self, d: Duration) {
        std::thread::sleep(d);
    }
}

/// Root objects of the accessibility backends.
pub trait BackendResolver: Send + Sync {
    /// The legacy object of a window part.
    fn legacy_from_window(&self, w: WindowHandle, id: ObjectId) -> Result<NodeRef>;

    /// The legacy object at a screen point, with its sub-element index.
    fn legacy_from_point(&self, p: Point) -> Result<(NodeRef, i32)>;

    fn modern_from_window(&self, w: WindowHandle) -> Result<ElementRef>;

    fn modern_from_point(&self, p: Point) -> Result<ElementRef>;

    fn modern_focused(&self) -> Result<ElementRef>;

    /// The Java bridge root of a window, or its focused object.
    fn java_from_window(&self, w: WindowHandle, focused: bool) -> Option<NodeRef>;

    fn java_from_point(&self, p: Point, w: WindowHandle) -> Option<NodeRef>;
}

/// Places broker code into the process that owns a window.
pub trait Injector: Send + Sync {
    fn broker_for_window(
        &self,
        w: WindowHandle,
    ) -> std::result::Result<Arc<dyn Broker>, InjectFailure>;
}

/// A call target resident in a foreign process.
pub trait Broker: Send + Sync {
    /// Send one parameter block and wait for the reply.
    ///
    /// An `Err` means the link itself failed; failures of the action are
    /// reported through the reply status.
    fn call(&self, block: &[u8]) -> Result<BrokerReply>;

    /// Marshaler shared with the broker for interface data.
    fn marshaler(&self) -> &dyn InterfaceMarshaler;
}

/// Injector for callers that never search in process.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoInjector;

impl Injector for NoInjector {
    fn broker_for_window(
        &self,
        _w: WindowHandle,
    ) -> std::result::Result<Arc<dyn Broker>, InjectFailure> {
        Err(InjectFailure::UseNotInProc)
    }
}
