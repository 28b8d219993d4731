//! Native implementations of the collaborator traits.
//!
//! - [`WinWindowSystem`]: window queries through the user32 API
//! - [`WinBackends`]: the legacy tree through `IAccessible`, the modern tree
//!   through UI Automation
//!
//! COM must be initialized on the calling thread before [`WinBackends::new`].
//! The Java access bridge is not loaded here; Java windows resolve through
//! the legacy tree.

use std::ffi::c_void;
use std::fmt;
use std::sync::Arc;

use windows::Win32::Foundation::{BOOL, HWND, LPARAM, POINT, RECT};
use windows::Win32::Graphics::Gdi::ClientToScreen;
use windows::Win32::System::Com::{CLSCTX_INPROC_SERVER, CoCreateInstance};
use windows::Win32::System::Threading::GetCurrentThreadId;
use windows::Win32::UI::Accessibility::{
    AccessibleChildren, AccessibleObjectFromPoint, AccessibleObjectFromWindow, CUIAutomation,
    ExpandCollapseState_Collapsed, ExpandCollapseState_Expanded,
    ExpandCollapseState_PartiallyExpanded, IAccessible, IUIAutomation, IUIAutomationElement,
    IUIAutomationExpandCollapsePattern, IUIAutomationInvokePattern,
    IUIAutomationLegacyIAccessiblePattern, IUIAutomationScrollItemPattern,
    IUIAutomationSelectionItemPattern, IUIAutomationTogglePattern, IUIAutomationTreeWalker,
    IUIAutomationValuePattern, UIA_AcceleratorKeyPropertyId, UIA_AccessKeyPropertyId,
    UIA_AutomationIdPropertyId, UIA_ClassNamePropertyId, UIA_ExpandCollapsePatternId,
    UIA_FullDescriptionPropertyId, UIA_HelpTextPropertyId, UIA_InvokePatternId,
    UIA_LegacyIAccessiblePatternId, UIA_PATTERN_ID, UIA_PROPERTY_ID, UIA_ScrollItemPatternId,
    UIA_SelectionItemPatternId, UIA_TogglePatternId, UIA_ValuePatternId,
    WindowFromAccessibleObject,
};
use windows::Win32::UI::HiDpi::{
    DPI_AWARENESS_CONTEXT, DPI_AWARENESS_CONTEXT_UNAWARE, DPI_AWARENESS_UNAWARE,
    GetAwarenessFromDpiAwarenessContext, GetDpiForWindow, GetWindowDpiAwarenessContext,
    SetThreadDpiAwarenessContext,
};
use windows::Win32::UI::WindowsAndMessaging::{
    EnumChildWindows, GA_PARENT, GA_ROOT, GWL_STYLE, GetAncestor, GetClassNameW, GetClientRect,
    GetDlgCtrlID, GetForegroundWindow, GetWindowLongW, GetWindowRect, GetWindowTextW,
    GetWindowThreadProcessId, IsWindow, IsWindowVisible, LogicalToPhysicalPointForPerMonitorDPI,
    PhysicalToLogicalPointForPerMonitorDPI, WS_CHILD, WS_POPUP, WindowFromPoint,
};
use windows::core::{BSTR, IUnknown, Interface, VARIANT};

use horizon_probe_core::logging::targets;
use horizon_probe_core::{
    AccessibleNode, Child, Error, NavDir, NodeRef, ObjectId, Point, Rect, Result, RoleValue,
    SelectFlags, State, StringProp, WindowHandle,
};

use super::{BackendResolver, WindowSystem};
use crate::shim::{ElementFlags, ElementRef, ExpandState, UiaElement, UiaProperty, WalkStep};

const DEFAULT_DPI: u32 = 96;

fn hwnd(w: WindowHandle) -> HWND {
    HWND(w.0 as *mut c_void)
}

fn handle(h: HWND) -> WindowHandle {
    WindowHandle(h.0 as isize)
}

fn non_null(h: HWND) -> Option<WindowHandle> {
    handle(h).non_null()
}

fn com_error(e: windows::core::Error) -> Error {
    Error::Backend(e.code().0)
}

fn to_rect(r: RECT) -> Rect {
    Rect::new(r.left, r.top, r.right, r.bottom)
}

fn to_point(p: Point) -> POINT {
    POINT { x: p.x, y: p.y }
}

fn text(b: BSTR) -> Option<String> {
    (!b.is_empty()).then(|| b.to_string())
}

fn read_utf16(f: impl FnOnce(&mut [u16]) -> i32) -> Option<String> {
    let mut buf = [0u16; 512];
    let n = f(&mut buf);
    (n > 0).then(|| String::from_utf16_lossy(&buf[..n as usize]))
}

// ---------------------------------------------------------------------------
// Windows
// ---------------------------------------------------------------------------

/// Runs a closure with the calling thread in DPI-unaware mode, so that
/// coordinate APIs return logical values.
struct UnawareThread {
    previous: DPI_AWARENESS_CONTEXT,
}

impl UnawareThread {
    fn enter() -> Self {
        // SAFETY: SetThreadDpiAwarenessContext only changes a per-thread
        // setting and accepts any of the predefined context values.
        let previous = unsafe { SetThreadDpiAwarenessContext(DPI_AWARENESS_CONTEXT_UNAWARE) };
        Self { previous }
    }
}

impl Drop for UnawareThread {
    fn drop(&mut self) {
        if !self.previous.0.is_null() {
            // SAFETY: restores the context returned by the matching call in
            // `enter`, on the same thread.
            unsafe {
                SetThreadDpiAwarenessContext(self.previous);
            }
        }
    }
}

/// [`WindowSystem`] over user32.
#[derive(Debug, Default, Clone, Copy)]
pub struct WinWindowSystem;

impl WinWindowSystem {
    fn style(&self, w: WindowHandle) -> u32 {
        // SAFETY: GetWindowLongW accepts any handle and returns 0 for
        // invalid ones.
        unsafe { GetWindowLongW(hwnd(w), GWL_STYLE) as u32 }
    }
}

unsafe extern "system" fn collect_child(child: HWND, lparam: LPARAM) -> BOOL {
    // SAFETY: lparam is the address of the Vec passed by `child_windows`,
    // which outlives the enumeration.
    let list = unsafe { &mut *(lparam.0 as *mut Vec<WindowHandle>) };
    list.push(handle(child));
    BOOL(1)
}

impl WindowSystem for WinWindowSystem {
    fn is_window(&self, w: WindowHandle) -> bool {
        // SAFETY: IsWindow accepts any value and only reads window tables.
        unsafe { IsWindow(hwnd(w)).as_bool() }
    }

    fn class_name(&self, w: WindowHandle) -> Option<String> {
        // SAFETY: the buffer is valid for its whole length.
        read_utf16(|buf| unsafe { GetClassNameW(hwnd(w), buf) })
    }

    fn window_name(&self, w: WindowHandle) -> Option<String> {
        // SAFETY: the buffer is valid for its whole length.
        read_utf16(|buf| unsafe { GetWindowTextW(hwnd(w), buf) })
    }

    fn is_child(&self, w: WindowHandle) -> bool {
        self.style(w) & WS_CHILD.0 != 0
    }

    fn is_popup(&self, w: WindowHandle) -> bool {
        self.style(w) & WS_POPUP.0 != 0
    }

    fn is_visible(&self, w: WindowHandle) -> bool {
        // SAFETY: IsWindowVisible accepts any handle.
        unsafe { IsWindowVisible(hwnd(w)).as_bool() }
    }

    fn is_visible_in_window(&self, c: WindowHandle, top: WindowHandle) -> bool {
        let mut w = c;
        while w != top {
            if !self.is_visible(w) {
                return false;
            }
            match self.parent(w) {
                Some(p) => w = p,
                None => return false,
            }
        }
        true
    }

    fn parent(&self, w: WindowHandle) -> Option<WindowHandle> {
        if !self.is_child(w) {
            return None;
        }
        // SAFETY: GetAncestor accepts any handle and returns null on failure.
        non_null(unsafe { GetAncestor(hwnd(w), GA_PARENT) })
    }

    fn root(&self, w: WindowHandle) -> Option<WindowHandle> {
        // SAFETY: as above.
        non_null(unsafe { GetAncestor(hwnd(w), GA_ROOT) })
    }

    fn child_windows(&self, w: WindowHandle) -> Vec<WindowHandle> {
        let mut list: Vec<WindowHandle> = Vec::new();
        // SAFETY: the callback only writes to `list`, which lives until
        // EnumChildWindows returns.
        unsafe {
            let _ = EnumChildWindows(hwnd(w), Some(collect_child), LPARAM(&mut list as *mut _ as isize));
        }
        list
    }

    fn is_only_child(&self, w: WindowHandle) -> bool {
        let Some(parent) = self.parent(w) else {
            return false;
        };
        self.child_windows(parent)
            .into_iter()
            .filter(|&c| self.parent(c) == Some(parent))
            .count()
            == 1
    }

    fn control_id(&self, w: WindowHandle) -> i32 {
        // SAFETY: GetDlgCtrlID accepts any handle and returns 0 on failure.
        unsafe { GetDlgCtrlID(hwnd(w)) }
    }

    fn winforms_name(&self, _w: WindowHandle) -> Option<String> {
        // TODO: read WinForms control names with WM_GETCONTROLNAME through a
        // buffer shared with the target process.
        None
    }

    fn window_rect(&self, w: WindowHandle) -> Option<Rect> {
        let mut r = RECT::default();
        // SAFETY: `r` is a valid out pointer for the duration of the call.
        unsafe { GetWindowRect(hwnd(w), &mut r) }.ok()?;
        Some(to_rect(r))
    }

    fn client_rect(&self, w: WindowHandle) -> Option<Rect> {
        let mut r = RECT::default();
        let mut origin = POINT::default();
        // SAFETY: both out pointers are valid for the duration of the calls.
        unsafe {
            GetClientRect(hwnd(w), &mut r).ok()?;
            if !ClientToScreen(hwnd(w), &mut origin).as_bool() {
                return None;
            }
        }
        Some(Rect::from_xywh(origin.x, origin.y, r.right, r.bottom))
    }

    fn logical_window_rect(&self, w: WindowHandle) -> Option<Rect> {
        let _unaware = UnawareThread::enter();
        self.window_rect(w)
    }

    fn window_from_point(&self, p: Point) -> Option<WindowHandle> {
        // SAFETY: WindowFromPoint takes the point by value.
        non_null(unsafe { WindowFromPoint(to_point(p)) })
    }

    fn is_of_this_thread(&self, w: WindowHandle) -> bool {
        // SAFETY: no out pointer is passed; both calls only read.
        unsafe { GetWindowThreadProcessId(hwnd(w), None) == GetCurrentThreadId() }
    }

    fn foreground_window(&self) -> Option<WindowHandle> {
        // SAFETY: no arguments.
        non_null(unsafe { GetForegroundWindow() })
    }

    fn is_dpi_scaled(&self, w: WindowHandle) -> bool {
        // SAFETY: the functions accept any handle; the context they return
        // is only passed back to the API.
        unsafe {
            let context = GetWindowDpiAwarenessContext(hwnd(w));
            GetAwarenessFromDpiAwarenessContext(context) == DPI_AWARENESS_UNAWARE
                && GetDpiForWindow(hwnd(w)) != DEFAULT_DPI
        }
    }

    fn logical_to_physical(&self, w: WindowHandle, r: Rect) -> Option<Rect> {
        let mut a = POINT { x: r.left, y: r.top };
        let mut b = POINT { x: r.right, y: r.bottom };
        // SAFETY: both points are valid in/out pointers.
        unsafe {
            if !LogicalToPhysicalPointForPerMonitorDPI(hwnd(w), &mut a).as_bool()
                || !LogicalToPhysicalPointForPerMonitorDPI(hwnd(w), &mut b).as_bool()
            {
                return None;
            }
        }
        Some(Rect::new(a.x, a.y, b.x, b.y))
    }

    fn physical_to_logical(&self, w: WindowHandle, p: Point) -> Option<Point> {
        let mut pt = to_point(p);
        // SAFETY: `pt` is a valid in/out pointer.
        unsafe { PhysicalToLogicalPointForPerMonitorDPI(hwnd(w), &mut pt) }
            .as_bool()
            .then_some(Point::new(pt.x, pt.y))
    }
}

// ---------------------------------------------------------------------------
// Legacy nodes
// ---------------------------------------------------------------------------

/// An `IAccessible` object.
pub struct LegacyNode {
    acc: IAccessible,
}

// SAFETY: legacy objects are reached through COM proxies or are
// apartment-agnostic browser objects; the probe uses each node from one
// call stack at a time.
unsafe impl Send for LegacyNode {}
// SAFETY: as above; no method mutates Rust-side state.
unsafe impl Sync for LegacyNode {}

impl fmt::Debug for LegacyNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LegacyNode").field("acc", &self.acc.as_raw()).finish()
    }
}

impl LegacyNode {
    pub fn new(acc: IAccessible) -> NodeRef {
        Arc::new(Self { acc })
    }

    fn from_interface<I: Interface>(i: &I) -> Result<NodeRef> {
        Ok(Self::new(i.cast::<IAccessible>().map_err(com_error)?))
    }

    /// Interpret a child variant: an object, a sub-element or nothing.
    fn child_from_variant(v: &VARIANT) -> Result<Option<Child>> {
        if v.is_empty() {
            return Ok(None);
        }
        // object variants first; the integer conversion would coerce them
        if let Ok(unknown) = IUnknown::try_from(v) {
            return Self::from_interface(&unknown).map(|n| Some(Child::Node(n)));
        }
        let id = i32::try_from(v).map_err(com_error)?;
        Ok(Some(Child::Element(id)))
    }
}

impl AccessibleNode for LegacyNode {
    fn parent(&self) -> Result<Option<NodeRef>> {
        // SAFETY: plain COM call on a live interface.
        match unsafe { self.acc.accParent() } {
            Ok(dispatch) => Self::from_interface(&dispatch).map(Some),
            Err(_) => Ok(None),
        }
    }

    fn child_count(&self) -> Result<usize> {
        // SAFETY: plain COM call on a live interface.
        let n = unsafe { self.acc.accChildCount() }.map_err(com_error)?;
        Ok(n.max(0) as usize)
    }

    fn children(&self) -> Result<Vec<Child>> {
        let n = self.child_count()?;
        let mut vars = vec![VARIANT::default(); n];
        let mut obtained = 0;
        // SAFETY: `vars` has room for `n` variants; `obtained` is a valid
        // out pointer.
        unsafe { AccessibleChildren(&self.acc, 0, &mut vars, &mut obtained) }.map_err(com_error)?;
        let mut children = Vec::with_capacity(obtained as usize);
        for v in vars.iter().take(obtained.max(0) as usize) {
            match Self::child_from_variant(v) {
                Ok(Some(c)) => children.push(c),
                Ok(None) => {}
                Err(e) => tracing::trace!(target: targets::FIND, error = %e, "skipping unusable child"),
            }
        }
        Ok(children)
    }

    fn string_prop(&self, prop: StringProp, elem: i32) -> Result<Option<String>> {
        let child = VARIANT::from(elem);
        // SAFETY: plain COM calls on a live interface.
        let r = unsafe {
            match prop {
                StringProp::Name => self.acc.get_accName(&child),
                StringProp::Value => self.acc.get_accValue(&child),
                StringProp::Description => self.acc.get_accDescription(&child),
                StringProp::Help => self.acc.get_accHelp(&child),
                StringProp::DefaultAction => self.acc.get_accDefaultAction(&child),
                StringProp::KeyboardShortcut => self.acc.get_accKeyboardShortcut(&child),
                StringProp::AutomationId | StringProp::ClassName => return Err(Error::NotSupported),
            }
        };
        r.map(text).map_err(com_error)
    }

    fn role(&self, elem: i32) -> Result<RoleValue> {
        // SAFETY: plain COM call on a live interface.
        let v = unsafe { self.acc.get_accRole(&VARIANT::from(elem)) }.map_err(com_error)?;
        if let Ok(code) = i32::try_from(&v) {
            return Ok(RoleValue::Code(code as u32));
        }
        let s = BSTR::try_from(&v).map_err(com_error)?;
        Ok(RoleValue::Custom(s.to_string()))
    }

    fn state(&self, elem: i32) -> Result<State> {
        // SAFETY: plain COM call on a live interface.
        let v = unsafe { self.acc.get_accState(&VARIANT::from(elem)) }.map_err(com_error)?;
        let bits = i32::try_from(&v).map_err(com_error)?;
        Ok(State::from_bits_retain(bits as u32))
    }

    fn location(&self, elem: i32) -> Result<Rect> {
        let (mut x, mut y, mut w, mut h) = (0, 0, 0, 0);
        // SAFETY: the four out pointers are valid for the call.
        unsafe { self.acc.accLocation(&mut x, &mut y, &mut w, &mut h, &VARIANT::from(elem)) }
            .map_err(com_error)?;
        Ok(Rect::from_xywh(x, y, w, h))
    }

    fn navigate(&self, dir: NavDir, elem: i32) -> Result<Option<Child>> {
        // SAFETY: plain COM call on a live interface.
        let v = unsafe { self.acc.accNavigate(dir.0, &VARIANT::from(elem)) }.map_err(com_error)?;
        Self::child_from_variant(&v)
    }

    fn hit_test(&self, point: Point) -> Result<Option<Child>> {
        // SAFETY: plain COM call on a live interface.
        let v = unsafe { self.acc.accHitTest(point.x, point.y) }.map_err(com_error)?;
        Self::child_from_variant(&v)
    }

    fn focus(&self) -> Result<Option<Child>> {
        // SAFETY: plain COM call on a live interface.
        let v = unsafe { self.acc.accFocus() }.map_err(com_error)?;
        Self::child_from_variant(&v)
    }

    fn do_default_action(&self, elem: i32) -> Result<()> {
        // SAFETY: plain COM call on a live interface.
        unsafe { self.acc.accDoDefaultAction(&VARIANT::from(elem)) }.map_err(com_error)
    }

    fn set_value(&self, elem: i32, value: &str) -> Result<()> {
        // SAFETY: plain COM call on a live interface.
        unsafe { self.acc.put_accValue(&VARIANT::from(elem), &BSTR::from(value)) }.map_err(com_error)
    }

    fn select(&self, elem: i32, flags: SelectFlags) -> Result<()> {
        // SAFETY: plain COM call on a live interface.
        unsafe { self.acc.accSelect(flags.bits() as i32, &VARIANT::from(elem)) }.map_err(com_error)
    }

    fn window(&self) -> Option<WindowHandle> {
        let mut h = HWND::default();
        // SAFETY: `h` is a valid out pointer.
        unsafe { WindowFromAccessibleObject(&self.acc, Some(&mut h as *mut HWND)) }.ok()?;
        non_null(h)
    }
}

// ---------------------------------------------------------------------------
// Modern elements
// ---------------------------------------------------------------------------

/// A UI Automation element.
pub struct WinElement {
    element: IUIAutomationElement,
    walker: IUIAutomationTreeWalker,
}

// SAFETY: UI Automation client interfaces are free-threaded.
unsafe impl Send for WinElement {}
// SAFETY: as above.
unsafe impl Sync for WinElement {}

impl fmt::Debug for WinElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WinElement").field("element", &self.element.as_raw()).finish()
    }
}

impl WinElement {
    fn wrap(&self, element: IUIAutomationElement) -> ElementRef {
        Arc::new(Self {
            element,
            walker: self.walker.clone(),
        })
    }

    fn pattern<T: Interface>(&self, id: UIA_PATTERN_ID) -> Result<T> {
        // SAFETY: plain COM call on a live interface; a missing pattern
        // comes back as an error.
        unsafe { self.element.GetCurrentPatternAs::<T>(id) }.map_err(|_| Error::NotSupported)
    }

    fn string_property(&self, id: UIA_PROPERTY_ID) -> Result<Option<String>> {
        // SAFETY: plain COM call on a live interface.
        let v = unsafe { self.element.GetCurrentPropertyValue(id) }.map_err(com_error)?;
        if v.is_empty() {
            return Ok(None);
        }
        Ok(BSTR::try_from(&v).ok().and_then(text))
    }
}

impl UiaElement for WinElement {
    fn control_type(&self) -> Result<i32> {
        // SAFETY: plain COM call on a live interface.
        unsafe { self.element.CurrentControlType() }.map(|t| t.0).map_err(com_error)
    }

    fn name(&self) -> Result<Option<String>> {
        // SAFETY: plain COM call on a live interface.
        unsafe { self.element.CurrentName() }.map(text).map_err(com_error)
    }

    fn property(&self, prop: UiaProperty) -> Result<Option<String>> {
        let id = match prop {
            UiaProperty::FullDescription => UIA_FullDescriptionPropertyId,
            UiaProperty::HelpText => UIA_HelpTextPropertyId,
            UiaProperty::AcceleratorKey => UIA_AcceleratorKeyPropertyId,
            UiaProperty::AccessKey => UIA_AccessKeyPropertyId,
            UiaProperty::AutomationId => UIA_AutomationIdPropertyId,
            UiaProperty::ClassName => UIA_ClassNamePropertyId,
        };
        self.string_property(id)
    }

    fn bounding_rect(&self) -> Result<Rect> {
        // SAFETY: plain COM call on a live interface.
        unsafe { self.element.CurrentBoundingRectangle() }.map(to_rect).map_err(com_error)
    }

    fn native_window(&self) -> Result<Option<WindowHandle>> {
        // SAFETY: plain COM call on a live interface.
        unsafe { self.element.CurrentNativeWindowHandle() }.map(non_null).map_err(com_error)
    }

    fn element_flags(&self) -> Result<ElementFlags> {
        let mut flags = ElementFlags::empty();
        // SAFETY: plain COM calls on a live interface.
        unsafe {
            let e = &self.element;
            flags.set(ElementFlags::OFFSCREEN, e.CurrentIsOffscreen().map_err(com_error)?.as_bool());
            flags.set(ElementFlags::ENABLED, e.CurrentIsEnabled().map_err(com_error)?.as_bool());
            flags.set(
                ElementFlags::KEYBOARD_FOCUSABLE,
                e.CurrentIsKeyboardFocusable().map_err(com_error)?.as_bool(),
            );
            flags.set(
                ElementFlags::HAS_KEYBOARD_FOCUS,
                e.CurrentHasKeyboardFocus().map_err(com_error)?.as_bool(),
            );
        }
        Ok(flags)
    }

    fn children(&self) -> Result<Vec<ElementRef>> {
        let mut children = Vec::new();
        let mut next = self.walk(WalkStep::FirstChild)?;
        while let Some(child) = next {
            next = child.walk(WalkStep::Next)?;
            children.push(child);
        }
        Ok(children)
    }

    fn walk(&self, step: WalkStep) -> Result<Option<ElementRef>> {
        let (w, e) = (&self.walker, &self.element);
        // SAFETY: plain COM calls on live interfaces.
        let r = unsafe {
            match step {
                WalkStep::Parent => w.GetParentElement(e),
                WalkStep::Next => w.GetNextSiblingElement(e),
                WalkStep::Previous => w.GetPreviousSiblingElement(e),
                WalkStep::FirstChild => w.GetFirstChildElement(e),
                WalkStep::LastChild => w.GetLastChildElement(e),
            }
        };
        // the walker reports "nothing there" as a null element
        Ok(r.ok().map(|element| self.wrap(element)))
    }

    fn set_focus(&self) -> Result<()> {
        // SAFETY: plain COM call on a live interface.
        unsafe { self.element.SetFocus() }.map_err(com_error)
    }

    fn value(&self) -> Result<Option<String>> {
        let p: IUIAutomationValuePattern = self.pattern(UIA_ValuePatternId)?;
        // SAFETY: plain COM call on a live interface.
        unsafe { p.CurrentValue() }.map(text).map_err(com_error)
    }

    fn set_value(&self, value: &str) -> Result<()> {
        let p: IUIAutomationValuePattern = self.pattern(UIA_ValuePatternId)?;
        // SAFETY: plain COM call on a live interface.
        unsafe { p.SetValue(&BSTR::from(value)) }.map_err(com_error)
    }

    fn invoke(&self) -> Result<()> {
        let p: IUIAutomationInvokePattern = self.pattern(UIA_InvokePatternId)?;
        // SAFETY: plain COM call on a live interface.
        unsafe { p.Invoke() }.map_err(com_error)
    }

    fn toggle(&self) -> Result<()> {
        let p: IUIAutomationTogglePattern = self.pattern(UIA_TogglePatternId)?;
        // SAFETY: plain COM call on a live interface.
        unsafe { p.Toggle() }.map_err(com_error)
    }

    fn expand_state(&self) -> Result<ExpandState> {
        let p: IUIAutomationExpandCollapsePattern = self.pattern(UIA_ExpandCollapsePatternId)?;
        // SAFETY: plain COM call on a live interface.
        let s = unsafe { p.CurrentExpandCollapseState() }.map_err(com_error)?;
        Ok(match s {
            ExpandCollapseState_Collapsed => ExpandState::Collapsed,
            ExpandCollapseState_Expanded => ExpandState::Expanded,
            ExpandCollapseState_PartiallyExpanded => ExpandState::PartiallyExpanded,
            _ => ExpandState::LeafNode,
        })
    }

    fn expand(&self) -> Result<()> {
        let p: IUIAutomationExpandCollapsePattern = self.pattern(UIA_ExpandCollapsePatternId)?;
        // SAFETY: plain COM call on a live interface.
        unsafe { p.Expand() }.map_err(com_error)
    }

    fn collapse(&self) -> Result<()> {
        let p: IUIAutomationExpandCollapsePattern = self.pattern(UIA_ExpandCollapsePatternId)?;
        // SAFETY: plain COM call on a live interface.
        unsafe { p.Collapse() }.map_err(com_error)
    }

    fn select(&self) -> Result<()> {
        let p: IUIAutomationSelectionItemPattern = self.pattern(UIA_SelectionItemPatternId)?;
        // SAFETY: plain COM call on a live interface.
        unsafe { p.Select() }.map_err(com_error)
    }

    fn add_to_selection(&self) -> Result<()> {
        let p: IUIAutomationSelectionItemPattern = self.pattern(UIA_SelectionItemPatternId)?;
        // SAFETY: plain COM call on a live interface.
        unsafe { p.AddToSelection() }.map_err(com_error)
    }

    fn remove_from_selection(&self) -> Result<()> {
        let p: IUIAutomationSelectionItemPattern = self.pattern(UIA_SelectionItemPatternId)?;
        // SAFETY: plain COM call on a live interface.
        unsafe { p.RemoveFromSelection() }.map_err(com_error)
    }

    fn scroll_into_view(&self) -> Result<()> {
        let p: IUIAutomationScrollItemPattern = self.pattern(UIA_ScrollItemPatternId)?;
        // SAFETY: plain COM call on a live interface.
        unsafe { p.ScrollIntoView() }.map_err(com_error)
    }

    fn legacy_description(&self) -> Result<Option<String>> {
        let p: IUIAutomationLegacyIAccessiblePattern = self.pattern(UIA_LegacyIAccessiblePatternId)?;
        // SAFETY: plain COM call on a live interface.
        unsafe { p.CurrentDescription() }.map(text).map_err(com_error)
    }

    fn legacy_default_action(&self) -> Result<Option<String>> {
        let p: IUIAutomationLegacyIAccessiblePattern = self.pattern(UIA_LegacyIAccessiblePatternId)?;
        // SAFETY: plain COM call on a live interface.
        unsafe { p.CurrentDefaultAction() }.map(text).map_err(com_error)
    }

    fn legacy_state(&self) -> Result<State> {
        let p: IUIAutomationLegacyIAccessiblePattern = self.pattern(UIA_LegacyIAccessiblePatternId)?;
        // SAFETY: plain COM call on a live interface.
        unsafe { p.CurrentState() }.map(State::from_bits_retain).map_err(com_error)
    }

    fn legacy_do_default_action(&self) -> Result<()> {
        let p: IUIAutomationLegacyIAccessiblePattern = self.pattern(UIA_LegacyIAccessiblePatternId)?;
        // SAFETY: plain COM call on a live interface.
        unsafe { p.DoDefaultAction() }.map_err(com_error)
    }
}

// ---------------------------------------------------------------------------
// Backends
// ---------------------------------------------------------------------------

/// [`BackendResolver`] over oleacc and UI Automation.
pub struct WinBackends {
    automation: IUIAutomation,
    walker: IUIAutomationTreeWalker,
}

// SAFETY: the UI Automation client object is free-threaded.
unsafe impl Send for WinBackends {}
// SAFETY: as above.
unsafe impl Sync for WinBackends {}

impl fmt::Debug for WinBackends {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WinBackends").finish_non_exhaustive()
    }
}

impl WinBackends {
    /// Create the UI Automation client. COM must be initialized.
    pub fn new() -> Result<Self> {
        // SAFETY: CoCreateInstance with a registered class id; COM is
        // initialized by the caller.
        let automation: IUIAutomation =
            unsafe { CoCreateInstance(&CUIAutomation, None, CLSCTX_INPROC_SERVER) }.map_err(com_error)?;
        // SAFETY: plain COM call on a live interface.
        let walker = unsafe { automation.ControlViewWalker() }.map_err(com_error)?;
        Ok(Self { automation, walker })
    }

    fn element(&self, element: IUIAutomationElement) -> ElementRef {
        Arc::new(WinElement {
            element,
            walker: self.walker.clone(),
        })
    }
}

impl BackendResolver for WinBackends {
    fn legacy_from_window(&self, w: WindowHandle, id: ObjectId) -> Result<NodeRef> {
        if !WinWindowSystem.is_window(w) {
            return Err(Error::WindowGone);
        }
        let mut raw: *mut c_void = std::ptr::null_mut();
        // SAFETY: `raw` receives an interface pointer of the requested IID,
        // which `from_raw` takes ownership of.
        unsafe {
            AccessibleObjectFromWindow(hwnd(w), id.0 as u32, &IAccessible::IID, &mut raw).map_err(com_error)?;
            if raw.is_null() {
                return Err(Error::NotFound);
            }
            Ok(LegacyNode::new(IAccessible::from_raw(raw)))
        }
    }

    fn legacy_from_point(&self, p: Point) -> Result<(NodeRef, i32)> {
        let mut acc: Option<IAccessible> = None;
        let mut child = VARIANT::default();
        // SAFETY: both out pointers are valid for the call.
        unsafe { AccessibleObjectFromPoint(to_point(p), &mut acc, &mut child) }.map_err(com_error)?;
        let acc = acc.ok_or(Error::NotFound)?;
        let elem = i32::try_from(&child).unwrap_or(0);
        Ok((LegacyNode::new(acc), elem))
    }

    fn modern_from_window(&self, w: WindowHandle) -> Result<ElementRef> {
        // SAFETY: plain COM call on a live interface.
        let e = unsafe { self.automation.ElementFromHandle(hwnd(w)) }.map_err(com_error)?;
        Ok(self.element(e))
    }

    fn modern_from_point(&self, p: Point) -> Result<ElementRef> {
        // SAFETY: plain COM call on a live interface.
        let e = unsafe { self.automation.ElementFromPoint(to_point(p)) }.map_err(com_error)?;
        Ok(self.element(e))
    }

    fn modern_focused(&self) -> Result<ElementRef> {
        // SAFETY: plain COM call on a live interface.
        let e = unsafe { self.automation.GetFocusedElement() }.map_err(|_| Error::NotFound)?;
        Ok(self.element(e))
    }

    fn java_from_window(&self, _w: WindowHandle, _focused: bool) -> Option<NodeRef> {
        None
    }

    fn java_from_point(&self, _p: Point, _w: WindowHandle) -> Option<NodeRef> {
        None
    }
}
