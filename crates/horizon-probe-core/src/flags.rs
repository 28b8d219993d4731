//! Flag sets and special codes shared by callers and brokers.
//!
//! The numeric values of the public flag sets are part of the parameter-block
//! wire format; do not renumber them.

bitflags::bitflags! {
    /// Classification bits cached in an [`Ao`](crate::Ao).
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct MiscFlags: u8 {
        /// Retrieved inside the object's own process.
        const IN_PROC = 1;
        /// Backed by the modern (UI Automation) backend.
        const UIA = 2;
        /// Backed by the Java access bridge.
        const JAVA = 4;
        /// Matched the filter of a marking traversal.
        const MARKED = 128;

        /// Bits a child handle inherits from its parent.
        const INHERIT = Self::IN_PROC.bits() | Self::UIA.bits() | Self::JAVA.bits();
    }
}

bitflags::bitflags! {
    /// Caller options for find operations.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct FindFlags: u32 {
        /// Visit children last to first.
        const REVERSE = 1;
        /// Also search invisible and offscreen objects and their descendants.
        const HIDDEN_TOO = 2;
        /// Also search inside menu items.
        const MENU_TOO = 4;
        /// Search the client area object, not the window object.
        const CLIENT_AREA = 8;
        /// Never use an in-process broker.
        const NOT_IN_PROC = 0x100;
        /// Use the modern backend.
        const UIA = 0x200;
        /// Mark objects that match instead of stopping at them.
        const MARK = 0x10000;
        /// Internal: an object has already been marked.
        const MARKED_ = 0x4000_0000;
    }
}

bitflags::bitflags! {
    /// Search scope derived from parsed find parameters. Travels in the
    /// parameter block next to [`FindFlags`].
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct SearchScope: u32 {
        /// Report every match through the callback.
        const FIND_ALL = 1;
        /// Capture rectangles of every visited object.
        const GET_RECTS = 2;
        /// Search only in the page document of a browser.
        const IN_WEB_PAGE = 4;
        /// The browser is Chromium based.
        const IN_CHROME_PAGE = 8;
        /// The browser is Firefox.
        const IN_FIREFOX_PAGE = 0x10;
        /// The window hosts a legacy web browser control.
        const IN_IES = 0x20;
        /// Search inside child windows selected by class or id.
        const IN_CONTROLS = 0x40;
        /// The control selector is a numeric id.
        const IS_ID = 0x80;
        /// A sub-element index is required.
        const IS_ELEM = 0x100;
        const IS_RECT_L = 0x200;
        const IS_RECT_T = 0x400;
        const IS_RECT_W = 0x800;
        const IS_RECT_H = 0x1000;
        /// The search runs out of process.
        const NOT_IN_PROC = 0x2000;
        /// Firefox top-level window searched without a page prefix; background
        /// tabs are skipped.
        const IN_FIREFOX_NOT_WEB_NOT_UIA = 0x4000;

        const IS_RECT = Self::IS_RECT_L.bits()
            | Self::IS_RECT_T.bits()
            | Self::IS_RECT_W.bits()
            | Self::IS_RECT_H.bits();
    }
}

bitflags::bitflags! {
    /// Options for resolving the object at a screen point.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct PointFlags: u32 {
        const NOT_IN_PROC = 1;
        const UIA = 2;
        /// Prefer a link or button over its text or image child.
        const PREFER_LINK = 4;
        /// Use the modern backend if the legacy one fails or is too coarse.
        const OR_UIA = 16;
        /// Internal: the point was converted to logical coordinates.
        const DPI_SCALED_ = 0x10000;
        /// Internal: resolution failed, caller decides how to retry.
        const FAIL_ = 0x20000;
    }
}

bitflags::bitflags! {
    /// Options for resolving the focused object.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct FocusFlags: u32 {
        const NOT_IN_PROC = 1;
        const UIA = 2;
    }
}

bitflags::bitflags! {
    /// Options for resolving an object from a window.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct WindowFlags: u32 {
        const NOT_IN_PROC = 1;
        /// Return the object's name instead of the object.
        const NAME = 2;
    }
}

bitflags::bitflags! {
    /// Selection operations for `select`.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct SelectFlags: u32 {
        const TAKE_FOCUS = 1;
        const TAKE_SELECTION = 2;
        const EXTEND_SELECTION = 4;
        const ADD_SELECTION = 8;
        const REMOVE_SELECTION = 0x10;
    }
}

/// Object ids accepted when resolving an object from a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectId(pub i32);

impl ObjectId {
    pub const WINDOW: ObjectId = ObjectId(0);
    pub const SYSMENU: ObjectId = ObjectId(-1);
    pub const TITLEBAR: ObjectId = ObjectId(-2);
    pub const MENU: ObjectId = ObjectId(-3);
    pub const CLIENT: ObjectId = ObjectId(-4);
    pub const VSCROLL: ObjectId = ObjectId(-5);
    pub const HSCROLL: ObjectId = ObjectId(-6);
    pub const CARET: ObjectId = ObjectId(-8);
    /// Root of the Java access bridge tree.
    pub const JAVA: ObjectId = ObjectId(-100);
    /// Root of the modern backend tree.
    pub const UIA: ObjectId = ObjectId(-101);
}

/// Navigation direction codes.
///
/// Codes 1 to 8 are the platform's; [`NavDir::PARENT`] and [`NavDir::CHILD`]
/// are handled locally; any other code is passed to the backend unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NavDir(pub i32);

impl NavDir {
    pub const UP: NavDir = NavDir(1);
    pub const DOWN: NavDir = NavDir(2);
    pub const LEFT: NavDir = NavDir(3);
    pub const RIGHT: NavDir = NavDir(4);
    pub const NEXT: NavDir = NavDir(5);
    pub const PREVIOUS: NavDir = NavDir(6);
    pub const FIRST_CHILD: NavDir = NavDir(7);
    pub const LAST_CHILD: NavDir = NavDir(8);
    pub const PARENT: NavDir = NavDir(9);
    pub const CHILD: NavDir = NavDir(10);
    /// Firefox extension: the active page document.
    pub const FIREFOX_DOCUMENT: NavDir = NavDir(0x1009);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inherit_mask() {
        let f = MiscFlags::IN_PROC | MiscFlags::MARKED;
        assert_eq!(f & MiscFlags::INHERIT, MiscFlags::IN_PROC);
    }

    #[test]
    fn test_wire_values() {
        assert_eq!(FindFlags::UIA.bits(), 0x200);
        assert_eq!(FindFlags::MARK.bits(), 0x10000);
        assert_eq!(PointFlags::OR_UIA.bits(), 16);
        assert_eq!(ObjectId::CLIENT.0 as u32, 0xFFFF_FFFC);
    }
}
