//! Native window handles.

use std::fmt;

/// An opaque native window handle.
///
/// The broker and caller may run with different pointer widths, so the handle
/// crosses process boundaries as a 32-bit value (window handles are 32-bit
/// significant on every supported platform).
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WindowHandle(pub isize);

impl WindowHandle {
    /// The null handle.
    pub const NULL: WindowHandle = WindowHandle(0);

    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    /// The 32-bit wire form.
    pub const fn to_wire(self) -> i32 {
        self.0 as i32
    }

    /// Rebuild a handle from its wire form, sign-extending like the platform does.
    pub const fn from_wire(value: i32) -> Self {
        Self(value as isize)
    }

    /// `Some(self)` unless null.
    pub fn non_null(self) -> Option<Self> {
        if self.is_null() { None } else { Some(self) }
    }
}

impl fmt::Debug for WindowHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WindowHandle({:#x})", self.0)
    }
}

impl fmt::Display for WindowHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Windows whose accessibility needs special treatment, detected by class
/// name. Travels in from-point parameter blocks as one byte.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SpecialWindow {
    #[default]
    None = 0,
    /// A Chromium top-level window (`Chrome*`).
    Chrome = 1,
    /// A Java AWT/Swing window (`SunAwt*`).
    Java = 2,
    /// An OpenOffice/LibreOffice frame (`SAL*FRAME`).
    OpenOffice = 3,
    /// A Firefox top-level window (`Mozilla*`).
    Firefox = 4,
    /// A Chromium web view control hosted by another application.
    ChromeControl = 5,
    /// The Chromium render widget host child window.
    ChromeRenderHost = 6,
}

impl SpecialWindow {
    pub fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Chrome,
            2 => Self::Java,
            3 => Self::OpenOffice,
            4 => Self::Firefox,
            5 => Self::ChromeControl,
            6 => Self::ChromeRenderHost,
            _ => Self::None,
        }
    }

    /// Whether the window belongs to a Chromium-based browser or web view.
    pub fn is_chromium(self) -> bool {
        matches!(
            self,
            Self::Chrome | Self::ChromeControl | Self::ChromeRenderHost
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_form() {
        let w = WindowHandle(0x0001_02a4);
        assert_eq!(WindowHandle::from_wire(w.to_wire()), w);
        assert!(WindowHandle::NULL.non_null().is_none());
    }

    #[test]
    fn test_special_window_byte() {
        for w in [SpecialWindow::Java, SpecialWindow::ChromeRenderHost] {
            assert_eq!(SpecialWindow::from_u8(w as u8), w);
        }
        assert_eq!(SpecialWindow::from_u8(200), SpecialWindow::None);
    }
}
