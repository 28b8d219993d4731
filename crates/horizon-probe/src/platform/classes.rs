//! Window class names with special accessibility behavior.

use horizon_probe_core::{SpecialWindow, WindowHandle};

use super::WindowSystem;

/// Chromium render widget host, the window that owns the page.
pub const CHROME_RENDER_WIDGET: &str = "Chrome_RenderWidgetHostHWND";
/// Chromium widget window, also used by embedded web views.
pub const CHROME_WIDGET: &str = "Chrome_WidgetWin_1";
/// The legacy web browser control.
pub const IE_SERVER: &str = "Internet Explorer_Server";

const CHROME_PREFIX: &str = "Chrome";
const JAVA_PREFIX: &str = "SunAwt";
const FIREFOX_PREFIX: &str = "Mozilla";

/// Case-insensitive class prefix test.
pub fn has_prefix(class: &str, prefix: &str) -> bool {
    class
        .get(..prefix.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
}

fn has_suffix(class: &str, suffix: &str) -> bool {
    class
        .len()
        .checked_sub(suffix.len())
        .and_then(|at| class.get(at..))
        .is_some_and(|tail| tail.eq_ignore_ascii_case(suffix))
}

/// Whether the class of `w` equals `class`, case-insensitively.
pub fn class_is(ws: &dyn WindowSystem, w: WindowHandle, class: &str) -> bool {
    ws.class_name(w)
        .is_some_and(|c| c.eq_ignore_ascii_case(class))
}

pub fn is_java_class(class: &str) -> bool {
    has_prefix(class, JAVA_PREFIX)
}

pub fn is_firefox_class(class: &str) -> bool {
    has_prefix(class, FIREFOX_PREFIX)
}

pub fn is_chrome_class(class: &str) -> bool {
    has_prefix(class, CHROME_PREFIX)
}

fn is_office_frame_class(class: &str) -> bool {
    class.len() >= 8 && has_prefix(class, "SAL") && has_suffix(class, "FRAME")
}

/// Classify a top-level window by its class.
pub fn classify_top_level(class: &str) -> SpecialWindow {
    if is_chrome_class(class) {
        SpecialWindow::Chrome
    } else if is_java_class(class) {
        SpecialWindow::Java
    } else if is_office_frame_class(class) {
        SpecialWindow::OpenOffice
    } else if is_firefox_class(class) {
        SpecialWindow::Firefox
    } else {
        SpecialWindow::None
    }
}

/// Detect the special treatment `w` needs. `top` is its top-level ancestor.
///
/// A child window counts as its top-level window's kind only if it has the
/// same kind itself; Chromium page and widget children are recognized
/// directly.
pub fn special_window(ws: &dyn WindowSystem, top: WindowHandle, w: WindowHandle) -> SpecialWindow {
    let class_of = |w| ws.class_name(w).unwrap_or_default();
    if w != top {
        let class = class_of(w);
        if class.eq_ignore_ascii_case(CHROME_RENDER_WIDGET) {
            return SpecialWindow::ChromeRenderHost;
        }
        if class.eq_ignore_ascii_case(CHROME_WIDGET) {
            return SpecialWindow::ChromeControl;
        }
    }
    let kind = classify_top_level(&class_of(top));
    if kind != SpecialWindow::None && w != top && classify_top_level(&class_of(w)) != kind {
        return SpecialWindow::None;
    }
    kind
}

/// The first descendant of `w` with class `class`, visible ones only unless
/// `hidden_too`.
pub fn find_child_by_class(
    ws: &dyn WindowSystem,
    w: WindowHandle,
    class: &str,
    hidden_too: bool,
) -> Option<WindowHandle> {
    ws.child_windows(w)
        .into_iter()
        .find(|&c| (hidden_too || ws.is_visible(c)) && class_is(ws, c, class))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_top_level_classes() {
        assert_eq!(classify_top_level("Chrome_WidgetWin_1"), SpecialWindow::Chrome);
        assert_eq!(classify_top_level("SunAwtFrame"), SpecialWindow::Java);
        assert_eq!(classify_top_level("SALTMPSUBFRAME"), SpecialWindow::OpenOffice);
        assert_eq!(classify_top_level("MozillaWindowClass"), SpecialWindow::Firefox);
        assert_eq!(classify_top_level("Notepad"), SpecialWindow::None);
        assert_eq!(classify_top_level("SALFRAME"), SpecialWindow::OpenOffice);
        assert_eq!(classify_top_level("SALFRAMEX"), SpecialWindow::None);
    }

    #[test]
    fn test_prefix_is_case_insensitive() {
        assert!(has_prefix("mozillawindowclass", "Mozilla"));
        assert!(!has_prefix("Moz", "Mozilla"));
        assert!(is_java_class("SunAwtDialog"));
    }
}
