//! Logical to physical rectangle conversion for DPI-virtualized windows.
//!
//! When the system scales a window, backends report rectangles in the
//! window's logical space. [`DpiScaler`] decides once per window whether
//! conversion is needed and then converts each rectangle, clipping it to the
//! window first so that a rectangle outside the window is reported as such
//! rather than converted to garbage.

use horizon_probe_core::logging::targets;
use horizon_probe_core::{Rect, WindowHandle};

use crate::platform::WindowSystem;

/// Result of scaling one rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleOutcome {
    /// The window is not scaled; the rectangle is as given, or clipped.
    Unchanged(Rect),
    /// Converted to physical pixels.
    Scaled(Rect),
    /// The rectangle does not intersect the window.
    NotInWindow,
    /// Conversion failed; the clipped logical rectangle.
    Failed(Rect),
}

impl ScaleOutcome {
    /// The usable rectangle, if any.
    pub fn rect(self) -> Option<Rect> {
        match self {
            Self::Unchanged(r) | Self::Scaled(r) | Self::Failed(r) => Some(r),
            Self::NotInWindow => None,
        }
    }
}

/// Per-window rectangle converter.
pub struct DpiScaler<'a> {
    ws: &'a dyn WindowSystem,
    window: WindowHandle,
    scaled: bool,
    bounds: Option<Rect>,
}

impl<'a> DpiScaler<'a> {
    /// `enabled = false` yields a scaler that never converts, only clips.
    pub fn new(ws: &'a dyn WindowSystem, window: WindowHandle, enabled: bool) -> Self {
        let scaled = enabled && ws.is_dpi_scaled(window);
        let bounds = ws.logical_window_rect(window);
        if scaled {
            tracing::trace!(target: targets::DPI, %window, ?bounds, "window is DPI-scaled");
        }
        Self {
            ws,
            window,
            scaled,
            bounds,
        }
    }

    pub fn is_scaled(&self) -> bool {
        self.scaled
    }

    /// Convert `r`. With `clip`, an unscaled rectangle is also intersected
    /// with the window; a scaled one always is.
    pub fn scale(&self, r: Rect, clip: bool) -> ScaleOutcome {
        if !self.scaled {
            if !clip {
                return ScaleOutcome::Unchanged(r);
            }
            return match self.bounds.map(|b| r.intersect(&b)) {
                Some(Some(clipped)) => ScaleOutcome::Unchanged(clipped),
                Some(None) => ScaleOutcome::NotInWindow,
                None => ScaleOutcome::Unchanged(r),
            };
        }
        let Some(clipped) = self.bounds.and_then(|b| r.intersect(&b)) else {
            return ScaleOutcome::NotInWindow;
        };
        match self.ws.logical_to_physical(self.window, clipped) {
            Some(physical) => ScaleOutcome::Scaled(physical),
            None => {
                tracing::debug!(target: targets::DPI, window = %self.window, ?clipped, "logical to physical conversion failed");
                ScaleOutcome::Failed(clipped)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockDesktop, MockWindow};

    #[test]
    fn test_unscaled_window_clips_only_on_request() {
        let d = MockDesktop::new();
        d.add_window(MockWindow::top_level(WindowHandle(1), "A").rect(Rect::new(0, 0, 100, 100)));
        let s = DpiScaler::new(d.as_ref(), WindowHandle(1), true);
        assert!(!s.is_scaled());
        let r = Rect::new(50, 50, 150, 150);
        assert_eq!(s.scale(r, false), ScaleOutcome::Unchanged(r));
        assert_eq!(s.scale(r, true), ScaleOutcome::Unchanged(Rect::new(50, 50, 100, 100)));
        assert_eq!(s.scale(Rect::new(200, 200, 210, 210), true), ScaleOutcome::NotInWindow);
    }

    #[test]
    fn test_scaled_window_converts() {
        let d = MockDesktop::new();
        d.add_window(
            MockWindow::top_level(WindowHandle(1), "A")
                .rect(Rect::new(0, 0, 300, 300))
                .dpi_scaled(150),
        );
        let s = DpiScaler::new(d.as_ref(), WindowHandle(1), true);
        assert!(s.is_scaled());
        // logical bounds are 0,0,200,200
        assert_eq!(
            s.scale(Rect::new(10, 10, 20, 20), false),
            ScaleOutcome::Scaled(Rect::new(15, 15, 30, 30))
        );
        assert_eq!(s.scale(Rect::new(250, 250, 260, 260), false), ScaleOutcome::NotInWindow);

        let off = DpiScaler::new(d.as_ref(), WindowHandle(1), false);
        assert!(!off.is_scaled());
    }
}
