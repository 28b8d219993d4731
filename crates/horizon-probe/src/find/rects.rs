//! Rectangle capture.
//!
//! Collects the rectangle of every visible object of a window, then drops
//! containers and decorations that add no information.

use horizon_probe_core::config::RectConfig;
use horizon_probe_core::{Ao, Rect, Role, State};

use super::{FindControl, FindSink};
use crate::dpi::{DpiScaler, ScaleOutcome};
use crate::platform::WindowSystem;

/// One captured object.
#[derive(Debug, Clone)]
pub struct CapturedRect {
    pub ao: Ao,
    pub rect: Rect,
    pub state: State,
    /// Children of the parent. Zero marks the entry as dropped.
    pub siblings: usize,
}

impl CapturedRect {
    fn role(&self) -> Role {
        self.ao.role_byte()
    }

    fn level(&self) -> i64 {
        i64::from(self.ao.level())
    }

    /// Whether the entry after `i` is neither a child nor a kept child.
    fn has_no_children(list: &[CapturedRect], i: usize) -> bool {
        let Some(next) = list.get(i + 1) else {
            return true;
        };
        let delta = next.level() - list[i].level();
        delta <= 0 || (delta == 1 && next.siblings == 0)
    }
}

/// Whether a hidden object is skipped along with its subtree.
///
/// Offscreen objects that may show children (expanded, tabs) are kept. So is
/// a hidden window-like object that is the only child window of a visible
/// parent: its content is usually visible.
pub fn skip_hidden(ws: &dyn WindowSystem, config: &RectConfig, ao: &Ao, state: State) -> bool {
    if !state.intersects(State::OFFSCREEN | State::INVISIBLE) {
        return false;
    }
    if ao.elem() != 0 {
        return true;
    }
    let role = ao.role_byte();
    let mut skip = true;
    if state.contains(State::OFFSCREEN) {
        skip = !(state.contains(State::EXPANDED) || config.keep_offscreen_roles.contains(&role));
    }
    if skip && matches!(role, Role::WINDOW | Role::CLIENT | Role::PANE) {
        if let Some(w) = ao.window() {
            let parent_visible = ws.parent(w).is_some_and(|p| ws.is_visible(p));
            if ws.is_child(w) && parent_visible && ws.is_only_child(w) {
                skip = false;
            }
        }
    }
    skip
}

/// Drop empty containers and lone decorations, in place.
///
/// `list` is in walk order. Entries with `siblings == 0` on return are
/// dropped and removed.
pub fn filter_rects(list: &mut Vec<CapturedRect>, config: &RectConfig) {
    // containers without kept children
    let mut removed = false;
    for i in (0..list.len()).rev() {
        if config.container_roles.contains(&list[i].role()) && CapturedRect::has_no_children(list, i) {
            list[i].siblings = 0;
            removed = true;
        }
    }
    if removed {
        list.retain(|c| c.siblings != 0);
    }

    let n = list.len();
    for i in (0..n).rev() {
        let v = &list[i];
        if v.siblings == 1 && v.level() > 0 {
            let role = v.role();
            let decorative = config.decorative_roles.contains(&role)
                || (role == Role::TEXT && !v.state.intersects(State::FOCUSABLE | State::UNAVAILABLE));
            if decorative && CapturedRect::has_no_children(list, i) {
                list[i].siblings = 0;
                continue;
            }
        }

        // a nameless parent gives no hint, so its lone children come back
        if i + 1 < n && list[i + 1].siblings == 0 {
            let role = list[i].role();
            let re_include = role == Role::GROUPING
                || role.is_link_or_button()
                || list[i].ao.name().ok().flatten().is_none_or(|s| s.is_empty());
            if re_include {
                let mut j = i + 1;
                while j < n && list[j].siblings == 0 && list[j].level() - list[j - 1].level() == 1 {
                    list[j].siblings = 1;
                    j += 1;
                }
            }
        }
    }
    list.retain(|c| c.siblings != 0);
}

/// How captured rectangles are clipped.
pub enum RectClip<'a> {
    /// In the target process: DPI-aware, clipped to the window.
    Dpi(DpiScaler<'a>),
    /// Out of process: clipped to the window rectangle, if known.
    Window(Option<Rect>),
}

impl RectClip<'_> {
    fn apply(&self, r: Rect) -> Option<Rect> {
        match self {
            Self::Dpi(scaler) => match scaler.scale(r, true) {
                ScaleOutcome::NotInWindow => None,
                outcome => outcome.rect(),
            },
            Self::Window(Some(bounds)) => r.intersect(bounds),
            Self::Window(None) => Some(r),
        }
    }
}

/// A [`FindSink`] that captures the rectangle of every visited object.
pub struct RectCapture<'a> {
    ws: &'a dyn WindowSystem,
    config: &'a RectConfig,
    hidden_too: bool,
    clip: RectClip<'a>,
    captured: Vec<CapturedRect>,
}

impl<'a> RectCapture<'a> {
    pub fn new(ws: &'a dyn WindowSystem, config: &'a RectConfig, hidden_too: bool, clip: RectClip<'a>) -> Self {
        Self {
            ws,
            config,
            hidden_too,
            clip,
            captured: Vec::new(),
        }
    }

    /// The captured entries, filtered.
    pub fn finish(self) -> Vec<CapturedRect> {
        let mut captured = self.captured;
        filter_rects(&mut captured, self.config);
        captured
    }
}

impl FindSink for RectCapture<'_> {
    fn on_match(&mut self, _ao: &Ao) -> FindControl {
        FindControl::Continue
    }

    fn on_visit(&mut self, ao: &Ao, state: State, siblings: usize) -> FindControl {
        if !self.hidden_too && skip_hidden(self.ws, self.config, ao, state) {
            return FindControl::SkipChildren;
        }
        let Ok(r) = ao.location() else {
            return FindControl::Continue;
        };
        let Some(rect) = self.clip.apply(r) else {
            return FindControl::Continue;
        };
        self.captured.push(CapturedRect {
            ao: ao.clone(),
            rect,
            state,
            siblings,
        });
        FindControl::Continue
    }
}
