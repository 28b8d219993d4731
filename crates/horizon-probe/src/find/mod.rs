//! Find/match engine.
//!
//! A depth-first walk of an accessible tree that tests every visited object
//! against a [`FindSpec`] and reports matches to a [`FindSink`]:
//!
//! - [`params`]: parsing the textual find parameters
//! - [`engine`]: the traversal and per-object match state machine
//! - [`document`]: locating the page document of a browser window
//! - [`rects`]: capturing and post-filtering rectangles of every object
//!
//! # Example
//!
//! ```ignore
//! use horizon_probe::find::{FindControl, FindSpec, Finder};
//!
//! let spec = FindSpec::parse(&request, &ctx.config)?;
//! let mut found = None;
//! let mut sink = |ao: &Ao| {
//!     found = Some(ao.clone());
//!     FindControl::StopFound
//! };
//! Finder::new(&ctx, &spec, &mut sink).find_in_window(w)?;
//! ```

pub mod document;
pub mod engine;
pub mod params;
pub mod rects;

use horizon_probe_core::logging::targets;
use horizon_probe_core::{Ao, State};

pub use document::{DocumentFilter, find_document, find_document_simple};
pub use engine::Finder;
pub use params::{ControlFilter, FindSpec, PropFilter, RectFilter};
pub use rects::{CapturedRect, RectCapture, RectClip, filter_rects, skip_hidden};

/// What a sink wants the engine to do after a callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FindControl {
    /// Go on, including the object's children.
    Continue,
    /// Go on, but not into the object's children.
    SkipChildren,
    /// Stop; the search succeeded.
    StopFound,
    /// Stop; the search did not find anything.
    StopNotFound,
}

/// Receives objects from the engine.
///
/// The engine lends each object; a sink that keeps one clones it, which
/// takes a reference of its own.
pub trait FindSink {
    /// An object passed every filter.
    fn on_match(&mut self, ao: &Ao) -> FindControl;

    /// Rectangle capture mode: called for every visited object instead of
    /// matching. `siblings` is the number of children of the object's parent.
    fn on_visit(&mut self, _ao: &Ao, _state: State, _siblings: usize) -> FindControl {
        FindControl::Continue
    }
}

impl<F: FnMut(&Ao) -> FindControl> FindSink for F {
    fn on_match(&mut self, ao: &Ao) -> FindControl {
        self(ao)
    }
}

/// Sink that keeps the match after `skip` earlier ones.
#[derive(Debug, Default)]
pub struct FirstMatch {
    skip: u32,
    found: Option<Ao>,
}

impl FirstMatch {
    pub fn new(skip: u32) -> Self {
        Self { skip, found: None }
    }

    pub fn into_found(self) -> Option<Ao> {
        self.found
    }
}

impl FindSink for FirstMatch {
    fn on_match(&mut self, ao: &Ao) -> FindControl {
        if self.skip > 0 {
            self.skip -= 1;
            return FindControl::Continue;
        }
        self.found = Some(ao.clone());
        FindControl::StopFound
    }
}

/// Per-object outcome of a visit, as seen by the walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flow {
    Continue,
    SkipChildren,
    Stop,
}

/// Something that visits objects of a walk.
pub(crate) trait Visit {
    fn visit(&mut self, ao: &mut Ao, level: usize, siblings: usize) -> Flow;
}

/// Children of `parent`, at most `max`, in native or reverse order.
///
/// Sub-elements have no children. A failing backend yields none.
pub(crate) fn children(parent: &Ao, max: usize, reverse: bool) -> Vec<Ao> {
    if parent.elem() != 0 {
        return Vec::new();
    }
    let mut kids: Vec<Ao> = match parent.node().children() {
        Ok(kids) => kids
            .into_iter()
            .take(max)
            .map(|c| Ao::child_of(parent, c))
            .collect(),
        Err(e) => {
            tracing::trace!(target: targets::FIND, error = %e, "failed to get children");
            Vec::new()
        }
    };
    if reverse {
        kids.reverse();
    }
    kids
}

/// Walk the children of `parent` at `level`. Returns whether a visit
/// stopped the walk.
pub(crate) fn walk(
    v: &mut dyn Visit,
    parent: &Ao,
    level: usize,
    max_children: usize,
    reverse: bool,
) -> bool {
    let kids = children(parent, max_children, reverse);
    let siblings = kids.len();
    for mut child in kids {
        match v.visit(&mut child, level, siblings) {
            Flow::Stop => return true,
            Flow::SkipChildren => {}
            Flow::Continue => {
                if walk(v, &child, level + 1, max_children, reverse) {
                    return true;
                }
            }
        }
    }
    false
}

/// Lazily read state of one object. A failed read counts as no state.
#[derive(Debug, Default)]
pub(crate) struct LazyState(Option<State>);

impl LazyState {
    pub(crate) fn get(&mut self, ao: &Ao) -> State {
        *self.0.get_or_insert_with(|| ao.state().unwrap_or_default())
    }
}
