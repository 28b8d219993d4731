//! The focused object.

use horizon_probe_core::logging::targets;
use horizon_probe_core::{Ao, Child, Error, FocusFlags, MiscFlags, ObjectId, Result, WindowHandle};

use crate::context::Context;

/// The focused object of window `w`, resolved in this process.
///
/// The legacy backend is asked for the focus of the client object, then of
/// each focused child in turn, until an object reports itself or a
/// sub-element.
pub fn focused_local(ctx: &Context, w: WindowHandle, flags: FocusFlags, in_proc: bool) -> Result<Ao> {
    let mut ao = if flags.contains(FocusFlags::UIA) {
        ctx.modern_ao(ctx.backends.modern_focused()?)
    } else {
        legacy_focus(ctx, w)?
    };
    if in_proc {
        ao.insert_flags(MiscFlags::IN_PROC);
    }
    ao.ensure_role();
    tracing::trace!(target: targets::RESOLVE, window = %w, ao = ?ao, "focused object");
    Ok(ao)
}

fn legacy_focus(ctx: &Context, w: WindowHandle) -> Result<Ao> {
    let client = ctx
        .backends
        .legacy_from_window(w, ObjectId::CLIENT)
        .map_err(|e| if matches!(e, Error::WindowGone) { e } else { Error::NotFound })?;
    let mut cur = Ao::new(client);
    let max = ctx.config.find.max_level as usize;

    for depth in 0..=max {
        match cur.node().focus()? {
            None if depth == 0 => return Err(Error::NotFound),
            None | Some(Child::Element(0)) => return Ok(cur),
            Some(Child::Element(elem)) => return Ok(Ao::with_flags(cur.node().clone(), elem, cur.flags())),
            Some(Child::Node(node)) => cur = Ao::with_flags(node, 0, cur.flags()),
        }
    }
    Ok(cur)
}
