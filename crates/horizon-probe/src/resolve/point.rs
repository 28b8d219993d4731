//! The object at a screen point.
//!
//! Two adjustments are made to what the backend reports:
//!
//! - A large legacy container (pane, client, grouping...) is replaced by the
//!   modern element at the point when that element is much smaller, with
//!   [`PointFlags::OR_UIA`].
//! - With [`PointFlags::PREFER_LINK`], the text or image inside a link or
//!   button is replaced by the link or button.

use horizon_probe_core::logging::targets;
use horizon_probe_core::{
    Ao, Error, MiscFlags, Point, PointFlags, Result, Role, SpecialWindow, WindowHandle,
};

use crate::context::Context;

/// Legacy roles too coarse to be the answer when the modern backend can do
/// better.
const CONTAINER_ROLES: [Role; 9] = [
    Role::APPLICATION,
    Role::CLIENT,
    Role::DIALOG,
    Role::GROUPING,
    Role::PAGETAB,
    Role::PAGETABLIST,
    Role::PANE,
    Role::PROPERTYPAGE,
    Role::WINDOW,
];

/// The object at `p`, resolved in this process.
///
/// `w` is the window the caller saw under the point. In process, the point
/// must still be over `w` (or over a window of this thread), else the result
/// is [`Error::WindowChanged`] and the caller retries. With
/// [`PointFlags::DPI_SCALED_`] the point is physical and converted to the
/// logical space of `w` first.
pub fn from_point_local(
    ctx: &Context,
    p: Point,
    flags: PointFlags,
    special: SpecialWindow,
    w: WindowHandle,
    in_proc: bool,
) -> Result<Ao> {
    let ws = ctx.windows.as_ref();
    let mut p = p;
    if in_proc {
        match ws.window_from_point(p) {
            Some(now) if now == w || ws.is_of_this_thread(now) => {}
            now => {
                tracing::debug!(target: targets::RESOLVE, expected = %w, ?now, "window under point changed");
                return Err(Error::WindowChanged);
            }
        }
        if flags.contains(PointFlags::DPI_SCALED_) {
            p = ws.physical_to_logical(w, p).ok_or(Error::NotFound)?;
        }
    }

    let mut ao = if flags.contains(PointFlags::UIA) {
        ctx.modern_ao(ctx.backends.modern_from_point(p)?)
    } else {
        match ctx.backends.legacy_from_point(p) {
            Ok((node, elem)) => Ao::with_flags(node, elem, MiscFlags::empty()),
            Err(e) if flags.contains(PointFlags::OR_UIA) => {
                tracing::trace!(target: targets::RESOLVE, error = %e, "legacy hit test failed, trying modern");
                ctx.modern_ao(ctx.backends.modern_from_point(p)?)
            }
            Err(e) => return Err(e),
        }
    };
    let role = ao.ensure_role();

    if special == SpecialWindow::None
        && flags.contains(PointFlags::OR_UIA)
        && !ao.flags().contains(MiscFlags::UIA)
        && CONTAINER_ROLES.contains(&role)
    {
        if let Some(finer) = finer_modern(ctx, &ao, p) {
            ao = finer;
        }
    }

    if flags.contains(PointFlags::PREFER_LINK) {
        if let Some(link) = link_parent(&ao) {
            ao = link;
        }
    }

    if in_proc {
        ao.insert_flags(MiscFlags::IN_PROC);
    }
    tracing::trace!(target: targets::RESOLVE, point = ?p, ao = ?ao, "object from point");
    Ok(ao)
}

/// The modern element at `p`, if it is less than half the size of `legacy`.
fn finer_modern(ctx: &Context, legacy: &Ao, p: Point) -> Option<Ao> {
    let legacy_area = legacy.location().ok()?.area();
    let element = ctx.backends.modern_from_point(p).ok()?;
    let mut modern = ctx.modern_ao(element);
    let area = modern.location().ok()?.area();
    if area > 0 && area * 2 < legacy_area && modern.ensure_role() != Role::DOCUMENT {
        Some(modern)
    } else {
        None
    }
}

/// The link or button that contains `ao`, if `ao` is its label or image.
fn link_parent(ao: &Ao) -> Option<Ao> {
    let role = ao.role_byte();
    if role.is_link_or_button() {
        return None;
    }
    let inherit = ao.flags() & MiscFlags::INHERIT;
    let parent_node = if ao.elem() != 0 {
        ao.node().clone()
    } else {
        ao.node().parent().ok()??
    };
    let mut parent = Ao::with_flags(parent_node, 0, inherit);
    let parent_role = parent.ensure_role();

    let use_parent = if parent_role.is_link_or_button() {
        true
    } else if parent_role == Role::STATICTEXT {
        role == Role::STATICTEXT
    } else if matches!(parent_role, Role::NONE | Role::CUSTOM | Role::GROUPING | Role::GRAPHIC) {
        false
    } else {
        let item_parent = matches!(parent_role, Role::LISTITEM | Role::OUTLINEITEM | Role::MENUITEM);
        (!ao.flags().contains(MiscFlags::UIA) || item_parent)
            && matches!(role, Role::STATICTEXT | Role::TEXT | Role::GRAPHIC)
            && parent.node().child_count().ok() == Some(1)
            && parent.name().ok().flatten().is_some_and(|n| !n.is_empty())
    };
    (use_parent && parent.window().is_some()).then_some(parent)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use horizon_probe_core::{NodeRef, ProbeConfig, Rect, RoleValue};

    use super::*;
    use crate::mock::{MockDesktop, MockElement, MockNode, MockWindow};
    use crate::shim::{ElementRef, control_type};

    const W: WindowHandle = WindowHandle(0x90);

    fn setup() -> (Arc<MockDesktop>, Context) {
        let d = MockDesktop::new();
        d.add_window(MockWindow::top_level(W, "App").rect(Rect::new(0, 0, 400, 400)));
        let ctx = Context::new(d.clone(), d.clone(), ProbeConfig::default());
        (d, ctx)
    }

    fn name(ao: &Ao) -> String {
        ao.name().unwrap().unwrap_or_default()
    }

    #[test]
    fn test_legacy_hit() {
        let (d, ctx) = setup();
        let button: NodeRef = MockNode::build(Role::PUSHBUTTON, "OK").window(W).finish();
        d.add_point_target(Rect::new(10, 10, 50, 30), Some((button, 0)), None);
        let ao = from_point_local(&ctx, Point::new(20, 20), PointFlags::empty(), SpecialWindow::None, W, false)
            .unwrap();
        assert_eq!(name(&ao), "OK");
        assert_eq!(ao.role_byte(), Role::PUSHBUTTON);
        assert!(!ao.is_in_proc());

        let err = from_point_local(&ctx, Point::new(300, 300), PointFlags::empty(), SpecialWindow::None, W, false)
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_window_changed_in_proc() {
        let (d, ctx) = setup();
        let button: NodeRef = MockNode::build(Role::PUSHBUTTON, "OK").window(W).finish();
        d.add_point_target(Rect::new(10, 10, 50, 30), Some((button, 0)), None);
        d.add_window(MockWindow::top_level(WindowHandle(0x91), "Other").rect(Rect::new(500, 0, 600, 100)));
        d.script_window_from_point([WindowHandle(0x91)]);
        let err = from_point_local(&ctx, Point::new(20, 20), PointFlags::empty(), SpecialWindow::None, W, true)
            .unwrap_err();
        assert!(matches!(err, Error::WindowChanged));

        let ao = from_point_local(&ctx, Point::new(20, 20), PointFlags::empty(), SpecialWindow::None, W, true)
            .unwrap();
        assert!(ao.is_in_proc());
    }

    #[test]
    fn test_modern_replaces_coarse_container() {
        let (d, ctx) = setup();
        let pane: NodeRef = MockNode::build(Role::PANE, "").rect(Rect::new(0, 0, 400, 400)).window(W).finish();
        let edit: ElementRef = MockElement::build(control_type::EDIT, "Search").rect(Rect::new(10, 10, 110, 30)).finish();
        d.add_point_target(Rect::new(0, 0, 400, 400), Some((pane, 0)), Some(edit));

        let flags = PointFlags::OR_UIA;
        let ao = from_point_local(&ctx, Point::new(20, 20), flags, SpecialWindow::None, W, false).unwrap();
        assert_eq!(name(&ao), "Search");
        assert!(ao.flags().contains(MiscFlags::UIA));

        // not for browsers, and not without the flag
        let ao = from_point_local(&ctx, Point::new(20, 20), flags, SpecialWindow::Chrome, W, false).unwrap();
        assert_eq!(ao.role_byte(), Role::PANE);
        let ao = from_point_local(&ctx, Point::new(20, 20), PointFlags::empty(), SpecialWindow::None, W, false)
            .unwrap();
        assert_eq!(ao.role_byte(), Role::PANE);
    }

    #[test]
    fn test_modern_fallback() {
        let (d, ctx) = setup();
        let edit: ElementRef = MockElement::build(control_type::EDIT, "Search").rect(Rect::new(10, 10, 110, 30)).finish();
        d.add_point_target(Rect::new(0, 0, 400, 400), None, Some(edit));
        let err = from_point_local(&ctx, Point::new(20, 20), PointFlags::empty(), SpecialWindow::None, W, false)
            .unwrap_err();
        assert!(err.is_not_found());
        let ao = from_point_local(&ctx, Point::new(20, 20), PointFlags::OR_UIA, SpecialWindow::None, W, false)
            .unwrap();
        assert_eq!(name(&ao), "Search");
    }

    #[test]
    fn test_prefer_link() {
        let (d, ctx) = setup();
        let tree = MockNode::build(Role::CLIENT, "")
            .window(W)
            .child(MockNode::build(Role::LINK, "Home").child(MockNode::build(Role::STATICTEXT, "Home")))
            .child(MockNode::build(Role::LISTITEM, "Row").child(MockNode::build(Role::GRAPHIC, "icon")))
            .child(MockNode::build(RoleValue::Custom("div".into()), "x").child(MockNode::build(Role::STATICTEXT, "t")))
            .finish();
        let label: NodeRef = tree.find("Home").unwrap().child(0).unwrap();
        let icon: NodeRef = tree.find("icon").unwrap();
        let text: NodeRef = tree.find("t").unwrap();
        d.add_point_target(Rect::new(0, 0, 10, 10), Some((label, 0)), None);
        d.add_point_target(Rect::new(20, 0, 30, 10), Some((icon, 0)), None);
        d.add_point_target(Rect::new(40, 0, 50, 10), Some((text, 0)), None);

        let at = |x: i32, flags: PointFlags| {
            from_point_local(&ctx, Point::new(x, 5), flags, SpecialWindow::None, W, false).unwrap()
        };
        assert_eq!(at(5, PointFlags::PREFER_LINK).role_byte(), Role::LINK);
        assert_eq!(at(5, PointFlags::empty()).role_byte(), Role::STATICTEXT);
        assert_eq!(at(25, PointFlags::PREFER_LINK).role_byte(), Role::LISTITEM);
        assert_eq!(at(45, PointFlags::PREFER_LINK).role_byte(), Role::STATICTEXT);
    }

    #[test]
    fn test_dpi_scaled_point() {
        let d = MockDesktop::new();
        d.add_window(MockWindow::top_level(W, "App").rect(Rect::new(0, 0, 400, 400)).dpi_scaled(200));
        let ctx = Context::new(d.clone(), d.clone(), ProbeConfig::default());
        let small: NodeRef = MockNode::build(Role::PUSHBUTTON, "logical").window(W).finish();
        d.add_point_target(Rect::new(0, 0, 60, 60), Some((small, 0)), None);
        d.script_window_from_point([W]);
        let flags = PointFlags::DPI_SCALED_;
        let ao = from_point_local(&ctx, Point::new(100, 100), flags, SpecialWindow::None, W, true).unwrap();
        assert_eq!(name(&ao), "logical");
    }
}
