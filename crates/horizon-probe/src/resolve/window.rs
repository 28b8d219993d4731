//! Object of a window part.

use horizon_probe_core::logging::targets;
use horizon_probe_core::{Ao, Error, MiscFlags, ObjectId, Result, StringProp, WindowFlags, WindowHandle};

use crate::context::Context;

/// What resolving a window object produced.
#[derive(Debug, Clone)]
pub enum WindowObject {
    Object(Ao),
    /// The object's name, with [`WindowFlags::NAME`].
    Name(String),
}

impl WindowObject {
    pub fn into_object(self) -> Option<Ao> {
        match self {
            Self::Object(ao) => Some(ao),
            Self::Name(_) => None,
        }
    }
}

/// Resolve object `id` of window `w` in this process.
///
/// [`ObjectId::JAVA`] and [`ObjectId::UIA`] select the root of the Java and
/// modern trees; any other id is a legacy window part. `in_proc` marks the
/// result as obtained inside the window's process.
pub fn from_window_local(
    ctx: &Context,
    w: WindowHandle,
    id: ObjectId,
    flags: WindowFlags,
    in_proc: bool,
) -> Result<WindowObject> {
    if !ctx.windows.is_window(w) {
        return Err(Error::WindowGone);
    }
    let mut ao = match id {
        ObjectId::JAVA => {
            let root = ctx.backends.java_from_window(w, false).ok_or(Error::NotFound)?;
            Ao::with_flags(root, 0, MiscFlags::JAVA)
        }
        ObjectId::UIA => ctx.modern_ao(ctx.backends.modern_from_window(w)?),
        id => Ao::new(ctx.backends.legacy_from_window(w, id)?),
    };

    if flags.contains(WindowFlags::NAME) {
        let name = ao.string_prop(StringProp::Name)?.unwrap_or_default();
        return Ok(WindowObject::Name(name));
    }
    if in_proc {
        ao.insert_flags(MiscFlags::IN_PROC);
    }
    ao.ensure_role();
    tracing::trace!(target: targets::RESOLVE, window = %w, id = id.0, ao = ?ao, "window object");
    Ok(WindowObject::Object(ao))
}

#[cfg(test)]
mod tests {
    use horizon_probe_core::{BackendKind, ProbeConfig, Role};

    use super::*;
    use crate::mock::{MockDesktop, MockElement, MockNode, MockWindow};
    use crate::shim::control_type;

    const W: WindowHandle = WindowHandle(0x70);

    fn context() -> Context {
        let d = MockDesktop::new();
        d.add_window(
            MockWindow::top_level(W, "Notepad")
                .client(MockNode::build(Role::CLIENT, "Text area").finish())
                .legacy(ObjectId::TITLEBAR, MockNode::build(Role::TITLEBAR, "Untitled").finish())
                .modern(MockElement::build(control_type::WINDOW, "Untitled - Notepad").finish())
                .java(MockNode::build(Role::CUSTOM, "java root").finish(), None),
        );
        Context::new(d.clone(), d, ProbeConfig::default())
    }

    fn object(r: Result<WindowObject>) -> Ao {
        r.unwrap().into_object().unwrap()
    }

    #[test]
    fn test_window_parts() {
        let ctx = context();
        let client = object(from_window_local(&ctx, W, ObjectId::CLIENT, WindowFlags::empty(), false));
        assert_eq!(client.role_byte(), Role::CLIENT);
        assert!(!client.is_in_proc());

        let title = object(from_window_local(&ctx, W, ObjectId::TITLEBAR, WindowFlags::empty(), true));
        assert_eq!(title.role_byte(), Role::TITLEBAR);
        assert!(title.is_in_proc());

        let err = from_window_local(&ctx, W, ObjectId::MENU, WindowFlags::empty(), false).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_backend_roots() {
        let ctx = context();
        let java = object(from_window_local(&ctx, W, ObjectId::JAVA, WindowFlags::empty(), false));
        assert_eq!(java.backend(), BackendKind::Java);
        let modern = object(from_window_local(&ctx, W, ObjectId::UIA, WindowFlags::empty(), false));
        assert_eq!(modern.backend(), BackendKind::Modern);
        assert_eq!(modern.role_byte(), Role::WINDOW);
    }

    #[test]
    fn test_name_only() {
        let ctx = context();
        match from_window_local(&ctx, W, ObjectId::TITLEBAR, WindowFlags::NAME, false).unwrap() {
            WindowObject::Name(n) => assert_eq!(n, "Untitled"),
            other => panic!("expected a name, got {other:?}"),
        }
    }

    #[test]
    fn test_closed_window() {
        let ctx = context();
        let err = from_window_local(&ctx, WindowHandle(0x71), ObjectId::CLIENT, WindowFlags::empty(), false)
            .unwrap_err();
        assert!(matches!(err, Error::WindowGone));
    }
}
