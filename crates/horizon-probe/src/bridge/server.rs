//! The broker side of the call bridge.
//!
//! A [`BrokerServer`] runs inside the process that owns the target window.
//! It decodes one parameter block, runs the action with its own
//! [`Context`] and encodes the outcome as a [`BrokerReply`].

use std::sync::Arc;

use horizon_probe_core::logging::targets;
use horizon_probe_core::{Ao, Error, FindFlags, MiscFlags, Result, SearchScope, WindowHandle};
use horizon_probe_marshal::{
    ActionKind, BrokerReply, EnableBrowserRequest, FindRequest, FocusedRequest, FromPointRequest,
    FromWindowRequest, GetHtmlRequest, Header, InterfaceMarshaler, NavigateRequest, ResultWriter,
    block, params,
};

use crate::browser;
use crate::context::Context;
use crate::dpi::DpiScaler;
use crate::find::{FindControl, FindSink, FindSpec, Finder, FirstMatch, RectCapture, RectClip};
use crate::resolve::{self, NavPath, PropSelector, WindowObject};

/// Executes parameter blocks in the target process.
pub struct BrokerServer {
    ctx: Context,
    marshaler: Arc<dyn InterfaceMarshaler>,
}

impl BrokerServer {
    pub fn new(ctx: Context, marshaler: Arc<dyn InterfaceMarshaler>) -> Self {
        Self { ctx, marshaler }
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    /// Run one call. Never fails: errors travel in the reply status.
    pub fn handle(&self, block: &[u8]) -> BrokerReply {
        match self.dispatch(block) {
            Ok(payload) => BrokerReply::ok(payload),
            Err(e) => {
                tracing::debug!(target: targets::BRIDGE, error = %e, "broker action failed");
                BrokerReply::from_error(&e)
            }
        }
    }

    fn dispatch(&self, block: &[u8]) -> Result<Vec<u8>> {
        let header = Header::peek(block)?;
        // claim the target first, so that it is released on every path
        let target = match header.target_data(block)? {
            Some(data) => {
                let node = self.marshaler.unmarshal(data)?;
                Some(Ao::with_flags(node, 0, (header.misc & MiscFlags::INHERIT) | MiscFlags::IN_PROC))
            }
            None => None,
        };
        tracing::trace!(target: targets::BRIDGE, action = ?header.action, window = %header.window, "broker call");

        match header.action {
            ActionKind::Find => {
                let (_, req) = params::unmarshal::<FindRequest>(block)?;
                self.find(&header, target.as_ref(), &req)
            }
            ActionKind::Navigate => {
                let (_, req) = params::unmarshal::<NavigateRequest>(block)?;
                let from = target.ok_or_else(|| Error::invalid_parameter("Missing navigation origin."))?;
                let from = Ao::with_flags(from.node().clone(), req.elem, from.flags());
                let path: NavPath = req.path.parse()?;
                let mut to = resolve::navigate(&from, &path)?;
                to.ensure_role();
                self.single(&to)
            }
            ActionKind::FromWindow => {
                let (_, req) = params::unmarshal::<FromWindowRequest>(block)?;
                match resolve::from_window_local(&self.ctx, header.window, req.object_id, req.flags, true)? {
                    WindowObject::Object(ao) => self.single(&ao),
                    WindowObject::Name(name) => Ok(block::encode_text(&name)),
                }
            }
            ActionKind::FromPoint => {
                let (_, req) = params::unmarshal::<FromPointRequest>(block)?;
                let ao = resolve::from_point_local(&self.ctx, req.point, req.flags, req.special, header.window, true)?;
                self.single(&ao)
            }
            ActionKind::Focused => {
                let (_, req) = params::unmarshal::<FocusedRequest>(block)?;
                let ao = resolve::focused_local(&self.ctx, header.window, req.flags, true)?;
                self.single(&ao)
            }
            ActionKind::GetHtml => {
                let (_, req) = params::unmarshal::<GetHtmlRequest>(block)?;
                let ao = target.ok_or_else(|| Error::invalid_parameter("Missing HTML element."))?;
                Ok(block::encode_text(&browser::html(&ao, &req.what)?))
            }
            ActionKind::EnableBrowser => {
                let (_, req) = params::unmarshal::<EnableBrowserRequest>(block)?;
                let control = req.control.non_null();
                browser::enable_attempt(&self.ctx, header.window, req.attempt, control)?;
                Ok(Vec::new())
            }
        }
    }

    /// One object as a result stream.
    fn single(&self, ao: &Ao) -> Result<Vec<u8>> {
        let mut writer = ResultWriter::new(self.marshaler.as_ref(), false);
        writer.write(ao, None)?;
        Ok(writer.finish())
    }

    fn find(&self, header: &Header, target: Option<&Ao>, req: &FindRequest) -> Result<Vec<u8>> {
        let ctx = &self.ctx;
        let spec = FindSpec::parse(req, &ctx.config)?;
        let run = |sink: &mut dyn FindSink| -> Result<()> {
            let finder = Finder::new(ctx, &spec, sink);
            match target {
                Some(root) => finder.find_in_object(root),
                None if header.window != WindowHandle::NULL => finder.find_in_window(header.window),
                None => Err(Error::invalid_parameter("Missing search root.")),
            }
        };

        // a writer dropped on an error path releases the handles it holds
        if spec.scope.contains(SearchScope::GET_RECTS) {
            let ws = ctx.windows.as_ref();
            let clip = RectClip::Dpi(DpiScaler::new(ws, header.window, true));
            let hidden_too = spec.flags.contains(FindFlags::HIDDEN_TOO);
            let mut capture = RectCapture::new(ws, &ctx.config.rects, hidden_too, clip);
            not_found_is_ok(run(&mut capture))?;
            let mut writer = ResultWriter::new(self.marshaler.as_ref(), true);
            for c in capture.finish() {
                writer.write(&c.ao, Some(&c.rect))?;
            }
            return Ok(writer.finish());
        }

        if spec.scope.contains(SearchScope::FIND_ALL) {
            let mut writer = ResultWriter::new(self.marshaler.as_ref(), true);
            let mut failed = None;
            let mut sink = |ao: &Ao| match writer.write(ao, None) {
                Ok(()) => FindControl::Continue,
                Err(e) => {
                    failed = Some(e);
                    FindControl::StopNotFound
                }
            };
            let searched = run(&mut sink);
            if let Some(e) = failed.or_else(|| not_found_is_ok(searched).err()) {
                writer.discard();
                return Err(e);
            }
            return Ok(writer.finish());
        }

        let mut first = FirstMatch::new(req.skip.max(0) as u32);
        run(&mut first)?;
        let ao = first.into_found().ok_or(Error::NotFound)?;
        match req.result_prop {
            Some('-') => Ok(Vec::new()),
            Some(c) => {
                let selector = PropSelector::from_char(c)?;
                Ok(resolve::get_property(ctx, &ao, &selector)?.encode())
            }
            None => self.single(&ao),
        }
    }
}

/// A search that matched nothing still yields an empty stream.
fn not_found_is_ok(r: Result<()>) -> Result<()> {
    match r {
        Err(Error::NotFound) => Ok(()),
        r => r,
    }
}

impl std::fmt::Debug for BrokerServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrokerServer").field("ctx", &self.ctx).finish_non_exhaustive()
    }
}
