//! The in-process call bridge.
//!
//! A caller that wants a query executed inside the process that owns a
//! window gets a [`Broker`] from the injector and talks to it through a
//! [`BridgeCall`]:
//!
//! 1. the request is marshaled into a parameter block, together with the
//!    target object if there is one
//! 2. the broker runs it synchronously, on a thread of the target process
//! 3. the reply payload is decoded: a result stream, a property value or text
//!
//! The other side of the link is [`BrokerServer`]. [`loopback`] connects the
//! two within one process.
//!
//! # Example
//!
//! ```ignore
//! use horizon_probe::bridge::BridgeCall;
//! use horizon_probe_marshal::FocusedRequest;
//!
//! let bridge = BridgeCall::new(injector.broker_for_window(w)?);
//! let payload = bridge.call(&FocusedRequest { flags }, w, None)?;
//! let ao = bridge.first_result(payload)?;
//! ```

pub mod loopback;
pub mod server;

use std::sync::Arc;

use horizon_probe_core::logging::{span_names, targets};
use horizon_probe_core::{Ao, Error, InjectFailure, MarshalSide, MiscFlags, Result, WindowHandle};
use horizon_probe_marshal::{InterfaceMarshaler, PropValue, Request, ResultReader, block, params};

pub use loopback::{LoopbackBroker, LoopbackInjector};
pub use server::BrokerServer;

use crate::platform::Broker;

/// One broker link, used for any number of sequential calls.
#[derive(Clone)]
pub struct BridgeCall {
    broker: Arc<dyn Broker>,
}

impl BridgeCall {
    pub fn new(broker: Arc<dyn Broker>) -> Self {
        Self { broker }
    }

    pub fn marshaler(&self) -> &dyn InterfaceMarshaler {
        self.broker.marshaler()
    }

    /// Send `req` for window `window` and wait for the reply payload.
    ///
    /// `target` travels as marshaled interface data. Its sub-element index
    /// does not; requests that need one carry it in their own fields.
    ///
    /// A failed link is reported as [`InjectFailure::BrokerDead`], so that
    /// the caller can fall back to searching out of process. Errors of the
    /// action itself come back unchanged.
    pub fn call<R: Request>(&self, req: &R, window: WindowHandle, target: Option<&Ao>) -> Result<Vec<u8>> {
        let _span = tracing::trace_span!(
            target: targets::BRIDGE,
            span_names::BRIDGE_CALL,
            action = ?R::ACTION,
            %window
        )
        .entered();

        let marshaler = self.marshaler();
        let target_data = target.map(|ao| marshaler.marshal(ao.node())).transpose()?;
        let misc = target.map_or(MiscFlags::empty(), |ao| ao.flags() & MiscFlags::INHERIT);
        let block = params::marshal(req, window, misc, target_data.as_deref());

        match self.broker.call(&block) {
            Ok(reply) => {
                tracing::trace!(target: targets::BRIDGE, status = reply.status, bytes = reply.payload.len(), "broker replied");
                reply.into_result()
            }
            Err(e) => {
                // the broker never claimed the target
                if let Some(data) = &target_data {
                    let _ = marshaler.release(data);
                }
                tracing::debug!(target: targets::BRIDGE, error = %e, "broker call failed");
                Err(Error::BackendUnavailable(InjectFailure::BrokerDead))
            }
        }
    }

    /// Reader over a result stream payload.
    pub fn results(&self, payload: Vec<u8>) -> ResultReader<'_> {
        ResultReader::new(self.marshaler(), payload)
    }

    /// The first record of a result stream. Further records are released.
    ///
    /// An empty stream is a client-side marshaling failure: a successful
    /// single-object reply always carries one record.
    pub fn first_result(&self, payload: Vec<u8>) -> Result<Ao> {
        let mut reader = self.results(payload);
        match reader.next_record()? {
            Some(record) => Ok(record.ao),
            None => Err(Error::marshal(MarshalSide::Client)),
        }
    }

    /// Decode a property reply.
    pub fn property(&self, payload: &[u8]) -> Result<PropValue> {
        PropValue::decode(payload)
    }

    /// Decode a text reply.
    pub fn text(&self, payload: &[u8]) -> Result<String> {
        block::decode_text(payload)
    }
}

impl std::fmt::Debug for BridgeCall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeCall").finish_non_exhaustive()
    }
}
