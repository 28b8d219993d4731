//! Broker and injector for a target in the caller's own process.
//!
//! Blocks still go through the full marshal and unmarshal path, with a
//! [`HandleTable`] standing in for cross-process interface marshaling. Used
//! by tests and by hosts that embed the probe in the application it
//! inspects.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;

use horizon_probe_core::logging::targets;
use horizon_probe_core::{Error, InjectFailure, Result, WindowHandle};
use horizon_probe_marshal::{BrokerReply, HandleTable, InterfaceMarshaler};

use super::BrokerServer;
use crate::context::Context;
use crate::platform::{Broker, Injector};

/// A broker that runs calls synchronously on the calling thread.
pub struct LoopbackBroker {
    table: Arc<HandleTable>,
    server: BrokerServer,
    dead: AtomicBool,
    calls: AtomicUsize,
}

impl LoopbackBroker {
    /// A broker whose server side resolves with `ctx`.
    pub fn new(ctx: Context) -> Arc<Self> {
        let table = Arc::new(HandleTable::new());
        let server = BrokerServer::new(ctx, table.clone());
        Arc::new(Self {
            table,
            server,
            dead: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        })
    }

    /// Make every further call fail, as when the target process exits.
    pub fn kill(&self) {
        self.dead.store(true, Ordering::Relaxed);
    }

    /// Number of calls received, including failed ones.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }

    /// Marshaled objects neither claimed nor released yet.
    pub fn live_handles(&self) -> usize {
        self.table.live_count()
    }
}

impl Broker for LoopbackBroker {
    fn call(&self, block: &[u8]) -> Result<BrokerReply> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        if self.dead.load(Ordering::Relaxed) {
            tracing::debug!(target: targets::BRIDGE, "loopback broker is dead");
            return Err(Error::BackendUnavailable(InjectFailure::BrokerDead));
        }
        // through the byte framing, as a real transport would
        let reply = self.server.handle(block);
        BrokerReply::from_bytes(&reply.to_bytes())
    }

    fn marshaler(&self) -> &dyn InterfaceMarshaler {
        self.table.as_ref()
    }
}

impl std::fmt::Debug for LoopbackBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopbackBroker")
            .field("dead", &self.dead)
            .field("calls", &self.calls)
            .finish_non_exhaustive()
    }
}

/// Hands out one [`LoopbackBroker`] for every window.
#[derive(Debug)]
pub struct LoopbackInjector {
    broker: Arc<LoopbackBroker>,
    failure: Mutex<Option<InjectFailure>>,
    requests: AtomicUsize,
}

impl LoopbackInjector {
    pub fn new(broker: Arc<LoopbackBroker>) -> Self {
        Self {
            broker,
            failure: Mutex::new(None),
            requests: AtomicUsize::new(0),
        }
    }

    /// Fail every further request with `failure`, or stop failing.
    pub fn fail_with(&self, failure: Option<InjectFailure>) {
        *self.failure.lock() = failure;
    }

    /// Number of broker requests.
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::Relaxed)
    }

    pub fn broker(&self) -> &Arc<LoopbackBroker> {
        &self.broker
    }
}

impl Injector for LoopbackInjector {
    fn broker_for_window(&self, w: WindowHandle) -> std::result::Result<Arc<dyn Broker>, InjectFailure> {
        self.requests.fetch_add(1, Ordering::Relaxed);
        if let Some(failure) = *self.failure.lock() {
            tracing::trace!(target: targets::BRIDGE, window = %w, ?failure, "injection refused");
            return Err(failure);
        }
        Ok(self.broker.clone())
    }
}
