//! Interface marshaling.
//!
//! A node cannot cross a process boundary as a pointer. An
//! [`InterfaceMarshaler`] turns it into opaque bytes on the broker side and
//! back into a live node on the caller side. Marshaled data is single-use:
//! it is either unmarshaled once or released once, never both.
//!
//! [`HandleTable`] is the marshaler used when broker and caller share an
//! address space (loopback brokers and tests): the bytes are a key into a
//! table that holds the node until the caller claims it.

use parking_lot::Mutex;
use slotmap::{DefaultKey, Key, KeyData, SlotMap};

use horizon_probe_core::logging::targets;
use horizon_probe_core::{Error, MarshalSide, NodeRef, Result};

/// Converts nodes to and from process-boundary-safe bytes.
pub trait InterfaceMarshaler: Send + Sync {
    /// Marshal `node`. The data keeps the node alive until it is unmarshaled
    /// or released.
    fn marshal(&self, node: &NodeRef) -> Result<Vec<u8>>;

    /// Claim the node behind `data`.
    fn unmarshal(&self, data: &[u8]) -> Result<NodeRef>;

    /// Discard `data` without claiming the node.
    fn release(&self, data: &[u8]) -> Result<()>;
}

/// Same-address-space marshaler backed by a slot map.
#[derive(Debug, Default)]
pub struct HandleTable {
    slots: Mutex<SlotMap<DefaultKey, NodeRef>>,
}

const KEY_SIZE: usize = 8;

impl HandleTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of marshaled nodes not yet claimed or released.
    pub fn live_count(&self) -> usize {
        self.slots.lock().len()
    }

    fn key(data: &[u8]) -> Result<DefaultKey> {
        let bytes: [u8; KEY_SIZE] = data
            .try_into()
            .map_err(|_| Error::marshal(MarshalSide::Client))?;
        Ok(KeyData::from_ffi(u64::from_le_bytes(bytes)).into())
    }

    fn take(&self, data: &[u8]) -> Result<NodeRef> {
        let key = Self::key(data)?;
        self.slots.lock().remove(key).ok_or_else(|| {
            tracing::debug!(target: targets::MARSHAL, "stale or reused interface data");
            Error::marshal(MarshalSide::Client)
        })
    }
}

impl InterfaceMarshaler for HandleTable {
    fn marshal(&self, node: &NodeRef) -> Result<Vec<u8>> {
        let key = self.slots.lock().insert(node.clone());
        Ok(key.data().as_ffi().to_le_bytes().to_vec())
    }

    fn unmarshal(&self, data: &[u8]) -> Result<NodeRef> {
        self.take(data)
    }

    fn release(&self, data: &[u8]) -> Result<()> {
        self.take(data).map(drop)
    }
}

static_assertions::assert_impl_all!(HandleTable: Send, Sync);
