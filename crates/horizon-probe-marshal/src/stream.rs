//! The result stream: a sequence of accessible objects, each with an
//! optional rectangle.
//!
//! Every record starts with a [`RecordBits`] byte telling which fields
//! follow:
//!
//! ```text
//! bits      u8
//! iface     u32 length + marshaled data   unless USE_PREV_AO
//! elem      i32                           if ELEM
//! flags     u8                            always
//! role      u8                            if ROLE
//! level     u16                           if LEVEL
//! rect      4 x i32                       if RECT
//! ```
//!
//! Find-all results are delta-encoded: sibling sub-elements reuse the
//! interface of the record before them, and a level equal to the previous
//! one is not repeated. Readers therefore keep the previous record as a
//! cursor and must read records in order.

use std::sync::Arc;

use horizon_probe_core::logging::targets;
use horizon_probe_core::{Ao, AoMisc, Error, MarshalSide, MiscFlags, NodeRef, Rect, Result, Role};

use crate::marshaler::InterfaceMarshaler;

bitflags::bitflags! {
    /// What a result record contains.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct RecordBits: u8 {
        const ELEM = 1;
        const ROLE = 2;
        const LEVEL = 4;
        const RECT = 8;
        /// No interface data; use the previous record's node.
        const USE_PREV_AO = 0x40;
        /// No level field; use the previous record's level.
        const USE_PREV_LEVEL = 0x80;
    }
}

/// One decoded record.
#[derive(Debug, Clone)]
pub struct ResultRecord {
    pub ao: Ao,
    pub rect: Option<Rect>,
}

/// Appends records to a result stream.
///
/// A writer dropped without [`finish`](Self::finish) releases the handles
/// it has marshaled, so a search that fails halfway leaks nothing.
pub struct ResultWriter<'m> {
    marshaler: &'m dyn InterfaceMarshaler,
    buf: Vec<u8>,
    delta: bool,
    prev_node: Option<NodeRef>,
    prev_level: u16,
    count: usize,
}

impl<'m> ResultWriter<'m> {
    /// `delta` enables reuse of the previous record's interface and level,
    /// for streams of many records.
    pub fn new(marshaler: &'m dyn InterfaceMarshaler, delta: bool) -> Self {
        Self {
            marshaler,
            buf: Vec::new(),
            delta,
            prev_node: None,
            prev_level: 0,
            count: 0,
        }
    }

    /// Number of records written.
    pub fn count(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Append one record. The handle is marked in-process.
    ///
    /// On failure nothing is appended and the delta state is unchanged, so
    /// the caller may skip the object and go on.
    pub fn write(&mut self, ao: &Ao, rect: Option<&Rect>) -> Result<()> {
        let misc = ao.misc();
        let mut bits = RecordBits::empty();
        let reuse_node = self.delta
            && ao.elem() != 0
            && self
                .prev_node
                .as_ref()
                .is_some_and(|p| Arc::ptr_eq(p, ao.node()));
        if reuse_node {
            bits |= RecordBits::USE_PREV_AO;
        }
        if misc.level != 0 {
            bits |= if self.delta && misc.level == self.prev_level {
                RecordBits::USE_PREV_LEVEL
            } else {
                RecordBits::LEVEL
            };
        }
        if ao.elem() != 0 {
            bits |= RecordBits::ELEM;
        }
        if misc.role != Role::NONE {
            bits |= RecordBits::ROLE;
        }
        if rect.is_some() {
            bits |= RecordBits::RECT;
        }

        let start = self.buf.len();
        self.buf.push(bits.bits());
        if !reuse_node {
            match self.marshaler.marshal(ao.node()) {
                Ok(data) => {
                    self.buf.extend_from_slice(&(data.len() as u32).to_le_bytes());
                    self.buf.extend_from_slice(&data);
                }
                Err(e) => {
                    self.buf.truncate(start);
                    tracing::debug!(target: targets::MARSHAL, error = %e, "failed to marshal accessible object");
                    return Err(Error::marshal(MarshalSide::Server));
                }
            }
        }
        if bits.contains(RecordBits::ELEM) {
            self.buf.extend_from_slice(&ao.elem().to_le_bytes());
        }
        self.buf.push((misc.flags | MiscFlags::IN_PROC).bits());
        if bits.contains(RecordBits::ROLE) {
            self.buf.push(misc.role.0);
        }
        if bits.contains(RecordBits::LEVEL) {
            self.buf.extend_from_slice(&misc.level.to_le_bytes());
        }
        if let Some(r) = rect {
            self.buf.extend_from_slice(&r.to_le_bytes());
        }

        if self.delta {
            if !reuse_node {
                self.prev_node = Some(ao.node().clone());
            }
            self.prev_level = misc.level;
        }
        self.count += 1;
        Ok(())
    }

    pub fn finish(mut self) -> Vec<u8> {
        std::mem::take(&mut self.buf)
    }

    /// Drop the records written so far and release their handles.
    pub fn discard(self) {}
}

impl Drop for ResultWriter<'_> {
    fn drop(&mut self) {
        if self.buf.is_empty() {
            return;
        }
        tracing::trace!(target: targets::MARSHAL, records = self.count, "releasing unsent results");
        ResultReader::new(self.marshaler, std::mem::take(&mut self.buf)).release_remaining();
    }
}

/// Reads records written by [`ResultWriter`], in order.
///
/// Records not read are still owned by the stream; call
/// [`ResultReader::release_remaining`] (or drop the reader, which does the
/// same) so the broker-side references are freed.
pub struct ResultReader<'m> {
    marshaler: &'m dyn InterfaceMarshaler,
    data: Vec<u8>,
    pos: usize,
    prev_node: Option<NodeRef>,
    prev_level: u16,
    failed: bool,
}

fn truncated() -> Error {
    Error::marshal(MarshalSide::Client)
}

impl<'m> ResultReader<'m> {
    pub fn new(marshaler: &'m dyn InterfaceMarshaler, data: Vec<u8>) -> Self {
        Self {
            marshaler,
            data,
            pos: 0,
            prev_node: None,
            prev_level: 0,
            failed: false,
        }
    }

    /// Whether every record has been consumed.
    pub fn at_end(&self) -> bool {
        self.pos >= self.data.len()
    }

    fn take(&mut self, n: usize) -> Result<&[u8]> {
        let end = self.pos.checked_add(n).ok_or_else(truncated)?;
        let s = self.data.get(self.pos..end).ok_or_else(truncated)?;
        self.pos = end;
        Ok(s)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        self.take(N)?.try_into().map_err(|_| truncated())
    }

    /// Decode the next record. `Ok(None)` at the end of the stream.
    pub fn next_record(&mut self) -> Result<Option<ResultRecord>> {
        match self.read_record(true)? {
            Some((Some(ao), rect)) => Ok(Some(ResultRecord { ao, rect })),
            Some((None, _)) => Err(truncated()),
            None => Ok(None),
        }
    }

    /// Skip the next record, releasing its interface data. Returns whether
    /// there was a record.
    ///
    /// A record that reuses the skipped record's interface can then only be
    /// skipped too; use this for the tail of a stream.
    pub fn skip_record(&mut self) -> Result<bool> {
        self.read_record(false).map(|r| r.is_some())
    }

    /// Release every record not read yet.
    pub fn release_remaining(&mut self) {
        while !self.failed {
            match self.skip_record() {
                Ok(true) => {}
                Ok(false) | Err(_) => break,
            }
        }
    }

    fn read_record(&mut self, claim: bool) -> Result<Option<(Option<Ao>, Option<Rect>)>> {
        if self.failed {
            return Err(truncated());
        }
        if self.at_end() {
            return Ok(None);
        }
        let r = self.decode(claim);
        if r.is_err() {
            self.failed = true;
            tracing::debug!(target: targets::MARSHAL, pos = self.pos, "malformed result stream");
        }
        r.map(Some)
    }

    fn decode(&mut self, claim: bool) -> Result<(Option<Ao>, Option<Rect>)> {
        let bits = RecordBits::from_bits_retain(self.take_array::<1>()?[0]);

        let node = if bits.contains(RecordBits::USE_PREV_AO) {
            if !bits.contains(RecordBits::ELEM) {
                return Err(truncated());
            }
            if claim {
                Some(self.prev_node.clone().ok_or_else(truncated)?)
            } else {
                None
            }
        } else {
            let len = u32::from_le_bytes(self.take_array::<4>()?) as usize;
            let iface = self.take(len)?.to_vec();
            if claim {
                let node = self.marshaler.unmarshal(&iface).map_err(|_| truncated())?;
                self.prev_node = Some(node.clone());
                Some(node)
            } else {
                // releasing can fail when the broker is gone; nothing to recover
                let _ = self.marshaler.release(&iface);
                self.prev_node = None;
                None
            }
        };

        // parse the whole record before building the handle, so a truncated
        // record never yields an object
        let elem = if bits.contains(RecordBits::ELEM) {
            i32::from_le_bytes(self.take_array::<4>()?)
        } else {
            0
        };
        let flags = MiscFlags::from_bits_retain(self.take_array::<1>()?[0]);
        let role = if bits.contains(RecordBits::ROLE) {
            Role(self.take_array::<1>()?[0])
        } else {
            Role::NONE
        };
        let level = if bits.contains(RecordBits::USE_PREV_LEVEL) {
            self.prev_level
        } else if bits.contains(RecordBits::LEVEL) {
            u16::from_le_bytes(self.take_array::<2>()?)
        } else {
            0
        };
        let rect = if bits.contains(RecordBits::RECT) {
            let b = self.take_array::<{ Rect::WIRE_SIZE }>()?;
            Some(Rect::from_le_bytes(b))
        } else {
            None
        };
        self.prev_level = level;

        let ao = node.filter(|_| claim).map(|node| {
            let mut ao = Ao::with_flags(node, elem, flags);
            ao.set_misc(AoMisc { flags, role, level });
            ao
        });
        Ok((ao, rect))
    }
}

impl Iterator for ResultReader<'_> {
    type Item = Result<ResultRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record().transpose()
    }
}

impl Drop for ResultReader<'_> {
    fn drop(&mut self) {
        self.release_remaining();
    }
}
