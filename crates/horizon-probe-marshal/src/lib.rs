//! Process-boundary encoding for Horizon Probe.
//!
//! Brokers run inside the process that owns the target window. Everything
//! exchanged with them is flat and pointer-free:
//!
//! - **Parameter blocks** ([`params`]): a shared [`Header`](params::Header)
//!   followed by per-action fixed fields and offset-addressed strings
//! - **Result streams** ([`stream`]): delta-encoded accessible-object records
//! - **Replies** ([`reply`]): a status code plus payload
//! - **Interface marshaling** ([`marshaler`]): nodes as opaque, single-use bytes
//!
//! Readers validate every offset and length before use; a malformed block or
//! stream is a [`MarshalSide`](horizon_probe_core::MarshalSide) error, never
//! a panic.
//!
//! # Example
//!
//! ```ignore
//! use horizon_probe_marshal::{HandleTable, ResultReader, ResultWriter};
//!
//! let table = HandleTable::new();
//! let mut writer = ResultWriter::new(&table, true);
//! for ao in &matches {
//!     writer.write(ao, None)?;
//! }
//! let mut reader = ResultReader::new(&table, writer.finish());
//! while let Some(record) = reader.next_record()? {
//!     println!("{:?}", record.ao);
//! }
//! ```

pub mod block;
pub mod marshaler;
pub mod params;
pub mod reply;
pub mod stream;

pub use block::{BlockReader, BlockWriter, FlatRef};
pub use marshaler::{HandleTable, InterfaceMarshaler};
pub use params::{
    ActionKind, EnableBrowserRequest, FindRequest, FocusedRequest, FromPointRequest,
    FromWindowRequest, GetHtmlRequest, Header, NavigateRequest, PROTOCOL_VERSION, Request,
};
pub use reply::{BrokerReply, PropValue};
pub use stream::{RecordBits, ResultReader, ResultRecord, ResultWriter};
