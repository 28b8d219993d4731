//! Cross-process accessible-object discovery.
//!
//! Horizon Probe finds and inspects UI elements of other applications
//! through the platform accessibility trees. A query runs inside the
//! process that owns the target window when a broker can be placed there,
//! and in the calling process otherwise:
//!
//! - [`Probe`]: the entry point; find, from point, focused, from window,
//!   navigation, properties and HTML
//! - [`find`]: the find/match engine, rect capture and document discovery
//! - [`resolve`]: single-object resolvers shared by both sides
//! - [`bridge`]: marshaled calls to a broker and the broker server
//! - [`shim`]: the modern backend presented as legacy nodes
//! - [`browser`]: HTML access and Chromium enabling
//! - [`platform`]: collaborator traits and their Windows implementation
//! - [`mock`]: an in-memory desktop for tests and demos
//!
//! # Example
//!
//! ```ignore
//! use horizon_probe::{Context, FindRoot, Probe};
//! use horizon_probe_marshal::FindRequest;
//!
//! let probe = Probe::new(Context::new(windows, backends, config), injector);
//! let req = FindRequest {
//!     role: Some("PUSHBUTTON".into()),
//!     name: Some("OK".into()),
//!     ..Default::default()
//! };
//! let ok = probe.find_first(FindRoot::Window(w), &req)?.into_object();
//! ```

pub mod bridge;
pub mod browser;
mod context;
pub mod dpi;
pub mod find;
pub mod mock;
pub mod platform;
mod probe;
pub mod resolve;
pub mod shim;

pub use context::Context;
pub use probe::{FindRoot, Found, OnMatch, Probe};
pub use resolve::{PropSelector, WindowObject};
