//! Resolving single objects: by window, point, focus, navigation, and
//! reading their properties.
//!
//! The functions here run in whichever process they are called in. The
//! probe calls them directly when searching out of process, and the broker
//! server calls them inside the target process.

pub mod focus;
pub mod navigate;
pub mod point;
pub mod props;
pub mod window;

pub use focus::focused_local;
pub use navigate::{NavKind, NavPath, NavStep, navigate};
pub use point::from_point_local;
pub use props::{PropSelector, get_property};
pub use window::{WindowObject, from_window_local};
