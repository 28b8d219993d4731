//! Error types for accessible-object queries.
//!
//! Every error except [`Error::InvalidParameter`] is identified by a stable
//! numeric code (see [`codes`]) so that a broker running in another process
//! can report it through a plain status value. [`Error::from_code`] turns a
//! status received from a broker back into an [`Error`].

use std::fmt;
use std::path::PathBuf;

/// Result type alias for probe operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Stable status codes shared by the caller and the broker.
pub mod codes {
    /// The object was not found. Not an error for find-all.
    pub const NOT_FOUND: i32 = 0x1001;
    /// Malformed find parameters. The reply payload carries the reason text.
    pub const INVALID_PARAMETER: i32 = 0x1002;
    /// The window handle is invalid or the window was destroyed.
    pub const WINDOW_GONE: i32 = 0x1003;
    /// The broker could not be placed into the target process.
    pub const INJECT: i32 = 0x1100;
    /// The target window belongs to the calling thread.
    pub const WINDOW_OF_THIS_THREAD: i32 = 0x1101;
    /// The target process must be queried out of process.
    pub const USE_NOT_IN_PROC: i32 = 0x1102;
    /// The browser accessibility tree is not populated yet.
    pub const BROWSER_NOT_READY: i32 = 0x1103;
    /// The window under a screen point changed while resolving.
    pub const WINDOW_CHANGED: i32 = 0x2001;
    /// The caller could not unmarshal the broker's reply.
    pub const CLIENT_CANT_UNMARSHAL: i32 = 0x8001_0006_u32 as i32;
    /// The broker could not marshal its result.
    pub const SERVER_CANT_MARSHAL: i32 = 0x8001_000D_u32 as i32;
    /// The broker object is disconnected from its process.
    pub const DISCONNECTED: i32 = 0x8001_0108_u32 as i32;
    /// The object does not implement the requested operation.
    pub const NOT_IMPLEMENTED: i32 = 0x8000_4001_u32 as i32;
    /// Unspecified failure.
    pub const FAIL: i32 = 0x8000_4005_u32 as i32;
}

/// Which side of a process boundary failed to (un)marshal data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MarshalSide {
    /// The caller could not decode what the broker sent.
    Client,
    /// The broker could not encode its result.
    Server,
}

impl fmt::Display for MarshalSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Client => f.write_str("client cannot unmarshal"),
            Self::Server => f.write_str("server cannot marshal"),
        }
    }
}

/// Why a broker inside the target process could not be reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InjectFailure {
    /// The window belongs to the calling thread; a broker call would deadlock.
    WindowOfThisThread,
    /// The target process does not accept in-process queries.
    UseNotInProc,
    /// Loading the broker into the target process failed.
    InjectionFailed,
    /// A previously obtained broker no longer answers.
    BrokerDead,
    /// Any other injector status.
    Other(i32),
}

impl InjectFailure {
    /// Whether the caller should switch to out-of-process resolution.
    pub fn allows_fallback(self) -> bool {
        !matches!(self, Self::Other(_))
    }

    /// The stable status code for this failure.
    pub fn code(self) -> i32 {
        match self {
            Self::WindowOfThisThread => codes::WINDOW_OF_THIS_THREAD,
            Self::UseNotInProc => codes::USE_NOT_IN_PROC,
            Self::InjectionFailed => codes::INJECT,
            Self::BrokerDead => codes::DISCONNECTED,
            Self::Other(code) => code,
        }
    }
}

/// Errors that can occur while locating or querying accessible objects.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No object matched. Find-all treats this as a normal end state.
    #[error("accessible object not found")]
    NotFound,

    /// Malformed parameters, with a human-readable reason.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// The target window is invalid or was destroyed mid-search.
    #[error("the target window is closed")]
    WindowGone,

    /// Encoding or decoding data for the process boundary failed.
    #[error("{side} accessible-object data")]
    Marshal { side: MarshalSide },

    /// The in-process broker is not reachable.
    #[error("in-process broker unavailable ({0:?})")]
    BackendUnavailable(InjectFailure),

    /// The browser accessibility tree did not become ready in time.
    #[error("browser accessibility tree is not ready")]
    BrowserNotReady,

    /// The object or backend does not support the operation.
    #[error("operation not supported by this accessible object")]
    NotSupported,

    /// The window under the point changed while resolving; retry.
    #[error("window under the point changed")]
    WindowChanged,

    /// A backend or broker returned an unrecognized status.
    #[error("backend call failed with status {0:#010x}")]
    Backend(i32),

    /// Invalid configuration data.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// File I/O error.
    #[error("failed to read '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    /// Create an invalid-parameter error.
    pub fn invalid_parameter(message: impl Into<String>) -> Self {
        Self::InvalidParameter(message.into())
    }

    /// Create a marshaling error for the given side.
    pub fn marshal(side: MarshalSide) -> Self {
        Self::Marshal { side }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create an I/O error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this is the non-error "nothing matched" state.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }

    /// Whether the caller should retry the query out of process.
    pub fn allows_fallback(&self) -> bool {
        matches!(self, Self::BackendUnavailable(f) if f.allows_fallback())
    }

    /// The stable status code for this error.
    pub fn code(&self) -> i32 {
        match self {
            Self::NotFound => codes::NOT_FOUND,
            Self::InvalidParameter(_) => codes::INVALID_PARAMETER,
            Self::WindowGone => codes::WINDOW_GONE,
            Self::Marshal {
                side: MarshalSide::Client,
            } => codes::CLIENT_CANT_UNMARSHAL,
            Self::Marshal {
                side: MarshalSide::Server,
            } => codes::SERVER_CANT_MARSHAL,
            Self::BackendUnavailable(failure) => failure.code(),
            Self::BrowserNotReady => codes::BROWSER_NOT_READY,
            Self::NotSupported => codes::NOT_IMPLEMENTED,
            Self::WindowChanged => codes::WINDOW_CHANGED,
            Self::Backend(code) => *code,
            Self::Config(_) | Self::Io { .. } => codes::FAIL,
        }
    }

    /// Rebuild an error from a status code received across the boundary.
    ///
    /// `detail` is the reason text for [`codes::INVALID_PARAMETER`]; it is
    /// ignored for every other code.
    pub fn from_code(code: i32, detail: Option<String>) -> Self {
        match code {
            codes::NOT_FOUND => Self::NotFound,
            codes::INVALID_PARAMETER => Self::InvalidParameter(detail.unwrap_or_default()),
            codes::WINDOW_GONE => Self::WindowGone,
            codes::INJECT => Self::BackendUnavailable(InjectFailure::InjectionFailed),
            codes::WINDOW_OF_THIS_THREAD => {
                Self::BackendUnavailable(InjectFailure::WindowOfThisThread)
            }
            codes::USE_NOT_IN_PROC => Self::BackendUnavailable(InjectFailure::UseNotInProc),
            codes::DISCONNECTED => Self::BackendUnavailable(InjectFailure::BrokerDead),
            codes::BROWSER_NOT_READY => Self::BrowserNotReady,
            codes::WINDOW_CHANGED => Self::WindowChanged,
            codes::CLIENT_CANT_UNMARSHAL => Self::marshal(MarshalSide::Client),
            codes::SERVER_CANT_MARSHAL => Self::marshal(MarshalSide::Server),
            codes::NOT_IMPLEMENTED => Self::NotSupported,
            other => Self::Backend(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_round_trip() {
        let errors = [
            Error::NotFound,
            Error::WindowGone,
            Error::marshal(MarshalSide::Client),
            Error::marshal(MarshalSide::Server),
            Error::BackendUnavailable(InjectFailure::UseNotInProc),
            Error::BackendUnavailable(InjectFailure::BrokerDead),
            Error::BrowserNotReady,
            Error::WindowChanged,
            Error::NotSupported,
        ];
        for e in errors {
            let back = Error::from_code(e.code(), None);
            assert_eq!(back.code(), e.code(), "{e}");
        }
    }

    #[test]
    fn test_invalid_parameter_carries_reason() {
        let e = Error::from_code(codes::INVALID_PARAMETER, Some("Unknown state name.".into()));
        match e {
            Error::InvalidParameter(reason) => assert_eq!(reason, "Unknown state name."),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_fallback_policy() {
        assert!(Error::BackendUnavailable(InjectFailure::InjectionFailed).allows_fallback());
        assert!(Error::BackendUnavailable(InjectFailure::WindowOfThisThread).allows_fallback());
        assert!(!Error::BackendUnavailable(InjectFailure::Other(5)).allows_fallback());
        assert!(!Error::NotFound.allows_fallback());
    }

    #[test]
    fn test_rpc_codes() {
        assert_eq!(codes::CLIENT_CANT_UNMARSHAL as u32, 0x8001_0006);
        assert_eq!(codes::SERVER_CANT_MARSHAL as u32, 0x8001_000D);
        assert_eq!(
            Error::from_code(0x1234, None).code(),
            0x1234,
            "unknown codes pass through"
        );
    }
}
