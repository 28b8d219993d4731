//! Broker replies.
//!
//! A broker answers every call with a status code and a payload. The
//! payload depends on the action: a result stream for object queries, a
//! [`PropValue`] for property queries, UTF-16 text for names, HTML and
//! invalid-parameter descriptions.

use horizon_probe_core::{
    Error, MarshalSide, Rect, Result, State, WindowHandle, codes,
};

use crate::block::{decode_text, encode_text};

/// Status plus payload, as returned by one broker call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BrokerReply {
    pub status: i32,
    pub payload: Vec<u8>,
}

impl BrokerReply {
    /// A successful reply.
    pub fn ok(payload: Vec<u8>) -> Self {
        Self { status: 0, payload }
    }

    /// A failed reply. Invalid-parameter errors carry their text.
    pub fn from_error(e: &Error) -> Self {
        let payload = match e {
            Error::InvalidParameter(text) => encode_text(text),
            _ => Vec::new(),
        };
        Self {
            status: e.code(),
            payload,
        }
    }

    /// The payload on success, the decoded error otherwise.
    pub fn into_result(self) -> Result<Vec<u8>> {
        if self.status == 0 {
            return Ok(self.payload);
        }
        let detail = if self.status == codes::INVALID_PARAMETER {
            decode_text(&self.payload).ok()
        } else {
            None
        };
        Err(Error::from_code(self.status, detail))
    }

    /// Frame as bytes for transports that move a single buffer.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut b = Vec::with_capacity(4 + self.payload.len());
        b.extend_from_slice(&self.status.to_le_bytes());
        b.extend_from_slice(&self.payload);
        b
    }

    pub fn from_bytes(b: &[u8]) -> Result<Self> {
        let (status, payload) = b
            .split_first_chunk::<4>()
            .ok_or(Error::marshal(MarshalSide::Client))?;
        Ok(Self {
            status: i32::from_le_bytes(*status),
            payload: payload.to_vec(),
        })
    }
}

/// A property value, as returned by property selectors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropValue {
    Text(String),
    State(State),
    Rect(Rect),
    Window(WindowHandle),
    /// The property exists but has no value.
    None,
}

const TAG_TEXT: u8 = 1;
const TAG_STATE: u8 = 2;
const TAG_RECT: u8 = 3;
const TAG_WINDOW: u8 = 4;

impl PropValue {
    /// The value as text: rectangles as `{L T W H}` fields, states and
    /// windows as hex numbers.
    pub fn to_text(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::State(s) => format!("{:#x}", s.bits()),
            Self::Rect(r) => format!("{{L={} T={} W={} H={}}}", r.left, r.top, r.width(), r.height()),
            Self::Window(w) => w.to_string(),
            Self::None => String::new(),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut b = Vec::new();
        match self {
            Self::Text(s) => {
                b.push(TAG_TEXT);
                b.extend_from_slice(&encode_text(s));
            }
            Self::State(s) => {
                b.push(TAG_STATE);
                b.extend_from_slice(&s.bits().to_le_bytes());
            }
            Self::Rect(r) => {
                b.push(TAG_RECT);
                b.extend_from_slice(&r.to_le_bytes());
            }
            Self::Window(w) => {
                b.push(TAG_WINDOW);
                b.extend_from_slice(&w.to_wire().to_le_bytes());
            }
            Self::None => {}
        }
        b
    }

    pub fn decode(b: &[u8]) -> Result<Self> {
        let bad = || Error::marshal(MarshalSide::Client);
        let Some((&tag, rest)) = b.split_first() else {
            return Ok(Self::None);
        };
        Ok(match tag {
            TAG_TEXT => Self::Text(decode_text(rest)?),
            TAG_STATE => {
                let v: [u8; 4] = rest.try_into().map_err(|_| bad())?;
                Self::State(State::from_bits_retain(u32::from_le_bytes(v)))
            }
            TAG_RECT => {
                let v: [u8; Rect::WIRE_SIZE] = rest.try_into().map_err(|_| bad())?;
                Self::Rect(Rect::from_le_bytes(v))
            }
            TAG_WINDOW => {
                let v: [u8; 4] = rest.try_into().map_err(|_| bad())?;
                Self::Window(WindowHandle::from_wire(i32::from_le_bytes(v)))
            }
            _ => return Err(bad()),
        })
    }
}
