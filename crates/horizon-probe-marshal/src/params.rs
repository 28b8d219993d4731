//! Parameter blocks, one layout per action kind.
//!
//! Every block starts with the same 16-byte [`Header`], so a broker can read
//! the action kind, the target window and the shared misc flags before it
//! knows which request follows:
//!
//! | offset | size | field |
//! |---|---|---|
//! | 0 | 1 | protocol version |
//! | 1 | 1 | [`ActionKind`] |
//! | 2 | 1 | [`MiscFlags`] of the target object |
//! | 3 | 1 | reserved, zero |
//! | 4 | 4 | target window (wire form) |
//! | 8 | 8 | [`FlatRef`] to the marshaled target object, or absent |
//!
//! The per-action fixed fields follow at offset 16. Variable sections come
//! after the fixed part: the target object data first, then the request's
//! strings in field order.
//!
//! # Example
//!
//! ```ignore
//! use horizon_probe_marshal::params::{self, FindRequest};
//!
//! let block = params::marshal(&request, window, MiscFlags::empty(), None);
//! // ... in the broker:
//! let (header, request) = params::unmarshal::<FindRequest>(&block)?;
//! ```

use horizon_probe_core::{
    Error, FindFlags, FocusFlags, MarshalSide, MiscFlags, ObjectId, Point, PointFlags, Result,
    SearchScope, SpecialWindow, WindowFlags, WindowHandle,
};

use crate::block::{BlockReader, BlockWriter, FlatRef, utf16_size};

/// Bumped whenever a block layout changes.
pub const PROTOCOL_VERSION: u8 = 1;

/// What a parameter block asks the broker to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ActionKind {
    Find = 1,
    Navigate = 2,
    FromWindow = 3,
    FromPoint = 4,
    Focused = 5,
    GetHtml = 6,
    EnableBrowser = 7,
}

impl ActionKind {
    pub fn from_u8(v: u8) -> Option<Self> {
        Some(match v {
            1 => Self::Find,
            2 => Self::Navigate,
            3 => Self::FromWindow,
            4 => Self::FromPoint,
            5 => Self::Focused,
            6 => Self::GetHtml,
            7 => Self::EnableBrowser,
            _ => return None,
        })
    }
}

/// The fields shared by every parameter block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub action: ActionKind,
    pub misc: MiscFlags,
    pub window: WindowHandle,
    pub target: FlatRef,
}

impl Header {
    pub const SIZE: usize = 16;

    /// Read the header of a block without knowing its action.
    pub fn peek(block: &[u8]) -> Result<Header> {
        let r = BlockReader::new(block);
        if r.u8(0)? != PROTOCOL_VERSION {
            tracing::debug!(
                target: horizon_probe_core::logging::targets::MARSHAL,
                version = block[0],
                "parameter block from another protocol version"
            );
            return Err(Error::marshal(MarshalSide::Server));
        }
        let action = ActionKind::from_u8(r.u8(1)?).ok_or(Error::marshal(MarshalSide::Server))?;
        Ok(Header {
            action,
            misc: MiscFlags::from_bits_truncate(r.u8(2)?),
            window: WindowHandle::from_wire(r.i32(4)?),
            target: r.flat_ref(8)?,
        })
    }

    /// The marshaled target object, if the block carries one.
    pub fn target_data<'a>(&self, block: &'a [u8]) -> Result<Option<&'a [u8]>> {
        BlockReader::new(block).bytes_at(self.target)
    }

    fn write(&self, w: &mut BlockWriter) {
        w.put_u8(0, PROTOCOL_VERSION);
        w.put_u8(1, self.action as u8);
        w.put_u8(2, self.misc.bits());
        w.put_i32(4, self.window.to_wire());
        w.put_ref(8, self.target);
    }
}

/// A request type with its own fixed layout after the [`Header`].
pub trait Request: Sized {
    const ACTION: ActionKind;

    /// Bytes of per-action fixed fields.
    const FIXED_SIZE: usize;

    /// Bytes of variable data the request appends.
    fn variable_size(&self) -> usize {
        0
    }

    /// Write fixed fields at `at` and append variable sections.
    fn write_fields(&self, w: &mut BlockWriter, at: usize);

    fn read_fields(r: &BlockReader<'_>, at: usize) -> Result<Self>;
}

/// Total size of the block [`marshal`] will produce.
pub fn calc_size<R: Request>(req: &R, target: Option<&[u8]>) -> usize {
    Header::SIZE + R::FIXED_SIZE + target.map_or(0, <[u8]>::len) + req.variable_size()
}

/// Build a parameter block.
pub fn marshal<R: Request>(
    req: &R,
    window: WindowHandle,
    misc: MiscFlags,
    target: Option<&[u8]>,
) -> Vec<u8> {
    let size = calc_size(req, target);
    let mut w = BlockWriter::new(Header::SIZE + R::FIXED_SIZE, size);
    let target = w.push_bytes(target);
    Header {
        action: R::ACTION,
        misc,
        window,
        target,
    }
    .write(&mut w);
    req.write_fields(&mut w, Header::SIZE);
    debug_assert_eq!(w.len(), size);
    w.finish()
}

/// Decode a parameter block of a known action.
pub fn unmarshal<R: Request>(block: &[u8]) -> Result<(Header, R)> {
    let header = Header::peek(block)?;
    if header.action != R::ACTION {
        return Err(Error::marshal(MarshalSide::Server));
    }
    let req = R::read_fields(&BlockReader::new(block), Header::SIZE)?;
    Ok((header, req))
}

/// Find parameters as the caller wrote them. The broker parses them itself
/// so that parse errors carry the same text in and out of process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FindRequest {
    pub role: Option<String>,
    pub name: Option<String>,
    pub prop: Option<String>,
    pub flags: FindFlags,
    pub scope: SearchScope,
    pub skip: i32,
    /// Return this property of the found object instead of the object.
    pub result_prop: Option<char>,
}

impl Request for FindRequest {
    const ACTION: ActionKind = ActionKind::Find;
    const FIXED_SIZE: usize = 3 * FlatRef::SIZE + 16;

    fn variable_size(&self) -> usize {
        utf16_size(self.role.as_deref())
            + utf16_size(self.name.as_deref())
            + utf16_size(self.prop.as_deref())
    }

    fn write_fields(&self, w: &mut BlockWriter, at: usize) {
        let role = w.push_str(self.role.as_deref());
        let name = w.push_str(self.name.as_deref());
        let prop = w.push_str(self.prop.as_deref());
        w.put_ref(at, role);
        w.put_ref(at + 8, name);
        w.put_ref(at + 16, prop);
        w.put_u32(at + 24, self.flags.bits());
        w.put_u32(at + 28, self.scope.bits());
        w.put_i32(at + 32, self.skip);
        // selectors are ASCII; anything wider cannot be a selector
        let rp = self
            .result_prop
            .and_then(|c| u16::try_from(u32::from(c)).ok())
            .unwrap_or(0);
        w.put_u16(at + 36, rp);
    }

    fn read_fields(r: &BlockReader<'_>, at: usize) -> Result<Self> {
        let rp = r.u16(at + 36)?;
        Ok(Self {
            role: r.str(r.flat_ref(at)?)?,
            name: r.str(r.flat_ref(at + 8)?)?,
            prop: r.str(r.flat_ref(at + 16)?)?,
            flags: FindFlags::from_bits_retain(r.u32(at + 24)?),
            scope: SearchScope::from_bits_retain(r.u32(at + 28)?),
            skip: r.i32(at + 32)?,
            result_prop: (rp != 0).then(|| char::from_u32(u32::from(rp))).flatten(),
        })
    }
}

/// Navigate from the target object along a navigation string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NavigateRequest {
    pub elem: i32,
    pub path: String,
}

impl Request for NavigateRequest {
    const ACTION: ActionKind = ActionKind::Navigate;
    const FIXED_SIZE: usize = 4 + FlatRef::SIZE;

    fn variable_size(&self) -> usize {
        utf16_size(Some(&self.path))
    }

    fn write_fields(&self, w: &mut BlockWriter, at: usize) {
        let path = w.push_str(Some(&self.path));
        w.put_i32(at, self.elem);
        w.put_ref(at + 4, path);
    }

    fn read_fields(r: &BlockReader<'_>, at: usize) -> Result<Self> {
        Ok(Self {
            elem: r.i32(at)?,
            path: r.str(r.flat_ref(at + 4)?)?.unwrap_or_default(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FromWindowRequest {
    pub object_id: ObjectId,
    pub flags: WindowFlags,
}

impl Request for FromWindowRequest {
    const ACTION: ActionKind = ActionKind::FromWindow;
    const FIXED_SIZE: usize = 8;

    fn write_fields(&self, w: &mut BlockWriter, at: usize) {
        w.put_i32(at, self.object_id.0);
        w.put_u32(at + 4, self.flags.bits());
    }

    fn read_fields(r: &BlockReader<'_>, at: usize) -> Result<Self> {
        Ok(Self {
            object_id: ObjectId(r.i32(at)?),
            flags: WindowFlags::from_bits_retain(r.u32(at + 4)?),
        })
    }
}

/// Resolve the object at a screen point. The header window is the window
/// the caller sampled under the point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FromPointRequest {
    pub point: Point,
    pub flags: PointFlags,
    pub special: SpecialWindow,
}

impl Request for FromPointRequest {
    const ACTION: ActionKind = ActionKind::FromPoint;
    const FIXED_SIZE: usize = 16;

    fn write_fields(&self, w: &mut BlockWriter, at: usize) {
        w.put_i32(at, self.point.x);
        w.put_i32(at + 4, self.point.y);
        w.put_u32(at + 8, self.flags.bits());
        w.put_u8(at + 12, self.special as u8);
    }

    fn read_fields(r: &BlockReader<'_>, at: usize) -> Result<Self> {
        Ok(Self {
            point: Point::new(r.i32(at)?, r.i32(at + 4)?),
            flags: PointFlags::from_bits_retain(r.u32(at + 8)?),
            special: SpecialWindow::from_u8(r.u8(at + 12)?),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FocusedRequest {
    pub flags: FocusFlags,
}

impl Request for FocusedRequest {
    const ACTION: ActionKind = ActionKind::Focused;
    const FIXED_SIZE: usize = 4;

    fn write_fields(&self, w: &mut BlockWriter, at: usize) {
        w.put_u32(at, self.flags.bits());
    }

    fn read_fields(r: &BlockReader<'_>, at: usize) -> Result<Self> {
        Ok(Self {
            flags: FocusFlags::from_bits_retain(r.u32(at)?),
        })
    }
}

/// Read HTML or attributes of the target object's DOM node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GetHtmlRequest {
    pub what: String,
}

impl Request for GetHtmlRequest {
    const ACTION: ActionKind = ActionKind::GetHtml;
    const FIXED_SIZE: usize = FlatRef::SIZE;

    fn variable_size(&self) -> usize {
        utf16_size(Some(&self.what))
    }

    fn write_fields(&self, w: &mut BlockWriter, at: usize) {
        let what = w.push_str(Some(&self.what));
        w.put_ref(at, what);
    }

    fn read_fields(r: &BlockReader<'_>, at: usize) -> Result<Self> {
        Ok(Self {
            what: r.str(r.flat_ref(at)?)?.unwrap_or_default(),
        })
    }
}

/// One attempt of the browser accessibility enabling loop. The header window
/// is the browser window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnableBrowserRequest {
    /// 0-based attempt number; selects the hit-test probe position.
    pub attempt: i32,
    /// The web view control, or null to locate the page document.
    pub control: WindowHandle,
}

impl Request for EnableBrowserRequest {
    const ACTION: ActionKind = ActionKind::EnableBrowser;
    const FIXED_SIZE: usize = 8;

    fn write_fields(&self, w: &mut BlockWriter, at: usize) {
        w.put_i32(at, self.attempt);
        w.put_i32(at + 4, self.control.to_wire());
    }

    fn read_fields(r: &BlockReader<'_>, at: usize) -> Result<Self> {
        Ok(Self {
            attempt: r.i32(at)?,
            control: WindowHandle::from_wire(r.i32(at + 4)?),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn find_request() -> FindRequest {
        FindRequest {
            role: Some("web:LINK".into()),
            name: Some("**r Sav[e]".into()),
            prop: Some("state=!invisible\0@href=*x*".into()),
            flags: FindFlags::REVERSE | FindFlags::HIDDEN_TOO,
            scope: SearchScope::IN_WEB_PAGE | SearchScope::IN_CHROME_PAGE,
            skip: 2,
            result_prop: Some('n'),
        }
    }

    #[test]
    fn test_find_request_round_trip() {
        let req = find_request();
        let target = [9u8, 8, 7];
        let block = marshal(&req, WindowHandle(0x1234), MiscFlags::IN_PROC, Some(&target));
        assert_eq!(block.len(), calc_size(&req, Some(&target)));

        let (header, back) = unmarshal::<FindRequest>(&block).unwrap();
        assert_eq!(back, req);
        assert_eq!(header.action, ActionKind::Find);
        assert_eq!(header.window, WindowHandle(0x1234));
        assert_eq!(header.misc, MiscFlags::IN_PROC);
        assert_eq!(header.target_data(&block).unwrap(), Some(&target[..]));
        // the target is the first variable section
        assert_eq!(header.target.offs as usize, Header::SIZE + FindRequest::FIXED_SIZE);
    }

    #[test]
    fn test_absent_strings_stay_absent() {
        let req = FindRequest {
            role: None,
            name: Some(String::new()),
            ..Default::default()
        };
        let block = marshal(&req, WindowHandle::NULL, MiscFlags::empty(), None);
        let (header, back) = unmarshal::<FindRequest>(&block).unwrap();
        assert_eq!(back.role, None);
        assert_eq!(back.name.as_deref(), Some(""));
        assert_eq!(back.result_prop, None);
        assert!(header.target.is_absent());
    }

    #[test]
    fn test_header_is_shared() {
        let block = marshal(
            &FromPointRequest {
                point: Point::new(-5, 700),
                flags: PointFlags::PREFER_LINK,
                special: SpecialWindow::Java,
            },
            WindowHandle(77),
            MiscFlags::empty(),
            None,
        );
        let header = Header::peek(&block).unwrap();
        assert_eq!(header.action, ActionKind::FromPoint);
        assert_eq!(header.window, WindowHandle(77));
        let (_, req) = unmarshal::<FromPointRequest>(&block).unwrap();
        assert_eq!(req.point, Point::new(-5, 700));
        assert_eq!(req.special, SpecialWindow::Java);
    }

    #[test]
    fn test_wrong_action_or_version_is_rejected() {
        let mut block = marshal(
            &FocusedRequest {
                flags: FocusFlags::UIA,
            },
            WindowHandle(1),
            MiscFlags::empty(),
            None,
        );
        assert!(unmarshal::<NavigateRequest>(&block).is_err());
        block[0] = PROTOCOL_VERSION + 1;
        assert!(matches!(
            Header::peek(&block),
            Err(Error::Marshal {
                side: MarshalSide::Server
            })
        ));
    }

    #[test]
    fn test_truncated_block_is_rejected() {
        let block = marshal(
            &NavigateRequest {
                elem: 3,
                path: "parent next2".into(),
            },
            WindowHandle(1),
            MiscFlags::empty(),
            None,
        );
        assert!(unmarshal::<NavigateRequest>(&block[..block.len() - 4]).is_err());
        assert!(Header::peek(&block[..10]).is_err());
    }
}
