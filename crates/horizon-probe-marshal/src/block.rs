//! Offset-addressed byte blocks.
//!
//! A parameter block is a fixed-size part followed by variable-length data.
//! Variable data is referenced from the fixed part by a [`FlatRef`] (byte
//! offset from the start of the block plus length), never by pointer, so the
//! block can be copied byte-for-byte into another process.
//!
//! All integers are little-endian. Strings are UTF-16 code units followed by
//! one NUL unit; [`FlatRef::len`] counts code units without the NUL.

use horizon_probe_core::{Error, MarshalSide, Result};

/// Offset and length of a variable section. Offset 0 means "absent".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct FlatRef {
    pub offs: u32,
    pub len: u32,
}

impl FlatRef {
    pub const SIZE: usize = 8;

    pub const ABSENT: FlatRef = FlatRef { offs: 0, len: 0 };

    pub fn is_absent(self) -> bool {
        self.offs == 0
    }
}

/// Number of bytes a string occupies in the variable part.
pub fn utf16_size(s: Option<&str>) -> usize {
    s.map_or(0, |s| (s.encode_utf16().count() + 1) * 2)
}

/// Builds a block: a zeroed fixed part, then appended variable sections.
#[derive(Debug)]
pub struct BlockWriter {
    buf: Vec<u8>,
}

impl BlockWriter {
    /// Start a block with `fixed_size` zero bytes and room for `capacity` in total.
    pub fn new(fixed_size: usize, capacity: usize) -> Self {
        let mut buf = Vec::with_capacity(capacity.max(fixed_size));
        buf.resize(fixed_size, 0);
        Self { buf }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn put_u8(&mut self, at: usize, v: u8) {
        self.buf[at] = v;
    }

    pub fn put_u16(&mut self, at: usize, v: u16) {
        self.buf[at..at + 2].copy_from_slice(&v.to_le_bytes());
    }

    pub fn put_u32(&mut self, at: usize, v: u32) {
        self.buf[at..at + 4].copy_from_slice(&v.to_le_bytes());
    }

    pub fn put_i32(&mut self, at: usize, v: i32) {
        self.buf[at..at + 4].copy_from_slice(&v.to_le_bytes());
    }

    pub fn put_ref(&mut self, at: usize, r: FlatRef) {
        self.put_u32(at, r.offs);
        self.put_u32(at + 4, r.len);
    }

    /// Append a string section and return its reference.
    pub fn push_str(&mut self, s: Option<&str>) -> FlatRef {
        let Some(s) = s else {
            return FlatRef::ABSENT;
        };
        let offs = self.buf.len() as u32;
        let mut len = 0u32;
        for unit in s.encode_utf16() {
            self.buf.extend_from_slice(&unit.to_le_bytes());
            len += 1;
        }
        self.buf.extend_from_slice(&[0, 0]);
        FlatRef { offs, len }
    }

    /// Append a raw byte section and return its reference.
    pub fn push_bytes(&mut self, b: Option<&[u8]>) -> FlatRef {
        let Some(b) = b else {
            return FlatRef::ABSENT;
        };
        let offs = self.buf.len() as u32;
        self.buf.extend_from_slice(b);
        FlatRef {
            offs,
            len: b.len() as u32,
        }
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}

/// Reads a block received from another process. Every access is
/// bounds-checked; a bad offset is a marshaling error, never a panic.
#[derive(Debug, Clone, Copy)]
pub struct BlockReader<'a> {
    buf: &'a [u8],
}

fn bad_block() -> Error {
    Error::marshal(MarshalSide::Server)
}

impl<'a> BlockReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    fn bytes<const N: usize>(&self, at: usize) -> Result<[u8; N]> {
        self.buf
            .get(at..at.checked_add(N).ok_or_else(bad_block)?)
            .and_then(|s| s.try_into().ok())
            .ok_or_else(bad_block)
    }

    pub fn u8(&self, at: usize) -> Result<u8> {
        self.buf.get(at).copied().ok_or_else(bad_block)
    }

    pub fn u16(&self, at: usize) -> Result<u16> {
        self.bytes::<2>(at).map(u16::from_le_bytes)
    }

    pub fn u32(&self, at: usize) -> Result<u32> {
        self.bytes::<4>(at).map(u32::from_le_bytes)
    }

    pub fn i32(&self, at: usize) -> Result<i32> {
        self.bytes::<4>(at).map(i32::from_le_bytes)
    }

    pub fn flat_ref(&self, at: usize) -> Result<FlatRef> {
        Ok(FlatRef {
            offs: self.u32(at)?,
            len: self.u32(at + 4)?,
        })
    }

    fn section(&self, r: FlatRef, unit: usize) -> Result<&'a [u8]> {
        let start = r.offs as usize;
        let size = (r.len as usize).checked_mul(unit).ok_or_else(bad_block)?;
        let end = start.checked_add(size).ok_or_else(bad_block)?;
        self.buf.get(start..end).ok_or_else(bad_block)
    }

    /// Read a string section. `None` if the reference is absent.
    pub fn str(&self, r: FlatRef) -> Result<Option<String>> {
        if r.is_absent() {
            return Ok(None);
        }
        let raw = self.section(r, 2)?;
        let units: Vec<u16> = raw
            .chunks_exact(2)
            .map(|c| u16::from_le_bytes([c[0], c[1]]))
            .collect();
        String::from_utf16(&units).map(Some).map_err(|_| bad_block())
    }

    /// Read a raw byte section. `None` if the reference is absent.
    pub fn bytes_at(&self, r: FlatRef) -> Result<Option<&'a [u8]>> {
        if r.is_absent() {
            return Ok(None);
        }
        self.section(r, 1).map(Some)
    }
}

/// Encode text as UTF-16LE without terminator, the form used for string replies.
pub fn encode_text(s: &str) -> Vec<u8> {
    s.encode_utf16().flat_map(u16::to_le_bytes).collect()
}

/// Decode [`encode_text`] output.
pub fn decode_text(b: &[u8]) -> Result<String> {
    if b.len() % 2 != 0 {
        return Err(Error::marshal(MarshalSide::Client));
    }
    let units: Vec<u16> = b
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .collect();
    String::from_utf16(&units).map_err(|_| Error::marshal(MarshalSide::Client))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strings_are_offset_addressed() {
        let mut w = BlockWriter::new(8, 64);
        let a = w.push_str(Some("ab"));
        let none = w.push_str(None);
        let b = w.push_str(Some(""));
        w.put_ref(0, a);
        let block = w.finish();

        assert_eq!(a, FlatRef { offs: 8, len: 2 });
        assert!(none.is_absent());
        assert_eq!(b, FlatRef { offs: 14, len: 0 });
        assert_eq!(block.len(), 16);

        let r = BlockReader::new(&block);
        assert_eq!(r.flat_ref(0).unwrap(), a);
        assert_eq!(r.str(a).unwrap().as_deref(), Some("ab"));
        assert_eq!(r.str(b).unwrap().as_deref(), Some(""));
        assert_eq!(r.str(none).unwrap(), None);
    }

    #[test]
    fn test_out_of_bounds_reference_is_rejected() {
        let block = vec![0u8; 16];
        let r = BlockReader::new(&block);
        let bad = FlatRef { offs: 12, len: 10 };
        assert!(matches!(r.str(bad), Err(Error::Marshal { .. })));
        let huge = FlatRef {
            offs: u32::MAX,
            len: u32::MAX,
        };
        assert!(r.bytes_at(huge).is_err());
        assert!(r.u32(14).is_err());
    }

    #[test]
    fn test_text_reply() {
        let b = encode_text("na\u{e9}me");
        assert_eq!(decode_text(&b).unwrap(), "na\u{e9}me");
        assert!(decode_text(&[1]).is_err());
    }
}
