use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::{FrameError, Result};

/// Atom header: size (4) + type (4) = 8 bytes.
pub const HEADER_SIZE: usize = 8;

/// Largest atom accepted, header included.
pub const MAX_ATOM_SIZE: usize = 42069;

/// The only atom type carried on warp channels.
pub const ATOM_TYPE: [u8; 4] = *b"warp";

/// One framed unit on a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Atom {
    /// Four-byte ASCII type tag.
    pub kind: [u8; 4],
    /// Bytes following the header.
    pub payload: Bytes,
}

impl Atom {
    /// Create a `warp` atom.
    pub fn warp(payload: impl Into<Bytes>) -> Self {
        Self {
            kind: ATOM_TYPE,
            payload: payload.into(),
        }
    }

    /// The total wire size of this atom (header + payload).
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }
}

/// Encode an atom into the wire format.
///
/// Wire format:
/// ```text
/// ┌──────────────┬───────────┬─────────────────────┐
/// │ Size (4B BE) │ Type (4B) │ Payload             │
/// │ incl. header │ "warp"    │ (Size - 8 bytes)    │
/// └──────────────┴───────────┴─────────────────────┘
/// ```
pub fn encode_atom(kind: [u8; 4], payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    let size = HEADER_SIZE + payload.len();
    if size > MAX_ATOM_SIZE {
        return Err(FrameError::AtomTooLarge {
            size,
            max: MAX_ATOM_SIZE,
        });
    }
    dst.reserve(size);
    dst.put_u32(size as u32);
    dst.put_slice(&kind);
    dst.put_slice(payload);
    Ok(())
}

/// Validate a header and return the payload length it announces.
pub fn decode_header(header: &[u8; HEADER_SIZE]) -> Result<usize> {
    let size = u32::from_be_bytes([header[0], header[1], header[2], header[3]]);
    if (size as usize) < HEADER_SIZE {
        return Err(FrameError::AtomTooSmall(size));
    }
    if size as usize > MAX_ATOM_SIZE {
        return Err(FrameError::AtomTooLarge {
            size: size as usize,
            max: MAX_ATOM_SIZE,
        });
    }
    if header[4..8] != ATOM_TYPE {
        return Err(FrameError::UnsupportedType(
            String::from_utf8_lossy(&header[4..8]).into_owned(),
        ));
    }
    Ok(size as usize - HEADER_SIZE)
}

/// Decode an atom from a buffer.
///
/// The header is validated as soon as it is buffered, before any payload
/// bytes are waited on. Returns `Ok(None)` if the buffer doesn't contain a
/// complete atom yet. On success, consumes the atom bytes from the buffer.
pub fn decode_atom(src: &mut BytesMut) -> Result<Option<Atom>> {
    if src.len() < HEADER_SIZE {
        return Ok(None);
    }

    let mut header = [0u8; HEADER_SIZE];
    header.copy_from_slice(&src[..HEADER_SIZE]);
    let payload_len = decode_header(&header)?;

    let total = HEADER_SIZE + payload_len;
    if src.len() < total {
        src.reserve(total - src.len());
        return Ok(None);
    }

    src.advance(HEADER_SIZE);
    let payload = src.split_to(payload_len).freeze();
    let mut kind = [0u8; 4];
    kind.copy_from_slice(&header[4..8]);

    Ok(Some(Atom { kind, payload }))
}

/// `tokio_util` codec for atoms.
#[derive(Debug, Clone, Copy, Default)]
pub struct AtomCodec;

impl Decoder for AtomCodec {
    type Item = Atom;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Atom>> {
        decode_atom(src)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Atom>> {
        match decode_atom(src)? {
            Some(atom) => Ok(Some(atom)),
            None if src.is_empty() => Ok(None),
            None => Err(FrameError::Truncated(src.len())),
        }
    }
}

impl Encoder<Atom> for AtomCodec {
    type Error = FrameError;

    fn encode(&mut self, atom: Atom, dst: &mut BytesMut) -> Result<()> {
        encode_atom(atom.kind, &atom.payload, dst)
    }
}
