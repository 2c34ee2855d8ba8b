//! Fixed-size frame codec.
//!
//! A frame is one header byte followed by a payload whose length is fixed by
//! the header. There is no length prefix on the wire, so the size table is
//! authoritative. Here the size table is not written by hand: each packet
//! kind is declared once through [`packets!`] and its size is the sum of its
//! field sizes.

use std::fmt;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::ProtocolError;

/// Width of every string field on the wire.
pub const STRING_LEN: usize = 64;

/// Width of the raw byte array carried by a level data chunk.
pub const LEVEL_CHUNK_LEN: usize = 1024;

/// A typed field with a fixed encoded width.
pub trait WireField: Sized {
    const SIZE: usize;

    fn write_to(&self, buf: &mut BytesMut);

    /// Reads the field. The caller guarantees `SIZE` bytes are available.
    fn read_from(buf: &mut &[u8]) -> Self;
}

impl WireField for u8 {
    const SIZE: usize = 1;

    fn write_to(&self, buf: &mut BytesMut) {
        buf.put_u8(*self);
    }

    fn read_from(buf: &mut &[u8]) -> Self {
        buf.get_u8()
    }
}

impl WireField for i8 {
    const SIZE: usize = 1;

    fn write_to(&self, buf: &mut BytesMut) {
        buf.put_i8(*self);
    }

    fn read_from(buf: &mut &[u8]) -> Self {
        buf.get_i8()
    }
}

impl WireField for i16 {
    const SIZE: usize = 2;

    fn write_to(&self, buf: &mut BytesMut) {
        buf.put_i16(*self);
    }

    fn read_from(buf: &mut &[u8]) -> Self {
        buf.get_i16()
    }
}

impl WireField for i32 {
    const SIZE: usize = 4;

    fn write_to(&self, buf: &mut BytesMut) {
        buf.put_i32(*self);
    }

    fn read_from(buf: &mut &[u8]) -> Self {
        buf.get_i32()
    }
}

/// Strings are 64 bytes of ASCII padded with spaces. Longer strings are
/// truncated and non-ASCII characters become `?`.
impl WireField for String {
    const SIZE: usize = STRING_LEN;

    fn write_to(&self, buf: &mut BytesMut) {
        let mut written = 0;
        for ch in self.chars().take(STRING_LEN) {
            buf.put_u8(if ch.is_ascii() { ch as u8 } else { b'?' });
            written += 1;
        }
        buf.put_bytes(b' ', STRING_LEN - written);
    }

    fn read_from(buf: &mut &[u8]) -> Self {
        let (raw, rest) = buf.split_at(STRING_LEN);
        *buf = rest;
        let text: String = raw
            .iter()
            .map(|&b| if b.is_ascii() { b as char } else { '?' })
            .collect();
        text.trim_end_matches(' ').to_string()
    }
}

/// Raw 1024-byte payload of a level data chunk.
#[derive(Clone, PartialEq, Eq)]
pub struct LevelChunk(pub Box<[u8; LEVEL_CHUNK_LEN]>);

impl LevelChunk {
    /// Copies up to 1024 bytes from `data`, zero-filling the rest.
    pub fn from_slice(data: &[u8]) -> Self {
        let mut chunk = Box::new([0u8; LEVEL_CHUNK_LEN]);
        let n = data.len().min(LEVEL_CHUNK_LEN);
        chunk[..n].copy_from_slice(&data[..n]);
        LevelChunk(chunk)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0[..]
    }
}

impl Default for LevelChunk {
    fn default() -> Self {
        LevelChunk(Box::new([0u8; LEVEL_CHUNK_LEN]))
    }
}

impl fmt::Debug for LevelChunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LevelChunk")
            .field("len", &LEVEL_CHUNK_LEN)
            .finish()
    }
}

impl WireField for LevelChunk {
    const SIZE: usize = LEVEL_CHUNK_LEN;

    fn write_to(&self, buf: &mut BytesMut) {
        buf.put_slice(self.as_bytes());
    }

    fn read_from(buf: &mut &[u8]) -> Self {
        let (raw, rest) = buf.split_at(LEVEL_CHUNK_LEN);
        *buf = rest;
        LevelChunk::from_slice(raw)
    }
}

/// A closed set of fixed-size messages.
///
/// Implemented by [`packets!`]; only `encode*`/`decode*` are meant to be
/// called directly.
pub trait Frame: Sized + fmt::Debug {
    /// Header byte of this message.
    fn id(&self) -> u8;

    /// Fixed payload size for a header byte, `None` if the id is unknown.
    fn payload_size(id: u8) -> Option<usize>;

    fn write_payload(&self, buf: &mut BytesMut);

    fn read_payload(id: u8, payload: &mut &[u8]) -> Result<Self, ProtocolError>;

    /// Header plus payload.
    fn frame_size(id: u8) -> Option<usize> {
        Self::payload_size(id).map(|n| n + 1)
    }

    /// Appends one frame to `buf`. Leaves `buf` untouched on error.
    fn encode_into(&self, buf: &mut BytesMut) -> Result<(), ProtocolError> {
        let id = self.id();
        let expected = Self::payload_size(id).ok_or(ProtocolError::UnknownPacket(id))?;
        let start = buf.len();
        buf.reserve(expected + 1);
        buf.put_u8(id);
        self.write_payload(buf);

        let actual = buf.len() - start - 1;
        if actual != expected {
            buf.truncate(start);
            return Err(ProtocolError::SizeMismatch {
                id,
                expected,
                actual,
            });
        }
        Ok(())
    }

    fn encode(&self) -> Result<Bytes, ProtocolError> {
        let mut buf = BytesMut::new();
        self.encode_into(&mut buf)?;
        Ok(buf.freeze())
    }

    /// Decodes the frame at the start of `buf`.
    ///
    /// Returns `Ok(None)` while the frame is incomplete and the number of
    /// bytes consumed otherwise. Never reads past the fixed frame size.
    fn decode(buf: &[u8]) -> Result<Option<(Self, usize)>, ProtocolError> {
        let Some(&id) = buf.first() else {
            return Ok(None);
        };
        let size = Self::payload_size(id).ok_or(ProtocolError::UnknownPacket(id))?;
        if buf.len() < size + 1 {
            return Ok(None);
        }
        let mut payload = &buf[1..=size];
        let frame = Self::read_payload(id, &mut payload)?;
        Ok(Some((frame, size + 1)))
    }

    /// Decodes a buffer holding exactly one frame.
    fn decode_exact(buf: &[u8]) -> Result<Self, ProtocolError> {
        match Self::decode(buf)? {
            Some((frame, used)) if used == buf.len() => Ok(frame),
            Some((_, used)) => Err(ProtocolError::TrailingBytes(buf.len() - used)),
            None => match buf.first() {
                None => Err(ProtocolError::Empty),
                Some(&id) => Err(ProtocolError::Incomplete {
                    id,
                    have: buf.len(),
                    need: Self::frame_size(id).unwrap_or_default(),
                }),
            },
        }
    }
}

/// Declares a closed packet enum and derives [`Frame`] from it.
///
/// ```ignore
/// packets! {
///     pub enum Example {
///         Ping = 0x01 {},
///         Move = 0x08 { x: i16, y: i16 },
///     }
/// }
/// ```
macro_rules! packets {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $(
                $(#[$vmeta:meta])*
                $variant:ident = $id:literal { $( $field:ident : $ty:ty ),* $(,)? }
            ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq)]
        $vis enum $name {
            $(
                $(#[$vmeta])*
                $variant { $( $field: $ty ),* },
            )*
        }

        impl $name {
            /// Every header byte this enum understands.
            pub const IDS: &'static [u8] = &[$($id),*];
        }

        impl $crate::protocol::codec::Frame for $name {
            fn id(&self) -> u8 {
                match self {
                    $( $name::$variant { .. } => $id, )*
                }
            }

            fn payload_size(id: u8) -> Option<usize> {
                match id {
                    $( $id => Some(0 $( + <$ty as $crate::protocol::codec::WireField>::SIZE )*), )*
                    _ => None,
                }
            }

            #[allow(unused_variables)]
            fn write_payload(&self, buf: &mut bytes::BytesMut) {
                match self {
                    $(
                        $name::$variant { $( $field ),* } => {
                            $( $crate::protocol::codec::WireField::write_to($field, buf); )*
                        }
                    )*
                }
            }

            #[allow(unused_variables)]
            fn read_payload(
                id: u8,
                payload: &mut &[u8],
            ) -> Result<Self, $crate::error::ProtocolError> {
                match id {
                    $(
                        $id => Ok($name::$variant {
                            $( $field: <$ty as $crate::protocol::codec::WireField>::read_from(payload) ),*
                        }),
                    )*
                    other => Err($crate::error::ProtocolError::UnknownPacket(other)),
                }
            }
        }
    };
}

pub(crate) use packets;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strings_pad_and_trim() {
        let mut buf = BytesMut::new();
        "hello".to_string().write_to(&mut buf);
        assert_eq!(buf.len(), STRING_LEN);
        assert_eq!(&buf[..5], b"hello");
        assert!(buf[5..].iter().all(|&b| b == b' '));

        let mut slice = &buf[..];
        assert_eq!(String::read_from(&mut slice), "hello");
        assert!(slice.is_empty());
    }

    #[test]
    fn strings_truncate_and_replace_non_ascii() {
        let long = "x".repeat(100);
        let mut buf = BytesMut::new();
        long.write_to(&mut buf);
        assert_eq!(buf.len(), STRING_LEN);

        let mut buf = BytesMut::new();
        "caf\u{e9}".to_string().write_to(&mut buf);
        let mut slice = &buf[..];
        assert_eq!(String::read_from(&mut slice), "caf?");
    }

    #[test]
    fn shorts_are_big_endian() {
        let mut buf = BytesMut::new();
        0x0102i16.write_to(&mut buf);
        assert_eq!(&buf[..], &[0x01, 0x02]);
    }

    #[test]
    fn level_chunk_zero_fills() {
        let chunk = LevelChunk::from_slice(&[7, 7, 7]);
        assert_eq!(&chunk.as_bytes()[..4], &[7, 7, 7, 0]);
        assert_eq!(chunk.as_bytes().len(), LEVEL_CHUNK_LEN);
    }
}
