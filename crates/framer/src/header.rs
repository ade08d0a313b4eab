//! A simple header layout: a kind byte followed by the body length as a big-endian u32.
use bytes::{Buf, BufMut};

#[derive(Copy, Clone, Eq, Ord, PartialEq, PartialOrd, Debug, Hash)]
#[cfg_attr(test, derive(proptest_derive::Arbitrary))]
pub struct TypeLengthHeader {
    pub kind: u8,
    pub body_len: u32,
}

#[derive(Debug, Eq, PartialEq, derive_more::Display, thiserror::Error)]
#[non_exhaustive]
pub enum HeaderError {
    NotEnoughData,

    /// The body can't be described by a u32 length.  Contains the length we were asked to encode.
    BodyTooLong(usize),
}

impl TypeLengthHeader {
    /// Size of the header on the wire.
    pub const SIZE: usize = 5;

    pub fn new(kind: u8, body_len: u32) -> TypeLengthHeader {
        TypeLengthHeader { kind, body_len }
    }

    pub fn encode(&self, dest: &mut impl BufMut) {
        dest.put_u8(self.kind);
        dest.put_u32(self.body_len);
    }

    pub fn decode(source: &mut impl Buf) -> Result<TypeLengthHeader, HeaderError> {
        if source.remaining() < Self::SIZE {
            return Err(HeaderError::NotEnoughData);
        }

        let kind = source.get_u8();
        let body_len = source.get_u32();
        Ok(TypeLengthHeader { kind, body_len })
    }

    /// Read the body length out of a header without decoding the rest.
    ///
    /// Intended for [crate::FrameSink::body_len] implementations, which are only ever handed complete headers.
    pub fn body_len_of(header: &[u8]) -> Result<usize, HeaderError> {
        Ok(Self::decode(&mut &header[..])?.body_len as usize)
    }

    /// Build a complete message out of a kind and a body.
    pub fn frame(kind: u8, body: &[u8]) -> Result<Vec<u8>, HeaderError> {
        let body_len = u32::try_from(body.len()).map_err(|_| HeaderError::BodyTooLong(body.len()))?;
        let mut out = Vec::with_capacity(Self::SIZE + body.len());
        TypeLengthHeader::new(kind, body_len).encode(&mut out);
        out.put_slice(body);
        Ok(out)
    }
}
