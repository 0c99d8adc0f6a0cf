// SPDX-License-Identifier: MIT
// Copyright(c) 2024 Darek Stojaczyk

use bincode::{
    config,
    error::{DecodeError, EncodeError},
};
use thiserror::Error;

/// Shape of the frame header.
///
/// The patch and data servers speak the short PC header, every
/// other server speaks the longer Blue Burst one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderKind {
    /// `{ len: u16, id: u16 }`
    Pc,
    /// `{ len: u16, id: u16, flags: u32 }`
    Bb,
}

impl HeaderKind {
    pub const fn size(self) -> usize {
        match self {
            HeaderKind::Pc => 4,
            HeaderKind::Bb => 8,
        }
    }

    /// Round `len` up to a multiple of the header size.
    pub const fn align(self, len: usize) -> usize {
        let size = self.size();
        (len + size - 1) / size * size
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Length of the whole packet, header included
    pub len: u16,
    pub id: u16,
    /// Only serialized for [`HeaderKind::Bb`]. Otherwise 0
    pub flags: u32,
    pub kind: HeaderKind,
}

impl Header {
    pub fn new(kind: HeaderKind, id: u16, flags: u32) -> Self {
        Self {
            len: 0,
            id,
            flags,
            kind,
        }
    }

    pub fn num_bytes(&self) -> usize {
        self.kind.size()
    }

    /// Length of the packet on the wire. Some clients declare lengths
    /// which are not aligned to the header size, the remaining bytes
    /// are still sent.
    pub fn aligned_len(&self) -> usize {
        self.kind.align(self.len as usize)
    }

    pub fn serialize(&self, dst: &mut [u8]) -> Result<usize, EncodeError> {
        let num_bytes = self.num_bytes();
        if dst.len() < num_bytes {
            return Err(EncodeError::UnexpectedEnd);
        }
        dst[0..2].copy_from_slice(&self.len.to_le_bytes());
        dst[2..4].copy_from_slice(&self.id.to_le_bytes());
        if self.kind == HeaderKind::Bb {
            dst[4..8].copy_from_slice(&self.flags.to_le_bytes());
        }
        Ok(num_bytes)
    }

    pub fn deserialize(src: &[u8], kind: HeaderKind) -> Result<Self, HeaderDeserializeError> {
        let num_bytes = kind.size();
        if src.len() < num_bytes {
            return Err(DecodeError::UnexpectedEnd {
                additional: num_bytes - src.len(),
            }
            .into());
        }

        let len = u16::from_le_bytes([src[0], src[1]]);
        if (len as usize) < num_bytes {
            return Err(HeaderDeserializeError::TooSmall {
                expected: num_bytes as u16,
                found: len,
            });
        }
        let id = u16::from_le_bytes([src[2], src[3]]);
        let flags = match kind {
            HeaderKind::Pc => 0,
            HeaderKind::Bb => u32::from_le_bytes([src[4], src[5], src[6], src[7]]),
        };

        Ok(Self {
            len,
            id,
            flags,
            kind,
        })
    }
}

#[derive(Error, Debug)]
pub enum HeaderDeserializeError {
    #[error("Packet size smaller than header size (expected {expected:#04x}, got {found:#04x})")]
    TooSmall { expected: u16, found: u16 },
    #[error("Deserialize failed ({0})")]
    DeserializeError(#[from] DecodeError),
}

#[derive(Error, Debug)]
pub enum PayloadDeserializeError {
    #[error("Deserialize failed ({0})")]
    DeserializeError(#[from] DecodeError),
}

#[derive(Error, Debug)]
pub enum PayloadSerializeError {
    #[error("Packet is too long ({payload_len:#04x}), its size doesn't fit in u16")]
    PayloadTooLong { payload_len: usize },
    #[error("Serialize failed: {0}")]
    SerializeError(#[from] EncodeError),
}

#[derive(Error, Debug)]
pub enum PacketDeserializeError {
    #[error("Header error: {0}")]
    Header(#[from] HeaderDeserializeError),
    #[error("Payload error: {0}")]
    Payload(#[from] PayloadDeserializeError),
}

/// Pad `buf` with zeroes to a multiple of the header size, then write
/// the final length into its first two bytes. Returns the final length.
pub fn pad_and_stamp(buf: &mut Vec<u8>, kind: HeaderKind) -> Result<usize, PayloadSerializeError> {
    let len = kind.align(buf.len().max(kind.size()));
    let stamp: u16 = len
        .try_into()
        .map_err(|_| PayloadSerializeError::PayloadTooLong { payload_len: len })?;
    buf.resize(len, 0u8);
    buf[0..2].copy_from_slice(&stamp.to_le_bytes());
    Ok(len)
}

#[macro_export]
macro_rules! assert_def_packet_size {
    ($pkt:ident, $size:expr) => {
        paste::paste! {
            #[allow(unused_imports)]
            use super::*;
            #[cfg(test)]
            #[allow(non_snake_case, clippy::items_after_test_module)]
            mod [<$pkt _test_def_packet_size>] {
                use super::*;
                #[test]
                fn test() {
                    let buf = bincode::encode_to_vec($pkt::default(), bincode::config::legacy()).unwrap();
                    assert_eq!(buf.len(), $size);
                }
            }
        }
    };
}

pub trait Payload: std::fmt::Debug + Send + 'static {
    fn id(&self) -> u16;

    fn serialize_no_hdr(&self, dst: &mut Vec<u8>) -> Result<usize, PayloadSerializeError>;

    /// Serialize the packet with a header into `dst`, replacing its
    /// previous contents. The result is padded and has its length stamped.
    fn serialize(
        &self,
        dst: &mut Vec<u8>,
        kind: HeaderKind,
        flags: u32,
    ) -> Result<usize, PayloadSerializeError> {
        let hdr_len = kind.size();
        dst.clear();
        // reserve size for header
        dst.resize(hdr_len, 0u8);
        // serialize into the rest of vector
        self.serialize_no_hdr(dst)?;
        let hdr = Header::new(kind, self.id(), flags);
        hdr.serialize(&mut dst[0..hdr_len])?;
        pad_and_stamp(dst, kind)
    }

    /// Trailing bytes are ignored, they are usually the frame padding.
    fn deserialize_no_hdr(data: &[u8]) -> Result<Self, PayloadDeserializeError>
    where
        Self: Sized + bincode::Decode,
    {
        let (obj, _) = bincode::decode_from_slice::<Self, _>(data, config::legacy())?;
        Ok(obj)
    }
}

/// Enum of all packets a single server may receive, see `#[packet_list]`.
pub trait PacketList: Payload + Sized {
    /// Decode the payload of packet `id`. Unrecognized ids produce
    /// the `Unknown` variant rather than an error.
    fn deserialize_with_id(id: u16, data: &[u8]) -> Result<Self, PayloadDeserializeError>;

    fn deserialize(data: &[u8], kind: HeaderKind) -> Result<(Header, Self), PacketDeserializeError> {
        let hdr = Header::deserialize(data, kind)?;
        let end = hdr.aligned_len().min(data.len());
        let pkt = Self::deserialize_with_id(hdr.id, &data[kind.size()..end])?;
        Ok((hdr, pkt))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pkt_common::Unknown;
    use crate::UnboundVec;

    #[test]
    fn header_shapes() {
        let mut buf = [0u8; 8];
        let hdr = Header {
            len: 0x10,
            id: 0x93,
            flags: 0xdeadbeef,
            kind: HeaderKind::Bb,
        };
        assert_eq!(hdr.serialize(&mut buf).unwrap(), 8);
        assert_eq!(buf, [0x10, 0, 0x93, 0, 0xef, 0xbe, 0xad, 0xde]);
        assert_eq!(Header::deserialize(&buf, HeaderKind::Bb).unwrap(), hdr);

        let hdr = Header::deserialize(&buf, HeaderKind::Pc).unwrap();
        assert_eq!((hdr.len, hdr.id, hdr.flags), (0x10, 0x93, 0));
        assert_eq!(hdr.num_bytes(), 4);
    }

    #[test]
    fn header_too_small() {
        let buf = [0x04, 0x00, 0x02, 0x00, 0, 0, 0, 0];
        assert!(matches!(
            Header::deserialize(&buf, HeaderKind::Bb),
            Err(HeaderDeserializeError::TooSmall {
                expected: 8,
                found: 4
            })
        ));
        assert!(Header::deserialize(&buf, HeaderKind::Pc).is_ok());
        assert!(Header::deserialize(&[0u8; 4], HeaderKind::Pc).is_err());
        assert!(Header::deserialize(&buf[..3], HeaderKind::Pc).is_err());
    }

    #[test]
    fn unaligned_len() {
        let hdr = Header::deserialize(&[0x4a, 0x00, 0x93, 0x00], HeaderKind::Pc).unwrap();
        assert_eq!(hdr.aligned_len(), 0x4c);
        let hdr = Header::deserialize(&[0xb2, 0x00, 0x93, 0x00, 0, 0, 0, 0], HeaderKind::Bb)
            .unwrap();
        assert_eq!(hdr.aligned_len(), 0xb8);
    }

    #[test]
    fn pad_and_stamp_aligns() {
        let mut buf = vec![0xff, 0xff, 0x13, 0x00, 0x01];
        assert_eq!(pad_and_stamp(&mut buf, HeaderKind::Pc).unwrap(), 8);
        assert_eq!(buf, [0x08, 0x00, 0x13, 0x00, 0x01, 0, 0, 0]);

        let mut buf = vec![0u8; 8];
        assert_eq!(pad_and_stamp(&mut buf, HeaderKind::Bb).unwrap(), 8);
        assert_eq!(&buf[0..2], &[0x08, 0x00]);

        let mut buf = vec![0u8; 0x10000];
        assert!(matches!(
            pad_and_stamp(&mut buf, HeaderKind::Bb),
            Err(PayloadSerializeError::PayloadTooLong { .. })
        ));
    }

    #[test]
    fn serialize_unknown() {
        let p = Unknown {
            id: 0xc3e,
            data: UnboundVec(vec![118, 1, 0, 0, 103]),
        };

        let mut bytes: Vec<u8> = vec![0xaa; 3];
        let len = p.serialize(&mut bytes, HeaderKind::Bb, 7).unwrap();
        assert_eq!(len, 16);
        assert_eq!(
            bytes,
            [16, 0, 0x3e, 0xc, 7, 0, 0, 0, 118, 1, 0, 0, 103, 0, 0, 0]
        );
    }
}
