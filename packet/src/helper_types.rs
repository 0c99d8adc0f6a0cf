// SPDX-License-Identifier: MIT
// Copyright(c) 2023 Darek Stojaczyk

use std::{
    any::TypeId,
    ops::{Deref, DerefMut},
};

use bincode::{
    de::{read::Reader, BorrowDecoder, Decoder},
    enc::{write::Writer, Encoder},
    error::{DecodeError, EncodeError},
    BorrowDecode, Decode, Encode,
};

/// Fixed-size array that is encoded without its length.
///
/// Unlike plain arrays it's [`Default`] for any `N`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Arr<T, const N: usize>(pub [T; N]);

impl<T: Default, const N: usize> Default for Arr<T, N> {
    fn default() -> Self {
        Self(core::array::from_fn(|_| T::default()))
    }
}

impl<T, const N: usize> From<[T; N]> for Arr<T, N> {
    fn from(value: [T; N]) -> Self {
        Self(value)
    }
}

impl<T, const N: usize> Deref for Arr<T, N> {
    type Target = [T; N];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<T, const N: usize> DerefMut for Arr<T, N> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl<T: Encode + 'static, const N: usize> Encode for Arr<T, N> {
    fn encode<E: Encoder>(&self, encoder: &mut E) -> Result<(), EncodeError> {
        if TypeId::of::<T>() == TypeId::of::<u8>() {
            // Safety: T = u8
            let bytes: &[u8] = unsafe { core::mem::transmute(&self.0[..]) };
            return encoder.writer().write(bytes);
        }

        for item in self.0.iter() {
            item.encode(encoder)?;
        }
        Ok(())
    }
}

impl<T: Decode, const N: usize> Decode for Arr<T, N> {
    fn decode<D: Decoder>(decoder: &mut D) -> Result<Self, DecodeError> {
        let mut items = Vec::with_capacity(N);
        for _ in 0..N {
            items.push(T::decode(decoder)?);
        }
        let arr: [T; N] = items
            .try_into()
            .map_err(|_| DecodeError::Other("Array length mismatch"))?;
        Ok(Self(arr))
    }
}

impl<'de, T: Decode, const N: usize> BorrowDecode<'de> for Arr<T, N> {
    fn borrow_decode<D: BorrowDecoder<'de>>(decoder: &mut D) -> Result<Self, DecodeError> {
        Self::decode(decoder)
    }
}

impl<const N: usize> Arr<u8, N> {
    /// Copy `bytes` into a zero-padded array. Excess bytes are cut off.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut ret = [0u8; N];
        let len = bytes.len().min(N);
        ret[..len].copy_from_slice(&bytes[..len]);
        Self(ret)
    }

    pub fn from_str(str: &str) -> Self {
        Self::from_bytes(str.as_bytes())
    }

    /// Contents with the zero padding stripped
    pub fn trimmed(&self) -> &[u8] {
        strip_padding(&self.0)
    }
}

impl<const N: usize> Arr<u16, N> {
    /// Widen an ASCII string to UTF-16 code units, zero-padded.
    pub fn from_str(str: &str) -> Self {
        let mut ret = [0u16; N];
        for (dst, src) in ret.iter_mut().zip(str.encode_utf16()) {
            *dst = src;
        }
        Self(ret)
    }

    pub fn to_string_lossy(&self) -> String {
        let len = self.0.iter().position(|c| *c == 0).unwrap_or(N);
        String::from_utf16_lossy(&self.0[..len])
    }
}

/// Vec that doesn't encode its length.
/// When decoding, all remaining source bytes will be consumed.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct UnboundVec<T>(pub Vec<T>);

impl<T: Encode + 'static> Encode for UnboundVec<T> {
    fn encode<E: Encoder>(&self, encoder: &mut E) -> Result<(), EncodeError> {
        if TypeId::of::<T>() == TypeId::of::<u8>() {
            // Safety: T = u8
            let bytes: &[u8] = unsafe { core::mem::transmute(&self.0[..]) };
            return encoder.writer().write(bytes);
        }

        for item in &self.0 {
            item.encode(encoder)?;
        }
        Ok(())
    }
}

impl<T: Decode> Decode for UnboundVec<T> {
    fn decode<D: Decoder>(decoder: &mut D) -> Result<Self, DecodeError> {
        let mut vec = Vec::new();
        while decoder.reader().peek_read(1).is_some() {
            match T::decode(decoder) {
                Ok(item) => vec.push(item),
                // frame padding shorter than an item
                Err(DecodeError::UnexpectedEnd { .. }) => break,
                Err(err) => return Err(err),
            }
        }
        Ok(UnboundVec(vec))
    }
}

impl<'de, T: Decode> BorrowDecode<'de> for UnboundVec<T> {
    fn borrow_decode<D: BorrowDecoder<'de>>(decoder: &mut D) -> Result<Self, DecodeError> {
        Self::decode(decoder)
    }
}

impl<T> Deref for UnboundVec<T> {
    type Target = Vec<T>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<T> DerefMut for UnboundVec<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl<T> From<Vec<T>> for UnboundVec<T> {
    fn from(value: Vec<T>) -> Self {
        Self(value)
    }
}

/// Strip trailing zero bytes.
pub fn strip_padding(bytes: &[u8]) -> &[u8] {
    let len = bytes.iter().rposition(|b| *b != 0).map_or(0, |pos| pos + 1);
    &bytes[..len]
}

/// ASCII to UTF-16LE, byte by byte.
pub fn to_utf16le(str: &str) -> Vec<u8> {
    str.encode_utf16().flat_map(u16::to_le_bytes).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bincode::config;

    #[test]
    fn arr_encoding() {
        let arr = Arr::<u16, 4>::from_str("Hi");
        let bytes = bincode::encode_to_vec(&arr, config::legacy()).unwrap();
        assert_eq!(bytes, [b'H', 0, b'i', 0, 0, 0, 0, 0]);
        assert_eq!(arr.to_string_lossy(), "Hi");

        let (decoded, len) =
            bincode::decode_from_slice::<Arr<u16, 4>, _>(&bytes, config::legacy()).unwrap();
        assert_eq!(len, 8);
        assert_eq!(decoded, arr);
    }

    #[test]
    fn arr_bytes() {
        let arr = Arr::<u8, 4>::from_str("abcdef");
        assert_eq!(*arr, *b"abcd");
        let arr = Arr::<u8, 8>::from_str("ab");
        assert_eq!(arr.trimmed(), b"ab");
        assert_eq!(Arr::<u8, 300>::default().len(), 300);
    }

    #[test]
    fn unbound_vec_consumes_all() {
        let bytes = [1u8, 0, 2, 0, 3, 0];
        let (vec, len) =
            bincode::decode_from_slice::<UnboundVec<u16>, _>(&bytes, config::legacy()).unwrap();
        assert_eq!(len, 6);
        assert_eq!(*vec, vec![1, 2, 3]);

        let (vec, _) =
            bincode::decode_from_slice::<UnboundVec<u8>, _>(&[], config::legacy()).unwrap();
        assert!(vec.is_empty());
    }

    #[test]
    fn unbound_vec_skips_padding() {
        let bytes = [1u8, 0, 0, 0, 2, 0, 0, 0, 0, 0];
        let (vec, _) =
            bincode::decode_from_slice::<UnboundVec<u32>, _>(&bytes, config::legacy()).unwrap();
        assert_eq!(*vec, vec![1, 2]);
    }

    #[test]
    fn padding() {
        assert_eq!(strip_padding(b"pw\0\0\0"), b"pw");
        assert_eq!(strip_padding(b"\0\0"), b"");
        assert_eq!(strip_padding(b"a\0b\0"), b"a\0b");
        assert_eq!(to_utf16le("Ab"), [b'A', 0, b'b', 0]);
    }
}
