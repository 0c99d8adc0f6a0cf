// SPDX-License-Identifier: MIT
// Copyright(c) 2024 Darek Stojaczyk

//! PRS decompression. PRS is the LZ77 flavour used by some of the
//! game's parameter files.

use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum PrsError {
    #[error("Compressed stream ended unexpectedly at byte {0}")]
    Truncated(usize),
    #[error("Back reference {offset} points before the start of output (at {pos})")]
    BadOffset { offset: isize, pos: usize },
}

/// Control bits are consumed LSB first. A new control byte is read
/// whenever the previous one runs out, so it sits in the stream right
/// where its first bit is needed.
struct BitReader<'a> {
    src: &'a [u8],
    pos: usize,
    ctrl: u8,
    bits_left: u8,
}

impl BitReader<'_> {
    fn byte(&mut self) -> Result<u8, PrsError> {
        let b = *self.src.get(self.pos).ok_or(PrsError::Truncated(self.pos))?;
        self.pos += 1;
        Ok(b)
    }

    fn bit(&mut self) -> Result<bool, PrsError> {
        if self.bits_left == 0 {
            self.ctrl = self.byte()?;
            self.bits_left = 8;
        }
        let bit = self.ctrl & 1;
        self.ctrl >>= 1;
        self.bits_left -= 1;
        Ok(bit == 1)
    }
}

pub fn decompress(src: &[u8]) -> Result<Vec<u8>, PrsError> {
    let mut r = BitReader {
        src,
        pos: 0,
        ctrl: 0,
        bits_left: 0,
    };
    let mut dst = Vec::with_capacity(src.len() * 2);

    loop {
        if r.bit()? {
            dst.push(r.byte()?);
            continue;
        }

        let (len, offset) = if r.bit()? {
            let word = u16::from_le_bytes([r.byte()?, r.byte()?]);
            if word == 0 {
                return Ok(dst);
            }
            let offset = (word >> 3) as isize - 0x2000;
            let len = match word & 7 {
                0 => r.byte()? as usize + 1,
                n => n as usize + 2,
            };
            (len, offset)
        } else {
            let hi = r.bit()? as usize;
            let lo = r.bit()? as usize;
            let len = (hi << 1 | lo) + 2;
            let offset = r.byte()? as isize - 0x100;
            (len, offset)
        };

        let pos = dst.len();
        let start = pos as isize + offset;
        if start < 0 {
            return Err(PrsError::BadOffset { offset, pos });
        }
        // the source may overlap with bytes produced by this very copy
        for i in start as usize..start as usize + len {
            dst.push(dst[i]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Literal-only encoder
    fn compress_literal(data: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        let mut ctrl_pos = 0;
        let mut nbits = 8;
        let mut put_bit = |out: &mut Vec<u8>, bit: bool| {
            if nbits == 8 {
                ctrl_pos = out.len();
                out.push(0);
                nbits = 0;
            }
            if bit {
                out[ctrl_pos] |= 1 << nbits;
            }
            nbits += 1;
        };
        for b in data {
            put_bit(&mut out, true);
            out.push(*b);
        }
        put_bit(&mut out, false);
        put_bit(&mut out, true);
        out.extend_from_slice(&[0, 0]);
        out
    }

    #[test]
    fn short_copy() {
        let src = [0x67, b'a', b'b', b'c', 0xFD, 0x01, 0x00, 0x00];
        assert_eq!(decompress(&src).unwrap(), b"abcabcab");
    }

    #[test]
    fn long_copy() {
        let src = [0x67, b'a', b'b', b'c', 0xFD, 0x05, 0xC6, 0xFF, 0x00, 0x00];
        assert_eq!(decompress(&src).unwrap(), b"abcabcababcabcab");
    }

    #[test]
    fn empty() {
        assert_eq!(decompress(&[0x02, 0x00, 0x00]).unwrap(), b"");
    }

    #[test]
    fn literals() {
        let data: Vec<u8> = (0..=255u8).chain(0..40).collect();
        assert_eq!(decompress(&compress_literal(&data)).unwrap(), data);
    }

    #[test]
    fn malformed() {
        assert_eq!(decompress(&[]), Err(PrsError::Truncated(0)));
        assert_eq!(decompress(&[0x01]), Err(PrsError::Truncated(1)));
        // short copy with nothing to copy from
        assert_eq!(
            decompress(&[0x00, 0xFF]),
            Err(PrsError::BadOffset { offset: -1, pos: 0 })
        );
    }
}
