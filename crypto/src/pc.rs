// SPDX-License-Identifier: MIT
// Copyright(c) 2024 Darek Stojaczyk

//! XOR stream used by the patch servers. Keystream words come from a
//! 56-word subtractive generator seeded with the 4-byte vector.

use crate::Cipher;

pub const KEY_LEN: usize = 4;

const STREAM_LEN: usize = 56;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PcCipher {
    keys: [u32; STREAM_LEN + 1],
    pos: usize,
}

impl PcCipher {
    pub fn new(key: &[u8; KEY_LEN]) -> Self {
        let seed = u32::from_le_bytes(*key);
        let mut keys = [0u32; STREAM_LEN + 1];
        keys[55] = seed;
        keys[56] = seed;

        let mut x: u32 = 1;
        let mut key = seed;
        for i in (0x15..=0x46e).step_by(0x15) {
            let j = i % 55;
            key = key.wrapping_sub(x);
            keys[j] = x;
            x = key;
            key = keys[j];
        }

        let mut ret = Self {
            keys,
            pos: STREAM_LEN,
        };
        for _ in 0..4 {
            ret.mix();
        }
        ret
    }

    fn mix(&mut self) {
        let k = &mut self.keys;
        for i in 1..0x19 {
            k[i] = k[i].wrapping_sub(k[i + 0x1f]);
        }
        for i in 0x19..0x38 {
            k[i] = k[i].wrapping_sub(k[i - 0x18]);
        }
    }

    fn next_word(&mut self) -> u32 {
        if self.pos == STREAM_LEN {
            self.mix();
            self.pos = 1;
        }
        let ret = self.keys[self.pos];
        self.pos += 1;
        ret
    }

    fn apply(&mut self, data: &mut [u8]) {
        debug_assert_eq!(data.len() % 4, 0);
        for word in data.chunks_exact_mut(4) {
            let val = u32::from_le_bytes([word[0], word[1], word[2], word[3]]) ^ self.next_word();
            word.copy_from_slice(&val.to_le_bytes());
        }
    }
}

impl Cipher for PcCipher {
    type Key = [u8; KEY_LEN];
    const BLOCK_SIZE: usize = 4;

    fn new(key: &Self::Key) -> Self {
        PcCipher::new(key)
    }

    fn encrypt(&mut self, data: &mut [u8]) {
        self.apply(data);
    }

    fn decrypt(&mut self, data: &mut [u8]) {
        self.apply(data);
    }
}
