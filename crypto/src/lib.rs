// SPDX-License-Identifier: MIT
// Copyright(c) 2024 Darek Stojaczyk

pub mod bb;
pub mod pc;

pub use bb::BbCipher;
pub use pc::PcCipher;

/// Symmetric packet cipher with its own running state.
///
/// Every call advances the state, so the two directions of a connection
/// each need a separate instance seeded with the same key as the peer's.
pub trait Cipher: Send {
    /// Initialization vector sent in the clear by the welcome packet.
    type Key: AsRef<[u8]> + AsMut<[u8]> + Copy + Send;

    /// Number of bytes processed at once. Input lengths must be
    /// a multiple of it. Trailing bytes are left untouched.
    const BLOCK_SIZE: usize;

    fn new(key: &Self::Key) -> Self;
    fn encrypt(&mut self, data: &mut [u8]);
    fn decrypt(&mut self, data: &mut [u8]);
}
