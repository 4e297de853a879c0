//! The 128-bit block, the unit of almost everything in the OT stack: AES
//! keys and ciphertexts, RCOT outputs, GGM tree nodes.

use rand::rngs::OsRng;
use rand::RngCore;
use std::fmt;
use std::ops::{BitXor, BitXorAssign};

/// A 128-bit value. On the wire a block is exactly 16 little-endian bytes;
/// the LSB predicate reads bit 0 of byte 0 and the MSB predicate reads bit 7
/// of byte 15.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct Block(u128);

impl Block {
    /// The all-zero block.
    pub const ZERO: Block = Block(0);

    /// Builds a block from its 16-byte little-endian encoding.
    pub fn from_le_bytes(bytes: [u8; 16]) -> Self {
        Block(u128::from_le_bytes(bytes))
    }

    /// The 16-byte little-endian encoding of this block.
    pub fn to_le_bytes(self) -> [u8; 16] {
        self.0.to_le_bytes()
    }

    /// Builds a block out of two 64-bit halves.
    pub fn from_u64s(high: u64, low: u64) -> Self {
        Block(((high as u128) << 64) | low as u128)
    }

    /// The low 64 bits of this block.
    pub fn low_u64(self) -> u64 {
        self.0 as u64
    }

    /// The least significant bit (bit 0 of byte 0). The OT layer encodes a
    /// choice bit here.
    pub fn lsb(self) -> bool {
        self.0 & 1 == 1
    }

    /// The most significant bit (bit 7 of byte 15).
    pub fn msb(self) -> bool {
        self.0 >> 127 == 1
    }

    /// Overwrites the least significant bit in place.
    pub fn set_lsb_to(&mut self, bit: bool) {
        self.0 = (self.0 & !1) | bit as u128;
    }
}

impl From<u128> for Block {
    fn from(v: u128) -> Self {
        Block(v)
    }
}

impl From<Block> for u128 {
    fn from(b: Block) -> Self {
        b.0
    }
}

impl BitXor for Block {
    type Output = Block;

    fn bitxor(self, rhs: Block) -> Block {
        Block(self.0 ^ rhs.0)
    }
}

impl BitXorAssign for Block {
    fn bitxor_assign(&mut self, rhs: Block) {
        self.0 ^= rhs.0;
    }
}

impl fmt::Debug for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Block({:032x})", self.0)
    }
}

/// Samples one block from system entropy (16 fresh bytes per call).
pub fn random_block_from_entropy() -> Block {
    let mut bytes = [0u8; 16];
    OsRng.fill_bytes(&mut bytes);
    Block::from_le_bytes(bytes)
}
