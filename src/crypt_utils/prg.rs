//! A seedable pseudorandom generator: AES-128 in counter mode, keyed on the
//! seed. Two instances with the same seed emit identical streams
//! byte-for-byte, no matter how the draws are sliced into bits, bytes,
//! integers or blocks — the engine relies on this to let a party mirror the
//! exact mask stream a peer will consume.

use crate::crypt_utils::aes::Aes;
use crate::crypt_utils::block::Block;

const BATCH_BLOCKS: usize = 64;

/// AES-CTR pseudorandom generator. Stream index 0 is the first output byte.
pub struct AesPrg {
    cipher: Aes,
    counter: u128,
    buffer: Vec<u8>,
    offset: usize,
}

impl AesPrg {
    /// Creates a generator keyed on `seed`, positioned at the start of the
    /// stream.
    pub fn new(seed: Block) -> Self {
        AesPrg {
            cipher: Aes::new(seed),
            counter: 0,
            buffer: Vec::new(),
            offset: 0,
        }
    }

    fn refill(&mut self) {
        let mut blocks: Vec<Block> = (0..BATCH_BLOCKS)
            .map(|i| Block::from(self.counter + i as u128))
            .collect();
        self.counter += BATCH_BLOCKS as u128;
        self.cipher.encrypt_in_place(&mut blocks);

        self.buffer.clear();
        for block in blocks {
            self.buffer.extend_from_slice(&block.to_le_bytes());
        }
        self.offset = 0;
    }

    /// The next `size` bytes of the stream.
    pub fn random_bytes(&mut self, size: usize) -> Vec<u8> {
        let mut rst = Vec::with_capacity(size);
        while rst.len() < size {
            if self.offset >= self.buffer.len() {
                self.refill();
            }
            let take = (size - rst.len()).min(self.buffer.len() - self.offset);
            rst.extend_from_slice(&self.buffer[self.offset..self.offset + take]);
            self.offset += take;
        }
        rst
    }

    /// The next `size` bits. Bits are drawn least-significant-first out of
    /// each stream byte; a call always consumes whole bytes.
    pub fn random_bits(&mut self, size: usize) -> Vec<bool> {
        let bytes = self.random_bytes((size + 7) / 8);
        (0..size).map(|i| bytes[i / 8] >> (i % 8) & 1 == 1).collect()
    }

    /// The next `size` 64-bit integers, 8 little-endian bytes each.
    pub fn random_u64s(&mut self, size: usize) -> Vec<u64> {
        let bytes = self.random_bytes(size * 8);
        bytes
            .chunks_exact(8)
            .map(|chunk| {
                let mut buf = [0u8; 8];
                buf.copy_from_slice(chunk);
                u64::from_le_bytes(buf)
            })
            .collect()
    }

    /// The next block, 16 little-endian bytes.
    pub fn random_block(&mut self) -> Block {
        let bytes = self.random_bytes(16);
        let mut buf = [0u8; 16];
        buf.copy_from_slice(&bytes);
        Block::from_le_bytes(buf)
    }

    /// The next `size` blocks.
    pub fn random_blocks(&mut self, size: usize) -> Vec<Block> {
        (0..size).map(|_| self.random_block()).collect()
    }
}
