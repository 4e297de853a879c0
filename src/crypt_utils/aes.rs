//! AES-128 over [Block] slices, plus the two constructions the OT stack
//! derives from it: the fixed-key correlation-robust hash and the GGM tree
//! expander.

use crate::crypt_utils::block::Block;
use aes::cipher::{BlockEncrypt, KeyInit};
use aes::Aes128;
use generic_array::GenericArray;

/// An AES-128 cipher with its round keys expanded once at construction.
/// Scheduling the key dominates a single encryption, so a cipher is built
/// once and reused across the whole session.
pub struct Aes {
    cipher: Aes128,
}

impl Aes {
    /// Creates a cipher for the given key.
    pub fn new(key: Block) -> Self {
        Aes {
            cipher: Aes128::new(GenericArray::from_slice(&key.to_le_bytes())),
        }
    }

    /// The fixed public key used for the correlation-robust hash. The value
    /// itself is irrelevant as long as every party agrees on it.
    pub fn fixed_key() -> Block {
        Block::ZERO
    }

    /// ECB encryption over a slice of blocks, in place.
    pub fn encrypt_in_place(&self, blocks: &mut [Block]) {
        let mut buf: Vec<aes::Block> = blocks
            .iter()
            .map(|b| GenericArray::from(b.to_le_bytes()))
            .collect();
        self.cipher.encrypt_blocks(&mut buf);
        for (dst, src) in blocks.iter_mut().zip(buf.iter()) {
            let mut bytes = [0u8; 16];
            bytes.copy_from_slice(src.as_slice());
            *dst = Block::from_le_bytes(bytes);
        }
    }

    /// The correlation-robust hash `H(x) = AES_k(x) ^ x`, in place. With a
    /// fixed public key this behaves as a random oracle for the semi-honest
    /// security argument: `H(x) ^ H(x ^ delta)` is indistinguishable from
    /// random while delta stays secret.
    pub fn hash_in_place(&self, blocks: &mut [Block]) {
        let tmp = blocks.to_vec();
        self.encrypt_in_place(blocks);
        for (dst, src) in blocks.iter_mut().zip(tmp.into_iter()) {
            *dst ^= src;
        }
    }
}

/// Expands `n` GGM tree nodes into `2n` children. The i-th input controls
/// outputs `2i` and `2i + 1`. The two child derivations use separate ciphers
/// keyed on the extension index so distinct trees never share a key.
pub struct Expander {
    cipher0: Aes,
    cipher1: Aes,
}

impl Expander {
    /// Creates the pair of ciphers for the given extension index.
    pub fn new(index: u64) -> Self {
        Expander {
            cipher0: Aes::new(Block::from_u64s(0, index << 1)),
            cipher1: Aes::new(Block::from_u64s(1 + (index << 1), 0)),
        }
    }

    /// One level of tree expansion: `src[i]` becomes
    /// `(E0(src[i]) ^ src[i], E1(src[i]) ^ src[i])`.
    pub fn expand(&self, src: Vec<Block>) -> Vec<Block> {
        let mut even = src.clone();
        self.cipher0.encrypt_in_place(&mut even);
        let mut odd = src.clone();
        self.cipher1.encrypt_in_place(&mut odd);

        let mut rst = Vec::with_capacity(src.len() * 2);
        for i in 0..src.len() {
            rst.push(even[i] ^ src[i]);
            rst.push(odd[i] ^ src[i]);
        }
        rst
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypt_utils::block::random_block_from_entropy;

    #[test]
    fn test_aes_fips197_vector() {
        // Appendix C.1 of FIPS-197.
        let key = Block::from_le_bytes([
            0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0a, 0x0b, 0x0c, 0x0d,
            0x0e, 0x0f,
        ]);
        let plaintext = Block::from_le_bytes([
            0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88, 0x99, 0xaa, 0xbb, 0xcc, 0xdd,
            0xee, 0xff,
        ]);
        let expected = [
            0x69, 0xc4, 0xe0, 0xd8, 0x6a, 0x7b, 0x04, 0x30, 0xd8, 0xcd, 0xb7, 0x80, 0x70, 0xb4,
            0xc5, 0x5a,
        ];

        let cipher = Aes::new(key);
        let mut blocks = vec![plaintext];
        cipher.encrypt_in_place(&mut blocks);
        assert_eq!(blocks[0].to_le_bytes(), expected);
    }

    #[test]
    fn test_hash_is_encrypt_xor_input() {
        let cipher = Aes::new(Aes::fixed_key());
        let x = random_block_from_entropy();

        let mut hashed = vec![x];
        cipher.hash_in_place(&mut hashed);

        let mut encrypted = vec![x];
        cipher.encrypt_in_place(&mut encrypted);

        assert_eq!(hashed[0], encrypted[0] ^ x);
    }

    #[test]
    fn test_hash_deterministic_across_ciphers() {
        // Two ciphers under the same key must agree, as two parties do.
        let c1 = Aes::new(Aes::fixed_key());
        let c2 = Aes::new(Aes::fixed_key());
        let x = random_block_from_entropy();
        let mut a = vec![x];
        let mut b = vec![x];
        c1.hash_in_place(&mut a);
        c2.hash_in_place(&mut b);
        assert_eq!(a, b);
    }

    #[test]
    fn test_expander_doubles() {
        let expander = Expander::new(7);
        let src: Vec<Block> = (0..5).map(|_| random_block_from_entropy()).collect();
        let dst = expander.expand(src.clone());
        assert_eq!(dst.len(), 10);

        // Expansion is deterministic for a fixed index.
        let again = expander.expand(src.clone());
        assert_eq!(dst, again);

        // A different index yields a different tree.
        let other = Expander::new(8).expand(src);
        assert_ne!(dst, other);
    }
}
