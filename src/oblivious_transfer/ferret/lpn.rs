//! The 10-local linear code used for Ferret's LPN matrix. With a given
//! public seed, exactly ten source blocks (possibly with duplication) are
//! selected and XORed to form each output block. The selection is a pure
//! function of the seed, so two parties holding the same seed compute the
//! same matrix.

use crate::crypt_utils::{AesPrg, Block};

/// Non-zero entries per matrix row.
pub const LOCALITY: usize = 10;

/// Multiplies `src` by the seed-defined pseudorandom `rst_length x src.len()`
/// binary matrix with [LOCALITY] non-zero entries per row.
pub fn multiply_with_random_matrix(seed: Block, rst_length: usize, src: &[Block]) -> Vec<Block> {
    assert!(!src.is_empty(), "matrix source must be non-empty");
    let mut prg = AesPrg::new(seed);
    let len = src.len() as u64;

    let mut rst = Vec::with_capacity(rst_length);
    for _ in 0..rst_length {
        let mut acc = Block::ZERO;
        for index in prg.random_u64s(LOCALITY) {
            acc ^= src[(index % len) as usize];
        }
        rst.push(acc);
    }
    rst
}
