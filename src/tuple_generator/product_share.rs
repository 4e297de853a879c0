//! Pairwise product shares. Two parties holding `(a1, b1)` and `(a2, b2)`
//! end up with XOR shares of `a1 & b2 ^ a2 & b1` — the cross terms an
//! N-party triple needs.
//!
//! One direction: party 1 samples a random bit `t` and plays OT sender with
//! inputs `(t, t ^ a1)`; party 2 chooses with `b2` and receives
//! `t ^ a1 & b2`. The roles swap for the other cross term, and both
//! directions ride one bi-directional OT call.

use crate::crypt_utils::AesPrg;
use crate::metrics::TrafficRecorder;
use crate::oblivious_transfer::bidirection::RcotBasedBidirectionOt;
use anyhow::{bail, Result};
use std::sync::Arc;

const INT_64_LENGTH: usize = 64;

/// Product-share generation against one peer.
pub struct ProductShareGenerator {
    prg: AesPrg,
    bidirection_ot: RcotBasedBidirectionOt,
}

impl ProductShareGenerator {
    /// Wraps a bi-directional OT with a private PRG for the `t` masks.
    pub fn new(prg: AesPrg, bidirection_ot: RcotBasedBidirectionOt) -> Self {
        ProductShareGenerator {
            prg,
            bidirection_ot,
        }
    }

    /// This party's share of `left_mine & right_peer ^ left_peer &
    /// right_mine`, elementwise over the batch.
    pub fn generate_boolean_product_shares(
        &mut self,
        left: &[bool],
        right: &[bool],
    ) -> Result<Vec<bool>> {
        if left.len() != right.len() {
            bail!(
                "inconsistent input lengths: {} vs {}",
                left.len(),
                right.len()
            );
        }

        let input0 = self.prg.random_bits(left.len());
        let input1: Vec<bool> = input0
            .iter()
            .zip(left.iter())
            .map(|(&t, &a)| t ^ a)
            .collect();

        let mut result = self
            .bidirection_ot
            .bidirection_ot(&input0, &input1, right)?;
        for (share, &t) in result.iter_mut().zip(input0.iter()) {
            *share ^= t;
        }
        Ok(result)
    }

    /// Additive (wrapping) shares of `left_mine * right_peer + left_peer *
    /// right_mine` over u64, via 64 weighted bit OTs per integer.
    pub fn generate_integer_product_shares(
        &mut self,
        left: &[u64],
        right: &[u64],
    ) -> Result<Vec<u64>> {
        if left.len() != right.len() {
            bail!(
                "inconsistent input lengths: {} vs {}",
                left.len(),
                right.len()
            );
        }

        let input0 = self.prg.random_u64s(INT_64_LENGTH * left.len());
        let mut input1 = vec![0u64; INT_64_LENGTH * left.len()];
        let mut choice = vec![false; INT_64_LENGTH * left.len()];
        for i in 0..left.len() {
            for j in 0..INT_64_LENGTH {
                input1[(i << 6) + j] =
                    input0[(i << 6) + j].wrapping_add((1u64 << j).wrapping_mul(left[i]));
                choice[(i << 6) + j] = right[i] >> j & 1 == 1;
            }
        }

        let received = self.bidirection_ot.bidirection_ot(&input0, &input1, &choice)?;

        let mut result = vec![0u64; left.len()];
        for i in 0..left.len() {
            for j in 0..INT_64_LENGTH {
                result[i] = result[i]
                    .wrapping_add(received[(i << 6) + j].wrapping_sub(input0[(i << 6) + j]));
            }
        }
        Ok(result)
    }

    /// Traffic recorders of the underlying channels.
    pub fn traffic_recorders(&self) -> Vec<Arc<TrafficRecorder>> {
        self.bidirection_ot.traffic_recorders()
    }

    /// Total `(sent, received)` bytes.
    pub fn traffic_stats(&self) -> (u64, u64) {
        self.bidirection_ot.traffic_stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypt_utils::random_block_from_entropy;
    use crate::oblivious_transfer::bidirection::create_bidirection_pair;
    use rand::Rng;

    fn create_generator_pair() -> (ProductShareGenerator, ProductShareGenerator) {
        let (ot0, ot1) = create_bidirection_pair();
        (
            ProductShareGenerator::new(AesPrg::new(random_block_from_entropy()), ot0),
            ProductShareGenerator::new(AesPrg::new(random_block_from_entropy()), ot1),
        )
    }

    #[test]
    fn test_boolean_product_shares() {
        let size = 1024;
        let (mut gen0, mut gen1) = create_generator_pair();
        let mut rng = rand::thread_rng();

        let a1: Vec<bool> = (0..size).map(|_| rng.gen()).collect();
        let b1: Vec<bool> = (0..size).map(|_| rng.gen()).collect();
        let a2: Vec<bool> = (0..size).map(|_| rng.gen()).collect();
        let b2: Vec<bool> = (0..size).map(|_| rng.gen()).collect();

        let (a1_clone, b1_clone) = (a1.clone(), b1.clone());
        let handle = std::thread::spawn(move || {
            gen0.generate_boolean_product_shares(&a1_clone, &b1_clone)
                .unwrap()
        });

        let shares1 = gen1.generate_boolean_product_shares(&a2, &b2).unwrap();
        let shares0 = handle.join().unwrap();

        for i in 0..size {
            let expected = (a1[i] & b2[i]) ^ (a2[i] & b1[i]);
            assert_eq!(shares0[i] ^ shares1[i], expected);
        }
    }

    #[test]
    fn test_integer_product_shares() {
        let size = 64;
        let (mut gen0, mut gen1) = create_generator_pair();
        let mut rng = rand::thread_rng();

        let a1: Vec<u64> = (0..size).map(|_| rng.gen()).collect();
        let b1: Vec<u64> = (0..size).map(|_| rng.gen()).collect();
        let a2: Vec<u64> = (0..size).map(|_| rng.gen()).collect();
        let b2: Vec<u64> = (0..size).map(|_| rng.gen()).collect();

        let (a1_clone, b1_clone) = (a1.clone(), b1.clone());
        let handle = std::thread::spawn(move || {
            gen0.generate_integer_product_shares(&a1_clone, &b1_clone)
                .unwrap()
        });

        let shares1 = gen1.generate_integer_product_shares(&a2, &b2).unwrap();
        let shares0 = handle.join().unwrap();

        for i in 0..size {
            let expected = a1[i]
                .wrapping_mul(b2[i])
                .wrapping_add(a2[i].wrapping_mul(b1[i]));
            assert_eq!(shares0[i].wrapping_add(shares1[i]), expected);
        }
    }

    #[test]
    fn test_length_mismatch_is_fatal() {
        let (mut gen0, _gen1) = create_generator_pair();
        assert!(gen0
            .generate_boolean_product_shares(&[true], &[true, false])
            .is_err());
    }
}
