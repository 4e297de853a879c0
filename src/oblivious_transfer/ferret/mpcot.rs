//! Multi-point COT with regular errors: `weight` independent single-point
//! COTs of length `length / weight`, concatenated. Exactly one position per
//! SPCOT block differs between the parties (by delta), which is the regular
//! noise pattern Ferret's LPN assumption wants.

use crate::channel_utils::PartyChannel;
use crate::crypt_utils::{random_block_from_entropy, Block};
use crate::oblivious_transfer::ferret::spcot::SinglePointCot;
use crate::oblivious_transfer::Role;
use anyhow::{bail, Result};

/// A regular-error multi-point COT.
pub struct RegularErrorMultiPointCot {
    role: Role,
    single_point_cot: SinglePointCot,
    spcot_length: usize,
    spcot_count: usize,
    base_cot_per_spcot: usize,
}

impl RegularErrorMultiPointCot {
    fn init(length: usize, weight: usize) -> Result<(usize, usize, usize)> {
        if weight == 0 || length % weight != 0 {
            bail!(
                "length (={}) must be a multiple of weight (={})",
                length,
                weight
            );
        }
        let spcot_length = length / weight;
        if spcot_length < 2 || !spcot_length.is_power_of_two() {
            bail!(
                "length / weight (={}) must be a power of two >= 2",
                spcot_length
            );
        }
        Ok((
            spcot_length,
            weight,
            spcot_length.trailing_zeros() as usize,
        ))
    }

    /// Sender instance over `length` outputs with `weight` noise positions.
    pub fn new_sender(delta: Block, length: usize, weight: usize) -> Result<Self> {
        Self::new_sender_with_seed(delta, length, weight, random_block_from_entropy())
    }

    /// Sender instance whose GGM tree roots derive from `seed`, so the
    /// whole multi-point output is a function of seed, delta and base COT.
    pub fn new_sender_with_seed(
        delta: Block,
        length: usize,
        weight: usize,
        seed: Block,
    ) -> Result<Self> {
        let (spcot_length, spcot_count, base_cot_per_spcot) = Self::init(length, weight)?;
        Ok(RegularErrorMultiPointCot {
            role: Role::Sender,
            single_point_cot: SinglePointCot::new_sender_with_seed(delta, seed),
            spcot_length,
            spcot_count,
            base_cot_per_spcot,
        })
    }

    /// Receiver instance.
    pub fn new_receiver(length: usize, weight: usize) -> Result<Self> {
        let (spcot_length, spcot_count, base_cot_per_spcot) = Self::init(length, weight)?;
        Ok(RegularErrorMultiPointCot {
            role: Role::Receiver,
            single_point_cot: SinglePointCot::new_receiver(),
            spcot_length,
            spcot_count,
            base_cot_per_spcot,
        })
    }

    /// Base COT blocks needed per extension.
    pub fn base_cot_size(&self) -> usize {
        self.base_cot_per_spcot * self.spcot_count
    }

    fn extend(&mut self, agent: &mut dyn PartyChannel, base_cot: &[Block]) -> Result<Vec<Block>> {
        if base_cot.len() != self.base_cot_size() {
            bail!(
                "unexpected amount of base cot: actual {} vs expected {}",
                base_cot.len(),
                self.base_cot_size()
            );
        }

        let mut rst = Vec::with_capacity(self.spcot_length * self.spcot_count);
        for chunk in base_cot.chunks_exact(self.base_cot_per_spcot) {
            let tree = match self.role {
                Role::Sender => self.single_point_cot.sender_extend(agent, chunk)?,
                Role::Receiver => self.single_point_cot.receiver_extend(agent, chunk)?,
            };
            rst.extend(tree);
        }
        Ok(rst)
    }

    /// Sender side extension.
    pub fn sender_extend(
        &mut self,
        agent: &mut dyn PartyChannel,
        base_cot: &[Block],
    ) -> Result<Vec<Block>> {
        if self.role != Role::Sender {
            bail!("sender_extend called on a receiver instance");
        }
        self.extend(agent, base_cot)
    }

    /// Receiver side extension.
    pub fn receiver_extend(
        &mut self,
        agent: &mut dyn PartyChannel,
        base_cot: &[Block],
    ) -> Result<Vec<Block>> {
        if self.role != Role::Receiver {
            bail!("receiver_extend called on a sender instance");
        }
        self.extend(agent, base_cot)
    }
}
