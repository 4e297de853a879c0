//! IKNP short OT extension: turns 127 base OTs into any number of random
//! correlated OTs with only symmetric crypto per output.
//!
//! Setup inverts the roles once: the RCOT *sender* plays base-OT receiver
//! with delta's bit decomposition as its choice string, the RCOT *receiver*
//! plays base-OT sender of 127 seed pairs. Delta's LSB is forced to 1 and
//! excluded from the decomposition; bit row 0 of the extension matrix
//! carries the receiver's choice column (all-zero on the sender side), so
//! after transposition the LSB of every output block encodes the choice.

use crate::channel_utils::PartyChannel;
use crate::crypt_utils::{random_block_from_entropy, AesPrg, Block};
use crate::metrics::TrafficRecorder;
use crate::oblivious_transfer::base_np::NpBaseOt;
use crate::oblivious_transfer::RandomCorrelatedOt;
use anyhow::{bail, Context, Result};
use std::sync::Arc;

const EXTENSION_ROWS: usize = 127;

/// Transposes each 128-block chunk of `src` as a 128x128 bit matrix:
/// output block `i` holds, at bit `j`, bit `i` of input block `j`. The
/// transform is an involution. This is the hot spot of the extension; the
/// iterative masked half-swap keeps it to `O(128 log 128)` word operations
/// per chunk.
pub fn matrix_transpose(src: &[Block]) -> Vec<Block> {
    assert!(
        src.len() % 128 == 0,
        "transpose input must be 128-block aligned"
    );
    let mut rst = src.to_vec();
    for chunk in rst.chunks_mut(128) {
        transpose_128(chunk);
    }
    rst
}

fn transpose_128(rows: &mut [Block]) {
    let mut j: u32 = 64;
    let mut mask: u128 = u64::MAX as u128;
    while j != 0 {
        let mut k = 0usize;
        while k < 128 {
            let a = u128::from(rows[k]);
            let b = u128::from(rows[k + j as usize]);
            let t = ((a >> j) ^ b) & mask;
            rows[k] = Block::from(a ^ (t << j));
            rows[k + j as usize] = Block::from(b ^ t);
            k = (k + j as usize + 1) & !(j as usize);
        }
        j >>= 1;
        mask ^= mask << j;
    }
}

/// The delta-holding side of the IKNP extension.
pub struct IknpRcotSender {
    agent: Box<dyn PartyChannel>,
    decomposed_delta: Vec<bool>,
    prgs: Vec<AesPrg>,
}

impl IknpRcotSender {
    /// Runs the base-OT bootstrap (127 transfers with delta bits 1..=127 as
    /// choices) over `agent` and keeps the channel for extension rounds.
    pub fn new(delta: Block, agent: Box<dyn PartyChannel>) -> Result<Self> {
        if !delta.lsb() {
            bail!("lsb of delta must be 1");
        }
        let value: u128 = delta.into();
        let decomposed_delta: Vec<bool> = (1..128).map(|i| value >> i & 1 == 1).collect();

        let mut base_ot = NpBaseOt::new(agent);
        let seeds = base_ot
            .receive(&decomposed_delta)
            .with_context(|| format!("@{}:{}", file!(), line!()))?;
        let agent = base_ot.into_agent();
        log::debug!("iknp sender bootstrap finished");

        Ok(IknpRcotSender {
            agent,
            decomposed_delta,
            prgs: seeds.into_iter().map(AesPrg::new).collect(),
        })
    }

    /// Releases the channel after bootstrap, for a longer-lived owner.
    pub fn into_agent(self) -> Box<dyn PartyChannel> {
        self.agent
    }
}

impl RandomCorrelatedOt for IknpRcotSender {
    fn rcot(&mut self, size: usize) -> Result<Vec<Block>> {
        let block_count = (size + 127) / 128;
        let mut t = vec![Block::ZERO; block_count * 128];
        for i in 0..block_count {
            // Row 0 stays zero; it becomes the LSB column after transpose.
            for j in 0..EXTENSION_ROWS {
                t[i * 128 + 1 + j] = self.prgs[j].random_block();
            }
        }

        let u = self
            .agent
            .receive_blocks(block_count * EXTENSION_ROWS)
            .with_context(|| format!("@{}:{}", file!(), line!()))?;
        for i in 0..block_count {
            for j in 0..EXTENSION_ROWS {
                if self.decomposed_delta[j] {
                    t[i * 128 + 1 + j] ^= u[i * EXTENSION_ROWS + j];
                }
            }
        }

        let mut rst = matrix_transpose(&t);
        rst.truncate(size);
        Ok(rst)
    }

    fn traffic_recorder(&self) -> Arc<TrafficRecorder> {
        self.agent.traffic_recorder()
    }
}

/// The choice-bit side of the IKNP extension.
pub struct IknpRcotReceiver {
    agent: Box<dyn PartyChannel>,
    prgs0: Vec<AesPrg>,
    prgs1: Vec<AesPrg>,
    choice_prg: AesPrg,
}

impl IknpRcotReceiver {
    /// Runs the base-OT bootstrap (sending 127 seed pairs) over `agent`.
    pub fn new(agent: Box<dyn PartyChannel>) -> Result<Self> {
        let mut base_ot = NpBaseOt::new(agent);
        let (seeds0, seeds1) = base_ot
            .send(EXTENSION_ROWS)
            .with_context(|| format!("@{}:{}", file!(), line!()))?;
        let agent = base_ot.into_agent();
        log::debug!("iknp receiver bootstrap finished");

        Ok(IknpRcotReceiver {
            agent,
            prgs0: seeds0.into_iter().map(AesPrg::new).collect(),
            prgs1: seeds1.into_iter().map(AesPrg::new).collect(),
            choice_prg: AesPrg::new(random_block_from_entropy()),
        })
    }

    /// Releases the channel after bootstrap, for a longer-lived owner.
    pub fn into_agent(self) -> Box<dyn PartyChannel> {
        self.agent
    }
}

impl RandomCorrelatedOt for IknpRcotReceiver {
    fn rcot(&mut self, size: usize) -> Result<Vec<Block>> {
        let block_count = (size + 127) / 128;
        let mut t0 = vec![Block::ZERO; block_count * 128];
        let mut u = vec![Block::ZERO; block_count * EXTENSION_ROWS];
        for i in 0..block_count {
            // Row 0 carries the random choice column.
            let choice = self.choice_prg.random_block();
            t0[i * 128] = choice;
            for j in 0..EXTENSION_ROWS {
                let row0 = self.prgs0[j].random_block();
                let row1 = self.prgs1[j].random_block();
                t0[i * 128 + 1 + j] = row0;
                u[i * EXTENSION_ROWS + j] = row0 ^ row1 ^ choice;
            }
        }

        self.agent
            .send_blocks(&u)
            .with_context(|| format!("@{}:{}", file!(), line!()))?;

        let mut rst = matrix_transpose(&t0);
        rst.truncate(size);
        Ok(rst)
    }

    fn traffic_recorder(&self) -> Arc<TrafficRecorder> {
        self.agent.traffic_recorder()
    }
}
