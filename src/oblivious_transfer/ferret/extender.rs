//! The Ferret iteration itself, and the buffered RCOT built on top of it.
//!
//! Per iteration the receiver samples the LPN matrix seed and publishes it,
//! both sides multiply the first `base_size` base blocks by the seeded
//! 10-local matrix, run the multi-point COT over the remaining base blocks
//! and XOR the two results. [ExtenderBasedRcot] reserves the tail of every
//! iteration's output as the next iteration's bootstrap — those blocks are
//! private seed material and are never emitted to the caller.

use crate::channel_utils::PartyChannel;
use crate::crypt_utils::{random_block_from_entropy, AesPrg, Block};
use crate::metrics::TrafficRecorder;
use crate::oblivious_transfer::ferret::lpn::multiply_with_random_matrix;
use crate::oblivious_transfer::ferret::mpcot::RegularErrorMultiPointCot;
use crate::oblivious_transfer::ferret::FerretConfig;
use crate::oblivious_transfer::RandomCorrelatedOt;
use anyhow::{bail, Context, Result};
use std::sync::Arc;

enum ExtenderRole {
    Sender,
    // The receiver samples the per-iteration matrix seed from this coin
    // source and publishes it.
    Receiver { coin_prg: AesPrg },
}

/// One Ferret extension step: `base_cot_size()` base RCOTs in,
/// `extended_size` RCOTs out. The channel is wired in exactly once, after
/// the bootstrapper is done with it.
///
/// The plain constructors draw their seeds from system entropy; the
/// `_with_seed` variants make every per-iteration coin (the receiver's
/// matrix seeds, the sender's GGM tree roots) a function of the startup
/// seed, so a run over fixed base RCOTs replays byte-for-byte.
pub struct RcotExtender {
    role: ExtenderRole,
    config: FerretConfig,
    multi_point_cot: RegularErrorMultiPointCot,
    agent: Option<Box<dyn PartyChannel>>,
}

impl RcotExtender {
    /// Sender-side extender (holds delta through its multi-point COT).
    pub fn new_sender(delta: Block, config: FerretConfig) -> Result<Self> {
        Self::new_sender_with_seed(delta, config, random_block_from_entropy())
    }

    /// Sender-side extender whose tree roots derive from `seed`.
    pub fn new_sender_with_seed(delta: Block, config: FerretConfig, seed: Block) -> Result<Self> {
        Ok(RcotExtender {
            role: ExtenderRole::Sender,
            config,
            multi_point_cot: RegularErrorMultiPointCot::new_sender_with_seed(
                delta,
                config.extended_size(),
                config.weight(),
                seed,
            )?,
            agent: None,
        })
    }

    /// Receiver-side extender.
    pub fn new_receiver(config: FerretConfig) -> Result<Self> {
        Self::new_receiver_with_seed(config, random_block_from_entropy())
    }

    /// Receiver-side extender whose public matrix coins derive from `seed`.
    pub fn new_receiver_with_seed(config: FerretConfig, seed: Block) -> Result<Self> {
        Ok(RcotExtender {
            role: ExtenderRole::Receiver {
                coin_prg: AesPrg::new(seed),
            },
            config,
            multi_point_cot: RegularErrorMultiPointCot::new_receiver(
                config.extended_size(),
                config.weight(),
            )?,
            agent: None,
        })
    }

    /// Wires in the channel. May be called once; the bootstrapper uses the
    /// channel first, then hands it over here for the rest of the session.
    pub fn set_agent(&mut self, agent: Box<dyn PartyChannel>) -> Result<()> {
        if self.agent.is_some() {
            bail!("communication agent is already wired in");
        }
        self.agent = Some(agent);
        Ok(())
    }

    /// Base RCOT consumed per extension.
    pub fn base_cot_size(&self) -> usize {
        self.config.base_cot_size()
    }

    /// Runs one extension for this party's role.
    pub fn extend_rcot(&mut self, base_cot: Vec<Block>) -> Result<Vec<Block>> {
        if base_cot.len() != self.config.base_cot_size() {
            bail!(
                "unexpected amount of base cot: actual {} vs expected {}",
                base_cot.len(),
                self.config.base_cot_size()
            );
        }
        let RcotExtender {
            role,
            config,
            multi_point_cot,
            agent,
        } = self;
        let Some(agent) = agent.as_mut() else {
            bail!("communication agent has not been wired in");
        };

        // The matrix seed is a public coin: the receiver samples, both use.
        let seed = match role {
            ExtenderRole::Sender => agent
                .receive_block()
                .with_context(|| format!("@{}:{}", file!(), line!()))?,
            ExtenderRole::Receiver { coin_prg } => {
                let seed = coin_prg.random_block();
                agent
                    .send_block(seed)
                    .with_context(|| format!("@{}:{}", file!(), line!()))?;
                seed
            }
        };

        let mut rst = multiply_with_random_matrix(
            seed,
            config.extended_size(),
            &base_cot[..config.base_size()],
        );

        let noise = match role {
            ExtenderRole::Sender => {
                multi_point_cot.sender_extend(agent.as_mut(), &base_cot[config.base_size()..])?
            }
            ExtenderRole::Receiver { .. } => {
                multi_point_cot.receiver_extend(agent.as_mut(), &base_cot[config.base_size()..])?
            }
        };
        if noise.len() != rst.len() {
            bail!(
                "mpcot output length {} does not match matrix output {}",
                noise.len(),
                rst.len()
            );
        }
        for (dst, src) in rst.iter_mut().zip(noise.into_iter()) {
            *dst ^= src;
        }
        Ok(rst)
    }

    fn traffic_recorder(&self) -> Result<Arc<TrafficRecorder>> {
        self.agent
            .as_ref()
            .map(|agent| agent.traffic_recorder())
            .context("communication agent has not been wired in")
    }
}

/// A [RandomCorrelatedOt] that feeds itself: every extension's last
/// `base_cot_size()` outputs become the next extension's base, the rest are
/// buffered and served to `rcot` callers in order.
pub struct ExtenderBasedRcot {
    extender: RcotExtender,
    recorder: Arc<TrafficRecorder>,
    base_cot: Vec<Block>,
    results: Vec<Block>,
    index: usize,
}

impl ExtenderBasedRcot {
    /// Consumes the bootstrap RCOTs and runs the first extension. The
    /// extender must have its agent wired in already.
    pub fn new(extender: RcotExtender, base_cot: Vec<Block>) -> Result<Self> {
        if base_cot.len() != extender.base_cot_size() {
            bail!(
                "bootstrap needs {} base rcot results, got {}",
                extender.base_cot_size(),
                base_cot.len()
            );
        }
        let recorder = extender.traffic_recorder()?;
        let mut rcot = ExtenderBasedRcot {
            extender,
            recorder,
            base_cot,
            results: Vec::new(),
            index: 0,
        };
        rcot.extend()?;
        log::debug!("ferret extender bootstrapped");
        Ok(rcot)
    }

    fn extend(&mut self) -> Result<()> {
        let base = std::mem::take(&mut self.base_cot);
        let mut results = self.extender.extend_rcot(base)?;

        let reserve = self.extender.base_cot_size();
        // Checked by the config, but the extension is meaningless otherwise.
        if results.len() <= reserve {
            bail!("extension produced no surplus over its own bootstrap");
        }
        self.base_cot = results.split_off(results.len() - reserve);
        self.results = results;
        self.index = 0;
        Ok(())
    }
}

impl RandomCorrelatedOt for ExtenderBasedRcot {
    fn rcot(&mut self, size: usize) -> Result<Vec<Block>> {
        let mut rst = Vec::with_capacity(size);
        while rst.len() < size {
            if self.index >= self.results.len() {
                self.extend()?;
            }
            let take = (size - rst.len()).min(self.results.len() - self.index);
            rst.extend_from_slice(&self.results[self.index..self.index + take]);
            self.index += take;
        }
        Ok(rst)
    }

    fn traffic_recorder(&self) -> Arc<TrafficRecorder> {
        Arc::clone(&self.recorder)
    }
}
