//! The engine's communication multiplexer: one channel per peer, plus the
//! collective operations the gate layer needs — key exchange at bootstrap,
//! opening masked values to everyone, opening an output to one party.
//!
//! Every collective operation walks peers in ascending id and orders each
//! pairwise exchange by comparing ids, so all parties agree on who talks
//! first on every channel.

use crate::channel_utils::PartyChannel;
use crate::crypt_utils::Block;
use anyhow::{bail, Context, Result};
use std::collections::BTreeMap;

/// Multiplexes the engine's per-peer channels.
pub struct EngineCommunicationAgent {
    my_id: usize,
    agents: BTreeMap<usize, Box<dyn PartyChannel>>,
}

impl EngineCommunicationAgent {
    /// Wraps one channel per peer. The map must hold every party except
    /// `my_id` itself.
    pub fn new(my_id: usize, agents: BTreeMap<usize, Box<dyn PartyChannel>>) -> Result<Self> {
        if agents.contains_key(&my_id) {
            bail!("communication agent map contains a channel to myself");
        }
        Ok(EngineCommunicationAgent { my_id, agents })
    }

    /// Sends one key block per peer, receives one back. Used once at engine
    /// bootstrap to seed the input-mask PRG pairs.
    pub fn exchange_keys(&mut self, my_keys: &BTreeMap<usize, Block>) -> Result<BTreeMap<usize, Block>> {
        let mut rst = BTreeMap::new();
        for (&peer, agent) in self.agents.iter_mut() {
            let mine = *my_keys
                .get(&peer)
                .with_context(|| format!("no key provided for peer {}", peer))?;
            let theirs = if self.my_id < peer {
                agent.send_block(mine)?;
                agent.receive_block()?
            } else {
                let theirs = agent.receive_block()?;
                agent.send_block(mine)?;
                theirs
            };
            rst.insert(peer, theirs);
        }
        Ok(rst)
    }

    /// Opens a vector of masked shares to every party: each party
    /// contributes its share vector, everyone learns the XOR of all of
    /// them. Empty input produces no traffic.
    pub fn open_shares_to_all(&mut self, shares: &[bool]) -> Result<Vec<bool>> {
        if shares.is_empty() {
            return Ok(Vec::new());
        }
        let mut rst = shares.to_vec();
        for (&peer, agent) in self.agents.iter_mut() {
            let theirs = if self.my_id < peer {
                agent.send_bools(shares)?;
                agent.receive_bools(shares.len())?
            } else {
                let theirs = agent.receive_bools(shares.len())?;
                agent.send_bools(shares)?;
                theirs
            };
            if theirs.len() != shares.len() {
                bail!(
                    "peer {} opened {} shares, expected {}",
                    peer,
                    theirs.len(),
                    shares.len()
                );
            }
            for (dst, src) in rst.iter_mut().zip(theirs.into_iter()) {
                *dst ^= src;
            }
        }
        Ok(rst)
    }

    /// Opens shares to party `id` only. The target returns the
    /// reconstructed values; everyone else echoes its own share back.
    pub fn open_shares_to_party(&mut self, id: usize, shares: &[bool]) -> Result<Vec<bool>> {
        if shares.is_empty() {
            return Ok(Vec::new());
        }
        if id == self.my_id {
            let mut rst = shares.to_vec();
            for (_, agent) in self.agents.iter_mut() {
                let theirs = agent.receive_bools(shares.len())?;
                for (dst, src) in rst.iter_mut().zip(theirs.into_iter()) {
                    *dst ^= src;
                }
            }
            Ok(rst)
        } else {
            let agent = self
                .agents
                .get_mut(&id)
                .with_context(|| format!("no channel to party {}", id))?;
            agent.send_bools(shares)?;
            Ok(shares.to_vec())
        }
    }

    /// Total `(sent, received)` bytes across all peer channels.
    pub fn traffic_stats(&self) -> (u64, u64) {
        self.agents.values().fold((0, 0), |(sent, received), agent| {
            let (s, r) = agent.traffic_stats();
            (sent + s, received + r)
        })
    }
}
