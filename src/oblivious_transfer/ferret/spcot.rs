//! Single-point COT: a GGM tree whose leaves the sender knows in full and
//! the receiver knows except at one secret position. The position is
//! encoded in the base-COT choice bits as `P = sum (1 - lsb(b_i)) *
//! 2^(d-1-i)`; at `P` the two parties' leaves differ by delta.
//!
//! Per level the sender masks the XOR of all even-position children and the
//! XOR of all odd-position children with the hashes of its two base-COT
//! messages; the receiver can remove exactly one mask and thereby learn the
//! sibling branch of its missing path. One final `total_xor` message pins
//! the punctured leaf itself.

use crate::channel_utils::PartyChannel;
use crate::crypt_utils::{random_block_from_entropy, Aes, AesPrg, Block, Expander};
use anyhow::{bail, Result};

enum SpcotRole {
    Sender { delta: Block, root_prg: AesPrg },
    Receiver,
}

/// One single-point COT instance. Each `*_extend` call consumes `depth`
/// base-COT blocks and emits a `2^depth`-leaf tree; the running extension
/// index salts the tree ciphers so no two extensions share keys.
pub struct SinglePointCot {
    role: SpcotRole,
    index: u64,
}

impl SinglePointCot {
    /// A sender instance holding the session delta. Tree roots are derived
    /// from a fresh entropy seed.
    pub fn new_sender(delta: Block) -> Self {
        Self::new_sender_with_seed(delta, random_block_from_entropy())
    }

    /// A sender instance whose tree roots are derived from `seed`. Two
    /// senders with the same seed, delta and base COT emit identical
    /// messages and leaves, which is what makes the extension stream above
    /// replayable.
    pub fn new_sender_with_seed(delta: Block, seed: Block) -> Self {
        SinglePointCot {
            role: SpcotRole::Sender {
                delta,
                root_prg: AesPrg::new(seed),
            },
            index: 0,
        }
    }

    /// A receiver instance.
    pub fn new_receiver() -> Self {
        SinglePointCot {
            role: SpcotRole::Receiver,
            index: 0,
        }
    }

    fn sender_layer(
        agent: &mut dyn PartyChannel,
        expander: &Expander,
        hash_cipher: &Aes,
        previous_layer: Vec<Block>,
        base_cot: Block,
        delta: Block,
    ) -> Result<Vec<Block>> {
        let rst = expander.expand(previous_layer);

        let mut masks = vec![base_cot, base_cot ^ delta];
        hash_cipher.encrypt_in_place(&mut masks);
        masks[0] ^= base_cot;
        masks[1] ^= base_cot ^ delta;

        for pair in rst.chunks_exact(2) {
            masks[0] ^= pair[0];
            masks[1] ^= pair[1];
        }

        agent.send_blocks(&masks)?;
        Ok(rst)
    }

    fn receiver_layer(
        agent: &mut dyn PartyChannel,
        expander: &Expander,
        hash_cipher: &Aes,
        previous_layer: Vec<Block>,
        base_cot: Block,
        missing_position: usize,
    ) -> Result<Vec<Block>> {
        let mut rst = expander.expand(previous_layer);

        let choice = base_cot.lsb() as usize;
        let position_to_fix = (missing_position << 1) + choice;

        let mut tmp = vec![base_cot];
        hash_cipher.encrypt_in_place(&mut tmp);
        rst[position_to_fix] = tmp[0] ^ base_cot;

        let masks = agent.receive_blocks(2)?;
        rst[position_to_fix] ^= masks[choice];

        let mut i = choice;
        while i < rst.len() {
            if i != position_to_fix {
                let v = rst[i];
                rst[position_to_fix] ^= v;
            }
            i += 2;
        }

        Ok(rst)
    }

    /// Sender side: builds the tree for `base_cot.len()` levels and returns
    /// all `2^depth` leaves, LSBs cleared.
    pub fn sender_extend(
        &mut self,
        agent: &mut dyn PartyChannel,
        base_cot: &[Block],
    ) -> Result<Vec<Block>> {
        let (delta, root) = match &mut self.role {
            SpcotRole::Sender { delta, root_prg } => (*delta, root_prg.random_block()),
            SpcotRole::Receiver => bail!("sender_extend called on a receiver instance"),
        };
        let expander = Expander::new(self.index);
        let hash_cipher = Aes::new(Block::from_u64s(self.index, 0));

        let mut layer = vec![root];
        for &block in base_cot {
            layer = Self::sender_layer(agent, &expander, &hash_cipher, layer, block, delta)?;
        }

        let mut total_xor = delta;
        for leaf in layer.iter_mut() {
            leaf.set_lsb_to(false);
            total_xor ^= *leaf;
        }
        agent.send_block(total_xor)?;

        self.index += 1;
        Ok(layer)
    }

    /// Receiver side: reconstructs every leaf except the punctured one,
    /// whose slot ends up holding the sender's leaf XOR delta.
    pub fn receiver_extend(
        &mut self,
        agent: &mut dyn PartyChannel,
        base_cot: &[Block],
    ) -> Result<Vec<Block>> {
        if !matches!(self.role, SpcotRole::Receiver) {
            bail!("receiver_extend called on a sender instance");
        }
        let expander = Expander::new(self.index);
        let hash_cipher = Aes::new(Block::from_u64s(self.index, 0));

        let mut layer = vec![Block::ZERO];
        let mut position = 0usize;
        for &block in base_cot {
            layer = Self::receiver_layer(agent, &expander, &hash_cipher, layer, block, position)?;
            position <<= 1;
            position ^= !block.lsb() as usize;
        }

        // total_xor = delta ^ XOR of all sender leaves.
        let mut total_xor = agent.receive_block()?;
        layer[position] = Block::ZERO;
        for leaf in layer.iter_mut() {
            leaf.set_lsb_to(false);
            total_xor ^= *leaf;
        }
        // What is left is the sender's punctured leaf, offset by delta.
        layer[position] = total_xor;

        self.index += 1;
        Ok(layer)
    }
}

/// Fabricates an RCOT-correlated base COT batch for tests: sender blocks
/// with LSB 0, receiver blocks offset by delta per choice bit.
#[cfg(test)]
pub(crate) fn fabricate_base_cot(delta: Block, count: usize) -> (Vec<Block>, Vec<Block>, Vec<bool>) {
    use rand::Rng;

    let mut rng = rand::thread_rng();
    let mut sender = Vec::with_capacity(count);
    let mut receiver = Vec::with_capacity(count);
    let mut choice = Vec::with_capacity(count);
    for _ in 0..count {
        let mut s = random_block_from_entropy();
        s.set_lsb_to(false);
        let c: bool = rng.gen();
        sender.push(s);
        receiver.push(if c { s ^ delta } else { s });
        choice.push(c);
    }
    (sender, receiver, choice)
}

/// The puncture point a receiver's choice bits encode.
#[cfg(test)]
pub(crate) fn expected_puncture_point(choice: &[bool]) -> usize {
    choice
        .iter()
        .fold(0usize, |acc, &c| (acc << 1) ^ !c as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel_utils::sync_channel::create_unix_channel_pair;

    fn run_spcot(depth: usize) {
        let mut delta = random_block_from_entropy();
        delta.set_lsb_to(true);
        let (sender_base, receiver_base, choice) = fabricate_base_cot(delta, depth);

        let (mut left, mut right) = create_unix_channel_pair().unwrap();

        let handle = std::thread::spawn(move || {
            let mut sender = SinglePointCot::new_sender(delta);
            sender.sender_extend(&mut left, &sender_base).unwrap()
        });

        let mut receiver = SinglePointCot::new_receiver();
        let received = receiver.receiver_extend(&mut right, &receiver_base).unwrap();
        let sent = handle.join().unwrap();

        assert_eq!(sent.len(), 1 << depth);
        assert_eq!(received.len(), 1 << depth);

        let puncture = expected_puncture_point(&choice);
        for i in 0..(1 << depth) {
            if i == puncture {
                assert_eq!(received[i], sent[i] ^ delta);
            } else {
                assert_eq!(received[i], sent[i]);
            }
        }
    }

    #[test]
    fn test_spcot_depth_4() {
        run_spcot(4);
    }

    #[test]
    fn test_spcot_depth_10() {
        run_spcot(10);
    }

    #[test]
    fn test_consecutive_extends_use_fresh_trees() {
        let mut delta = random_block_from_entropy();
        delta.set_lsb_to(true);
        let depth = 6;

        let (mut left, mut right) = create_unix_channel_pair().unwrap();

        let (sender_base1, receiver_base1, choice1) = fabricate_base_cot(delta, depth);
        let (sender_base2, receiver_base2, choice2) = fabricate_base_cot(delta, depth);

        let handle = std::thread::spawn(move || {
            let mut sender = SinglePointCot::new_sender(delta);
            let first = sender.sender_extend(&mut left, &sender_base1).unwrap();
            let second = sender.sender_extend(&mut left, &sender_base2).unwrap();
            (first, second)
        });

        let mut receiver = SinglePointCot::new_receiver();
        let first = receiver
            .receiver_extend(&mut right, &receiver_base1)
            .unwrap();
        let second = receiver
            .receiver_extend(&mut right, &receiver_base2)
            .unwrap();
        let (sent_first, sent_second) = handle.join().unwrap();

        for (sent, received, choice) in [
            (&sent_first, &first, &choice1),
            (&sent_second, &second, &choice2),
        ] {
            let puncture = expected_puncture_point(choice);
            for i in 0..(1 << depth) {
                if i == puncture {
                    assert_eq!(received[i], sent[i] ^ delta);
                } else {
                    assert_eq!(received[i], sent[i]);
                }
            }
        }
        assert_ne!(sent_first, sent_second);
    }

    #[test]
    fn test_seeded_sender_is_replayable() {
        let mut delta = Block::from(0xfeed_face_cafe_f00du128);
        delta.set_lsb_to(true);
        let depth = 5;
        let seed = Block::from(42u128);

        let mut base_prg = AesPrg::new(Block::from(7u128));
        let mut sender_base = base_prg.random_blocks(depth);
        for block in sender_base.iter_mut() {
            block.set_lsb_to(false);
        }
        let receiver_base: Vec<Block> = sender_base.iter().map(|&s| s ^ delta).collect();

        let run = || {
            let sender_base = sender_base.clone();
            let receiver_base = receiver_base.clone();
            let (mut left, mut right) = create_unix_channel_pair().unwrap();
            let handle = std::thread::spawn(move || {
                let mut sender = SinglePointCot::new_sender_with_seed(delta, seed);
                sender.sender_extend(&mut left, &sender_base).unwrap()
            });
            let mut receiver = SinglePointCot::new_receiver();
            let received = receiver.receiver_extend(&mut right, &receiver_base).unwrap();
            (handle.join().unwrap(), received)
        };

        let (sent_a, received_a) = run();
        let (sent_b, received_b) = run();
        assert_eq!(sent_a, sent_b);
        assert_eq!(received_a, received_b);
    }

    #[test]
    fn test_role_mismatch_is_fatal() {
        let (mut left, _right) = create_unix_channel_pair().unwrap();
        let mut receiver = SinglePointCot::new_receiver();
        assert!(receiver.sender_extend(&mut left, &[]).is_err());
    }
}
