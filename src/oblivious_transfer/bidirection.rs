//! Chosen-message OT on top of RCOT.
//!
//! From an RCOT pair `(k0, k1 = k0 ^ delta)` on the sender side and `kp`
//! (choice `p`) on the receiver side, a chosen-message transfer costs one
//! flip bit from the receiver (its random choice XOR the wanted one) and
//! two hashed corrections from the sender. A *bi-directional* OT runs the
//! construction in both directions at once — each party is sender in one
//! RCOT and receiver in the other — with the two underlying RCOT extensions
//! executing concurrently.
//!
//! [CotWithRandomMessage] is the lighter sibling: the receiver picks its
//! choice bits but the messages stay random, which is all the
//! product-share-style consumers above need when they mask with the PRG.

use crate::channel_utils::PartyChannel;
use crate::crypt_utils::{Aes, Block};
use crate::metrics::TrafficRecorder;
use crate::oblivious_transfer::RandomCorrelatedOt;
use anyhow::{anyhow, bail, Context, Result};
use std::sync::Arc;

mod private {
    pub trait Sealed {}
    impl Sealed for bool {}
    impl Sealed for u64 {}
}

/// A message type the chosen-message layer can mask and transport. For bits
/// the mask is the LSB of the hashed key; for 64-bit integers it is the low
/// 64 bits under wrapping arithmetic.
pub trait OtMessage: Copy + Send + private::Sealed {
    /// Masks `self` under a hashed RCOT block.
    fn mask(self, key: Block) -> Self;

    /// Recovers the chosen message from the two corrections.
    fn unmask(key: Block, choice: bool, correction0: Self, correction1: Self) -> Self;

    /// Sends a vector of this type over a channel.
    fn send_vec(channel: &mut dyn PartyChannel, data: &[Self]) -> Result<()>;

    /// Receives a vector of this type.
    fn receive_vec(channel: &mut dyn PartyChannel, size: usize) -> Result<Vec<Self>>;
}

impl OtMessage for bool {
    fn mask(self, key: Block) -> Self {
        self ^ key.lsb()
    }

    fn unmask(key: Block, choice: bool, correction0: bool, correction1: bool) -> bool {
        key.lsb() ^ if choice { correction1 } else { correction0 }
    }

    fn send_vec(channel: &mut dyn PartyChannel, data: &[Self]) -> Result<()> {
        channel.send_bools(data)
    }

    fn receive_vec(channel: &mut dyn PartyChannel, size: usize) -> Result<Vec<Self>> {
        channel.receive_bools(size)
    }
}

impl OtMessage for u64 {
    fn mask(self, key: Block) -> Self {
        self.wrapping_sub(key.low_u64())
    }

    fn unmask(key: Block, choice: bool, correction0: u64, correction1: u64) -> u64 {
        key.low_u64()
            .wrapping_add(if choice { correction1 } else { correction0 })
    }

    fn send_vec(channel: &mut dyn PartyChannel, data: &[Self]) -> Result<()> {
        channel.send_u64s(data)
    }

    fn receive_vec(channel: &mut dyn PartyChannel, size: usize) -> Result<Vec<Self>> {
        channel.receive_u64s(size)
    }
}

/// Bi-directional chosen-message OT between two parties. Both parties call
/// [bidirection_ot](RcotBasedBidirectionOt::bidirection_ot) with their own
/// inputs and choices; each receives its chosen messages from the peer.
pub struct RcotBasedBidirectionOt {
    hash_cipher: Aes,
    agent: Box<dyn PartyChannel>,
    delta: Block,
    sender_rcot: Box<dyn RandomCorrelatedOt>,
    receiver_rcot: Box<dyn RandomCorrelatedOt>,
}

impl RcotBasedBidirectionOt {
    /// Assembles the construction from its three channels' worth of parts:
    /// a dedicated correction channel, this party's sender-role RCOT (which
    /// owns `delta`) and its receiver-role RCOT against the same peer.
    pub fn new(
        agent: Box<dyn PartyChannel>,
        delta: Block,
        sender_rcot: Box<dyn RandomCorrelatedOt>,
        receiver_rcot: Box<dyn RandomCorrelatedOt>,
    ) -> Self {
        RcotBasedBidirectionOt {
            hash_cipher: Aes::new(Aes::fixed_key()),
            agent,
            delta,
            sender_rcot,
            receiver_rcot,
        }
    }

    /// Runs one batched bi-directional OT. `input0`/`input1` are this
    /// party's messages in its sender direction, `choice` its choice bits
    /// in its receiver direction; the output is the peer's chosen messages.
    pub fn bidirection_ot<T: OtMessage>(
        &mut self,
        input0: &[T],
        input1: &[T],
        choice: &[bool],
    ) -> Result<Vec<T>> {
        if input0.len() != input1.len() || input0.len() != choice.len() {
            bail!(
                "inconsistent input sizes: {} vs {} vs {}",
                input0.len(),
                input1.len(),
                choice.len()
            );
        }
        let ot_size = input0.len();
        if ot_size == 0 {
            return Ok(Vec::new());
        }

        // Both directions' extensions run at once; each one blocks on its
        // own channel.
        let sender_rcot = &mut self.sender_rcot;
        let receiver_rcot = &mut self.receiver_rcot;
        let (sender_result, receiver_joined) = std::thread::scope(|scope| {
            let handle = scope.spawn(move || receiver_rcot.rcot(ot_size));
            (sender_rcot.rcot(ot_size), handle.join())
        });
        let mut sender0_messages = sender_result?;
        let mut receiver_messages = receiver_joined
            .map_err(|_| anyhow!("receiver-direction rcot task panicked"))?
            .with_context(|| format!("@{}:{}", file!(), line!()))?;

        if sender0_messages.len() != ot_size || receiver_messages.len() != ot_size {
            bail!("rcot returned an unexpected number of results");
        }

        let mut sender1_messages: Vec<Block> = sender0_messages
            .iter()
            .map(|&block| block ^ self.delta)
            .collect();

        // The flip bit converts the random rcot choice into the wanted one.
        let masked_choice: Vec<bool> = receiver_messages
            .iter()
            .zip(choice.iter())
            .map(|(block, &c)| block.lsb() ^ c)
            .collect();
        self.agent
            .send_bools(&masked_choice)
            .with_context(|| format!("@{}:{}", file!(), line!()))?;
        let flip_indicator = self
            .agent
            .receive_bools(ot_size)
            .with_context(|| format!("@{}:{}", file!(), line!()))?;

        self.hash_cipher.hash_in_place(&mut sender0_messages);
        self.hash_cipher.hash_in_place(&mut sender1_messages);
        self.hash_cipher.hash_in_place(&mut receiver_messages);

        let masked0: Vec<T> = (0..ot_size)
            .map(|i| {
                input0[i].mask(if flip_indicator[i] {
                    sender1_messages[i]
                } else {
                    sender0_messages[i]
                })
            })
            .collect();
        let masked1: Vec<T> = (0..ot_size)
            .map(|i| {
                input1[i].mask(if flip_indicator[i] {
                    sender0_messages[i]
                } else {
                    sender1_messages[i]
                })
            })
            .collect();

        T::send_vec(self.agent.as_mut(), &masked0)?;
        T::send_vec(self.agent.as_mut(), &masked1)?;
        let correction0 = T::receive_vec(self.agent.as_mut(), ot_size)?;
        let correction1 = T::receive_vec(self.agent.as_mut(), ot_size)?;

        if correction0.len() != ot_size || correction1.len() != ot_size {
            bail!("peer sent an unexpected number of corrections");
        }

        Ok((0..ot_size)
            .map(|i| T::unmask(receiver_messages[i], choice[i], correction0[i], correction1[i]))
            .collect())
    }

    /// Traffic recorders of all three underlying channels.
    pub fn traffic_recorders(&self) -> Vec<Arc<TrafficRecorder>> {
        vec![
            self.agent.traffic_recorder(),
            self.sender_rcot.traffic_recorder(),
            self.receiver_rcot.traffic_recorder(),
        ]
    }

    /// Total `(sent, received)` bytes across all three channels.
    pub fn traffic_stats(&self) -> (u64, u64) {
        self.traffic_recorders()
            .iter()
            .fold((0, 0), |(sent, received), recorder| {
                let (s, r) = recorder.stats();
                (sent + s, received + r)
            })
    }
}

#[derive(Clone, Copy)]
enum CotRole {
    Sender { delta: Block },
    Receiver,
}

/// COT with random messages and chosen choice bits: the sender learns two
/// random blocks per transfer, the receiver learns the one its choice
/// selects. One flip bit per transfer on the wire, nothing else.
pub struct CotWithRandomMessage {
    role: CotRole,
    rcot: Box<dyn RandomCorrelatedOt>,
    agent: Box<dyn PartyChannel>,
}

impl CotWithRandomMessage {
    /// Sender instance; `delta` must be the one its RCOT runs on.
    pub fn new_sender(
        delta: Block,
        rcot: Box<dyn RandomCorrelatedOt>,
        agent: Box<dyn PartyChannel>,
    ) -> Self {
        CotWithRandomMessage {
            role: CotRole::Sender { delta },
            rcot,
            agent,
        }
    }

    /// Receiver instance.
    pub fn new_receiver(rcot: Box<dyn RandomCorrelatedOt>, agent: Box<dyn PartyChannel>) -> Self {
        CotWithRandomMessage {
            role: CotRole::Receiver,
            rcot,
            agent,
        }
    }

    /// Sender side: `size` random message pairs, correlated by delta.
    pub fn send(&mut self, size: usize) -> Result<(Vec<Block>, Vec<Block>)> {
        let CotRole::Sender { delta } = self.role else {
            bail!("only the sender of the cot can invoke send");
        };
        let mut message0 = self.rcot.rcot(size)?;
        if message0.len() != size {
            bail!("rcot returned an unexpected number of results");
        }
        let mut message1 = message0.clone();

        let flip_indicator = self
            .agent
            .receive_bools(size)
            .with_context(|| format!("@{}:{}", file!(), line!()))?;
        for i in 0..size {
            if flip_indicator[i] {
                message0[i] ^= delta;
            } else {
                message1[i] ^= delta;
            }
        }
        Ok((message0, message1))
    }

    /// Receiver side: the chosen message per choice bit.
    pub fn receive(&mut self, choice: &[bool]) -> Result<Vec<Block>> {
        if !matches!(self.role, CotRole::Receiver) {
            bail!("only the receiver of the cot can invoke receive");
        }
        let size = choice.len();
        let messages = self.rcot.rcot(size)?;
        if messages.len() != size {
            bail!("rcot returned an unexpected number of results");
        }

        let flip_indicator: Vec<bool> = messages
            .iter()
            .zip(choice.iter())
            .map(|(block, &c)| block.lsb() ^ c)
            .collect();
        self.agent
            .send_bools(&flip_indicator)
            .with_context(|| format!("@{}:{}", file!(), line!()))?;
        Ok(messages)
    }
}

/// Builds a mirrored pair of bi-direction OTs over Unix channels, for tests
/// of this module and of the tuple layer above it.
#[cfg(test)]
pub(crate) fn create_bidirection_pair() -> (RcotBasedBidirectionOt, RcotBasedBidirectionOt) {
    use crate::channel_utils::sync_channel::create_unix_channel_pair;
    use crate::crypt_utils::random_block_from_entropy;
    use crate::oblivious_transfer::iknp::{IknpRcotReceiver, IknpRcotSender};

    let mut delta0 = random_block_from_entropy();
    delta0.set_lsb_to(true);
    let mut delta1 = random_block_from_entropy();
    delta1.set_lsb_to(true);

    let (rcot_a_left, rcot_a_right) = create_unix_channel_pair().unwrap();
    let (rcot_b_left, rcot_b_right) = create_unix_channel_pair().unwrap();
    let (agent_left, agent_right) = create_unix_channel_pair().unwrap();

    let handle = std::thread::spawn(move || {
        let sender = IknpRcotSender::new(delta0, Box::new(rcot_a_left)).unwrap();
        let receiver = IknpRcotReceiver::new(Box::new(rcot_b_left)).unwrap();
        RcotBasedBidirectionOt::new(
            Box::new(agent_left),
            delta0,
            Box::new(sender),
            Box::new(receiver),
        )
    });

    let receiver = IknpRcotReceiver::new(Box::new(rcot_a_right)).unwrap();
    let sender = IknpRcotSender::new(delta1, Box::new(rcot_b_right)).unwrap();
    let party1 = RcotBasedBidirectionOt::new(
        Box::new(agent_right),
        delta1,
        Box::new(sender),
        Box::new(receiver),
    );

    (handle.join().unwrap(), party1)
}
