//! In-memory channels over crossbeam queues, plus the channel factory host
//! that pairs `create` calls across parties. This is the transport the test
//! suite and same-process deployments run on.

use crate::channel_utils::{ChannelError, PartyChannel, PartyChannelFactory, StreamChannel};
use anyhow::{Context, Result};
use crossbeam::channel::{unbounded, Receiver, Sender};
use std::collections::HashMap;
use std::io::{Read, Write};
use std::sync::{Arc, Mutex};

/// Writing half of an in-memory stream.
pub struct InMemoryWriter {
    tx: Sender<Vec<u8>>,
}

/// Reading half of an in-memory stream. Messages are byte strings; a read
/// may consume part of a message, the remainder is buffered.
pub struct InMemoryReader {
    rx: Receiver<Vec<u8>>,
    leftover: Vec<u8>,
    offset: usize,
}

impl Write for InMemoryWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.tx
            .send(buf.to_vec())
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::BrokenPipe, ChannelError::Closed))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl Read for InMemoryReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if self.offset >= self.leftover.len() {
            match self.rx.recv() {
                Ok(message) => {
                    self.leftover = message;
                    self.offset = 0;
                }
                // Peer gone: report EOF so read_exact surfaces a short read.
                Err(_) => return Ok(0),
            }
        }
        let take = buf.len().min(self.leftover.len() - self.offset);
        buf[..take].copy_from_slice(&self.leftover[self.offset..self.offset + take]);
        self.offset += take;
        Ok(take)
    }
}

/// A channel over the in-memory transport.
pub type InMemoryChannel = StreamChannel<InMemoryReader, InMemoryWriter>;

/// Creates one connected in-memory channel pair.
pub fn create_in_memory_channel_pair() -> (InMemoryChannel, InMemoryChannel) {
    let (tx_left, rx_right) = unbounded();
    let (tx_right, rx_left) = unbounded();
    let reader = |rx| InMemoryReader {
        rx,
        leftover: Vec::new(),
        offset: 0,
    };
    (
        StreamChannel::new(reader(rx_left), InMemoryWriter { tx: tx_left }),
        StreamChannel::new(reader(rx_right), InMemoryWriter { tx: tx_right }),
    )
}

type SlotKey = (usize, usize, u64);

#[derive(Default)]
struct PendingSlots {
    // Channel halves waiting for the other side of a pairing to show up.
    low: HashMap<SlotKey, InMemoryChannel>,
    high: HashMap<SlotKey, InMemoryChannel>,
}

/// Shared rendezvous point for in-memory channel factories. The `k`-th
/// `create` call party `i` makes towards party `j` pairs with the `k`-th
/// call party `j` makes towards party `i`.
#[derive(Default)]
pub struct InMemoryChannelFactoryHost {
    slots: Mutex<PendingSlots>,
}

impl InMemoryChannelFactoryHost {
    /// Creates a host and one factory per party.
    pub fn create_factories(nparties: usize) -> Vec<InMemoryChannelFactory> {
        let host = Arc::new(InMemoryChannelFactoryHost::default());
        (0..nparties)
            .map(|my_id| InMemoryChannelFactory {
                my_id,
                host: Arc::clone(&host),
                sequence: HashMap::new(),
            })
            .collect()
    }

    fn take_or_create(&self, key: SlotKey, low_side: bool) -> Result<InMemoryChannel> {
        let mut slots = self
            .slots
            .lock()
            .map_err(|_| anyhow::anyhow!("channel factory host lock poisoned"))?;
        let slots = &mut *slots;

        let (mine, peers) = if low_side {
            (&mut slots.low, &mut slots.high)
        } else {
            (&mut slots.high, &mut slots.low)
        };

        if let Some(channel) = mine.remove(&key) {
            return Ok(channel);
        }

        let (low, high) = create_in_memory_channel_pair();
        let (for_me, for_peer) = if low_side { (low, high) } else { (high, low) };
        if peers.insert(key, for_peer).is_some() {
            anyhow::bail!(
                "channel factory slot {:?} created twice; each pairing slot may be used once",
                key
            );
        }
        Ok(for_me)
    }
}

/// One party's handle to the factory host.
pub struct InMemoryChannelFactory {
    my_id: usize,
    host: Arc<InMemoryChannelFactoryHost>,
    sequence: HashMap<usize, u64>,
}

impl PartyChannelFactory for InMemoryChannelFactory {
    fn create(&mut self, peer_id: usize, tag: &str) -> Result<Box<dyn PartyChannel>> {
        if peer_id == self.my_id {
            anyhow::bail!("party {} asked for a channel to itself", peer_id);
        }
        let seq = self.sequence.entry(peer_id).or_insert(0);
        let key = (self.my_id.min(peer_id), self.my_id.max(peer_id), *seq);
        *seq += 1;

        log::debug!(
            "party {} opening channel {:?} to {} ({})",
            self.my_id,
            key,
            peer_id,
            tag
        );
        let channel = self
            .host
            .take_or_create(key, self.my_id < peer_id)
            .with_context(|| format!("@{}:{}", file!(), line!()))?;
        Ok(Box::new(channel))
    }
}
