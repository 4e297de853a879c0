//! Channel utilities. Channels are the pairwise byte streams the parties
//! talk over; everything above this layer exchanges typed vectors through
//! the [PartyChannel] trait.
//!
//! Wire conventions are fixed once for every implementation: bit vectors
//! are packed MSB-first into bytes with the trailing byte padded on the low
//! end, blocks travel as 16 little-endian bytes, and every multi-byte
//! integer is little-endian. The channel is reliable and FIFO; transport
//! security (TLS or equivalent) is a collaborator's concern.

use crate::crypt_utils::Block;
use crate::metrics::TrafficRecorder;
use anyhow::Result;
use std::io::{Read, Write};
use std::sync::Arc;
use thiserror::Error;

pub mod in_memory;
pub mod sync_channel;
pub mod tcp_channel;

/// Error kinds of the channel layer. All of them are fatal: the session is
/// aborted, never resumed.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The underlying stream failed (short read, EOF, I/O error).
    #[error("channel i/o failure: {0}")]
    Io(#[from] std::io::Error),
    /// The peer hung up mid-protocol.
    #[error("peer closed the channel")]
    Closed,
}

/// Packs bits MSB-first into `ceil(n / 8)` bytes, padding the last byte on
/// the low end.
pub fn pack_bits(bits: &[bool]) -> Vec<u8> {
    let mut rst = vec![0u8; (bits.len() + 7) / 8];
    for (i, &bit) in bits.iter().enumerate() {
        if bit {
            rst[i / 8] |= 0x80 >> (i % 8);
        }
    }
    rst
}

/// Inverse of [pack_bits]: reads `size` bits MSB-first, dropping the
/// trailing padding.
pub fn unpack_bits(bytes: &[u8], size: usize) -> Vec<bool> {
    assert!(size <= bytes.len() * 8);
    (0..size)
        .map(|i| bytes[i / 8] >> (7 - i % 8) & 1 == 1)
        .collect()
}

/// The pairwise communication agent between two parties. `send` is FIFO and
/// flushes; `receive` reads exactly `size` bytes or fails. The typed
/// helpers are byte reinterpretations under the wire conventions above.
pub trait PartyChannel: Send {
    /// Sends a byte string to the peer.
    fn send(&mut self, data: &[u8]) -> Result<()>;

    /// Receives exactly `size` bytes from the peer.
    fn receive(&mut self, size: usize) -> Result<Vec<u8>>;

    /// The shared traffic recorder of this channel.
    fn traffic_recorder(&self) -> Arc<TrafficRecorder>;

    /// Total `(sent, received)` bytes so far.
    fn traffic_stats(&self) -> (u64, u64) {
        self.traffic_recorder().stats()
    }

    /// Sends a bit vector, packed MSB-first.
    fn send_bools(&mut self, bits: &[bool]) -> Result<()> {
        self.send(&pack_bits(bits))
    }

    /// Receives `size` bits.
    fn receive_bools(&mut self, size: usize) -> Result<Vec<bool>> {
        let bytes = self.receive((size + 7) / 8)?;
        Ok(unpack_bits(&bytes, size))
    }

    /// Sends a block vector, 16 little-endian bytes each.
    fn send_blocks(&mut self, blocks: &[Block]) -> Result<()> {
        let mut bytes = Vec::with_capacity(blocks.len() * 16);
        for block in blocks {
            bytes.extend_from_slice(&block.to_le_bytes());
        }
        self.send(&bytes)
    }

    /// Receives `size` blocks.
    fn receive_blocks(&mut self, size: usize) -> Result<Vec<Block>> {
        let bytes = self.receive(size * 16)?;
        Ok(bytes
            .chunks_exact(16)
            .map(|chunk| {
                let mut buf = [0u8; 16];
                buf.copy_from_slice(chunk);
                Block::from_le_bytes(buf)
            })
            .collect())
    }

    /// Sends one block.
    fn send_block(&mut self, block: Block) -> Result<()> {
        self.send(&block.to_le_bytes())
    }

    /// Receives one block.
    fn receive_block(&mut self) -> Result<Block> {
        let bytes = self.receive(16)?;
        let mut buf = [0u8; 16];
        buf.copy_from_slice(&bytes);
        Ok(Block::from_le_bytes(buf))
    }

    /// Sends a vector of 64-bit integers, 8 little-endian bytes each.
    fn send_u64s(&mut self, data: &[u64]) -> Result<()> {
        let mut bytes = Vec::with_capacity(data.len() * 8);
        for v in data {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        self.send(&bytes)
    }

    /// Receives `size` 64-bit integers.
    fn receive_u64s(&mut self, size: usize) -> Result<Vec<u64>> {
        let bytes = self.receive(size * 8)?;
        Ok(bytes
            .chunks_exact(8)
            .map(|chunk| {
                let mut buf = [0u8; 8];
                buf.copy_from_slice(chunk);
                u64::from_le_bytes(buf)
            })
            .collect())
    }

    /// Sends one 16-bit length, 2 little-endian bytes.
    fn send_u16(&mut self, v: u16) -> Result<()> {
        self.send(&v.to_le_bytes())
    }

    /// Receives one 16-bit length.
    fn receive_u16(&mut self) -> Result<u16> {
        let bytes = self.receive(2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }
}

/// A [PartyChannel] over any `Read` + `Write` pair: Unix sockets, TCP
/// streams, or the in-memory transport.
pub struct StreamChannel<R: Read, W: Write> {
    reader: R,
    writer: W,
    recorder: Arc<TrafficRecorder>,
}

impl<R: Read, W: Write> StreamChannel<R, W> {
    /// Wraps a reader/writer pair with a fresh traffic recorder.
    pub fn new(reader: R, writer: W) -> Self {
        StreamChannel {
            reader,
            writer,
            recorder: Arc::new(TrafficRecorder::new()),
        }
    }
}

impl<R: Read + Send, W: Write + Send> PartyChannel for StreamChannel<R, W> {
    fn send(&mut self, data: &[u8]) -> Result<()> {
        self.writer.write_all(data).map_err(ChannelError::Io)?;
        self.writer.flush().map_err(ChannelError::Io)?;
        self.recorder.add_sent(data.len() as u64);
        Ok(())
    }

    fn receive(&mut self, size: usize) -> Result<Vec<u8>> {
        let mut rst = vec![0u8; size];
        self.reader.read_exact(&mut rst).map_err(ChannelError::Io)?;
        self.recorder.add_received(size as u64);
        Ok(rst)
    }

    fn traffic_recorder(&self) -> Arc<TrafficRecorder> {
        Arc::clone(&self.recorder)
    }
}

/// Creates the pairwise channels a party needs, one `create` call per
/// logical pairing. The tag is free-form, used only for logging and metric
/// names; the two sides of a pairing must issue their `create` calls in the
/// same order.
pub trait PartyChannelFactory: Send {
    /// Creates a new channel to `peer_id`.
    fn create(&mut self, peer_id: usize, tag: &str) -> Result<Box<dyn PartyChannel>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel_utils::sync_channel::create_unix_channel_pair;
    use crate::crypt_utils::random_block_from_entropy;

    #[test]
    fn test_pack_bits_msb_first() {
        let bits = [true, false, true, true, false, false, true, false];
        assert_eq!(pack_bits(&bits), vec![0b1011_0010]);
    }

    #[test]
    fn test_pack_bits_pads_low_end() {
        let bits = [true, true, true];
        assert_eq!(pack_bits(&bits), vec![0b1110_0000]);
    }

    #[test]
    fn test_pack_unpack_round_trip() {
        let mut prg = crate::crypt_utils::AesPrg::new(random_block_from_entropy());
        for size in [8usize, 16, 128, 1024] {
            let bits = prg.random_bits(size);
            assert_eq!(unpack_bits(&pack_bits(&bits), size), bits);
        }
    }

    #[test]
    fn test_unpack_drops_padding() {
        let bits = unpack_bits(&[0b1010_0000], 3);
        assert_eq!(bits, vec![true, false, true]);
    }

    #[test]
    fn test_typed_send_receive() {
        let (mut left, mut right) = create_unix_channel_pair().unwrap();

        let blocks: Vec<Block> = (0..10).map(|_| random_block_from_entropy()).collect();
        let blocks_to_send = blocks.clone();

        let handle = std::thread::spawn(move || {
            left.send_bools(&[true, false, true]).unwrap();
            left.send_blocks(&blocks_to_send).unwrap();
            left.send_u64s(&[7, 8, 9]).unwrap();
            left.send_u16(513).unwrap();
            left
        });

        assert_eq!(right.receive_bools(3).unwrap(), vec![true, false, true]);
        assert_eq!(right.receive_blocks(10).unwrap(), blocks);
        assert_eq!(right.receive_u64s(3).unwrap(), vec![7, 8, 9]);
        assert_eq!(right.receive_u16().unwrap(), 513);

        let left = handle.join().unwrap();

        let (sent, _) = left.traffic_stats();
        let (_, received) = right.traffic_stats();
        assert_eq!(sent, 1 + 160 + 24 + 2);
        assert_eq!(received, sent);
    }
}
