//! Naor–Pinkas 1-out-of-2 oblivious transfer of random 128-bit messages,
//! over the Ristretto prime-order group. This is the root of trust of the
//! whole extension stack: a handful of public-key operations that seed
//! everything above.
//!
//! Points travel as length-prefixed hex strings of their compressed
//! encoding (2 little-endian length bytes, then ASCII). Message hashing is
//! SHA-256 over the compressed point, truncated to one block. Any group
//! decoding failure is fatal; there is no retry.

use crate::channel_utils::PartyChannel;
use crate::crypt_utils::Block;
use anyhow::{bail, Context, Result};
use curve25519_dalek::ristretto::{CompressedRistretto, RistrettoPoint};
use curve25519_dalek::scalar::Scalar;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};

/// Naor–Pinkas base OT. One instance runs `k` parallel transfers and then
/// releases its channel to the next protocol layer via [NpBaseOt::into_agent].
pub struct NpBaseOt {
    agent: Box<dyn PartyChannel>,
}

fn hash_point(point: &RistrettoPoint) -> Block {
    let digest = Sha256::digest(point.compress().as_bytes());
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    Block::from_le_bytes(bytes)
}

impl NpBaseOt {
    /// Wraps a channel for a batch of base OTs.
    pub fn new(agent: Box<dyn PartyChannel>) -> Self {
        NpBaseOt { agent }
    }

    /// Hands the channel to its next owner; the base OT is done with it
    /// after bootstrap.
    pub fn into_agent(self) -> Box<dyn PartyChannel> {
        self.agent
    }

    fn send_point(&mut self, point: &RistrettoPoint) -> Result<()> {
        let encoded = hex::encode(point.compress().as_bytes());
        if encoded.len() > u16::MAX as usize {
            bail!("point encoding too long: {}", encoded.len());
        }
        self.agent.send_u16(encoded.len() as u16)?;
        self.agent.send(encoded.as_bytes())
    }

    fn receive_point(&mut self) -> Result<RistrettoPoint> {
        let size = self.agent.receive_u16()? as usize;
        let encoded = self.agent.receive(size)?;
        let bytes = hex::decode(&encoded).context("point encoding is not valid hex")?;
        let compressed = CompressedRistretto::from_slice(&bytes)
            .ok()
            .context("point encoding has the wrong length")?;
        compressed
            .decompress()
            .context("received bytes are not a group element")
    }

    /// Sender side: outputs `size` random message pairs `(m0[i], m1[i])`.
    pub fn send(&mut self, size: usize) -> Result<(Vec<Block>, Vec<Block>)> {
        let mut rng = OsRng;

        // The global point C; nobody knows its discrete log relative to
        // the receiver's keys, which is what pins the receiver to one side.
        let global_c = RistrettoPoint::mul_base(&Scalar::random(&mut rng));
        self.send_point(&global_c)
            .with_context(|| format!("@{}:{}", file!(), line!()))?;

        let random_rs: Vec<Scalar> = (0..size).map(|_| Scalar::random(&mut rng)).collect();
        let gr: Vec<RistrettoPoint> = random_rs
            .iter()
            .map(RistrettoPoint::mul_base)
            .collect();
        let cr: Vec<RistrettoPoint> = random_rs.iter().map(|r| global_c * r).collect();

        let mut pk0 = Vec::with_capacity(size);
        for _ in 0..size {
            pk0.push(
                self.receive_point()
                    .with_context(|| format!("@{}:{}", file!(), line!()))?,
            );
        }

        for point in &gr {
            self.send_point(point)
                .with_context(|| format!("@{}:{}", file!(), line!()))?;
        }

        let mut m0 = Vec::with_capacity(size);
        let mut m1 = Vec::with_capacity(size);
        for i in 0..size {
            let t0 = pk0[i] * random_rs[i];
            let t1 = cr[i] - t0;
            m0.push(hash_point(&t0));
            m1.push(hash_point(&t1));
        }
        Ok((m0, m1))
    }

    /// Receiver side: outputs `m_choice[i]` for every choice bit.
    pub fn receive(&mut self, choice: &[bool]) -> Result<Vec<Block>> {
        let mut rng = OsRng;
        let size = choice.len();

        let global_c = self
            .receive_point()
            .with_context(|| format!("@{}:{}", file!(), line!()))?;

        let random_ds: Vec<Scalar> = (0..size).map(|_| Scalar::random(&mut rng)).collect();
        for i in 0..size {
            let pk_choice = RistrettoPoint::mul_base(&random_ds[i]);
            let pk0 = if choice[i] {
                global_c - pk_choice
            } else {
                pk_choice
            };
            self.send_point(&pk0)
                .with_context(|| format!("@{}:{}", file!(), line!()))?;
        }

        let mut messages = Vec::with_capacity(size);
        for d in &random_ds {
            let gr = self
                .receive_point()
                .with_context(|| format!("@{}:{}", file!(), line!()))?;
            messages.push(hash_point(&(gr * d)));
        }
        Ok(messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel_utils::sync_channel::create_unix_channel_pair;
    use rand::Rng;

    #[test]
    fn test_receiver_gets_chosen_message() {
        let size = 128;
        let (left, right) = create_unix_channel_pair().unwrap();

        let handle = std::thread::spawn(move || {
            let mut sender = NpBaseOt::new(Box::new(left));
            sender.send(size).unwrap()
        });

        let mut rng = rand::thread_rng();
        let choice: Vec<bool> = (0..size).map(|_| rng.gen()).collect();

        let mut receiver = NpBaseOt::new(Box::new(right));
        let received = receiver.receive(&choice).unwrap();

        let (m0, m1) = handle.join().unwrap();

        assert_eq!(received.len(), size);
        for i in 0..size {
            let expected = if choice[i] { m1[i] } else { m0[i] };
            assert_eq!(received[i], expected);
            // The two messages of a pair must differ.
            assert_ne!(m0[i], m1[i]);
        }
    }

    #[test]
    fn test_garbage_point_is_fatal() {
        let (mut left, right) = create_unix_channel_pair().unwrap();

        let handle = std::thread::spawn(move || {
            // 64 hex chars that do not decode to a group element.
            let bogus = "ff".repeat(32);
            left.send_u16(bogus.len() as u16).unwrap();
            left.send(bogus.as_bytes()).unwrap();
        });

        let mut receiver = NpBaseOt::new(Box::new(right));
        assert!(receiver.receive(&[false]).is_err());

        handle.join().unwrap();
    }
}
