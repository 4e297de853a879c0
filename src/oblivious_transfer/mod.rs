//! The oblivious-transfer stack, bottom to top: Naor–Pinkas base OT over an
//! elliptic-curve group ([base_np]), the IKNP short extension to many random
//! correlated OTs ([iknp]), the Ferret/LPN extender that stretches a small
//! RCOT batch into millions ([ferret]), and the chosen-message constructions
//! built on RCOT ([bidirection]).
//!
//! RCOT correlation: for a session-wide secret `delta` (LSB forced to 1),
//! the sender of every pair holds `s` with LSB 0 and the receiver holds
//! either `s` or `s ^ delta` — the receiver's LSB *is* its choice bit.
//! `delta` is owned by the sender side and must never appear on the wire.

use crate::crypt_utils::Block;
use crate::metrics::TrafficRecorder;
use anyhow::Result;
use std::sync::Arc;

pub mod base_np;
pub mod bidirection;
pub mod ferret;
pub mod iknp;

/// Which of the two asymmetric protocol roles this instance plays.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Role {
    /// Holds delta; outputs the `(s, s ^ delta)` side of each pair.
    Sender,
    /// Outputs one block per pair, selected by its (random) choice bit.
    Receiver,
}

/// A source of random correlated OT results.
pub trait RandomCorrelatedOt: Send {
    /// Produces `size` RCOT blocks for this party's role.
    fn rcot(&mut self, size: usize) -> Result<Vec<Block>>;

    /// The traffic recorder of the channel this instance drives.
    fn traffic_recorder(&self) -> Arc<TrafficRecorder>;

    /// Total `(sent, received)` bytes.
    fn traffic_stats(&self) -> (u64, u64) {
        self.traffic_recorder().stats()
    }
}
