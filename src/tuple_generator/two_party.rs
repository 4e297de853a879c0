//! Triple generation specialized for two parties, straight on RCOT — no
//! product-share detour, no chosen-message layer.
//!
//! Each party is RCOT sender once and RCOT receiver once. With sender pair
//! `(k0, k1 = k0 ^ delta)` and received block `l_p` (choice `p`), a party
//! computes
//!
//! ```text
//! a = lsb(H(k0)) ^ lsb(H(k1))
//! b = p
//! c = (a & b) ^ lsb(H(k0)) ^ lsb(H(l_p))
//! ```
//!
//! XORing the two parties' `(a, b, c)` gives `(A, B, A & B)`.

use crate::crypt_utils::async_buffer::AsyncBuffer;
use crate::crypt_utils::{Aes, Block};
use crate::metrics::{TrafficRecorder, TuplesRecorder};
use crate::oblivious_transfer::RandomCorrelatedOt;
use crate::tuple_generator::{BooleanTuple, TupleGenerator};
use anyhow::{anyhow, bail, Context, Result};
use itertools::izip;
use std::sync::Arc;

/// The N = 2 tuple generator. Production runs on the async buffer's worker
/// thread, overlapping the engine's consumption of the previous batch.
pub struct TwoPartyTupleGenerator {
    buffer: AsyncBuffer<BooleanTuple>,
    recorders: Vec<Arc<TrafficRecorder>>,
    tuples_recorder: Arc<TuplesRecorder>,
}

fn generate_tuples(
    sender_rcot: &mut Box<dyn RandomCorrelatedOt>,
    receiver_rcot: &mut Box<dyn RandomCorrelatedOt>,
    delta: Block,
    hash_cipher: &Aes,
    size: usize,
) -> Result<Vec<BooleanTuple>> {
    // Both extensions at once; each blocks only on its own channel.
    let (sender_result, receiver_joined) = std::thread::scope(|scope| {
        let handle = scope.spawn(move || receiver_rcot.rcot(size));
        (sender_rcot.rcot(size), handle.join())
    });
    let mut sender0_messages = sender_result?;
    let mut receiver_messages = receiver_joined
        .map_err(|_| anyhow!("receiver-side rcot task panicked"))?
        .with_context(|| format!("@{}:{}", file!(), line!()))?;

    if sender0_messages.len() != size || receiver_messages.len() != size {
        bail!("rcot returned an unexpected number of results");
    }

    let mut sender1_messages: Vec<Block> = sender0_messages
        .iter()
        .map(|&block| block ^ delta)
        .collect();

    let choice_bits: Vec<bool> = receiver_messages.iter().map(|block| block.lsb()).collect();

    hash_cipher.hash_in_place(&mut sender0_messages);
    hash_cipher.hash_in_place(&mut sender1_messages);
    hash_cipher.hash_in_place(&mut receiver_messages);

    Ok(
        izip!(sender0_messages, sender1_messages, receiver_messages, choice_bits)
            .map(|(hashed_k0, hashed_k1, hashed_received, b)| {
                let a = hashed_k0.lsb() ^ hashed_k1.lsb();
                let c = (a & b) ^ hashed_k0.lsb() ^ hashed_received.lsb();
                BooleanTuple::new(a, b, c)
            })
            .collect(),
    )
}

impl TwoPartyTupleGenerator {
    /// Assembles the generator. `delta` must be the correlation of
    /// `sender_rcot`; the key of the hash is a pre-agreed public constant,
    /// its value does not matter.
    pub fn new(
        mut sender_rcot: Box<dyn RandomCorrelatedOt>,
        mut receiver_rcot: Box<dyn RandomCorrelatedOt>,
        delta: Block,
        buffer_size: usize,
    ) -> Self {
        let recorders = vec![
            sender_rcot.traffic_recorder(),
            receiver_rcot.traffic_recorder(),
        ];
        let tuples_recorder = Arc::new(TuplesRecorder::new());
        let generated = Arc::clone(&tuples_recorder);
        let hash_cipher = Aes::new(Aes::fixed_key());

        let buffer = AsyncBuffer::new(buffer_size, move |size| {
            let tuples = generate_tuples(
                &mut sender_rcot,
                &mut receiver_rcot,
                delta,
                &hash_cipher,
                size,
            )?;
            generated.add_generated(tuples.len() as u64);
            Ok(tuples)
        });

        TwoPartyTupleGenerator {
            buffer,
            recorders,
            tuples_recorder,
        }
    }

    /// The recorder counting tuples produced and handed out.
    pub fn tuples_recorder(&self) -> Arc<TuplesRecorder> {
        Arc::clone(&self.tuples_recorder)
    }
}

impl TupleGenerator for TwoPartyTupleGenerator {
    fn get_boolean_tuples(&mut self, size: usize) -> Result<Vec<BooleanTuple>> {
        let tuples = self.buffer.get_data(size)?;
        self.tuples_recorder.add_consumed(tuples.len() as u64);
        Ok(tuples)
    }

    fn traffic_stats(&self) -> (u64, u64) {
        self.recorders
            .iter()
            .fold((0, 0), |(sent, received), recorder| {
                let (s, r) = recorder.stats();
                (sent + s, received + r)
            })
    }
}
