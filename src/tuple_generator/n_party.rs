//! N-party triple generation. Every party samples `a_i, b_i` and runs the
//! pairwise product-share generator against every peer; accumulating the
//! cross terms gives `c_i` with `XOR_i c_i = (XOR_i a_i) & (XOR_i b_i)`.
//!
//! The peer iteration order must be identical on every party for the
//! pairwise protocols to line up, so generators are keyed in an ordered map
//! and walked in ascending peer id.

use crate::crypt_utils::async_buffer::AsyncBuffer;
use crate::crypt_utils::AesPrg;
use crate::metrics::{TrafficRecorder, TuplesRecorder};
use crate::tuple_generator::product_share::ProductShareGenerator;
use crate::tuple_generator::{BooleanTuple, TupleGenerator};
use anyhow::{bail, Result};
use itertools::izip;
use std::collections::BTreeMap;
use std::sync::Arc;

/// The general N-party tuple generator.
pub struct NPartyTupleGenerator {
    buffer: AsyncBuffer<BooleanTuple>,
    recorders: Vec<Arc<TrafficRecorder>>,
    tuples_recorder: Arc<TuplesRecorder>,
}

fn generate_tuples(
    generators: &mut BTreeMap<usize, ProductShareGenerator>,
    prg: &mut AesPrg,
    size: usize,
) -> Result<Vec<BooleanTuple>> {
    let vector_a = prg.random_bits(size);
    let vector_b = prg.random_bits(size);
    let mut vector_c = vec![false; size];

    for (peer, generator) in generators.iter_mut() {
        let shares = generator.generate_boolean_product_shares(&vector_a, &vector_b)?;
        if shares.len() != size {
            bail!(
                "product share generator for peer {} returned {} shares, wanted {}",
                peer,
                shares.len(),
                size
            );
        }
        for (c, share) in vector_c.iter_mut().zip(shares.into_iter()) {
            *c ^= share;
        }
    }

    Ok(izip!(vector_a, vector_b, vector_c)
        .map(|(a, b, c)| BooleanTuple::new(a, b, (a & b) ^ c))
        .collect())
}

impl NPartyTupleGenerator {
    /// Assembles the generator from one product-share generator per peer
    /// (keyed by peer id) and a private PRG for `a` and `b`.
    pub fn new(
        mut generators: BTreeMap<usize, ProductShareGenerator>,
        mut prg: AesPrg,
        buffer_size: usize,
    ) -> Self {
        let recorders: Vec<Arc<TrafficRecorder>> = generators
            .values()
            .flat_map(|generator| generator.traffic_recorders())
            .collect();

        let tuples_recorder = Arc::new(TuplesRecorder::new());
        let generated = Arc::clone(&tuples_recorder);

        let buffer = AsyncBuffer::new(buffer_size, move |size| {
            let tuples = generate_tuples(&mut generators, &mut prg, size)?;
            generated.add_generated(tuples.len() as u64);
            Ok(tuples)
        });

        NPartyTupleGenerator {
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

impl TupleGenerator for NPartyTupleGenerator {
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
