//! The secret-share engine — the only surface an application touches.
//!
//! Every logical wire is one bit per party, XORing to the plaintext across
//! all parties. XOR and NOT are local; an AND of two private values burns
//! one Beaver triple and one round of openings. Non-free ANDs are queued
//! through [SecretShareEngine::schedule_and] /
//! [SecretShareEngine::schedule_batch_and] and executed together so a whole
//! layer of gates shares a single communication round.
//!
//! Input masking: at construction the engine exchanges one PRG seed pair
//! per peer. The stream a party uses to mask its own inputs is exactly
//! reproduced by the peer's mirror PRG, so feeding inputs needs no
//! per-input communication at all.

use crate::crypt_utils::{random_block_from_entropy, AesPrg};
use crate::engine::communication::EngineCommunicationAgent;
use crate::tuple_generator::TupleGenerator;
use anyhow::{bail, Context, Result};
use std::collections::BTreeMap;

pub mod communication;
pub mod factory;

// One scheduled scalar AND, two operand bits packed in a byte.
struct ScheduledAnd(u8);

impl ScheduledAnd {
    fn new(left: bool, right: bool) -> Self {
        ScheduledAnd(((left as u8) << 1) ^ right as u8)
    }

    fn left(&self) -> bool {
        self.0 >> 1 == 1
    }

    fn right(&self) -> bool {
        self.0 & 1 == 1
    }
}

struct ScheduledBatchAnd {
    left: Vec<bool>,
    right: Vec<bool>,
}

/// The N-party Boolean secret-share engine.
pub struct SecretShareEngine {
    tuple_generator: Box<dyn TupleGenerator>,
    communication_agent: EngineCommunicationAgent,
    my_id: usize,
    // A PRG pair per peer: the first masks this party's own inputs, the
    // second mirrors the peer's mask stream. These streams are input
    // masking only, nothing else may draw from them.
    input_prgs: BTreeMap<usize, (AesPrg, AesPrg)>,
    scheduled_ands: Vec<ScheduledAnd>,
    scheduled_batch_ands: Vec<ScheduledBatchAnd>,
    // Slot 0 holds the scalar-FIFO results, slots 1.. the batch results.
    execution_results: Vec<Vec<bool>>,
}

impl SecretShareEngine {
    /// Bootstraps an engine: samples one mask seed per peer from system
    /// entropy, exchanges them, and keys the PRG pairs.
    pub fn new(
        tuple_generator: Box<dyn TupleGenerator>,
        mut communication_agent: EngineCommunicationAgent,
        my_id: usize,
        number_of_parties: usize,
    ) -> Result<Self> {
        let my_keys: BTreeMap<usize, _> = (0..number_of_parties)
            .filter(|&peer| peer != my_id)
            .map(|peer| (peer, random_block_from_entropy()))
            .collect();
        let peer_keys = communication_agent.exchange_keys(&my_keys)?;

        let input_prgs = my_keys
            .into_iter()
            .map(|(peer, my_key)| {
                (
                    peer,
                    (AesPrg::new(my_key), AesPrg::new(peer_keys[&peer])),
                )
            })
            .collect();

        log::debug!("engine for party {} of {} ready", my_id, number_of_parties);
        Ok(SecretShareEngine {
            tuple_generator,
            communication_agent,
            my_id,
            input_prgs,
            scheduled_ands: Vec::new(),
            scheduled_batch_ands: Vec::new(),
            execution_results: Vec::new(),
        })
    }

    /// Feeds one input bit owned by party `id` and returns this party's
    /// share of it. The owner must pass `Some(value)`; everyone else passes
    /// `None`.
    pub fn set_input(&mut self, id: usize, value: Option<bool>) -> Result<bool> {
        if id == self.my_id {
            let Some(value) = value else {
                bail!("the input owner must provide a value");
            };
            let mut rst = value;
            for (outgoing, _) in self.input_prgs.values_mut() {
                rst ^= outgoing.random_bits(1)[0];
            }
            Ok(rst)
        } else {
            let (_, incoming) = self
                .input_prgs
                .get_mut(&id)
                .with_context(|| format!("unknown party {}", id))?;
            Ok(incoming.random_bits(1)[0])
        }
    }

    /// Batched [set_input](Self::set_input). Non-owners pass a vector of
    /// the right length (values ignored). Empty input yields an empty
    /// share vector and advances nothing.
    pub fn set_batch_input(&mut self, id: usize, values: &[bool]) -> Result<Vec<bool>> {
        if values.is_empty() {
            return Ok(Vec::new());
        }
        if id == self.my_id {
            let mut rst = values.to_vec();
            for (outgoing, _) in self.input_prgs.values_mut() {
                let mask = outgoing.random_bits(values.len());
                for (dst, bit) in rst.iter_mut().zip(mask.into_iter()) {
                    *dst ^= bit;
                }
            }
            Ok(rst)
        } else {
            let (_, incoming) = self
                .input_prgs
                .get_mut(&id)
                .with_context(|| format!("unknown party {}", id))?;
            Ok(incoming.random_bits(values.len()))
        }
    }

    /// XOR of two private values; local.
    pub fn compute_symmetric_xor(&self, left: bool, right: bool) -> bool {
        left ^ right
    }

    /// Elementwise XOR of two private batches; local.
    pub fn compute_batch_symmetric_xor(&self, left: &[bool], right: &[bool]) -> Result<Vec<bool>> {
        if left.len() != right.len() {
            bail!(
                "inconsistent batch sizes: {} vs {}",
                left.len(),
                right.len()
            );
        }
        Ok(left.iter().zip(right.iter()).map(|(&l, &r)| l ^ r).collect())
    }

    /// XOR with a public constant: party 0 folds the constant in, everyone
    /// else keeps their share.
    pub fn compute_asymmetric_xor(&self, private: bool, public: bool) -> bool {
        if self.my_id == 0 {
            private ^ public
        } else {
            private
        }
    }

    /// Batched XOR with public constants.
    pub fn compute_batch_asymmetric_xor(
        &self,
        private: &[bool],
        public: &[bool],
    ) -> Result<Vec<bool>> {
        if private.len() != public.len() {
            bail!(
                "inconsistent batch sizes: {} vs {}",
                private.len(),
                public.len()
            );
        }
        if self.my_id == 0 {
            Ok(private
                .iter()
                .zip(public.iter())
                .map(|(&l, &r)| l ^ r)
                .collect())
        } else {
            Ok(private.to_vec())
        }
    }

    /// Symmetric NOT: every party toggles its share locally.
    pub fn compute_symmetric_not(&self, input: bool) -> bool {
        !input
    }

    /// Batched symmetric NOT.
    pub fn compute_batch_symmetric_not(&self, input: &[bool]) -> Vec<bool> {
        input.iter().map(|&bit| !bit).collect()
    }

    /// NOT against a public constant: party 0 toggles, everyone else keeps
    /// their share; flips the shared plaintext for any N.
    pub fn compute_asymmetric_not(&self, input: bool) -> bool {
        if self.my_id == 0 {
            !input
        } else {
            input
        }
    }

    /// Batched asymmetric NOT.
    pub fn compute_batch_asymmetric_not(&self, input: &[bool]) -> Vec<bool> {
        if self.my_id == 0 {
            input.iter().map(|&bit| !bit).collect()
        } else {
            input.to_vec()
        }
    }

    /// AND with a public operand; local, no triple burned.
    pub fn compute_free_and(&self, private: bool, public: bool) -> bool {
        private & public
    }

    /// Batched free AND.
    pub fn compute_batch_free_and(&self, private: &[bool], public: &[bool]) -> Result<Vec<bool>> {
        if private.len() != public.len() {
            bail!(
                "inconsistent batch sizes: {} vs {}",
                private.len(),
                public.len()
            );
        }
        Ok(private
            .iter()
            .zip(public.iter())
            .map(|(&l, &r)| l & r)
            .collect())
    }

    /// Queues one non-free AND; returns its index for retrieval after
    /// execution.
    pub fn schedule_and(&mut self, left: bool, right: bool) -> usize {
        self.scheduled_ands.push(ScheduledAnd::new(left, right));
        self.scheduled_ands.len() - 1
    }

    /// Queues one batch of non-free ANDs; returns its index.
    pub fn schedule_batch_and(&mut self, left: &[bool], right: &[bool]) -> Result<usize> {
        if left.len() != right.len() {
            bail!(
                "inconsistent batch sizes: {} vs {}",
                left.len(),
                right.len()
            );
        }
        self.scheduled_batch_ands.push(ScheduledBatchAnd {
            left: left.to_vec(),
            right: right.to_vec(),
        });
        Ok(self.scheduled_batch_ands.len() - 1)
    }

    /// Executes everything queued, in one triple request and one opening
    /// round. With nothing queued this is a no-op with no traffic.
    pub fn execute_scheduled_and(&mut self) -> Result<()> {
        let scalars = std::mem::take(&mut self.scheduled_ands);
        let batches = std::mem::take(&mut self.scheduled_batch_ands);

        let scalar_left: Vec<bool> = scalars.iter().map(|gate| gate.left()).collect();
        let scalar_right: Vec<bool> = scalars.iter().map(|gate| gate.right()).collect();

        let mut left: Vec<&[bool]> = vec![&scalar_left];
        let mut right: Vec<&[bool]> = vec![&scalar_right];
        for batch in &batches {
            left.push(&batch.left);
            right.push(&batch.right);
        }

        self.execution_results = self.compute_ands(&left, &right)?;
        Ok(())
    }

    /// A scalar result by its [schedule_and](Self::schedule_and) index.
    pub fn get_and_result(&self, index: usize) -> Result<bool> {
        self.execution_results
            .first()
            .and_then(|scalars| scalars.get(index))
            .copied()
            .with_context(|| format!("no scalar and result at index {}", index))
    }

    /// A batch result by its [schedule_batch_and](Self::schedule_batch_and)
    /// index.
    pub fn get_batch_and_result(&self, index: usize) -> Result<&[bool]> {
        self.execution_results
            .get(index + 1)
            .map(|batch| batch.as_slice())
            .with_context(|| format!("no batch and result at index {}", index))
    }

    /// One-shot batch AND: computes immediately without touching the
    /// scheduled FIFOs.
    pub fn compute_batch_and(&mut self, left: &[bool], right: &[bool]) -> Result<Vec<bool>> {
        let mut rst = self.compute_ands(&[left], &[right])?;
        Ok(rst.remove(0))
    }

    fn compute_ands(&mut self, left: &[&[bool]], right: &[&[bool]]) -> Result<Vec<Vec<bool>>> {
        let count = left.len();
        if count != right.len() {
            bail!("inconsistent input counts: {} vs {}", count, right.len());
        }
        let mut size = 0;
        for i in 0..count {
            if left[i].len() != right[i].len() {
                bail!(
                    "inconsistent batch sizes at {}: {} vs {}",
                    i,
                    left[i].len(),
                    right[i].len()
                );
            }
            size += left[i].len();
        }
        if size == 0 {
            return Ok(vec![Vec::new(); count]);
        }

        let tuples = self.tuple_generator.get_boolean_tuples(size)?;
        if tuples.len() != size {
            bail!("tuple generator returned {} tuples, wanted {}", tuples.len(), size);
        }

        // Open d = x ^ a and e = y ^ b for every gate, interleaved.
        let mut secrets_to_open = vec![false; size * 2];
        let mut index = 0;
        for i in 0..count {
            for j in 0..left[i].len() {
                secrets_to_open[index * 2] = left[i][j] ^ tuples[index].a();
                secrets_to_open[index * 2 + 1] = right[i][j] ^ tuples[index].b();
                index += 1;
            }
        }
        let opened = self.communication_agent.open_shares_to_all(&secrets_to_open)?;
        if opened.len() != size * 2 {
            bail!("unexpected number of opened secrets: {}", opened.len());
        }

        let mut rst = Vec::with_capacity(count);
        let mut index = 0;
        for i in 0..count {
            let mut gates = Vec::with_capacity(left[i].len());
            for _ in 0..left[i].len() {
                let d = opened[2 * index];
                let e = opened[2 * index + 1];
                let mut share =
                    tuples[index].c() ^ (d & tuples[index].b()) ^ (e & tuples[index].a());
                if self.my_id == 0 {
                    share ^= d & e;
                }
                gates.push(share);
                index += 1;
            }
            rst.push(gates);
        }
        Ok(rst)
    }

    /// Opens output shares to party `id`: the target returns the plaintext,
    /// everyone else gets its own share echoed back.
    pub fn reveal_to_party(&mut self, id: usize, shares: &[bool]) -> Result<Vec<bool>> {
        self.communication_agent.open_shares_to_party(id, shares)
    }

    /// Total `(sent, received)` bytes: the engine's own channels (online)
    /// plus the tuple generator's (offline).
    pub fn traffic_stats(&self) -> (u64, u64) {
        let (online_sent, online_received) = self.communication_agent.traffic_stats();
        let (offline_sent, offline_received) = self.tuple_generator.traffic_stats();
        (online_sent + offline_sent, online_received + offline_received)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel_utils::in_memory::InMemoryChannelFactoryHost;
    use crate::engine::factory::{secure_engine_factory, IknpRcotFactory};
    use crate::metrics::NullMetricCollector;
    use std::sync::Arc;

    /// Runs `body` as each of `nparties` engine-holding parties, wired over
    /// in-memory channels with IKNP-backed triples.
    fn run_engines<F, T>(nparties: usize, body: F) -> Vec<T>
    where
        F: Fn(usize, &mut SecretShareEngine) -> T + Send + Sync + Clone + 'static,
        T: Send + 'static,
    {
        let factories = InMemoryChannelFactoryHost::create_factories(nparties);
        let handles = factories
            .into_iter()
            .enumerate()
            .map(|(my_id, channel_factory)| {
                let body = body.clone();
                std::thread::spawn(move || {
                    let mut factory = secure_engine_factory(
                        my_id,
                        nparties,
                        Box::new(IknpRcotFactory),
                        Box::new(channel_factory),
                        512,
                        Arc::new(NullMetricCollector),
                    );
                    let mut engine = factory.create().unwrap();
                    body(my_id, &mut engine)
                })
            })
            .collect::<Vec<_>>();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    }

    fn two_party_and(a: bool, b: bool) -> bool {
        let outputs = run_engines(2, move |my_id, engine| {
            let share_a = engine
                .set_input(0, if my_id == 0 { Some(a) } else { None })
                .unwrap();
            let share_b = engine
                .set_input(1, if my_id == 1 { Some(b) } else { None })
                .unwrap();

            let index = engine.schedule_and(share_a, share_b);
            engine.execute_scheduled_and().unwrap();
            let share = engine.get_and_result(index).unwrap();

            engine.reveal_to_party(0, &[share]).unwrap()[0]
        });
        outputs[0]
    }

    #[test]
    fn test_two_party_and() {
        assert!(two_party_and(true, true));
        assert!(!two_party_and(true, false));
    }

    #[test]
    fn test_three_party_batch_xor_then_and() {
        let inputs = [
            vec![true, false, true, true],
            vec![false, true, true, false],
            vec![true, true, false, true],
        ];
        let expected = vec![true, true, false, true];
        let inputs_for_parties = inputs.clone();

        let outputs = run_engines(3, move |my_id, engine| {
            let own = |id: usize| -> Vec<bool> {
                if my_id == id {
                    inputs_for_parties[id].clone()
                } else {
                    vec![false; 4]
                }
            };
            let share0 = engine.set_batch_input(0, &own(0)).unwrap();
            let share1 = engine.set_batch_input(1, &own(1)).unwrap();
            let share2 = engine.set_batch_input(2, &own(2)).unwrap();

            let x = engine.compute_batch_symmetric_xor(&share0, &share1).unwrap();
            let index = engine.schedule_batch_and(&x, &share2).unwrap();
            engine.execute_scheduled_and().unwrap();
            let y = engine.get_batch_and_result(index).unwrap().to_vec();

            (0..3)
                .map(|target| engine.reveal_to_party(target, &y).unwrap())
                .collect::<Vec<_>>()
        });

        for (my_id, revealed) in outputs.into_iter().enumerate() {
            // Party i's view of the reveal targeted at itself.
            assert_eq!(revealed[my_id], expected);
        }
    }

    #[test]
    fn test_four_party_reveal_to_party() {
        // Inputs XOR to 1.
        let inputs = [true, false, false, false];

        let outputs = run_engines(4, move |my_id, engine| {
            let mut wires = Vec::new();
            for id in 0..4 {
                let value = if my_id == id { Some(inputs[id]) } else { None };
                wires.push(engine.set_input(id, value).unwrap());
            }
            let mut share = wires[0];
            for &wire in &wires[1..] {
                share = engine.compute_symmetric_xor(share, wire);
            }
            let revealed = engine.reveal_to_party(2, &[share]).unwrap();
            (share, revealed)
        });

        for (my_id, (share, revealed)) in outputs.into_iter().enumerate() {
            if my_id == 2 {
                assert_eq!(revealed, vec![true]);
            } else {
                // Non-targets see their own share echoed.
                assert_eq!(revealed, vec![share]);
            }
        }
    }

    #[test]
    fn test_scheduled_mix_of_scalars_and_batches() {
        let outputs = run_engines(2, move |my_id, engine| {
            let a = engine
                .set_batch_input(0, &if my_id == 0 {
                    vec![true, true, false]
                } else {
                    vec![false; 3]
                })
                .unwrap();
            let b = engine
                .set_batch_input(1, &if my_id == 1 {
                    vec![true, false, false]
                } else {
                    vec![false; 3]
                })
                .unwrap();

            let scalar0 = engine.schedule_and(a[0], b[0]);
            let batch = engine.schedule_batch_and(&a, &b).unwrap();
            let scalar1 = engine.schedule_and(a[2], b[2]);
            engine.execute_scheduled_and().unwrap();

            let mut shares = vec![
                engine.get_and_result(scalar0).unwrap(),
                engine.get_and_result(scalar1).unwrap(),
            ];
            shares.extend(engine.get_batch_and_result(batch).unwrap().to_vec());

            engine.reveal_to_party(0, &shares).unwrap()
        });

        // a & b = [1, 0, 0]; scalar gates were (a0 & b0) and (a2 & b2).
        assert_eq!(outputs[0], vec![true, false, true, false, false]);
    }

    #[test]
    fn test_compute_batch_and_one_shot() {
        let outputs = run_engines(2, move |my_id, engine| {
            let a = engine
                .set_batch_input(0, &if my_id == 0 {
                    vec![true, false, true, false]
                } else {
                    vec![false; 4]
                })
                .unwrap();
            let b = engine
                .set_batch_input(1, &if my_id == 1 {
                    vec![true, true, false, false]
                } else {
                    vec![false; 4]
                })
                .unwrap();
            let c = engine.compute_batch_and(&a, &b).unwrap();
            engine.reveal_to_party(0, &c).unwrap()
        });
        assert_eq!(outputs[0], vec![true, false, false, false]);
    }

    #[test]
    fn test_free_gates_match_plaintext_identities() {
        let outputs = run_engines(2, move |my_id, engine| {
            let x = engine
                .set_input(0, if my_id == 0 { Some(true) } else { None })
                .unwrap();

            // NOT against a public constant flips the plaintext.
            let not_x = engine.compute_asymmetric_not(x);
            // XOR with the public constant 1 flips it back.
            let x_again = engine.compute_asymmetric_xor(not_x, true);
            // AND with public 1 and 0.
            let and_one = engine.compute_free_and(x_again, true);
            let and_zero = engine.compute_free_and(x_again, false);

            engine
                .reveal_to_party(0, &[not_x, x_again, and_one, and_zero])
                .unwrap()
        });
        assert_eq!(outputs[0], vec![false, true, true, false]);
    }

    #[test]
    fn test_empty_batches_and_empty_execute() {
        // The no-traffic side of these boundaries is pinned down in the
        // communication agent's own tests; the background tuple refill makes
        // total traffic racy to compare here.
        run_engines(2, |_, engine| {
            assert!(engine.set_batch_input(0, &[]).unwrap().is_empty());
            assert!(engine.compute_batch_symmetric_xor(&[], &[]).unwrap().is_empty());
            assert!(engine.compute_batch_free_and(&[], &[]).unwrap().is_empty());

            // Nothing queued: executing is a no-op.
            engine.execute_scheduled_and().unwrap();
            assert!(engine.get_and_result(0).is_err());
            assert!(engine.get_batch_and_result(0).is_err());
        });
    }

    #[test]
    fn test_batch_size_mismatch_is_fatal() {
        run_engines(2, |_, engine| {
            assert!(engine
                .compute_batch_symmetric_xor(&[true], &[true, false])
                .is_err());
            assert!(engine.schedule_batch_and(&[true], &[]).is_err());
        });
    }

    #[test]
    fn test_missing_own_input_is_fatal() {
        run_engines(2, |my_id, engine| {
            assert!(engine.set_input(my_id, None).is_err());
        });
    }
}
