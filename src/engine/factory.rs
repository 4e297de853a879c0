//! Factory wiring for the whole stack. The factories own the policy
//! decisions — which RCOT construction backs the triples, two-party versus
//! N-party triple generation — and thread the channel factory through so
//! every component gets its own pairwise channel in an order both sides of
//! a pairing agree on.
//!
//! Delta ownership: every factory that needs a correlation samples it
//! fresh, forces its LSB to 1, hands it to the sender-side RCOT and never
//! sends it anywhere.
//!
//! Every recorder a factory builds — the traffic counters of each RCOT,
//! correction and engine channel, the tuple counters of each generator —
//! is registered with the [MetricCollector] it was constructed with, named
//! after the channel tag. The default collector is the no-op sink.

use crate::channel_utils::{PartyChannel, PartyChannelFactory};
use crate::crypt_utils::{random_block_from_entropy, AesPrg, Block};
use crate::engine::communication::EngineCommunicationAgent;
use crate::engine::SecretShareEngine;
use crate::metrics::{MetricCollector, NullMetricCollector};
use crate::oblivious_transfer::bidirection::RcotBasedBidirectionOt;
use crate::oblivious_transfer::ferret::extender::{ExtenderBasedRcot, RcotExtender};
use crate::oblivious_transfer::ferret::FerretConfig;
use crate::oblivious_transfer::iknp::{IknpRcotReceiver, IknpRcotSender};
use crate::oblivious_transfer::RandomCorrelatedOt;
use crate::tuple_generator::n_party::NPartyTupleGenerator;
use crate::tuple_generator::product_share::ProductShareGenerator;
use crate::tuple_generator::two_party::TwoPartyTupleGenerator;
use crate::tuple_generator::{TupleGenerator, DEFAULT_BUFFER_SIZE};
use anyhow::Result;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Builds one side of an RCOT pairing on a fresh channel.
pub trait RcotFactory: Send {
    /// The delta-holding side.
    fn create_sender(
        &self,
        delta: Block,
        agent: Box<dyn PartyChannel>,
    ) -> Result<Box<dyn RandomCorrelatedOt>>;

    /// The choice-bit side.
    fn create_receiver(&self, agent: Box<dyn PartyChannel>) -> Result<Box<dyn RandomCorrelatedOt>>;
}

/// Plain IKNP RCOT: Naor–Pinkas bootstrap, then the short extension does
/// all the work. Fine for moderate volumes.
pub struct IknpRcotFactory;

impl RcotFactory for IknpRcotFactory {
    fn create_sender(
        &self,
        delta: Block,
        agent: Box<dyn PartyChannel>,
    ) -> Result<Box<dyn RandomCorrelatedOt>> {
        Ok(Box::new(IknpRcotSender::new(delta, agent)?))
    }

    fn create_receiver(&self, agent: Box<dyn PartyChannel>) -> Result<Box<dyn RandomCorrelatedOt>> {
        Ok(Box::new(IknpRcotReceiver::new(agent)?))
    }
}

/// Ferret RCOT: an IKNP bootstrap feeds the LPN extender once, after which
/// each iteration re-seeds itself. The bootstrap RCOT hands its channel to
/// the extender when it is done with it.
pub struct FerretRcotFactory {
    config: FerretConfig,
}

impl FerretRcotFactory {
    /// A factory for the given parameter set.
    pub fn new(config: FerretConfig) -> Self {
        FerretRcotFactory { config }
    }
}

impl RcotFactory for FerretRcotFactory {
    fn create_sender(
        &self,
        delta: Block,
        agent: Box<dyn PartyChannel>,
    ) -> Result<Box<dyn RandomCorrelatedOt>> {
        let mut extender = RcotExtender::new_sender(delta, self.config)?;
        let mut bootstrap = IknpRcotSender::new(delta, agent)?;
        let base = bootstrap.rcot(extender.base_cot_size())?;
        extender.set_agent(bootstrap.into_agent())?;
        Ok(Box::new(ExtenderBasedRcot::new(extender, base)?))
    }

    fn create_receiver(&self, agent: Box<dyn PartyChannel>) -> Result<Box<dyn RandomCorrelatedOt>> {
        let mut extender = RcotExtender::new_receiver(self.config)?;
        let mut bootstrap = IknpRcotReceiver::new(agent)?;
        let base = bootstrap.rcot(extender.base_cot_size())?;
        extender.set_agent(bootstrap.into_agent())?;
        Ok(Box::new(ExtenderBasedRcot::new(extender, base)?))
    }
}

/// Builds the tuple generator a party runs, pulling fresh channels from the
/// channel factory as needed.
pub trait TupleGeneratorFactory: Send {
    /// Creates the generator; runs whatever bootstrap protocols it needs.
    fn create(
        &mut self,
        channel_factory: &mut dyn PartyChannelFactory,
    ) -> Result<Box<dyn TupleGenerator>>;
}

/// Factory for the N = 2 specialization.
pub struct TwoPartyTupleGeneratorFactory {
    rcot_factory: Box<dyn RcotFactory>,
    my_id: usize,
    buffer_size: usize,
    metric_collector: Arc<dyn MetricCollector>,
}

impl TwoPartyTupleGeneratorFactory {
    /// `my_id` must be 0 or 1.
    pub fn new(
        rcot_factory: Box<dyn RcotFactory>,
        my_id: usize,
        buffer_size: usize,
        metric_collector: Arc<dyn MetricCollector>,
    ) -> Self {
        TwoPartyTupleGeneratorFactory {
            rcot_factory,
            my_id,
            buffer_size,
            metric_collector,
        }
    }
}

impl TupleGeneratorFactory for TwoPartyTupleGeneratorFactory {
    fn create(
        &mut self,
        channel_factory: &mut dyn PartyChannelFactory,
    ) -> Result<Box<dyn TupleGenerator>> {
        let mut delta = random_block_from_entropy();
        delta.set_lsb_to(true);

        let peer = 1 - self.my_id;
        // Party 0 opens its sender pairing first so the two sides' create
        // calls line up.
        let (sender_rcot, receiver_rcot) = if self.my_id == 0 {
            let sender = self
                .rcot_factory
                .create_sender(delta, channel_factory.create(peer, "tuple_rcot_0")?)?;
            self.metric_collector
                .add_recorder("tuple_rcot_0", sender.traffic_recorder());
            let receiver = self
                .rcot_factory
                .create_receiver(channel_factory.create(peer, "tuple_rcot_1")?)?;
            self.metric_collector
                .add_recorder("tuple_rcot_1", receiver.traffic_recorder());
            (sender, receiver)
        } else {
            let receiver = self
                .rcot_factory
                .create_receiver(channel_factory.create(peer, "tuple_rcot_0")?)?;
            self.metric_collector
                .add_recorder("tuple_rcot_0", receiver.traffic_recorder());
            let sender = self
                .rcot_factory
                .create_sender(delta, channel_factory.create(peer, "tuple_rcot_1")?)?;
            self.metric_collector
                .add_recorder("tuple_rcot_1", sender.traffic_recorder());
            (sender, receiver)
        };

        let generator =
            TwoPartyTupleGenerator::new(sender_rcot, receiver_rcot, delta, self.buffer_size);
        self.metric_collector
            .add_recorder("boolean_tuples", generator.tuples_recorder());
        Ok(Box::new(generator))
    }
}

/// Factory for the general N-party generator: one bi-directional OT per
/// peer feeding a product-share generator each.
pub struct NPartyTupleGeneratorFactory {
    rcot_factory: Box<dyn RcotFactory>,
    my_id: usize,
    number_of_parties: usize,
    buffer_size: usize,
    metric_collector: Arc<dyn MetricCollector>,
}

impl NPartyTupleGeneratorFactory {
    /// A factory for `number_of_parties` parties, of which this is
    /// `my_id`.
    pub fn new(
        rcot_factory: Box<dyn RcotFactory>,
        my_id: usize,
        number_of_parties: usize,
        buffer_size: usize,
        metric_collector: Arc<dyn MetricCollector>,
    ) -> Self {
        NPartyTupleGeneratorFactory {
            rcot_factory,
            my_id,
            number_of_parties,
            buffer_size,
            metric_collector,
        }
    }
}

impl TupleGeneratorFactory for NPartyTupleGeneratorFactory {
    fn create(
        &mut self,
        channel_factory: &mut dyn PartyChannelFactory,
    ) -> Result<Box<dyn TupleGenerator>> {
        let mut generators = BTreeMap::new();
        for peer in 0..self.number_of_parties {
            if peer == self.my_id {
                continue;
            }
            let mut delta = random_block_from_entropy();
            delta.set_lsb_to(true);

            // The lower id opens its receiver pairing first; mirrored on
            // the peer, so pairing k on one side is pairing k on the other.
            let (sender_rcot, receiver_rcot) = if peer < self.my_id {
                let sender = self
                    .rcot_factory
                    .create_sender(delta, channel_factory.create(peer, "pair_rcot_0")?)?;
                self.metric_collector.add_recorder(
                    &format!("pair_rcot_0_party_{}", peer),
                    sender.traffic_recorder(),
                );
                let receiver = self
                    .rcot_factory
                    .create_receiver(channel_factory.create(peer, "pair_rcot_1")?)?;
                self.metric_collector.add_recorder(
                    &format!("pair_rcot_1_party_{}", peer),
                    receiver.traffic_recorder(),
                );
                (sender, receiver)
            } else {
                let receiver = self
                    .rcot_factory
                    .create_receiver(channel_factory.create(peer, "pair_rcot_0")?)?;
                self.metric_collector.add_recorder(
                    &format!("pair_rcot_0_party_{}", peer),
                    receiver.traffic_recorder(),
                );
                let sender = self
                    .rcot_factory
                    .create_sender(delta, channel_factory.create(peer, "pair_rcot_1")?)?;
                self.metric_collector.add_recorder(
                    &format!("pair_rcot_1_party_{}", peer),
                    sender.traffic_recorder(),
                );
                (sender, receiver)
            };

            let bidirection_agent = channel_factory.create(peer, "bidirection_ot")?;
            self.metric_collector.add_recorder(
                &format!("bidirection_ot_party_{}", peer),
                bidirection_agent.traffic_recorder(),
            );
            let bidirection_ot =
                RcotBasedBidirectionOt::new(bidirection_agent, delta, sender_rcot, receiver_rcot);
            generators.insert(
                peer,
                ProductShareGenerator::new(
                    AesPrg::new(random_block_from_entropy()),
                    bidirection_ot,
                ),
            );
        }

        let generator = NPartyTupleGenerator::new(
            generators,
            AesPrg::new(random_block_from_entropy()),
            self.buffer_size,
        );
        self.metric_collector
            .add_recorder("boolean_tuples", generator.tuples_recorder());
        Ok(Box::new(generator))
    }
}

/// Builds complete engines: a tuple generator from its factory, one engine
/// channel per peer, then the engine bootstrap.
pub struct SecretShareEngineFactory {
    tuple_generator_factory: Box<dyn TupleGeneratorFactory>,
    channel_factory: Box<dyn PartyChannelFactory>,
    my_id: usize,
    number_of_parties: usize,
    metric_collector: Arc<dyn MetricCollector>,
}

impl SecretShareEngineFactory {
    /// Assembles a factory from its two sub-factories.
    pub fn new(
        tuple_generator_factory: Box<dyn TupleGeneratorFactory>,
        channel_factory: Box<dyn PartyChannelFactory>,
        my_id: usize,
        number_of_parties: usize,
        metric_collector: Arc<dyn MetricCollector>,
    ) -> Self {
        SecretShareEngineFactory {
            tuple_generator_factory,
            channel_factory,
            my_id,
            number_of_parties,
            metric_collector,
        }
    }

    /// Creates a ready engine; runs all bootstrap protocols.
    pub fn create(&mut self) -> Result<SecretShareEngine> {
        let tuple_generator = self
            .tuple_generator_factory
            .create(self.channel_factory.as_mut())?;

        let mut agents: BTreeMap<usize, Box<dyn PartyChannel>> = BTreeMap::new();
        for peer in 0..self.number_of_parties {
            if peer != self.my_id {
                let agent = self.channel_factory.create(peer, "engine")?;
                self.metric_collector.add_recorder(
                    &format!("engine_party_{}", peer),
                    agent.traffic_recorder(),
                );
                agents.insert(peer, agent);
            }
        }
        let communication_agent = EngineCommunicationAgent::new(self.my_id, agents)?;

        SecretShareEngine::new(
            tuple_generator,
            communication_agent,
            self.my_id,
            self.number_of_parties,
        )
    }
}

/// The standard secure wiring: two-party triples ride RCOT directly, three
/// or more parties go through the pairwise product-share path. Recorders of
/// everything built land in `metric_collector`.
pub fn secure_engine_factory(
    my_id: usize,
    number_of_parties: usize,
    rcot_factory: Box<dyn RcotFactory>,
    channel_factory: Box<dyn PartyChannelFactory>,
    buffer_size: usize,
    metric_collector: Arc<dyn MetricCollector>,
) -> SecretShareEngineFactory {
    let tuple_generator_factory: Box<dyn TupleGeneratorFactory> = if number_of_parties == 2 {
        Box::new(TwoPartyTupleGeneratorFactory::new(
            rcot_factory,
            my_id,
            buffer_size,
            Arc::clone(&metric_collector),
        ))
    } else {
        Box::new(NPartyTupleGeneratorFactory::new(
            rcot_factory,
            my_id,
            number_of_parties,
            buffer_size,
            Arc::clone(&metric_collector),
        ))
    };
    SecretShareEngineFactory::new(
        tuple_generator_factory,
        channel_factory,
        my_id,
        number_of_parties,
        metric_collector,
    )
}

/// [secure_engine_factory] with IKNP-backed RCOT, the default buffer and
/// the no-op metric sink.
pub fn iknp_engine_factory(
    my_id: usize,
    number_of_parties: usize,
    channel_factory: Box<dyn PartyChannelFactory>,
) -> SecretShareEngineFactory {
    secure_engine_factory(
        my_id,
        number_of_parties,
        Box::new(IknpRcotFactory),
        channel_factory,
        DEFAULT_BUFFER_SIZE,
        Arc::new(NullMetricCollector),
    )
}

/// [secure_engine_factory] with Ferret-backed RCOT, the default buffer and
/// the no-op metric sink.
pub fn ferret_engine_factory(
    my_id: usize,
    number_of_parties: usize,
    channel_factory: Box<dyn PartyChannelFactory>,
    config: FerretConfig,
) -> SecretShareEngineFactory {
    secure_engine_factory(
        my_id,
        number_of_parties,
        Box::new(FerretRcotFactory::new(config)),
        channel_factory,
        DEFAULT_BUFFER_SIZE,
        Arc::new(NullMetricCollector),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel_utils::in_memory::InMemoryChannelFactoryHost;
    use crate::metrics::MetricRecorder;
    use std::sync::Mutex;

    #[derive(Default)]
    struct CapturingCollector {
        recorders: Mutex<Vec<(String, Arc<dyn MetricRecorder>)>>,
    }

    impl MetricCollector for CapturingCollector {
        fn add_recorder(&self, name: &str, recorder: Arc<dyn MetricRecorder>) {
            self.recorders
                .lock()
                .unwrap()
                .push((name.to_string(), recorder));
        }
    }

    #[test]
    fn test_factories_register_their_recorders() {
        let mut factories = InMemoryChannelFactoryHost::create_factories(2);
        let peer_channels = factories.pop().unwrap();
        let my_channels = factories.pop().unwrap();

        let collector = Arc::new(CapturingCollector::default());
        let my_collector: Arc<dyn MetricCollector> = Arc::clone(&collector) as Arc<dyn MetricCollector>;

        let handle = std::thread::spawn(move || {
            let mut factory = secure_engine_factory(
                1,
                2,
                Box::new(IknpRcotFactory),
                Box::new(peer_channels),
                128,
                Arc::new(NullMetricCollector),
            );
            let mut engine = factory.create().unwrap();
            let a = engine.set_input(0, None).unwrap();
            let b = engine.set_input(1, Some(true)).unwrap();
            engine.compute_batch_and(&[a], &[b]).unwrap();
        });

        let mut factory = secure_engine_factory(
            0,
            2,
            Box::new(IknpRcotFactory),
            Box::new(my_channels),
            128,
            my_collector,
        );
        let mut engine = factory.create().unwrap();
        let a = engine.set_input(0, Some(true)).unwrap();
        let b = engine.set_input(1, None).unwrap();
        engine.compute_batch_and(&[a], &[b]).unwrap();

        handle.join().unwrap();

        let recorders = collector.recorders.lock().unwrap();
        let names: Vec<&str> = recorders.iter().map(|(name, _)| name.as_str()).collect();
        assert!(names.contains(&"tuple_rcot_0"));
        assert!(names.contains(&"tuple_rcot_1"));
        assert!(names.contains(&"boolean_tuples"));
        assert!(names.contains(&"engine_party_1"));

        // The registered recorders are live, not snapshots.
        let (_, tuples) = recorders
            .iter()
            .find(|(name, _)| name == "boolean_tuples")
            .unwrap();
        assert!(tuples
            .metrics()
            .iter()
            .any(|&(name, value)| name == "tuples_consumed" && value >= 1));
        let (_, engine_traffic) = recorders
            .iter()
            .find(|(name, _)| name == "engine_party_1")
            .unwrap();
        assert!(engine_traffic
            .metrics()
            .iter()
            .any(|&(name, value)| name == "sent_data" && value > 0));
    }
}
