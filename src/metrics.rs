//! Metric plumbing. Recorders are shared atomic counters updated by the
//! components that own them; a collector aggregates named recorders for
//! whatever monitoring the host application runs. None of this is needed
//! for correctness — the default collector is a no-op sink.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Monotonic byte counters for one channel. Shared via `Arc` so traffic can
/// still be read after the channel itself moved into a worker thread.
#[derive(Default, Debug)]
pub struct TrafficRecorder {
    sent: AtomicU64,
    received: AtomicU64,
}

impl TrafficRecorder {
    /// A fresh recorder with both counters at zero.
    pub fn new() -> Self {
        TrafficRecorder::default()
    }

    /// Adds to the sent-bytes counter.
    pub fn add_sent(&self, bytes: u64) {
        self.sent.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Adds to the received-bytes counter.
    pub fn add_received(&self, bytes: u64) {
        self.received.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Current `(sent, received)` totals in bytes.
    pub fn stats(&self) -> (u64, u64) {
        (
            self.sent.load(Ordering::Relaxed),
            self.received.load(Ordering::Relaxed),
        )
    }
}

/// Counters for tuple production and consumption.
#[derive(Default, Debug)]
pub struct TuplesRecorder {
    generated: AtomicU64,
    consumed: AtomicU64,
}

impl TuplesRecorder {
    /// A fresh recorder.
    pub fn new() -> Self {
        TuplesRecorder::default()
    }

    /// Records `count` freshly generated tuples.
    pub fn add_generated(&self, count: u64) {
        self.generated.fetch_add(count, Ordering::Relaxed);
    }

    /// Records `count` tuples handed to the engine.
    pub fn add_consumed(&self, count: u64) {
        self.consumed.fetch_add(count, Ordering::Relaxed);
    }

    /// Current `(generated, consumed)` totals.
    pub fn stats(&self) -> (u64, u64) {
        (
            self.generated.load(Ordering::Relaxed),
            self.consumed.load(Ordering::Relaxed),
        )
    }
}

/// Anything that can report named counter values.
pub trait MetricRecorder: Send + Sync {
    /// Snapshot of this recorder's counters.
    fn metrics(&self) -> Vec<(&'static str, u64)>;
}

impl MetricRecorder for TrafficRecorder {
    fn metrics(&self) -> Vec<(&'static str, u64)> {
        let (sent, received) = self.stats();
        vec![("sent_data", sent), ("received_data", received)]
    }
}

impl MetricRecorder for TuplesRecorder {
    fn metrics(&self) -> Vec<(&'static str, u64)> {
        let (generated, consumed) = self.stats();
        vec![
            ("tuples_generated", generated),
            ("tuples_consumed", consumed),
        ]
    }
}

/// Sink for recorders created across the stack.
pub trait MetricCollector: Send + Sync {
    /// Registers a recorder under a name; names follow the channel tags.
    fn add_recorder(&self, name: &str, recorder: Arc<dyn MetricRecorder>);
}

/// The default collector: drops everything.
#[derive(Default, Debug)]
pub struct NullMetricCollector;

impl MetricCollector for NullMetricCollector {
    fn add_recorder(&self, _name: &str, _recorder: Arc<dyn MetricRecorder>) {}
}
