use std::collections::BTreeMap;
use std::fmt::Debug;
use std::time::Duration;

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::metric::{FailureKind, FlowMetric, Metric};

/// The `Aggregate` trait defines how raw [`Metric`] values are collected and
/// combined into an intermediate, mergeable representation that preserves the
/// information necessary for later analysis.
///
/// **Important:** `Aggregate` implementations should **not** compute final
/// statistics such as averages or percentiles. Those derived values belong in
/// a [`crate::Report`], which is converted from an `Aggregate` and performs
/// the final processing. Aggregates are responsible for storing compact,
/// mergeable raw data (counts, sums, latency series, error counters) so that
/// the report stage can compute accurate summaries without losing
/// information.
///
/// # Implementor notes
/// - Ensure `merge` is **associative** and **commutative** so that merging
///   order does not affect results when combining worker-local aggregates.
/// - Be cheaply mergeable: each virtual-user worker accumulates its own
///   aggregate and the executor folds them into a global view at the end.
pub trait Aggregate
where
    Self: Serialize + DeserializeOwned + PartialOrd + PartialEq + Send + Sync + Debug + Clone,
{
    /// The metric type this aggregate summarizes.
    type Metric: Metric;

    /// Create a new, empty instance of the aggregate.
    fn new() -> Self;

    /// Aggregate multiple metrics into the current instance.
    ///
    /// This default implementation calls [`Aggregate::consume`] for each metric.
    fn aggregate(&mut self, metrics: &[Self::Metric]) {
        metrics.iter().for_each(|m| self.consume(m));
    }

    /// Incorporate a single metric into the aggregate.
    fn consume(&mut self, metric: &Self::Metric);

    /// Combine two different aggregates into one.
    fn merge(&mut self, other: Self);
}

/// Per-step raw accumulators.
///
/// Latencies are retained as a millisecond series so the report can compute
/// exact percentiles; series merge by concatenation. This trades memory for
/// fidelity — acceptable at the sample volumes a staged session-flow test
/// produces.
#[derive(Debug, Clone, Default, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct StepStats {
    pub count: usize,
    pub failures: usize,
    pub transport_failures: usize,
    pub protocol_failures: usize,
    pub state_failures: usize,
    pub total_latency: Duration,
    pub max_latency: Duration,
    pub total_bytes: usize,
    pub latencies_ms: Vec<u64>,
}

impl StepStats {
    fn record(&mut self, metric: &crate::metric::StepMetric) {
        self.count += 1;
        self.total_latency += metric.latency;
        self.max_latency = self.max_latency.max(metric.latency);
        self.total_bytes += metric.bytes;
        self.latencies_ms.push(metric.latency.as_millis() as u64);
        if !metric.succeeded {
            self.failures += 1;
            match metric.failure {
                Some(FailureKind::Transport) => self.transport_failures += 1,
                Some(FailureKind::State) => self.state_failures += 1,
                Some(FailureKind::Protocol) | None => self.protocol_failures += 1,
            }
        }
    }

    fn absorb(&mut self, other: StepStats) {
        self.count += other.count;
        self.failures += other.failures;
        self.transport_failures += other.transport_failures;
        self.protocol_failures += other.protocol_failures;
        self.state_failures += other.state_failures;
        self.total_latency += other.total_latency;
        self.max_latency = self.max_latency.max(other.max_latency);
        self.total_bytes += other.total_bytes;
        self.latencies_ms.extend(other.latencies_ms);
    }
}

/// Accumulator for session-flow iterations: iteration dispositions plus
/// per-step statistics keyed by step name.
#[derive(Debug, Clone, Default, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct FlowAggregate {
    pub iterations: usize,
    pub completed: usize,
    pub aborted: usize,
    pub interrupted: usize,
    pub steps: BTreeMap<String, StepStats>,
}

impl Aggregate for FlowAggregate {
    type Metric = FlowMetric;

    fn new() -> Self {
        FlowAggregate::default()
    }

    fn consume(&mut self, metric: &Self::Metric) {
        use crate::flow::Disposition;

        self.iterations += 1;
        match metric.disposition {
            Disposition::Completed => self.completed += 1,
            Disposition::Aborted { .. } => self.aborted += 1,
            Disposition::Interrupted { .. } => self.interrupted += 1,
        }
        for step in &metric.steps {
            self.steps
                .entry(step.step.clone())
                .or_default()
                .record(step);
        }
    }

    fn merge(&mut self, other: Self) {
        self.iterations += other.iterations;
        self.completed += other.completed;
        self.aborted += other.aborted;
        self.interrupted += other.interrupted;
        for (name, stats) in other.steps {
            self.steps.entry(name).or_default().absorb(stats);
        }
    }
}
