use std::collections::BTreeMap;
use std::fmt::{self, Debug};
use std::future::Future;
use std::path::PathBuf;

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::aggregate::{Aggregate, FlowAggregate, StepStats};

/// A [`Report`] represents the processed form of an [`Aggregate`].
///
/// Reports transform raw aggregated data into meaningful insights — such as
/// averages, percentiles, ratios, and totals. They are *pure data
/// structures*, free of side effects and I/O, and should encapsulate only the
/// logic needed to derive final, human- or machine-readable results.
///
/// Implementors must define how to construct the report from an
/// [`Aggregate`], typically via a [`From<A>`] implementation. Once created, a
/// report can be serialized, logged, or consumed by a [`Reporter`].
pub trait Report<A>
where
    Self: Send + Sync + Debug + From<A> + Serialize + DeserializeOwned,
    A: Aggregate,
{
}

/// A [`Reporter`] consumes a [`Report`] and performs side effects —
/// displaying it, sending it to a service, or persisting it somewhere.
///
/// Reporters are the I/O boundary: the computation layer (metrics →
/// aggregates → reports) stays pure and deterministic, while reporters handle
/// presentation and export.
pub trait Reporter<A: Aggregate, R: Report<A>> {
    fn report(
        &self,
        report: &R,
    ) -> impl Future<Output = Result<(), Box<dyn std::error::Error + Send + Sync>>>;
}

/// Pass/fail criteria evaluated against the final [`SummaryReport`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// Overall step latency p95 must stay below this, milliseconds.
    pub p95_ms: u64,
    /// Overall step latency p99 must stay below this, milliseconds.
    pub p99_ms: u64,
    /// Fraction of failed steps must stay below this.
    pub failure_rate: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            p95_ms: 1_000,
            p99_ms: 2_000,
            failure_rate: 0.1,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ThresholdBreach {
    P95 { actual_ms: u64, limit_ms: u64 },
    P99 { actual_ms: u64, limit_ms: u64 },
    FailureRate { actual: f64, limit: f64 },
}

impl fmt::Display for ThresholdBreach {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ThresholdBreach::P95 { actual_ms, limit_ms } => {
                write!(f, "p95 latency {actual_ms}ms breaches limit {limit_ms}ms")
            }
            ThresholdBreach::P99 { actual_ms, limit_ms } => {
                write!(f, "p99 latency {actual_ms}ms breaches limit {limit_ms}ms")
            }
            ThresholdBreach::FailureRate { actual, limit } => {
                write!(
                    f,
                    "step failure rate {:.2}% breaches limit {:.2}%",
                    actual * 100.0,
                    limit * 100.0
                )
            }
        }
    }
}

impl Thresholds {
    /// All criteria the report fails. Empty means the run passed.
    pub fn evaluate(&self, report: &SummaryReport) -> Vec<ThresholdBreach> {
        let mut breaches = Vec::new();
        if report.p95_ms >= self.p95_ms {
            breaches.push(ThresholdBreach::P95 {
                actual_ms: report.p95_ms,
                limit_ms: self.p95_ms,
            });
        }
        if report.p99_ms >= self.p99_ms {
            breaches.push(ThresholdBreach::P99 {
                actual_ms: report.p99_ms,
                limit_ms: self.p99_ms,
            });
        }
        if report.failure_rate >= self.failure_rate {
            breaches.push(ThresholdBreach::FailureRate {
                actual: report.failure_rate,
                limit: self.failure_rate,
            });
        }
        breaches
    }
}

/// Derived statistics for one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepSummary {
    pub count: usize,
    pub failures: usize,
    pub transport_failures: usize,
    pub protocol_failures: usize,
    pub state_failures: usize,
    pub failure_rate: f64,
    pub mean_ms: u64,
    pub p50_ms: u64,
    pub p95_ms: u64,
    pub p99_ms: u64,
    pub max_ms: u64,
}

impl From<&StepStats> for StepSummary {
    fn from(stats: &StepStats) -> Self {
        let mut sorted = stats.latencies_ms.clone();
        sorted.sort_unstable();
        let mean_ms = if stats.count == 0 {
            0
        } else {
            (stats.total_latency.as_millis() / stats.count as u128) as u64
        };
        Self {
            count: stats.count,
            failures: stats.failures,
            transport_failures: stats.transport_failures,
            protocol_failures: stats.protocol_failures,
            state_failures: stats.state_failures,
            failure_rate: rate(stats.failures, stats.count),
            mean_ms,
            p50_ms: percentile(&sorted, 50.0),
            p95_ms: percentile(&sorted, 95.0),
            p99_ms: percentile(&sorted, 99.0),
            max_ms: stats.max_latency.as_millis() as u64,
        }
    }
}

/// The human/machine-facing summary of one run: iteration dispositions,
/// per-step statistics, and the overall latency/failure figures the
/// thresholds are judged on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryReport {
    pub iterations: usize,
    pub completed: usize,
    pub aborted: usize,
    pub interrupted: usize,
    pub total_steps: usize,
    pub failed_steps: usize,
    pub failure_rate: f64,
    pub p50_ms: u64,
    pub p95_ms: u64,
    pub p99_ms: u64,
    pub steps: BTreeMap<String, StepSummary>,
}

impl From<FlowAggregate> for SummaryReport {
    fn from(agg: FlowAggregate) -> Self {
        let total_steps: usize = agg.steps.values().map(|s| s.count).sum();
        let failed_steps: usize = agg.steps.values().map(|s| s.failures).sum();

        let mut all_latencies: Vec<u64> = agg
            .steps
            .values()
            .flat_map(|s| s.latencies_ms.iter().copied())
            .collect();
        all_latencies.sort_unstable();

        let steps = agg
            .steps
            .iter()
            .map(|(name, stats)| (name.clone(), StepSummary::from(stats)))
            .collect();

        Self {
            iterations: agg.iterations,
            completed: agg.completed,
            aborted: agg.aborted,
            interrupted: agg.interrupted,
            total_steps,
            failed_steps,
            failure_rate: rate(failed_steps, total_steps),
            p50_ms: percentile(&all_latencies, 50.0),
            p95_ms: percentile(&all_latencies, 95.0),
            p99_ms: percentile(&all_latencies, 99.0),
            steps,
        }
    }
}

impl Report<FlowAggregate> for SummaryReport {}

fn rate(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

/// Nearest-rank percentile over an ascending-sorted series.
pub fn percentile(sorted: &[u64], q: f64) -> u64 {
    if sorted.is_empty() {
        return 0;
    }
    let rank = ((q / 100.0) * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

/// Prints the summary as a plain-text table.
pub struct StdoutReporter;

impl Reporter<FlowAggregate, SummaryReport> for StdoutReporter {
    async fn report(
        &self,
        report: &SummaryReport,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        println!(
            "\n{} iterations ({} completed, {} aborted, {} interrupted)",
            report.iterations, report.completed, report.aborted, report.interrupted
        );
        println!(
            "{} steps, {} failed ({:.2}%)  p50 {}ms  p95 {}ms  p99 {}ms\n",
            report.total_steps,
            report.failed_steps,
            report.failure_rate * 100.0,
            report.p50_ms,
            report.p95_ms,
            report.p99_ms
        );
        println!(
            "{:<14} {:>8} {:>6} {:>8} {:>8} {:>8} {:>8} {:>8}",
            "step", "count", "fail", "mean", "p50", "p95", "p99", "max"
        );
        for (name, step) in &report.steps {
            println!(
                "{:<14} {:>8} {:>6} {:>6}ms {:>6}ms {:>6}ms {:>6}ms {:>6}ms",
                name,
                step.count,
                step.failures,
                step.mean_ms,
                step.p50_ms,
                step.p95_ms,
                step.p99_ms,
                step.max_ms
            );
        }
        println!();
        Ok(())
    }
}

/// Writes the summary as pretty JSON, the data feed for external renderers.
pub struct JsonFileReporter {
    path: PathBuf,
}

impl JsonFileReporter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Reporter<FlowAggregate, SummaryReport> for JsonFileReporter {
    async fn report(
        &self,
        report: &SummaryReport,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let rendered = serde_json::to_string_pretty(report)?;
        tokio::fs::write(&self.path, rendered).await?;
        tracing::info!(path = %self.path.display(), "summary written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::Disposition;
    use crate::metric::{FlowMetric, StepMetric};
    use std::time::Duration;

    mod percentile {
        use super::*;

        #[test]
        fn empty_series_is_zero() {
            assert_eq!(percentile(&[], 95.0), 0);
        }

        #[test]
        fn single_sample_is_every_percentile() {
            assert_eq!(percentile(&[42], 50.0), 42);
            assert_eq!(percentile(&[42], 99.0), 42);
        }

        #[test]
        fn nearest_rank_over_a_hundred_samples() {
            let series: Vec<u64> = (1..=100).collect();
            assert_eq!(percentile(&series, 50.0), 50);
            assert_eq!(percentile(&series, 95.0), 95);
            assert_eq!(percentile(&series, 99.0), 99);
            assert_eq!(percentile(&series, 100.0), 100);
        }
    }

    fn aggregate_of(latencies_ms: &[u64], failures: usize) -> FlowAggregate {
        let mut agg = FlowAggregate::new();
        for (i, latency) in latencies_ms.iter().enumerate() {
            let succeeded = i >= failures;
            agg.consume(&FlowMetric {
                steps: vec![StepMetric {
                    step: "menu".to_owned(),
                    latency: Duration::from_millis(*latency),
                    status: if succeeded { 200 } else { 500 },
                    bytes: 100,
                    succeeded,
                    failure: None,
                }],
                disposition: Disposition::Completed,
            });
        }
        agg
    }

    #[test]
    fn summary_derives_statistics() {
        let latencies: Vec<u64> = (1..=100).collect();
        let report = SummaryReport::from(aggregate_of(&latencies, 5));

        assert_eq!(report.iterations, 100);
        assert_eq!(report.total_steps, 100);
        assert_eq!(report.failed_steps, 5);
        assert!((report.failure_rate - 0.05).abs() < 1e-9);
        assert_eq!(report.p95_ms, 95);
        let menu = &report.steps["menu"];
        assert_eq!(menu.count, 100);
        assert_eq!(menu.p50_ms, 50);
        assert_eq!(menu.max_ms, 100);
    }

    #[test]
    fn passing_run_has_no_breaches() {
        let latencies: Vec<u64> = std::iter::repeat(100).take(50).collect();
        let report = SummaryReport::from(aggregate_of(&latencies, 0));
        assert!(Thresholds::default().evaluate(&report).is_empty());
    }

    #[test]
    fn slow_and_flaky_runs_breach() {
        let latencies: Vec<u64> = std::iter::repeat(1_500).take(50).collect();
        let report = SummaryReport::from(aggregate_of(&latencies, 10));
        let breaches = Thresholds::default().evaluate(&report);

        assert!(breaches
            .iter()
            .any(|b| matches!(b, ThresholdBreach::P95 { actual_ms: 1_500, .. })));
        assert!(breaches
            .iter()
            .any(|b| matches!(b, ThresholdBreach::FailureRate { .. })));
    }

    #[tokio::test]
    async fn json_reporter_writes_the_summary() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("summary.json");
        let report = SummaryReport::from(aggregate_of(&[10, 20, 30], 0));

        JsonFileReporter::new(&path).report(&report).await.unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        let parsed: SummaryReport = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed, report);
    }
}
