//! The `VuExecutor` and its components, providing a stage-ramped
//! virtual-user execution model.
//!
//! The executor separates **population control** (governor task) from **work
//! execution** (worker tasks). Each [`Stage`] defines a target number of
//! concurrently active virtual users and a duration over which the governor
//! linearly interpolates from the previous target to the stage's target.
//!
//! # High-level flow
//! 1. A shared execution context is created, holding watch channels for
//!    startup, shutdown, and the current target population.
//! 2. The governor task is spawned. Every `tick` it recomputes the
//!    interpolated target and publishes it.
//! 3. One worker task per possible virtual user is spawned. Worker `i`
//!    runs iterations back to back while `i < target`, and idles otherwise —
//!    ramping down parks the highest-numbered users first.
//! 4. When the governor finishes all stages it exits; the executor signals
//!    shutdown. Workers never start another iteration after that, but an
//!    iteration already in flight finishes its current step: each invocation
//!    of the action receives a [`StopHandle`] and is expected to check it
//!    between steps rather than be cancelled mid-request.
//! 5. Worker-local aggregates are merged into the final result.
//!
//! # Mathematical behavior of the governor
//! For a stage moving from `from` (previous target) to `to` over `duration`,
//! at time `elapsed` the target population is linear interpolation, rounded
//! to the nearest whole user:
//!
//! ```text
//! t = elapsed / duration
//! target(t) = round(from + (to - from) * t)
//! ```
//!
//! A stage with `Duration::ZERO` jumps the target instantly; use it for
//! spike starts or to begin at a non-zero population.
//!
//! # Tuning knobs
//! - `tick`: granularity of governor updates. Smaller ticks give smoother
//!   ramps but more wakeups. Population changes are whole users, so there is
//!   little point going below ~100ms.
//! - `max_vus`: hard cap on the worker pool; defaults to the highest stage
//!   target.

use std::time::Duration;

use futures::future::join_all;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use typed_builder::TypedBuilder;

use super::{Executor, StopHandle};
use crate::{aggregate::Aggregate, scenario::Scenario};
use internals::*;

/// A stage defines a target virtual-user population and how long to ramp to
/// that target.
///
/// Use `Stage::new(Duration::from_secs(600), 20)` to ramp to 20 concurrent
/// users over ten minutes. If `duration` is `Duration::ZERO`, the executor
/// jumps to `target` instantly.
#[derive(Clone, Copy, Debug)]
pub struct Stage {
    pub duration: Duration,
    /// Concurrently active virtual users.
    pub target: usize,
}

impl Stage {
    pub fn new(duration: Duration, target: usize) -> Self {
        Self { duration, target }
    }
}

#[derive(Debug, Error)]
pub enum VuError {
    #[error("no load stages configured")]
    NoStages,
    #[error("governor task failed")]
    Governor,
    #[error("executor control channel closed")]
    ChannelClosed,
}

/// Executor that ramps a virtual-user population across stages.
///
/// - A central governor task publishes the interpolated target population on
///   a watch channel.
/// - One worker task per possible user awaits activation, then runs the
///   scenario action in a loop, accumulating metrics into a worker-local
///   aggregate.
/// - Shutdown is graceful: the in-flight action is awaited, not aborted, so
///   an iteration can finish its current step (the action's [`StopHandle`]
///   tells it not to start more).
#[derive(TypedBuilder)]
pub struct VuExecutor {
    /// The sequence of population-ramp stages to execute.
    pub stages: Vec<Stage>,
    /// The granularity of the governor's ramp updates.
    #[builder(default = Duration::from_millis(250))]
    pub tick: Duration,
    /// Cap on the worker pool; defaults to the highest stage target.
    #[builder(default)]
    pub max_vus: Option<usize>,
}

impl<A, F, Fut> Executor<A, F, Fut> for VuExecutor
where
    Self: Send + Sync + Sized,
    A: Aggregate + 'static,
    F: Fn(StopHandle) -> Fut + Send + Sync + Clone + 'static,
    Fut: std::future::Future<Output = A::Metric> + Send,
{
    type Error = VuError;

    async fn exec(&self, scenario: &Scenario<A, Self, F, Fut>) -> Result<A, VuError> {
        if self.stages.is_empty() {
            return Err(VuError::NoStages);
        }
        let workers = self
            .max_vus
            .unwrap_or_else(|| self.stages.iter().map(|s| s.target).max().unwrap_or(0));

        let (ctx, controls) = ExecutionContext::new();
        tracing::info!(stages = self.stages.len(), workers, "spawning population governor");
        let governor = tokio::spawn(governor_task(
            ctx.clone(),
            controls.target,
            self.stages.clone(),
            self.tick,
        ));

        tracing::info!("spawning workers...");
        let handles = spawn_workers(ctx.clone(), workers, scenario.action.clone()).await;

        tracing::info!(scenario = %scenario.name, "running now!");
        controls
            .start
            .send(true)
            .map_err(|_| VuError::ChannelClosed)?;

        // The governor task ending means it's all over.
        governor.await.map_err(|_| VuError::Governor)?;
        controls
            .shutdown
            .send(true)
            .map_err(|_| VuError::ChannelClosed)?;

        tracing::info!("retrieving data from workers...");
        let aggs: Vec<A> = join_all(handles)
            .await
            .into_iter()
            .map(|res| match res {
                Ok(agg) => agg,
                Err(err) => {
                    tracing::error!(%err, "worker panicked; its samples are lost");
                    // Keep the rest of the data rather than crash the run.
                    A::new()
                }
            })
            .collect();

        tracing::info!("processing results...");
        let mut final_agg = A::new();
        for agg in aggs {
            final_agg.merge(agg);
        }

        tracing::info!(scenario = %scenario.name, "done running scenario");
        Ok(final_agg)
    }
}

#[cfg(feature = "internals")]
pub use internals::*;

/// Internal components of the `VuExecutor`, encapsulated to allow
/// conditional exposure via `#[cfg(feature = "internals")]`.
mod internals {
    use super::*;

    /// Shared execution state for the governor and all worker tasks.
    #[derive(Clone)]
    pub struct ExecutionContext {
        /// Broadcasts the signal to start the test.
        pub start: watch::Receiver<bool>,
        /// Broadcasts the signal to stop all tasks.
        pub shutdown: watch::Receiver<bool>,
        /// The current target virtual-user population.
        pub target: watch::Receiver<usize>,
    }

    /// Sending halves of the context channels, kept by the executor.
    pub struct Controls {
        pub start: watch::Sender<bool>,
        pub shutdown: watch::Sender<bool>,
        pub target: watch::Sender<usize>,
    }

    impl ExecutionContext {
        pub fn new() -> (Self, Controls) {
            let (start_tx, start_rx) = watch::channel(false);
            let (shutdown_tx, shutdown_rx) = watch::channel(false);
            let (target_tx, target_rx) = watch::channel(0);
            (
                Self {
                    start: start_rx,
                    shutdown: shutdown_rx,
                    target: target_rx,
                },
                Controls {
                    start: start_tx,
                    shutdown: shutdown_tx,
                    target: target_tx,
                },
            )
        }
    }

    /// Governor task that publishes the target population according to the
    /// defined stages.
    pub async fn governor_task(
        ctx: ExecutionContext,
        target_tx: watch::Sender<usize>,
        stages: Vec<Stage>,
        tick: Duration,
    ) {
        let ExecutionContext {
            mut start,
            mut shutdown,
            ..
        } = ctx;

        let main_task = async move {
            let mut current = 0usize;
            if start.wait_for(|started| *started).await.is_err() {
                return;
            }
            tracing::debug!("governor task started");

            let total = stages.len();
            for (i, stage) in stages.into_iter().enumerate() {
                tracing::info!(stage = i + 1, total, target = stage.target, "entering stage");
                // Instantly jump to the target population. This allows
                // handling spikes or starting at a non-zero population.
                if stage.duration.is_zero() {
                    current = stage.target;
                    if target_tx.send(current).is_err() {
                        return;
                    }
                    continue;
                }

                let stage_start = Instant::now();
                let mut next_tick = Instant::now();
                let from = current;

                loop {
                    let elapsed = Instant::now().duration_since(stage_start);
                    if elapsed >= stage.duration {
                        break;
                    }
                    next_tick += tick;

                    let target = current_target(elapsed, stage.duration, from, stage.target);
                    if target_tx.send(target).is_err() {
                        return;
                    }
                    tokio::time::sleep_until(next_tick).await;
                }
                // Land exactly on the stage target so the next stage ramps
                // from the right point.
                current = stage.target;
                if target_tx.send(current).is_err() {
                    return;
                }
            }
        };

        tokio::select! {
            _ = main_task => {
                tracing::debug!("governor finished all stages");
            }
            _ = shutdown.wait_for(|b| *b) => {
                tracing::debug!("governor received shutdown signal");
            }
        };
    }

    /// Pure function for the target population at `elapsed` into a stage.
    ///
    /// Linear interpolation from `from` to `to`, rounded to whole users and
    /// capped at the stage target once `elapsed` passes `duration`.
    pub fn current_target(elapsed: Duration, duration: Duration, from: usize, to: usize) -> usize {
        if duration.is_zero() {
            return to;
        }
        let t = (elapsed.as_secs_f64() / duration.as_secs_f64()).min(1.0);
        let interpolated = from as f64 + (to as f64 - from as f64) * t;
        interpolated.round() as usize
    }

    /// Spawn `workers` Tokio tasks, each acting as one potential virtual
    /// user. Worker `i` is active whenever the published target exceeds `i`.
    pub async fn spawn_workers<A, F, Fut>(
        ctx: ExecutionContext,
        workers: usize,
        action: F,
    ) -> Vec<JoinHandle<A>>
    where
        A: Aggregate + 'static,
        F: Fn(StopHandle) -> Fut + Send + Sync + Clone + 'static,
        Fut: std::future::Future<Output = A::Metric> + Send,
    {
        (0..workers)
            .map(|i| {
                let mut ctx = ctx.clone();
                let action = action.clone();
                tokio::spawn(async move {
                    let mut agg = A::new();
                    if ctx.start.wait_for(|started| *started).await.is_err() {
                        return agg;
                    }
                    tracing::trace!(worker = i, "worker started");

                    loop {
                        if *ctx.shutdown.borrow() {
                            break;
                        }
                        let active = *ctx.target.borrow() > i;
                        if !active {
                            // Parked: wake on a population change or shutdown.
                            tokio::select! {
                                changed = ctx.target.changed() => {
                                    if changed.is_err() {
                                        break;
                                    }
                                }
                                _ = ctx.shutdown.wait_for(|b| *b) => break,
                            }
                            continue;
                        }

                        let metric = action(StopHandle::new(ctx.shutdown.clone())).await;
                        agg.consume(&metric);
                    }

                    tracing::trace!(worker = i, "worker shutting down");
                    agg
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metric::Metric;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, PartialOrd, Serialize, Deserialize)]
    struct UnitMetric;

    impl Metric for UnitMetric {}

    #[derive(Debug, Clone, Default, PartialEq, PartialOrd, Serialize, Deserialize)]
    struct CountAggregate {
        count: usize,
    }

    impl Aggregate for CountAggregate {
        type Metric = UnitMetric;

        fn new() -> Self {
            Self::default()
        }

        fn consume(&mut self, _: &Self::Metric) {
            self.count += 1;
        }

        fn merge(&mut self, other: Self) {
            self.count += other.count;
        }
    }

    #[tokio::test]
    async fn spawn_expected_number_of_workers() {
        let n = 10;
        let (ctx, _controls) = ExecutionContext::new();
        let action = |_stop: StopHandle| async { UnitMetric };
        let workers: Vec<JoinHandle<CountAggregate>> = spawn_workers(ctx, n, action).await;

        assert_eq!(workers.len(), n);
    }

    #[tokio::test]
    async fn executor_runs_iterations_and_drains() {
        let executor = VuExecutor::builder()
            .stages(vec![
                Stage::new(Duration::ZERO, 2),
                Stage::new(Duration::from_millis(300), 2),
            ])
            .tick(Duration::from_millis(50))
            .build();

        let mut scenario = Scenario::<CountAggregate, _, _, _>::builder()
            .name("smoke")
            .action(|_stop: StopHandle| async {
                tokio::time::sleep(Duration::from_millis(5)).await;
                UnitMetric
            })
            .executor(executor)
            .build();

        let agg = scenario.run().await.unwrap();
        assert!(agg.count > 0, "expected at least one iteration");
    }

    #[tokio::test]
    async fn empty_stages_is_an_error() {
        let executor = VuExecutor::builder().stages(vec![]).build();
        let mut scenario = Scenario::<CountAggregate, _, _, _>::builder()
            .name("empty")
            .action(|_stop: StopHandle| async { UnitMetric })
            .executor(executor)
            .build();

        assert!(matches!(scenario.run().await, Err(VuError::NoStages)));
    }

    mod current_target {
        use super::*;

        #[test]
        fn ramp_up_is_linear() {
            let duration = Duration::from_secs(10);
            for i in 0..=10 {
                let elapsed = Duration::from_secs(i);
                assert_eq!(current_target(elapsed, duration, 0, 100), (i * 10) as usize);
            }
        }

        #[test]
        fn ramp_down_is_linear() {
            let duration = Duration::from_secs(10);
            for i in 0..=10 {
                let elapsed = Duration::from_secs(i);
                assert_eq!(
                    current_target(elapsed, duration, 100, 0),
                    (100 - i * 10) as usize
                );
            }
        }

        #[test]
        fn hold_is_constant() {
            let duration = Duration::from_secs(10);
            for i in 0..=10 {
                assert_eq!(current_target(Duration::from_secs(i), duration, 20, 20), 20);
            }
        }

        #[test]
        fn zero_duration_jumps() {
            assert_eq!(current_target(Duration::ZERO, Duration::ZERO, 3, 50), 50);
        }

        #[test]
        fn elapsed_past_duration_caps_at_target() {
            let duration = Duration::from_secs(10);
            for i in 10..20 {
                assert_eq!(
                    current_target(Duration::from_secs(i), duration, 0, 100),
                    100
                );
            }
        }

        #[test]
        fn rounds_to_whole_users() {
            // 1/3 of the way from 0 to 10 is 3.33…, which is 3 whole users.
            let target = current_target(
                Duration::from_secs(1),
                Duration::from_secs(3),
                0,
                10,
            );
            assert_eq!(target, 3);
        }
    }
}
