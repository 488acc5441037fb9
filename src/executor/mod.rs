//! Executor — orchestration of runtime execution and concurrency control.
//!
//! The `Executor` trait is the runtime that executes a `Scenario`. Different
//! executors provide different execution strategies: sequential, concurrent,
//! distributed, or stage-ramped.
//!
//! Arreo provides a built-in [`VuExecutor`] which ramps a population of
//! virtual users across a list of [`Stage`]s, the way a browser-session load
//! profile is usually written (N concurrent users, not N requests/second —
//! one user's requests are strictly sequential).

pub mod vus;
pub use vus::{Stage, VuExecutor};

use std::future::Future;

use tokio::sync::watch;

use crate::{aggregate::Aggregate, scenario::Scenario};

/// Lets a running iteration observe the end of the test.
///
/// Cancellation is cooperative: an iteration already in flight may finish
/// the step it is on, but must not start another one once this reports
/// stopped. Cheap to clone; every iteration gets its own handle.
#[derive(Debug, Clone)]
pub struct StopHandle {
    rx: watch::Receiver<bool>,
}

impl StopHandle {
    pub(crate) fn new(rx: watch::Receiver<bool>) -> Self {
        Self { rx }
    }

    /// A handle that never reports stopped, for driving flows outside an
    /// executor.
    pub fn inert() -> Self {
        let (tx, rx) = watch::channel(false);
        // Receivers read the last value after the sender is gone.
        drop(tx);
        Self { rx }
    }

    pub fn is_stopped(&self) -> bool {
        *self.rx.borrow()
    }
}

/// The runtime hook that executes a `Scenario`.
///
/// `Executor` defines the execution strategy for a given scenario, such as:
/// - Simple sequential or concurrent runs.
/// - Stage-ramped virtual-user populations.
/// - Distributed execution across multiple nodes.
///
/// This trait is generic over the aggregate, action, and future types to
/// remain flexible and composable.
pub trait Executor<A, F, Fut>
where
    Self: Send + Sync + Sized,
    A: Aggregate,
    F: Fn(StopHandle) -> Fut + Send + Sync + Clone + 'static,
    Fut: Future<Output = A::Metric> + Send,
{
    type Error;

    /// Execute the scenario and return the final aggregate.
    ///
    /// This function is responsible for implementing the execution strategy,
    /// such as spawning workers, managing concurrency, and collecting
    /// results from the `scenario.action`.
    fn exec(
        &self,
        scenario: &Scenario<A, Self, F, Fut>,
    ) -> impl Future<Output = Result<A, Self::Error>> + Send;
}
