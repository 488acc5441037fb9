use std::future::Future;
use std::marker::PhantomData;

use typed_builder::TypedBuilder;

use crate::aggregate::Aggregate;
use crate::executor::{Executor, StopHandle};

/// Glue that ties everything together: a named action (one flow iteration,
/// producing a metric) and the executor that will drive it.
///
/// The action receives a [`StopHandle`] so an iteration can notice the end
/// of the test between its steps.
#[derive(Debug, Clone, TypedBuilder)]
pub struct Scenario<A, E, F, Fut>
where
    A: Aggregate,
    E: Executor<A, F, Fut> + Send + Sync,
    F: Fn(StopHandle) -> Fut + Send + Sync + Clone + 'static,
    Fut: Future<Output = A::Metric> + Send,
{
    #[builder(setter(into))]
    pub name: String,
    pub action: F,
    pub executor: E,
    #[builder(default, setter(skip))]
    aggregate: PhantomData<A>,
}

impl<A, E, F, Fut> Scenario<A, E, F, Fut>
where
    A: Aggregate,
    E: Executor<A, F, Fut> + Send + Sync,
    F: Fn(StopHandle) -> Fut + Send + Sync + Clone + 'static,
    Fut: Future<Output = A::Metric> + Send,
{
    pub async fn run(&mut self) -> Result<A, E::Error> {
        self.executor.exec(self).await
    }
}
