use std::fmt::Debug;
use std::time::Duration;

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::flow::Disposition;
use crate::step::{StepResult, StepSpec};

/// Metrics that should be collected and processed by the framework.
/// Metrics can be composed of other metrics as well.
pub trait Metric
where
    Self: Serialize + DeserializeOwned + PartialOrd + PartialEq + Send + Sync + Debug + Clone,
{
}

/// Why a step failed, when it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FailureKind {
    /// Connection error or timeout. Counted, never fatal.
    Transport,
    /// Unexpected status code or a structurally invalid body.
    Protocol,
    /// The step was expected to yield a token and did not.
    State,
}

/// One HTTP interaction's sample.
#[derive(Debug, Clone, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct StepMetric {
    pub step: String,
    pub latency: Duration,
    pub status: u16,
    pub bytes: usize,
    pub succeeded: bool,
    pub failure: Option<FailureKind>,
}

impl StepMetric {
    pub fn of(spec: &StepSpec, result: &StepResult) -> Self {
        Self {
            step: spec.name.clone(),
            latency: result.latency,
            status: result.status,
            bytes: result.bytes,
            succeeded: result.succeeded,
            failure: result.failure,
        }
    }
}

/// The sample produced by one full flow iteration: every step that ran, plus
/// how the iteration ended.
#[derive(Debug, Clone, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct FlowMetric {
    pub steps: Vec<StepMetric>,
    pub disposition: Disposition,
}

impl Metric for FlowMetric {}
