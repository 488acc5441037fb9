//! Arreo — a session-flow load generator for server-rendered web applications.
//!
//! Arreo drives synthetic load against session-based applications by replaying
//! a scripted multi-step user journey (authenticate, navigate, filter, act,
//! terminate) many times concurrently, threading the opaque server-issued
//! state — view tokens and cookies — from each response into the next request
//! of the same session.
//!
//! # Architecture
//!
//! The main building blocks are:
//!
//! - [`FlowDriver`]: runs one virtual user's journey as an explicit phase
//!   sequence, aborting the iteration on the first failed step.
//! - [`StepRunner`]/[`HttpStepRunner`]: executes one named HTTP interaction —
//!   build request, send, validate, refresh the session state. Failures are
//!   data, never exceptions.
//! - [`TokenExtractor`]/[`CookieJar`]/[`Validation`]: the session-state
//!   contract — how tokens are scraped, how cookies converge, and what counts
//!   as a protocol-valid response per step kind.
//! - [`Scenario`]: glue that ties a named action (one flow iteration) to an
//!   executor.
//! - [`Executor`]: responsible for actually running the scenario. We provide
//!   the stage-ramped [`VuExecutor`], but executors are replaceable.
//! - [`Metric`] → [`Aggregate`] → [`Report`]/[`Reporter`]: samples are
//!   accumulated worker-locally, merged, then derived into a summary that the
//!   configured thresholds judge.
//!
//! # Design goals
//!
//! - Session-state correctness first: token propagation, cookie convergence,
//!   and partial-response validity are the invariants everything else serves.
//! - Iterations are fully isolated — fresh session per iteration, no shared
//!   mutable state between virtual users, only the read-only credential pool.
//! - Composability: metrics, aggregates, reporters, executors, and the token
//!   extraction strategy are all replaceable seams.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use arreo::{
//!     config::AppConfig,
//!     credentials::CredentialPool,
//!     executor::{Stage, StopHandle, VuExecutor},
//!     extract::FieldValueExtractor,
//!     flow::{FlowDriver, FlowPlan},
//!     aggregate::FlowAggregate,
//!     report::{Reporter, StdoutReporter, SummaryReport},
//!     scenario::Scenario,
//!     step::HttpStepRunner,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     let mut config = AppConfig::default();
//!     config.base_url = "https://app.example.com".to_owned();
//!
//!     let pool = CredentialPool::load("users.csv")?;
//!     // Redirects stay visible: auth transitions are judged on the 302.
//!     let client = reqwest::Client::builder()
//!         .redirect(reqwest::redirect::Policy::none())
//!         .build()?;
//!     let extractor = FieldValueExtractor::new(&config.components.view_state_field)?;
//!     let driver = Arc::new(FlowDriver::new(
//!         HttpStepRunner::new(client, extractor),
//!         FlowPlan::from_config(&config),
//!         config.delays,
//!     ));
//!
//!     let results = Scenario::<FlowAggregate, _, _, _>::builder()
//!         .name("billing journey")
//!         .action(move |stop: StopHandle| {
//!             let driver = driver.clone();
//!             let pool = pool.clone();
//!             async move { driver.run_iteration(&pool.pick(), &stop).await }
//!         })
//!         .executor(
//!             VuExecutor::builder()
//!                 .stages(vec![
//!                     Stage::new(Duration::from_secs(120), 10),
//!                     Stage::new(Duration::from_secs(600), 10),
//!                     Stage::new(Duration::from_secs(120), 0),
//!                 ])
//!                 .build(),
//!         )
//!         .build()
//!         .run()
//!         .await?;
//!
//!     StdoutReporter.report(&SummaryReport::from(results)).await?;
//!     Ok(())
//! }
//! ```

/// Metric aggregators
pub mod aggregate;
/// Run configuration, load profiles and target-application constants
pub mod config;
/// Session cookie accumulation
pub mod cookies;
/// The shared read-only credential pool
pub mod credentials;
/// Orchestrators that define how things will actually run
pub mod executor;
/// View-token extraction strategies
pub mod extract;
/// The scripted journey as an explicit phase sequence
pub mod flow;
/// Single metrics
pub mod metric;
/// Jittered think-time pacing
pub mod pacing;
/// Reports and Reporters
pub mod report;
/// Main module of the framework that glues everything together
pub mod scenario;
/// Single-step request execution
pub mod step;
/// Per-step-kind response validation
pub mod validate;

pub use aggregate::{Aggregate, FlowAggregate};
pub use cookies::CookieJar;
pub use credentials::{Credential, CredentialPool};
pub use executor::{Executor, Stage, StopHandle, VuExecutor};
pub use extract::{FieldValueExtractor, TokenExtractor, ViewState};
pub use flow::{Disposition, FlowDriver, FlowPlan, Phase};
pub use metric::{FlowMetric, Metric, StepMetric};
pub use report::{Report, Reporter, SummaryReport, Thresholds};
pub use scenario::Scenario;
pub use step::{HttpStepRunner, SessionState, StepResult, StepRunner, StepSpec};
pub use validate::Validation;
