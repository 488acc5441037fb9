//! Arreo CLI entrypoint.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use arreo::aggregate::FlowAggregate;
use arreo::config::{AppConfig, Profile};
use arreo::credentials::CredentialPool;
use arreo::executor::{StopHandle, VuExecutor};
use arreo::extract::FieldValueExtractor;
use arreo::flow::{FlowDriver, FlowPlan};
use arreo::report::{JsonFileReporter, Reporter, StdoutReporter, SummaryReport};
use arreo::scenario::Scenario;
use arreo::step::HttpStepRunner;

#[derive(Debug, Parser)]
#[command(name = "arreo")]
#[command(about = "session-flow load generator for server-rendered web applications")]
struct Cli {
    /// Path to config file. A missing config means defaults.
    #[arg(long, default_value = "arreo.toml")]
    config: PathBuf,

    /// Target base URL; overrides the config file and the BASE_URL
    /// environment variable.
    #[arg(long)]
    base_url: Option<String>,

    /// Credential table (`;`-delimited, header row skipped).
    #[arg(long, default_value = "users.csv")]
    users: PathBuf,

    /// Concurrency ramp to run.
    #[arg(long, value_enum, default_value = "smoke")]
    profile: Profile,

    /// Also write the summary as JSON to this path.
    #[arg(long)]
    json: Option<PathBuf>,

    /// Log level. Overridden by RUST_LOG.
    #[arg(long, default_value = "info")]
    log: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cli.log.clone()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut config = AppConfig::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    if let Some(base_url) = cli.base_url {
        config.base_url = base_url;
    } else if config.base_url.is_empty() {
        if let Ok(base_url) = std::env::var("BASE_URL") {
            config.base_url = base_url;
        }
    }
    anyhow::ensure!(
        !config.base_url.is_empty(),
        "no target configured: set --base-url, BASE_URL, or base_url in {}",
        cli.config.display()
    );

    // Startup precondition: an unusable credential table must stop the run
    // before any iteration is attempted.
    let pool = CredentialPool::load(&cli.users)
        .with_context(|| format!("loading {}", cli.users.display()))?;

    tracing::info!(
        base_url = %config.base_url,
        users = pool.len(),
        profile = ?cli.profile,
        "starting load run"
    );

    let client = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .user_agent(concat!("arreo/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("building http client")?;
    let extractor = FieldValueExtractor::new(&config.components.view_state_field)
        .context("building token extractor")?;
    let driver = Arc::new(FlowDriver::new(
        HttpStepRunner::new(client, extractor),
        FlowPlan::from_config(&config),
        config.delays,
    ));

    let results: FlowAggregate = Scenario::<FlowAggregate, _, _, _>::builder()
        .name(format!("{} [{:?}]", config.base_url, cli.profile))
        .action(move |stop: StopHandle| {
            let driver = driver.clone();
            let pool = pool.clone();
            async move { driver.run_iteration(&pool.pick(), &stop).await }
        })
        .executor(VuExecutor::builder().stages(cli.profile.stages()).build())
        .build()
        .run()
        .await?;

    let report = SummaryReport::from(results);
    StdoutReporter
        .report(&report)
        .await
        .map_err(|err| anyhow::anyhow!("{err}"))?;
    if let Some(path) = cli.json {
        JsonFileReporter::new(path)
            .report(&report)
            .await
            .map_err(|err| anyhow::anyhow!("{err}"))?;
    }

    let breaches = config.thresholds.evaluate(&report);
    if !breaches.is_empty() {
        for breach in &breaches {
            tracing::error!(%breach, "threshold breached");
        }
        anyhow::bail!("{} threshold(s) breached", breaches.len());
    }
    Ok(())
}
