use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

use batchrun::cli::{Cli, Command};
use batchrun::config::RunnerConfig;
use batchrun::demo::Scenario;
use batchrun::ui::RunProgress;
use batchrun::{
    InMemoryJobRepository, JobExecution, JobRepository, JsonFileJobRepository, TaskExecutor,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = RunnerConfig::load(cli.config.as_deref())
        .context("failed to load configuration")?;
    if cli.verbose {
        config.log_filter = "debug".to_string();
    }
    if let Some(max_permits) = cli.max_permits {
        config.max_permits = max_permits;
        config.validate()?;
    }

    init_logging(&config);

    match cli.command {
        Command::Scenarios => {
            for scenario in Scenario::all() {
                println!("  {:<18} {}", scenario.name(), scenario.description());
            }
        }
        Command::Demo {
            scenario,
            stop_after_ms,
            json,
        } => {
            run_demo(&config, scenario.into(), stop_after_ms, json).await?;
        }
    }

    Ok(())
}

fn init_logging(config: &RunnerConfig) {
    let filter = EnvFilter::try_new(&config.log_filter).unwrap_or_else(|_| EnvFilter::new("info"));
    let layer = if config.json_logs {
        fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_filter(filter)
            .boxed()
    } else {
        fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .with_filter(filter)
            .boxed()
    };
    tracing_subscriber::registry().with(layer).init();
}

async fn run_demo(
    config: &RunnerConfig,
    scenario: Scenario,
    stop_after_ms: Option<u64>,
    json: bool,
) -> anyhow::Result<()> {
    let repository: Arc<dyn JobRepository> = match &config.repository_dir {
        Some(dir) => Arc::new(JsonFileJobRepository::open(dir)?),
        None => Arc::new(InMemoryJobRepository::new()),
    };

    let step_delay = Duration::from_millis(config.step_delay_ms);
    let runner = scenario.prepare(step_delay, repository)?;
    let execution = runner.context().execution().clone();
    info!(scenario = %scenario, execution = %execution.id(), "prepared demo job");

    // The stop scenario stops mid-run unless told otherwise.
    let stop_after = match stop_after_ms {
        Some(ms) => Some(Duration::from_millis(ms)),
        None if scenario == Scenario::Stop => Some(step_delay + step_delay / 2),
        None => None,
    };

    let progress = Arc::new(RunProgress::start(execution.job_name()));
    let executor = TaskExecutor::new(config.max_permits);
    let handle = executor.submit(runner).await?;

    if let Some(delay) = stop_after {
        spawn_stop(execution.clone(), progress.clone(), async move {
            tokio::time::sleep(delay).await;
        });
    }
    spawn_stop(execution.clone(), progress.clone(), async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    });

    handle.await.context("job run task failed")?;

    let summary = execution.summary();
    progress.finish(&summary);
    if json {
        progress.print_summary(&summary);
    }
    Ok(())
}

/// Requests a stop on `execution` once `trigger` resolves.
fn spawn_stop(
    execution: Arc<JobExecution>,
    progress: Arc<RunProgress>,
    trigger: impl Future<Output = ()> + Send + 'static,
) {
    tokio::spawn(async move {
        trigger.await;
        if execution.batch_status().is_terminal() {
            return;
        }
        let status = execution.request_stop();
        warn!(execution = %execution.id(), %status, "stop requested");
        progress.stop_requested(status);
    });
}
