use colored::*;
use std::process;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use compose_guardian::cli;
use compose_guardian::config::Config;
use compose_guardian::engine::EngineAdapter;
use compose_guardian::executor::LocalCommandExecutor;
use compose_guardian::notifier;
use compose_guardian::orchestrator::{self, RunResult};
use compose_guardian::pipeline::PipelineConfig;
use compose_guardian::scheduler::{self, Schedule};
use compose_guardian::verifier::VerifierConfig;

use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() {
    let cli_args = cli::parse_args();

    let default_level = match cli_args.verbose {
        0 => LevelFilter::INFO,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };
    let env_filter = EnvFilter::builder()
        .with_default_directive(default_level.into())
        .with_env_var("GUARDIAN_LOG")
        .from_env_lossy();
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli_args).await {
        eprintln!("{}: {}", "Error".red().bold(), e);
        process::exit(1);
    }
}

async fn run(cli_args: cli::Cli) -> anyhow::Result<()> {
    let mut config = Config::from_env()?;

    if let Some(root) = cli_args.root {
        config.compose_root = root;
    }
    let schedule = if cli_args.once { Schedule::Once } else { config.schedule.clone() };

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("received shutdown signal, finishing current run");
            shutdown.cancel();
        }
    });

    let pipeline_config = PipelineConfig {
        ignore_services: config.ignore_services.clone(),
        verifier: VerifierConfig {
            health_timeout: config.health_timeout,
            stable_window: config.stable_window,
            poll_interval: config.verify_poll,
        },
    };

    scheduler::drive(&schedule, &cancel, || async {
        let run_timestamp = chrono::Utc::now().format("%Y%m%dT%H%M%S").to_string();
        let mut engine = EngineAdapter::new(LocalCommandExecutor::new());

        let result: RunResult =
            orchestrator::run_once(&mut engine, &config.compose_root, &run_timestamp, &pipeline_config, &cancel)
                .await;

        for report in &result.reports {
            if let Err(e) = report.write(&config.report_dir) {
                tracing::error!("failed to write report for {}: {e}", report.compose_file);
            }
        }

        if let Some(webhook) = &config.dingtalk_webhook {
            notifier::notify(webhook, &result, &run_timestamp).await;
        }
    })
    .await?;

    Ok(())
}
