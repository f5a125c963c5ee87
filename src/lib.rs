pub mod config;
pub mod db;
pub mod models;
pub mod pipeline;
pub mod run_lock;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use config::EtlConfig;
use db::PracticeRegistry;
use pipeline::clinical_metrics::{start_scheduler, MetricsError, MetricsRunner};
use run_lock::RunLock;

/// Clinical metrics ETL for remote-patient-monitoring telemetry.
#[derive(Parser, Debug)]
#[command(name = "clinimetrics")]
#[command(version)]
#[command(about = "Aggregates RPM device telemetry into per-practice clinical metric summaries")]
pub struct Cli {
    /// Run the ETL once, print the run report and exit
    #[arg(long)]
    pub once: bool,

    /// JSON config file (defaults to ~/Clinimetrics/clinimetrics.json)
    #[arg(short, long, env = config::CONFIG_ENV_VAR)]
    pub config: Option<PathBuf>,
}

pub fn run() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();

    tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);

    let cli = Cli::parse();
    match execute(cli) {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "Clinimetrics exited with an error");
            ExitCode::FAILURE
        }
    }
}

fn execute(cli: Cli) -> Result<ExitCode, MetricsError> {
    let config_path = EtlConfig::resolve_path(cli.config);
    let config = EtlConfig::load(&config_path)?;

    let registry = Arc::new(PracticeRegistry::from_config(&config));
    if registry.is_empty() {
        tracing::warn!(config = %config_path.display(), "No practices configured");
    }
    for practice_id in registry.missing_databases() {
        tracing::warn!(practice_id, "Practice database not found");
    }

    let runner = Arc::new(MetricsRunner::sqlite(
        &config,
        registry,
        Arc::new(RunLock::new()),
    ));

    if cli.once {
        let report = runner.run("manual", Utc::now().naive_utc())?;
        let json =
            serde_json::to_string_pretty(&report).map_err(|e| MetricsError::Json(e.to_string()))?;
        println!("{json}");
        // Partial failures are logged per period; signal them to cron wrappers
        return Ok(if report.has_failures() {
            ExitCode::from(2)
        } else {
            ExitCode::SUCCESS
        });
    }

    let handle = start_scheduler(
        runner,
        Duration::from_secs(config.run_interval_secs),
        config.run_on_start,
    );
    handle.join();
    Ok(ExitCode::SUCCESS)
}
