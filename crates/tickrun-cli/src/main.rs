//! tickrun - run one tick of a recurring-task schedule.
//!
//! Meant to be invoked every minute by cron or a systemd timer.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use chrono::Utc;
use clap::Parser;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use tickrun_core::TaskId;
use tickrun_engine::{ExecutorRegistry, FileLockProvider, RunEngine, RunOptions, Schedule};

mod config;
mod error;
mod loader;
mod output;

use config::{Config, ENVIRONMENT_VAR};
use error::CliError;
use output::ConsoleOutput;

/// Exit status for configuration and engine errors.
const EXIT_ERROR: u8 = 2;

/// tickrun - Recurring task scheduler
#[derive(Parser)]
#[command(name = "tickrun")]
#[command(about = "Run the tasks of a schedule that are due now", long_about = None)]
struct Cli {
    /// Configuration file (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Schedule file, overriding the configured path
    #[arg(short, long)]
    schedule: Option<PathBuf>,

    /// Treat every task as due
    #[arg(long)]
    force: bool,

    /// List due tasks and next run times without running anything
    #[arg(long)]
    list: bool,

    /// Run only this task, regardless of its schedule
    #[arg(long)]
    id: Option<String>,

    /// Show task output (-v) and debug logs (-vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress console output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        _ => Level::DEBUG,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_writer(std::io::stderr)
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to install tracing subscriber: {}", e);
    }

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!(error = %e, "tickrun failed");
            eprintln!("Error: {}", e);
            ExitCode::from(EXIT_ERROR)
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode, CliError> {
    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    }
    .with_environment_override(std::env::var(ENVIRONMENT_VAR).ok());
    let schedule_path = cli.schedule.clone().unwrap_or_else(|| config.schedule_path.clone());

    let schedule = loader::load_schedule(
        &schedule_path,
        config.timezone()?,
        ExecutorRegistry::with_defaults(),
    )?
    .with_environment(config.environment.clone())
    .build()?;

    info!(
        schedule = %schedule_path.display(),
        tasks = schedule.len(),
        environment = %config.environment,
        "Schedule loaded"
    );

    if cli.list {
        print_listing(&schedule);
        return Ok(ExitCode::SUCCESS);
    }

    let mut engine = RunEngine::new(schedule, Arc::new(FileLockProvider::new(&config.lock_dir)));
    if !cli.quiet {
        engine = engine.with_observer(Arc::new(ConsoleOutput::stdout(cli.verbose)));
    }

    let mut options = RunOptions::new();
    options.force = cli.force;
    options.task_id = cli.id.map(TaskId::new);

    let outcome = engine.run(options).await?;

    if !outcome.background.is_empty() {
        info!(count = outcome.background.len(), "Waiting for background tasks");
        for result in outcome.background.wait().await {
            if result.is_failure() {
                warn!(
                    task_id = %result.task_id,
                    status = %result.status,
                    description = %result.description,
                    "Background task failed"
                );
            }
        }
    }

    Ok(if outcome.context.is_successful() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn print_listing(schedule: &Schedule) {
    let now = Utc::now();
    println!("Tasks ({}):", schedule.len());
    println!(
        "{:<24}  {:<10}  {:<4}  {:<20}  {}",
        "ID", "KIND", "DUE", "NEXT", "SCHEDULE"
    );
    println!("{}", "-".repeat(80));

    for task in schedule.tasks() {
        let due = if task.schedule.is_due(now) { "yes" } else { "no" };
        let next = task
            .schedule
            .next_due(now)
            .map(|t| t.format("%Y-%m-%d %H:%M UTC").to_string())
            .unwrap_or_else(|| "never".to_string());
        println!(
            "{:<24}  {:<10}  {:<4}  {:<20}  {}",
            task.id.as_str(),
            task.kind.as_str(),
            due,
            next,
            task.schedule
        );
    }
}
