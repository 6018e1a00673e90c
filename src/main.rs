use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use log::{info, warn};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use jobwait::client::JobClient;
use jobwait::credentials::CredentialSource;
use jobwait::domain::{JobTrigger, RunOutcome};
use jobwait::runner::{CompletionPoller, PollerConfig, RunReport, StopSignal, stop_channel};
use jobwait::vendors::{ConnectorUpdate, DbtClient, FivetranClient};

mod cli;
mod config;

use cli::Cli;
use cli::commands::{Commands, DbtCommands, FivetranCommands, Vendor};
use config::Config;

/// Exit code for invalid command-line or config input.
const EXIT_INVALID_INPUT: i32 = 206;

fn setup_logging(to_stderr: bool) -> Result<()> {
    if to_stderr {
        env_logger::Builder::from_default_env()
            .target(env_logger::Target::Stderr)
            .init();
        return Ok(());
    }

    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("jobwait")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("jobwait.log");

    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    env_logger::Builder::from_default_env()
        .target(env_logger::Target::Pipe(target))
        .init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

/// Report for work that never reached the poller.
fn report_for(result: jobwait::Result<()>) -> RunReport {
    let outcome = match result {
        Ok(()) => RunOutcome::Success,
        Err(e) => RunOutcome::from_error(&e),
    };
    RunReport {
        outcome,
        run_id: None,
        attempts: 0,
        trigger_calls: 0,
        poll_calls: 0,
    }
}

fn dbt_client(config: &Config) -> jobwait::Result<DbtClient> {
    let source = config.credential_source();
    let token = source.lookup("dbt")?.into_token()?;
    DbtClient::new(token, config.dbt_config(&source))
}

fn fivetran_client(config: &Config) -> jobwait::Result<FivetranClient> {
    let (key, secret) = config.credential_source().lookup("fivetran")?.into_basic()?;
    FivetranClient::new(key, secret, config.fivetran_config())
}

fn poller_config(config: &Config, max_attempts: Option<u32>, deadline: Option<u64>) -> PollerConfig {
    let mut poller = config.poller_config();
    if let Some(max) = max_attempts {
        poller.max_run_attempts = max;
    }
    if let Some(secs) = deadline {
        poller.deadline = Some(Duration::from_secs(secs));
    }
    poller
}

async fn handle_dbt_command(command: &DbtCommands, config: &Config, stop: StopSignal) -> RunReport {
    match command {
        DbtCommands::Run {
            job_id,
            cause,
            wait,
            poke_interval,
            max_attempts,
            deadline,
        } => {
            info!("Triggering dbt job {} (wait: {})", job_id, wait);
            let client = match dbt_client(config) {
                Ok(client) => client,
                Err(e) => return report_for(Err(e)),
            };
            let poller = CompletionPoller::with_config(
                Arc::new(client),
                poller_config(config, *max_attempts, *deadline),
            );
            let poke = poke_interval.unwrap_or(config.poller.poke_interval_secs);
            poller.run_job_and_wait(job_id, cause, *wait, poke, stop).await
        }
    }
}

async fn handle_fivetran_command(command: &FivetranCommands, config: &Config, stop: StopSignal) -> RunReport {
    let client = match fivetran_client(config) {
        Ok(client) => client,
        Err(e) => return report_for(Err(e)),
    };

    match command {
        FivetranCommands::Sync {
            connector_id,
            no_force,
            wait,
            poke_interval,
            deadline,
        } => {
            info!("Starting Fivetran sync for {} (wait: {})", connector_id, wait);
            let mut poller = poller_config(config, None, *deadline);
            if let Some(secs) = poke_interval {
                if *secs == 0 {
                    return report_for(Err(jobwait::JobError::BadRequest(
                        "poke interval must be at least one second".to_string(),
                    )));
                }
                poller.poke_interval = Duration::from_secs(*secs);
            }

            let poller = CompletionPoller::with_config(Arc::new(client), poller);
            let trigger = JobTrigger::new(connector_id.as_str(), "jobwait").with_force(!no_force);
            if *wait {
                poller.run(&trigger, stop).await
            } else {
                poller.start(&trigger, stop).await
            }
        }
        FivetranCommands::Pause { connector_id } => {
            info!("Pausing Fivetran connector {}", connector_id);
            report_for(client.update_connector(connector_id, &ConnectorUpdate::paused(true)).await)
        }
        FivetranCommands::Resume { connector_id } => {
            info!("Resuming Fivetran connector {}", connector_id);
            report_for(client.update_connector(connector_id, &ConnectorUpdate::paused(false)).await)
        }
    }
}

async fn handle_check_command(vendor: Vendor, config: &Config) -> RunReport {
    let result = match vendor {
        Vendor::Dbt => match dbt_client(config) {
            Ok(client) => client.check_connection().await,
            Err(e) => Err(e),
        },
        Vendor::Fivetran => match fivetran_client(config) {
            Ok(client) => client.check_connection().await,
            Err(e) => Err(e),
        },
    };
    report_for(result)
}

fn print_report(report: &RunReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report).context("Failed to serialize report")?);
        return Ok(());
    }

    let label = match &report.outcome {
        outcome if outcome.is_success() => "OK".green(),
        RunOutcome::Cancelled | RunOutcome::CancelledByCaller { .. } => "CANCELLED".yellow(),
        _ => "FAILED".red(),
    };
    match &report.run_id {
        Some(run_id) => println!("{} run {}: {}", label, run_id.cyan(), report.outcome),
        None => println!("{} {}", label, report.outcome),
    }
    Ok(())
}

async fn run_application(cli: &Cli, config: &Config) -> Result<i32> {
    info!("Starting application");

    if cli.is_verbose() {
        println!("{}", "Verbose mode enabled".yellow());
    }

    let (stop_handle, stop) = stop_channel();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping");
            stop_handle.stop();
        }
    });

    let report = match &cli.command {
        Commands::Dbt { command } => handle_dbt_command(command, config, stop).await,
        Commands::Fivetran { command } => handle_fivetran_command(command, config, stop).await,
        Commands::Check { vendor } => handle_check_command(*vendor, config).await,
    };

    if cli.is_verbose() {
        println!(
            "{} attempts: {}, trigger calls: {}, poll calls: {}",
            "Work:".cyan(),
            report.attempts,
            report.trigger_calls,
            report.poll_calls
        );
    }
    print_report(&report, cli.json)?;

    info!("Finished with outcome: {}", report.outcome);
    Ok(report.outcome.exit_code())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = if e.use_stderr() { EXIT_INVALID_INPUT } else { 0 };
            let _ = e.print();
            std::process::exit(code);
        }
    };

    setup_logging(cli.log_stderr).context("Failed to setup logging")?;

    let config = match Config::load(cli.config.as_ref()).and_then(|config| {
        config.validate()?;
        Ok(config)
    }) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{} {:#}", "Invalid configuration:".red(), e);
            std::process::exit(EXIT_INVALID_INPUT);
        }
    };

    info!("Starting with config from: {:?}", cli.config);

    let code = run_application(&cli, &config).await.context("Application failed")?;
    std::process::exit(code);
}
