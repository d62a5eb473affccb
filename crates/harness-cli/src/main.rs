//! cloud-harness: companion CLI for the cloud test harness
//!
//! Shows the teardown plan of a saved registry snapshot, runs test commands
//! concurrently, and validates harness configuration files.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use comfy_table::{Cell, ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};
use harness_common::defaults::DEFAULT_WAIT_TIMEOUT_SECS;
use harness_core::cleanup::{DestroyAction, teardown_order};
use harness_core::config::HarnessConfig;
use harness_core::registry::RegistrySnapshot;
use harness_core::session::new_session_id;
use harness_core::{ResourceRegistry, TaskOutcome, TaskRunner};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "cloud-harness")]
#[command(about = "Resource teardown planning and concurrent test execution")]
#[command(version)]
struct Args {
    /// Harness configuration file (JSON)
    #[arg(long, global = true, env = "CLOUD_HARNESS_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the teardown order for a saved registry snapshot
    Plan {
        /// Registry snapshot written by a test session
        #[arg(long)]
        registry: PathBuf,

        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },

    /// Run shell commands concurrently and report each outcome
    Exec {
        /// Commands to run, one task each
        #[arg(required = true)]
        commands: Vec<String>,

        /// Per-command timeout in seconds
        #[arg(long, default_value_t = DEFAULT_WAIT_TIMEOUT_SECS)]
        timeout: u64,

        /// Shell used to run each command
        #[arg(long, default_value = "sh")]
        shell: String,
    },

    /// Validate the configuration and print the effective settings
    CheckConfig,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        print_error(&e);
        std::process::exit(1);
    }
}

/// Print error in a user-friendly way
fn print_error(e: &anyhow::Error) {
    use std::io::Write;

    let mut stderr = std::io::stderr();
    let _ = writeln!(stderr, "\n\x1b[1;31mError:\x1b[0m {e}");

    let mut source = e.source();
    while let Some(cause) = source {
        let _ = writeln!(stderr, "  \x1b[33mCaused by:\x1b[0m {cause}");
        source = cause.source();
    }
}

async fn run() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let config = load_config(args.config.as_deref())?;

    match args.command {
        Command::Plan { registry, format } => handle_plan(&registry, format)?,
        Command::Exec {
            commands,
            timeout,
            shell,
        } => handle_exec(&config, commands, Duration::from_secs(timeout), &shell).await?,
        Command::CheckConfig => handle_check_config(&config)?,
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<HarnessConfig> {
    match path {
        Some(path) => {
            let config = HarnessConfig::load(path)?;
            info!(path = %path.display(), "Loaded harness configuration");
            Ok(config)
        }
        None => Ok(HarnessConfig::default()),
    }
}

/// Handle the plan command
fn handle_plan(path: &Path, format: OutputFormat) -> Result<()> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read registry snapshot: {}", path.display()))?;
    let snapshot: RegistrySnapshot = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse registry snapshot: {}", path.display()))?;
    let registry = ResourceRegistry::from_snapshot(snapshot);

    let order = teardown_order(&registry);
    if order.is_empty() {
        println!("Session {} has no tracked resources", registry.session_id());
        return Ok(());
    }

    match format {
        OutputFormat::Json => {
            let steps: Vec<_> = order
                .iter()
                .enumerate()
                .map(|(i, (kind, handle))| {
                    serde_json::json!({
                        "step": i + 1,
                        "kind": kind.as_str(),
                        "id": handle.id,
                        "attached_to": handle.attached_to,
                        "action": DestroyAction::for_kind(kind).map(|a| a.as_str()),
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&steps)?);
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL_CONDENSED)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec![
                    Cell::new("#"),
                    Cell::new("Kind"),
                    Cell::new("ID"),
                    Cell::new("Attached To"),
                    Cell::new("Action"),
                ]);

            for (i, (kind, handle)) in order.iter().enumerate() {
                table.add_row(vec![
                    Cell::new(i + 1),
                    Cell::new(kind.as_str()),
                    Cell::new(&handle.id),
                    Cell::new(handle.attached_to.as_deref().unwrap_or("-")),
                    Cell::new(
                        DestroyAction::for_kind(kind)
                            .map(|a| a.as_str())
                            .unwrap_or("(no default)"),
                    ),
                ]);
            }

            println!("Teardown plan for session {}", registry.session_id());
            println!("{table}");
        }
    }

    Ok(())
}

/// Handle the exec command
async fn handle_exec(
    config: &HarnessConfig,
    commands: Vec<String>,
    timeout: Duration,
    shell: &str,
) -> Result<()> {
    let session_id = new_session_id(&config.session.prefix);
    info!(session_id = %session_id, count = commands.len(), "Running commands");

    let mut runner = TaskRunner::new();
    for (i, command) in commands.iter().enumerate() {
        let id = format!("{}-{}", session_id, i + 1);
        runner.launch_command(
            Some(&id),
            shell,
            &["-c".to_string(), command.clone()],
            timeout,
        )?;
    }

    let outcomes = runner.wait_all().await;

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("#"),
            Cell::new("Command"),
            Cell::new("Result"),
            Cell::new("Error"),
        ]);

    let mut failed = 0;
    for (i, ((_, outcome), command)) in outcomes.iter().zip(&commands).enumerate() {
        let (result, error) = match outcome {
            TaskOutcome::Completed => ("ok", String::new()),
            TaskOutcome::Failed(failure) => {
                failed += 1;
                ("failed", failure.full_message())
            }
        };
        table.add_row(vec![
            Cell::new(i + 1),
            Cell::new(command),
            Cell::new(result),
            Cell::new(error),
        ]);
    }
    println!("{table}");

    if failed > 0 {
        anyhow::bail!("{} of {} commands failed", failed, commands.len());
    }
    Ok(())
}

/// Handle the check-config command
fn handle_check_config(config: &HarnessConfig) -> Result<()> {
    config.validate()?;
    let policy = config.poll.to_policy()?;
    let sweep = config.sweep_options();

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![Cell::new("Setting"), Cell::new("Value")]);

    let rows = [
        ("session.prefix", config.session.prefix.clone()),
        ("poll.interval", format!("{:?}", policy.interval)),
        ("poll.max_attempts", format_option(policy.max_attempts)),
        ("poll.timeout", format_option(policy.timeout.map(|d| format!("{d:?}")))),
        ("poll.backoff_max", format_option(policy.max_interval.map(|d| format!("{d:?}")))),
        ("poll.probe_timeout", format_option(policy.probe_timeout.map(|d| format!("{d:?}")))),
        ("cleanup.dry_run", sweep.dry_run.to_string()),
        ("cleanup.retry_attempts", sweep.retry_attempts.to_string()),
    ];
    for (name, value) in rows {
        table.add_row(vec![Cell::new(name), Cell::new(value)]);
    }

    println!("Configuration is valid");
    println!("{table}");
    Ok(())
}

fn format_option<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "unset".to_string())
}
