//! Command-line interface for the evdpor explorer.

use clap::{Parser, Subcommand};
use evdpor_core::{ExploreConfig, SearchSummary};
use evdpor_model::{ModelError, Program};
use evdpor_sim::{RunOutcome, SimConfig, SimError, Simulator, DEFAULT_MAX_TRANSITIONS};
use miette::{Diagnostic, NamedSource, SourceSpan};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// CLI error with source context for pretty printing.
#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    #[error("failed to read file: {message}")]
    IoError { message: String },

    #[error("parse error: {message}")]
    #[diagnostic(code(evdpor::parse_error))]
    ParseError {
        message: String,
        #[source_code]
        src: NamedSource<Arc<String>>,
        #[label("here")]
        span: SourceSpan,
    },

    #[error("invalid program: {message}")]
    #[diagnostic(code(evdpor::invalid_program))]
    InvalidProgram { message: String },

    #[error("exploration error: {message}")]
    #[diagnostic(code(evdpor::explore_error))]
    ExploreError { message: String },
}

impl CliError {
    fn from_model_error(e: ModelError, source: Arc<String>, filename: &str) -> Self {
        match e {
            ModelError::Json {
                line,
                column,
                message,
            } => {
                let offset = offset_of(&source, line, column);
                CliError::ParseError {
                    message,
                    src: NamedSource::new(filename, source),
                    span: (offset, 0).into(),
                }
            }
            other => CliError::InvalidProgram {
                message: other.to_string(),
            },
        }
    }
}

impl From<SimError> for CliError {
    fn from(e: SimError) -> Self {
        match e {
            SimError::Model(e) => CliError::InvalidProgram {
                message: e.to_string(),
            },
            SimError::Explore(e) => CliError::ExploreError {
                message: e.to_string(),
            },
        }
    }
}

type CliResult<T> = Result<T, CliError>;

/// Byte offset of a 1-based line and column, clamped to the source.
fn offset_of(source: &str, line: usize, column: usize) -> usize {
    let start: usize = source
        .split_inclusive('\n')
        .take(line.saturating_sub(1))
        .map(str::len)
        .sum();
    (start + column.saturating_sub(1)).min(source.len())
}

#[derive(Parser)]
#[command(name = "evdpor", version)]
#[command(about = "Stateful partial-order reduction for event-driven programs", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Explore a program
    Run {
        /// Program file (JSON)
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Disable state reduction and run the exhaustive baseline
        #[arg(long)]
        no_reduction: bool,

        /// Wall-clock budget in seconds (0 = unlimited)
        #[arg(long, default_value = "0")]
        max_time: u64,

        /// Maximum transitions per execution (0 = unlimited)
        #[arg(long, default_value = "0")]
        max_depth: usize,

        /// Maximum events executed over the whole search (0 = unlimited)
        #[arg(long, default_value_t = DEFAULT_MAX_TRANSITIONS)]
        max_transitions: usize,

        /// Append the search summary to this file
        #[arg(long, value_name = "PATH")]
        report: Option<PathBuf>,

        /// Print the summary as JSON
        #[arg(long)]
        json: bool,

        /// Show verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Validate a program file
    Validate {
        /// Program file (JSON)
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Format a program file
    Format {
        /// Program file (JSON)
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Write output to file instead of stdout
        #[arg(short, long)]
        write: bool,
    },
}

fn main() {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(2)
                .build(),
        )
    }))
    .ok();

    let cli = Cli::parse();

    let filter = if matches!(&cli.command, Commands::Run { verbose: true, .. }) {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Run {
            file,
            no_reduction,
            max_time,
            max_depth,
            max_transitions,
            report,
            json,
            verbose,
        } => {
            let explore = ExploreConfig {
                state_reduction: !no_reduction,
                report_path: report,
                max_time_secs: max_time,
                max_depth,
            };
            let sim = SimConfig { max_transitions };
            cmd_run(&file, explore, sim, json, verbose)
        }
        Commands::Validate { file } => cmd_validate(&file),
        Commands::Format { file, write } => cmd_format(&file, write),
    };

    if let Err(e) = result {
        eprintln!("{:?}", miette::Report::new(e));
        std::process::exit(1);
    }
}

fn load(file: &Path) -> CliResult<Program> {
    let filename = file.display().to_string();
    let source = Arc::new(fs::read_to_string(file).map_err(|e| CliError::IoError {
        message: e.to_string(),
    })?);
    Program::from_json(&source).map_err(|e| CliError::from_model_error(e, source.clone(), &filename))
}

fn cmd_run(
    file: &Path,
    explore: ExploreConfig,
    config: SimConfig,
    json: bool,
    verbose: bool,
) -> CliResult<()> {
    info!("loading...");
    let program = load(file)?;

    info!(program = %program.name, events = program.event_count(), "exploring...");
    let start = Instant::now();
    let mut sim = Simulator::new(&program, explore, config)?;
    let outcome = sim.run()?;
    let elapsed = start.elapsed();

    if verbose {
        for (i, start) in sim.explorer().history().iter().enumerate() {
            let schedule: Vec<String> = start
                .schedule
                .iter()
                .map(|e| {
                    program
                        .events
                        .get(e.index())
                        .map_or_else(|| e.to_string(), |d| d.name.clone())
                })
                .collect();
            println!("  execution {}: {} [{}]", i, start.state, schedule.join(", "));
        }
    }

    let (result, summary, code) = match &outcome {
        RunOutcome::Complete { summary } => ("COMPLETE", summary, 0),
        RunOutcome::TransitionLimitReached { summary } => ("TRANSITION LIMIT REACHED", summary, 2),
    };

    if json {
        println!("{}", summary_json(result, summary, sim.machine().states_seen()));
    } else {
        println!();
        println!("Result: {}", result);
        for line in summary.to_string().lines() {
            println!("  {}", line);
        }
        println!("  States seen: {}", sim.machine().states_seen());
        println!("  Time: {:.2}s", elapsed.as_secs_f64());
    }

    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}

fn summary_json(result: &str, summary: &SearchSummary, states: usize) -> serde_json::Value {
    serde_json::json!({
        "result": result,
        "state_reduction": summary.state_reduction,
        "events": summary.events,
        "transitions": summary.transitions,
        "unique_transitions": summary.unique_transitions,
        "executions": summary.executions,
        "backtrack_points": summary.backtrack_points,
        "states": states,
    })
}

fn cmd_validate(file: &Path) -> CliResult<()> {
    let program = load(file)?;
    println!(
        "program {}: {} variables, {} events",
        program.name,
        program.variables.len(),
        program.event_count()
    );
    println!("validate: ok");
    Ok(())
}

fn cmd_format(file: &Path, write: bool) -> CliResult<()> {
    let program = load(file)?;
    let formatted = program
        .to_json_pretty()
        .map_err(|e| CliError::InvalidProgram {
            message: e.to_string(),
        })?;

    if write {
        fs::write(file, format!("{formatted}\n")).map_err(|e| CliError::IoError {
            message: e.to_string(),
        })?;
        info!("formatted {}", file.display());
    } else {
        println!("{}", formatted);
    }
    Ok(())
}
