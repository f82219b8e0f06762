//! CLI entrypoint for the dlbind probe harness.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use dlbind_abi::Mode;
use dlbind_harness::constants::ConstantsReport;
use dlbind_harness::structured_log::{LogEmitter, validate_log_file};
use dlbind_harness::{HarnessError, ProbePlan, logging, run_probe};

/// Probe tooling for dlbind.
#[derive(Debug, Parser)]
#[command(name = "dlbind-harness")]
#[command(about = "Open shared objects, resolve symbols, and record what the loader said")]
struct Cli {
    /// Diagnostic level for stderr (overridden by RUST_LOG).
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Open a library, resolve symbols, close it, and report.
    Probe {
        /// Library name or path. Omit to probe the main program.
        #[arg(long)]
        library: Option<String>,
        /// Symbol to resolve (repeatable).
        #[arg(long = "symbol")]
        symbols: Vec<String>,
        /// dlopen mode: `lazy`, `now`, an `RTLD_*` name, or an integer.
        #[arg(long, value_parser = parse_mode)]
        mode: Option<Mode>,
        /// OR `RTLD_GLOBAL` into the mode.
        #[arg(long)]
        global: bool,
        /// Append the platform suffix (`.so`, `.dylib`) when missing.
        #[arg(long)]
        suffix: bool,
        /// Run id used in trace ids.
        #[arg(long, default_value = "probe")]
        run_id: String,
        /// Structured JSONL log output path.
        #[arg(long)]
        log: Option<PathBuf>,
        /// JSON report output path (if omitted, prints to stdout).
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Print mode constants, pseudo-handles and naming rules as JSON.
    Constants {
        /// Output path (if omitted, prints to stdout).
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Validate a structured JSONL log against the schema.
    ValidateLog {
        #[arg(long)]
        log: PathBuf,
    },
}

fn parse_mode(raw: &str) -> Result<Mode, String> {
    Mode::parse(raw).map_err(|e| e.to_string())
}

fn write_or_print(output: Option<&PathBuf>, body: &str) -> Result<(), HarnessError> {
    match output {
        Some(path) => {
            std::fs::write(path, body)?;
            eprintln!("Wrote {}", path.display());
        }
        None => println!("{body}"),
    }
    Ok(())
}

fn main() -> Result<(), HarnessError> {
    let cli = Cli::parse();
    logging::init(&cli.log_level)?;

    match cli.command {
        Command::Probe {
            library,
            symbols,
            mode,
            global,
            suffix,
            run_id,
            log,
            output,
        } => {
            let mut plan = ProbePlan::new(library, run_id)
                .with_symbols(symbols)
                .with_suffix(suffix);
            let mode = match (mode, global) {
                (Some(mode), true) => Some(mode | Mode::GLOBAL),
                (None, true) => Some(dlbind_core::default_mode() | Mode::GLOBAL),
                (mode, false) => mode,
            };
            if let Some(mode) = mode {
                plan = plan.with_mode(mode);
            }

            let outcome = run_probe(&plan);

            if let Some(log_path) = log {
                let mut emitter = LogEmitter::to_file(&log_path, &plan.run_id)?;
                for entry in outcome.entries {
                    emitter.emit_entry(entry)?;
                }
                emitter.flush()?;
                eprintln!("Wrote structured log to {}", log_path.display());
            }

            write_or_print(output.as_ref(), &outcome.report.to_json()?)?;

            if let Some(summary) = outcome.report.failure_summary() {
                return Err(HarnessError::ProbeFailed(summary));
            }
        }
        Command::Constants { output } => {
            let report = ConstantsReport::collect();
            write_or_print(output.as_ref(), &report.to_json()?)?;
        }
        Command::ValidateLog { log } => {
            let (lines, errors) = validate_log_file(&log)?;
            for err in &errors {
                eprintln!("{err}");
            }
            if !errors.is_empty() {
                return Err(HarnessError::InvalidLog {
                    path: log.display().to_string(),
                    count: errors.len(),
                });
            }
            eprintln!("{}: {lines} line(s) valid", log.display());
        }
    }

    Ok(())
}
