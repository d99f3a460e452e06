mod cli;
mod config;
mod discover;
mod pipeline;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Command, SchemaArgs};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;
use valgen_translate::{NameTable, parse_models, resolve};

/// Log to stderr at a level picked from `-v`, unless RUST_LOG is set.
fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn schema(args: &SchemaArgs) -> Result<()> {
    let config = config::ValgenConfig::load(args.config.as_deref())?;
    let rules = pipeline::load_rules(args.common.as_deref().or(config.input.common.as_deref()))?;
    let source = discover::read_source(&args.file)?;
    let unit = args
        .file
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let graph = parse_models(&source.text, &source.path, &config.parse_options())?;
    let names = NameTable::build([(unit.as_str(), &graph)]);
    let resolved = resolve(&graph, &unit, &rules, &names)?;
    let json = serde_json::to_string_pretty(&resolved).context("serialising schema")?;
    println!("{json}");
    Ok(())
}

fn run(cli: &Cli) -> Result<ExitCode> {
    match &cli.command {
        Command::Convert(args) => {
            let config = args.settings()?;
            let summary = pipeline::run(&config)?;
            for failure in &summary.failures {
                tracing::debug!(unit = %failure.unit, kind = %failure.error.kind(), "unit failed");
                eprintln!("error: {}", failure.error);
            }
            if summary.is_success() {
                Ok(ExitCode::SUCCESS)
            } else {
                eprintln!(
                    "{} unit(s) failed, {} written",
                    summary.failures.len(),
                    summary.written.len()
                );
                Ok(ExitCode::FAILURE)
            }
        }
        Command::Schema(args) => {
            schema(args)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    match run(&cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
