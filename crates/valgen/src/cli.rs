use crate::config::ValgenConfig;
use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;

/// Generate Go validators and tests from Pydantic model definitions.
#[derive(Debug, Parser)]
#[command(name = "valgen", version, about)]
pub struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace). RUST_LOG overrides.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Translate every discovered model unit and write the Go package.
    Convert(ConvertArgs),
    /// Print the resolved schema of one model file as JSON.
    Schema(SchemaArgs),
}

#[derive(Debug, Args)]
pub struct ConvertArgs {
    /// Root directory scanned for model files.
    #[arg(long)]
    pub path: Option<PathBuf>,

    /// Model file name that makes its directory a unit.
    #[arg(long)]
    pub file: Option<String>,

    /// Output directory for generated Go files.
    #[arg(long)]
    pub dest: Option<PathBuf>,

    /// Shared rules module.
    #[arg(long)]
    pub common: Option<PathBuf>,

    /// Directory scanned for `test_<unit>.py` files.
    #[arg(long)]
    pub tests: Option<PathBuf>,

    /// Go package name of generated files.
    #[arg(long)]
    pub package: Option<String>,

    /// Config file (default: ./valgen.toml when present).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl ConvertArgs {
    /// Load the config and apply flag overrides.
    pub fn settings(&self) -> anyhow::Result<ValgenConfig> {
        let mut config = ValgenConfig::load(self.config.as_deref())?;
        if let Some(path) = &self.path {
            config.input.path = path.clone();
        }
        if let Some(file) = &self.file {
            config.input.file = file.clone();
        }
        if let Some(common) = &self.common {
            config.input.common = Some(common.clone());
        }
        if let Some(tests) = &self.tests {
            config.input.tests = Some(tests.clone());
        }
        if let Some(dest) = &self.dest {
            config.output.dest = dest.clone();
        }
        if let Some(package) = &self.package {
            config.output.package = package.clone();
        }
        config.validate()?;
        Ok(config)
    }
}

#[derive(Debug, Args)]
pub struct SchemaArgs {
    /// Model file to resolve.
    pub file: PathBuf,

    /// Shared rules module.
    #[arg(long)]
    pub common: Option<PathBuf>,

    /// Config file (default: ./valgen.toml when present).
    #[arg(long)]
    pub config: Option<PathBuf>,
}
