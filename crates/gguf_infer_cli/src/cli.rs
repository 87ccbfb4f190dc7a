use std::path::PathBuf;

use crate::inference::RunArgs;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(author, version, about = "GGUF inference toolchain", long_about = None)]
pub struct Cli {
    /// Path to a JSON engine settings file; fields it omits keep their
    /// defaults (partial validation, F16 compute, 4096-token prompt cap).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Load a model and materialize every weight, failing loudly on any
    /// format, numerical, or resource error.
    Load(LoadArgs),

    /// Run an interactive completion loop against a loaded model.
    Run(RunArgs),

    /// Parse a container and print its header, metadata, and tensor table
    /// without materializing any weight.
    Inspect(InspectArgs),
}

#[derive(clap::Args, Debug, Clone)]
pub struct LoadArgs {
    /// Path to a `.gguf` file, or a directory containing exactly one.
    #[arg(short, long)]
    pub model: String,
}

#[derive(clap::Args, Debug, Clone)]
pub struct InspectArgs {
    /// Path to a `.gguf` file, or a directory containing exactly one.
    #[arg(short, long)]
    pub model: String,

    /// Print every tensor descriptor, not just the count.
    #[arg(long, default_value_t = false)]
    pub verbose: bool,
}
