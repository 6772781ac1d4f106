use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(name = "class-remapper")]
#[command(about = "Rename classes, methods and fields of a jar according to a mapping file")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Mapping file (JSON). Defaults to $CLASS_REMAPPER_MAPPINGS, then ./mappings.json.
    #[arg(long, value_name = "FILE")]
    pub mappings: Option<PathBuf>,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    /// Write a remapped copy of a jar.
    Remap {
        input: PathBuf,

        #[arg(short = 'o', long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Apply the mapping backwards (source names to target names).
        #[arg(long)]
        reverse: bool,

        /// Extra jars or class directories used to resolve supertypes.
        #[arg(long = "classpath", value_name = "PATH")]
        classpath: Vec<PathBuf>,

        #[arg(short = 'f', long, value_enum, default_value_t = OutputFormat::Json)]
        format: OutputFormat,

        /// Write the run report to a file instead of stdout.
        #[arg(long, value_name = "FILE")]
        report: Option<PathBuf>,
    },
    /// Validate the mapping file and print its statistics.
    Mappings,
    /// Translate one class name.
    Map {
        name: String,

        #[arg(long)]
        reverse: bool,
    },
}

#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum OutputFormat {
    Json,
    Text,
}
