mod inspect;
mod normalize;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "fixturize")]
#[command(version)]
#[command(about = "Build and inspect dependency-ordered SQL test fixtures", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Parse a dump file and display block statistics
    Inspect {
        /// Dump file to inspect
        file: PathBuf,
    },

    /// Rewrite a dump in canonical form (one insert per line)
    Normalize {
        /// Dump file to normalize
        file: PathBuf,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

pub fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Inspect { file } => inspect::run(file),
        Commands::Normalize { file, output } => normalize::run(file, output),
    }
}
