mod commands;
mod formatting;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "recompiler")]
#[command(about = "Recompiles installed library packages in dependency order")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, default_value = "./node_modules", global = true)]
    base_path: PathBuf,

    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[arg(short, long, action, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile every entry point that has not been processed yet.
    Run(commands::RunArgs),
    /// List entry points and which formats are processed.
    Scan {
        #[arg(long, action)]
        json: bool,
    },
    /// Show processing order, invalid entry points and ignored dependencies.
    Graph {
        #[arg(long, action)]
        json: bool,
    },
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        "error"
    } else {
        match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    match cli.command {
        Commands::Run(args) => commands::cmd_run(cli.base_path, args)?,
        Commands::Scan { json } => commands::cmd_scan(cli.base_path, json)?,
        Commands::Graph { json } => commands::cmd_graph(cli.base_path, json)?,
    }

    Ok(())
}
