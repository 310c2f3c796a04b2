mod commands;
mod config;

use clap::{Parser, Subcommand};
use colored::Colorize;
use commands::{place, replay, PlaceArgs, ReplayArgs};
use tracing_subscriber::EnvFilter;

/// Page builder selection engine: replay editor traces and check toolbar placement
#[derive(Parser, Debug)]
#[command(name = "pagebuilder")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Engine log verbosity (-v info, -vv debug); RUST_LOG wins when set
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Replay a recorded trace of editor events through a session
    Replay(ReplayArgs),

    /// Compute where a toolbar lands next to a target rect
    Place(PlaceArgs),
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = std::env::current_dir()
        .map_err(|e| anyhow::anyhow!("Cannot get current directory: {}", e))
        .and_then(|cwd| {
            let cwd = cwd.display().to_string();
            match cli.command {
                Command::Replay(args) => replay(args, &cwd),
                Command::Place(args) => place(args, &cwd),
            }
        });

    if let Err(err) = result {
        eprintln!();
        eprintln!("{} {:#}", "Error:".red().bold(), err);
        eprintln!();
        std::process::exit(1);
    }
}
