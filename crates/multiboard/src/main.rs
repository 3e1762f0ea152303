use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use env_logger::Env;
use multiboard_core::MultiBoardManager;
use std::path::PathBuf;

mod board;
mod check;
mod port;
mod status;
mod update;

#[derive(Parser)]
#[command(name = "multiboard")]
#[command(about = "Keep several KiCad boards in line with one schematic", long_about = None)]
#[command(version)]
struct Cli {
    /// Enable debug logging
    #[arg(short = 'd', long = "debug", global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the project's boards
    #[command(alias = "ls")]
    List(board::ListArgs),

    /// Create a new board
    New(board::NewArgs),

    /// Remove a board from the project (its files are kept)
    #[command(alias = "rm")]
    Remove(board::RemoveArgs),

    /// Update boards from the schematic
    #[command(alias = "u")]
    Update(update::UpdateArgs),

    /// Show which components are placed on which board
    Status(status::StatusArgs),

    /// Show the nets of one board
    Nets(status::NetsArgs),

    /// Run DRC on every board, ignoring nets that leave through ports
    Check(check::CheckArgs),

    /// Manage inter-board ports
    Port(port::PortArgs),
}

/// Where to look for the project.
#[derive(Args, Debug, Clone)]
pub struct ProjectArgs {
    /// Project directory, or any directory below it (defaults to the current
    /// directory)
    #[arg(short = 'C', long = "project", value_name = "DIR", global = true)]
    pub project: Option<PathBuf>,
}

impl ProjectArgs {
    pub fn open(&self) -> anyhow::Result<MultiBoardManager> {
        let start = match &self.project {
            Some(dir) => dir.clone(),
            None => std::env::current_dir()?,
        };
        let manager = MultiBoardManager::open(start);
        log::debug!("Using project at {}", manager.root().display());
        Ok(manager)
    }
}

fn main() {
    if let Err(e) = run() {
        eprintln!("{} {e}", "Error:".red());
        for cause in e.chain().skip(1) {
            eprintln!("  {cause}");
        }
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // RUST_LOG still wins over either default.
    let env = if cli.debug {
        Env::default().default_filter_or("debug")
    } else {
        Env::default().default_filter_or("warn")
    };
    env_logger::Builder::from_env(env).init();

    match cli.command {
        Commands::List(args) => board::execute_list(args),
        Commands::New(args) => board::execute_new(args),
        Commands::Remove(args) => board::execute_remove(args),
        Commands::Update(args) => update::execute(args),
        Commands::Status(args) => status::execute_status(args),
        Commands::Nets(args) => status::execute_nets(args),
        Commands::Check(args) => check::execute(args),
        Commands::Port(args) => port::execute(args),
    }
}
