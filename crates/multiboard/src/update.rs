use crate::ProjectArgs;
use anyhow::{Result, bail};
use clap::Args;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use multiboard_core::{MultiBoardManager, UpdateSummary};

#[derive(Args, Debug)]
pub struct UpdateArgs {
    /// Board to update
    #[arg(required_unless_present = "all", conflicts_with = "all")]
    pub board: Option<String>,

    /// Update every board in turn
    #[arg(long)]
    pub all: bool,

    #[command(flatten)]
    pub project: ProjectArgs,
}

pub fn execute(args: UpdateArgs) -> Result<()> {
    let mut manager = args.project.open()?;
    let boards: Vec<String> = match args.board {
        Some(board) => vec![board],
        None => manager.project().boards.keys().cloned().collect(),
    };
    if boards.is_empty() {
        bail!("No boards to update");
    }

    let mut failed = Vec::new();
    for name in &boards {
        match update_one(&mut manager, name) {
            Ok(summary) => print_summary(name, &summary),
            Err(e) if boards.len() > 1 => {
                eprintln!("{} {name}: {e:#}", "Error:".red());
                failed.push(name.as_str());
            }
            Err(e) => return Err(e),
        }
    }
    if !failed.is_empty() {
        bail!("{} of {} boards failed: {}", failed.len(), boards.len(), failed.join(", "));
    }
    Ok(())
}

fn update_one(manager: &mut MultiBoardManager, name: &str) -> Result<UpdateSummary> {
    let bar = ProgressBar::new(100);
    bar.set_style(
        ProgressStyle::with_template("{prefix:>12.cyan.bold} [{bar:30}] {pos:>3}% {msg}")?
            .progress_chars("=> "),
    );
    bar.set_prefix(name.to_string());

    let mut report = |percent: u8, message: &str| {
        bar.set_position(u64::from(percent));
        bar.set_message(message.to_string());
    };
    let result = manager.update_board(name, &mut report);
    bar.finish_and_clear();
    Ok(result?)
}

fn print_summary(name: &str, summary: &UpdateSummary) {
    println!("{} {}", "Updated".green().bold(), name.bold());
    for line in summary.to_string().lines() {
        println!("  {line}");
    }
    let nets = summary.nets;
    if nets.missing_pads > 0 {
        println!(
            "  {} {} netlist pins have no matching pad",
            "Warning:".yellow(),
            nets.missing_pads
        );
    }
    log::debug!("{name}: {} nets created, {} pads connected", nets.created, nets.pads);
}
