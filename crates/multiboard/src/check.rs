use crate::ProjectArgs;
use anyhow::{Result, bail};
use clap::Args;
use colored::Colorize;
use comfy_table::{Attribute, Cell, ContentArrangement, Table, presets};
use indicatif::ProgressBar;
use multiboard_core::ConnectivityReport;
use std::time::Duration;

#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Print every reported violation, not just the counts
    #[arg(short, long)]
    pub verbose: bool,

    #[command(flatten)]
    pub project: ProjectArgs,
}

pub fn execute(args: CheckArgs) -> Result<()> {
    multiboard_kicad::check_kicad_installed()?;
    let manager = args.project.open()?;
    if manager.project().boards.is_empty() {
        bail!("No boards to check");
    }

    let spinner = ProgressBar::new_spinner();
    spinner.enable_steady_tick(Duration::from_millis(100));
    let mut report_progress = |_: u8, message: &str| spinner.set_message(message.to_string());
    let report = manager.check_connectivity(&mut report_progress);
    spinner.finish_and_clear();

    print_report(&report, args.verbose);
    if !report.is_clean() {
        bail!("Connectivity check failed");
    }
    println!("{}", "All boards clean".green().bold());
    Ok(())
}

fn print_report(report: &ConnectivityReport, verbose: bool) {
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_BORDERS_ONLY)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Board").add_attribute(Attribute::Bold),
            Cell::new("Violations").add_attribute(Attribute::Bold),
            Cell::new("On port nets").add_attribute(Attribute::Bold),
            Cell::new("Excluded").add_attribute(Attribute::Bold),
        ]);
    for (name, health) in &report.boards {
        let violations = match health.violations {
            0 => "-".dimmed(),
            n => n.to_string().red(),
        };
        table.add_row(vec![
            Cell::new(name),
            Cell::new(violations),
            Cell::new(health.ignored),
            Cell::new(health.excluded),
        ]);
    }
    println!("{table}");

    if verbose {
        for (name, health) in &report.boards {
            if health.details.is_empty() {
                continue;
            }
            println!("{}", name.bold());
            for violation in &health.details {
                println!("  {}", violation.summary());
                for item in &violation.items {
                    println!("    {}", item.description.dimmed());
                }
            }
            if health.violations > health.details.len() {
                println!("  ... and {} more", health.violations - health.details.len());
            }
        }
    }

    for unmatched in &report.cross_board {
        println!("{} {unmatched}", "Port:".yellow());
    }
    for warning in &report.warnings {
        eprintln!("{} {warning}", "Warning:".yellow());
    }
    for error in &report.errors {
        eprintln!("{} {error}", "Error:".red());
    }
}
