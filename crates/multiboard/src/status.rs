use crate::ProjectArgs;
use anyhow::Result;
use clap::Args;
use colored::Colorize;
use comfy_table::{ContentArrangement, Table, presets};
use std::collections::BTreeMap;

#[derive(Args, Debug)]
pub struct StatusArgs {
    #[command(flatten)]
    pub project: ProjectArgs,
}

#[derive(Args, Debug)]
pub struct NetsArgs {
    /// Board name
    pub board: String,

    #[command(flatten)]
    pub project: ProjectArgs,
}

pub fn execute_status(args: StatusArgs) -> Result<()> {
    let mut manager = args.project.open()?;
    let status = manager.status()?;

    let mut per_board: BTreeMap<&str, usize> = manager
        .project()
        .boards
        .keys()
        .map(|name| (name.as_str(), 0))
        .collect();
    for board in status.placed.values() {
        *per_board.entry(board.as_str()).or_default() += 1;
    }

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_BORDERS_ONLY)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Board", "Components"]);
    for (board, count) in &per_board {
        table.add_row(vec![board.to_string(), count.to_string()]);
    }
    println!("{table}");

    println!(
        "Placed {} of {} components",
        status.total - status.unplaced.len().min(status.total),
        status.total
    );
    if !status.unplaced.is_empty() {
        let unplaced: Vec<&str> = status.unplaced.iter().map(String::as_str).collect();
        println!("{} {}", "Unplaced:".yellow(), unplaced.join(", "));
    }
    Ok(())
}

pub fn execute_nets(args: NetsArgs) -> Result<()> {
    let manager = args.project.open()?;
    let nets = manager.board_nets(&args.board)?;
    if nets.is_empty() {
        println!("No connected pads on '{}'", args.board);
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_BORDERS_ONLY)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Net", "Pads"]);
    for (net, pads) in &nets {
        let pads: Vec<&str> = pads.iter().map(String::as_str).collect();
        table.add_row(vec![net.clone(), pads.join(" ")]);
    }
    println!("{table}");
    Ok(())
}
