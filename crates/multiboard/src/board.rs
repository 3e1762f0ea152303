use crate::ProjectArgs;
use anyhow::Result;
use clap::Args;
use colored::Colorize;
use comfy_table::{Cell, ContentArrangement, Table, presets};

#[derive(Args, Debug)]
pub struct ListArgs {
    #[command(flatten)]
    pub project: ProjectArgs,
}

#[derive(Args, Debug)]
pub struct NewArgs {
    /// Board name
    pub name: String,

    /// Free-form description stored in the project
    #[arg(short = 'm', long, default_value = "")]
    pub description: String,

    #[command(flatten)]
    pub project: ProjectArgs,
}

#[derive(Args, Debug)]
pub struct RemoveArgs {
    /// Board name
    pub name: String,

    #[command(flatten)]
    pub project: ProjectArgs,
}

pub fn execute_list(args: ListArgs) -> Result<()> {
    let manager = args.project.open()?;
    let project = manager.project();
    if project.boards.is_empty() {
        println!("No boards in {}", manager.root().display());
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_BORDERS_ONLY)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Board", "PCB", "Ports", "Description"]);
    for (name, board) in &project.boards {
        let pcb = if board.pcb_file(manager.root()).is_file() {
            board.pcb_path.normal()
        } else {
            format!("{} (missing)", board.pcb_path).red()
        };
        table.add_row(vec![
            Cell::new(name.bold()),
            Cell::new(pcb),
            Cell::new(board.ports.len()),
            Cell::new(&board.description),
        ]);
    }
    println!("{table}");

    for problem in project.problems() {
        eprintln!("{} {problem}", "Warning:".yellow());
    }
    Ok(())
}

pub fn execute_new(args: NewArgs) -> Result<()> {
    let mut manager = args.project.open()?;
    let relative = manager.create_board(&args.name, &args.description)?;
    println!("{} board '{}' at {relative}", "Created".green(), args.name);
    Ok(())
}

pub fn execute_remove(args: RemoveArgs) -> Result<()> {
    let mut manager = args.project.open()?;
    let board = manager.remove_board(&args.name)?;
    println!(
        "{} board '{}' ({} left on disk)",
        "Removed".green(),
        args.name,
        board.pcb_path
    );
    Ok(())
}
