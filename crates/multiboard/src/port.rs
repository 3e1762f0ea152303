use crate::ProjectArgs;
use anyhow::Result;
use clap::{Args, Subcommand};
use colored::Colorize;
use multiboard_core::{Port, PortSide};

#[derive(Args, Debug)]
pub struct PortArgs {
    #[command(subcommand)]
    pub command: PortCommand,

    #[command(flatten)]
    pub project: ProjectArgs,
}

#[derive(Subcommand, Debug)]
pub enum PortCommand {
    /// Add a port, or replace one of the same name
    Set {
        board: String,
        name: String,

        /// Net carried by the port (defaults to the port name)
        #[arg(long, default_value = "")]
        net: String,

        /// Board edge: left, right, top or bottom
        #[arg(long, default_value = "right", value_parser = parse_side)]
        side: PortSide,

        /// Position along the edge, 0.0 to 1.0
        #[arg(long, default_value_t = 0.5)]
        position: f64,
    },

    /// Remove a port
    #[command(alias = "rm")]
    Remove { board: String, name: String },
}

fn parse_side(text: &str) -> Result<PortSide, String> {
    PortSide::parse(text).ok_or_else(|| format!("unknown side '{text}'"))
}

pub fn execute(args: PortArgs) -> Result<()> {
    let mut manager = args.project.open()?;
    match args.command {
        PortCommand::Set {
            board,
            name,
            net,
            side,
            position,
        } => {
            let port = Port {
                name,
                net,
                side,
                position,
            };
            let message = format!(
                "port {} on '{board}' ({} edge, net {})",
                port.name.bold(),
                port.side,
                port.effective_net()
            );
            manager.set_port(&board, port)?;
            println!("{} {message}", "Set".green());
        }
        PortCommand::Remove { board, name } => {
            manager.remove_port(&board, &name)?;
            println!("{} port {} from '{board}'", "Removed".green(), name.bold());
        }
    }
    Ok(())
}
