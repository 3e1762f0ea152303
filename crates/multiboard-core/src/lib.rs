//! Multi-board KiCad projects.
//!
//! One schematic drives several board layouts, each hosting a disjoint
//! subset of the schematic's components. [`MultiBoardManager`] owns the
//! project configuration and keeps the boards in line with the schematic.

pub mod board;
pub mod config;
pub mod constants;
pub mod error;
pub mod footprint;
mod fs;
pub mod health;
pub mod library;
pub mod links;
pub mod manager;
pub mod netlist;
pub mod nets;
pub mod placement;
pub mod progress;
pub mod reconcile;
pub mod tools;

pub use config::{Board, Port, PortSide, Project};
pub use error::{BoardError, ReconcileError};
pub use health::{BoardHealth, ConnectivityReport};
pub use manager::{ManagerBuilder, MultiBoardManager, ProjectStatus};
pub use progress::{NoProgress, Progress};
pub use reconcile::UpdateSummary;
