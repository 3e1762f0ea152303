use std::path::PathBuf;
use thiserror::Error;

/// Errors from reconciling a board with the schematic
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("Board '{0}' not found")]
    UnknownBoard(String),

    #[error("PCB not found: {0}")]
    MissingDocument(String),

    #[error("No root schematic configured")]
    NoSchematic,

    #[error("Failed to export netlist from schematic: {0:#}")]
    NetlistExport(anyhow::Error),

    #[error("Failed to load PCB {}: {source:#}", path.display())]
    Document {
        path: PathBuf,
        source: anyhow::Error,
    },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Errors from editing the board list
#[derive(Debug, Error)]
pub enum BoardError {
    #[error("Board '{0}' already exists")]
    AlreadyExists(String),

    #[error("Board '{0}' not found")]
    NotFound(String),

    #[error("PCB file already exists: {0}")]
    PcbExists(String),

    #[error("Board name must contain at least one letter or digit")]
    InvalidName,

    #[error("Board '{board}' has no port '{port}'")]
    UnknownPort { board: String, port: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
