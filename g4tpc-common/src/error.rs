//! Common error types for G4TPC
//!
//! Fatal conditions (`ConfigInvalid`) stop a run before any event is simulated.
//! Everything else is reported through `tracing` by the caller and degraded
//! to a safe default, so the variants here double as the diagnostic payload.

use std::path::PathBuf;
use thiserror::Error;

/// Common result type for G4TPC operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across the G4TPC crates
#[derive(Error, Debug)]
pub enum Error {
    /// Missing required field, conflicting particle sources, non-positive geometry
    #[error("Configuration invalid: {0}")]
    ConfigInvalid(String),

    /// Input file could not be opened or read
    #[error("Unable to read {path:?}: {source}")]
    FileUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Malformed genie tracker line, reported with the parser state it was seen in
    #[error("Genie parse error at line {line_number} (state {state}): {reason}; line = {line:?}")]
    GenieParse {
        line_number: usize,
        line: String,
        state: String,
        reason: String,
    },

    /// Ancestry walk ended without reaching a kept particle
    #[error("Unknown ancestor for track {track_id} (parent {parent_id})")]
    UnknownAncestor { track_id: i32, parent_id: i32 },

    /// Daughter index past the end of a particle's daughter list
    #[error("Daughter index {index} out of range for track {track_id} ({count} daughters)")]
    DaughterOutOfRange {
        track_id: i32,
        index: usize,
        count: usize,
    },

    /// Wire-plane projection or hit downsampling rejected its input
    #[error("Readout error: {0}")]
    Readout(String),

    /// Output document could not be produced
    #[error("Output error: {0}")]
    Output(String),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True for errors that must abort the run before simulation starts
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::ConfigInvalid(_) | Error::Io(_))
    }
}
