//! Error types for the sediment-thickness pipeline.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type.
///
/// Variants split into two families: per-item errors (missing data,
/// numerical degeneracy) that only cost the current trace or station, and
/// hard failures (config, I/O on outputs) that abort the run.
#[derive(Error, Debug)]
pub enum Error {
    // Configuration
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid filter: {0}")]
    InvalidFilter(String),

    // Data access
    #[error("no waveform data for station {station}")]
    NoData { station: String },

    #[error("incomplete cache at {path:?}: completion marker missing")]
    IncompleteCache { path: PathBuf },

    // Numerical
    #[error("degenerate input: {0}")]
    Degenerate(String),

    #[error("length mismatch: {left} vs {right}")]
    LengthMismatch { left: usize, right: usize },

    #[error("receiver functions of station {station} cannot be stacked (ragged sample counts)")]
    RaggedStack { station: String },

    #[error("no local extremum found: {0}")]
    NoExtremum(String),

    // File formats
    #[error("line {line}: {reason}")]
    Parse { line: usize, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("npy read error: {0}")]
    NpyRead(#[from] ndarray_npy::ReadNpyError),

    #[error("npy write error: {0}")]
    NpyWrite(#[from] ndarray_npy::WriteNpyError),
}

impl Error {
    /// True for errors that only invalidate the current trace or station.
    pub fn is_skip(&self) -> bool {
        matches!(
            self,
            Error::NoData { .. }
                | Error::IncompleteCache { .. }
                | Error::Degenerate(_)
                | Error::LengthMismatch { .. }
                | Error::RaggedStack { .. }
                | Error::NoExtremum(_)
        )
    }
}
