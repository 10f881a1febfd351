//! Error types for emtfprep-core.

use thiserror::Error;

/// Result type alias for emtfprep operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for emtfprep operations.
///
/// Every variant except the ragged array errors ([`Error::RaggedWidth`],
/// [`Error::RaggedLength`] and [`Error::InvalidRowSplits`]) and
/// [`Error::ConfigError`] signals a broken classification table or a
/// violated detector invariant.
/// These are not per-event conditions: callers abort the job.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Endcap must be +1 or -1.
    #[error("invalid endcap: {0} (expected +1 or -1)")]
    InvalidEndcap(i8),

    /// Trigger sector must be in [1, 6].
    #[error("invalid trigger sector: {0} (expected 1..=6)")]
    InvalidSector(i8),

    /// End-sector index must be in [0, 11].
    #[error("invalid end-sector index: {0} (expected 0..=11)")]
    InvalidEndSector(usize),

    /// Host lookup returned an id outside the host table.
    #[error("unknown host for {subsystem} station {station} ring {ring}")]
    UnknownHost {
        subsystem: &'static str,
        station: i8,
        ring: i8,
    },

    /// Chamber id outside the canonical chamber table.
    #[error("unknown chamber id: {0}")]
    UnknownChamber(i32),

    /// Bunch crossing outside the aggregation window.
    #[error("bunch crossing {bx} outside window [{min}, {max}]")]
    BxOutOfRange { bx: i8, min: i8, max: i8 },

    /// CSC chamber bucket with a multiplicity other than 1, 2 or 4.
    #[error("CSC chamber {chamber} at bx {bx} has {hits} hits (expected 1, 2 or 4)")]
    CscOccupancy { chamber: u8, bx: i8, hits: usize },

    /// Non-CSC chamber bucket above its physical multiplicity.
    #[error("chamber {chamber} at bx {bx} has {hits} hits (limit {limit})")]
    ChamberOccupancy {
        chamber: u8,
        bx: i8,
        hits: usize,
        limit: usize,
    },

    /// Record width does not match the ragged array width.
    #[error("record width mismatch: expected multiple of {expected}, got {actual}")]
    RaggedWidth { expected: usize, actual: usize },

    /// Scalar count that does not split into whole records.
    #[error("{len} values do not form whole records of width {width}")]
    RaggedLength { width: usize, len: usize },

    /// Row splits violate the ragged array contract.
    #[error("invalid row splits: {0}")]
    InvalidRowSplits(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    ConfigError(String),
}
