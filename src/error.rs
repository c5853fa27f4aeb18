use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

use crate::domain::EntityKind;

#[derive(Debug, Error, Diagnostic)]
pub enum BraceError {
    #[error("giving up on {url} after {attempts} attempt(s): {last_error}")]
    FetchExhausted {
        url: String,
        attempts: u32,
        last_error: String,
    },

    #[error("{url} returned status {status}")]
    HttpStatus { url: String, status: u16 },

    #[error("locator page {url} has no archive link: {reason}")]
    ParseFailure { url: String, reason: String },

    #[error("downloaded archive is not readable: {0}")]
    ArchiveCorrupt(String),

    #[error("unknown {kind}: {identifier}")]
    NotFound { kind: EntityKind, identifier: String },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("missing config file brace.json in current directory")]
    MissingConfig,

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("invalid year range {from}..={to}")]
    #[diagnostic(help("years must be ascending and within the published range"))]
    InvalidYearRange { from: i32, to: i32 },

    #[error("HTTP client error: {0}")]
    Http(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}

/// Reasons a single CSV row is refused by the normalizer.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("unknown station '{0}'")]
    UnknownStation(String),

    #[error("unknown region code {0}")]
    UnknownRegion(u32),

    #[error("station '{station}' belongs to region {found}, not {expected}")]
    StationRegionMismatch {
        station: String,
        expected: u32,
        found: u32,
    },

    #[error("unknown pollutant '{0}'")]
    UnknownPollutant(String),

    #[error("row pollutant {found} does not match archive pollutant {expected}")]
    PollutantMismatch { expected: String, found: String },

    #[error("malformed timestamp '{0}' (expected DD-MM-YYYY HH)")]
    BadTimestamp(String),

    #[error("malformed quantity '{0}'")]
    BadQuantity(String),

    #[error("expected 4 fields, found {found}")]
    FieldCount { found: usize },
}

impl ValidationError {
    /// Stable label used to bucket drops in the run report.
    pub fn kind(&self) -> &'static str {
        match self {
            ValidationError::UnknownStation(_) => "unknown_station",
            ValidationError::UnknownRegion(_) => "unknown_region",
            ValidationError::StationRegionMismatch { .. } => "station_region_mismatch",
            ValidationError::UnknownPollutant(_) => "unknown_pollutant",
            ValidationError::PollutantMismatch { .. } => "pollutant_mismatch",
            ValidationError::BadTimestamp(_) => "bad_timestamp",
            ValidationError::BadQuantity(_) => "bad_quantity",
            ValidationError::FieldCount { .. } => "field_count",
        }
    }
}
