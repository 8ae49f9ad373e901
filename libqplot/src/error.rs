use std::path::PathBuf;
use thiserror::Error;

use super::parse_status::ParseStatus;

#[derive(Debug, Error)]
pub enum FormatError {
    #[error("Could not classify {0:?}; no known measurement format matched")]
    UnrecognisedFormat(PathBuf),
    #[error("Could not open measurement file because file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("Format sniffing failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum TableError {
    #[error("Numeric table failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Numeric table has a non-numeric token {1:?} on line {0}")]
    ParsingError(usize, String),
    #[error("Numeric table row on line {0} has {2} columns; expected {1}")]
    RaggedRow(usize, usize, usize),
    #[error("Numeric table contains no data rows")]
    Empty,
}

#[derive(Debug, Error)]
pub enum ShapeError {
    #[error("Shape line is missing or malformed: {0:?}")]
    MalformedShape(String),
}

#[derive(Debug, Error)]
pub enum SidecarError {
    #[error("No metadata sidecar found at {0:?}")]
    SidecarMissing(PathBuf),
    #[error("Metadata sidecar did not match any known layout")]
    SidecarShapeUnknown,
    #[error("Metadata sidecar failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Metadata sidecar failed to parse JSON: {0}")]
    ParsingError(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum HintError {
    #[error("Axis hint field {0} has non-numeric value {1:?}")]
    InvalidAxisHint(String, String),
    #[error("Axis hint collector went away before submitting")]
    Abandoned,
}

#[derive(Debug, Error)]
pub enum LogError {
    #[error("Instrument log has no step channel with more than one value")]
    NoSweepAxes,
    #[error("Instrument log reader is not available in this build (enable the `labber` feature)")]
    OptionalBackendUnavailable,
    #[error("Instrument log has no channel named {0:?}")]
    UnknownChannel(String),
    #[error("Instrument log channel {0:?} has inconsistent data shape")]
    ShapeMismatch(String),
    #[cfg(feature = "labber")]
    #[error("Instrument log failed due to HDF5 error: {0}")]
    HDF5Error(#[from] hdf5::Error),
}

#[derive(Debug, Error)]
pub enum BufferError {
    #[error("Buffer failed due to format error: {0}")]
    FormatError(#[from] FormatError),
    #[error("Buffer failed due to table error: {0}")]
    TableError(#[from] TableError),
    #[error("Buffer failed due to shape error: {0}")]
    ShapeError(#[from] ShapeError),
    #[error("Buffer failed due to axis hint error: {0}")]
    HintError(#[from] HintError),
    #[error("Buffer failed due to instrument log error: {0}")]
    LogError(#[from] LogError),
    #[error("Buffer data was requested before it was ready")]
    NotReady,
    #[error("Matrix index {0} is out of range; buffer has {1} matrices")]
    MatrixIndex(usize, usize),
    #[error("Buffer failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration as file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("Config failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Config failed to parse YAML: {0}")]
    ParsingError(#[from] serde_yaml::Error),
}

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("Discovery failed because data path {0:?} is not a directory")]
    BadDataPath(PathBuf),
    #[error("Discovery failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("Processor failed due to Buffer error: {0}")]
    BufferError(#[from] BufferError),
    #[error("Processor failed due to Send error: {0}")]
    SendError(#[from] std::sync::mpsc::SendError<ParseStatus>),
    #[error("Processor failed because a worker thread panicked")]
    WorkerPanic,
}
