use std::fmt;

use thiserror::Error;

/// I/O errors that can occur when reading from or writing to storage
#[derive(Debug, Clone, Error)]
pub enum IoError {
    /// Error from S3 or S3-compatible storage
    #[error("S3 error: {0}")]
    S3(String),

    /// Network or connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Object not found
    #[error("Object not found: {0}")]
    NotFound(String),

    /// Local filesystem error
    #[error("Filesystem error on {path}: {message}")]
    Filesystem { path: String, message: String },
}

impl IoError {
    /// Whether this error means the object simply does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, IoError::NotFound(_))
    }
}

/// Errors raised while loading or validating a `.vsvi` manifest.
///
/// Both variants are fatal: nothing is listed or written when the manifest
/// cannot be trusted.
#[derive(Debug, Clone, Error)]
pub enum ManifestError {
    /// The manifest could not be reached (missing file, missing object, credentials)
    #[error("Manifest not found at {location}: {reason}")]
    NotFound { location: String, reason: String },

    /// The manifest was read but is not a usable description of the dataset
    #[error("Manifest is malformed: {0}")]
    Malformed(String),
}

/// Errors from compiling or applying a filename template.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    /// A `%` conversion other than `%d` / `%i`
    #[error("Unsupported placeholder '%{conversion}' in template '{template}'")]
    UnsupportedPlaceholder { template: String, conversion: char },

    /// A `%` at the end of the template with no conversion
    #[error("Dangling '%' at end of template '{0}'")]
    DanglingPercent(String),

    /// The final path segment carries no integer placeholder
    #[error("Template '{0}' has no integer placeholder in its file name")]
    NoPlaceholders(String),

    /// The compiled pattern was rejected by the regex engine
    #[error("Template '{template}' compiled to an invalid pattern: {message}")]
    Pattern { template: String, message: String },

    /// The parameter sequence does not describe the template's placeholders
    #[error("Invalid parameter sequence '{sequence}': {reason}")]
    InvalidSequence { sequence: String, reason: String },

    /// A file name does not match the template
    #[error("File name '{name}' does not match template '{template}'")]
    Mismatch { name: String, template: String },
}

/// Grid axis of the source tiling scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GridAxis {
    Section,
    Row,
    Column,
}

impl fmt::Display for GridAxis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GridAxis::Section => write!(f, "section"),
            GridAxis::Row => write!(f, "row"),
            GridAxis::Column => write!(f, "column"),
        }
    }
}

/// Errors from mapping grid indices onto voxel space.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GridError {
    /// Parsed index lies outside the manifest's declared bounds
    #[error("{axis} index {value} outside declared range [{min}, {max}]")]
    OutOfRange {
        axis: GridAxis,
        value: u64,
        min: i64,
        max: i64,
    },
}

/// Errors reported by a volume sink.
#[derive(Debug, Clone, Error)]
pub enum SinkError {
    /// Underlying storage failure
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// `write_region` called before `initialize`
    #[error("Volume sink has not been initialized")]
    NotInitialized,

    /// The sink was already initialized with a different volume description
    #[error("Volume sink already initialized with a different layout: {0}")]
    Conflict(String),

    /// The region lies entirely outside the volume
    #[error("Region origin {origin:?} shape {shape:?} lies outside volume of size {size:?}")]
    OutOfBounds {
        origin: [u64; 3],
        shape: [u64; 3],
        size: [u64; 3],
    },

    /// The pixel buffer does not match the region it is written to
    #[error("Buffer of {width}x{height} does not match region shape {shape:?}")]
    ShapeMismatch {
        width: u32,
        height: u32,
        shape: [u64; 3],
    },

    /// The pixel buffer uses a different sample width than the volume
    #[error("Sample type mismatch: volume is {expected}, buffer is {actual}")]
    SampleTypeMismatch { expected: String, actual: String },

    /// An existing chunk has an unexpected size
    #[error("Existing chunk {key} has {actual} bytes, expected {expected}")]
    CorruptChunk {
        key: String,
        expected: usize,
        actual: usize,
    },

    /// Metadata could not be serialized
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Per-tile failures.
///
/// These are caught at the worker boundary, logged with the offending key and
/// counted in the run summary. They never abort a run.
#[derive(Debug, Clone, Error)]
pub enum TileError {
    /// The file name does not match the manifest's template
    #[error("{key}: {source}")]
    FilenameMismatch {
        key: String,
        #[source]
        source: TemplateError,
    },

    /// Parsed indices lie outside the declared grid
    #[error("{key}: {source}")]
    CoordinateOutOfRange {
        key: String,
        #[source]
        source: GridError,
    },

    /// The tile could not be read from the source store
    #[error("{key}: fetch failed: {source}")]
    FetchFailed {
        key: String,
        #[source]
        source: IoError,
    },

    /// The tile bytes are not a decodable image
    #[error("{key}: decode failed: {message}")]
    DecodeFailed { key: String, message: String },

    /// The sink rejected or failed to store the tile
    #[error("{key}: write failed: {source}")]
    WriteFailed {
        key: String,
        #[source]
        source: SinkError,
    },

    /// The worker task panicked or was aborted
    #[error("{key}: worker task failed: {message}")]
    TaskFailed { key: String, message: String },
}

/// Grouping of [`TileError`] variants for summaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TileErrorKind {
    FilenameMismatch,
    CoordinateOutOfRange,
    FetchFailed,
    DecodeFailed,
    WriteFailed,
    TaskFailed,
}

impl fmt::Display for TileErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TileErrorKind::FilenameMismatch => "filename mismatch",
            TileErrorKind::CoordinateOutOfRange => "coordinate out of range",
            TileErrorKind::FetchFailed => "fetch failed",
            TileErrorKind::DecodeFailed => "decode failed",
            TileErrorKind::WriteFailed => "write failed",
            TileErrorKind::TaskFailed => "task failed",
        };
        f.write_str(name)
    }
}

impl TileError {
    /// The summary bucket this error is counted in.
    pub fn kind(&self) -> TileErrorKind {
        match self {
            TileError::FilenameMismatch { .. } => TileErrorKind::FilenameMismatch,
            TileError::CoordinateOutOfRange { .. } => TileErrorKind::CoordinateOutOfRange,
            TileError::FetchFailed { .. } => TileErrorKind::FetchFailed,
            TileError::DecodeFailed { .. } => TileErrorKind::DecodeFailed,
            TileError::WriteFailed { .. } => TileErrorKind::WriteFailed,
            TileError::TaskFailed { .. } => TileErrorKind::TaskFailed,
        }
    }

    /// The key of the tile that failed.
    pub fn key(&self) -> &str {
        match self {
            TileError::FilenameMismatch { key, .. }
            | TileError::CoordinateOutOfRange { key, .. }
            | TileError::FetchFailed { key, .. }
            | TileError::DecodeFailed { key, .. }
            | TileError::WriteFailed { key, .. }
            | TileError::TaskFailed { key, .. } => key,
        }
    }
}

/// Fatal errors that abort an ingestion run before any tile is written.
#[derive(Debug, Clone, Error)]
pub enum IngestError {
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error("Volume sink initialization failed: {0}")]
    SinkInitialization(#[source] SinkError),

    #[error("Invalid location '{0}'")]
    InvalidLocation(String),
}
