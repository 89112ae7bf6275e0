use std::collections::BTreeMap;
use std::fmt;

use crate::error::{IoError, TileError, TileErrorKind};

/// Failed tiles kept verbatim in the summary; the rest are only counted.
pub const MAX_RECORDED_FAILURES: usize = 1000;

/// A tile that could not be ingested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedTile {
    pub key: String,
    pub kind: TileErrorKind,
    pub message: String,
}

/// Outcome of an ingestion run.
#[derive(Debug, Clone, Default)]
pub struct IngestSummary {
    /// Image tiles handed to a worker
    pub attempted: usize,
    /// Tiles written to the destination
    pub written: usize,
    /// Listed entries that are not image files
    pub skipped: usize,
    /// Failure count per kind
    pub failures: BTreeMap<TileErrorKind, usize>,
    /// First failures, up to [`MAX_RECORDED_FAILURES`]
    pub failed_tiles: Vec<FailedTile>,
    /// Listing errors (the run continued past them)
    pub listing_errors: Vec<String>,
    /// Whether the run was stopped before the listing was exhausted
    pub cancelled: bool,
}

impl IngestSummary {
    pub fn record_written(&mut self) {
        self.attempted += 1;
        self.written += 1;
    }

    pub fn record_skipped(&mut self) {
        self.skipped += 1;
    }

    pub fn record_failure(&mut self, error: &TileError) {
        self.attempted += 1;
        *self.failures.entry(error.kind()).or_insert(0) += 1;
        if self.failed_tiles.len() < MAX_RECORDED_FAILURES {
            self.failed_tiles.push(FailedTile {
                key: error.key().to_string(),
                kind: error.kind(),
                message: error.to_string(),
            });
        }
    }

    pub fn record_listing_error(&mut self, error: &IoError) {
        self.listing_errors.push(error.to_string());
    }

    /// Listing entries consumed so far: tiles, skipped files and listing
    /// errors. Each of them occupies one `start_at` position.
    pub fn processed(&self) -> usize {
        self.attempted + self.skipped + self.listing_errors.len()
    }

    /// `start_at` for a run picking up after this one.
    pub fn resume_at(&self, start_at: usize) -> usize {
        start_at + self.processed()
    }

    /// Total failed tiles.
    pub fn failed(&self) -> usize {
        self.failures.values().sum()
    }

    pub fn failures_of(&self, kind: TileErrorKind) -> usize {
        self.failures.get(&kind).copied().unwrap_or(0)
    }

    /// Whether the whole listing was seen. Tile failures do not count
    /// against completeness.
    pub fn is_complete(&self) -> bool {
        !self.cancelled && self.listing_errors.is_empty()
    }
}

impl fmt::Display for IngestSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} tiles attempted, {} written, {} failed, {} non-image entries skipped",
            self.attempted,
            self.written,
            self.failed(),
            self.skipped
        )?;
        for (kind, count) in &self.failures {
            writeln!(f, "  {}: {}", kind, count)?;
        }
        let out_of_range = self.failures_of(TileErrorKind::CoordinateOutOfRange);
        if out_of_range > 0 {
            writeln!(
                f,
                "  {} tiles lie outside the manifest's declared grid; the manifest may not match the data",
                out_of_range
            )?;
        }
        if !self.listing_errors.is_empty() {
            writeln!(f, "{} listing errors; the run is incomplete", self.listing_errors.len())?;
        }
        if self.cancelled {
            writeln!(f, "Run was cancelled before the listing was exhausted")?;
        }
        Ok(())
    }
}
