use std::path::PathBuf;

/// Errors that can occur while writing BIDS files
#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    /// I/O error during file operations
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Error writing tab-separated output
    #[error("TSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Error serializing JSON
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// Output path exists and the conflict policy is `fail`
    #[error("output already exists: {}", path.display())]
    Conflict {
        /// Existing path, relative to the dataset root
        path: PathBuf,
    },

    /// Two segments of one conversion resolved to the same path
    #[error("path {} was already written by this conversion", path.display())]
    InternalCollision {
        /// Colliding path, relative to the dataset root
        path: PathBuf,
    },

    /// Moving the finished temporary file into place failed
    #[error("failed to move output into place at {}: {source}", path.display())]
    Persist {
        /// Target path
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },

    /// A file of a group failed after earlier files of the group were written
    #[error("{source} (after writing {} file(s) of the group)", .written.len())]
    Incomplete {
        /// Files already in place, relative to the dataset root
        written: Vec<PathBuf>,
        /// Failure of the next file
        source: Box<WriteError>,
    },
}

impl WriteError {
    /// Files that were written before the failure.
    pub fn written_paths(&self) -> &[PathBuf] {
        match self {
            WriteError::Incomplete { written, .. } => written,
            _ => &[],
        }
    }
}
