use std::io;
use std::path::PathBuf;

/// Errors surfaced by construction and lifecycle calls.
///
/// Steady-state failures while tailing (I/O errors, sink write failures,
/// callback errors) never appear here. They are reported through the
/// interceptor's logger and processing continues.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// A configuration field is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The requested preset does not exist.
    #[error("unknown preset: {name}. Available: aggressive, balanced, conservative")]
    UnknownPreset { name: String },

    /// The configured encoding is not one the reader can decode.
    #[error("unsupported encoding: {0}")]
    UnsupportedEncoding(String),

    /// Only FIFO eviction is implemented.
    #[error("unsupported overflow strategy: {0} (only FIFO is supported)")]
    UnsupportedOverflowStrategy(String),

    /// The source file is missing and `allow_missing` was not set.
    #[error("source file not found: {}", .0.display())]
    SourceNotFound(PathBuf),

    /// `start()` was called on a running interceptor.
    #[error("interceptor is already running")]
    AlreadyRunning,

    /// A pattern filter failed to compile.
    #[error("invalid filter pattern: {0}")]
    Pattern(#[from] regex::Error),

    /// The change source could not watch the source directory.
    #[error("failed to watch source directory: {0}")]
    Watch(#[from] notify::Error),

    /// Setting up the watch failed with an I/O error.
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
