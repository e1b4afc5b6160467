//! Error types for the page cache

use thiserror::Error;

/// Construction-time error. Reported once, never retried.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid map extent: {width}x{height} pixels does not fit a root page of {root_size} pixels")]
    InvalidExtent { width: u32, height: u32, root_size: u64 },

    #[error("Zero capacity: {0}")]
    ZeroCapacity(&'static str),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failure to produce the bytes of one tile.
///
/// Absorbed into page state: the page becomes Missing and rendering falls
/// back to the nearest resident ancestor.
#[derive(Debug, Error)]
pub enum TileError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Short read: expected {expected} bytes, got {actual}")]
    ShortRead { expected: usize, actual: usize },

    #[error("Failed to decode tile: {0}")]
    Decode(String),

    #[error("Tile layout {width}x{height}x{channels} does not match the cache layout")]
    LayoutMismatch { width: u32, height: u32, channels: u32 },
}

/// Result type alias for tile operations.
pub type TileResult<T> = Result<T, TileError>;
