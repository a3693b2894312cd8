use std::io;
use std::path::PathBuf;
use std::process::ExitStatus;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum TileError {
    #[error("Invalid image dimensions: {width}x{height} (must be > 0)")]
    InvalidImageSize { width: u32, height: u32 },

    #[error("Invalid grid {columns}x{rows} for a {width}x{height} image")]
    InvalidGrid { columns: u32, rows: u32, width: u32, height: u32 },

    #[error("Tile pattern {pattern:?} must contain both {{col}} and {{row}}")]
    InvalidPattern { pattern: String },

    #[error("Failed to launch decoder for tile {index} (os error {code:?}): {source}")]
    Spawn { index: usize, code: Option<i32>, source: io::Error },

    #[error("Decoder for tile {index} exited with {status}")]
    DecoderFailed { index: usize, status: ExitStatus },

    #[error("Decoder for tile {index} timed out after {timeout:?}")]
    Timeout { index: usize, timeout: Duration },

    #[error("Image error on {path:?}: {source}")]
    Image { path: PathBuf, source: image::ImageError },

    #[error("I/O error on {path:?}: {source}")]
    Io { path: PathBuf, source: io::Error },
}

pub type TileResult<T> = Result<T, TileError>;
