use std::path::PathBuf;

use crate::error::{TileError, TileResult};

/// Number of tile columns and rows laid over a source image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridSpec {
    pub columns: u32,
    pub rows: u32,
}

impl GridSpec {
    pub fn new(columns: u32, rows: u32) -> Self {
        Self { columns, rows }
    }

    pub fn tile_count(&self) -> usize {
        self.columns as usize * self.rows as usize
    }
}

/// Output path template for decoded tiles, e.g. `data/Image1/img-{col}-{row}.pgm`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TilePattern(String);

impl TilePattern {
    pub fn new(pattern: impl Into<String>) -> TileResult<Self> {
        let pattern = pattern.into();
        if !pattern.contains("{col}") || !pattern.contains("{row}") {
            return Err(TileError::InvalidPattern { pattern });
        }
        Ok(Self(pattern))
    }

    pub fn render(&self, column: u32, row: u32) -> PathBuf {
        PathBuf::from(
            self.0
                .replace("{col}", &column.to_string())
                .replace("{row}", &row.to_string()),
        )
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}
