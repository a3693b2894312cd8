use scf_core::{Region, Tile};

use crate::error::{TileError, TileResult};
use crate::types::{GridSpec, TilePattern};

/// Grid geometry over one source image.
///
/// Tile `c` spans `[floor(c*W/cols), floor((c+1)*W/cols))` horizontally (rows
/// likewise) and the last column/row ends exactly at the image border, so the
/// tiles cover the image without gaps or overlaps even when the division
/// leaves a remainder.
#[derive(Debug, Clone)]
pub struct TilePartitioner {
    width: u32,
    height: u32,
    grid: GridSpec,
    pattern: TilePattern,
}

impl TilePartitioner {
    /// Creates a new partitioner with validation
    pub fn new(width: u32, height: u32, grid: GridSpec, pattern: TilePattern) -> TileResult<Self> {
        if width == 0 || height == 0 {
            return Err(TileError::InvalidImageSize { width, height });
        }

        // every tile must be at least one pixel wide and high
        if grid.columns == 0 || grid.rows == 0 || grid.columns > width || grid.rows > height {
            return Err(TileError::InvalidGrid {
                columns: grid.columns,
                rows: grid.rows,
                width,
                height,
            });
        }

        Ok(Self { width, height, grid, pattern })
    }

    /// Pixel span `[start, end)` of a tile along one axis
    fn span(extent: u32, count: u32, i: u32) -> (u32, u32) {
        let bound = |k: u32| (k as u64 * extent as u64 / count as u64) as u32;
        let end = if i + 1 == count { extent } else { bound(i + 1) };
        (bound(i), end)
    }

    /// Geometry of the tile at `(column, row)`
    pub fn tile(&self, image_id: usize, column: u32, row: u32) -> Tile {
        let (x0, x1) = Self::span(self.width, self.grid.columns, column);
        let (y0, y1) = Self::span(self.height, self.grid.rows, row);
        let (w, h) = (self.width as f64, self.height as f64);

        Tile {
            image_id,
            index: column as usize * self.grid.rows as usize + row as usize,
            column,
            row,
            path: self.pattern.render(column, row),
            origin_x: x0 as f64,
            origin_y: y0 as f64,
            width: x1 - x0,
            height: y1 - y0,
            region: Region {
                row_frac: y0 as f64 / h,
                col_frac: x0 as f64 / w,
                row_size: (y1 - y0) as f64 / h,
                col_size: (x1 - x0) as f64 / w,
            },
        }
    }

    /// All tiles, columns outer and rows inner
    pub fn partition(&self, image_id: usize) -> Vec<Tile> {
        let mut tiles = Vec::with_capacity(self.grid.tile_count());
        for column in 0..self.grid.columns {
            for row in 0..self.grid.rows {
                tiles.push(self.tile(image_id, column, row));
            }
        }
        tiles
    }

    pub fn tile_count(&self) -> usize {
        self.grid.tile_count()
    }

    pub fn grid(&self) -> GridSpec {
        self.grid
    }

    /// Source image dimensions
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}
