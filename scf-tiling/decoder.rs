use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Child, ExitStatus};
use std::time::Duration;

use image::GrayImage;
use log::{debug, warn};
use rayon::prelude::*;
use scf_core::Tile;
use wait_timeout::ChildExt;

use crate::command::DecodeCommand;
use crate::error::{TileError, TileResult};

/// Materializes a tile image at `tile.path`.
///
/// Implementations are called from several threads at once, one tile each.
pub trait TileDecoder: Sync {
    fn decode(&self, tile: &Tile) -> TileResult<()>;
}

/// Runs an external decoder process (`kdu_expand`) per tile
#[derive(Debug, Clone)]
pub struct KakaduDecoder {
    program: PathBuf,
    input: PathBuf,
    timeout: Option<Duration>,
}

impl KakaduDecoder {
    pub fn new(program: impl Into<PathBuf>, input: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            input: input.into(),
            timeout: None,
        }
    }

    /// Kill the decoder if it runs longer than `timeout`
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn command(&self, tile: &Tile) -> DecodeCommand {
        DecodeCommand::for_tile(&self.program, &self.input, tile)
    }
}

impl TileDecoder for KakaduDecoder {
    fn decode(&self, tile: &Tile) -> TileResult<()> {
        let command = self.command(tile);
        debug!("tile {}: {}", tile.index, command);

        let mut child = command.to_command().spawn().map_err(|source| TileError::Spawn {
            index: tile.index,
            code: source.raw_os_error(),
            source,
        })?;

        let status = match self.timeout {
            None => child.wait().map_err(|source| TileError::Io {
                path: self.program.clone(),
                source,
            })?,
            Some(timeout) => wait_with_timeout(&mut child, timeout, tile.index, &self.program)?,
        };

        if !status.success() {
            return Err(TileError::DecoderFailed { index: tile.index, status });
        }
        Ok(())
    }
}

fn wait_with_timeout(child: &mut Child, timeout: Duration, index: usize, program: &Path) -> TileResult<ExitStatus> {
    let io_err = |source| TileError::Io { path: program.to_path_buf(), source };
    match child.wait_timeout(timeout).map_err(io_err)? {
        Some(status) => Ok(status),
        None => {
            // reap the child so it does not linger as a zombie
            let _ = child.kill();
            let _ = child.wait();
            Err(TileError::Timeout { index, timeout })
        }
    }
}

/// Crops tiles out of an image the `image` crate can read.
///
/// The whole source is held in memory as 8-bit grayscale, so this is meant for
/// moderate sizes and test data rather than multi-gigapixel JPEG 2000 scenes.
#[derive(Debug, Clone)]
pub struct NativeDecoder {
    source: PathBuf,
    image: GrayImage,
}

impl NativeDecoder {
    pub fn open(source: impl Into<PathBuf>) -> TileResult<Self> {
        let source = source.into();
        let image = image::open(&source)
            .map_err(|e| TileError::Image { path: source.clone(), source: e })?
            .into_luma8();
        Ok(Self { source, image })
    }

    pub fn from_image(source: impl Into<PathBuf>, image: GrayImage) -> Self {
        Self { source: source.into(), image }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    pub fn source(&self) -> &Path {
        &self.source
    }
}

impl TileDecoder for NativeDecoder {
    fn decode(&self, tile: &Tile) -> TileResult<()> {
        let cropped = image::imageops::crop_imm(
            &self.image,
            tile.origin_x as u32,
            tile.origin_y as u32,
            tile.width,
            tile.height,
        )
        .to_image();
        cropped
            .save(&tile.path)
            .map_err(|source| TileError::Image { path: tile.path.clone(), source })
    }
}

/// Read image dimensions from the file header without decoding pixels
pub fn probe_dimensions(path: &Path) -> TileResult<(u32, u32)> {
    image::image_dimensions(path).map_err(|source| TileError::Image {
        path: path.to_path_buf(),
        source,
    })
}

/// Decode all tiles concurrently and keep the ones that succeeded.
///
/// A failed tile is logged with its index and dropped; the result preserves
/// partition order.
pub fn decode_tiles<D: TileDecoder + ?Sized>(decoder: &D, tiles: Vec<Tile>) -> Vec<Tile> {
    let dirs: BTreeSet<&Path> = tiles
        .iter()
        .filter_map(|t| t.path.parent())
        .filter(|p| !p.as_os_str().is_empty())
        .collect();
    for dir in dirs {
        if let Err(e) = fs::create_dir_all(dir) {
            warn!("Cannot create tile directory {}: {}", dir.display(), e);
        }
    }

    tiles
        .into_par_iter()
        .filter_map(|tile| match decoder.decode(&tile) {
            Ok(()) => Some(tile),
            Err(e) => {
                warn!("Tile {} ({}-{}) skipped: {}", tile.index, tile.column, tile.row, e);
                None
            }
        })
        .collect()
}
