use log::{info, warn};
use scf_core::{FeatureExtractor, FeatureSet, Tile};

/// Features of one decoded tile
#[derive(Debug, Clone)]
pub struct TileFeatures {
    pub tile: Tile,
    pub features: FeatureSet,
}

/// Per-tile features of one source image, in partition order.
///
/// Only tiles that produced at least one feature are present.
#[derive(Debug, Clone, Default)]
pub struct ImageFeatureIndex {
    image_id: usize,
    entries: Vec<TileFeatures>,
}

impl ImageFeatureIndex {
    pub fn new(image_id: usize) -> Self {
        Self { image_id, entries: Vec::new() }
    }

    pub fn image_id(&self) -> usize {
        self.image_id
    }

    /// Store a tile's features; empty sets are dropped
    pub fn insert(&mut self, tile: Tile, features: FeatureSet) -> bool {
        if features.is_empty() {
            return false;
        }
        self.entries.push(TileFeatures { tile, features });
        true
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&TileFeatures> {
        self.entries.get(index)
    }

    pub fn entries(&self) -> &[TileFeatures] {
        &self.entries
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TileFeatures> {
        self.entries.iter()
    }

    /// Total number of features over all tiles
    pub fn feature_count(&self) -> usize {
        self.entries.iter().map(|e| e.features.len()).sum()
    }
}

/// Builds an [`ImageFeatureIndex`] by running the extractor on every tile
pub struct TileFeatureStore;

impl TileFeatureStore {
    /// Extract features tile by tile.
    ///
    /// Calls into the extractor are strictly sequential. Extraction errors are
    /// logged and the tile skipped; tiles without features are dropped without
    /// a message. Progress is logged once per grid column, including columns
    /// whose tiles all failed to decode.
    pub fn build<E: FeatureExtractor + ?Sized>(
        extractor: &mut E,
        image_id: usize,
        tiles: Vec<Tile>,
        columns: u32,
    ) -> ImageFeatureIndex {
        let mut index = ImageFeatureIndex::new(image_id);
        let mut reported = 0;

        for tile in tiles {
            for percent in column_progress(&mut reported, tile.column, columns) {
                info!("{}% of image {} processed", percent, image_id);
            }
            match extractor.extract(&tile.path) {
                Ok(features) => {
                    index.insert(tile, features);
                }
                Err(e) => warn!("Feature extraction failed on tile {}: {}", tile.index, e),
            }
        }
        for percent in column_progress(&mut reported, columns, columns) {
            info!("{}% of image {} processed", percent, image_id);
        }

        index
    }
}

/// Percentages for the columns before `done` not yet reported
fn column_progress(reported: &mut u32, done: u32, columns: u32) -> Vec<usize> {
    let mut out = Vec::new();
    while *reported < done.min(columns) {
        *reported += 1;
        out.push(*reported as usize * 100 / columns as usize);
    }
    out
}
