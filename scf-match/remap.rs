use std::collections::HashMap;

use scf_core::{FeatureSet, Keypoint, Match};

/// Index bookkeeping between the two extraction passes of one tile pair.
///
/// The restricted extraction numbers its features from zero in the order of
/// the requested keypoint list. `refinement_to_tile` maps such a refinement
/// index back to the tile A local index it was requested for, and
/// `tile_to_partner` maps a tile A local index to the tile B local index it
/// was matched with in the area-gate pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexRemap {
    refinement_to_tile: Vec<usize>,
    tile_to_partner: HashMap<usize, usize>,
}

impl IndexRemap {
    /// Build from the area-gate matches (query = tile A, train = tile B)
    pub fn from_matches(matches: &[Match]) -> Self {
        let mut tile_to_partner = HashMap::with_capacity(matches.len());
        for m in matches {
            tile_to_partner.entry(m.query).or_insert(m.train);
        }
        Self {
            refinement_to_tile: matches.iter().map(|m| m.query).collect(),
            tile_to_partner,
        }
    }

    pub fn from_parts(refinement_to_tile: Vec<usize>, tile_to_partner: HashMap<usize, usize>) -> Self {
        Self { refinement_to_tile, tile_to_partner }
    }

    /// Tile A local index of a refinement index
    pub fn tile_index(&self, refinement: usize) -> Option<usize> {
        self.refinement_to_tile.get(refinement).copied()
    }

    /// Tile B local index matched with a tile A local index
    pub fn partner(&self, tile_index: usize) -> Option<usize> {
        self.tile_to_partner.get(&tile_index).copied()
    }

    /// Number of refinement indices
    pub fn len(&self) -> usize {
        self.refinement_to_tile.len()
    }

    pub fn is_empty(&self) -> bool {
        self.refinement_to_tile.is_empty()
    }

    /// Keypoint list for the restricted extraction, in refinement order.
    ///
    /// `None` when a tile index is out of range for `features`.
    pub fn refinement_keypoints(&self, features: &FeatureSet) -> Option<Vec<Keypoint>> {
        self.refinement_to_tile
            .iter()
            .map(|&i| features.keypoint(i).copied())
            .collect()
    }
}
