use std::fmt;
use std::path::PathBuf;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

pub mod engine;

pub use engine::{DescriptorMatcher, EngineError, EngineResult, FeatureEngine, FeatureExtractor, Slot};

/// Length of one SIFT descriptor vector
pub const DESCRIPTOR_DIM: usize = 128;

/// Key-point ≙ SIFT feature location in the image it was extracted from
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Keypoint {
    pub x: f32,
    pub y: f32,
    pub scale: f32,
    pub orientation: f32,
}

impl Keypoint {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y, scale: 1.0, orientation: 0.0 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FeatureSetError {
    #[error("descriptor buffer holds {actual} values, expected {expected} for {keypoints} keypoints")]
    LengthMismatch { keypoints: usize, expected: usize, actual: usize },
}

/// Keypoints and their descriptors, kept in one container.
///
/// Descriptors are stored flat, `DESCRIPTOR_DIM` values per keypoint, in the
/// same order as the keypoints. A position in this set is a *local index* and
/// means nothing outside of it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureSet {
    keypoints: Vec<Keypoint>,
    descriptors: Vec<f32>,
}

impl FeatureSet {
    pub fn new(keypoints: Vec<Keypoint>, descriptors: Vec<f32>) -> Result<Self, FeatureSetError> {
        let expected = keypoints.len() * DESCRIPTOR_DIM;
        if descriptors.len() != expected {
            return Err(FeatureSetError::LengthMismatch {
                keypoints: keypoints.len(),
                expected,
                actual: descriptors.len(),
            });
        }
        Ok(Self { keypoints, descriptors })
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Append one feature; `descriptor` must hold exactly `DESCRIPTOR_DIM` values
    pub fn push(&mut self, keypoint: Keypoint, descriptor: &[f32]) -> Result<(), FeatureSetError> {
        if descriptor.len() != DESCRIPTOR_DIM {
            return Err(FeatureSetError::LengthMismatch {
                keypoints: 1,
                expected: DESCRIPTOR_DIM,
                actual: descriptor.len(),
            });
        }
        self.keypoints.push(keypoint);
        self.descriptors.extend_from_slice(descriptor);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.keypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keypoints.is_empty()
    }

    pub fn keypoints(&self) -> &[Keypoint] {
        &self.keypoints
    }

    pub fn keypoint(&self, index: usize) -> Option<&Keypoint> {
        self.keypoints.get(index)
    }

    /// Flat descriptor buffer
    pub fn descriptors(&self) -> &[f32] {
        &self.descriptors
    }

    pub fn descriptor(&self, index: usize) -> Option<&[f32]> {
        let start = index.checked_mul(DESCRIPTOR_DIM)?;
        self.descriptors.get(start..start + DESCRIPTOR_DIM)
    }

    pub fn into_parts(self) -> (Vec<Keypoint>, Vec<f32>) {
        (self.keypoints, self.descriptors)
    }
}

/// Normalized tile rectangle as fractions of the source image
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Region {
    pub row_frac: f64,
    pub col_frac: f64,
    pub row_size: f64,
    pub col_size: f64,
}

/// One decoded sub-image of a source image
#[derive(Debug, Clone, PartialEq)]
pub struct Tile {
    pub image_id: usize,
    /// Position in partition order
    pub index: usize,
    pub column: u32,
    pub row: u32,
    pub path: PathBuf,
    /// Absolute offset of the top-left corner in source pixels
    pub origin_x: f64,
    pub origin_y: f64,
    pub width: u32,
    pub height: u32,
    pub region: Region,
}

impl Tile {
    /// Absolute source coordinates of a keypoint local to this tile
    pub fn absolute(&self, keypoint: &Keypoint) -> (f64, f64) {
        (
            self.origin_x + keypoint.x as f64,
            self.origin_y + keypoint.y as f64,
        )
    }

    /// Whether an absolute point falls inside this tile's pixel bounds
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.origin_x
            && y >= self.origin_y
            && x < self.origin_x + self.width as f64
            && y < self.origin_y + self.height as f64
    }
}

/// Pair of local indices returned by one matcher call (slot 0, slot 1)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Match {
    pub query: usize,
    pub train: usize,
}

impl Match {
    pub fn new(query: usize, train: usize) -> Self {
        Self { query, train }
    }
}

/// Absolute point pair between image A and image B
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Correspondence {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
    /// Image B side fell back to the bare tile origin
    pub degraded: bool,
}

impl fmt::Display for Correspondence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {} {}", self.x1, self.y1, self.x2, self.y2)
    }
}

/// Thresholds of the two-stage gate
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct MatchConfig {
    /// Tile pairs need strictly more raw matches than this to be refined
    pub area_threshold: usize,
    /// Summed template matches must strictly exceed this to accept a pair
    pub scf_threshold: usize,
    /// Write correspondences whose image B keypoint could not be resolved
    pub emit_degraded: bool,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            area_threshold: 1500,
            scf_threshold: 25,
            emit_degraded: false,
        }
    }
}

/// Number of worker threads used when the configuration leaves it open
pub fn default_threads() -> usize {
    num_cpus::get().max(1)
}

/// Initialize Rayon thread pool with the specified number of threads
pub fn init_thread_pool(n_threads: usize) -> Result<(), rayon::ThreadPoolBuildError> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(n_threads)
        .build_global()
}
