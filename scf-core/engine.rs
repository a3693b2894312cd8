//! Contract of the feature engine collaborator.
//!
//! Extraction and matching happen outside this workspace's algorithms: an
//! engine turns an image into a [`FeatureSet`] and matches two descriptor
//! sets loaded into numbered slots. Engines are stateful (the loaded slots are
//! shared context), so every method takes `&mut self` and callers must not
//! interleave calls from different tile pairs.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use std::time::Duration;

use crate::{FeatureSet, FeatureSetError, Keypoint, Match};

/// Descriptor slot of the matcher context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    /// Slot 0: match indices refer to this side as `query`
    Query = 0,
    /// Slot 1: match indices refer to this side as `train`
    Train = 1,
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "slot {}", *self as usize)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("feature engine program {program:?} not found")]
    Unavailable { program: PathBuf },

    #[error("feature engine verification failed: {0}")]
    Verification(String),

    #[error("failed to launch {program:?}: {source}")]
    Spawn { program: PathBuf, source: io::Error },

    #[error("{program:?} exited with {status}")]
    Failed { program: PathBuf, status: ExitStatus },

    #[error("{program:?} timed out after {timeout:?}")]
    Timeout { program: PathBuf, timeout: Duration },

    #[error("I/O error on {path:?}: {source}")]
    Io { path: PathBuf, source: io::Error },

    #[error("malformed feature file {path:?}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error(transparent)]
    Features(#[from] FeatureSetError),

    #[error("restricted extraction returned {actual} features for {expected} keypoints")]
    CountMismatch { expected: usize, actual: usize },

    #[error("{0} has no descriptors loaded")]
    SlotEmpty(Slot),
}

pub type EngineResult<T> = Result<T, EngineError>;

/// Keypoint and descriptor extraction
pub trait FeatureExtractor {
    /// Detect keypoints in `image` and describe them
    fn extract(&mut self, image: &Path) -> EngineResult<FeatureSet>;

    /// Describe exactly `keypoints` in `image`.
    ///
    /// The result has one feature per requested keypoint, in request order,
    /// so its local indices are positions in `keypoints`.
    fn extract_at(&mut self, image: &Path, keypoints: &[Keypoint]) -> EngineResult<FeatureSet>;

    /// Extract several images in one call, one result per image
    fn extract_batch(&mut self, images: &[PathBuf]) -> Vec<EngineResult<FeatureSet>> {
        images.iter().map(|image| self.extract(image)).collect()
    }
}

/// Descriptor matching through a two-slot context
pub trait DescriptorMatcher {
    /// Load descriptors into a slot, replacing what it held
    fn set_descriptors(&mut self, slot: Slot, features: &FeatureSet) -> EngineResult<()>;

    /// Match the two loaded slots, returning at most `max_matches` pairs
    fn match_loaded(&mut self, max_matches: usize) -> EngineResult<Vec<Match>>;
}

/// A complete engine: extractor and matcher sharing one context
pub trait FeatureEngine: FeatureExtractor + DescriptorMatcher {
    /// Check that the engine is usable before any work starts
    fn verify(&mut self) -> EngineResult<()>;
}

impl<T: FeatureExtractor + ?Sized> FeatureExtractor for &mut T {
    fn extract(&mut self, image: &Path) -> EngineResult<FeatureSet> {
        (**self).extract(image)
    }

    fn extract_at(&mut self, image: &Path, keypoints: &[Keypoint]) -> EngineResult<FeatureSet> {
        (**self).extract_at(image, keypoints)
    }

    fn extract_batch(&mut self, images: &[PathBuf]) -> Vec<EngineResult<FeatureSet>> {
        (**self).extract_batch(images)
    }
}

impl<T: DescriptorMatcher + ?Sized> DescriptorMatcher for &mut T {
    fn set_descriptors(&mut self, slot: Slot, features: &FeatureSet) -> EngineResult<()> {
        (**self).set_descriptors(slot, features)
    }

    fn match_loaded(&mut self, max_matches: usize) -> EngineResult<Vec<Match>> {
        (**self).match_loaded(max_matches)
    }
}

impl<T: FeatureEngine + ?Sized> FeatureEngine for &mut T {
    fn verify(&mut self) -> EngineResult<()> {
        (**self).verify()
    }
}
