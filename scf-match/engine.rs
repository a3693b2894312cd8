use std::f32::consts::PI;
use std::path::{Path, PathBuf};

use scf_core::{
    DescriptorMatcher, EngineError, EngineResult, FeatureEngine, FeatureExtractor, FeatureSet, Keypoint, Match,
    Slot,
};

use crate::brute_force::{BruteForceMatcher, MatcherParams};
use crate::sift_command::SiftCommand;

/// Engine backed by an external SIFT program and the CPU matcher
#[derive(Debug, Clone)]
pub struct ExternalEngine {
    extractor: SiftCommand,
    matcher: BruteForceMatcher,
}

impl ExternalEngine {
    pub fn new(extractor: SiftCommand, params: MatcherParams) -> Self {
        Self {
            extractor,
            matcher: BruteForceMatcher::new(params),
        }
    }

    pub fn extractor(&self) -> &SiftCommand {
        &self.extractor
    }

    pub fn matcher(&self) -> &BruteForceMatcher {
        &self.matcher
    }
}

impl FeatureExtractor for ExternalEngine {
    fn extract(&mut self, image: &Path) -> EngineResult<FeatureSet> {
        self.extractor.extract(image)
    }

    fn extract_at(&mut self, image: &Path, keypoints: &[Keypoint]) -> EngineResult<FeatureSet> {
        self.extractor.extract_at(image, keypoints)
    }

    fn extract_batch(&mut self, images: &[PathBuf]) -> Vec<EngineResult<FeatureSet>> {
        self.extractor.extract_batch(images)
    }
}

impl DescriptorMatcher for ExternalEngine {
    fn set_descriptors(&mut self, slot: Slot, features: &FeatureSet) -> EngineResult<()> {
        self.matcher.set_descriptors(slot, features)
    }

    fn match_loaded(&mut self, max_matches: usize) -> EngineResult<Vec<Match>> {
        self.matcher.match_loaded(max_matches)
    }
}

impl FeatureEngine for ExternalEngine {
    fn verify(&mut self) -> EngineResult<()> {
        if self.extractor.resolve_program().is_none() {
            return Err(EngineError::Unavailable {
                program: self.extractor.program().to_path_buf(),
            });
        }

        let params = self.matcher.params();
        if !(params.distance_max > 0.0 && params.distance_max <= PI) {
            return Err(EngineError::Verification(format!(
                "distance_max {} outside (0, pi]",
                params.distance_max
            )));
        }
        if !(params.ratio_max > 0.0 && params.ratio_max <= 1.0) {
            return Err(EngineError::Verification(format!(
                "ratio_max {} outside (0, 1]",
                params.ratio_max
            )));
        }
        Ok(())
    }
}
