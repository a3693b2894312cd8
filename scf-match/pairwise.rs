use std::fmt;
use std::io::Write;

use log::{debug, info, warn};
use scf_core::{FeatureEngine, Match, MatchConfig, Slot};
use scf_tiling::{ImageFeatureIndex, TileFeatures};

use crate::emitter::CorrespondenceEmitter;
use crate::error::MatchResult;
use crate::reference::ReferenceSet;
use crate::verifier::{ReferenceVerifier, Verification};

/// Counters of one matching run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MatchReport {
    pub pairs_compared: usize,
    /// Pairs skipped because the engine failed on them
    pub pairs_failed: usize,
    pub area_passed: usize,
    pub scf_accepted: usize,
    pub correspondences: usize,
    pub degraded: usize,
    pub skipped: usize,
}

impl fmt::Display for MatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Tile pairs compared:      {}", self.pairs_compared)?;
        writeln!(f, "Tile pairs failed:        {}", self.pairs_failed)?;
        writeln!(f, "Passed area gate:         {}", self.area_passed)?;
        writeln!(f, "Accepted by SCF gate:     {}", self.scf_accepted)?;
        writeln!(f, "Correspondences written:  {}", self.correspondences)?;
        writeln!(f, "Degraded correspondences: {}", self.degraded)?;
        write!(f, "Skipped matches:          {}", self.skipped)
    }
}

/// Compares every tile of image A with every tile of image B
#[derive(Debug, Clone, Copy)]
pub struct PairwiseMatcher<'a> {
    config: &'a MatchConfig,
    verifier: ReferenceVerifier<'a>,
}

impl<'a> PairwiseMatcher<'a> {
    pub fn new(config: &'a MatchConfig, references: &'a ReferenceSet) -> Self {
        Self {
            config,
            verifier: ReferenceVerifier::new(references, config),
        }
    }

    /// First gate: strictly more raw matches than the area threshold
    pub fn area_gate(&self, num_match: usize) -> bool {
        num_match > self.config.area_threshold
    }

    /// Match the full cross product, image A outer and image B inner.
    ///
    /// Engine failures on a pair are logged and the pair is skipped; only
    /// output write errors end the run.
    pub fn run<E: FeatureEngine + ?Sized, W: Write>(
        &self,
        engine: &mut E,
        image_a: &ImageFeatureIndex,
        image_b: &ImageFeatureIndex,
        emitter: &mut CorrespondenceEmitter<W>,
    ) -> MatchResult<MatchReport> {
        let mut report = MatchReport::default();
        let total = image_a.len();

        for (j, a) in image_a.iter().enumerate() {
            for b in image_b.iter() {
                report.pairs_compared += 1;
                match self.match_pair(engine, a, b) {
                    Ok(Some(verification)) => {
                        report.area_passed += 1;
                        report.degraded += verification.degraded;
                        report.skipped += verification.skipped;
                        if verification.accepted {
                            report.scf_accepted += 1;
                            emitter.emit_block(&verification.correspondences)?;
                            report.correspondences += verification.correspondences.len();
                        }
                    }
                    Ok(None) => {}
                    Err(e) => {
                        report.pairs_failed += 1;
                        warn!("Tile pair ({}, {}) skipped: {}", a.tile.index, b.tile.index, e);
                    }
                }
            }
            info!("{}% of tile pairs matched", (j + 1) * 100 / total);
        }

        Ok(report)
    }

    /// Area-gate match of one pair, verified when it passes
    fn match_pair<E: FeatureEngine + ?Sized>(
        &self,
        engine: &mut E,
        a: &TileFeatures,
        b: &TileFeatures,
    ) -> MatchResult<Option<Verification>> {
        engine.set_descriptors(Slot::Query, &a.features)?;
        engine.set_descriptors(Slot::Train, &b.features)?;
        let matches: Vec<Match> = engine.match_loaded(a.features.len())?;
        debug!(
            "Tile pair ({}, {}): {} matches",
            a.tile.index,
            b.tile.index,
            matches.len()
        );

        if !self.area_gate(matches.len()) {
            return Ok(None);
        }
        self.verifier.verify(engine, a, b, &matches).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scf_core::{
        DescriptorMatcher, EngineError, EngineResult, FeatureExtractor, FeatureSet, Keypoint, Region, Tile,
        DESCRIPTOR_DIM,
    };
    use std::path::{Path, PathBuf};

    fn tile(image_id: usize, index: usize) -> Tile {
        Tile {
            image_id,
            index,
            column: 0,
            row: index as u32,
            path: PathBuf::from(format!("img{image_id}-{index}.pgm")),
            origin_x: 0.0,
            origin_y: 100.0 * index as f64,
            width: 100,
            height: 100,
            region: Region { row_frac: 0.0, col_frac: 0.0, row_size: 1.0, col_size: 1.0 },
        }
    }

    fn features(n: usize) -> FeatureSet {
        let kps = (0..n).map(|i| Keypoint::new(i as f32, i as f32)).collect();
        FeatureSet::new(kps, vec![1.0; n * DESCRIPTOR_DIM]).unwrap()
    }

    fn index(image_id: usize, sizes: &[usize]) -> ImageFeatureIndex {
        let mut index = ImageFeatureIndex::new(image_id);
        for (i, &n) in sizes.iter().enumerate() {
            index.insert(tile(image_id, i), features(n));
        }
        index
    }

    /// Matches `min(len(slot 0), len(slot 1))` diagonal pairs, optionally
    /// failing whenever slot 1 holds `fail_on` features
    struct DiagonalEngine {
        loaded: [usize; 2],
        fail_on: Option<usize>,
        match_calls: usize,
    }

    impl FeatureExtractor for DiagonalEngine {
        fn extract(&mut self, _image: &Path) -> EngineResult<FeatureSet> {
            unreachable!()
        }

        fn extract_at(&mut self, _image: &Path, keypoints: &[Keypoint]) -> EngineResult<FeatureSet> {
            Ok(features(keypoints.len()))
        }
    }

    impl DescriptorMatcher for DiagonalEngine {
        fn set_descriptors(&mut self, slot: Slot, features: &FeatureSet) -> EngineResult<()> {
            self.loaded[slot as usize] = features.len();
            Ok(())
        }

        fn match_loaded(&mut self, max_matches: usize) -> EngineResult<Vec<Match>> {
            self.match_calls += 1;
            if self.fail_on == Some(self.loaded[1]) {
                return Err(EngineError::Verification("scripted failure".into()));
            }
            let n = self.loaded[0].min(self.loaded[1]).min(max_matches);
            Ok((0..n).map(|i| Match::new(i, i)).collect())
        }
    }

    impl FeatureEngine for DiagonalEngine {
        fn verify(&mut self) -> EngineResult<()> {
            Ok(())
        }
    }

    fn engine() -> DiagonalEngine {
        DiagonalEngine { loaded: [0, 0], fail_on: None, match_calls: 0 }
    }

    #[test]
    fn test_area_gate_is_strict() {
        let refs = ReferenceSet::default();
        let config = MatchConfig { area_threshold: 10, ..Default::default() };
        let matcher = PairwiseMatcher::new(&config, &refs);
        assert!(!matcher.area_gate(10));
        assert!(matcher.area_gate(11));
    }

    #[test]
    fn test_cross_product_and_gates() {
        let refs = ReferenceSet::from_templates([features(3), FeatureSet::empty(), FeatureSet::empty()]);
        let config = MatchConfig { area_threshold: 4, scf_threshold: 2, ..Default::default() };
        let a = index(1, &[5, 4]);
        let b = index(2, &[6, 2, 5]);

        let mut engine = engine();
        let mut emitter = CorrespondenceEmitter::new(Vec::new());
        let report = PairwiseMatcher::new(&config, &refs)
            .run(&mut engine, &a, &b, &mut emitter)
            .unwrap();

        assert_eq!(report.pairs_compared, 6);
        // only tile 0 of A (5 features) against B tiles 0 and 2 exceed 4 matches
        assert_eq!(report.area_passed, 2);
        assert_eq!(report.scf_accepted, 2);
        assert_eq!(report.correspondences, 6);
        assert_eq!(engine.match_calls, 6 + 2);

        let text = String::from_utf8(emitter.finish().unwrap()).unwrap();
        assert_eq!(text.lines().count(), 6);
        assert_eq!(text.lines().next(), Some("0 0 0 0"));
        assert_eq!(text.lines().nth(3), Some("0 0 0 200"));
    }

    #[test]
    fn test_engine_failure_skips_only_that_pair() {
        let _ = env_logger::builder().is_test(true).try_init();
        let refs = ReferenceSet::from_templates([features(5), features(5), features(5)]);
        let config = MatchConfig { area_threshold: 0, scf_threshold: 0, ..Default::default() };
        let a = index(1, &[2]);
        let b = index(2, &[2, 3]);

        let mut engine = engine();
        engine.fail_on = Some(3);
        let mut emitter = CorrespondenceEmitter::new(Vec::new());
        let report = PairwiseMatcher::new(&config, &refs)
            .run(&mut engine, &a, &b, &mut emitter)
            .unwrap();

        assert_eq!(report.pairs_compared, 2);
        assert_eq!(report.pairs_failed, 1);
        assert_eq!(report.scf_accepted, 1);
        assert_eq!(report.correspondences, 6);
    }

    #[test]
    fn test_report_display() {
        let report = MatchReport { pairs_compared: 4, correspondences: 30, ..Default::default() };
        let text = report.to_string();
        assert!(text.contains("Tile pairs compared:      4"));
        assert!(text.contains("Correspondences written:  30"));
    }
}
