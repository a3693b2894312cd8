use log::{debug, warn};
use scf_core::{Correspondence, EngineError, FeatureEngine, Match, MatchConfig, Slot};
use scf_tiling::TileFeatures;

use crate::error::{MatchError, MatchResult};
use crate::reference::{ReferenceSet, REFERENCE_COUNT};
use crate::remap::IndexRemap;

/// Outcome of verifying one tile pair against the reference templates
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Verification {
    /// Match count per template
    pub template_matches: [usize; REFERENCE_COUNT],
    pub accepted: bool,
    /// Resolved correspondences, template order then match order
    pub correspondences: Vec<Correspondence>,
    /// Correspondences whose image B keypoint could not be resolved
    pub degraded: usize,
    /// Matches dropped because their refinement index had no tile A keypoint
    pub skipped: usize,
}

impl Verification {
    pub fn scf_sum(&self) -> usize {
        self.template_matches.iter().sum()
    }
}

/// Second gate: re-describes the area-gate keypoints of tile A and checks
/// how many of them match the reference templates.
#[derive(Debug, Clone, Copy)]
pub struct ReferenceVerifier<'a> {
    references: &'a ReferenceSet,
    config: &'a MatchConfig,
}

impl<'a> ReferenceVerifier<'a> {
    pub fn new(references: &'a ReferenceSet, config: &'a MatchConfig) -> Self {
        Self { references, config }
    }

    /// Verify a tile pair that passed the area gate.
    ///
    /// `matches` are the area-gate matches with tile A in the query slot.
    /// The engine is used in a fixed order: restricted extraction, load of
    /// the refined set into slot 0, then one slot 1 load and match per
    /// non-empty template.
    pub fn verify<E: FeatureEngine + ?Sized>(
        &self,
        engine: &mut E,
        a: &TileFeatures,
        b: &TileFeatures,
        matches: &[Match],
    ) -> MatchResult<Verification> {
        let remap = IndexRemap::from_matches(matches);
        let keym1 = remap.refinement_keypoints(&a.features).ok_or_else(|| {
            let index = matches
                .iter()
                .map(|m| m.query)
                .find(|&q| q >= a.features.len())
                .unwrap_or_default();
            MatchError::BadMatchIndex { tile: a.tile.index, index, len: a.features.len() }
        })?;

        let refined = engine.extract_at(&a.tile.path, &keym1)?;
        if refined.len() != keym1.len() {
            return Err(EngineError::CountMismatch { expected: keym1.len(), actual: refined.len() }.into());
        }

        engine.set_descriptors(Slot::Query, &refined)?;
        let mut per_template: [Vec<Match>; REFERENCE_COUNT] = Default::default();
        for (template, found) in self.references.templates().iter().zip(per_template.iter_mut()) {
            if template.is_empty() {
                continue;
            }
            engine.set_descriptors(Slot::Train, template)?;
            *found = engine.match_loaded(keym1.len())?;
        }

        let mut result = Verification {
            template_matches: std::array::from_fn(|i| per_template[i].len()),
            ..Default::default()
        };
        result.accepted = result.scf_sum() > self.config.scf_threshold;
        debug!(
            "Tile pair ({}, {}): template matches {:?}, sum {}",
            a.tile.index,
            b.tile.index,
            result.template_matches,
            result.scf_sum()
        );
        if !result.accepted {
            return Ok(result);
        }

        for m in per_template.iter().flatten() {
            match resolve(&remap, a, b, m.query) {
                Some(c) if c.degraded => {
                    result.degraded += 1;
                    if self.config.emit_degraded {
                        result.correspondences.push(c);
                    }
                }
                Some(c) => result.correspondences.push(c),
                None => result.skipped += 1,
            }
        }

        Ok(result)
    }
}

/// Absolute coordinates of one template match.
///
/// `None` when the refinement index has no tile A keypoint. A missing tile B
/// partner yields a degraded correspondence at tile B's origin.
pub fn resolve(remap: &IndexRemap, a: &TileFeatures, b: &TileFeatures, refinement: usize) -> Option<Correspondence> {
    let Some(local_a) = remap.tile_index(refinement) else {
        warn!(
            "Refinement index {} of tile {} has no tile keypoint, skipped",
            refinement, a.tile.index
        );
        return None;
    };
    let Some(key_a) = a.features.keypoint(local_a) else {
        warn!("Tile {} has no keypoint {}, skipped", a.tile.index, local_a);
        return None;
    };
    let (x1, y1) = a.tile.absolute(key_a);

    let key_b = remap.partner(local_a).and_then(|local_b| b.features.keypoint(local_b));
    match key_b {
        Some(key_b) => {
            let (x2, y2) = b.tile.absolute(key_b);
            Some(Correspondence { x1, y1, x2, y2, degraded: false })
        }
        None => {
            warn!(
                "Keypoint {} of tile {} has no partner in tile {}, image B side left at tile origin",
                local_a, a.tile.index, b.tile.index
            );
            Some(Correspondence {
                x1,
                y1,
                x2: b.tile.origin_x,
                y2: b.tile.origin_y,
                degraded: true,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scf_core::{
        DescriptorMatcher, EngineResult, FeatureExtractor, FeatureSet, Keypoint, Region, Tile, DESCRIPTOR_DIM,
    };
    use std::collections::{HashMap, VecDeque};
    use std::path::{Path, PathBuf};

    fn tile(index: usize, origin_x: f64, origin_y: f64) -> Tile {
        Tile {
            image_id: 1,
            index,
            column: 0,
            row: index as u32,
            path: PathBuf::from(format!("img-0-{index}.pgm")),
            origin_x,
            origin_y,
            width: 100,
            height: 100,
            region: Region { row_frac: 0.0, col_frac: 0.0, row_size: 0.5, col_size: 0.5 },
        }
    }

    fn features(points: &[(f32, f32)]) -> FeatureSet {
        let kps = points.iter().map(|&(x, y)| Keypoint::new(x, y)).collect();
        FeatureSet::new(kps, vec![1.0; points.len() * DESCRIPTOR_DIM]).unwrap()
    }

    fn pair() -> (TileFeatures, TileFeatures) {
        (
            TileFeatures { tile: tile(0, 0.0, 100.0), features: features(&[(1.0, 2.0), (3.0, 4.0), (5.0, 6.0)]) },
            TileFeatures { tile: tile(1, 200.0, 0.0), features: features(&[(10.0, 20.0), (30.0, 40.0)]) },
        )
    }

    #[derive(Debug, PartialEq)]
    enum Call {
        ExtractAt(usize),
        Load(Slot, usize),
        Match(usize),
    }

    /// Engine returning scripted match lists and recording the call order
    struct ScriptedEngine {
        matches: VecDeque<Vec<Match>>,
        restricted_len: Option<usize>,
        calls: Vec<Call>,
    }

    impl ScriptedEngine {
        fn new(matches: Vec<Vec<Match>>) -> Self {
            Self { matches: matches.into(), restricted_len: None, calls: Vec::new() }
        }
    }

    impl FeatureExtractor for ScriptedEngine {
        fn extract(&mut self, _image: &Path) -> EngineResult<FeatureSet> {
            unreachable!()
        }

        fn extract_at(&mut self, _image: &Path, keypoints: &[Keypoint]) -> EngineResult<FeatureSet> {
            self.calls.push(Call::ExtractAt(keypoints.len()));
            let n = self.restricted_len.unwrap_or(keypoints.len());
            let points: Vec<(f32, f32)> = (0..n).map(|i| (i as f32, 0.0)).collect();
            Ok(features(&points))
        }
    }

    impl DescriptorMatcher for ScriptedEngine {
        fn set_descriptors(&mut self, slot: Slot, features: &FeatureSet) -> EngineResult<()> {
            self.calls.push(Call::Load(slot, features.len()));
            Ok(())
        }

        fn match_loaded(&mut self, max_matches: usize) -> EngineResult<Vec<Match>> {
            self.calls.push(Call::Match(max_matches));
            Ok(self.matches.pop_front().unwrap_or_default())
        }
    }

    impl FeatureEngine for ScriptedEngine {
        fn verify(&mut self) -> EngineResult<()> {
            Ok(())
        }
    }

    fn references(sizes: [usize; 3]) -> ReferenceSet {
        ReferenceSet::from_templates(sizes.map(|n| features(&vec![(0.0, 0.0); n])))
    }

    fn threshold(scf_threshold: usize) -> MatchConfig {
        MatchConfig { scf_threshold, ..Default::default() }
    }

    #[test]
    fn test_resolve_uses_both_tables() {
        let (a, b) = pair();
        let remap = IndexRemap::from_matches(&[Match::new(2, 1), Match::new(0, 0)]);

        let c = resolve(&remap, &a, &b, 0).unwrap();
        assert_eq!((c.x1, c.y1, c.x2, c.y2, c.degraded), (5.0, 106.0, 230.0, 40.0, false));

        let c = resolve(&remap, &a, &b, 1).unwrap();
        assert_eq!((c.x1, c.y1, c.x2, c.y2), (1.0, 102.0, 210.0, 20.0));
    }

    #[test]
    fn test_resolve_refinement_miss_is_skipped() {
        let _ = env_logger::builder().is_test(true).try_init();
        let (a, b) = pair();
        let remap = IndexRemap::from_matches(&[Match::new(0, 0)]);
        assert!(resolve(&remap, &a, &b, 5).is_none());
    }

    #[test]
    fn test_resolve_partner_miss_is_degraded() {
        let _ = env_logger::builder().is_test(true).try_init();
        let (a, b) = pair();
        let remap = IndexRemap::from_parts(vec![1], HashMap::new());
        let c = resolve(&remap, &a, &b, 0).unwrap();
        assert!(c.degraded);
        assert_eq!((c.x1, c.y1, c.x2, c.y2), (3.0, 104.0, 200.0, 0.0));
    }

    #[test]
    fn test_call_order_and_empty_templates() {
        let (a, b) = pair();
        let area = [Match::new(0, 0), Match::new(1, 1)];
        let mut engine = ScriptedEngine::new(vec![vec![Match::new(1, 0)]]);
        let refs = references([4, 0, 0]);
        let config = threshold(0);

        let result = ReferenceVerifier::new(&refs, &config).verify(&mut engine, &a, &b, &area).unwrap();

        assert_eq!(
            engine.calls,
            vec![Call::ExtractAt(2), Call::Load(Slot::Query, 2), Call::Load(Slot::Train, 4), Call::Match(2)]
        );
        assert_eq!(result.template_matches, [1, 0, 0]);
        assert!(result.accepted);
        assert_eq!(result.correspondences.len(), 1);
        assert_eq!(result.correspondences[0].x2, 230.0);
    }

    #[test]
    fn test_scf_gate_is_strict() {
        let (a, b) = pair();
        let area = [Match::new(0, 0), Match::new(1, 1), Match::new(2, 1)];
        let refs = references([3, 3, 3]);
        let config = threshold(3);
        let verifier = ReferenceVerifier::new(&refs, &config);
        let one = |q| vec![Match::new(q, 0)];

        let mut engine = ScriptedEngine::new(vec![one(0), one(1), one(2)]);
        let at = verifier.verify(&mut engine, &a, &b, &area).unwrap();
        assert_eq!(at.scf_sum(), 3);
        assert!(!at.accepted);
        assert!(at.correspondences.is_empty());

        let mut engine = ScriptedEngine::new(vec![one(0), vec![Match::new(1, 0), Match::new(2, 1)], one(2)]);
        let above = verifier.verify(&mut engine, &a, &b, &area).unwrap();
        assert_eq!(above.scf_sum(), 4);
        assert!(above.accepted);
        let xs: Vec<f64> = above.correspondences.iter().map(|c| c.x1).collect();
        assert_eq!(xs, vec![1.0, 3.0, 5.0, 5.0]);
    }

    #[test]
    fn test_degraded_emission_follows_config() {
        let _ = env_logger::builder().is_test(true).try_init();
        let mut a = pair().0;
        let b = pair().1;
        a.features = features(&[(1.0, 1.0)]);
        // partner index 7 does not exist in tile B
        let area = [Match::new(0, 7)];
        let refs = references([1, 0, 0]);

        let config = threshold(0);
        let mut engine = ScriptedEngine::new(vec![vec![Match::new(0, 0)]]);
        let dropped = ReferenceVerifier::new(&refs, &config).verify(&mut engine, &a, &b, &area).unwrap();
        assert_eq!(dropped.degraded, 1);
        assert!(dropped.correspondences.is_empty());

        let config = MatchConfig { emit_degraded: true, ..threshold(0) };
        let mut engine = ScriptedEngine::new(vec![vec![Match::new(0, 0)]]);
        let kept = ReferenceVerifier::new(&refs, &config).verify(&mut engine, &a, &b, &area).unwrap();
        assert_eq!(kept.correspondences.len(), 1);
        assert!(kept.correspondences[0].degraded);
    }

    #[test]
    fn test_restricted_count_mismatch_and_bad_index() {
        let (a, b) = pair();
        let refs = references([1, 1, 1]);
        let config = MatchConfig::default();
        let verifier = ReferenceVerifier::new(&refs, &config);

        let mut engine = ScriptedEngine::new(vec![]);
        engine.restricted_len = Some(1);
        let result = verifier.verify(&mut engine, &a, &b, &[Match::new(0, 0), Match::new(1, 1)]);
        assert!(matches!(
            result,
            Err(MatchError::Engine(EngineError::CountMismatch { expected: 2, actual: 1 }))
        ));

        let mut engine = ScriptedEngine::new(vec![]);
        let result = verifier.verify(&mut engine, &a, &b, &[Match::new(9, 0)]);
        assert!(matches!(result, Err(MatchError::BadMatchIndex { tile: 0, index: 9, len: 3 })));
        assert!(engine.calls.is_empty());
    }
}
