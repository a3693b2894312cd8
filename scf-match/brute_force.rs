use rayon::prelude::*;
use scf_core::{DescriptorMatcher, EngineError, EngineResult, FeatureSet, Match, Slot, DESCRIPTOR_DIM};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Acceptance rules of the nearest-neighbour matcher
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct MatcherParams {
    /// Largest accepted angle (radians) between matched unit descriptors
    pub distance_max: f32,
    /// Best angle must be below `ratio_max` times the second best
    pub ratio_max: f32,
    /// Keep `(i, j)` only if `i` is also the nearest neighbour of `j`
    pub mutual_best: bool,
}

impl Default for MatcherParams {
    fn default() -> Self {
        Self {
            distance_max: 0.7,
            ratio_max: 0.8,
            mutual_best: true,
        }
    }
}

/// CPU descriptor matcher with a two-slot context.
///
/// Descriptors are normalized to unit length when loaded and compared by the
/// angle between them.
#[derive(Debug, Clone, Default)]
pub struct BruteForceMatcher {
    params: MatcherParams,
    slots: [Option<Vec<f32>>; 2],
}

impl BruteForceMatcher {
    pub fn new(params: MatcherParams) -> Self {
        Self { params, slots: [None, None] }
    }

    pub fn params(&self) -> &MatcherParams {
        &self.params
    }

    /// Number of descriptors loaded in a slot
    pub fn loaded(&self, slot: Slot) -> Option<usize> {
        self.slots[slot as usize].as_ref().map(|d| d.len() / DESCRIPTOR_DIM)
    }

    fn normalized(descriptors: &[f32]) -> Vec<f32> {
        let mut out = descriptors.to_vec();
        for d in out.chunks_exact_mut(DESCRIPTOR_DIM) {
            let norm = d.iter().map(|v| v * v).sum::<f32>().sqrt();
            if norm > 0.0 {
                d.iter_mut().for_each(|v| *v /= norm);
            }
        }
        out
    }

    /// Best index with its dot product, plus the second best dot product
    fn nearest(descriptor: &[f32], candidates: &[f32]) -> Option<(usize, f32, f32)> {
        let mut best: Option<(usize, f32)> = None;
        let mut second = -1.0f32;
        for (j, c) in candidates.chunks_exact(DESCRIPTOR_DIM).enumerate() {
            let dot: f32 = descriptor.iter().zip(c).map(|(a, b)| a * b).sum();
            match best {
                Some((_, b)) if dot <= b => second = second.max(dot),
                Some((_, b)) => {
                    second = b;
                    best = Some((j, dot));
                }
                None => best = Some((j, dot)),
            }
        }
        best.map(|(j, dot)| (j, dot, second))
    }

    fn angle(dot: f32) -> f32 {
        dot.clamp(-1.0, 1.0).acos()
    }
}

impl DescriptorMatcher for BruteForceMatcher {
    fn set_descriptors(&mut self, slot: Slot, features: &FeatureSet) -> EngineResult<()> {
        self.slots[slot as usize] = Some(Self::normalized(features.descriptors()));
        Ok(())
    }

    fn match_loaded(&mut self, max_matches: usize) -> EngineResult<Vec<Match>> {
        let query = self.slots[0].as_deref().ok_or(EngineError::SlotEmpty(Slot::Query))?;
        let train = self.slots[1].as_deref().ok_or(EngineError::SlotEmpty(Slot::Train))?;
        if query.is_empty() || train.is_empty() || max_matches == 0 {
            return Ok(Vec::new());
        }

        let params = self.params;
        let candidates: Vec<Match> = query
            .par_chunks_exact(DESCRIPTOR_DIM)
            .enumerate()
            .filter_map(|(i, d)| {
                let (j, best, second) = Self::nearest(d, train)?;
                let (d1, d2) = (Self::angle(best), Self::angle(second));
                (d1 < params.distance_max && d1 < params.ratio_max * d2).then_some(Match::new(i, j))
            })
            .collect();

        let mut matches: Vec<Match> = if params.mutual_best {
            candidates
                .into_par_iter()
                .filter(|m| {
                    let d = &train[m.train * DESCRIPTOR_DIM..(m.train + 1) * DESCRIPTOR_DIM];
                    Self::nearest(d, query).is_some_and(|(i, _, _)| i == m.query)
                })
                .collect()
        } else {
            candidates
        };

        matches.truncate(max_matches);
        Ok(matches)
    }
}
