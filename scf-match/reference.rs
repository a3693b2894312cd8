use std::path::PathBuf;

use log::{info, warn};
use scf_core::{FeatureExtractor, FeatureSet};

/// Number of reference templates a tile pair is verified against
pub const REFERENCE_COUNT: usize = 3;

/// Features of the reference templates, one slot per template.
///
/// A slot stays empty when its template could not be read or has no
/// features; it then contributes no matches.
#[derive(Debug, Clone, Default)]
pub struct ReferenceSet {
    templates: [FeatureSet; REFERENCE_COUNT],
}

impl ReferenceSet {
    /// Extract all templates in one batch call
    pub fn load<E: FeatureExtractor + ?Sized>(extractor: &mut E, paths: &[PathBuf; REFERENCE_COUNT]) -> Self {
        let mut results = extractor.extract_batch(paths).into_iter();
        let templates = std::array::from_fn(|i| match results.next() {
            Some(Ok(features)) => features,
            Some(Err(e)) => {
                warn!("Reference template {} skipped: {}", paths[i].display(), e);
                FeatureSet::empty()
            }
            None => {
                warn!("No result for reference template {}", paths[i].display());
                FeatureSet::empty()
            }
        });

        let set = Self { templates };
        info!(
            "Loaded {} reference templates, features per template: {:?}",
            REFERENCE_COUNT,
            set.templates.iter().map(FeatureSet::len).collect::<Vec<_>>()
        );
        set
    }

    pub fn from_templates(templates: [FeatureSet; REFERENCE_COUNT]) -> Self {
        Self { templates }
    }

    pub fn templates(&self) -> &[FeatureSet; REFERENCE_COUNT] {
        &self.templates
    }

    pub fn get(&self, index: usize) -> Option<&FeatureSet> {
        self.templates.get(index)
    }

    /// Templates that actually hold features
    pub fn populated(&self) -> usize {
        self.templates.iter().filter(|t| !t.is_empty()).count()
    }
}
