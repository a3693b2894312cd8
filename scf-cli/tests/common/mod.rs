#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use image::{GrayImage, Luma};
use scf_cli::{build_partitioner, DecoderConfig, GridConfig, ImageConfig, RunConfig, IMAGE_A, IMAGE_B};
use scf_core::{
    DescriptorMatcher, EngineError, EngineResult, FeatureEngine, FeatureExtractor, FeatureSet, Keypoint, Match, Slot,
    Tile, DESCRIPTOR_DIM,
};

pub const WIDTH: u32 = 200;
pub const HEIGHT: u32 = 100;

/// Descriptor that only equals the descriptor of the same feature id
pub fn descriptor(id: usize) -> Vec<f32> {
    let mut d = vec![0.0; DESCRIPTOR_DIM];
    d[0] = id as f32;
    d[1] = 1.0;
    d
}

pub fn feature_set(features: &[(usize, f32, f32)]) -> FeatureSet {
    let mut set = FeatureSet::empty();
    for &(id, x, y) in features {
        set.push(Keypoint::new(x, y), &descriptor(id)).unwrap();
    }
    set
}

/// Deterministic engine: features come from a table keyed by image path and
/// descriptors match only when they are bit-identical.
#[derive(Default)]
pub struct ScriptedEngine {
    pub images: HashMap<PathBuf, FeatureSet>,
    pub fail_verify: bool,
    slots: [FeatureSet; 2],
    pub extract_calls: Vec<PathBuf>,
    pub restricted_calls: usize,
    pub match_calls: usize,
}

impl ScriptedEngine {
    pub fn with_image(mut self, path: impl Into<PathBuf>, features: FeatureSet) -> Self {
        self.images.insert(path.into(), features);
        self
    }
}

fn key(d: &[f32]) -> Vec<u32> {
    d.iter().map(|v| v.to_bits()).collect()
}

impl FeatureExtractor for ScriptedEngine {
    fn extract(&mut self, image: &Path) -> EngineResult<FeatureSet> {
        self.extract_calls.push(image.to_path_buf());
        Ok(self.images.get(image).cloned().unwrap_or_default())
    }

    fn extract_at(&mut self, image: &Path, keypoints: &[Keypoint]) -> EngineResult<FeatureSet> {
        self.restricted_calls += 1;
        let source = self.images.get(image).ok_or_else(|| EngineError::Parse {
            path: image.to_path_buf(),
            message: "unknown image".into(),
        })?;
        let mut out = FeatureSet::empty();
        for kp in keypoints {
            let i = source
                .keypoints()
                .iter()
                .position(|k| k.x == kp.x && k.y == kp.y)
                .ok_or_else(|| EngineError::Verification(format!("no keypoint at {},{}", kp.x, kp.y)))?;
            out.push(*kp, source.descriptor(i).unwrap_or_default())?;
        }
        Ok(out)
    }
}

impl DescriptorMatcher for ScriptedEngine {
    fn set_descriptors(&mut self, slot: Slot, features: &FeatureSet) -> EngineResult<()> {
        self.slots[slot as usize] = features.clone();
        Ok(())
    }

    fn match_loaded(&mut self, max_matches: usize) -> EngineResult<Vec<Match>> {
        self.match_calls += 1;
        let [query, train] = &self.slots;
        let mut by_descriptor = HashMap::new();
        for j in 0..train.len() {
            by_descriptor.entry(key(train.descriptor(j).unwrap_or_default())).or_insert(j);
        }
        Ok((0..query.len())
            .filter_map(|i| {
                let j = by_descriptor.get(&key(query.descriptor(i).unwrap_or_default()))?;
                Some(Match::new(i, *j))
            })
            .take(max_matches)
            .collect())
    }
}

impl FeatureEngine for ScriptedEngine {
    fn verify(&mut self) -> EngineResult<()> {
        if self.fail_verify {
            return Err(EngineError::Verification("scripted context failure".into()));
        }
        Ok(())
    }
}

/// Two 200x100 source images in `dir`, 2x2 grid, native decoding
pub fn scene_config(dir: &Path) -> RunConfig {
    for name in ["a.png", "b.png"] {
        GrayImage::from_pixel(WIDTH, HEIGHT, Luma([128])).save(dir.join(name)).unwrap();
    }
    let image = |name: &str, tiles: &str| ImageConfig {
        path: dir.join(name),
        width: None,
        height: None,
        tile_pattern: dir.join(tiles).join("img-{col}-{row}.png").display().to_string(),
    };

    RunConfig {
        output: dir.join("matching_points.txt"),
        references: [dir.join("ref-1.pgm"), dir.join("ref-2.pgm"), dir.join("ref-3.pgm")],
        threads: None,
        keep_tiles: true,
        image_a: image("a.png", "tiles-a"),
        image_b: image("b.png", "tiles-b"),
        grid: GridConfig { columns: 2, rows: 2 },
        decoder: DecoderConfig::Native,
        ..RunConfig::default()
    }
}

pub fn tile(config: &RunConfig, image_id: usize, column: u32, row: u32) -> Tile {
    let image = if image_id == IMAGE_A { &config.image_a } else { &config.image_b };
    build_partitioner(image, config.grid).unwrap().tile(image_id, column, row)
}

/// Local keypoints of the shared feature ids, inside a 100x50 tile
pub fn shared_features(count: usize, x_scale: f32) -> Vec<(usize, f32, f32)> {
    (0..count)
        .map(|i| (i, (i % 100) as f32 * x_scale + 0.25, (i / 100) as f32 * 2.0 + 0.5))
        .collect()
}

/// Scene with `shared` identical features between tile (0,1) of A and tile
/// (1,0) of B, unrelated features elsewhere, one featureless tile per image,
/// and `template_overlap` of the shared features in the first template.
pub fn scene_engine(config: &RunConfig, shared: usize, template_overlap: usize) -> ScriptedEngine {
    let unrelated = |base: usize| -> FeatureSet {
        feature_set(&(0..40).map(|k| (base + k, k as f32 * 2.0, 10.0)).collect::<Vec<_>>())
    };

    let template = feature_set(
        &(0..template_overlap)
            .map(|i| (i, (i % 10) as f32, (i / 10) as f32))
            .collect::<Vec<_>>(),
    );

    ScriptedEngine::default()
        .with_image(tile(config, IMAGE_A, 0, 0).path, unrelated(100_000))
        .with_image(tile(config, IMAGE_A, 0, 1).path, feature_set(&shared_features(shared, 1.0)))
        .with_image(tile(config, IMAGE_A, 1, 0).path, unrelated(101_000))
        // tile (1,1) of A has no features
        .with_image(tile(config, IMAGE_B, 0, 0).path, unrelated(200_000))
        .with_image(tile(config, IMAGE_B, 1, 0).path, feature_set(&shared_features(shared, 0.9)))
        .with_image(tile(config, IMAGE_B, 1, 1).path, unrelated(201_000))
        // tile (0,1) of B has no features
        .with_image(&config.references[0], template)
        .with_image(&config.references[1], FeatureSet::empty())
        .with_image(&config.references[2], FeatureSet::empty())
}

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}
