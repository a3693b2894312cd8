use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use log::{info, warn};
use scf_core::{EngineError, FeatureEngine, MatchConfig};
use scf_match::{
    CorrespondenceEmitter, ExternalEngine, MatchError, MatchReport, PairwiseMatcher, ReferenceSet, SiftCommand,
    REFERENCE_COUNT,
};
use scf_tiling::{
    decode_tiles, probe_dimensions, GridSpec, ImageFeatureIndex, KakaduDecoder, NativeDecoder, TileDecoder, TileError,
    TileFeatureStore, TilePartitioner, TilePattern,
};

pub mod config;
pub mod overlay;

pub use config::{ConfigError, ConfigResult, DecoderConfig, EngineConfig, GridConfig, ImageConfig, RunConfig};
pub use scf_core::{self, Correspondence, FeatureSet, Keypoint, Match};

/// Image ids used for the two inputs
pub const IMAGE_A: usize = 1;
pub const IMAGE_B: usize = 2;

#[derive(Debug, thiserror::Error)]
pub enum ScfError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Feature engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Tiling error: {0}")]
    Tile(#[from] TileError),

    #[error("Matching error: {0}")]
    Match(#[from] MatchError),

    #[error("Thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("Image error on {path:?}: {source}")]
    Image { path: PathBuf, source: image::ImageError },

    #[error("I/O error on {path:?}: {source}")]
    Io { path: PathBuf, source: io::Error },
}

pub type ScfResult<T> = Result<T, ScfError>;

/// Stage counts of a finished run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOutcome {
    pub tiles_a: usize,
    pub tiles_b: usize,
    pub features_a: usize,
    pub features_b: usize,
    pub references: usize,
    pub report: MatchReport,
}

/// Tiling and matching pipeline that owns the feature engine.
///
/// Every engine call goes through `&mut self`, so extraction and matching
/// are serialized; only tile decoding runs in parallel.
pub struct ScfPipeline<E: FeatureEngine> {
    engine: E,
    config: MatchConfig,
}

impl<E: FeatureEngine> ScfPipeline<E> {
    /// Verify the engine and take ownership of it
    pub fn new(mut engine: E, config: MatchConfig) -> ScfResult<Self> {
        engine.verify()?;
        Ok(Self { engine, config })
    }

    /// Decode the tiles of one image and index their features
    pub fn index_image<D: TileDecoder + ?Sized>(
        &mut self,
        image_id: usize,
        partitioner: &TilePartitioner,
        decoder: &D,
    ) -> ImageFeatureIndex {
        let tiles = decode_tiles(decoder, partitioner.partition(image_id));
        info!(
            "Image {}: {} of {} tiles decoded",
            image_id,
            tiles.len(),
            partitioner.tile_count()
        );
        let index = TileFeatureStore::build(&mut self.engine, image_id, tiles, partitioner.grid().columns);
        info!(
            "Image {}: {} tiles with {} features",
            image_id,
            index.len(),
            index.feature_count()
        );
        index
    }

    pub fn load_references(&mut self, paths: &[PathBuf; REFERENCE_COUNT]) -> ReferenceSet {
        ReferenceSet::load(&mut self.engine, paths)
    }

    /// Match every tile pair and write the accepted correspondences
    pub fn match_images<W: Write>(
        &mut self,
        image_a: &ImageFeatureIndex,
        image_b: &ImageFeatureIndex,
        references: &ReferenceSet,
        emitter: &mut CorrespondenceEmitter<W>,
    ) -> ScfResult<MatchReport> {
        let matcher = PairwiseMatcher::new(&self.config, references);
        Ok(matcher.run(&mut self.engine, image_a, image_b, emitter)?)
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn config(&self) -> &MatchConfig {
        &self.config
    }

    pub fn into_engine(self) -> E {
        self.engine
    }
}

/// Engine described by the configuration
pub fn build_engine(config: &RunConfig) -> ExternalEngine {
    let engine = &config.engine;
    let command = SiftCommand::new(&engine.program, engine.extract_args.clone(), engine.restricted_args.clone())
        .with_timeout(engine.timeout());
    ExternalEngine::new(command, engine.matcher)
}

/// Decoder for one source image
pub fn build_decoder(decoder: &DecoderConfig, source: &Path) -> ScfResult<Box<dyn TileDecoder>> {
    Ok(match decoder {
        DecoderConfig::Kakadu { program, .. } => {
            Box::new(KakaduDecoder::new(program, source).with_timeout(decoder.timeout()))
        }
        DecoderConfig::Native => Box::new(NativeDecoder::open(source)?),
    })
}

/// Grid over one image; missing dimensions are read from the image header
pub fn build_partitioner(image: &ImageConfig, grid: GridConfig) -> ScfResult<TilePartitioner> {
    let (width, height) = match (image.width, image.height) {
        (Some(w), Some(h)) => (w, h),
        (w, h) => {
            let (pw, ph) = probe_dimensions(&image.path)?;
            (w.unwrap_or(pw), h.unwrap_or(ph))
        }
    };
    Ok(TilePartitioner::new(
        width,
        height,
        GridSpec::new(grid.columns, grid.rows),
        TilePattern::new(image.tile_pattern.as_str())?,
    )?)
}

/// Run the whole pipeline with the configured external engine
pub fn run(config: &RunConfig) -> ScfResult<RunOutcome> {
    run_with_engine(config, build_engine(config))
}

/// Run the whole pipeline with a given engine.
///
/// Configuration, engine verification and the output file are checked before
/// any tile is decoded; failures there abort the run.
pub fn run_with_engine<E: FeatureEngine>(config: &RunConfig, engine: E) -> ScfResult<RunOutcome> {
    config.validate()?;
    info!("{}", config.summary());

    let mut pipeline = ScfPipeline::new(engine, config.thresholds.clone())?;
    let partitioners = [
        build_partitioner(&config.image_a, config.grid)?,
        build_partitioner(&config.image_b, config.grid)?,
    ];
    let decoders = [
        build_decoder(&config.decoder, &config.image_a.path)?,
        build_decoder(&config.decoder, &config.image_b.path)?,
    ];
    // truncates previous results
    let mut emitter = CorrespondenceEmitter::create(&config.output)?;

    let mut indexes = Vec::with_capacity(2);
    for ((image_id, partitioner), decoder) in [IMAGE_A, IMAGE_B].into_iter().zip(&partitioners).zip(&decoders) {
        indexes.push(pipeline.index_image(image_id, partitioner, decoder.as_ref()));
    }
    let (index_a, index_b) = (&indexes[0], &indexes[1]);

    let references = pipeline.load_references(&config.references);
    let report = pipeline.match_images(index_a, index_b, &references, &mut emitter)?;
    emitter.finish()?;
    info!("{} correspondences written to {}", report.correspondences, config.output.display());

    if !config.keep_tiles {
        for (image_id, partitioner) in [IMAGE_A, IMAGE_B].into_iter().zip(&partitioners) {
            remove_tiles(partitioner, image_id);
        }
    }

    Ok(RunOutcome {
        tiles_a: index_a.len(),
        tiles_b: index_b.len(),
        features_a: index_a.feature_count(),
        features_b: index_b.feature_count(),
        references: references.populated(),
        report,
    })
}

/// Delete the decoded tile files of one image
fn remove_tiles(partitioner: &TilePartitioner, image_id: usize) {
    for tile in partitioner.partition(image_id) {
        match fs::remove_file(&tile.path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!("Cannot remove tile {}: {}", tile.path.display(), e),
        }
    }
}

/// Parse a correspondence file written by a previous run
pub fn read_correspondences(path: &Path) -> ScfResult<Vec<Correspondence>> {
    let text = fs::read_to_string(path).map_err(|source| ScfError::Io { path: path.to_path_buf(), source })?;
    let mut out = Vec::new();
    for (n, line) in text.lines().enumerate() {
        let values = line.split_whitespace().map(str::parse).collect::<Result<Vec<f64>, _>>();
        match values.as_deref() {
            Ok(&[x1, y1, x2, y2]) => out.push(Correspondence { x1, y1, x2, y2, degraded: false }),
            Ok(&[]) => {}
            _ => warn!("{}:{}: malformed correspondence {:?}", path.display(), n + 1, line),
        }
    }
    Ok(out)
}
