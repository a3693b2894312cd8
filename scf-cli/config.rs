use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use scf_core::MatchConfig;
use scf_match::{MatcherParams, REFERENCE_COUNT};
use scf_tiling::TilePattern;
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Cannot access config file {path:?}: {source}")]
    Io { path: PathBuf, source: io::Error },

    #[error("Invalid TOML config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Cannot serialize config as TOML: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("Invalid JSON config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unknown config format for {0:?} (expected .toml or .json)")]
    UnknownFormat(PathBuf),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// One source image and where its tiles go
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageConfig {
    pub path: PathBuf,
    /// Pixel size; read from the image header when omitted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    /// Tile file template with `{col}` and `{row}` placeholders
    pub tile_pattern: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridConfig {
    pub columns: u32,
    pub rows: u32,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self { columns: 5, rows: 5 }
    }
}

/// How tile images are produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum DecoderConfig {
    /// External `kdu_expand` style region decoder
    Kakadu {
        program: PathBuf,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout_secs: Option<u64>,
    },
    /// Crop in process with the `image` crate
    Native,
}

impl DecoderConfig {
    pub fn timeout(&self) -> Option<Duration> {
        match self {
            DecoderConfig::Kakadu { timeout_secs, .. } => timeout_secs.map(Duration::from_secs),
            DecoderConfig::Native => None,
        }
    }
}

impl Default for DecoderConfig {
    fn default() -> Self {
        DecoderConfig::Kakadu {
            program: PathBuf::from("kdu_expand"),
            timeout_secs: Some(600),
        }
    }
}

/// External SIFT program and matcher settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub program: PathBuf,
    /// Arguments for full extraction (`{image}`, `{output}`)
    pub extract_args: Vec<String>,
    /// Arguments for extraction at given keypoints (`{image}`, `{keypoints}`, `{output}`)
    pub restricted_args: Vec<String>,
    /// Kill one extraction after this many seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    pub matcher: MatcherParams,
}

impl EngineConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from("sift"),
            extract_args: vec!["{image}".into(), "{output}".into()],
            restricted_args: vec![
                "--keypoints".into(),
                "{keypoints}".into(),
                "{image}".into(),
                "{output}".into(),
            ],
            timeout_secs: Some(600),
            matcher: MatcherParams::default(),
        }
    }
}

/// Complete run configuration, built once and read-only afterwards
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Correspondence file, one `x1 y1 x2 y2` line per point pair
    pub output: PathBuf,
    /// Reference template images
    pub references: [PathBuf; REFERENCE_COUNT],
    /// Worker threads for tile decoding and matching (all cores when omitted)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threads: Option<usize>,
    /// Leave decoded tile files on disk after the run
    pub keep_tiles: bool,
    pub image_a: ImageConfig,
    pub image_b: ImageConfig,
    pub grid: GridConfig,
    pub thresholds: MatchConfig,
    pub decoder: DecoderConfig,
    pub engine: EngineConfig,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            output: PathBuf::from("../data/matching_points.txt"),
            references: [
                PathBuf::from("../data/RefSCF/ref-sphere-3.pgm"),
                PathBuf::from("../data/RefSCF/ref-sphere-5.pgm"),
                PathBuf::from("../data/RefSCF/ref-sphere-6.pgm"),
            ],
            threads: None,
            keep_tiles: true,
            image_a: ImageConfig {
                path: PathBuf::from("../data/Image1/upleft.JP2"),
                width: Some(5012),
                height: Some(5000),
                tile_pattern: "../data/Image1/img-{col}-{row}.pgm".into(),
            },
            image_b: ImageConfig {
                path: PathBuf::from("../data/Image2/shifted.JP2"),
                width: Some(5012),
                height: Some(5000),
                tile_pattern: "../data/Image2/img-{col}-{row}.pgm".into(),
            },
            grid: GridConfig::default(),
            thresholds: MatchConfig::default(),
            decoder: DecoderConfig::default(),
            engine: EngineConfig::default(),
        }
    }
}

impl RunConfig {
    /// Generate human-readable summary
    pub fn summary(&self) -> String {
        let size = |img: &ImageConfig| match (img.width, img.height) {
            (Some(w), Some(h)) => format!("{w}x{h}"),
            _ => "auto".to_string(),
        };
        format!(
            "RunConfig: A={} ({}), B={} ({}), grid={}x{}, thresholds=[area:{}, scf:{}], decoder={}, engine={}",
            self.image_a.path.display(),
            size(&self.image_a),
            self.image_b.path.display(),
            size(&self.image_b),
            self.grid.columns,
            self.grid.rows,
            self.thresholds.area_threshold,
            self.thresholds.scf_threshold,
            match &self.decoder {
                DecoderConfig::Kakadu { program, .. } => program.display().to_string(),
                DecoderConfig::Native => "native".to_string(),
            },
            self.engine.program.display()
        )
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> ConfigResult<()> {
        if self.grid.columns == 0 || self.grid.rows == 0 {
            return Err(ConfigError::Invalid(format!(
                "grid {}x{} must have at least one column and row",
                self.grid.columns, self.grid.rows
            )));
        }
        for (name, image) in [("image_a", &self.image_a), ("image_b", &self.image_b)] {
            if image.path.as_os_str().is_empty() {
                return Err(ConfigError::Invalid(format!("{name}.path is empty")));
            }
            if image.width == Some(0) || image.height == Some(0) {
                return Err(ConfigError::Invalid(format!("{name} has a zero dimension")));
            }
            TilePattern::new(image.tile_pattern.as_str())
                .map_err(|e| ConfigError::Invalid(format!("{name}.tile_pattern: {e}")))?;
        }
        if self.image_a.tile_pattern == self.image_b.tile_pattern {
            return Err(ConfigError::Invalid("both images write tiles to the same pattern".into()));
        }
        if self.references.iter().any(|r| r.as_os_str().is_empty()) {
            return Err(ConfigError::Invalid("reference template path is empty".into()));
        }
        if self.output.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("output path is empty".into()));
        }
        if self.threads == Some(0) {
            return Err(ConfigError::Invalid("threads must be at least 1".into()));
        }
        if self.engine.extract_args.iter().all(|a| !a.contains("{output}"))
            || self.engine.restricted_args.iter().all(|a| !a.contains("{output}"))
        {
            return Err(ConfigError::Invalid("engine arguments must contain {output}".into()));
        }
        if self.engine.restricted_args.iter().all(|a| !a.contains("{keypoints}")) {
            return Err(ConfigError::Invalid("engine.restricted_args must contain {keypoints}".into()));
        }
        if let DecoderConfig::Kakadu { timeout_secs: Some(0), .. } = self.decoder {
            return Err(ConfigError::Invalid("decoder timeout must be positive".into()));
        }
        if self.engine.timeout_secs == Some(0) {
            return Err(ConfigError::Invalid("engine timeout must be positive".into()));
        }
        Ok(())
    }

    /// Load from `.toml` or `.json`, chosen by extension
    pub fn load<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let path = path.as_ref();
        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Self::load_toml(path),
            Some("json") => Self::load_json(path),
            _ => Err(ConfigError::UnknownFormat(path.to_path_buf())),
        }
    }

    /// Save to `.toml` or `.json`, chosen by extension
    pub fn save<P: AsRef<Path>>(&self, path: P) -> ConfigResult<()> {
        let path = path.as_ref();
        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => self.save_toml(path),
            Some("json") => self.save_json(path),
            _ => Err(ConfigError::UnknownFormat(path.to_path_buf())),
        }
    }

    /// Save configuration to JSON file
    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> ConfigResult<()> {
        write_file(path.as_ref(), &self.to_json()?)
    }

    /// Load configuration from JSON file
    pub fn load_json<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        Self::from_json(&read_file(path.as_ref())?)
    }

    /// Save configuration to TOML file
    pub fn save_toml<P: AsRef<Path>>(&self, path: P) -> ConfigResult<()> {
        write_file(path.as_ref(), &self.to_toml()?)
    }

    /// Load configuration from TOML file
    pub fn load_toml<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        Self::from_toml(&read_file(path.as_ref())?)
    }

    pub fn to_json(&self) -> ConfigResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> ConfigResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> ConfigResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn from_toml(toml_str: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }
}

fn read_file(path: &Path) -> ConfigResult<String> {
    std::fs::read_to_string(path).map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })
}

fn write_file(path: &Path, content: &str) -> ConfigResult<()> {
    std::fs::write(path, content).map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })
}
