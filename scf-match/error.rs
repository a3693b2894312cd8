use std::io;
use std::path::PathBuf;

use scf_core::EngineError;

#[derive(Debug, thiserror::Error)]
pub enum MatchError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("Cannot open correspondence output {path:?}: {source}")]
    Output { path: PathBuf, source: io::Error },

    #[error("Failed to write correspondences: {0}")]
    Write(#[from] io::Error),

    #[error("Match refers to keypoint {index} of tile {tile}, which has {len} keypoints")]
    BadMatchIndex { tile: usize, index: usize, len: usize },
}

pub type MatchResult<T> = Result<T, MatchError>;
