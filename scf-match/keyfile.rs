//! Lowe's ASCII key format, as written by SIFT command line tools.
//!
//! ```text
//! <count> <dim>
//! <row> <col> <scale> <orientation>
//! <dim integer descriptor components, wrapped over several lines>
//! ...
//! ```
//!
//! Keypoint lists handed to the engine for restricted extraction use the same
//! layout with `dim = 0`.

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use scf_core::{EngineError, EngineResult, FeatureSet, Keypoint, DESCRIPTOR_DIM};

/// Read a key file holding full 128-dimension descriptors
pub fn read_key_file(path: &Path) -> EngineResult<FeatureSet> {
    let text = fs::read_to_string(path).map_err(|source| EngineError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_key_file(&text, path)
}

pub fn parse_key_file(text: &str, path: &Path) -> EngineResult<FeatureSet> {
    let parse_err = |message: String| EngineError::Parse { path: path.to_path_buf(), message };
    let mut tokens = text.split_whitespace();
    let mut header = |what: &str| -> EngineResult<usize> {
        let token = tokens
            .next()
            .ok_or_else(|| parse_err(format!("unexpected end of file reading {what}")))?;
        token
            .parse::<usize>()
            .map_err(|_| parse_err(format!("invalid {what} {token:?}")))
    };

    let count = header("feature count")?;
    let dim = header("descriptor length")?;
    if dim != DESCRIPTOR_DIM && !(count == 0 && dim == 0) {
        return Err(parse_err(format!("descriptor length {dim}, expected {DESCRIPTOR_DIM}")));
    }
    let values = count
        .checked_mul(DESCRIPTOR_DIM)
        .ok_or_else(|| parse_err(format!("feature count {count} out of range")))?;

    let mut next = |what: &str| -> EngineResult<f32> {
        let token = tokens
            .next()
            .ok_or_else(|| parse_err(format!("unexpected end of file reading {what}")))?;
        token
            .parse::<f32>()
            .map_err(|_| parse_err(format!("invalid {what} {token:?}")))
    };

    // a corrupt header must not size the allocation
    let mut keypoints = Vec::with_capacity(count.min(text.len()));
    let mut descriptors = Vec::with_capacity(values.min(text.len()));
    for _ in 0..count {
        let y = next("row")?;
        let x = next("column")?;
        let scale = next("scale")?;
        let orientation = next("orientation")?;
        keypoints.push(Keypoint { x, y, scale, orientation });

        let start = descriptors.len();
        for _ in 0..dim {
            descriptors.push(next("descriptor value")?);
        }
        normalize(&mut descriptors[start..]);
    }

    Ok(FeatureSet::new(keypoints, descriptors)?)
}

fn normalize(descriptor: &mut [f32]) {
    let norm = descriptor.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        descriptor.iter_mut().for_each(|v| *v /= norm);
    }
}

/// Keypoint list for restricted extraction (`dim = 0`)
pub fn format_keypoint_list(keypoints: &[Keypoint]) -> String {
    let mut out = format!("{} 0\n", keypoints.len());
    for kp in keypoints {
        let _ = writeln!(out, "{} {} {} {}", kp.y, kp.x, kp.scale, kp.orientation);
    }
    out
}

pub fn write_keypoint_list(path: &Path, keypoints: &[Keypoint]) -> EngineResult<()> {
    fs::write(path, format_keypoint_list(keypoints)).map_err(|source| EngineError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Full key file; descriptors are scaled to integers the way SIFT tools save them
pub fn format_key_file(features: &FeatureSet) -> String {
    let mut out = format!("{} {}\n", features.len(), DESCRIPTOR_DIM);
    for (i, kp) in features.keypoints().iter().enumerate() {
        let _ = writeln!(out, "{} {} {} {}", kp.y, kp.x, kp.scale, kp.orientation);
        if let Some(d) = features.descriptor(i) {
            for line in d.chunks(20) {
                let values: Vec<String> = line.iter().map(|v| ((v * 512.0).round() as i32).to_string()).collect();
                let _ = writeln!(out, " {}", values.join(" "));
            }
        }
    }
    out
}
