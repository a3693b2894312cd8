use std::fmt::Write as _;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use scf_core::Correspondence;

use crate::error::{MatchError, MatchResult};

/// Append-only correspondence output, one `x1 y1 x2 y2` line per point pair
pub struct CorrespondenceEmitter<W: Write> {
    out: BufWriter<W>,
    written: usize,
}

impl CorrespondenceEmitter<File> {
    /// Create (or truncate) the output file
    pub fn create(path: &Path) -> MatchResult<Self> {
        let file = File::create(path).map_err(|source| MatchError::Output {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::new(file))
    }
}

impl<W: Write> CorrespondenceEmitter<W> {
    pub fn new(inner: W) -> Self {
        Self { out: BufWriter::new(inner), written: 0 }
    }

    /// Write the correspondences of one tile pair as a single block
    pub fn emit_block(&mut self, block: &[Correspondence]) -> MatchResult<()> {
        if block.is_empty() {
            return Ok(());
        }
        let mut text = String::with_capacity(block.len() * 32);
        for c in block {
            let _ = writeln!(text, "{c}");
        }
        self.out.write_all(text.as_bytes())?;
        self.written += block.len();
        Ok(())
    }

    /// Lines written so far
    pub fn written(&self) -> usize {
        self.written
    }

    /// Flush and hand back the underlying writer
    pub fn finish(self) -> MatchResult<W> {
        self.out.into_inner().map_err(|e| MatchError::Write(e.into_error()))
    }
}
