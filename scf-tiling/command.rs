use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use scf_core::{Region, Tile};

/// Command line of the external decoder for one tile.
///
/// Follows `kdu_expand` conventions:
/// `-i <input> -o <output> -region {top,left},{height,width} -quiet`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl DecodeCommand {
    pub fn for_tile(program: &Path, input: &Path, tile: &Tile) -> Self {
        let args = vec![
            "-i".to_string(),
            input.display().to_string(),
            "-o".to_string(),
            tile.path.display().to_string(),
            "-region".to_string(),
            format_region(&tile.region),
            "-quiet".to_string(),
        ];
        Self {
            program: program.to_path_buf(),
            args,
        }
    }

    /// Build a process ready to spawn; stdout is discarded
    pub fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args).stdin(Stdio::null()).stdout(Stdio::null());
        cmd
    }
}

impl fmt::Display for DecodeCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// `{row_frac,col_frac},{row_size,col_size}` with six decimals
pub fn format_region(region: &Region) -> String {
    format!(
        "{{{:.6},{:.6}}},{{{:.6},{:.6}}}",
        region.row_frac, region.col_frac, region.row_size, region.col_size
    )
}
