use std::env;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;

use log::debug;
use scf_core::{EngineError, EngineResult, FeatureExtractor, FeatureSet, Keypoint};
use wait_timeout::ChildExt;

use crate::keyfile::{read_key_file, write_keypoint_list};

/// Feature extraction through an external SIFT program.
///
/// Argument templates may use `{image}`, `{output}` and, for restricted
/// extraction, `{keypoints}`. The program must write a Lowe key file to
/// `{output}`; restricted runs receive the keypoint list at `{keypoints}` and
/// must describe exactly those keypoints in the same order.
#[derive(Debug, Clone)]
pub struct SiftCommand {
    program: PathBuf,
    extract_args: Vec<String>,
    restricted_args: Vec<String>,
    work_dir: Option<PathBuf>,
    timeout: Option<Duration>,
}

impl SiftCommand {
    pub fn new(program: impl Into<PathBuf>, extract_args: Vec<String>, restricted_args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            extract_args,
            restricted_args,
            work_dir: None,
            timeout: None,
        }
    }

    /// Kill the program if one extraction runs longer than `timeout`
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Directory for the temporary key files (system temp dir otherwise)
    pub fn with_work_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.work_dir = dir;
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Locate the program: as given if it has a directory part, else on `PATH`
    pub fn resolve_program(&self) -> Option<PathBuf> {
        if self.program.components().count() > 1 {
            return self.program.is_file().then(|| self.program.clone());
        }
        let paths = env::var_os("PATH")?;
        env::split_paths(&paths)
            .map(|dir| dir.join(&self.program))
            .find(|candidate| candidate.is_file())
    }

    fn render(template: &[String], image: &Path, output: &Path, keypoints: Option<&Path>) -> Vec<String> {
        template
            .iter()
            .map(|arg| {
                let arg = arg
                    .replace("{image}", &image.display().to_string())
                    .replace("{output}", &output.display().to_string());
                match keypoints {
                    Some(k) => arg.replace("{keypoints}", &k.display().to_string()),
                    None => arg,
                }
            })
            .collect()
    }

    fn scratch_dir(&self) -> EngineResult<tempfile::TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("scf-sift-");
        let dir = match &self.work_dir {
            Some(dir) => builder.tempdir_in(dir),
            None => builder.tempdir(),
        };
        dir.map_err(|source| EngineError::Io {
            path: self.work_dir.clone().unwrap_or_else(env::temp_dir),
            source,
        })
    }

    fn run(&self, args: &[String]) -> EngineResult<()> {
        debug!("{} {}", self.program.display(), args.join(" "));
        let mut child = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .spawn()
            .map_err(|source| EngineError::Spawn { program: self.program.clone(), source })?;

        let io_err = |source| EngineError::Io { path: self.program.clone(), source };
        let status = match self.timeout {
            None => child.wait().map_err(io_err)?,
            Some(timeout) => match child.wait_timeout(timeout).map_err(io_err)? {
                Some(status) => status,
                None => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(EngineError::Timeout { program: self.program.clone(), timeout });
                }
            },
        };
        if !status.success() {
            return Err(EngineError::Failed { program: self.program.clone(), status });
        }
        Ok(())
    }
}

impl FeatureExtractor for SiftCommand {
    fn extract(&mut self, image: &Path) -> EngineResult<FeatureSet> {
        let scratch = self.scratch_dir()?;
        let output = scratch.path().join("features.key");
        self.run(&Self::render(&self.extract_args, image, &output, None))?;
        read_key_file(&output)
    }

    fn extract_at(&mut self, image: &Path, keypoints: &[Keypoint]) -> EngineResult<FeatureSet> {
        let scratch = self.scratch_dir()?;
        let list = scratch.path().join("keypoints.key");
        let output = scratch.path().join("features.key");
        write_keypoint_list(&list, keypoints)?;

        self.run(&Self::render(&self.restricted_args, image, &output, Some(&list)))?;
        let features = read_key_file(&output)?;
        if features.len() != keypoints.len() {
            return Err(EngineError::CountMismatch {
                expected: keypoints.len(),
                actual: features.len(),
            });
        }
        Ok(features)
    }
}
