//! The external media engine (ffmpeg) and the job runner that drives it.

pub mod command;
pub mod job;
pub mod runner;

use std::path::{Path, PathBuf};
use std::process::Stdio;
use thiserror::Error;
use tokio::process::Command;

pub use command::EngineCommand;
pub use job::{CancelReason, CompletedJob, JobFailure, JobState, Outcome, ProgressEvent};
pub use runner::{JobHandle, JobRunner};

const ENGINE_BINARY: &str = "ffmpeg";

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("media engine not found")]
    NotFound,

    #[error("media engine unavailable")]
    Unavailable,

    #[error("pipeline reads an upload but the workspace has no input file")]
    MissingInput,

    #[error("failed to run media engine: {0}")]
    Io(#[from] std::io::Error),
}

/// Location of the engine binary.
#[derive(Debug, Clone)]
pub struct Engine {
    program: PathBuf,
    preamble: Vec<String>,
}

impl Engine {
    /// Use `explicit` when it points at an existing file, otherwise look
    /// `ffmpeg` up on PATH.
    pub fn discover(explicit: Option<&Path>) -> Result<Self, EngineError> {
        if let Some(path) = explicit {
            if path.is_file() {
                return Ok(Self::at(path));
            }
            tracing::warn!("Configured engine path {} does not exist", path.display());
        }
        which::which(ENGINE_BINARY)
            .map(Self::at)
            .map_err(|_| EngineError::NotFound)
    }

    pub fn at(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            preamble: Vec::new(),
        }
    }

    /// Stand-in engine backed by a shell script. The script sees the engine
    /// arguments as `$1..$n`.
    #[cfg(test)]
    pub fn scripted(script: &str) -> Self {
        Self {
            program: PathBuf::from("/bin/sh"),
            preamble: vec!["-c".to_string(), script.to_string(), ENGINE_BINARY.to_string()],
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// A command for the engine with any wrapper arguments applied
    pub fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.preamble);
        command
    }

    /// First line of `-version` output
    pub async fn version(&self) -> Result<String, EngineError> {
        let output = self
            .command()
            .arg("-version")
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .output()
            .await?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(stdout.lines().next().unwrap_or_default().trim().to_string())
    }
}

/// Shell scripts standing in for the engine in tests
#[cfg(test)]
pub(crate) mod test_engines {
    /// Writes a small file to the output path (last argument) and succeeds
    pub const SUCCEEDING_ENGINE: &str = r#"
for last; do :; done
echo "Input #0, mov, from 'input':" >&2
echo "frame=10" >&2
echo "out_time_us=1000000" >&2
echo "progress=end" >&2
printf 'FAKEVIDEO' > "$last"
"#;

    /// Names its input path in an error and fails
    pub const FAILING_ENGINE: &str = r#"
for arg; do case "$arg" in *input*) input="$arg";; esac; done
echo "$input: Invalid data found when processing input" >&2
exit 1
"#;

    /// Produces nothing until killed
    pub const HANGING_ENGINE: &str = "exec sleep 30";

    /// Writes a large output so a download takes many chunks
    pub const LARGE_OUTPUT_ENGINE: &str = r#"
for last; do :; done
head -c 4194304 /dev/zero > "$last"
"#;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discover_prefers_existing_explicit_path() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let engine = Engine::discover(Some(file.path())).unwrap();
        assert_eq!(engine.program(), file.path());
    }

    #[test]
    fn discover_ignores_missing_explicit_path() {
        let missing = Path::new("/definitely/not/here/ffmpeg");
        match Engine::discover(Some(missing)) {
            Ok(engine) => assert_ne!(engine.program(), missing),
            Err(e) => assert!(matches!(e, EngineError::NotFound)),
        }
    }

    #[actix_web::test]
    async fn version_reads_first_line() {
        let engine = Engine::scripted("echo 'ffmpeg version 6.1-test'; echo 'built with gcc'");
        assert_eq!(engine.version().await.unwrap(), "ffmpeg version 6.1-test");
    }
}
