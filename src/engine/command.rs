//! Rendering a [`PipelineSpec`] into engine arguments.

use std::path::PathBuf;

use super::EngineError;
use crate::pipeline::stage::render_chain;
use crate::pipeline::{InputSource, PipelineSpec, Stage};
use crate::workspace::Workspace;

/// Protocols a remote manifest may pull from; keeps `file:` out
const REMOTE_PROTOCOLS: &str = "http,https,tcp,tls,crypto";

/// Argument vector for one engine invocation. Arguments are passed to the
/// process directly, never through a shell.
#[derive(Debug, Clone)]
pub struct EngineCommand {
    input: String,
    input_args: Vec<String>,
    output_args: Vec<String>,
    output: PathBuf,
}

impl EngineCommand {
    pub fn from_pipeline(spec: &PipelineSpec, workspace: &Workspace) -> Result<Self, EngineError> {
        let mut input = None;
        let mut input_args = Vec::new();
        let mut output_args = Vec::new();

        for stage in spec.stages() {
            match stage {
                Stage::Input(InputSource::Upload) => {
                    let path = workspace.input_path().ok_or(EngineError::MissingInput)?;
                    input_args.extend(["-protocol_whitelist".to_string(), "file".to_string()]);
                    input = Some(path.to_string_lossy().to_string());
                }
                Stage::Input(InputSource::Remote(url)) => {
                    input_args.extend(["-protocol_whitelist".to_string(), REMOTE_PROTOCOLS.to_string()]);
                    input = Some(url.to_string());
                }
                Stage::TrimWindow {
                    start_seconds,
                    duration_seconds,
                } => {
                    input_args.extend(["-ss".to_string(), seconds(*start_seconds)]);
                    output_args.extend(["-t".to_string(), seconds(*duration_seconds)]);
                }
                Stage::FilterGraph(filters) => {
                    output_args.extend(["-vf".to_string(), render_chain(filters)]);
                }
                Stage::RemuxCopy => {
                    output_args.extend(["-c".to_string(), "copy".to_string()]);
                }
                Stage::Encode { format, copy_audio } => {
                    if *copy_audio {
                        output_args.extend(["-c:a".to_string(), "copy".to_string()]);
                    }
                    output_args.extend(["-f".to_string(), format.muxer().to_string()]);
                }
            }
        }

        Ok(Self {
            input: input.ok_or(EngineError::MissingInput)?,
            input_args,
            output_args,
            output: workspace.output_path().to_path_buf(),
        })
    }

    pub fn build_args(&self) -> Vec<String> {
        let mut args: Vec<String> = [
            "-hide_banner",
            "-nostdin",
            "-nostats",
            "-y",
            "-loglevel",
            "info",
            "-progress",
            "pipe:2",
        ]
        .iter()
        .map(|arg| arg.to_string())
        .collect();

        args.extend(self.input_args.iter().cloned());
        args.push("-i".to_string());
        args.push(self.input.clone());
        args.extend(self.output_args.iter().cloned());
        args.push(self.output.to_string_lossy().to_string());
        args
    }
}

fn seconds(value: f64) -> String {
    format!("{:.3}", value)
}
