use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, error, info};

use crate::error::{PipelineError, PipelineResult};
use crate::progress::Progress;
use crate::script::SynthesisParams;
use crate::utils::{first_json_payload, tail_lines};

const STAGE: &str = "synthesis";

pub struct SynthesisRequest<'a> {
    pub text: &'a str,
    pub voice_sample: &'a Path,
    pub params: SynthesisParams,
    pub output: &'a Path,
}

#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Produces speech for one line and returns the path of the written audio.
    async fn synthesize(&self, request: &SynthesisRequest<'_>) -> PipelineResult<PathBuf>;
}

/// The single status object the synthesis process prints on stdout.
#[derive(Debug, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum SynthesisPayload {
    Success { output_file: PathBuf },
    Error { message: String },
}

/// Runs an external synthesis program with positional arguments
/// `text voice exaggeration temperature seed cfg_weight output`.
pub struct ProcessSynthesizer {
    command: Vec<String>,
    progress: Progress,
}

impl ProcessSynthesizer {
    pub fn new(command: Vec<String>, progress: Progress) -> PipelineResult<Self> {
        if command.is_empty() {
            return Err(PipelineError::invalid("synthesis command is empty"));
        }
        Ok(Self { command, progress })
    }

    fn build_command(&self, request: &SynthesisRequest<'_>) -> Command {
        let mut cmd = Command::new(&self.command[0]);
        cmd.args(&self.command[1..])
            .arg(request.text)
            .arg(request.voice_sample)
            .arg(request.params.exaggeration.to_string())
            .arg(request.params.temperature.to_string())
            .arg(request.params.seed.to_string())
            .arg(request.params.cfg_weight.to_string())
            .arg(request.output)
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl SpeechSynthesizer for ProcessSynthesizer {
    async fn synthesize(&self, request: &SynthesisRequest<'_>) -> PipelineResult<PathBuf> {
        info!("Synthesizing speech into {}", request.output.display());
        let mut cmd = self.build_command(request);
        debug!("Synthesis command: {:?}", cmd);

        let output = self
            .progress
            .while_running("Generating Speech", cmd.output())
            .await
            .map_err(|e| PipelineError::process(STAGE, "spawn failed", e.to_string()))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        interpret_output(output.status.success(), &stdout, &output.stderr, output.status.to_string())
    }
}

/// Turns exit status plus captured streams into the produced file or a failure.
pub fn interpret_output(
    exited_ok: bool,
    stdout: &str,
    stderr: &[u8],
    status: String,
) -> PipelineResult<PathBuf> {
    let payload = first_json_payload::<SynthesisPayload>(stdout);

    if !exited_ok {
        let detail = match payload {
            Some(SynthesisPayload::Error { message }) => message,
            _ => tail_lines(stderr, 5),
        };
        error!("Synthesis process failed ({}): {}", status, detail);
        return Err(PipelineError::process(STAGE, status, detail));
    }

    match payload {
        Some(SynthesisPayload::Success { output_file }) => Ok(output_file),
        Some(SynthesisPayload::Error { message }) => {
            error!("Synthesis reported an error: {}", message);
            Err(PipelineError::process(STAGE, status, message))
        }
        None => {
            error!("Invalid or missing JSON in synthesis output");
            Err(PipelineError::malformed(
                STAGE,
                format!("no status payload in output: {}", tail_lines(stdout.as_bytes(), 5)),
            ))
        }
    }
}
