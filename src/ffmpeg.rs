use std::fmt;
use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, error};

use crate::error::{PipelineError, PipelineResult};
use crate::progress::Progress;
use crate::utils::tail_lines;

/// The codec-engine invocations a row (or the final join) can make.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Normalize,
    Segment,
    Burn,
    Overlay,
    Concat,
}

impl Stage {
    pub fn label(self) -> &'static str {
        match self {
            Stage::Normalize => "normalize",
            Stage::Segment => "segment",
            Stage::Burn => "burn",
            Stage::Overlay => "overlay",
            Stage::Concat => "concat",
        }
    }

    fn activity(self) -> &'static str {
        match self {
            Stage::Normalize => "Normalizing Audio",
            Stage::Segment => "Cutting Background",
            Stage::Burn => "Burning Subtitles",
            Stage::Overlay => "Rendering",
            Stage::Concat => "Joining Clips",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoInfo {
    pub width: u32,
    pub height: u32,
    pub duration: f64,
}

#[async_trait]
pub trait MediaEngine: Send + Sync {
    /// Runs one engine invocation; the output file is always the last argument.
    async fn run(&self, stage: Stage, args: &[String]) -> PipelineResult<()>;

    async fn probe_video(&self, path: &Path) -> PipelineResult<VideoInfo>;
}

/// Drives the system `ffmpeg` / `ffprobe` binaries.
pub struct FfmpegEngine {
    progress: Progress,
}

impl FfmpegEngine {
    pub fn new(progress: Progress) -> Self {
        Self { progress }
    }
}

pub fn is_ffmpeg_on_path() -> bool {
    std::process::Command::new("ffmpeg")
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

#[async_trait]
impl MediaEngine for FfmpegEngine {
    async fn run(&self, stage: Stage, args: &[String]) -> PipelineResult<()> {
        debug!("ffmpeg [{}]: {}", stage, args.join(" "));
        let mut cmd = Command::new("ffmpeg");
        cmd.args(["-hide_banner", "-loglevel", "error"])
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = self
            .progress
            .while_running(stage.activity(), cmd.output())
            .await
            .map_err(|e| {
                PipelineError::process(stage.label(), "spawn failed", format!("ffmpeg: {e}"))
            })?;

        if !output.status.success() {
            let detail = tail_lines(&output.stderr, 8);
            error!("ffmpeg {} failed with {}: {}", stage, output.status, detail);
            return Err(PipelineError::process(
                stage.label(),
                output.status.to_string(),
                detail,
            ));
        }
        Ok(())
    }

    async fn probe_video(&self, path: &Path) -> PipelineResult<VideoInfo> {
        if !path.is_file() {
            return Err(PipelineError::missing(path));
        }
        let out = Command::new("ffprobe")
            .args([
                "-v",
                "error",
                "-print_format",
                "json",
                "-show_streams",
                "-show_format",
            ])
            .arg(path)
            .output()
            .await
            .map_err(|e| PipelineError::process("probe", "spawn failed", format!("ffprobe: {e}")))?;
        if !out.status.success() {
            return Err(PipelineError::process(
                "probe",
                out.status.to_string(),
                format!("{}: {}", path.display(), tail_lines(&out.stderr, 3)),
            ));
        }
        parse_probe(&out.stdout)
    }
}

#[derive(Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    duration: Option<String>,
}

#[derive(Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

#[derive(Deserialize)]
struct ProbeOut {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

pub fn parse_probe(json: &[u8]) -> PipelineResult<VideoInfo> {
    let parsed: ProbeOut = serde_json::from_slice(json)
        .map_err(|e| PipelineError::malformed("probe", format!("ffprobe json: {e}")))?;
    let video = parsed
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| PipelineError::malformed("probe", "no video stream found"))?;
    let (width, height) = match (video.width, video.height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => (w, h),
        _ => return Err(PipelineError::malformed("probe", "missing frame size")),
    };
    let duration = parsed
        .format
        .as_ref()
        .and_then(|f| f.duration.as_deref())
        .or(video.duration.as_deref())
        .and_then(|d| d.parse::<f64>().ok())
        .ok_or_else(|| PipelineError::malformed("probe", "missing duration"))?;

    Ok(VideoInfo {
        width,
        height,
        duration,
    })
}
