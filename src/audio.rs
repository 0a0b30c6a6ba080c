use std::path::Path;

use hound::WavReader;
use tracing::info;

use crate::error::PipelineResult;
use crate::ffmpeg::{MediaEngine, Stage};

/// EBU R128 targets: integrated loudness, loudness range, true-peak ceiling.
pub const TARGET_LUFS: f64 = -16.0;
pub const TARGET_LRA: f64 = 11.0;
pub const TARGET_TRUE_PEAK: f64 = -1.5;

pub fn wav_duration_seconds(path: &Path) -> PipelineResult<f64> {
    let reader = WavReader::open(path)
        .map_err(|e| anyhow::anyhow!("failed to read wav {}: {e}", path.display()))?;
    let spec = reader.spec();
    let samples = reader.len();
    let frames = samples as f64 / spec.channels as f64;
    let duration = frames / spec.sample_rate as f64;
    Ok(duration)
}

pub fn loudnorm_filter() -> String {
    format!("loudnorm=I={TARGET_LUFS}:LRA={TARGET_LRA}:TP={TARGET_TRUE_PEAK}")
}

pub fn normalize_args(input: &Path, output: &Path) -> Vec<String> {
    vec![
        "-y".into(),
        "-i".into(),
        input.to_string_lossy().into_owned(),
        "-af".into(),
        loudnorm_filter(),
        output.to_string_lossy().into_owned(),
    ]
}

/// Writes a loudness-normalized copy of `input` to `output`.
pub async fn normalize<M: MediaEngine + ?Sized>(
    engine: &M,
    input: &Path,
    output: &Path,
) -> PipelineResult<()> {
    info!("Normalizing {} -> {}", input.display(), output.display());
    engine.run(Stage::Normalize, &normalize_args(input, output)).await
}
