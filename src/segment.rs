use std::path::Path;

use tracing::info;

use crate::error::{PipelineError, PipelineResult};
use crate::ffmpeg::{MediaEngine, Stage};

/// Silence kept after each line before the next one starts.
pub const ROW_PAD_SECONDS: f64 = 0.5;

const RANGE_EPSILON: f64 = 1e-6;

/// Point in the background video already handed out to earlier rows.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default)]
pub struct TimelineCursor(f64);

impl TimelineCursor {
    pub fn at(seconds: f64) -> Self {
        Self(seconds)
    }

    pub fn seconds(self) -> f64 {
        self.0
    }
}

pub fn segment_duration(audio_duration: f64) -> f64 {
    audio_duration + ROW_PAD_SECONDS
}

pub fn segment_args(background: &Path, start: f64, duration: f64, output: &Path) -> Vec<String> {
    vec![
        "-y".into(),
        "-ss".into(),
        format!("{start:.3}"),
        "-i".into(),
        background.to_string_lossy().into_owned(),
        "-t".into(),
        format!("{duration:.3}"),
        "-an".into(),
        "-c:v".into(),
        "libx264".into(),
        "-pix_fmt".into(),
        "yuv420p".into(),
        output.to_string_lossy().into_owned(),
    ]
}

/// Cuts `[cursor, cursor + duration)` out of the background and returns the advanced cursor.
///
/// A range running past the end of the source is refused rather than wrapped.
pub async fn cut_segment<M: MediaEngine + ?Sized>(
    engine: &M,
    background: &Path,
    source_duration: f64,
    cursor: TimelineCursor,
    duration: f64,
    output: &Path,
) -> PipelineResult<TimelineCursor> {
    if !(duration.is_finite() && duration > 0.0) {
        return Err(PipelineError::invalid(format!(
            "segment duration must be positive, got {duration}"
        )));
    }
    let start = cursor.seconds();
    let end = start + duration;
    if end > source_duration + RANGE_EPSILON {
        return Err(PipelineError::invalid(format!(
            "segment [{start:.3}, {end:.3}) runs past the end of the {source_duration:.3}s background"
        )));
    }

    info!(
        "Cutting background [{:.3}, {:.3}) into {}",
        start,
        end,
        output.display()
    );
    engine
        .run(Stage::Segment, &segment_args(background, start, duration, output))
        .await?;
    Ok(TimelineCursor(end))
}
