use std::path::Path;

use tracing::info;

use crate::error::PipelineResult;
use crate::ffmpeg::{MediaEngine, Stage};
use crate::utils::posix_path;

/// Makes a subtitle path safe inside an `ass='...'` filter argument.
///
/// Windows paths carry a drive colon and often spaces, both of which the
/// filter-graph parser splits on; elsewhere the path is used as is.
pub fn escape_filter_path(path: &Path, windows: bool) -> String {
    let path = posix_path(path);
    if windows {
        path.replace(':', "\\:").replace(' ', "\\ ")
    } else {
        path
    }
}

pub fn burn_filter(subtitle_path: &str) -> String {
    format!("[0:v]ass='{subtitle_path}'[v];[1:a]anull[a]")
}

pub fn burn_args(video: &Path, audio: &Path, subtitle_path: &str, output: &Path) -> Vec<String> {
    vec![
        "-y".into(),
        "-i".into(),
        video.to_string_lossy().into_owned(),
        "-i".into(),
        audio.to_string_lossy().into_owned(),
        "-filter_complex".into(),
        burn_filter(subtitle_path),
        "-map".into(),
        "[v]".into(),
        "-map".into(),
        "[a]".into(),
        "-c:v".into(),
        "libx264".into(),
        "-c:a".into(),
        "aac".into(),
        "-b:a".into(),
        "192k".into(),
        "-shortest".into(),
        output.to_string_lossy().into_owned(),
    ]
}

/// Renders `subtitles` into `video`, attaches `audio`, trimmed to the shorter input.
pub async fn burn_subtitles<M: MediaEngine + ?Sized>(
    engine: &M,
    video: &Path,
    audio: &Path,
    subtitles: &Path,
    output: &Path,
) -> PipelineResult<()> {
    let absolute = std::path::absolute(subtitles)?;
    let escaped = escape_filter_path(&absolute, cfg!(windows));
    info!("Burning {} into {}", absolute.display(), output.display());
    engine
        .run(Stage::Burn, &burn_args(video, audio, &escaped, output))
        .await
}
