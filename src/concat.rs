use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::{PipelineError, PipelineResult};
use crate::ffmpeg::{MediaEngine, Stage};
use crate::utils::posix_path;

/// Writes a concat-demuxer list, one `file '<path>'` line per clip, in order.
pub fn write_manifest(path: &Path, clips: &[PathBuf]) -> PipelineResult<()> {
    let mut f = File::create(path)?;
    for clip in clips {
        let absolute = std::path::absolute(clip)?;
        writeln!(f, "file '{}'", posix_path(&absolute).replace('\'', "'\\''"))?;
    }
    Ok(())
}

pub fn concat_args(manifest: &Path, output: &Path) -> Vec<String> {
    vec![
        "-y".into(),
        "-f".into(),
        "concat".into(),
        "-safe".into(),
        "0".into(),
        "-i".into(),
        manifest.to_string_lossy().into_owned(),
        "-c".into(),
        "copy".into(),
        output.to_string_lossy().into_owned(),
    ]
}

/// Joins `clips` without re-encoding and returns the final video path.
pub async fn concat_clips<M: MediaEngine + ?Sized>(
    engine: &M,
    clips: &[PathBuf],
    manifest: &Path,
    output: &Path,
) -> PipelineResult<PathBuf> {
    if clips.is_empty() {
        return Err(PipelineError::invalid("no completed clips to concatenate"));
    }
    write_manifest(manifest, clips)?;
    info!(
        "Concatenating {} clips listed in {}",
        clips.len(),
        manifest.display()
    );
    engine.run(Stage::Concat, &concat_args(manifest, output)).await?;
    info!("Final video saved to {}", output.display());
    Ok(output.to_path_buf())
}
