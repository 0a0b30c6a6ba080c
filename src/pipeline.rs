//! Row-by-row assembly of one script into a single video.
//!
//! Rows run strictly in script order. Each row walks
//! SYNTHESIZE → NORMALIZE → SEGMENT → TRANSCRIBE_WRITE → ALIGN_FORMAT →
//! PATCH_FONT → BURN → OVERLAY → DONE; the first failing step ends the row
//! and the driver moves on to the next one.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{error, info, warn};

use crate::align::{ForcedAligner, write_transcript};
use crate::audio::{normalize, wav_duration_seconds};
use crate::burn::burn_subtitles;
use crate::concat::concat_clips;
use crate::config::{CursorPolicy, PipelineConfig};
use crate::error::{PipelineError, PipelineResult};
use crate::ffmpeg::{MediaEngine, VideoInfo};
use crate::overlay::add_photo_overlay;
use crate::progress::Progress;
use crate::script::{Script, ScriptRow};
use crate::segment::{TimelineCursor, cut_segment, segment_duration};
use crate::store::{RunPaths, character_assets, pick_background, record_failure};
use crate::subtitle::{KaraokeTrack, patch_font_size_file};
use crate::tts::{SpeechSynthesizer, SynthesisRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RowStage {
    Synthesize,
    Normalize,
    Segment,
    TranscribeWrite,
    AlignFormat,
    PatchFont,
    Burn,
    Overlay,
    Done,
}

impl RowStage {
    pub fn label(self) -> &'static str {
        match self {
            RowStage::Synthesize => "synthesize",
            RowStage::Normalize => "normalize",
            RowStage::Segment => "segment",
            RowStage::TranscribeWrite => "transcribe_write",
            RowStage::AlignFormat => "align_format",
            RowStage::PatchFont => "patch_font",
            RowStage::Burn => "burn",
            RowStage::Overlay => "overlay",
            RowStage::Done => "done",
        }
    }
}

impl fmt::Display for RowStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug)]
pub struct RowFailure {
    pub index: usize,
    pub stage: RowStage,
    pub error: PipelineError,
}

#[derive(Debug)]
pub enum RowOutcome {
    Done(PathBuf),
    Failed(RowFailure),
}

/// Mutable state of one script run, owned by the driver.
#[derive(Debug)]
pub struct RunContext {
    pub paths: RunPaths,
    pub background: PathBuf,
    pub background_info: VideoInfo,
    cursor: TimelineCursor,
    completed: Vec<PathBuf>,
}

impl RunContext {
    pub fn new(paths: RunPaths, background: PathBuf, background_info: VideoInfo) -> Self {
        Self {
            paths,
            background,
            background_info,
            cursor: TimelineCursor::default(),
            completed: Vec::new(),
        }
    }

    pub fn cursor(&self) -> TimelineCursor {
        self.cursor
    }

    pub fn completed(&self) -> &[PathBuf] {
        &self.completed
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FailureEntry {
    pub index: usize,
    pub stage: RowStage,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub script: String,
    pub background: PathBuf,
    pub timeline_seconds: f64,
    pub completed_clips: Vec<PathBuf>,
    pub failures: Vec<FailureEntry>,
    pub final_video: Option<PathBuf>,
}

impl RunReport {
    pub fn write(&self, path: &Path) -> PipelineResult<()> {
        let data = serde_json::to_string_pretty(self).map_err(anyhow::Error::from)?;
        std::fs::write(path, data)?;
        Ok(())
    }
}

pub struct RowPipeline<S, A, M> {
    config: PipelineConfig,
    synthesizer: S,
    aligner: A,
    engine: M,
    progress: Progress,
}

impl<S, A, M> RowPipeline<S, A, M>
where
    S: SpeechSynthesizer,
    A: ForcedAligner,
    M: MediaEngine,
{
    pub fn new(config: PipelineConfig, synthesizer: S, aligner: A, engine: M, progress: Progress) -> Self {
        Self {
            config,
            synthesizer,
            aligner,
            engine,
            progress,
        }
    }

    pub fn engine(&self) -> &M {
        &self.engine
    }

    /// Resolves the background video and prepares the run directories.
    pub async fn open_run(&self, script: &Script) -> PipelineResult<RunContext> {
        let background = match &self.config.background {
            Some(bg) => bg.clone(),
            None => pick_background(&self.config.resources_dir)?,
        };
        info!("Selected background video: {}", background.display());
        let background_info = self.engine.probe_video(&background).await?;

        let paths = RunPaths::new(&self.config.temp_root, &self.config.output_root, &script.name);
        paths.prepare()?;
        Ok(RunContext::new(paths, background, background_info))
    }

    pub async fn run_script(&self, script: &Script) -> PipelineResult<RunReport> {
        info!("Processing: {}", script.path.display());
        let mut ctx = self.open_run(script).await?;

        let bar = self.progress.rows_bar(script.rows.len());
        let mut failures = Vec::new();
        for row in &script.rows {
            info!("--- Processing line {} ---", row.index);
            match self.process_row(&mut ctx, row).await {
                RowOutcome::Done(clip) => info!("Line {} done: {}", row.index, clip.display()),
                RowOutcome::Failed(failure) => {
                    error!(
                        "Error in line {} at {}: {}",
                        failure.index, failure.stage, failure.error
                    );
                    let message = failure.error.to_string();
                    if let Err(e) = record_failure(
                        &self.config.output_root,
                        &script.name,
                        failure.index,
                        failure.stage.label(),
                        &message,
                    ) {
                        warn!("Could not append to failure log: {}", e);
                    }
                    failures.push(FailureEntry {
                        index: failure.index,
                        stage: failure.stage,
                        message,
                    });
                }
            }
            bar.inc(1);
        }
        bar.finish_and_clear();
        info!(
            "{} of {} lines completed, timeline at {:.3}s",
            ctx.completed.len(),
            script.rows.len(),
            ctx.cursor.seconds()
        );

        let mut report = RunReport {
            script: script.name.clone(),
            background: ctx.background.clone(),
            timeline_seconds: ctx.cursor.seconds(),
            completed_clips: ctx.completed.clone(),
            failures,
            final_video: None,
        };

        let joined = concat_clips(
            &self.engine,
            &ctx.completed,
            &ctx.paths.manifest(),
            &ctx.paths.final_video(),
        )
        .await;
        if let Ok(path) = &joined {
            report.final_video = Some(path.clone());
        }
        report.write(&ctx.paths.report())?;
        joined?;
        Ok(report)
    }

    /// Runs one row to DONE or FAILED. Only DONE rows join the completed list.
    pub async fn process_row(&self, ctx: &mut RunContext, row: &ScriptRow) -> RowOutcome {
        let cursor_before = ctx.cursor;
        let mut stage = RowStage::Synthesize;

        match self.drive_row(ctx, row, &mut stage).await {
            Ok(clip) => {
                ctx.completed.push(clip.clone());
                RowOutcome::Done(clip)
            }
            Err(error) => {
                if self.config.cursor_policy == CursorPolicy::Rewind && ctx.cursor != cursor_before {
                    info!(
                        "Rewinding timeline from {:.3}s to {:.3}s after line {} failed",
                        ctx.cursor.seconds(),
                        cursor_before.seconds(),
                        row.index
                    );
                    ctx.cursor = cursor_before;
                }
                RowOutcome::Failed(RowFailure {
                    index: row.index,
                    stage,
                    error,
                })
            }
        }
    }

    async fn drive_row(
        &self,
        ctx: &mut RunContext,
        row: &ScriptRow,
        stage: &mut RowStage,
    ) -> PipelineResult<PathBuf> {
        let i = row.index;
        let paths = ctx.paths.clone();

        *stage = RowStage::Synthesize;
        let assets = character_assets(&self.config.resources_dir, &row.character);
        let voice_sample = assets.voice()?;
        let raw_target = paths.raw_audio(i);
        let request = SynthesisRequest {
            text: &row.dialogue,
            voice_sample: &voice_sample,
            params: row.synthesis,
            output: &raw_target,
        };
        let raw_audio = self.synthesizer.synthesize(&request).await?;
        if !raw_audio.is_file() {
            return Err(PipelineError::missing(raw_audio));
        }

        *stage = RowStage::Normalize;
        let audio = paths.normalized_audio(i);
        normalize(&self.engine, &raw_audio, &audio).await?;

        *stage = RowStage::Segment;
        let audio_duration = wav_duration_seconds(&audio)?;
        let segment = paths.segment(i);
        ctx.cursor = cut_segment(
            &self.engine,
            &ctx.background,
            ctx.background_info.duration,
            ctx.cursor,
            segment_duration(audio_duration),
            &segment,
        )
        .await?;

        *stage = RowStage::TranscribeWrite;
        let transcript = paths.transcript(i);
        write_transcript(&transcript, &row.dialogue)?;

        *stage = RowStage::AlignFormat;
        let subtitles = paths.subtitles(i);
        if subtitles.exists() {
            std::fs::remove_file(&subtitles)?;
        }
        let words = self.aligner.align(&audio, &transcript).await?;
        KaraokeTrack::from_alignments(&words)?.write(&subtitles)?;

        *stage = RowStage::PatchFont;
        patch_font_size_file(&subtitles, row.font_size)?;

        *stage = RowStage::Burn;
        let karaoke = paths.karaoke(i);
        burn_subtitles(&self.engine, &segment, &audio, &subtitles, &karaoke).await?;

        *stage = RowStage::Overlay;
        let clip = paths.clip(i);
        let photo = assets.photo()?;
        add_photo_overlay(
            &self.engine,
            &karaoke,
            &photo,
            &row.photo_side,
            self.config.overlay_duration,
            row.scale,
            &clip,
        )
        .await?;

        *stage = RowStage::Done;
        Ok(clip)
    }
}
