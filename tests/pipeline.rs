use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use reelforge::align::{ForcedAligner, MatchStatus, WordAlignment};
use reelforge::config::Profiles;
use reelforge::ffmpeg::{MediaEngine, Stage, VideoInfo};
use reelforge::progress::Progress;
use reelforge::script::parse_rows;
use reelforge::script::Script;
use reelforge::tts::{ProcessSynthesizer, SpeechSynthesizer, SynthesisRequest};
use reelforge::{
    CursorPolicy, PipelineConfig, PipelineError, PipelineResult, RowOutcome, RowPipeline,
    RowStage, RunContext,
};

const SAMPLE_RATE: u32 = 8000;
const SECONDS_PER_WORD: f64 = 0.5;

fn write_wav(path: &Path, seconds: f64) {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    for _ in 0..(seconds * f64::from(SAMPLE_RATE)).round() as u64 {
        writer.write_sample(0i16).unwrap();
    }
    writer.finalize().unwrap();
}

/// Speaks half a second per word; any line containing "BROKEN" fails like a crashed model.
struct FakeSynthesizer;

#[async_trait]
impl SpeechSynthesizer for FakeSynthesizer {
    async fn synthesize(&self, request: &SynthesisRequest<'_>) -> PipelineResult<PathBuf> {
        if request.text.contains("BROKEN") {
            return Err(PipelineError::process(
                "synthesis",
                "exit status: 1",
                "model crashed",
            ));
        }
        let words = request.text.split_whitespace().count() as f64;
        write_wav(request.output, words * SECONDS_PER_WORD);
        Ok(request.output.to_path_buf())
    }
}

/// Places each transcript word back to back; "mumble" is never matched.
struct FakeAligner;

#[async_trait]
impl ForcedAligner for FakeAligner {
    async fn align(&self, _audio: &Path, transcript: &Path) -> PipelineResult<Vec<WordAlignment>> {
        let text = std::fs::read_to_string(transcript)?;
        Ok(text
            .split_whitespace()
            .enumerate()
            .map(|(i, w)| {
                let start = i as f64 * SECONDS_PER_WORD;
                WordAlignment {
                    word: w.to_string(),
                    start: Some(start),
                    end: Some(start + SECONDS_PER_WORD * 0.8),
                    case: if w == "mumble" {
                        MatchStatus::Failure
                    } else {
                        MatchStatus::Success
                    },
                }
            })
            .collect())
    }
}

struct FakeEngine {
    background_seconds: f64,
    fail_output: Option<String>,
    calls: Mutex<Vec<(Stage, Vec<String>)>>,
}

impl FakeEngine {
    fn new(background_seconds: f64) -> Self {
        Self {
            background_seconds,
            fail_output: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    fn failing_on(mut self, output_name: &str) -> Self {
        self.fail_output = Some(output_name.to_string());
        self
    }

    fn calls_for(&self, stage: Stage) -> Vec<Vec<String>> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(s, _)| *s == stage)
            .map(|(_, args)| args.clone())
            .collect()
    }
}

fn arg_after<'a>(args: &'a [String], flag: &str) -> &'a str {
    let pos = args.iter().position(|a| a == flag).unwrap();
    &args[pos + 1]
}

#[async_trait]
impl MediaEngine for FakeEngine {
    async fn run(&self, stage: Stage, args: &[String]) -> PipelineResult<()> {
        self.calls.lock().unwrap().push((stage, args.to_vec()));
        let output = Path::new(args.last().unwrap());
        if let Some(name) = &self.fail_output {
            if output.file_name().and_then(|n| n.to_str()) == Some(name.as_str()) {
                return Err(PipelineError::process(stage.label(), "exit status: 1", "forced"));
            }
        }
        match stage {
            Stage::Normalize => {
                std::fs::copy(arg_after(args, "-i"), output)?;
            }
            _ => std::fs::write(output, b"video")?,
        }
        Ok(())
    }

    async fn probe_video(&self, path: &Path) -> PipelineResult<VideoInfo> {
        let duration = if path.ends_with("bg.mp4") {
            self.background_seconds
        } else {
            3.0
        };
        Ok(VideoInfo {
            width: 1080,
            height: 1920,
            duration,
        })
    }
}

struct Fixture {
    _dir: tempfile::TempDir,
    root: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_path_buf();
        for name in ["Fox", "Owl"] {
            let char_dir = root.join("Resource").join("Characters").join(name);
            std::fs::create_dir_all(&char_dir).unwrap();
            write_wav(&char_dir.join(format!("{name}.wav")), 0.1);
            image::RgbaImage::new(40, 80)
                .save(char_dir.join(format!("{name}.png")))
                .unwrap();
        }
        std::fs::write(root.join("bg.mp4"), b"background").unwrap();
        Self { _dir: dir, root }
    }

    fn config(&self, policy: CursorPolicy) -> PipelineConfig {
        PipelineConfig {
            script: None,
            scripts_dir: self.root.clone(),
            resources_dir: self.root.join("Resource"),
            background: Some(self.root.join("bg.mp4")),
            temp_root: self.root.join("Temporary").join("temp"),
            output_root: self.root.join("outputs"),
            tts_command: vec!["unused".into()],
            aligner_url: reqwest::Url::parse("http://localhost:8765/transcriptions").unwrap(),
            profiles: Profiles::new(),
            overlay_duration: 0.3,
            cursor_policy: policy,
        }
    }

    fn script(&self, csv: &str) -> Script {
        Script {
            name: "episode_script".into(),
            path: self.root.join("episode_script.csv"),
            rows: parse_rows(csv, &Profiles::new()).unwrap(),
        }
    }

    fn pipeline(
        &self,
        policy: CursorPolicy,
        engine: FakeEngine,
    ) -> RowPipeline<FakeSynthesizer, FakeAligner, FakeEngine> {
        RowPipeline::new(
            self.config(policy),
            FakeSynthesizer,
            FakeAligner,
            engine,
            Progress::hidden(),
        )
    }
}

const THREE_ROWS: &str = "Character,Dialogue,Photo_Side\n\
                          Fox,hello there friend,left\n\
                          Owl,this line is BROKEN,right\n\
                          Fox,goodbye now,right\n";

fn manifest_clips(path: &Path) -> Vec<String> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|l| {
            Path::new(l.trim_start_matches("file '").trim_end_matches('\''))
                .file_name()
                .unwrap()
                .to_string_lossy()
                .into_owned()
        })
        .collect()
}

#[tokio::test]
async fn failed_synthesis_row_is_left_out_of_the_final_video() {
    let fx = Fixture::new();
    let pipeline = fx.pipeline(CursorPolicy::Consume, FakeEngine::new(60.0));
    let script = fx.script(THREE_ROWS);

    let report = pipeline.run_script(&script).await.unwrap();

    let temp = fx.root.join("Temporary/temp/episode_script");
    assert_eq!(
        manifest_clips(&temp.join("file_list.txt")),
        ["clip_1.mp4", "clip_3.mp4"]
    );
    assert_eq!(report.completed_clips.len(), 2);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].index, 2);
    assert_eq!(report.failures[0].stage, RowStage::Synthesize);
    assert_eq!(
        report.final_video.as_deref(),
        Some(
            fx.root
                .join("outputs/episode_script/final_output_episode_script.mp4")
                .as_path()
        )
    );
    // Row 2 never reached SEGMENT: 3 words + pad, then 2 words + pad.
    assert!((report.timeline_seconds - (2.0 + 1.5)).abs() < 1e-9);

    let log = std::fs::read_to_string(fx.root.join("outputs/failures.log")).unwrap();
    assert_eq!(log.lines().count(), 1);
    assert!(log.starts_with("episode_script row 2 failed at synthesize:"));
    assert!(fx.root.join("outputs/episode_script/run_report.json").is_file());
}

#[tokio::test]
async fn segments_follow_row_order_without_overlap() {
    let fx = Fixture::new();
    let pipeline = fx.pipeline(CursorPolicy::Consume, FakeEngine::new(60.0));
    let script = fx.script(
        "Character,Dialogue\nFox,one two\nOwl,one two three four\nFox,one\n",
    );

    let report = pipeline.run_script(&script).await.unwrap();
    assert!(report.failures.is_empty());

    let cuts: Vec<(f64, f64)> = pipeline_engine_cuts(&pipeline);
    assert_eq!(cuts, [(0.0, 1.5), (1.5, 2.5), (4.0, 1.0)]);
    for pair in cuts.windows(2) {
        assert!(pair[0].0 + pair[0].1 <= pair[1].0 + 1e-9);
    }
    assert!((report.timeline_seconds - 5.0).abs() < 1e-9);
}

fn pipeline_engine_cuts(
    pipeline: &RowPipeline<FakeSynthesizer, FakeAligner, FakeEngine>,
) -> Vec<(f64, f64)> {
    pipeline
        .engine()
        .calls_for(Stage::Segment)
        .iter()
        .map(|args| {
            (
                arg_after(args, "-ss").parse().unwrap(),
                arg_after(args, "-t").parse().unwrap(),
            )
        })
        .collect()
}

#[tokio::test]
async fn late_failure_still_consumes_footage() {
    let fx = Fixture::new();
    let engine = FakeEngine::new(60.0).failing_on("karaoke_2.mp4");
    let pipeline = fx.pipeline(CursorPolicy::Consume, engine);
    let script = fx.script("Character,Dialogue\nFox,a b\nOwl,a b c\nFox,a\n");

    let report = pipeline.run_script(&script).await.unwrap();

    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].stage, RowStage::Burn);
    // 1.5 + 2.0 + 1.0: row 2's slice stays allocated.
    assert!((report.timeline_seconds - 4.5).abs() < 1e-9);
    assert_eq!(pipeline_engine_cuts(&pipeline)[2], (3.5, 1.0));
}

#[tokio::test]
async fn rewind_policy_returns_the_failed_rows_footage() {
    let fx = Fixture::new();
    let engine = FakeEngine::new(60.0).failing_on("clip_2.mp4");
    let pipeline = fx.pipeline(CursorPolicy::Rewind, engine);
    let script = fx.script("Character,Dialogue\nFox,a b\nOwl,a b c\nFox,a\n");

    let report = pipeline.run_script(&script).await.unwrap();

    assert_eq!(report.failures[0].stage, RowStage::Overlay);
    assert!((report.timeline_seconds - 2.5).abs() < 1e-9);
    assert_eq!(pipeline_engine_cuts(&pipeline)[2], (1.5, 1.0));
}

#[tokio::test]
async fn short_background_fails_rows_instead_of_wrapping() {
    let fx = Fixture::new();
    let pipeline = fx.pipeline(CursorPolicy::Consume, FakeEngine::new(3.0));
    let script = fx.script("Character,Dialogue\nFox,a b c\nOwl,a b c\nFox,a\n");

    let report = pipeline.run_script(&script).await.unwrap();

    // Row 1 uses [0, 2); row 2 would need [2, 4); row 3 fits in [2, 3).
    let failed: Vec<(usize, RowStage)> =
        report.failures.iter().map(|f| (f.index, f.stage)).collect();
    assert_eq!(failed, [(2, RowStage::Segment)]);
    assert!((report.timeline_seconds - 3.0).abs() < 1e-9);
    assert_eq!(pipeline_engine_cuts(&pipeline).len(), 2);
}

#[tokio::test]
async fn empty_alignment_fails_the_row_without_subtitles() {
    let fx = Fixture::new();
    let pipeline = fx.pipeline(CursorPolicy::Consume, FakeEngine::new(60.0));
    let script = fx.script("Character,Dialogue\nFox,mumble mumble\n");
    let mut ctx = pipeline.open_run(&script).await.unwrap();

    let outcome = pipeline.process_row(&mut ctx, &script.rows[0]).await;

    match outcome {
        RowOutcome::Failed(failure) => {
            assert_eq!(failure.stage, RowStage::AlignFormat);
            assert!(matches!(failure.error, PipelineError::AlignmentEmpty));
        }
        RowOutcome::Done(_) => panic!("row should fail"),
    }
    assert!(!ctx.paths.subtitles(1).exists());
    assert!(ctx.completed().is_empty());
    assert!((ctx.cursor().seconds() - 1.5).abs() < 1e-9);
}

#[tokio::test]
async fn invalid_photo_side_fails_at_overlay() {
    let fx = Fixture::new();
    let pipeline = fx.pipeline(CursorPolicy::Consume, FakeEngine::new(60.0));
    let script = fx.script("Character,Dialogue,Photo_Side\nFox,hi,center\n");
    let mut ctx: RunContext = pipeline.open_run(&script).await.unwrap();

    let outcome = pipeline.process_row(&mut ctx, &script.rows[0]).await;

    match outcome {
        RowOutcome::Failed(failure) => {
            assert_eq!(failure.stage, RowStage::Overlay);
            assert!(matches!(failure.error, PipelineError::InvalidParameter(_)));
        }
        RowOutcome::Done(_) => panic!("row should fail"),
    }
}

#[tokio::test]
async fn subtitles_get_the_rows_font_size() {
    let fx = Fixture::new();
    let pipeline = fx.pipeline(CursorPolicy::Consume, FakeEngine::new(60.0));
    let script = fx.script("Character,Dialogue,FontSize\nFox,hello mumble world,72\n");
    let mut ctx = pipeline.open_run(&script).await.unwrap();

    let outcome = pipeline.process_row(&mut ctx, &script.rows[0]).await;
    assert!(matches!(outcome, RowOutcome::Done(_)));

    let ass = std::fs::read_to_string(ctx.paths.subtitles(1)).unwrap();
    assert!(ass.contains("Arial Black,72,"));
    assert_eq!(ass.matches("Dialogue: 0,").count(), 2);
    assert!(!ass.contains("mumble"));

    let overlay = pipeline.engine().calls_for(Stage::Overlay);
    let filter = arg_after(&overlay[0], "-filter_complex");
    // 40x80 photo on 1080x1920 at scale 1.25: height 1200, width 600.
    assert!(filter.starts_with("[1:v]scale=600:1200[ov]"));
}

#[tokio::test]
async fn run_with_no_completed_rows_reports_and_fails() {
    let fx = Fixture::new();
    let pipeline = fx.pipeline(CursorPolicy::Consume, FakeEngine::new(60.0));
    let script = fx.script("Character,Dialogue\nFox,BROKEN\nGhost,hello\n");

    let err = pipeline.run_script(&script).await.unwrap_err();
    assert!(matches!(err, PipelineError::InvalidParameter(_)));

    let report = std::fs::read_to_string(fx.root.join("outputs/episode_script/run_report.json"))
        .unwrap();
    let report: serde_json::Value = serde_json::from_str(&report).unwrap();
    assert_eq!(report["failures"].as_array().unwrap().len(), 2);
    assert_eq!(report["failures"][1]["stage"], "synthesize");
    assert!(report["failures"][1]["message"]
        .as_str()
        .unwrap()
        .contains("Ghost.wav"));
}

#[tokio::test]
async fn missing_photo_fails_at_overlay_after_using_footage() {
    let fx = Fixture::new();
    let cat_dir = fx.root.join("Resource/Characters/Cat");
    std::fs::create_dir_all(&cat_dir).unwrap();
    write_wav(&cat_dir.join("Cat.wav"), 0.1);
    let pipeline = fx.pipeline(CursorPolicy::Consume, FakeEngine::new(60.0));
    let script = fx.script("Character,Dialogue\nCat,meow meow\n");
    let mut ctx = pipeline.open_run(&script).await.unwrap();

    let outcome = pipeline.process_row(&mut ctx, &script.rows[0]).await;

    match outcome {
        RowOutcome::Failed(failure) => {
            assert_eq!(failure.stage, RowStage::Overlay);
            assert!(matches!(failure.error, PipelineError::ResourceNotFound(_)));
            assert!(failure.error.to_string().contains("Cat.png"));
        }
        RowOutcome::Done(_) => panic!("row should fail"),
    }
    assert!((ctx.cursor().seconds() - 1.5).abs() < 1e-9);
    assert!(ctx.paths.karaoke(1).is_file());
}

/// Stands in for the synthesis program: echoes log noise, then copies the
/// voice sample to the output path, or reports an error for "BROKEN" lines.
#[cfg(unix)]
const SYNTH_SCRIPT: &str = r#"
echo "loading model..."
case "$1" in
  *BROKEN*)
    echo '{"status": "error", "message": "model crashed on line"}'
    exit 1
    ;;
esac
cp "$2" "$7"
printf '{"status": "success", "output_file": "%s"}\n' "$7"
"#;

#[cfg(unix)]
fn shell_synthesizer() -> ProcessSynthesizer {
    let command = vec![
        "sh".to_string(),
        "-c".to_string(),
        SYNTH_SCRIPT.to_string(),
        "synth".to_string(),
    ];
    ProcessSynthesizer::new(command, Progress::hidden()).unwrap()
}

#[cfg(unix)]
#[tokio::test]
async fn synthesis_process_error_payload_becomes_a_row_failure() {
    let fx = Fixture::new();
    let config = fx.config(CursorPolicy::Consume);
    let pipeline = RowPipeline::new(
        config,
        shell_synthesizer(),
        FakeAligner,
        FakeEngine::new(60.0),
        Progress::hidden(),
    );
    let script = fx.script(THREE_ROWS);

    let report = pipeline.run_script(&script).await.unwrap();

    let temp = fx.root.join("Temporary/temp/episode_script");
    assert_eq!(
        manifest_clips(&temp.join("file_list.txt")),
        ["clip_1.mp4", "clip_3.mp4"]
    );
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].index, 2);
    assert_eq!(report.failures[0].stage, RowStage::Synthesize);
    assert!(report.failures[0].message.contains("model crashed on line"));
    // The copied voice sample is 0.1s, plus the row pad, for rows 1 and 3.
    assert!((report.timeline_seconds - 1.2).abs() < 1e-6);
    assert!(temp.join("audio_1.wav").is_file());
    assert!(!temp.join("audio_2.wav").exists());
}
