use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use reelforge::align::HttpAligner;
use reelforge::args::Args;
use reelforge::ffmpeg::{FfmpegEngine, is_ffmpeg_on_path};
use reelforge::progress::Progress;
use reelforge::script::{find_script_file, load_script};
use reelforge::tts::ProcessSynthesizer;
use reelforge::{PipelineConfig, RowPipeline};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting dialogue video assembly");

    let args = Args::parse();
    let config = PipelineConfig::from_args(&args)?;

    if !is_ffmpeg_on_path() {
        error!("ffmpeg was not found on PATH");
        anyhow::bail!("ffmpeg is required but was not found on PATH");
    }

    let script_path = match &config.script {
        Some(path) => path.clone(),
        None => {
            info!(
                "Searching for a script in {}",
                config.scripts_dir.display()
            );
            find_script_file(&config.scripts_dir)?
        }
    };
    let script = load_script(&script_path, &config.profiles)?;

    let progress = Progress::new();
    let synthesizer = ProcessSynthesizer::new(config.tts_command.clone(), progress.clone())?;
    let aligner = HttpAligner::new(config.aligner_url.clone(), progress.clone());
    let engine = FfmpegEngine::new(progress.clone());
    let pipeline = RowPipeline::new(config, synthesizer, aligner, engine, progress);

    let report = pipeline.run_script(&script).await?;
    if !report.failures.is_empty() {
        warn!(
            "{} line(s) failed: {:?}",
            report.failures.len(),
            report.failures.iter().map(|f| f.index).collect::<Vec<_>>()
        );
    }
    if let Some(video) = &report.final_video {
        info!("Final video saved to: {}", video.display());
    }

    info!("Process complete.");
    Ok(())
}
