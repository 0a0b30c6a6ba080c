use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(about = "Render a narrated short from a dialogue script")]
pub struct Args {
    /// Script CSV; when omitted the first CSV in --scripts-dir is used
    #[clap(long)]
    pub script: Option<PathBuf>,

    #[clap(long, default_value = ".")]
    pub scripts_dir: PathBuf,

    #[clap(long, default_value = "./Support/Resource")]
    pub resources_dir: PathBuf,

    /// Background video; when omitted one is picked from <resources-dir>/Videos
    #[clap(long)]
    pub background: Option<PathBuf>,

    #[clap(long, default_value = "./Temporary/temp")]
    pub temp_root: PathBuf,

    #[clap(long, default_value = "./outputs")]
    pub output_root: PathBuf,

    #[clap(long, default_value = "python ./Support/Chatterbox/inference.py")]
    pub tts_command: String,

    #[clap(long, default_value = "http://localhost:8765/transcriptions?async=false")]
    pub aligner_url: String,

    /// TOML file with per-character voice defaults
    #[clap(long)]
    pub profiles: Option<PathBuf>,

    #[clap(long, default_value_t = 0.3)]
    pub overlay_duration: f64,

    /// Give a failed row's background footage back to the next row
    #[clap(long)]
    pub rewind_on_failure: bool,
}
