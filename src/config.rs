use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::info;

use crate::args::Args;
use crate::error::{PipelineError, PipelineResult};

/// Per-character voice and layout defaults, keyed by the script's `Character` value.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct CharacterProfile {
    pub exaggeration: Option<f64>,
    pub temperature: Option<f64>,
    pub seed: Option<i64>,
    pub cfg_weight: Option<f64>,
    pub scale: Option<f64>,
    pub font_size: Option<u32>,
}

pub type Profiles = HashMap<String, CharacterProfile>;

#[derive(Debug, Default, Deserialize)]
struct ProfilesFile {
    #[serde(default)]
    characters: Profiles,
}

pub fn load_profiles(path: &Path) -> PipelineResult<Profiles> {
    if !path.is_file() {
        return Err(PipelineError::missing(path));
    }
    let data = std::fs::read_to_string(path)?;
    parse_profiles(&data)
}

pub fn parse_profiles(data: &str) -> PipelineResult<Profiles> {
    let file: ProfilesFile = toml::from_str(data)
        .map_err(|e| PipelineError::invalid(format!("character profiles: {e}")))?;
    Ok(file.characters)
}

/// What happens to the timeline cursor when a row fails after its segment was cut.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CursorPolicy {
    /// The failed row keeps its slice of background footage.
    #[default]
    Consume,
    /// The cursor returns to where the failed row started.
    Rewind,
}

/// Everything the pipeline needs, resolved and checked once at startup.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub script: Option<PathBuf>,
    pub scripts_dir: PathBuf,
    pub resources_dir: PathBuf,
    pub background: Option<PathBuf>,
    pub temp_root: PathBuf,
    pub output_root: PathBuf,
    pub tts_command: Vec<String>,
    pub aligner_url: reqwest::Url,
    pub profiles: Profiles,
    pub overlay_duration: f64,
    pub cursor_policy: CursorPolicy,
}

impl PipelineConfig {
    pub fn from_args(args: &Args) -> PipelineResult<Self> {
        let tts_command = shell_words::split(&args.tts_command)
            .map_err(|e| PipelineError::invalid(format!("--tts-command: {e}")))?;
        let aligner_url = reqwest::Url::parse(&args.aligner_url)
            .map_err(|e| PipelineError::invalid(format!("--aligner-url: {e}")))?;
        let profiles = match &args.profiles {
            Some(path) => load_profiles(path)?,
            None => Profiles::new(),
        };

        let cfg = Self {
            script: args.script.clone(),
            scripts_dir: args.scripts_dir.clone(),
            resources_dir: args.resources_dir.clone(),
            background: args.background.clone(),
            temp_root: args.temp_root.clone(),
            output_root: args.output_root.clone(),
            tts_command,
            aligner_url,
            profiles,
            overlay_duration: args.overlay_duration,
            cursor_policy: if args.rewind_on_failure {
                CursorPolicy::Rewind
            } else {
                CursorPolicy::Consume
            },
        };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> PipelineResult<()> {
        if self.tts_command.is_empty() {
            return Err(PipelineError::invalid("--tts-command must not be empty"));
        }
        if !(self.overlay_duration.is_finite() && self.overlay_duration > 0.0) {
            return Err(PipelineError::invalid(
                "--overlay-duration must be a positive number of seconds",
            ));
        }
        if !self.resources_dir.is_dir() {
            return Err(PipelineError::missing(&self.resources_dir));
        }
        if let Some(script) = &self.script {
            if !script.is_file() {
                return Err(PipelineError::missing(script));
            }
        }
        if let Some(bg) = &self.background {
            if !bg.is_file() {
                return Err(PipelineError::missing(bg));
            }
        }
        for (name, profile) in &self.profiles {
            if profile.scale.is_some_and(|s| !(s.is_finite() && s > 0.0)) {
                return Err(PipelineError::invalid(format!(
                    "profile '{name}': scale must be positive"
                )));
            }
        }
        info!(
            "Configuration ok: resources={}, temp={}, output={}",
            self.resources_dir.display(),
            self.temp_root.display(),
            self.output_root.display()
        );
        Ok(())
    }
}
