//! File-system layout for one script run.
//!
//! Every artifact name is derived from the script name and the 1-based row
//! index only, so re-running a script overwrites the previous run's files.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use rand::seq::SliceRandom;
use tracing::info;

use crate::error::{PipelineError, PipelineResult};

#[derive(Debug, Clone)]
pub struct RunPaths {
    pub script_name: String,
    pub temp_dir: PathBuf,
    pub output_dir: PathBuf,
}

impl RunPaths {
    pub fn new(temp_root: &Path, output_root: &Path, script_name: &str) -> Self {
        Self {
            script_name: script_name.to_string(),
            temp_dir: temp_root.join(script_name),
            output_dir: output_root.join(script_name),
        }
    }

    pub fn prepare(&self) -> PipelineResult<()> {
        fs::create_dir_all(&self.temp_dir)?;
        fs::create_dir_all(&self.output_dir)?;
        info!(
            "Prepared run directories {} and {}",
            self.temp_dir.display(),
            self.output_dir.display()
        );
        Ok(())
    }

    pub fn raw_audio(&self, index: usize) -> PathBuf {
        self.temp_dir.join(format!("audio_{index}.wav"))
    }

    pub fn normalized_audio(&self, index: usize) -> PathBuf {
        self.temp_dir.join(format!("audio_{index}_norm.wav"))
    }

    pub fn segment(&self, index: usize) -> PathBuf {
        self.temp_dir.join(format!("temp_video_{index}.mp4"))
    }

    pub fn transcript(&self, index: usize) -> PathBuf {
        self.temp_dir.join(format!("transcript_{index}.txt"))
    }

    pub fn subtitles(&self, index: usize) -> PathBuf {
        self.temp_dir.join(format!("subtitles_{index}.ass"))
    }

    pub fn karaoke(&self, index: usize) -> PathBuf {
        self.temp_dir.join(format!("karaoke_{index}.mp4"))
    }

    pub fn clip(&self, index: usize) -> PathBuf {
        self.temp_dir.join(format!("clip_{index}.mp4"))
    }

    pub fn manifest(&self) -> PathBuf {
        self.temp_dir.join("file_list.txt")
    }

    pub fn final_video(&self) -> PathBuf {
        self.output_dir
            .join(format!("final_output_{}.mp4", self.script_name))
    }

    pub fn report(&self) -> PathBuf {
        self.output_dir.join("run_report.json")
    }
}

/// Where one character's reference voice sample and photo live.
///
/// Each file is checked only by the step that needs it.
#[derive(Debug, Clone)]
pub struct CharacterAssets {
    dir: PathBuf,
    name: String,
}

impl CharacterAssets {
    pub fn voice(&self) -> PipelineResult<PathBuf> {
        self.existing("wav")
    }

    pub fn photo(&self) -> PipelineResult<PathBuf> {
        self.existing("png")
    }

    fn existing(&self, extension: &str) -> PipelineResult<PathBuf> {
        let path = self.dir.join(format!("{}.{extension}", self.name));
        if path.is_file() {
            Ok(path)
        } else {
            Err(PipelineError::missing(path))
        }
    }
}

pub fn character_assets(resources_dir: &Path, character: &str) -> CharacterAssets {
    CharacterAssets {
        dir: resources_dir.join("Characters").join(character),
        name: character.to_string(),
    }
}

pub fn pick_background(resources_dir: &Path) -> PipelineResult<PathBuf> {
    let dir = resources_dir.join("Videos");
    let videos: Vec<PathBuf> = fs::read_dir(&dir)
        .map_err(|_| PipelineError::missing(&dir))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file())
        .collect();

    videos
        .choose(&mut rand::thread_rng())
        .cloned()
        .ok_or_else(|| PipelineError::missing(dir.join("*")))
}

/// Appends one line per failed row to `<output_root>/failures.log`.
pub fn record_failure(
    output_root: &Path,
    script_name: &str,
    index: usize,
    stage: &str,
    message: &str,
) -> PipelineResult<()> {
    fs::create_dir_all(output_root)?;
    let mut f = OpenOptions::new()
        .create(true)
        .append(true)
        .open(output_root.join("failures.log"))?;
    writeln!(
        f,
        "{script_name} row {index} failed at {stage}: {}",
        message.replace('\n', " ")
    )?;
    Ok(())
}
