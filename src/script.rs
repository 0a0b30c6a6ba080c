use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, info};

use crate::config::{CharacterProfile, Profiles};
use crate::error::{PipelineError, PipelineResult};

pub const DEFAULT_SIDE: &str = "left";
pub const DEFAULT_EXAGGERATION: f64 = 0.6;
pub const DEFAULT_TEMPERATURE: f64 = 0.7;
pub const DEFAULT_SEED: i64 = 42;
pub const DEFAULT_CFG_WEIGHT: f64 = 0.5;
pub const DEFAULT_SCALE: f64 = 1.25;
pub const DEFAULT_FONT_SIZE: u32 = 48;

/// Voice settings handed to the synthesis process for one line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SynthesisParams {
    pub exaggeration: f64,
    pub temperature: f64,
    pub seed: i64,
    pub cfg_weight: f64,
}

/// One spoken line of a script. `index` is 1-based and drives artifact names.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptRow {
    pub index: usize,
    pub character: String,
    pub dialogue: String,
    /// Kept as written (lower-cased); validated when the overlay is built.
    pub photo_side: String,
    pub synthesis: SynthesisParams,
    pub scale: f64,
    pub font_size: u32,
}

#[derive(Debug, Deserialize)]
struct RawRow {
    #[serde(rename = "Character")]
    character: Option<String>,
    #[serde(rename = "Dialogue")]
    dialogue: Option<String>,
    #[serde(rename = "Photo_Side", default)]
    photo_side: Option<String>,
    #[serde(rename = "Exaggeration", default)]
    exaggeration: Option<String>,
    #[serde(rename = "Temperature", default)]
    temperature: Option<String>,
    #[serde(rename = "Seed_num", default)]
    seed: Option<String>,
    #[serde(rename = "Cfg_weight", default)]
    cfg_weight: Option<String>,
    #[serde(rename = "scale", default)]
    scale: Option<String>,
    #[serde(rename = "FontSize", default)]
    font_size: Option<String>,
}

/// A script file together with the name used to namespace its artifacts.
#[derive(Debug, Clone)]
pub struct Script {
    pub name: String,
    pub path: PathBuf,
    pub rows: Vec<ScriptRow>,
}

pub fn load_script(path: &Path, profiles: &Profiles) -> PipelineResult<Script> {
    if !path.is_file() {
        return Err(PipelineError::missing(path));
    }
    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| PipelineError::invalid(format!("bad script file name {}", path.display())))?
        .to_string();

    let data = std::fs::read_to_string(path)?;
    let rows = parse_rows(&data, profiles)?;
    if rows.is_empty() {
        return Err(PipelineError::invalid(format!(
            "script {} has no rows",
            path.display()
        )));
    }
    info!("Loaded script '{}' with {} rows", name, rows.len());

    Ok(Script {
        name,
        path: path.to_path_buf(),
        rows,
    })
}

pub fn parse_rows(data: &str, profiles: &Profiles) -> PipelineResult<Vec<ScriptRow>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(data.as_bytes());

    let mut rows = Vec::new();
    for (i, record) in reader.deserialize::<RawRow>().enumerate() {
        let index = i + 1;
        let raw = record.map_err(|e| PipelineError::invalid(format!("row {index}: {e}")))?;
        rows.push(resolve_row(index, raw, profiles)?);
    }
    Ok(rows)
}

fn resolve_row(index: usize, raw: RawRow, profiles: &Profiles) -> PipelineResult<ScriptRow> {
    let character = non_empty(raw.character)
        .ok_or_else(|| PipelineError::invalid(format!("row {index}: missing Character")))?;
    let dialogue = non_empty(raw.dialogue)
        .ok_or_else(|| PipelineError::invalid(format!("row {index}: missing Dialogue")))?;

    let fallback = CharacterProfile::default();
    let profile = profiles.get(&character).unwrap_or(&fallback);
    debug!("Row {} uses profile {:?}", index, profile);

    let number = |cell: Option<String>, column: &str| -> PipelineResult<Option<f64>> {
        match non_empty(cell) {
            None => Ok(None),
            Some(text) => match text.parse::<f64>() {
                Ok(v) if v.is_finite() => Ok(Some(v)),
                _ => Err(PipelineError::invalid(format!(
                    "row {index}: {column} is not a number: '{text}'"
                ))),
            },
        }
    };
    let whole = |value: f64, min: f64, max: f64, column: &str| -> PipelineResult<f64> {
        if value.fract() == 0.0 && (min..=max).contains(&value) {
            Ok(value)
        } else {
            Err(PipelineError::invalid(format!(
                "row {index}: {column} must be a whole number between {min} and {max}, got {value}"
            )))
        }
    };

    let exaggeration = number(raw.exaggeration, "Exaggeration")?
        .or(profile.exaggeration)
        .unwrap_or(DEFAULT_EXAGGERATION);
    let temperature = number(raw.temperature, "Temperature")?
        .or(profile.temperature)
        .unwrap_or(DEFAULT_TEMPERATURE);
    let seed = number(raw.seed, "Seed_num")?
        .map(|v| whole(v, i64::MIN as f64, i64::MAX as f64, "Seed_num"))
        .transpose()?
        .map(|v| v as i64)
        .or(profile.seed)
        .unwrap_or(DEFAULT_SEED);
    let cfg_weight = number(raw.cfg_weight, "Cfg_weight")?
        .or(profile.cfg_weight)
        .unwrap_or(DEFAULT_CFG_WEIGHT);
    let scale = number(raw.scale, "scale")?
        .or(profile.scale)
        .unwrap_or(DEFAULT_SCALE);
    let font_size = number(raw.font_size, "FontSize")?
        .map(|v| whole(v, 1.0, f64::from(u16::MAX), "FontSize"))
        .transpose()?
        .map(|v| v as u32)
        .or(profile.font_size)
        .unwrap_or(DEFAULT_FONT_SIZE);

    let photo_side = non_empty(raw.photo_side)
        .unwrap_or_else(|| DEFAULT_SIDE.to_string())
        .to_lowercase();

    Ok(ScriptRow {
        index,
        character,
        dialogue,
        photo_side,
        synthesis: SynthesisParams {
            exaggeration,
            temperature,
            seed,
            cfg_weight,
        },
        scale,
        font_size,
    })
}

fn non_empty(cell: Option<String>) -> Option<String> {
    cell.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// First `*.csv` in `dir`, skipping office lock files (`~$name.csv`).
pub fn find_script_file(dir: &Path) -> PipelineResult<PathBuf> {
    let mut candidates: Vec<PathBuf> = std::fs::read_dir(dir)
        .map_err(|_| PipelineError::missing(dir))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file())
        .filter(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case("csv"))
        })
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| !n.starts_with("~$"))
        })
        .collect();
    candidates.sort();
    candidates
        .into_iter()
        .next()
        .ok_or_else(|| PipelineError::missing(dir.join("*.csv")))
}
