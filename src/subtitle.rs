//! Word-by-word karaoke subtitles in ASS format.

use std::fmt::Write as _;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, info};

use crate::align::WordAlignment;
use crate::error::{PipelineError, PipelineResult};

pub const KARAOKE_STYLE: &str = "Karaoke";

/// Index of `Fontsize` among the comma-separated fields of a `Style:` line.
const FONT_SIZE_FIELD: usize = 2;

const ASS_HEADER: &str = "[Script Info]
Title: Karaoke Word-by-Word
ScriptType: v4.00+
PlayResX: 1280
PlayResY: 720
WrapStyle: 0
ScaledBorderAndShadow: yes

[V4+ Styles]
Format: Name, Fontname, Fontsize, PrimaryColour, SecondaryColour, OutlineColour, BackColour, Bold, Italic, Underline, StrikeOut, ScaleX, ScaleY, Spacing, Angle, BorderStyle, Outline, Shadow, Alignment, MarginL, MarginR, MarginV, Encoding
Style: Karaoke, Arial Black, 64, &H00FFFFFF, &H000000FF, &H00000000, &H64000000, 1, 0, 0, 0, 100, 100, 0, 0, 1, 4, 5, 5, 30, 30, 40, 1

[Events]
Format: Layer, Start, End, Style, Name, MarginL, MarginR, MarginV, Effect, Text
";

static MARKUP_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[{}\\]").expect("static regex"));

#[derive(Debug, Clone, PartialEq)]
pub struct KaraokeEvent {
    pub start: f64,
    pub end: f64,
    /// Highlight length in centiseconds (`\k` tag value).
    pub highlight_cs: u32,
    pub text: String,
}

impl KaraokeEvent {
    pub fn to_dialogue_line(&self) -> String {
        format!(
            "Dialogue: 0,{},{},{KARAOKE_STYLE},,0,0,0,,{{\\k{}}}{}",
            sec_to_timestamp(self.start),
            sec_to_timestamp(self.end),
            self.highlight_cs,
            self.text
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct KaraokeTrack {
    pub events: Vec<KaraokeEvent>,
}

impl KaraokeTrack {
    /// Builds one event per valid word, in alignment order.
    pub fn from_alignments(words: &[WordAlignment]) -> PipelineResult<Self> {
        let mut clock = HighlightClock::default();
        let events: Vec<KaraokeEvent> = words
            .iter()
            .filter_map(|w| {
                let (start, end) = w.valid_span()?;
                Some(KaraokeEvent {
                    start,
                    end,
                    highlight_cs: clock.advance(start, end),
                    text: strip_markup(&w.word),
                })
            })
            .collect();

        debug!(
            "{} of {} aligned words are usable",
            events.len(),
            words.len()
        );
        if events.is_empty() {
            return Err(PipelineError::AlignmentEmpty);
        }
        Ok(Self { events })
    }

    pub fn render(&self) -> String {
        let mut out = String::from(ASS_HEADER);
        for event in &self.events {
            let _ = writeln!(out, "{}", event.to_dialogue_line());
        }
        out
    }

    pub fn write(&self, path: &Path) -> PipelineResult<()> {
        std::fs::write(path, self.render())?;
        info!(
            "Wrote {} karaoke events to {}",
            self.events.len(),
            path.display()
        );
        Ok(())
    }
}

/// Hands out per-word highlight centiseconds while carrying the rounding
/// remainder, so the running total never drifts more than half a centisecond
/// from the summed word durations.
#[derive(Debug, Default)]
pub struct HighlightClock {
    spoken: f64,
    emitted: u64,
}

impl HighlightClock {
    pub fn advance(&mut self, start: f64, end: f64) -> u32 {
        self.spoken += (end - start).max(0.0);
        let target = (self.spoken * 100.0).round() as u64;
        let cs = target.saturating_sub(self.emitted);
        self.emitted += cs;
        u32::try_from(cs).unwrap_or(u32::MAX)
    }
}

pub fn strip_markup(word: &str) -> String {
    MARKUP_CHARS.replace_all(word, "").into_owned()
}

/// `H:MM:SS.cc`, hours unpadded.
pub fn sec_to_timestamp(sec: f64) -> String {
    let total_cs = (sec.max(0.0) * 100.0).round() as u64;
    let cs = total_cs % 100;
    let total_sec = total_cs / 100;
    let s = total_sec % 60;
    let m = (total_sec / 60) % 60;
    let h = total_sec / 3600;
    format!("{h}:{m:02}:{s:02}.{cs:02}")
}

/// Rewrites the font size of every `Style:` line.
pub fn patch_font_size(contents: &str, font_size: u32) -> String {
    let mut out: Vec<String> = contents
        .lines()
        .map(|line| {
            let trimmed = line.trim();
            if !trimmed.starts_with("Style:") {
                return line.to_string();
            }
            let mut parts: Vec<String> = trimmed.split(',').map(str::to_string).collect();
            if parts.len() > FONT_SIZE_FIELD + 1 {
                parts[FONT_SIZE_FIELD] = font_size.to_string();
            }
            parts.join(",")
        })
        .collect();
    if contents.ends_with('\n') {
        out.push(String::new());
    }
    out.join("\n")
}

pub fn patch_font_size_file(path: &Path, font_size: u32) -> PipelineResult<()> {
    let contents = std::fs::read_to_string(path)?;
    std::fs::write(path, patch_font_size(&contents, font_size))?;
    debug!("Set subtitle font size {} in {}", font_size, path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::align::MatchStatus;

    fn word(text: &str, start: Option<f64>, end: Option<f64>, ok: bool) -> WordAlignment {
        WordAlignment {
            word: text.to_string(),
            start,
            end,
            case: if ok {
                MatchStatus::Success
            } else {
                MatchStatus::Failure
            },
        }
    }

    #[test]
    fn timestamps() {
        assert_eq!(sec_to_timestamp(3725.5), "1:02:05.50");
        assert_eq!(sec_to_timestamp(0.004), "0:00:00.00");
        assert_eq!(sec_to_timestamp(61.25), "0:01:01.25");
        assert_eq!(sec_to_timestamp(59.996), "0:01:00.00");
    }

    #[test]
    fn only_valid_words_become_events_in_order() {
        let words = vec![
            word("Hello", Some(0.10), Some(0.42), true),
            word("um", Some(0.42), Some(0.50), false),
            word("big", Some(0.55), None, true),
            word("world", Some(0.60), Some(1.05), true),
        ];
        let track = KaraokeTrack::from_alignments(&words).unwrap();
        let texts: Vec<&str> = track.events.iter().map(|e| e.text.as_str()).collect();
        assert_eq!(texts, ["Hello", "world"]);
        assert_eq!(track.events[0].highlight_cs, 32);
        assert_eq!(track.events[1].highlight_cs, 45);
    }

    #[test]
    fn highlight_total_stays_within_span() {
        let words = vec![
            word("one", Some(0.00), Some(0.30), true),
            word("two", Some(0.35), Some(0.70), true),
            word("three", Some(0.80), Some(1.20), true),
        ];
        let track = KaraokeTrack::from_alignments(&words).unwrap();
        let total: u32 = track.events.iter().map(|e| e.highlight_cs).sum();
        let span_cs = (1.20 - 0.00) * 100.0;
        assert!(f64::from(total) <= span_cs + 1.0);
    }

    #[test]
    fn back_to_back_words_do_not_accumulate_rounding() {
        let words: Vec<WordAlignment> = (0..4)
            .map(|i| {
                let start = f64::from(i) * 0.125;
                word("tick", Some(start), Some(start + 0.125), true)
            })
            .collect();
        let track = KaraokeTrack::from_alignments(&words).unwrap();
        let per_word: Vec<u32> = track.events.iter().map(|e| e.highlight_cs).collect();
        assert_eq!(per_word, [13, 12, 13, 12]);
        assert_eq!(per_word.iter().sum::<u32>(), 50);
    }

    #[test]
    fn long_back_to_back_run_stays_within_a_centisecond() {
        let words: Vec<WordAlignment> = (0..200)
            .map(|i| {
                let start = f64::from(i) * 0.0333;
                word("w", Some(start), Some(start + 0.0333), true)
            })
            .collect();
        let track = KaraokeTrack::from_alignments(&words).unwrap();
        let total: u32 = track.events.iter().map(|e| e.highlight_cs).sum();
        let span_cs = 200.0 * 0.0333 * 100.0;
        assert!((f64::from(total) - span_cs).abs() <= 1.0, "total {total} vs span {span_cs}");
    }

    #[test]
    fn no_valid_words_is_alignment_empty() {
        let words = vec![word("x", Some(0.0), Some(0.1), false), word("y", None, None, true)];
        assert!(matches!(
            KaraokeTrack::from_alignments(&words),
            Err(PipelineError::AlignmentEmpty)
        ));
        assert!(matches!(
            KaraokeTrack::from_alignments(&[]),
            Err(PipelineError::AlignmentEmpty)
        ));
    }

    #[test]
    fn markup_characters_are_stripped() {
        assert_eq!(strip_markup("{wow}"), "wow");
        assert_eq!(strip_markup(r"a\Nb"), "aNb");
    }

    #[test]
    fn dialogue_line_format() {
        let words = vec![word("Hi{", Some(1.0), Some(1.256), true)];
        let track = KaraokeTrack::from_alignments(&words).unwrap();
        let rendered = track.render();
        assert!(rendered.starts_with("[Script Info]"));
        assert!(rendered.contains(
            "Dialogue: 0,0:00:01.00,0:00:01.26,Karaoke,,0,0,0,,{\\k26}Hi\n"
        ));
        assert_eq!(rendered.matches("Style: ").count(), 1);
    }

    #[test]
    fn font_size_patch_touches_style_lines_only() {
        let words = vec![word("Hi", Some(0.0), Some(0.5), true)];
        let rendered = KaraokeTrack::from_alignments(&words).unwrap().render();
        let patched = patch_font_size(&rendered, 48);
        assert!(patched.contains("Style: Karaoke, Arial Black,48, &H00FFFFFF"));
        assert!(patched.contains("Format: Name, Fontname, Fontsize"));
        assert!(patched.contains("{\\k50}Hi"));
        assert!(patched.ends_with('\n'));
    }

    #[test]
    fn font_size_patch_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("subtitles_1.ass");
        let words = vec![word("Hi", Some(0.0), Some(0.5), true)];
        KaraokeTrack::from_alignments(&words).unwrap().write(&path).unwrap();
        patch_font_size_file(&path, 72).unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("Arial Black,72,"));
    }
}
