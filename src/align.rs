use std::path::Path;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{PipelineError, PipelineResult};
use crate::progress::Progress;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum MatchStatus {
    Success,
    Failure,
}

impl From<String> for MatchStatus {
    fn from(case: String) -> Self {
        if case == "success" {
            MatchStatus::Success
        } else {
            MatchStatus::Failure
        }
    }
}

/// One transcript word as placed in the audio by the aligner.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WordAlignment {
    pub word: String,
    #[serde(default)]
    pub start: Option<f64>,
    #[serde(default)]
    pub end: Option<f64>,
    pub case: MatchStatus,
}

impl WordAlignment {
    /// `(start, end)` when the word matched and both timestamps are present.
    pub fn valid_span(&self) -> Option<(f64, f64)> {
        match (self.case, self.start, self.end) {
            (MatchStatus::Success, Some(start), Some(end)) => Some((start, end)),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct AlignmentResponse {
    #[serde(default)]
    words: Vec<WordAlignment>,
}

#[async_trait]
pub trait ForcedAligner: Send + Sync {
    async fn align(&self, audio: &Path, transcript: &Path) -> PipelineResult<Vec<WordAlignment>>;
}

/// Client for a Gentle-style alignment server (`POST /transcriptions?async=false`).
pub struct HttpAligner {
    client: reqwest::Client,
    url: reqwest::Url,
    progress: Progress,
}

impl HttpAligner {
    pub fn new(url: reqwest::Url, progress: Progress) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
            progress,
        }
    }

    async fn request(&self, audio: &Path, transcript: &Path) -> PipelineResult<String> {
        let audio_bytes = tokio::fs::read(audio).await?;
        let transcript_text = tokio::fs::read_to_string(transcript).await?;

        let form = Form::new()
            .part(
                "audio",
                Part::bytes(audio_bytes)
                    .file_name("audio.wav")
                    .mime_str("audio/wav")?,
            )
            .part(
                "transcript",
                Part::text(transcript_text)
                    .file_name("transcript.txt")
                    .mime_str("text/plain")?,
            );

        let body = self
            .client
            .post(self.url.clone())
            .multipart(form)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        Ok(body)
    }
}

#[async_trait]
impl ForcedAligner for HttpAligner {
    async fn align(&self, audio: &Path, transcript: &Path) -> PipelineResult<Vec<WordAlignment>> {
        info!("Aligning {} with {}", audio.display(), self.url);
        let body = self
            .progress
            .while_running("Aligning Words", self.request(audio, transcript))
            .await?;
        let words = parse_alignment(&body)?;
        debug!("Aligner returned {} words", words.len());
        Ok(words)
    }
}

pub fn parse_alignment(body: &str) -> PipelineResult<Vec<WordAlignment>> {
    let parsed: AlignmentResponse = serde_json::from_str(body)
        .map_err(|e| PipelineError::malformed("alignment", format!("response json: {e}")))?;
    Ok(parsed.words)
}

pub fn write_transcript(path: &Path, text: &str) -> PipelineResult<()> {
    std::fs::write(path, text)?;
    Ok(())
}
