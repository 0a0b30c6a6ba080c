use std::path::PathBuf;

pub type PipelineResult<T> = Result<T, PipelineError>;

#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("{stage} failed ({status}): {detail}")]
    ExternalProcessFailure {
        stage: String,
        status: String,
        detail: String,
    },

    #[error("malformed output from {stage}: {detail}")]
    MalformedProcessOutput { stage: String, detail: String },

    #[error("alignment produced no usable words")]
    AlignmentEmpty,

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("resource not found: {}", .0.display())]
    ResourceNotFound(PathBuf),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl PipelineError {
    pub fn process(
        stage: impl Into<String>,
        status: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self::ExternalProcessFailure {
            stage: stage.into(),
            status: status.into(),
            detail: detail.into(),
        }
    }

    pub fn malformed(stage: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::MalformedProcessOutput {
            stage: stage.into(),
            detail: detail.into(),
        }
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidParameter(msg.into())
    }

    pub fn missing(path: impl Into<PathBuf>) -> Self {
        Self::ResourceNotFound(path.into())
    }
}
