use thiserror::Error;

/// Rejected at negotiation time, never during block processing.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LayoutError {
    #[error("unsupported output channel count {0} (expected mono or stereo)")]
    UnsupportedOutput(usize),
    #[error("input channel count {inputs} exceeds output channel count {outputs}")]
    TooManyInputs { inputs: usize, outputs: usize },
    #[error("invalid sample rate {0}")]
    InvalidSampleRate(f64),
    #[error("maximum block size must be non-zero")]
    ZeroBlockSize,
}

/// Rejected offline renders.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RenderError {
    #[error(transparent)]
    Layout(#[from] LayoutError),
    #[error("note {index} has a non-finite start or duration")]
    InvalidNote { index: usize },
    #[error("tail length {0} is not finite")]
    InvalidTail(f64),
    #[error("render of {seconds} s exceeds the {limit} s limit")]
    TooLong { seconds: f64, limit: f64 },
}

/// Failures on the text-to-patch path. Reported as status events; they never
/// reach the audio thread.
#[derive(Debug, Error)]
pub enum PatchError {
    #[error("prompt is empty")]
    EmptyPrompt,
    #[error("API key not set")]
    MissingApiKey,
    #[error("network error: {0}")]
    Transport(String),
    #[error("unexpected response: {0}")]
    Response(String),
    #[error("failed to parse patch: {0}")]
    Json(#[from] serde_json::Error),
    #[error("patch is not a JSON object")]
    NotAnObject,
    #[error("patch worker has shut down")]
    WorkerGone,
    #[error("failed to start patch worker: {0}")]
    Spawn(#[from] std::io::Error),
}
