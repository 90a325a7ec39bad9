use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrackError {
    #[error("malformed sample: {0}")]
    MalformedSample(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("stale result from epoch {got} (current epoch {current})")]
    StaleResult { got: u64, current: u64 },
    #[error("feed already running")]
    AlreadyRunning,
    #[error("invalid payload: {0}")]
    InvalidPayload(#[from] serde_json::Error),
}

impl TrackError {
    pub fn malformed(msg: impl Into<String>) -> Self {
        TrackError::MalformedSample(msg.into())
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        TrackError::Transport(msg.into())
    }
}
