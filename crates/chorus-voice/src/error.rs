//! Error types for the Chorus playback core

use thiserror::Error;

/// Result type alias for voice operations
pub type VoiceResult<T> = Result<T, VoiceError>;

/// Errors that can occur anywhere between a producer and the voice session
#[derive(Error, Debug)]
pub enum VoiceError {
    /// Bad user input (language, accent, voice parameter, missing voice channel).
    /// Surfaced immediately; no queue entry is created.
    #[error("{0}")]
    Validation(String),

    #[error("Synthesis backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Model switch to '{model}' failed: {reason}")]
    ModelSwitchFailed { model: String, reason: String },

    #[error("Inference failed: {0}")]
    InferenceFailed(String),

    #[error("Job submission failed: {0}")]
    SubmissionFailed(String),

    #[error("Job {token} timed out after {attempts} polls")]
    TimedOut { token: String, attempts: u32 },

    #[error("Job {token} failed: {reason}")]
    JobFailed { token: String, reason: String },

    #[error("Voice connection error: {0}")]
    Connection(String),

    #[error("Audio playback error: {0}")]
    Playback(String),

    /// Deleting a staged asset failed. Logged, never surfaced to a user.
    #[error("Asset cleanup failed: {0}")]
    Cleanup(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Chat surface error: {0}")]
    Chat(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl VoiceError {
    /// Text shown to the originator of a failed request.
    pub fn user_message(&self) -> String {
        match self {
            VoiceError::Validation(msg) => msg.clone(),
            VoiceError::BackendUnavailable(_) => {
                "The synthesis server is offline. Try again later.".to_string()
            }
            VoiceError::ModelSwitchFailed { model, .. } => {
                format!("Could not load voice model '{}'.", model)
            }
            VoiceError::InferenceFailed(_) => "Speech generation failed.".to_string(),
            VoiceError::SubmissionFailed(_) => "Could not submit the voice job.".to_string(),
            VoiceError::TimedOut { .. } => "The voice job took too long.".to_string(),
            VoiceError::JobFailed { .. } => "The voice job failed.".to_string(),
            VoiceError::Connection(_) => "Could not join your voice channel.".to_string(),
            VoiceError::Playback(_) => "Playback failed.".to_string(),
            other => format!("Something went wrong: {}", other),
        }
    }
}

impl From<config::ConfigError> for VoiceError {
    fn from(err: config::ConfigError) -> Self {
        VoiceError::Config(err.to_string())
    }
}
