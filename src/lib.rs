pub mod audio;
pub mod integration;
pub mod llm;
pub mod pipeline;
pub mod speech;

use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum ZadeError {
    #[error("Synthesis error: {0}")]
    SynthesisError(String),

    #[error("Playback error: {0}")]
    PlaybackError(String),

    #[error("Audio device error: {0}")]
    AudioDeviceError(String),

    #[error("Recognition error: {0}")]
    RecognitionError(String),

    #[error("Responder error: {0}")]
    ResponderError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IOError(String),

    #[error("Pipeline error: {0}")]
    PipelineError(String),

    #[error("Queue full: {0}")]
    QueueFull(String),

    #[error("Pipeline has been shut down")]
    ShutDown,
}

impl From<std::io::Error> for ZadeError {
    fn from(e: std::io::Error) -> Self {
        ZadeError::IOError(e.to_string())
    }
}

impl From<serde_json::Error> for ZadeError {
    fn from(e: serde_json::Error) -> Self {
        ZadeError::ConfigError(e.to_string())
    }
}

impl ZadeError {
    /// Check if this error is recoverable
    pub fn is_recoverable(&self) -> bool {
        match self {
            // A single utterance failed; the stage keeps going
            ZadeError::SynthesisError(_) => true,
            ZadeError::PlaybackError(_) => true,
            ZadeError::RecognitionError(_) => true,
            ZadeError::ResponderError(_) => true,
            // Caller may retry once the backlog shrinks
            ZadeError::QueueFull(_) => true,
            ZadeError::AudioDeviceError(_) => false,
            ZadeError::ConfigError(_) => false,
            ZadeError::IOError(_) => false,
            ZadeError::PipelineError(_) => false,
            ZadeError::ShutDown => false,
        }
    }

    /// Get a user-friendly description
    pub fn user_message(&self) -> String {
        match self {
            ZadeError::SynthesisError(_) => {
                "Speech synthesis failed. The response was skipped.".to_string()
            }
            ZadeError::PlaybackError(_) => {
                "Audio playback failed. Please check your speakers.".to_string()
            }
            ZadeError::AudioDeviceError(_) => {
                "Audio device error. Please check your microphone/speakers.".to_string()
            }
            ZadeError::RecognitionError(_) => {
                "Speech recognition failed. Please try again.".to_string()
            }
            ZadeError::ResponderError(_) => {
                "I am unable to process that request right now.".to_string()
            }
            ZadeError::ConfigError(_) => {
                "Configuration error. Please check settings.".to_string()
            }
            ZadeError::IOError(_) => "File system error occurred.".to_string(),
            ZadeError::PipelineError(_) => {
                "Speech pipeline error. Please restart the assistant.".to_string()
            }
            ZadeError::QueueFull(_) => {
                "Too much speech is queued. Please wait a moment.".to_string()
            }
            ZadeError::ShutDown => "The assistant is shutting down.".to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ZadeError>;
