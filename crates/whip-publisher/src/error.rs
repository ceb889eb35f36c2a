//! Error types for the WHIP publisher

use std::path::PathBuf;

use thiserror::Error;

/// Result type for publisher operations
pub type Result<T> = std::result::Result<T, WhipError>;

/// Errors that can occur while publishing
#[derive(Debug, Error)]
pub enum WhipError {
    /// The audio file to publish does not exist
    #[error("Could not find audio file `{}`", path.display())]
    MissingAudioFile { path: PathBuf },

    /// The audio file exists but does not start with a valid Ogg/Opus header
    #[error("Could not read audio file `{}`: {source}", path.display())]
    UnreadableAudioFile {
        path: PathBuf,
        source: webrtc::media::Error,
    },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// The endpoint URL or a redirect target could not be parsed
    #[error("Invalid endpoint URL: {0}")]
    InvalidEndpoint(#[from] url::ParseError),

    /// File system error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Ogg container could not be read or parsed mid-stream
    #[error("Container error: {0}")]
    Container(#[from] webrtc::media::Error),

    /// WebRTC engine error (tracks, offer/answer, sample writes)
    #[error("WebRTC error: {0}")]
    Transport(#[from] webrtc::Error),

    /// HTTP transport error during the offer exchange
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The signaling exchange did not produce a usable response
    #[error("Signaling error: {message}")]
    Signaling { message: String },

    /// The endpoint answered with an empty body
    #[error("Endpoint returned an empty SDP answer")]
    EmptyAnswer,

    /// Redirect chain exceeded the hop limit
    #[error("Stopped after {limit} redirects")]
    TooManyRedirects { limit: usize },

    /// ICE gathering did not complete in time
    #[error("ICE gathering did not complete within {seconds} seconds")]
    GatheringTimeout { seconds: u64 },

    /// No local description was available after gathering
    #[error("No local description after ICE gathering")]
    MissingLocalDescription,

    /// A sample could not be handed to the track
    #[error("Sink error: {message}")]
    Sink { message: String },

    /// Every shutdown trigger was dropped without a reason
    #[error("Publishing stopped without a termination reason")]
    Abandoned,
}

impl WhipError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a signaling error
    pub fn signaling(message: impl Into<String>) -> Self {
        Self::Signaling {
            message: message.into(),
        }
    }

    /// Create a sink error
    pub fn sink(message: impl Into<String>) -> Self {
        Self::Sink {
            message: message.into(),
        }
    }

    /// Name of the stage that failed, used in the diagnostic line on exit
    pub fn stage(&self) -> &'static str {
        match self {
            Self::MissingAudioFile { .. }
            | Self::UnreadableAudioFile { .. }
            | Self::Configuration { .. }
            | Self::Io(_) => "startup",
            Self::InvalidEndpoint(_)
            | Self::Transport(_)
            | Self::Http(_)
            | Self::Signaling { .. }
            | Self::EmptyAnswer
            | Self::TooManyRedirects { .. }
            | Self::GatheringTimeout { .. }
            | Self::MissingLocalDescription => "negotiation",
            Self::Container(_) | Self::Sink { .. } | Self::Abandoned => "media",
        }
    }
}
