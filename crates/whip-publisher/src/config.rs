//! Publisher configuration
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use whip_publisher::config::PublisherConfig;
//! use whip_publisher::signaling::BearerToken;
//!
//! let config = PublisherConfig::new(BearerToken::new("token"))
//!     .with_audio_file("intro.ogg")
//!     .with_http_timeout(None)
//!     .with_page_interval(Duration::from_millis(20));
//!
//! assert!(config.validate().is_ok());
//! assert_eq!(config.audio_file.to_str(), Some("intro.ogg"));
//! ```

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Result, WhipError};
use crate::negotiator::{NegotiationOptions, DEFAULT_GATHERING_TIMEOUT};
use crate::pacer::DEFAULT_PAGE_INTERVAL;
use crate::signaling::BearerToken;
use crate::transport::{TransportConfig, DEFAULT_STREAM_ID};

/// Default ingestion endpoint
pub const DEFAULT_ENDPOINT: &str = "https://global.whip.live-video.net";

/// Default audio file, looked up in the working directory
pub const DEFAULT_AUDIO_FILE: &str = "output.ogg";

/// Default bound on the HTTP offer exchange
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Everything a publishing run needs
#[derive(Debug, Clone)]
pub struct PublisherConfig {
    /// WHIP endpoint URL
    pub endpoint: String,
    /// Bearer token sent with the offer
    pub token: BearerToken,
    /// Ogg/Opus file to publish
    pub audio_file: PathBuf,
    /// Page release cadence
    pub page_interval: Duration,
    /// Bound on the HTTP exchange; `None` waits indefinitely
    pub http_timeout: Option<Duration>,
    /// Bound on ICE gathering; `None` waits indefinitely
    pub gathering_timeout: Option<Duration>,
    /// STUN/TURN server URLs
    pub ice_servers: Vec<String>,
    /// Media stream id the tracks are grouped under in the offer
    pub stream_id: String,
}

impl PublisherConfig {
    /// Defaults for everything but the token
    pub fn new(token: BearerToken) -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            token,
            audio_file: PathBuf::from(DEFAULT_AUDIO_FILE),
            page_interval: DEFAULT_PAGE_INTERVAL,
            http_timeout: Some(DEFAULT_HTTP_TIMEOUT),
            gathering_timeout: Some(DEFAULT_GATHERING_TIMEOUT),
            ice_servers: Vec::new(),
            stream_id: DEFAULT_STREAM_ID.to_string(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_audio_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.audio_file = path.into();
        self
    }

    pub fn with_page_interval(mut self, interval: Duration) -> Self {
        self.page_interval = interval;
        self
    }

    pub fn with_http_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.http_timeout = timeout;
        self
    }

    pub fn with_gathering_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.gathering_timeout = timeout;
        self
    }

    pub fn with_ice_server(mut self, url: impl Into<String>) -> Self {
        self.ice_servers.push(url.into());
        self
    }

    pub fn with_stream_id(mut self, stream_id: impl Into<String>) -> Self {
        self.stream_id = stream_id.into();
        self
    }

    /// Check the settings that can be checked without touching the network
    pub fn validate(&self) -> Result<()> {
        if self.token.is_blank() {
            return Err(WhipError::config("Bearer token must not be empty"));
        }

        if self.endpoint.trim().is_empty() {
            return Err(WhipError::config("Endpoint URL must not be empty"));
        }

        if self.stream_id.trim().is_empty() {
            return Err(WhipError::config("Stream id must not be empty"));
        }

        if self.page_interval.is_zero() {
            return Err(WhipError::config("Page interval must be greater than zero"));
        }

        Ok(())
    }

    /// Negotiator settings derived from this configuration
    pub fn negotiation_options(&self) -> NegotiationOptions {
        NegotiationOptions {
            gathering_timeout: self.gathering_timeout,
        }
    }

    /// Transport settings derived from this configuration
    pub fn transport_config(&self) -> TransportConfig {
        TransportConfig {
            ice_servers: self.ice_servers.clone(),
            stream_id: self.stream_id.clone(),
        }
    }
}
