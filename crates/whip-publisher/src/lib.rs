//! # WHIP Publisher
//!
//! Publishes a pre-recorded Ogg/Opus file to a WHIP (WebRTC-HTTP Ingestion
//! Protocol) endpoint.
//!
//! A session is negotiated with a single HTTP `POST` of the SDP offer (ICE
//! candidates gathered in advance) and the response body is applied as the
//! answer. Once ICE reports `connected`, the audio pages are released at
//! real-time pace, each with a duration derived from its granule position.
//! A placeholder H.264 track is negotiated alongside because ingest endpoints
//! require one.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use whip_publisher::{BearerToken, Publisher, PublisherConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = PublisherConfig::new(BearerToken::new("my-stage-token"))
//!         .with_audio_file("output.ogg");
//!
//!     let termination = Publisher::from_config(config)?.run().await?;
//!     println!("finished: {:?}", termination);
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`negotiator`]: the offer/answer exchange
//! - [`signaling`]: the HTTP side of the exchange
//! - [`transport`]: the peer connection
//! - [`lifecycle`]: connection state handling and the shutdown signal
//! - [`pacer`], [`granule`], [`page`], [`sink`]: real-time media pacing

pub mod config;
pub mod error;
pub mod gate;
pub mod granule;
pub mod lifecycle;
pub mod logging;
pub mod negotiator;
pub mod pacer;
pub mod page;
pub mod publisher;
pub mod signaling;
pub mod sink;
pub mod transport;

pub use config::PublisherConfig;
pub use error::{Result, WhipError};
pub use gate::StartGate;
pub use granule::GranuleClock;
pub use lifecycle::{
    shutdown_channel, IceConnectionState, LifecycleMonitor, PeerConnectionState, Shutdown,
    ShutdownTrigger, Termination,
};
pub use negotiator::{negotiate, NegotiatedSession, NegotiationOptions};
pub use pacer::{PaceOutcome, PaceReport, PagePacer};
pub use page::{AudioPage, OggPageSource, PageSource};
pub use publisher::Publisher;
pub use signaling::{BearerToken, Signaling, WhipSignaling};
pub use sink::TrackSink;
pub use transport::{MediaKind, PeerTransport, SessionDescription, SessionTransport};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
