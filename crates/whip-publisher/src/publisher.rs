//! Publishing run
//!
//! Ties the pieces together: the audio file is checked and opened before any
//! network work, the negotiator's `configure` hook attaches the tracks, parks
//! the pacer on the start gate and wires the lifecycle monitor, and the run
//! then waits on the shutdown signal until the stream ends or the connection
//! fails.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::PublisherConfig;
use crate::error::{Result, WhipError};
use crate::gate::StartGate;
use crate::lifecycle::{shutdown_channel, LifecycleMonitor, ShutdownTrigger, Termination};
use crate::negotiator::negotiate;
use crate::pacer::{PaceOutcome, PagePacer};
use crate::page::{OggPageSource, PageSource};
use crate::signaling::{Signaling, WhipSignaling};
use crate::sink::TrackSink;
use crate::transport::{MediaKind, PeerTransport};

/// One WHIP publishing session
pub struct Publisher<S = WhipSignaling> {
    config: PublisherConfig,
    signaling: S,
}

impl Publisher<WhipSignaling> {
    /// Create a publisher talking to the configured endpoint
    pub fn from_config(config: PublisherConfig) -> Result<Self> {
        config.validate()?;
        let signaling =
            WhipSignaling::new(&config.endpoint, config.token.clone(), config.http_timeout)?;
        Ok(Self { config, signaling })
    }
}

impl<S: Signaling> Publisher<S> {
    /// Create a publisher with a custom signaling client
    pub fn with_signaling(config: PublisherConfig, signaling: S) -> Self {
        Self { config, signaling }
    }

    /// The configuration this publisher runs with
    pub fn config(&self) -> &PublisherConfig {
        &self.config
    }

    /// Publish until the stream ends, the connection fails, or media fails.
    ///
    /// Startup and negotiation failures are returned as errors; how an
    /// established session ended is returned as the [`Termination`].
    pub async fn run(self) -> Result<Termination> {
        self.config.validate()?;

        let source = OggPageSource::open(&self.config.audio_file)?;
        info!("Publishing {} to {}", self.config.audio_file.display(), self.signaling.endpoint());

        let transport = PeerTransport::new(&self.config.transport_config()).await?;

        let (trigger, shutdown) = shutdown_channel();
        let stop = trigger.clone();
        let gate = StartGate::new();
        let monitor = LifecycleMonitor::new(gate.clone(), trigger.clone());
        let page_interval = self.config.page_interval;

        let negotiated = negotiate(
            transport,
            &self.signaling,
            self.config.negotiation_options(),
            move |transport| {
                configure_session(transport, source, page_interval, gate, monitor, trigger)
            },
        )
        .await;

        let session = match negotiated {
            Ok(session) => session,
            Err(e) => {
                stop.token().cancel();
                return Err(e);
            }
        };

        let termination = shutdown.wait().await.ok_or(WhipError::Abandoned)?;
        debug!("Run terminated: {:?}", termination);

        if let Err(e) = session.transport().close().await {
            warn!("Failed to close peer connection: {}", e);
        }

        Ok(termination)
    }
}

/// Attach the audio and video tracks, start the pacer and the monitor
async fn configure_session<P>(
    transport: PeerTransport,
    source: P,
    page_interval: Duration,
    gate: StartGate,
    monitor: LifecycleMonitor,
    trigger: ShutdownTrigger,
) -> Result<()>
where
    P: PageSource + 'static,
{
    let audio = transport.create_track(MediaKind::Audio);
    transport.add_track(Arc::clone(&audio)).await?;
    spawn_pacer(PagePacer::new(source, audio, page_interval), gate, trigger);

    // The endpoint will not connect without a video transceiver; nothing is ever written to it
    let video = transport.create_track(MediaKind::Video);
    transport.add_track(video).await?;

    monitor.attach(&transport);
    Ok(())
}

/// Run a pacer in its own task and report how it ended through `trigger`
pub fn spawn_pacer<P, K>(
    pacer: PagePacer<P, K>,
    gate: StartGate,
    trigger: ShutdownTrigger,
) -> JoinHandle<()>
where
    P: PageSource + 'static,
    K: TrackSink + 'static,
{
    tokio::spawn(async move {
        match pacer.run(&gate, trigger.token()).await {
            Ok(PaceOutcome::Finished(report)) => {
                trigger.terminate(Termination::StreamFinished(report));
            }
            Ok(PaceOutcome::Stopped(report)) => {
                debug!("Pacer stopped after {} pages", report.pages);
            }
            Err(e) => {
                error!("Media pacing failed: {}", e);
                trigger.terminate(Termination::MediaFailed(e));
            }
        }
    })
}
