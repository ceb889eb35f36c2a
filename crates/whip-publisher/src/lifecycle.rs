//! Connection lifecycle monitor and shutdown signal
//!
//! The transport pushes ICE and peer-connection state changes into a
//! [`LifecycleMonitor`]. ICE `connected` opens the [`StartGate`] so media can
//! flow; a `failed` peer connection ends the run through the shutdown signal.
//! Every other transition is only logged.

use std::fmt;
use std::sync::{Arc, Mutex};

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use webrtc::ice_transport::ice_connection_state::RTCIceConnectionState;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;

use crate::error::WhipError;
use crate::gate::StartGate;
use crate::pacer::PaceReport;
use crate::transport::PeerTransport;

/// ICE connection state as reported by the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IceConnectionState {
    New,
    Checking,
    Connected,
    Completed,
    Disconnected,
    Failed,
    Closed,
}

impl fmt::Display for IceConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::New => write!(f, "new"),
            Self::Checking => write!(f, "checking"),
            Self::Connected => write!(f, "connected"),
            Self::Completed => write!(f, "completed"),
            Self::Disconnected => write!(f, "disconnected"),
            Self::Failed => write!(f, "failed"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

impl From<RTCIceConnectionState> for IceConnectionState {
    fn from(state: RTCIceConnectionState) -> Self {
        match state {
            RTCIceConnectionState::Unspecified | RTCIceConnectionState::New => Self::New,
            RTCIceConnectionState::Checking => Self::Checking,
            RTCIceConnectionState::Connected => Self::Connected,
            RTCIceConnectionState::Completed => Self::Completed,
            RTCIceConnectionState::Disconnected => Self::Disconnected,
            RTCIceConnectionState::Failed => Self::Failed,
            RTCIceConnectionState::Closed => Self::Closed,
        }
    }
}

/// Coarse peer connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerConnectionState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl fmt::Display for PeerConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::New => write!(f, "new"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::Disconnected => write!(f, "disconnected"),
            Self::Failed => write!(f, "failed"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

impl From<RTCPeerConnectionState> for PeerConnectionState {
    fn from(state: RTCPeerConnectionState) -> Self {
        match state {
            RTCPeerConnectionState::Unspecified | RTCPeerConnectionState::New => Self::New,
            RTCPeerConnectionState::Connecting => Self::Connecting,
            RTCPeerConnectionState::Connected => Self::Connected,
            RTCPeerConnectionState::Disconnected => Self::Disconnected,
            RTCPeerConnectionState::Failed => Self::Failed,
            RTCPeerConnectionState::Closed => Self::Closed,
        }
    }
}

/// Why a publishing run ended
#[derive(Debug)]
pub enum Termination {
    /// Every page of the audio file was sent
    StreamFinished(PaceReport),
    /// The peer connection reached `failed`
    ConnectionFailed,
    /// Reading or sending media failed mid-stream
    MediaFailed(WhipError),
}

impl Termination {
    /// Whether the run ended the way it was meant to
    pub fn is_success(&self) -> bool {
        matches!(self, Termination::StreamFinished(_))
    }
}

/// Fires the shutdown signal. Cloneable; the first reason wins.
#[derive(Debug, Clone)]
pub struct ShutdownTrigger {
    sender: Arc<Mutex<Option<oneshot::Sender<Termination>>>>,
    token: CancellationToken,
}

impl ShutdownTrigger {
    /// Record `reason` and stop every task watching [`ShutdownTrigger::token`].
    ///
    /// Returns `false` if the run was already terminating.
    pub fn terminate(&self, reason: Termination) -> bool {
        let sender = match self.sender.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        self.token.cancel();

        match sender {
            Some(sender) => {
                let _ = sender.send(reason);
                true
            }
            None => {
                debug!("Already terminating, ignoring {:?}", reason);
                false
            }
        }
    }

    /// Token cancelled once the run starts terminating
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

/// The receiving side of the shutdown signal
#[derive(Debug)]
pub struct Shutdown {
    receiver: oneshot::Receiver<Termination>,
}

impl Shutdown {
    /// Wait for the first termination reason.
    ///
    /// `None` if every trigger was dropped without firing.
    pub async fn wait(self) -> Option<Termination> {
        self.receiver.await.ok()
    }
}

/// Create a connected trigger/receiver pair
pub fn shutdown_channel() -> (ShutdownTrigger, Shutdown) {
    let (sender, receiver) = oneshot::channel();
    (
        ShutdownTrigger {
            sender: Arc::new(Mutex::new(Some(sender))),
            token: CancellationToken::new(),
        },
        Shutdown { receiver },
    )
}

/// Reacts to transport state changes
#[derive(Debug, Clone)]
pub struct LifecycleMonitor {
    gate: StartGate,
    shutdown: ShutdownTrigger,
}

impl LifecycleMonitor {
    /// Create a monitor that opens `gate` and fires `shutdown`
    pub fn new(gate: StartGate, shutdown: ShutdownTrigger) -> Self {
        Self { gate, shutdown }
    }

    /// Handle an ICE connection state change
    pub fn handle_ice_state(&self, state: IceConnectionState) {
        info!("ICE connection state has changed: {}", state);

        if state == IceConnectionState::Connected {
            if self.gate.fire() {
                info!("ICE connected, releasing media");
            } else {
                debug!("ICE connected again, start gate already open");
            }
        }
    }

    /// Handle a peer connection state change
    pub fn handle_peer_state(&self, state: PeerConnectionState) {
        info!("Peer connection state has changed: {}", state);

        if state == PeerConnectionState::Failed {
            // No ICE restart: a failed connection ends the run
            error!("Peer connection has gone to failed, exiting");
            self.shutdown.terminate(Termination::ConnectionFailed);
        }
    }

    /// Register this monitor for the state changes of `transport`
    pub fn attach(&self, transport: &PeerTransport) {
        let monitor = self.clone();
        transport.on_ice_state_change(move |state| monitor.handle_ice_state(state));

        let monitor = self.clone();
        transport.on_peer_state_change(move |state| monitor.handle_peer_state(state));
    }
}
