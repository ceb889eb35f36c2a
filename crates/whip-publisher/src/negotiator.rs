//! Session negotiator
//!
//! Runs the single WHIP offer/answer exchange:
//!
//! ```text
//! configure(transport) ─► create_offer ─► set_local_description
//!        ─► wait for ICE gathering ─► POST offer ─► set_remote_description
//! ```
//!
//! The `configure` hook attaches tracks and registers state observers before
//! the offer exists, so no state callback can observe a half-negotiated
//! session. There is no trickle ICE: candidates are gathered into the offer
//! before it is sent. Nothing is retried.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, info};
use url::Url;

use crate::error::{Result, WhipError};
use crate::signaling::Signaling;
use crate::transport::{SessionDescription, SessionTransport};

/// Default bound on ICE gathering
pub const DEFAULT_GATHERING_TIMEOUT: Duration = Duration::from_secs(10);

/// Negotiation settings
#[derive(Debug, Clone, Copy)]
pub struct NegotiationOptions {
    /// Bound on ICE gathering; `None` waits indefinitely
    pub gathering_timeout: Option<Duration>,
}

impl Default for NegotiationOptions {
    fn default() -> Self {
        Self {
            gathering_timeout: Some(DEFAULT_GATHERING_TIMEOUT),
        }
    }
}

/// Outcome of a completed negotiation. Read-only.
#[derive(Debug)]
pub struct NegotiatedSession<T> {
    endpoint: Url,
    local_description: SessionDescription,
    remote_description: SessionDescription,
    transport: T,
}

impl<T> NegotiatedSession<T> {
    /// Endpoint the offer was first sent to
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// The offer as sent, ICE candidates included
    pub fn local_description(&self) -> &SessionDescription {
        &self.local_description
    }

    /// The answer as received
    pub fn remote_description(&self) -> &SessionDescription {
        &self.remote_description
    }

    /// The negotiated transport
    pub fn transport(&self) -> &T {
        &self.transport
    }
}

/// Negotiate one session over `transport`.
///
/// `configure` receives a handle to the not-yet-negotiated transport and must
/// finish before the offer is created; its error aborts negotiation before
/// any network traffic.
pub async fn negotiate<T, S, F, Fut>(
    transport: T,
    signaling: &S,
    options: NegotiationOptions,
    configure: F,
) -> Result<NegotiatedSession<T>>
where
    T: SessionTransport,
    S: Signaling + ?Sized,
    F: FnOnce(T) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    configure(transport.clone()).await?;
    debug!("Session configured");

    let offer = transport.create_offer().await?;
    info!("Offer created");

    transport.set_local_description(offer).await?;

    match options.gathering_timeout {
        Some(limit) => tokio::time::timeout(limit, transport.wait_for_gathering())
            .await
            .map_err(|_| WhipError::GatheringTimeout {
                seconds: limit.as_secs(),
            })??,
        None => transport.wait_for_gathering().await?,
    }
    debug!("ICE gathering complete");

    let local_description = transport
        .local_description()
        .await
        .ok_or(WhipError::MissingLocalDescription)?;
    debug!("Local description:\n{}", local_description.sdp);

    let answer = signaling.exchange(&local_description.sdp).await?;
    if answer.trim().is_empty() {
        return Err(WhipError::EmptyAnswer);
    }

    let remote_description = SessionDescription::answer(answer);
    transport
        .set_remote_description(remote_description.clone())
        .await?;
    info!("Remote answer applied, negotiation with {} complete", signaling.endpoint());

    Ok(NegotiatedSession {
        endpoint: signaling.endpoint().clone(),
        local_description,
        remote_description,
        transport,
    })
}
