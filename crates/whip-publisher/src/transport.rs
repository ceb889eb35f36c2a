//! WebRTC transport boundary
//!
//! [`SessionTransport`] is the slice of the peer connection the negotiator
//! drives. [`PeerTransport`] implements it on top of the `webrtc` crate and
//! also exposes track creation and state subscriptions for the `configure`
//! hook.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, trace};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::{MediaEngine, MIME_TYPE_H264, MIME_TYPE_OPUS};
use webrtc::api::setting_engine::SettingEngine;
use webrtc::api::APIBuilder;
use webrtc::dtls::extension::extension_use_srtp::SrtpProtectionProfile;
use webrtc::ice_transport::ice_connection_state::RTCIceConnectionState;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::policy::ice_transport_policy::RTCIceTransportPolicy;
use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::{RTCRtpCodecCapability, RTCRtpCodecParameters, RTPCodecType};
use webrtc::rtp_transceiver::rtp_sender::RTCRtpSender;
use webrtc::rtp_transceiver::RTCPFeedback;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;

use crate::error::{Result, WhipError};
use crate::lifecycle::{IceConnectionState, PeerConnectionState};

/// Opus payload type offered to the endpoint
pub const OPUS_PAYLOAD_TYPE: u8 = 111;

/// H.264 payload types and their fmtp lines, in offer order
const H264_PROFILES: &[(u8, &str)] = &[
    (102, "level-asymmetry-allowed=1;packetization-mode=1;profile-level-id=42001f"),
    (104, "level-asymmetry-allowed=1;packetization-mode=0;profile-level-id=42001f"),
    (106, "level-asymmetry-allowed=1;packetization-mode=1;profile-level-id=42e01f"),
    (108, "level-asymmetry-allowed=1;packetization-mode=0;profile-level-id=42e01f"),
    (127, "level-asymmetry-allowed=1;packetization-mode=1;profile-level-id=4d001f"),
    (39, "level-asymmetry-allowed=1;packetization-mode=0;profile-level-id=4d001f"),
    (112, "level-asymmetry-allowed=1;packetization-mode=1;profile-level-id=64001f"),
];

/// Minimum time to wait for host/srflx candidates before accepting a relay pair
const RELAY_ACCEPTANCE_MIN_WAIT: Duration = Duration::from_secs(1);

/// RTCP buffer size for the feedback drain
const RTCP_READ_BUFFER: usize = 1500;

/// Kind of SDP carried by a [`SessionDescription`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdpType {
    Offer,
    Answer,
}

/// An SDP blob and its role in the exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDescription {
    pub sdp_type: SdpType,
    pub sdp: String,
}

impl SessionDescription {
    /// An SDP offer
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Offer,
            sdp: sdp.into(),
        }
    }

    /// An SDP answer
    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Answer,
            sdp: sdp.into(),
        }
    }
}

/// Offer/answer operations of a peer connection
#[async_trait]
pub trait SessionTransport: Clone + Send + Sync + 'static {
    /// Create a local offer
    async fn create_offer(&self) -> Result<SessionDescription>;

    /// Apply the local description and start ICE gathering
    async fn set_local_description(&self, description: SessionDescription) -> Result<()>;

    /// Wait until ICE gathering has completed
    async fn wait_for_gathering(&self) -> Result<()>;

    /// The current local description, candidates included once gathered
    async fn local_description(&self) -> Option<SessionDescription>;

    /// Apply the remote answer
    async fn set_remote_description(&self, description: SessionDescription) -> Result<()>;
}

/// Media kinds this publisher sends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Audio,
    Video,
}

impl MediaKind {
    fn capability(self) -> RTCRtpCodecCapability {
        match self {
            MediaKind::Audio => opus_capability(),
            MediaKind::Video => h264_capability(H264_PROFILES[0].1),
        }
    }

    fn track_id(self) -> &'static str {
        match self {
            MediaKind::Audio => "audio",
            MediaKind::Video => "video",
        }
    }
}

/// Stream id attached to the tracks unless configured otherwise
pub const DEFAULT_STREAM_ID: &str = "whip-publisher";

/// Peer connection settings
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// STUN/TURN server URLs
    pub ice_servers: Vec<String>,
    /// Stream id attached to every track
    pub stream_id: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            ice_servers: Vec::new(),
            stream_id: DEFAULT_STREAM_ID.to_string(),
        }
    }
}

/// A peer connection built for publishing Opus audio and a placeholder H.264 track
#[derive(Clone)]
pub struct PeerTransport {
    peer_connection: Arc<RTCPeerConnection>,
    stream_id: String,
    gathering: Arc<Mutex<Option<mpsc::Receiver<()>>>>,
}

impl PeerTransport {
    /// Build the media engine, interceptors and peer connection
    pub async fn new(config: &TransportConfig) -> Result<Self> {
        let mut media_engine = MediaEngine::default();
        register_codecs(&mut media_engine)?;

        let registry = register_default_interceptors(Registry::new(), &mut media_engine)?;

        let mut setting_engine = SettingEngine::default();
        setting_engine.set_srtp_protection_profiles(vec![
            SrtpProtectionProfile::Srtp_Aes128_Cm_Hmac_Sha1_80,
        ]);
        setting_engine.set_relay_acceptance_min_wait(Some(RELAY_ACCEPTANCE_MIN_WAIT));

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .with_setting_engine(setting_engine)
            .build();

        let ice_servers = if config.ice_servers.is_empty() {
            Vec::new()
        } else {
            vec![RTCIceServer {
                urls: config.ice_servers.clone(),
                ..Default::default()
            }]
        };

        let peer_connection = api
            .new_peer_connection(RTCConfiguration {
                ice_servers,
                ice_transport_policy: RTCIceTransportPolicy::All,
                ..Default::default()
            })
            .await?;
        debug!("Peer connection created");

        Ok(Self {
            peer_connection: Arc::new(peer_connection),
            stream_id: config.stream_id.clone(),
            gathering: Arc::new(Mutex::new(None)),
        })
    }

    /// Create a sample track for `kind`
    pub fn create_track(&self, kind: MediaKind) -> Arc<TrackLocalStaticSample> {
        Arc::new(TrackLocalStaticSample::new(
            kind.capability(),
            kind.track_id().to_owned(),
            self.stream_id.clone(),
        ))
    }

    /// Attach a track and start draining RTCP feedback for its sender
    pub async fn add_track(&self, track: Arc<TrackLocalStaticSample>) -> Result<Arc<RTCRtpSender>> {
        let sender = self
            .peer_connection
            .add_track(track as Arc<dyn TrackLocal + Send + Sync>)
            .await?;
        spawn_feedback_drain(Arc::clone(&sender));
        Ok(sender)
    }

    /// Subscribe to ICE connection state changes
    pub fn on_ice_state_change<F>(&self, handler: F)
    where
        F: Fn(IceConnectionState) + Send + Sync + 'static,
    {
        self.peer_connection
            .on_ice_connection_state_change(Box::new(move |state: RTCIceConnectionState| {
                handler(state.into());
                Box::pin(async {})
            }));
    }

    /// Subscribe to peer connection state changes
    pub fn on_peer_state_change<F>(&self, handler: F)
    where
        F: Fn(PeerConnectionState) + Send + Sync + 'static,
    {
        self.peer_connection
            .on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
                handler(state.into());
                Box::pin(async {})
            }));
    }

    /// Close the peer connection
    pub async fn close(&self) -> Result<()> {
        self.peer_connection.close().await?;
        Ok(())
    }
}

#[async_trait]
impl SessionTransport for PeerTransport {
    async fn create_offer(&self) -> Result<SessionDescription> {
        let offer = self.peer_connection.create_offer(None).await?;
        Ok(from_rtc(offer))
    }

    async fn set_local_description(&self, description: SessionDescription) -> Result<()> {
        // The promise must exist before gathering starts or completion is missed
        let done = self.peer_connection.gathering_complete_promise().await;
        *self.gathering.lock().await = Some(done);

        self.peer_connection
            .set_local_description(to_rtc(description)?)
            .await?;
        Ok(())
    }

    async fn wait_for_gathering(&self) -> Result<()> {
        let done = self.gathering.lock().await.take();
        match done {
            Some(mut done) => {
                let _ = done.recv().await;
                Ok(())
            }
            None => Err(WhipError::signaling(
                "ICE gathering awaited before the local description was set",
            )),
        }
    }

    async fn local_description(&self) -> Option<SessionDescription> {
        self.peer_connection
            .local_description()
            .await
            .map(from_rtc)
    }

    async fn set_remote_description(&self, description: SessionDescription) -> Result<()> {
        self.peer_connection
            .set_remote_description(to_rtc(description)?)
            .await?;
        Ok(())
    }
}

fn to_rtc(description: SessionDescription) -> Result<RTCSessionDescription> {
    let rtc = match description.sdp_type {
        SdpType::Offer => RTCSessionDescription::offer(description.sdp)?,
        SdpType::Answer => RTCSessionDescription::answer(description.sdp)?,
    };
    Ok(rtc)
}

fn from_rtc(description: RTCSessionDescription) -> SessionDescription {
    match description.sdp_type {
        RTCSdpType::Answer => SessionDescription::answer(description.sdp),
        _ => SessionDescription::offer(description.sdp),
    }
}

fn opus_capability() -> RTCRtpCodecCapability {
    RTCRtpCodecCapability {
        mime_type: MIME_TYPE_OPUS.to_owned(),
        clock_rate: 48000,
        channels: 2,
        sdp_fmtp_line: "minptime=10;useinbandfec=1".to_owned(),
        rtcp_feedback: vec![],
    }
}

fn h264_capability(fmtp: &str) -> RTCRtpCodecCapability {
    let feedback = [("goog-remb", ""), ("ccm", "fir"), ("nack", ""), ("nack", "pli")];

    RTCRtpCodecCapability {
        mime_type: MIME_TYPE_H264.to_owned(),
        clock_rate: 90000,
        channels: 0,
        sdp_fmtp_line: fmtp.to_owned(),
        rtcp_feedback: feedback
            .iter()
            .map(|(typ, parameter)| RTCPFeedback {
                typ: (*typ).to_owned(),
                parameter: (*parameter).to_owned(),
            })
            .collect(),
    }
}

fn register_codecs(media_engine: &mut MediaEngine) -> Result<()> {
    media_engine.register_codec(
        RTCRtpCodecParameters {
            capability: opus_capability(),
            payload_type: OPUS_PAYLOAD_TYPE,
            ..Default::default()
        },
        RTPCodecType::Audio,
    )?;

    for (payload_type, fmtp) in H264_PROFILES {
        media_engine.register_codec(
            RTCRtpCodecParameters {
                capability: h264_capability(fmtp),
                payload_type: *payload_type,
                ..Default::default()
            },
            RTPCodecType::Video,
        )?;
    }

    Ok(())
}

/// Read RTCP for a sender so interceptors (NACK, reports) keep running
fn spawn_feedback_drain(sender: Arc<RTCRtpSender>) {
    tokio::spawn(async move {
        let mut buf = vec![0u8; RTCP_READ_BUFFER];
        while sender.read(&mut buf).await.is_ok() {}
        trace!("RTCP feedback drain finished");
    });
}
