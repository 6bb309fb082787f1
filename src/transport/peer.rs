//! WebRTC Peer Transport
//!
//! Verwaltet eine Peer Connection für Audio und Video. Der Austausch von
//! SDP und ICE Candidates über Signaling bleibt beim Aufrufer.

use parking_lot::Mutex;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_rtp::TrackLocalStaticRTP;
use webrtc::track::track_local::TrackLocal;

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("WebRTC error: {0}")]
    WebRTC(String),

    #[error("No active peer connection")]
    NoPeerConnection,

    #[error("Peer connection already exists")]
    AlreadyConnected,

    #[error("Invalid SDP: {0}")]
    InvalidSdp(String),
}

// ============================================================================
// EVENTS
// ============================================================================

/// Zustandsmeldungen des Transports an den Call-Lifecycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Medien fließen
    Connected,
    /// Vorübergehend unterbrochen, kann sich wieder verbinden
    Interrupted,
    /// Endgültig fehlgeschlagen
    Failed(String),
    /// Geschlossen
    Closed,
    /// Lokaler ICE Candidate (JSON) für das Signaling
    IceCandidate(String),
}

impl TransportEvent {
    fn from_state(state: RTCPeerConnectionState) -> Option<Self> {
        match state {
            RTCPeerConnectionState::Connected => Some(Self::Connected),
            RTCPeerConnectionState::Disconnected => Some(Self::Interrupted),
            RTCPeerConnectionState::Failed => {
                Some(Self::Failed("peer connection failed".to_string()))
            }
            RTCPeerConnectionState::Closed => Some(Self::Closed),
            _ => None,
        }
    }
}

// ============================================================================
// ICE SERVER CONFIGURATION
// ============================================================================

/// Öffentliche STUN-Server
pub fn default_ice_servers() -> Vec<RTCIceServer> {
    vec![RTCIceServer {
        urls: vec![
            "stun:stun.l.google.com:19302".to_string(),
            "stun:stun1.l.google.com:19302".to_string(),
        ],
        ..Default::default()
    }]
}

// ============================================================================
// PEER TRANSPORT
// ============================================================================

pub struct PeerTransport {
    peer_connection: Arc<Mutex<Option<Arc<RTCPeerConnection>>>>,
    event_tx: broadcast::Sender<TransportEvent>,
    ice_servers: Vec<RTCIceServer>,
}

impl PeerTransport {
    pub fn new() -> Self {
        let (event_tx, _) = broadcast::channel(100);

        Self {
            peer_connection: Arc::new(Mutex::new(None)),
            event_tx,
            ice_servers: default_ice_servers(),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TransportEvent> {
        self.event_tx.subscribe()
    }

    pub fn has_peer_connection(&self) -> bool {
        self.peer_connection.lock().is_some()
    }

    /// Erstellt das SDP Offer für einen ausgehenden Anruf
    pub async fn create_offer(&self) -> Result<String, TransportError> {
        let pc = self.create_peer_connection().await?;

        let offer = pc
            .create_offer(None)
            .await
            .map_err(|e| TransportError::WebRTC(e.to_string()))?;

        pc.set_local_description(offer.clone())
            .await
            .map_err(|e| TransportError::WebRTC(e.to_string()))?;

        Ok(offer.sdp)
    }

    /// Beantwortet ein eingehendes SDP Offer
    pub async fn accept_offer(&self, offer_sdp: String) -> Result<String, TransportError> {
        let offer = RTCSessionDescription::offer(offer_sdp)
            .map_err(|e| TransportError::InvalidSdp(e.to_string()))?;

        let pc = self.create_peer_connection().await?;

        pc.set_remote_description(offer)
            .await
            .map_err(|e| TransportError::WebRTC(e.to_string()))?;

        let answer = pc
            .create_answer(None)
            .await
            .map_err(|e| TransportError::WebRTC(e.to_string()))?;

        pc.set_local_description(answer.clone())
            .await
            .map_err(|e| TransportError::WebRTC(e.to_string()))?;

        Ok(answer.sdp)
    }

    /// Verarbeitet das SDP Answer der Gegenseite
    pub async fn apply_answer(&self, answer_sdp: String) -> Result<(), TransportError> {
        let pc = self.current()?;

        let answer = RTCSessionDescription::answer(answer_sdp)
            .map_err(|e| TransportError::InvalidSdp(e.to_string()))?;

        pc.set_remote_description(answer)
            .await
            .map_err(|e| TransportError::WebRTC(e.to_string()))
    }

    /// Fügt einen ICE Candidate der Gegenseite hinzu
    pub async fn add_ice_candidate(&self, candidate_json: String) -> Result<(), TransportError> {
        let pc = self.current()?;

        let candidate: RTCIceCandidateInit = serde_json::from_str(&candidate_json)
            .map_err(|e| TransportError::WebRTC(e.to_string()))?;

        pc.add_ice_candidate(candidate)
            .await
            .map_err(|e| TransportError::WebRTC(e.to_string()))
    }

    /// Schließt die Peer Connection (mehrfacher Aufruf ist harmlos)
    pub async fn close(&self) {
        let pc = self.peer_connection.lock().take();
        if let Some(pc) = pc {
            if let Err(e) = pc.close().await {
                tracing::warn!("Failed to close peer connection: {}", e);
            }
            let _ = self.event_tx.send(TransportEvent::Closed);
        }
    }

    // ========================================================================
    // PRIVATE METHODS
    // ========================================================================

    fn current(&self) -> Result<Arc<RTCPeerConnection>, TransportError> {
        self.peer_connection
            .lock()
            .clone()
            .ok_or(TransportError::NoPeerConnection)
    }

    async fn create_peer_connection(&self) -> Result<Arc<RTCPeerConnection>, TransportError> {
        if self.has_peer_connection() {
            return Err(TransportError::AlreadyConnected);
        }

        let mut media_engine = MediaEngine::default();
        media_engine
            .register_default_codecs()
            .map_err(|e| TransportError::WebRTC(e.to_string()))?;

        let mut registry = Registry::new();
        registry = register_default_interceptors(registry, &mut media_engine)
            .map_err(|e| TransportError::WebRTC(e.to_string()))?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let config = RTCConfiguration {
            ice_servers: self.ice_servers.clone(),
            ..Default::default()
        };

        let pc = Arc::new(
            api.new_peer_connection(config)
                .await
                .map_err(|e| TransportError::WebRTC(e.to_string()))?,
        );

        self.add_local_tracks(&pc).await?;
        self.setup_handlers(&pc);

        *self.peer_connection.lock() = Some(Arc::clone(&pc));
        Ok(pc)
    }

    /// Audio (Opus) und Video (VP8) Tracks
    async fn add_local_tracks(&self, pc: &Arc<RTCPeerConnection>) -> Result<(), TransportError> {
        let tracks = [
            ("audio/opus", 48000, 2, "audio"),
            ("video/VP8", 90000, 0, "video"),
        ];

        for (mime_type, clock_rate, channels, id) in tracks {
            let track = Arc::new(TrackLocalStaticRTP::new(
                RTCRtpCodecCapability {
                    mime_type: mime_type.to_string(),
                    clock_rate,
                    channels,
                    ..Default::default()
                },
                id.to_string(),
                "tandem".to_string(),
            ));

            pc.add_track(track as Arc<dyn TrackLocal + Send + Sync>)
                .await
                .map_err(|e| TransportError::WebRTC(e.to_string()))?;
        }

        Ok(())
    }

    fn setup_handlers(&self, pc: &Arc<RTCPeerConnection>) {
        let event_tx = self.event_tx.clone();
        pc.on_peer_connection_state_change(Box::new(move |s: RTCPeerConnectionState| {
            tracing::info!("Peer connection state: {:?}", s);
            if let Some(event) = TransportEvent::from_state(s) {
                let _ = event_tx.send(event);
            }
            Box::pin(async {})
        }));

        let event_tx = self.event_tx.clone();
        pc.on_ice_candidate(Box::new(move |candidate| {
            if let Some(c) = candidate {
                if let Ok(json) = c.to_json() {
                    if let Ok(candidate_str) = serde_json::to_string(&json) {
                        let _ = event_tx.send(TransportEvent::IceCandidate(candidate_str));
                    }
                }
            }
            Box::pin(async {})
        }));

        pc.on_track(Box::new(move |track, _, _| {
            Box::pin(async move {
                tracing::info!("Received remote track: {:?}", track.codec());
            })
        }));
    }
}

impl Default for PeerTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PeerTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerTransport")
            .field("has_peer_connection", &self.has_peer_connection())
            .finish()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_mapping() {
        assert_eq!(
            TransportEvent::from_state(RTCPeerConnectionState::Connected),
            Some(TransportEvent::Connected)
        );
        assert_eq!(
            TransportEvent::from_state(RTCPeerConnectionState::Disconnected),
            Some(TransportEvent::Interrupted)
        );
        assert!(matches!(
            TransportEvent::from_state(RTCPeerConnectionState::Failed),
            Some(TransportEvent::Failed(_))
        ));
        assert_eq!(TransportEvent::from_state(RTCPeerConnectionState::Connecting), None);
    }

    #[tokio::test]
    async fn test_operations_without_peer_connection() {
        let transport = PeerTransport::new();
        assert!(matches!(
            transport.apply_answer("v=0".to_string()).await,
            Err(TransportError::NoPeerConnection)
        ));
        // Schließen ohne Verbindung ist ein No-op
        transport.close().await;
        transport.close().await;
    }

    #[tokio::test]
    async fn test_offer_contains_audio_and_video() {
        let transport = PeerTransport::new();
        let sdp = transport.create_offer().await.unwrap();
        assert!(sdp.contains("m=audio"));
        assert!(sdp.contains("m=video"));

        assert!(matches!(
            transport.create_offer().await,
            Err(TransportError::AlreadyConnected)
        ));

        transport.close().await;
        assert!(!transport.has_peer_connection());
    }
}
