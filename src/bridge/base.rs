//! Base trait and event types for agent bridges.

use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tokio::sync::mpsc;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur on the agent-bridge boundary.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Establishing the bridge failed.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// The bridge is not connected.
    #[error("Not connected")]
    NotConnected,

    /// Sending to the agent failed.
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// The agent sent something the adapter could not normalize.
    #[error("Protocol error: {0}")]
    ProtocolError(String),
}

/// Result type for bridge operations.
pub type BridgeResult<T> = Result<T, BridgeError>;

// =============================================================================
// Events
// =============================================================================

/// Speaker attribution for transcripts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeakerRole {
    /// The telephony caller.
    Peer,
    /// The voice agent.
    Agent,
}

/// A transcript fragment from the agent service.
#[derive(Debug, Clone)]
pub struct BridgeTranscript {
    /// Transcribed text.
    pub text: String,
    /// Whether this fragment is final.
    pub is_final: bool,
    /// Who spoke.
    pub role: SpeakerRole,
}

/// Closed set of events a bridge emits toward its session.
///
/// Adapters normalize their provider's wire format into these variants and
/// push them on the channel handed to [`BridgeConnector::connect`]. The
/// channel closes when the bridge goes away.
#[derive(Debug, Clone)]
pub enum BridgeEvent {
    /// The bridge finished connecting.
    Connected,
    /// A mid-call error.
    Error(String),
    /// Agent audio, 16-bit little-endian linear PCM.
    Audio(Bytes),
    /// A raw provider message the adapter passes through unchanged.
    Message(serde_json::Value),
    /// A transcript fragment.
    Transcript(BridgeTranscript),
    /// The agent completed a conversational turn.
    AgentResponse {
        /// Response text.
        text: String,
        /// Recognition confidence in `[0, 1]`.
        confidence: f32,
    },
    /// The agent acknowledged call start.
    CallStarted,
    /// The agent ended the call.
    CallEnded {
        /// Human-readable detail.
        info: String,
    },
    /// The agent was interrupted; discard buffered playback.
    PlaybackClearBuffer,
    /// The bridge dropped unexpectedly.
    Disconnected,
}

// =============================================================================
// Traits
// =============================================================================

/// A live connection to the voice-agent service.
///
/// A session owns at most one bridge at a time and is the only caller of
/// these methods.
#[async_trait]
pub trait AgentBridge: Send + Sync {
    /// Send caller audio, 16-bit little-endian linear PCM.
    async fn send_audio(&mut self, audio: Bytes) -> BridgeResult<()>;

    /// Send a structured message (e.g. synthesized user input from DTMF).
    async fn send_message(&mut self, message: serde_json::Value) -> BridgeResult<()>;

    /// Tear the bridge down. Idempotent.
    async fn disconnect(&mut self) -> BridgeResult<()>;

    /// Whether the bridge is currently connected.
    fn is_connected(&self) -> bool;
}

/// Per-session context handed to the connector.
#[derive(Debug, Clone, Default)]
pub struct BridgeSessionContext {
    /// Conversation id from the telephony platform, if any.
    pub conversation_id: Option<String>,
    /// Opaque variables from the session start, e.g. routing hints.
    pub input_variables: HashMap<String, String>,
}

/// Factory that establishes agent-bridge connections.
///
/// `connect` performs the provider round trip (session provisioning plus
/// handshake) and returns an already-connected bridge. Events for the
/// session flow over `events` for the lifetime of the bridge.
#[async_trait]
pub trait BridgeConnector: Send + Sync {
    /// Establish a bridge for one session.
    async fn connect(
        &self,
        context: BridgeSessionContext,
        events: mpsc::Sender<BridgeEvent>,
    ) -> BridgeResult<Box<dyn AgentBridge>>;
}

/// Connector used when no agent-bridge integration is registered.
///
/// Every connect attempt fails, which the session reports to the peer as
/// a `disconnect` with reason `error`.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnconfiguredConnector;

#[async_trait]
impl BridgeConnector for UnconfiguredConnector {
    async fn connect(
        &self,
        _context: BridgeSessionContext,
        _events: mpsc::Sender<BridgeEvent>,
    ) -> BridgeResult<Box<dyn AgentBridge>> {
        Err(BridgeError::ConnectionFailed(
            "no agent bridge configured".to_string(),
        ))
    }
}
