//! Telephony control-message envelope.
//!
//! The telephony peer multiplexes JSON control messages and binary PCMU
//! frames over one WebSocket. Every control message carries the session
//! id, the protocol version, its own sequence number, and the highest
//! sequence number seen from the other side. The session layer enforces
//! the ordering invariants; this module only defines the wire shapes.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Protocol version stamped on every outbound message.
pub const PROTOCOL_VERSION: &str = "2";

// =============================================================================
// Inbound (peer -> gateway)
// =============================================================================

/// Control message received from the telephony peer.
///
/// The `type` field is an open set; unknown types are logged and ignored
/// by the session. `parameters` stays raw JSON until the type-specific
/// handler parses it.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientMessage {
    /// Session id assigned by the peer at open.
    pub id: String,

    /// Protocol version.
    #[serde(default)]
    pub version: String,

    /// Message type, e.g. `start`, `ping`, `dtmf`, `close`.
    #[serde(rename = "type")]
    pub message_type: String,

    /// Peer's own message counter; must be gapless.
    pub seq: u64,

    /// Highest server sequence number the peer has seen.
    #[serde(default)]
    pub serverseq: u64,

    /// Type-specific payload.
    #[serde(default)]
    pub parameters: serde_json::Value,
}

/// Parameters of the `start` message.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartParameters {
    /// Conversation id assigned by the telephony platform, if any.
    #[serde(default)]
    pub conversation_id: Option<String>,

    /// Media offered by the peer; the session selects the first PCMU entry.
    #[serde(default)]
    pub media: Vec<MediaChannel>,

    /// Opaque deployment-defined variables, passed through to the agent
    /// bridge and echoed back as output variables on disconnect. Never
    /// validated here.
    #[serde(default)]
    pub input_variables: HashMap<String, String>,
}

/// Parameters of the `dtmf` message.
#[derive(Debug, Clone, Deserialize)]
pub struct DtmfParameters {
    /// The pressed digit.
    pub digit: char,
}

/// One media stream description.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaChannel {
    /// Media type, e.g. `audio`.
    #[serde(rename = "type", default)]
    pub media_type: String,

    /// Wire codec, e.g. `PCMU`.
    #[serde(default)]
    pub format: String,

    /// Sample rate in Hz.
    #[serde(default)]
    pub rate: u32,

    /// Channel labels in wire order, e.g. `["external", "internal"]`.
    #[serde(default)]
    pub channels: Vec<String>,
}

impl MediaChannel {
    /// Index of a channel label, used to tag transcripts.
    pub fn channel_index(&self, label: &str) -> Option<usize> {
        self.channels.iter().position(|c| c == label)
    }
}

// =============================================================================
// Outbound (gateway -> peer)
// =============================================================================

/// Control message sent to the telephony peer.
#[derive(Debug, Clone, Serialize)]
pub struct ServerMessage {
    /// Session id, echoing the peer-assigned value.
    pub id: String,

    /// Protocol version.
    pub version: String,

    /// Message type.
    #[serde(rename = "type")]
    pub message_type: ServerMessageType,

    /// Server message counter; strictly increasing and gapless per session.
    pub seq: u64,

    /// Highest client sequence number accepted so far.
    pub clientseq: u64,

    /// Type-specific payload.
    pub parameters: ServerParameters,
}

/// Closed set of outbound message types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerMessageType {
    /// Carries one or more [`EventEntity`] items.
    Event,
    /// Asks the peer to tear the call down.
    Disconnect,
    /// Acknowledges a peer-initiated close.
    Closed,
    /// Keepalive reply to an inbound `ping`.
    Pong,
}

/// Payload variants matching [`ServerMessageType`].
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ServerParameters {
    /// `event` payload.
    Event {
        /// Entities carried by this event.
        entities: Vec<EventEntity>,
    },
    /// `disconnect` payload.
    Disconnect(DisconnectParameters),
    /// Empty payload (`closed`, `pong`).
    Empty {},
}

/// `disconnect` parameters.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DisconnectParameters {
    /// Why the session is ending.
    pub reason: DisconnectReason,

    /// Human-readable detail.
    pub info: String,

    /// Variables handed back to the telephony platform.
    pub output_variables: HashMap<String, String>,
}

/// Disconnect reasons surfaced to the peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DisconnectReason {
    /// Fatal error; see `info`.
    Error,
    /// The conversation finished normally.
    Complete,
}

/// Entities carried inside an `event` message.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventEntity {
    /// A transcript of peer or agent speech.
    Transcript {
        /// Transcript payload.
        data: TranscriptData,
    },
    /// The agent's recognized intent/text for the current turn.
    BotTurnResponse {
        /// Turn response payload.
        data: TurnResponseData,
    },
    /// The peer must stop playback immediately; the caller is speaking.
    BargeIn {},
}

/// Transcript entity payload.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptData {
    /// Unique id for this transcript fragment.
    pub id: String,

    /// Index into the selected media's channel list.
    pub channel_id: usize,

    /// Whether this fragment is final.
    pub is_final: bool,

    /// Transcribed text.
    pub text: String,
}

/// Turn response entity payload.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnResponseData {
    /// Recognition disposition, e.g. `match`.
    pub disposition: String,

    /// Agent response text.
    pub text: String,

    /// Recognition confidence in `[0, 1]`.
    pub confidence: f32,
}
