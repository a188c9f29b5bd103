//! Protocol session state machine.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::audio::PcmuTranscoder;
use crate::bridge::{
    AgentBridge, BridgeConnector, BridgeEvent, BridgeSessionContext, SpeakerRole,
};
use crate::config::ServerConfig;
use crate::pacer::{AudioPacer, MessagePacer, SinkClosed, SinkFn, TranscriptDebouncer};
use crate::protocol::{
    ClientMessage, DisconnectParameters, DisconnectReason, DtmfParameters, EventEntity,
    MediaChannel, PROTOCOL_VERSION, ServerMessage, ServerMessageType, ServerParameters,
    StartParameters, TranscriptData, TurnResponseData,
};

use super::WireFrame;
use super::dtmf::{DtmfCollector, DtmfCollectorFactory, DtmfEvent, DtmfState, default_collector_factory};

/// Identity and sequence counters shared with the pacer sinks.
///
/// Sequence numbers are stamped wherever a message is composed - at
/// enqueue time for paced messages, at dispatch time for debounced
/// transcripts - so stamping must be safe from the sink closures. The
/// counters are the only session state touched outside the session task.
struct SessionShared {
    id: RwLock<Option<String>>,
    client_seq: AtomicU64,
    server_seq: AtomicU64,
}

impl SessionShared {
    fn new() -> Self {
        Self {
            id: RwLock::new(None),
            client_seq: AtomicU64::new(0),
            server_seq: AtomicU64::new(0),
        }
    }

    /// Compose an outbound message, consuming the next server sequence
    /// number and acknowledging the latest accepted client sequence.
    fn stamp(&self, message_type: ServerMessageType, parameters: ServerParameters) -> ServerMessage {
        ServerMessage {
            id: self.id.read().clone().unwrap_or_default(),
            version: PROTOCOL_VERSION.to_string(),
            message_type,
            seq: self.server_seq.fetch_add(1, Ordering::AcqRel) + 1,
            clientseq: self.client_seq.load(Ordering::Acquire),
            parameters,
        }
    }
}

/// State machine for one telephony connection.
///
/// Lifecycle: `Open` (no bridge yet) -> `Active` (bridge live) ->
/// `Disconnecting` -> `Closed`. DTMF capture and agent-audio playback are
/// orthogonal flags layered on `Active`. All methods are driven from one
/// task; see [`super::handler`].
pub struct ProtocolSession {
    shared: Arc<SessionShared>,
    conversation_id: Option<String>,
    selected_media: Option<MediaChannel>,
    input_variables: HashMap<String, String>,

    closed: bool,
    disconnecting: bool,
    capturing_dtmf: bool,
    audio_playing: bool,

    transcoder: PcmuTranscoder,
    wire: mpsc::Sender<WireFrame>,
    message_pacer: MessagePacer<ServerMessage>,
    audio_pacer: AudioPacer,
    transcripts: TranscriptDebouncer<TranscriptData>,

    connector: Arc<dyn BridgeConnector>,
    bridge: Option<Box<dyn AgentBridge>>,
    bridge_events: mpsc::Sender<BridgeEvent>,

    dtmf: Option<Box<dyn DtmfCollector>>,
    dtmf_factory: DtmfCollectorFactory,
    dtmf_events: mpsc::Sender<DtmfEvent>,

    cancel: CancellationToken,
}

impl ProtocolSession {
    /// Create a session writing outbound frames to `wire`.
    ///
    /// Bridge and DTMF events must be pumped back into the session (via
    /// [`Self::on_bridge_event`] / [`Self::on_dtmf_event`]) by whoever
    /// owns the receiving halves of the two event channels.
    pub fn new(
        config: Arc<ServerConfig>,
        connector: Arc<dyn BridgeConnector>,
        wire: mpsc::Sender<WireFrame>,
        bridge_events: mpsc::Sender<BridgeEvent>,
        dtmf_events: mpsc::Sender<DtmfEvent>,
        cancel: CancellationToken,
    ) -> Self {
        let shared = Arc::new(SessionShared::new());

        let message_pacer = MessagePacer::new(
            config.pacing.message_delay(),
            cancel.clone(),
            message_sink(wire.clone()),
        );
        let audio_pacer = AudioPacer::new(
            config.pacing.audio_pacing(),
            cancel.clone(),
            binary_sink(wire.clone()),
        );
        let transcripts = TranscriptDebouncer::new(
            config.pacing.transcript_min_interval(),
            cancel.clone(),
            transcript_sink(shared.clone(), wire.clone()),
        );
        let dtmf_factory = default_collector_factory(config.dtmf.clone(), cancel.clone());

        Self {
            shared,
            conversation_id: None,
            selected_media: None,
            input_variables: HashMap::new(),
            closed: false,
            disconnecting: false,
            capturing_dtmf: false,
            audio_playing: false,
            transcoder: PcmuTranscoder::new(config.filters),
            wire,
            message_pacer,
            audio_pacer,
            transcripts,
            connector,
            bridge: None,
            bridge_events,
            dtmf: None,
            dtmf_factory,
            dtmf_events,
            cancel,
        }
    }

    /// Replace the DTMF collector factory. Used by tests.
    pub fn with_dtmf_factory(mut self, factory: DtmfCollectorFactory) -> Self {
        self.dtmf_factory = factory;
        self
    }

    // -------------------------------------------------------------------------
    // Inbound (peer -> gateway)
    // -------------------------------------------------------------------------

    /// Process one inbound control message.
    ///
    /// Validation order: client sequence must be gapless, the echoed
    /// server sequence must not run ahead of ours, and the id must match
    /// the peer-assigned session id. Any violation is fatal. The first
    /// accepted message establishes the session id.
    pub async fn process_text_message(&mut self, raw: &str) {
        if self.closed {
            return;
        }

        let message: ClientMessage = match serde_json::from_str(raw) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "ignoring unparseable control message");
                return;
            }
        };

        let expected = self.shared.client_seq.load(Ordering::Acquire) + 1;
        if message.seq != expected {
            self.fatal("Invalid client sequence number").await;
            return;
        }
        if message.serverseq > self.shared.server_seq.load(Ordering::Acquire) {
            self.fatal("Invalid server sequence number").await;
            return;
        }
        let id_mismatch = {
            let mut id = self.shared.id.write();
            match id.as_deref() {
                Some(existing) => existing != message.id,
                None => {
                    *id = Some(message.id.clone());
                    false
                }
            }
        };
        if id_mismatch {
            self.fatal("Invalid ID specified").await;
            return;
        }
        self.shared.client_seq.store(message.seq, Ordering::Release);

        match message.message_type.as_str() {
            "start" => {
                let params: StartParameters =
                    serde_json::from_value(message.parameters).unwrap_or_default();
                self.process_bot_start(params).await;
            }
            "ping" => self.send_paced(ServerMessageType::Pong, ServerParameters::Empty {}),
            "dtmf" => match serde_json::from_value::<DtmfParameters>(message.parameters) {
                Ok(params) => self.process_dtmf(params.digit).await,
                Err(e) => warn!(error = %e, "ignoring dtmf message without digit"),
            },
            "close" => self.process_peer_close().await,
            "error" => warn!(parameters = %message.parameters, "peer reported an error"),
            other => debug!(message_type = other, "ignoring unrecognized message type"),
        }
    }

    /// Process one inbound binary audio frame.
    ///
    /// Frames are dropped outright while disconnecting, closed, or
    /// capturing DTMF. Caller speech during agent playback wins: barge-in
    /// is signalled before anything else happens to the frame.
    pub async fn process_binary_message(&mut self, frame: Bytes) {
        if self.closed || self.disconnecting || self.capturing_dtmf {
            return;
        }
        if self.audio_playing {
            self.send_barge_in().await;
        }

        let connected = self.bridge.as_ref().is_some_and(|b| b.is_connected());
        if !connected {
            debug!(bytes = frame.len(), "no agent bridge, dropping caller audio");
            return;
        }

        let linear = self.transcoder.pcmu_to_linear(&frame);
        if let Some(bridge) = self.bridge.as_mut()
            && let Err(e) = bridge.send_audio(linear).await
        {
            warn!(error = %e, "failed to forward caller audio to agent bridge");
        }
    }

    /// Handle the peer's call-start signal by establishing the bridge.
    pub async fn process_bot_start(&mut self, params: StartParameters) {
        if self.bridge.is_some() {
            warn!("duplicate start message, bridge already live");
            return;
        }

        self.conversation_id = Some(
            params
                .conversation_id
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
        );
        self.selected_media = params
            .media
            .iter()
            .find(|m| m.format.eq_ignore_ascii_case("PCMU"))
            .or_else(|| params.media.first())
            .cloned();
        self.input_variables = params.input_variables;

        let context = BridgeSessionContext {
            conversation_id: self.conversation_id.clone(),
            input_variables: self.input_variables.clone(),
        };

        match self
            .connector
            .connect(context, self.bridge_events.clone())
            .await
        {
            Ok(mut bridge) => {
                // The connect may have resolved after a racing close; the
                // bridge must not be wired into a dead session.
                if self.closed {
                    let _ = bridge.disconnect().await;
                    return;
                }
                info!(
                    conversation_id = self.conversation_id.as_deref().unwrap_or(""),
                    "agent bridge established"
                );
                self.bridge = Some(bridge);
                self.send_event(vec![EventEntity::BotTurnResponse {
                    data: TurnResponseData {
                        disposition: "match".to_string(),
                        text: String::new(),
                        confidence: 1.0,
                    },
                }]);
            }
            Err(e) => {
                warn!(error = %e, "agent bridge connect failed");
                self.send_disconnect(
                    DisconnectReason::Error,
                    format!("Failed to connect to agent bridge: {e}"),
                )
                .await;
            }
        }
    }

    /// Process one DTMF digit.
    pub async fn process_dtmf(&mut self, digit: char) {
        if self.closed || self.disconnecting {
            return;
        }
        if self.audio_playing {
            self.send_barge_in().await;
        }

        let needs_new = self
            .dtmf
            .as_ref()
            .map(|c| matches!(c.state(), DtmfState::Complete | DtmfState::Error))
            .unwrap_or(true);
        if needs_new {
            self.dtmf = Some((self.dtmf_factory)(self.dtmf_events.clone()));
        }
        self.capturing_dtmf = true;
        if let Some(collector) = self.dtmf.as_mut() {
            collector.process_digit(digit);
        }
    }

    async fn process_peer_close(&mut self) {
        info!("peer requested close");
        let message = self
            .shared
            .stamp(ServerMessageType::Closed, ServerParameters::Empty {});
        self.send_urgent(message).await;
        self.close().await;
    }

    // -------------------------------------------------------------------------
    // Agent bridge events
    // -------------------------------------------------------------------------

    /// Handle one event from the agent bridge.
    pub async fn on_bridge_event(&mut self, event: BridgeEvent) {
        if self.closed {
            return;
        }
        match event {
            BridgeEvent::Audio(linear) => match self.transcoder.linear_to_pcmu(&linear) {
                Ok(pcmu) => {
                    self.audio_playing = true;
                    self.audio_pacer.enqueue(pcmu);
                }
                // Transient bad frames must not kill a healthy call.
                Err(e) => warn!(error = %e, "dropping malformed agent audio frame"),
            },
            BridgeEvent::Transcript(transcript) => {
                let channel_id = self.transcript_channel(transcript.role);
                self.transcripts.offer(
                    TranscriptData {
                        id: Uuid::new_v4().to_string(),
                        channel_id,
                        is_final: transcript.is_final,
                        text: transcript.text,
                    },
                    transcript.is_final,
                );
            }
            BridgeEvent::AgentResponse { text, confidence } => {
                self.send_event(vec![EventEntity::BotTurnResponse {
                    data: TurnResponseData {
                        disposition: "match".to_string(),
                        text,
                        confidence,
                    },
                }]);
            }
            BridgeEvent::PlaybackClearBuffer => self.send_barge_in().await,
            BridgeEvent::CallEnded { info } => {
                self.send_disconnect(DisconnectReason::Complete, info).await;
            }
            BridgeEvent::Disconnected => {
                if !self.disconnecting {
                    self.send_disconnect(
                        DisconnectReason::Error,
                        "Agent bridge disconnected unexpectedly".to_string(),
                    )
                    .await;
                }
            }
            BridgeEvent::Error(e) => {
                warn!(error = %e, "agent bridge error");
                if !self.disconnecting {
                    self.send_disconnect(
                        DisconnectReason::Error,
                        format!("Agent bridge error: {e}"),
                    )
                    .await;
                }
            }
            BridgeEvent::Connected | BridgeEvent::CallStarted => {
                debug!("agent bridge signalled readiness")
            }
            BridgeEvent::Message(raw) => debug!(message = %raw, "passthrough agent message"),
        }
    }

    /// Handle one event from the DTMF collector.
    pub async fn on_dtmf_event(&mut self, event: DtmfEvent) {
        if self.closed {
            return;
        }
        match event {
            DtmfEvent::FinalDigits(digits) => {
                self.capturing_dtmf = false;
                info!(digits = %digits, "dtmf collection complete");
                if let Some(bridge) = self.bridge.as_mut()
                    && bridge.is_connected()
                {
                    let message = serde_json::json!({
                        "type": "user_input",
                        "source": "dtmf",
                        "text": digits,
                    });
                    if let Err(e) = bridge.send_message(message).await {
                        warn!(error = %e, "failed to forward dtmf digits to agent bridge");
                    }
                }
            }
            DtmfEvent::Error(info) => {
                self.capturing_dtmf = false;
                self.fatal(&format!("DTMF collection failed: {info}")).await;
            }
        }
    }

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------

    /// Tear the session down. Idempotent; safe from any state.
    ///
    /// Cancels every pacer timer, disconnects the bridge at most once,
    /// and asks the wire task to close the socket.
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.cancel.cancel();
        self.dtmf = None;

        if let Some(mut bridge) = self.bridge.take()
            && let Err(e) = bridge.disconnect().await
        {
            warn!(error = %e, "agent bridge disconnect failed");
        }

        let _ = self.wire.send(WireFrame::Close).await;
        info!("session closed");
    }

    /// Fatal violation: best-effort `disconnect(error)`, then teardown.
    async fn fatal(&mut self, info: &str) {
        warn!(info, "fatal session error");
        self.send_disconnect(DisconnectReason::Error, info.to_string())
            .await;
        self.close().await;
    }

    // -------------------------------------------------------------------------
    // Outbound helpers
    // -------------------------------------------------------------------------

    /// Enqueue an `event` message on the paced control channel.
    fn send_event(&self, entities: Vec<EventEntity>) {
        let message = self.shared.stamp(
            ServerMessageType::Event,
            ServerParameters::Event { entities },
        );
        self.message_pacer.enqueue(message);
    }

    fn send_paced(&self, message_type: ServerMessageType, parameters: ServerParameters) {
        let message = self.shared.stamp(message_type, parameters);
        self.message_pacer.enqueue(message);
    }

    /// Write a message straight to the wire, bypassing the pacers.
    async fn send_urgent(&self, message: ServerMessage) {
        match serde_json::to_string(&message) {
            Ok(json) => {
                let _ = self.wire.send(WireFrame::Text(json)).await;
            }
            Err(e) => error!(error = %e, "failed to serialize urgent message"),
        }
    }

    /// Signal barge-in on the urgent path and stop playback delivery.
    async fn send_barge_in(&mut self) {
        let message = self.shared.stamp(
            ServerMessageType::Event,
            ServerParameters::Event {
                entities: vec![EventEntity::BargeIn {}],
            },
        );
        self.send_urgent(message).await;
        self.audio_playing = false;
        let dropped = self.audio_pacer.clear();
        if dropped > 0 {
            debug!(dropped, "discarded buffered agent audio on barge-in");
        }
    }

    /// Send a `disconnect` on the urgent path. Later bridge-driven
    /// disconnect attempts are suppressed by the `disconnecting` flag.
    async fn send_disconnect(&mut self, reason: DisconnectReason, info: String) {
        if self.disconnecting || self.closed {
            return;
        }
        self.disconnecting = true;

        let output_variables = match reason {
            DisconnectReason::Complete => self.input_variables.clone(),
            DisconnectReason::Error => HashMap::new(),
        };
        let message = self.shared.stamp(
            ServerMessageType::Disconnect,
            ServerParameters::Disconnect(DisconnectParameters {
                reason,
                info,
                output_variables,
            }),
        );
        self.send_urgent(message).await;
    }

    fn transcript_channel(&self, role: SpeakerRole) -> usize {
        let label = match role {
            SpeakerRole::Peer => "external",
            SpeakerRole::Agent => "internal",
        };
        self.selected_media
            .as_ref()
            .and_then(|media| media.channel_index(label))
            .unwrap_or(0)
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    /// Peer-assigned session id, once known.
    pub fn session_id(&self) -> Option<String> {
        self.shared.id.read().clone()
    }

    /// Conversation id, once the call has started.
    pub fn conversation_id(&self) -> Option<&str> {
        self.conversation_id.as_deref()
    }

    /// Highest accepted client sequence number.
    pub fn last_client_seq(&self) -> u64 {
        self.shared.client_seq.load(Ordering::Acquire)
    }

    /// Last consumed server sequence number.
    pub fn last_server_seq(&self) -> u64 {
        self.shared.server_seq.load(Ordering::Acquire)
    }

    /// Whether the session reached its terminal state.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Whether a disconnect has been initiated.
    pub fn is_disconnecting(&self) -> bool {
        self.disconnecting
    }

    /// Whether agent audio is currently being delivered to the peer.
    pub fn is_audio_playing(&self) -> bool {
        self.audio_playing
    }

    /// Whether a DTMF sequence is being captured.
    pub fn is_capturing_dtmf(&self) -> bool {
        self.capturing_dtmf
    }
}

// =============================================================================
// Pacer sinks
// =============================================================================

fn message_sink(wire: mpsc::Sender<WireFrame>) -> SinkFn<ServerMessage> {
    Arc::new(move |message: ServerMessage| {
        let wire = wire.clone();
        Box::pin(async move {
            match serde_json::to_string(&message) {
                Ok(json) => wire
                    .send(WireFrame::Text(json))
                    .await
                    .map_err(|_| SinkClosed),
                Err(e) => {
                    error!(error = %e, "failed to serialize paced message");
                    Ok(())
                }
            }
        })
    })
}

fn binary_sink(wire: mpsc::Sender<WireFrame>) -> SinkFn<Bytes> {
    Arc::new(move |frame: Bytes| {
        let wire = wire.clone();
        Box::pin(async move {
            wire.send(WireFrame::Binary(frame))
                .await
                .map_err(|_| SinkClosed)
        })
    })
}

/// Transcript sink: stamps the envelope at dispatch time so debounced
/// (dropped) partials never consume a sequence number.
fn transcript_sink(
    shared: Arc<SessionShared>,
    wire: mpsc::Sender<WireFrame>,
) -> SinkFn<TranscriptData> {
    Arc::new(move |data: TranscriptData| {
        let wire = wire.clone();
        let message = shared.stamp(
            ServerMessageType::Event,
            ServerParameters::Event {
                entities: vec![EventEntity::Transcript { data }],
            },
        );
        Box::pin(async move {
            match serde_json::to_string(&message) {
                Ok(json) => wire
                    .send(WireFrame::Text(json))
                    .await
                    .map_err(|_| SinkClosed),
                Err(e) => {
                    error!(error = %e, "failed to serialize transcript message");
                    Ok(())
                }
            }
        })
    })
}
