//! Shared test support: mock agent bridge and session plumbing.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use audioconnector_gateway::bridge::{
    AgentBridge, BridgeConnector, BridgeError, BridgeEvent, BridgeResult, BridgeSessionContext,
};
use audioconnector_gateway::config::ServerConfig;
use audioconnector_gateway::session::{DtmfEvent, ProtocolSession, WireFrame};

/// Shared record of everything a mock bridge saw.
#[derive(Clone, Default)]
pub struct BridgeLog {
    pub connects: Arc<AtomicUsize>,
    pub disconnects: Arc<AtomicUsize>,
    pub audio: Arc<Mutex<Vec<Bytes>>>,
    pub messages: Arc<Mutex<Vec<Value>>>,
}

impl BridgeLog {
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn disconnect_count(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }
}

pub struct MockBridge {
    log: BridgeLog,
    connected: bool,
}

#[async_trait]
impl AgentBridge for MockBridge {
    async fn send_audio(&mut self, audio: Bytes) -> BridgeResult<()> {
        if !self.connected {
            return Err(BridgeError::NotConnected);
        }
        self.log.audio.lock().push(audio);
        Ok(())
    }

    async fn send_message(&mut self, message: Value) -> BridgeResult<()> {
        if !self.connected {
            return Err(BridgeError::NotConnected);
        }
        self.log.messages.lock().push(message);
        Ok(())
    }

    async fn disconnect(&mut self) -> BridgeResult<()> {
        if self.connected {
            self.connected = false;
            self.log.disconnects.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

/// Connector producing [`MockBridge`]s, or failing every attempt.
pub struct MockConnector {
    pub log: BridgeLog,
    pub fail: bool,
}

impl MockConnector {
    pub fn new() -> Self {
        Self {
            log: BridgeLog::default(),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            log: BridgeLog::default(),
            fail: true,
        }
    }
}

#[async_trait]
impl BridgeConnector for MockConnector {
    async fn connect(
        &self,
        _context: BridgeSessionContext,
        _events: mpsc::Sender<BridgeEvent>,
    ) -> BridgeResult<Box<dyn AgentBridge>> {
        if self.fail {
            return Err(BridgeError::ConnectionFailed("mock refused".to_string()));
        }
        self.log.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockBridge {
            log: self.log.clone(),
            connected: true,
        }))
    }
}

/// Everything a test needs to drive one session.
pub struct Harness {
    pub session: ProtocolSession,
    pub wire: mpsc::Receiver<WireFrame>,
    pub bridge_events: mpsc::Receiver<BridgeEvent>,
    pub dtmf_events: mpsc::Receiver<DtmfEvent>,
}

/// Build a session around `connector` with fast pacing for tests.
pub fn harness(connector: Arc<dyn BridgeConnector>) -> Harness {
    let mut config = ServerConfig::default();
    config.pacing.message_delay_ms = 1;

    let (wire_tx, wire_rx) = mpsc::channel(64);
    let (bridge_tx, bridge_rx) = mpsc::channel(64);
    let (dtmf_tx, dtmf_rx) = mpsc::channel(64);

    let session = ProtocolSession::new(
        Arc::new(config),
        connector,
        wire_tx,
        bridge_tx,
        dtmf_tx,
        CancellationToken::new(),
    );

    Harness {
        session,
        wire: wire_rx,
        bridge_events: bridge_rx,
        dtmf_events: dtmf_rx,
    }
}

/// Build a client control message as wire JSON.
pub fn client_message(id: &str, message_type: &str, seq: u64, serverseq: u64, parameters: Value) -> String {
    serde_json::json!({
        "id": id,
        "version": "2",
        "type": message_type,
        "seq": seq,
        "serverseq": serverseq,
        "parameters": parameters,
    })
    .to_string()
}

/// A `start` message offering one PCMU stream.
pub fn start_message(seq: u64) -> String {
    client_message(
        "S1",
        "start",
        seq,
        0,
        serde_json::json!({
            "conversationId": "conv-1",
            "media": [{
                "type": "audio",
                "format": "PCMU",
                "rate": 8000,
                "channels": ["external", "internal"],
            }],
            "inputVariables": {"queue": "sales"},
        }),
    )
}

/// Receive the next text frame, skipping binary audio, and parse it.
pub async fn recv_json(wire: &mut mpsc::Receiver<WireFrame>) -> Value {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(10), wire.recv())
            .await
            .expect("timed out waiting for wire frame")
            .expect("wire channel closed");
        match frame {
            WireFrame::Text(json) => {
                return serde_json::from_str(&json).expect("wire text should be JSON");
            }
            WireFrame::Binary(_) => continue,
            WireFrame::Close => panic!("unexpected close frame"),
        }
    }
}

/// Receive the next frame of any kind.
pub async fn recv_frame(wire: &mut mpsc::Receiver<WireFrame>) -> WireFrame {
    tokio::time::timeout(Duration::from_secs(10), wire.recv())
        .await
        .expect("timed out waiting for wire frame")
        .expect("wire channel closed")
}
