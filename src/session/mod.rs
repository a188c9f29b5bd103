//! Telephony protocol session.
//!
//! One [`ProtocolSession`] exists per telephony WebSocket connection. It
//! terminates the control protocol (sequence validation, lifecycle, DTMF
//! capture, barge-in), owns the per-session transcoder and pacers, and
//! orchestrates the agent bridge. The axum handler in [`handler`] feeds it
//! inbound frames and bridge/DTMF events from one `select!` loop, so all
//! session state is single-task and lock-free apart from the sequence
//! counters shared with the pacer sinks.

pub mod dtmf;
mod handler;
mod state;

use bytes::Bytes;

pub use dtmf::{
    DtmfCollector, DtmfCollectorFactory, DtmfEvent, DtmfState, TimeoutDtmfCollector,
    default_collector_factory,
};
pub use handler::voicebot_handler;
pub use state::ProtocolSession;

/// Outbound frame on the session's wire channel.
///
/// Both the pacers and the urgent path funnel into one `mpsc` of these;
/// a dedicated task performs the actual socket writes, so at most one
/// write is in flight per session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireFrame {
    /// A JSON control message.
    Text(String),
    /// A binary PCMU frame.
    Binary(Bytes),
    /// Close the socket.
    Close,
}
