//! Agent Bridge boundary.
//!
//! The bridge is the session's connection to the external conversational
//! voice agent. Provider connectivity lives outside this crate; here we
//! define only the seam: the [`AgentBridge`] trait a connected bridge
//! implements, the closed [`BridgeEvent`] set it emits over an `mpsc`
//! channel, and the [`BridgeConnector`] factory the session calls when the
//! peer signals call start.
//!
//! Deployments register a connector when building the [`crate::AppState`];
//! the bundled [`UnconfiguredConnector`] rejects every connect attempt,
//! which surfaces to the peer as a `disconnect(error)` per the session's
//! normal bridge-failure handling.

mod base;

pub use base::{
    AgentBridge, BridgeConnector, BridgeError, BridgeEvent, BridgeResult, BridgeSessionContext,
    BridgeTranscript, SpeakerRole, UnconfiguredConnector,
};
