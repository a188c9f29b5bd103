//! End-to-end session flow tests against a mock agent bridge.

mod support;

use std::sync::Arc;

use bytes::Bytes;

use audioconnector_gateway::bridge::{BridgeEvent, BridgeTranscript, SpeakerRole};
use audioconnector_gateway::session::{DtmfEvent, WireFrame};

use support::{MockConnector, client_message, harness, recv_frame, recv_json, start_message};

#[tokio::test]
async fn test_start_establishes_bridge_and_replies() {
    let connector = Arc::new(MockConnector::new());
    let log = connector.log.clone();
    let mut h = harness(connector);

    h.session.process_text_message(&start_message(1)).await;
    assert_eq!(log.connect_count(), 1);
    assert_eq!(h.session.conversation_id(), Some("conv-1"));

    let msg = recv_json(&mut h.wire).await;
    assert_eq!(msg["id"], "S1");
    assert_eq!(msg["type"], "event");
    assert_eq!(msg["seq"], 1);
    assert_eq!(msg["clientseq"], 1);
    assert_eq!(msg["parameters"]["entities"][0]["type"], "bot_turn_response");
    assert_eq!(
        msg["parameters"]["entities"][0]["data"]["disposition"],
        "match"
    );
}

#[tokio::test]
async fn test_ping_returns_pong() {
    let mut h = harness(Arc::new(MockConnector::new()));

    h.session.process_text_message(&start_message(1)).await;
    recv_json(&mut h.wire).await;

    let ping = client_message("S1", "ping", 2, 1, serde_json::json!({}));
    h.session.process_text_message(&ping).await;

    let msg = recv_json(&mut h.wire).await;
    assert_eq!(msg["type"], "pong");
    assert_eq!(msg["seq"], 2);
    assert_eq!(msg["clientseq"], 2);
}

#[tokio::test]
async fn test_client_sequence_gap_is_fatal() {
    let connector = Arc::new(MockConnector::new());
    let log = connector.log.clone();
    let mut h = harness(connector);

    h.session.process_text_message(&start_message(1)).await;
    recv_json(&mut h.wire).await;

    // seq 3 skips 2.
    let ping = client_message("S1", "ping", 3, 1, serde_json::json!({}));
    h.session.process_text_message(&ping).await;

    let msg = recv_json(&mut h.wire).await;
    assert_eq!(msg["type"], "disconnect");
    assert_eq!(msg["parameters"]["reason"], "error");
    assert!(
        msg["parameters"]["info"]
            .as_str()
            .unwrap()
            .contains("sequence")
    );
    assert_eq!(recv_frame(&mut h.wire).await, WireFrame::Close);
    assert!(h.session.is_closed());
    assert_eq!(log.disconnect_count(), 1);

    // A second close must not disconnect the bridge again.
    h.session.close().await;
    assert_eq!(log.disconnect_count(), 1);
}

#[tokio::test]
async fn test_first_message_with_wrong_seq_is_fatal() {
    let connector = Arc::new(MockConnector::new());
    let log = connector.log.clone();
    let mut h = harness(connector);

    h.session.process_text_message(&start_message(5)).await;

    let msg = recv_json(&mut h.wire).await;
    assert_eq!(msg["type"], "disconnect");
    assert_eq!(msg["parameters"]["reason"], "error");
    assert_eq!(recv_frame(&mut h.wire).await, WireFrame::Close);
    assert!(h.session.is_closed());
    assert_eq!(log.connect_count(), 0);
}

#[tokio::test]
async fn test_mismatched_session_id_is_fatal() {
    let mut h = harness(Arc::new(MockConnector::new()));

    h.session.process_text_message(&start_message(1)).await;
    recv_json(&mut h.wire).await;

    let ping = client_message("OTHER", "ping", 2, 1, serde_json::json!({}));
    h.session.process_text_message(&ping).await;

    let msg = recv_json(&mut h.wire).await;
    assert_eq!(msg["type"], "disconnect");
    assert_eq!(msg["parameters"]["reason"], "error");
    assert_eq!(recv_frame(&mut h.wire).await, WireFrame::Close);
}

#[tokio::test]
async fn test_stale_serverseq_is_fatal() {
    let connector = Arc::new(MockConnector::new());
    let log = connector.log.clone();
    let mut h = harness(connector);

    // Claims to have seen server messages that were never sent.
    let msg = client_message("S1", "start", 1, 5, serde_json::json!({}));
    h.session.process_text_message(&msg).await;

    let reply = recv_json(&mut h.wire).await;
    assert_eq!(reply["type"], "disconnect");
    assert_eq!(recv_frame(&mut h.wire).await, WireFrame::Close);
    // Validation runs before dispatch, so no bridge was established.
    assert_eq!(log.connect_count(), 0);
}

#[tokio::test]
async fn test_peer_close_is_acknowledged() {
    let connector = Arc::new(MockConnector::new());
    let log = connector.log.clone();
    let mut h = harness(connector);

    h.session.process_text_message(&start_message(1)).await;
    recv_json(&mut h.wire).await;

    let close = client_message("S1", "close", 2, 1, serde_json::json!({}));
    h.session.process_text_message(&close).await;

    let msg = recv_json(&mut h.wire).await;
    assert_eq!(msg["type"], "closed");
    assert_eq!(msg["clientseq"], 2);
    assert_eq!(recv_frame(&mut h.wire).await, WireFrame::Close);
    assert!(h.session.is_closed());
    assert_eq!(log.disconnect_count(), 1);
}

#[tokio::test]
async fn test_connect_failure_sends_disconnect() {
    let mut h = harness(Arc::new(MockConnector::failing()));

    h.session.process_text_message(&start_message(1)).await;

    let msg = recv_json(&mut h.wire).await;
    assert_eq!(msg["type"], "disconnect");
    assert_eq!(msg["parameters"]["reason"], "error");
    assert!(h.session.is_disconnecting());
    // The peer tears the socket down after a disconnect; we do not.
    assert!(!h.session.is_closed());
}

#[tokio::test]
async fn test_caller_audio_triggers_barge_in_during_playback() {
    let connector = Arc::new(MockConnector::new());
    let log = connector.log.clone();
    let mut h = harness(connector);

    h.session.process_text_message(&start_message(1)).await;
    recv_json(&mut h.wire).await;

    // Agent starts speaking.
    h.session
        .on_bridge_event(BridgeEvent::Audio(Bytes::from(vec![0u8; 320])))
        .await;
    assert!(h.session.is_audio_playing());

    // Caller speaks over it.
    h.session
        .process_binary_message(Bytes::from(vec![0xFFu8; 160]))
        .await;

    let msg = recv_json(&mut h.wire).await;
    assert_eq!(msg["type"], "event");
    assert_eq!(msg["parameters"]["entities"][0]["type"], "barge_in");
    assert!(!h.session.is_audio_playing());

    // The caller frame still reaches the bridge, transcoded to PCM16.
    let forwarded = log.audio.lock().clone();
    assert_eq!(forwarded.len(), 1);
    assert_eq!(forwarded[0].len(), 320);
}

#[tokio::test(start_paused = true)]
async fn test_agent_audio_is_rechunked() {
    let mut h = harness(Arc::new(MockConnector::new()));

    h.session.process_text_message(&start_message(1)).await;
    recv_json(&mut h.wire).await;

    // 32000 linear bytes transcode to 16000 PCMU bytes, hitting the
    // flush threshold, which re-chunks into ten 1600-byte wire frames.
    h.session
        .on_bridge_event(BridgeEvent::Audio(Bytes::from(vec![0u8; 32_000])))
        .await;

    for _ in 0..10 {
        match recv_frame(&mut h.wire).await {
            WireFrame::Binary(chunk) => assert_eq!(chunk.len(), 1_600),
            other => panic!("expected binary frame, got {other:?}"),
        }
    }
}

#[tokio::test]
async fn test_turn_responses_have_gapless_seq() {
    let mut h = harness(Arc::new(MockConnector::new()));

    h.session.process_text_message(&start_message(1)).await;

    for i in 0..4 {
        h.session
            .on_bridge_event(BridgeEvent::AgentResponse {
                text: format!("reply {i}"),
                confidence: 0.8,
            })
            .await;
    }

    for expected_seq in 1..=5u64 {
        let msg = recv_json(&mut h.wire).await;
        assert_eq!(msg["type"], "event");
        assert_eq!(msg["seq"], expected_seq);
    }
}

#[tokio::test(start_paused = true)]
async fn test_transcripts_debounce_without_seq_gaps() {
    let mut h = harness(Arc::new(MockConnector::new()));

    h.session.process_text_message(&start_message(1)).await;
    recv_json(&mut h.wire).await; // seq 1, bot_turn_response

    let partial = |text: &str, is_final| {
        BridgeEvent::Transcript(BridgeTranscript {
            text: text.to_string(),
            is_final,
            role: SpeakerRole::Agent,
        })
    };

    // First partial goes straight out.
    h.session.on_bridge_event(partial("he", false)).await;
    let msg = recv_json(&mut h.wire).await;
    assert_eq!(msg["seq"], 2);
    assert_eq!(msg["parameters"]["entities"][0]["data"]["text"], "he");
    assert_eq!(msg["parameters"]["entities"][0]["data"]["channelId"], 1);

    // A rapid partial is superseded by the final; the dropped partial
    // never consumes a sequence number.
    h.session.on_bridge_event(partial("hell", false)).await;
    h.session.on_bridge_event(partial("hello", true)).await;

    let msg = recv_json(&mut h.wire).await;
    assert_eq!(msg["seq"], 3);
    assert_eq!(msg["parameters"]["entities"][0]["data"]["text"], "hello");
    assert_eq!(msg["parameters"]["entities"][0]["data"]["isFinal"], true);
}

#[tokio::test]
async fn test_call_ended_echoes_output_variables() {
    let mut h = harness(Arc::new(MockConnector::new()));

    h.session.process_text_message(&start_message(1)).await;
    recv_json(&mut h.wire).await;

    h.session
        .on_bridge_event(BridgeEvent::CallEnded {
            info: "conversation complete".to_string(),
        })
        .await;

    let msg = recv_json(&mut h.wire).await;
    assert_eq!(msg["type"], "disconnect");
    assert_eq!(msg["parameters"]["reason"], "complete");
    assert_eq!(msg["parameters"]["outputVariables"]["queue"], "sales");
    assert!(h.session.is_disconnecting());
}

#[tokio::test]
async fn test_dtmf_digits_forward_to_bridge() {
    let connector = Arc::new(MockConnector::new());
    let log = connector.log.clone();
    let mut h = harness(connector);

    h.session.process_text_message(&start_message(1)).await;
    recv_json(&mut h.wire).await;

    let digit = |d: char, seq| client_message("S1", "dtmf", seq, 1, serde_json::json!({"digit": d}));
    h.session.process_text_message(&digit('1', 2)).await;
    assert!(h.session.is_capturing_dtmf());

    // Caller audio is not forwarded while digits are being captured.
    h.session
        .process_binary_message(Bytes::from(vec![0xFFu8; 160]))
        .await;
    assert!(log.audio.lock().is_empty());

    h.session.process_text_message(&digit('2', 3)).await;
    h.session.process_text_message(&digit('#', 4)).await;

    let event = h.dtmf_events.recv().await.expect("dtmf event");
    assert_eq!(event, DtmfEvent::FinalDigits("12".to_string()));
    h.session.on_dtmf_event(event).await;

    assert!(!h.session.is_capturing_dtmf());
    let messages = log.messages.lock().clone();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["type"], "user_input");
    assert_eq!(messages[0]["source"], "dtmf");
    assert_eq!(messages[0]["text"], "12");
}

#[tokio::test]
async fn test_unknown_message_type_is_ignored() {
    let mut h = harness(Arc::new(MockConnector::new()));

    let msg = client_message("S1", "update", 1, 0, serde_json::json!({"foo": "bar"}));
    h.session.process_text_message(&msg).await;

    assert!(!h.session.is_closed());
    assert_eq!(h.session.last_client_seq(), 1);
}

#[tokio::test]
async fn test_unparseable_text_is_ignored() {
    let mut h = harness(Arc::new(MockConnector::new()));

    h.session.process_text_message("not json at all").await;

    assert!(!h.session.is_closed());
    assert_eq!(h.session.last_client_seq(), 0);
}
