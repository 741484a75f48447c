//! End-to-end scenarios driving the session actor directly through its
//! command channel (§8 S-1..S-6, I-5, I-6, I-8, I-9, I-10).

use std::sync::Arc;
use std::time::Duration;

use sequencer_core::document::{Track, MAX_TRACKS};
use sequencer_core::protocol::{ClientEnvelope, ClientMessage, ServerMessage};
use sequencer_server::actor::{self, ActorCommand, ActorHandle};
use sequencer_server::persistence::{FsColdStore, InMemoryHotStore, SessionRecord};
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;

struct Peer {
    rx: mpsc::UnboundedReceiver<ServerMessage>,
}

async fn spawn_test_actor() -> ActorHandle {
    spawn_test_actor_with(SessionRecord::new("session-under-test")).await
}

async fn spawn_test_actor_with(record: SessionRecord) -> ActorHandle {
    // into_path() skips the directory's Drop cleanup so it outlives this
    // function call, for the lifetime of the actor task it backs.
    let dir = tempfile::tempdir().unwrap().into_path();
    let hot = Arc::new(InMemoryHotStore::default());
    let cold = Arc::new(FsColdStore::new(dir, 100));
    actor::spawn(record, hot, cold, Duration::from_secs(60))
}

async fn connect(handle: &ActorHandle, connection_id: &str) -> Peer {
    let (tx, rx) = mpsc::unbounded_channel();
    let (reply_tx, reply_rx) = oneshot::channel();
    handle
        .tx
        .send(ActorCommand::Connect { connection_id: connection_id.to_string(), tx, reply: reply_tx })
        .await
        .unwrap();
    reply_rx.await.unwrap().unwrap();
    Peer { rx }
}

async fn send(handle: &ActorHandle, connection_id: &str, message: ClientMessage, seq: Option<u64>, ack: Option<u64>) {
    handle
        .tx
        .send(ActorCommand::Frame {
            connection_id: connection_id.to_string(),
            envelope: ClientEnvelope { message, seq, ack },
        })
        .await
        .unwrap();
}

async fn next(peer: &mut Peer) -> ServerMessage {
    timeout(Duration::from_secs(1), peer.rx.recv()).await.expect("timed out waiting for message").unwrap()
}

/// S-1: a client's out-of-range tempo is clamped and echoed with its
/// own clientSeq and a fresh serverSeq starting at 1.
#[tokio::test]
async fn s1_echo_clamps_and_confirms() {
    let handle = spawn_test_actor().await;
    let mut a = connect(&handle, "a").await;
    assert!(matches!(next(&mut a).await, ServerMessage::Snapshot { .. }));

    send(&handle, "a", ClientMessage::SetTempo { tempo: 240 }, Some(1), Some(0)).await;

    match next(&mut a).await {
        ServerMessage::TempoChanged { tempo, player_id, seq, client_seq } => {
            assert_eq!(tempo, 180);
            assert_eq!(player_id, "a");
            assert_eq!(seq, 1);
            assert_eq!(client_seq, Some(1));
        }
        other => panic!("unexpected message: {other:?}"),
    }
}

/// S-2: all connected peers observe the same serverSeq for one mutation,
/// and the originator's confirmation carries its clientSeq.
#[tokio::test]
async fn s2_fanout_delivers_identical_server_seq() {
    let handle = spawn_test_actor().await;
    let mut a = connect(&handle, "a").await;
    assert!(matches!(next(&mut a).await, ServerMessage::Snapshot { .. }));

    send(
        &handle,
        "a",
        ClientMessage::AddTrack { track: Track::new("T", "kick") },
        Some(1),
        Some(0),
    )
    .await;
    let _ = next(&mut a).await; // TrackAdded confirmation to a

    let mut b = connect(&handle, "b").await;
    assert!(matches!(next(&mut b).await, ServerMessage::Snapshot { .. }));
    let _ = next(&mut a).await; // a observes PlayerJoined for b

    let mut c = connect(&handle, "c").await;
    assert!(matches!(next(&mut c).await, ServerMessage::Snapshot { .. }));
    let _ = next(&mut a).await;
    let _ = next(&mut b).await;

    send(
        &handle,
        "b",
        ClientMessage::ToggleStep { track_id: "T".into(), step: 4 },
        Some(7),
        Some(3),
    )
    .await;

    let from_a = next(&mut a).await;
    let from_b = next(&mut b).await;
    let from_c = next(&mut c).await;

    let seqs: Vec<u64> = [&from_a, &from_b, &from_c].iter().map(|m| m.server_seq().unwrap()).collect();
    assert_eq!(seqs[0], seqs[1]);
    assert_eq!(seqs[1], seqs[2]);

    match from_b {
        ServerMessage::StepToggled { track_id, step, value, player_id, client_seq, .. } => {
            assert_eq!(track_id, "T");
            assert_eq!(step, 4);
            assert!(value);
            assert_eq!(player_id, "b");
            assert_eq!(client_seq, Some(7));
        }
        other => panic!("unexpected message: {other:?}"),
    }
}

/// S-3 / I-10: delete_track for an absent id still confirms, with the
/// document left unchanged.
#[tokio::test]
async fn s3_duplicate_delete_still_confirms() {
    let handle = spawn_test_actor().await;
    let mut a = connect(&handle, "a").await;
    assert!(matches!(next(&mut a).await, ServerMessage::Snapshot { .. }));

    send(&handle, "a", ClientMessage::DeleteTrack { track_id: "missing".into() }, Some(1), Some(0)).await;

    match next(&mut a).await {
        ServerMessage::TrackDeleted { track_id, player_id, client_seq, .. } => {
            assert_eq!(track_id, "missing");
            assert_eq!(player_id, "a");
            assert_eq!(client_seq, Some(1));
        }
        other => panic!("unexpected message: {other:?}"),
    }

    let (tx, rx) = oneshot::channel();
    handle.tx.send(ActorCommand::GetRecord { reply: tx }).await.unwrap();
    let record = rx.await.unwrap();
    assert!(record.document.tracks.is_empty());
}

/// S-4 / I-9: a mutating message against an immutable session errors
/// only to the sender and leaves the document untouched.
#[tokio::test]
async fn s4_immutable_session_rejects_mutation() {
    let mut record = SessionRecord::new("session-under-test");
    record.immutable = true;
    let handle = spawn_test_actor_with(record).await;
    let mut a = connect(&handle, "a").await;
    assert!(matches!(next(&mut a).await, ServerMessage::Snapshot { .. }));
    let mut b = connect(&handle, "b").await;
    assert!(matches!(next(&mut b).await, ServerMessage::Snapshot { .. }));
    let _ = next(&mut a).await; // PlayerJoined for b

    let (tx, rx) = oneshot::channel();
    handle.tx.send(ActorCommand::GetRecord { reply: tx }).await.unwrap();
    let before = rx.await.unwrap();

    send(&handle, "a", ClientMessage::SetTempo { tempo: 140 }, Some(1), Some(0)).await;

    match next(&mut a).await {
        ServerMessage::Error { code, .. } => {
            assert_eq!(code, sequencer_core::protocol::ErrorCode::SessionPublished);
        }
        other => panic!("unexpected message: {other:?}"),
    }

    assert!(timeout(Duration::from_millis(200), b.rx.recv()).await.is_err(), "peer b must not observe anything");

    let (tx, rx) = oneshot::channel();
    handle.tx.send(ActorCommand::GetRecord { reply: tx }).await.unwrap();
    let after = rx.await.unwrap();
    assert_eq!(before.document, after.document);
}

/// Publish creates a sibling session rather than mutating the source: the
/// new record is immutable and carries the source's document, while the
/// source itself is left mutable.
#[tokio::test]
async fn publish_creates_new_immutable_session_and_leaves_source_mutable() {
    let handle = spawn_test_actor().await;
    let mut a = connect(&handle, "a").await;
    assert!(matches!(next(&mut a).await, ServerMessage::Snapshot { .. }));

    send(&handle, "a", ClientMessage::SetTempo { tempo: 150 }, Some(1), Some(0)).await;
    let _ = next(&mut a).await;

    let (tx, rx) = oneshot::channel();
    handle.tx.send(ActorCommand::Publish { reply: tx }).await.unwrap();
    let published = rx.await.unwrap().expect("publish should succeed on a mutable source");

    assert!(published.immutable);
    assert_ne!(published.id, "session-under-test");
    assert_eq!(published.document.tempo, 150);

    let (tx, rx) = oneshot::channel();
    handle.tx.send(ActorCommand::GetRecord { reply: tx }).await.unwrap();
    let source = rx.await.unwrap();
    assert!(!source.immutable, "publishing must not mutate the source session");
}

/// Publishing an already-immutable session is refused rather than
/// producing another copy.
#[tokio::test]
async fn publish_rejects_already_immutable_source() {
    let mut record = SessionRecord::new("session-under-test");
    record.immutable = true;
    let handle = spawn_test_actor_with(record).await;

    let (tx, rx) = oneshot::channel();
    handle.tx.send(ActorCommand::Publish { reply: tx }).await.unwrap();
    let result = rx.await.unwrap();
    assert!(result.is_err(), "publishing an already-immutable session must be refused");
}

/// S-5 / I-8: an ack gap beyond the threshold triggers a proactive
/// snapshot to the lagging peer.
#[tokio::test]
async fn s5_ack_gap_triggers_snapshot() {
    let handle = spawn_test_actor().await;
    let mut a = connect(&handle, "a").await;
    assert!(matches!(next(&mut a).await, ServerMessage::Snapshot { .. }));

    for i in 0..60u32 {
        send(&handle, "a", ClientMessage::SetSwing { swing: (i % 50) as i64 }, Some(i as u64 + 1), Some(0)).await;
        let _ = next(&mut a).await;
    }

    // a's own ack stays at 0 throughout, so once serverSeq - ack exceeds
    // the threshold the next broadcast is followed by a catch-up snapshot.
    let mut saw_snapshot = false;
    for _ in 0..5 {
        if let Ok(Some(ServerMessage::Snapshot { .. })) = timeout(Duration::from_millis(200), a.rx.recv()).await {
            saw_snapshot = true;
            break;
        }
    }
    assert!(saw_snapshot, "expected a catch-up snapshot once the ack gap exceeded the threshold");
}

/// S-6: three consecutive state_mismatch replies are what the client
/// sync engine reacts to; here we only check the server's half — a
/// diverging hash always yields state_mismatch, and a matching one
/// always yields state_hash_match.
#[tokio::test]
async fn s6_hash_reconciliation_round_trip() {
    let handle = spawn_test_actor().await;
    let mut a = connect(&handle, "a").await;
    let snapshot = next(&mut a).await;
    let state = match snapshot {
        ServerMessage::Snapshot { state, .. } => state,
        other => panic!("unexpected message: {other:?}"),
    };

    send(&handle, "a", ClientMessage::StateHash { hash: "not-a-real-hash".into() }, None, None).await;
    match next(&mut a).await {
        ServerMessage::StateMismatch { server_hash } => {
            assert_eq!(server_hash, sequencer_core::hash::hash(&state));
        }
        other => panic!("unexpected message: {other:?}"),
    }

    let real_hash = sequencer_core::hash::hash(&state);
    send(&handle, "a", ClientMessage::StateHash { hash: real_hash }, None, None).await;
    assert!(matches!(next(&mut a).await, ServerMessage::StateHashMatch));
}

/// I-5: serverSeq on mutating broadcasts strictly increases.
#[tokio::test]
async fn i5_server_seq_strictly_increases() {
    let handle = spawn_test_actor().await;
    let mut a = connect(&handle, "a").await;
    assert!(matches!(next(&mut a).await, ServerMessage::Snapshot { .. }));

    let mut last = 0u64;
    for i in 0..5u32 {
        send(&handle, "a", ClientMessage::SetSwing { swing: i as i64 }, Some(i as u64 + 1), Some(0)).await;
        let seq = next(&mut a).await.server_seq().unwrap();
        assert!(seq > last);
        last = seq;
    }
}

/// I-6: non-mutating broadcasts never carry a serverSeq.
#[tokio::test]
async fn i6_player_joined_carries_no_server_seq() {
    let handle = spawn_test_actor().await;
    let mut a = connect(&handle, "a").await;
    assert!(matches!(next(&mut a).await, ServerMessage::Snapshot { .. }));

    let _b = connect(&handle, "b").await;
    match next(&mut a).await {
        msg @ ServerMessage::PlayerJoined { .. } => assert_eq!(msg.server_seq(), None),
        other => panic!("unexpected message: {other:?}"),
    }
}

/// MAX_TRACKS repair keeps add_track from pushing a session past its
/// track budget even though the actor itself never rejects the message.
#[tokio::test]
async fn add_track_respects_max_tracks_via_repair() {
    let handle = spawn_test_actor().await;
    let mut a = connect(&handle, "a").await;
    assert!(matches!(next(&mut a).await, ServerMessage::Snapshot { .. }));

    for i in 0..MAX_TRACKS + 4 {
        send(&handle, "a", ClientMessage::AddTrack { track: Track::new(format!("t{i}"), "kick") }, Some(i as u64 + 1), Some(0)).await;
        let _ = next(&mut a).await;
    }

    let (tx, rx) = oneshot::channel();
    handle.tx.send(ActorCommand::GetRecord { reply: tx }).await.unwrap();
    let record = rx.await.unwrap();
    assert_eq!(record.document.tracks.len(), MAX_TRACKS);
}
