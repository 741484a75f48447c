//! Client sync engine (component C7): optimistic local mutation, pending
//! queue with selective clearing, snapshot reconciliation, hash-based
//! convergence checks, clock sync, and remote-change attribution.

use std::collections::{HashMap, VecDeque};

use sequencer_core::document::{self, SessionDocument, Track};
use sequencer_core::hash;
use sequencer_core::protocol::{ClientEnvelope, ClientMessage, ServerMessage};

const OFFLINE_QUEUE_CAP: usize = 100;
const OFFLINE_STALE_MS: u64 = 30_000;
const HASH_MISMATCH_THRESHOLD: u32 = 3;
const REMOTE_CHANGE_EXPIRY_MS: u64 = 600;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    SinglePlayer,
    Reconnecting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockQuality {
    Good,
    Fair,
    Poor,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ClockSync {
    pub offset_ms: i64,
    pub rtt_ms: u64,
}

impl ClockSync {
    pub fn quality(&self) -> ClockQuality {
        if self.rtt_ms < 100 {
            ClockQuality::Good
        } else if self.rtt_ms < 250 {
            ClockQuality::Fair
        } else {
            ClockQuality::Poor
        }
    }
}

struct PendingMutation {
    client_seq: u64,
    envelope: ClientEnvelope,
    enqueued_at: u64,
}

/// A recently-observed remote edit, kept around briefly so the UI can
/// flash the affected cell in the originating peer's color.
#[derive(Debug, Clone)]
pub struct RemoteChange {
    pub track_id: String,
    pub step: usize,
    pub color: String,
    pub expires_at: u64,
}

pub struct SyncEngine {
    pub document: SessionDocument,
    pub connection_state: ConnectionState,
    pub player_id: Option<String>,
    next_client_seq: u64,
    max_server_seq: u64,
    last_snapshot_timestamp: u64,
    pending: VecDeque<PendingMutation>,
    offline_queue: VecDeque<(ClientMessage, u64)>,
    mismatch_count: u32,
    remote_changes: HashMap<(String, usize), RemoteChange>,
    clock: ClockSync,
}

impl SyncEngine {
    pub fn new() -> SyncEngine {
        SyncEngine {
            document: SessionDocument::default(),
            connection_state: ConnectionState::Disconnected,
            player_id: None,
            next_client_seq: 1,
            max_server_seq: 0,
            last_snapshot_timestamp: 0,
            pending: VecDeque::new(),
            offline_queue: VecDeque::new(),
            mismatch_count: 0,
            remote_changes: HashMap::new(),
            clock: ClockSync::default(),
        }
    }

    pub fn clock(&self) -> ClockSync {
        self.clock
    }

    pub fn mismatch_count(&self) -> u32 {
        self.mismatch_count
    }

    /// Step 1-3 of the optimistic flow: apply locally, and either send
    /// immediately (connected) or queue for replay (disconnected).
    /// Non-mutating messages are sent immediately when connected and
    /// dropped otherwise — they are never queued.
    pub fn dispatch(&mut self, message: ClientMessage, now_millis: u64) -> Option<ClientEnvelope> {
        if message.is_mutating() {
            local_apply(&mut self.document, &message);
            let client_seq = self.next_client_seq;
            self.next_client_seq += 1;

            if matches!(
                self.connection_state,
                ConnectionState::Connected | ConnectionState::SinglePlayer
            ) {
                let envelope = ClientEnvelope {
                    message,
                    seq: Some(client_seq),
                    ack: Some(self.max_server_seq),
                };
                self.pending.push_back(PendingMutation {
                    client_seq,
                    envelope: envelope.clone(),
                    enqueued_at: now_millis,
                });
                Some(envelope)
            } else {
                if self.offline_queue.len() >= OFFLINE_QUEUE_CAP {
                    self.offline_queue.pop_front();
                }
                self.offline_queue.push_back((message, now_millis));
                None
            }
        } else if matches!(
            self.connection_state,
            ConnectionState::Connected | ConnectionState::SinglePlayer
        ) {
            Some(ClientEnvelope { message, seq: None, ack: Some(self.max_server_seq) })
        } else {
            None
        }
    }

    /// Called once a reconnect succeeds: replays queued offline mutations
    /// that are not yet stale, oldest first, client seq continuing from
    /// where it left off.
    pub fn on_reconnected(&mut self, now_millis: u64) -> Vec<ClientEnvelope> {
        self.connection_state = ConnectionState::Connected;
        let mut out = Vec::new();
        while let Some((message, enqueued_at)) = self.offline_queue.pop_front() {
            if now_millis.saturating_sub(enqueued_at) > OFFLINE_STALE_MS {
                continue;
            }
            let client_seq = self.next_client_seq;
            self.next_client_seq += 1;
            let envelope = ClientEnvelope {
                message,
                seq: Some(client_seq),
                ack: Some(self.max_server_seq),
            };
            self.pending.push_back(PendingMutation {
                client_seq,
                envelope: envelope.clone(),
                enqueued_at: now_millis,
            });
            out.push(envelope);
        }
        out
    }

    pub fn on_disconnected(&mut self) {
        self.connection_state = ConnectionState::Reconnecting;
    }

    /// Step 4 of the optimistic flow plus the rest of §4.7: process one
    /// inbound server message, returning any follow-up envelopes the
    /// engine needs to send (snapshot requests, clock sync, …).
    pub fn on_server_message(&mut self, msg: ServerMessage, now_millis: u64) -> Vec<ClientEnvelope> {
        if let Some(seq) = msg.server_seq() {
            self.max_server_seq = self.max_server_seq.max(seq);
        }

        match &msg {
            ServerMessage::Snapshot { state, snapshot_timestamp, server_seq, player_id, .. } => {
                if *snapshot_timestamp < self.last_snapshot_timestamp {
                    return Vec::new();
                }
                self.last_snapshot_timestamp = *snapshot_timestamp;
                self.player_id = Some(player_id.clone());
                self.document = state.clone();
                self.max_server_seq = self.max_server_seq.max(*server_seq);
                self.mismatch_count = 0;

                // Pending entries whose client seq is already covered by
                // this snapshot's serverSeq cannot be distinguished from
                // lost ones without an echo, so they are dropped; the
                // rest are logically still outstanding and replayed on
                // top of the fresh document to preserve optimism.
                self.pending.retain(|p| p.client_seq > *server_seq);
                for pending in &self.pending {
                    local_apply(&mut self.document, &pending.envelope.message);
                }
                Vec::new()
            }

            ServerMessage::StateHashMatch => {
                self.mismatch_count = 0;
                Vec::new()
            }

            ServerMessage::StateMismatch { .. } => {
                self.mismatch_count += 1;
                if self.mismatch_count >= HASH_MISMATCH_THRESHOLD {
                    vec![ClientEnvelope { message: ClientMessage::RequestSnapshot, seq: None, ack: Some(self.max_server_seq) }]
                } else {
                    Vec::new()
                }
            }

            ServerMessage::ClockSyncResponse { client_time, server_time } => {
                let rtt = now_millis.saturating_sub(*client_time);
                let offset = *server_time as i64 - (*client_time as i64 + rtt as i64 / 2);
                self.clock = ClockSync { offset_ms: offset, rtt_ms: rtt };
                Vec::new()
            }

            other => {
                if let (Some(client_seq), Some(player_id)) = (other.client_seq(), self.player_id.clone()) {
                    let is_echo = confirmation_player_id(other) == Some(player_id.as_str());
                    if is_echo {
                        self.pending.retain(|p| p.client_seq > client_seq);
                        return Vec::new();
                    }
                }
                self.apply_remote(other, now_millis);
                Vec::new()
            }
        }
    }

    fn apply_remote(&mut self, msg: &ServerMessage, now_millis: u64) {
        if let Some(is_self) = confirmation_player_id(msg).zip(self.player_id.as_deref()).map(|(a, b)| a == b) {
            if is_self {
                return;
            }
        }

        if let Some(reconstructed) = to_client_message(msg) {
            local_apply(&mut self.document, &reconstructed);
        }

        if let (Some((track_id, step)), Some(color)) = (track_step_of(msg), color_of(msg)) {
            self.remote_changes.insert(
                (track_id.clone(), step),
                RemoteChange { track_id, step, color, expires_at: now_millis + REMOTE_CHANGE_EXPIRY_MS },
            );
        }
    }

    /// Remote-change highlights still within their 600 ms window.
    pub fn active_remote_changes(&mut self, now_millis: u64) -> Vec<RemoteChange> {
        self.remote_changes.retain(|_, c| c.expires_at > now_millis);
        self.remote_changes.values().cloned().collect()
    }

    pub fn state_hash(&self) -> String {
        hash::hash(&self.document)
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn offline_queue_len(&self) -> usize {
        self.offline_queue.len()
    }
}

impl Default for SyncEngine {
    fn default() -> SyncEngine {
        SyncEngine::new()
    }
}

fn confirmation_player_id(msg: &ServerMessage) -> Option<&str> {
    use ServerMessage::*;
    match msg {
        StepToggled { player_id, .. }
        | TempoChanged { player_id, .. }
        | SwingChanged { player_id, .. }
        | TrackMuted { player_id, .. }
        | TrackSoloed { player_id, .. }
        | ParameterLockSet { player_id, .. }
        | TrackAdded { player_id, .. }
        | TrackDeleted { player_id, .. }
        | TrackCleared { player_id, .. }
        | SequenceCopied { player_id, .. }
        | SequenceMoved { player_id, .. }
        | TrackSampleSet { player_id, .. }
        | TrackVolumeSet { player_id, .. }
        | TrackTransposeSet { player_id, .. }
        | TrackStepCountSet { player_id, .. }
        | TrackSwingSet { player_id, .. }
        | TrackNameSet { player_id, .. }
        | TrackPlaybackModeSet { player_id, .. }
        | EffectsSet { player_id, .. }
        | ScaleSet { player_id, .. }
        | FmParamsSet { player_id, .. }
        | StepsBatchCleared { player_id, .. }
        | ParameterLocksBatchSet { player_id, .. }
        | LoopRegionSet { player_id, .. }
        | TracksReordered { player_id, .. }
        | PatternRotated { player_id, .. }
        | PatternInverted { player_id, .. }
        | PatternReversed { player_id, .. }
        | PatternMirrored { player_id, .. }
        | PatternEuclideanFilled { player_id, .. } => Some(player_id),
        _ => None,
    }
}

fn track_step_of(msg: &ServerMessage) -> Option<(String, usize)> {
    match msg {
        ServerMessage::StepToggled { track_id, step, .. } => Some((track_id.clone(), *step)),
        ServerMessage::ParameterLockSet { track_id, step, .. } => Some((track_id.clone(), *step)),
        _ => None,
    }
}

fn color_of(_msg: &ServerMessage) -> Option<String> {
    // The confirmation variants don't carry a color; attribution is keyed
    // off the player roster the caller maintains alongside this engine.
    None
}

/// Reconstruct the mutation a confirmation echo applied, so a remote
/// peer's edit can be mirrored into the local document.
fn to_client_message(msg: &ServerMessage) -> Option<ClientMessage> {
    use ServerMessage as S;
    Some(match msg.clone() {
        S::StepToggled { track_id, step, .. } => ClientMessage::ToggleStep { track_id, step },
        S::TempoChanged { tempo, .. } => ClientMessage::SetTempo { tempo: tempo as i64 },
        S::SwingChanged { swing, .. } => ClientMessage::SetSwing { swing: swing as i64 },
        S::TrackMuted { track_id, muted, .. } => ClientMessage::MuteTrack { track_id, muted },
        S::TrackSoloed { track_id, soloed, .. } => ClientMessage::SoloTrack { track_id, soloed },
        S::ParameterLockSet { track_id, step, lock, .. } => ClientMessage::SetParameterLock { track_id, step, lock },
        S::TrackAdded { track, .. } => ClientMessage::AddTrack { track },
        S::TrackDeleted { track_id, .. } => ClientMessage::DeleteTrack { track_id },
        S::TrackCleared { track_id, .. } => ClientMessage::ClearTrack { track_id },
        S::SequenceCopied { from_track_id, to_track_id, .. } => {
            ClientMessage::CopySequence { from_track_id, to_track_id }
        }
        S::SequenceMoved { from_track_id, to_track_id, .. } => {
            ClientMessage::MoveSequence { from_track_id, to_track_id }
        }
        S::TrackSampleSet { track_id, sample_id, name, .. } => {
            ClientMessage::SetTrackSample { track_id, sample_id, name }
        }
        S::TrackVolumeSet { track_id, volume, .. } => ClientMessage::SetTrackVolume { track_id, volume },
        S::TrackTransposeSet { track_id, transpose, .. } => {
            ClientMessage::SetTrackTranspose { track_id, transpose: transpose as i64 }
        }
        S::TrackStepCountSet { track_id, step_count, .. } => {
            ClientMessage::SetTrackStepCount { track_id, step_count: step_count as i64 }
        }
        S::TrackSwingSet { track_id, swing, .. } => ClientMessage::SetTrackSwing { track_id, swing: swing as i64 },
        S::TrackNameSet { track_id, name, .. } => ClientMessage::SetTrackName { track_id, name },
        S::TrackPlaybackModeSet { track_id, playback_mode, .. } => {
            ClientMessage::SetTrackPlaybackMode { track_id, playback_mode }
        }
        S::EffectsSet { effects, .. } => ClientMessage::SetEffects { effects },
        S::ScaleSet { scale, .. } => ClientMessage::SetScale { scale },
        S::FmParamsSet { track_id, fm_params, .. } => ClientMessage::SetFmParams { track_id, fm_params },
        S::StepsBatchCleared { track_id, steps, .. } => ClientMessage::BatchClearSteps { track_id, steps },
        S::ParameterLocksBatchSet { track_id, locks, .. } => {
            ClientMessage::BatchSetParameterLocks { track_id, locks }
        }
        S::LoopRegionSet { region, .. } => ClientMessage::SetLoopRegion { region },
        S::TracksReordered { from_index, to_index, .. } => ClientMessage::ReorderTracks { from_index, to_index },
        S::PatternRotated { track_id, direction, .. } => ClientMessage::RotatePattern { track_id, direction },
        S::PatternInverted { track_id, .. } => ClientMessage::InvertPattern { track_id },
        S::PatternReversed { track_id, .. } => ClientMessage::ReversePattern { track_id },
        S::PatternMirrored { track_id, direction, .. } => ClientMessage::MirrorPattern { track_id, direction },
        S::PatternEuclideanFilled { track_id, hits, .. } => ClientMessage::EuclideanFill { track_id, hits },
        _ => return None,
    })
}

/// Optimistic local mutation, mirroring the authoritative apply on the
/// server side but without validation (the server re-validates and
/// repairs independently; divergence here is caught by hash reconciliation).
fn local_apply(doc: &mut SessionDocument, msg: &ClientMessage) {
    fn find<'a>(doc: &'a mut SessionDocument, id: &str) -> Option<&'a mut Track> {
        doc.tracks.iter_mut().find(|t| t.id == id)
    }

    match msg {
        ClientMessage::ToggleStep { track_id, step } => {
            if let Some(t) = find(doc, track_id) {
                if *step < t.steps.len() {
                    t.steps[*step] = !t.steps[*step];
                }
            }
        }
        ClientMessage::SetTempo { tempo } => {
            doc.tempo = (*tempo).clamp(document::TEMPO_RANGE.0 as i64, document::TEMPO_RANGE.1 as i64) as u32
        }
        ClientMessage::SetSwing { swing } => {
            doc.swing = (*swing).clamp(document::SWING_RANGE.0 as i64, document::SWING_RANGE.1 as i64) as u32
        }
        ClientMessage::MuteTrack { track_id, muted } => {
            if let Some(t) = find(doc, track_id) {
                t.muted = *muted;
            }
        }
        ClientMessage::SoloTrack { track_id, soloed } => {
            if let Some(t) = find(doc, track_id) {
                t.soloed = *soloed;
            }
        }
        ClientMessage::SetParameterLock { track_id, step, lock } => {
            if let Some(t) = find(doc, track_id) {
                if *step < t.parameter_locks.len() {
                    t.parameter_locks[*step] = lock.clone();
                }
            }
        }
        ClientMessage::AddTrack { track } => {
            doc.tracks.retain(|t| t.id != track.id);
            doc.tracks.push(track.clone());
        }
        ClientMessage::DeleteTrack { track_id } => doc.tracks.retain(|t| t.id != *track_id),
        ClientMessage::ClearTrack { track_id } => {
            if let Some(t) = find(doc, track_id) {
                t.steps.iter_mut().for_each(|s| *s = false);
                t.parameter_locks.iter_mut().for_each(|l| *l = None);
            }
        }
        ClientMessage::SetTrackSample { track_id, sample_id, name } => {
            if let Some(t) = find(doc, track_id) {
                t.sample_id = sample_id.clone();
                if let Some(name) = name {
                    t.name = name.clone();
                }
            }
        }
        ClientMessage::SetTrackVolume { track_id, volume } => {
            if let Some(t) = find(doc, track_id) {
                t.volume = *volume;
            }
        }
        ClientMessage::SetTrackTranspose { track_id, transpose } => {
            if let Some(t) = find(doc, track_id) {
                t.transpose = *transpose as i32;
            }
        }
        ClientMessage::SetTrackStepCount { track_id, step_count } => {
            if let Some(t) = find(doc, track_id) {
                t.step_count = document::coerce_step_count((*step_count).clamp(0, document::MAX_STEPS as i64) as u32);
            }
        }
        ClientMessage::SetTrackSwing { track_id, swing } => {
            if let Some(t) = find(doc, track_id) {
                t.swing = Some(*swing as u32);
            }
        }
        ClientMessage::SetTrackName { track_id, name } => {
            if let Some(t) = find(doc, track_id) {
                t.name = name.clone();
            }
        }
        ClientMessage::SetTrackPlaybackMode { track_id, playback_mode } => {
            if let Some(t) = find(doc, track_id) {
                t.playback_mode = *playback_mode;
            }
        }
        ClientMessage::SetEffects { effects } => doc.effects = Some(effects.clone()),
        ClientMessage::SetScale { scale } => doc.scale = scale.clone(),
        ClientMessage::SetFmParams { track_id, fm_params } => {
            if let Some(t) = find(doc, track_id) {
                t.fm_params = Some(fm_params.clone());
            }
        }
        ClientMessage::BatchClearSteps { track_id, steps } => {
            if let Some(t) = find(doc, track_id) {
                for &step in steps {
                    if step < t.steps.len() {
                        t.steps[step] = false;
                        t.parameter_locks[step] = None;
                    }
                }
            }
        }
        ClientMessage::BatchSetParameterLocks { track_id, locks } => {
            if let Some(t) = find(doc, track_id) {
                for entry in locks {
                    if entry.step < t.parameter_locks.len() {
                        t.parameter_locks[entry.step] = entry.lock.clone();
                    }
                }
            }
        }
        ClientMessage::SetLoopRegion { region } => doc.loop_region = region.clone(),
        ClientMessage::ReorderTracks { from_index, to_index } => {
            if *from_index < doc.tracks.len() && *to_index < doc.tracks.len() {
                let t = doc.tracks.remove(*from_index);
                doc.tracks.insert(*to_index, t);
            }
        }
        ClientMessage::RotatePattern { track_id, direction } => {
            if let Some(t) = find(doc, track_id) {
                t.rotate(*direction);
            }
        }
        ClientMessage::InvertPattern { track_id } => {
            if let Some(t) = find(doc, track_id) {
                t.invert();
            }
        }
        ClientMessage::ReversePattern { track_id } => {
            if let Some(t) = find(doc, track_id) {
                t.reverse();
            }
        }
        ClientMessage::MirrorPattern { track_id, direction } => {
            if let Some(t) = find(doc, track_id) {
                t.mirror(*direction);
            }
        }
        ClientMessage::EuclideanFill { track_id, hits } => {
            if let Some(t) = find(doc, track_id) {
                t.euclidean_fill(*hits);
            }
        }
        ClientMessage::SetSessionName { .. }
        | ClientMessage::ClockSyncRequest { .. }
        | ClientMessage::StateHash { .. }
        | ClientMessage::RequestSnapshot
        | ClientMessage::CursorMove { .. }
        | ClientMessage::Play
        | ClientMessage::Stop => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sequencer_core::document::Track;

    #[test]
    fn dispatch_while_connected_sends_and_tracks_pending() {
        let mut engine = SyncEngine::new();
        engine.connection_state = ConnectionState::Connected;
        engine.document.tracks.push(Track::new("t1", "kick"));

        let envelope = engine
            .dispatch(ClientMessage::ToggleStep { track_id: "t1".into(), step: 0 }, 0)
            .expect("mutating message should send while connected");
        assert_eq!(envelope.seq, Some(1));
        assert_eq!(engine.pending_len(), 1);
        assert!(engine.document.tracks[0].steps[0]);
    }

    #[test]
    fn dispatch_while_disconnected_queues_offline() {
        let mut engine = SyncEngine::new();
        engine.document.tracks.push(Track::new("t1", "kick"));

        let result = engine.dispatch(ClientMessage::ToggleStep { track_id: "t1".into(), step: 0 }, 0);
        assert!(result.is_none());
        assert_eq!(engine.offline_queue_len(), 1);
        assert!(engine.document.tracks[0].steps[0], "local apply still happens while offline");
    }

    #[test]
    fn offline_queue_drops_oldest_beyond_capacity() {
        let mut engine = SyncEngine::new();
        engine.document.tracks.push(Track::new("t1", "kick"));
        for i in 0..150 {
            engine.dispatch(ClientMessage::ToggleStep { track_id: "t1".into(), step: i % 16 }, 0);
        }
        assert_eq!(engine.offline_queue_len(), OFFLINE_QUEUE_CAP);
    }

    #[test]
    fn reconnect_drops_stale_queued_entries() {
        let mut engine = SyncEngine::new();
        engine.document.tracks.push(Track::new("t1", "kick"));
        engine.dispatch(ClientMessage::ToggleStep { track_id: "t1".into(), step: 0 }, 0);
        let replayed = engine.on_reconnected(60_000);
        assert!(replayed.is_empty(), "entry older than 30s should be dropped as stale");
    }

    #[test]
    fn reconnect_replays_fresh_queued_entries() {
        let mut engine = SyncEngine::new();
        engine.document.tracks.push(Track::new("t1", "kick"));
        engine.dispatch(ClientMessage::ToggleStep { track_id: "t1".into(), step: 0 }, 0);
        let replayed = engine.on_reconnected(5_000);
        assert_eq!(replayed.len(), 1);
        assert_eq!(replayed[0].seq, Some(1));
    }

    #[test]
    fn echo_clears_pending_selectively() {
        let mut engine = SyncEngine::new();
        engine.connection_state = ConnectionState::Connected;
        engine.player_id = Some("self".into());
        engine.document.tracks.push(Track::new("t1", "kick"));

        engine.dispatch(ClientMessage::ToggleStep { track_id: "t1".into(), step: 0 }, 0);
        engine.dispatch(ClientMessage::ToggleStep { track_id: "t1".into(), step: 1 }, 0);
        assert_eq!(engine.pending_len(), 2);

        engine.on_server_message(
            ServerMessage::StepToggled {
                track_id: "t1".into(),
                step: 0,
                value: true,
                player_id: "self".into(),
                seq: 10,
                client_seq: Some(1),
            },
            1,
        );
        assert_eq!(engine.pending_len(), 1);
    }

    #[test]
    fn three_consecutive_mismatches_requests_snapshot() {
        let mut engine = SyncEngine::new();
        engine.on_server_message(ServerMessage::StateMismatch { server_hash: "a".into() }, 0);
        engine.on_server_message(ServerMessage::StateMismatch { server_hash: "a".into() }, 0);
        let follow_up = engine.on_server_message(ServerMessage::StateMismatch { server_hash: "a".into() }, 0);
        assert_eq!(follow_up.len(), 1);
        assert!(matches!(follow_up[0].message, ClientMessage::RequestSnapshot));
    }

    #[test]
    fn hash_match_resets_mismatch_counter() {
        let mut engine = SyncEngine::new();
        engine.on_server_message(ServerMessage::StateMismatch { server_hash: "a".into() }, 0);
        engine.on_server_message(ServerMessage::StateMismatch { server_hash: "a".into() }, 0);
        engine.on_server_message(ServerMessage::StateHashMatch, 0);
        assert_eq!(engine.mismatch_count(), 0);
    }

    #[test]
    fn clock_sync_computes_offset_and_quality() {
        let mut engine = SyncEngine::new();
        engine.on_server_message(
            ServerMessage::ClockSyncResponse { client_time: 1000, server_time: 1050 },
            1040,
        );
        let clock = engine.clock();
        assert_eq!(clock.rtt_ms, 40);
        assert_eq!(clock.quality(), ClockQuality::Good);
    }

    #[test]
    fn remote_step_toggle_is_applied_and_attributed() {
        let mut engine = SyncEngine::new();
        engine.player_id = Some("self".into());
        engine.document.tracks.push(Track::new("t1", "kick"));

        engine.on_server_message(
            ServerMessage::StepToggled {
                track_id: "t1".into(),
                step: 2,
                value: true,
                player_id: "other".into(),
                seq: 1,
                client_seq: None,
            },
            0,
        );
        assert!(engine.document.tracks[0].steps[2]);
    }

    #[test]
    fn snapshot_replaces_document_and_reapplies_pending() {
        let mut engine = SyncEngine::new();
        engine.connection_state = ConnectionState::Connected;
        engine.player_id = Some("self".into());

        let mut server_doc = SessionDocument::default();
        server_doc.tracks.push(Track::new("t1", "kick"));
        engine.dispatch(ClientMessage::ToggleStep { track_id: "t1".into(), step: 3 }, 0);

        engine.on_server_message(
            ServerMessage::Snapshot {
                state: server_doc,
                players: vec![],
                player_id: "self".into(),
                immutable: false,
                snapshot_timestamp: 100,
                server_seq: 0,
                playing_player_ids: vec![],
            },
            100,
        );

        assert!(engine.document.tracks[0].steps[3], "pending mutation replayed atop the snapshot");
    }
}
