//! Session actor (component C4): one single-writer task per session id,
//! owning the authoritative [`SessionDocument`] and every peer's
//! connection state. All mutation flows through this actor's command
//! channel; nothing outside it ever touches the document directly.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use sequencer_core::document::{self, SessionDocument, Track};
use sequencer_core::hash;
use sequencer_core::identity;
use sequencer_core::protocol::{ClientEnvelope, ClientMessage, ErrorCode, PlayerInfo, ServerMessage};
use sequencer_core::validators::{self, ParameterLockPolicy};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::metrics::{self, Metrics};
use crate::persistence::{self, ColdStore, HotStore, SessionRecord};

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

struct PlayerState {
    info: PlayerInfo,
    tx: mpsc::UnboundedSender<ServerMessage>,
    ack: u64,
}

/// Commands the actor's single task accepts. Everything mutating or
/// observing a session goes through this channel, never a shared mutex.
pub enum ActorCommand {
    Connect {
        connection_id: String,
        tx: mpsc::UnboundedSender<ServerMessage>,
        reply: oneshot::Sender<Result<(), String>>,
    },
    Frame {
        connection_id: String,
        envelope: ClientEnvelope,
    },
    Disconnect {
        connection_id: String,
    },
    /// Synchronous read used by REST handlers; does not touch `seq`.
    GetRecord {
        reply: oneshot::Sender<SessionRecord>,
    },
    /// REST PATCH/PUT: replace the document and/or name directly.
    /// `remix_origin`, when set, is only ever populated by the remix
    /// handler on the *new* session's actor to record `(sourceId,
    /// sourceName)` lineage.
    ReplaceDocument {
        document: Option<SessionDocument>,
        name: Option<String>,
        remix_origin: Option<(String, String)>,
        reply: oneshot::Sender<SessionRecord>,
    },
    /// Publish always creates a *new* immutable session from this one's
    /// current document; it never mutates this session in place. Rejected
    /// if this session is already immutable.
    Publish {
        reply: oneshot::Sender<Result<SessionRecord, AppError>>,
    },
    /// Bump this session's `remixCount`; sent to the source session's
    /// actor when another session is remixed from it.
    IncrementRemixCount {
        reply: oneshot::Sender<SessionRecord>,
    },
    Shutdown,
}

#[derive(Clone)]
pub struct ActorHandle {
    pub tx: mpsc::Sender<ActorCommand>,
}

struct SessionActorState {
    id: String,
    record: SessionRecord,
    players: HashMap<String, PlayerState>,
    playing: std::collections::HashSet<String>,
    server_seq: u64,
    broadcasts_since_flush: u64,
    lock_policy: ParameterLockPolicy,
    hot: Arc<dyn HotStore>,
    cold: Arc<dyn ColdStore>,
}

impl SessionActorState {
    fn broadcast(&mut self, msg: ServerMessage, exclude: Option<&str>) {
        for (id, player) in self.players.iter() {
            if exclude == Some(id.as_str()) {
                continue;
            }
            let _ = player.tx.send(msg.clone());
            Metrics::incr(&metrics::global().messages_out);
        }
    }

    fn unicast(&self, connection_id: &str, msg: ServerMessage) {
        if let Some(player) = self.players.get(connection_id) {
            let _ = player.tx.send(msg);
            Metrics::incr(&metrics::global().messages_out);
        }
    }

    fn snapshot_for(&self, connection_id: &str) -> ServerMessage {
        ServerMessage::Snapshot {
            state: self.record.document.clone(),
            players: self.players.values().map(|p| p.info.clone()).collect(),
            player_id: connection_id.to_string(),
            immutable: self.record.immutable,
            snapshot_timestamp: now_millis(),
            server_seq: self.server_seq,
            playing_player_ids: self.playing.iter().cloned().collect(),
        }
    }

    fn next_seq(&mut self) -> u64 {
        self.server_seq += 1;
        self.broadcasts_since_flush += 1;
        if self.broadcasts_since_flush >= document::SERVER_SEQ_FLUSH_INTERVAL {
            self.flush();
        }
        self.server_seq
    }

    fn flush(&mut self) {
        self.broadcasts_since_flush = 0;
        self.record = persistence::checkpoint(&self.record, self.record.document.clone(), self.server_seq);
        if let Err(err) = self.cold.save(&self.record) {
            warn!(session = %self.id, error = %err, "cold store flush failed");
        } else {
            Metrics::incr(&metrics::global().cold_store_flushes);
        }
    }

    /// Proactively snapshot a single peer whose acked `serverSeq` has fallen
    /// too far behind (§4.4.4). Run for the originating connection at the
    /// top of every frame, before that frame can widen the gap further.
    fn check_ack_gap(&mut self, connection_id: &str) {
        let threshold = document::ACK_GAP_THRESHOLD;
        let lagging = self
            .players
            .get(connection_id)
            .map(|p| self.server_seq.saturating_sub(p.ack) > threshold)
            .unwrap_or(false);
        if lagging {
            let snap = self.snapshot_for(connection_id);
            self.unicast(connection_id, snap);
            Metrics::incr(&metrics::global().snapshots_sent);
        }
    }

    fn handle_frame(&mut self, connection_id: &str, envelope: ClientEnvelope) {
        Metrics::incr(&metrics::global().messages_in);

        if let Some(player) = self.players.get_mut(connection_id) {
            player.info.last_message_at = now_millis();
            player.info.message_count += 1;
            if let Some(ack) = envelope.ack {
                player.ack = player.ack.max(ack);
            }
        }

        self.check_ack_gap(connection_id);

        let client_seq = envelope.seq;
        let is_mutating = envelope.message.is_mutating();

        if is_mutating && self.record.immutable {
            self.unicast(
                connection_id,
                ServerMessage::Error {
                    code: ErrorCode::SessionPublished,
                    message: "session is published and immutable".to_string(),
                },
            );
            Metrics::incr(&metrics::global().messages_rejected);
            return;
        }

        let sanitized = match validators::validate(envelope.message, self.lock_policy) {
            Ok(msg) => msg,
            Err(err) => {
                Metrics::incr(&metrics::global().messages_rejected);
                warn!(session = %self.id, connection = %connection_id, error = %err, "dropping structurally invalid message");
                return;
            }
        };

        match sanitized {
            ClientMessage::ClockSyncRequest { client_time } => {
                self.unicast(
                    connection_id,
                    ServerMessage::ClockSyncResponse {
                        client_time,
                        server_time: now_millis(),
                    },
                );
            }
            ClientMessage::StateHash { hash: client_hash } => {
                let server_hash = hash::hash(&self.record.document);
                if server_hash == client_hash {
                    self.unicast(connection_id, ServerMessage::StateHashMatch);
                } else {
                    Metrics::incr(&metrics::global().hash_mismatches);
                    self.unicast(
                        connection_id,
                        ServerMessage::StateMismatch { server_hash },
                    );
                }
            }
            ClientMessage::RequestSnapshot => {
                let snap = self.snapshot_for(connection_id);
                self.unicast(connection_id, snap);
                Metrics::incr(&metrics::global().snapshots_sent);
            }
            ClientMessage::CursorMove { position } => {
                if let Some(player) = self.players.get(connection_id) {
                    let msg = ServerMessage::CursorMoved {
                        player_id: connection_id.to_string(),
                        position,
                        color: player.info.color.clone(),
                        name: player.info.name.clone(),
                    };
                    self.broadcast(msg, Some(connection_id));
                }
            }
            ClientMessage::Play => {
                self.playing.insert(connection_id.to_string());
                let msg = ServerMessage::PlaybackStarted {
                    player_id: connection_id.to_string(),
                    start_time: now_millis(),
                    tempo: self.record.document.tempo,
                };
                self.broadcast(msg, None);
            }
            ClientMessage::Stop => {
                self.playing.remove(connection_id);
                let msg = ServerMessage::PlaybackStopped {
                    player_id: connection_id.to_string(),
                };
                self.broadcast(msg, None);
            }
            ClientMessage::SetSessionName { name } => {
                self.record.name = name.clone();
                self.broadcast(
                    ServerMessage::SessionNameChanged {
                        name,
                        player_id: connection_id.to_string(),
                    },
                    None,
                );
            }
            other => {
                if let Some(msg) =
                    apply_mutation(&mut self.record.document, other, connection_id, client_seq)
                {
                    self.record.document.version += 1;
                    self.hot.put(&self.id, self.record.document.clone());
                    let seq = self.next_seq();
                    let msg = stamp_seq(msg, seq);
                    self.broadcast(msg, None);
                }
            }
        }
    }
}

/// Stamp the freshly-minted `serverSeq` onto a confirmation message built
/// by [`apply_mutation`], which always leaves `seq` as `0` as a
/// placeholder.
fn stamp_seq(msg: ServerMessage, seq: u64) -> ServerMessage {
    use ServerMessage::*;
    match msg {
        StepToggled { track_id, step, value, player_id, client_seq, .. } => {
            StepToggled { track_id, step, value, player_id, seq, client_seq }
        }
        TempoChanged { tempo, player_id, client_seq, .. } => TempoChanged { tempo, player_id, seq, client_seq },
        SwingChanged { swing, player_id, client_seq, .. } => SwingChanged { swing, player_id, seq, client_seq },
        TrackMuted { track_id, muted, player_id, client_seq, .. } => {
            TrackMuted { track_id, muted, player_id, seq, client_seq }
        }
        TrackSoloed { track_id, soloed, player_id, client_seq, .. } => {
            TrackSoloed { track_id, soloed, player_id, seq, client_seq }
        }
        ParameterLockSet { track_id, step, lock, player_id, client_seq, .. } => {
            ParameterLockSet { track_id, step, lock, player_id, seq, client_seq }
        }
        TrackAdded { track, player_id, client_seq, .. } => TrackAdded { track, player_id, seq, client_seq },
        TrackDeleted { track_id, player_id, client_seq, .. } => TrackDeleted { track_id, player_id, seq, client_seq },
        TrackCleared { track_id, player_id, client_seq, .. } => TrackCleared { track_id, player_id, seq, client_seq },
        SequenceCopied { from_track_id, to_track_id, player_id, client_seq, .. } => {
            SequenceCopied { from_track_id, to_track_id, player_id, seq, client_seq }
        }
        SequenceMoved { from_track_id, to_track_id, player_id, client_seq, .. } => {
            SequenceMoved { from_track_id, to_track_id, player_id, seq, client_seq }
        }
        TrackSampleSet { track_id, sample_id, name, player_id, client_seq, .. } => {
            TrackSampleSet { track_id, sample_id, name, player_id, seq, client_seq }
        }
        TrackVolumeSet { track_id, volume, player_id, client_seq, .. } => {
            TrackVolumeSet { track_id, volume, player_id, seq, client_seq }
        }
        TrackTransposeSet { track_id, transpose, player_id, client_seq, .. } => {
            TrackTransposeSet { track_id, transpose, player_id, seq, client_seq }
        }
        TrackStepCountSet { track_id, step_count, player_id, client_seq, .. } => {
            TrackStepCountSet { track_id, step_count, player_id, seq, client_seq }
        }
        TrackSwingSet { track_id, swing, player_id, client_seq, .. } => {
            TrackSwingSet { track_id, swing, player_id, seq, client_seq }
        }
        TrackNameSet { track_id, name, player_id, client_seq, .. } => {
            TrackNameSet { track_id, name, player_id, seq, client_seq }
        }
        TrackPlaybackModeSet { track_id, playback_mode, player_id, client_seq, .. } => {
            TrackPlaybackModeSet { track_id, playback_mode, player_id, seq, client_seq }
        }
        EffectsSet { effects, player_id, client_seq, .. } => EffectsSet { effects, player_id, seq, client_seq },
        ScaleSet { scale, player_id, client_seq, .. } => ScaleSet { scale, player_id, seq, client_seq },
        FmParamsSet { track_id, fm_params, player_id, client_seq, .. } => {
            FmParamsSet { track_id, fm_params, player_id, seq, client_seq }
        }
        StepsBatchCleared { track_id, steps, player_id, client_seq, .. } => {
            StepsBatchCleared { track_id, steps, player_id, seq, client_seq }
        }
        ParameterLocksBatchSet { track_id, locks, player_id, client_seq, .. } => {
            ParameterLocksBatchSet { track_id, locks, player_id, seq, client_seq }
        }
        LoopRegionSet { region, player_id, client_seq, .. } => LoopRegionSet { region, player_id, seq, client_seq },
        TracksReordered { from_index, to_index, player_id, client_seq, .. } => {
            TracksReordered { from_index, to_index, player_id, seq, client_seq }
        }
        PatternRotated { track_id, direction, player_id, client_seq, .. } => {
            PatternRotated { track_id, direction, player_id, seq, client_seq }
        }
        PatternInverted { track_id, player_id, client_seq, .. } => {
            PatternInverted { track_id, player_id, seq, client_seq }
        }
        PatternReversed { track_id, player_id, client_seq, .. } => {
            PatternReversed { track_id, player_id, seq, client_seq }
        }
        PatternMirrored { track_id, direction, player_id, client_seq, .. } => {
            PatternMirrored { track_id, direction, player_id, seq, client_seq }
        }
        PatternEuclideanFilled { track_id, hits, player_id, client_seq, .. } => {
            PatternEuclideanFilled { track_id, hits, player_id, seq, client_seq }
        }
        other => other,
    }
}

fn find_track_mut<'a>(doc: &'a mut SessionDocument, id: &str) -> Option<&'a mut Track> {
    doc.tracks.iter_mut().find(|t| t.id == id)
}

/// Apply a sanitized mutating message to the document, returning the
/// confirmation broadcast with `seq` left at `0` (filled in by
/// [`stamp_seq`] once the actor has minted one). Returns `None` when the
/// operation has no effect and should not be confirmed to peers.
///
/// `add_track` and `delete_track` always confirm even when the target id
/// already exists (add) or does not exist (delete) — a longstanding quirk
/// where the handler never checked for a no-op before broadcasting.
fn apply_mutation(
    doc: &mut SessionDocument,
    msg: ClientMessage,
    player_id: &str,
    client_seq: Option<u64>,
) -> Option<ServerMessage> {
    use ClientMessage::*;
    let player_id = player_id.to_string();

    let confirmed = match msg {
        ToggleStep { track_id, step } => {
            let track = find_track_mut(doc, &track_id)?;
            let value = !track.steps[step];
            track.steps[step] = value;
            ServerMessage::StepToggled { track_id, step, value, player_id, seq: 0, client_seq }
        }
        SetTempo { tempo } => {
            doc.tempo = tempo as u32;
            ServerMessage::TempoChanged { tempo: doc.tempo, player_id, seq: 0, client_seq }
        }
        SetSwing { swing } => {
            doc.swing = swing as u32;
            ServerMessage::SwingChanged { swing: doc.swing, player_id, seq: 0, client_seq }
        }
        MuteTrack { track_id, muted } => {
            let track = find_track_mut(doc, &track_id)?;
            track.muted = muted;
            ServerMessage::TrackMuted { track_id, muted, player_id, seq: 0, client_seq }
        }
        SoloTrack { track_id, soloed } => {
            let track = find_track_mut(doc, &track_id)?;
            track.soloed = soloed;
            ServerMessage::TrackSoloed { track_id, soloed, player_id, seq: 0, client_seq }
        }
        SetParameterLock { track_id, step, lock } => {
            let track = find_track_mut(doc, &track_id)?;
            track.parameter_locks[step] = lock;
            ServerMessage::ParameterLockSet { track_id, step, lock, player_id, seq: 0, client_seq }
        }
        AddTrack { track } => {
            if doc.tracks.iter().any(|t| t.id == track.id) {
                doc.tracks.retain(|t| t.id != track.id);
            }
            doc.tracks.push(track.clone());
            let (repaired, _) = document::repair(doc);
            *doc = repaired;
            ServerMessage::TrackAdded { track, player_id, seq: 0, client_seq }
        }
        DeleteTrack { track_id } => {
            doc.tracks.retain(|t| t.id != track_id);
            ServerMessage::TrackDeleted { track_id, player_id, seq: 0, client_seq }
        }
        ClearTrack { track_id } => {
            let track = find_track_mut(doc, &track_id)?;
            for step in track.steps.iter_mut() {
                *step = false;
            }
            for lock in track.parameter_locks.iter_mut() {
                *lock = None;
            }
            ServerMessage::TrackCleared { track_id, player_id, seq: 0, client_seq }
        }
        CopySequence { from_track_id, to_track_id } => {
            let from = doc.tracks.iter().find(|t| t.id == from_track_id)?.clone();
            let to = find_track_mut(doc, &to_track_id)?;
            to.steps = from.steps;
            to.parameter_locks = from.parameter_locks;
            to.step_count = from.step_count;
            ServerMessage::SequenceCopied { from_track_id, to_track_id, player_id, seq: 0, client_seq }
        }
        MoveSequence { from_track_id, to_track_id } => {
            let from_idx = doc.tracks.iter().position(|t| t.id == from_track_id)?;
            let moved_steps = doc.tracks[from_idx].steps.clone();
            let moved_locks = doc.tracks[from_idx].parameter_locks.clone();
            let moved_step_count = doc.tracks[from_idx].step_count;
            doc.tracks[from_idx].steps = vec![false; document::MAX_STEPS];
            doc.tracks[from_idx].parameter_locks = vec![None; document::MAX_STEPS];
            doc.tracks[from_idx].step_count = document::coerce_step_count(0);
            let to = find_track_mut(doc, &to_track_id)?;
            to.steps = moved_steps;
            to.parameter_locks = moved_locks;
            to.step_count = moved_step_count;
            ServerMessage::SequenceMoved { from_track_id, to_track_id, player_id, seq: 0, client_seq }
        }
        SetTrackSample { track_id, sample_id, name } => {
            let track = find_track_mut(doc, &track_id)?;
            track.sample_id = sample_id.clone();
            if let Some(name) = &name {
                track.name = name.clone();
            }
            ServerMessage::TrackSampleSet { track_id, sample_id, name, player_id, seq: 0, client_seq }
        }
        SetTrackVolume { track_id, volume } => {
            let track = find_track_mut(doc, &track_id)?;
            track.volume = volume;
            ServerMessage::TrackVolumeSet { track_id, volume, player_id, seq: 0, client_seq }
        }
        SetTrackTranspose { track_id, transpose } => {
            let track = find_track_mut(doc, &track_id)?;
            track.transpose = transpose as i32;
            ServerMessage::TrackTransposeSet { track_id, transpose: track.transpose, player_id, seq: 0, client_seq }
        }
        SetTrackStepCount { track_id, step_count } => {
            let track = find_track_mut(doc, &track_id)?;
            let clamped = step_count.clamp(0, document::MAX_STEPS as i64) as u32;
            track.step_count = document::coerce_step_count(clamped);
            let step_count = track.step_count;
            ServerMessage::TrackStepCountSet { track_id, step_count, player_id, seq: 0, client_seq }
        }
        SetTrackSwing { track_id, swing } => {
            let track = find_track_mut(doc, &track_id)?;
            track.swing = Some(swing as u32);
            ServerMessage::TrackSwingSet { track_id, swing: swing as u32, player_id, seq: 0, client_seq }
        }
        SetTrackName { track_id, name } => {
            let track = find_track_mut(doc, &track_id)?;
            track.name = name.clone();
            ServerMessage::TrackNameSet { track_id, name, player_id, seq: 0, client_seq }
        }
        SetTrackPlaybackMode { track_id, playback_mode } => {
            let track = find_track_mut(doc, &track_id)?;
            track.playback_mode = playback_mode;
            ServerMessage::TrackPlaybackModeSet { track_id, playback_mode, player_id, seq: 0, client_seq }
        }
        SetEffects { effects } => {
            doc.effects = Some(effects.clone());
            ServerMessage::EffectsSet { effects, player_id, seq: 0, client_seq }
        }
        SetScale { scale } => {
            doc.scale = scale.clone();
            ServerMessage::ScaleSet { scale, player_id, seq: 0, client_seq }
        }
        SetFmParams { track_id, fm_params } => {
            let track = find_track_mut(doc, &track_id)?;
            track.fm_params = Some(fm_params);
            ServerMessage::FmParamsSet { track_id, fm_params, player_id, seq: 0, client_seq }
        }
        BatchClearSteps { track_id, steps } => {
            let track = find_track_mut(doc, &track_id)?;
            for &step in &steps {
                if step < track.steps.len() {
                    track.steps[step] = false;
                    track.parameter_locks[step] = None;
                }
            }
            ServerMessage::StepsBatchCleared { track_id, steps, player_id, seq: 0, client_seq }
        }
        BatchSetParameterLocks { track_id, locks } => {
            let track = find_track_mut(doc, &track_id)?;
            for entry in &locks {
                if entry.step < track.parameter_locks.len() {
                    track.parameter_locks[entry.step] = entry.lock;
                }
            }
            ServerMessage::ParameterLocksBatchSet { track_id, locks, player_id, seq: 0, client_seq }
        }
        SetLoopRegion { region } => {
            doc.loop_region = region;
            ServerMessage::LoopRegionSet { region, player_id, seq: 0, client_seq }
        }
        ReorderTracks { from_index, to_index } => {
            if from_index >= doc.tracks.len() || to_index >= doc.tracks.len() {
                return None;
            }
            let track = doc.tracks.remove(from_index);
            doc.tracks.insert(to_index, track);
            ServerMessage::TracksReordered { from_index, to_index, player_id, seq: 0, client_seq }
        }
        RotatePattern { track_id, direction } => {
            let track = find_track_mut(doc, &track_id)?;
            track.rotate(direction);
            ServerMessage::PatternRotated { track_id, direction, player_id, seq: 0, client_seq }
        }
        InvertPattern { track_id } => {
            let track = find_track_mut(doc, &track_id)?;
            track.invert();
            ServerMessage::PatternInverted { track_id, player_id, seq: 0, client_seq }
        }
        ReversePattern { track_id } => {
            let track = find_track_mut(doc, &track_id)?;
            track.reverse();
            ServerMessage::PatternReversed { track_id, player_id, seq: 0, client_seq }
        }
        MirrorPattern { track_id, direction } => {
            let track = find_track_mut(doc, &track_id)?;
            track.mirror(direction);
            ServerMessage::PatternMirrored { track_id, direction, player_id, seq: 0, client_seq }
        }
        EuclideanFill { track_id, hits } => {
            let track = find_track_mut(doc, &track_id)?;
            track.euclidean_fill(hits);
            ServerMessage::PatternEuclideanFilled { track_id, hits, player_id, seq: 0, client_seq }
        }
        _ => return None,
    };
    Some(confirmed)
}

async fn run_actor(
    mut state: SessionActorState,
    mut rx: mpsc::Receiver<ActorCommand>,
    idle_timeout: Duration,
) {
    loop {
        let cmd = tokio::time::timeout(idle_timeout, rx.recv()).await;
        let cmd = match cmd {
            Ok(Some(cmd)) => cmd,
            Ok(None) => break,
            Err(_) => {
                if state.players.is_empty() {
                    info!(session = %state.id, "idle timeout, flushing and shutting down");
                    state.flush();
                    break;
                }
                continue;
            }
        };

        match cmd {
            ActorCommand::Connect { connection_id, tx, reply } => {
                if state.players.len() >= document::MAX_PLAYERS {
                    let _ = reply.send(Err("session is full".to_string()));
                    continue;
                }
                let identity = identity::identity_for(&connection_id);
                let info = PlayerInfo {
                    id: connection_id.clone(),
                    color: identity.color.to_string(),
                    animal: identity.animal.to_string(),
                    name: identity.name,
                    connected_at: now_millis(),
                    last_message_at: now_millis(),
                    message_count: 0,
                };
                state.players.insert(
                    connection_id.clone(),
                    PlayerState { info: info.clone(), tx, ack: state.server_seq },
                );
                let snap = state.snapshot_for(&connection_id);
                state.unicast(&connection_id, snap);
                state.broadcast(ServerMessage::PlayerJoined { player: info }, Some(&connection_id));
                let _ = reply.send(Ok(()));
            }
            ActorCommand::Frame { connection_id, envelope } => {
                state.handle_frame(&connection_id, envelope);
            }
            ActorCommand::Disconnect { connection_id } => {
                if state.players.remove(&connection_id).is_some() {
                    state.playing.remove(&connection_id);
                    state.broadcast(
                        ServerMessage::PlayerLeft { player_id: connection_id.clone() },
                        None,
                    );
                }
                if state.players.is_empty() {
                    state.flush();
                    state.hot.remove(&state.id);
                }
            }
            ActorCommand::GetRecord { reply } => {
                let _ = reply.send(state.record.clone());
            }
            ActorCommand::ReplaceDocument { document: new_doc, name, remix_origin, reply } => {
                let replaced_document = new_doc.is_some();
                if let Some(doc) = new_doc {
                    let (repaired, log) = document::repair(&doc);
                    if !log.is_empty() {
                        debug!(session = %state.id, ?log, "repaired document on REST replace");
                    }
                    state.record.document = repaired;
                    state.record.document.version += 1;
                    state.hot.put(&state.id, state.record.document.clone());
                }
                let renamed = name.is_some();
                if let Some(name) = name {
                    state.record.name = name;
                }
                if let Some((from_id, from_name)) = remix_origin {
                    state.record.remixed_from = Some(from_id);
                    state.record.remixed_from_name = Some(from_name);
                }
                state.flush();
                if replaced_document {
                    let snap = state.snapshot_for("rest-api");
                    state.broadcast(snap, None);
                } else if renamed {
                    state.broadcast(
                        ServerMessage::SessionNameChanged {
                            name: state.record.name.clone(),
                            player_id: "rest-api".to_string(),
                        },
                        None,
                    );
                }
                let _ = reply.send(state.record.clone());
            }
            ActorCommand::Publish { reply } => {
                if state.record.immutable {
                    let _ = reply.send(Err(AppError::SessionPublished));
                    continue;
                }
                let new_id = Uuid::new_v4().to_string();
                let mut new_record = SessionRecord::new(new_id.clone());
                new_record.name = state.record.name.clone();
                new_record.document = state.record.document.clone();
                new_record.immutable = true;
                state.hot.put(&new_id, new_record.document.clone());
                match state.cold.save(&new_record) {
                    Ok(()) => {
                        info!(session = %state.id, new_session = %new_id, "published new immutable session");
                        let _ = reply.send(Ok(new_record));
                    }
                    Err(err) => {
                        let _ = reply.send(Err(AppError::from(err)));
                    }
                }
            }
            ActorCommand::IncrementRemixCount { reply } => {
                state.record.remix_count += 1;
                state.flush();
                let _ = reply.send(state.record.clone());
            }
            ActorCommand::Shutdown => {
                state.flush();
                break;
            }
        }
    }

    metrics::global()
        .sessions_active
        .fetch_sub(1, std::sync::atomic::Ordering::Relaxed);
}

/// Spawn a new actor task for `record`, returning a handle to its command
/// channel. The caller is responsible for registering the handle in a
/// [`crate::registry::SessionRegistry`].
pub fn spawn(
    record: SessionRecord,
    hot: Arc<dyn HotStore>,
    cold: Arc<dyn ColdStore>,
    idle_timeout: Duration,
) -> ActorHandle {
    let (tx, rx) = mpsc::channel(256);
    let id = record.id.clone();
    hot.put(&id, record.document.clone());
    let state = SessionActorState {
        id,
        server_seq: record.server_seq,
        record,
        players: HashMap::new(),
        playing: std::collections::HashSet::new(),
        broadcasts_since_flush: 0,
        lock_policy: ParameterLockPolicy::default(),
        hot,
        cold,
    };
    Metrics::incr(&metrics::global().sessions_created);
    Metrics::incr(&metrics::global().sessions_active);
    tokio::spawn(run_actor(state, rx, idle_timeout));
    ActorHandle { tx }
}
