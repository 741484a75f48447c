//! Wire protocol (component C5): client/server message schemas and the
//! ack/seq bookkeeping fields layered around them.

use serde::{Deserialize, Serialize};

use crate::document::{
    Effects, FmParams, LoopRegion, MirrorDirection, ParameterLock, PlaybackMode, RotateDirection,
    Scale, SessionDocument, Track,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CursorPosition {
    pub x: f32,
    pub y: f32,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// A `{step, lock}` pair for `batch_set_parameter_locks`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepLock {
    pub step: usize,
    pub lock: Option<ParameterLock>,
}

/// Identity and connection bookkeeping for one peer (see §3 PlayerInfo).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerInfo {
    pub id: String,
    pub color: String,
    pub animal: String,
    pub name: String,
    pub connected_at: u64,
    pub last_message_at: u64,
    pub message_count: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    TooLarge,
    BadJson,
    SessionPublished,
    CapacityExhausted,
    Unauthorized,
    Internal,
}

/// Messages sent by a client over the WebSocket, before the `seq`/`ack`
/// envelope fields are applied (see [`ClientEnvelope`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    ToggleStep { track_id: String, step: usize },
    SetTempo { tempo: i64 },
    SetSwing { swing: i64 },
    MuteTrack { track_id: String, muted: bool },
    SoloTrack { track_id: String, soloed: bool },
    SetParameterLock {
        track_id: String,
        step: usize,
        lock: Option<ParameterLock>,
    },
    AddTrack { track: Track },
    DeleteTrack { track_id: String },
    ClearTrack { track_id: String },
    CopySequence { from_track_id: String, to_track_id: String },
    MoveSequence { from_track_id: String, to_track_id: String },
    SetTrackSample {
        track_id: String,
        sample_id: String,
        name: Option<String>,
    },
    SetTrackVolume { track_id: String, volume: f32 },
    SetTrackTranspose { track_id: String, transpose: i64 },
    SetTrackStepCount { track_id: String, step_count: i64 },
    SetTrackSwing { track_id: String, swing: i64 },
    SetTrackName { track_id: String, name: String },
    SetTrackPlaybackMode { track_id: String, playback_mode: PlaybackMode },
    SetEffects { effects: Effects },
    SetScale { scale: Option<Scale> },
    SetFmParams { track_id: String, fm_params: FmParams },
    BatchClearSteps { track_id: String, steps: Vec<usize> },
    BatchSetParameterLocks { track_id: String, locks: Vec<StepLock> },
    SetLoopRegion { region: Option<LoopRegion> },
    ReorderTracks { from_index: usize, to_index: usize },
    RotatePattern { track_id: String, direction: RotateDirection },
    InvertPattern { track_id: String },
    ReversePattern { track_id: String },
    MirrorPattern { track_id: String, direction: MirrorDirection },
    EuclideanFill { track_id: String, hits: usize },
    SetSessionName { name: String },

    // Non-mutating.
    ClockSyncRequest { client_time: u64 },
    StateHash { hash: String },
    RequestSnapshot,
    CursorMove { position: CursorPosition },
    Play,
    Stop,
}

impl ClientMessage {
    /// Message types gated by session immutability and required to be kept
    /// in sync with the centralized check in `SessionActorState` (§4.4.3).
    pub fn is_mutating(&self) -> bool {
        !matches!(
            self,
            ClientMessage::ClockSyncRequest { .. }
                | ClientMessage::StateHash { .. }
                | ClientMessage::RequestSnapshot
                | ClientMessage::CursorMove { .. }
                | ClientMessage::Play
                | ClientMessage::Stop
        )
    }

    /// True for mutations that touch `SessionDocument` and therefore need a
    /// fresh `serverSeq` on their broadcast. `set_session_name` is mutating
    /// (gated by immutability) but does not touch the document, so its
    /// broadcast carries no `seq` (§4.5).
    pub fn carries_server_seq(&self) -> bool {
        self.is_mutating() && !matches!(self, ClientMessage::SetSessionName { .. })
    }
}

/// The envelope every client frame is wrapped in: the typed message plus
/// the per-connection `clientSeq` (named `seq` on the wire) and the
/// highest contiguous `serverSeq` the client has observed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientEnvelope {
    #[serde(flatten)]
    pub message: ClientMessage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seq: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ack: Option<u64>,
}

/// Messages broadcast by the server. Mutating variants carry `seq` and,
/// when they confirm an originating client's optimistic edit,
/// `client_seq`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Snapshot {
        state: SessionDocument,
        players: Vec<PlayerInfo>,
        player_id: String,
        immutable: bool,
        snapshot_timestamp: u64,
        server_seq: u64,
        playing_player_ids: Vec<String>,
    },

    StepToggled {
        track_id: String,
        step: usize,
        value: bool,
        player_id: String,
        seq: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        client_seq: Option<u64>,
    },
    TempoChanged {
        tempo: u32,
        player_id: String,
        seq: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        client_seq: Option<u64>,
    },
    SwingChanged {
        swing: u32,
        player_id: String,
        seq: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        client_seq: Option<u64>,
    },
    TrackMuted {
        track_id: String,
        muted: bool,
        player_id: String,
        seq: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        client_seq: Option<u64>,
    },
    TrackSoloed {
        track_id: String,
        soloed: bool,
        player_id: String,
        seq: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        client_seq: Option<u64>,
    },
    ParameterLockSet {
        track_id: String,
        step: usize,
        lock: Option<ParameterLock>,
        player_id: String,
        seq: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        client_seq: Option<u64>,
    },
    TrackAdded {
        track: Track,
        player_id: String,
        seq: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        client_seq: Option<u64>,
    },
    TrackDeleted {
        track_id: String,
        player_id: String,
        seq: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        client_seq: Option<u64>,
    },
    TrackCleared {
        track_id: String,
        player_id: String,
        seq: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        client_seq: Option<u64>,
    },
    SequenceCopied {
        from_track_id: String,
        to_track_id: String,
        player_id: String,
        seq: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        client_seq: Option<u64>,
    },
    SequenceMoved {
        from_track_id: String,
        to_track_id: String,
        player_id: String,
        seq: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        client_seq: Option<u64>,
    },
    TrackSampleSet {
        track_id: String,
        sample_id: String,
        name: Option<String>,
        player_id: String,
        seq: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        client_seq: Option<u64>,
    },
    TrackVolumeSet {
        track_id: String,
        volume: f32,
        player_id: String,
        seq: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        client_seq: Option<u64>,
    },
    TrackTransposeSet {
        track_id: String,
        transpose: i32,
        player_id: String,
        seq: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        client_seq: Option<u64>,
    },
    TrackStepCountSet {
        track_id: String,
        step_count: u32,
        player_id: String,
        seq: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        client_seq: Option<u64>,
    },
    TrackSwingSet {
        track_id: String,
        swing: u32,
        player_id: String,
        seq: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        client_seq: Option<u64>,
    },
    TrackNameSet {
        track_id: String,
        name: String,
        player_id: String,
        seq: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        client_seq: Option<u64>,
    },
    TrackPlaybackModeSet {
        track_id: String,
        playback_mode: PlaybackMode,
        player_id: String,
        seq: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        client_seq: Option<u64>,
    },
    EffectsSet {
        effects: Effects,
        player_id: String,
        seq: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        client_seq: Option<u64>,
    },
    ScaleSet {
        scale: Option<Scale>,
        player_id: String,
        seq: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        client_seq: Option<u64>,
    },
    FmParamsSet {
        track_id: String,
        fm_params: FmParams,
        player_id: String,
        seq: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        client_seq: Option<u64>,
    },
    StepsBatchCleared {
        track_id: String,
        steps: Vec<usize>,
        player_id: String,
        seq: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        client_seq: Option<u64>,
    },
    ParameterLocksBatchSet {
        track_id: String,
        locks: Vec<StepLock>,
        player_id: String,
        seq: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        client_seq: Option<u64>,
    },
    LoopRegionSet {
        region: Option<LoopRegion>,
        player_id: String,
        seq: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        client_seq: Option<u64>,
    },
    TracksReordered {
        from_index: usize,
        to_index: usize,
        player_id: String,
        seq: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        client_seq: Option<u64>,
    },
    PatternRotated {
        track_id: String,
        direction: RotateDirection,
        player_id: String,
        seq: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        client_seq: Option<u64>,
    },
    PatternInverted {
        track_id: String,
        player_id: String,
        seq: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        client_seq: Option<u64>,
    },
    PatternReversed {
        track_id: String,
        player_id: String,
        seq: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        client_seq: Option<u64>,
    },
    PatternMirrored {
        track_id: String,
        direction: MirrorDirection,
        player_id: String,
        seq: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        client_seq: Option<u64>,
    },
    PatternEuclideanFilled {
        track_id: String,
        hits: usize,
        player_id: String,
        seq: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        client_seq: Option<u64>,
    },

    // Non-mutating: never carry `seq`.
    SessionNameChanged { name: String, player_id: String },
    PlayerJoined { player: PlayerInfo },
    PlayerLeft { player_id: String },
    PlaybackStarted { player_id: String, start_time: u64, tempo: u32 },
    PlaybackStopped { player_id: String },
    StateHashMatch,
    StateMismatch { server_hash: String },
    ClockSyncResponse { client_time: u64, server_time: u64 },
    CursorMoved {
        player_id: String,
        position: CursorPosition,
        color: String,
        name: String,
    },
    Error { code: ErrorCode, message: String },
}

impl ServerMessage {
    /// I-6: only these ever carry `seq`; verified directly against the
    /// serialized JSON in tests rather than trusted from construction.
    pub fn server_seq(&self) -> Option<u64> {
        match self {
            ServerMessage::StepToggled { seq, .. }
            | ServerMessage::TempoChanged { seq, .. }
            | ServerMessage::SwingChanged { seq, .. }
            | ServerMessage::TrackMuted { seq, .. }
            | ServerMessage::TrackSoloed { seq, .. }
            | ServerMessage::ParameterLockSet { seq, .. }
            | ServerMessage::TrackAdded { seq, .. }
            | ServerMessage::TrackDeleted { seq, .. }
            | ServerMessage::TrackCleared { seq, .. }
            | ServerMessage::SequenceCopied { seq, .. }
            | ServerMessage::SequenceMoved { seq, .. }
            | ServerMessage::TrackSampleSet { seq, .. }
            | ServerMessage::TrackVolumeSet { seq, .. }
            | ServerMessage::TrackTransposeSet { seq, .. }
            | ServerMessage::TrackStepCountSet { seq, .. }
            | ServerMessage::TrackSwingSet { seq, .. }
            | ServerMessage::TrackNameSet { seq, .. }
            | ServerMessage::TrackPlaybackModeSet { seq, .. }
            | ServerMessage::EffectsSet { seq, .. }
            | ServerMessage::ScaleSet { seq, .. }
            | ServerMessage::FmParamsSet { seq, .. }
            | ServerMessage::StepsBatchCleared { seq, .. }
            | ServerMessage::ParameterLocksBatchSet { seq, .. }
            | ServerMessage::LoopRegionSet { seq, .. }
            | ServerMessage::TracksReordered { seq, .. }
            | ServerMessage::PatternRotated { seq, .. }
            | ServerMessage::PatternInverted { seq, .. }
            | ServerMessage::PatternReversed { seq, .. }
            | ServerMessage::PatternMirrored { seq, .. }
            | ServerMessage::PatternEuclideanFilled { seq, .. } => Some(*seq),
            _ => None,
        }
    }

    pub fn client_seq(&self) -> Option<u64> {
        match self {
            ServerMessage::StepToggled { client_seq, .. }
            | ServerMessage::TempoChanged { client_seq, .. }
            | ServerMessage::SwingChanged { client_seq, .. }
            | ServerMessage::TrackMuted { client_seq, .. }
            | ServerMessage::TrackSoloed { client_seq, .. }
            | ServerMessage::ParameterLockSet { client_seq, .. }
            | ServerMessage::TrackAdded { client_seq, .. }
            | ServerMessage::TrackDeleted { client_seq, .. }
            | ServerMessage::TrackCleared { client_seq, .. }
            | ServerMessage::SequenceCopied { client_seq, .. }
            | ServerMessage::SequenceMoved { client_seq, .. }
            | ServerMessage::TrackSampleSet { client_seq, .. }
            | ServerMessage::TrackVolumeSet { client_seq, .. }
            | ServerMessage::TrackTransposeSet { client_seq, .. }
            | ServerMessage::TrackStepCountSet { client_seq, .. }
            | ServerMessage::TrackSwingSet { client_seq, .. }
            | ServerMessage::TrackNameSet { client_seq, .. }
            | ServerMessage::TrackPlaybackModeSet { client_seq, .. }
            | ServerMessage::EffectsSet { client_seq, .. }
            | ServerMessage::ScaleSet { client_seq, .. }
            | ServerMessage::FmParamsSet { client_seq, .. }
            | ServerMessage::StepsBatchCleared { client_seq, .. }
            | ServerMessage::ParameterLocksBatchSet { client_seq, .. }
            | ServerMessage::LoopRegionSet { client_seq, .. }
            | ServerMessage::TracksReordered { client_seq, .. }
            | ServerMessage::PatternRotated { client_seq, .. }
            | ServerMessage::PatternInverted { client_seq, .. }
            | ServerMessage::PatternReversed { client_seq, .. }
            | ServerMessage::PatternMirrored { client_seq, .. }
            | ServerMessage::PatternEuclideanFilled { client_seq, .. } => *client_seq,
            _ => None,
        }
    }
}
