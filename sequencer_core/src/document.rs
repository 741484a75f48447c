//! Session document model and invariant repair (component C1).
//!
//! The document is the replicated state owned by one session actor. Every
//! accepted mutation must leave the document satisfying the invariants
//! checked by [`validate`]; [`repair`] restores them when a mutation (or a
//! document loaded from an older schema) would otherwise violate them.

use serde::{Deserialize, Serialize};

/// Fixed length of every track's step and parameter-lock arrays.
pub const MAX_STEPS: usize = 128;
/// Maximum number of tracks in a session.
pub const MAX_TRACKS: usize = 16;
/// Maximum concurrent peers per session.
pub const MAX_PLAYERS: usize = 10;
/// Maximum length, in bytes, of a single inbound WebSocket frame.
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024;
/// Maximum length of a track's display name.
pub const MAX_TRACK_NAME: usize = 64;
/// `serverSeq - ack` threshold past which a peer is proactively snapshotted.
pub const ACK_GAP_THRESHOLD: u64 = 50;
/// How many broadcasts elapse between persisted `serverSeq` checkpoints.
pub const SERVER_SEQ_FLUSH_INTERVAL: u64 = 100;

pub const TEMPO_RANGE: (u32, u32) = (60, 180);
pub const SWING_RANGE: (u32, u32) = (0, 100);
pub const TRANSPOSE_RANGE: (i32, i32) = (-24, 24);

/// Step counts a track may be set to; `set_track_step_count` coerces to the
/// nearest member of this set.
pub const ALLOWED_STEP_COUNTS: [u32; 9] = [4, 8, 12, 16, 24, 32, 64, 96, 128];

/// Delay-time musical divisions recognized by `set_effects`.
pub const VALID_DELAY_DIVISIONS: [&str; 6] = ["4n", "8n", "16n", "1/4", "1/8", "1/16"];
pub const DEFAULT_DELAY_DIVISION: &str = "8n";

/// The 12 pitch-class names accepted as a scale root.
pub const PITCH_CLASSES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

fn clamp_f32(v: f32, min: f32, max: f32) -> f32 {
    if !v.is_finite() {
        return min;
    }
    v.clamp(min, max)
}

fn clamp_u32(v: u32, min: u32, max: u32) -> u32 {
    v.clamp(min, max)
}

fn clamp_i32(v: i32, min: i32, max: i32) -> i32 {
    v.clamp(min, max)
}

fn nearest_allowed_step_count(v: u32) -> u32 {
    *ALLOWED_STEP_COUNTS
        .iter()
        .min_by_key(|&&allowed| (allowed as i64 - v as i64).abs())
        .unwrap()
}

/// Per-step pitch/volume/tie override for one track step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterLock {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pitch: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tie: Option<bool>,
}

impl ParameterLock {
    /// Clamp every present field into range; never clears a field on its own
    /// (the all-or-nothing rejection policy lives in `validators`).
    pub fn clamp(&self) -> ParameterLock {
        ParameterLock {
            pitch: self
                .pitch
                .map(|p| clamp_i32(p, TRANSPOSE_RANGE.0, TRANSPOSE_RANGE.1)),
            volume: self.volume.map(|v| clamp_f32(v, 0.0, 1.0)),
            tie: self.tie,
        }
    }

    fn all_finite(&self) -> bool {
        self.pitch.map(|p| (p as f32).is_finite()).unwrap_or(true)
            && self.volume.map(|v| v.is_finite()).unwrap_or(true)
    }
}

/// How a track advances through its steps during playback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackMode {
    Forward,
    Reverse,
    PingPong,
    Random,
}

impl Default for PlaybackMode {
    fn default() -> Self {
        PlaybackMode::Forward
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RotateDirection {
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MirrorDirection {
    LToR,
    RToL,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ModulationType {
    Sine,
    Square,
    Triangle,
    Sawtooth,
}

impl Default for ModulationType {
    fn default() -> Self {
        ModulationType::Sine
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FmParams {
    pub harmonicity: f32,
    pub modulation_index: f32,
    pub attack: f32,
    pub decay: f32,
    pub sustain: f32,
    pub release: f32,
    pub modulation_type: ModulationType,
}

impl Default for FmParams {
    fn default() -> Self {
        FmParams {
            harmonicity: 1.0,
            modulation_index: 2.0,
            attack: 0.01,
            decay: 0.1,
            sustain: 0.5,
            release: 0.5,
            modulation_type: ModulationType::Sine,
        }
    }
}

impl FmParams {
    pub fn clamp(&self) -> FmParams {
        FmParams {
            harmonicity: clamp_f32(self.harmonicity, 0.5, 10.0),
            modulation_index: clamp_f32(self.modulation_index, 0.0, 20.0),
            attack: clamp_f32(self.attack, 0.001, 5.0),
            decay: clamp_f32(self.decay, 0.001, 5.0),
            sustain: clamp_f32(self.sustain, 0.0, 1.0),
            release: clamp_f32(self.release, 0.001, 10.0),
            modulation_type: self.modulation_type,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reverb {
    pub decay: f32,
    pub wet: f32,
}

impl Default for Reverb {
    fn default() -> Self {
        Reverb { decay: 1.5, wet: 0.3 }
    }
}

impl Reverb {
    pub fn clamp(&self) -> Reverb {
        Reverb {
            decay: clamp_f32(self.decay, 0.1, 10.0),
            wet: clamp_f32(self.wet, 0.0, 1.0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Delay {
    pub time: String,
    pub feedback: f32,
    pub wet: f32,
}

impl Default for Delay {
    fn default() -> Self {
        Delay {
            time: DEFAULT_DELAY_DIVISION.to_string(),
            feedback: 0.3,
            wet: 0.3,
        }
    }
}

impl Delay {
    pub fn clamp(&self) -> Delay {
        let time = if VALID_DELAY_DIVISIONS.contains(&self.time.as_str()) {
            self.time.clone()
        } else {
            DEFAULT_DELAY_DIVISION.to_string()
        };
        Delay {
            time,
            feedback: clamp_f32(self.feedback, 0.0, 0.95),
            wet: clamp_f32(self.wet, 0.0, 1.0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chorus {
    pub frequency: f32,
    pub depth: f32,
    pub wet: f32,
}

impl Default for Chorus {
    fn default() -> Self {
        Chorus {
            frequency: 1.5,
            depth: 0.5,
            wet: 0.3,
        }
    }
}

impl Chorus {
    pub fn clamp(&self) -> Chorus {
        Chorus {
            frequency: clamp_f32(self.frequency, 0.1, 10.0),
            depth: clamp_f32(self.depth, 0.0, 1.0),
            wet: clamp_f32(self.wet, 0.0, 1.0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Distortion {
    pub amount: f32,
    pub wet: f32,
}

impl Default for Distortion {
    fn default() -> Self {
        Distortion { amount: 0.3, wet: 0.3 }
    }
}

impl Distortion {
    pub fn clamp(&self) -> Distortion {
        Distortion {
            amount: clamp_f32(self.amount, 0.0, 1.0),
            wet: clamp_f32(self.wet, 0.0, 1.0),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Effects {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reverb: Option<Reverb>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay: Option<Delay>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chorus: Option<Chorus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distortion: Option<Distortion>,
    #[serde(default)]
    pub bypass: bool,
}

impl Effects {
    pub fn clamp(&self) -> Effects {
        Effects {
            reverb: self.reverb.as_ref().map(Reverb::clamp),
            delay: self.delay.as_ref().map(Delay::clamp),
            chorus: self.chorus.as_ref().map(Chorus::clamp),
            distortion: self.distortion.as_ref().map(Distortion::clamp),
            bypass: self.bypass,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoopRegion {
    pub start: u32,
    pub end: u32,
}

impl LoopRegion {
    /// Normalize so `start <= end` and both sit inside `[0, MAX_STEPS)`.
    pub fn normalize(&self) -> LoopRegion {
        let max = (MAX_STEPS - 1) as u32;
        let start = self.start.min(max);
        let end = self.end.min(max);
        if start <= end {
            LoopRegion { start, end }
        } else {
            LoopRegion { start: end, end: start }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scale {
    pub root: String,
    pub scale_id: String,
    #[serde(default)]
    pub locked: bool,
}

impl Scale {
    pub fn sanitize(&self) -> Scale {
        let root = if PITCH_CLASSES.contains(&self.root.as_str()) {
            self.root.clone()
        } else {
            "C".to_string()
        };
        Scale {
            root,
            scale_id: self.scale_id.clone(),
            locked: self.locked,
        }
    }
}

/// One track: a sample selector, a fixed-length step pattern and
/// per-step parameter locks, plus per-track mix/performance settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    pub id: String,
    pub name: String,
    pub sample_id: String,
    pub steps: Vec<bool>,
    pub parameter_locks: Vec<Option<ParameterLock>>,
    pub volume: f32,
    pub transpose: i32,
    pub step_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub swing: Option<u32>,
    #[serde(default)]
    pub muted: bool,
    #[serde(default)]
    pub soloed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fm_params: Option<FmParams>,
    #[serde(default)]
    pub playback_mode: PlaybackMode,
}

impl Track {
    pub fn new(id: impl Into<String>, sample_id: impl Into<String>) -> Track {
        Track {
            id: id.into(),
            name: "Track".to_string(),
            sample_id: sample_id.into(),
            steps: vec![false; MAX_STEPS],
            parameter_locks: vec![None; MAX_STEPS],
            volume: 1.0,
            transpose: 0,
            step_count: 16,
            swing: None,
            muted: false,
            soloed: false,
            fm_params: None,
            playback_mode: PlaybackMode::Forward,
        }
    }

    /// Normalize array lengths, clamp numerics, coerce enums. Idempotent:
    /// calling `repair` on an already-repaired track yields no changes and
    /// an empty log.
    fn repair(&self, log: &mut Vec<String>) -> Track {
        let mut steps = self.steps.clone();
        if steps.len() != MAX_STEPS {
            log.push(format!("track {}: normalized steps length", self.id));
            steps.resize(MAX_STEPS, false);
        }

        let mut parameter_locks = self.parameter_locks.clone();
        if parameter_locks.len() != MAX_STEPS {
            log.push(format!(
                "track {}: normalized parameterLocks length",
                self.id
            ));
            parameter_locks.resize(MAX_STEPS, None);
        }

        let name = if self.name.is_empty() {
            log.push(format!("track {}: defaulted empty name", self.id));
            "Track".to_string()
        } else if self.name.chars().count() > MAX_TRACK_NAME {
            log.push(format!("track {}: truncated name", self.id));
            self.name.chars().take(MAX_TRACK_NAME).collect()
        } else {
            self.name.clone()
        };

        let volume = clamp_f32(self.volume, 0.0, 1.0);
        if volume != self.volume {
            log.push(format!("track {}: clamped volume", self.id));
        }

        let transpose = clamp_i32(self.transpose, TRANSPOSE_RANGE.0, TRANSPOSE_RANGE.1);
        if transpose != self.transpose {
            log.push(format!("track {}: clamped transpose", self.id));
        }

        let step_count = if ALLOWED_STEP_COUNTS.contains(&self.step_count) {
            self.step_count
        } else {
            log.push(format!("track {}: coerced stepCount", self.id));
            nearest_allowed_step_count(self.step_count)
        };

        let swing = self.swing.map(|s| {
            let clamped = clamp_u32(s, SWING_RANGE.0, SWING_RANGE.1);
            if clamped != s {
                log.push(format!("track {}: clamped swing", self.id));
            }
            clamped
        });

        let fm_params = self.fm_params.map(|p| p.clamp());

        Track {
            id: self.id.clone(),
            name,
            sample_id: self.sample_id.clone(),
            steps,
            parameter_locks,
            volume,
            transpose,
            step_count,
            swing,
            muted: self.muted,
            soloed: self.soloed,
            fm_params,
            playback_mode: self.playback_mode,
        }
    }

    fn active_len(&self) -> usize {
        (self.step_count as usize).min(self.steps.len())
    }

    /// Rotate the active step prefix by one position, wrapping. Parameter
    /// locks move with their steps.
    pub fn rotate(&mut self, direction: RotateDirection) {
        let n = self.active_len();
        if n < 2 {
            return;
        }
        match direction {
            RotateDirection::Left => {
                self.steps[..n].rotate_left(1);
                self.parameter_locks[..n].rotate_left(1);
            }
            RotateDirection::Right => {
                self.steps[..n].rotate_right(1);
                self.parameter_locks[..n].rotate_right(1);
            }
        }
    }

    /// Flip every step in the active prefix. A step that becomes inactive
    /// has its parameter lock cleared, since a lock on a step that is off
    /// is meaningless.
    pub fn invert(&mut self) {
        let n = self.active_len();
        for i in 0..n {
            let value = !self.steps[i];
            self.steps[i] = value;
            if !value {
                self.parameter_locks[i] = None;
            }
        }
    }

    /// Reverse the active step prefix in place.
    pub fn reverse(&mut self) {
        let n = self.active_len();
        self.steps[..n].reverse();
        self.parameter_locks[..n].reverse();
    }

    /// Mirror the first half of the active prefix onto the second half (or
    /// vice versa), producing a palindromic-ish pattern. `LToR` copies the
    /// left half rightward; `RToL` copies the right half leftward.
    pub fn mirror(&mut self, direction: MirrorDirection) {
        let n = self.active_len();
        if n < 2 {
            return;
        }
        let half = n / 2;
        match direction {
            MirrorDirection::LToR => {
                for i in 0..half {
                    let src = self.steps[i];
                    self.steps[n - 1 - i] = src;
                    self.parameter_locks[n - 1 - i] = self.parameter_locks[i];
                }
            }
            MirrorDirection::RToL => {
                for i in 0..half {
                    let src = self.steps[n - 1 - i];
                    self.steps[i] = src;
                    self.parameter_locks[i] = self.parameter_locks[n - 1 - i];
                }
            }
        }
    }

    /// Replace the active step prefix with an even (Euclidean/Bjorklund)
    /// distribution of `hits` pulses, clamped to `[0, activeLen]`.
    /// Parameter locks in the active range are cleared: a redistribution
    /// of hits has no sensible mapping from old step positions to new ones.
    pub fn euclidean_fill(&mut self, hits: usize) {
        let n = self.active_len();
        if n == 0 {
            return;
        }
        let hits = hits.min(n);
        for i in 0..n {
            self.steps[i] = false;
            self.parameter_locks[i] = None;
        }
        if hits == 0 {
            return;
        }
        // Bresenham-style even spacing: step i is a hit iff it is the
        // closest slot to a multiple of n/hits.
        let mut bucket = 0usize;
        for i in 0..n {
            bucket += hits;
            if bucket >= n {
                bucket -= n;
                self.steps[i] = true;
            }
        }
    }
}

/// The replicated session state owned by one actor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionDocument {
    pub tracks: Vec<Track>,
    pub tempo: u32,
    pub swing: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effects: Option<Effects>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loop_region: Option<LoopRegion>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<Scale>,
    #[serde(default)]
    pub version: u64,
}

impl Default for SessionDocument {
    fn default() -> Self {
        SessionDocument {
            tracks: Vec::new(),
            tempo: 120,
            swing: 0,
            effects: None,
            loop_region: None,
            scale: None,
            version: 0,
        }
    }
}

/// Outcome of [`validate`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationReport {
    pub valid: bool,
    pub violations: Vec<String>,
    pub warnings: Vec<String>,
}

/// Check the document's invariants without mutating it. Out-of-range
/// numerics are reported as warnings (they are auto-repaired, never
/// rejected); structural problems (duplicate ids, oversized arrays) are
/// reported as violations.
pub fn validate(doc: &SessionDocument) -> ValidationReport {
    let mut violations = Vec::new();
    let mut warnings = Vec::new();

    if doc.tracks.len() > MAX_TRACKS {
        violations.push(format!(
            "track count {} exceeds MAX_TRACKS {}",
            doc.tracks.len(),
            MAX_TRACKS
        ));
    }

    let mut seen = std::collections::HashSet::new();
    for track in &doc.tracks {
        if !seen.insert(track.id.clone()) {
            violations.push(format!("duplicate track id {}", track.id));
        }
        if track.steps.len() != MAX_STEPS {
            violations.push(format!("track {} steps length != {}", track.id, MAX_STEPS));
        }
        if track.parameter_locks.len() != MAX_STEPS {
            violations.push(format!(
                "track {} parameterLocks length != {}",
                track.id, MAX_STEPS
            ));
        }
        if !ALLOWED_STEP_COUNTS.contains(&track.step_count) {
            warnings.push(format!("track {} stepCount not in allowed set", track.id));
        }
        if !(0.0..=1.0).contains(&track.volume) || !track.volume.is_finite() {
            warnings.push(format!("track {} volume out of range", track.id));
        }
    }

    if !(TEMPO_RANGE.0..=TEMPO_RANGE.1).contains(&doc.tempo) {
        warnings.push("tempo out of range".to_string());
    }
    if !(SWING_RANGE.0..=SWING_RANGE.1).contains(&doc.swing) {
        warnings.push("swing out of range".to_string());
    }
    if let Some(region) = &doc.loop_region {
        if region.start > region.end {
            warnings.push("loopRegion not normalized".to_string());
        }
    }

    ValidationReport {
        valid: violations.is_empty(),
        violations,
        warnings,
    }
}

/// Restore all invariants, returning the repaired document and a log of
/// what was changed. `repair(repair(d).0) == (repair(d).0, vec![])`.
pub fn repair(doc: &SessionDocument) -> (SessionDocument, Vec<String>) {
    let mut log = Vec::new();

    let mut seen = std::collections::HashSet::new();
    let mut tracks: Vec<Track> = Vec::new();
    for track in &doc.tracks {
        if !seen.insert(track.id.clone()) {
            log.push(format!("dropped duplicate track id {}", track.id));
            continue;
        }
        tracks.push(track.repair(&mut log));
    }
    if tracks.len() > MAX_TRACKS {
        log.push(format!("truncated tracks to {}", MAX_TRACKS));
        tracks.truncate(MAX_TRACKS);
    }

    let tempo = clamp_u32(doc.tempo, TEMPO_RANGE.0, TEMPO_RANGE.1);
    if tempo != doc.tempo {
        log.push("clamped tempo".to_string());
    }

    let swing = clamp_u32(doc.swing, SWING_RANGE.0, SWING_RANGE.1);
    if swing != doc.swing {
        log.push("clamped swing".to_string());
    }

    let loop_region = doc.loop_region.map(|r| {
        let normalized = r.normalize();
        if normalized != r {
            log.push("normalized loopRegion".to_string());
        }
        normalized
    });

    let effects = doc.effects.as_ref().map(|e| e.clamp());
    let scale = doc.scale.as_ref().map(|s| s.sanitize());

    (
        SessionDocument {
            tracks,
            tempo,
            swing,
            effects,
            loop_region,
            scale,
            version: doc.version,
        },
        log,
    )
}

/// Coerce an arbitrary step count to the nearest member of
/// [`ALLOWED_STEP_COUNTS`], for validators and handlers that set a track's
/// `stepCount` outside of a full-document [`repair`] pass.
pub fn coerce_step_count(v: u32) -> u32 {
    nearest_allowed_step_count(v)
}

/// Canonical key used to check whether a parameter lock's present fields
/// are all finite, for validators implementing the all-or-nothing policy.
pub fn parameter_lock_all_finite(lock: &ParameterLock) -> bool {
    lock.all_finite()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_document_is_valid() {
        let doc = SessionDocument::default();
        let report = validate(&doc);
        assert!(report.valid);
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn repair_normalizes_step_arrays() {
        let mut doc = SessionDocument::default();
        let mut track = Track::new("t1", "kick");
        track.steps = vec![true; 4];
        track.parameter_locks = vec![None; 200];
        doc.tracks.push(track);

        let (repaired, log) = repair(&doc);
        assert_eq!(repaired.tracks[0].steps.len(), MAX_STEPS);
        assert_eq!(repaired.tracks[0].parameter_locks.len(), MAX_STEPS);
        assert!(!log.is_empty());

        let (twice, log2) = repair(&repaired);
        assert_eq!(twice, repaired);
        assert!(log2.is_empty());
    }

    #[test]
    fn repair_drops_duplicate_ids_keeping_first() {
        let mut doc = SessionDocument::default();
        let mut a = Track::new("dup", "kick");
        a.name = "first".to_string();
        let mut b = Track::new("dup", "snare");
        b.name = "second".to_string();
        doc.tracks.push(a);
        doc.tracks.push(b);

        let (repaired, _) = repair(&doc);
        assert_eq!(repaired.tracks.len(), 1);
        assert_eq!(repaired.tracks[0].name, "first");
    }

    #[test]
    fn repair_truncates_excess_tracks() {
        let mut doc = SessionDocument::default();
        for i in 0..20 {
            doc.tracks.push(Track::new(format!("t{i}"), "kick"));
        }
        let (repaired, log) = repair(&doc);
        assert_eq!(repaired.tracks.len(), MAX_TRACKS);
        assert!(log.iter().any(|l| l.contains("truncated tracks")));
    }

    #[test]
    fn repair_coerces_step_count_to_nearest_allowed() {
        let mut doc = SessionDocument::default();
        let mut track = Track::new("t1", "kick");
        track.step_count = 20;
        doc.tracks.push(track);
        let (repaired, _) = repair(&doc);
        assert_eq!(repaired.tracks[0].step_count, 16);
    }

    #[test]
    fn repair_normalizes_loop_region() {
        let mut doc = SessionDocument::default();
        doc.loop_region = Some(LoopRegion { start: 10, end: 2 });
        let (repaired, log) = repair(&doc);
        assert_eq!(repaired.loop_region, Some(LoopRegion { start: 2, end: 10 }));
        assert!(log.iter().any(|l| l.contains("loopRegion")));
    }

    #[test]
    fn repair_clamps_out_of_range_tempo_and_swing() {
        let mut doc = SessionDocument::default();
        doc.tempo = 999;
        doc.swing = 999;
        let (repaired, _) = repair(&doc);
        assert_eq!(repaired.tempo, TEMPO_RANGE.1);
        assert_eq!(repaired.swing, SWING_RANGE.1);
    }

    #[test]
    fn rotate_moves_steps_and_locks_together() {
        let mut track = Track::new("t1", "kick");
        track.step_count = 4;
        track.steps[0] = true;
        track.parameter_locks[0] = Some(ParameterLock { pitch: Some(3), volume: None, tie: None });
        track.rotate(RotateDirection::Right);
        assert!(track.steps[1]);
        assert_eq!(track.parameter_locks[1].unwrap().pitch, Some(3));
        assert!(!track.steps[0]);
    }

    #[test]
    fn invert_flips_only_active_steps() {
        let mut track = Track::new("t1", "kick");
        track.step_count = 4;
        track.steps[5] = true;
        track.invert();
        assert!(track.steps[0]);
        assert!(track.steps[5], "step past active prefix must be untouched");
    }

    #[test]
    fn reverse_flips_active_prefix_order() {
        let mut track = Track::new("t1", "kick");
        track.step_count = 4;
        track.steps[0] = true;
        track.reverse();
        assert!(track.steps[3]);
        assert!(!track.steps[0]);
    }

    #[test]
    fn mirror_l_to_r_copies_left_half_rightward() {
        let mut track = Track::new("t1", "kick");
        track.step_count = 4;
        track.steps[0] = true;
        track.steps[1] = false;
        track.mirror(MirrorDirection::LToR);
        assert!(track.steps[3]);
        assert!(!track.steps[2]);
    }

    #[test]
    fn euclidean_fill_places_exact_hit_count() {
        let mut track = Track::new("t1", "kick");
        track.step_count = 8;
        track.euclidean_fill(3);
        let active = &track.steps[..8];
        assert_eq!(active.iter().filter(|&&s| s).count(), 3);
    }

    #[test]
    fn euclidean_fill_clamps_hits_to_active_length() {
        let mut track = Track::new("t1", "kick");
        track.step_count = 4;
        track.euclidean_fill(999);
        assert_eq!(track.steps[..4].iter().filter(|&&s| s).count(), 4);
    }
}
