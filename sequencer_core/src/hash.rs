//! Canonical projection and convergence hash (component C3).
//!
//! Clients and the server must compute byte-identical canonical forms so
//! that [`hash`] can be used as a cheap divergence probe: a mismatch only
//! ever triggers a snapshot exchange, so collisions are harmless.

use serde::Serialize;

use crate::document::{ParameterLock, PlaybackMode, SessionDocument};

#[derive(Serialize)]
struct CanonicalTrack<'a> {
    id: &'a str,
    name: &'a str,
    #[serde(rename = "sampleId")]
    sample_id: &'a str,
    steps: &'a [bool],
    #[serde(rename = "parameterLocks")]
    parameter_locks: &'a [Option<ParameterLock>],
    volume: f32,
    transpose: i32,
    #[serde(rename = "stepCount")]
    step_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    swing: Option<u32>,
    #[serde(rename = "playbackMode")]
    playback_mode: PlaybackMode,
}

#[derive(Serialize)]
struct CanonicalDocument<'a> {
    tracks: Vec<CanonicalTrack<'a>>,
    tempo: u32,
    swing: u32,
}

/// Project a document onto the subset of fields that participate in
/// convergence hashing. `muted`, `soloed`, `version`, `effects`,
/// `loopRegion` and `scale` are intentionally excluded — see §4.3.
fn canonical(doc: &SessionDocument) -> CanonicalDocument<'_> {
    let tracks = doc
        .tracks
        .iter()
        .map(|t| {
            let active = t.step_count as usize;
            let active = active.min(t.steps.len());
            CanonicalTrack {
                id: &t.id,
                name: &t.name,
                sample_id: &t.sample_id,
                steps: &t.steps[..active],
                parameter_locks: &t.parameter_locks[..active.min(t.parameter_locks.len())],
                volume: t.volume,
                transpose: t.transpose,
                step_count: t.step_count,
                swing: t.swing,
                playback_mode: t.playback_mode,
            }
        })
        .collect();

    CanonicalDocument {
        tracks,
        tempo: doc.tempo,
        swing: doc.swing,
    }
}

/// Deterministic 32-bit rolling hash (shift-and-subtract, `h*31 + byte`)
/// over the canonical JSON projection, rendered as 8 lowercase hex chars.
pub fn hash(doc: &SessionDocument) -> String {
    let projection = canonical(doc);
    // CanonicalTrack/CanonicalDocument field order is fixed by declaration
    // order, so serde_json's output is deterministic across identical
    // canonical values.
    let json = serde_json::to_string(&projection).expect("canonical projection always serializes");
    format!("{:08x}", hash_str(&json))
}

fn hash_str(s: &str) -> u32 {
    let mut h: u32 = 0;
    for byte in s.bytes() {
        h = (h << 5).wrapping_sub(h).wrapping_add(byte as u32);
    }
    h
}

/// Same rolling hash, exposed for deriving deterministic identities from
/// arbitrary ids (see `identity::identity_for`).
pub fn hash_id(s: &str) -> u32 {
    hash_str(s)
}
