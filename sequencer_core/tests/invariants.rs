//! Property tests for the document model's core invariants (§8 I-1..I-4,
//! I-7, R-1..R-3).

use proptest::prelude::*;
use sequencer_core::document::{self, ParameterLock, SessionDocument, Track, MAX_STEPS, SWING_RANGE, TEMPO_RANGE};
use sequencer_core::validators::{self, ParameterLockPolicy};
use sequencer_core::ClientMessage;

fn arb_track(id: &'static str) -> impl Strategy<Value = Track> {
    (
        any::<bool>(),
        proptest::collection::vec(any::<bool>(), MAX_STEPS),
        0u32..400,
        0.0f32..2.0,
        -50i32..50,
    )
        .prop_map(move |(muted, steps, step_count, volume, transpose)| {
            let mut t = Track::new(id, "kick");
            t.muted = muted;
            t.steps = steps;
            t.step_count = step_count;
            t.volume = volume;
            t.transpose = transpose;
            t
        })
}

fn arb_document() -> impl Strategy<Value = SessionDocument> {
    (
        proptest::collection::vec(arb_track("t"), 0..4),
        0u32..400,
        0u32..200,
    )
        .prop_map(|(mut tracks, tempo, swing)| {
            for (i, t) in tracks.iter_mut().enumerate() {
                t.id = format!("t{i}");
            }
            let mut doc = SessionDocument::default();
            doc.tracks = tracks;
            doc.tempo = tempo;
            doc.swing = swing;
            doc
        })
}

proptest! {
    /// I-1: clamp bounds — ParameterLock::clamp always lands in range, and
    /// an already in-range value is a fixed point.
    #[test]
    fn i1_parameter_lock_clamp_stays_in_bounds(pitch in -1000i32..1000, volume in -10.0f32..10.0) {
        let lock = ParameterLock { pitch: Some(pitch), volume: Some(volume), tie: None };
        let clamped = lock.clamp();
        prop_assert!(clamped.pitch.unwrap() >= -24 && clamped.pitch.unwrap() <= 24);
        prop_assert!(clamped.volume.unwrap() >= 0.0 && clamped.volume.unwrap() <= 1.0);

        let twice = clamped.clamp();
        prop_assert_eq!(twice, clamped);
    }

    /// I-2: validator idempotence — sanitizing an already-sanitized
    /// message is a no-op.
    #[test]
    fn i2_validate_is_idempotent_for_set_tempo(tempo in -1000i64..1000) {
        let msg = ClientMessage::SetTempo { tempo };
        let once = validators::validate(msg, ParameterLockPolicy::AllOrNothing).unwrap();
        let twice = validators::validate(once.clone(), ParameterLockPolicy::AllOrNothing).unwrap();
        prop_assert_eq!(once, twice);
    }

    /// I-3 / I-4: repair normalizes array lengths and is idempotent.
    #[test]
    fn i3_i4_repair_fixes_lengths_and_is_idempotent(doc in arb_document()) {
        let (repaired, _log) = document::repair(&doc);
        for track in &repaired.tracks {
            prop_assert_eq!(track.steps.len(), MAX_STEPS);
            prop_assert_eq!(track.parameter_locks.len(), MAX_STEPS);
        }
        prop_assert!(repaired.tempo >= TEMPO_RANGE.0 && repaired.tempo <= TEMPO_RANGE.1);
        prop_assert!(repaired.swing >= SWING_RANGE.0 && repaired.swing <= SWING_RANGE.1);

        let (twice, log2) = document::repair(&repaired);
        prop_assert_eq!(twice, repaired);
        prop_assert!(log2.is_empty());
    }

    /// I-7: toggling muted/soloed never changes the convergence hash.
    #[test]
    fn i7_hash_ignores_muted_and_soloed(doc in arb_document()) {
        let base = sequencer_core::hash::hash(&doc);
        let mut flipped = doc;
        for t in flipped.tracks.iter_mut() {
            t.muted = !t.muted;
            t.soloed = !t.soloed;
        }
        prop_assert_eq!(sequencer_core::hash::hash(&flipped), base);
    }

    /// R-1: JSON round trip preserves every hashed field.
    #[test]
    fn r1_json_round_trip_preserves_hash(doc in arb_document()) {
        let json = serde_json::to_string(&doc).unwrap();
        let back: SessionDocument = serde_json::from_str(&json).unwrap();
        prop_assert_eq!(sequencer_core::hash::hash(&doc), sequencer_core::hash::hash(&back));
    }

    /// R-2: applying set_tempo(t) twice equals applying it once.
    #[test]
    fn r2_set_tempo_is_idempotent(tempo in -1000i64..1000) {
        let mut doc = SessionDocument::default();
        let sanitized = validators::validate(ClientMessage::SetTempo { tempo }, ParameterLockPolicy::AllOrNothing).unwrap();
        if let ClientMessage::SetTempo { tempo: t } = sanitized {
            doc.tempo = t as u32;
            let once = doc.tempo;
            doc.tempo = t as u32;
            prop_assert_eq!(doc.tempo, once);
        }
    }

    /// R-3: toggle_step at the same (trackId, step) twice restores the
    /// prior boolean.
    #[test]
    fn r3_double_toggle_restores_prior_value(step in 0usize..MAX_STEPS, initial in any::<bool>()) {
        let mut track = Track::new("t1", "kick");
        track.steps[step] = initial;
        track.steps[step] = !track.steps[step];
        track.steps[step] = !track.steps[step];
        prop_assert_eq!(track.steps[step], initial);
    }
}

/// I-11: set_swing and toggle_step over disjoint (trackId, step) commute.
#[test]
fn i11_swing_and_disjoint_toggle_commute() {
    let mut a = SessionDocument::default();
    a.tracks.push(Track::new("t1", "kick"));
    let mut b = a.clone();

    a.swing = 40;
    a.tracks[0].steps[0] = true;

    b.tracks[0].steps[0] = true;
    b.swing = 40;

    assert_eq!(a, b);
}
