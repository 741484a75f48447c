//! Per-message validation and sanitization (component C2).
//!
//! Every inbound [`ClientMessage`] passes through [`validate`] before it
//! reaches a session actor. Out-of-range numerics are clamped in place
//! (never rejected); only structurally nonsensical messages — an empty id,
//! an out-of-bounds index — are rejected outright. This mirrors the
//! repair-over-reject posture of [`crate::document::repair`], applied one
//! message at a time instead of to the whole document.

use crate::document::{
    self, FmParams, ParameterLock, SWING_RANGE, TEMPO_RANGE, TRANSPOSE_RANGE,
};
use crate::protocol::ClientMessage;

/// Controls how `set_parameter_lock` and `batch_set_parameter_locks`
/// respond to a non-finite field.
///
/// `AllOrNothing` reproduces a longstanding quirk where a single bad field
/// (e.g. `volume: NaN`) discards the *entire* lock instead of clamping just
/// that field, because the original handler validated the lock as one unit
/// before any per-field clamping ran. `PerField` is the corrected behavior.
/// The session actor defaults to `AllOrNothing` to preserve existing
/// client expectations; see the Open Questions in the design notes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterLockPolicy {
    AllOrNothing,
    PerField,
}

impl Default for ParameterLockPolicy {
    fn default() -> Self {
        ParameterLockPolicy::AllOrNothing
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub message: String,
}

impl ValidationError {
    fn new(message: impl Into<String>) -> ValidationError {
        ValidationError {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

fn non_empty_id(id: &str, field: &str) -> Result<(), ValidationError> {
    if id.trim().is_empty() {
        Err(ValidationError::new(format!("{field} must not be empty")))
    } else {
        Ok(())
    }
}

fn in_bounds_step(step: usize) -> Result<(), ValidationError> {
    if step >= document::MAX_STEPS {
        Err(ValidationError::new(format!(
            "step {step} out of range [0, {})",
            document::MAX_STEPS
        )))
    } else {
        Ok(())
    }
}

fn apply_lock_policy(
    lock: Option<ParameterLock>,
    policy: ParameterLockPolicy,
) -> Result<Option<ParameterLock>, ValidationError> {
    match lock {
        None => Ok(None),
        Some(lock) => match policy {
            ParameterLockPolicy::AllOrNothing => {
                if document::parameter_lock_all_finite(&lock) {
                    Ok(Some(lock.clamp()))
                } else {
                    Err(ValidationError::new(
                        "parameter lock rejected: one or more fields not finite",
                    ))
                }
            }
            ParameterLockPolicy::PerField => Ok(Some(lock.clamp())),
        },
    }
}

/// Validate and sanitize one client message in isolation. Returns the
/// message with any clamped numerics folded in, or a [`ValidationError`]
/// for a structurally invalid message. Track-existence and other
/// document-dependent checks are the session actor's responsibility —
/// this function only ever inspects the message itself.
pub fn validate(
    msg: ClientMessage,
    policy: ParameterLockPolicy,
) -> Result<ClientMessage, ValidationError> {
    use ClientMessage::*;

    Ok(match msg {
        ToggleStep { track_id, step } => {
            non_empty_id(&track_id, "trackId")?;
            in_bounds_step(step)?;
            ToggleStep { track_id, step }
        }
        SetTempo { tempo } => SetTempo {
            tempo: tempo.clamp(TEMPO_RANGE.0 as i64, TEMPO_RANGE.1 as i64),
        },
        SetSwing { swing } => SetSwing {
            swing: swing.clamp(SWING_RANGE.0 as i64, SWING_RANGE.1 as i64),
        },
        MuteTrack { track_id, muted } => {
            non_empty_id(&track_id, "trackId")?;
            MuteTrack { track_id, muted }
        }
        SoloTrack { track_id, soloed } => {
            non_empty_id(&track_id, "trackId")?;
            SoloTrack { track_id, soloed }
        }
        SetParameterLock { track_id, step, lock } => {
            non_empty_id(&track_id, "trackId")?;
            in_bounds_step(step)?;
            let lock = apply_lock_policy(lock, policy)?;
            SetParameterLock { track_id, step, lock }
        }
        AddTrack { track } => {
            non_empty_id(&track.id, "track.id")?;
            AddTrack { track }
        }
        DeleteTrack { track_id } => {
            non_empty_id(&track_id, "trackId")?;
            DeleteTrack { track_id }
        }
        ClearTrack { track_id } => {
            non_empty_id(&track_id, "trackId")?;
            ClearTrack { track_id }
        }
        CopySequence { from_track_id, to_track_id } => {
            non_empty_id(&from_track_id, "fromTrackId")?;
            non_empty_id(&to_track_id, "toTrackId")?;
            CopySequence { from_track_id, to_track_id }
        }
        MoveSequence { from_track_id, to_track_id } => {
            non_empty_id(&from_track_id, "fromTrackId")?;
            non_empty_id(&to_track_id, "toTrackId")?;
            MoveSequence { from_track_id, to_track_id }
        }
        SetTrackSample { track_id, sample_id, name } => {
            non_empty_id(&track_id, "trackId")?;
            non_empty_id(&sample_id, "sampleId")?;
            SetTrackSample { track_id, sample_id, name }
        }
        SetTrackVolume { track_id, volume } => {
            non_empty_id(&track_id, "trackId")?;
            let volume = if volume.is_finite() { volume.clamp(0.0, 1.0) } else { 0.0 };
            SetTrackVolume { track_id, volume }
        }
        SetTrackTranspose { track_id, transpose } => {
            non_empty_id(&track_id, "trackId")?;
            let transpose = transpose.clamp(TRANSPOSE_RANGE.0 as i64, TRANSPOSE_RANGE.1 as i64);
            SetTrackTranspose { track_id, transpose }
        }
        SetTrackStepCount { track_id, step_count } => {
            non_empty_id(&track_id, "trackId")?;
            SetTrackStepCount { track_id, step_count }
        }
        SetTrackSwing { track_id, swing } => {
            non_empty_id(&track_id, "trackId")?;
            let swing = swing.clamp(SWING_RANGE.0 as i64, SWING_RANGE.1 as i64);
            SetTrackSwing { track_id, swing }
        }
        SetTrackName { track_id, name } => {
            non_empty_id(&track_id, "trackId")?;
            let name = if name.chars().count() > document::MAX_TRACK_NAME {
                name.chars().take(document::MAX_TRACK_NAME).collect()
            } else {
                name
            };
            SetTrackName { track_id, name }
        }
        SetTrackPlaybackMode { track_id, playback_mode } => {
            non_empty_id(&track_id, "trackId")?;
            SetTrackPlaybackMode { track_id, playback_mode }
        }
        SetEffects { effects } => SetEffects { effects: effects.clamp() },
        SetScale { scale } => SetScale {
            scale: scale.map(|s| s.sanitize()),
        },
        SetFmParams { track_id, fm_params } => {
            non_empty_id(&track_id, "trackId")?;
            let fm_params: FmParams = fm_params.clamp();
            SetFmParams { track_id, fm_params }
        }
        BatchClearSteps { track_id, steps } => {
            non_empty_id(&track_id, "trackId")?;
            for &step in &steps {
                in_bounds_step(step)?;
            }
            BatchClearSteps { track_id, steps }
        }
        BatchSetParameterLocks { track_id, locks } => {
            non_empty_id(&track_id, "trackId")?;
            let mut sanitized = Vec::with_capacity(locks.len());
            for entry in locks {
                in_bounds_step(entry.step)?;
                let lock = apply_lock_policy(entry.lock, policy)?;
                sanitized.push(crate::protocol::StepLock { step: entry.step, lock });
            }
            BatchSetParameterLocks { track_id, locks: sanitized }
        }
        SetLoopRegion { region } => SetLoopRegion {
            region: region.map(|r| r.normalize()),
        },
        ReorderTracks { from_index, to_index } => ReorderTracks { from_index, to_index },
        RotatePattern { track_id, direction } => {
            non_empty_id(&track_id, "trackId")?;
            RotatePattern { track_id, direction }
        }
        InvertPattern { track_id } => {
            non_empty_id(&track_id, "trackId")?;
            InvertPattern { track_id }
        }
        ReversePattern { track_id } => {
            non_empty_id(&track_id, "trackId")?;
            ReversePattern { track_id }
        }
        MirrorPattern { track_id, direction } => {
            non_empty_id(&track_id, "trackId")?;
            MirrorPattern { track_id, direction }
        }
        EuclideanFill { track_id, hits } => {
            non_empty_id(&track_id, "trackId")?;
            EuclideanFill { track_id, hits }
        }
        SetSessionName { name } => {
            let name = if name.chars().count() > document::MAX_TRACK_NAME {
                name.chars().take(document::MAX_TRACK_NAME).collect()
            } else {
                name
            };
            SetSessionName { name }
        }

        // Non-mutating messages pass through untouched.
        other @ (ClockSyncRequest { .. }
        | StateHash { .. }
        | RequestSnapshot
        | CursorMove { .. }
        | Play
        | Stop) => other,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ClientMessage;

    #[test]
    fn clamps_out_of_range_tempo() {
        let out = validate(ClientMessage::SetTempo { tempo: 999 }, ParameterLockPolicy::default())
            .unwrap();
        assert_eq!(out, ClientMessage::SetTempo { tempo: TEMPO_RANGE.1 as i64 });
    }

    #[test]
    fn rejects_empty_track_id() {
        let err = validate(
            ClientMessage::DeleteTrack { track_id: "".into() },
            ParameterLockPolicy::default(),
        )
        .unwrap_err();
        assert!(err.message.contains("trackId"));
    }

    #[test]
    fn rejects_out_of_bounds_step() {
        let err = validate(
            ClientMessage::ToggleStep { track_id: "t1".into(), step: 999 },
            ParameterLockPolicy::default(),
        )
        .unwrap_err();
        assert!(err.message.contains("step"));
    }

    #[test]
    fn all_or_nothing_policy_rejects_whole_lock_on_nan() {
        let lock = ParameterLock { pitch: None, volume: Some(f32::NAN), tie: None };
        let err = validate(
            ClientMessage::SetParameterLock { track_id: "t1".into(), step: 0, lock: Some(lock) },
            ParameterLockPolicy::AllOrNothing,
        )
        .unwrap_err();
        assert!(err.message.contains("parameter lock"));
    }

    #[test]
    fn per_field_policy_clamps_instead_of_rejecting() {
        let lock = ParameterLock { pitch: Some(999), volume: Some(2.0), tie: None };
        let out = validate(
            ClientMessage::SetParameterLock { track_id: "t1".into(), step: 0, lock: Some(lock) },
            ParameterLockPolicy::PerField,
        )
        .unwrap();
        match out {
            ClientMessage::SetParameterLock { lock: Some(lock), .. } => {
                assert_eq!(lock.pitch, Some(TRANSPOSE_RANGE.1));
                assert_eq!(lock.volume, Some(1.0));
            }
            _ => panic!("expected SetParameterLock"),
        }
    }

    #[test]
    fn truncates_overlong_track_name() {
        let long = "x".repeat(document::MAX_TRACK_NAME + 10);
        let out = validate(
            ClientMessage::SetTrackName { track_id: "t1".into(), name: long },
            ParameterLockPolicy::default(),
        )
        .unwrap();
        match out {
            ClientMessage::SetTrackName { name, .. } => {
                assert_eq!(name.chars().count(), document::MAX_TRACK_NAME);
            }
            _ => panic!("expected SetTrackName"),
        }
    }
}
