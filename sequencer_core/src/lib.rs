//! Document model, validators, canonical hashing, identity derivation and
//! wire protocol shared by the session server and the sync-engine client.

pub mod document;
pub mod hash;
pub mod identity;
pub mod protocol;
pub mod validators;

pub use document::{SessionDocument, Track, ValidationReport};
pub use protocol::{ClientEnvelope, ClientMessage, PlayerInfo, ServerMessage};
pub use validators::{ParameterLockPolicy, ValidationError};
