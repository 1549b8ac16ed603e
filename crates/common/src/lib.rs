//! Identifiers and record key derivation shared by the storage provider.

pub mod keys;
pub mod types;

pub use keys::KeyError;
pub use types::{EntityId, EnvelopeKind, UnknownEnvelopeKind};
