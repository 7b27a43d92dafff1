//! Peer identities.
//!
//! A peer is addressed by an opaque 32-byte public key, independent of its
//! current network location. Keys travel as lowercase hex strings on the
//! wire and in configuration.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::DispatchError;

/// Length of a peer public key in bytes.
pub const PEER_ID_LEN: usize = 32;

/// Opaque fixed-length peer identity (public key).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId([u8; PEER_ID_LEN]);

impl PeerId {
    /// Wrap raw key bytes.
    pub fn from_bytes(bytes: [u8; PEER_ID_LEN]) -> Self {
        Self(bytes)
    }

    /// Parse a lowercase/uppercase hex string into a peer identity.
    pub fn from_hex(s: &str) -> Result<Self, DispatchError> {
        let raw = hex::decode(s.trim())
            .map_err(|e| DispatchError::InvalidRegistration(format!("bad peer key hex: {e}")))?;
        let bytes: [u8; PEER_ID_LEN] = raw.try_into().map_err(|_| {
            DispatchError::InvalidRegistration(format!(
                "peer key must be {PEER_ID_LEN} bytes, got a different length"
            ))
        })?;
        Ok(Self(bytes))
    }

    /// The raw key bytes.
    pub fn as_bytes(&self) -> &[u8; PEER_ID_LEN] {
        &self.0
    }

    /// Hex rendering of the full key.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Short prefix for log lines.
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeerId({}..)", self.short())
    }
}

impl Serialize for PeerId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for PeerId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}
