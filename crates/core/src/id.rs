// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Identifier types for ensembles and runs.
//!
//! Unlike the random, human-typed ids elsewhere in this kind of system,
//! an [`EnsembleId`] is not generated locally: it *is* the KV store's
//! 10-byte commit versionstamp, so its byte order is
//! exactly submission order. A [`RunToken`] is a 16-byte value the agent
//! generates locally to distinguish concurrent runs of the same ensemble.

use std::fmt;

/// A 10-byte, big-endian, monotonically increasing ensemble identifier
/// derived from the KV store's commit versionstamp at creation time.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EnsembleId([u8; 10]);

impl EnsembleId {
    pub const LEN: usize = 10;

    pub const fn from_bytes(bytes: [u8; 10]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 10] {
        &self.0
    }

    /// Parse a hex-encoded id (as produced by [`Display`](fmt::Display)).
    pub fn from_hex(s: &str) -> Option<Self> {
        if s.len() != Self::LEN * 2 {
            return None;
        }
        let mut bytes = [0u8; 10];
        for i in 0..Self::LEN {
            bytes[i] = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16).ok()?;
        }
        Some(Self(bytes))
    }
}

impl fmt::Debug for EnsembleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EnsembleId({self})")
    }
}

impl fmt::Display for EnsembleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

impl serde::Serialize for EnsembleId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> serde::Deserialize<'de> for EnsembleId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        EnsembleId::from_hex(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid ensemble id: {s:?}")))
    }
}

/// A 16-byte random token generated by the agent for one run, used to key
/// the run's result entry so that concurrent agents running the same
/// ensemble never collide.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RunToken([u8; 16]);

impl RunToken {
    pub const LEN: usize = 16;

    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl fmt::Debug for RunToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RunToken({self})")
    }
}

impl fmt::Display for RunToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ensemble_id_byte_order_is_submission_order() {
        let a = EnsembleId::from_bytes([0, 0, 0, 0, 0, 0, 0, 0, 0, 1]);
        let b = EnsembleId::from_bytes([0, 0, 0, 0, 0, 0, 0, 0, 0, 2]);
        assert!(a < b, "natural key order must equal submission order");
    }

    #[test]
    fn ensemble_id_roundtrips_through_hex() {
        let id = EnsembleId::from_bytes([1, 2, 3, 4, 5, 6, 7, 8, 9, 10]);
        let s = id.to_string();
        assert_eq!(s.len(), 20);
        assert_eq!(EnsembleId::from_hex(&s), Some(id));
    }

    #[test]
    fn ensemble_id_rejects_malformed_hex() {
        assert_eq!(EnsembleId::from_hex("not-hex"), None);
        assert_eq!(EnsembleId::from_hex("ab"), None);
    }

    #[test]
    fn run_token_display_is_stable() {
        let tok = RunToken::from_bytes([0xab; 16]);
        assert_eq!(tok.to_string(), "ab".repeat(16));
    }
}
