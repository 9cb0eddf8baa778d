// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The key schema, shared by every backend so the wire
//! layout is identical whether the underlying transport is the
//! in-memory test store or real FoundationDB tuples.
//!
//! Keys are represented here as owned byte vectors built from an
//! ordered, length-prefixed tuple encoding. This keeps lexicographic
//! byte order equal to component order, which is what the active
//! index, the result subspace, and the package chunk subspace all rely
//! on for "natural key order".

use joshua_core::{EnsembleId, RunToken};

/// Encode one tuple element: a 4-byte big-endian length prefix followed
/// by the raw bytes. Length-prefixing (rather than a separator byte)
/// keeps the encoding unambiguous and preserves byte-order for any
/// fixed-width prefix (ensemble ids, run tokens).
fn push_elem(buf: &mut Vec<u8>, bytes: &[u8]) {
    buf.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
    buf.extend_from_slice(bytes);
}

fn push_u64(buf: &mut Vec<u8>, n: u64) {
    push_elem(buf, &n.to_be_bytes());
}

pub fn properties_key(id: &EnsembleId, prop: &str) -> Vec<u8> {
    let mut k = b"ensembles/properties/".to_vec();
    push_elem(&mut k, id.as_bytes());
    push_elem(&mut k, prop.as_bytes());
    k
}

pub fn properties_prefix(id: &EnsembleId) -> Vec<u8> {
    let mut k = b"ensembles/properties/".to_vec();
    push_elem(&mut k, id.as_bytes());
    k
}

pub const PROPERTIES_PREFIX: &[u8] = b"ensembles/properties/";

/// Extract the leading `EnsembleId` from a key produced by
/// [`properties_key`]/[`properties_prefix`].
pub fn id_from_properties_key(key: &[u8]) -> Option<EnsembleId> {
    let rest = key.strip_prefix(PROPERTIES_PREFIX)?;
    if rest.len() < 4 {
        return None;
    }
    let len = u32::from_be_bytes(rest[0..4].try_into().ok()?) as usize;
    if len != EnsembleId::LEN || rest.len() < 4 + len {
        return None;
    }
    let mut bytes = [0u8; 10];
    bytes.copy_from_slice(&rest[4..4 + len]);
    Some(EnsembleId::from_bytes(bytes))
}

pub fn counters_key(id: &EnsembleId, name: &str) -> Vec<u8> {
    let mut k = b"ensembles/counters/".to_vec();
    push_elem(&mut k, id.as_bytes());
    push_elem(&mut k, name.as_bytes());
    k
}

pub fn counters_prefix(id: &EnsembleId) -> Vec<u8> {
    let mut k = b"ensembles/counters/".to_vec();
    push_elem(&mut k, id.as_bytes());
    k
}

/// Extract the counter name from a key produced by [`counters_key`],
/// given the `counters_prefix` it was built under.
pub fn field_from_counters_key<'a>(key: &'a [u8], id: &EnsembleId) -> Option<&'a [u8]> {
    let prefix = counters_prefix(id);
    let rest = key.strip_prefix(prefix.as_slice())?;
    if rest.len() < 4 {
        return None;
    }
    let len = u32::from_be_bytes(rest[0..4].try_into().ok()?) as usize;
    if rest.len() != 4 + len {
        return None;
    }
    Some(&rest[4..])
}

pub fn package_key(id: &EnsembleId, chunk_index: u64) -> Vec<u8> {
    let mut k = b"ensembles/package/".to_vec();
    push_elem(&mut k, id.as_bytes());
    push_u64(&mut k, chunk_index);
    k
}

pub fn package_prefix(id: &EnsembleId) -> Vec<u8> {
    let mut k = b"ensembles/package/".to_vec();
    push_elem(&mut k, id.as_bytes());
    k
}

pub fn result_key(id: &EnsembleId, run_token: &RunToken, seq: u32) -> Vec<u8> {
    let mut k = b"ensembles/results/".to_vec();
    push_elem(&mut k, id.as_bytes());
    push_elem(&mut k, run_token.as_bytes());
    push_elem(&mut k, &seq.to_be_bytes());
    k
}

pub fn results_prefix(id: &EnsembleId) -> Vec<u8> {
    let mut k = b"ensembles/results/".to_vec();
    push_elem(&mut k, id.as_bytes());
    k
}

pub fn active_key(id: &EnsembleId) -> Vec<u8> {
    let mut k = b"active/".to_vec();
    push_elem(&mut k, id.as_bytes());
    k
}

pub const ACTIVE_PREFIX: &[u8] = b"active/";

pub fn active_sanity_key(id: &EnsembleId) -> Vec<u8> {
    let mut k = b"active_sanity/".to_vec();
    push_elem(&mut k, id.as_bytes());
    k
}

pub const ACTIVE_SANITY_PREFIX: &[u8] = b"active_sanity/";

pub fn heartbeat_key(agent_id: &str) -> Vec<u8> {
    let mut k = b"agents/heartbeat/".to_vec();
    push_elem(&mut k, agent_id.as_bytes());
    k
}

pub const HEARTBEAT_PREFIX: &[u8] = b"agents/heartbeat/";

/// Extract the trailing `EnsembleId` from an `active/<id>` or
/// `active_sanity/<id>` key produced by [`active_key`]/[`active_sanity_key`].
pub fn id_from_active_key(key: &[u8], prefix: &[u8]) -> Option<EnsembleId> {
    let rest = key.strip_prefix(prefix)?;
    if rest.len() < 4 {
        return None;
    }
    let len = u32::from_be_bytes(rest[0..4].try_into().ok()?) as usize;
    if rest.len() != 4 + len || len != EnsembleId::LEN {
        return None;
    }
    let mut bytes = [0u8; 10];
    bytes.copy_from_slice(&rest[4..4 + len]);
    Some(EnsembleId::from_bytes(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn active_key_roundtrips_id() {
        let id = EnsembleId::from_bytes([1, 2, 3, 4, 5, 6, 7, 8, 9, 10]);
        let key = active_key(&id);
        assert!(key.starts_with(ACTIVE_PREFIX));
        assert_eq!(id_from_active_key(&key, ACTIVE_PREFIX), Some(id));
    }

    #[test]
    fn key_byte_order_matches_id_order_for_fixed_width_ids() {
        let a = EnsembleId::from_bytes([0; 10]);
        let mut b_bytes = [0; 10];
        b_bytes[9] = 1;
        let b = EnsembleId::from_bytes(b_bytes);
        assert!(active_key(&a) < active_key(&b));
    }

    #[test]
    fn properties_prefix_is_a_prefix_of_properties_key() {
        let id = EnsembleId::from_bytes([9; 10]);
        let prefix = properties_prefix(&id);
        let key = properties_key(&id, "timeout");
        assert!(key.starts_with(&prefix));
    }

    #[test]
    fn id_from_properties_key_roundtrips_the_all_record() {
        let id = EnsembleId::from_bytes([7; 10]);
        let key = properties_key(&id, "all");
        assert_eq!(id_from_properties_key(&key), Some(id));
    }

    #[test]
    fn field_from_counters_key_roundtrips_every_field_name() {
        let id = EnsembleId::from_bytes([3; 10]);
        for name in ["started", "ended", "pass", "fail", "runtime", "pass_5min", "fail_5min"] {
            let key = counters_key(&id, name);
            assert_eq!(field_from_counters_key(&key, &id), Some(name.as_bytes()));
        }
    }
}
