// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `Properties::compressed`: whether a package's chunks
//! are stored zstd-compressed. Applied at the KV boundary so every
//! other crate (the sandbox, the CLI) only ever sees the package's
//! plain bytes.

use joshua_core::JoshuaError;

pub fn compress_if_needed(package: Vec<u8>, compressed: bool) -> crate::store::Result<Vec<u8>> {
    if !compressed {
        return Ok(package);
    }
    zstd::stream::encode_all(package.as_slice(), 0).map_err(JoshuaError::Io)
}

pub fn decompress_if_needed(package: Vec<u8>, compressed: bool) -> crate::store::Result<Vec<u8>> {
    if !compressed {
        return Ok(package);
    }
    zstd::stream::decode_all(package.as_slice()).map_err(JoshuaError::Io)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_through_compression() {
        let original = b"hello joshua".repeat(100);
        let compressed = compress_if_needed(original.clone(), true).unwrap();
        assert!(compressed.len() < original.len());
        let restored = decompress_if_needed(compressed, true).unwrap();
        assert_eq!(restored, original);
    }

    #[test]
    fn is_a_no_op_when_not_compressed() {
        let original = b"plain".to_vec();
        let out = compress_if_needed(original.clone(), false).unwrap();
        assert_eq!(out, original);
    }
}
