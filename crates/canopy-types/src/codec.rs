//! Centralized serialization for persisted entities.
//!
//! Leaf records and the checkpoint are stored as postcard bytes; this
//! module is the single place that encoding goes through so error
//! handling stays consistent.

use serde::{Serialize, de::DeserializeOwned};
use snafu::Snafu;

/// Error type for codec operations.
#[derive(Debug, Snafu)]
pub enum CodecError {
    /// Encoding failed.
    #[snafu(display("encoding failed: {source}"))]
    Encode {
        /// The underlying postcard error.
        source: postcard::Error,
    },

    /// Decoding failed.
    #[snafu(display("decoding failed: {source}"))]
    Decode {
        /// The underlying postcard error.
        source: postcard::Error,
    },
}

/// Encodes a value to postcard bytes.
///
/// # Errors
///
/// Returns `CodecError::Encode` if serialization fails.
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, CodecError> {
    postcard::to_allocvec(value).map_err(|source| CodecError::Encode { source })
}

/// Decodes a value from postcard bytes.
///
/// # Errors
///
/// Returns `CodecError::Decode` if deserialization fails.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CodecError> {
    postcard::from_bytes(bytes).map_err(|source| CodecError::Decode { source })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::checkpoint::{Checkpoint, LatestLeaf};
    use crate::leaf::LeafRecord;

    #[test]
    fn test_leaf_record_roundtrip() {
        let record = LeafRecord {
            value: [0xabu8; 32],
            leaf_index: 17,
            node_index: 17 + (1 << 32) - 1,
            block_number: 9_000_001,
            is_locked: true,
        };
        let bytes = encode(&record).expect("encode leaf");
        let decoded: LeafRecord = decode(&bytes).expect("decode leaf");
        assert_eq!(record, decoded);
    }

    #[test]
    fn test_checkpoint_roundtrip_both_shapes() {
        for cp in [
            Checkpoint::empty(),
            Checkpoint { latest_leaf: Some(LatestLeaf { leaf_index: 3, block_number: 120 }) },
        ] {
            let bytes = encode(&cp).expect("encode checkpoint");
            let decoded: Checkpoint = decode(&bytes).expect("decode checkpoint");
            assert_eq!(cp, decoded);
        }
    }

    #[test]
    fn test_decode_garbage_fails() {
        let err = decode::<LeafRecord>(&[0xff]).unwrap_err();
        assert!(matches!(err, CodecError::Decode { .. }));
    }
}
