//! Leaf value scalar.
//!
//! Leaves carry opaque hash-sized content. Canopy never interprets the
//! bytes; it only stores and indexes them.

/// Opaque leaf content (32 bytes).
pub type LeafValue = [u8; 32];

/// All-zero value. Used as a placeholder in tests and diagnostics,
/// never produced by the ledger itself.
pub const ZERO_VALUE: LeafValue = [0u8; 32];

/// Render a value as lowercase hex for log output.
pub fn value_hex(value: &LeafValue) -> String {
    let mut out = String::with_capacity(64);
    for byte in value {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_value_hex_zero() {
        assert_eq!(value_hex(&ZERO_VALUE), "0".repeat(64));
    }

    #[test]
    fn test_value_hex_mixed_bytes() {
        let mut v = ZERO_VALUE;
        v[0] = 0xde;
        v[1] = 0xad;
        v[31] = 0x01;
        let hex = value_hex(&v);
        assert!(hex.starts_with("dead"));
        assert!(hex.ends_with("01"));
        assert_eq!(hex.len(), 64);
    }
}
