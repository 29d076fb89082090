//! Content fingerprints for schema documents

use sha2::{Digest, Sha256};

use crate::types::SchemaSpec;

/// SHA-256 of the canonical JSON encoding, hex encoded.
pub fn fingerprint(spec: &SchemaSpec) -> String {
    let bytes = serde_json::to_vec(spec).unwrap_or_default();
    hex::encode(Sha256::digest(&bytes))
}

/// First eight hex digits of the SHA-256 of `input`.
pub fn short_digest(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    hex::encode(&digest[..4])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::parse_schema_content;

    #[test]
    fn test_fingerprint_is_stable() {
        let doc = r#"{ "name": "svc", "types": [{ "name": "A", "type": "string" }] }"#;
        let a = fingerprint(&parse_schema_content(doc).unwrap());
        let b = fingerprint(&parse_schema_content(doc).unwrap());
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);

        let other = r#"{ "name": "svc", "types": [{ "name": "B", "type": "string" }] }"#;
        assert_ne!(a, fingerprint(&parse_schema_content(other).unwrap()));
    }

    #[test]
    fn test_short_digest() {
        assert_eq!(short_digest("Address").len(), 8);
        assert_eq!(short_digest("Address"), short_digest("Address"));
    }
}
