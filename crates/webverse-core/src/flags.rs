use sha2::{Digest, Sha256};

/// Lowercase hex SHA-256 of the UTF-8 bytes of `s`.
pub fn sha256_hex(s: &str) -> String {
    hex::encode(Sha256::digest(s.as_bytes()))
}

/// True iff the trimmed submission hashes to `expected_sha256` (trimmed, case-insensitive).
/// An empty submission or an empty expected hash never matches.
pub fn flag_matches(submitted: &str, expected_sha256: &str) -> bool {
    let submitted = submitted.trim();
    let expected = expected_sha256.trim().to_ascii_lowercase();
    if submitted.is_empty() || expected.is_empty() {
        return false;
    }
    sha256_hex(submitted) == expected
}
