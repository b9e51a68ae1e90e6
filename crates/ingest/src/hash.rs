use sha2::{Digest, Sha256};

/// SHA-256 of the raw upload bytes as lowercase hex. This is the statement
/// dedup key; the caller compares it against stored hashes before insert.
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}
