use sha2::{Digest, Sha256};

/// Lowercase hex SHA-256 of an uploaded file's bytes (64 chars).
pub fn sha256_hex(data: &[u8]) -> String {
    let digest: [u8; 32] = Sha256::digest(data).into();
    digest.iter().map(|b| format!("{b:02x}")).collect()
}
