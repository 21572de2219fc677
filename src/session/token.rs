//! Bearer and refresh token helpers.
//!
//! Raw tokens are returned to the caller exactly once; the database only ever
//! sees a hash.

use anyhow::{Context, Result};
use base64::Engine;
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};

/// Generate a random 32-byte token, URL-safe base64 encoded.
pub fn generate_token() -> Result<String> {
    let mut bytes = [0u8; 32];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate token")?;
    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes))
}

/// Hash a token for storage and lookup; raw values never touch the database.
#[must_use]
pub fn hash_token(token: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.finalize().to_vec()
}

/// Short hex prefix of a token hash, safe to put in audit metadata when the
/// presented token matched nothing in the store.
#[must_use]
pub fn redacted_token_ref(token: &str) -> String {
    let hash = hash_token(token);
    hash.iter().take(6).map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;

    #[test]
    fn generated_tokens_are_32_bytes() {
        let decoded_len = generate_token()
            .ok()
            .and_then(|token| URL_SAFE_NO_PAD.decode(token.as_bytes()).ok())
            .map(|bytes| bytes.len());
        assert_eq!(decoded_len, Some(32));
    }

    #[test]
    fn generated_tokens_are_unique() {
        let first = generate_token().unwrap();
        let second = generate_token().unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn hash_is_stable_and_discriminating() {
        assert_eq!(hash_token("token"), hash_token("token"));
        assert_ne!(hash_token("token"), hash_token("other"));
        assert_eq!(hash_token("token").len(), 32);
    }

    #[test]
    fn redacted_ref_is_short_hex() {
        let reference = redacted_token_ref("token");
        assert_eq!(reference.len(), 12);
        assert!(reference.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
