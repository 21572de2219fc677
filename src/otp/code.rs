//! One-time code generation, hashing, and destination validation.

use anyhow::{Context, Result};
use rand::{rngs::OsRng, RngCore};
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use utoipa::ToSchema;

/// Fixed code length; changing it invalidates nothing stored (only hashes are
/// persisted) but clients render the input field from this.
pub const CODE_LENGTH: usize = 6;

/// What a code was issued for. A login code cannot satisfy an admin
/// confirmation check and vice versa; the purpose is bound into the hash.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Purpose {
    Login,
    AdminConfirm,
}

impl Purpose {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::AdminConfirm => "admin_confirm",
        }
    }
}

/// Validate a phone-style destination: `+` followed by 8-15 digits.
#[must_use]
pub fn valid_destination(destination: &str) -> bool {
    Regex::new(r"^\+[0-9]{8,15}$").is_ok_and(|regex| regex.is_match(destination))
}

#[must_use]
pub fn normalize_destination(destination: &str) -> String {
    destination.trim().replace([' ', '-'], "")
}

/// Generate a fixed-length numeric code from the OS entropy source.
pub fn generate_code() -> Result<String> {
    let mut bytes = [0u8; 4];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate one-time code")?;
    let value = u32::from_be_bytes(bytes) % 1_000_000;
    Ok(format!("{value:06}"))
}

/// True if the candidate even has the shape of a code; wrong shapes are
/// rejected before any storage work.
#[must_use]
pub fn plausible_code(candidate: &str) -> bool {
    candidate.len() == CODE_LENGTH && candidate.bytes().all(|b| b.is_ascii_digit())
}

/// Hash a code bound to its destination and purpose, so a stored hash is
/// useless outside the exact context it was issued for.
#[must_use]
pub fn hash_code(destination: &str, purpose: Purpose, code: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(destination.as_bytes());
    hasher.update([0u8]);
    hasher.update(purpose.as_str().as_bytes());
    hasher.update([0u8]);
    hasher.update(code.as_bytes());
    hasher.finalize().to_vec()
}

/// Hex digest of a destination for audit metadata; raw destinations are
/// personal data and stay out of the chain.
#[must_use]
pub fn redacted_destination(destination: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(destination.as_bytes());
    let digest = hasher.finalize();
    digest.iter().take(8).map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_e164_style_destinations() {
        assert!(valid_destination("+919876543210"));
        assert!(valid_destination("+4915112345678"));
        assert!(valid_destination("+12025550"));
    }

    #[test]
    fn rejects_malformed_destinations() {
        assert!(!valid_destination("919876543210"));
        assert!(!valid_destination("+91abc"));
        assert!(!valid_destination("+1234567"));
        assert!(!valid_destination("+1234567890123456"));
        assert!(!valid_destination(""));
    }

    #[test]
    fn normalize_strips_spacing() {
        assert_eq!(normalize_destination(" +91 98765-43210 "), "+919876543210");
    }

    #[test]
    fn generated_codes_are_six_digits() {
        for _ in 0..32 {
            let code = generate_code().unwrap();
            assert!(plausible_code(&code), "bad code shape: {code}");
        }
    }

    #[test]
    fn plausible_code_rejects_wrong_shapes() {
        assert!(!plausible_code("12345"));
        assert!(!plausible_code("1234567"));
        assert!(!plausible_code("12a456"));
        assert!(!plausible_code(""));
    }

    #[test]
    fn hash_binds_destination_and_purpose() {
        let base = hash_code("+919876543210", Purpose::Login, "123456");
        assert_eq!(base, hash_code("+919876543210", Purpose::Login, "123456"));
        assert_ne!(base, hash_code("+919876543211", Purpose::Login, "123456"));
        assert_ne!(
            base,
            hash_code("+919876543210", Purpose::AdminConfirm, "123456")
        );
        assert_ne!(base, hash_code("+919876543210", Purpose::Login, "654321"));
    }

    #[test]
    fn redacted_destination_hides_the_number() {
        let redacted = redacted_destination("+919876543210");
        assert_eq!(redacted.len(), 16);
        assert!(!redacted.contains("9876"));
    }
}
