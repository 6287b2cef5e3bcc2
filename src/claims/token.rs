use rand::RngCore;
use ring::{constant_time, digest};

const TOKEN_BYTES: usize = 32;

/// Issue a pickup token: 32 bytes of OS-seeded randomness, base58-encoded.
/// The token is stored with the claim it belongs to; nothing about it is
/// derivable from the claim or listing ids.
pub fn issue() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    bs58::encode(bytes).into_string()
}

/// Constant-time token comparison. Both sides are hashed first so the
/// comparison always runs over equal-length digests and never
/// short-circuits on a length mismatch.
pub fn matches(stored: &str, presented: &str) -> bool {
    let a = digest::digest(&digest::SHA256, stored.as_bytes());
    let b = digest::digest(&digest::SHA256, presented.as_bytes());
    constant_time::verify_slices_are_equal(a.as_ref(), b.as_ref()).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokens_are_unique() {
        let a = issue();
        let b = issue();
        assert_ne!(a, b);
        assert!(a.len() > 30);
    }

    #[test]
    fn test_matches_exact_value_only() {
        let token = issue();
        assert!(matches(&token, &token));
        assert!(!matches(&token, ""));
        assert!(!matches(&token, &issue()));
    }

    #[test]
    fn test_single_character_corruption_rejected() {
        let token = issue();
        let mut corrupted = token.clone().into_bytes();
        // Flip the last character to a different base58 digit.
        let last = corrupted.len() - 1;
        corrupted[last] = if corrupted[last] == b'2' { b'3' } else { b'2' };
        let corrupted = String::from_utf8(corrupted).unwrap();
        assert_ne!(token, corrupted);
        assert!(!matches(&token, &corrupted));
    }
}
