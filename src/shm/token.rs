//! Token/cipher/magic derivation for shared-memory ring authentication.
//!
//! Authentication is a plain XOR against a random per-segment `magic`
//! value; the token itself is derived from a 16-byte MD5 tag seeded with
//! the configured `magicKey` rather than a raw caller-supplied secret.

use md5::{Digest, Md5};

/// Derive an 8-byte auth token from a magic-key string: the first 8 bytes
/// of its MD5 digest, read as a little-endian `u64`.
pub fn token_from_magic_key(magic_key: &str) -> u64 {
    let digest = Md5::digest(magic_key.as_bytes());
    u64::from_le_bytes(digest[0..8].try_into().expect("md5 digest is 16 bytes"))
}

/// `cipher = magic XOR token`, stored in the segment header so a holder of
/// `token` can recover `magic` without it ever appearing on the wire.
pub fn encipher(magic: u64, token: u64) -> u64 {
    magic ^ token
}

/// `magic = cipher XOR token`, the inverse of [`encipher`].
pub fn decipher(cipher: u64, token: u64) -> u64 {
    cipher ^ token
}

/// A segment with `cipher == 0` has authentication disabled and is valid
/// for any token (including none); otherwise the candidate token must
/// decipher back to the stored `magic`.
pub fn verify(cipher: u64, magic: u64, token: Option<u64>) -> bool {
    if cipher == 0 {
        return true;
    }
    match token {
        Some(token) => decipher(cipher, token) == magic,
        None => false,
    }
}

/// Generate a fresh, unpredictable `magic` value for a newly created
/// segment, the way `shmmap_buffer_create` seeds its PRNG from wall-clock
/// microseconds.
pub fn generate_magic() -> u64 {
    use rand::RngCore;
    let mut bytes = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut bytes);
    u64::from_le_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_derivation_is_deterministic() {
        let a = token_from_magic_key("secret");
        let b = token_from_magic_key("secret");
        assert_eq!(a, b);
    }

    #[test]
    fn different_keys_almost_certainly_differ() {
        assert_ne!(token_from_magic_key("secret"), token_from_magic_key("other"));
    }

    #[test]
    fn encipher_decipher_round_trips() {
        let magic = 0xDEAD_BEEF_1234_5678;
        let token = token_from_magic_key("k");
        let cipher = encipher(magic, token);
        assert_eq!(decipher(cipher, token), magic);
    }

    #[test]
    fn zero_cipher_disables_auth() {
        assert!(verify(0, 123, None));
        assert!(verify(0, 123, Some(999)));
    }

    #[test]
    fn wrong_token_fails_verification() {
        let token = token_from_magic_key("k");
        let wrong = token_from_magic_key("not-k");
        let magic = generate_magic();
        let cipher = encipher(magic, token);
        assert!(verify(cipher, magic, Some(token)));
        assert!(!verify(cipher, magic, Some(wrong)));
        assert!(!verify(cipher, magic, None));
    }
}
