//! Keyed digest primitive used to authenticate whole messages or individual record
//! chunks. SipHash-2-4 with a 128-bit key derived from a caller-supplied secret.

use byteorder::{ByteOrder, NativeEndian};
use siphasher::sip::SipHasher24;
use std::hash::Hasher;

/// Size, in bytes, of the derived SipHash key.
pub const KEY_SIZE: usize = 16;

/// Size, in bytes, of a digest on the wire.
pub const DIGEST_SIZE: usize = 8;

/// Derives the 128-bit SipHash key from an arbitrary-length secret by repeating and
/// truncating it to `KEY_SIZE` bytes. Stable across versions by contract (§4.2) —
/// changing this rule breaks interop with every existing secret.
fn derive_key(secret: &[u8]) -> [u8; KEY_SIZE] {
    let mut key = [0u8; KEY_SIZE];
    if secret.is_empty() {
        return key;
    }
    for (i, byte) in key.iter_mut().enumerate() {
        *byte = secret[i % secret.len()];
    }
    key
}

/// Running authenticator state. Wraps a `SipHasher24` seeded from the derived key;
/// `update` feeds bytes into the running hash and `finish` reads the digest without
/// resetting it, so `0xF1` mode can checkpoint the same running hash repeatedly.
pub struct Authenticator {
    hasher: SipHasher24,
}

impl Authenticator {
    /// Creates a new authenticator state keyed from `secret`.
    pub fn new(secret: &[u8]) -> Authenticator {
        let key = derive_key(secret);
        let k0 = NativeEndian::read_u64(&key[0..8]);
        let k1 = NativeEndian::read_u64(&key[8..16]);
        Authenticator {
            hasher: SipHasher24::new_with_keys(k0, k1),
        }
    }

    /// Feeds `bytes` into the running hash.
    #[inline]
    pub fn update(&mut self, bytes: &[u8]) {
        self.hasher.write(bytes);
    }

    /// Reads the current digest without disturbing the running hash. The result is
    /// written to the wire in host byte order and compared as raw bytes on the
    /// receiving end — never re-endian a digest (§4.2, §9).
    #[inline]
    pub fn digest(&self) -> [u8; DIGEST_SIZE] {
        let value = self.hasher.finish();
        let mut out = [0u8; DIGEST_SIZE];
        NativeEndian::write_u64(&mut out, value);
        out
    }

    /// Verifies `candidate` (8 raw bytes read off the wire) against the current
    /// running digest via byte-exact comparison.
    #[inline]
    pub fn verify(&self, candidate: &[u8]) -> bool {
        candidate.len() == DIGEST_SIZE && candidate == self.digest()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_secret_same_bytes_same_digest() {
        let mut a = Authenticator::new(b"s3cret");
        let mut b = Authenticator::new(b"s3cret");
        a.update(b"hello world");
        b.update(b"hello world");
        assert_eq!(a.digest(), b.digest());
    }

    #[test]
    fn different_secret_different_digest() {
        let mut a = Authenticator::new(b"s3cret");
        let mut b = Authenticator::new(b"other!");
        a.update(b"hello world");
        b.update(b"hello world");
        assert_ne!(a.digest(), b.digest());
    }

    #[test]
    fn running_hash_checkpoints_independently() {
        let mut a = Authenticator::new(b"s3cret");
        a.update(b"first");
        let first_digest = a.digest();
        a.update(b"second");
        let second_digest = a.digest();
        assert_ne!(first_digest, second_digest);

        // Replaying the same two updates against a fresh state must reproduce both
        // checkpoints exactly, proving `digest()` doesn't disturb the running hash.
        let mut c = Authenticator::new(b"s3cret");
        c.update(b"first");
        assert_eq!(c.digest(), first_digest);
        c.update(b"second");
        assert_eq!(c.digest(), second_digest);
    }

    #[test]
    fn key_derivation_repeats_short_secrets() {
        let key = derive_key(b"ab");
        assert_eq!(key, [b'a', b'b', b'a', b'b', b'a', b'b', b'a', b'b', b'a', b'b', b'a', b'b', b'a', b'b', b'a', b'b']);
    }

    #[test]
    fn key_derivation_truncates_long_secrets() {
        let key = derive_key(b"0123456789abcdefXYZ");
        assert_eq!(&key[..], &b"0123456789abcdef"[..]);
    }
}
