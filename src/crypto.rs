//! Signing primitives and canonical hashing.
//!
//! All protocol signatures are ed25519 over a 32-byte SHA-256 digest of the
//! signed object's fields. The digest is always recomputed from structured
//! fields by the verifying side; a caller-supplied hash is never trusted.
//!
//! [`SigHasher`] is the canonical, order-sensitive field encoder: every
//! hashed object writes a leading [`Specifier`] as a domain separator and
//! then its fields in declaration order, so a signature over one object
//! kind cannot be replayed as another.

use crate::types::{Currency, Hash256, Specifier, UnlockHash};
use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;

/// Length of an ed25519 public key in bytes.
pub const PUBLIC_KEY_LEN: usize = 32;

/// Length of an ed25519 signature in bytes.
pub const SIGNATURE_LEN: usize = 64;

// =============================================================================
// Public keys and signatures
// =============================================================================

/// An ed25519 public key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PublicKey(pub [u8; PUBLIC_KEY_LEN]);

impl PublicKey {
    /// The raw key bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; PUBLIC_KEY_LEN] {
        &self.0
    }

    /// Verify `signature` over the 32-byte `hash`.
    ///
    /// Returns `false` for a malformed key, a malformed signature, or a
    /// signature that does not verify. Any single flipped bit in a valid
    /// signature fails.
    #[must_use]
    pub fn verify_hash(&self, hash: &Hash256, signature: &Signature) -> bool {
        let Ok(key) = VerifyingKey::from_bytes(&self.0) else {
            return false;
        };
        let sig = ed25519_dalek::Signature::from_bytes(&signature.0);
        key.verify(hash.as_bytes(), &sig).is_ok()
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// An ed25519 signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signature(pub [u8; SIGNATURE_LEN]);

impl Signature {
    /// The all-zero placeholder signature. Never verifies.
    pub const EMPTY: Self = Self([0u8; SIGNATURE_LEN]);

    /// The raw signature bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; SIGNATURE_LEN] {
        &self.0
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

// serde cannot derive for [u8; 64]; encode as a byte string.
impl Serialize for Signature {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(&self.0)
    }
}

impl<'de> Deserialize<'de> for Signature {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct SignatureVisitor;

        impl<'de> Visitor<'de> for SignatureVisitor {
            type Value = Signature;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a 64-byte signature")
            }

            fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<Signature, E> {
                let bytes: [u8; SIGNATURE_LEN] = v
                    .try_into()
                    .map_err(|_| E::invalid_length(v.len(), &self))?;
                Ok(Signature(bytes))
            }

            fn visit_seq<A: de::SeqAccess<'de>>(self, mut seq: A) -> Result<Signature, A::Error> {
                let mut bytes = [0u8; SIGNATURE_LEN];
                for (i, b) in bytes.iter_mut().enumerate() {
                    *b = seq
                        .next_element()?
                        .ok_or_else(|| de::Error::invalid_length(i, &self))?;
                }
                Ok(Signature(bytes))
            }
        }

        deserializer.deserialize_bytes(SignatureVisitor)
    }
}

// =============================================================================
// Key pairs
// =============================================================================

/// An ed25519 key pair used to sign protocol hashes.
pub struct Keypair {
    signing: SigningKey,
}

impl Keypair {
    /// Generate a fresh key pair from the operating system RNG.
    #[must_use]
    pub fn generate() -> Self {
        Self {
            signing: SigningKey::generate(&mut OsRng),
        }
    }

    /// Derive a key pair from a 32-byte seed.
    #[must_use]
    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self {
            signing: SigningKey::from_bytes(&seed),
        }
    }

    /// The public half of this key pair.
    #[must_use]
    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.signing.verifying_key().to_bytes())
    }

    /// Sign a 32-byte protocol hash.
    #[must_use]
    pub fn sign_hash(&self, hash: &Hash256) -> Signature {
        Signature(self.signing.sign(hash.as_bytes()).to_bytes())
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // never print the secret half
        f.debug_struct("Keypair")
            .field("public_key", &self.public_key())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Canonical hashing
// =============================================================================

/// Canonical, order-sensitive field encoder over SHA-256.
///
/// Variable-length sequences are always length-prefixed so that adjacent
/// fields cannot be reinterpreted across a boundary.
pub(crate) struct SigHasher(Sha256);

impl SigHasher {
    /// Start a hash for the object kind tagged by `domain`.
    pub(crate) fn new(domain: Specifier) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(domain.as_bytes());
        Self(hasher)
    }

    pub(crate) fn write_u64(&mut self, v: u64) {
        self.0.update(v.to_be_bytes());
    }

    pub(crate) fn write_currency(&mut self, v: Currency) {
        self.0.update(v.to_be_bytes());
    }

    pub(crate) fn write_bytes(&mut self, v: &[u8]) {
        self.0.update(v);
    }

    pub(crate) fn write_prefixed_bytes(&mut self, v: &[u8]) {
        self.write_u64(v.len() as u64);
        self.0.update(v);
    }

    pub(crate) fn write_unlock_hash(&mut self, v: &UnlockHash) {
        self.0.update(v.as_bytes());
    }

    pub(crate) fn finalize(self) -> Hash256 {
        let digest = self.0.finalize();
        let mut out = [0u8; 32];
        out.copy_from_slice(&digest);
        Hash256(out)
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_and_verify() {
        let keypair = Keypair::from_seed([7u8; 32]);
        let hash = Hash256([42u8; 32]);

        let sig = keypair.sign_hash(&hash);
        assert!(keypair.public_key().verify_hash(&hash, &sig));

        // wrong hash
        let other = Hash256([43u8; 32]);
        assert!(!keypair.public_key().verify_hash(&other, &sig));

        // wrong key
        let stranger = Keypair::from_seed([8u8; 32]);
        assert!(!stranger.public_key().verify_hash(&hash, &sig));
    }

    #[test]
    fn test_flipped_signature_bits_never_verify() {
        let keypair = Keypair::from_seed([9u8; 32]);
        let hash = Hash256([1u8; 32]);
        let sig = keypair.sign_hash(&hash);

        for byte in 0..SIGNATURE_LEN {
            for bit in 0..8 {
                let mut bad = sig;
                bad.0[byte] ^= 1 << bit;
                assert!(
                    !keypair.public_key().verify_hash(&hash, &bad),
                    "flipped bit {bit} of byte {byte} still verified"
                );
            }
        }
    }

    #[test]
    fn test_empty_signature_never_verifies() {
        let keypair = Keypair::from_seed([3u8; 32]);
        let hash = Hash256([5u8; 32]);
        assert!(!keypair.public_key().verify_hash(&hash, &Signature::EMPTY));
    }

    #[test]
    fn test_sig_hasher_is_order_sensitive() {
        let domain = Specifier::new("test");

        let mut a = SigHasher::new(domain);
        a.write_u64(1);
        a.write_u64(2);

        let mut b = SigHasher::new(domain);
        b.write_u64(2);
        b.write_u64(1);

        assert_ne!(a.finalize(), b.finalize());
    }

    #[test]
    fn test_sig_hasher_domain_separation() {
        let mut a = SigHasher::new(Specifier::new("alpha"));
        a.write_u64(1);
        let mut b = SigHasher::new(Specifier::new("beta"));
        b.write_u64(1);
        assert_ne!(a.finalize(), b.finalize());
    }

    #[test]
    fn test_prefixed_bytes_prevent_boundary_shift() {
        let domain = Specifier::new("test");

        let mut a = SigHasher::new(domain);
        a.write_prefixed_bytes(b"ab");
        a.write_prefixed_bytes(b"c");

        let mut b = SigHasher::new(domain);
        b.write_prefixed_bytes(b"a");
        b.write_prefixed_bytes(b"bc");

        assert_ne!(a.finalize(), b.finalize());
    }

    #[test]
    fn test_signature_serde_round_trip() {
        let keypair = Keypair::from_seed([11u8; 32]);
        let sig = keypair.sign_hash(&Hash256([0u8; 32]));

        let encoded = bincode::serialize(&sig).expect("serialize");
        let decoded: Signature = bincode::deserialize(&encoded).expect("deserialize");
        assert_eq!(decoded, sig);
    }
}
