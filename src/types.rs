//! Primitive value types shared across the contract and payment engine.
//!
//! These are the building blocks every other module consumes: currency
//! amounts, block heights, fixed-length type tags, and 32-byte hashes.
//! Currency is an opaque unsigned amount with checked and saturating
//! arithmetic only; no arithmetic in this crate silently wraps.

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// A block height on the Skerry chain.
///
/// Heights are compared, never subtracted without a checked operation:
/// expiry and window math must not wrap.
pub type BlockHeight = u64;

/// Number of base units in one coin.
pub const COIN: u128 = 1_000_000_000_000;

// =============================================================================
// Currency
// =============================================================================

/// An amount of currency, in base units.
///
/// Backed by a `u128`, which comfortably holds the total supply times the
/// base-unit precision. All arithmetic is explicit: `checked_*` returns
/// `None` on overflow/underflow, `saturating_*` clamps. There is no `Add`
/// impl on purpose.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Currency(u128);

impl Currency {
    /// The zero amount.
    pub const ZERO: Self = Self(0);

    /// The largest representable amount.
    pub const MAX: Self = Self(u128::MAX);

    /// Create a currency amount from base units.
    #[must_use]
    pub const fn new(base_units: u128) -> Self {
        Self(base_units)
    }

    /// Create a currency amount from whole coins.
    #[must_use]
    pub const fn from_coins(coins: u64) -> Self {
        Self(coins as u128 * COIN)
    }

    /// The raw amount in base units.
    #[must_use]
    pub const fn base_units(self) -> u128 {
        self.0
    }

    /// Whether this amount is zero.
    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Checked addition.
    #[must_use]
    pub const fn checked_add(self, rhs: Self) -> Option<Self> {
        match self.0.checked_add(rhs.0) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }

    /// Checked subtraction.
    #[must_use]
    pub const fn checked_sub(self, rhs: Self) -> Option<Self> {
        match self.0.checked_sub(rhs.0) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }

    /// Checked multiplication by a scalar.
    #[must_use]
    pub const fn checked_mul(self, rhs: u64) -> Option<Self> {
        match self.0.checked_mul(rhs as u128) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }

    /// Saturating addition.
    #[must_use]
    pub const fn saturating_add(self, rhs: Self) -> Self {
        Self(self.0.saturating_add(rhs.0))
    }

    /// Saturating subtraction, clamping at zero.
    #[must_use]
    pub const fn saturating_sub(self, rhs: Self) -> Self {
        Self(self.0.saturating_sub(rhs.0))
    }

    /// Saturating multiplication by a scalar.
    #[must_use]
    pub const fn saturating_mul(self, rhs: u64) -> Self {
        Self(self.0.saturating_mul(rhs as u128))
    }

    /// Integer division by a scalar. Division by zero yields zero rather
    /// than panicking; no caller divides by an untrusted scalar.
    #[must_use]
    pub const fn div_u64(self, rhs: u64) -> Self {
        if rhs == 0 {
            Self::ZERO
        } else {
            Self(self.0 / rhs as u128)
        }
    }

    /// Round down to the nearest multiple of `denom`.
    #[must_use]
    pub const fn round_down(self, denom: u64) -> Self {
        if denom == 0 {
            self
        } else {
            Self(self.0 - self.0 % denom as u128)
        }
    }

    /// The amount as big-endian bytes, for canonical hashing.
    #[must_use]
    pub const fn to_be_bytes(self) -> [u8; 16] {
        self.0.to_be_bytes()
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Currency {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

// Currency serializes as a decimal string: TOML and JSON integers cannot
// hold a u128, and the wire codec round-trips strings losslessly.
impl Serialize for Currency {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for Currency {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct CurrencyVisitor;

        impl Visitor<'_> for CurrencyVisitor {
            type Value = Currency;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a decimal string or unsigned integer amount")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Currency, E> {
                v.parse().map_err(E::custom)
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Currency, E> {
                Ok(Currency::new(u128::from(v)))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Currency, E> {
                u64::try_from(v)
                    .map(|v| Currency::new(u128::from(v)))
                    .map_err(|_| E::custom("currency amount cannot be negative"))
            }
        }

        // deserialize_str, not deserialize_any: the wire codec (bincode) is
        // not self-describing. Self-describing formats like TOML dispatch on
        // the actual value and still hit the integer visitor arms.
        deserializer.deserialize_str(CurrencyVisitor)
    }
}

// =============================================================================
// Specifier
// =============================================================================

/// Length of a [`Specifier`] in bytes.
pub const SPECIFIER_LEN: usize = 16;

/// A fixed-length type tag identifying a protocol object or RPC.
///
/// Specifiers are human-readable ASCII padded with zeros, and are hashed
/// into every signature domain so that a signature over one object kind can
/// never be replayed as another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Specifier([u8; SPECIFIER_LEN]);

impl Specifier {
    /// Create a specifier from a string of at most 16 bytes.
    ///
    /// # Panics
    ///
    /// Panics at compile time (in const contexts) if `s` is longer than 16
    /// bytes. All specifiers in this crate are literals.
    #[must_use]
    pub const fn new(s: &str) -> Self {
        let bytes = s.as_bytes();
        assert!(bytes.len() <= SPECIFIER_LEN, "specifier too long");
        let mut out = [0u8; SPECIFIER_LEN];
        let mut i = 0;
        while i < bytes.len() {
            out[i] = bytes[i];
            i += 1;
        }
        Self(out)
    }

    /// The raw tag bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; SPECIFIER_LEN] {
        &self.0
    }
}

impl fmt::Display for Specifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let end = self.0.iter().position(|&b| b == 0).unwrap_or(SPECIFIER_LEN);
        f.write_str(&String::from_utf8_lossy(&self.0[..end]))
    }
}

// =============================================================================
// Hashes
// =============================================================================

/// A 32-byte hash.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Hash256(pub [u8; 32]);

impl Hash256 {
    /// The raw hash bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// The hash of the conditions under which an output may be spent.
///
/// [`UnlockHash::VOID`] (all zeros) is the burn address: no set of unlock
/// conditions hashes to it, so funds sent there are unspendable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UnlockHash(pub [u8; 32]);

impl UnlockHash {
    /// The burn address. Funds assigned here on a missed proof are
    /// destroyed, not redirected.
    pub const VOID: Self = Self([0u8; 32]);

    /// The raw hash bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Whether this is the burn address.
    #[must_use]
    pub fn is_void(&self) -> bool {
        *self == Self::VOID
    }
}

impl fmt::Display for UnlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}
