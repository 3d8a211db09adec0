//! Ephemeral accounts and the withdrawal protocol.
//!
//! An ephemeral account is a prepaid balance a renter holds with a host,
//! identified by a public key. Spending from it takes a signed, expiring
//! [`WithdrawalMessage`] instead of a full contract revision, which keeps
//! per-RPC payments cheap.
//!
//! Validation here is pure: expiry and signature checks only. Balance
//! deduction belongs to the host's account ledger, and replay defense to
//! [`ReplayGuard`], both of which run after validation succeeds.

mod replay;

pub use replay::ReplayGuard;

use crate::crypto::{PublicKey, SigHasher, Signature, PUBLIC_KEY_LEN};
use crate::types::{BlockHeight, Currency, Hash256, Specifier};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Size of a withdrawal nonce in bytes.
pub const WITHDRAWAL_NONCE_LEN: usize = 8;

const ACCOUNT_ID_PREFIX: &str = "ed25519:";
const WITHDRAWAL_SIG_DOMAIN: Specifier = Specifier::new("withdrawal");

/// A single failed withdrawal check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum WithdrawalError {
    /// The message's expiry height has passed.
    #[error("withdrawal expired at height {expiry}, chain is at {current}")]
    Expired {
        /// Expiry height of the message.
        expiry: BlockHeight,
        /// Current chain height.
        current: BlockHeight,
    },

    /// The message expires further into the future than host policy allows.
    #[error("withdrawal expiry {expiry} exceeds the policy maximum {max}")]
    TooFarInFuture {
        /// Expiry height of the message.
        expiry: BlockHeight,
        /// Highest expiry the host accepts right now.
        max: BlockHeight,
    },

    /// The signature does not verify under the account's key.
    #[error("withdrawal signature is invalid")]
    InvalidSignature,

    /// The zero account can never authorize a withdrawal.
    #[error("the zero account cannot authorize withdrawals")]
    ZeroAccount,

    /// The withdrawal amount is zero.
    #[error("withdrawal amount must be greater than zero")]
    ZeroAmount,

    /// An identical withdrawal was already processed.
    #[error("withdrawal was already processed")]
    Replayed,
}

/// Aggregate result of withdrawal validation.
///
/// The expiry check and the signature check run independently; every
/// failure is reported so a caller can distinguish "expired AND badly
/// signed" from either alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WithdrawalValidationError {
    failures: Vec<WithdrawalError>,
}

impl WithdrawalValidationError {
    /// Every check that failed, in check order.
    #[must_use]
    pub fn failures(&self) -> &[WithdrawalError] {
        &self.failures
    }

    /// Whether a specific failure kind was reported.
    #[must_use]
    pub fn contains(&self, failure: &WithdrawalError) -> bool {
        self.failures.contains(failure)
    }
}

impl fmt::Display for WithdrawalValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, failure) in self.failures.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{failure}")?;
        }
        Ok(())
    }
}

impl std::error::Error for WithdrawalValidationError {}

impl From<WithdrawalError> for WithdrawalValidationError {
    fn from(failure: WithdrawalError) -> Self {
        Self {
            failures: vec![failure],
        }
    }
}

/// Failed to parse an [`AccountId`] from its string form.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed account id: {reason}")]
pub struct AccountIdParseError {
    reason: String,
}

// =============================================================================
// AccountId
// =============================================================================

/// Identifies an ephemeral account on a host.
///
/// Always either a valid public key or [`AccountId::ZERO`], the reserved
/// sentinel meaning "no account". The zero account never authorizes a
/// withdrawal; [`AccountId::is_zero`] is the only predicate for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AccountId(Option<PublicKey>);

impl AccountId {
    /// The reserved sentinel account. Encodes as an empty payload.
    pub const ZERO: Self = Self(None);

    /// Create an account id from a public key. Infallible: every key is a
    /// valid account id.
    #[must_use]
    pub const fn from_public_key(key: PublicKey) -> Self {
        Self(Some(key))
    }

    /// Whether this is the reserved zero account.
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.0.is_none()
    }

    /// The account's public key, or `None` for the zero account.
    #[must_use]
    pub const fn public_key(&self) -> Option<PublicKey> {
        self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            None => Ok(()),
            Some(key) => write!(f, "{ACCOUNT_ID_PREFIX}{key}"),
        }
    }
}

impl FromStr for AccountId {
    type Err = AccountIdParseError;

    /// Parse `ed25519:<64 hex chars>`; the empty string parses to the zero
    /// account and nothing else does.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Ok(Self::ZERO);
        }
        let hex_part = s
            .strip_prefix(ACCOUNT_ID_PREFIX)
            .ok_or_else(|| AccountIdParseError {
                reason: format!("missing '{ACCOUNT_ID_PREFIX}' prefix"),
            })?;
        let bytes = hex::decode(hex_part).map_err(|e| AccountIdParseError {
            reason: format!("invalid hex: {e}"),
        })?;
        let key: [u8; PUBLIC_KEY_LEN] = bytes.try_into().map_err(|_| AccountIdParseError {
            reason: format!("key must be {PUBLIC_KEY_LEN} bytes"),
        })?;
        Ok(Self::from_public_key(PublicKey(key)))
    }
}

impl Serialize for AccountId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for AccountId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct AccountIdVisitor;

        impl Visitor<'_> for AccountIdVisitor {
            type Value = AccountId;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an account id string")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<AccountId, E> {
                v.parse().map_err(E::custom)
            }
        }

        deserializer.deserialize_str(AccountIdVisitor)
    }
}

// =============================================================================
// WithdrawalMessage
// =============================================================================

/// A signed, expiring instruction to debit an ephemeral account.
///
/// Created once per payment, signed by the account's key, consumed exactly
/// once by the host. The nonce makes two otherwise-identical withdrawals
/// distinct, so the host's replay defense can tell a retry from a replay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalMessage {
    /// The account being debited.
    pub account: AccountId,
    /// Height after which the message is no longer valid.
    pub expiry: BlockHeight,
    /// Amount to withdraw. Must be greater than zero.
    pub amount: Currency,
    /// Single-use random nonce.
    pub nonce: [u8; WITHDRAWAL_NONCE_LEN],
}

impl WithdrawalMessage {
    /// The canonical hash the account key signs.
    #[must_use]
    pub fn sig_hash(&self) -> Hash256 {
        let mut hasher = SigHasher::new(WITHDRAWAL_SIG_DOMAIN);
        match self.account.public_key() {
            Some(key) => hasher.write_prefixed_bytes(key.as_bytes()),
            None => hasher.write_prefixed_bytes(&[]),
        }
        hasher.write_u64(self.expiry);
        hasher.write_currency(self.amount);
        hasher.write_bytes(&self.nonce);
        hasher.finalize()
    }

    /// The replay fingerprint of this message. Identical to the signature
    /// hash: the nonce already makes every legitimate message unique.
    #[must_use]
    pub fn fingerprint(&self) -> Hash256 {
        self.sig_hash()
    }

    /// Check the expiry window only.
    ///
    /// # Errors
    ///
    /// [`WithdrawalError::Expired`] if the chain has passed `expiry`;
    /// [`WithdrawalError::TooFarInFuture`] if `expiry` exceeds
    /// `max_expiry`, the host's policy bound (typically current height
    /// plus a fixed number of blocks).
    pub fn validate_expiry(
        &self,
        current_height: BlockHeight,
        max_expiry: BlockHeight,
    ) -> Result<(), WithdrawalError> {
        if current_height > self.expiry {
            return Err(WithdrawalError::Expired {
                expiry: self.expiry,
                current: current_height,
            });
        }
        if self.expiry > max_expiry {
            return Err(WithdrawalError::TooFarInFuture {
                expiry: self.expiry,
                max: max_expiry,
            });
        }
        Ok(())
    }

    /// Check the signature only.
    ///
    /// Never attempts verification against the zero account.
    ///
    /// # Errors
    ///
    /// [`WithdrawalError::ZeroAccount`] for the zero account,
    /// [`WithdrawalError::InvalidSignature`] on verification failure.
    pub fn validate_signature(
        &self,
        hash: &Hash256,
        signature: &Signature,
    ) -> Result<(), WithdrawalError> {
        let Some(key) = self.account.public_key() else {
            return Err(WithdrawalError::ZeroAccount);
        };
        if key.verify_hash(hash, signature) {
            Ok(())
        } else {
            Err(WithdrawalError::InvalidSignature)
        }
    }

    /// Validate the message for processing at `current_height`.
    ///
    /// Runs the expiry check and the signature check independently and
    /// reports every failure, so the caller sees "expired AND badly
    /// signed" rather than whichever happened to be checked first. Pure:
    /// identical inputs always yield identical results, and no state is
    /// touched.
    ///
    /// # Errors
    ///
    /// A [`WithdrawalValidationError`] listing each failed check.
    pub fn validate(
        &self,
        current_height: BlockHeight,
        max_expiry: BlockHeight,
        hash: &Hash256,
        signature: &Signature,
    ) -> Result<(), WithdrawalValidationError> {
        let mut failures = Vec::new();
        if let Err(e) = self.validate_expiry(current_height, max_expiry) {
            failures.push(e);
        }
        if let Err(e) = self.validate_signature(hash, signature) {
            failures.push(e);
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(WithdrawalValidationError { failures })
        }
    }
}
