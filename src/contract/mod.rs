//! File contracts: the shared, collateral-backed storage agreements.
//!
//! A [`FileContract`] is the on-chain-anchored agreement between a renter
//! and a host. It carries two payout schedules: `valid_proof_outputs`
//! (renter, host) released when the host submits a storage proof inside the
//! proof window, and `missed_proof_outputs` (renter, host, void) released
//! when it does not. Funds assigned to the void output are burned.
//!
//! A [`FileContractRevision`] is a signed successor state of the same
//! agreement; revision numbers strictly increase, and the payout can never
//! change. Per-RPC payments and renewals are both expressed as revisions.

mod revision;
mod validation;

pub use revision::{FileContractRevision, RevisionError};
pub use validation::{ValidationContext, FUND_SHARE_DENOMINATION, TAX_HARDFORK_HEIGHT};

use crate::crypto::{PublicKey, SigHasher};
use crate::types::{BlockHeight, Currency, Hash256, Specifier, UnlockHash};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Index of the renter's entry in both proof-output lists.
pub const RENTER_OUTPUT_INDEX: usize = 0;

/// Index of the host's entry in both proof-output lists.
pub const HOST_OUTPUT_INDEX: usize = 1;

/// Index of the void entry in the missed proof-output list.
pub const VOID_OUTPUT_INDEX: usize = 2;

/// Number of valid-proof outputs a revised contract carries (renter, host).
pub const VALID_OUTPUT_COUNT: usize = 2;

/// Number of missed-proof outputs a revised contract carries
/// (renter, host, void).
pub const MISSED_OUTPUT_COUNT: usize = 3;

const UNLOCK_CONDITIONS_DOMAIN: Specifier = Specifier::new("unlock cond");

/// Uniquely identifies a file contract on chain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContractId(pub Hash256);

impl fmt::Display for ContractId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A payout created when a contract resolves.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofOutput {
    /// Amount released to `unlock_hash`.
    pub value: Currency,
    /// Address the funds are released to.
    pub unlock_hash: UnlockHash,
}

impl ProofOutput {
    pub(crate) fn write_to(&self, hasher: &mut SigHasher) {
        hasher.write_currency(self.value);
        hasher.write_unlock_hash(&self.unlock_hash);
    }
}

/// The conditions that must be met to spend a contract's payout, hashed
/// into the contract's aggregate [`UnlockHash`].
///
/// Contracts between a renter and a host are 2-of-2: both keys must sign
/// every revision.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnlockConditions {
    /// Earliest height at which the conditions can be satisfied.
    pub timelock: BlockHeight,
    /// Keys allowed to sign.
    pub public_keys: Vec<PublicKey>,
    /// How many of `public_keys` must sign.
    pub signatures_required: u64,
}

impl UnlockConditions {
    /// Standard 2-of-2 renter/host conditions. Key order is normative:
    /// renter first, host second.
    #[must_use]
    pub fn renter_host(renter_key: PublicKey, host_key: PublicKey) -> Self {
        Self {
            timelock: 0,
            public_keys: vec![renter_key, host_key],
            signatures_required: 2,
        }
    }

    /// The canonical hash of these conditions.
    #[must_use]
    pub fn unlock_hash(&self) -> UnlockHash {
        let mut hasher = SigHasher::new(UNLOCK_CONDITIONS_DOMAIN);
        self.write_to(&mut hasher);
        UnlockHash(hasher.finalize().0)
    }

    pub(crate) fn write_to(&self, hasher: &mut SigHasher) {
        hasher.write_u64(self.timelock);
        hasher.write_u64(self.public_keys.len() as u64);
        for key in &self.public_keys {
            hasher.write_prefixed_bytes(key.as_bytes());
        }
        hasher.write_u64(self.signatures_required);
    }
}

/// A public record of a storage agreement between a renter and a host.
///
/// Invariant: `sum(valid_proof_outputs) + tax == payout ==
/// sum(missed_proof_outputs) + tax`. Consensus enforces it on chain;
/// [`ValidationContext::payout_balanced`] checks it off chain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileContract {
    /// Size in bytes of the stored file.
    pub file_size: u64,
    /// Merkle root of the stored file.
    pub file_merkle_root: Hash256,
    /// First height at which a storage proof is accepted.
    pub window_start: BlockHeight,
    /// Last height at which a storage proof is accepted.
    pub window_end: BlockHeight,
    /// Total value locked in the contract, including tax.
    pub payout: Currency,
    /// Payouts released on a valid proof: [renter, host].
    pub valid_proof_outputs: Vec<ProofOutput>,
    /// Payouts released on a missed proof: [renter, host, void].
    pub missed_proof_outputs: Vec<ProofOutput>,
    /// Hash of the 2-of-2 renter/host unlock conditions.
    pub unlock_hash: UnlockHash,
    /// Revision counter; strictly increases with every accepted revision.
    pub revision_number: u64,
}

impl FileContract {
    /// The renter's payout on a valid proof.
    #[must_use]
    pub fn valid_renter_output(&self) -> Option<&ProofOutput> {
        self.valid_proof_outputs.get(RENTER_OUTPUT_INDEX)
    }

    /// The host's payout on a valid proof.
    #[must_use]
    pub fn valid_host_output(&self) -> Option<&ProofOutput> {
        self.valid_proof_outputs.get(HOST_OUTPUT_INDEX)
    }

    /// The renter's payout on a missed proof.
    #[must_use]
    pub fn missed_renter_output(&self) -> Option<&ProofOutput> {
        self.missed_proof_outputs.get(RENTER_OUTPUT_INDEX)
    }

    /// The host's payout on a missed proof.
    #[must_use]
    pub fn missed_host_output(&self) -> Option<&ProofOutput> {
        self.missed_proof_outputs.get(HOST_OUTPUT_INDEX)
    }

    /// The burned payout on a missed proof.
    #[must_use]
    pub fn missed_void_output(&self) -> Option<&ProofOutput> {
        self.missed_proof_outputs.get(VOID_OUTPUT_INDEX)
    }

    /// Set the host's valid-proof payout, keeping the renter's share so the
    /// total stays balanced against `payout`.
    ///
    /// # Errors
    ///
    /// Returns [`RevisionError::MissingOutput`] if the output list is not
    /// fully populated, or [`RevisionError::PaymentTooLarge`] if the new
    /// host value exceeds the combined renter+host share.
    pub fn set_valid_host_payout(&mut self, value: Currency) -> Result<(), RevisionError> {
        let renter = self
            .valid_renter_output()
            .ok_or(RevisionError::MissingOutput)?
            .value;
        let host = self
            .valid_host_output()
            .ok_or(RevisionError::MissingOutput)?
            .value;
        let total = renter
            .checked_add(host)
            .ok_or(RevisionError::PayoutOverflow)?;
        let new_renter = total
            .checked_sub(value)
            .ok_or(RevisionError::PaymentTooLarge)?;
        self.valid_proof_outputs[RENTER_OUTPUT_INDEX].value = new_renter;
        self.valid_proof_outputs[HOST_OUTPUT_INDEX].value = value;
        Ok(())
    }

    /// Set the void payout on a missed proof, adjusting the renter's missed
    /// share to keep the total balanced.
    ///
    /// # Errors
    ///
    /// Returns [`RevisionError::MissingOutput`] if the output list is not
    /// fully populated, or [`RevisionError::PaymentTooLarge`] if the new
    /// void value exceeds the combined renter+void share.
    pub fn set_missed_void_payout(&mut self, value: Currency) -> Result<(), RevisionError> {
        let renter = self
            .missed_renter_output()
            .ok_or(RevisionError::MissingOutput)?
            .value;
        let void = self
            .missed_void_output()
            .ok_or(RevisionError::MissingOutput)?
            .value;
        let total = renter
            .checked_add(void)
            .ok_or(RevisionError::PayoutOverflow)?;
        let new_renter = total
            .checked_sub(value)
            .ok_or(RevisionError::PaymentTooLarge)?;
        self.missed_proof_outputs[RENTER_OUTPUT_INDEX].value = new_renter;
        self.missed_proof_outputs[VOID_OUTPUT_INDEX].value = value;
        Ok(())
    }
}

/// Minimal transaction shape consumed by the renewal engine.
///
/// Consensus-level transaction validation is an external collaborator; the
/// engine only needs to locate the proposed contract and revision inside a
/// renewal transaction set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// New contracts created by this transaction.
    pub file_contracts: Vec<FileContract>,
    /// Revisions of existing contracts.
    pub file_contract_revisions: Vec<FileContractRevision>,
}
