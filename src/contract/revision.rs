//! Contract revisions and the payment successor derivation.

use crate::contract::{
    ContractId, ProofOutput, UnlockConditions, HOST_OUTPUT_INDEX, MISSED_OUTPUT_COUNT,
    RENTER_OUTPUT_INDEX, VALID_OUTPUT_COUNT, VOID_OUTPUT_INDEX,
};
use crate::crypto::SigHasher;
use crate::types::{BlockHeight, Currency, Hash256, UnlockHash};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from deriving or adjusting a revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RevisionError {
    /// A required proof output is missing from the revision.
    #[error("revision is missing a required proof output")]
    MissingOutput,

    /// The requested transfer exceeds the paying output's balance.
    #[error("payment exceeds the available output balance")]
    PaymentTooLarge,

    /// An output adjustment would overflow the payout.
    #[error("proof output values overflow")]
    PayoutOverflow,

    /// The revision counter cannot be incremented further.
    #[error("revision number exhausted")]
    RevisionNumberExhausted,
}

/// A signed successor state of a [`FileContract`].
///
/// The payout of the parent contract cannot change; a revision only
/// redistributes it. A revision is only meaningful once both parties have
/// signed its hash.
///
/// [`FileContract`]: crate::contract::FileContract
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileContractRevision {
    /// The contract being revised.
    pub parent_id: ContractId,
    /// Conditions authorizing this revision; must hash to the parent
    /// contract's unlock hash.
    pub unlock_conditions: UnlockConditions,
    /// Successor revision counter; must exceed every previously accepted
    /// revision of the parent.
    pub new_revision_number: u64,
    /// Revised file size in bytes.
    pub new_file_size: u64,
    /// Revised file merkle root.
    pub new_file_merkle_root: Hash256,
    /// Revised proof-window start.
    pub new_window_start: BlockHeight,
    /// Revised proof-window end.
    pub new_window_end: BlockHeight,
    /// Revised valid-proof payouts: [renter, host].
    pub new_valid_proof_outputs: Vec<ProofOutput>,
    /// Revised missed-proof payouts: [renter, host, void].
    pub new_missed_proof_outputs: Vec<ProofOutput>,
    /// Revised aggregate unlock hash.
    pub new_unlock_hash: UnlockHash,
}

impl FileContractRevision {
    /// The contract this revision belongs to.
    #[must_use]
    pub const fn id(&self) -> ContractId {
        self.parent_id
    }

    /// The renter's remaining spendable balance.
    #[must_use]
    pub fn renter_funds(&self) -> Currency {
        self.new_valid_proof_outputs
            .get(RENTER_OUTPUT_INDEX)
            .map_or(Currency::ZERO, |o| o.value)
    }

    /// The height at which the host's storage duty under this revision ends.
    #[must_use]
    pub const fn end_height(&self) -> BlockHeight {
        self.new_window_start
    }

    /// The renter's valid-proof payout.
    #[must_use]
    pub fn valid_renter_output(&self) -> Option<&ProofOutput> {
        self.new_valid_proof_outputs.get(RENTER_OUTPUT_INDEX)
    }

    /// The host's valid-proof payout.
    #[must_use]
    pub fn valid_host_output(&self) -> Option<&ProofOutput> {
        self.new_valid_proof_outputs.get(HOST_OUTPUT_INDEX)
    }

    /// The renter's missed-proof payout.
    #[must_use]
    pub fn missed_renter_output(&self) -> Option<&ProofOutput> {
        self.new_missed_proof_outputs.get(RENTER_OUTPUT_INDEX)
    }

    /// The host's missed-proof payout.
    #[must_use]
    pub fn missed_host_output(&self) -> Option<&ProofOutput> {
        self.new_missed_proof_outputs.get(HOST_OUTPUT_INDEX)
    }

    /// The burned missed-proof payout.
    #[must_use]
    pub fn missed_void_output(&self) -> Option<&ProofOutput> {
        self.new_missed_proof_outputs.get(VOID_OUTPUT_INDEX)
    }

    /// Derive the successor revision that moves `amount` from the renter to
    /// the host, paying for RPC usage.
    ///
    /// The revision number is incremented and `amount` moves from the
    /// renter's valid and missed payouts to the host's valid and missed
    /// payouts. The sums of both output lists are unchanged: a payment
    /// never creates or destroys currency.
    ///
    /// # Errors
    ///
    /// Returns [`RevisionError::PaymentTooLarge`] if either renter payout
    /// cannot cover `amount`, [`RevisionError::MissingOutput`] if the
    /// output lists are not fully populated, and
    /// [`RevisionError::RevisionNumberExhausted`] if the counter would wrap.
    pub fn payment_revision(&self, amount: Currency) -> Result<Self, RevisionError> {
        if self.new_valid_proof_outputs.len() < VALID_OUTPUT_COUNT
            || self.new_missed_proof_outputs.len() < MISSED_OUTPUT_COUNT
        {
            return Err(RevisionError::MissingOutput);
        }

        let mut rev = self.clone();
        rev.new_revision_number = self
            .new_revision_number
            .checked_add(1)
            .ok_or(RevisionError::RevisionNumberExhausted)?;

        let valid_renter = self.new_valid_proof_outputs[RENTER_OUTPUT_INDEX]
            .value
            .checked_sub(amount)
            .ok_or(RevisionError::PaymentTooLarge)?;
        let missed_renter = self.new_missed_proof_outputs[RENTER_OUTPUT_INDEX]
            .value
            .checked_sub(amount)
            .ok_or(RevisionError::PaymentTooLarge)?;
        let valid_host = self.new_valid_proof_outputs[HOST_OUTPUT_INDEX]
            .value
            .checked_add(amount)
            .ok_or(RevisionError::PayoutOverflow)?;
        let missed_host = self.new_missed_proof_outputs[HOST_OUTPUT_INDEX]
            .value
            .checked_add(amount)
            .ok_or(RevisionError::PayoutOverflow)?;

        rev.new_valid_proof_outputs[RENTER_OUTPUT_INDEX].value = valid_renter;
        rev.new_valid_proof_outputs[HOST_OUTPUT_INDEX].value = valid_host;
        rev.new_missed_proof_outputs[RENTER_OUTPUT_INDEX].value = missed_renter;
        rev.new_missed_proof_outputs[HOST_OUTPUT_INDEX].value = missed_host;
        Ok(rev)
    }

    pub(crate) fn write_to(&self, hasher: &mut SigHasher) {
        hasher.write_bytes(self.parent_id.0.as_bytes());
        self.unlock_conditions.write_to(hasher);
        hasher.write_u64(self.new_revision_number);
        hasher.write_u64(self.new_file_size);
        hasher.write_bytes(self.new_file_merkle_root.as_bytes());
        hasher.write_u64(self.new_window_start);
        hasher.write_u64(self.new_window_end);
        hasher.write_u64(self.new_valid_proof_outputs.len() as u64);
        for output in &self.new_valid_proof_outputs {
            output.write_to(hasher);
        }
        hasher.write_u64(self.new_missed_proof_outputs.len() as u64);
        for output in &self.new_missed_proof_outputs {
            output.write_to(hasher);
        }
        hasher.write_unlock_hash(&self.new_unlock_hash);
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;

    fn funded_revision(renter: u128, host: u128) -> FileContractRevision {
        FileContractRevision {
            new_revision_number: 5,
            new_valid_proof_outputs: vec![
                ProofOutput {
                    value: Currency::new(renter),
                    unlock_hash: UnlockHash([1u8; 32]),
                },
                ProofOutput {
                    value: Currency::new(host),
                    unlock_hash: UnlockHash([2u8; 32]),
                },
            ],
            new_missed_proof_outputs: vec![
                ProofOutput {
                    value: Currency::new(renter),
                    unlock_hash: UnlockHash([1u8; 32]),
                },
                ProofOutput {
                    value: Currency::new(host),
                    unlock_hash: UnlockHash([2u8; 32]),
                },
                ProofOutput {
                    value: Currency::ZERO,
                    unlock_hash: UnlockHash::VOID,
                },
            ],
            ..FileContractRevision::default()
        }
    }

    #[test]
    fn test_payment_revision_moves_funds_and_increments() {
        let rev = funded_revision(100, 10);
        let paid = rev.payment_revision(Currency::new(25)).expect("pay");

        assert_eq!(paid.new_revision_number, 6);
        assert_eq!(paid.renter_funds(), Currency::new(75));
        assert_eq!(paid.valid_host_output().expect("host").value, Currency::new(35));
        assert_eq!(paid.missed_renter_output().expect("renter").value, Currency::new(75));
        assert_eq!(paid.missed_host_output().expect("host").value, Currency::new(35));
        // void untouched by a payment
        assert_eq!(paid.missed_void_output().expect("void").value, Currency::ZERO);
    }

    #[test]
    fn test_payment_revision_conserves_output_sums() {
        let rev = funded_revision(100, 10);
        let paid = rev.payment_revision(Currency::new(60)).expect("pay");

        let sum = |outputs: &[ProofOutput]| {
            outputs.iter().fold(Currency::ZERO, |acc, o| {
                acc.checked_add(o.value).expect("no overflow")
            })
        };
        assert_eq!(sum(&rev.new_valid_proof_outputs), sum(&paid.new_valid_proof_outputs));
        assert_eq!(sum(&rev.new_missed_proof_outputs), sum(&paid.new_missed_proof_outputs));
    }

    #[test]
    fn test_payment_revision_rejects_overdraft() {
        let rev = funded_revision(100, 10);
        assert_eq!(
            rev.payment_revision(Currency::new(101)),
            Err(RevisionError::PaymentTooLarge)
        );
        // exact balance is spendable
        assert!(rev.payment_revision(Currency::new(100)).is_ok());
    }

    #[test]
    fn test_payment_revision_rejects_incomplete_outputs() {
        let mut rev = funded_revision(100, 10);
        rev.new_missed_proof_outputs.pop();
        assert_eq!(
            rev.payment_revision(Currency::new(1)),
            Err(RevisionError::MissingOutput)
        );
    }
}
