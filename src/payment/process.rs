//! Host-side acceptance of contract payments.
//!
//! The host never trusts the renter's arithmetic or hash. It rebuilds the
//! proposed revision from its own copy of the contract and the wire
//! request's values, proves the proposal is a clean renter-to-host
//! transfer, recomputes the signature hash from structured fields, and
//! only then verifies the renter's signature and countersigns.

use crate::account::AccountId;
use crate::contract::{
    FileContractRevision, ValidationContext, HOST_OUTPUT_INDEX, MISSED_OUTPUT_COUNT,
    RENTER_OUTPUT_INDEX, VALID_OUTPUT_COUNT, VOID_OUTPUT_INDEX,
};
use crate::crypto::{Keypair, PublicKey};
use crate::payment::wire::{PayByContractRequest, PayByContractResponse};
use crate::payment::PaymentError;
use crate::types::Currency;
use tracing::debug;

/// Details of an accepted payment, for the host's accounting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedPayment {
    /// Account any overpayment is refunded to.
    pub refund_account: AccountId,
    /// Amount moved from the renter to the host.
    pub amount: Currency,
    /// Collateral the host added in this exchange. Always zero for a
    /// payment; renewals add collateral through their own flow.
    pub added_collateral: Currency,
}

/// Check that `proposed` is a valid payment successor of `current` and
/// return the transferred amount.
///
/// A valid payment successor increments the revision number, changes no
/// field other than the four renter/host payout values, and moves the same
/// positive amount renter→host in both the valid and missed schedules. The
/// void payout is untouched and both output sums are conserved.
///
/// # Errors
///
/// The first violated rule, named: [`PaymentError::BadRevisionNumber`],
/// [`PaymentError::BadOutputCounts`],
/// [`PaymentError::ImmutableFieldChanged`],
/// [`PaymentError::InvalidTransfer`], or [`PaymentError::ZeroAmount`].
pub fn verify_payment_revision(
    current: &FileContractRevision,
    proposed: &FileContractRevision,
) -> Result<Currency, PaymentError> {
    if proposed.new_revision_number <= current.new_revision_number {
        return Err(PaymentError::BadRevisionNumber {
            current: current.new_revision_number,
            proposed: proposed.new_revision_number,
        });
    }

    if current.new_valid_proof_outputs.len() != VALID_OUTPUT_COUNT
        || current.new_missed_proof_outputs.len() != MISSED_OUTPUT_COUNT
        || proposed.new_valid_proof_outputs.len() != VALID_OUTPUT_COUNT
        || proposed.new_missed_proof_outputs.len() != MISSED_OUTPUT_COUNT
    {
        return Err(PaymentError::BadOutputCounts);
    }

    if proposed.parent_id != current.parent_id {
        return Err(PaymentError::ImmutableFieldChanged { field: "parent id" });
    }
    if proposed.unlock_conditions != current.unlock_conditions {
        return Err(PaymentError::ImmutableFieldChanged {
            field: "unlock conditions",
        });
    }
    if proposed.new_file_size != current.new_file_size {
        return Err(PaymentError::ImmutableFieldChanged { field: "file size" });
    }
    if proposed.new_file_merkle_root != current.new_file_merkle_root {
        return Err(PaymentError::ImmutableFieldChanged {
            field: "file merkle root",
        });
    }
    if proposed.new_window_start != current.new_window_start
        || proposed.new_window_end != current.new_window_end
    {
        return Err(PaymentError::ImmutableFieldChanged {
            field: "proof window",
        });
    }
    if proposed.new_unlock_hash != current.new_unlock_hash {
        return Err(PaymentError::ImmutableFieldChanged {
            field: "unlock hash",
        });
    }

    for (cur, prop) in current
        .new_valid_proof_outputs
        .iter()
        .zip(&proposed.new_valid_proof_outputs)
        .chain(
            current
                .new_missed_proof_outputs
                .iter()
                .zip(&proposed.new_missed_proof_outputs),
        )
    {
        if cur.unlock_hash != prop.unlock_hash {
            return Err(PaymentError::ImmutableFieldChanged {
                field: "proof output addresses",
            });
        }
    }

    let valid_renter_dec = current.new_valid_proof_outputs[RENTER_OUTPUT_INDEX]
        .value
        .checked_sub(proposed.new_valid_proof_outputs[RENTER_OUTPUT_INDEX].value)
        .ok_or(PaymentError::InvalidTransfer {
            reason: "renter valid payout increased",
        })?;
    let valid_host_inc = proposed.new_valid_proof_outputs[HOST_OUTPUT_INDEX]
        .value
        .checked_sub(current.new_valid_proof_outputs[HOST_OUTPUT_INDEX].value)
        .ok_or(PaymentError::InvalidTransfer {
            reason: "host valid payout decreased",
        })?;
    let missed_renter_dec = current.new_missed_proof_outputs[RENTER_OUTPUT_INDEX]
        .value
        .checked_sub(proposed.new_missed_proof_outputs[RENTER_OUTPUT_INDEX].value)
        .ok_or(PaymentError::InvalidTransfer {
            reason: "renter missed payout increased",
        })?;
    let missed_host_inc = proposed.new_missed_proof_outputs[HOST_OUTPUT_INDEX]
        .value
        .checked_sub(current.new_missed_proof_outputs[HOST_OUTPUT_INDEX].value)
        .ok_or(PaymentError::InvalidTransfer {
            reason: "host missed payout decreased",
        })?;

    if proposed.new_missed_proof_outputs[VOID_OUTPUT_INDEX].value
        != current.new_missed_proof_outputs[VOID_OUTPUT_INDEX].value
    {
        return Err(PaymentError::InvalidTransfer {
            reason: "void payout changed",
        });
    }
    if valid_renter_dec != valid_host_inc {
        return Err(PaymentError::InvalidTransfer {
            reason: "valid payouts do not balance",
        });
    }
    if missed_renter_dec != missed_host_inc {
        return Err(PaymentError::InvalidTransfer {
            reason: "missed payouts do not balance",
        });
    }
    if valid_renter_dec != missed_renter_dec {
        return Err(PaymentError::InvalidTransfer {
            reason: "valid and missed transfers differ",
        });
    }
    if valid_renter_dec.is_zero() {
        return Err(PaymentError::ZeroAmount);
    }

    Ok(valid_renter_dec)
}

fn revision_from_request(
    current: &FileContractRevision,
    request: &PayByContractRequest,
) -> Result<FileContractRevision, PaymentError> {
    if request.new_valid_proof_values.len() != VALID_OUTPUT_COUNT
        || request.new_missed_proof_values.len() != MISSED_OUTPUT_COUNT
    {
        return Err(PaymentError::BadOutputCounts);
    }

    let mut proposed = current.clone();
    proposed.new_revision_number = request.new_revision_number;
    for (output, value) in proposed
        .new_valid_proof_outputs
        .iter_mut()
        .zip(&request.new_valid_proof_values)
    {
        output.value = *value;
    }
    for (output, value) in proposed
        .new_missed_proof_outputs
        .iter_mut()
        .zip(&request.new_missed_proof_values)
    {
        output.value = *value;
    }
    Ok(proposed)
}

/// Process a pay-by-contract request against the host's current revision.
///
/// On success returns the accepted revision (for the storage-obligation
/// manager to persist), the countersigned response for the renter, and the
/// payment details for the host's accounting. Nothing here mutates state;
/// the caller commits the revision only after this returns `Ok`.
///
/// # Errors
///
/// [`PaymentError::WrongContract`] if the request names another contract,
/// any [`verify_payment_revision`] error for a malformed transfer, and
/// [`PaymentError::RenterSignatureInvalid`] if the renter's signature does
/// not verify over the recomputed revision hash.
pub fn process_contract_payment(
    current: &FileContractRevision,
    request: &PayByContractRequest,
    vc: &ValidationContext,
    renter_key: &PublicKey,
    host_key: &Keypair,
) -> Result<(FileContractRevision, PayByContractResponse, ProcessedPayment), PaymentError> {
    if request.contract_id != current.id() {
        return Err(PaymentError::WrongContract {
            expected: current.id(),
            proposed: request.contract_id,
        });
    }

    let proposed = revision_from_request(current, request)?;
    let amount = verify_payment_revision(current, &proposed)?;

    // recompute the hash; the wire request never carries one
    let sig_hash = vc.contract_sig_hash(&proposed);
    if !renter_key.verify_hash(&sig_hash, &request.signature) {
        return Err(PaymentError::RenterSignatureInvalid);
    }

    let response = PayByContractResponse {
        signature: host_key.sign_hash(&sig_hash),
    };
    debug!(
        contract = %current.id(),
        %amount,
        revision = proposed.new_revision_number,
        "accepted contract payment"
    );
    Ok((
        proposed,
        response,
        ProcessedPayment {
            refund_account: request.refund_account,
            amount,
            added_collateral: Currency::ZERO,
        },
    ))
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use crate::account::AccountId;
    use crate::contract::ValidationContext;
    use crate::payment::tests::tracked_contract;
    use crate::payment::ContractPayment;

    fn payment_fixture() -> (ContractPayment, FileContractRevision, Keypair, PublicKey) {
        let renter = Keypair::from_seed([1u8; 32]);
        let host = Keypair::from_seed([2u8; 32]);
        let renter_public = renter.public_key();
        let contract = tracked_contract(&renter, &host, 100);
        let current = contract.revision.clone();
        let payment = ContractPayment::new(contract, renter, host.public_key(), AccountId::ZERO);
        (payment, current, host, renter_public)
    }

    #[test]
    fn test_process_accepts_genuine_request() {
        let (mut payment, current, host, renter_public) = payment_fixture();
        let vc = ValidationContext::new(500);

        let request = payment.pay(Currency::new(40), &vc).expect("pay");
        let (revision, response, details) =
            process_contract_payment(&current, &request, &vc, &renter_public, &host)
                .expect("process");

        assert_eq!(details.amount, Currency::new(40));
        assert_eq!(details.added_collateral, Currency::ZERO);
        assert_eq!(revision.new_revision_number, 2);

        // the renter accepts the countersignature and commits
        let committed = payment.commit(&response).expect("commit").clone();
        assert_eq!(committed, revision);
    }

    #[test]
    fn test_process_rejects_wrong_contract() {
        let (mut payment, current, host, renter_public) = payment_fixture();
        let vc = ValidationContext::new(500);

        let mut request = payment.pay(Currency::new(5), &vc).expect("pay");
        request.contract_id = crate::contract::ContractId(crate::types::Hash256([9u8; 32]));

        let err = process_contract_payment(&current, &request, &vc, &renter_public, &host)
            .expect_err("wrong contract");
        assert!(matches!(err, PaymentError::WrongContract { .. }));
    }

    #[test]
    fn test_process_rejects_tampered_values() {
        let (mut payment, current, host, renter_public) = payment_fixture();
        let vc = ValidationContext::new(500);

        // a relayed request with the host payout inflated beyond the
        // renter's deduction is not a clean transfer
        let mut request = payment.pay(Currency::new(5), &vc).expect("pay");
        request.new_valid_proof_values[HOST_OUTPUT_INDEX] = Currency::new(999);

        let err = process_contract_payment(&current, &request, &vc, &renter_public, &host)
            .expect_err("tampered");
        assert!(matches!(err, PaymentError::InvalidTransfer { .. }));
    }

    #[test]
    fn test_process_rejects_forged_signature() {
        let (mut payment, current, host, renter_public) = payment_fixture();
        let vc = ValidationContext::new(500);

        let mut request = payment.pay(Currency::new(5), &vc).expect("pay");
        request.signature.0[0] ^= 1;

        let err = process_contract_payment(&current, &request, &vc, &renter_public, &host)
            .expect_err("forged");
        assert_eq!(err, PaymentError::RenterSignatureInvalid);
    }

    #[test]
    fn test_verify_rejects_stale_revision_number() {
        let (_, current, _, _) = payment_fixture();
        let proposed = current.clone();
        assert!(matches!(
            verify_payment_revision(&current, &proposed),
            Err(PaymentError::BadRevisionNumber { current: 1, proposed: 1 })
        ));
    }

    #[test]
    fn test_verify_rejects_window_change() {
        let (_, current, _, _) = payment_fixture();
        let mut proposed = current.payment_revision(Currency::new(5)).expect("pay");
        proposed.new_window_end += 1;
        assert_eq!(
            verify_payment_revision(&current, &proposed),
            Err(PaymentError::ImmutableFieldChanged {
                field: "proof window"
            })
        );
    }

    #[test]
    fn test_verify_rejects_redirected_output() {
        let (_, current, _, _) = payment_fixture();
        let mut proposed = current.payment_revision(Currency::new(5)).expect("pay");
        proposed.new_valid_proof_outputs[HOST_OUTPUT_INDEX].unlock_hash =
            crate::types::UnlockHash([7u8; 32]);
        assert_eq!(
            verify_payment_revision(&current, &proposed),
            Err(PaymentError::ImmutableFieldChanged {
                field: "proof output addresses"
            })
        );
    }

    #[test]
    fn test_verify_rejects_void_drain() {
        let (_, current, _, _) = payment_fixture();
        // renter tries to route the missed deduction into the void
        let mut proposed = current.payment_revision(Currency::new(5)).expect("pay");
        proposed.new_missed_proof_outputs[HOST_OUTPUT_INDEX].value = current
            .new_missed_proof_outputs[HOST_OUTPUT_INDEX]
            .value;
        proposed.new_missed_proof_outputs[VOID_OUTPUT_INDEX].value = Currency::new(5);
        assert_eq!(
            verify_payment_revision(&current, &proposed),
            Err(PaymentError::InvalidTransfer {
                reason: "void payout changed"
            })
        );
    }

    #[test]
    fn test_verify_rejects_zero_transfer() {
        let (_, current, _, _) = payment_fixture();
        let mut proposed = current.clone();
        proposed.new_revision_number += 1;
        assert_eq!(
            verify_payment_revision(&current, &proposed),
            Err(PaymentError::ZeroAmount)
        );
    }
}
