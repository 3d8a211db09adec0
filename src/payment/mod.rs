//! The payment protocol: charging for individual RPCs.
//!
//! A renter pays a host per RPC in one of two ways:
//!
//! 1. **By contract** — a signed revision of an open file contract moves
//!    the amount from the renter's payouts to the host's. The renter signs
//!    first; the host verifies, countersigns, and only then does the
//!    renter commit the revision locally.
//! 2. **By ephemeral account** — a signed [`WithdrawalMessage`] debits a
//!    prepaid account. No contract state changes; the host's account
//!    ledger applies the debit after validation.
//!
//! [`PaymentMethod`] is a closed variant over exactly these two, so every
//! dispatch site is exhaustively matched and a third method cannot be
//! added without the compiler pointing at each of them.

mod process;
pub mod wire;

pub use process::{process_contract_payment, verify_payment_revision, ProcessedPayment};
pub use wire::{
    PayByContractRequest, PayByContractResponse, PayByEphemeralAccountRequest,
    PayByEphemeralAccountResponse, PaymentRequestPreamble, WireError, PAY_BY_CONTRACT,
    PAY_BY_EPHEMERAL_ACCOUNT,
};

use crate::account::{AccountId, WithdrawalMessage, WITHDRAWAL_NONCE_LEN};
use crate::contract::{ContractId, FileContractRevision, RevisionError, ValidationContext};
use crate::crypto::{Keypair, PublicKey, Signature};
use crate::types::{BlockHeight, Currency, Hash256, Specifier};
use thiserror::Error;
use tracing::debug;

/// Errors from constructing or processing a payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PaymentError {
    /// Payments must move a positive amount.
    #[error("payment amount must be greater than zero")]
    ZeroAmount,

    /// The zero account cannot take part in a payment.
    #[error("the zero account cannot take part in a payment")]
    ZeroAccount,

    /// The contract cannot cover the requested amount.
    #[error("insufficient renter funds: {available} available, {required} required")]
    InsufficientRenterFunds {
        /// Smallest spendable renter balance across both payout schedules.
        available: Currency,
        /// The amount that was requested.
        required: Currency,
    },

    /// A revision is already awaiting the host's countersignature.
    #[error("a payment revision is already in flight for this contract")]
    PaymentInFlight,

    /// There is no revision awaiting a countersignature.
    #[error("no payment is pending for this contract")]
    NoPendingPayment,

    /// The host's countersignature does not verify.
    #[error("host signature is invalid")]
    HostSignatureInvalid,

    /// The renter's signature does not verify.
    #[error("renter signature is invalid")]
    RenterSignatureInvalid,

    /// The request names a different contract.
    #[error("payment names contract {proposed}, expected {expected}")]
    WrongContract {
        /// The contract the host holds.
        expected: ContractId,
        /// The contract the request named.
        proposed: ContractId,
    },

    /// The proposed revision number does not increase.
    #[error("revision number must increase: current {current}, proposed {proposed}")]
    BadRevisionNumber {
        /// Revision number of the host's current revision.
        current: u64,
        /// Revision number the request proposed.
        proposed: u64,
    },

    /// A field a payment may never change was changed.
    #[error("payment revision changed an immutable field: {field}")]
    ImmutableFieldChanged {
        /// Name of the offending field.
        field: &'static str,
    },

    /// The proposed output lists have the wrong shape.
    #[error("payment revision has the wrong proof output counts")]
    BadOutputCounts,

    /// The output values do not describe a renter-to-host transfer.
    #[error("payment revision is not a clean renter-to-host transfer: {reason}")]
    InvalidTransfer {
        /// What was wrong with the value movement.
        reason: &'static str,
    },

    /// Deriving the successor revision failed.
    #[error(transparent)]
    Revision(#[from] RevisionError),
}

/// A renter's locally tracked contract: the latest revision both parties
/// have signed.
#[derive(Debug, Clone)]
pub struct TrackedContract {
    /// The contract's chain id.
    pub id: ContractId,
    /// Latest mutually signed revision.
    pub revision: FileContractRevision,
    /// Renter's signature over `revision`.
    pub renter_signature: Signature,
    /// Host's signature over `revision`.
    pub host_signature: Signature,
}

#[derive(Debug)]
struct PendingRevision {
    revision: FileContractRevision,
    sig_hash: Hash256,
    renter_signature: Signature,
}

/// Pay-by-contract state for one renter-host session.
///
/// At most one revision is in flight at a time; [`ContractPayment::pay`]
/// refuses to start a second until the first is committed or cleared.
#[derive(Debug)]
pub struct ContractPayment {
    contract: TrackedContract,
    key: Keypair,
    host_key: PublicKey,
    refund_account: AccountId,
    pending: Option<PendingRevision>,
}

impl ContractPayment {
    /// Create a contract payment method.
    #[must_use]
    pub fn new(
        contract: TrackedContract,
        key: Keypair,
        host_key: PublicKey,
        refund_account: AccountId,
    ) -> Self {
        Self {
            contract,
            key,
            host_key,
            refund_account,
            pending: None,
        }
    }

    /// The latest committed contract state.
    #[must_use]
    pub fn contract(&self) -> &TrackedContract {
        &self.contract
    }

    /// Whether a revision is awaiting the host's countersignature.
    #[must_use]
    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Build a signed payment request moving `amount` to the host.
    ///
    /// The derived revision is held as pending and is not committed until
    /// [`ContractPayment::commit`] verifies the host's countersignature.
    ///
    /// # Errors
    ///
    /// [`PaymentError::InsufficientRenterFunds`] if either renter payout
    /// cannot cover the amount, [`PaymentError::PaymentInFlight`] if an
    /// earlier payment has not been committed or cleared, and
    /// [`PaymentError::ZeroAmount`] for a zero amount.
    pub fn pay(
        &mut self,
        amount: Currency,
        vc: &ValidationContext,
    ) -> Result<PayByContractRequest, PaymentError> {
        if amount.is_zero() {
            return Err(PaymentError::ZeroAmount);
        }
        if self.pending.is_some() {
            return Err(PaymentError::PaymentInFlight);
        }

        let valid_renter = self
            .contract
            .revision
            .valid_renter_output()
            .map_or(Currency::ZERO, |o| o.value);
        let missed_renter = self
            .contract
            .revision
            .missed_renter_output()
            .map_or(Currency::ZERO, |o| o.value);
        let available = valid_renter.min(missed_renter);
        if available < amount {
            return Err(PaymentError::InsufficientRenterFunds {
                available,
                required: amount,
            });
        }

        let revision = self.contract.revision.payment_revision(amount)?;
        let sig_hash = vc.contract_sig_hash(&revision);
        let renter_signature = self.key.sign_hash(&sig_hash);

        let request = PayByContractRequest {
            contract_id: self.contract.id,
            new_revision_number: revision.new_revision_number,
            new_valid_proof_values: revision
                .new_valid_proof_outputs
                .iter()
                .map(|o| o.value)
                .collect(),
            new_missed_proof_values: revision
                .new_missed_proof_outputs
                .iter()
                .map(|o| o.value)
                .collect(),
            refund_account: self.refund_account,
            signature: renter_signature,
        };

        debug!(
            contract = %self.contract.id,
            %amount,
            revision = revision.new_revision_number,
            "built contract payment request"
        );
        self.pending = Some(PendingRevision {
            revision,
            sig_hash,
            renter_signature,
        });
        Ok(request)
    }

    /// Verify the host's countersignature and commit the pending revision.
    ///
    /// Verification and commit are atomic: on any failure the tracked
    /// contract is untouched and the pending revision is retained, so an
    /// honest retry of the same RPC can still complete.
    ///
    /// # Errors
    ///
    /// [`PaymentError::NoPendingPayment`] without an in-flight revision,
    /// [`PaymentError::HostSignatureInvalid`] if the countersignature does
    /// not verify.
    pub fn commit(
        &mut self,
        response: &PayByContractResponse,
    ) -> Result<&FileContractRevision, PaymentError> {
        let pending = self.pending.as_ref().ok_or(PaymentError::NoPendingPayment)?;
        if !self.host_key.verify_hash(&pending.sig_hash, &response.signature) {
            return Err(PaymentError::HostSignatureInvalid);
        }

        // the take() is unconditional now that the signature verified
        let Some(pending) = self.pending.take() else {
            return Err(PaymentError::NoPendingPayment);
        };
        self.contract.revision = pending.revision;
        self.contract.renter_signature = pending.renter_signature;
        self.contract.host_signature = response.signature;
        debug!(
            contract = %self.contract.id,
            revision = self.contract.revision.new_revision_number,
            "committed contract payment"
        );
        Ok(&self.contract.revision)
    }

    /// Abandon the in-flight revision after a failed RPC.
    pub fn clear_pending(&mut self) {
        self.pending = None;
    }
}

/// Pay-by-ephemeral-account state for one renter-host session.
#[derive(Debug)]
pub struct AccountPayment {
    account: AccountId,
    key: Keypair,
    expiry: BlockHeight,
}

impl AccountPayment {
    /// Create an ephemeral-account payment method. `expiry` is the height
    /// after which issued withdrawals lapse.
    #[must_use]
    pub fn new(account: AccountId, key: Keypair, expiry: BlockHeight) -> Self {
        Self {
            account,
            key,
            expiry,
        }
    }

    /// The account being spent from.
    #[must_use]
    pub fn account(&self) -> AccountId {
        self.account
    }

    /// Build a signed withdrawal for `amount` with a fresh nonce.
    ///
    /// No local state is mutated; the balance check happens host-side.
    ///
    /// # Errors
    ///
    /// [`PaymentError::ZeroAmount`] for a zero amount,
    /// [`PaymentError::ZeroAccount`] if the method was built on the zero
    /// account.
    pub fn pay(&self, amount: Currency) -> Result<PayByEphemeralAccountRequest, PaymentError> {
        if amount.is_zero() {
            return Err(PaymentError::ZeroAmount);
        }
        if self.account.is_zero() {
            return Err(PaymentError::ZeroAccount);
        }

        let message = WithdrawalMessage {
            account: self.account,
            expiry: self.expiry,
            amount,
            nonce: rand::random::<[u8; WITHDRAWAL_NONCE_LEN]>(),
        };
        let signature = self.key.sign_hash(&message.sig_hash());
        debug!(account = %self.account, %amount, expiry = self.expiry, "built withdrawal request");
        Ok(PayByEphemeralAccountRequest {
            message,
            signature,
            priority: 0,
        })
    }
}

/// How a renter pays for an RPC. Closed on purpose: adding a method means
/// revisiting every dispatch site.
#[derive(Debug)]
pub enum PaymentMethod {
    /// Revise an open file contract.
    ByContract(ContractPayment),
    /// Debit a prepaid ephemeral account.
    ByEphemeralAccount(AccountPayment),
}

/// A built, signed payment request, ready for the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentRequest {
    /// A contract revision payment.
    ByContract(PayByContractRequest),
    /// An ephemeral-account withdrawal.
    ByEphemeralAccount(PayByEphemeralAccountRequest),
}

impl PaymentRequest {
    /// The specifier announcing this request on the wire.
    #[must_use]
    pub fn kind(&self) -> Specifier {
        match self {
            Self::ByContract(_) => PAY_BY_CONTRACT,
            Self::ByEphemeralAccount(_) => PAY_BY_EPHEMERAL_ACCOUNT,
        }
    }

    /// The preamble announcing this request.
    #[must_use]
    pub fn preamble(&self) -> PaymentRequestPreamble {
        PaymentRequestPreamble { kind: self.kind() }
    }
}

impl PaymentMethod {
    /// Build a signed payment request for `amount`.
    ///
    /// # Errors
    ///
    /// Propagates the underlying method's errors; see
    /// [`ContractPayment::pay`] and [`AccountPayment::pay`].
    pub fn pay(
        &mut self,
        amount: Currency,
        vc: &ValidationContext,
    ) -> Result<PaymentRequest, PaymentError> {
        match self {
            Self::ByContract(contract) => contract.pay(amount, vc).map(PaymentRequest::ByContract),
            Self::ByEphemeralAccount(account) => {
                account.pay(amount).map(PaymentRequest::ByEphemeralAccount)
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
pub(crate) mod tests {
    use super::*;
    use crate::contract::{
        ProofOutput, UnlockConditions, HOST_OUTPUT_INDEX, RENTER_OUTPUT_INDEX, VOID_OUTPUT_INDEX,
    };
    use crate::types::UnlockHash;

    pub(crate) fn tracked_contract(
        renter_key: &Keypair,
        host_key: &Keypair,
        funds: u128,
    ) -> TrackedContract {
        let conditions =
            UnlockConditions::renter_host(renter_key.public_key(), host_key.public_key());
        let unlock_hash = conditions.unlock_hash();
        let revision = FileContractRevision {
            parent_id: ContractId(Hash256([5u8; 32])),
            unlock_conditions: conditions,
            new_revision_number: 1,
            new_window_start: 1000,
            new_window_end: 1100,
            new_valid_proof_outputs: vec![
                ProofOutput {
                    value: Currency::new(funds),
                    unlock_hash: UnlockHash([1u8; 32]),
                },
                ProofOutput {
                    value: Currency::new(10),
                    unlock_hash: UnlockHash([2u8; 32]),
                },
            ],
            new_missed_proof_outputs: vec![
                ProofOutput {
                    value: Currency::new(funds),
                    unlock_hash: UnlockHash([1u8; 32]),
                },
                ProofOutput {
                    value: Currency::new(10),
                    unlock_hash: UnlockHash([2u8; 32]),
                },
                ProofOutput {
                    value: Currency::ZERO,
                    unlock_hash: UnlockHash::VOID,
                },
            ],
            new_unlock_hash: unlock_hash,
            ..FileContractRevision::default()
        };
        TrackedContract {
            id: revision.parent_id,
            revision,
            renter_signature: Signature::EMPTY,
            host_signature: Signature::EMPTY,
        }
    }

    #[test]
    fn test_contract_pay_builds_request_and_pending() {
        let renter = Keypair::from_seed([1u8; 32]);
        let host = Keypair::from_seed([2u8; 32]);
        let vc = ValidationContext::new(500);
        let mut payment = ContractPayment::new(
            tracked_contract(&renter, &host, 100),
            renter,
            host.public_key(),
            AccountId::ZERO,
        );

        let request = payment.pay(Currency::new(40), &vc).expect("pay");
        assert!(payment.has_pending());
        assert_eq!(request.new_revision_number, 2);
        assert_eq!(
            request.new_valid_proof_values[RENTER_OUTPUT_INDEX],
            Currency::new(60)
        );
        assert_eq!(
            request.new_valid_proof_values[HOST_OUTPUT_INDEX],
            Currency::new(50)
        );
        assert_eq!(
            request.new_missed_proof_values[VOID_OUTPUT_INDEX],
            Currency::ZERO
        );

        // a second payment cannot start while one is in flight
        assert_eq!(
            payment.pay(Currency::new(1), &vc),
            Err(PaymentError::PaymentInFlight)
        );
    }

    #[test]
    fn test_contract_pay_rejects_overdraft() {
        let renter = Keypair::from_seed([1u8; 32]);
        let host = Keypair::from_seed([2u8; 32]);
        let vc = ValidationContext::new(500);
        let mut payment = ContractPayment::new(
            tracked_contract(&renter, &host, 30),
            renter,
            host.public_key(),
            AccountId::ZERO,
        );

        assert_eq!(
            payment.pay(Currency::new(31), &vc),
            Err(PaymentError::InsufficientRenterFunds {
                available: Currency::new(30),
                required: Currency::new(31),
            })
        );
        assert!(!payment.has_pending());
    }

    #[test]
    fn test_commit_requires_valid_host_signature() {
        let renter = Keypair::from_seed([1u8; 32]);
        let host = Keypair::from_seed([2u8; 32]);
        let vc = ValidationContext::new(500);
        let host_public = host.public_key();
        let mut payment = ContractPayment::new(
            tracked_contract(&renter, &host, 100),
            renter,
            host_public,
            AccountId::ZERO,
        );

        payment.pay(Currency::new(25), &vc).expect("pay");
        let pending_hash = vc.contract_sig_hash(
            &payment
                .contract()
                .revision
                .payment_revision(Currency::new(25))
                .expect("revision"),
        );

        // a bad countersignature leaves the contract untouched
        let bad = PayByContractResponse {
            signature: Signature::EMPTY,
        };
        assert_eq!(payment.commit(&bad), Err(PaymentError::HostSignatureInvalid));
        assert_eq!(payment.contract().revision.new_revision_number, 1);
        assert!(payment.has_pending());

        // the genuine countersignature commits atomically
        let good = PayByContractResponse {
            signature: host.sign_hash(&pending_hash),
        };
        let committed = payment.commit(&good).expect("commit").clone();
        assert_eq!(committed.new_revision_number, 2);
        assert_eq!(committed.renter_funds(), Currency::new(75));
        assert!(!payment.has_pending());
    }

    #[test]
    fn test_commit_without_pending() {
        let renter = Keypair::from_seed([1u8; 32]);
        let host = Keypair::from_seed([2u8; 32]);
        let mut payment = ContractPayment::new(
            tracked_contract(&renter, &host, 100),
            renter,
            host.public_key(),
            AccountId::ZERO,
        );

        let response = PayByContractResponse {
            signature: Signature::EMPTY,
        };
        assert_eq!(payment.commit(&response), Err(PaymentError::NoPendingPayment));
    }

    #[test]
    fn test_account_pay_signs_fresh_nonce() {
        let key = Keypair::from_seed([3u8; 32]);
        let account = AccountId::from_public_key(key.public_key());
        let payment = AccountPayment::new(account, key, 900);

        let first = payment.pay(Currency::new(5)).expect("pay");
        let second = payment.pay(Currency::new(5)).expect("pay");

        assert_eq!(first.message.account, account);
        assert_eq!(first.message.expiry, 900);
        assert_ne!(first.message.nonce, second.message.nonce);

        // each request verifies under the account key
        first
            .message
            .validate_signature(&first.message.sig_hash(), &first.signature)
            .expect("signature");
    }

    #[test]
    fn test_account_pay_rejects_zero() {
        let key = Keypair::from_seed([3u8; 32]);
        let account = AccountId::from_public_key(key.public_key());
        let payment = AccountPayment::new(account, key, 900);
        assert_eq!(payment.pay(Currency::ZERO), Err(PaymentError::ZeroAmount));

        let zero_key = Keypair::from_seed([4u8; 32]);
        let zero = AccountPayment::new(AccountId::ZERO, zero_key, 900);
        assert_eq!(zero.pay(Currency::new(1)), Err(PaymentError::ZeroAccount));
    }

    #[test]
    fn test_payment_method_dispatch() {
        let key = Keypair::from_seed([5u8; 32]);
        let account = AccountId::from_public_key(key.public_key());
        let vc = ValidationContext::new(100);

        let mut method = PaymentMethod::ByEphemeralAccount(AccountPayment::new(account, key, 500));
        let request = method.pay(Currency::new(9), &vc).expect("pay");
        assert_eq!(request.kind(), PAY_BY_EPHEMERAL_ACCOUNT);
        assert_eq!(request.preamble().kind, PAY_BY_EPHEMERAL_ACCOUNT);
    }
}
