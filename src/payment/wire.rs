//! Wire messages for the payment protocol.
//!
//! A payment exchange opens with a [`PaymentRequestPreamble`] naming the
//! method by specifier, followed by the method's typed request. Messages
//! are bincode-encoded with a hard allocation cap so a malicious peer
//! cannot force a large allocation with a forged length prefix. Stream
//! framing itself is the transport's concern, not this crate's.

use crate::account::{AccountId, WithdrawalMessage};
use crate::contract::ContractId;
use crate::crypto::Signature;
use crate::types::{Currency, Specifier};
use bincode::Options;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Specifier opening a pay-by-contract exchange.
pub const PAY_BY_CONTRACT: Specifier = Specifier::new("PayByContract");

/// Specifier opening a pay-by-ephemeral-account exchange.
pub const PAY_BY_EPHEMERAL_ACCOUNT: Specifier = Specifier::new("PayByEphemAcc");

/// Hard cap on a decoded payment message.
///
/// The largest legitimate message is a contract request: a handful of
/// currency strings, an account id, and a signature. 4 KiB is generous.
pub const MAX_PAYMENT_MESSAGE_SIZE: u64 = 4 * 1024;

/// Wire encode/decode failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WireError {
    /// Message serialization failed.
    #[error("failed to encode payment message: {0}")]
    Encode(String),

    /// Message deserialization failed or exceeded the size cap.
    #[error("failed to decode payment message: {0}")]
    Decode(String),
}

fn wire_options() -> impl Options {
    bincode::options()
        .with_limit(MAX_PAYMENT_MESSAGE_SIZE)
        .allow_trailing_bytes()
}

/// Encode a payment message for the wire.
///
/// # Errors
///
/// Returns [`WireError::Encode`] if serialization fails or the message
/// exceeds the size cap.
pub fn encode<T: Serialize>(message: &T) -> Result<Vec<u8>, WireError> {
    wire_options()
        .serialize(message)
        .map_err(|e| WireError::Encode(e.to_string()))
}

/// Decode a payment message from the wire, capped at
/// [`MAX_PAYMENT_MESSAGE_SIZE`].
///
/// # Errors
///
/// Returns [`WireError::Decode`] on malformed input or an oversized
/// message.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, WireError> {
    wire_options()
        .deserialize(bytes)
        .map_err(|e| WireError::Decode(e.to_string()))
}

/// Opens a payment exchange and names the method that follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRequestPreamble {
    /// [`PAY_BY_CONTRACT`] or [`PAY_BY_EPHEMERAL_ACCOUNT`].
    pub kind: Specifier,
}

/// Pay for an RPC by revising a file contract.
///
/// Carries the proposed output values rather than a whole revision; the
/// host rebuilds the revision from its own copy of the contract and these
/// values, then recomputes the signature hash itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayByContractRequest {
    /// The contract being revised.
    pub contract_id: ContractId,
    /// Proposed revision number.
    pub new_revision_number: u64,
    /// Proposed valid-proof output values: [renter, host].
    pub new_valid_proof_values: Vec<Currency>,
    /// Proposed missed-proof output values: [renter, host, void].
    pub new_missed_proof_values: Vec<Currency>,
    /// Account any overpayment is refunded to.
    pub refund_account: AccountId,
    /// Renter's signature over the proposed revision hash.
    pub signature: Signature,
}

/// Host's acknowledgment of a contract payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayByContractResponse {
    /// Host's countersignature over the same revision hash.
    pub signature: Signature,
}

/// Pay for an RPC from an ephemeral account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayByEphemeralAccountRequest {
    /// The signed withdrawal.
    pub message: WithdrawalMessage,
    /// Signature over the message's canonical hash.
    pub signature: Signature,
    /// Scheduling priority relative to other withdrawals from the same
    /// account; higher drains first.
    pub priority: i64,
}

/// Host's acknowledgment of an ephemeral-account payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayByEphemeralAccountResponse {
    /// Account balance before the withdrawal was applied.
    pub balance: Currency,
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use crate::account::WITHDRAWAL_NONCE_LEN;
    use crate::crypto::Keypair;
    use crate::types::Hash256;

    #[test]
    fn test_preamble_round_trip() {
        let preamble = PaymentRequestPreamble {
            kind: PAY_BY_CONTRACT,
        };
        let bytes = encode(&preamble).expect("encode");
        let decoded: PaymentRequestPreamble = decode(&bytes).expect("decode");
        assert_eq!(decoded, preamble);
        assert_eq!(decoded.kind.to_string(), "PayByContract");
    }

    #[test]
    fn test_contract_request_round_trip() {
        let keypair = Keypair::from_seed([6u8; 32]);
        let request = PayByContractRequest {
            contract_id: ContractId(Hash256([8u8; 32])),
            new_revision_number: 12,
            new_valid_proof_values: vec![Currency::new(90), Currency::new(10)],
            new_missed_proof_values: vec![
                Currency::new(90),
                Currency::new(10),
                Currency::ZERO,
            ],
            refund_account: AccountId::from_public_key(keypair.public_key()),
            signature: keypair.sign_hash(&Hash256([1u8; 32])),
        };

        let bytes = encode(&request).expect("encode");
        let decoded: PayByContractRequest = decode(&bytes).expect("decode");
        assert_eq!(decoded, request);
    }

    #[test]
    fn test_account_request_round_trip() {
        let keypair = Keypair::from_seed([7u8; 32]);
        let message = WithdrawalMessage {
            account: AccountId::from_public_key(keypair.public_key()),
            expiry: 99,
            amount: Currency::new(77),
            nonce: [3u8; WITHDRAWAL_NONCE_LEN],
        };
        let request = PayByEphemeralAccountRequest {
            signature: keypair.sign_hash(&message.sig_hash()),
            message,
            priority: 0,
        };

        let bytes = encode(&request).expect("encode");
        let decoded: PayByEphemeralAccountRequest = decode(&bytes).expect("decode");
        assert_eq!(decoded, request);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let result: Result<PayByContractRequest, _> = decode(&[0xFF, 0xFF, 0xFF]);
        assert!(result.is_err());
    }

    #[test]
    fn test_decode_rejects_forged_length_prefix() {
        // a huge length prefix must fail the size cap, not allocate
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&u64::MAX.to_le_bytes());
        bytes.extend_from_slice(&[0u8; 64]);
        let result: Result<PayByEphemeralAccountRequest, _> = decode(&bytes);
        assert!(result.is_err());
    }
}
