//! # skerry-contract
//!
//! The contract and payment engine of the Skerry decentralized storage
//! network: the machinery two mutually distrusting parties use to mutate a
//! shared, collateral-backed file contract and to charge for individual
//! RPCs, with cryptographic proof at every step.
//!
//! ## What's here
//!
//! - **Payment protocol** — pay-by-contract (signed revisions of an open
//!   file contract) and pay-by-ephemeral-account (signed, expiring
//!   withdrawal messages), with the host-side verification for both.
//! - **Renewal verification** — the fixed gate sequence a host runs over a
//!   proposed replacement contract before accepting it.
//! - **Collateral accounting** — pessimistic reserve-then-commit tracking
//!   of the host's collateral budget across concurrent renewals.
//!
//! ## What's not
//!
//! Consensus, transport, persistence, and wallet key management are
//! external collaborators. This crate consumes a chain height, a policy
//! snapshot, and signing keys; it performs no I/O of its own beyond
//! loading policy files.
//!
//! ## Example
//!
//! ```rust,no_run
//! use skerry_contract::contract::ValidationContext;
//! use skerry_contract::crypto::Keypair;
//! use skerry_contract::payment::{AccountPayment, PaymentMethod};
//! use skerry_contract::account::AccountId;
//! use skerry_contract::types::Currency;
//!
//! let key = Keypair::generate();
//! let account = AccountId::from_public_key(key.public_key());
//! let mut method = PaymentMethod::ByEphemeralAccount(
//!     AccountPayment::new(account, key, 1_000),
//! );
//! let vc = ValidationContext::new(900);
//! let request = method.pay(Currency::from_coins(1), &vc)?;
//! # let _ = request;
//! # Ok::<(), skerry_contract::payment::PaymentError>(())
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod account;
pub mod collateral;
pub mod config;
pub mod contract;
pub mod crypto;
pub mod error;
pub mod metrics;
pub mod payment;
pub mod renewal;
pub mod types;

pub use account::{
    AccountId, ReplayGuard, WithdrawalError, WithdrawalMessage, WithdrawalValidationError,
};
pub use collateral::{CollateralLedger, CollateralReservation};
pub use config::{ExternalSettings, HostSettings, InternalSettings, PolicySnapshot};
pub use contract::{
    ContractId, FileContract, FileContractRevision, ProofOutput, RevisionError, Transaction,
    UnlockConditions, ValidationContext,
};
pub use crypto::{Keypair, PublicKey, Signature};
pub use error::{Error, Result};
pub use metrics::{MetricsSnapshot, ProtocolMetrics};
pub use payment::{
    AccountPayment, ContractPayment, PaymentError, PaymentMethod, PaymentRequest, TrackedContract,
};
pub use renewal::{
    process_renewal, renew_base_costs, verify_renewed_contract, RenewalAssessment, RenewalContext,
    RenewalError, StorageObligation, REVISION_SUBMISSION_BUFFER,
};
pub use types::{BlockHeight, Currency, Hash256, Specifier, UnlockHash};
