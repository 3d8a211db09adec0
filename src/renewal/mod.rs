//! The contract-renewal verification engine.
//!
//! Renewal replaces an expiring file contract with a fresh one covering the
//! same data for a longer storage window. The renter proposes a transaction
//! set; the host runs a fixed sequence of gates over it and either rejects
//! with the first failing gate or accepts and reports the derived pricing.
//!
//! The whole engine is a pure, single-shot decision: it performs no I/O,
//! holds no locks, and mutates nothing. The obligation's stored revision is
//! only replaced after every gate passes and the external storage-obligation
//! manager durably commits the result.
//!
//! Gate order is normative. A proposal failing several gates is always
//! reported with the earliest one, so a proposer can fix problems in a
//! deterministic order:
//!
//! 1. admission ([`renew_allowed`])
//! 2. extraction ([`fetch_revision_and_contract`])
//! 3. size/root continuity
//! 4. window bounds
//! 5. output shape and unlock hashes
//! 6. pricing derivation ([`renew_base_costs`])
//! 7. collateral budget
//! 8. payout values

use crate::config::PolicySnapshot;
use crate::contract::{
    FileContract, FileContractRevision, Transaction, UnlockConditions, MISSED_OUTPUT_COUNT,
    VALID_OUTPUT_COUNT,
};
use crate::crypto::PublicKey;
use crate::types::{BlockHeight, Currency, Hash256, UnlockHash};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Safety margin, in blocks, the host keeps between "now" and a contract's
/// proof window. Once a contract is inside the buffer no further revision
/// or renewal is accepted: the final revision still has to reach the chain
/// before the window opens.
pub const REVISION_SUBMISSION_BUFFER: BlockHeight = 144;

/// Why a renewal proposal was rejected.
///
/// Policy rejections (`NotAcceptingContracts`, `LateRevision`,
/// `MaxCollateralReached`, `CollateralBudgetExceeded`) are expected and the
/// renter may retry with different terms; the rest mean the proposal was
/// malformed and must be corrected before resubmitting. Nothing here is
/// retried internally.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenewalError {
    /// The host is not taking on new obligations.
    #[error("host is not accepting new contracts")]
    NotAcceptingContracts,

    /// The old contract is too close to its proof window to renew safely.
    #[error(
        "window start {window_start} is within the submission buffer at height {current_height}"
    )]
    LateRevision {
        /// Proposed window start.
        window_start: BlockHeight,
        /// Current chain height.
        current_height: BlockHeight,
    },

    /// The renewal transaction set is empty.
    #[error("renewal transaction set is empty")]
    EmptyTransactionSet,

    /// The final transaction does not carry exactly one new contract.
    #[error("renewal transaction must carry exactly one new file contract")]
    MissingContract,

    /// The final transaction does not carry exactly one revision.
    #[error("renewal transaction must carry exactly one contract revision")]
    MissingRevision,

    /// The renewal changes the stored file's size.
    #[error("renewal changes the file size: stored {stored}, proposed {proposed}")]
    BadFileSize {
        /// Size the obligation currently stores.
        stored: u64,
        /// Size the proposal names.
        proposed: u64,
    },

    /// The renewal changes the stored file's merkle root.
    #[error("renewal changes the file merkle root: stored {stored}, proposed {proposed}")]
    BadFileMerkleRoot {
        /// Root the obligation currently stores.
        stored: Hash256,
        /// Root the proposal names.
        proposed: Hash256,
    },

    /// The proof window opens inside the submission buffer.
    #[error(
        "window start {window_start} is inside the submission buffer at height {current_height}"
    )]
    EarlyWindow {
        /// Proposed window start.
        window_start: BlockHeight,
        /// Current chain height.
        current_height: BlockHeight,
    },

    /// The proof window is narrower than the host's advertised minimum.
    #[error("proof window of {window} blocks is below the advertised {minimum}")]
    SmallWindow {
        /// Proposed window width.
        window: BlockHeight,
        /// Host's advertised minimum width.
        minimum: BlockHeight,
    },

    /// The contract runs longer than the host's advertised maximum.
    #[error("contract duration of {duration} blocks exceeds the advertised {maximum}")]
    LongDuration {
        /// Proposed duration, window start relative to now.
        duration: BlockHeight,
        /// Host's advertised maximum duration.
        maximum: BlockHeight,
    },

    /// The proposal does not carry the required 2 valid / 3 missed outputs.
    #[error("renewed contract must carry exactly {VALID_OUTPUT_COUNT} valid and {MISSED_OUTPUT_COUNT} missed proof outputs")]
    BadContractOutputCounts,

    /// A payout is not addressed to the host or the void as required.
    #[error("payout addresses do not match the host and void addresses")]
    BadPayoutUnlockHashes,

    /// The aggregate unlock hash is not the renter-host 2-of-2 hash.
    #[error("contract unlock hash is not the renter-host 2-of-2 multisig hash")]
    BadUnlockHash,

    /// The derived collateral exceeds the per-contract maximum.
    #[error("required collateral {expected} exceeds the per-contract maximum {maximum}")]
    MaxCollateralReached {
        /// Collateral the proposal obliges the host to lock.
        expected: Currency,
        /// The host's advertised per-contract maximum.
        maximum: Currency,
    },

    /// Locking the derived collateral would exceed the global budget.
    #[error("collateral budget exceeded: {locked} locked + {expected} requested > {budget}")]
    CollateralBudgetExceeded {
        /// Collateral already locked across other obligations.
        locked: Currency,
        /// Collateral this proposal would add.
        expected: Currency,
        /// The host's global collateral budget.
        budget: Currency,
    },

    /// The host's valid payout does not cover the contract price and base
    /// price.
    #[error("host valid payout {payout} is below the required {required}")]
    LowHostValidOutput {
        /// Proposed host valid payout.
        payout: Currency,
        /// Minimum acceptable value.
        required: Currency,
    },

    /// The host's missed payout puts more than collateral + base price at
    /// risk.
    #[error("host missed payout {payout} is below the required {required}")]
    LowHostMissedOutput {
        /// Proposed host missed payout.
        payout: Currency,
        /// Minimum acceptable value.
        required: Currency,
    },

    /// The void payout does not burn the collateral and base price.
    #[error("void payout {payout} is below the required {required}")]
    LowVoidOutput {
        /// Proposed void payout.
        payout: Currency,
        /// Minimum acceptable value.
        required: Currency,
    },
}

/// The chain-and-counterparty context a renewal is judged under.
#[derive(Debug, Clone, Copy)]
pub struct RenewalContext {
    /// Current chain height.
    pub current_height: BlockHeight,
    /// Cost of the renewal RPC itself, folded into the base price.
    pub rpc_cost: Currency,
    /// The renter's contract signing key.
    pub renter_key: PublicKey,
    /// The host's contract signing key.
    pub host_key: PublicKey,
}

/// Pricing derived while verifying a renewal.
///
/// `base_price` and `base_collateral` price the additional storage-time the
/// renewal buys for the data already stored; `expected_collateral` is what
/// the host must lock for this contract, and what the storage-obligation
/// manager reserves on acceptance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenewalAssessment {
    /// Payment owed the host for carrying existing data through the
    /// extended window, including the RPC cost.
    pub base_price: Currency,
    /// Collateral the host risks on that same extension.
    pub base_collateral: Currency,
    /// Total collateral the host locks into the new contract.
    pub expected_collateral: Currency,
}

/// The host's view of one stored contract, as supplied by the external
/// storage-obligation manager.
///
/// Only the shape this engine reads is modeled: the revision transaction
/// set whose last revision states what is currently stored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageObligation {
    /// The obligation's current revision transaction set.
    pub revision_transaction_set: Vec<Transaction>,
}

impl StorageObligation {
    /// The most recent revision of the obligation's contract.
    #[must_use]
    pub fn recent_revision(&self) -> Option<&FileContractRevision> {
        self.revision_transaction_set
            .last()?
            .file_contract_revisions
            .first()
    }

    /// Size of the data currently stored under this obligation.
    #[must_use]
    pub fn file_size(&self) -> Option<u64> {
        self.recent_revision().map(|rev| rev.new_file_size)
    }

    /// Merkle root of the data currently stored under this obligation.
    #[must_use]
    pub fn merkle_root(&self) -> Option<Hash256> {
        self.recent_revision().map(|rev| rev.new_file_merkle_root)
    }
}

/// Gate 1: may this obligation be renewed at all right now?
///
/// # Errors
///
/// [`RenewalError::NotAcceptingContracts`] if the host has stopped taking
/// obligations, [`RenewalError::LateRevision`] if the proof window opens
/// within [`REVISION_SUBMISSION_BUFFER`] blocks of the current height.
pub fn renew_allowed(
    accepting_contracts: bool,
    current_height: BlockHeight,
    window_start: BlockHeight,
) -> Result<(), RenewalError> {
    if !accepting_contracts {
        return Err(RenewalError::NotAcceptingContracts);
    }
    if window_start <= current_height + REVISION_SUBMISSION_BUFFER {
        return Err(RenewalError::LateRevision {
            window_start,
            current_height,
        });
    }
    Ok(())
}

/// Gate 2: locate the proposed contract and revision.
///
/// The last transaction of the set must carry exactly one new file
/// contract and exactly one revision; anything else is malformed.
///
/// # Errors
///
/// [`RenewalError::EmptyTransactionSet`], [`RenewalError::MissingContract`]
/// or [`RenewalError::MissingRevision`].
pub fn fetch_revision_and_contract(
    transaction_set: &[Transaction],
) -> Result<(&FileContractRevision, &FileContract), RenewalError> {
    let last = transaction_set
        .last()
        .ok_or(RenewalError::EmptyTransactionSet)?;
    if last.file_contracts.len() != 1 {
        return Err(RenewalError::MissingContract);
    }
    if last.file_contract_revisions.len() != 1 {
        return Err(RenewalError::MissingRevision);
    }
    Ok((&last.file_contract_revisions[0], &last.file_contracts[0]))
}

/// Derive the base price and base collateral of a renewal.
///
/// The renewal extends the proof deadline from the old revision's window
/// end to `new_window_start + window_size`. The host charges its storage
/// price, and risks its collateral rate, per stored byte-block of that
/// extension; the renewal RPC's own cost is folded into the price. A
/// renewal that does not extend the deadline only owes the RPC cost.
///
/// Deterministic by construction: proposer and host must derive identical
/// values or the proposal fails the value gates.
#[must_use]
pub fn renew_base_costs(
    old_revision: &FileContractRevision,
    external: &crate::config::ExternalSettings,
    rpc_cost: Currency,
    new_window_start: BlockHeight,
) -> (Currency, Currency) {
    let mut base_price = Currency::ZERO;
    let mut base_collateral = Currency::ZERO;

    let new_proof_deadline = new_window_start.saturating_add(external.window_size);
    if new_proof_deadline > old_revision.new_window_end {
        let extension = new_proof_deadline - old_revision.new_window_end;
        let byte_blocks = |rate: Currency| {
            rate.saturating_mul(old_revision.new_file_size)
                .saturating_mul(extension)
        };
        base_price = byte_blocks(external.storage_price);
        base_collateral = byte_blocks(external.collateral_rate);
    }

    (base_price.saturating_add(rpc_cost), base_collateral)
}

/// Derive the collateral the host must lock into a renewed contract.
///
/// Everything in the proposed host valid payout beyond the contract price
/// and base price is collateral the host risks. Saturates at zero: a
/// renter may legitimately buy no collateral at all, and a payout too low
/// to cover even the price portion is caught by the value gates, not here.
#[must_use]
pub fn renew_contract_collateral(
    old_revision: &FileContractRevision,
    external: &crate::config::ExternalSettings,
    rpc_cost: Currency,
    new_contract: &FileContract,
) -> Currency {
    let (base_price, _) =
        renew_base_costs(old_revision, external, rpc_cost, new_contract.window_start);
    let host_payout = new_contract
        .valid_host_output()
        .map_or(Currency::ZERO, |o| o.value);
    host_payout
        .saturating_sub(external.contract_price)
        .saturating_sub(base_price)
}

/// Gates 3–8: judge a proposed renewal contract against the obligation it
/// replaces and an immutable policy snapshot.
///
/// Pure: nothing is mutated, and identical inputs always produce the same
/// verdict. On success the derived pricing is returned for the caller to
/// reserve and commit.
///
/// # Errors
///
/// The earliest failing gate in the fixed order, as a [`RenewalError`].
pub fn verify_renewed_contract(
    obligation: &StorageObligation,
    new_contract: &FileContract,
    old_revision: &FileContractRevision,
    ctx: &RenewalContext,
    policy: &PolicySnapshot,
) -> Result<RenewalAssessment, RenewalError> {
    let external = &policy.external;

    // Gate 3: the renewal must not change what is stored.
    let stored_size = obligation
        .file_size()
        .ok_or(RenewalError::MissingRevision)?;
    let stored_root = obligation
        .merkle_root()
        .ok_or(RenewalError::MissingRevision)?;
    if new_contract.file_size != stored_size {
        return Err(RenewalError::BadFileSize {
            stored: stored_size,
            proposed: new_contract.file_size,
        });
    }
    if new_contract.file_merkle_root != stored_root {
        return Err(RenewalError::BadFileMerkleRoot {
            stored: stored_root,
            proposed: new_contract.file_merkle_root,
        });
    }

    // Gate 4: window bounds.
    if new_contract.window_start <= ctx.current_height + REVISION_SUBMISSION_BUFFER {
        return Err(RenewalError::EarlyWindow {
            window_start: new_contract.window_start,
            current_height: ctx.current_height,
        });
    }
    let window = new_contract
        .window_end
        .saturating_sub(new_contract.window_start);
    if window < external.window_size {
        return Err(RenewalError::SmallWindow {
            window,
            minimum: external.window_size,
        });
    }
    let duration = new_contract
        .window_start
        .saturating_sub(ctx.current_height);
    if duration > external.max_duration {
        return Err(RenewalError::LongDuration {
            duration,
            maximum: external.max_duration,
        });
    }

    // Gate 5: output shape and addresses.
    if new_contract.valid_proof_outputs.len() != VALID_OUTPUT_COUNT
        || new_contract.missed_proof_outputs.len() != MISSED_OUTPUT_COUNT
    {
        return Err(RenewalError::BadContractOutputCounts);
    }
    let valid_host = new_contract
        .valid_host_output()
        .ok_or(RenewalError::BadContractOutputCounts)?;
    let missed_host = new_contract
        .missed_host_output()
        .ok_or(RenewalError::BadContractOutputCounts)?;
    let missed_void = new_contract
        .missed_void_output()
        .ok_or(RenewalError::BadContractOutputCounts)?;
    if valid_host.unlock_hash != external.unlock_hash
        || missed_host.unlock_hash != external.unlock_hash
        || missed_void.unlock_hash != UnlockHash::VOID
    {
        return Err(RenewalError::BadPayoutUnlockHashes);
    }
    let expected_unlock_hash =
        UnlockConditions::renter_host(ctx.renter_key, ctx.host_key).unlock_hash();
    if new_contract.unlock_hash != expected_unlock_hash {
        return Err(RenewalError::BadUnlockHash);
    }

    // Gate 6: pricing derivation.
    let (base_price, base_collateral) = renew_base_costs(
        old_revision,
        external,
        ctx.rpc_cost,
        new_contract.window_start,
    );
    let expected_collateral =
        renew_contract_collateral(old_revision, external, ctx.rpc_cost, new_contract);

    // Gate 7: collateral budget.
    if expected_collateral > external.max_collateral {
        return Err(RenewalError::MaxCollateralReached {
            expected: expected_collateral,
            maximum: external.max_collateral,
        });
    }
    let total_locked = policy
        .locked_collateral
        .saturating_add(expected_collateral);
    if total_locked > policy.internal.collateral_budget {
        return Err(RenewalError::CollateralBudgetExceeded {
            locked: policy.locked_collateral,
            expected: expected_collateral,
            budget: policy.internal.collateral_budget,
        });
    }

    // Gate 8: payout values.
    let required_valid = external.contract_price.saturating_add(base_price);
    if valid_host.value < required_valid {
        return Err(RenewalError::LowHostValidOutput {
            payout: valid_host.value,
            required: required_valid,
        });
    }
    // on a missed proof the host may lose at most collateral + base price
    let required_missed = valid_host
        .value
        .saturating_sub(base_collateral)
        .saturating_sub(base_price);
    if missed_host.value < required_missed {
        return Err(RenewalError::LowHostMissedOutput {
            payout: missed_host.value,
            required: required_missed,
        });
    }
    // what the host loses must be burned, never handed to the renter
    let required_void = base_collateral.saturating_add(base_price);
    if missed_void.value < required_void {
        return Err(RenewalError::LowVoidOutput {
            payout: missed_void.value,
            required: required_void,
        });
    }

    debug!(
        %base_price,
        %base_collateral,
        %expected_collateral,
        window_start = new_contract.window_start,
        "renewal verified"
    );
    Ok(RenewalAssessment {
        base_price,
        base_collateral,
        expected_collateral,
    })
}

/// The single-shot renewal decision: gates 1–8 over a proposed transaction
/// set.
///
/// The extracted revision is the final revision of the old contract
/// proposed alongside the new one; it is also the revision the base costs
/// are derived from. On success the accepted contract, revision, and
/// assessment are returned for the storage-obligation manager to reserve
/// collateral for and durably commit; nothing is mutated here.
///
/// # Errors
///
/// The earliest failing gate, as a [`RenewalError`].
pub fn process_renewal<'a>(
    obligation: &StorageObligation,
    transaction_set: &'a [Transaction],
    ctx: &RenewalContext,
    policy: &PolicySnapshot,
) -> Result<
    (
        &'a FileContractRevision,
        &'a FileContract,
        RenewalAssessment,
    ),
    RenewalError,
> {
    // admission is checked before anything is read from the proposal
    if !policy.external.accepting_contracts {
        return Err(RenewalError::NotAcceptingContracts);
    }

    let (old_revision, new_contract) = fetch_revision_and_contract(transaction_set)?;
    renew_allowed(
        policy.external.accepting_contracts,
        ctx.current_height,
        new_contract.window_start,
    )?;

    let assessment =
        verify_renewed_contract(obligation, new_contract, old_revision, ctx, policy)?;
    Ok((old_revision, new_contract, assessment))
}
