//! Chain-supplied validation parameters: tax and signature hashing.
//!
//! The [`ValidationContext`] is an immutable snapshot of the chain state a
//! signature or payout check runs under. Hashing always starts from the
//! structured fields of the object being signed; a hash supplied by the
//! counterparty is never trusted.

use crate::contract::{FileContract, FileContractRevision};
use crate::crypto::SigHasher;
use crate::types::{BlockHeight, Currency, Hash256, Specifier};

/// Height of the tax hardfork. Before it, the network fee is a plain floor
/// division; from it onward the fee is additionally rounded down to the
/// fund-share denomination so fee outputs divide evenly among fund holders.
pub const TAX_HARDFORK_HEIGHT: BlockHeight = 21_000;

/// Denomination the post-hardfork fee is rounded down to.
pub const FUND_SHARE_DENOMINATION: u64 = 10_000;

// 3.9% network fee on contract payouts.
const TAX_NUMERATOR: u64 = 39;
const TAX_DENOMINATOR: u64 = 1000;

const REVISION_SIG_DOMAIN: Specifier = Specifier::new("rev signature");

/// Snapshot of the chain parameters contract validation runs under.
///
/// Supplied by the chain height oracle; never mutated by this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationContext {
    /// The current chain height.
    pub height: BlockHeight,
}

impl ValidationContext {
    /// Context at the given height.
    #[must_use]
    pub const fn new(height: BlockHeight) -> Self {
        Self { height }
    }

    /// The network fee taken from a contract payout at this height.
    #[must_use]
    pub fn tax(&self, payout: Currency) -> Currency {
        let fee = payout.saturating_mul(TAX_NUMERATOR).div_u64(TAX_DENOMINATOR);
        if self.height < TAX_HARDFORK_HEIGHT {
            fee
        } else {
            fee.round_down(FUND_SHARE_DENOMINATION)
        }
    }

    /// The portion of a payout remaining after the network fee.
    #[must_use]
    pub fn post_tax(&self, payout: Currency) -> Currency {
        payout.saturating_sub(self.tax(payout))
    }

    /// The canonical signature hash of a contract revision.
    ///
    /// Both parties sign exactly this hash; the host recomputes it from the
    /// revision fields before verifying either signature.
    #[must_use]
    pub fn contract_sig_hash(&self, revision: &FileContractRevision) -> Hash256 {
        let mut hasher = SigHasher::new(REVISION_SIG_DOMAIN);
        revision.write_to(&mut hasher);
        hasher.finalize()
    }

    /// Whether a contract's payout schedules balance:
    /// `sum(valid) + tax == payout == sum(missed) + tax`.
    #[must_use]
    pub fn payout_balanced(&self, contract: &FileContract) -> bool {
        let tax = self.tax(contract.payout);
        let sum = |outputs: &[crate::contract::ProofOutput]| {
            outputs
                .iter()
                .try_fold(Currency::ZERO, |acc, o| acc.checked_add(o.value))
        };
        let (Some(valid), Some(missed)) = (
            sum(&contract.valid_proof_outputs),
            sum(&contract.missed_proof_outputs),
        ) else {
            return false;
        };
        valid.checked_add(tax) == Some(contract.payout)
            && missed.checked_add(tax) == Some(contract.payout)
    }
}
