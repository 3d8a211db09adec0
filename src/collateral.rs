//! Pessimistic accounting of the host's collateral budget.
//!
//! The renewal gate sequence checks the budget against a snapshot, but two
//! renewals verified concurrently against the same snapshot could both
//! pass and jointly overrun it. The ledger closes that race: collateral is
//! *reserved* before a renewal is acted on and either committed when the
//! new contract is durably accepted or returned when the attempt fails.
//! Reserved-but-uncommitted collateral counts against the budget, so the
//! second of two racing renewals sees the first one's reservation.

use crate::renewal::RenewalError;
use crate::types::Currency;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Default)]
struct Inner {
    /// Collateral locked into accepted obligations.
    committed: Currency,
    /// Collateral reserved for in-flight renewals.
    reserved: Currency,
}

/// Tracks committed and reserved collateral across all obligations.
///
/// Cheap to clone; clones share the same ledger.
#[derive(Debug, Clone, Default)]
pub struct CollateralLedger {
    inner: Arc<Mutex<Inner>>,
}

impl CollateralLedger {
    /// An empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Collateral locked into accepted obligations.
    #[must_use]
    pub fn committed(&self) -> Currency {
        self.inner.lock().committed
    }

    /// Collateral reserved for renewals still in flight.
    #[must_use]
    pub fn reserved(&self) -> Currency {
        self.inner.lock().reserved
    }

    /// Everything currently counted against the budget.
    #[must_use]
    pub fn locked(&self) -> Currency {
        let inner = self.inner.lock();
        inner.committed.saturating_add(inner.reserved)
    }

    /// Reserve `amount` against `budget`.
    ///
    /// The check and the reservation happen under one lock, so concurrent
    /// reservations serialize and cannot jointly exceed the budget. The
    /// returned guard returns the collateral on drop unless
    /// [`CollateralReservation::commit`] is called first.
    ///
    /// # Errors
    ///
    /// [`RenewalError::CollateralBudgetExceeded`] if committed + reserved
    /// + `amount` would overrun `budget`.
    pub fn reserve(
        &self,
        amount: Currency,
        budget: Currency,
    ) -> Result<CollateralReservation, RenewalError> {
        let mut inner = self.inner.lock();
        let locked = inner.committed.saturating_add(inner.reserved);
        if locked.saturating_add(amount) > budget {
            return Err(RenewalError::CollateralBudgetExceeded {
                locked,
                expected: amount,
                budget,
            });
        }
        inner.reserved = inner.reserved.saturating_add(amount);
        debug!(%amount, reserved = %inner.reserved, "reserved collateral");
        Ok(CollateralReservation {
            ledger: Arc::clone(&self.inner),
            amount,
            armed: true,
        })
    }

    /// Unlock collateral of an obligation that has resolved.
    pub fn release_committed(&self, amount: Currency) {
        let mut inner = self.inner.lock();
        inner.committed = inner.committed.saturating_sub(amount);
    }
}

/// A held slice of the collateral budget.
///
/// Commit it once the renewal is durably accepted; dropping it first
/// returns the collateral to the budget.
#[derive(Debug)]
#[must_use = "an uncommitted reservation is released on drop"]
pub struct CollateralReservation {
    ledger: Arc<Mutex<Inner>>,
    amount: Currency,
    armed: bool,
}

impl CollateralReservation {
    /// The reserved amount.
    #[must_use]
    pub fn amount(&self) -> Currency {
        self.amount
    }

    /// Convert the reservation into committed collateral.
    pub fn commit(mut self) {
        let mut inner = self.ledger.lock();
        inner.reserved = inner.reserved.saturating_sub(self.amount);
        inner.committed = inner.committed.saturating_add(self.amount);
        self.armed = false;
        debug!(amount = %self.amount, committed = %inner.committed, "committed collateral");
    }
}

impl Drop for CollateralReservation {
    fn drop(&mut self) {
        if self.armed {
            let mut inner = self.ledger.lock();
            inner.reserved = inner.reserved.saturating_sub(self.amount);
        }
    }
}
