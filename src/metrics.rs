//! Counters for payment and renewal activity.
//!
//! Pure observation: nothing in the engines reads these back. A host
//! exposes them through whatever telemetry surface it runs; this crate
//! only keeps the counts.

use crate::types::Currency;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time copy of the protocol counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    /// Contract payments accepted.
    pub payments_accepted: u64,
    /// Contract payments rejected.
    pub payments_rejected: u64,
    /// Withdrawals that passed validation.
    pub withdrawals_accepted: u64,
    /// Withdrawals rejected by validation or replay defense.
    pub withdrawals_rejected: u64,
    /// Renewals that passed every gate.
    pub renewals_accepted: u64,
    /// Renewals rejected by a gate.
    pub renewals_rejected: u64,
    /// Total revenue accepted across payments and withdrawals.
    pub revenue: Currency,
}

/// Counters for one host's payment and renewal activity.
#[derive(Debug, Default)]
pub struct ProtocolMetrics {
    payments_accepted: AtomicU64,
    payments_rejected: AtomicU64,
    withdrawals_accepted: AtomicU64,
    withdrawals_rejected: AtomicU64,
    renewals_accepted: AtomicU64,
    renewals_rejected: AtomicU64,
    revenue: RwLock<Currency>,
}

impl ProtocolMetrics {
    /// Fresh, zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an accepted contract payment of `amount`.
    pub fn record_payment_accepted(&self, amount: Currency) {
        self.payments_accepted.fetch_add(1, Ordering::Relaxed);
        self.add_revenue(amount);
    }

    /// Record a rejected contract payment.
    pub fn record_payment_rejected(&self) {
        self.payments_rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an accepted withdrawal of `amount`.
    pub fn record_withdrawal_accepted(&self, amount: Currency) {
        self.withdrawals_accepted.fetch_add(1, Ordering::Relaxed);
        self.add_revenue(amount);
    }

    /// Record a rejected withdrawal.
    pub fn record_withdrawal_rejected(&self) {
        self.withdrawals_rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an accepted renewal.
    pub fn record_renewal_accepted(&self) {
        self.renewals_accepted.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a rejected renewal.
    pub fn record_renewal_rejected(&self) {
        self.renewals_rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Total revenue accepted so far.
    #[must_use]
    pub fn revenue(&self) -> Currency {
        *self.revenue.read()
    }

    /// Copy out all counters.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            payments_accepted: self.payments_accepted.load(Ordering::Relaxed),
            payments_rejected: self.payments_rejected.load(Ordering::Relaxed),
            withdrawals_accepted: self.withdrawals_accepted.load(Ordering::Relaxed),
            withdrawals_rejected: self.withdrawals_rejected.load(Ordering::Relaxed),
            renewals_accepted: self.renewals_accepted.load(Ordering::Relaxed),
            renewals_rejected: self.renewals_rejected.load(Ordering::Relaxed),
            revenue: self.revenue(),
        }
    }

    fn add_revenue(&self, amount: Currency) {
        let mut revenue = self.revenue.write();
        *revenue = revenue.saturating_add(amount);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let metrics = ProtocolMetrics::new();
        metrics.record_payment_accepted(Currency::new(10));
        metrics.record_payment_accepted(Currency::new(5));
        metrics.record_payment_rejected();
        metrics.record_withdrawal_accepted(Currency::new(3));
        metrics.record_renewal_accepted();
        metrics.record_renewal_rejected();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.payments_accepted, 2);
        assert_eq!(snapshot.payments_rejected, 1);
        assert_eq!(snapshot.withdrawals_accepted, 1);
        assert_eq!(snapshot.withdrawals_rejected, 0);
        assert_eq!(snapshot.renewals_accepted, 1);
        assert_eq!(snapshot.renewals_rejected, 1);
        assert_eq!(snapshot.revenue, Currency::new(18));
    }

    #[test]
    fn test_snapshot_is_a_copy() {
        let metrics = ProtocolMetrics::new();
        let before = metrics.snapshot();
        metrics.record_renewal_accepted();
        assert_eq!(before.renewals_accepted, 0);
        assert_eq!(metrics.snapshot().renewals_accepted, 1);
    }
}
